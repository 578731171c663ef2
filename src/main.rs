// Entrypoint for the CLI application.
// - Parses arguments, loads settings and connects the REST client.
// - Runs upload -> encode -> publish -> download through `workflow::run`.
// - Any failure from any step is reported once here, then the program waits
//   for Enter (unless `--no-wait`) before exiting.

use anyhow::Result;
use clap::Parser;
use mediasvc_cli::api::{AssetCreationOptions, MediaServicesClient};
use mediasvc_cli::config::Settings;
use mediasvc_cli::ui::{self, ConsoleReporter};
use mediasvc_cli::workflow::{self, Encoding, RunPlan};
use mediasvc_cli::init_tracing;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "mediasvc",
    about = "Upload a media file, encode it to adaptive bitrate MP4, publish and download the output"
)]
struct Cli {
    /// Local video or image file to upload
    source: PathBuf,
    /// Folder the encoded files are downloaded into
    #[arg(long, default_value = workflow::OUTPUT_FOLDER)]
    output_folder: PathBuf,
    /// Media processor used for the transcoding task
    #[arg(long, default_value = workflow::STANDARD_ENCODER)]
    encoder: String,
    /// Encoder preset (task configuration)
    #[arg(long, default_value = workflow::BITRATE_PRESET)]
    preset: String,
    /// Name of the encoded output asset
    #[arg(long, default_value = workflow::ADAPTIVE_BITRATE_OUTPUT)]
    output_asset_name: String,
    /// Validity of the streaming and download locators, in days
    #[arg(
        long,
        default_value_t = workflow::LOCATOR_DAYS,
        value_parser = clap::value_parser!(u64).range(1..=workflow::MAX_LOCATOR_DAYS)
    )]
    locator_days: u64,
    /// Create the encoded output asset with storage encryption
    #[arg(long)]
    storage_encrypted: bool,
    /// Publish only; do not download the output files
    #[arg(long)]
    skip_download: bool,
    /// Exit without waiting for Enter
    #[arg(long)]
    no_wait: bool,
    /// JSON config file with account_name / account_key
    #[arg(long)]
    config: Option<PathBuf>,
}

fn execute(cli: &Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    tracing::debug!(?settings, "settings loaded");

    let client = MediaServicesClient::connect(&settings)?;

    let output_options = if cli.storage_encrypted {
        AssetCreationOptions::StorageEncrypted
    } else {
        AssetCreationOptions::None
    };
    let plan = RunPlan {
        source: cli.source.clone(),
        encoding: Encoding {
            encoder: cli.encoder.clone(),
            preset: cli.preset.clone(),
            output_asset_name: cli.output_asset_name.clone(),
            options: output_options,
            poll_interval: settings.poll_interval,
        },
        locator_lifetime: workflow::days(cli.locator_days)?,
        output_folder: (!cli.skip_download).then(|| cli.output_folder.clone()),
    };

    let mut reporter = ConsoleReporter::new();
    workflow::run(&client, &plan, &mut reporter)?;
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let status = ui::run_and_report(|| execute(&cli));

    if !cli.no_wait {
        ui::wait_for_exit();
    }
    ExitCode::from(status)
}
