// Workflow module: the four steps of the sample (upload, encode, publish,
// download) written against the `MediaService` trait. Each step returns
// what the next one needs; failures propagate to the caller untouched.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::api::{
    AccessPermissions, Asset, AssetCreationOptions, AssetFile, Job, JobRequest, JobState,
    JobStatus, Locator, LocatorType,
};
use crate::error::WorkflowError;
use crate::service::MediaService;
use crate::uris::{self, StreamingUris};

pub const STANDARD_ENCODER: &str = "Media Encoder Standard";
pub const BITRATE_PRESET: &str = "H264 Multiple Bitrate 720p";
pub const ADAPTIVE_BITRATE_OUTPUT: &str = "Adaptive Bitrate MP4";
pub const OUTPUT_FOLDER: &str = "Downloaded";
pub const LOCATOR_DAYS: u64 = 30;
/// Longest locator lifetime accepted on the command line (about ten years).
pub const MAX_LOCATOR_DAYS: u64 = 3650;
const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Receives progress and status from the workflow. The console UI is one
/// implementation; tests record calls instead.
pub trait Reporter {
    fn status(&mut self, line: &str);
    fn upload_progress(&mut self, file: &str, percent: f64);
    fn job_progress(&mut self, status: &JobStatus);
    fn published(&mut self, published: &PublishedAsset);
    fn download_progress(&mut self, file: &str, percent: f64);
}

/// Processor, preset and output naming for the transcoding job.
#[derive(Debug, Clone, PartialEq)]
pub struct Encoding {
    pub encoder: String,
    pub preset: String,
    pub output_asset_name: String,
    pub options: AssetCreationOptions,
    pub poll_interval: Duration,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding {
            encoder: STANDARD_ENCODER.into(),
            preset: BITRATE_PRESET.into(),
            output_asset_name: ADAPTIVE_BITRATE_OUTPUT.into(),
            options: AssetCreationOptions::None,
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// Output asset after publishing: its locators, files and addresses.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedAsset {
    pub asset: Asset,
    pub origin_locator: Locator,
    pub sas_locator: Locator,
    pub files: Vec<AssetFile>,
    /// `None` when the asset has no `.ism` manifest to stream from.
    pub streaming: Option<StreamingUris>,
    pub progressive_download: Vec<String>,
}

impl PublishedAsset {
    pub fn locators(&self) -> [&Locator; 2] {
        [&self.origin_locator, &self.sas_locator]
    }
}

/// One end-to-end run of the sample.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Uploaded in the clear; `encoding.options` applies to the output.
    pub source: PathBuf,
    pub encoding: Encoding,
    pub locator_lifetime: Duration,
    /// `None` skips the download step.
    pub output_folder: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub published: PublishedAsset,
    pub downloaded_to: Option<PathBuf>,
}

pub fn days(count: u64) -> Result<Duration> {
    count
        .checked_mul(SECONDS_PER_DAY)
        .map(Duration::from_secs)
        .with_context(|| format!("A lifetime of {} days is too long", count))
}

/// Upload a local file into a new asset.
pub fn upload_file<S: MediaService + ?Sized>(
    service: &S,
    path: &Path,
    options: AssetCreationOptions,
    reporter: &mut dyn Reporter,
) -> Result<Asset> {
    if !path.is_file() {
        return Err(WorkflowError::NotAFile(path.display().to_string()).into());
    }

    let asset = service
        .upload_asset(path, options, &mut |file, p| reporter.upload_progress(&file.name, p))
        .with_context(|| format!("Uploading {}", path.display()))?;

    info!(asset = %asset.id, "asset created");
    reporter.status(&format!("Asset {} created", asset.id));
    Ok(asset)
}

/// Poll a submitted job until it reaches a final state.
pub fn wait_for_job<S: MediaService + ?Sized>(
    service: &S,
    job: &Job,
    poll_interval: Duration,
    reporter: &mut dyn Reporter,
) -> Result<JobStatus> {
    loop {
        let status = service.job_status(&job.id)?;
        reporter.job_progress(&status);
        if status.state.is_final() {
            return Ok(status);
        }
        std::thread::sleep(poll_interval);
    }
}

/// Transcode `asset` with a single-task job and return the job's only
/// output asset.
pub fn encode_to_adaptive_bitrate_mp4<S: MediaService + ?Sized>(
    service: &S,
    asset: &Asset,
    encoding: &Encoding,
    reporter: &mut dyn Reporter,
) -> Result<Asset> {
    let processor = service.latest_media_processor(&encoding.encoder)?;
    let request = JobRequest {
        name: format!("Encoding {} to {}", asset.name, encoding.output_asset_name),
        processor_id: processor.id,
        configuration: encoding.preset.clone(),
        input_asset_id: asset.id.clone(),
        output_asset_name: encoding.output_asset_name.clone(),
        output_options: encoding.options,
    };

    reporter.status("Submitting transcoding job...");
    let job = service.submit_job(&request)?;
    info!(job = %job.id, processor = %encoding.encoder, preset = %encoding.preset, "job submitted");

    let status = wait_for_job(service, &job, encoding.poll_interval, reporter)?;
    if status.state != JobState::Finished {
        return Err(WorkflowError::JobFailed { job_id: job.id, state: status.state }.into());
    }
    reporter.status("Transcoding job finished");

    let mut outputs = service.job_output_assets(&job.id)?;
    if outputs.len() != 1 {
        return Err(WorkflowError::UnexpectedOutput { expected: 1, found: outputs.len() }.into());
    }
    Ok(outputs.remove(0))
}

/// Create an origin locator and a SAS locator on `asset` and derive the
/// streaming and progressive-download addresses.
pub fn publish_asset_get_urls<S: MediaService + ?Sized>(
    service: &S,
    asset: &Asset,
    lifetime: Duration,
) -> Result<PublishedAsset> {
    let policy = service.create_access_policy("StreamingPolicy", lifetime, AccessPermissions::READ)?;
    let origin_locator = service.create_locator(LocatorType::OnDemandOrigin, asset, &policy)?;
    let sas_locator = service.create_locator(LocatorType::Sas, asset, &policy)?;

    let files = service.asset_files(&asset.id)?;
    let streaming = uris::manifest_file(&files).map(|m| uris::streaming_uris(&origin_locator, m));
    let progressive_download = files
        .iter()
        .filter(|f| uris::is_mp4(&f.name))
        .map(|f| uris::sas_file_uri(&sas_locator.path, &f.name))
        .collect();

    info!(asset = %asset.id, files = files.len(), "asset published");
    Ok(PublishedAsset {
        asset: asset.clone(),
        origin_locator,
        sas_locator,
        files,
        streaming,
        progressive_download,
    })
}

/// Download every file of a published asset into `folder`, creating the
/// folder first when it does not exist. Returns the absolute folder path.
pub fn download_to_folder<S: MediaService + ?Sized>(
    service: &S,
    published: &PublishedAsset,
    folder: &Path,
    reporter: &mut dyn Reporter,
) -> Result<PathBuf> {
    std::fs::create_dir_all(folder)
        .with_context(|| format!("Failed to create output folder {}", folder.display()))?;

    reporter.status("Downloading output asset files to a local folder...");
    for file in &published.files {
        // Names come from the service; keep only the final component.
        let local_name = Path::new(&file.name)
            .file_name()
            .with_context(|| format!("Asset file name '{}' is not a file name", file.name))?;
        let destination = folder.join(local_name);
        let uri = uris::sas_file_uri(&published.sas_locator.path, &file.name);
        service
            .download_file(&uri, &destination, &mut |p| reporter.download_progress(&file.name, p))
            .with_context(|| format!("Downloading '{}'", file.name))?;
    }

    let absolute = std::fs::canonicalize(folder)
        .with_context(|| format!("Failed to resolve {}", folder.display()))?;
    reporter.status(&format!("Output asset files available at '{}'.", absolute.display()));
    Ok(absolute)
}

/// Upload, encode, publish and (optionally) download, in that order.
pub fn run<S: MediaService + ?Sized>(
    service: &S,
    plan: &RunPlan,
    reporter: &mut dyn Reporter,
) -> Result<RunOutcome> {
    let input_asset = upload_file(service, &plan.source, AssetCreationOptions::None, reporter)?;
    let encoded = encode_to_adaptive_bitrate_mp4(service, &input_asset, &plan.encoding, reporter)?;
    let published = publish_asset_get_urls(service, &encoded, plan.locator_lifetime)?;
    reporter.published(&published);

    let downloaded_to = match &plan.output_folder {
        Some(folder) => Some(download_to_folder(service, &published, folder, reporter)?),
        None => None,
    };

    Ok(RunOutcome { published, downloaded_to })
}
