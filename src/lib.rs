// Library root
// -----------
// The binary (`main.rs`) parses arguments and runs the sample through
// these modules.
//
// Module responsibilities:
// - `config`: credentials and endpoints from the environment/config file.
// - `api`: blocking REST client for the media service and blob transfers.
// - `service`: the `MediaService` trait the workflow is written against.
// - `workflow`: upload, encode, publish and download steps.
// - `uris`: streaming and SAS download address construction.
// - `error`: service error parsing and workflow failures.
// - `ui`: console progress, error output and the exit prompt.
pub mod api;
pub mod config;
pub mod error;
pub mod service;
pub mod ui;
pub mod uris;
pub mod workflow;

/// Initialize tracing for the CLI. Defaults to `warn` so the sample's own
/// status lines are what the user sees; set `RUST_LOG` for more.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}
