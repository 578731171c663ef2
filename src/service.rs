// The operations the workflow needs from the remote service. The REST
// client implements this trait; tests drive the workflow with a fake.

use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use crate::api::{
    AccessPermissions, AccessPolicy, Asset, AssetCreationOptions, AssetFile, Job, JobRequest,
    JobStatus, Locator, LocatorType, MediaProcessor,
};

pub trait MediaService {
    /// Create a new asset from a local file, reporting upload percentage.
    fn upload_asset(
        &self,
        path: &Path,
        options: AssetCreationOptions,
        on_progress: &mut dyn FnMut(&AssetFile, f64),
    ) -> Result<Asset>;

    /// Newest version of the processor registered under `name`.
    fn latest_media_processor(&self, name: &str) -> Result<MediaProcessor>;

    fn submit_job(&self, request: &JobRequest) -> Result<Job>;

    fn job_status(&self, job_id: &str) -> Result<JobStatus>;

    fn job_output_assets(&self, job_id: &str) -> Result<Vec<Asset>>;

    fn create_access_policy(
        &self,
        name: &str,
        duration: Duration,
        permissions: AccessPermissions,
    ) -> Result<AccessPolicy>;

    fn create_locator(
        &self,
        locator_type: LocatorType,
        asset: &Asset,
        policy: &AccessPolicy,
    ) -> Result<Locator>;

    fn asset_files(&self, asset_id: &str) -> Result<Vec<AssetFile>>;

    /// Fetch `uri` into `destination`, returning the byte count.
    fn download_file(
        &self,
        uri: &str,
        destination: &Path,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<u64>;
}
