// API client module: a blocking HTTP client for the Media Services REST
// API. It authenticates with the account name/key, discovers the cluster
// endpoint and exposes one method per entity operation the CLI needs.

pub mod blob;
mod models;

pub use models::*;

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::WorkflowError;
use crate::service::MediaService;
use crate::uris;

const API_VERSION: &str = "2.19";
const ODATA_VERBOSE: &str = "application/json;odata=verbose";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Locators start slightly in the past to absorb clock skew.
const LOCATOR_START_SKEW_MINUTES: i64 = 5;
/// Lifetime of the temporary write locator used during upload.
const UPLOAD_POLICY_DURATION: Duration = Duration::from_secs(12 * 60 * 60);

/// Authenticated client bound to one account's API endpoint.
#[derive(Clone)]
pub struct MediaServicesClient {
    http: Client,
    api_base: String,
    token: String,
}

fn with_trailing_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "wmv" => "video/x-ms-wmv",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        _ => "application/octet-stream",
    }
}

impl MediaServicesClient {
    /// Authenticate against the token endpoint and resolve the API endpoint.
    pub fn connect(settings: &Settings) -> Result<Self> {
        // Redirects are handled by hand: the API answers the global endpoint
        // with a redirect to the account's cluster, and the bearer token
        // must follow it.
        let http = Client::builder()
            .redirect(Policy::none())
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        let token = Self::fetch_token(&http, settings)?;
        let api_base = Self::resolve_endpoint(&http, &settings.api_endpoint, &token)?;
        info!(endpoint = %api_base, "connected to media services");

        Ok(MediaServicesClient { http, api_base, token })
    }

    fn fetch_token(http: &Client, settings: &Settings) -> Result<String> {
        debug!(endpoint = %settings.acs_endpoint, "requesting access token");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", settings.account_name.as_str()),
            ("client_secret", settings.account_key.as_str()),
            ("scope", settings.acs_scope.as_str()),
        ];
        let res = http
            .post(&settings.acs_endpoint)
            .form(&form)
            .send()
            .context("Failed to send token request")?;
        let res = blob::ensure_success(res).context("Authentication failed")?;
        let token: AccessToken = res.json().context("Parsing token response json")?;
        Ok(token.access_token)
    }

    fn resolve_endpoint(http: &Client, endpoint: &str, token: &str) -> Result<String> {
        let endpoint = with_trailing_slash(endpoint);
        let res = http
            .get(&endpoint)
            .headers(Self::odata_headers(token)?)
            .send()
            .context("Failed to reach media services endpoint")?;

        if res.status().is_redirection() {
            let location = res
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .context("Redirect without a Location header")?;
            debug!(from = %endpoint, to = %location, "api endpoint redirected");
            return Ok(with_trailing_slash(location));
        }
        blob::ensure_success(res)?;
        Ok(endpoint)
    }

    fn odata_headers(token: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", token)).context("Invalid access token")?,
        );
        headers.insert("x-ms-version", HeaderValue::from_static(API_VERSION));
        headers.insert("dataserviceversion", HeaderValue::from_static("3.0"));
        headers.insert("maxdataserviceversion", HeaderValue::from_static("3.0"));
        headers.insert(ACCEPT, HeaderValue::from_static(ODATA_VERBOSE));
        Ok(headers)
    }

    /// Base URL of the resolved cluster endpoint, ending in `/`.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn set_url(&self, set: &str) -> String {
        format!("{}{}", self.api_base, set)
    }

    fn entity_url(&self, set: &str, id: &str) -> String {
        format!("{}{}('{}')", self.api_base, set, urlencoding::encode(id))
    }

    fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        debug!(%method, %url, "odata request");
        Ok(self.http.request(method, url).headers(Self::odata_headers(&self.token)?))
    }

    fn send(&self, req: RequestBuilder) -> Result<Response> {
        let res = req.send().context("Failed to send request")?;
        blob::ensure_success(res)
    }

    fn get_entity<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let res = self.send(self.request(Method::GET, url)?)?;
        let body: ODataEntity<T> = res.json().context("Parsing entity json")?;
        Ok(body.d)
    }

    fn get_list<T: DeserializeOwned>(&self, url: &str) -> Result<Vec<T>> {
        let res = self.send(self.request(Method::GET, url)?)?;
        let body: ODataList<T> = res.json().context("Parsing entity set json")?;
        Ok(body.d.results)
    }

    fn post_entity<T: DeserializeOwned>(&self, set: &str, payload: &serde_json::Value) -> Result<T> {
        let req = self
            .request(Method::POST, &self.set_url(set))?
            .header(CONTENT_TYPE, ODATA_VERBOSE)
            .json(payload);
        let res = self.send(req)?;
        let body: ODataEntity<T> = res
            .json()
            .with_context(|| format!("Parsing created {} json", set))?;
        Ok(body.d)
    }

    fn delete_entity(&self, set: &str, id: &str) -> Result<()> {
        self.send(self.request(Method::DELETE, &self.entity_url(set, id))?)?;
        Ok(())
    }

    pub fn create_asset(&self, name: &str, options: AssetCreationOptions) -> Result<Asset> {
        self.post_entity("Assets", &json!({ "Name": name, "Options": i32::from(options) }))
    }

    pub fn create_asset_file(&self, asset: &Asset, name: &str, mime_type: &str) -> Result<AssetFile> {
        self.post_entity(
            "Files",
            &json!({
                "IsEncrypted": "false",
                "IsPrimary": "true",
                "MimeType": mime_type,
                "Name": name,
                "ParentAssetId": asset.id,
            }),
        )
    }

    /// Record the uploaded size on the file entity (OData `MERGE`).
    pub fn update_file_size(&self, file: &AssetFile, size: u64) -> Result<()> {
        let merge = Method::from_bytes(b"MERGE").context("Invalid MERGE method")?;
        let req = self
            .request(merge, &self.entity_url("Files", &file.id))?
            .header(CONTENT_TYPE, ODATA_VERBOSE)
            .json(&json!({ "ContentFileSize": size.to_string() }));
        self.send(req)?;
        Ok(())
    }

    pub fn create_access_policy(
        &self,
        name: &str,
        duration: Duration,
        permissions: AccessPermissions,
    ) -> Result<AccessPolicy> {
        let minutes = duration.as_secs_f64() / 60.0;
        self.post_entity(
            "AccessPolicies",
            &json!({
                "Name": name,
                "DurationInMinutes": minutes.to_string(),
                "Permissions": permissions.0,
            }),
        )
    }

    pub fn delete_access_policy(&self, policy: &AccessPolicy) -> Result<()> {
        self.delete_entity("AccessPolicies", &policy.id)
    }

    pub fn create_locator(
        &self,
        locator_type: LocatorType,
        asset: &Asset,
        policy: &AccessPolicy,
    ) -> Result<Locator> {
        let start = Utc::now() - ChronoDuration::minutes(LOCATOR_START_SKEW_MINUTES);
        self.post_entity(
            "Locators",
            &json!({
                "AccessPolicyId": policy.id,
                "AssetId": asset.id,
                "StartTime": start.format("%Y-%m-%dT%H:%M:%S").to_string(),
                "Type": i32::from(locator_type),
            }),
        )
    }

    pub fn delete_locator(&self, locator: &Locator) -> Result<()> {
        self.delete_entity("Locators", &locator.id)
    }

    pub fn asset_files(&self, asset_id: &str) -> Result<Vec<AssetFile>> {
        self.get_list(&format!("{}/Files", self.entity_url("Assets", asset_id)))
    }

    pub fn media_processors(&self, name: &str) -> Result<Vec<MediaProcessor>> {
        let filter = format!("Name eq '{}'", name.replace('\'', "''"));
        let req = self
            .request(Method::GET, &self.set_url("MediaProcessors()"))?
            .query(&[("$filter", filter.as_str())]);
        let res = self.send(req)?;
        let body: ODataList<MediaProcessor> = res.json().context("Parsing media processors json")?;
        Ok(body.d.results)
    }

    pub fn create_job(&self, request: &JobRequest) -> Result<Job> {
        let input_uri = self.entity_url("Assets", &request.input_asset_id);
        self.post_entity(
            "Jobs",
            &json!({
                "Name": request.name,
                "InputMediaAssets": [{ "__metadata": { "uri": input_uri } }],
                "Tasks": [{
                    "Configuration": request.configuration,
                    "MediaProcessorId": request.processor_id,
                    "TaskBody": request.task_body(),
                }],
            }),
        )
    }

    pub fn get_job(&self, job_id: &str) -> Result<Job> {
        self.get_entity(&self.entity_url("Jobs", job_id))
    }

    pub fn job_tasks(&self, job_id: &str) -> Result<Vec<Task>> {
        self.get_list(&format!("{}/Tasks", self.entity_url("Jobs", job_id)))
    }

    pub fn job_output_assets(&self, job_id: &str) -> Result<Vec<Asset>> {
        self.get_list(&format!("{}/OutputMediaAssets", self.entity_url("Jobs", job_id)))
    }
}

impl MediaService for MediaServicesClient {
    /// Create an asset holding one file: asset and file records, a
    /// temporary write locator, the block upload, then the size update.
    fn upload_asset(
        &self,
        path: &Path,
        options: AssetCreationOptions,
        on_progress: &mut dyn FnMut(&AssetFile, f64),
    ) -> Result<Asset> {
        // Client-side encryption with a content key is not implemented, so
        // only plain uploads are accepted.
        if options != AssetCreationOptions::None {
            return Err(WorkflowError::UnsupportedUploadOptions(options).into());
        }
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("{} has no usable file name", path.display()))?;

        let asset = self.create_asset(file_name, options)?;
        let file = self.create_asset_file(&asset, file_name, guess_mime_type(path))?;

        let policy = MediaServicesClient::create_access_policy(
            self,
            "AssetUploadPolicy",
            UPLOAD_POLICY_DURATION,
            AccessPermissions::WRITE,
        )?;
        let locator = MediaServicesClient::create_locator(self, LocatorType::Sas, &asset, &policy)?;

        let blob_uri = uris::sas_file_uri(&locator.path, file_name);
        let size = blob::upload_block_blob(
            &self.http,
            &blob_uri,
            path,
            guess_mime_type(path),
            &mut |p| on_progress(&file, p),
        )?;
        self.update_file_size(&file, size)?;

        self.delete_locator(&locator)?;
        self.delete_access_policy(&policy)?;
        Ok(asset)
    }

    fn latest_media_processor(&self, name: &str) -> Result<MediaProcessor> {
        self.media_processors(name)?
            .into_iter()
            .max_by_key(|mp| mp.version_key())
            .with_context(|| format!("Unknown media processor '{}'", name))
    }

    fn submit_job(&self, request: &JobRequest) -> Result<Job> {
        self.create_job(request)
    }

    fn job_status(&self, job_id: &str) -> Result<JobStatus> {
        let job = self.get_job(job_id)?;
        let tasks = self.job_tasks(job_id)?;
        Ok(JobStatus::from_tasks(job.state, &tasks))
    }

    fn job_output_assets(&self, job_id: &str) -> Result<Vec<Asset>> {
        MediaServicesClient::job_output_assets(self, job_id)
    }

    fn create_access_policy(
        &self,
        name: &str,
        duration: Duration,
        permissions: AccessPermissions,
    ) -> Result<AccessPolicy> {
        MediaServicesClient::create_access_policy(self, name, duration, permissions)
    }

    fn create_locator(
        &self,
        locator_type: LocatorType,
        asset: &Asset,
        policy: &AccessPolicy,
    ) -> Result<Locator> {
        MediaServicesClient::create_locator(self, locator_type, asset, policy)
    }

    fn asset_files(&self, asset_id: &str) -> Result<Vec<AssetFile>> {
        MediaServicesClient::asset_files(self, asset_id)
    }

    fn download_file(
        &self,
        uri: &str,
        destination: &Path,
        on_progress: &mut dyn FnMut(f64),
    ) -> Result<u64> {
        blob::download_blob(&self.http, uri, destination, on_progress)
    }
}
