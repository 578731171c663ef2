// Wire types for the Media Services REST API.
//
// Entities arrive in OData verbose JSON with PascalCase property names.
// Enumerations travel as integers, so each enum converts to and from `i32`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// `{"d": {...}}` wrapper around a single entity.
#[derive(Deserialize, Debug)]
pub struct ODataEntity<T> {
    pub d: T,
}

/// `{"d": {"results": [...]}}` wrapper around an entity set.
#[derive(Deserialize, Debug)]
pub struct ODataList<T> {
    pub d: ODataResults<T>,
}

#[derive(Deserialize, Debug)]
pub struct ODataResults<T> {
    pub results: Vec<T>,
}

/// Token endpoint response.
#[derive(Deserialize, Debug)]
pub struct AccessToken {
    pub access_token: String,
}

macro_rules! int_enum {
    ($name:ident { $($variant:ident = $value:literal),+ $(,)? }) => {
        impl From<$name> for i32 {
            fn from(value: $name) -> i32 {
                value as i32
            }
        }

        impl TryFrom<i32> for $name {
            type Error = String;

            fn try_from(value: i32) -> Result<Self, String> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(format!("unknown {} value {}", stringify!($name), other)),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($name::$variant => f.write_str(stringify!($variant)),)+
                }
            }
        }
    };
}

/// Encryption applied to an asset when it is created.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(try_from = "i32", into = "i32")]
pub enum AssetCreationOptions {
    #[default]
    None = 0,
    StorageEncrypted = 1,
    CommonEncryptionProtected = 2,
    EnvelopeEncryptionProtected = 4,
}

int_enum!(AssetCreationOptions {
    None = 0,
    StorageEncrypted = 1,
    CommonEncryptionProtected = 2,
    EnvelopeEncryptionProtected = 4,
});

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "i32", into = "i32")]
pub enum JobState {
    Queued = 0,
    Scheduled = 1,
    Processing = 2,
    Finished = 3,
    Error = 4,
    Canceled = 5,
    Canceling = 6,
}

int_enum!(JobState {
    Queued = 0,
    Scheduled = 1,
    Processing = 2,
    Finished = 3,
    Error = 4,
    Canceled = 5,
    Canceling = 6,
});

impl JobState {
    /// A job in a final state will not change again.
    pub fn is_final(self) -> bool {
        matches!(self, JobState::Finished | JobState::Error | JobState::Canceled)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(try_from = "i32", into = "i32")]
pub enum LocatorType {
    Sas = 1,
    OnDemandOrigin = 2,
}

int_enum!(LocatorType {
    Sas = 1,
    OnDemandOrigin = 2,
});

/// Permission flags of an access policy.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(transparent)]
pub struct AccessPermissions(pub u32);

impl AccessPermissions {
    pub const READ: AccessPermissions = AccessPermissions(1);
    pub const WRITE: AccessPermissions = AccessPermissions(2);
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Asset {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub options: AssetCreationOptions,
    pub uri: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AssetFile {
    pub id: String,
    pub name: String,
    pub parent_asset_id: String,
    /// Int64 properties are serialized as strings in verbose JSON.
    pub content_file_size: Option<String>,
    #[serde(default)]
    pub is_primary: bool,
    pub mime_type: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AccessPolicy {
    pub id: String,
    pub name: String,
    pub duration_in_minutes: f64,
    pub permissions: AccessPermissions,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Locator {
    pub id: String,
    /// Base address: a streaming origin URL, or a storage container URL
    /// carrying the SAS query string.
    pub path: String,
    #[serde(rename = "Type")]
    pub locator_type: LocatorType,
    pub asset_id: String,
    pub access_policy_id: String,
    pub expiration_date_time: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MediaProcessor {
    pub id: String,
    pub name: String,
    pub version: String,
    pub vendor: Option<String>,
}

impl MediaProcessor {
    /// Dotted version split into numbers for ordering ("4.10" > "4.9").
    pub fn version_key(&self) -> Vec<u64> {
        self.version
            .split('.')
            .map(|part| part.trim().parse().unwrap_or(0))
            .collect()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub state: JobState,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub progress: f64,
}

/// Everything needed to create a job with a single task.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub name: String,
    pub processor_id: String,
    /// Preset name or preset document passed to the processor.
    pub configuration: String,
    pub input_asset_id: String,
    pub output_asset_name: String,
    pub output_options: AssetCreationOptions,
}

impl JobRequest {
    /// Task body binding the job's first input asset to its first output asset.
    pub fn task_body(&self) -> String {
        format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><taskBody><inputAsset>JobInputAsset(0)</inputAsset>\
             <outputAsset assetCreationOptions=\"{}\" assetName=\"{}\">JobOutputAsset(0)</outputAsset></taskBody>",
            i32::from(self.output_options),
            escape_xml_attr(&self.output_asset_name)
        )
    }
}

fn escape_xml_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Snapshot of a running job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobStatus {
    pub state: JobState,
    /// Mean progress of the job's tasks, 0..=100.
    pub progress: f64,
}

impl JobStatus {
    pub fn from_tasks(state: JobState, tasks: &[Task]) -> Self {
        let progress = if tasks.is_empty() {
            0.0
        } else {
            tasks.iter().map(|t| t.progress).sum::<f64>() / tasks.len() as f64
        };
        JobStatus { state, progress }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_state_decodes_from_integer() {
        let job: ODataEntity<Job> =
            serde_json::from_str(r#"{"d":{"__metadata":{},"Id":"nb:jid:1","Name":"j","State":3}}"#).unwrap();
        assert_eq!(job.d.state, JobState::Finished);
        assert!(job.d.state.is_final());
        assert!(serde_json::from_str::<JobState>("9").is_err());
        assert_eq!(JobState::Canceling.to_string(), "Canceling");
    }

    #[test]
    fn locator_reads_type_field() {
        let body = r#"{"d":{"results":[{"Id":"l1","Path":"https://acct.blob.core.windows.net/asset-1?sv=x","Type":1,"AssetId":"a1","AccessPolicyId":"p1","ExpirationDateTime":"/Date(0)/"}]}}"#;
        let list: ODataList<Locator> = serde_json::from_str(body).unwrap();
        assert_eq!(list.d.results.len(), 1);
        assert_eq!(list.d.results[0].locator_type, LocatorType::Sas);
    }

    #[test]
    fn asset_file_size_stays_a_string() {
        let file: AssetFile = serde_json::from_str(
            r#"{"Id":"f","Name":"a.mp4","ParentAssetId":"a","ContentFileSize":"2048","IsPrimary":true}"#,
        )
        .unwrap();
        assert_eq!(file.content_file_size.as_deref(), Some("2048"));
        assert!(file.is_primary);
    }

    #[test]
    fn error_state_converts_both_ways() {
        assert_eq!(JobState::try_from(4), Ok(JobState::Error));
        assert_eq!(i32::from(JobState::Error), 4);
        assert_eq!(serde_json::from_str::<JobState>("4").unwrap(), JobState::Error);
        assert_eq!(serde_json::to_string(&JobState::Canceled).unwrap(), "5");
        assert_eq!(
            JobState::try_from(7),
            Err("unknown JobState value 7".to_string())
        );
    }

    #[test]
    fn overall_progress_is_mean_of_tasks() {
        let tasks = vec![
            Task { id: "t1".into(), progress: 100.0 },
            Task { id: "t2".into(), progress: 50.0 },
        ];
        let status = JobStatus::from_tasks(JobState::Processing, &tasks);
        assert_eq!(status.progress, 75.0);
        assert_eq!(JobStatus::from_tasks(JobState::Queued, &[]).progress, 0.0);
    }

    #[test]
    fn processor_versions_compare_numerically() {
        let mp = |v: &str| MediaProcessor { id: v.into(), name: "n".into(), version: v.into(), vendor: None };
        assert!(mp("4.10").version_key() > mp("4.9").version_key());
    }

    #[test]
    fn permissions_serialize_as_integers() {
        assert_eq!(serde_json::to_string(&AccessPermissions::READ).unwrap(), "1");
        assert_eq!(serde_json::to_string(&AccessPermissions::WRITE).unwrap(), "2");
    }

    #[test]
    fn task_body_escapes_asset_name() {
        let req = JobRequest {
            name: "j".into(),
            processor_id: "p".into(),
            configuration: "H264 Multiple Bitrate 720p".into(),
            input_asset_id: "a".into(),
            output_asset_name: "A&B \"out\"".into(),
            output_options: AssetCreationOptions::StorageEncrypted,
        };
        let body = req.task_body();
        assert!(body.contains("assetName=\"A&amp;B &quot;out&quot;\""));
        assert!(body.contains("assetCreationOptions=\"1\""));
        assert!(body.contains("JobInputAsset(0)"));
    }
}
