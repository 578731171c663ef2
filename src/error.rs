// Error types surfaced by the REST client and the workflow.
//
// The service answers failures with several body shapes: OData verbose JSON
// from the REST API, OAuth-style JSON from the token endpoint, and XML from
// both the OData layer and blob storage. `ServiceError::parse` turns any of
// them into a single readable message.

use regex::Regex;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::OnceLock;
use thiserror::Error;

use crate::api::{AssetCreationOptions, JobState};

/// Failure reported by the remote service.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message} (HTTP {status}{})", .code.as_deref().map(|c| format!(", code {}", c)).unwrap_or_default())]
pub struct ServiceError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
}

/// Failures detected by the workflow itself rather than the transport.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Job {job_id} did not finish successfully: final state {state}")]
    JobFailed { job_id: String, state: JobState },
    #[error("Expected {expected} output asset(s) from the job but found {found}")]
    UnexpectedOutput { expected: usize, found: usize },
    #[error("{0} is not a file")]
    NotAFile(String),
    #[error("Uploading with asset options {0} is not supported; only the encoded output can be encrypted")]
    UnsupportedUploadOptions(AssetCreationOptions),
}

#[derive(Deserialize)]
struct ODataErrorBody {
    error: ODataError,
}

#[derive(Deserialize)]
struct ODataError {
    code: Option<String>,
    message: ODataMessage,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ODataMessage {
    Localized { value: String },
    Plain(String),
}

#[derive(Deserialize)]
struct TokenErrorBody {
    error: String,
    error_description: Option<String>,
}

fn xml_element(name: &str) -> &'static Regex {
    static MESSAGE: OnceLock<Regex> = OnceLock::new();
    static CODE: OnceLock<Regex> = OnceLock::new();
    let cell = if name == "message" { &MESSAGE } else { &CODE };
    cell.get_or_init(|| {
        let pattern = format!(r"(?is)<(?:\w+:)?{0}\b[^>]*>(.*?)</(?:\w+:)?{0}>", name);
        Regex::new(&pattern).expect("static regex")
    })
}

fn xml_text(body: &str, name: &str) -> Option<String> {
    let raw = xml_element(name).captures(body)?.get(1)?.as_str().trim();
    if raw.is_empty() {
        return None;
    }
    Some(
        raw.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&amp;", "&"),
    )
}

impl ServiceError {
    /// Build an error from a non-success response body.
    pub fn parse(status: StatusCode, body: &str) -> Self {
        let status_code = status.as_u16();
        let trimmed = body.trim();

        if let Ok(odata) = serde_json::from_str::<ODataErrorBody>(trimmed) {
            let message = match odata.error.message {
                ODataMessage::Localized { value } => value,
                ODataMessage::Plain(value) => value,
            };
            return ServiceError { status: status_code, code: odata.error.code.filter(|c| !c.is_empty()), message };
        }

        if let Ok(token) = serde_json::from_str::<TokenErrorBody>(trimmed) {
            return ServiceError {
                status: status_code,
                message: token.error_description.unwrap_or_else(|| token.error.clone()),
                code: Some(token.error),
            };
        }

        if trimmed.starts_with('<') {
            if let Some(message) = xml_text(trimmed, "message") {
                return ServiceError { status: status_code, code: xml_text(trimmed, "code"), message };
            }
        }

        let message = if trimmed.is_empty() {
            status.canonical_reason().unwrap_or("Unknown error").to_string()
        } else {
            trimmed.to_string()
        };
        ServiceError { status: status_code, code: None, message }
    }
}
