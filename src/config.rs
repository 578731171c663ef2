// Configuration module: resolves the account credentials and service
// endpoints from environment variables and an optional JSON config file.
// Environment variables win over the file; the file wins over defaults.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_ACCOUNT_NAME: &str = "MEDIA_SERVICES_ACCOUNT_NAME";
pub const ENV_ACCOUNT_KEY: &str = "MEDIA_SERVICES_ACCOUNT_KEY";
pub const ENV_ACS_URL: &str = "MEDIA_SERVICES_ACS_URL";
pub const ENV_API_URL: &str = "MEDIA_SERVICES_API_URL";
pub const ENV_POLL_INTERVAL: &str = "MEDIA_SERVICES_POLL_INTERVAL_SECS";

pub const DEFAULT_ACS_ENDPOINT: &str =
    "https://wamsprodglobal001acs.accesscontrol.windows.net/v2/OAuth2-13";
pub const DEFAULT_ACS_SCOPE: &str = "urn:WindowsAzureMediaServices";
pub const DEFAULT_API_ENDPOINT: &str = "https://media.windows.net/API/";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shape of `config.json`. Every field is optional so a file may only
/// carry the credentials, or only override an endpoint.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    pub acs_endpoint: Option<String>,
    pub acs_scope: Option<String>,
    pub api_endpoint: Option<String>,
    pub poll_interval_secs: Option<u64>,
}

impl FileConfig {
    /// Parse a config file. The caller decides whether a missing file is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }
}

/// Fully resolved settings used to build the REST client.
#[derive(Clone)]
pub struct Settings {
    pub account_name: String,
    pub account_key: String,
    pub acs_endpoint: String,
    pub acs_scope: String,
    pub api_endpoint: String,
    pub poll_interval: Duration,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("acs_endpoint", &self.acs_endpoint)
            .field("acs_scope", &self.acs_scope)
            .field("api_endpoint", &self.api_endpoint)
            .field("poll_interval", &self.poll_interval)
            .finish()
    }
}

/// `<config dir>/mediasvc/config.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("mediasvc").join("config.json"))
}

impl Settings {
    /// Load settings from the process environment and the config file.
    /// An explicit `config_path` must exist; the default location may not.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let file = match config_path {
            Some(path) => FileConfig::load(path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => FileConfig::load(&path)?,
                _ => FileConfig::default(),
            },
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    /// Merge a parsed file with an environment lookup. Kept separate from
    /// `load` so tests can pass a fake environment.
    pub fn resolve<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |key: &str, from_file: Option<String>| {
            env(key).filter(|v| !v.trim().is_empty()).or(from_file)
        };

        let account_name = pick(ENV_ACCOUNT_NAME, file.account_name)
            .with_context(|| format!("Missing account name. Set {} or account_name in the config file", ENV_ACCOUNT_NAME))?;
        let account_key = pick(ENV_ACCOUNT_KEY, file.account_key)
            .with_context(|| format!("Missing account key. Set {} or account_key in the config file", ENV_ACCOUNT_KEY))?;

        let poll_secs = match env(ENV_POLL_INTERVAL) {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("{} must be a whole number of seconds", ENV_POLL_INTERVAL))?,
            ),
            None => file.poll_interval_secs,
        };
        let poll_interval = match poll_secs {
            Some(0) => bail!(
                "The poll interval must be at least one second. Check {} or poll_interval_secs in the config file",
                ENV_POLL_INTERVAL
            ),
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(Settings {
            account_name,
            account_key,
            acs_endpoint: pick(ENV_ACS_URL, file.acs_endpoint)
                .unwrap_or_else(|| DEFAULT_ACS_ENDPOINT.into()),
            acs_scope: file.acs_scope.unwrap_or_else(|| DEFAULT_ACS_SCOPE.into()),
            api_endpoint: pick(ENV_API_URL, file.api_endpoint)
                .unwrap_or_else(|| DEFAULT_API_ENDPOINT.into()),
            poll_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_file() {
        let file = FileConfig {
            account_name: Some("from-file".into()),
            account_key: Some("file-key".into()),
            ..Default::default()
        };
        let settings = Settings::resolve(file, env_of(&[(ENV_ACCOUNT_NAME, "from-env")])).unwrap();
        assert_eq!(settings.account_name, "from-env");
        assert_eq!(settings.account_key, "file-key");
        assert_eq!(settings.api_endpoint, DEFAULT_API_ENDPOINT);
        assert_eq!(settings.poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn missing_key_names_the_variable() {
        let err = Settings::resolve(FileConfig::default(), env_of(&[(ENV_ACCOUNT_NAME, "acct")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_ACCOUNT_KEY));
    }

    #[test]
    fn blank_env_value_falls_back_to_file() {
        let file = FileConfig {
            account_name: Some("acct".into()),
            account_key: Some("key".into()),
            api_endpoint: Some("https://example.test/api/".into()),
            poll_interval_secs: Some(1),
            ..Default::default()
        };
        let settings = Settings::resolve(file, env_of(&[(ENV_API_URL, "  ")])).unwrap();
        assert_eq!(settings.api_endpoint, "https://example.test/api/");
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn bad_poll_interval_is_an_error() {
        let env = env_of(&[
            (ENV_ACCOUNT_NAME, "acct"),
            (ENV_ACCOUNT_KEY, "key"),
            (ENV_POLL_INTERVAL, "soon"),
        ]);
        assert!(Settings::resolve(FileConfig::default(), env).is_err());
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let env = env_of(&[
            (ENV_ACCOUNT_NAME, "acct"),
            (ENV_ACCOUNT_KEY, "key"),
            (ENV_POLL_INTERVAL, "0"),
        ]);
        let err = Settings::resolve(FileConfig::default(), env).unwrap_err();
        assert!(err.to_string().contains("at least one second"));

        let file = FileConfig {
            account_name: Some("acct".into()),
            account_key: Some("key".into()),
            poll_interval_secs: Some(0),
            ..Default::default()
        };
        assert!(Settings::resolve(file, env_of(&[])).is_err());
    }

    #[test]
    fn debug_redacts_key() {
        let env = env_of(&[(ENV_ACCOUNT_NAME, "acct"), (ENV_ACCOUNT_KEY, "s3cret")]);
        let settings = Settings::resolve(FileConfig::default(), env).unwrap();
        let shown = format!("{:?}", settings);
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("<redacted>"));
    }

    #[test]
    fn file_config_parses_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"account_name":"acct","account_key":"k","poll_interval_secs":2}"#).unwrap();
        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.account_name.as_deref(), Some("acct"));
        assert_eq!(file.poll_interval_secs, Some(2));

        std::fs::write(&path, "not json").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }
}
