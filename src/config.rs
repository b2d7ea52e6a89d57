use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::DlsError;

pub const DEFAULT_CONFIG_FILE: &str = "fandango-dls.json";
pub const DEFAULT_SMARTEM_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_ARIA_API_URL: &str = "https://aria.services.instruct-eric.org/api/v1";
pub const DEFAULT_ARIA_TOKEN_URL: &str = "https://aria.services.instruct-eric.org/oauth2/token";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub smartem: SmartemSection,
    #[serde(default)]
    pub aria: AriaSection,
    #[serde(default)]
    pub database: DatabaseSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct SmartemSection {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct AriaSection {
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct DatabaseSection {
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SmartemSettings {
    pub api_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AriaCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone)]
pub struct AriaSettings {
    pub api_url: String,
    pub token_url: String,
    pub timeout: Duration,
    /// `None` when no client credentials are configured; deposition is then unavailable.
    pub credentials: Option<AriaCredentials>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub smartem: SmartemSettings,
    pub aria: AriaSettings,
    pub database_path: Utf8PathBuf,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads the config file (explicit path or `fandango-dls.json` in the current
    /// directory) and applies environment overrides. A missing default file means
    /// "all defaults"; a missing explicit file is an error.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, DlsError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| DlsError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content).map_err(|err| DlsError::ConfigParse(err.to_string()))?
        };

        Self::resolve_config(config, |name| std::env::var(name).ok())
    }

    pub fn resolve_config<E>(config: Config, env: E) -> Result<ResolvedConfig, DlsError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(name).filter(|value| !value.trim().is_empty());

        let smartem = SmartemSettings {
            api_url: lookup("SMARTEM_API_URL")
                .or(config.smartem.api_url)
                .unwrap_or_else(|| DEFAULT_SMARTEM_API_URL.to_string()),
            timeout: timeout(config.smartem.timeout_secs),
        };

        let client_id = lookup("ARIA_CLIENT_ID").or(config.aria.client_id);
        let client_secret = lookup("ARIA_CLIENT_SECRET").or(config.aria.client_secret);
        let credentials = match (client_id, client_secret) {
            (Some(client_id), Some(client_secret)) => Some(AriaCredentials {
                client_id,
                client_secret,
            }),
            _ => None,
        };
        let aria = AriaSettings {
            api_url: config
                .aria
                .api_url
                .unwrap_or_else(|| DEFAULT_ARIA_API_URL.to_string()),
            token_url: config
                .aria
                .token_url
                .unwrap_or_else(|| DEFAULT_ARIA_TOKEN_URL.to_string()),
            timeout: timeout(config.aria.timeout_secs),
            credentials,
        };

        let database_path = match lookup("FANDANGO_DB").or(config.database.path) {
            Some(path) => Utf8PathBuf::from(path),
            None => default_database_path()?,
        };

        Ok(ResolvedConfig {
            smartem,
            aria,
            database_path,
        })
    }
}

/// A missing or zero timeout falls back to the default.
fn timeout(secs: Option<u64>) -> Duration {
    Duration::from_secs(secs.filter(|secs| *secs > 0).unwrap_or(DEFAULT_TIMEOUT_SECS))
}

pub fn default_database_path() -> Result<Utf8PathBuf, DlsError> {
    ProjectDirs::from("org", "fandango", "fandango-dls")
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.data_dir().join("fandango.db")).ok())
        .ok_or_else(|| DlsError::Filesystem("unable to resolve data directory".to_string()))
}
