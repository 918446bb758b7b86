//! Remote server settings.
//!
//! Each setting is taken from the first of: explicit argument,
//! environment variable, `~/.config/ai-models/api.yaml`, built-in default.

use std::env;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::error::{RemoteError, Result};

pub const API_URL: &str = "https://ai-models.ecmwf.int/api/v1/";
pub const URL_ENV: &str = "AI_MODELS_REMOTE_URL";
pub const TOKEN_ENV: &str = "AI_MODELS_REMOTE_TOKEN";

/// Contents of `api.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiFile {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

impl ApiFile {
    /// Read `path`, first writing an empty template if it does not exist.
    /// Unreadable files are logged and treated as empty.
    pub fn load_or_create(path: &Path) -> Self {
        if !path.exists() {
            if let Err(e) = create_template(path) {
                error!(path = %path.display(), error = %e, "Failed to create config");
            }
        }
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text).unwrap_or_else(|e| {
                error!(path = %path.display(), error = %e, "Failed to read config");
                Self::default()
            }),
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read config");
                Self::default()
            }
        }
    }

    pub fn parse(text: &str) -> std::result::Result<Self, serde_yaml::Error> {
        // An empty document is a valid, empty config.
        Ok(serde_yaml::from_str::<Option<ApiFile>>(text)?.unwrap_or_default())
    }
}

fn create_template(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("token: \nurl: {}\n", API_URL))?;
    debug!(path = %path.display(), "Created config template");
    Ok(())
}

/// `$HOME/.config/ai-models/api.yaml`.
pub fn config_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| {
        PathBuf::from(home)
            .join(".config")
            .join("ai-models")
            .join("api.yaml")
    })
}

/// Every place a setting can come from, highest priority first.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub url_arg: Option<String>,
    pub token_arg: Option<String>,
    pub url_env: Option<String>,
    pub token_env: Option<String>,
    pub file: ApiFile,
    /// Shown in the missing-token message.
    pub config_path: String,
}

impl ConfigSources {
    /// Arguments plus the process environment and the user's config file.
    pub fn gather(url: Option<String>, token: Option<String>) -> Self {
        let path = config_path();
        let file = path
            .as_deref()
            .map(ApiFile::load_or_create)
            .unwrap_or_default();
        Self {
            url_arg: url,
            token_arg: token,
            url_env: env::var(URL_ENV).ok(),
            token_env: env::var(TOKEN_ENV).ok(),
            file,
            config_path: path
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "~/.config/ai-models/api.yaml".to_string()),
        }
    }
}

/// Settings for talking to the remote server.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL, always ending with `/`.
    pub url: Url,
    pub token: String,
    /// Per-attempt HTTP timeout.
    pub timeout: Duration,
    /// Longest wait between automatic retries.
    pub retry_after: Duration,
    pub max_retries: u32,
    /// Fixed wait between job status polls.
    pub poll_interval: Duration,
}

impl RemoteConfig {
    /// Resolve settings from arguments, environment and config file.
    pub fn resolve(url: Option<String>, token: Option<String>) -> Result<Self> {
        Self::from_sources(ConfigSources::gather(url, token))
    }

    pub fn from_sources(sources: ConfigSources) -> Result<Self> {
        let non_empty = |v: &Option<String>| v.as_ref().filter(|s| !s.trim().is_empty()).cloned();

        let mut url = non_empty(&sources.url_arg)
            .or_else(|| non_empty(&sources.url_env))
            .or_else(|| non_empty(&sources.file.url))
            .unwrap_or_else(|| API_URL.to_string());
        if !url.ends_with('/') {
            url.push('/');
        }
        let url = Url::parse(&url).map_err(|e| RemoteError::Config(format!("url '{}': {}", url, e)))?;
        ensure_secure(&url)?;

        let token = non_empty(&sources.token_arg)
            .or_else(|| non_empty(&sources.token_env))
            .or_else(|| non_empty(&sources.file.token))
            .ok_or(RemoteError::MissingToken {
                config_path: sources.config_path,
            })?;

        info!(url = %url, "Using remote server");
        Ok(Self {
            url,
            token,
            timeout: Duration::from_secs(300),
            retry_after: Duration::from_secs(30),
            max_retries: 10,
            poll_interval: Duration::from_secs(5),
        })
    }
}

/// Tokens only travel over HTTPS; plain HTTP is allowed for loopback
/// hosts.
fn ensure_secure(url: &Url) -> Result<()> {
    if url.scheme() == "https" {
        return Ok(());
    }
    let loopback = match url.host_str() {
        Some("localhost") => true,
        Some(host) => host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false),
        None => false,
    };
    if url.scheme() == "http" && loopback {
        return Ok(());
    }
    Err(RemoteError::InsecureUrl(url.to_string()))
}
