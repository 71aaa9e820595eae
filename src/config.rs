use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::{GroupKey, LinkBatch};
use crate::error::HarvestError;

pub const DEFAULT_CONFIG_FILE: &str = "tlc-harvest.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub download_root: Option<String>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<usize>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSettings {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_retries: usize,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
            max_retries: 3,
            user_agent: format!("tlc-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub download_root: Utf8PathBuf,
    pub http: HttpSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `tlc-harvest.json` when present, or falls back to defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        let defaults = HttpSettings::default();
        let download_root = config
            .download_root
            .unwrap_or_else(default_download_root);
        if download_root.trim().is_empty() {
            return Err(HarvestError::ConfigParse(
                "download_root must not be empty".to_string(),
            ));
        }

        let http = HttpSettings {
            connect_timeout_secs: positive_secs(
                "connect_timeout_secs",
                config.connect_timeout_secs,
                defaults.connect_timeout_secs,
            )?,
            read_timeout_secs: positive_secs(
                "read_timeout_secs",
                config.read_timeout_secs,
                defaults.read_timeout_secs,
            )?,
            max_retries: config.max_retries.unwrap_or(defaults.max_retries),
            user_agent: config.user_agent.unwrap_or(defaults.user_agent),
        };

        Ok(ResolvedConfig {
            download_root: Utf8PathBuf::from(download_root),
            http,
        })
    }
}

pub fn default_download_root() -> String {
    "./records".to_string()
}

fn positive_secs(field: &str, value: Option<u64>, default: u64) -> Result<u64, HarvestError> {
    match value {
        Some(0) => Err(HarvestError::ConfigParse(format!(
            "{field} must be greater than zero"
        ))),
        Some(value) => Ok(value),
        None => Ok(default),
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(untagged)]
pub enum GroupValue {
    Year(u32),
    Text(String),
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ManifestGroup {
    pub group: GroupValue,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// Resolved download links, as produced by the link-discovery step.
pub struct LinkManifest;

impl LinkManifest {
    pub fn load(path: &Path) -> Result<LinkBatch, HarvestError> {
        let content = fs::read_to_string(path)
            .map_err(|_| HarvestError::ManifestRead(path.to_path_buf()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<LinkBatch, HarvestError> {
        let groups: Vec<ManifestGroup> = serde_json::from_str(content)
            .map_err(|err| HarvestError::ManifestParse(err.to_string()))?;
        let mut batch = LinkBatch::new();
        for entry in groups {
            let key = match entry.group {
                GroupValue::Year(year) => GroupKey::from(year),
                GroupValue::Text(text) => {
                    let text = text.trim();
                    if text.is_empty() || text.contains(['/', '\\']) || text == ".." {
                        return Err(HarvestError::ManifestParse(format!(
                            "invalid group key: {text:?}"
                        )));
                    }
                    GroupKey::new(text)
                }
            };
            batch.insert(key, entry.urls);
        }
        Ok(batch)
    }
}
