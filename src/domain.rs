use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    Csv,
    Avro,
    Parquet,
}

impl StorageFormat {
    pub const ALL: [StorageFormat; 3] = [
        StorageFormat::Csv,
        StorageFormat::Avro,
        StorageFormat::Parquet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StorageFormat::Csv => "csv",
            StorageFormat::Avro => "avro",
            StorageFormat::Parquet => "parquet",
        }
    }

    pub fn extension(self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for StorageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageFormat {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "csv" => Ok(StorageFormat::Csv),
            "avro" => Ok(StorageFormat::Avro),
            "parquet" => Ok(StorageFormat::Parquet),
            _ => Err(HarvestError::InvalidFormat(value.to_string())),
        }
    }
}

/// Extension-less identity of a dataset file, shared by its csv, avro and parquet variants.
///
/// The base filename is cut at its *first* dot, so `a.b.csv` and `a.c.csv` map to the
/// same name. Existing ledgers depend on this rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CanonicalName(String);

impl CanonicalName {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn from_path(path: &Utf8Path) -> Self {
        let file_name = path.file_name().unwrap_or_default();
        let stem = file_name.split('.').next().unwrap_or_default();
        match path.parent() {
            Some(parent) if !parent.as_str().is_empty() => Self(parent.join(stem).into_string()),
            _ => Self(stem.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn with_extension(&self, format: StorageFormat) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}.{}", self.0, format.extension()))
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for GroupKey {
    fn from(year: u32) -> Self {
        Self(year.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteResource {
    pub url: String,
    /// `None` when the server sent no usable content-length.
    pub expected_length: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub url: String,
    pub local_path: Utf8PathBuf,
    pub group_key: GroupKey,
    pub progress_index: usize,
    pub progress_total: usize,
}

/// Links grouped by key, iterated in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkBatch {
    groups: Vec<(GroupKey, Vec<String>)>,
}

impl LinkBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds urls to a group, creating it at the end of the batch if it is new.
    pub fn insert(&mut self, group: GroupKey, urls: impl IntoIterator<Item = String>) {
        match self.groups.iter_mut().find(|(key, _)| *key == group) {
            Some((_, existing)) => existing.extend(urls),
            None => self.groups.push((group, urls.into_iter().collect())),
        }
    }

    pub fn groups(&self) -> impl Iterator<Item = (&GroupKey, &[String])> {
        self.groups.iter().map(|(key, urls)| (key, urls.as_slice()))
    }

    pub fn total_links(&self) -> usize {
        self.groups.iter().map(|(_, urls)| urls.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total_links() == 0
    }
}

/// Last path segment of a url, without query or fragment.
pub fn remote_file_name(url: &str) -> Result<&str, HarvestError> {
    let without_fragment = url.split('#').next().unwrap_or_default();
    let path = without_fragment.split('?').next().unwrap_or_default();
    let name = path
        .split_once("://")
        .and_then(|(_, rest)| rest.split_once('/'))
        .and_then(|(_, tail)| tail.rsplit('/').next())
        .unwrap_or_default();
    let stem = name.split('.').next().unwrap_or_default();
    if name == "." || name == ".." || stem.is_empty() {
        return Err(HarvestError::InvalidUrl(url.to_string()));
    }
    Ok(name)
}
