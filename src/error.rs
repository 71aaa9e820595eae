use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("resource unreachable: {url}: {message}")]
    UnreachableResource { url: String, message: String },

    #[error("transfer failed: {url}: {message}")]
    #[diagnostic(help("the partial file was kept; run the download again to resume"))]
    TransferError { url: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("invalid storage format: {0} (expected csv, avro or parquet)")]
    InvalidFormat(String),

    #[error("corrupt ledger {path} line {line}: {content:?}")]
    LedgerCorruption {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read link manifest at {0}")]
    ManifestRead(PathBuf),

    #[error("failed to parse link manifest: {0}")]
    ManifestParse(String),

    #[error("invalid download url: {0}")]
    InvalidUrl(String),
}

impl HarvestError {
    /// Failures that only affect the resource being fetched; a batch keeps going after them.
    pub fn is_per_resource(&self) -> bool {
        matches!(
            self,
            HarvestError::UnreachableResource { .. }
                | HarvestError::TransferError { .. }
                | HarvestError::InvalidUrl(_)
        )
    }
}
