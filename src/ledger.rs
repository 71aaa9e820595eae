//! Per-directory record of the format each dataset file is currently stored in.
//!
//! The on-disk form is `<dir>/log.txt` with one `"<canonical_name>: <format>"` line per
//! entry. The ledger is read fully into memory and every mutation rewrites the file
//! through a temp file and a rename, so a crash leaves either the old or the new ledger.

use std::fs::{self, OpenOptions};
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::debug;

use crate::domain::{CanonicalName, StorageFormat};
use crate::error::HarvestError;

pub const LEDGER_FILE: &str = "log.txt";

const SEPARATOR: &str = ": ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub canonical_name: CanonicalName,
    pub format: StorageFormat,
}

impl LedgerEntry {
    pub fn new(canonical_name: CanonicalName, format: StorageFormat) -> Self {
        Self {
            canonical_name,
            format,
        }
    }

    fn to_line(&self) -> String {
        format!("{}{SEPARATOR}{}\n", self.canonical_name, self.format)
    }
}

#[derive(Debug, Clone)]
pub struct Ledger {
    path: Utf8PathBuf,
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    pub fn path_in(dir: &Utf8Path) -> Utf8PathBuf {
        dir.join(LEDGER_FILE)
    }

    /// Loads the ledger of `dir`; a missing file yields an empty ledger.
    pub fn open(dir: &Utf8Path) -> Result<Self, HarvestError> {
        let path = Self::path_in(dir);
        if !path.as_std_path().exists() {
            return Ok(Self {
                path,
                entries: Vec::new(),
            });
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("read ledger {path}: {err}")))?;
        let mut entries = Vec::new();
        for (index, line) in content.lines().enumerate() {
            if let Some(entry) = parse_line(&path, index + 1, line)? {
                entries.push(entry);
            }
        }
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn format_of(&self, name: &CanonicalName) -> Option<StorageFormat> {
        self.entries
            .iter()
            .find(|entry| entry.canonical_name == *name)
            .map(|entry| entry.format)
    }

    /// Updates the entry for `name` in place or appends a new one. Returns `true` on update.
    pub fn set(&mut self, name: &CanonicalName, format: StorageFormat) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.canonical_name == *name)
        {
            Some(entry) => {
                entry.format = format;
                true
            }
            None => {
                self.entries.push(LedgerEntry::new(name.clone(), format));
                false
            }
        }
    }

    pub fn flush(&self) -> Result<(), HarvestError> {
        let parent = self
            .path
            .parent()
            .ok_or_else(|| HarvestError::Filesystem("invalid ledger path".to_string()))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".log")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        for entry in &self.entries {
            temp.write_all(entry.to_line().as_bytes())
                .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        temp.persist(self.path.as_std_path())
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn parse_line(
    path: &Utf8Path,
    line_no: usize,
    line: &str,
) -> Result<Option<LedgerEntry>, HarvestError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let corrupt = || HarvestError::LedgerCorruption {
        path: path.as_std_path().to_path_buf(),
        line: line_no,
        content: line.to_string(),
    };
    let (name, format) = trimmed.rsplit_once(SEPARATOR).ok_or_else(corrupt)?;
    if name.trim().is_empty() {
        return Err(corrupt());
    }
    let format = format.parse::<StorageFormat>().map_err(|_| corrupt())?;
    Ok(Some(LedgerEntry::new(CanonicalName::new(name), format)))
}

pub fn exists(dir: &Utf8Path) -> bool {
    Ledger::path_in(dir).as_std_path().exists()
}

pub fn get_format(
    dir: &Utf8Path,
    name: &CanonicalName,
) -> Result<Option<StorageFormat>, HarvestError> {
    if !exists(dir) {
        return Ok(None);
    }
    Ok(Ledger::open(dir)?.format_of(name))
}

/// Records `format` given as text, as read from user input or another tool.
pub fn record_format(dir: &Utf8Path, name: &CanonicalName, format: &str) -> Result<(), HarvestError> {
    let format = format.parse::<StorageFormat>()?;
    record(dir, name, format)
}

pub fn record(
    dir: &Utf8Path,
    name: &CanonicalName,
    format: StorageFormat,
) -> Result<(), HarvestError> {
    let mut ledger = Ledger::open(dir)?;
    let updated = ledger.set(name, format);
    ledger.flush()?;
    debug!(ledger = %ledger.path(), name = %name, %format, updated, "ledger entry recorded");
    Ok(())
}

/// Appends entries without looking for duplicates, creating the ledger if needed.
pub fn append_entries(dir: &Utf8Path, entries: &[LedgerEntry]) -> Result<(), HarvestError> {
    let path = Ledger::path_in(dir);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_std_path())
        .map_err(|err| HarvestError::Filesystem(format!("open ledger {path}: {err}")))?;
    let content: String = entries.iter().map(LedgerEntry::to_line).collect();
    file.write_all(content.as_bytes())
        .map_err(|err| HarvestError::Filesystem(format!("append ledger {path}: {err}")))?;
    Ok(())
}

/// Names recorded as csv whose csv file is still on disk, in ledger order.
pub fn pending_conversions(dir: &Utf8Path) -> Result<Vec<CanonicalName>, HarvestError> {
    let ledger = Ledger::open(dir)?;
    Ok(ledger
        .entries()
        .iter()
        .filter(|entry| entry.format == StorageFormat::Csv)
        .filter(|entry| {
            entry
                .canonical_name
                .with_extension(StorageFormat::Csv)
                .as_std_path()
                .is_file()
        })
        .map(|entry| entry.canonical_name.clone())
        .collect())
}

/// Called by a converter once `target` has been written: records the new format and
/// removes the source csv.
pub fn complete_conversion(
    dir: &Utf8Path,
    name: &CanonicalName,
    target: StorageFormat,
) -> Result<(), HarvestError> {
    if target == StorageFormat::Csv {
        return Err(HarvestError::InvalidFormat(
            "csv is not a conversion target".to_string(),
        ));
    }
    let converted = name.with_extension(target);
    if !converted.as_std_path().is_file() {
        return Err(HarvestError::Filesystem(format!(
            "converted file missing: {converted}"
        )));
    }
    record(dir, name, target)?;
    let source = name.with_extension(StorageFormat::Csv);
    if source.as_std_path().exists() {
        fs::remove_file(source.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("remove {source}: {err}")))?;
    }
    Ok(())
}
