use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{CanonicalName, GroupKey, remote_file_name};
use crate::error::HarvestError;
use crate::ledger::{self, Ledger, LedgerEntry};

/// Layout of the download root: one directory per group, each with its own ledger.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupStatus {
    pub group: GroupKey,
    pub ledger_path: String,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupPending {
    pub group: GroupKey,
    pub names: Vec<CanonicalName>,
}

impl Store {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn group_dir(&self, group: &GroupKey) -> Utf8PathBuf {
        self.root.join(group.as_str())
    }

    pub fn local_path(&self, group: &GroupKey, url: &str) -> Result<Utf8PathBuf, HarvestError> {
        Ok(self.group_dir(group).join(remote_file_name(url)?))
    }

    pub fn ensure_root(&self) -> Result<(), HarvestError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("create {}: {err}", self.root)))
    }

    pub fn ensure_group_dir(&self, group: &GroupKey) -> Result<Utf8PathBuf, HarvestError> {
        let dir = self.group_dir(group);
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("create {dir}: {err}")))?;
        Ok(dir)
    }

    /// Group directories present under the root, sorted by name.
    pub fn groups(&self) -> Result<Vec<GroupKey>, HarvestError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| HarvestError::Filesystem(format!("list {}: {err}", self.root)))?;
        let mut groups = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| HarvestError::Filesystem(err.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().into_string().map_err(|name| {
                HarvestError::Filesystem(format!("non-utf8 directory name: {name:?}"))
            })?;
            groups.push(GroupKey::new(name));
        }
        groups.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(groups)
    }

    pub fn status(&self) -> Result<Vec<GroupStatus>, HarvestError> {
        let mut result = Vec::new();
        for group in self.groups()? {
            let dir = self.group_dir(&group);
            if !ledger::exists(&dir) {
                continue;
            }
            let ledger = Ledger::open(&dir)?;
            result.push(GroupStatus {
                group,
                ledger_path: ledger.path().to_string(),
                entries: ledger.entries().to_vec(),
            });
        }
        Ok(result)
    }

    pub fn pending(&self) -> Result<Vec<GroupPending>, HarvestError> {
        let mut result = Vec::new();
        for group in self.groups()? {
            let names = ledger::pending_conversions(&self.group_dir(&group))?;
            if !names.is_empty() {
                result.push(GroupPending { group, names });
            }
        }
        Ok(result)
    }
}
