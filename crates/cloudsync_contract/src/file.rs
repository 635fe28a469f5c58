use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{Config, ConfigKind, ContractError};

/// Where a file lives: on local disk, in the LAN sync share, or on a cloud remote.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum StorageKind {
    Drive,
    External,
    Sync,
    Cloud(ConfigKind),
}

impl StorageKind {
    pub fn is_local(&self) -> bool {
        matches!(self, StorageKind::Drive | StorageKind::External)
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageKind::Drive => f.write_str("drive"),
            StorageKind::External => f.write_str("external"),
            StorageKind::Sync => f.write_str("sync"),
            StorageKind::Cloud(kind) => f.write_str(kind.as_str()),
        }
    }
}

impl FromStr for StorageKind {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drive" => Ok(StorageKind::Drive),
            "external" => Ok(StorageKind::External),
            "sync" => Ok(StorageKind::Sync),
            other => other.parse().map(StorageKind::Cloud),
        }
    }
}

impl TryFrom<String> for StorageKind {
    type Error = ContractError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StorageKind> for String {
    fn from(kind: StorageKind) -> Self {
        kind.to_string()
    }
}

/// Caller-side description of one end of a transfer.
///
/// `extend` carries the account key for cloud storage and the library id for
/// the sync share; it is unused for local kinds. A trailing `/` on `path`
/// marks a directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileParam {
    pub owner: String,
    #[serde(rename = "type")]
    pub kind: StorageKind,
    #[serde(default)]
    pub extend: String,
    pub path: String,
}

impl FileParam {
    pub fn new(owner: &str, kind: StorageKind, extend: &str, path: &str) -> Self {
        Self {
            owner: owner.to_string(),
            kind,
            extend: extend.to_string(),
            path: path.to_string(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.kind.is_local()
    }

    pub fn is_dir(&self) -> bool {
        self.path.ends_with('/')
    }

    /// Last path segment, ignoring a trailing slash.
    pub fn name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
    }

    pub fn config_name(&self) -> Option<String> {
        match self.kind {
            StorageKind::Cloud(kind) => Some(Config::compose_name(&self.owner, kind, &self.extend)),
            _ => None,
        }
    }
}

/// `{configName}:{path}`, the address of a remote location.
pub fn fs_string(config_name: &str, path: &str) -> String {
    format!("{config_name}:{}", path.trim_start_matches('/'))
}

pub fn split_fs(fs: &str) -> Result<(&str, &str), ContractError> {
    fs.split_once(':')
        .ok_or_else(|| ContractError::InvalidFs(fs.to_string()))
}

/// Splits `report.final.pdf` into (`report.final`, `.pdf`). Directories and
/// dot-files keep the whole name as stem.
pub fn split_extension(name: &str, is_dir: bool) -> (&str, &str) {
    if is_dir {
        return (name, "");
    }
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => name.split_at(idx),
    }
}

/// Candidate name for the `attempt`-th collision: `name (n).ext`.
pub fn numbered_name(name: &str, is_dir: bool, attempt: usize) -> String {
    let (stem, ext) = split_extension(name, is_dir);
    format!("{stem} ({attempt}){ext}")
}
