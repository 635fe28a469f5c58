//! Request and response bodies of the control-plane daemon, one shape per
//! endpoint. Field names follow the daemon's wire format.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigParameters;

pub type JobId = i64;

/// Handle to an asynchronous copy/move running inside the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub group: String,
}

impl Job {
    pub fn new(id: JobId) -> Self {
        Self {
            id,
            group: format!("job/{id}"),
        }
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigCreateOptions {
    pub obscure: bool,
    #[serde(rename = "nonInteractive")]
    pub non_interactive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigCreateRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub remote_type: String,
    pub parameters: ConfigParameters,
    pub opt: ConfigCreateOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRequest {
    pub name: String,
}

/// `config/dump`: remote name to its stored parameters.
pub type ConfigDump = BTreeMap<String, ConfigParameters>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServeParams {
    #[serde(rename = "type")]
    pub serve_type: String,
    pub fs: String,
    pub addr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vfs_cache_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vfs_cache_max_age: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeStartResponse {
    pub id: String,
    #[serde(default)]
    pub addr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdRequest {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServeListEntry {
    pub id: String,
    #[serde(default)]
    pub addr: String,
    pub params: ServeParams,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServeListResponse {
    #[serde(default)]
    pub list: Vec<ServeListEntry>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ListOptions {
    pub recurse: bool,
    pub no_mod_time: bool,
    pub no_mime_type: bool,
    pub dirs_only: bool,
    pub files_only: bool,
}

/// Body shared by `operations/list|stat|about|size|mkdir|deletefile|purge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsRequest {
    pub fs: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub remote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opt: Option<ListOptions>,
}

impl FsRequest {
    pub fn new(fs: &str, remote: &str) -> Self {
        Self {
            fs: fs.to_string(),
            remote: remote.to_string(),
            opt: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListItem {
    #[serde(rename = "Path", default)]
    pub path: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Size", default)]
    pub size: i64,
    #[serde(rename = "MimeType", default)]
    pub mime_type: String,
    #[serde(rename = "ModTime", default)]
    pub mod_time: String,
    #[serde(rename = "IsDir", default)]
    pub is_dir: bool,
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub list: Vec<ListItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatResponse {
    #[serde(default)]
    pub item: Option<ListItem>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AboutResponse {
    pub total: Option<i64>,
    pub used: Option<i64>,
    pub trashed: Option<i64>,
    pub other: Option<i64>,
    pub free: Option<i64>,
    pub objects: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SizeResponse {
    pub count: i64,
    pub bytes: i64,
    pub sizeless: i64,
}

/// `operations/copyfile` and `operations/movefile`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTransferRequest {
    pub src_fs: String,
    pub src_remote: String,
    pub dst_fs: String,
    pub dst_remote: String,
    #[serde(rename = "_async", default, skip_serializing_if = "is_false")]
    pub run_async: bool,
}

/// `sync/copy` and `sync/move`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeTransferRequest {
    pub src_fs: String,
    pub dst_fs: String,
    pub create_empty_src_dirs: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete_empty_src_dirs: Option<bool>,
    #[serde(rename = "_async", default, skip_serializing_if = "is_false")]
    pub run_async: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub jobid: JobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobIdRequest {
    pub jobid: JobId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct JobStatus {
    pub id: JobId,
    pub group: String,
    pub finished: bool,
    pub success: bool,
    pub error: String,
    pub duration: f64,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsRequest {
    pub group: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransferringEntry {
    pub name: String,
    pub size: i64,
    pub bytes: i64,
    pub percentage: i64,
    pub speed: f64,
}

/// `core/stats` for one job group.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreStats {
    pub bytes: i64,
    pub total_bytes: i64,
    pub transfers: i64,
    pub total_transfers: i64,
    pub errors: i64,
    pub last_error: String,
    pub speed: f64,
    pub eta: Option<i64>,
    pub transferring: Vec<TransferringEntry>,
}

/// Replies that carry nothing of interest; any JSON object decodes into it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Empty {}
