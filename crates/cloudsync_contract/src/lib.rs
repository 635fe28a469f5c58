pub mod config;
pub mod file;
pub mod rpc;
pub mod serve;

pub use config::{Config, ConfigKind, ConfigParameters, ContractError};
pub use file::{fs_string, numbered_name, split_fs, FileParam, StorageKind};
pub use rpc::{CoreStats, Job, JobId, JobStatus, ListItem, ListOptions};
pub use serve::{Serve, ServeOptions, SERVE_TYPE_HTTP};
