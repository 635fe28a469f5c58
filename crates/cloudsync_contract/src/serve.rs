use serde::{Deserialize, Serialize};

use crate::file::split_fs;
use crate::rpc::{ServeListEntry, ServeParams};

pub const SERVE_TYPE_HTTP: &str = "http";

/// Cache and buffer parameters handed to every proxy process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServeOptions {
    pub vfs_cache_mode: String,
    pub buffer_size: String,
    pub vfs_cache_max_age: String,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            vfs_cache_mode: "full".to_string(),
            buffer_size: "16M".to_string(),
            vfs_cache_max_age: "24h".to_string(),
        }
    }
}

/// A local proxy process exposing one config's remote over `addr`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Serve {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub serve_type: String,
    pub fs: String,
    pub addr: String,
    pub port: u16,
    #[serde(flatten)]
    pub options: ServeOptions,
}

impl Serve {
    pub fn params(&self) -> ServeParams {
        ServeParams {
            serve_type: self.serve_type.clone(),
            fs: self.fs.clone(),
            addr: self.addr.clone(),
            vfs_cache_mode: Some(self.options.vfs_cache_mode.clone()),
            buffer_size: Some(self.options.buffer_size.clone()),
            vfs_cache_max_age: Some(self.options.vfs_cache_max_age.clone()),
        }
    }

    /// Translates one `serve/list` entry. Entries whose fs does not carry a
    /// config name are not ours and yield `None`.
    pub fn from_list_entry(entry: &ServeListEntry) -> Option<Self> {
        let (name, _) = split_fs(&entry.params.fs).ok()?;
        if name.is_empty() {
            return None;
        }
        let addr = if entry.addr.is_empty() {
            entry.params.addr.clone()
        } else {
            entry.addr.clone()
        };
        let port = addr.rsplit(':').next()?.parse().ok()?;
        let defaults = ServeOptions::default();

        Some(Self {
            id: entry.id.clone(),
            name: name.to_string(),
            serve_type: entry.params.serve_type.clone(),
            fs: entry.params.fs.clone(),
            addr,
            port,
            options: ServeOptions {
                vfs_cache_mode: entry
                    .params
                    .vfs_cache_mode
                    .clone()
                    .unwrap_or(defaults.vfs_cache_mode),
                buffer_size: entry.params.buffer_size.clone().unwrap_or(defaults.buffer_size),
                vfs_cache_max_age: entry
                    .params
                    .vfs_cache_max_age
                    .clone()
                    .unwrap_or(defaults.vfs_cache_max_age),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_entry_translates_to_serve() {
        let entry: ServeListEntry = serde_json::from_value(serde_json::json!({
            "id": "http-1a2b",
            "addr": "127.0.0.1:17201",
            "params": {
                "type": "http",
                "fs": "alice_awss3_AK1:b1",
                "addr": "127.0.0.1:17201",
                "vfs_cache_mode": "full"
            }
        }))
        .expect("entry");

        let serve = Serve::from_list_entry(&entry).expect("serve");
        assert_eq!(serve.name, "alice_awss3_AK1");
        assert_eq!(serve.port, 17201);
        assert_eq!(serve.options.buffer_size, "16M");
    }

    #[test]
    fn list_entry_without_config_name_is_skipped() {
        let entry: ServeListEntry = serde_json::from_value(serde_json::json!({
            "id": "http-x",
            "addr": "127.0.0.1:9000",
            "params": { "type": "http", "fs": "/local/dir", "addr": "127.0.0.1:9000" }
        }))
        .expect("entry");
        assert!(Serve::from_list_entry(&entry).is_none());
    }
}
