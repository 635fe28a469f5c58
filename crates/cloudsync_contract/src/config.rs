use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::rpc::{ConfigCreateOptions, ConfigCreateRequest};

/// Flat string parameters as stored by the control plane for one remote.
pub type ConfigParameters = BTreeMap<String, String>;

const PROVIDER_AWS: &str = "AWS";
const PROVIDER_TENCENT: &str = "TencentCOS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("unknown storage type: {0}")]
    UnknownKind(String),
    #[error("unsupported provider {provider} for remote type {kind}")]
    UnsupportedProvider { kind: String, provider: String },
    #[error("missing parameter {0}")]
    MissingParameter(&'static str),
    #[error("invalid fs string: {0}")]
    InvalidFs(String),
}

/// Provider discriminator for a linked cloud account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConfigKind {
    Awss3,
    Tencent,
    Dropbox,
    Google,
}

impl ConfigKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKind::Awss3 => "awss3",
            ConfigKind::Tencent => "tencent",
            ConfigKind::Dropbox => "dropbox",
            ConfigKind::Google => "google",
        }
    }

    pub fn is_s3_family(&self) -> bool {
        matches!(self, ConfigKind::Awss3 | ConfigKind::Tencent)
    }

    /// Remote type and provider understood by the control plane.
    pub fn remote_type(&self) -> (&'static str, Option<&'static str>) {
        match self {
            ConfigKind::Awss3 => ("s3", Some(PROVIDER_AWS)),
            ConfigKind::Tencent => ("s3", Some(PROVIDER_TENCENT)),
            ConfigKind::Dropbox => ("dropbox", None),
            ConfigKind::Google => ("googledrive", None),
        }
    }

    pub fn from_remote_type(remote_type: &str, provider: &str) -> Result<Self, ContractError> {
        match (remote_type, provider) {
            ("s3", PROVIDER_AWS) => Ok(ConfigKind::Awss3),
            ("s3", PROVIDER_TENCENT) => Ok(ConfigKind::Tencent),
            ("s3", other) => Err(ContractError::UnsupportedProvider {
                kind: remote_type.to_string(),
                provider: other.to_string(),
            }),
            ("dropbox", _) => Ok(ConfigKind::Dropbox),
            ("googledrive", _) | ("drive", _) => Ok(ConfigKind::Google),
            (other, _) => Err(ContractError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ConfigKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigKind {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "awss3" => Ok(ConfigKind::Awss3),
            "tencent" => Ok(ConfigKind::Tencent),
            "dropbox" => Ok(ConfigKind::Dropbox),
            "google" => Ok(ConfigKind::Google),
            other => Err(ContractError::UnknownKind(other.to_string())),
        }
    }
}

/// Credential set of one linked remote account.
///
/// Configs are never edited in place: a changed account is removed and
/// created again under the same name. Derived `PartialEq` compares every
/// field; reconciliation uses [`Config::is_equivalent`] instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConfigKind,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default)]
    pub client_id: String,
}

impl Config {
    pub fn new(owner: &str, kind: ConfigKind, access_key_id: &str) -> Self {
        Self {
            name: Self::compose_name(owner, kind, access_key_id),
            kind,
            provider: kind.remote_type().1.unwrap_or_default().to_string(),
            access_key_id: access_key_id.to_string(),
            secret_access_key: String::new(),
            refresh_token: String::new(),
            url: String::new(),
            endpoint: String::new(),
            bucket: String::new(),
            client_id: String::new(),
        }
    }

    /// `{owner}_{type}_{accessKey}`
    pub fn compose_name(owner: &str, kind: ConfigKind, access_key_id: &str) -> String {
        format!("{owner}_{}_{access_key_id}", kind.as_str())
    }

    /// Whether `name` has the `{owner}_{type}_{accessKey}` shape of a linked
    /// account, as opposed to a remote configured by someone else.
    pub fn is_managed_name(name: &str) -> bool {
        [
            ConfigKind::Awss3,
            ConfigKind::Tencent,
            ConfigKind::Dropbox,
            ConfigKind::Google,
        ]
        .iter()
        .any(|kind| {
            name.split_once(&format!("_{}_", kind.as_str()))
                .is_some_and(|(owner, key)| !owner.is_empty() && !key.is_empty())
        })
    }

    /// Root path a serve for this account is started on.
    pub fn target_path(&self) -> &str {
        match self.kind {
            ConfigKind::Awss3 | ConfigKind::Tencent => &self.bucket,
            ConfigKind::Dropbox => &self.access_key_id,
            ConfigKind::Google => "",
        }
    }

    /// Type-specific equality used to decide whether a remote needs rebuilding.
    /// Google accounts always compare equal.
    pub fn is_equivalent(&self, other: &Config) -> bool {
        if self.kind != other.kind {
            return false;
        }
        match self.kind {
            ConfigKind::Awss3 | ConfigKind::Tencent => {
                self.url == other.url
                    && self.endpoint == other.endpoint
                    && self.bucket == other.bucket
            }
            ConfigKind::Dropbox => {
                self.secret_access_key == other.secret_access_key
                    && self.client_id == other.client_id
                    && self.refresh_token == other.refresh_token
            }
            ConfigKind::Google => true,
        }
    }

    pub fn create_request(&self) -> ConfigCreateRequest {
        let (remote_type, provider) = self.kind.remote_type();
        let mut parameters = ConfigParameters::new();

        match self.kind {
            ConfigKind::Awss3 | ConfigKind::Tencent => {
                insert_non_empty(&mut parameters, "provider", provider.unwrap_or_default());
                insert_non_empty(&mut parameters, "access_key_id", &self.access_key_id);
                insert_non_empty(&mut parameters, "secret_access_key", &self.secret_access_key);
                insert_non_empty(&mut parameters, "endpoint", &self.endpoint);
                insert_non_empty(&mut parameters, "url", &self.url);
                insert_non_empty(&mut parameters, "bucket", &self.bucket);
            }
            ConfigKind::Dropbox | ConfigKind::Google => {
                insert_non_empty(&mut parameters, "access_key_id", &self.access_key_id);
                insert_non_empty(&mut parameters, "client_id", &self.client_id);
                insert_non_empty(&mut parameters, "client_secret", &self.secret_access_key);
                parameters.insert("token".to_string(), oauth_token(&self.refresh_token));
                if self.kind == ConfigKind::Google {
                    parameters.insert("scope".to_string(), "drive".to_string());
                }
            }
        }

        ConfigCreateRequest {
            name: self.name.clone(),
            remote_type: remote_type.to_string(),
            parameters,
            opt: ConfigCreateOptions {
                obscure: true,
                non_interactive: true,
            },
        }
    }

    /// Rebuilds a config from one entry of the control plane's dump.
    pub fn from_dump(name: &str, parameters: &ConfigParameters) -> Result<Self, ContractError> {
        let remote_type = parameters
            .get("type")
            .ok_or(ContractError::MissingParameter("type"))?;
        let provider = parameters.get("provider").map(String::as_str).unwrap_or("");
        let kind = ConfigKind::from_remote_type(remote_type, provider)?;
        let param = |key: &str| parameters.get(key).cloned().unwrap_or_default();

        let refresh_token = parameters
            .get("token")
            .and_then(|raw| serde_json::from_str::<serde_json::Value>(raw).ok())
            .and_then(|token| {
                token
                    .get("refresh_token")
                    .and_then(|value| value.as_str())
                    .map(str::to_owned)
            })
            .unwrap_or_default();

        let secret_access_key = if kind.is_s3_family() {
            param("secret_access_key")
        } else {
            param("client_secret")
        };

        Ok(Self {
            name: name.to_string(),
            kind,
            provider: provider.to_string(),
            access_key_id: param("access_key_id"),
            secret_access_key,
            refresh_token,
            url: param("url"),
            endpoint: param("endpoint"),
            bucket: param("bucket"),
            client_id: param("client_id"),
        })
    }
}

fn insert_non_empty(parameters: &mut ConfigParameters, key: &str, value: &str) {
    if !value.is_empty() {
        parameters.insert(key.to_string(), value.to_string());
    }
}

fn oauth_token(refresh_token: &str) -> String {
    json!({
        "access_token": "",
        "token_type": "bearer",
        "refresh_token": refresh_token,
        "expiry": "0001-01-01T00:00:00Z",
    })
    .to_string()
}
