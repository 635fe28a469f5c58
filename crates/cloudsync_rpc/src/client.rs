use std::fmt;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Endpoints of the control-plane daemon used by this workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Noop,
    ConfigCreate,
    ConfigDelete,
    ConfigDump,
    ServeStart,
    ServeStop,
    ServeList,
    OperationsList,
    OperationsStat,
    OperationsAbout,
    OperationsSize,
    OperationsMkdir,
    OperationsDeleteFile,
    OperationsPurge,
    OperationsCopyFile,
    OperationsMoveFile,
    SyncCopy,
    SyncMove,
    JobStatus,
    JobStop,
    CoreStats,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Noop => "rc/noop",
            Method::ConfigCreate => "config/create",
            Method::ConfigDelete => "config/delete",
            Method::ConfigDump => "config/dump",
            Method::ServeStart => "serve/start",
            Method::ServeStop => "serve/stop",
            Method::ServeList => "serve/list",
            Method::OperationsList => "operations/list",
            Method::OperationsStat => "operations/stat",
            Method::OperationsAbout => "operations/about",
            Method::OperationsSize => "operations/size",
            Method::OperationsMkdir => "operations/mkdir",
            Method::OperationsDeleteFile => "operations/deletefile",
            Method::OperationsPurge => "operations/purge",
            Method::OperationsCopyFile => "operations/copyfile",
            Method::OperationsMoveFile => "operations/movefile",
            Method::SyncCopy => "sync/copy",
            Method::SyncMove => "sync/move",
            Method::JobStatus => "job/status",
            Method::JobStop => "job/stop",
            Method::CoreStats => "core/stats",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("control plane unreachable for {method}: {message}")]
    Transport { method: Method, message: String },
    #[error("{method} failed with status {status}: {body}")]
    Status {
        method: Method,
        status: u16,
        body: String,
    },
    #[error("failed to encode {method} request: {source}")]
    Encode {
        method: Method,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to decode {method} response: {source}")]
    Decode {
        method: Method,
        #[source]
        source: serde_json::Error,
    },
    #[error("{method} timed out after {seconds}s")]
    Timeout { method: Method, seconds: u64 },
}

impl RpcError {
    pub fn method(&self) -> Method {
        match self {
            RpcError::Transport { method, .. }
            | RpcError::Status { method, .. }
            | RpcError::Encode { method, .. }
            | RpcError::Decode { method, .. }
            | RpcError::Timeout { method, .. } => *method,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Transport { .. } => true,
            RpcError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// A reliable request channel to the control-plane daemon. Implementations
/// own their retry policy; callers treat each call as one attempt.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn call(&self, method: Method, params: Value) -> Result<Value, RpcError>;
}

/// Encodes `request`, issues `method` and decodes the reply into `R`.
pub async fn invoke<Q, R>(
    control: &dyn ControlPlane,
    method: Method,
    request: &Q,
) -> Result<R, RpcError>
where
    Q: Serialize + ?Sized + Sync,
    R: DeserializeOwned,
{
    let params =
        serde_json::to_value(request).map_err(|source| RpcError::Encode { method, source })?;
    let reply = control.call(method, params).await?;
    serde_json::from_value(reply).map_err(|source| RpcError::Decode { method, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable_client_errors_are_not() {
        let server = RpcError::Status {
            method: Method::ConfigCreate,
            status: 503,
            body: "busy".to_string(),
        };
        let client = RpcError::Status {
            method: Method::ConfigCreate,
            status: 400,
            body: "bad".to_string(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert_eq!(client.method(), Method::ConfigCreate);
    }

    #[test]
    fn status_error_keeps_body_verbatim() {
        let err = RpcError::Status {
            method: Method::OperationsStat,
            status: 404,
            body: "{\"error\":\"object not found\"}".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "operations/stat failed with status 404: {\"error\":\"object not found\"}"
        );
    }
}
