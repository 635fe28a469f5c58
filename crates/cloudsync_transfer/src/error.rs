use std::path::PathBuf;

use cloudsync_contract::JobId;
use cloudsync_rpc::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("invalid transfer request: {0}")]
    InvalidRequest(String),
    #[error("not enough space on {path}: {needed} bytes needed, {available} available")]
    InsufficientSpace {
        path: PathBuf,
        needed: u64,
        available: u64,
    },
    #[error("{path} would reach {percent}% usage, above the {ceiling}% ceiling")]
    UsageCeiling {
        path: PathBuf,
        percent: u64,
        ceiling: u8,
    },
    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error("transfer cancelled")]
    Cancelled,
    #[error("job {jobid} failed: {message}")]
    JobFailed { jobid: JobId, message: String },
}

impl TransferError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        TransferError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}
