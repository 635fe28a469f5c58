pub mod error;
pub mod local;
pub mod operations;
pub mod orchestrator;
pub mod poller;
pub mod progress;

use serde::{Deserialize, Serialize};

pub use error::TransferError;
pub use operations::Operations;
pub use orchestrator::{Orchestrator, TransferAction, TransferRequest, TransferSettings};
pub use poller::{JobPoller, JobTracker, PollState};
pub use progress::{ProgressEvent, ProgressSink, RecordingSink};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Queued,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Success | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transfer_id: String,
    pub request: TransferRequest,
    pub status: TransferStatus,
    pub total_bytes: Option<u64>,
    pub percent: u8,
    pub bytes: u64,
    pub submitted_at: String,
    pub updated_at: String,
    pub failure_reason: Option<String>,
}

impl TransferRecord {
    pub fn queued(transfer_id: String, request: TransferRequest, now: String) -> Self {
        Self {
            transfer_id,
            request,
            status: TransferStatus::Queued,
            total_bytes: None,
            percent: 0,
            bytes: 0,
            submitted_at: now.clone(),
            updated_at: now,
            failure_reason: None,
        }
    }

    /// Final status for the outcome of [`Orchestrator::execute`].
    pub fn finish(&mut self, outcome: &Result<(), TransferError>, now: String) {
        self.status = match outcome {
            Ok(()) => TransferStatus::Success,
            Err(err) if err.is_cancelled() => TransferStatus::Cancelled,
            Err(_) => TransferStatus::Failed,
        };
        self.failure_reason = outcome.as_ref().err().map(ToString::to_string);
        self.updated_at = now;
    }
}
