use std::time::Duration;

use cloudsync_contract::{CoreStats, Job, JobId, JobStatus};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TransferError;
use crate::operations::Operations;
use crate::progress::{MonotoneProgress, ProgressSink};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Done,
    Cancelled,
    Failed,
}

/// What a single sample asks the caller to report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sample {
    Progress { percent: u8, bytes: u64 },
    Done { total: u64 },
    Failed(String),
}

/// Pure transition logic of one job's poll loop.
#[derive(Debug)]
pub struct JobTracker {
    job: Job,
    state: PollState,
    progress: MonotoneProgress,
}

impl JobTracker {
    pub fn new(jobid: JobId) -> Self {
        Self {
            job: Job::new(jobid),
            state: PollState::Polling,
            progress: MonotoneProgress::default(),
        }
    }

    pub fn job(&self) -> &Job {
        &self.job
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Feeds one `core/stats` + `job/status` pair. Only valid while polling.
    pub fn on_sample(&mut self, stats: &CoreStats, status: &JobStatus) -> Sample {
        let total = u64::try_from(stats.total_bytes).unwrap_or_default();
        let bytes = u64::try_from(stats.bytes).unwrap_or_default();

        if status.finished && !status.success {
            self.state = PollState::Failed;
            let message = if status.error.is_empty() {
                stats.last_error.clone()
            } else {
                status.error.clone()
            };
            return Sample::Failed(message);
        }

        let settled = bytes == total && stats.transferring.is_empty();
        if (settled && total > 0) || status.finished {
            self.state = PollState::Done;
            return Sample::Done {
                total: total.max(bytes),
            };
        }

        Sample::Progress {
            percent: self.progress.in_flight(bytes, total),
            bytes,
        }
    }

    /// Returns whether the remote job still needs a stop request.
    pub fn on_cancel(&mut self) -> bool {
        let pending = self.state == PollState::Polling;
        if pending {
            self.state = PollState::Cancelled;
        }
        pending
    }

    pub fn on_error(&mut self) {
        self.state = PollState::Failed;
    }
}

/// Drives a [`JobTracker`] on a fixed interval until the job finishes, fails
/// or the caller cancels.
pub struct JobPoller {
    ops: Operations,
    interval: Duration,
}

impl JobPoller {
    pub fn new(ops: Operations, interval: Duration) -> Self {
        Self { ops, interval }
    }

    pub async fn wait(
        &self,
        jobid: JobId,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let mut tracker = JobTracker::new(jobid);
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if tracker.on_cancel() {
                        info!(job_id = jobid, "transfer cancelled, stopping remote job");
                        if let Err(err) = self.ops.job_stop(jobid).await {
                            warn!(job_id = jobid, error = %err, "job stop failed");
                        }
                    }
                    return Err(TransferError::Cancelled);
                }
                _ = ticker.tick() => {
                    let (stats, status) = match self.sample(tracker.job()).await {
                        Ok(sample) => sample,
                        Err(err) => {
                            tracker.on_error();
                            warn!(job_id = jobid, error = %err, "job poll failed");
                            return Err(err.into());
                        }
                    };

                    match tracker.on_sample(&stats, &status) {
                        Sample::Progress { percent, bytes } => {
                            debug!(job_id = jobid, percent, bytes, "job in progress");
                            sink.update_progress(percent, bytes);
                        }
                        Sample::Done { total } => {
                            info!(job_id = jobid, bytes = total, "job finished");
                            sink.update_progress(100, total);
                            return Ok(());
                        }
                        Sample::Failed(message) => {
                            warn!(job_id = jobid, error = %message, "job failed on control plane");
                            return Err(TransferError::JobFailed { jobid, message });
                        }
                    }
                }
            }
        }
    }

    async fn sample(&self, job: &Job) -> Result<(CoreStats, JobStatus), cloudsync_rpc::RpcError> {
        let stats = self.ops.core_stats(job).await?;
        let status = self.ops.job_status(job.id).await?;
        Ok((stats, status))
    }
}
