use std::sync::Arc;
use std::time::Duration;

use cloudsync_contract::rpc::{
    AboutResponse, Empty, FileTransferRequest, FsRequest, JobIdRequest, JobResponse, ListResponse,
    SizeResponse, StatResponse, StatsRequest, TreeTransferRequest,
};
use cloudsync_contract::{CoreStats, Job, JobId, JobStatus, ListItem, ListOptions};
use cloudsync_rpc::{invoke, ControlPlane, Method, RpcError};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Typed file operations against the control plane. Remote locations are
/// addressed as `{configName}:{path}` fs strings; local directories are plain
/// paths.
#[derive(Clone)]
pub struct Operations {
    control: Arc<dyn ControlPlane>,
    timeout: Duration,
}

impl Operations {
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self::with_timeout(control, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(control: Arc<dyn ControlPlane>, timeout: Duration) -> Self {
        Self { control, timeout }
    }

    async fn call<Q, R>(&self, method: Method, request: &Q) -> Result<R, RpcError>
    where
        Q: Serialize + Sync,
        R: DeserializeOwned,
    {
        debug!(method = %method, "control plane call");
        match tokio::time::timeout(self.timeout, invoke(self.control.as_ref(), method, request))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(RpcError::Timeout {
                method,
                seconds: self.timeout.as_secs(),
            }),
        }
    }

    pub async fn list(
        &self,
        fs: &str,
        remote: &str,
        options: ListOptions,
    ) -> Result<Vec<ListItem>, RpcError> {
        let request = FsRequest {
            opt: Some(options),
            ..FsRequest::new(fs, remote)
        };
        let reply: ListResponse = self.call(Method::OperationsList, &request).await?;
        Ok(reply.list)
    }

    /// `None` when nothing exists at `remote`.
    pub async fn stat(&self, fs: &str, remote: &str) -> Result<Option<ListItem>, RpcError> {
        let reply: StatResponse = self
            .call(Method::OperationsStat, &FsRequest::new(fs, remote))
            .await?;
        Ok(reply.item)
    }

    pub async fn about(&self, fs: &str) -> Result<AboutResponse, RpcError> {
        self.call(Method::OperationsAbout, &FsRequest::new(fs, ""))
            .await
    }

    pub async fn size(&self, fs: &str) -> Result<SizeResponse, RpcError> {
        self.call(Method::OperationsSize, &FsRequest::new(fs, ""))
            .await
    }

    pub async fn mkdir(&self, fs: &str, dir: &str) -> Result<(), RpcError> {
        let _: Empty = self
            .call(Method::OperationsMkdir, &FsRequest::new(fs, dir))
            .await?;
        Ok(())
    }

    pub async fn deletefile(&self, fs: &str, remote: &str) -> Result<(), RpcError> {
        let _: Empty = self
            .call(Method::OperationsDeleteFile, &FsRequest::new(fs, remote))
            .await?;
        Ok(())
    }

    pub async fn purge(&self, fs: &str, remote: &str) -> Result<(), RpcError> {
        let _: Empty = self
            .call(Method::OperationsPurge, &FsRequest::new(fs, remote))
            .await?;
        Ok(())
    }

    pub async fn copyfile(&self, src: (&str, &str), dst: (&str, &str)) -> Result<(), RpcError> {
        let _: Empty = self
            .call(Method::OperationsCopyFile, &file_request(src, dst, false))
            .await?;
        Ok(())
    }

    pub async fn copyfile_async(
        &self,
        src: (&str, &str),
        dst: (&str, &str),
    ) -> Result<JobId, RpcError> {
        self.submit(Method::OperationsCopyFile, &file_request(src, dst, true))
            .await
    }

    pub async fn movefile(&self, src: (&str, &str), dst: (&str, &str)) -> Result<(), RpcError> {
        let _: Empty = self
            .call(Method::OperationsMoveFile, &file_request(src, dst, false))
            .await?;
        Ok(())
    }

    pub async fn movefile_async(
        &self,
        src: (&str, &str),
        dst: (&str, &str),
    ) -> Result<JobId, RpcError> {
        self.submit(Method::OperationsMoveFile, &file_request(src, dst, true))
            .await
    }

    /// Copies the whole tree at `src_fs` into `dst_fs`.
    pub async fn copy(&self, src_fs: &str, dst_fs: &str) -> Result<(), RpcError> {
        let _: Empty = self
            .call(Method::SyncCopy, &tree_request(src_fs, dst_fs, false, false))
            .await?;
        Ok(())
    }

    pub async fn copy_async(&self, src_fs: &str, dst_fs: &str) -> Result<JobId, RpcError> {
        self.submit(Method::SyncCopy, &tree_request(src_fs, dst_fs, false, true))
            .await
    }

    /// Moves the whole tree at `src_fs` into `dst_fs`, removing emptied
    /// source directories.
    pub async fn move_tree(&self, src_fs: &str, dst_fs: &str) -> Result<(), RpcError> {
        let _: Empty = self
            .call(Method::SyncMove, &tree_request(src_fs, dst_fs, true, false))
            .await?;
        Ok(())
    }

    pub async fn move_tree_async(&self, src_fs: &str, dst_fs: &str) -> Result<JobId, RpcError> {
        self.submit(Method::SyncMove, &tree_request(src_fs, dst_fs, true, true))
            .await
    }

    pub async fn job_status(&self, jobid: JobId) -> Result<JobStatus, RpcError> {
        self.call(Method::JobStatus, &JobIdRequest { jobid }).await
    }

    pub async fn job_stop(&self, jobid: JobId) -> Result<(), RpcError> {
        let _: Empty = self.call(Method::JobStop, &JobIdRequest { jobid }).await?;
        Ok(())
    }

    /// Transfer statistics of the stats group that belongs to `job`.
    pub async fn core_stats(&self, job: &Job) -> Result<CoreStats, RpcError> {
        self.call(
            Method::CoreStats,
            &StatsRequest {
                group: job.group.clone(),
            },
        )
        .await
    }

    async fn submit<Q: Serialize + Sync>(
        &self,
        method: Method,
        request: &Q,
    ) -> Result<JobId, RpcError> {
        let reply: JobResponse = self.call(method, request).await?;
        debug!(method = %method, job_id = reply.jobid, "async job submitted");
        Ok(reply.jobid)
    }
}

fn file_request(src: (&str, &str), dst: (&str, &str), run_async: bool) -> FileTransferRequest {
    FileTransferRequest {
        src_fs: src.0.to_string(),
        src_remote: src.1.to_string(),
        dst_fs: dst.0.to_string(),
        dst_remote: dst.1.to_string(),
        run_async,
    }
}

fn tree_request(src_fs: &str, dst_fs: &str, is_move: bool, run_async: bool) -> TreeTransferRequest {
    TreeTransferRequest {
        src_fs: src_fs.to_string(),
        dst_fs: dst_fs.to_string(),
        create_empty_src_dirs: true,
        delete_empty_src_dirs: is_move.then_some(true),
        run_async,
    }
}
