use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use cloudsync_contract::{fs_string, FileParam, StorageKind};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::TransferError;
use crate::local;
use crate::operations::Operations;
use crate::poller::JobPoller;
use crate::progress::ProgressSink;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransferAction {
    Copy,
    Move,
    Upload,
    Download,
}

impl TransferAction {
    pub fn is_move(&self) -> bool {
        matches!(self, TransferAction::Move)
    }
}

/// A copy or move of `src` into the directory `dst`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransferRequest {
    pub owner: String,
    pub action: TransferAction,
    pub src: FileParam,
    pub dst: FileParam,
}

impl TransferRequest {
    /// Fills an empty owner on either side from the request's owner.
    pub fn normalized(&self) -> Self {
        let fill = |param: &FileParam| {
            let mut param = param.clone();
            if param.owner.is_empty() {
                param.owner = self.owner.clone();
            }
            param
        };
        Self {
            owner: self.owner.clone(),
            action: self.action,
            src: fill(&self.src),
            dst: fill(&self.dst),
        }
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.owner.is_empty() {
            return Err(invalid("owner is required"));
        }
        for (side, param) in [("source", &self.src), ("destination", &self.dst)] {
            if has_parent_component(&param.path) {
                return Err(invalid(format!("{side} path {} escapes its root", param.path)));
            }
            if matches!(param.kind, StorageKind::Cloud(_)) && param.extend.is_empty() {
                return Err(invalid(format!("{side} cloud account key is missing")));
            }
        }
        if self.src.name().is_empty() {
            return Err(invalid("source path names no file or directory"));
        }

        match self.action {
            TransferAction::Upload if !(self.src.is_local() && !self.dst.is_local()) => {
                return Err(invalid("upload needs a local source and a remote destination"));
            }
            TransferAction::Download if !(!self.src.is_local() && self.dst.is_local()) => {
                return Err(invalid("download needs a remote source and a local destination"));
            }
            _ => {}
        }

        if same_root(&self.src, &self.dst) && is_within(&self.dst.path, &self.src.path) {
            return Err(invalid(format!(
                "{} cannot be transferred into itself",
                self.src.path
            )));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> TransferError {
    TransferError::InvalidRequest(message.into())
}

fn has_parent_component(path: &str) -> bool {
    Path::new(path)
        .components()
        .any(|component| matches!(component, Component::ParentDir))
}

fn same_root(a: &FileParam, b: &FileParam) -> bool {
    a.kind == b.kind && a.owner == b.owner && a.extend == b.extend
}

fn is_within(path: &str, ancestor: &str) -> bool {
    let path = path.trim_matches('/');
    let ancestor = ancestor.trim_matches('/');
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| ancestor.is_empty() || rest.starts_with('/'))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub poll_interval_secs: u64,
    pub usage_ceiling_percent: u8,
    pub drive_root: PathBuf,
    pub external_root: PathBuf,
    pub sync_remote: String,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            usage_ceiling_percent: 90,
            drive_root: PathBuf::from("/data"),
            external_root: PathBuf::from("/data/External"),
            sync_remote: "sync".to_string(),
        }
    }
}

/// A place in control-plane terms: `fs` plus a path relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Location {
    fs: String,
    remote: String,
}

impl Location {
    fn full(&self) -> String {
        if self.remote.is_empty() {
            self.fs.clone()
        } else if self.fs.ends_with(':') {
            format!("{}{}", self.fs, self.remote)
        } else {
            format!("{}/{}", self.fs.trim_end_matches('/'), self.remote)
        }
    }

    fn child(&self, name: &str) -> Self {
        let remote = if self.remote.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.remote)
        };
        Self {
            fs: self.fs.clone(),
            remote,
        }
    }
}

/// Single entry point for file transfers between local storage, the LAN
/// sync remote and linked cloud accounts.
pub struct Orchestrator {
    ops: Operations,
    poller: JobPoller,
    settings: TransferSettings,
}

impl Orchestrator {
    pub fn new(ops: Operations, settings: TransferSettings) -> Self {
        let interval = Duration::from_secs(settings.poll_interval_secs.max(1));
        Self {
            poller: JobPoller::new(ops.clone(), interval),
            ops,
            settings,
        }
    }

    /// Root directory a local storage kind resolves to.
    fn local_root(&self, param: &FileParam) -> PathBuf {
        match param.kind {
            StorageKind::External => self.settings.external_root.join(&param.extend),
            _ => self.settings.drive_root.join(&param.owner),
        }
    }

    pub fn local_path(&self, param: &FileParam) -> PathBuf {
        let relative = param.path.trim_matches('/');
        let root = self.local_root(param);
        if relative.is_empty() {
            root
        } else {
            root.join(relative)
        }
    }

    fn location(&self, param: &FileParam) -> Location {
        let remote = param.path.trim_matches('/').to_string();
        let fs = match param.kind {
            StorageKind::Drive | StorageKind::External => {
                self.local_root(param).to_string_lossy().into_owned()
            }
            StorageKind::Sync => fs_string(&self.settings.sync_remote, param.extend.trim_matches('/')),
            StorageKind::Cloud(_) => fs_string(&param.config_name().unwrap_or_default(), ""),
        };
        Location { fs, remote }
    }

    /// Runs one transfer to completion. `UpdateTotalSize` is reported once
    /// before any progress, and progress ends at 100 unless an error or a
    /// cancellation is returned.
    pub async fn execute(
        &self,
        request: &TransferRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let request = request.normalized();
        request.validate()?;

        if request.src.is_local() && request.dst.is_local() {
            info!(
                owner = %request.owner,
                action = ?request.action,
                src = %request.src.path,
                dst = %request.dst.path,
                "local transfer"
            );
            self.transfer_local(&request, sink, cancel).await
        } else {
            info!(
                owner = %request.owner,
                action = ?request.action,
                src_kind = %request.src.kind,
                dst_kind = %request.dst.kind,
                "remote transfer"
            );
            self.transfer_remote(&request, sink, cancel).await
        }
    }

    async fn transfer_local(
        &self,
        request: &TransferRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let src = self.local_path(&request.src);
        let metadata = tokio::fs::metadata(&src)
            .await
            .map_err(|_| invalid(format!("source {} does not exist", request.src.path)))?;
        let is_dir = metadata.is_dir();

        let dst_dir = self.local_path(&request.dst);
        tokio::fs::create_dir_all(&dst_dir)
            .await
            .map_err(|err| TransferError::io(format!("create {}", dst_dir.display()), err))?;

        let total = local::disk_usage(&src).await?;
        sink.update_total_size(total);

        let target = local::unique_target(&dst_dir, request.src.name(), is_dir).await?;
        let is_move = request.action.is_move();
        if !(is_move && local::same_filesystem(&src, &dst_dir)) {
            local::ensure_space(&dst_dir, total, self.settings.usage_ceiling_percent)?;
        }

        let command = if is_move {
            local::mv_command(&src, &target)
        } else {
            local::rsync_command(&src, &target, is_dir)
        };
        local::run_command(command, total, sink, cancel).await?;

        info!(target_path = %target.display(), bytes = total, "local transfer finished");
        sink.update_progress(100, total);
        Ok(())
    }

    async fn transfer_remote(
        &self,
        request: &TransferRequest,
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let src = self.location(&request.src);
        let dst_dir = self.location(&request.dst);
        let is_dir = request.src.is_dir();

        let total = if is_dir {
            self.ops.size(&src.full()).await?.bytes
        } else {
            self.ops
                .stat(&src.fs, &src.remote)
                .await?
                .ok_or_else(|| invalid(format!("source {} does not exist", src.full())))?
                .size
        };
        let total = u64::try_from(total).unwrap_or_default();
        sink.update_total_size(total);

        let name = if request.dst.is_local() {
            let dir = self.local_path(&request.dst);
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|err| TransferError::io(format!("create {}", dir.display()), err))?;
            local::ensure_space(&dir, total, self.settings.usage_ceiling_percent)?;
            let target = local::unique_target(&dir, request.src.name(), is_dir).await?;
            target
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| request.src.name().to_string())
        } else {
            self.unique_remote_name(&dst_dir, request.src.name(), is_dir)
                .await?
        };
        let dst = dst_dir.child(&name);

        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let jobid = match (is_dir, request.action.is_move()) {
            (false, false) => {
                self.ops
                    .copyfile_async((&src.fs, &src.remote), (&dst.fs, &dst.remote))
                    .await?
            }
            (false, true) => {
                self.ops
                    .movefile_async((&src.fs, &src.remote), (&dst.fs, &dst.remote))
                    .await?
            }
            (true, false) => self.ops.copy_async(&src.full(), &dst.full()).await?,
            (true, true) => self.ops.move_tree_async(&src.full(), &dst.full()).await?,
        };
        info!(job_id = jobid, src = %src.full(), dst = %dst.full(), bytes = total, "remote job submitted");

        match self.poller.wait(jobid, sink, cancel).await {
            Err(TransferError::Rpc(err)) => {
                if let Err(stop) = self.ops.job_stop(jobid).await {
                    warn!(job_id = jobid, error = %stop, "stopping orphaned job failed");
                }
                Err(err.into())
            }
            result => result,
        }
    }

    async fn unique_remote_name(
        &self,
        dir: &Location,
        name: &str,
        is_dir: bool,
    ) -> Result<String, TransferError> {
        let mut candidate = name.to_string();
        let mut attempt = 0;
        loop {
            let probe = dir.child(&candidate);
            if self.ops.stat(&probe.fs, &probe.remote).await?.is_none() {
                return Ok(candidate);
            }
            attempt += 1;
            candidate = cloudsync_contract::numbered_name(name, is_dir, attempt);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cloudsync_contract::ConfigKind;
    use cloudsync_rpc::{InMemoryControlPlane, Method};

    use crate::progress::{ProgressEvent, RecordingSink};

    const MOVIE: u64 = 500 * 1024 * 1024;

    fn cloud(kind: ConfigKind, key: &str, path: &str) -> FileParam {
        FileParam::new("alice", StorageKind::Cloud(kind), key, path)
    }

    fn drive(path: &str) -> FileParam {
        FileParam::new("alice", StorageKind::Drive, "", path)
    }

    fn request(action: TransferAction, src: FileParam, dst: FileParam) -> TransferRequest {
        TransferRequest {
            owner: "alice".to_string(),
            action,
            src,
            dst,
        }
    }

    fn orchestrator(control: &Arc<InMemoryControlPlane>, drive_root: &Path) -> Orchestrator {
        Orchestrator::new(
            Operations::new(control.clone()),
            TransferSettings {
                usage_ceiling_percent: 100,
                drive_root: drive_root.to_path_buf(),
                ..TransferSettings::default()
            },
        )
    }

    fn copy_movie() -> TransferRequest {
        request(
            TransferAction::Copy,
            cloud(ConfigKind::Awss3, "AK1", "/b1/movie.mkv"),
            cloud(ConfigKind::Dropbox, "DK", "/Videos/"),
        )
    }

    async fn seeded(steps: i64) -> Arc<InMemoryControlPlane> {
        let control = Arc::new(InMemoryControlPlane::with_progress_steps(steps));
        control
            .put_object("alice_awss3_AK1:", "b1/movie.mkv", MOVIE as i64)
            .await;
        control
    }

    #[tokio::test(start_paused = true)]
    async fn cloud_copy_reports_size_once_then_progress_to_100() {
        let control = seeded(4).await;
        let sink = RecordingSink::default();

        orchestrator(&control, Path::new("/data"))
            .execute(&copy_movie(), &sink, &CancellationToken::new())
            .await
            .expect("transfer");

        let events = sink.events();
        assert_eq!(events[0], ProgressEvent::TotalSize(MOVIE));
        let totals = events
            .iter()
            .filter(|event| matches!(event, ProgressEvent::TotalSize(_)))
            .count();
        assert_eq!(totals, 1);

        let percents: Vec<u8> = events
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::Progress(percent, _) => Some(*percent),
                ProgressEvent::TotalSize(_) => None,
            })
            .collect();
        assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(sink.last_progress(), Some((100, MOVIE)));

        let calls = control.calls().await;
        let source_stats = calls
            .iter()
            .filter(|call| {
                call.method == Method::OperationsStat
                    && call.params["fs"] == "alice_awss3_AK1:"
                    && call.params["remote"] == "b1/movie.mkv"
            })
            .count();
        assert_eq!(source_stats, 1);
        let copy = calls
            .iter()
            .find(|call| call.method == Method::OperationsCopyFile)
            .expect("copyfile");
        assert_eq!(copy.params["_async"], true);
        assert_eq!(copy.params["dstFs"], "alice_dropbox_DK:");
        assert_eq!(copy.params["dstRemote"], "Videos/movie.mkv");
        assert!(control
            .object("alice_dropbox_DK:", "Videos/movie.mkv")
            .await
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_collision_gets_numbered_name() {
        let control = seeded(1).await;
        control
            .put_object("alice_dropbox_DK:", "Videos/movie.mkv", 1)
            .await;

        orchestrator(&control, Path::new("/data"))
            .execute(&copy_movie(), &RecordingSink::default(), &CancellationToken::new())
            .await
            .expect("transfer");

        let copied = control
            .object("alice_dropbox_DK:", "Videos/movie (1).mkv")
            .await
            .expect("renamed copy");
        assert_eq!(copied.size, MOVIE as i64);
    }

    #[tokio::test(start_paused = true)]
    async fn cloud_directory_move_uses_tree_move() {
        let control = Arc::new(InMemoryControlPlane::with_progress_steps(2));
        control.put_object("alice_awss3_AK1:", "b1/album/a.jpg", 30).await;
        control.put_object("alice_awss3_AK1:", "b1/album/b.jpg", 70).await;
        let sink = RecordingSink::default();

        let move_album = request(
            TransferAction::Move,
            cloud(ConfigKind::Awss3, "AK1", "/b1/album/"),
            cloud(ConfigKind::Google, "G1", "/Backup/"),
        );
        orchestrator(&control, Path::new("/data"))
            .execute(&move_album, &sink, &CancellationToken::new())
            .await
            .expect("transfer");

        assert_eq!(sink.events()[0], ProgressEvent::TotalSize(100));
        assert_eq!(control.count(Method::OperationsSize).await, 1);
        let calls = control.calls().await;
        let tree = calls
            .iter()
            .find(|call| call.method == Method::SyncMove)
            .expect("sync/move");
        assert_eq!(tree.params["srcFs"], "alice_awss3_AK1:b1/album");
        assert_eq!(tree.params["dstFs"], "alice_google_G1:Backup/album");
        assert!(control.object("alice_google_G1:", "Backup/album/b.jpg").await.is_some());
        assert!(control.object("alice_awss3_AK1:", "b1/album/a.jpg").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_stops_remote_job_once() {
        let control = seeded(100).await;
        let cancel = CancellationToken::new();
        let orchestrator = orchestrator(&control, Path::new("/data"));
        let sink = RecordingSink::default();

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(12)).await;
                cancel.cancel();
            }
        };
        let request = copy_movie();
        let (result, ()) = tokio::join!(orchestrator.execute(&request, &sink, &cancel), canceller);

        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert_eq!(control.count(Method::JobStop).await, 1);
        assert_ne!(sink.last_progress().map(|(percent, _)| percent), Some(100));
    }

    #[tokio::test(start_paused = true)]
    async fn stats_failure_stops_orphaned_job() {
        let control = seeded(4).await;
        control.fail(Method::CoreStats, "stats gone").await;

        let result = orchestrator(&control, Path::new("/data"))
            .execute(&copy_movie(), &RecordingSink::default(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(TransferError::Rpc(_))));
        assert_eq!(control.count(Method::JobStop).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn download_lands_under_owner_drive() {
        let root = tempfile::tempdir().expect("tempdir");
        let control = Arc::new(InMemoryControlPlane::with_progress_steps(2));
        control.put_object("alice_awss3_AK1:", "b1/notes.txt", 10).await;

        let download = request(
            TransferAction::Download,
            cloud(ConfigKind::Awss3, "AK1", "/b1/notes.txt"),
            drive("/Downloads/"),
        );
        orchestrator(&control, root.path())
            .execute(&download, &RecordingSink::default(), &CancellationToken::new())
            .await
            .expect("transfer");

        let owner_root = root.path().join("alice").to_string_lossy().into_owned();
        assert!(control
            .object(&owner_root, "Downloads/notes.txt")
            .await
            .is_some());
        assert!(root.path().join("alice/Downloads").is_dir());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_move_renames_on_collision() {
        let root = tempfile::tempdir().expect("tempdir");
        let home = root.path().join("alice");
        std::fs::create_dir_all(home.join("docs")).expect("mkdir");
        std::fs::create_dir_all(home.join("archive")).expect("mkdir");
        std::fs::write(home.join("docs/report.pdf"), b"new report").expect("write");
        std::fs::write(home.join("archive/report.pdf"), b"old").expect("write");

        let control = Arc::new(InMemoryControlPlane::new());
        let sink = RecordingSink::default();
        let move_report = request(
            TransferAction::Move,
            drive("/docs/report.pdf"),
            drive("/archive/"),
        );
        orchestrator(&control, root.path())
            .execute(&move_report, &sink, &CancellationToken::new())
            .await
            .expect("move");

        let renamed = home.join("archive/report (1).pdf");
        assert_eq!(std::fs::read(&renamed).expect("moved"), b"new report");
        assert_eq!(std::fs::read(home.join("archive/report.pdf")).expect("kept"), b"old");
        assert!(!home.join("docs/report.pdf").exists());
        assert_eq!(sink.events()[0], ProgressEvent::TotalSize(10));
        assert_eq!(sink.last_progress(), Some((100, 10)));
        assert!(control.calls().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn local_directory_copy_runs_rsync_to_completion() {
        if std::process::Command::new("rsync")
            .arg("--version")
            .output()
            .is_err()
        {
            return;
        }
        let root = tempfile::tempdir().expect("tempdir");
        let home = root.path().join("alice");
        std::fs::create_dir_all(home.join("docs/nested")).expect("mkdir");
        std::fs::write(home.join("docs/a.bin"), vec![1u8; 4096]).expect("write");
        std::fs::write(home.join("docs/nested/b.bin"), vec![2u8; 1024]).expect("write");

        let control = Arc::new(InMemoryControlPlane::new());
        let sink = RecordingSink::default();
        let copy_docs = request(TransferAction::Copy, drive("/docs/"), drive("/backup/"));
        orchestrator(&control, root.path())
            .execute(&copy_docs, &sink, &CancellationToken::new())
            .await
            .expect("copy");

        let events = sink.events();
        assert_eq!(events[0], ProgressEvent::TotalSize(5120));
        let percents: Vec<u8> = events[1..]
            .iter()
            .map(|event| match event {
                ProgressEvent::Progress(percent, _) => *percent,
                ProgressEvent::TotalSize(_) => panic!("total size reported twice"),
            })
            .collect();
        assert!(percents.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(percents.iter().filter(|percent| **percent == 100).count(), 1);
        assert_eq!(sink.last_progress(), Some((100, 5120)));

        assert_eq!(
            std::fs::read(home.join("backup/docs/nested/b.bin")).expect("copied"),
            vec![2u8; 1024]
        );
        assert!(home.join("docs/a.bin").exists());
    }

    #[tokio::test]
    async fn missing_local_source_is_rejected() {
        let root = tempfile::tempdir().expect("tempdir");
        let control = Arc::new(InMemoryControlPlane::new());
        let result = orchestrator(&control, root.path())
            .execute(
                &request(TransferAction::Copy, drive("/nope.txt"), drive("/dst/")),
                &RecordingSink::default(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(TransferError::InvalidRequest(_))));
    }

    #[test]
    fn action_direction_is_enforced() {
        let upload_from_cloud = request(
            TransferAction::Upload,
            cloud(ConfigKind::Dropbox, "DK", "/a.txt"),
            cloud(ConfigKind::Awss3, "AK1", "/b1/"),
        );
        assert!(matches!(
            upload_from_cloud.validate(),
            Err(TransferError::InvalidRequest(_))
        ));

        let download_to_cloud = request(
            TransferAction::Download,
            cloud(ConfigKind::Dropbox, "DK", "/a.txt"),
            FileParam::new("alice", StorageKind::Sync, "nas", "/inbox/"),
        );
        assert!(download_to_cloud.validate().is_err());

        let upload = request(
            TransferAction::Upload,
            drive("/a.txt"),
            cloud(ConfigKind::Awss3, "AK1", "/b1/"),
        );
        assert!(upload.validate().is_ok());
    }

    #[test]
    fn directory_cannot_move_into_itself() {
        let nested = request(TransferAction::Move, drive("/photos/"), drive("/photos/2024/"));
        assert!(nested.validate().is_err());

        let sibling = request(TransferAction::Move, drive("/photos/"), drive("/photos-old/"));
        assert!(sibling.validate().is_ok());

        let other_account = request(
            TransferAction::Move,
            cloud(ConfigKind::Dropbox, "DK", "/photos/"),
            cloud(ConfigKind::Dropbox, "DK2", "/photos/"),
        );
        assert!(other_account.validate().is_ok());
    }

    #[test]
    fn paths_resolve_per_storage_kind() {
        let control = Arc::new(InMemoryControlPlane::new());
        let orchestrator = orchestrator(&control, Path::new("/data"));

        assert_eq!(
            orchestrator.local_path(&drive("/docs/a.txt")),
            PathBuf::from("/data/alice/docs/a.txt")
        );
        let usb = FileParam::new("alice", StorageKind::External, "usb1", "/films/");
        assert_eq!(
            orchestrator.local_path(&usb),
            PathBuf::from("/data/External/usb1/films")
        );

        let sync = orchestrator.location(&FileParam::new("alice", StorageKind::Sync, "nas", "/inbox/a.txt"));
        assert_eq!(sync.full(), "sync:nas/inbox/a.txt");
        let s3 = orchestrator.location(&cloud(ConfigKind::Awss3, "AK1", "/b1/x/"));
        assert_eq!(s3.full(), "alice_awss3_AK1:b1/x");
        assert_eq!(s3.child("y.bin").remote, "b1/x/y.bin");
    }

    #[test]
    fn parent_components_are_rejected() {
        let escape = request(TransferAction::Copy, drive("/../bob/secret.txt"), drive("/mine/"));
        assert!(escape.validate().is_err());
    }
}
