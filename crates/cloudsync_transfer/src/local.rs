use std::path::{Path, PathBuf};
use std::process::Stdio;

use cloudsync_contract::numbered_name;
use sysinfo::Disks;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::TransferError;
use crate::progress::{parse_rsync_progress, MonotoneProgress, ProgressSink};

pub const RSYNC_PROGRESS_FLAG: &str = "--info=PROGRESS2";

/// Total bytes of regular files under `path`, or the file's own size.
pub async fn disk_usage(path: &Path) -> Result<u64, TransferError> {
    let root = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut total = 0u64;
        for entry in WalkDir::new(&root) {
            let entry = entry.map_err(|err| {
                let context = format!("walk {}", root.display());
                TransferError::io(context, std::io::Error::other(err))
            })?;
            if entry.file_type().is_file() {
                let metadata = entry
                    .metadata()
                    .map_err(|err| TransferError::io("stat", std::io::Error::other(err)))?;
                total += metadata.len();
            }
        }
        Ok(total)
    })
    .await
    .map_err(|err| TransferError::io("size worker", std::io::Error::other(err)))?
}

/// First name in `dir` that does not exist yet: `name`, then `stem (1).ext`,
/// `stem (2).ext` and so on.
pub async fn unique_target(dir: &Path, name: &str, is_dir: bool) -> Result<PathBuf, TransferError> {
    let candidate = dir.join(name);
    if !exists(&candidate).await? {
        return Ok(candidate);
    }
    let mut attempt = 1;
    loop {
        let candidate = dir.join(numbered_name(name, is_dir, attempt));
        if !exists(&candidate).await? {
            debug!(path = %candidate.display(), "destination renamed to avoid collision");
            return Ok(candidate);
        }
        attempt += 1;
    }
}

async fn exists(path: &Path) -> Result<bool, TransferError> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|err| TransferError::io(format!("probe {}", path.display()), err))
}

/// Capacity of the filesystem a path lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpaceInfo {
    pub total: u64,
    pub available: u64,
}

/// Reads the disk whose mount point is the longest prefix of `path`.
pub fn space_for(path: &Path) -> Option<SpaceInfo> {
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| SpaceInfo {
            total: disk.total_space(),
            available: disk.available_space(),
        })
}

/// Rejects writing `needed` bytes when they do not fit, or when the disk
/// would end up fuller than `ceiling` percent.
pub fn check_space(
    path: &Path,
    space: SpaceInfo,
    needed: u64,
    ceiling: u8,
) -> Result<(), TransferError> {
    if needed > space.available {
        return Err(TransferError::InsufficientSpace {
            path: path.to_path_buf(),
            needed,
            available: space.available,
        });
    }
    if space.total == 0 {
        return Ok(());
    }
    let used_after = space.total - space.available + needed;
    let percent = (u128::from(used_after) * 100 / u128::from(space.total)) as u64;
    if percent > u64::from(ceiling) {
        return Err(TransferError::UsageCeiling {
            path: path.to_path_buf(),
            percent,
            ceiling,
        });
    }
    Ok(())
}

/// Checks the destination disk before any byte moves. Unknown mounts are
/// let through with a warning.
pub fn ensure_space(dir: &Path, needed: u64, ceiling: u8) -> Result<(), TransferError> {
    match space_for(dir) {
        Some(space) => check_space(dir, space, needed, ceiling),
        None => {
            warn!(dir = %dir.display(), "no disk found for destination, skipping space check");
            Ok(())
        }
    }
}

#[cfg(unix)]
pub fn same_filesystem(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    match (std::fs::metadata(a), std::fs::metadata(b)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev(),
        _ => false,
    }
}

#[cfg(not(unix))]
pub fn same_filesystem(_a: &Path, _b: &Path) -> bool {
    false
}

/// `rsync -av --info=PROGRESS2 src dst`. Directory sources copy their
/// contents into `dst`.
pub fn rsync_command(src: &Path, dst: &Path, is_dir: bool) -> Command {
    let mut command = Command::new("rsync");
    command.arg("-av").arg(RSYNC_PROGRESS_FLAG);
    if is_dir {
        command
            .arg(format!("{}/", src.display()))
            .arg(format!("{}/", dst.display()));
    } else {
        command.arg(src).arg(dst);
    }
    command
}

pub fn mv_command(src: &Path, dst: &Path) -> Command {
    let mut command = Command::new("mv");
    command.arg(src).arg(dst);
    command
}

/// Runs `command` to completion, forwarding rsync progress lines from its
/// stdout. The child is killed as soon as `cancel` fires.
pub async fn run_command(
    mut command: Command,
    total: u64,
    sink: &dyn ProgressSink,
    cancel: &CancellationToken,
) -> Result<(), TransferError> {
    let program = command
        .as_std()
        .get_program()
        .to_string_lossy()
        .into_owned();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|err| TransferError::io(format!("spawn {program}"), err))?;
    info!(program = %program, pid = child.id(), "local transfer started");

    let stderr = child.stderr.take().map(|mut stderr| {
        tokio::spawn(async move {
            let mut captured = String::new();
            if let Err(err) = stderr.read_to_string(&mut captured).await {
                debug!(error = %err, "stderr of child could not be read");
            }
            captured
        })
    });

    let mut progress = MonotoneProgress::default();
    if let Some(stdout) = child.stdout.take() {
        let mut segments = BufReader::new(stdout).split(b'\r');
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(program = %program, "local transfer cancelled, killing child");
                    if let Err(err) = child.kill().await {
                        warn!(program = %program, error = %err, "failed to kill child");
                    }
                    return Err(TransferError::Cancelled);
                }
                segment = segments.next_segment() => {
                    let Some(segment) = segment.map_err(|err| TransferError::io("read output", err))? else {
                        break;
                    };
                    for line in String::from_utf8_lossy(&segment).lines() {
                        if let Some(sample) = parse_rsync_progress(line) {
                            let percent = progress.bump(sample.percent);
                            sink.update_progress(percent, sample.bytes.min(total));
                        }
                    }
                }
            }
        }
    }

    let status = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            if let Err(err) = child.kill().await {
                warn!(program = %program, error = %err, "failed to kill child");
            }
            return Err(TransferError::Cancelled);
        }
        status = child.wait() => status.map_err(|err| TransferError::io(format!("wait {program}"), err))?,
    };

    let stderr = match stderr {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };
    if !status.success() {
        return Err(TransferError::Command {
            program,
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(())
}
