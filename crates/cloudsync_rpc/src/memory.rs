use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use cloudsync_contract::rpc::{
    ConfigCreateRequest, ConfigDump, CoreStats, FileTransferRequest, FsRequest, IdRequest,
    JobIdRequest, JobStatus, ListResponse, NameRequest, ServeListEntry, ServeListResponse,
    ServeParams, SizeResponse, StatResponse, StatsRequest, TransferringEntry, TreeTransferRequest,
};
use cloudsync_contract::{split_fs, JobId, ListItem};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::info;

use crate::client::{ControlPlane, Method, RpcError};

const MEMORY_CAPACITY: i64 = 1 << 40;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub params: Value,
}

#[derive(Debug, Default)]
struct MemoryJob {
    total: i64,
    bytes: i64,
    finished: bool,
    error: String,
    writes: Vec<(String, ListItem)>,
    removals: Vec<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    configs: ConfigDump,
    serves: BTreeMap<String, ServeListEntry>,
    objects: BTreeMap<String, ListItem>,
    dirs: BTreeSet<String>,
    jobs: BTreeMap<JobId, MemoryJob>,
    failing: HashMap<Method, String>,
    calls: Vec<RecordedCall>,
    next_serve: u64,
    next_job: JobId,
}

type Reply = Result<Value, (u16, String)>;

/// A simulated control-plane daemon that keeps configs, serves, objects and
/// jobs in memory. Async jobs advance by a fixed share of their size every
/// time their statistics are read.
#[derive(Debug)]
pub struct InMemoryControlPlane {
    state: Mutex<MemoryState>,
    progress_steps: i64,
}

impl Default for InMemoryControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::with_progress_steps(4)
    }

    pub fn with_progress_steps(steps: i64) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                next_job: 1,
                ..MemoryState::default()
            }),
            progress_steps: steps.max(1),
        }
    }

    pub async fn put_object(&self, fs: &str, remote: &str, size: i64) {
        let key = object_key(fs, remote);
        let item = item_for(&key, size, false);
        self.state.lock().await.objects.insert(key, item);
    }

    pub async fn object(&self, fs: &str, remote: &str) -> Option<ListItem> {
        self.state
            .lock()
            .await
            .objects
            .get(&object_key(fs, remote))
            .cloned()
    }

    /// Every subsequent call to `method` fails with a 500 carrying `message`.
    pub async fn fail(&self, method: Method, message: &str) {
        self.state
            .lock()
            .await
            .failing
            .insert(method, message.to_string());
    }

    pub async fn recover(&self, method: Method) {
        self.state.lock().await.failing.remove(&method);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn count(&self, method: Method) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.method == method)
            .count()
    }

    pub async fn config_names(&self) -> Vec<String> {
        self.state.lock().await.configs.keys().cloned().collect()
    }

    pub async fn serve_entries(&self) -> Vec<ServeListEntry> {
        self.state.lock().await.serves.values().cloned().collect()
    }
}

#[async_trait]
impl ControlPlane for InMemoryControlPlane {
    async fn call(&self, method: Method, params: Value) -> Result<Value, RpcError> {
        let mut state = self.state.lock().await;
        state.calls.push(RecordedCall {
            method,
            params: params.clone(),
        });

        if let Some(message) = state.failing.get(&method) {
            return Err(RpcError::Status {
                method,
                status: 500,
                body: json!({ "error": message }).to_string(),
            });
        }

        state
            .handle(method, params, self.progress_steps)
            .map_err(|(status, message)| RpcError::Status {
                method,
                status,
                body: json!({ "error": message, "path": method.as_str() }).to_string(),
            })
    }
}

impl MemoryState {
    fn handle(&mut self, method: Method, params: Value, steps: i64) -> Reply {
        match method {
            Method::Noop => Ok(params),
            Method::ConfigCreate => {
                let request: ConfigCreateRequest = decode(params)?;
                let mut stored = request.parameters;
                stored.insert("type".to_string(), request.remote_type);
                info!(name = %request.name, "memory control plane: config created");
                self.configs.insert(request.name, stored);
                Ok(json!({}))
            }
            Method::ConfigDelete => {
                let request: NameRequest = decode(params)?;
                self.configs.remove(&request.name);
                Ok(json!({}))
            }
            Method::ConfigDump => to_reply(&self.configs),
            Method::ServeStart => self.serve_start(decode(params)?),
            Method::ServeStop => {
                let request: IdRequest = decode(params)?;
                match self.serves.remove(&request.id) {
                    Some(_) => Ok(json!({})),
                    None => Err((500, format!("serve {} not found", request.id))),
                }
            }
            Method::ServeList => to_reply(&ServeListResponse {
                list: self.serves.values().cloned().collect(),
            }),
            Method::OperationsList => {
                let request: FsRequest = decode(params)?;
                to_reply(&ListResponse {
                    list: self.children(&object_key(&request.fs, &request.remote)),
                })
            }
            Method::OperationsStat => {
                let request: FsRequest = decode(params)?;
                let key = object_key(&request.fs, &request.remote);
                to_reply(&StatResponse {
                    item: self.stat(&key),
                })
            }
            Method::OperationsAbout => {
                let used: i64 = self.objects.values().map(|item| item.size).sum();
                Ok(json!({
                    "total": MEMORY_CAPACITY,
                    "used": used,
                    "free": MEMORY_CAPACITY - used,
                }))
            }
            Method::OperationsSize => {
                let request: FsRequest = decode(params)?;
                let prefix = object_key(&request.fs, &request.remote);
                let under: Vec<&ListItem> = self
                    .objects
                    .iter()
                    .filter(|(key, _)| is_under(key, &prefix))
                    .map(|(_, item)| item)
                    .collect();
                to_reply(&SizeResponse {
                    count: under.len() as i64,
                    bytes: under.iter().map(|item| item.size).sum(),
                    sizeless: 0,
                })
            }
            Method::OperationsMkdir => {
                let request: FsRequest = decode(params)?;
                self.dirs.insert(object_key(&request.fs, &request.remote));
                Ok(json!({}))
            }
            Method::OperationsDeleteFile => {
                let request: FsRequest = decode(params)?;
                let key = object_key(&request.fs, &request.remote);
                match self.objects.remove(&key) {
                    Some(_) => Ok(json!({})),
                    None => Err((404, "object not found".to_string())),
                }
            }
            Method::OperationsPurge => {
                let request: FsRequest = decode(params)?;
                let prefix = object_key(&request.fs, &request.remote);
                self.objects.retain(|key, _| !is_under(key, &prefix));
                self.dirs.retain(|key| !is_under(key, &prefix));
                Ok(json!({}))
            }
            Method::OperationsCopyFile | Method::OperationsMoveFile => {
                let request: FileTransferRequest = decode(params)?;
                let src = object_key(&request.src_fs, &request.src_remote);
                let dst = object_key(&request.dst_fs, &request.dst_remote);
                let item = self
                    .objects
                    .get(&src)
                    .cloned()
                    .ok_or((404, "object not found".to_string()))?;
                let job = MemoryJob {
                    total: item.size,
                    writes: vec![(dst.clone(), item_for(&dst, item.size, false))],
                    removals: if method == Method::OperationsMoveFile {
                        vec![src]
                    } else {
                        Vec::new()
                    },
                    ..MemoryJob::default()
                };
                self.submit(job, request.run_async)
            }
            Method::SyncCopy | Method::SyncMove => {
                let request: TreeTransferRequest = decode(params)?;
                let src = object_key(&request.src_fs, "");
                let dst = object_key(&request.dst_fs, "");
                let mut job = MemoryJob::default();
                for (key, item) in self.objects.iter().filter(|(key, _)| is_under(key, &src)) {
                    let target = rebase(key, &src, &dst);
                    job.total += item.size;
                    job.writes.push((target.clone(), item_for(&target, item.size, false)));
                    if method == Method::SyncMove {
                        job.removals.push(key.clone());
                    }
                }
                self.submit(job, request.run_async)
            }
            Method::JobStatus => {
                let request: JobIdRequest = decode(params)?;
                let job = self
                    .jobs
                    .get(&request.jobid)
                    .ok_or((404, format!("job {} not found", request.jobid)))?;
                to_reply(&JobStatus {
                    id: request.jobid,
                    group: format!("job/{}", request.jobid),
                    finished: job.finished,
                    success: job.finished && job.error.is_empty(),
                    error: job.error.clone(),
                    ..JobStatus::default()
                })
            }
            Method::JobStop => {
                let request: JobIdRequest = decode(params)?;
                let job = self
                    .jobs
                    .get_mut(&request.jobid)
                    .ok_or((404, format!("job {} not found", request.jobid)))?;
                if !job.finished {
                    job.finished = true;
                    job.error = "context canceled".to_string();
                }
                Ok(json!({}))
            }
            Method::CoreStats => {
                let request: StatsRequest = decode(params)?;
                self.stats(&request.group, steps)
            }
        }
    }

    fn serve_start(&mut self, params: ServeParams) -> Reply {
        let (name, _) = split_fs(&params.fs).map_err(|err| (400, err.to_string()))?;
        if !self.configs.contains_key(name) {
            return Err((500, format!("didn't find section in config file ({name})")));
        }
        if self.serves.values().any(|entry| entry.addr == params.addr) {
            return Err((500, format!("listen tcp {}: address already in use", params.addr)));
        }

        self.next_serve += 1;
        let id = format!("{}-{:08x}", params.serve_type, self.next_serve);
        let addr = params.addr.clone();
        self.serves.insert(
            id.clone(),
            ServeListEntry {
                id: id.clone(),
                addr: addr.clone(),
                params,
            },
        );
        Ok(json!({ "id": id, "addr": addr }))
    }

    fn submit(&mut self, mut job: MemoryJob, run_async: bool) -> Reply {
        if !run_async {
            job.bytes = job.total;
            self.apply(&mut job);
            return Ok(json!({}));
        }
        let id = self.next_job;
        self.next_job += 1;
        self.jobs.insert(id, job);
        Ok(json!({ "jobid": id }))
    }

    fn apply(&mut self, job: &mut MemoryJob) {
        for key in std::mem::take(&mut job.removals) {
            self.objects.remove(&key);
        }
        for (key, item) in std::mem::take(&mut job.writes) {
            self.objects.insert(key, item);
        }
        job.finished = true;
    }

    fn stats(&mut self, group: &str, steps: i64) -> Reply {
        let id = group
            .strip_prefix("job/")
            .and_then(|raw| raw.parse::<JobId>().ok());
        let Some(mut job) = id.and_then(|id| self.jobs.remove(&id)) else {
            return to_reply(&CoreStats::default());
        };

        if !job.finished {
            let step = ((job.total + steps - 1) / steps).max(1);
            job.bytes = (job.bytes + step).min(job.total);
            if job.bytes >= job.total {
                self.apply(&mut job);
            }
        }

        let transferring = if job.finished {
            Vec::new()
        } else {
            vec![TransferringEntry {
                name: "object".to_string(),
                size: job.total,
                bytes: job.bytes,
                percentage: if job.total > 0 { job.bytes * 100 / job.total } else { 0 },
                speed: 0.0,
            }]
        };
        let stats = CoreStats {
            bytes: job.bytes,
            total_bytes: job.total,
            errors: if job.error.is_empty() { 0 } else { 1 },
            last_error: job.error.clone(),
            transferring,
            ..CoreStats::default()
        };

        if let Some(id) = id {
            self.jobs.insert(id, job);
        }
        to_reply(&stats)
    }

    fn stat(&self, key: &str) -> Option<ListItem> {
        if let Some(item) = self.objects.get(key) {
            return Some(item.clone());
        }
        let is_dir = self.dirs.contains(key)
            || self
                .objects
                .keys()
                .chain(self.dirs.iter())
                .any(|other| other != key && is_under(other, key));
        is_dir.then(|| item_for(key, 0, true))
    }

    fn children(&self, prefix: &str) -> Vec<ListItem> {
        let mut seen = BTreeMap::new();
        for key in self.objects.keys().chain(self.dirs.iter()) {
            if key == prefix || !is_under(key, prefix) {
                continue;
            }
            let rest = key[prefix.len()..].trim_start_matches('/');
            let (head, nested) = match rest.split_once('/') {
                Some((head, _)) => (head, true),
                None => (rest, false),
            };
            let child = rebase(&format!("{prefix}/{head}"), prefix, prefix);
            let entry = match (nested, self.objects.get(key)) {
                (false, Some(item)) => item.clone(),
                _ => item_for(&child, 0, true),
            };
            seen.entry(head.to_string()).or_insert(entry);
        }
        seen.into_values().collect()
    }
}

fn decode<T: DeserializeOwned>(params: Value) -> Result<T, (u16, String)> {
    serde_json::from_value(params).map_err(|err| (400, format!("invalid params: {err}")))
}

fn to_reply<T: serde::Serialize>(value: &T) -> Reply {
    serde_json::to_value(value).map_err(|err| (500, err.to_string()))
}

/// Canonical key of `remote` inside `fs`: `name:path` for remotes, a plain
/// path for local directories.
fn object_key(fs: &str, remote: &str) -> String {
    let remote = remote.trim_matches('/');
    match split_fs(fs) {
        Ok((name, root)) => {
            let root = root.trim_matches('/');
            let path = match (root.is_empty(), remote.is_empty()) {
                (true, _) => remote.to_string(),
                (false, true) => root.to_string(),
                (false, false) => format!("{root}/{remote}"),
            };
            format!("{name}:{path}")
        }
        Err(_) => {
            let root = fs.trim_end_matches('/');
            if remote.is_empty() {
                root.to_string()
            } else {
                format!("{root}/{remote}")
            }
        }
    }
}

fn is_under(key: &str, prefix: &str) -> bool {
    key == prefix
        || (prefix.ends_with(':') && key.starts_with(prefix))
        || key
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn rebase(key: &str, src: &str, dst: &str) -> String {
    let rest = key[src.len().min(key.len())..].trim_start_matches('/');
    if rest.is_empty() {
        dst.to_string()
    } else if dst.ends_with(':') {
        format!("{dst}{rest}")
    } else {
        format!("{dst}/{rest}")
    }
}

fn item_for(key: &str, size: i64, is_dir: bool) -> ListItem {
    let path = key.split_once(':').map(|(_, path)| path).unwrap_or(key);
    ListItem {
        path: path.trim_start_matches('/').to_string(),
        name: path.rsplit('/').next().unwrap_or_default().to_string(),
        size: if is_dir { -1 } else { size },
        mime_type: if is_dir {
            "inode/directory".to_string()
        } else {
            "application/octet-stream".to_string()
        },
        mod_time: String::new(),
        is_dir,
        id: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::invoke;
    use cloudsync_contract::rpc::{JobResponse, ServeStartResponse};

    #[test]
    fn object_keys_join_root_and_remote() {
        assert_eq!(object_key("cfg:b1", "dir/a.txt"), "cfg:b1/dir/a.txt");
        assert_eq!(object_key("cfg:", "/a.txt"), "cfg:a.txt");
        assert_eq!(object_key("/data/alice/Home/", "a.txt"), "/data/alice/Home/a.txt");
        assert!(is_under("cfg:b1/dir/a.txt", "cfg:b1/dir"));
        assert!(!is_under("cfg:b1/directory", "cfg:b1/dir"));
        assert!(is_under("cfg:anything", "cfg:"));
    }

    #[tokio::test]
    async fn serve_start_requires_existing_config() {
        let control = InMemoryControlPlane::new();
        let params = json!({ "type": "http", "fs": "ghost:", "addr": "127.0.0.1:17200" });
        let err = control
            .call(Method::ServeStart, params.clone())
            .await
            .expect_err("no config");
        assert!(err.to_string().contains("didn't find section"));

        control
            .call(
                Method::ConfigCreate,
                json!({ "name": "ghost", "type": "dropbox", "parameters": {}, "opt": { "obscure": true, "nonInteractive": true } }),
            )
            .await
            .expect("create");
        let started: ServeStartResponse = invoke(&control, Method::ServeStart, &params)
            .await
            .expect("start");
        assert!(started.id.starts_with("http-"));
    }

    #[tokio::test]
    async fn async_copy_completes_after_enough_stats_reads() {
        let control = InMemoryControlPlane::with_progress_steps(2);
        control.put_object("src:", "big.bin", 10).await;

        let job: JobResponse = invoke(
            &control,
            Method::OperationsCopyFile,
            &json!({ "srcFs": "src:", "srcRemote": "big.bin", "dstFs": "dst:", "dstRemote": "big.bin", "_async": true }),
        )
        .await
        .expect("submit");

        let group = json!({ "group": format!("job/{}", job.jobid) });
        let first: CoreStats = invoke(&control, Method::CoreStats, &group).await.expect("stats");
        assert_eq!((first.bytes, first.total_bytes), (5, 10));
        assert!(control.object("dst:", "big.bin").await.is_none());

        let second: CoreStats = invoke(&control, Method::CoreStats, &group).await.expect("stats");
        assert_eq!(second.bytes, 10);
        assert!(second.transferring.is_empty());
        assert_eq!(control.object("dst:", "big.bin").await.map(|item| item.size), Some(10));
    }

    #[tokio::test]
    async fn injected_failures_surface_as_status_errors() {
        let control = InMemoryControlPlane::new();
        control.fail(Method::ServeStop, "boom").await;
        let err = control
            .call(Method::ServeStop, json!({ "id": "http-1" }))
            .await
            .expect_err("forced failure");
        assert!(matches!(err, RpcError::Status { status: 500, .. }));
        assert_eq!(control.count(Method::ServeStop).await, 1);
    }
}
