use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use cloudsync_contract::{Config, ConfigKind, Serve};
use cloudsync_registry::Reconciler;
use cloudsync_rpc::{ControlPlane, Method};
use cloudsync_transfer::{
    Orchestrator, ProgressSink, TransferRecord, TransferRequest, TransferStatus,
};
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SseUpdate {
    pub event_type: String,
    pub data: Value,
}

#[derive(Debug, Deserialize)]
struct ReconcileBody {
    configs: Vec<Config>,
}

/// Public view of a linked account; credentials never leave the process.
#[derive(Debug, Serialize)]
struct ConfigSummary {
    name: String,
    #[serde(rename = "type")]
    kind: ConfigKind,
    bucket: String,
    endpoint: String,
    serving: bool,
    addr: Option<String>,
}

struct TransferTask {
    record: TransferRecord,
    cancel: CancellationToken,
}

/// In-memory table of submitted transfers. The lock is never held across an
/// await point.
#[derive(Default)]
pub struct TransferTable {
    tasks: RwLock<HashMap<String, TransferTask>>,
}

impl TransferTable {
    fn insert(&self, record: TransferRecord, cancel: CancellationToken) {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.insert(record.transfer_id.clone(), TransferTask { record, cancel });
    }

    pub fn get(&self, transfer_id: &str) -> Option<TransferRecord> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        tasks.get(transfer_id).map(|task| task.record.clone())
    }

    pub fn list(&self) -> Vec<TransferRecord> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        let mut records: Vec<TransferRecord> =
            tasks.values().map(|task| task.record.clone()).collect();
        records.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        records
    }

    fn update<F>(&self, transfer_id: &str, apply: F) -> Option<TransferRecord>
    where
        F: FnOnce(&mut TransferRecord),
    {
        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        tasks.get_mut(transfer_id).map(|task| {
            apply(&mut task.record);
            task.record.updated_at = Utc::now().to_rfc3339();
            task.record.clone()
        })
    }

    fn cancel_token(&self, transfer_id: &str) -> Option<(TransferStatus, CancellationToken)> {
        let tasks = self.tasks.read().unwrap_or_else(PoisonError::into_inner);
        tasks
            .get(transfer_id)
            .map(|task| (task.record.status, task.cancel.clone()))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub control: Arc<dyn ControlPlane>,
    pub reconciler: Arc<Reconciler>,
    pub orchestrator: Arc<Orchestrator>,
    pub transfers: Arc<TransferTable>,
    pub sse_bus: broadcast::Sender<SseUpdate>,
    pub auth_token: Option<String>,
    pub require_bearer: bool,
}

impl AppState {
    pub fn new(
        control: Arc<dyn ControlPlane>,
        reconciler: Arc<Reconciler>,
        orchestrator: Arc<Orchestrator>,
        auth_token: Option<String>,
        require_bearer: bool,
    ) -> Self {
        let (sse_bus, _) = broadcast::channel(256);
        Self {
            control,
            reconciler,
            orchestrator,
            transfers: Arc::new(TransferTable::default()),
            sse_bus,
            auth_token,
            require_bearer,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .route("/v1/reconcile", post(post_reconcile))
        .route("/v1/configs", get(get_configs))
        .route("/v1/serves", get(get_serves))
        .route("/v1/transfers", get(list_transfers).post(post_transfer))
        .route("/v1/transfers/stream", get(stream_transfers))
        .route(
            "/v1/transfers/{transfer_id}",
            get(get_transfer).delete(cancel_transfer),
        )
        .with_state(state)
}

async fn health_live() -> impl IntoResponse {
    Json(json!({
        "status": "live",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.control.call(Method::Noop, json!({})).await.is_ok();
    let payload = Json(json!({
        "status": if ready { "ready" } else { "degraded" },
        "timestamp": Utc::now().to_rfc3339()
    }));

    if ready {
        (StatusCode::OK, payload).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, payload).into_response()
    }
}

async fn post_reconcile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ReconcileBody>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    authorize(&state, &headers, true)?;

    let report = state.reconciler.reconcile(&payload.configs).await;
    let failures: Vec<Value> = report
        .failures
        .iter()
        .map(|failure| {
            json!({
                "name": failure.name,
                "phase": failure.phase,
                "error": failure.to_string(),
            })
        })
        .collect();

    info!(
        desired = payload.configs.len(),
        failures = failures.len(),
        "reconcile requested over http"
    );
    emit(
        &state,
        "reconcile.completed",
        json!({
            "created": report.plan.create.len(),
            "updated": report.plan.update.len(),
            "deleted": report.plan.delete.len(),
            "failures": failures.len(),
        }),
    );

    Ok((
        StatusCode::OK,
        Json(json!({
            "created": report.plan.create.iter().map(|config| &config.name).collect::<Vec<_>>(),
            "updated": report.plan.update.iter().map(|config| &config.name).collect::<Vec<_>>(),
            "deleted": report.plan.delete,
            "failures": failures,
        })),
    ))
}

async fn get_configs(State(state): State<AppState>) -> impl IntoResponse {
    let items: Vec<ConfigSummary> = state
        .reconciler
        .served_configs()
        .await
        .into_iter()
        .map(|(config, serve)| ConfigSummary {
            name: config.name,
            kind: config.kind,
            bucket: config.bucket,
            endpoint: config.endpoint,
            serving: serve.is_some(),
            addr: serve.map(|serve| serve.addr),
        })
        .collect();
    Json(json!({ "items": items }))
}

async fn get_serves(State(state): State<AppState>) -> impl IntoResponse {
    let mut items: Vec<Serve> = state.reconciler.serves().all().await.into_values().collect();
    items.sort_by_key(|serve| serve.port);
    Json(json!({ "items": items }))
}

async fn list_transfers(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "items": state.transfers.list() }))
}

async fn post_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TransferRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    authorize(&state, &headers, true)?;

    let request = payload.normalized();
    request.validate().map_err(|err| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_transfer", "detail": err.to_string() })),
        )
    })?;

    let transfer_id = Uuid::now_v7().to_string();
    let record = TransferRecord::queued(
        transfer_id.clone(),
        request.clone(),
        Utc::now().to_rfc3339(),
    );
    let submitted_at = record.submitted_at.clone();
    let cancel = CancellationToken::new();
    state.transfers.insert(record, cancel.clone());

    emit(
        &state,
        "transfer.status.changed",
        json!({ "transfer_id": transfer_id.clone(), "status": "queued" }),
    );

    let state_for_task = state.clone();
    let transfer_id_for_task = transfer_id.clone();
    tokio::spawn(async move {
        process_transfer(state_for_task, transfer_id_for_task, request, cancel).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "transfer_id": transfer_id.clone(),
            "submitted_at": submitted_at,
            "status_url": format!("/v1/transfers/{}", transfer_id)
        })),
    ))
}

struct TaskProgress {
    state: AppState,
    transfer_id: String,
}

impl ProgressSink for TaskProgress {
    fn update_total_size(&self, bytes: u64) {
        self.state.transfers.update(&self.transfer_id, |record| {
            record.total_bytes = Some(bytes);
        });
        emit(
            &self.state,
            "transfer.size",
            json!({ "transfer_id": self.transfer_id, "total_bytes": bytes }),
        );
    }

    fn update_progress(&self, percent: u8, bytes: u64) {
        self.state.transfers.update(&self.transfer_id, |record| {
            record.percent = record.percent.max(percent);
            record.bytes = bytes;
        });
        emit(
            &self.state,
            "transfer.progress",
            json!({ "transfer_id": self.transfer_id, "percent": percent, "bytes": bytes }),
        );
    }
}

async fn process_transfer(
    state: AppState,
    transfer_id: String,
    request: TransferRequest,
    cancel: CancellationToken,
) {
    state.transfers.update(&transfer_id, |record| {
        record.status = TransferStatus::Running;
    });
    emit(
        &state,
        "transfer.status.changed",
        json!({ "transfer_id": transfer_id, "status": "running" }),
    );

    let sink = TaskProgress {
        state: state.clone(),
        transfer_id: transfer_id.clone(),
    };
    let outcome = state.orchestrator.execute(&request, &sink, &cancel).await;

    match &outcome {
        Ok(()) => info!(transfer_id = %transfer_id, "transfer completed"),
        Err(err) if err.is_cancelled() => info!(transfer_id = %transfer_id, "transfer cancelled"),
        Err(err) => error!(transfer_id = %transfer_id, error = %err, "transfer failed"),
    }

    let now = Utc::now().to_rfc3339();
    if let Some(record) = state
        .transfers
        .update(&transfer_id, |record| record.finish(&outcome, now))
    {
        emit(
            &state,
            "transfer.status.changed",
            json!({
                "transfer_id": transfer_id,
                "status": record.status,
                "reason": record.failure_reason,
            }),
        );
    }
}

async fn get_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    match state.transfers.get(&transfer_id) {
        Some(record) => Ok((StatusCode::OK, Json(record))),
        None => Err(not_found()),
    }
}

async fn cancel_transfer(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transfer_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, Json<Value>)> {
    authorize(&state, &headers, true)?;

    let Some((status, cancel)) = state.transfers.cancel_token(&transfer_id) else {
        return Err(not_found());
    };
    if status.is_terminal() {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({ "error": "transfer_already_finished", "status": status })),
        ));
    }

    cancel.cancel();
    info!(transfer_id = %transfer_id, "transfer cancellation requested");
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "transfer_id": transfer_id, "status": "cancelling" })),
    ))
}

async fn stream_transfers(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, std::convert::Infallible>>> {
    let receiver = state.sse_bus.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(|item| async move {
        match item {
            Ok(update) => {
                let data = serde_json::to_string(&update.data).unwrap_or_else(|_| "{}".to_string());
                Some(Ok(SseEvent::default().event(update.event_type).data(data)))
            }
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(std::time::Duration::from_secs(15)))
}

fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    write_operation: bool,
) -> Result<(), (StatusCode, Json<Value>)> {
    if !write_operation || !state.require_bearer {
        return Ok(());
    }

    let token = state.auth_token.as_deref().ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error":"auth_token_required_but_not_configured"})),
        )
    })?;

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if provided == format!("Bearer {token}") {
        Ok(())
    } else {
        warn!("rejected write request without a valid bearer token");
        Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"invalid_or_missing_bearer_token"})),
        ))
    }
}

fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error":"transfer_not_found"})),
    )
}

fn emit(state: &AppState, event_type: &str, data: Value) {
    let _ = state.sse_bus.send(SseUpdate {
        event_type: event_type.to_string(),
        data,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use cloudsync_registry::ServeSettings;
    use cloudsync_rpc::InMemoryControlPlane;
    use cloudsync_transfer::{Operations, TransferSettings};
    use tower::ServiceExt;

    const TOKEN: &str = "s3cret";

    fn state_with(control: Arc<InMemoryControlPlane>, require_bearer: bool) -> AppState {
        let reconciler = Arc::new(Reconciler::new(control.clone(), ServeSettings::default()));
        let orchestrator = Arc::new(Orchestrator::new(
            Operations::new(control.clone()),
            TransferSettings {
                poll_interval_secs: 1,
                ..TransferSettings::default()
            },
        ));
        AppState::new(
            control,
            reconciler,
            orchestrator,
            Some(TOKEN.to_string()),
            require_bearer,
        )
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: Value, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    fn movie_copy() -> Value {
        json!({
            "owner": "alice",
            "action": "copy",
            "src": { "owner": "alice", "type": "awss3", "extend": "AK1", "path": "/b1/movie.mkv" },
            "dst": { "owner": "alice", "type": "dropbox", "extend": "DK", "path": "/Videos/" }
        })
    }

    async fn wait_terminal(router: &Router, transfer_id: &str) -> Value {
        for _ in 0..200 {
            let (_, body) = send(router, get_request(&format!("/v1/transfers/{transfer_id}"))).await;
            let status: TransferStatus =
                serde_json::from_value(body["status"].clone()).expect("status");
            if status.is_terminal() {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }
        panic!("transfer {transfer_id} never finished");
    }

    #[tokio::test]
    async fn health_endpoints_report_live_and_ready() {
        let router = build_router(state_with(Arc::new(InMemoryControlPlane::new()), false));

        let (status, body) = send(&router, get_request("/health/live")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "live");

        let (status, body) = send(&router, get_request("/health/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ready");
    }

    #[tokio::test]
    async fn reconcile_requires_bearer_and_starts_serves() {
        let router = build_router(state_with(Arc::new(InMemoryControlPlane::new()), true));
        let desired = json!({
            "configs": [{ "name": "alice_awss3_AK1", "type": "awss3", "bucket": "b1" }]
        });

        let (status, _) = send(
            &router,
            json_request("POST", "/v1/reconcile", desired.clone(), None),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &router,
            json_request("POST", "/v1/reconcile", desired, Some(TOKEN)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], json!(["alice_awss3_AK1"]));
        assert_eq!(body["failures"], json!([]));

        let (_, serves) = send(&router, get_request("/v1/serves")).await;
        assert_eq!(serves["items"][0]["fs"], "alice_awss3_AK1:b1");
        assert_eq!(serves["items"][0]["port"], 17200);

        let (_, configs) = send(&router, get_request("/v1/configs")).await;
        assert_eq!(configs["items"][0]["serving"], true);
        assert!(configs["items"][0].get("secret_access_key").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn transfer_runs_to_success() {
        let control = Arc::new(InMemoryControlPlane::with_progress_steps(2));
        control
            .put_object("alice_awss3_AK1:", "b1/movie.mkv", 2048)
            .await;
        let router = build_router(state_with(control.clone(), false));

        let (status, body) = send(
            &router,
            json_request("POST", "/v1/transfers", movie_copy(), None),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        let transfer_id = body["transfer_id"].as_str().expect("id").to_string();

        let record = wait_terminal(&router, &transfer_id).await;
        assert_eq!(record["status"], "success");
        assert_eq!(record["percent"], 100);
        assert_eq!(record["total_bytes"], 2048);
        assert!(control
            .object("alice_dropbox_DK:", "Videos/movie.mkv")
            .await
            .is_some());

        let (_, listing) = send(&router, get_request("/v1/transfers")).await;
        assert_eq!(listing["items"].as_array().map(Vec::len), Some(1));

        let (status, _) = send(
            &router,
            json_request("DELETE", &format!("/v1/transfers/{transfer_id}"), json!({}), None),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_a_transfer_stops_its_job() {
        let control = Arc::new(InMemoryControlPlane::with_progress_steps(1000));
        control
            .put_object("alice_awss3_AK1:", "b1/movie.mkv", 1 << 30)
            .await;
        let router = build_router(state_with(control.clone(), false));

        let (_, body) = send(
            &router,
            json_request("POST", "/v1/transfers", movie_copy(), None),
        )
        .await;
        let transfer_id = body["transfer_id"].as_str().expect("id").to_string();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let (status, _) = send(
            &router,
            json_request("DELETE", &format!("/v1/transfers/{transfer_id}"), json!({}), None),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let record = wait_terminal(&router, &transfer_id).await;
        assert_eq!(record["status"], "cancelled");
        assert_eq!(control.count(Method::JobStop).await, 1);
    }

    #[tokio::test]
    async fn invalid_and_unknown_transfers_are_rejected() {
        let router = build_router(state_with(Arc::new(InMemoryControlPlane::new()), false));

        let upload_from_cloud = json!({
            "owner": "alice",
            "action": "upload",
            "src": { "owner": "alice", "type": "dropbox", "extend": "DK", "path": "/a.txt" },
            "dst": { "owner": "alice", "type": "awss3", "extend": "AK1", "path": "/b1/" }
        });
        let (status, body) = send(
            &router,
            json_request("POST", "/v1/transfers", upload_from_cloud, None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_transfer");

        let (status, _) = send(&router, get_request("/v1/transfers/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
