use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::client::{ControlPlane, Method, RpcError};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`: base, 2x base, 4x base, ...
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

#[derive(Debug, Clone)]
pub struct HttpControlPlaneConfig {
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for HttpControlPlaneConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5572".to_string(),
            username: None,
            password: None,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// JSON-over-POST client for the local control-plane daemon.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    client: Client,
    endpoint: String,
    credentials: Option<(String, Option<String>)>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl HttpControlPlane {
    pub fn new(config: HttpControlPlaneConfig) -> Result<Self, RpcError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| RpcError::Transport {
                method: Method::Noop,
                message: err.to_string(),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            credentials: config.username.map(|user| (user, config.password)),
            timeout: config.request_timeout,
            retry: config.retry,
        })
    }

    fn url(&self, method: Method) -> String {
        format!("{}/{}", self.endpoint, method.as_str())
    }

    async fn send_once(&self, method: Method, params: &Value) -> Result<Value, RpcError> {
        let mut request = self.client.post(self.url(method)).json(params);
        if let Some((user, password)) = &self.credentials {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                RpcError::Timeout {
                    method,
                    seconds: self.timeout.as_secs(),
                }
            } else {
                RpcError::Transport {
                    method,
                    message: err.to_string(),
                }
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|err| RpcError::Transport {
            method,
            message: err.to_string(),
        })?;

        if !status.is_success() {
            return Err(RpcError::Status {
                method,
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&body).map_err(|source| RpcError::Decode { method, source })
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn call(&self, method: Method, params: Value) -> Result<Value, RpcError> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            debug!(method = %method, attempt, "control-plane request");
            match self.send_once(method, &params).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        method = %method,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "control-plane request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use serde_json::json;

    use super::*;

    async fn flaky(State(hits): State<Arc<AtomicUsize>>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let seen = hits.fetch_add(1, Ordering::SeqCst);
        if seen < 2 {
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "error": "warming up" })))
        } else {
            (StatusCode::OK, Json(json!({ "echo": body["name"] })))
        }
    }

    async fn missing() -> (StatusCode, Json<Value>) {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "object not found" })))
    }

    async fn spawn_daemon(hits: Arc<AtomicUsize>) -> String {
        let app = Router::new()
            .route("/config/create", post(flaky))
            .route("/operations/stat", post(missing))
            .with_state(hits);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{addr}")
    }

    fn client(endpoint: String) -> HttpControlPlane {
        HttpControlPlane::new(HttpControlPlaneConfig {
            endpoint,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(5),
            },
            ..HttpControlPlaneConfig::default()
        })
        .expect("client")
    }

    #[tokio::test]
    async fn retries_server_errors_until_success() {
        let hits = Arc::new(AtomicUsize::new(0));
        let endpoint = spawn_daemon(hits.clone()).await;

        let reply = client(endpoint)
            .call(Method::ConfigCreate, json!({ "name": "alice_awss3_AK1" }))
            .await
            .expect("third attempt succeeds");

        assert_eq!(reply["echo"], "alice_awss3_AK1");
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn client_errors_are_surfaced_without_retry() {
        let hits = Arc::new(AtomicUsize::new(0));
        let endpoint = spawn_daemon(hits).await;

        let err = client(endpoint)
            .call(Method::OperationsStat, json!({ "fs": "x:", "remote": "nope" }))
            .await
            .expect_err("404 is final");

        match err {
            RpcError::Status { status, body, .. } => {
                assert_eq!(status, 404);
                assert!(body.contains("object not found"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }
}
