use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use cloudsync_contract::Config;
use cloudsync_control_plane::{build_router, AppState};
use cloudsync_registry::{Reconciler, ServeSettings};
use cloudsync_rpc::{
    ControlPlane, HttpControlPlane, HttpControlPlaneConfig, InMemoryControlPlane, RetryPolicy,
};
use cloudsync_transfer::{Operations, Orchestrator, TransferSettings};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Cloud storage reconciliation and transfer daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Adopt control-plane state and serve the HTTP API.
    Serve {
        #[arg(long, default_value = "config/cloudsync.toml")]
        config: PathBuf,
    },
    /// Run a single reconcile pass against a JSON list of configs.
    Reconcile {
        #[arg(long, default_value = "config/cloudsync.toml")]
        config: PathBuf,
        #[arg(long)]
        desired: PathBuf,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct RuntimeConfig {
    control_plane: ControlPlaneSection,
    http: HttpSection,
    serve: ServeSettings,
    transfer: TransferSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ControlPlaneMode {
    #[default]
    Http,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct ControlPlaneSection {
    endpoint: String,
    mode: ControlPlaneMode,
    username: Option<String>,
    password: Option<String>,
    request_timeout_secs: u64,
    retry_attempts: u32,
    retry_base_delay_ms: u64,
}

impl Default for ControlPlaneSection {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:5572".to_string(),
            mode: ControlPlaneMode::Http,
            username: None,
            password: None,
            request_timeout_secs: 30,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

impl ControlPlaneSection {
    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct HttpSection {
    bind: String,
    auth_token: Option<String>,
}

impl Default for HttpSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8780".to_string(),
            auth_token: None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
        Command::Reconcile { config, desired } => reconcile_once(config, desired).await,
    }
}

fn load_config(config_path: &Path) -> Result<RuntimeConfig> {
    let config_source = std::fs::read_to_string(config_path)
        .with_context(|| format!("failed to read config file {}", config_path.display()))?;
    toml::from_str(&config_source)
        .with_context(|| format!("invalid config TOML at {}", config_path.display()))
}

fn connect(section: &ControlPlaneSection) -> Result<Arc<dyn ControlPlane>> {
    match section.mode {
        ControlPlaneMode::Memory => {
            warn!("using in-memory control plane: nothing reaches real storage");
            Ok(Arc::new(InMemoryControlPlane::new()))
        }
        ControlPlaneMode::Http => {
            let control = HttpControlPlane::new(HttpControlPlaneConfig {
                endpoint: section.endpoint.clone(),
                username: section.username.clone(),
                password: section.password.clone(),
                request_timeout: section.request_timeout(),
                retry: RetryPolicy {
                    max_attempts: section.retry_attempts.max(1),
                    base_delay: Duration::from_millis(section.retry_base_delay_ms),
                },
            })
            .with_context(|| format!("failed to build client for {}", section.endpoint))?;
            info!(endpoint = %section.endpoint, "control plane client ready");
            Ok(Arc::new(control))
        }
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;

    let require_bearer = requires_token(&config.http.bind);
    if require_bearer && config.http.auth_token.is_none() {
        return Err(anyhow!(
            "non-loopback bind {} requires http.auth_token",
            config.http.bind
        ));
    }

    if !require_bearer {
        info!("loopback bind detected: bearer auth optional");
    } else {
        warn!("non-loopback bind detected: bearer auth enforced");
    }

    let control = connect(&config.control_plane)?;
    let reconciler = Arc::new(Reconciler::new(control.clone(), config.serve.clone()));
    match reconciler.adopt().await {
        Ok((configs, serves)) => info!(configs, serves, "adopted control-plane state"),
        Err(err) => warn!(error = %err, "could not adopt control-plane state, starting empty"),
    }

    let operations =
        Operations::with_timeout(control.clone(), config.control_plane.request_timeout());
    let orchestrator = Arc::new(Orchestrator::new(operations, config.transfer.clone()));

    let state = AppState::new(
        control,
        reconciler,
        orchestrator,
        config.http.auth_token.clone(),
        require_bearer,
    );
    let app = build_router(state);

    let socket: SocketAddr = config
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid socket address {}", config.http.bind))?;

    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;

    info!(bind = %config.http.bind, "cloudsyncd listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server failed")
}

async fn reconcile_once(config_path: PathBuf, desired_path: PathBuf) -> Result<()> {
    let config = load_config(&config_path)?;
    let desired_source = std::fs::read_to_string(&desired_path)
        .with_context(|| format!("failed to read desired configs {}", desired_path.display()))?;
    let desired: Vec<Config> = serde_json::from_str(&desired_source)
        .with_context(|| format!("invalid desired config JSON at {}", desired_path.display()))?;

    let control = connect(&config.control_plane)?;
    let reconciler = Reconciler::new(control, config.serve);
    reconciler
        .adopt()
        .await
        .context("failed to adopt control-plane state")?;

    let report = reconciler.reconcile(&desired).await;
    let failures: Vec<String> = report.failures.iter().map(ToString::to_string).collect();
    let names = |configs: &[Config]| -> Vec<String> {
        configs.iter().map(|config| config.name.clone()).collect()
    };
    let summary = json!({
        "created": names(&report.plan.create),
        "updated": names(&report.plan.update),
        "deleted": report.plan.delete,
        "failures": failures,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("failed to render report")?
    );

    if report.is_clean() {
        Ok(())
    } else {
        Err(anyhow!("{} remote(s) failed to reconcile", report.failures.len()))
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

fn requires_token(bind: &str) -> bool {
    match bind.parse::<SocketAddr>() {
        Ok(addr) => !addr.ip().is_loopback(),
        Err(_) => true,
    }
}
