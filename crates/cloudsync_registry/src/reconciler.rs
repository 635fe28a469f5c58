use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use cloudsync_contract::{Config, Serve};
use cloudsync_rpc::ControlPlane;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config_registry::ConfigRegistry;
use crate::error::RegistryError;
use crate::serve_registry::{ServeRegistry, ServeSettings};

/// Work computed by diffing the registries against a desired config list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    pub create: Vec<Config>,
    pub update: Vec<Config>,
    pub delete: Vec<String>,
}

impl ReconcilePlan {
    /// Names known locally (as a config or a running serve) but not desired
    /// are deleted. Desired names without a config are created. Desired
    /// names whose config differs, or which lost their serve, are rebuilt.
    pub fn compute(
        current: &HashMap<String, Config>,
        serving: &BTreeSet<String>,
        desired: &[Config],
    ) -> Self {
        let desired: BTreeMap<&str, &Config> = desired
            .iter()
            .map(|config| (config.name.as_str(), config))
            .collect();

        let known: BTreeSet<&str> = current
            .keys()
            .map(String::as_str)
            .chain(serving.iter().map(String::as_str))
            .collect();

        let delete = known
            .into_iter()
            .filter(|name| !desired.contains_key(name))
            .map(str::to_string)
            .collect();

        let mut plan = Self {
            delete,
            ..Self::default()
        };
        for (name, wanted) in desired {
            match current.get(name) {
                None => plan.create.push(wanted.clone()),
                Some(existing) if !existing.is_equivalent(wanted) || !serving.contains(name) => {
                    plan.update.push(wanted.clone())
                }
                Some(_) => {}
            }
        }
        plan
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Delete,
    Update,
    Create,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Delete => "delete",
            Phase::Update => "update",
            Phase::Create => "create",
        })
    }
}

/// Every error raised while applying one entry of a plan.
#[derive(Debug)]
pub struct ReconcileFailure {
    pub name: String,
    pub phase: Phase,
    pub errors: Vec<RegistryError>,
}

impl fmt::Display for ReconcileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: ", self.phase, self.name)?;
        for (index, err) in self.errors.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ReconcileFailure {}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    pub plan: ReconcilePlan,
    pub failures: Vec<ReconcileFailure>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Owns both registries and serializes every pass that mutates them.
pub struct Reconciler {
    configs: ConfigRegistry,
    serves: ServeRegistry,
    pass: Mutex<()>,
}

impl Reconciler {
    pub fn new(control: Arc<dyn ControlPlane>, settings: ServeSettings) -> Self {
        Self {
            configs: ConfigRegistry::new(control.clone()),
            serves: ServeRegistry::new(control, settings),
            pass: Mutex::new(()),
        }
    }

    pub fn configs(&self) -> &ConfigRegistry {
        &self.configs
    }

    pub fn serves(&self) -> &ServeRegistry {
        &self.serves
    }

    /// Loads the control plane's current configs and serves so the first
    /// pass diffs against reality.
    pub async fn adopt(&self) -> Result<(usize, usize), RegistryError> {
        let _pass = self.pass.lock().await;
        let configs = self.configs.adopt().await?;
        let serves = self.serves.adopt().await?;
        Ok((configs, serves))
    }

    /// Configs paired with their running serve, if any.
    pub async fn served_configs(&self) -> Vec<(Config, Option<Serve>)> {
        let serves = self.serves.all().await;
        let mut configs: Vec<Config> = self.configs.all().await.into_values().collect();
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        configs
            .into_iter()
            .map(|config| {
                let serve = serves.get(&config.name).cloned();
                (config, serve)
            })
            .collect()
    }

    /// Brings both registries in line with `desired`. Failures of single
    /// entries are logged and collected; the pass always runs to the end.
    pub async fn reconcile(&self, desired: &[Config]) -> ReconcileReport {
        let _pass = self.pass.lock().await;

        let current = self.configs.all().await;
        let serving: BTreeSet<String> = self.serves.all().await.into_keys().collect();
        let plan = ReconcilePlan::compute(&current, &serving, desired);

        if plan.is_empty() {
            debug!(desired = desired.len(), "registries already match desired configs");
            return ReconcileReport {
                plan,
                failures: Vec::new(),
            };
        }
        info!(
            create = plan.create.len(),
            update = plan.update.len(),
            delete = plan.delete.len(),
            "reconciling remotes"
        );

        let mut failures = Vec::new();

        for name in &plan.delete {
            let errors = self.teardown(name).await;
            if !errors.is_empty() {
                failures.push(ReconcileFailure {
                    name: name.clone(),
                    phase: Phase::Delete,
                    errors,
                });
            }
        }

        for config in &plan.update {
            let mut errors = self.teardown(&config.name).await;
            if let Err(err) = self.bring_up(config).await {
                errors.push(err);
            }
            if !errors.is_empty() {
                failures.push(ReconcileFailure {
                    name: config.name.clone(),
                    phase: Phase::Update,
                    errors,
                });
            }
        }

        for config in &plan.create {
            if let Err(err) = self.bring_up(config).await {
                failures.push(ReconcileFailure {
                    name: config.name.clone(),
                    phase: Phase::Create,
                    errors: vec![err],
                });
            }
        }

        for failure in &failures {
            error!(name = %failure.name, phase = %failure.phase, error = %failure, "reconcile entry failed");
        }

        self.observe().await;

        ReconcileReport { plan, failures }
    }

    /// Stops the serve and deletes the config concurrently. Both local
    /// entries are gone afterwards whatever the control plane answered.
    async fn teardown(&self, name: &str) -> Vec<RegistryError> {
        let (stopped, deleted) = tokio::join!(self.serves.stop(name), self.configs.delete(name));

        let mut errors = Vec::new();
        match stopped {
            Ok(()) => {}
            Err(RegistryError::UnknownServe(_)) => debug!(name = %name, "no serve to stop"),
            Err(err) => errors.push(err),
        }
        if let Err(err) = deleted {
            errors.push(err);
        }
        errors
    }

    async fn bring_up(&self, config: &Config) -> Result<(), RegistryError> {
        self.configs.create(config).await?;

        if self.serves.contains(&config.name).await {
            warn!(name = %config.name, "replacing serve left without a config");
            if let Err(err) = self.serves.stop(&config.name).await {
                warn!(name = %config.name, error = %err, "stale serve stop failed");
            }
        }

        self.serves.start(&config.name, config.target_path()).await?;
        Ok(())
    }

    /// Re-reads the control plane and logs where it disagrees with the
    /// local registries.
    async fn observe(&self) {
        let local_configs: BTreeSet<String> = self.configs.all().await.into_keys().collect();
        let local_serves: BTreeSet<String> = self.serves.all().await.into_keys().collect();

        match self.configs.dump().await {
            Ok(remote) => log_drift("config", &local_configs, remote.into_keys()),
            Err(err) => warn!(error = %err, "config dump after reconcile failed"),
        }
        match self.serves.list().await {
            Ok(remote) => log_drift("serve", &local_serves, remote.into_keys()),
            Err(err) => warn!(error = %err, "serve list after reconcile failed"),
        }

        info!(
            configs = local_configs.len(),
            serves = local_serves.len(),
            "reconcile pass finished"
        );
    }
}

fn log_drift(what: &str, local: &BTreeSet<String>, remote: impl Iterator<Item = String>) {
    let remote: BTreeSet<String> = remote
        .filter(|name| Config::is_managed_name(name))
        .collect();
    for name in remote.difference(local) {
        warn!(kind = what, name = %name, "control plane holds entry unknown locally");
    }
    for name in local.difference(&remote) {
        warn!(kind = what, name = %name, "local entry missing on control plane");
    }
}
