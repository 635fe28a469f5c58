use std::collections::HashMap;
use std::sync::Arc;

use cloudsync_contract::rpc::{Empty, IdRequest, ServeListResponse, ServeStartResponse};
use cloudsync_contract::{Config, Serve, ServeOptions, SERVE_TYPE_HTTP};
use cloudsync_rpc::{invoke, ControlPlane, Method};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::ports::{next_port, DEFAULT_BASE_PORT};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSettings {
    pub host: String,
    pub base_port: u16,
    #[serde(flatten)]
    pub options: ServeOptions,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            base_port: DEFAULT_BASE_PORT,
            options: ServeOptions::default(),
        }
    }
}

/// Proxy processes started through the control plane, keyed by config name.
pub struct ServeRegistry {
    control: Arc<dyn ControlPlane>,
    settings: ServeSettings,
    serves: RwLock<HashMap<String, Serve>>,
    /// Ports held by serves of remotes this registry does not manage.
    reserved: RwLock<Vec<u16>>,
}

impl ServeRegistry {
    pub fn new(control: Arc<dyn ControlPlane>, settings: ServeSettings) -> Self {
        Self {
            control,
            settings,
            serves: RwLock::new(HashMap::new()),
            reserved: RwLock::new(Vec::new()),
        }
    }

    /// Starts an http proxy for `name` rooted at `remote_path` and returns the
    /// control-plane id. The write lock is held until the entry is recorded so
    /// two starts never pick the same port.
    pub async fn start(&self, name: &str, remote_path: &str) -> Result<String, RegistryError> {
        let mut serves = self.serves.write().await;
        if serves.contains_key(name) {
            return Err(RegistryError::AlreadyServing(name.to_string()));
        }

        let mut used: Vec<u16> = serves.values().map(|serve| serve.port).collect();
        used.extend(self.reserved.read().await.iter().copied());
        let port = next_port(self.settings.base_port, &used);
        let mut serve = Serve {
            id: String::new(),
            name: name.to_string(),
            serve_type: SERVE_TYPE_HTTP.to_string(),
            fs: format!("{name}:{remote_path}"),
            addr: format!("{}:{port}", self.settings.host),
            port,
            options: self.settings.options.clone(),
        };

        let reply: ServeStartResponse =
            invoke(self.control.as_ref(), Method::ServeStart, &serve.params()).await?;
        serve.id = reply.id.clone();

        info!(name = %name, id = %serve.id, addr = %serve.addr, fs = %serve.fs, "serve started");
        serves.insert(name.to_string(), serve);
        Ok(reply.id)
    }

    /// Stops the proxy for `name`. The local entry is removed whatever the
    /// control plane answers.
    pub async fn stop(&self, name: &str) -> Result<(), RegistryError> {
        let mut serves = self.serves.write().await;
        let Some(serve) = serves.get(name) else {
            return Err(RegistryError::UnknownServe(name.to_string()));
        };

        if serve.id.is_empty() {
            warn!(name = %name, "serve has no control-plane id, dropping local entry");
            serves.remove(name);
            return Err(RegistryError::MissingServeId(name.to_string()));
        }

        let remote: Result<Empty, _> = invoke(
            self.control.as_ref(),
            Method::ServeStop,
            &IdRequest {
                id: serve.id.clone(),
            },
        )
        .await;
        let removed = serves.remove(name);

        match remote {
            Ok(_) => {
                info!(
                    name = %name,
                    port = removed.map(|serve| serve.port).unwrap_or_default(),
                    "serve stopped"
                );
                Ok(())
            }
            Err(err) => {
                warn!(name = %name, error = %err, "serve stop failed on control plane");
                Err(err.into())
            }
        }
    }

    /// Running serves reported by the control plane.
    pub async fn list(&self) -> Result<HashMap<String, Serve>, RegistryError> {
        let reply: ServeListResponse =
            invoke(self.control.as_ref(), Method::ServeList, &Empty::default()).await?;

        let mut serves = HashMap::with_capacity(reply.list.len());
        for entry in &reply.list {
            match Serve::from_list_entry(entry) {
                Some(serve) => {
                    serves.insert(serve.name.clone(), serve);
                }
                None => warn!(id = %entry.id, fs = %entry.params.fs, "skipping unrecognised serve"),
            }
        }
        Ok(serves)
    }

    /// Replaces local state with the control plane's serves for linked
    /// accounts. Serves of other remotes are left alone, but their ports stay
    /// off limits to `start`.
    pub async fn adopt(&self) -> Result<usize, RegistryError> {
        let mut serves = self.list().await?;
        let mut reserved = Vec::new();
        serves.retain(|name, serve| {
            let managed = Config::is_managed_name(name);
            if !managed {
                debug!(name = %name, port = serve.port, "ignoring serve of unmanaged remote");
                reserved.push(serve.port);
            }
            managed
        });
        let count = serves.len();
        *self.reserved.write().await = reserved;
        *self.serves.write().await = serves;
        info!(count, "adopted serves from control plane");
        Ok(count)
    }

    pub async fn get(&self, name: &str) -> Option<Serve> {
        self.serves.read().await.get(name).cloned()
    }

    pub async fn all(&self) -> HashMap<String, Serve> {
        self.serves.read().await.clone()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.serves.read().await.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudsync_contract::rpc::ConfigCreateRequest;
    use cloudsync_contract::ConfigKind;
    use cloudsync_rpc::InMemoryControlPlane;

    async fn control_with(names: &[&str]) -> Arc<InMemoryControlPlane> {
        let control = Arc::new(InMemoryControlPlane::new());
        for name in names {
            let mut request: ConfigCreateRequest =
                Config::new("alice", ConfigKind::Dropbox, name).create_request();
            request.name = name.to_string();
            let _: Empty = invoke(control.as_ref(), Method::ConfigCreate, &request)
                .await
                .expect("seed config");
        }
        control
    }

    #[tokio::test]
    async fn start_allocates_consecutive_ports() {
        let control = control_with(&["a", "b"]).await;
        let registry = ServeRegistry::new(control.clone(), ServeSettings::default());

        registry.start("a", "root").await.expect("start a");
        registry.start("b", "").await.expect("start b");

        let a = registry.get("a").await.expect("a");
        let b = registry.get("b").await.expect("b");
        assert_eq!(a.port, 17200);
        assert_eq!(a.fs, "a:root");
        assert_eq!(b.addr, "127.0.0.1:17201");
        assert!(!a.id.is_empty());
    }

    #[tokio::test]
    async fn second_start_for_same_name_is_rejected() {
        let control = control_with(&["a"]).await;
        let registry = ServeRegistry::new(control.clone(), ServeSettings::default());
        registry.start("a", "").await.expect("start");

        assert!(matches!(
            registry.start("a", "").await,
            Err(RegistryError::AlreadyServing(_))
        ));
        assert_eq!(control.count(Method::ServeStart).await, 1);
    }

    #[tokio::test]
    async fn stop_drops_entry_even_when_remote_fails() {
        let control = control_with(&["a"]).await;
        let registry = ServeRegistry::new(control.clone(), ServeSettings::default());
        registry.start("a", "").await.expect("start");

        control.fail(Method::ServeStop, "gone").await;
        assert!(registry.stop("a").await.is_err());
        assert!(!registry.contains("a").await);
        assert!(matches!(
            registry.stop("a").await,
            Err(RegistryError::UnknownServe(_))
        ));
    }

    #[tokio::test]
    async fn adopt_translates_control_plane_list() {
        let control = control_with(&["alice_dropbox_a", "sync"]).await;
        let seeded = ServeRegistry::new(control.clone(), ServeSettings::default());
        seeded
            .start("alice_dropbox_a", "bucket")
            .await
            .expect("seed serve");
        seeded.start("sync", "").await.expect("seed foreign serve");

        let fresh = ServeRegistry::new(control, ServeSettings::default());
        assert_eq!(fresh.adopt().await.expect("adopt"), 1);
        let serve = fresh.get("alice_dropbox_a").await.expect("adopted");
        assert_eq!(serve.port, 17200);
        assert_eq!(serve.fs, "alice_dropbox_a:bucket");
        assert!(!fresh.contains("sync").await);
    }

    #[tokio::test]
    async fn start_avoids_ports_of_unmanaged_serves() {
        let control = control_with(&["sync", "alice_dropbox_b"]).await;
        ServeRegistry::new(control.clone(), ServeSettings::default())
            .start("sync", "lan")
            .await
            .expect("seed foreign serve");

        let fresh = ServeRegistry::new(control.clone(), ServeSettings::default());
        assert_eq!(fresh.adopt().await.expect("adopt"), 0);
        fresh
            .start("alice_dropbox_b", "")
            .await
            .expect("start next to foreign serve");

        assert_eq!(fresh.get("alice_dropbox_b").await.expect("serve").port, 17201);
        let mut addrs: Vec<String> = control
            .serve_entries()
            .await
            .into_iter()
            .map(|entry| entry.addr)
            .collect();
        addrs.sort();
        assert_eq!(addrs, vec!["127.0.0.1:17200", "127.0.0.1:17201"]);
    }
}
