use std::collections::HashMap;
use std::sync::Arc;

use cloudsync_contract::rpc::{ConfigDump, Empty, NameRequest};
use cloudsync_contract::Config;
use cloudsync_rpc::{invoke, ControlPlane, Method};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::RegistryError;

/// Local mirror of the credential records known to the control plane.
pub struct ConfigRegistry {
    control: Arc<dyn ControlPlane>,
    configs: RwLock<HashMap<String, Config>>,
}

impl ConfigRegistry {
    pub fn new(control: Arc<dyn ControlPlane>) -> Self {
        Self {
            control,
            configs: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self, config: &Config) -> Result<(), RegistryError> {
        let request = config.create_request();
        let _: Empty = invoke(self.control.as_ref(), Method::ConfigCreate, &request).await?;

        self.configs
            .write()
            .await
            .insert(config.name.clone(), config.clone());
        info!(name = %config.name, kind = %config.kind, "config created");
        Ok(())
    }

    /// Removes the remote record, then the local one. The local entry is
    /// dropped even when the control plane rejects the delete.
    pub async fn delete(&self, name: &str) -> Result<(), RegistryError> {
        let remote: Result<Empty, _> = invoke(
            self.control.as_ref(),
            Method::ConfigDelete,
            &NameRequest {
                name: name.to_string(),
            },
        )
        .await;

        self.configs.write().await.remove(name);

        match remote {
            Ok(_) => {
                info!(name = %name, "config deleted");
                Ok(())
            }
            Err(err) => {
                warn!(name = %name, error = %err, "config delete failed on control plane");
                Err(err.into())
            }
        }
    }

    /// Authoritative set held by the control plane. Entries that do not map
    /// to a supported account type are skipped.
    pub async fn dump(&self) -> Result<HashMap<String, Config>, RegistryError> {
        let dump: ConfigDump =
            invoke(self.control.as_ref(), Method::ConfigDump, &Empty::default()).await?;

        let mut configs = HashMap::with_capacity(dump.len());
        for (name, parameters) in dump {
            match Config::from_dump(&name, &parameters) {
                Ok(config) => {
                    configs.insert(name, config);
                }
                Err(err) => warn!(name = %name, error = %err, "skipping foreign config"),
            }
        }
        Ok(configs)
    }

    /// Replaces local state with the control plane's configs for linked
    /// accounts. Other remotes, such as the LAN sync remote, are left alone.
    pub async fn adopt(&self) -> Result<usize, RegistryError> {
        let mut configs = self.dump().await?;
        configs.retain(|name, _| {
            let managed = Config::is_managed_name(name);
            if !managed {
                debug!(name = %name, "ignoring config of unmanaged remote");
            }
            managed
        });
        let count = configs.len();
        *self.configs.write().await = configs;
        info!(count, "adopted configs from control plane");
        Ok(count)
    }

    pub async fn get(&self, name: &str) -> Option<Config> {
        self.configs.read().await.get(name).cloned()
    }

    pub async fn all(&self) -> HashMap<String, Config> {
        self.configs.read().await.clone()
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.configs.read().await.contains_key(name)
    }
}
