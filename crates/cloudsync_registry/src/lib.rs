//! Config and serve registries kept in line with the linked accounts.

pub mod config_registry;
pub mod error;
pub mod ports;
pub mod reconciler;
pub mod serve_registry;

pub use config_registry::ConfigRegistry;
pub use error::RegistryError;
pub use ports::{gap_boundary, next_port, DEFAULT_BASE_PORT};
pub use reconciler::{Phase, ReconcileFailure, ReconcilePlan, ReconcileReport, Reconciler};
pub use serve_registry::{ServeRegistry, ServeSettings};
