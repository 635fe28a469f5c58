//! Request channel to the local control-plane daemon.

pub mod client;
pub mod http;
pub mod memory;

pub use client::{invoke, ControlPlane, Method, RpcError};
pub use http::{HttpControlPlane, HttpControlPlaneConfig, RetryPolicy};
pub use memory::{InMemoryControlPlane, RecordedCall};
