//! HTTP surface over reconciliation and transfer orchestration.

pub mod app;

pub use app::{build_router, AppState, SseUpdate, TransferTable};
