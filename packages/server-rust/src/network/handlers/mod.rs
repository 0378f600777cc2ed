//! HTTP handlers and the state they share.

pub mod health;
pub mod operations;

pub use health::{health_handler, liveness_handler, readiness_handler, HealthReport};
pub use operations::{
    create_operation, delete_operation, get_operation, list_operations, update_operation,
};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::OperationPipeline;
use crate::storage::OperationStore;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references and a cloneable pipeline, so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Command pipeline every operations handler dispatches through.
    pub pipeline: OperationPipeline,
    /// Store handle used directly by readiness checks.
    pub store: Arc<dyn OperationStore>,
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
