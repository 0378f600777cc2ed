//! Tower middleware layers for the operation pipeline.
//!
//! - [`metrics`]: Command timing and outcome via `tracing` spans
//! - [`pipeline`]: Composes the layers around the operation service

pub mod metrics;
pub mod pipeline;

pub use metrics::{MetricsLayer, MetricsService};
pub use pipeline::{build_operation_pipeline, OperationPipeline};
