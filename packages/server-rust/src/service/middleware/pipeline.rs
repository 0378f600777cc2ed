//! Pipeline composition: wraps the operation service in its middleware.

use tower::ServiceBuilder;

use super::metrics::{MetricsLayer, MetricsService};
use crate::service::crud::OperationService;

/// The service stack the HTTP handlers dispatch commands through.
pub type OperationPipeline = MetricsService<OperationService>;

/// Build the operation pipeline around an [`OperationService`].
///
/// The only layer is [`MetricsLayer`] with its default slow threshold.
/// Timeouts, request ids and CORS belong to the HTTP layers.
#[must_use]
pub fn build_operation_pipeline(service: OperationService) -> OperationPipeline {
    ServiceBuilder::new().layer(MetricsLayer::default()).service(service)
}
