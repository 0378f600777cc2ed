//! Operation execution.
//!
//! Requests flow through the service layer in three steps:
//!
//! 1. **Commands** (`operation`): HTTP handlers build an `OperationCommand`
//! 2. **Middleware** (`middleware`): Tower layers (metrics)
//! 3. **Execution** (`crud`): `OperationService` runs one storage call per
//!    command and classifies the outcome

pub mod crud;
pub mod middleware;
pub mod operation;

pub use crud::OperationService;
pub use middleware::{build_operation_pipeline, OperationPipeline};
pub use operation::{OperationCommand, OperationError, OperationReply};
