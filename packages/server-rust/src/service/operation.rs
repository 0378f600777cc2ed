//! Command, reply and error types flowing through the operation pipeline.

use operations_core::{NewOperation, Operation, OperationId, OperationPatch};

use crate::storage::StoreError;

/// A single request against the operation table.
///
/// Each command is executed as exactly one storage statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationCommand {
    List,
    Get { id: OperationId },
    Create(NewOperation),
    Update { id: OperationId, patch: OperationPatch },
    Delete { id: OperationId },
}

impl OperationCommand {
    /// Short name used in logs and spans.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            OperationCommand::List => "list",
            OperationCommand::Get { .. } => "get",
            OperationCommand::Create(_) => "create",
            OperationCommand::Update { .. } => "update",
            OperationCommand::Delete { .. } => "delete",
        }
    }
}

/// Successful outcome of a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationReply {
    /// `List` found at least one row.
    Listed(Vec<Operation>),
    /// `List` found no rows. Distinct from a listing with zero entries.
    Empty,
    Found(Operation),
    Created(Operation),
    Updated(Operation),
    Deleted { id: OperationId },
}

/// Classified failure of a command.
///
/// The `Display` text of `NotFound` and `Conflict` is the message returned
/// to HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("Operation does not exist")]
    NotFound { id: i64 },
    #[error("An operation with this name already exists")]
    Conflict { name: String },
    #[error("storage failure: {0}")]
    Storage(#[source] StoreError),
}

impl OperationError {
    /// Outcome label recorded by the metrics layer.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            OperationError::NotFound { .. } => "not_found",
            OperationError::Conflict { .. } => "conflict",
            OperationError::Storage(_) => "error",
        }
    }
}

impl From<StoreError> for OperationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniqueViolation { value, .. } => OperationError::Conflict { name: value },
            other @ StoreError::Backend(_) => OperationError::Storage(other),
        }
    }
}
