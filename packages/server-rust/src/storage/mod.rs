//! Persistence for operation rows.
//!
//! [`OperationStore`] is the seam between the service and the database.
//! Each method maps to exactly one statement (writes run inside their own
//! transaction), so every call is atomic on its own and no state is kept
//! between calls.
//!
//! Backends:
//! - [`PostgresOperationStore`] (feature `postgres`): `sqlx` connection pool
//! - [`MemoryOperationStore`]: in-process table for tests and ephemeral runs

pub mod factory;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use operations_core::{NewOperation, Operation, OperationId, OperationPatch};

pub use factory::{connect_store, StorageBackend, StorageConfig};
pub use memory::MemoryOperationStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresOperationStore;

/// Errors raised by an [`OperationStore`].
///
/// A missing row is not an error: lookups return `Option` and removals
/// return `bool`, and the caller decides what absence means.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The write would duplicate a value in a unique column. Nothing was applied.
    #[error("unique constraint violated on {column}: {value}")]
    UniqueViolation { column: &'static str, value: String },
    /// Any other backend failure (connectivity, unexpected constraint, decoding).
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Storage backend for operation rows.
///
/// Used as `Arc<dyn OperationStore>`.
#[async_trait]
pub trait OperationStore: Send + Sync {
    /// One-time setup, e.g. creating the table.
    async fn initialize(&self) -> Result<(), StoreError>;

    /// Cheap round trip used by readiness checks.
    async fn ping(&self) -> Result<(), StoreError>;

    /// All rows, in storage-native order.
    async fn list(&self) -> Result<Vec<Operation>, StoreError>;

    /// The row with the given id, if any.
    async fn get(&self, id: OperationId) -> Result<Option<Operation>, StoreError>;

    /// Inserts a row. Storage assigns `id` and `created_at`.
    ///
    /// Fails with [`StoreError::UniqueViolation`] when the name is taken.
    async fn insert(&self, new: &NewOperation) -> Result<Operation, StoreError>;

    /// Applies the present fields of `patch` and refreshes `updated_at`.
    ///
    /// Returns `None` when no row has the given id. Fails with
    /// [`StoreError::UniqueViolation`] when renaming onto a taken name.
    async fn update(
        &self,
        id: OperationId,
        patch: &OperationPatch,
    ) -> Result<Option<Operation>, StoreError>;

    /// Removes the row. Returns `false` when no row had the given id.
    async fn delete(&self, id: OperationId) -> Result<bool, StoreError>;

    /// Releases connections. Further calls may fail.
    async fn close(&self);
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{
        async_trait, NewOperation, Operation, OperationId, OperationPatch, OperationStore,
        StoreError,
    };

    fn down() -> StoreError {
        StoreError::Backend(anyhow::anyhow!("connection refused"))
    }

    /// Store whose every call fails with a backend error.
    pub(crate) struct FailingStore;

    #[async_trait]
    impl OperationStore for FailingStore {
        async fn initialize(&self) -> Result<(), StoreError> {
            Err(down())
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(down())
        }

        async fn list(&self) -> Result<Vec<Operation>, StoreError> {
            Err(down())
        }

        async fn get(&self, _id: OperationId) -> Result<Option<Operation>, StoreError> {
            Err(down())
        }

        async fn insert(&self, _new: &NewOperation) -> Result<Operation, StoreError> {
            Err(down())
        }

        async fn update(
            &self,
            _id: OperationId,
            _patch: &OperationPatch,
        ) -> Result<Option<Operation>, StoreError> {
            Err(down())
        }

        async fn delete(&self, _id: OperationId) -> Result<bool, StoreError> {
            Err(down())
        }

        async fn close(&self) {}
    }
}
