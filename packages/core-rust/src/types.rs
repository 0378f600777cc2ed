use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Storage-assigned identifier of an [`Operation`] row (`SERIAL` column).
pub type OperationId = i32;

/// A persisted operation: a uniquely named record with an optional description.
///
/// Rows are owned by the storage layer. The service never caches them between
/// requests, so every value of this type is a snapshot taken by a single
/// statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Primary key, assigned once by storage and never reused.
    pub id: OperationId,
    /// Unique across the whole table.
    pub name: String,
    /// Free-form text. `None` when the column is NULL.
    pub description: Option<String>,
    /// Set when the row is inserted, never modified afterwards.
    pub created_at: NaiveDateTime,
    /// Refreshed on every update; `None` until the first one.
    pub updated_at: Option<NaiveDateTime>,
}
