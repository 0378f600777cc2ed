//! In-process [`OperationStore`] implementation.
//!
//! Rows live behind a single [`RwLock`], so each call observes and mutates
//! the table atomically, the way a single-statement transaction would.
//! Suitable for tests and for running the service without a database.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use operations_core::{columns, NewOperation, Operation, OperationId, OperationPatch};
use parking_lot::RwLock;

use super::{OperationStore, StoreError};

#[derive(Default)]
struct Table {
    rows: BTreeMap<OperationId, Operation>,
    /// Unique index: name -> id.
    names: HashMap<String, OperationId>,
    /// Last id handed out. Ids of deleted rows are never reused.
    last_id: OperationId,
}

/// In-memory table of operations with the same uniqueness and id rules as
/// the `operation` table in PostgreSQL.
#[derive(Default)]
pub struct MemoryOperationStore {
    table: RwLock<Table>,
}

impl MemoryOperationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.read().rows.len()
    }
}

fn name_taken(name: &str) -> StoreError {
    StoreError::UniqueViolation {
        column: columns::NAME,
        value: name.to_string(),
    }
}

#[async_trait]
impl OperationStore for MemoryOperationStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Operation>, StoreError> {
        Ok(self.table.read().rows.values().cloned().collect())
    }

    async fn get(&self, id: OperationId) -> Result<Option<Operation>, StoreError> {
        Ok(self.table.read().rows.get(&id).cloned())
    }

    async fn insert(&self, new: &NewOperation) -> Result<Operation, StoreError> {
        let mut table = self.table.write();
        if table.names.contains_key(&new.name) {
            return Err(name_taken(&new.name));
        }

        let id = table
            .last_id
            .checked_add(1)
            .ok_or_else(|| anyhow::anyhow!("operation id sequence exhausted"))?;
        table.last_id = id;

        let row = Operation {
            id,
            name: new.name.clone(),
            description: Some(new.description.clone()),
            created_at: Utc::now().naive_utc(),
            updated_at: None,
        };
        table.names.insert(row.name.clone(), id);
        table.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn update(
        &self,
        id: OperationId,
        patch: &OperationPatch,
    ) -> Result<Option<Operation>, StoreError> {
        let mut guard = self.table.write();
        let table = &mut *guard;

        let Some(row) = table.rows.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(name) = &patch.name {
            match table.names.get(name).copied() {
                Some(owner) if owner != id => return Err(name_taken(name)),
                Some(_) => {}
                None => {
                    table.names.remove(&row.name);
                    table.names.insert(name.clone(), id);
                    row.name.clone_from(name);
                }
            }
        }
        if let Some(description) = &patch.description {
            row.description = Some(description.clone());
        }
        row.updated_at = Some(Utc::now().naive_utc());

        Ok(Some(row.clone()))
    }

    async fn delete(&self, id: OperationId) -> Result<bool, StoreError> {
        let mut table = self.table.write();
        match table.rows.remove(&id) {
            Some(row) => {
                table.names.remove(&row.name);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn close(&self) {}
}
