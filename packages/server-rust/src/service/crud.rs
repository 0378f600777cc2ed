//! The operation service: executes commands against an [`OperationStore`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::error;

use super::operation::{OperationCommand, OperationError, OperationReply};
use crate::storage::OperationStore;

/// Translates each [`OperationCommand`] into one storage call and interprets
/// the result.
///
/// Holds no state besides the store handle, so clones are cheap and
/// concurrent commands only contend inside the storage engine.
#[derive(Clone)]
pub struct OperationService {
    store: Arc<dyn OperationStore>,
}

impl OperationService {
    #[must_use]
    pub fn new(store: Arc<dyn OperationStore>) -> Self {
        Self { store }
    }

    /// Executes a single command.
    ///
    /// # Errors
    ///
    /// - [`OperationError::NotFound`] when get/update/delete match no row
    /// - [`OperationError::Conflict`] when create or a rename hits a taken name
    /// - [`OperationError::Storage`] for any other storage failure
    pub async fn execute(&self, command: OperationCommand) -> Result<OperationReply, OperationError> {
        let result = self.dispatch(command).await;
        if let Err(OperationError::Storage(err)) = &result {
            error!(error = %err, "storage failure");
        }
        result
    }

    async fn dispatch(&self, command: OperationCommand) -> Result<OperationReply, OperationError> {
        match command {
            OperationCommand::List => {
                let rows = self.store.list().await?;
                if rows.is_empty() {
                    Ok(OperationReply::Empty)
                } else {
                    Ok(OperationReply::Listed(rows))
                }
            }
            OperationCommand::Get { id } => match self.store.get(id).await? {
                Some(row) => Ok(OperationReply::Found(row)),
                None => Err(OperationError::NotFound { id: id.into() }),
            },
            OperationCommand::Create(new) => {
                let row = self.store.insert(&new).await?;
                Ok(OperationReply::Created(row))
            }
            OperationCommand::Update { id, patch } => match self.store.update(id, &patch).await? {
                Some(row) => Ok(OperationReply::Updated(row)),
                None => Err(OperationError::NotFound { id: id.into() }),
            },
            OperationCommand::Delete { id } => {
                if self.store.delete(id).await? {
                    Ok(OperationReply::Deleted { id })
                } else {
                    Err(OperationError::NotFound { id: id.into() })
                }
            }
        }
    }
}

impl Service<OperationCommand> for OperationService {
    type Response = OperationReply;
    type Error = OperationError;
    type Future = Pin<Box<dyn Future<Output = Result<OperationReply, OperationError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, command: OperationCommand) -> Self::Future {
        let this = self.clone();
        Box::pin(async move { this.execute(command).await })
    }
}

#[cfg(test)]
mod tests {
    use operations_core::{NewOperation, OperationId, OperationPatch};
    use tower::ServiceExt;

    use super::*;
    use crate::storage::testing::FailingStore;
    use crate::storage::MemoryOperationStore;

    fn service() -> OperationService {
        OperationService::new(Arc::new(MemoryOperationStore::new()))
    }

    fn create(name: &str, description: &str) -> OperationCommand {
        OperationCommand::Create(NewOperation {
            name: name.to_string(),
            description: description.to_string(),
        })
    }

    async fn created_id(svc: &OperationService, name: &str) -> OperationId {
        match svc.execute(create(name, "")).await.unwrap() {
            OperationReply::Created(row) => row.id,
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn list_on_empty_table_is_empty_not_listed() {
        let reply = service().execute(OperationCommand::List).await.unwrap();
        assert_eq!(reply, OperationReply::Empty);
    }

    #[tokio::test]
    async fn list_returns_all_rows() {
        let svc = service();
        created_id(&svc, "a").await;
        created_id(&svc, "b").await;

        match svc.execute(OperationCommand::List).await.unwrap() {
            OperationReply::Listed(rows) => {
                let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
                assert_eq!(names, vec!["a", "b"]);
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_create_is_conflict() {
        let svc = service();
        svc.execute(create("scan", "network scan")).await.unwrap();

        let err = svc.execute(create("scan", "other")).await.unwrap_err();
        assert!(matches!(err, OperationError::Conflict { .. }));
    }

    #[tokio::test]
    async fn missing_ids_are_not_found() {
        let svc = service();
        let commands = [
            OperationCommand::Get { id: 5 },
            OperationCommand::Update {
                id: 5,
                patch: OperationPatch::default(),
            },
            OperationCommand::Delete { id: 5 },
        ];
        for command in commands {
            let err = svc.execute(command).await.unwrap_err();
            assert!(matches!(err, OperationError::NotFound { id: 5 }));
        }
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let svc = service();
        let id = created_id(&svc, "scan").await;

        let reply = svc.execute(OperationCommand::Delete { id }).await.unwrap();
        assert_eq!(reply, OperationReply::Deleted { id });

        let err = svc.execute(OperationCommand::Get { id }).await.unwrap_err();
        assert!(matches!(err, OperationError::NotFound { .. }));
        assert_eq!(
            svc.execute(OperationCommand::List).await.unwrap(),
            OperationReply::Empty
        );
    }

    #[tokio::test]
    async fn callable_as_tower_service() {
        let svc = service();
        let reply = svc.clone().oneshot(create("scan", "x")).await.unwrap();
        assert!(matches!(reply, OperationReply::Created(ref row) if row.name == "scan"));
    }

    #[tokio::test]
    async fn backend_errors_propagate_as_storage() {
        let svc = OperationService::new(Arc::new(FailingStore));
        let err = svc.execute(OperationCommand::List).await.unwrap_err();
        assert!(matches!(err, OperationError::Storage(_)));
    }
}
