//! Builds the configured [`OperationStore`] backend.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::memory::MemoryOperationStore;
use super::OperationStore;

/// Which storage backend the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageBackend {
    /// PostgreSQL through a `sqlx` pool (requires the `postgres` feature).
    Postgres,
    /// In-process table; data is lost on restart.
    Memory,
}

/// PostgreSQL connection settings.
///
/// No `Default` impl because credentials have no sensible defaults; the
/// CLI layer supplies them.
#[derive(Clone)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// Maximum time to wait for a pooled connection.
    pub acquire_timeout: Duration,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// Storage configuration for the server.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database: DatabaseConfig,
    /// Create the table on startup if it does not exist.
    pub auto_migrate: bool,
}

/// Connects to the configured backend and runs its one-time initialization.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached or initialized, or if
/// PostgreSQL is requested in a build without the `postgres` feature.
pub async fn connect_store(config: &StorageConfig) -> anyhow::Result<Arc<dyn OperationStore>> {
    let store: Arc<dyn OperationStore> = match config.backend {
        StorageBackend::Memory => {
            info!("using in-memory storage; data will not survive a restart");
            Arc::new(MemoryOperationStore::new())
        }
        #[cfg(feature = "postgres")]
        StorageBackend::Postgres => Arc::new(
            super::postgres::PostgresOperationStore::connect(
                &config.database,
                config.auto_migrate,
            )
            .await?,
        ),
        #[cfg(not(feature = "postgres"))]
        StorageBackend::Postgres => {
            anyhow::bail!("PostgreSQL storage requires the `postgres` feature")
        }
    };

    store.initialize().await?;
    Ok(store)
}
