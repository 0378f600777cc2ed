//! PostgreSQL [`OperationStore`] backed by a `sqlx` connection pool.
//!
//! Reads run directly on a pooled connection. Writes open a transaction,
//! run one statement and commit; any early return drops the transaction,
//! which rolls it back and hands the connection back to the pool.

use async_trait::async_trait;
use chrono::Utc;
use operations_core::{
    columns, NewOperation, Operation, OperationId, OperationPatch, OPERATION_TABLE,
};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use super::factory::DatabaseConfig;
use super::{OperationStore, StoreError};

/// Operation rows stored in the `operation` table.
pub struct PostgresOperationStore {
    pool: PgPool,
    auto_migrate: bool,
}

impl PostgresOperationStore {
    /// Opens a connection pool using the given database settings.
    ///
    /// The pool connects lazily beyond `min_connections`; the first
    /// connection is established here so that bad credentials fail fast.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be reached.
    pub async fn connect(config: &DatabaseConfig, auto_migrate: bool) -> anyhow::Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.name);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        info!(
            host = %config.host,
            port = config.port,
            database = %config.name,
            "connected to PostgreSQL"
        );

        Ok(Self::from_pool(pool, auto_migrate))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool, auto_migrate: bool) -> Self {
        Self { pool, auto_migrate }
    }

    /// Drops the table. Used to reset test databases.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement fails.
    pub async fn drop_table(&self) -> Result<(), StoreError> {
        sqlx::query(&OPERATION_TABLE.drop_table_sql())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.into())
}

/// Classifies a failed write: unique violations on `name` become
/// [`StoreError::UniqueViolation`], everything else is a backend error.
fn classify_write_error(err: sqlx::Error, name: &str) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StoreError::UniqueViolation {
                column: columns::NAME,
                value: name.to_string(),
            };
        }
    }
    backend(err)
}

fn decode(row: &PgRow) -> Result<Operation, StoreError> {
    let decoded = (|| -> Result<Operation, sqlx::Error> {
        Ok(Operation {
            id: row.try_get(columns::ID)?,
            name: row.try_get(columns::NAME)?,
            description: row.try_get(columns::DESCRIPTION)?,
            created_at: row.try_get(columns::CREATED_AT)?,
            updated_at: row.try_get(columns::UPDATED_AT)?,
        })
    })();
    decoded.map_err(backend)
}

#[async_trait]
impl OperationStore for PostgresOperationStore {
    async fn initialize(&self) -> Result<(), StoreError> {
        if !self.auto_migrate {
            debug!("auto-migration disabled, assuming the schema exists");
            return Ok(());
        }
        sqlx::query(&OPERATION_TABLE.create_table_sql())
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        info!(table = OPERATION_TABLE.name, "schema ensured");
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Operation>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {}",
            OPERATION_TABLE.select_list(),
            OPERATION_TABLE.name
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(decode).collect()
    }

    async fn get(&self, id: OperationId) -> Result<Option<Operation>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            OPERATION_TABLE.select_list(),
            OPERATION_TABLE.name,
            columns::ID
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(decode).transpose()
    }

    async fn insert(&self, new: &NewOperation) -> Result<Operation, StoreError> {
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}) VALUES ($1, $2, $3) RETURNING {}",
            OPERATION_TABLE.name,
            columns::NAME,
            columns::DESCRIPTION,
            columns::CREATED_AT,
            OPERATION_TABLE.select_list()
        );

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let row = sqlx::query(&sql)
            .bind(&new.name)
            .bind(&new.description)
            .bind(Utc::now().naive_utc())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| classify_write_error(e, &new.name))?;
        tx.commit().await.map_err(backend)?;

        decode(&row)
    }

    async fn update(
        &self,
        id: OperationId,
        patch: &OperationPatch,
    ) -> Result<Option<Operation>, StoreError> {
        let mut query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET ", OPERATION_TABLE.name));
        query
            .push(columns::UPDATED_AT)
            .push(" = ")
            .push_bind(Utc::now().naive_utc());
        if let Some(name) = &patch.name {
            query.push(", ").push(columns::NAME).push(" = ").push_bind(name.clone());
        }
        if let Some(description) = &patch.description {
            query
                .push(", ")
                .push(columns::DESCRIPTION)
                .push(" = ")
                .push_bind(description.clone());
        }
        query
            .push(" WHERE ")
            .push(columns::ID)
            .push(" = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(OPERATION_TABLE.select_list());

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let row = query
            .build()
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| classify_write_error(e, patch.name.as_deref().unwrap_or_default()))?;
        tx.commit().await.map_err(backend)?;

        row.as_ref().map(decode).transpose()
    }

    async fn delete(&self, id: OperationId) -> Result<bool, StoreError> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = $1",
            OPERATION_TABLE.name,
            columns::ID
        );

        let mut tx = self.pool.begin().await.map_err(backend)?;
        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        tx.commit().await.map_err(backend)?;

        Ok(result.rows_affected() > 0)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
