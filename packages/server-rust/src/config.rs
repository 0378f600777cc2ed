//! Command-line and environment configuration of the server binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, ValueEnum};

use crate::network::{NetworkConfig, TlsConfig};
use crate::storage::factory::DatabaseConfig;
use crate::storage::{StorageBackend, StorageConfig};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Operations server: CRUD over the `operation` table.
#[derive(Debug, Parser)]
#[command(name = "operations-server", version, about)]
pub struct ServerArgs {
    #[arg(long, env = "APP_HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "APP_PORT", default_value_t = 8000)]
    pub port: u16,

    /// PEM certificate chain; enables TLS together with `--tls-key`.
    #[arg(long, env = "TLS_CERT_PATH", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,

    #[arg(long, env = "TLS_KEY_PATH", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,

    /// Allowed CORS origins, comma separated. `*` allows any origin.
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// How long shutdown waits for in-flight requests.
    #[arg(long, env = "DRAIN_TIMEOUT_SECS", default_value_t = 30)]
    pub drain_timeout_secs: u64,

    #[arg(long = "storage", env = "STORAGE_BACKEND", value_enum, default_value_t = StorageBackend::Postgres)]
    pub storage: StorageBackend,

    #[command(flatten)]
    pub database: DatabaseArgs,

    /// Create the `operation` table on startup if it is missing.
    #[arg(long, env = "AUTO_MIGRATE", default_value_t = true, action = clap::ArgAction::Set)]
    pub auto_migrate: bool,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Default filter directive; `RUST_LOG` takes precedence when set.
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// PostgreSQL connection flags.
#[derive(Debug, Args)]
pub struct DatabaseArgs {
    #[arg(long = "db-user", env = "DB_USER", default_value = "postgres")]
    pub user: String,

    #[arg(long = "db-password", env = "DB_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    #[arg(id = "db_host", long = "db-host", env = "DB_HOST", default_value = "localhost")]
    pub host: String,

    #[arg(id = "db_port", long = "db-port", env = "DB_PORT", default_value_t = 5432)]
    pub port: u16,

    #[arg(long = "db-name", env = "DB_NAME", default_value = "postgres")]
    pub name: String,

    #[arg(long = "db-max-connections", env = "DB_MAX_CONNECTIONS", default_value_t = 10)]
    pub max_connections: u32,

    #[arg(long = "db-min-connections", env = "DB_MIN_CONNECTIONS", default_value_t = 0)]
    pub min_connections: u32,

    #[arg(long = "db-acquire-timeout-secs", env = "DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,
}

impl ServerArgs {
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        let tls = match (&self.tls_cert, &self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path: cert_path.clone(),
                key_path: key_path.clone(),
            }),
            _ => None,
        };

        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            tls,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }

    #[must_use]
    pub fn storage_config(&self) -> StorageConfig {
        let db = &self.database;
        StorageConfig {
            backend: self.storage,
            database: DatabaseConfig {
                user: db.user.clone(),
                password: db.password.clone(),
                host: db.host.clone(),
                port: db.port,
                name: db.name.clone(),
                max_connections: db.max_connections,
                min_connections: db.min_connections,
                acquire_timeout: Duration::from_secs(db.acquire_timeout_secs),
            },
            auto_migrate: self.auto_migrate,
        }
    }
}
