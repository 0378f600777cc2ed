//! Operations server: a CRUD HTTP service over the `operation` table,
//! built on axum with PostgreSQL or in-memory storage.

pub mod config;
pub mod logging;
pub mod network;
pub mod service;
pub mod storage;

pub use config::{LogFormat, ServerArgs};
pub use network::NetworkModule;
