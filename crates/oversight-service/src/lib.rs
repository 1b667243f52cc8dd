//! Grant oversight service
//!
//! This crate wires the workflow rules from `oversight-core` to:
//! - a REST API under `/api/v1`
//! - record storage (in-memory or PostgreSQL)
//! - content-addressed attachment storage
//! - a persisted, hash-chained audit trail

pub mod api;
pub mod audit_trail;
pub mod blob;
pub mod config;
pub mod error;
pub mod notify;
pub mod server;
pub mod settings_cache;
pub mod storage;

pub use config::ServiceConfig;
pub use error::{ApiError, DaemonError, StorageError};
pub use server::Server;
pub use storage::{InMemoryStorage, PostgresStorage, Storage};
