//! Database module for Sportmates
//!
//! This module provides database connectivity, models, and the credential
//! store used for persistent user records.

pub mod models;
pub mod pool;
pub mod repositories;

// Re-export commonly used items
pub use models::*;
pub use pool::{DbConfig, DbError, create_pool_with_migrations, health_check};
pub use repositories::{
    CredentialStore, MemoryCredentialStore, UserRepository, UserRepositoryError,
};

// Re-export sqlx types that might be needed
pub use sqlx::PgPool;
