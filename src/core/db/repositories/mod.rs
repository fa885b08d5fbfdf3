//! Credential store implementations
//!
//! [`UserRepository`] persists users in PostgreSQL; [`MemoryCredentialStore`]
//! keeps them in process for development and tests. Both implement
//! [`CredentialStore`], which is what the auth service depends on.

pub mod memory;
pub mod user;

pub use memory::MemoryCredentialStore;
pub use user::{CredentialStore, UserRepository, UserRepositoryError};
