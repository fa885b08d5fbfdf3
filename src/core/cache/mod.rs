//! Volatile session cache
//!
//! Holds the single active refresh token per user and pending email
//! confirmation tokens. Every entry lives under one key; get/set/delete/take on
//! a key are atomic, and no operation spans several keys.
//!
//! Key layout:
//! - `refresh_token:{user_id}` - current refresh token string
//! - `email_confirm:{token}` - JSON [`EmailConfirmation`]

pub mod memory;
pub mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;

const REFRESH_TOKEN_PREFIX: &str = "refresh_token:";
const EMAIL_CONFIRM_PREFIX: &str = "email_confirm:";

/// Session store error types
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache value could not be decoded: {0}")]
    Decode(String),
}

impl From<redis::RedisError> for SessionStoreError {
    fn from(err: redis::RedisError) -> Self {
        SessionStoreError::Backend(err.to_string())
    }
}

/// Key/value cache with optional per-entry TTL
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Overwrites any existing value. `None` means the entry never expires.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), SessionStoreError>;

    /// Returns `None` for missing or expired keys
    async fn get(&self, key: &str) -> Result<Option<String>, SessionStoreError>;

    /// Deleting a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), SessionStoreError>;

    /// Remove the key and return its value in one step. Of several
    /// concurrent takes on a key, at most one sees the value.
    async fn take(&self, key: &str) -> Result<Option<String>, SessionStoreError>;
}

pub fn refresh_token_key(user_id: Uuid) -> String {
    format!("{REFRESH_TOKEN_PREFIX}{user_id}")
}

pub fn email_confirm_key(token: &str) -> String {
    format!("{EMAIL_CONFIRM_PREFIX}{token}")
}

/// Pending email confirmation, stored as JSON under `email_confirm:{token}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfirmation {
    pub user_id: Uuid,
    pub email: String,
}

impl EmailConfirmation {
    pub fn encode(&self) -> Result<String, SessionStoreError> {
        serde_json::to_string(self).map_err(|e| SessionStoreError::Decode(e.to_string()))
    }

    pub fn decode(raw: &str) -> Result<Self, SessionStoreError> {
        serde_json::from_str(raw).map_err(|e| SessionStoreError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_key() {
        let id = Uuid::nil();
        assert_eq!(
            refresh_token_key(id),
            "refresh_token:00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_email_confirm_key() {
        assert_eq!(email_confirm_key("abc123"), "email_confirm:abc123");
    }

    #[test]
    fn test_email_confirmation_roundtrip() {
        let entry = EmailConfirmation {
            user_id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
        };

        let raw = entry.encode().unwrap();
        assert!(raw.contains("a@x.com"));
        assert_eq!(EmailConfirmation::decode(&raw).unwrap(), entry);
    }

    #[test]
    fn test_email_confirmation_decode_garbage() {
        let result = EmailConfirmation::decode("not json");
        assert!(matches!(result, Err(SessionStoreError::Decode(_))));
    }
}
