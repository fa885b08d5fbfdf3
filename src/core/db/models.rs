//! Database models for Sportmates
//!
//! This module defines the database entity structs that map to PostgreSQL tables.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ============================================================================
// Provider
// ============================================================================

/// Identity provider a user account was created through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Local,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Local => "local",
            Provider::Google => "google",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Provider::Local),
            "google" => Ok(Provider::Google),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// User Model
// ============================================================================

/// User entity representing a registered account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Absent for accounts created through an external provider
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub provider: Provider,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Raw `users` row; provider is stored as text
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub provider: String,
    pub email_confirmed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = UnknownProvider;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            provider: row.provider.parse()?,
            email_confirmed: row.email_confirmed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// User data for creation (password must already be hashed)
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub provider: Provider,
    pub email_confirmed: bool,
}

impl NewUser {
    /// A local account awaiting email confirmation
    pub fn local(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password_hash: Some(password_hash.into()),
            provider: Provider::Local,
            email_confirmed: false,
        }
    }
}

/// Lowercase and trim an email so lookups are case-insensitive
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_display() {
        assert_eq!(Provider::Local.to_string(), "local");
        assert_eq!(Provider::Google.to_string(), "google");
    }

    #[test]
    fn test_provider_serialization() {
        let json = serde_json::to_string(&Provider::Local).unwrap();
        assert_eq!(json, r#""local""#);

        let provider: Provider = serde_json::from_str(r#""google""#).unwrap();
        assert_eq!(provider, Provider::Google);
    }

    #[test]
    fn test_provider_from_str() {
        assert_eq!("local".parse::<Provider>().unwrap(), Provider::Local);
        assert!("github".parse::<Provider>().is_err());
    }

    #[test]
    fn test_user_from_row_rejects_unknown_provider() {
        let row = UserRow {
            id: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            password_hash: None,
            provider: "myspace".to_string(),
            email_confirmed: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(User::try_from(row).is_err());
    }

    #[test]
    fn test_new_user_local() {
        let user = NewUser::local("a@x.com", "$2b$04$hash");

        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.password_hash.as_deref(), Some("$2b$04$hash"));
        assert_eq!(user.provider, Provider::Local);
        assert!(!user.email_confirmed);
    }

    #[test]
    fn test_user_serialization_skips_password_hash() {
        let user = User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            password_hash: Some("secret_hash".to_string()),
            provider: Provider::Local,
            email_confirmed: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret_hash"));
        assert!(json.contains("test@example.com"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
        assert_eq!(normalize_email("a@x.com"), "a@x.com");
    }
}
