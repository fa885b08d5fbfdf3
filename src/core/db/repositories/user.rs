//! User repository for database operations
//!
//! Defines the [`CredentialStore`] contract used by the auth service and its
//! PostgreSQL implementation. Passwords arrive here already hashed.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{NewUser, Provider, User, UserRow};

const USER_COLUMNS: &str =
    "id, email, password_hash, provider, email_confirmed, created_at, updated_at";

/// User repository error types
#[derive(Debug, thiserror::Error)]
pub enum UserRepositoryError {
    #[error("User not found")]
    NotFound,

    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Corrupt user record: {0}")]
    CorruptRecord(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Persistent store of user credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Insert a user and return its id. Email uniqueness is case-insensitive.
    async fn create_user(&self, user: NewUser) -> Result<Uuid, UserRepositoryError>;

    async fn find_by_email_and_provider(
        &self,
        email: &str,
        provider: Provider,
    ) -> Result<Option<User>, UserRepositoryError>;

    /// Password hash of the local account with this email, if it has one
    async fn password_hash(&self, email: &str) -> Result<Option<String>, UserRepositoryError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserRepositoryError>;

    /// Fails with `NotFound` when no user has this id
    async fn mark_email_confirmed(&self, id: Uuid) -> Result<(), UserRepositoryError>;
}

/// PostgreSQL-backed credential store
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn into_user(row: UserRow) -> Result<User, UserRepositoryError> {
        User::try_from(row).map_err(|e| UserRepositoryError::CorruptRecord(e.to_string()))
    }
}

#[async_trait]
impl CredentialStore for UserRepository {
    async fn create_user(&self, user: NewUser) -> Result<Uuid, UserRepositoryError> {
        let result = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO users (email, password_hash, provider, email_confirmed)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.provider.as_str())
        .bind(user.email_confirmed)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(id) => Ok(id),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(UserRepositoryError::EmailAlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email_and_provider(
        &self,
        email: &str,
        provider: Provider,
    ) -> Result<Option<User>, UserRepositoryError> {
        let query = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1) AND provider = $2"
        );

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(email)
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::into_user).transpose()
    }

    async fn password_hash(&self, email: &str) -> Result<Option<String>, UserRepositoryError> {
        let hash = sqlx::query_scalar::<_, Option<String>>(
            r#"
            SELECT password_hash
            FROM users
            WHERE LOWER(email) = LOWER($1) AND provider = 'local'
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(hash.flatten())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserRepositoryError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::into_user).transpose()
    }

    async fn mark_email_confirmed(&self, id: Uuid) -> Result<(), UserRepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email_confirmed = TRUE, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(UserRepositoryError::NotFound);
        }

        Ok(())
    }
}
