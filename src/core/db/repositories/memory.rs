//! In-memory credential store
//!
//! Used when no `DATABASE_URL` is configured and by the service tests.
//! Emails are indexed lowercased so uniqueness is case-insensitive.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

use super::user::{CredentialStore, UserRepositoryError};
use crate::core::db::models::{NewUser, Provider, User, normalize_email};

#[derive(Default)]
pub struct MemoryCredentialStore {
    users: DashMap<Uuid, User>,
    /// normalized email -> user id
    emails: DashMap<String, Uuid>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    fn lookup_email(&self, email: &str) -> Option<User> {
        let id = *self.emails.get(&normalize_email(email))?;
        self.users.get(&id).map(|u| u.clone())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_user(&self, user: NewUser) -> Result<Uuid, UserRepositoryError> {
        let key = normalize_email(&user.email);

        // The email entry is the uniqueness lock
        let id = match self.emails.entry(key) {
            Entry::Occupied(_) => return Err(UserRepositoryError::EmailAlreadyExists),
            Entry::Vacant(slot) => {
                let id = Uuid::new_v4();
                slot.insert(id);
                id
            }
        };

        let now = Utc::now();
        self.users.insert(
            id,
            User {
                id,
                email: user.email,
                password_hash: user.password_hash,
                provider: user.provider,
                email_confirmed: user.email_confirmed,
                created_at: now,
                updated_at: now,
            },
        );

        Ok(id)
    }

    async fn find_by_email_and_provider(
        &self,
        email: &str,
        provider: Provider,
    ) -> Result<Option<User>, UserRepositoryError> {
        Ok(self.lookup_email(email).filter(|u| u.provider == provider))
    }

    async fn password_hash(&self, email: &str) -> Result<Option<String>, UserRepositoryError> {
        Ok(self
            .lookup_email(email)
            .filter(|u| u.provider == Provider::Local)
            .and_then(|u| u.password_hash))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, UserRepositoryError> {
        Ok(self.users.get(&id).map(|u| u.clone()))
    }

    async fn mark_email_confirmed(&self, id: Uuid) -> Result<(), UserRepositoryError> {
        let mut user = self
            .users
            .get_mut(&id)
            .ok_or(UserRepositoryError::NotFound)?;

        user.email_confirmed = true;
        user.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_find_by_id() {
        let store = MemoryCredentialStore::new();
        let id = store
            .create_user(NewUser::local("a@x.com", "hash"))
            .await
            .unwrap();

        let user = store.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.provider, Provider::Local);
        assert!(!user.email_confirmed);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_case_insensitive() {
        let store = MemoryCredentialStore::new();
        store
            .create_user(NewUser::local("a@x.com", "hash"))
            .await
            .unwrap();

        let result = store.create_user(NewUser::local("A@X.COM", "hash")).await;
        assert!(matches!(
            result,
            Err(UserRepositoryError::EmailAlreadyExists)
        ));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_email_filters_provider() {
        let store = MemoryCredentialStore::new();
        store
            .create_user(NewUser {
                email: "g@x.com".to_string(),
                password_hash: None,
                provider: Provider::Google,
                email_confirmed: true,
            })
            .await
            .unwrap();

        let local = store
            .find_by_email_and_provider("g@x.com", Provider::Local)
            .await
            .unwrap();
        assert!(local.is_none());

        let google = store
            .find_by_email_and_provider("G@x.com", Provider::Google)
            .await
            .unwrap();
        assert!(google.is_some());
    }

    #[tokio::test]
    async fn test_password_hash_only_for_local_accounts() {
        let store = MemoryCredentialStore::new();
        store
            .create_user(NewUser::local("a@x.com", "hash_a"))
            .await
            .unwrap();
        store
            .create_user(NewUser {
                email: "g@x.com".to_string(),
                password_hash: Some("ignored".to_string()),
                provider: Provider::Google,
                email_confirmed: false,
            })
            .await
            .unwrap();

        assert_eq!(
            store.password_hash("a@x.com").await.unwrap().as_deref(),
            Some("hash_a")
        );
        assert!(store.password_hash("g@x.com").await.unwrap().is_none());
        assert!(store.password_hash("nobody@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_email_confirmed() {
        let store = MemoryCredentialStore::new();
        let id = store
            .create_user(NewUser::local("a@x.com", "hash"))
            .await
            .unwrap();

        store.mark_email_confirmed(id).await.unwrap();
        assert!(store.find_by_id(id).await.unwrap().unwrap().email_confirmed);

        let missing = store.mark_email_confirmed(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(UserRepositoryError::NotFound)));
    }
}
