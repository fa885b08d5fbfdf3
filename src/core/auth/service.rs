//! Authentication service
//!
//! Provides the session lifecycle: registration, login, token refresh with
//! rotation, logout, and the two-step email confirmation handshake.
//! Coordinates the credential store, session cache, token codec, password
//! hasher and (optionally) the email publisher.
//!
//! Each user has a single refresh-token slot in the session cache. Issuing a
//! pair overwrites it, so only the latest refresh token is accepted.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::auth::confirmation::{self, ConfirmationLink};
use crate::core::auth::jwt::{Claims, TokenCodec, TokenPair, TokenType};
use crate::core::auth::password::PasswordHasher;
use crate::core::cache::{self, EmailConfirmation, SessionStore};
use crate::core::config::AuthSettings;
use crate::core::db::models::{NewUser, Provider, normalize_email};
use crate::core::db::repositories::{CredentialStore, UserRepositoryError};
use crate::core::messaging::{EmailEvent, EmailPublisher};

/// Authentication service error types
///
/// Store and codec causes are logged where they happen and never carried in
/// the error value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered")]
    DuplicateEmail,

    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Token is required")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Invalid token type")]
    WrongTokenType,

    #[error("Refresh token not found or expired")]
    TokenNotFound,

    #[error("Refresh token is no longer valid")]
    TokenMismatch,

    #[error("Invalid or expired confirmation link")]
    InvalidOrExpiredToken,

    #[error("Password hashing failed")]
    HashingFailure,

    #[error("Token issuance failed")]
    TokenIssuanceFailure,

    #[error("Confirmation token generation failed")]
    TokenGenerationFailure,

    #[error("Failed to persist session")]
    PersistenceFailure,

    #[error("Session storage failure")]
    StorageFailure,

    #[error("Failed to confirm email")]
    ConfirmationPersistFailure,

    #[error("Failed to load user")]
    UserLookupFailure,
}

impl AuthError {
    /// Stable machine-readable code for presentation layers
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::DuplicateEmail => "EMAIL_EXISTS",
            AuthError::MissingParameter(_) => "MISSING_PARAMETER",
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidToken => "INVALID_TOKEN",
            AuthError::WrongTokenType => "WRONG_TOKEN_TYPE",
            AuthError::TokenNotFound => "TOKEN_NOT_FOUND",
            AuthError::TokenMismatch => "TOKEN_MISMATCH",
            AuthError::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            AuthError::HashingFailure => "HASHING_FAILURE",
            AuthError::TokenIssuanceFailure => "TOKEN_ISSUANCE_FAILURE",
            AuthError::TokenGenerationFailure => "TOKEN_GENERATION_FAILURE",
            AuthError::PersistenceFailure => "PERSISTENCE_FAILURE",
            AuthError::StorageFailure => "STORAGE_FAILURE",
            AuthError::ConfirmationPersistFailure => "CONFIRMATION_PERSIST_FAILURE",
            AuthError::UserLookupFailure => "USER_LOOKUP_FAILURE",
        }
    }

    /// Failures of our own infrastructure rather than of the caller's input
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthError::HashingFailure
                | AuthError::TokenIssuanceFailure
                | AuthError::TokenGenerationFailure
                | AuthError::PersistenceFailure
                | AuthError::StorageFailure
                | AuthError::ConfirmationPersistFailure
                | AuthError::UserLookupFailure
        )
    }
}

/// Registration request data
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Login request data
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token refresh request
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Tokens for a freshly started session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub user_id: Uuid,
    pub email: String,
}

impl AuthResponse {
    fn new(tokens: TokenPair, user_id: Uuid, email: String) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            expires_in: tokens.expires_in,
            user_id,
            email,
        }
    }
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    tokens: Arc<dyn TokenCodec>,
    hasher: Arc<dyn PasswordHasher>,
    mailer: Option<Arc<dyn EmailPublisher>>,
    settings: AuthSettings,
}

impl AuthService {
    /// Create a new authentication service with default settings and no mailer
    pub fn new(
        users: Arc<dyn CredentialStore>,
        sessions: Arc<dyn SessionStore>,
        tokens: Arc<dyn TokenCodec>,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Self {
        Self {
            users,
            sessions,
            tokens,
            hasher,
            mailer: None,
            settings: AuthSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AuthSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_email_publisher(mut self, mailer: Arc<dyn EmailPublisher>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    /// Register a new local account and start its session
    ///
    /// If the session cannot be persisted the account still exists; the
    /// caller sees `PersistenceFailure` and can log in to get a session.
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&request.email);

        let password_hash = self.hasher.hash(&request.password).map_err(|e| {
            tracing::error!(error = %e, "Failed to hash password");
            AuthError::HashingFailure
        })?;

        let user_id = self
            .users
            .create_user(NewUser::local(&email, password_hash))
            .await
            .map_err(|e| match e {
                UserRepositoryError::EmailAlreadyExists => {
                    tracing::warn!(email = %email, "Registration with an existing email");
                    AuthError::DuplicateEmail
                }
                other => {
                    tracing::error!(error = %other, email = %email, "Failed to create user");
                    AuthError::PersistenceFailure
                }
            })?;

        let tokens = self.start_session(user_id, &email).await?;

        tracing::info!(user_id = %user_id, email = %email, "User registered successfully");

        Ok(AuthResponse::new(tokens, user_id, email))
    }

    /// Log in with email and password
    ///
    /// Every rejection is the same `InvalidCredentials`, whatever the cause.
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, AuthError> {
        let email = normalize_email(&request.email);

        let user = match self
            .users
            .find_by_email_and_provider(&email, Provider::Local)
            .await
        {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(email = %email, "Login for unknown local account");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                tracing::error!(error = %e, email = %email, "Failed to load user for login");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let password_hash = match self.users.password_hash(&email).await {
            Ok(Some(hash)) => hash,
            Ok(None) => {
                tracing::warn!(user_id = %user.id, "Login for account without a password");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                tracing::error!(error = %e, user_id = %user.id, "Failed to load password hash");
                return Err(AuthError::InvalidCredentials);
            }
        };

        if request.password.is_empty() {
            tracing::warn!(user_id = %user.id, "Login with empty password");
            return Err(AuthError::InvalidCredentials);
        }

        match self.hasher.verify(&request.password, &password_hash) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(user_id = %user.id, "Login with invalid password");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                tracing::error!(error = %e, user_id = %user.id, "Stored password hash unusable");
                return Err(AuthError::InvalidCredentials);
            }
        }

        let tokens = self.start_session(user.id, &user.email).await?;

        tracing::info!(user_id = %user.id, "User logged in successfully");

        Ok(AuthResponse::new(tokens, user.id, user.email))
    }

    /// Exchange the current refresh token for a new pair (rotation)
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = self.tokens.verify(refresh_token).map_err(|e| {
            tracing::warn!(error = %e, "Invalid refresh token");
            AuthError::InvalidToken
        })?;

        if claims.token_type != TokenType::Refresh {
            tracing::warn!(token_type = %claims.token_type, "Non-refresh token used for refresh");
            return Err(AuthError::WrongTokenType);
        }

        let user_id = claims.user_id().map_err(|_| {
            tracing::warn!(subject = %claims.sub, "Refresh token subject is not a user id");
            AuthError::InvalidToken
        })?;

        let key = cache::refresh_token_key(user_id);
        let stored = self
            .sessions
            .get(&key)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, user_id = %user_id, "Failed to read refresh token");
                AuthError::StorageFailure
            })?
            .ok_or_else(|| {
                tracing::warn!(user_id = %user_id, "Refresh token not found in storage");
                AuthError::TokenNotFound
            })?;

        if stored != refresh_token {
            tracing::warn!(user_id = %user_id, "Refresh token mismatch");
            if self.settings.revoke_on_refresh_mismatch {
                self.revoke_after_replay(user_id, &key).await;
            }
            return Err(AuthError::TokenMismatch);
        }

        let tokens = self.start_session(user_id, &claims.email).await?;

        tracing::info!(user_id = %user_id, "Tokens refreshed successfully");

        Ok(AuthResponse::new(tokens, user_id, claims.email))
    }

    /// Drop the user's refresh token. Access tokens stay valid until they expire.
    pub async fn logout(&self, user_id: Uuid) -> Result<(), AuthError> {
        self.sessions
            .delete(&cache::refresh_token_key(user_id))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, user_id = %user_id, "Failed to delete refresh token");
                AuthError::StorageFailure
            })?;

        tracing::info!(user_id = %user_id, "User logged out successfully");
        Ok(())
    }

    /// Issue a single-use confirmation token for `email` and queue the email
    ///
    /// Email dispatch is best-effort: the token is stored before publishing,
    /// and a publish failure does not fail the call.
    pub async fn send_confirmation_link(
        &self,
        user_id: Uuid,
        email: &str,
    ) -> Result<ConfirmationLink, AuthError> {
        if user_id.is_nil() {
            return Err(AuthError::MissingParameter("user_id"));
        }
        let email = email.trim();
        if email.is_empty() {
            return Err(AuthError::MissingParameter("email"));
        }

        let token = confirmation::generate_confirmation_token().map_err(|e| {
            tracing::error!(error = %e, user_id = %user_id, "Failed to generate confirmation token");
            AuthError::TokenGenerationFailure
        })?;

        let entry = EmailConfirmation {
            user_id,
            email: email.to_string(),
        };
        let ttl = self.settings.email_confirmation_ttl;

        let stored = match entry.encode() {
            Ok(raw) => {
                self.sessions
                    .set(&cache::email_confirm_key(&token), &raw, Some(ttl))
                    .await
            }
            Err(e) => Err(e),
        };
        stored.map_err(|e| {
            tracing::error!(error = %e, user_id = %user_id, "Failed to store confirmation token");
            AuthError::StorageFailure
        })?;

        let url = confirmation::confirmation_url(&self.settings.confirmation_base_url, &token);

        match &self.mailer {
            Some(mailer) => {
                if let Err(e) = mailer
                    .publish_email(EmailEvent::confirmation(email, &url))
                    .await
                {
                    tracing::error!(error = %e, user_id = %user_id, "Failed to publish email event");
                }
            }
            None => {
                tracing::warn!(user_id = %user_id, "Email publisher not available, email not sent");
            }
        }

        tracing::info!(user_id = %user_id, email = %email, "Confirmation link generated");

        Ok(ConfirmationLink {
            token,
            url,
            expires_in: ttl.as_secs(),
        })
    }

    /// Consume a confirmation token and mark the owner's email as confirmed
    pub async fn confirm_email(&self, token: &str) -> Result<Uuid, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingParameter("token"));
        }

        // Taking the entry consumes the token, so concurrent confirms race for it
        let key = cache::email_confirm_key(token);
        let raw = self
            .sessions
            .take(&key)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to read confirmation token");
                AuthError::StorageFailure
            })?
            .ok_or_else(|| {
                tracing::warn!("Invalid or expired confirmation token");
                AuthError::InvalidOrExpiredToken
            })?;

        let entry = EmailConfirmation::decode(&raw).map_err(|e| {
            tracing::warn!(error = %e, "Unreadable confirmation entry");
            AuthError::InvalidOrExpiredToken
        })?;

        let user = match self.users.find_by_id(entry.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                tracing::warn!(user_id = %entry.user_id, "Confirmation token for unknown user");
                return Err(AuthError::ConfirmationPersistFailure);
            }
            Err(e) => {
                tracing::error!(error = %e, user_id = %entry.user_id, "Failed to load user for confirmation");
                return Err(AuthError::ConfirmationPersistFailure);
            }
        };

        if normalize_email(&entry.email) != normalize_email(&user.email) {
            tracing::warn!(user_id = %entry.user_id, "Confirmation token was issued for another address");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        self.users
            .mark_email_confirmed(entry.user_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, user_id = %entry.user_id, "Failed to confirm email in database");
                AuthError::ConfirmationPersistFailure
            })?;

        tracing::info!(user_id = %entry.user_id, "Email confirmed successfully");
        Ok(entry.user_id)
    }

    pub async fn is_email_confirmed(&self, user_id: Uuid) -> Result<bool, AuthError> {
        match self.users.find_by_id(user_id).await {
            Ok(Some(user)) => Ok(user.email_confirmed),
            Ok(None) => {
                tracing::warn!(user_id = %user_id, "Confirmation status for unknown user");
                Err(AuthError::UserLookupFailure)
            }
            Err(e) => {
                tracing::error!(error = %e, user_id = %user_id, "Failed to load user");
                Err(AuthError::UserLookupFailure)
            }
        }
    }

    /// Validate an access token and return its claims
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = self.tokens.verify(token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            AuthError::InvalidToken
        })?;

        if !claims.is_access_token() {
            return Err(AuthError::WrongTokenType);
        }

        claims.user_id().map_err(|_| AuthError::InvalidToken)?;

        Ok(claims)
    }

    /// Issue a token pair and make its refresh token the user's only valid one
    async fn start_session(&self, user_id: Uuid, email: &str) -> Result<TokenPair, AuthError> {
        let tokens = self.tokens.issue_pair(user_id, email).map_err(|e| {
            tracing::error!(error = %e, user_id = %user_id, "Failed to generate JWT tokens");
            AuthError::TokenIssuanceFailure
        })?;

        self.sessions
            .set(
                &cache::refresh_token_key(user_id),
                &tokens.refresh_token,
                Some(tokens.refresh_ttl()),
            )
            .await
            .map_err(|e| {
                tracing::error!(error = %e, user_id = %user_id, "Failed to store refresh token");
                AuthError::PersistenceFailure
            })?;

        Ok(tokens)
    }

    async fn revoke_after_replay(&self, user_id: Uuid, key: &str) {
        match self.sessions.delete(key).await {
            Ok(()) => tracing::warn!(user_id = %user_id, "Session revoked after refresh token replay"),
            Err(e) => {
                tracing::error!(error = %e, user_id = %user_id, "Failed to revoke session after replay")
            }
        }
    }
}
