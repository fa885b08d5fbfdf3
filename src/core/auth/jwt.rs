//! JWT utilities for token generation and validation
//!
//! Provides the [`TokenCodec`] contract and its HS256 implementation.
//! Access tokens are short-lived (15 minutes), refresh tokens are long-lived (7 days).

use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default access token expiration time (15 minutes)
const ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 15;

/// Default refresh token expiration time (7 days)
const REFRESH_TOKEN_EXPIRATION_DAYS: i64 = 7;

/// Upper bounds accepted from configuration
const MAX_ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 24 * 60;
const MAX_REFRESH_TOKEN_EXPIRATION_DAYS: i64 = 365;

const DEFAULT_ISSUER: &str = "sportmates";

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Access token expiration in minutes
    pub access_token_expiration_minutes: i64,
    /// Refresh token expiration in days
    pub refresh_token_expiration_days: i64,
    /// Token issuer
    pub issuer: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field(
                "access_token_expiration_minutes",
                &self.access_token_expiration_minutes,
            )
            .field(
                "refresh_token_expiration_days",
                &self.refresh_token_expiration_days,
            )
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl JwtConfig {
    /// Create a new JWT configuration
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_token_expiration_minutes: ACCESS_TOKEN_EXPIRATION_MINUTES,
            refresh_token_expiration_days: REFRESH_TOKEN_EXPIRATION_DAYS,
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }

    /// Create config from environment variables
    pub fn from_env() -> Result<Self, JwtError> {
        let secret = std::env::var("JWT_SECRET").map_err(|_| JwtError::MissingSecret)?;

        let access_exp = std::env::var("JWT_ACCESS_EXPIRATION_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(ACCESS_TOKEN_EXPIRATION_MINUTES);

        let refresh_exp = std::env::var("JWT_REFRESH_EXPIRATION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(REFRESH_TOKEN_EXPIRATION_DAYS);

        let issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.to_string());

        let config = Self {
            secret,
            access_token_expiration_minutes: access_exp,
            refresh_token_expiration_days: refresh_exp,
            issuer,
        };
        config.validate()?;

        Ok(config)
    }

    /// Both lifetimes must be positive and within the configured maximums
    pub fn validate(&self) -> Result<(), JwtError> {
        if !(1..=MAX_ACCESS_TOKEN_EXPIRATION_MINUTES).contains(&self.access_token_expiration_minutes)
        {
            return Err(JwtError::InvalidConfig(format!(
                "access token expiration must be 1..={MAX_ACCESS_TOKEN_EXPIRATION_MINUTES} minutes, got {}",
                self.access_token_expiration_minutes
            )));
        }

        if !(1..=MAX_REFRESH_TOKEN_EXPIRATION_DAYS).contains(&self.refresh_token_expiration_days) {
            return Err(JwtError::InvalidConfig(format!(
                "refresh token expiration must be 1..={MAX_REFRESH_TOKEN_EXPIRATION_DAYS} days, got {}",
                self.refresh_token_expiration_days
            )));
        }

        Ok(())
    }

    /// Set access token expiration
    pub fn access_token_expiration(mut self, minutes: i64) -> Self {
        self.access_token_expiration_minutes = minutes;
        self
    }

    /// Set refresh token expiration
    pub fn refresh_token_expiration(mut self, days: i64) -> Self {
        self.refresh_token_expiration_days = days;
        self
    }

    /// Set issuer
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }
}

/// JWT errors
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT_SECRET environment variable not set")]
    MissingSecret,

    #[error("Invalid JWT configuration: {0}")]
    InvalidConfig(String),

    #[error("Token encoding failed: {0}")]
    EncodingError(String),

    #[error("Token decoding failed: {0}")]
    DecodingError(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token")]
    InvalidToken,
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidToken | ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                JwtError::InvalidToken
            }
            _ => JwtError::DecodingError(err.to_string()),
        }
    }
}

/// Token type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenType::Access => write!(f, "access"),
            TokenType::Refresh => write!(f, "refresh"),
        }
    }
}

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// User email
    pub email: String,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// JWT ID, unique per token
    pub jti: String,
}

impl Claims {
    pub fn is_access_token(&self) -> bool {
        self.token_type == TokenType::Access
    }

    pub fn is_refresh_token(&self) -> bool {
        self.token_type == TokenType::Refresh
    }

    /// Get user ID as UUID
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }
}

/// Token pair (access + refresh)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    /// Access token (short-lived)
    pub access_token: String,
    /// Refresh token (long-lived)
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token lifetime in seconds
    pub refresh_expires_in: i64,
    /// Token type (always "Bearer")
    pub token_type: String,
}

impl TokenPair {
    /// Refresh token lifetime as a cache TTL
    pub fn refresh_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(u64::try_from(self.refresh_expires_in).unwrap_or(0))
    }
}

/// Signs and verifies claims tokens
pub trait TokenCodec: Send + Sync {
    /// Issue an access and a refresh token bound to the same subject and email
    fn issue_pair(&self, user_id: Uuid, email: &str) -> Result<TokenPair, JwtError>;

    /// Check signature, issuer and expiry, and decode the claims
    fn verify(&self, token: &str) -> Result<Claims, JwtError>;
}

/// JWT service for token operations
#[derive(Clone)]
pub struct JwtService {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtService {
    /// Create a new JWT service
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Create JWT service from environment variables
    pub fn from_env() -> Result<Self, JwtError> {
        let config = JwtConfig::from_env()?;
        Ok(Self::new(config))
    }

    fn generate_token(
        &self,
        user_id: Uuid,
        email: &str,
        token_type: TokenType,
        lifetime: Duration,
    ) -> Result<String, JwtError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(lifetime)
            .ok_or_else(|| JwtError::InvalidConfig("token expiry out of range".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            token_type,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            iss: self.config.issuer.clone(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingError(e.to_string()))
    }

    /// Generate an access token
    pub fn generate_access_token(&self, user_id: Uuid, email: &str) -> Result<String, JwtError> {
        self.generate_token(user_id, email, TokenType::Access, self.access_lifetime()?)
    }

    /// Generate a refresh token
    pub fn generate_refresh_token(&self, user_id: Uuid, email: &str) -> Result<String, JwtError> {
        self.generate_token(user_id, email, TokenType::Refresh, self.refresh_lifetime()?)
    }

    fn access_lifetime(&self) -> Result<Duration, JwtError> {
        positive_lifetime(Duration::try_minutes(
            self.config.access_token_expiration_minutes,
        ))
    }

    fn refresh_lifetime(&self) -> Result<Duration, JwtError> {
        positive_lifetime(Duration::try_days(self.config.refresh_token_expiration_days))
    }
}

fn positive_lifetime(lifetime: Option<Duration>) -> Result<Duration, JwtError> {
    lifetime
        .filter(|d| *d > Duration::zero())
        .ok_or_else(|| JwtError::InvalidConfig("token lifetime must be positive".to_string()))
}

impl TokenCodec for JwtService {
    fn issue_pair(&self, user_id: Uuid, email: &str) -> Result<TokenPair, JwtError> {
        let access_token = self.generate_access_token(user_id, email)?;
        let refresh_token = self.generate_refresh_token(user_id, email)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_lifetime()?.num_seconds(),
            refresh_expires_in: self.refresh_lifetime()?.num_seconds(),
            token_type: "Bearer".to_string(),
        })
    }

    fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.config.issuer]);
        // Set leeway to 0 for strict expiration checking
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)?;

        Ok(token_data.claims)
    }
}
