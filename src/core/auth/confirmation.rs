//! Email confirmation tokens
//!
//! Tokens are 32 bytes from the operating system RNG, hex-encoded. They carry
//! no structure; the mapping to a user lives in the session cache.

use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;

/// Random bytes per confirmation token
pub const CONFIRMATION_TOKEN_BYTES: usize = 32;

#[derive(Debug, thiserror::Error)]
#[error("Secure random source unavailable: {0}")]
pub struct TokenGenerationError(String);

/// Generate an unguessable confirmation token (64 hex characters)
pub fn generate_confirmation_token() -> Result<String, TokenGenerationError> {
    let mut raw = [0u8; CONFIRMATION_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut raw)
        .map_err(|e| TokenGenerationError(e.to_string()))?;
    Ok(hex::encode(raw))
}

/// Link sent to the user; `base_url` is the frontend confirmation page
pub fn confirmation_url(base_url: &str, token: &str) -> String {
    format!("{}?token={}", base_url.trim_end_matches('?'), token)
}

/// Result of issuing a confirmation link
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationLink {
    pub token: String,
    pub url: String,
    /// Seconds until the token expires
    pub expires_in: u64,
}
