//! Password hashing
//!
//! One-way bcrypt hashing behind the [`PasswordHasher`] contract.

/// Cost factor for bcrypt hashing (12 is recommended for production)
pub const BCRYPT_COST: u32 = 12;

/// Password hashing error types
#[derive(Debug, thiserror::Error)]
pub enum PasswordHashError {
    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error("Stored password hash is malformed: {0}")]
    MalformedHash(String),
}

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String, PasswordHashError>;

    /// `Ok(false)` on mismatch; `Err` only when the stored hash cannot be parsed
    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordHashError>;
}

/// Bcrypt hasher with automatic salt generation
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(BCRYPT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String, PasswordHashError> {
        bcrypt::hash(password, self.cost).map_err(|e| PasswordHashError::Hashing(e.to_string()))
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordHashError> {
        bcrypt::verify(password, hash).map_err(|e| PasswordHashError::MalformedHash(e.to_string()))
    }
}
