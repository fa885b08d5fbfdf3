//! Request validation for the HTTP layer
//!
//! Shape checks on client input, applied before the session lifecycle sees
//! a request. The lifecycle itself never relies on them.

/// Minimum password length in characters
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum password length in characters
pub const MAX_PASSWORD_LENGTH: usize = 32;

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Password must be at least 8 characters")]
    PasswordTooShort,

    #[error("Password must be at most 32 characters")]
    PasswordTooLong,

    #[error("Field '{0}' is required")]
    Required(&'static str),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationError::InvalidEmail => "INVALID_EMAIL",
            ValidationError::PasswordTooShort => "PASSWORD_TOO_SHORT",
            ValidationError::PasswordTooLong => "PASSWORD_TOO_LONG",
            ValidationError::Required(_) => "FIELD_REQUIRED",
        }
    }
}

/// Validate an email address has the `local@domain.tld` shape
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::InvalidEmail);
    }

    let (local, domain) = email
        .split_once('@')
        .ok_or(ValidationError::InvalidEmail)?;

    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(ValidationError::InvalidEmail);
    }

    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }

    // Domain needs at least one dot and no empty labels
    if !domain.contains('.') || domain.split('.').any(str::is_empty) {
        return Err(ValidationError::InvalidEmail);
    }

    Ok(())
}

/// Validate password length, counted in characters rather than bytes
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let length = password.chars().count();

    if length < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooShort);
    }

    if length > MAX_PASSWORD_LENGTH {
        return Err(ValidationError::PasswordTooLong);
    }

    Ok(())
}

/// Reject empty or whitespace-only values for a required field
pub fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required(field));
    }
    Ok(())
}
