//! Authentication module for Sportmates
//!
//! This module provides the credential and session lifecycle:
//! - JWT access/refresh token issuance and validation
//! - User registration and login with bcrypt-hashed passwords
//! - Single active session per user with refresh token rotation
//! - Email ownership confirmation with single-use tokens
//! - REST API endpoints for auth operations

pub mod api;
pub mod confirmation;
pub mod jwt;
pub mod password;
pub mod service;


pub use api::{ApiRejection, AuthApiState, app_router, auth_api_router};
pub use confirmation::ConfirmationLink;
pub use jwt::{Claims, JwtConfig, JwtError, JwtService, TokenCodec, TokenPair, TokenType};
pub use password::{BcryptHasher, PasswordHashError, PasswordHasher};
pub use service::{
    AuthError, AuthResponse, AuthService, LoginRequest, RefreshRequest, RegisterRequest,
};
