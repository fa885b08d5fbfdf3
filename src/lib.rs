//! Sportmates - credential and session lifecycle service
//!
//! Registration, login, refresh token rotation, logout and email
//! confirmation for the Sportmates matching app, served over HTTP with axum.

pub mod core;
