//! Core domain: credentials, sessions and their storage adapters

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod messaging;
pub mod validation;
