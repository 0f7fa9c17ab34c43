//! Credential Service Library
//!
//! Access/refresh token issuance, rotation, revocation and the admin gate.
//! The binary in main.rs only wires configuration, logging and the listener.

pub mod auth;
pub mod config;
pub mod middleware;

pub use auth::{router, AuthService};
pub use config::{AppEnv, Config};
