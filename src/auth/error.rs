//! Credential lifecycle errors
//!
//! Services return these unchanged; only `auth::api` maps them to HTTP.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User not found")]
    UserNotFound,

    #[error("Refresh token not found")]
    TokenNotFound,

    #[error("Access token expired")]
    ExpiredToken,

    #[error("Invalid access token")]
    InvalidToken,

    #[error("Caller is not an admin")]
    NotAdmin,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Password hashing error: {0}")]
    Hashing(String),

    #[error("Storage operation timed out; outcome unknown")]
    Cancelled,
}

impl AuthError {
    /// Faults that should page an operator rather than the client.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            AuthError::Storage(_)
                | AuthError::Signing(_)
                | AuthError::Hashing(_)
                | AuthError::Cancelled
        )
    }
}
