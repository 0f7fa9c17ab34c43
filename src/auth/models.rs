//! Authentication Models
//! Mission: Define user, token and request/response data structures

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // bcrypt hash - never serialize
    pub role: UserRole,
}

/// User roles
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UserRole {
    #[serde(rename = "standard")]
    Standard,
    #[serde(rename = "admin")]
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Standard => "standard",
            UserRole::Admin => "admin",
        }
    }

    /// Strict parse used at the store boundary: stored roles are always lowercase.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "standard" => Some(UserRole::Standard),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String, // subject (user_id)
    pub role: UserRole,
    pub iat: i64,
    pub exp: i64, // expiration timestamp
}

impl Claims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Server-side refresh token row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshTokenRecord {
    pub token: String,
    pub user_id: Uuid,
    pub role: UserRole, // role snapshot at issuance
}

/// Access + refresh token pair returned by login and refresh
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64, // access token lifetime in seconds
}

/// Login request body
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Registration request body
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
}

/// Body for refresh and logout
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// User response (sanitized)
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub role: UserRole,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id.to_string(),
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// `/me` response built from verified claims only
#[derive(Debug, Serialize)]
pub struct ClaimsResponse {
    pub id: String,
    pub role: UserRole,
    pub expires_at: i64,
}
