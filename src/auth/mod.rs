//! Authentication Module
//! Mission: Issue, rotate and revoke credentials; gate privileged routes

pub mod api;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod routes;
pub mod service;
pub mod sqlite_store;
pub mod store;

pub use error::AuthError;
pub use jwt::TokenCodec;
pub use middleware::{admin_middleware, auth_middleware};
pub use password::PasswordHasher;
pub use routes::router;
pub use service::{AuthService, ServiceSettings};
pub use sqlite_store::SqliteCredentialStore;
pub use store::{CredentialStore, StoreError};
