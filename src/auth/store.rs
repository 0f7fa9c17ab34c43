//! Credential Store interface
//! Mission: Persist users and refresh tokens behind one async seam

use crate::auth::models::{RefreshTokenRecord, User};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("unique constraint violated")]
    Conflict,

    #[error("storage backend: {0}")]
    Backend(String),
}

/// Persistence for users and refresh tokens.
///
/// Every method is one transactional unit. `replace_refresh_token` removes
/// `old` and inserts `new` atomically, and fails with `NotFound` without
/// inserting anything if `old` is already gone.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> StoreResult<User>;

    async fn get_user_by_id(&self, user_id: Uuid) -> StoreResult<User>;

    /// `Conflict` when the email is already registered.
    async fn create_user(&self, user: &User) -> StoreResult<()>;

    /// `NotFound` when no such user exists.
    async fn set_admin_role(&self, user_id: Uuid) -> StoreResult<()>;

    /// False for unknown users.
    async fn is_admin(&self, user_id: Uuid) -> StoreResult<bool>;

    async fn count_admins(&self) -> StoreResult<u64>;

    /// `Conflict` on a token value collision.
    async fn put_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()>;

    async fn get_refresh_token(&self, token: &str) -> StoreResult<RefreshTokenRecord>;

    async fn replace_refresh_token(
        &self,
        old: &str,
        new: &RefreshTokenRecord,
    ) -> StoreResult<()>;

    /// `NotFound` when nothing was deleted.
    async fn delete_refresh_token(&self, token: &str) -> StoreResult<()>;
}
