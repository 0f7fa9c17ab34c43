//! Credential lifecycle service
//! Mission: Login, refresh rotation, logout and role elevation over an injected store

use crate::auth::{
    error::{AuthError, Result},
    jwt::TokenCodec,
    models::{Claims, RefreshTokenRecord, TokenPair, User, UserRole},
    password::{PasswordHasher, BCRYPT_MAX_BYTES},
    store::{CredentialStore, StoreError, StoreResult},
};
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const PASSWORD_MIN_LEN: usize = 3;
const PASSWORD_MAX_LEN: usize = 64;

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::Storage(e.to_string())
    }
}

/// Lifetimes and bounds applied to every request
#[derive(Debug, Clone, Copy)]
pub struct ServiceSettings {
    pub access_ttl: Duration,
    pub store_timeout: Duration,
}

/// Stateless orchestration of the credential lifecycle.
/// Cheap to share: everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    codec: Arc<TokenCodec>,
    hasher: Arc<PasswordHasher>,
    settings: ServiceSettings,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codec: Arc<TokenCodec>,
        hasher: Arc<PasswordHasher>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            store,
            codec,
            hasher,
            settings,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Verify email/password and issue a persisted token pair
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<TokenPair> {
        let email = normalize_email(email);

        let user = match self.bounded(self.store.get_user_by_email(&email)).await? {
            Ok(user) => Some(user),
            Err(StoreError::NotFound) => None,
            Err(e) => {
                error!(error = %e, "User lookup failed during login");
                return Err(e.into());
            }
        };

        // Runs for unknown emails too so both failures cost one bcrypt verify.
        let password_ok = self
            .check_password(user.as_ref().map(|u| u.password_hash.clone()), password)
            .await?;

        let Some(user) = user else {
            warn!("Failed login attempt: unknown email");
            return Err(AuthError::UserNotFound);
        };
        if !password_ok {
            warn!(user_id = %user.id, "Failed login attempt: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let (pair, record) = self.mint_pair(user.id, user.role)?;

        match self.bounded(self.store.put_refresh_token(&record)).await? {
            Ok(()) => {}
            Err(StoreError::Conflict) => {
                error!(user_id = %user.id, "Refresh token collision on insert");
                return Err(AuthError::Storage("refresh token collision".to_string()));
            }
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Failed to persist refresh token");
                return Err(e.into());
            }
        }

        info!(user_id = %user.id, role = user.role.as_str(), "Login successful");
        Ok(pair)
    }

    /// Exchange a refresh token for a new pair, consuming the presented one
    pub async fn refresh(&self, presented: &str) -> Result<TokenPair> {
        let record = match self.bounded(self.store.get_refresh_token(presented)).await? {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                debug!("Refresh rejected: unknown token");
                return Err(AuthError::TokenNotFound);
            }
            Err(e) => return Err(e.into()),
        };

        let (pair, next) = self.mint_pair(record.user_id, record.role)?;

        match self
            .bounded(self.store.replace_refresh_token(presented, &next))
            .await?
        {
            Ok(()) => {
                info!(user_id = %record.user_id, "Refresh token rotated");
                Ok(pair)
            }
            // A concurrent refresh or logout consumed it between lookup and replace.
            Err(StoreError::NotFound) => {
                warn!(user_id = %record.user_id, "Refresh token raced and lost");
                Err(AuthError::TokenNotFound)
            }
            Err(e) => {
                error!(user_id = %record.user_id, error = %e, "Refresh token rotation failed");
                Err(e.into())
            }
        }
    }

    /// Revoke a refresh token
    pub async fn logout(&self, presented: &str) -> Result<()> {
        let record = match self.bounded(self.store.get_refresh_token(presented)).await? {
            Ok(record) => record,
            Err(StoreError::NotFound) => return Err(AuthError::TokenNotFound),
            Err(e) => return Err(e.into()),
        };

        match self.bounded(self.store.delete_refresh_token(presented)).await? {
            Ok(()) => {
                info!(user_id = %record.user_id, "Refresh token revoked");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(AuthError::TokenNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Promote `target` to admin on behalf of a verified admin caller
    pub async fn elevate_role(&self, caller: &Claims, target: Uuid) -> Result<()> {
        if caller.role != UserRole::Admin {
            return Err(AuthError::NotAdmin);
        }
        let caller_id = caller.user_id().ok_or(AuthError::NotAdmin)?;

        // The claim may predate a downgrade; the store is authoritative.
        if !self.bounded(self.store.is_admin(caller_id)).await?? {
            warn!(caller = %caller_id, "Stale admin claim rejected");
            return Err(AuthError::NotAdmin);
        }

        let user = match self.bounded(self.store.get_user_by_id(target)).await? {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(AuthError::UserNotFound),
            Err(e) => return Err(e.into()),
        };
        if user.role == UserRole::Admin {
            debug!(caller = %caller_id, target = %target, "Target already admin");
            return Ok(());
        }

        match self.bounded(self.store.set_admin_role(target)).await? {
            Ok(()) => {
                info!(caller = %caller_id, target = %target, "Role elevated to admin");
                Ok(())
            }
            // Deleted between lookup and update
            Err(StoreError::NotFound) => Err(AuthError::UserNotFound),
            Err(e) => Err(e.into()),
        }
    }

    /// Live admin check used by the authorization gate
    pub async fn is_admin(&self, user_id: Uuid) -> Result<bool> {
        Ok(self.bounded(self.store.is_admin(user_id)).await??)
    }

    pub async fn has_admin(&self) -> Result<bool> {
        Ok(self.bounded(self.store.count_admins()).await?? > 0)
    }

    /// Register a standard user
    pub async fn register(&self, email: &str, password: &str) -> Result<User> {
        self.create_user(email, password, UserRole::Standard).await
    }

    /// Ensure an admin exists; creates or promotes `email` only when there is none.
    pub async fn bootstrap_admin(&self, email: &str, password: &str) -> Result<Option<User>> {
        if self.has_admin().await? {
            debug!("Admin already present, bootstrap skipped");
            return Ok(None);
        }

        let email = normalize_email(email);
        match self.bounded(self.store.get_user_by_email(&email)).await? {
            Ok(mut user) => {
                self.bounded(self.store.set_admin_role(user.id)).await??;
                user.role = UserRole::Admin;
                info!(user_id = %user.id, "Existing user promoted to bootstrap admin");
                Ok(Some(user))
            }
            Err(StoreError::NotFound) => {
                let user = self.create_user(&email, password, UserRole::Admin).await?;
                info!(user_id = %user.id, "Bootstrap admin created");
                Ok(Some(user))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn create_user(&self, email: &str, password: &str, role: UserRole) -> Result<User> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;

        let hasher = self.hasher.clone();
        let plaintext = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || hasher.hash_password(&plaintext))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))??;

        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash,
            role,
        };

        match self.bounded(self.store.create_user(&user)).await? {
            Ok(()) => {
                info!(user_id = %user.id, role = role.as_str(), "User created");
                Ok(user)
            }
            Err(StoreError::Conflict) => Err(AuthError::EmailTaken),
            Err(e) => Err(e.into()),
        }
    }

    fn mint_pair(&self, user_id: Uuid, role: UserRole) -> Result<(TokenPair, RefreshTokenRecord)> {
        let access_token = self
            .codec
            .issue_access_token(user_id, role, self.settings.access_ttl)?;
        let refresh_token = self.codec.issue_refresh_token();

        let record = RefreshTokenRecord {
            token: refresh_token.clone(),
            user_id,
            role,
        };
        let pair = TokenPair {
            access_token,
            refresh_token,
            expires_in: self.settings.access_ttl.as_secs(),
        };
        Ok((pair, record))
    }

    async fn check_password(&self, hash: Option<String>, plaintext: &str) -> Result<bool> {
        let hasher = self.hasher.clone();
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => hasher.compare_password(&hash, &plaintext),
            None => {
                hasher.compare_dummy(&plaintext);
                false
            }
        })
        .await
        .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Bound a store call by the configured timeout
    async fn bounded<T, F>(&self, fut: F) -> Result<StoreResult<T>>
    where
        F: Future<Output = StoreResult<T>>,
    {
        tokio::time::timeout(self.settings.store_timeout, fut)
            .await
            .map_err(|_| {
                error!(
                    timeout_ms = self.settings.store_timeout.as_millis() as u64,
                    "Store call timed out"
                );
                AuthError::Cancelled
            })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<()> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(AuthError::InvalidInput("email is not valid".to_string()));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(AuthError::InvalidInput(format!(
            "password must be {PASSWORD_MIN_LEN}-{PASSWORD_MAX_LEN} characters"
        )));
    }
    if password.len() > BCRYPT_MAX_BYTES {
        return Err(AuthError::InvalidInput(format!(
            "password must be at most {BCRYPT_MAX_BYTES} bytes"
        )));
    }
    Ok(())
}
