//! SQLite Credential Store
//! Mission: Durable users + refresh tokens on a pooled SQLite database

use crate::auth::{
    models::{RefreshTokenRecord, User, UserRole},
    store::{CredentialStore, StoreError, StoreResult},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict
            }
            _ => StoreError::Backend(e.to_string()),
        }
    }
}

impl From<r2d2::Error> for StoreError {
    fn from(e: r2d2::Error) -> Self {
        StoreError::Backend(format!("connection pool: {e}"))
    }
}

/// Credential store backed by an r2d2 pool of SQLite connections
#[derive(Clone)]
pub struct SqliteCredentialStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCredentialStore {
    /// Open (or create) the database and initialize the schema
    pub fn open(db_path: &str, pool_size: u32) -> Result<Self> {
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn.pragma_update(None, "synchronous", "NORMAL")
        });

        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .context("Failed to build SQLite connection pool")?;

        let store = Self { pool };
        store.init_db()?;

        info!(db_path, pool_size, "Credential store ready");
        Ok(store)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<()> {
        let conn = self.pool.get().context("Failed to acquire connection")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('standard', 'admin'))
            );
            CREATE TABLE IF NOT EXISTS refresh_tokens (
                token TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK (role IN ('standard', 'admin'))
            );
            CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);",
        )
        .context("Failed to create credential schema")?;

        Ok(())
    }

    /// Run a blocking operation on a pooled connection
    async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            op(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
    }
}

fn parse_role(raw: &str) -> StoreResult<UserRole> {
    UserRole::parse(raw).ok_or_else(|| StoreError::Backend(format!("invalid stored role {raw:?}")))
}

fn parse_id(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|_| StoreError::Backend(format!("invalid stored id {raw:?}")))
}

fn query_user(conn: &Connection, column: &str, key: &str) -> StoreResult<User> {
    let sql = format!("SELECT id, email, password_hash, role FROM users WHERE {column} = ?1");
    let row = conn
        .query_row(&sql, params![key], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .optional()?;

    let (id, email, password_hash, role) = row.ok_or(StoreError::NotFound)?;
    Ok(User {
        id: parse_id(&id)?,
        email,
        password_hash,
        role: parse_role(&role)?,
    })
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn get_user_by_email(&self, email: &str) -> StoreResult<User> {
        let email = email.to_string();
        self.run(move |conn| query_user(conn, "email", &email)).await
    }

    async fn get_user_by_id(&self, user_id: Uuid) -> StoreResult<User> {
        self.run(move |conn| query_user(conn, "id", &user_id.to_string()))
            .await
    }

    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let user = user.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO users (id, email, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.id.to_string(),
                    user.email,
                    user.password_hash,
                    user.role.as_str(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn set_admin_role(&self, user_id: Uuid) -> StoreResult<()> {
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE users SET role = 'admin' WHERE id = ?1",
                params![user_id.to_string()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }

    async fn is_admin(&self, user_id: Uuid) -> StoreResult<bool> {
        self.run(move |conn| {
            let role: Option<String> = conn
                .query_row(
                    "SELECT role FROM users WHERE id = ?1",
                    params![user_id.to_string()],
                    |row| row.get(0),
                )
                .optional()?;

            match role {
                Some(role) => Ok(parse_role(&role)? == UserRole::Admin),
                None => Ok(false),
            }
        })
        .await
    }

    async fn count_admins(&self) -> StoreResult<u64> {
        self.run(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'admin'",
                [],
                |row| row.get(0),
            )?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn put_refresh_token(&self, record: &RefreshTokenRecord) -> StoreResult<()> {
        let record = record.clone();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO refresh_tokens (token, user_id, role) VALUES (?1, ?2, ?3)",
                params![
                    record.token,
                    record.user_id.to_string(),
                    record.role.as_str()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_refresh_token(&self, token: &str) -> StoreResult<RefreshTokenRecord> {
        let token = token.to_string();
        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT user_id, role FROM refresh_tokens WHERE token = ?1",
                    params![token],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()?;

            let (user_id, role) = row.ok_or(StoreError::NotFound)?;
            Ok(RefreshTokenRecord {
                token,
                user_id: parse_id(&user_id)?,
                role: parse_role(&role)?,
            })
        })
        .await
    }

    async fn replace_refresh_token(
        &self,
        old: &str,
        new: &RefreshTokenRecord,
    ) -> StoreResult<()> {
        let old = old.to_string();
        let new = new.clone();
        self.run(move |conn| {
            // IMMEDIATE takes the write lock up front so concurrent rotations serialize here.
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let removed = tx.execute(
                "DELETE FROM refresh_tokens WHERE token = ?1",
                params![old],
            )?;
            if removed == 0 {
                debug!("Rotation lost: presented refresh token already gone");
                return Err(StoreError::NotFound);
            }

            tx.execute(
                "INSERT INTO refresh_tokens (token, user_id, role) VALUES (?1, ?2, ?3)",
                params![new.token, new.user_id.to_string(), new.role.as_str()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_refresh_token(&self, token: &str) -> StoreResult<()> {
        let token = token.to_string();
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM refresh_tokens WHERE token = ?1",
                params![token],
            )?;
            if removed == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (SqliteCredentialStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = SqliteCredentialStore::open(db_path, 4).unwrap();
        (store, temp_file)
    }

    fn test_user(email: &str, role: UserRole) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$2b$04$hash".to_string(),
            role,
        }
    }

    fn record(token: &str, user: &User) -> RefreshTokenRecord {
        RefreshTokenRecord {
            token: token.to_string(),
            user_id: user.id,
            role: user.role,
        }
    }

    #[tokio::test]
    async fn test_create_and_retrieve_user() {
        let (store, _temp) = create_test_store();
        let user = test_user("a@x.com", UserRole::Standard);
        store.create_user(&user).await.unwrap();

        let by_email = store.get_user_by_email("a@x.com").await.unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_email.role, UserRole::Standard);
        assert_eq!(by_email.password_hash, user.password_hash);

        let by_id = store.get_user_by_id(user.id).await.unwrap();
        assert_eq!(by_id.email, "a@x.com");
    }

    #[tokio::test]
    async fn test_missing_user_is_not_found() {
        let (store, _temp) = create_test_store();

        assert!(matches!(
            store.get_user_by_email("nobody@x.com").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_user_by_id(Uuid::new_v4()).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let (store, _temp) = create_test_store();
        store
            .create_user(&test_user("a@x.com", UserRole::Standard))
            .await
            .unwrap();

        assert!(matches!(
            store
                .create_user(&test_user("a@x.com", UserRole::Admin))
                .await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_set_admin_role() {
        let (store, _temp) = create_test_store();
        let user = test_user("a@x.com", UserRole::Standard);
        store.create_user(&user).await.unwrap();

        assert!(!store.is_admin(user.id).await.unwrap());
        assert_eq!(store.count_admins().await.unwrap(), 0);

        store.set_admin_role(user.id).await.unwrap();
        assert!(store.is_admin(user.id).await.unwrap());
        assert_eq!(store.count_admins().await.unwrap(), 1);

        // Idempotent
        store.set_admin_role(user.id).await.unwrap();
        assert_eq!(store.count_admins().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_admin_role_unknown_user() {
        let (store, _temp) = create_test_store();

        assert!(matches!(
            store.set_admin_role(Uuid::new_v4()).await,
            Err(StoreError::NotFound)
        ));
        assert!(!store.is_admin(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_token_put_get_delete() {
        let (store, _temp) = create_test_store();
        let user = test_user("a@x.com", UserRole::Admin);

        store.put_refresh_token(&record("t1", &user)).await.unwrap();

        let fetched = store.get_refresh_token("t1").await.unwrap();
        assert_eq!(fetched, record("t1", &user));

        store.delete_refresh_token("t1").await.unwrap();
        assert!(matches!(
            store.get_refresh_token("t1").await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.delete_refresh_token("t1").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_refresh_token_collision_conflicts() {
        let (store, _temp) = create_test_store();
        let user = test_user("a@x.com", UserRole::Standard);

        store.put_refresh_token(&record("dup", &user)).await.unwrap();
        assert!(matches!(
            store.put_refresh_token(&record("dup", &user)).await,
            Err(StoreError::Conflict)
        ));
    }

    #[tokio::test]
    async fn test_user_may_hold_several_sessions() {
        let (store, _temp) = create_test_store();
        let user = test_user("a@x.com", UserRole::Standard);

        store.put_refresh_token(&record("s1", &user)).await.unwrap();
        store.put_refresh_token(&record("s2", &user)).await.unwrap();

        store.delete_refresh_token("s1").await.unwrap();
        assert!(store.get_refresh_token("s2").await.is_ok());
    }

    #[tokio::test]
    async fn test_replace_rotates_token() {
        let (store, _temp) = create_test_store();
        let user = test_user("a@x.com", UserRole::Standard);
        store.put_refresh_token(&record("old", &user)).await.unwrap();

        store
            .replace_refresh_token("old", &record("new", &user))
            .await
            .unwrap();

        assert!(matches!(
            store.get_refresh_token("old").await,
            Err(StoreError::NotFound)
        ));
        assert!(store.get_refresh_token("new").await.is_ok());
    }

    #[tokio::test]
    async fn test_replace_missing_token_inserts_nothing() {
        let (store, _temp) = create_test_store();
        let user = test_user("a@x.com", UserRole::Standard);

        assert!(matches!(
            store
                .replace_refresh_token("ghost", &record("new", &user))
                .await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_refresh_token("new").await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_replace_has_one_winner() {
        let (store, _temp) = create_test_store();
        let store = Arc::new(store);
        let user = test_user("a@x.com", UserRole::Standard);
        store.put_refresh_token(&record("old", &user)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            let next = record(&format!("new-{i}"), &user);
            handles.push(tokio::spawn(async move {
                store.replace_refresh_token("old", &next).await
            }));
        }

        let mut winners = 0;
        let mut losers = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(()) => winners += 1,
                Err(StoreError::NotFound) => losers += 1,
                Err(e) => panic!("unexpected store error: {e}"),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(losers, 7);

        let mut live = 0;
        for i in 0..8 {
            if store.get_refresh_token(&format!("new-{i}")).await.is_ok() {
                live += 1;
            }
        }
        assert_eq!(live, 1);
    }

    #[test]
    fn test_schema_rejects_unknown_role() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let _store = SqliteCredentialStore::open(db_path, 1).unwrap();

        let conn = Connection::open(db_path).unwrap();
        let result = conn.execute(
            "INSERT INTO users (id, email, password_hash, role) VALUES (?1, ?2, ?3, ?4)",
            params![Uuid::new_v4().to_string(), "x@x.com", "h", "root"],
        );
        assert!(result.is_err());
    }
}
