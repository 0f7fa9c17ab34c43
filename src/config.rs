//! Service configuration
//!
//! Flags fall back to environment variables (after `.env` is loaded), so a
//! deployment can be configured entirely through the environment.

use crate::auth::ServiceSettings;
use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::{net::SocketAddr, time::Duration};

const MIN_SECRET_LEN: usize = 32;
/// One day
const MAX_ACCESS_TTL_SECS: u64 = 24 * 60 * 60;

/// Deployment flavour; selects log format and default verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AppEnv {
    Local,
    Dev,
    Prod,
}

impl AppEnv {
    pub fn json_logs(&self) -> bool {
        !matches!(self, AppEnv::Local)
    }

    pub fn default_filter(&self) -> &'static str {
        match self {
            AppEnv::Local | AppEnv::Dev => "credential_service=debug,tower_http=debug",
            AppEnv::Prod => "credential_service=info",
        }
    }
}

#[derive(Parser, Clone)]
#[command(name = "credential-service")]
#[command(about = "Issues, rotates and revokes access/refresh credentials")]
pub struct Config {
    /// Listen address
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// SQLite database file
    #[arg(long, env = "AUTH_DB_PATH", default_value = "credentials.db")]
    pub db_path: String,

    /// HMAC secret for access tokens (at least 32 bytes)
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Access token lifetime in seconds
    #[arg(long, env = "ACCESS_TOKEN_TTL_SECS", default_value = "900")]
    pub access_token_ttl_secs: u64,

    /// Upper bound on any single store call in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// Pooled SQLite connections
    #[arg(long, env = "DB_POOL_SIZE", default_value = "8")]
    pub db_pool_size: u32,

    /// bcrypt work factor
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// local | dev | prod
    #[arg(long, env = "APP_ENV", value_enum, default_value = "local")]
    pub app_env: AppEnv,

    /// Bootstrap admin created at startup when no admin exists
    #[arg(long, env = "ADMIN_EMAIL")]
    pub admin_email: Option<String>,

    #[arg(long, env = "ADMIN_PASSWORD", hide_env_values = true)]
    pub admin_password: Option<String>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_SECRET_LEN} bytes");
        }
        if !(1..=MAX_ACCESS_TTL_SECS).contains(&self.access_token_ttl_secs) {
            bail!("ACCESS_TOKEN_TTL_SECS must be between 1 and {MAX_ACCESS_TTL_SECS}");
        }
        if self.store_timeout_ms == 0 {
            bail!("STORE_TIMEOUT_MS must be positive");
        }
        if self.db_pool_size == 0 {
            bail!("DB_POOL_SIZE must be positive");
        }
        if self.admin_email.is_some() != self.admin_password.is_some() {
            bail!("ADMIN_EMAIL and ADMIN_PASSWORD must be set together");
        }
        Ok(())
    }

    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            access_ttl: Duration::from_secs(self.access_token_ttl_secs),
            store_timeout: Duration::from_millis(self.store_timeout_ms),
        }
    }

    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }
}
