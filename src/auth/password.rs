//! Password hashing (bcrypt)

use crate::auth::error::{AuthError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// bcrypt only reads this many bytes of input and ignores the rest.
pub const BCRYPT_MAX_BYTES: usize = 72;

/// bcrypt wrapper with a fixed dummy hash for unknown-user comparisons
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: String,
    verifications: AtomicU64,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self> {
        // Same cost as real hashes so a miss takes as long as a wrong password.
        let dummy_hash = bcrypt::hash("credential-service-dummy", cost)
            .map_err(|e| AuthError::Hashing(format!("bcrypt cost {cost}: {e}")))?;
        Ok(Self {
            cost,
            dummy_hash,
            verifications: AtomicU64::new(0),
        })
    }

    pub fn hash_password(&self, plaintext: &str) -> Result<String> {
        if plaintext.len() > BCRYPT_MAX_BYTES {
            return Err(AuthError::InvalidInput(format!(
                "password must be at most {BCRYPT_MAX_BYTES} bytes"
            )));
        }
        bcrypt::hash(plaintext, self.cost).map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Returns false on mismatch, on malformed stored hashes and on input
    /// longer than bcrypt reads (it would match on its first 72 bytes alone).
    pub fn compare_password(&self, hash: &str, plaintext: &str) -> bool {
        if plaintext.len() > BCRYPT_MAX_BYTES {
            self.compare_dummy(plaintext);
            return false;
        }

        self.verifications.fetch_add(1, Ordering::Relaxed);
        match bcrypt::verify(plaintext, hash) {
            Ok(valid) => valid,
            Err(e) => {
                warn!(error = %e, "Stored password hash could not be parsed");
                false
            }
        }
    }

    /// Burn one comparison against the dummy hash.
    pub fn compare_dummy(&self, plaintext: &str) {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        let _ = bcrypt::verify(plaintext, &self.dummy_hash);
    }

    /// bcrypt verifications performed so far, real and dummy alike.
    pub fn verifications(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }
}
