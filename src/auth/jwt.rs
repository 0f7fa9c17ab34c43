//! JWT Token Codec
//! Mission: Mint and verify signed access tokens, generate opaque refresh tokens

use crate::auth::{
    error::{AuthError, Result},
    models::{Claims, UserRole},
};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

/// Refresh tokens carry 256 bits of OS randomness.
const REFRESH_TOKEN_BYTES: usize = 32;

/// Stateless codec for access and refresh tokens
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenCodec {
    /// Create a new codec with a shared HMAC secret
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked below with zero leeway; jsonwebtoken treats exp == now as live.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Issue a signed access token expiring at now + ttl
    pub fn issue_access_token(
        &self,
        user_id: Uuid,
        role: UserRole,
        ttl: Duration,
    ) -> Result<String> {
        let now = Utc::now().timestamp();
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        let claims = Claims {
            sub: user_id.to_string(),
            role,
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };

        debug!(user_id = %user_id, role = role.as_str(), ttl_secs, "Issuing access token");

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "Access token signing failed");
            AuthError::Signing(e.to_string())
        })
    }

    /// Verify signature and expiry, returning the embedded claims
    pub fn verify_access_token(&self, token: &str) -> Result<Claims> {
        let decoded = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            }
        })?;

        if decoded.claims.exp <= Utc::now().timestamp() {
            return Err(AuthError::ExpiredToken);
        }

        Ok(decoded.claims)
    }

    /// Generate an opaque refresh token
    pub fn issue_refresh_token(&self) -> String {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }
}
