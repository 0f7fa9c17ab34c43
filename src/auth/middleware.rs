//! Authorization Gate
//! Mission: Reject unauthenticated or under-privileged requests before the handler runs

use crate::auth::{
    error::AuthError,
    jwt::TokenCodec,
    models::{Claims, UserRole},
    service::AuthService,
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, warn};

const EXPIRED_CHALLENGE: &str =
    r#"Bearer error="invalid_token", error_description="token expired""#;

/// Authenticate stage: verify the bearer token and attach its claims
pub async fn auth_middleware(
    State(service): State<AuthService>,
    mut req: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    let claims = authenticate(service.codec(), req.headers())?;

    // Add claims to request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Authorize stage for privileged routes; layer it inside `auth_middleware`
pub async fn admin_middleware(
    State(service): State<AuthService>,
    req: Request,
    next: Next,
) -> Result<Response, GateRejection> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(GateRejection::MissingToken)?;

    authorize_admin(&service, claims).await?;

    Ok(next.run(req).await)
}

/// Pull `Bearer <token>` out of the Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub fn authenticate(codec: &TokenCodec, headers: &HeaderMap) -> Result<Claims, GateRejection> {
    let token = bearer_token(headers).ok_or(GateRejection::MissingToken)?;

    codec.verify_access_token(token).map_err(|e| match e {
        AuthError::ExpiredToken => GateRejection::ExpiredToken,
        _ => GateRejection::InvalidToken,
    })
}

/// Role claim must say admin AND the store must still agree
pub async fn authorize_admin(service: &AuthService, claims: &Claims) -> Result<(), GateRejection> {
    if claims.role != UserRole::Admin {
        debug!(sub = %claims.sub, "Admin route denied: role claim");
        return Err(GateRejection::Forbidden);
    }

    let user_id = claims.user_id().ok_or(GateRejection::Forbidden)?;
    match service.is_admin(user_id).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            warn!(user_id = %user_id, "Admin claim no longer backed by store");
            Err(GateRejection::Forbidden)
        }
        Err(e) => {
            error!(user_id = %user_id, error = %e, "Admin re-check failed");
            Err(GateRejection::Unavailable)
        }
    }
}

/// Gate rejections
#[derive(Debug, PartialEq, Eq)]
pub enum GateRejection {
    MissingToken,
    InvalidToken,
    ExpiredToken,
    Forbidden,
    Unavailable,
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            GateRejection::MissingToken => {
                (StatusCode::UNAUTHORIZED, "Missing authorization token")
            }
            GateRejection::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
            GateRejection::ExpiredToken => {
                (StatusCode::UNAUTHORIZED, "Token expired, please refresh")
            }
            GateRejection::Forbidden => (StatusCode::FORBIDDEN, "Insufficient permissions"),
            GateRejection::Unavailable => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let mut response = (status, message).into_response();
        if self == GateRejection::ExpiredToken {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(EXPIRED_CHALLENGE),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    const SECRET: &[u8] = b"gate-test-secret-0123456789abcde";

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("Basic abc")), None);
        assert_eq!(bearer_token(&headers_with("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_authenticate_stage() {
        let codec = TokenCodec::new(SECRET);
        let user_id = Uuid::new_v4();

        let live = codec
            .issue_access_token(user_id, UserRole::Standard, Duration::from_secs(60))
            .unwrap();
        let claims = authenticate(&codec, &headers_with(&format!("Bearer {live}"))).unwrap();
        assert_eq!(claims.user_id(), Some(user_id));

        let expired = codec
            .issue_access_token(user_id, UserRole::Standard, Duration::ZERO)
            .unwrap();
        assert_eq!(
            authenticate(&codec, &headers_with(&format!("Bearer {expired}"))),
            Err(GateRejection::ExpiredToken)
        );

        assert_eq!(
            authenticate(&codec, &headers_with("Bearer garbage")),
            Err(GateRejection::InvalidToken)
        );
        assert_eq!(
            authenticate(&codec, &HeaderMap::new()),
            Err(GateRejection::MissingToken)
        );
    }

    #[test]
    fn test_gate_rejection_responses() {
        let missing = GateRejection::MissingToken.into_response();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let invalid = GateRejection::InvalidToken.into_response();
        assert_eq!(invalid.status(), StatusCode::UNAUTHORIZED);
        assert!(invalid.headers().get(header::WWW_AUTHENTICATE).is_none());

        let expired = GateRejection::ExpiredToken.into_response();
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            expired.headers().get(header::WWW_AUTHENTICATE).unwrap(),
            EXPIRED_CHALLENGE
        );

        let forbidden = GateRejection::Forbidden.into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let unavailable = GateRejection::Unavailable.into_response();
        assert_eq!(unavailable.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
