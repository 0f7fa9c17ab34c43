//! Authentication API Endpoints
//! Mission: Map HTTP requests onto the credential lifecycle and errors onto status codes

use crate::auth::{
    error::AuthError,
    models::{
        Claims, ClaimsResponse, LoginRequest, RefreshRequest, RegisterRequest, TokenPair,
        UserResponse,
    },
    service::AuthService,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use tracing::{error, info};
use uuid::Uuid;

/// Register endpoint - POST /user/register
pub async fn register(
    State(service): State<AuthService>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AuthApiError> {
    let user = service.register(&payload.email, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from_user(&user))))
}

/// Login endpoint - POST /login
pub async fn login(
    State(service): State<AuthService>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenPair>, AuthApiError> {
    let pair = service
        .authenticate(&payload.email, &payload.password)
        .await?;
    Ok(Json(pair))
}

/// Refresh endpoint - POST /refresh
pub async fn refresh(
    State(service): State<AuthService>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<TokenPair>, AuthApiError> {
    let pair = service.refresh(&payload.refresh_token).await?;
    Ok(Json(pair))
}

/// Logout endpoint - POST /logout
pub async fn logout(
    State(service): State<AuthService>,
    Json(payload): Json<RefreshRequest>,
) -> Result<StatusCode, AuthApiError> {
    service.logout(&payload.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Get current identity - GET /me
/// Built from the verified claims alone (no database lookup)
pub async fn get_current_user(Extension(claims): Extension<Claims>) -> Json<ClaimsResponse> {
    Json(ClaimsResponse {
        id: claims.sub,
        role: claims.role,
        expires_at: claims.exp,
    })
}

/// Elevate a user to admin - PATCH /users/:id (Admin only)
pub async fn elevate_role(
    State(service): State<AuthService>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<String>,
) -> Result<StatusCode, AuthApiError> {
    let target = Uuid::parse_str(&user_id).map_err(|_| AuthApiError::InvalidUserId)?;

    service
        .elevate_role(&claims, target)
        .await
        .map_err(|e| match e {
            AuthError::UserNotFound => AuthApiError::UserNotFound,
            other => other.into(),
        })?;

    info!(target = %target, "Role elevation applied");
    Ok(StatusCode::NO_CONTENT)
}

/// Health check - GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// Auth API errors
#[derive(Debug, PartialEq, Eq)]
pub enum AuthApiError {
    InvalidCredentials,
    TokenNotFound,
    Unauthorized,
    Forbidden,
    UserNotFound,
    UserAlreadyExists,
    InvalidInput(String),
    InvalidUserId,
    InternalError,
}

impl From<AuthError> for AuthApiError {
    fn from(e: AuthError) -> Self {
        if e.is_server_fault() {
            error!(error = %e, "Request failed on a server fault");
            return AuthApiError::InternalError;
        }

        match e {
            // Same answer for both so callers cannot probe which emails exist
            AuthError::InvalidCredentials | AuthError::UserNotFound => {
                AuthApiError::InvalidCredentials
            }
            AuthError::TokenNotFound => AuthApiError::TokenNotFound,
            AuthError::ExpiredToken | AuthError::InvalidToken => AuthApiError::Unauthorized,
            AuthError::NotAdmin => AuthApiError::Forbidden,
            AuthError::EmailTaken => AuthApiError::UserAlreadyExists,
            AuthError::InvalidInput(msg) => AuthApiError::InvalidInput(msg),
            AuthError::Storage(_)
            | AuthError::Signing(_)
            | AuthError::Hashing(_)
            | AuthError::Cancelled => AuthApiError::InternalError,
        }
    }
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Invalid email or password".to_string())
            }
            AuthApiError::TokenNotFound => {
                (StatusCode::NOT_FOUND, "Refresh token not found".to_string())
            }
            AuthApiError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }
            AuthApiError::Forbidden => {
                (StatusCode::FORBIDDEN, "Insufficient permissions".to_string())
            }
            AuthApiError::UserNotFound => (StatusCode::NOT_FOUND, "User not found".to_string()),
            AuthApiError::UserAlreadyExists => {
                (StatusCode::CONFLICT, "Email already registered".to_string())
            }
            AuthApiError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AuthApiError::InvalidUserId => {
                (StatusCode::BAD_REQUEST, "Invalid user ID format".to_string())
            }
            AuthApiError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumeration_errors_are_indistinguishable() {
        let wrong_password = AuthApiError::from(AuthError::InvalidCredentials);
        let unknown_user = AuthApiError::from(AuthError::UserNotFound);
        assert_eq!(wrong_password, unknown_user);
    }

    #[test]
    fn test_auth_error_mapping() {
        assert_eq!(
            AuthApiError::from(AuthError::TokenNotFound),
            AuthApiError::TokenNotFound
        );
        assert_eq!(
            AuthApiError::from(AuthError::ExpiredToken),
            AuthApiError::Unauthorized
        );
        assert_eq!(AuthApiError::from(AuthError::NotAdmin), AuthApiError::Forbidden);
        assert_eq!(
            AuthApiError::from(AuthError::EmailTaken),
            AuthApiError::UserAlreadyExists
        );
        assert_eq!(
            AuthApiError::from(AuthError::Signing("bad key".into())),
            AuthApiError::InternalError
        );
        assert_eq!(
            AuthApiError::from(AuthError::Cancelled),
            AuthApiError::InternalError
        );
    }

    #[test]
    fn test_auth_api_error_responses() {
        let invalid_creds = AuthApiError::InvalidCredentials.into_response();
        assert_eq!(invalid_creds.status(), StatusCode::UNAUTHORIZED);

        let not_found = AuthApiError::TokenNotFound.into_response();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let forbidden = AuthApiError::Forbidden.into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let conflict = AuthApiError::UserAlreadyExists.into_response();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let bad_input = AuthApiError::InvalidInput("email is not valid".into()).into_response();
        assert_eq!(bad_input.status(), StatusCode::BAD_REQUEST);

        let internal = AuthApiError::InternalError.into_response();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
