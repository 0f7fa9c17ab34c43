//! Route table

use crate::{
    auth::{
        api,
        middleware::{admin_middleware, auth_middleware},
        service::AuthService,
    },
    middleware::request_logging,
};
use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::CorsLayer;

pub fn router(service: AuthService) -> Router {
    // Public routes
    let public_routes = Router::new()
        .route("/health", get(api::health))
        .route("/user/register", post(api::register))
        .route("/login", post(api::login))
        .route("/refresh", post(api::refresh))
        .route("/logout", post(api::logout));

    // Bearer token required
    let protected_routes = Router::new()
        .route("/me", get(api::get_current_user))
        .route_layer(middleware::from_fn_with_state(
            service.clone(),
            auth_middleware,
        ));

    // Bearer token + live admin check; the last route_layer runs first
    let admin_routes = Router::new()
        .route("/users/:id", patch(api::elevate_role))
        .route_layer(middleware::from_fn_with_state(
            service.clone(),
            admin_middleware,
        ))
        .route_layer(middleware::from_fn_with_state(
            service.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(service)
}
