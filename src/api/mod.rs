//! API layer - HTTP handlers and routing
//!
//! Public, read-only endpoints live under `/api`. Writes live under
//! `/api/admin` and require the configured bearer token.

pub mod admin;
pub mod auth;
pub mod categories;
pub mod middleware;
pub mod posts;
pub mod site;
pub mod tags;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::get,
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use middleware::{ApiError, AppState};

/// Build the `/api` router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    let admin_routes = admin::router().route_layer(axum_middleware::from_fn_with_state(
        state,
        middleware::require_api_token,
    ));

    Router::new()
        .route("/health", get(site::health))
        .route("/settings/site", get(site::site_settings))
        .nest("/posts", posts::router())
        .nest("/categories", categories::router())
        .nest("/tags", tags::router())
        .nest("/auth", auth::router())
        .nest("/admin", admin_routes)
}

fn cors_layer(cors_origin: &str) -> CorsLayer {
    let origin = if cors_origin == "*" {
        AllowOrigin::any()
    } else {
        match cors_origin.parse::<HeaderValue>() {
            Ok(value) => AllowOrigin::exact(value),
            Err(_) => {
                tracing::warn!("Invalid CORS origin '{}', allowing none", cors_origin);
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Router {
    Router::new()
        .nest("/api", build_api_router(state.clone()))
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
