//! Site endpoints
//!
//! - GET /api/health - liveness, database ping and migration status
//! - GET /api/settings/site - public site settings

use axum::{extract::State, Json};
use serde::Serialize;

use crate::api::middleware::{ApiError, AppState};
use crate::db::migrations;
use crate::services::SiteSettings;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub runtime: &'static str,
    pub version: &'static str,
    /// Embedded migrations not applied to this database yet
    pub pending_migrations: usize,
}

pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state.db.ping().await.map_err(|e| {
        tracing::error!("Health check failed: {}", e);
        ApiError::new("SERVICE_UNAVAILABLE", "Database unreachable")
    })?;

    let pending = migrations::pending_count(&state.db).await.map_err(|e| {
        tracing::error!("Failed to read migration status: {:#}", e);
        ApiError::internal_error("Failed to read migration status")
    })?;

    Ok(Json(HealthResponse {
        status: if pending == 0 { "ok" } else { "migrations_pending" },
        pending_migrations: pending,
        runtime: state.db.runtime().as_str(),
        version: env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn site_settings(State(state): State<AppState>) -> Result<Json<SiteSettings>, ApiError> {
    Ok(Json(state.site.get_site_settings().await?))
}
