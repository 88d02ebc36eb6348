//! Login endpoint
//!
//! - POST /api/auth/login
//!
//! Only verifies credentials; session handling is left to the host.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::User;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: User,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state.auth.authenticate(&body.login, &body.password).await?;
    tracing::info!("User {} signed in", user.id);
    Ok(Json(LoginResponse { user }))
}
