//! Public category endpoints
//!
//! - GET /api/categories - category tree

use axum::{extract::State, routing::get, Json, Router};

use crate::api::middleware::{ApiError, AppState};
use crate::models::CategoryTree;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_categories))
}

pub async fn list_categories(
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryTree>>, ApiError> {
    Ok(Json(state.categories.list_tree().await?))
}
