//! Public tag endpoints
//!
//! - GET /api/tags - tag cloud, busiest tags first

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState};
use crate::models::TagWithCount;

#[derive(Debug, Deserialize)]
pub struct TagCloudQuery {
    #[serde(default = "default_cloud_limit")]
    pub limit: usize,
    /// Include tags without published posts
    #[serde(default)]
    pub include_empty: bool,
}

fn default_cloud_limit() -> usize {
    50
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(tag_cloud))
}

pub async fn tag_cloud(
    State(state): State<AppState>,
    Query(query): Query<TagCloudQuery>,
) -> Result<Json<Vec<TagWithCount>>, ApiError> {
    let tags = state
        .tags
        .list_with_counts()
        .await?
        .into_iter()
        .filter(|t| query.include_empty || t.post_count > 0)
        .take(query.limit)
        .collect();
    Ok(Json(tags))
}
