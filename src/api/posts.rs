//! Public post endpoints
//!
//! - GET /api/posts - published posts, paged and filtered
//! - GET /api/posts/{slug} - one published post; counts a view

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState};
use crate::models::{ListParams, PagedResult, Post, PostFilter, Tag};

#[derive(Debug, Default, Deserialize)]
pub struct ListPostsQuery {
    pub page: Option<u32>,
    /// Defaults to the `posts_per_page` site setting
    pub per_page: Option<u32>,
    /// Category slug
    pub category: Option<String>,
    /// Tag slug
    pub tag: Option<String>,
    pub featured: Option<bool>,
}

/// A post together with its tags
#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponse {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_posts))
        .route("/{slug}", get(get_post))
}

/// GET /api/posts
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<ListPostsQuery>,
) -> Result<Json<PagedResult<Post>>, ApiError> {
    let per_page = match query.per_page {
        Some(n) => n,
        None => state.site.get_site_settings().await?.posts_per_page,
    };
    let params = ListParams::new(query.page.unwrap_or(1), per_page);

    let mut filter = PostFilter {
        tag: query.tag,
        featured: query.featured,
        ..PostFilter::published()
    };
    if let Some(slug) = query.category.as_deref() {
        match state.categories.get_by_slug(slug).await? {
            Some(category) => filter.category_id = Some(category.id),
            None => return Ok(Json(PagedResult::new(Vec::new(), 0, &params))),
        }
    }

    Ok(Json(state.posts.list(&filter, &params).await?))
}

/// GET /api/posts/{slug}
pub async fn get_post(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<PostResponse>, ApiError> {
    let mut post = state
        .posts
        .get_by_slug(&slug)
        .await?
        .filter(Post::is_published)
        .ok_or_else(|| ApiError::not_found(format!("Post '{}' not found", slug)))?;

    if state.posts.increment_views(post.id).await? {
        post.view_count += 1;
    }
    let tags = state.posts.tags_for(post.id).await?;

    Ok(Json(PostResponse { post, tags }))
}
