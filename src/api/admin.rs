//! Admin API endpoints, mounted under `/api/admin` behind the API token.
//!
//! - GET    /stats
//! - GET    /posts, POST /posts
//! - GET    /posts/{id}, PUT /posts/{id}, DELETE /posts/{id}
//! - POST   /posts/{id}/publish
//! - POST   /categories, PUT /categories/{id}, DELETE /categories/{id}
//! - GET    /tags, POST /tags, DELETE /tags/{id}
//! - GET    /settings, PUT /settings/site, PUT /settings/{key}, DELETE /settings/{key}
//! - GET    /users, POST /users, POST /users/{id}/deactivate,
//!   POST /users/{id}/activate, DELETE /users/{id}?confirm={username}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::middleware::{ApiError, AppState};
use crate::api::posts::PostResponse;
use crate::models::{
    Category, CreateCategoryInput, CreatePostInput, CreateUserInput, ListParams, PagedResult, Post,
    PostFilter, PostStatus, Setting, SettingType, Tag, TagWithCount, UpdateCategoryInput,
    UpdatePostInput, User,
};
use crate::services::SiteSettings;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/stats", get(stats))
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/{id}",
            get(get_post).put(update_post).delete(delete_post),
        )
        .route("/posts/{id}/publish", post(publish_post))
        .route("/categories", post(create_category))
        .route(
            "/categories/{id}",
            put(update_category).delete(delete_category),
        )
        .route("/tags", get(list_tags).post(create_tag))
        .route("/tags/{id}", axum::routing::delete(delete_tag))
        .route("/settings", get(list_settings))
        .route("/settings/site", put(update_site_settings))
        .route("/settings/{key}", put(set_setting).delete(delete_setting))
        .route("/users", get(list_users).post(create_user))
        .route("/users/{id}", axum::routing::delete(delete_user))
        .route("/users/{id}/deactivate", post(deactivate_user))
        .route("/users/{id}/activate", post(activate_user))
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_posts: i64,
    pub published_posts: i64,
    pub draft_posts: i64,
    pub total_users: usize,
    /// Users still on the other runtime's hash format
    pub legacy_password_hashes: i64,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let drafts = PostFilter {
        status: Some(PostStatus::Draft),
        ..PostFilter::default()
    };
    Ok(Json(StatsResponse {
        total_posts: state.posts.count(&PostFilter::default()).await?,
        published_posts: state.posts.count(&PostFilter::published()).await?,
        draft_posts: state.posts.count(&drafts).await?,
        total_users: state.users.list().await?.len(),
        legacy_password_hashes: state.users.count_legacy_hashes().await?,
    }))
}

// ============================================================================
// Posts
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct AdminPostsQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<PostStatus>,
    pub author_id: Option<i64>,
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<AdminPostsQuery>,
) -> Result<Json<PagedResult<Post>>, ApiError> {
    let params = ListParams::new(query.page.unwrap_or(1), query.per_page.unwrap_or(20));
    let filter = PostFilter {
        status: query.status,
        author_id: query.author_id,
        ..PostFilter::default()
    };
    Ok(Json(state.posts.list(&filter, &params).await?))
}

async fn post_response(state: &AppState, post: Post) -> Result<PostResponse, ApiError> {
    let tags = state.posts.tags_for(post.id).await?;
    Ok(PostResponse { post, tags })
}

async fn check_references(
    state: &AppState,
    author_id: Option<i64>,
    category_id: Option<i64>,
) -> Result<(), ApiError> {
    if let Some(author_id) = author_id {
        if state.users.get_by_id(author_id).await?.is_none() {
            return Err(ApiError::validation_error(format!(
                "Author {} does not exist",
                author_id
            )));
        }
    }
    if let Some(category_id) = category_id {
        if state.categories.get_by_id(category_id).await?.is_none() {
            return Err(ApiError::validation_error(format!(
                "Category {} does not exist",
                category_id
            )));
        }
    }
    Ok(())
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(input): Json<CreatePostInput>,
) -> Result<(StatusCode, Json<PostResponse>), ApiError> {
    check_references(&state, Some(input.author_id), input.category_id).await?;
    let post = state.posts.create(&input).await?;
    Ok((StatusCode::CREATED, Json(post_response(&state, post).await?)))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state
        .posts
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post {} not found", id)))?;
    Ok(Json(post_response(&state, post).await?))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdatePostInput>,
) -> Result<Json<PostResponse>, ApiError> {
    check_references(&state, None, input.category_id.flatten()).await?;
    let post = state
        .posts
        .update(id, &input)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post {} not found", id)))?;
    Ok(Json(post_response(&state, post).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !state.posts.delete(id).await? {
        return Err(ApiError::not_found(format!("Post {} not found", id)));
    }
    Ok(Json(DeletedResponse { deleted: true }))
}

pub async fn publish_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostResponse>, ApiError> {
    let post = state
        .posts
        .publish(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Post {} not found", id)))?;
    Ok(Json(post_response(&state, post).await?))
}

// ============================================================================
// Categories
// ============================================================================

pub async fn create_category(
    State(state): State<AppState>,
    Json(input): Json<CreateCategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.categories.create(&input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(input): Json<UpdateCategoryInput>,
) -> Result<Json<Category>, ApiError> {
    let category = state
        .categories
        .update(id, &input)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Category {} not found", id)))?;
    Ok(Json(category))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !state.categories.delete(id).await? {
        return Err(ApiError::not_found(format!("Category {} not found", id)));
    }
    Ok(Json(DeletedResponse { deleted: true }))
}

// ============================================================================
// Tags
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

pub async fn list_tags(State(state): State<AppState>) -> Result<Json<Vec<TagWithCount>>, ApiError> {
    Ok(Json(state.tags.list_with_counts().await?))
}

pub async fn create_tag(
    State(state): State<AppState>,
    Json(body): Json<CreateTagRequest>,
) -> Result<(StatusCode, Json<Tag>), ApiError> {
    let tag = state.tags.create(&body.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

pub async fn delete_tag(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !state.tags.delete(id).await? {
        return Err(ApiError::not_found(format!("Tag {} not found", id)));
    }
    Ok(Json(DeletedResponse { deleted: true }))
}

// ============================================================================
// Settings
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SetSettingRequest {
    pub value: Value,
    #[serde(rename = "type")]
    pub setting_type: Option<SettingType>,
    pub description: Option<String>,
}

pub async fn list_settings(State(state): State<AppState>) -> Result<Json<Vec<Setting>>, ApiError> {
    Ok(Json(state.settings.get_all().await?))
}

pub async fn set_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SetSettingRequest>,
) -> Result<Json<Setting>, ApiError> {
    let setting = state
        .settings
        .set(&key, &body.value, body.setting_type, body.description.as_deref())
        .await?;
    Ok(Json(setting))
}

pub async fn update_site_settings(
    State(state): State<AppState>,
    Json(body): Json<SiteSettings>,
) -> Result<Json<SiteSettings>, ApiError> {
    state.site.update_site_settings(&body).await?;
    Ok(Json(state.site.get_site_settings().await?))
}

pub async fn delete_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeletedResponse>, ApiError> {
    if !state.settings.delete(&key).await? {
        return Err(ApiError::not_found(format!("Setting '{}' not found", key)));
    }
    Ok(Json(DeletedResponse { deleted: true }))
}

// ============================================================================
// Users
// ============================================================================

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.users.list().await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<CreateUserInput>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.users.create(&input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn deactivate_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    if !state.users.deactivate(id).await? {
        return Err(ApiError::not_found(format!("User {} not found", id)));
    }
    load_user(&state, id).await
}

pub async fn activate_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    if !state.users.activate(id).await? {
        return Err(ApiError::not_found(format!("User {} not found", id)));
    }
    load_user(&state, id).await
}

async fn load_user(state: &AppState, id: i64) -> Result<Json<User>, ApiError> {
    state
        .users
        .get_by_id(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("User {} not found", id)))
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteUserQuery {
    /// Must repeat the username; the delete also removes the user's posts
    pub confirm: Option<String>,
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<DeleteUserQuery>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let Json(user) = load_user(&state, id).await?;
    if query.confirm.as_deref() != Some(user.username.as_str()) {
        return Err(ApiError::validation_error(format!(
            "Deleting user {} removes all of their posts; pass confirm={} to proceed",
            id, user.username
        )));
    }

    if !state.users.hard_delete(id).await? {
        return Err(ApiError::not_found(format!("User {} not found", id)));
    }
    Ok(Json(DeletedResponse { deleted: true }))
}
