//! API state, error body and admin token guard

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::db::repositories::{
    CategoryRepository, PostRepository, RepoError, SettingsRepository, SqlCategoryRepository,
    SqlPostRepository, SqlSettingsRepository, SqlTagRepository, SqlUserRepository, TagRepository,
    UserRepository,
};
use crate::db::{Database, DatabaseError};
use crate::services::{AuthError, AuthService, PasswordHasher, SettingsService};

/// Application state shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub hasher: PasswordHasher,
    pub posts: Arc<dyn PostRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub tags: Arc<dyn TagRepository>,
    pub users: Arc<dyn UserRepository>,
    pub settings: Arc<dyn SettingsRepository>,
    pub site: Arc<SettingsService>,
    pub auth: Arc<AuthService>,
    /// Bearer token for `/api/admin`. `None` disables the admin API.
    pub api_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(db: Database, hasher: PasswordHasher, api_token: Option<String>) -> Self {
        let users = SqlUserRepository::boxed(db.clone(), hasher);
        let settings = SqlSettingsRepository::boxed(db.clone());
        Self {
            posts: SqlPostRepository::boxed(db.clone()),
            categories: SqlCategoryRepository::boxed(db.clone()),
            tags: SqlTagRepository::boxed(db.clone()),
            site: Arc::new(SettingsService::new(settings.clone())),
            auth: Arc::new(AuthService::new(users.clone(), hasher)),
            users,
            settings,
            api_token: api_token.map(Arc::from),
            hasher,
            db,
        }
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" | "ACCOUNT_DISABLED" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" | "PASSWORD_RESET_REQUIRED" => StatusCode::CONFLICT,
            "SERVICE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Invalid(message) => ApiError::validation_error(message),
            RepoError::Database(DatabaseError::UniqueViolation(message)) => {
                ApiError::conflict(message)
            }
            RepoError::Database(DatabaseError::EnvironmentUnavailable(message)) => {
                ApiError::new("SERVICE_UNAVAILABLE", message)
            }
            other => {
                tracing::error!("Request failed: {}", other);
                ApiError::internal_error("Internal server error")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::unauthorized(err.to_string()),
            AuthError::AccountDisabled => ApiError::new("ACCOUNT_DISABLED", err.to_string()),
            AuthError::PasswordResetRequired => ApiError::new(
                "PASSWORD_RESET_REQUIRED",
                "Your password must be reset before you can sign in",
            ),
            AuthError::Repository(e) => e.into(),
        }
    }
}

fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
}

/// Guard for the admin API: the request must carry the configured bearer
/// token.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.api_token.as_deref() else {
        return Err(ApiError::forbidden("Admin API is disabled"));
    };

    let provided = extract_bearer_token(&request)
        .ok_or_else(|| ApiError::unauthorized("Missing API token"))?;

    if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
        tracing::warn!("Rejected admin request with an invalid API token");
        return Err(ApiError::unauthorized("Invalid API token"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_error_statuses() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::internal_error("x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_auth_errors_map_to_codes() {
        let err = ApiError::from(AuthError::PasswordResetRequired);
        assert_eq!(err.error.code, "PASSWORD_RESET_REQUIRED");
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ApiError::from(AuthError::AccountDisabled);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);

        let err = ApiError::from(AuthError::InvalidCredentials);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_repo_errors_map_to_codes() {
        let err = ApiError::from(RepoError::Invalid("bad".to_string()));
        assert_eq!(err.error.code, "VALIDATION_ERROR");
        assert_eq!(err.error.message, "bad");

        let err = ApiError::from(RepoError::Database(DatabaseError::UniqueViolation(
            "users.email".to_string(),
        )));
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ApiError::from(RepoError::Database(DatabaseError::WriteFailed {
            operation: "insert",
        }));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_extract_bearer_token() {
        let request = Request::builder()
            .header(header::AUTHORIZATION, "Bearer secret ")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&request), Some("secret"));

        let request = Request::builder()
            .header(header::AUTHORIZATION, "Basic abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&request), None);

        let request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(extract_bearer_token(&request), None);
    }
}
