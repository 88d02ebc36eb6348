//! Database repositories
//!
//! One repository per entity. Each is a trait plus an implementation over
//! [`Database`](crate::db::Database), so every query runs unchanged on
//! MySQL and SQLite.

pub mod category;
pub mod post;
pub mod settings;
pub mod slug;
pub mod tag;
pub mod user;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::services::password::PasswordError;

pub use category::{CategoryRepository, SqlCategoryRepository};
pub use post::{PostRepository, SqlPostRepository};
pub use settings::{SettingsRepository, SqlSettingsRepository};
pub use slug::{slugify, slugify_or, unique_slug, SlugTable};
pub use tag::{SqlTagRepository, TagRepository};
pub use user::{SqlUserRepository, UserRepository};

/// Errors returned by repositories
#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    /// Input rejected before touching the database
    #[error("invalid input: {0}")]
    Invalid(String),
}

impl RepoError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, RepoError::Database(e) if e.is_unique_violation())
    }
}

pub type RepoResult<T> = Result<T, RepoError>;
