//! Data models
//!
//! Entities stored by the repositories (Post, Category, Tag, User, Setting)
//! and the input types the API deserializes into.

mod category;
mod post;
mod settings;
mod tag;
mod user;

pub use category::{Category, CategoryTree, CreateCategoryInput, UpdateCategoryInput};
pub use post::{
    CreatePostInput, ListParams, PagedResult, Post, PostFilter, PostStatus, UpdatePostInput,
};
pub use settings::{Setting, SettingType};
pub use tag::{Tag, TagWithCount};
pub use user::{CreateUserInput, UpdateProfileInput, User, UserRole};
