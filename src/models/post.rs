//! Post model
//!
//! This module provides:
//! - `Post` entity representing a blog post
//! - `PostStatus` enum for publication states
//! - Input types for creating, updating and filtering posts
//! - Pagination types shared by list queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Post entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    /// Unique identifier
    pub id: i64,
    /// Post title
    pub title: String,
    /// URL-friendly slug, unique across posts
    pub slug: String,
    /// Short summary shown in listings
    pub excerpt: Option<String>,
    /// Body text
    pub content: String,
    /// Publication status
    pub status: PostStatus,
    /// Whether the post is highlighted on the front page
    pub is_featured: bool,
    /// Author user ID
    pub author_id: i64,
    /// Category ID, cleared when the category is deleted
    pub category_id: Option<i64>,
    /// View count
    pub view_count: i64,
    /// Set the first time the post is published
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    pub fn is_published(&self) -> bool {
        self.status == PostStatus::Published
    }
}

/// Post publication status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    /// Draft - not visible to public
    #[default]
    Draft,
    /// Published - visible to public
    Published,
    /// Archived - hidden but not deleted
    Archived,
}

impl PostStatus {
    /// Convert status to database string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::Published => "published",
            PostStatus::Archived => "archived",
        }
    }

    /// Parse status from database string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(PostStatus::Draft),
            "published" => Some(PostStatus::Published),
            "archived" => Some(PostStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Input for creating a new post.
///
/// The slug is derived from `slug` when given, otherwise from the title, and
/// made unique on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub excerpt: Option<String>,
    pub content: String,
    #[serde(default)]
    pub status: Option<PostStatus>,
    #[serde(default)]
    pub is_featured: bool,
    pub author_id: i64,
    #[serde(default)]
    pub category_id: Option<i64>,
    /// Tag names; missing tags are created
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreatePostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>, author_id: i64) -> Self {
        Self {
            title: title.into(),
            slug: None,
            excerpt: None,
            content: content.into(),
            status: None,
            is_featured: false,
            author_id,
            category_id: None,
            tags: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_category(mut self, category_id: i64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn featured(mut self) -> Self {
        self.is_featured = true;
        self
    }
}

/// Input for updating an existing post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub excerpt: Option<Option<String>>,
    pub content: Option<String>,
    pub status: Option<PostStatus>,
    pub is_featured: Option<bool>,
    pub category_id: Option<Option<i64>>,
    /// Replaces the full tag set when present
    pub tags: Option<Vec<String>>,
}

impl UpdatePostInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_status(mut self, status: PostStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = Some(tags.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Check if any column changes (tags are stored separately)
    pub fn has_changes(&self) -> bool {
        self.title.is_some()
            || self.slug.is_some()
            || self.excerpt.is_some()
            || self.content.is_some()
            || self.status.is_some()
            || self.is_featured.is_some()
            || self.category_id.is_some()
    }
}

/// Filters for post listings. Unset fields do not filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostFilter {
    pub status: Option<PostStatus>,
    pub category_id: Option<i64>,
    /// Tag slug
    pub tag: Option<String>,
    pub author_id: Option<i64>,
    pub featured: Option<bool>,
}

impl PostFilter {
    pub fn published() -> Self {
        Self {
            status: Some(PostStatus::Published),
            ..Self::default()
        }
    }
}

/// Pagination parameters for list queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListParams {
    /// Page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
    pub total_pages: u32,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 10,
            total_pages: 0,
        }
    }
}

impl ListParams {
    /// Create new pagination parameters, clamping to sane bounds
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.clamp(1, 100),
            total_pages: 0,
        }
    }

    /// Calculate the offset for database queries
    pub fn offset(&self) -> i64 {
        (self.page.saturating_sub(1) as i64) * self.per_page as i64
    }

    /// Get the limit for database queries
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }
}

/// Paginated result container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PagedResult<T> {
    /// Items in the current page
    pub items: Vec<T>,
    /// Total number of items across all pages
    pub total: i64,
    /// Current page number (1-indexed)
    pub page: u32,
    /// Number of items per page
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ListParams) -> Self {
        let total_pages = if total <= 0 {
            0
        } else {
            (total as u64).div_ceil(params.per_page.max(1) as u64) as u32
        };
        Self {
            items,
            total,
            page: params.page,
            per_page: params.per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_status_round_trip() {
        for status in [PostStatus::Draft, PostStatus::Published, PostStatus::Archived] {
            assert_eq!(PostStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(PostStatus::parse("PUBLISHED"), Some(PostStatus::Published));
        assert_eq!(PostStatus::parse("deleted"), None);
        assert_eq!(PostStatus::default(), PostStatus::Draft);
    }

    #[test]
    fn test_post_status_serde() {
        let json = serde_json::to_string(&PostStatus::Archived).unwrap();
        assert_eq!(json, "\"archived\"");
    }

    #[test]
    fn test_list_params_clamping() {
        let params = ListParams::new(0, 500);
        assert_eq!(params.page, 1);
        assert_eq!(params.per_page, 100);

        let params = ListParams::new(3, 10);
        assert_eq!(params.offset(), 20);
        assert_eq!(params.limit(), 10);
    }

    #[test]
    fn test_paged_result_total_pages() {
        let params = ListParams::new(2, 10);
        let result = PagedResult::new(vec![1, 2, 3], 23, &params);
        assert_eq!(result.total_pages, 3);
        assert_eq!(result.page, 2);
        assert_eq!(result.items.len(), 3);

        let empty: PagedResult<i32> = PagedResult::new(vec![], 0, &ListParams::default());
        assert_eq!(empty.total_pages, 0);
        assert!(empty.items.is_empty());

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["total_pages"], 3);
    }

    #[test]
    fn test_update_input_has_changes() {
        assert!(!UpdatePostInput::new().has_changes());
        assert!(!UpdatePostInput::new().with_tags(&["a"]).has_changes());
        assert!(UpdatePostInput::new().with_title("New").has_changes());
    }

    #[test]
    fn test_create_input_deserializes_with_defaults() {
        let input: CreatePostInput =
            serde_json::from_str(r#"{"title":"Hi","content":"Body","author_id":1}"#).unwrap();
        assert!(input.slug.is_none());
        assert!(input.tags.is_empty());
        assert!(!input.is_featured);
    }
}
