//! Tag model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag entity. Tags cut across categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// Tag with post count for tag cloud functionality
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    /// Number of published posts carrying this tag
    pub post_count: i64,
}

impl TagWithCount {
    pub fn new(tag: Tag, post_count: i64) -> Self {
        Self { tag, post_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_with_count_serializes_flat() {
        let tag = Tag {
            id: 3,
            name: "Rust".to_string(),
            slug: "rust".to_string(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(TagWithCount::new(tag, 42)).unwrap();
        assert_eq!(json["slug"], "rust");
        assert_eq!(json["post_count"], 42);
    }
}
