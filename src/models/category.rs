//! Category model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category entity. Categories nest through `parent_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// URL-friendly slug, unique across categories
    pub slug: String,
    pub description: Option<String>,
    /// Parent category ID (None for top-level)
    pub parent_id: Option<i64>,
    /// Sort order within parent
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
}

/// Category with its children for tree representation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTree {
    #[serde(flatten)]
    pub category: Category,
    pub children: Vec<CategoryTree>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryInput {
    pub name: String,
    /// Derived from the name when absent
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub sort_order: Option<i32>,
}

impl CreateCategoryInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: None,
            description: None,
            parent_id: None,
            sort_order: None,
        }
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Input for updating a category. `Some(None)` clears a nullable field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateCategoryInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<Option<String>>,
    pub parent_id: Option<Option<i64>>,
    pub sort_order: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn category(id: i64, slug: &str, parent_id: Option<i64>) -> Category {
        Category {
            id,
            name: slug.to_string(),
            slug: slug.to_string(),
            description: None,
            parent_id,
            sort_order: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_tree_serializes_flat_fields() {
        let tree = CategoryTree {
            category: category(1, "tech", None),
            children: vec![CategoryTree {
                category: category(2, "rust", Some(1)),
                children: Vec::new(),
            }],
        };
        let json = serde_json::to_value(&tree).unwrap();
        assert_eq!(json["slug"], "tech");
        assert_eq!(json["parent_id"], Value::Null);
        assert_eq!(json["children"][0]["slug"], "rust");
        assert_eq!(json["children"][0]["parent_id"], 1);
    }
}
