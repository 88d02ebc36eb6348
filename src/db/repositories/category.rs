//! Category repository
//!
//! Deleting a category never deletes other rows: posts lose their category
//! and child categories move to the top level.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

use super::slug::{insert_with_unique_slug, slugify_or, unique_slug_excluding, SlugTable};
use super::{RepoError, RepoResult};
use crate::db::{Database, DbResult, Row};
use crate::models::{Category, CategoryTree, CreateCategoryInput, UpdateCategoryInput};
use crate::params;

const CATEGORY_COLUMNS: &str = "id, name, slug, description, parent_id, sort_order, created_at";

#[async_trait]
pub trait CategoryRepository: Send + Sync {
    async fn create(&self, input: &CreateCategoryInput) -> RepoResult<Category>;

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<Category>>;

    async fn get_by_slug(&self, slug: &str) -> RepoResult<Option<Category>>;

    /// Flat list ordered by sort order then name
    async fn list(&self) -> RepoResult<Vec<Category>>;

    /// All categories nested under their parents
    async fn list_tree(&self) -> RepoResult<Vec<CategoryTree>>;

    /// Direct children of a category
    async fn children(&self, parent_id: i64) -> RepoResult<Vec<Category>>;

    /// Returns `None` when the category does not exist
    async fn update(&self, id: i64, input: &UpdateCategoryInput) -> RepoResult<Option<Category>>;

    /// Disassociate posts and children, then remove the row.
    /// Returns whether a category was deleted.
    async fn delete(&self, id: i64) -> RepoResult<bool>;

    /// Number of posts filed under the category
    async fn post_count(&self, id: i64) -> RepoResult<i64>;
}

pub struct SqlCategoryRepository {
    db: Database,
}

impl SqlCategoryRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(db: Database) -> Arc<dyn CategoryRepository> {
        Arc::new(Self::new(db))
    }

    /// Reject parents that do not exist or would create a cycle
    async fn check_parent(&self, id: Option<i64>, parent_id: i64) -> RepoResult<()> {
        if Some(parent_id) == id {
            return Err(RepoError::Invalid(
                "a category cannot be its own parent".to_string(),
            ));
        }

        let mut cursor = Some(parent_id);
        let mut depth = 0;
        while let Some(current) = cursor {
            let parent = self
                .get_by_id(current)
                .await?
                .ok_or_else(|| RepoError::Invalid(format!("parent category {} not found", current)))?;
            if id.is_some() && parent.parent_id == id {
                return Err(RepoError::Invalid(
                    "a category cannot move under its own descendant".to_string(),
                ));
            }
            cursor = parent.parent_id;
            depth += 1;
            if depth > 64 {
                return Err(RepoError::Invalid("category nesting too deep".to_string()));
            }
        }
        Ok(())
    }
}

pub(crate) fn category_from_row(row: &Row) -> DbResult<Category> {
    Ok(Category {
        id: row.get_i64("id")?,
        name: row.get_string("name")?,
        slug: row.get_string("slug")?,
        description: row.get_opt_string("description")?,
        parent_id: row.get_opt_i64("parent_id")?,
        sort_order: row.get_i64("sort_order")? as i32,
        created_at: row.get_datetime("created_at")?,
    })
}

#[async_trait]
impl CategoryRepository for SqlCategoryRepository {
    async fn create(&self, input: &CreateCategoryInput) -> RepoResult<Category> {
        if input.name.trim().is_empty() {
            return Err(RepoError::Invalid("category name is required".to_string()));
        }
        if let Some(parent_id) = input.parent_id {
            self.check_parent(None, parent_id).await?;
        }

        let base = slugify_or(input.slug.as_deref().unwrap_or(&input.name), "category");
        let now = Utc::now();
        let sql = "INSERT INTO categories (name, slug, description, parent_id, sort_order, created_at) \
                   VALUES (?, ?, ?, ?, ?, ?)";
        let (id, _) = insert_with_unique_slug(&self.db, SlugTable::Categories, &base, sql, |slug| {
            params![
                input.name.trim(),
                slug,
                input.description.clone(),
                input.parent_id,
                input.sort_order.unwrap_or(0),
                now
            ]
        })
        .await?;

        tracing::debug!("Created category {} ({})", id, input.name);
        self.get_by_id(id)
            .await?
            .ok_or(RepoError::Database(crate::db::DatabaseError::WriteFailed {
                operation: "insert",
            }))
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE id = ?", CATEGORY_COLUMNS);
        let row = self.db.query_one(&sql, params![id]).await?;
        Ok(row.as_ref().map(category_from_row).transpose()?)
    }

    async fn get_by_slug(&self, slug: &str) -> RepoResult<Option<Category>> {
        let sql = format!("SELECT {} FROM categories WHERE slug = ?", CATEGORY_COLUMNS);
        let row = self.db.query_one(&sql, params![slug]).await?;
        Ok(row.as_ref().map(category_from_row).transpose()?)
    }

    async fn list(&self) -> RepoResult<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories ORDER BY sort_order, name",
            CATEGORY_COLUMNS
        );
        let rows = self.db.query(&sql, params![]).await?;
        Ok(rows.iter().map(category_from_row).collect::<DbResult<_>>()?)
    }

    async fn list_tree(&self) -> RepoResult<Vec<CategoryTree>> {
        Ok(build_category_tree(self.list().await?))
    }

    async fn children(&self, parent_id: i64) -> RepoResult<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE parent_id = ? ORDER BY sort_order, name",
            CATEGORY_COLUMNS
        );
        let rows = self.db.query(&sql, params![parent_id]).await?;
        Ok(rows.iter().map(category_from_row).collect::<DbResult<_>>()?)
    }

    async fn update(&self, id: i64, input: &UpdateCategoryInput) -> RepoResult<Option<Category>> {
        let Some(mut category) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        if let Some(name) = &input.name {
            if name.trim().is_empty() {
                return Err(RepoError::Invalid("category name is required".to_string()));
            }
            category.name = name.trim().to_string();
        }
        if let Some(slug) = &input.slug {
            let base = slugify_or(slug, "category");
            category.slug =
                unique_slug_excluding(&self.db, SlugTable::Categories, &base, Some(id)).await?;
        }
        if let Some(description) = &input.description {
            category.description = description.clone();
        }
        if let Some(parent_id) = input.parent_id {
            if let Some(parent_id) = parent_id {
                self.check_parent(Some(id), parent_id).await?;
            }
            category.parent_id = parent_id;
        }
        if let Some(sort_order) = input.sort_order {
            category.sort_order = sort_order;
        }

        self.db
            .update(
                "UPDATE categories SET name = ?, slug = ?, description = ?, parent_id = ?, sort_order = ? \
                 WHERE id = ?",
                params![
                    category.name.clone(),
                    category.slug.clone(),
                    category.description.clone(),
                    category.parent_id,
                    category.sort_order,
                    id
                ],
            )
            .await?;

        Ok(Some(category))
    }

    async fn delete(&self, id: i64) -> RepoResult<bool> {
        let detached_posts = self
            .db
            .update(
                "UPDATE posts SET category_id = NULL WHERE category_id = ?",
                params![id],
            )
            .await?;
        let promoted = self
            .db
            .update(
                "UPDATE categories SET parent_id = NULL WHERE parent_id = ?",
                params![id],
            )
            .await?;
        let removed = self
            .db
            .delete("DELETE FROM categories WHERE id = ?", params![id])
            .await?;

        if removed > 0 {
            tracing::info!(
                "Deleted category {} ({} post(s) detached, {} child(ren) promoted)",
                id,
                detached_posts,
                promoted
            );
        }
        Ok(removed > 0)
    }

    async fn post_count(&self, id: i64) -> RepoResult<i64> {
        let row = self
            .db
            .query_one(
                "SELECT COUNT(*) AS total FROM posts WHERE category_id = ?",
                params![id],
            )
            .await?;
        Ok(match row {
            Some(row) => row.get_i64("total")?,
            None => 0,
        })
    }
}

/// Nest categories under their parents, siblings ordered by sort order
fn build_category_tree(categories: Vec<Category>) -> Vec<CategoryTree> {
    let mut children_map: HashMap<Option<i64>, Vec<Category>> = HashMap::new();
    for category in categories {
        children_map
            .entry(category.parent_id)
            .or_default()
            .push(category);
    }
    for siblings in children_map.values_mut() {
        siblings.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
    }

    fn build_subtree(
        parent_id: Option<i64>,
        children_map: &mut HashMap<Option<i64>, Vec<Category>>,
    ) -> Vec<CategoryTree> {
        let Some(siblings) = children_map.remove(&parent_id) else {
            return Vec::new();
        };
        siblings
            .into_iter()
            .map(|category| {
                let children = build_subtree(Some(category.id), children_map);
                CategoryTree { category, children }
            })
            .collect()
    }

    build_subtree(None, &mut children_map)
}
