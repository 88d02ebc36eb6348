//! Tag repository

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::slug::{insert_with_unique_slug, slugify_or, SlugTable};
use super::{RepoError, RepoResult};
use crate::db::{Database, DatabaseError, DbResult, Row};
use crate::models::{Tag, TagWithCount};
use crate::params;

#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, name: &str) -> RepoResult<Tag>;

    /// Find a tag by name (case-insensitive) or create it
    async fn get_or_create(&self, name: &str) -> RepoResult<Tag>;

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<Tag>>;

    async fn get_by_slug(&self, slug: &str) -> RepoResult<Option<Tag>>;

    async fn list(&self) -> RepoResult<Vec<Tag>>;

    /// Tags with the number of published posts carrying them, busiest first
    async fn list_with_counts(&self) -> RepoResult<Vec<TagWithCount>>;

    /// Remove the tag and its post associations
    async fn delete(&self, id: i64) -> RepoResult<bool>;
}

pub struct SqlTagRepository {
    db: Database,
}

impl SqlTagRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn boxed(db: Database) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(db))
    }

    async fn get_by_name(&self, name: &str) -> RepoResult<Option<Tag>> {
        let row = self
            .db
            .query_one(
                "SELECT id, name, slug, created_at FROM tags WHERE LOWER(name) = LOWER(?)",
                params![name],
            )
            .await?;
        Ok(row.as_ref().map(tag_from_row).transpose()?)
    }
}

pub(crate) fn tag_from_row(row: &Row) -> DbResult<Tag> {
    Ok(Tag {
        id: row.get_i64("id")?,
        name: row.get_string("name")?,
        slug: row.get_string("slug")?,
        created_at: row.get_datetime("created_at")?,
    })
}

#[async_trait]
impl TagRepository for SqlTagRepository {
    async fn create(&self, name: &str) -> RepoResult<Tag> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RepoError::Invalid("tag name is required".to_string()));
        }

        let now = Utc::now();
        let base = slugify_or(name, "tag");
        let (id, slug) = insert_with_unique_slug(
            &self.db,
            SlugTable::Tags,
            &base,
            "INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)",
            |slug| params![name, slug, now],
        )
        .await?;

        tracing::debug!("Created tag {} ({})", id, slug);
        Ok(Tag {
            id,
            name: name.to_string(),
            slug,
            created_at: now,
        })
    }

    async fn get_or_create(&self, name: &str) -> RepoResult<Tag> {
        if let Some(tag) = self.get_by_name(name.trim()).await? {
            return Ok(tag);
        }
        match self.create(name).await {
            Ok(tag) => Ok(tag),
            // Someone else created it between the lookup and the insert
            Err(e) if e.is_unique_violation() => self
                .get_by_name(name.trim())
                .await?
                .ok_or(e),
            Err(e) => Err(e),
        }
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<Tag>> {
        let row = self
            .db
            .query_one(
                "SELECT id, name, slug, created_at FROM tags WHERE id = ?",
                params![id],
            )
            .await?;
        Ok(row.as_ref().map(tag_from_row).transpose()?)
    }

    async fn get_by_slug(&self, slug: &str) -> RepoResult<Option<Tag>> {
        let row = self
            .db
            .query_one(
                "SELECT id, name, slug, created_at FROM tags WHERE slug = ?",
                params![slug],
            )
            .await?;
        Ok(row.as_ref().map(tag_from_row).transpose()?)
    }

    async fn list(&self) -> RepoResult<Vec<Tag>> {
        let rows = self
            .db
            .query("SELECT id, name, slug, created_at FROM tags ORDER BY name", params![])
            .await?;
        Ok(rows.iter().map(tag_from_row).collect::<DbResult<_>>()?)
    }

    async fn list_with_counts(&self) -> RepoResult<Vec<TagWithCount>> {
        let rows = self
            .db
            .query(
                "SELECT t.id, t.name, t.slug, t.created_at, COUNT(p.id) AS post_count \
                 FROM tags t \
                 LEFT JOIN post_tags pt ON pt.tag_id = t.id \
                 LEFT JOIN posts p ON p.id = pt.post_id AND p.status = ? \
                 GROUP BY t.id, t.name, t.slug, t.created_at \
                 ORDER BY post_count DESC, t.name",
                params!["published"],
            )
            .await?;
        rows.iter()
            .map(|row| Ok(TagWithCount::new(tag_from_row(row)?, row.get_i64("post_count")?)))
            .collect::<Result<_, DatabaseError>>()
            .map_err(RepoError::from)
    }

    async fn delete(&self, id: i64) -> RepoResult<bool> {
        self.db
            .delete("DELETE FROM post_tags WHERE tag_id = ?", params![id])
            .await?;
        let removed = self
            .db
            .delete("DELETE FROM tags WHERE id = ?", params![id])
            .await?;
        Ok(removed > 0)
    }
}
