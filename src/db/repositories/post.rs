//! Post repository
//!
//! Tags are stored in `post_tags` and replaced wholesale on every write that
//! carries a tag list.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;

use super::slug::{insert_with_unique_slug, slugify_or, unique_slug_excluding, SlugTable};
use super::tag::{tag_from_row, SqlTagRepository, TagRepository};
use super::{RepoError, RepoResult};
use crate::db::{Database, DatabaseError, DbResult, Row, SqlValue};
use crate::models::{
    CreatePostInput, ListParams, PagedResult, Post, PostFilter, PostStatus, Tag, UpdatePostInput,
};
use crate::params;

const POST_COLUMNS: &str = "id, title, slug, excerpt, content, status, is_featured, author_id, \
                            category_id, view_count, published_at, created_at, updated_at";

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, input: &CreatePostInput) -> RepoResult<Post>;

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<Post>>;

    async fn get_by_slug(&self, slug: &str) -> RepoResult<Option<Post>>;

    /// Newest first, paged
    async fn list(&self, filter: &PostFilter, params: &ListParams) -> RepoResult<PagedResult<Post>>;

    async fn count(&self, filter: &PostFilter) -> RepoResult<i64>;

    /// Returns `None` when the post does not exist
    async fn update(&self, id: i64, input: &UpdatePostInput) -> RepoResult<Option<Post>>;

    async fn delete(&self, id: i64) -> RepoResult<bool>;

    /// Mark a post published, stamping `published_at` the first time
    async fn publish(&self, id: i64) -> RepoResult<Option<Post>>;

    async fn increment_views(&self, id: i64) -> RepoResult<bool>;

    /// Replace the post's tags with `names`, creating missing tags
    async fn set_tags(&self, post_id: i64, names: &[String]) -> RepoResult<Vec<Tag>>;

    async fn tags_for(&self, post_id: i64) -> RepoResult<Vec<Tag>>;
}

pub struct SqlPostRepository {
    db: Database,
    tags: SqlTagRepository,
}

impl SqlPostRepository {
    pub fn new(db: Database) -> Self {
        let tags = SqlTagRepository::new(db.clone());
        Self { db, tags }
    }

    pub fn boxed(db: Database) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(db))
    }
}

fn post_from_row(row: &Row) -> DbResult<Post> {
    let status = row.get_string("status")?;
    Ok(Post {
        id: row.get_i64("id")?,
        title: row.get_string("title")?,
        slug: row.get_string("slug")?,
        excerpt: row.get_opt_string("excerpt")?,
        content: row.get_string("content")?,
        status: PostStatus::parse(&status).unwrap_or_default(),
        is_featured: row.get_bool("is_featured")?,
        author_id: row.get_i64("author_id")?,
        category_id: row.get_opt_i64("category_id")?,
        view_count: row.get_i64("view_count")?,
        published_at: row.get_opt_datetime("published_at")?,
        created_at: row.get_datetime("created_at")?,
        updated_at: row.get_datetime("updated_at")?,
    })
}

/// `WHERE` clause and binds for a filter
fn filter_clause(filter: &PostFilter) -> (String, Vec<SqlValue>) {
    let mut conditions = Vec::new();
    let mut binds = Vec::new();

    if let Some(status) = filter.status {
        conditions.push("p.status = ?");
        binds.push(SqlValue::from(status.as_str()));
    }
    if let Some(category_id) = filter.category_id {
        conditions.push("p.category_id = ?");
        binds.push(SqlValue::from(category_id));
    }
    if let Some(author_id) = filter.author_id {
        conditions.push("p.author_id = ?");
        binds.push(SqlValue::from(author_id));
    }
    if let Some(featured) = filter.featured {
        conditions.push("p.is_featured = ?");
        binds.push(SqlValue::from(featured));
    }
    if let Some(tag) = &filter.tag {
        conditions.push(
            "EXISTS (SELECT 1 FROM post_tags pt JOIN tags t ON t.id = pt.tag_id \
             WHERE pt.post_id = p.id AND t.slug = ?)",
        );
        binds.push(SqlValue::from(tag.as_str()));
    }

    if conditions.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), binds)
    }
}

/// Trimmed, de-duplicated (case-insensitive) tag names
fn normalize_tag_names(names: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .filter(|n| seen.insert(n.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl PostRepository for SqlPostRepository {
    async fn create(&self, input: &CreatePostInput) -> RepoResult<Post> {
        if input.title.trim().is_empty() {
            return Err(RepoError::Invalid("post title is required".to_string()));
        }

        let now = Utc::now();
        let status = input.status.unwrap_or_default();
        let published_at = (status == PostStatus::Published).then_some(now);
        let base = slugify_or(input.slug.as_deref().unwrap_or(&input.title), "untitled");

        let sql = "INSERT INTO posts (title, slug, excerpt, content, status, is_featured, author_id, \
                   category_id, view_count, published_at, created_at, updated_at) \
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
        let (id, slug) = insert_with_unique_slug(&self.db, SlugTable::Posts, &base, sql, |slug| {
            params![
                input.title.trim(),
                slug,
                input.excerpt.clone(),
                input.content.as_str(),
                status.as_str(),
                input.is_featured,
                input.author_id,
                input.category_id,
                0i64,
                published_at,
                now,
                now
            ]
        })
        .await?;

        if !input.tags.is_empty() {
            self.set_tags(id, &input.tags).await?;
        }

        tracing::info!("Created post {} ({})", id, slug);
        self.get_by_id(id)
            .await?
            .ok_or(RepoError::Database(DatabaseError::WriteFailed { operation: "insert" }))
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE id = ?", POST_COLUMNS);
        let row = self.db.query_one(&sql, params![id]).await?;
        Ok(row.as_ref().map(post_from_row).transpose()?)
    }

    async fn get_by_slug(&self, slug: &str) -> RepoResult<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE slug = ?", POST_COLUMNS);
        let row = self.db.query_one(&sql, params![slug]).await?;
        Ok(row.as_ref().map(post_from_row).transpose()?)
    }

    async fn list(&self, filter: &PostFilter, params: &ListParams) -> RepoResult<PagedResult<Post>> {
        let total = self.count(filter).await?;

        let (where_clause, mut binds) = filter_clause(filter);
        let sql = format!(
            "SELECT {} FROM posts p{} \
             ORDER BY COALESCE(p.published_at, p.created_at) DESC, p.id DESC \
             LIMIT ? OFFSET ?",
            POST_COLUMNS, where_clause
        );
        binds.push(SqlValue::from(params.limit()));
        binds.push(SqlValue::from(params.offset()));

        let rows = self.db.query(&sql, binds).await?;
        let items = rows.iter().map(post_from_row).collect::<DbResult<Vec<_>>>()?;
        Ok(PagedResult::new(items, total, params))
    }

    async fn count(&self, filter: &PostFilter) -> RepoResult<i64> {
        let (where_clause, binds) = filter_clause(filter);
        let sql = format!("SELECT COUNT(*) AS total FROM posts p{}", where_clause);
        Ok(match self.db.query_one(&sql, binds).await? {
            Some(row) => row.get_i64("total")?,
            None => 0,
        })
    }

    async fn update(&self, id: i64, input: &UpdatePostInput) -> RepoResult<Option<Post>> {
        let Some(mut post) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        if input.has_changes() {
            if let Some(title) = &input.title {
                if title.trim().is_empty() {
                    return Err(RepoError::Invalid("post title is required".to_string()));
                }
                post.title = title.trim().to_string();
            }
            if let Some(slug) = &input.slug {
                let base = slugify_or(slug, "untitled");
                post.slug = unique_slug_excluding(&self.db, SlugTable::Posts, &base, Some(id)).await?;
            }
            if let Some(excerpt) = &input.excerpt {
                post.excerpt = excerpt.clone();
            }
            if let Some(content) = &input.content {
                post.content = content.clone();
            }
            if let Some(status) = input.status {
                post.status = status;
                if status == PostStatus::Published && post.published_at.is_none() {
                    post.published_at = Some(Utc::now());
                }
            }
            if let Some(featured) = input.is_featured {
                post.is_featured = featured;
            }
            if let Some(category_id) = input.category_id {
                post.category_id = category_id;
            }
            post.updated_at = Utc::now();

            self.db
                .update(
                    "UPDATE posts SET title = ?, slug = ?, excerpt = ?, content = ?, status = ?, \
                     is_featured = ?, category_id = ?, published_at = ?, updated_at = ? WHERE id = ?",
                    params![
                        post.title.as_str(),
                        post.slug.as_str(),
                        post.excerpt.clone(),
                        post.content.as_str(),
                        post.status.as_str(),
                        post.is_featured,
                        post.category_id,
                        post.published_at,
                        post.updated_at,
                        id
                    ],
                )
                .await?;
        }

        if let Some(tags) = &input.tags {
            self.set_tags(id, tags).await?;
        }

        Ok(Some(post))
    }

    async fn delete(&self, id: i64) -> RepoResult<bool> {
        self.db
            .delete("DELETE FROM post_tags WHERE post_id = ?", params![id])
            .await?;
        let removed = self
            .db
            .delete("DELETE FROM posts WHERE id = ?", params![id])
            .await?;
        if removed > 0 {
            tracing::info!("Deleted post {}", id);
        }
        Ok(removed > 0)
    }

    async fn publish(&self, id: i64) -> RepoResult<Option<Post>> {
        self.update(id, &UpdatePostInput::new().with_status(PostStatus::Published))
            .await
    }

    async fn increment_views(&self, id: i64) -> RepoResult<bool> {
        let affected = self
            .db
            .update(
                "UPDATE posts SET view_count = view_count + 1 WHERE id = ?",
                params![id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn set_tags(&self, post_id: i64, names: &[String]) -> RepoResult<Vec<Tag>> {
        let mut tags = Vec::new();
        for name in normalize_tag_names(names) {
            tags.push(self.tags.get_or_create(&name).await?);
        }

        self.db
            .delete("DELETE FROM post_tags WHERE post_id = ?", params![post_id])
            .await?;

        let sql = format!(
            "{} INTO post_tags (post_id, tag_id) VALUES (?, ?)",
            self.db.dialect().insert_ignore()
        );
        for tag in &tags {
            self.db.execute(&sql, params![post_id, tag.id]).await?;
        }

        tracing::debug!("Post {} now has {} tag(s)", post_id, tags.len());
        Ok(tags)
    }

    async fn tags_for(&self, post_id: i64) -> RepoResult<Vec<Tag>> {
        let rows = self
            .db
            .query(
                "SELECT t.id, t.name, t.slug, t.created_at FROM tags t \
                 JOIN post_tags pt ON pt.tag_id = t.id \
                 WHERE pt.post_id = ? ORDER BY t.name",
                params![post_id],
            )
            .await?;
        Ok(rows.iter().map(tag_from_row).collect::<DbResult<_>>()?)
    }
}
