//! Slug generation shared by posts, categories and tags
//!
//! `slugify` normalises free text. `unique_slug` probes `base`, `base-1`,
//! `base-2`, ... against a table. Probing alone races with concurrent
//! creators, so inserts go through `insert_with_unique_slug`, which leans on
//! the table's unique index and retries with the next free candidate.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use super::RepoResult;
use crate::db::{Database, DbResult, SqlValue};
use crate::params;

/// Retries after a unique-constraint collision before giving up
const MAX_SLUG_ATTEMPTS: usize = 5;

static INVALID_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9\s-]").expect("static slug regex"));
static SEPARATORS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\s_-]+").expect("static slug regex"));

/// Tables with a unique `slug` column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlugTable {
    Posts,
    Categories,
    Tags,
}

impl SlugTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            SlugTable::Posts => "posts",
            SlugTable::Categories => "categories",
            SlugTable::Tags => "tags",
        }
    }
}

/// Lower-case, drop anything outside `[a-z0-9\s-]`, join words with single
/// hyphens and trim hyphens from both ends. May return an empty string.
pub fn slugify(input: &str) -> String {
    let lowered = input.to_lowercase();
    let stripped = INVALID_CHARS.replace_all(&lowered, "");
    let joined = SEPARATORS.replace_all(stripped.trim(), "-");
    joined.trim_matches('-').to_string()
}

/// [`slugify`], falling back when nothing usable is left
pub fn slugify_or(input: &str, fallback: &str) -> String {
    let slug = slugify(input);
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// Slugs in `table` equal to `base` or shaped like `base-N`
async fn taken_slugs(
    db: &Database,
    table: SlugTable,
    base: &str,
    exclude_id: Option<i64>,
) -> DbResult<HashSet<String>> {
    let sql = format!(
        "SELECT slug FROM {} WHERE (slug = ? OR slug LIKE ?) AND id <> ?",
        table.table_name()
    );
    let rows = db
        .query(
            &sql,
            params![base, format!("{}-%", base), exclude_id.unwrap_or(0)],
        )
        .await?;
    rows.iter().map(|row| row.get_string("slug")).collect()
}

fn first_free(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_string();
    }
    (1u64..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// First unused candidate among `base`, `base-1`, `base-2`, ...
pub async fn unique_slug(db: &Database, table: SlugTable, base: &str) -> DbResult<String> {
    unique_slug_excluding(db, table, base, None).await
}

/// Like [`unique_slug`] but ignores the row being renamed
pub async fn unique_slug_excluding(
    db: &Database,
    table: SlugTable,
    base: &str,
    exclude_id: Option<i64>,
) -> DbResult<String> {
    let taken = taken_slugs(db, table, base, exclude_id).await?;
    Ok(first_free(base, &taken))
}

async fn slug_exists(db: &Database, table: SlugTable, slug: &str) -> DbResult<bool> {
    let sql = format!("SELECT 1 AS hit FROM {} WHERE slug = ?", table.table_name());
    Ok(db.query_one(&sql, params![slug]).await?.is_some())
}

/// Insert a row whose slug must be unique.
///
/// `build` receives the candidate slug and returns the bind values for
/// `sql`. On a unique violation caused by the slug the next candidate is
/// tried; a violation on any other column is returned as is.
pub async fn insert_with_unique_slug<F>(
    db: &Database,
    table: SlugTable,
    base: &str,
    sql: &str,
    build: F,
) -> RepoResult<(i64, String)>
where
    F: Fn(&str) -> Vec<SqlValue>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        let candidate = unique_slug(db, table, base).await?;
        match db.insert(sql, build(&candidate)).await {
            Ok(id) => return Ok((id, candidate)),
            Err(e) if e.is_unique_violation() && attempt < MAX_SLUG_ATTEMPTS => {
                if !slug_exists(db, table, &candidate).await? {
                    return Err(e.into());
                }
                tracing::debug!(
                    "Slug '{}' in {} taken concurrently, retrying",
                    candidate,
                    table.table_name()
                );
            }
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;
    use crate::db::repositories::RepoError;
    use crate::db::DatabaseError;
    use chrono::Utc;

    #[test]
    fn test_slugify_basics() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("  Rust & Axum: A Tour!  "), "rust-axum-a-tour");
        assert_eq!(slugify("multiple   spaces -- and---hyphens"), "multiple-spaces-and-hyphens");
        assert_eq!(slugify("-leading and trailing-"), "leading-and-trailing");
        assert_eq!(slugify("Tabs\tand\nnewlines"), "tabs-and-newlines");
    }

    #[test]
    fn test_slugify_strips_underscores_and_non_ascii() {
        assert_eq!(slugify("snake_case_title"), "snakecasetitle");
        assert_eq!(slugify("Café déjà vu"), "caf-dj-vu");
        assert_eq!(slugify("日本語"), "");
    }

    #[test]
    fn test_slugify_or_fallback() {
        assert_eq!(slugify_or("!!!", "untitled"), "untitled");
        assert_eq!(slugify_or("Post", "untitled"), "post");
    }

    #[test]
    fn test_first_free() {
        let taken: HashSet<String> = ["foo", "foo-1", "foo-2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(first_free("foo", &taken), "foo-3");
        assert_eq!(first_free("bar", &taken), "bar");
    }

    async fn insert_tag(db: &Database, slug: &str) {
        db.insert(
            "INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)",
            params![slug, slug, Utc::now()],
        )
        .await
        .expect("Failed to insert tag");
    }

    #[tokio::test]
    async fn test_unique_slug_probes_sequentially() {
        let db = create_test_db().await.expect("Failed to create test db");
        for slug in ["foo", "foo-1", "foo-2", "foobar"] {
            insert_tag(&db, slug).await;
        }

        assert_eq!(unique_slug(&db, SlugTable::Tags, "foo").await.unwrap(), "foo-3");
        assert_eq!(unique_slug(&db, SlugTable::Tags, "bar").await.unwrap(), "bar");
        assert_eq!(
            unique_slug(&db, SlugTable::Tags, "foobar").await.unwrap(),
            "foobar-1"
        );
    }

    #[tokio::test]
    async fn test_unique_slug_excluding_own_row() {
        let db = create_test_db().await.expect("Failed to create test db");
        insert_tag(&db, "solo").await;
        let row = db
            .query_one("SELECT id FROM tags WHERE slug = ?", params!["solo"])
            .await
            .unwrap()
            .unwrap();
        let id = row.get_i64("id").unwrap();

        assert_eq!(
            unique_slug_excluding(&db, SlugTable::Tags, "solo", Some(id))
                .await
                .unwrap(),
            "solo"
        );
    }

    #[tokio::test]
    async fn test_insert_with_unique_slug() {
        let db = create_test_db().await.expect("Failed to create test db");
        insert_tag(&db, "news").await;

        let sql = "INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)";
        let (id, slug) = insert_with_unique_slug(&db, SlugTable::Tags, "news", sql, |slug| {
            params!["News again", slug, Utc::now()]
        })
        .await
        .unwrap();
        assert!(id > 0);
        assert_eq!(slug, "news-1");
    }

    #[tokio::test]
    async fn test_insert_with_unique_slug_reports_other_violations() {
        let db = create_test_db().await.expect("Failed to create test db");
        insert_tag(&db, "dup").await;

        // Same name, fresh slug: the name index rejects it
        let sql = "INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)";
        let err = insert_with_unique_slug(&db, SlugTable::Tags, "other", sql, |slug| {
            params!["dup", slug, Utc::now()]
        })
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            RepoError::Database(DatabaseError::UniqueViolation(_))
        ));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn slug_only_contains_allowed_characters(input in "\\PC{0,64}") {
            let slug = slugify(&input);
            prop_assert!(slug.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
            prop_assert!(!slug.starts_with('-'));
            prop_assert!(!slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
        }

        #[test]
        fn slugify_is_idempotent(input in "\\PC{0,64}") {
            let once = slugify(&input);
            prop_assert_eq!(slugify(&once), once.clone());
        }
    }
}
