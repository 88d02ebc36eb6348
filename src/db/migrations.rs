//! Database migrations
//!
//! Migrations are embedded as SQL strings with one variant per engine, so the
//! same binary can bootstrap either a MySQL server database or an edge SQLite
//! file. Applied versions are recorded in `_migrations`.
//!
//! ```ignore
//! let db = Database::connect(config.runtime, &config.database).await?;
//! migrations::run_migrations(&db).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use super::adapter::Database;
use super::dialect::Dialect;
use crate::params;

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    pub name: &'static str,
    pub up_sqlite: &'static str,
    pub up_mysql: &'static str,
}

impl Migration {
    fn sql_for(&self, dialect: Dialect) -> &'static str {
        match dialect {
            Dialect::Sqlite => self.up_sqlite,
            Dialect::Mysql => self.up_mysql,
        }
    }
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                display_name VARCHAR(100),
                role VARCHAR(20) NOT NULL DEFAULT 'author',
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_is_active ON users(is_active);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                username VARCHAR(50) NOT NULL UNIQUE,
                email VARCHAR(255) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                display_name VARCHAR(100),
                role VARCHAR(20) NOT NULL DEFAULT 'author',
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_users_is_active (is_active)
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
    Migration {
        version: 2,
        name: "create_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                slug VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                parent_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
                sort_order INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_categories_parent_id ON categories(parent_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL,
                slug VARCHAR(100) NOT NULL UNIQUE,
                description TEXT,
                parent_id BIGINT,
                sort_order INT NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_categories_parent_id (parent_id),
                FOREIGN KEY (parent_id) REFERENCES categories(id) ON DELETE SET NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
    Migration {
        version: 3,
        name: "create_tags",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                slug VARCHAR(50) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS tags (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(50) NOT NULL UNIQUE,
                slug VARCHAR(50) NOT NULL UNIQUE,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
    Migration {
        version: 4,
        name: "create_posts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL UNIQUE,
                excerpt TEXT,
                content TEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                is_featured BOOLEAN NOT NULL DEFAULT 0,
                author_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                category_id INTEGER REFERENCES categories(id) ON DELETE SET NULL,
                view_count INTEGER NOT NULL DEFAULT 0,
                published_at TIMESTAMP,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_posts_status ON posts(status);
            CREATE INDEX IF NOT EXISTS idx_posts_author_id ON posts(author_id);
            CREATE INDEX IF NOT EXISTS idx_posts_category_id ON posts(category_id);
            CREATE INDEX IF NOT EXISTS idx_posts_published_at ON posts(published_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS posts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                slug VARCHAR(255) NOT NULL UNIQUE,
                excerpt TEXT,
                content MEDIUMTEXT NOT NULL,
                status VARCHAR(20) NOT NULL DEFAULT 'draft',
                is_featured BOOLEAN NOT NULL DEFAULT FALSE,
                author_id BIGINT NOT NULL,
                category_id BIGINT,
                view_count BIGINT NOT NULL DEFAULT 0,
                published_at DATETIME NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
                INDEX idx_posts_status (status),
                INDEX idx_posts_author_id (author_id),
                INDEX idx_posts_category_id (category_id),
                INDEX idx_posts_published_at (published_at),
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
    Migration {
        version: 5,
        name: "create_post_tags",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS post_tags (
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                PRIMARY KEY (post_id, tag_id)
            );
            CREATE INDEX IF NOT EXISTS idx_post_tags_tag_id ON post_tags(tag_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS post_tags (
                post_id BIGINT NOT NULL,
                tag_id BIGINT NOT NULL,
                PRIMARY KEY (post_id, tag_id),
                INDEX idx_post_tags_tag_id (tag_id),
                FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
    Migration {
        version: 6,
        name: "create_settings",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS settings (
                "key" VARCHAR(100) PRIMARY KEY,
                "value" TEXT NOT NULL,
                "type" VARCHAR(20) NOT NULL DEFAULT 'string',
                description TEXT,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS settings (
                `key` VARCHAR(100) PRIMARY KEY,
                `value` TEXT NOT NULL,
                `type` VARCHAR(20) NOT NULL DEFAULT 'string',
                description TEXT,
                updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci;
        "#,
    },
    Migration {
        version: 7,
        name: "seed_defaults",
        up_sqlite: r#"
            INSERT OR IGNORE INTO categories (name, slug, description, sort_order)
                VALUES ('Uncategorized', 'uncategorized', 'Posts without a category', 0);
            INSERT OR IGNORE INTO settings ("key", "value", "type", description) VALUES
                ('site_name', 'Inkpost', 'string', 'Site title'),
                ('site_description', 'Another Inkpost blog', 'string', 'Site tagline'),
                ('posts_per_page', '10', 'number', 'Posts listed per page'),
                ('social_links', '{}', 'json', 'Social profile links');
        "#,
        up_mysql: r#"
            INSERT IGNORE INTO categories (name, slug, description, sort_order)
                VALUES ('Uncategorized', 'uncategorized', 'Posts without a category', 0);
            INSERT IGNORE INTO settings (`key`, `value`, `type`, description) VALUES
                ('site_name', 'Inkpost', 'string', 'Site title'),
                ('site_description', 'Another Inkpost blog', 'string', 'Site tagline'),
                ('posts_per_page', '10', 'number', 'Posts listed per page'),
                ('social_links', '{}', 'json', 'Social profile links');
        "#,
    },
];

/// Run all pending migrations.
///
/// Returns the number of migrations applied; zero when already up to date.
pub async fn run_migrations(db: &Database) -> Result<usize> {
    create_migrations_table(db).await?;

    let applied = get_applied_migrations(db).await?;
    let applied_versions: Vec<i64> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&(migration.version as i64)) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(db, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(db: &Database) -> Result<()> {
    let sql = match db.dialect() {
        Dialect::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL
            )
            "#
        }
        Dialect::Mysql => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at DATETIME NOT NULL
            )
            "#
        }
    };

    db.execute_raw(sql)
        .await
        .context("Failed to create migrations table")?;
    Ok(())
}

/// List migrations already recorded, oldest first
pub async fn get_applied_migrations(db: &Database) -> Result<Vec<MigrationRecord>> {
    let rows = db
        .query(
            "SELECT version, name, applied_at FROM _migrations ORDER BY version",
            params![],
        )
        .await
        .context("Failed to read applied migrations")?;

    rows.iter()
        .map(|row| -> Result<MigrationRecord> {
            Ok(MigrationRecord {
                version: row.get_i64("version")?,
                name: row.get_string("name")?,
                applied_at: row.get_datetime("applied_at")?,
            })
        })
        .collect()
}

async fn apply_migration(db: &Database, migration: &Migration) -> Result<()> {
    for statement in statements(migration.sql_for(db.dialect())) {
        db.execute_raw(statement)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    db.execute(
        "INSERT INTO _migrations (version, name, applied_at) VALUES (?, ?, ?)",
        params![migration.version, migration.name, Utc::now()],
    )
    .await?;

    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    if sql.chars().count() > 100 {
        let head: String = sql.chars().take(100).collect();
        format!("{}...", head)
    } else {
        sql.to_string()
    }
}

/// Statements of a migration script. Fragments holding only `--` comments
/// are skipped. Migration SQL keeps `;` out of string literals.
fn statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';').map(str::trim).filter(|fragment| {
        fragment
            .lines()
            .map(str::trim)
            .any(|line| !line.is_empty() && !line.starts_with("--"))
    })
}

/// Number of embedded migrations not yet recorded in `_migrations`
pub async fn pending_count(db: &Database) -> Result<usize> {
    create_migrations_table(db).await?;
    let applied: Vec<i64> = get_applied_migrations(db)
        .await?
        .iter()
        .map(|m| m.version)
        .collect();
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&(m.version as i64)))
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DatabaseError;

    async fn migrated_db() -> Database {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");
        run_migrations(&db).await.expect("Failed to run migrations");
        db
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");

        let count = run_migrations(&db).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&db).await.expect("Failed to run migrations");
        assert_eq!(count, 0);

        let applied = get_applied_migrations(&db).await.unwrap();
        assert_eq!(applied.len(), MIGRATIONS.len());
        assert_eq!(applied[0].name, "create_users");
    }

    #[tokio::test]
    async fn test_pending_count() {
        let db = Database::in_memory()
            .await
            .expect("Failed to create test database");

        assert_eq!(pending_count(&db).await.unwrap(), MIGRATIONS.len());
        run_migrations(&db).await.unwrap();
        assert_eq!(pending_count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_seeds_defaults() {
        let db = migrated_db().await;

        let row = db
            .query_one(
                "SELECT id, name FROM categories WHERE slug = ?",
                params!["uncategorized"],
            )
            .await
            .unwrap()
            .expect("uncategorized category should be seeded");
        assert_eq!(row.get_string("name").unwrap(), "Uncategorized");

        let rows = db
            .query("SELECT \"key\" FROM settings ORDER BY \"key\"", params![])
            .await
            .unwrap();
        let keys: Vec<String> = rows.iter().map(|r| r.get_string("key").unwrap()).collect();
        assert!(keys.contains(&"site_name".to_string()));
        assert!(keys.contains(&"social_links".to_string()));
        assert_eq!(keys.len(), 4);
    }

    #[tokio::test]
    async fn test_unique_constraints() {
        let db = migrated_db().await;
        let now = Utc::now();
        db.insert(
            "INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)",
            params!["Rust", "rust", now],
        )
        .await
        .unwrap();

        let err = db
            .insert(
                "INSERT INTO tags (name, slug, created_at) VALUES (?, ?, ?)",
                params!["Rust 2", "rust", now],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn test_category_parent_set_null_on_delete() {
        let db = migrated_db().await;
        let parent = db
            .insert(
                "INSERT INTO categories (name, slug) VALUES (?, ?)",
                params!["Parent", "parent"],
            )
            .await
            .unwrap();
        let child = db
            .insert(
                "INSERT INTO categories (name, slug, parent_id) VALUES (?, ?, ?)",
                params!["Child", "child", parent],
            )
            .await
            .unwrap();

        db.delete("DELETE FROM categories WHERE id = ?", params![parent])
            .await
            .unwrap();

        let row = db
            .query_one("SELECT parent_id FROM categories WHERE id = ?", params![child])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.get_opt_i64("parent_id").unwrap(), None);
    }

    #[test]
    fn test_every_migration_has_both_dialects() {
        for migration in MIGRATIONS {
            assert!(statements(migration.up_sqlite).next().is_some());
            assert!(statements(migration.up_mysql).next().is_some());
        }
    }

    #[test]
    fn test_statements_skip_comment_fragments() {
        let sql = "CREATE TABLE a (id INT); CREATE TABLE b (id INT);";
        assert_eq!(
            statements(sql).collect::<Vec<_>>(),
            ["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]
        );

        let sql = "-- users\nCREATE TABLE a (id INT);\n-- trailing note\n";
        assert_eq!(statements(sql).count(), 1);

        assert_eq!(statements("-- only a comment;  ;").count(), 0);
    }
}
