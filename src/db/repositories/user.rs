//! User repository
//!
//! Passwords are hashed here with the runtime's [`PasswordHasher`]; the
//! plaintext never reaches the database layer.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{RepoError, RepoResult};
use crate::db::{Database, DatabaseError, DbResult, Row, SqlValue};
use crate::models::{CreateUserInput, UpdateProfileInput, User};
use crate::params;
use crate::services::password::PasswordHasher;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, display_name, role, is_active, created_at, updated_at";

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, input: &CreateUserInput) -> RepoResult<User>;

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<User>>;

    async fn get_by_username(&self, username: &str) -> RepoResult<Option<User>>;

    async fn get_by_email(&self, email: &str) -> RepoResult<Option<User>>;

    /// Look up by username first, then by email
    async fn get_by_login(&self, username_or_email: &str) -> RepoResult<Option<User>>;

    async fn list(&self) -> RepoResult<Vec<User>>;

    async fn update_profile(&self, id: i64, input: &UpdateProfileInput) -> RepoResult<Option<User>>;

    /// Verify `current` and store a fresh hash of `new_password`.
    /// Returns false when the user is missing or `current` is wrong.
    async fn change_password(&self, id: i64, current: &str, new_password: &str) -> RepoResult<bool>;

    /// Store an already computed hash
    async fn update_password_hash(&self, id: i64, hash: &str) -> RepoResult<bool>;

    async fn deactivate(&self, id: i64) -> RepoResult<bool>;

    async fn activate(&self, id: i64) -> RepoResult<bool>;

    /// Delete the user together with their posts
    async fn hard_delete(&self, id: i64) -> RepoResult<bool>;

    /// Users whose stored hash is not in this runtime's native format
    async fn count_legacy_hashes(&self) -> RepoResult<i64>;
}

pub struct SqlUserRepository {
    db: Database,
    hasher: PasswordHasher,
}

impl SqlUserRepository {
    pub fn new(db: Database, hasher: PasswordHasher) -> Self {
        Self { db, hasher }
    }

    pub fn boxed(db: Database, hasher: PasswordHasher) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(db, hasher))
    }

    async fn find_one(&self, column: &str, value: &str) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
        let row = self.db.query_one(&sql, params![value]).await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn set_active(&self, id: i64, active: bool) -> RepoResult<bool> {
        let affected = self
            .db
            .update(
                "UPDATE users SET is_active = ?, updated_at = ? WHERE id = ?",
                params![active, Utc::now(), id],
            )
            .await?;
        Ok(affected > 0)
    }
}

fn user_from_row(row: &Row) -> DbResult<User> {
    let role = row.get_string("role")?;
    Ok(User {
        id: row.get_i64("id")?,
        username: row.get_string("username")?,
        email: row.get_string("email")?,
        password_hash: row.get_string("password_hash")?,
        display_name: row.get_opt_string("display_name")?,
        role: role.parse().unwrap_or_default(),
        is_active: row.get_bool("is_active")?,
        created_at: row.get_datetime("created_at")?,
        updated_at: row.get_datetime("updated_at")?,
    })
}

fn validate_create(input: &CreateUserInput) -> RepoResult<()> {
    if input.username.trim().is_empty() {
        return Err(RepoError::Invalid("username cannot be empty".to_string()));
    }
    if input.email.trim().is_empty() {
        return Err(RepoError::Invalid("email cannot be empty".to_string()));
    }
    if !input.email.contains('@') {
        return Err(RepoError::Invalid("invalid email format".to_string()));
    }
    if input.password.is_empty() {
        return Err(RepoError::Invalid("password cannot be empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl UserRepository for SqlUserRepository {
    async fn create(&self, input: &CreateUserInput) -> RepoResult<User> {
        validate_create(input)?;

        let password_hash = self.hasher.hash_async(input.password.clone()).await?;
        let now = Utc::now();
        let role = input.role.unwrap_or_default();

        let id = self
            .db
            .insert(
                "INSERT INTO users (username, email, password_hash, display_name, role, is_active, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    input.username.trim(),
                    input.email.trim(),
                    password_hash.as_str(),
                    input.display_name.clone(),
                    role.as_str(),
                    true,
                    now,
                    now
                ],
            )
            .await?;

        tracing::info!("Created user {} ({}, {})", id, input.username.trim(), role);
        self.get_by_id(id)
            .await?
            .ok_or(RepoError::Database(DatabaseError::WriteFailed { operation: "insert" }))
    }

    async fn get_by_id(&self, id: i64) -> RepoResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = self.db.query_one(&sql, params![id]).await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn get_by_username(&self, username: &str) -> RepoResult<Option<User>> {
        self.find_one("username", username).await
    }

    async fn get_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        self.find_one("email", email).await
    }

    async fn get_by_login(&self, username_or_email: &str) -> RepoResult<Option<User>> {
        if let Some(user) = self.get_by_username(username_or_email).await? {
            return Ok(Some(user));
        }
        self.get_by_email(username_or_email).await
    }

    async fn list(&self) -> RepoResult<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let rows = self.db.query(&sql, params![]).await?;
        Ok(rows.iter().map(user_from_row).collect::<DbResult<_>>()?)
    }

    async fn update_profile(&self, id: i64, input: &UpdateProfileInput) -> RepoResult<Option<User>> {
        let Some(mut user) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        if !input.has_changes() {
            return Ok(Some(user));
        }

        if let Some(email) = &input.email {
            if !email.contains('@') {
                return Err(RepoError::Invalid("invalid email format".to_string()));
            }
            user.email = email.trim().to_string();
        }
        if let Some(display_name) = &input.display_name {
            user.display_name = display_name.clone();
        }
        if let Some(role) = input.role {
            user.role = role;
        }
        user.updated_at = Utc::now();

        self.db
            .update(
                "UPDATE users SET email = ?, display_name = ?, role = ?, updated_at = ? WHERE id = ?",
                params![
                    user.email.as_str(),
                    user.display_name.clone(),
                    user.role.as_str(),
                    user.updated_at,
                    id
                ],
            )
            .await?;
        Ok(Some(user))
    }

    async fn change_password(&self, id: i64, current: &str, new_password: &str) -> RepoResult<bool> {
        if new_password.is_empty() {
            return Err(RepoError::Invalid("password cannot be empty".to_string()));
        }
        let Some(user) = self.get_by_id(id).await? else {
            return Ok(false);
        };
        if !self
            .hasher
            .verify_async(current.to_string(), user.password_hash)
            .await?
        {
            return Ok(false);
        }

        let hash = self.hasher.hash_async(new_password.to_string()).await?;
        self.update_password_hash(id, &hash).await
    }

    async fn update_password_hash(&self, id: i64, hash: &str) -> RepoResult<bool> {
        let affected = self
            .db
            .update(
                "UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?",
                params![hash, Utc::now(), id],
            )
            .await?;
        Ok(affected > 0)
    }

    async fn deactivate(&self, id: i64) -> RepoResult<bool> {
        let changed = self.set_active(id, false).await?;
        if changed {
            tracing::info!("Deactivated user {}", id);
        }
        Ok(changed)
    }

    async fn activate(&self, id: i64) -> RepoResult<bool> {
        self.set_active(id, true).await
    }

    async fn hard_delete(&self, id: i64) -> RepoResult<bool> {
        self.db
            .delete(
                "DELETE FROM post_tags WHERE post_id IN (SELECT id FROM posts WHERE author_id = ?)",
                params![id],
            )
            .await?;
        let posts = self
            .db
            .delete("DELETE FROM posts WHERE author_id = ?", params![id])
            .await?;
        let removed = self
            .db
            .delete("DELETE FROM users WHERE id = ?", params![id])
            .await?;

        if removed > 0 {
            tracing::info!("Deleted user {} and {} post(s)", id, posts);
        }
        Ok(removed > 0)
    }

    async fn count_legacy_hashes(&self) -> RepoResult<i64> {
        let prefixes = self.hasher.native_format().prefixes();
        let conditions = vec!["password_hash NOT LIKE ?"; prefixes.len()].join(" AND ");
        let sql = format!("SELECT COUNT(*) AS total FROM users WHERE {}", conditions);
        let params = prefixes
            .iter()
            .map(|p| SqlValue::from(format!("{}%", p)))
            .collect();
        let row = self.db.query_one(&sql, params).await?;
        Ok(match row {
            Some(row) => row.get_i64("total")?,
            None => 0,
        })
    }
}
