//! User model
//!
//! Users own posts and sign in with a password. The stored hash is
//! self-describing and never leaves the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// User entity representing a registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Username (unique)
    pub username: String,
    /// Email address (unique)
    pub email: String,
    /// Stored password hash (`$argon2id$...` or `pbkdf2:...`)
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    /// Name shown on posts
    pub display_name: Option<String>,
    /// User role
    pub role: UserRole,
    /// False once the account is deactivated
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    /// Administrator - full access
    Admin,
    /// Editor - can edit all content
    Editor,
    /// Author - can only edit own content
    #[default]
    Author,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Editor => "editor",
            UserRole::Author => "author",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(UserRole::Admin),
            "editor" => Ok(UserRole::Editor),
            "author" => Ok(UserRole::Author),
            _ => Err(anyhow::anyhow!("Invalid user role: {}", s)),
        }
    }
}

/// Input for creating a new user (before password hashing)
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    /// Plaintext password (will be hashed)
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Defaults to Author
    #[serde(default)]
    pub role: Option<UserRole>,
}

impl CreateUserInput {
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            display_name: None,
            role: None,
        }
    }

    pub fn with_role(mut self, role: UserRole) -> Self {
        self.role = Some(role);
        self
    }
}

/// Profile fields a user may change. Password changes go through
/// `UserRepository::change_password`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProfileInput {
    pub email: Option<String>,
    pub display_name: Option<Option<String>>,
    pub role: Option<UserRole>,
}

impl UpdateProfileInput {
    pub fn has_changes(&self) -> bool {
        self.email.is_some() || self.display_name.is_some() || self.role.is_some()
    }
}
