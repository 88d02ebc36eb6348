//! Password login
//!
//! Verifies credentials with the runtime's [`PasswordHasher`]. A successful
//! login with a hash from the other runtime's strategy re-hashes the password
//! natively, so legacy hashes disappear as users sign in.

use std::sync::Arc;
use thiserror::Error;

use crate::db::repositories::{RepoError, UserRepository};
use crate::models::User;
use crate::services::password::{PasswordError, PasswordHasher};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown user or wrong password. The two are not distinguished.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account is disabled")]
    AccountDisabled,

    /// The stored hash cannot be verified on this runtime
    #[error("password reset required")]
    PasswordResetRequired,

    #[error(transparent)]
    Repository(#[from] RepoError),
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    hasher: PasswordHasher,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, hasher: PasswordHasher) -> Self {
        Self { users, hasher }
    }

    pub async fn authenticate(&self, login: &str, password: &str) -> Result<User, AuthError> {
        let login = login.trim();
        if login.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let Some(user) = self.users.get_by_login(login).await? else {
            tracing::debug!("Login failed: unknown user '{}'", login);
            return Err(AuthError::InvalidCredentials);
        };

        let valid = match self
            .hasher
            .verify_async(password.to_string(), user.password_hash.clone())
            .await
        {
            Ok(valid) => valid,
            Err(PasswordError::Hashing(e)) => {
                return Err(AuthError::Repository(RepoError::Password(
                    PasswordError::Hashing(e),
                )))
            }
            Err(e) => {
                tracing::warn!("User {} has an unusable password hash: {}", user.id, e);
                return Err(AuthError::PasswordResetRequired);
            }
        };

        if !valid {
            tracing::debug!("Login failed: wrong password for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(AuthError::AccountDisabled);
        }

        if self.hasher.needs_rehash(&user.password_hash) {
            self.migrate_hash(&user, password).await;
        }

        Ok(user)
    }

    /// Store a native hash for `user`. Failure is logged and the login still
    /// succeeds; the next login retries.
    async fn migrate_hash(&self, user: &User, password: &str) {
        let result: Result<bool, RepoError> = async {
            let hash = self.hasher.hash_async(password.to_string()).await?;
            self.users.update_password_hash(user.id, &hash).await
        }
        .await;

        match result {
            Ok(_) => tracing::info!(
                "Migrated password hash for user {} to {}",
                user.id,
                self.hasher.native_format()
            ),
            Err(e) => tracing::warn!("Failed to migrate password hash for user {}: {}", user.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AuthConfig, Runtime};
    use crate::db::create_test_db;
    use crate::db::repositories::SqlUserRepository;
    use crate::db::Database;
    use crate::models::CreateUserInput;
    use crate::services::password::{HashFormat, PBKDF2_PREFIX};

    async fn setup(runtime: Runtime) -> (Database, Arc<dyn UserRepository>, AuthService) {
        let db = create_test_db().await.expect("Failed to create test db");
        let hasher = PasswordHasher::for_runtime(runtime);
        let users = SqlUserRepository::boxed(db.clone(), hasher);
        let service = AuthService::new(users.clone(), hasher);
        (db, users, service)
    }

    #[tokio::test]
    async fn test_login_by_username_and_email() {
        let (_db, users, auth) = setup(Runtime::Edge).await;
        users
            .create(&CreateUserInput::new("ivy", "ivy@example.com", "hunter2"))
            .await
            .unwrap();

        assert_eq!(auth.authenticate("ivy", "hunter2").await.unwrap().username, "ivy");
        assert_eq!(
            auth.authenticate("ivy@example.com", "hunter2").await.unwrap().username,
            "ivy"
        );
    }

    #[tokio::test]
    async fn test_invalid_credentials() {
        let (_db, users, auth) = setup(Runtime::Edge).await;
        users
            .create(&CreateUserInput::new("jack", "jack@example.com", "right"))
            .await
            .unwrap();

        assert!(matches!(
            auth.authenticate("jack", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate("nobody", "right").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.authenticate("", "").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_disabled_account() {
        let (_db, users, auth) = setup(Runtime::Edge).await;
        let user = users
            .create(&CreateUserInput::new("kim", "kim@example.com", "pw"))
            .await
            .unwrap();
        users.deactivate(user.id).await.unwrap();

        assert!(matches!(
            auth.authenticate("kim", "pw").await,
            Err(AuthError::AccountDisabled)
        ));
    }

    #[tokio::test]
    async fn test_argon2_hash_on_edge_requires_reset() {
        let (_db, users, auth) = setup(Runtime::Edge).await;
        let user = users
            .create(&CreateUserInput::new("lee", "lee@example.com", "pw"))
            .await
            .unwrap();
        let argon = PasswordHasher::for_runtime(Runtime::Server).hash("pw").unwrap();
        users.update_password_hash(user.id, &argon).await.unwrap();

        assert!(matches!(
            auth.authenticate("lee", "pw").await,
            Err(AuthError::PasswordResetRequired)
        ));
    }

    #[tokio::test]
    async fn test_unrecognized_hash_requires_reset() {
        let (_db, users, auth) = setup(Runtime::Server).await;
        let user = users
            .create(&CreateUserInput::new("max", "max@example.com", "pw"))
            .await
            .unwrap();
        users.update_password_hash(user.id, "md5:abcdef").await.unwrap();

        assert!(matches!(
            auth.authenticate("max", "pw").await,
            Err(AuthError::PasswordResetRequired)
        ));
    }

    #[tokio::test]
    async fn test_corrupt_argon2_hash_requires_reset() {
        let (_db, users, auth) = setup(Runtime::Server).await;
        let user = users
            .create(&CreateUserInput::new("olga", "olga@example.com", "pw"))
            .await
            .unwrap();

        for stored in ["$argon2id$garbage", "$argon2xyz$v=19$abc"] {
            users.update_password_hash(user.id, stored).await.unwrap();
            assert!(
                matches!(
                    auth.authenticate("olga", "pw").await,
                    Err(AuthError::PasswordResetRequired)
                ),
                "{} should require a reset",
                stored
            );
        }
    }

    #[tokio::test]
    async fn test_legacy_hash_migrated_on_login() {
        let (_db, users, auth) = setup(Runtime::Server).await;
        let user = users
            .create(&CreateUserInput::new("nina", "nina@example.com", "pw"))
            .await
            .unwrap();
        let legacy = PasswordHasher::new(Runtime::Edge, &AuthConfig::default())
            .hash("pw")
            .unwrap();
        assert!(legacy.starts_with(PBKDF2_PREFIX));
        users.update_password_hash(user.id, &legacy).await.unwrap();
        assert_eq!(users.count_legacy_hashes().await.unwrap(), 1);

        auth.authenticate("nina", "pw").await.unwrap();

        let stored = users.get_by_id(user.id).await.unwrap().unwrap().password_hash;
        assert_eq!(HashFormat::detect(&stored), Some(HashFormat::Argon2));
        assert_eq!(users.count_legacy_hashes().await.unwrap(), 0);
        assert!(auth.authenticate("nina", "pw").await.is_ok());
    }
}
