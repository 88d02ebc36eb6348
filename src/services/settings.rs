//! Site settings service
//!
//! Typed view over the key/value settings table. Missing or mistyped values
//! fall back to [`SiteSettings::default`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::db::repositories::{RepoError, SettingsRepository, SqlSettingsRepository};
use crate::db::Database;
use crate::models::SettingType;

/// Known setting keys
pub mod keys {
    pub const SITE_NAME: &str = "site_name";
    pub const SITE_DESCRIPTION: &str = "site_description";
    pub const POSTS_PER_PAGE: &str = "posts_per_page";
    pub const SOCIAL_LINKS: &str = "social_links";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SiteSettings {
    pub site_name: String,
    pub site_description: String,
    pub posts_per_page: u32,
    /// Free-form JSON object, e.g. `{"github": "https://..."}`
    pub social_links: Value,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            site_name: "Inkpost".to_string(),
            site_description: "Another Inkpost blog".to_string(),
            posts_per_page: 10,
            social_links: Value::Object(Default::default()),
        }
    }
}

pub struct SettingsService {
    repo: Arc<dyn SettingsRepository>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepository>) -> Self {
        Self { repo }
    }

    pub fn from_database(db: Database) -> Self {
        Self::new(SqlSettingsRepository::boxed(db))
    }

    pub async fn get_site_settings(&self) -> Result<SiteSettings, RepoError> {
        let defaults = SiteSettings::default();
        let mut site = defaults.clone();

        for setting in self.repo.get_all().await? {
            match (setting.key.as_str(), setting.value) {
                (keys::SITE_NAME, Value::String(s)) => site.site_name = s,
                (keys::SITE_DESCRIPTION, Value::String(s)) => site.site_description = s,
                (keys::POSTS_PER_PAGE, Value::Number(n)) => {
                    site.posts_per_page = n
                        .as_u64()
                        .filter(|n| *n > 0)
                        .and_then(|n| u32::try_from(n).ok())
                        .unwrap_or(defaults.posts_per_page)
                }
                (keys::SOCIAL_LINKS, v @ Value::Object(_)) => site.social_links = v,
                _ => {}
            }
        }

        Ok(site)
    }

    pub async fn update_site_settings(&self, site: &SiteSettings) -> Result<(), RepoError> {
        if site.posts_per_page == 0 {
            return Err(RepoError::Invalid(
                "posts_per_page must be at least 1".to_string(),
            ));
        }

        let entries = [
            (keys::SITE_NAME, Value::from(site.site_name.clone()), SettingType::String),
            (
                keys::SITE_DESCRIPTION,
                Value::from(site.site_description.clone()),
                SettingType::String,
            ),
            (keys::POSTS_PER_PAGE, Value::from(site.posts_per_page), SettingType::Number),
            (keys::SOCIAL_LINKS, site.social_links.clone(), SettingType::Json),
        ];
        for (key, value, setting_type) in entries {
            self.repo.set(key, &value, Some(setting_type), None).await?;
        }

        tracing::info!("Site settings updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_db;
    use serde_json::json;

    async fn setup_test_service() -> (Database, SettingsService) {
        let db = create_test_db().await.expect("Failed to create test db");
        (db.clone(), SettingsService::from_database(db))
    }

    #[tokio::test]
    async fn test_seeded_site_settings_match_defaults() {
        let (_db, service) = setup_test_service().await;
        let site = service.get_site_settings().await.unwrap();
        assert_eq!(site, SiteSettings::default());
    }

    #[tokio::test]
    async fn test_update_round_trip() {
        let (_db, service) = setup_test_service().await;
        let site = SiteSettings {
            site_name: "My Blog".to_string(),
            site_description: "Notes".to_string(),
            posts_per_page: 25,
            social_links: json!({"github": "https://github.com/me"}),
        };
        service.update_site_settings(&site).await.unwrap();
        assert_eq!(service.get_site_settings().await.unwrap(), site);

        let bad = SiteSettings {
            posts_per_page: 0,
            ..site
        };
        assert!(service.update_site_settings(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_mistyped_values_fall_back() {
        let (db, service) = setup_test_service().await;
        let repo = SqlSettingsRepository::new(db);
        repo.set(keys::POSTS_PER_PAGE, &json!("lots"), Some(SettingType::Number), None)
            .await
            .unwrap();
        repo.set(keys::SITE_NAME, &json!(42), None, None).await.unwrap();

        let site = service.get_site_settings().await.unwrap();
        assert_eq!(site.posts_per_page, 10);
        assert_eq!(site.site_name, "Inkpost");
    }
}
