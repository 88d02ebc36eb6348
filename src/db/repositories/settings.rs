//! Settings repository
//!
//! `key`, `value` and `type` are reserved words in one engine or the other,
//! so every statement quotes them through the dialect.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{RepoError, RepoResult};
use crate::db::{Database, DbResult, Dialect, Row};
use crate::models::{Setting, SettingType};
use crate::params;

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> RepoResult<Option<Setting>>;

    /// Parsed value only
    async fn get_value(&self, key: &str) -> RepoResult<Option<Value>>;

    async fn get_all(&self) -> RepoResult<Vec<Setting>>;

    /// Insert or overwrite a setting. The type is inferred from the value when
    /// not given; an absent description leaves the stored one untouched.
    async fn set(
        &self,
        key: &str,
        value: &Value,
        setting_type: Option<SettingType>,
        description: Option<&str>,
    ) -> RepoResult<Setting>;

    async fn delete(&self, key: &str) -> RepoResult<bool>;
}

pub struct SqlSettingsRepository {
    db: Database,
}

impl SqlSettingsRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn boxed(db: Database) -> Arc<dyn SettingsRepository> {
        Arc::new(Self::new(db))
    }

    fn select_sql(&self) -> String {
        let d = self.db.dialect();
        format!(
            "SELECT {} AS setting_key, {} AS setting_value, {} AS setting_type, description, updated_at \
             FROM settings",
            d.quote_ident("key"),
            d.quote_ident("value"),
            d.quote_ident("type"),
        )
    }

    /// Convenience map of every key to its parsed value
    pub async fn values(&self) -> RepoResult<HashMap<String, Value>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .map(|s| (s.key, s.value))
            .collect())
    }
}

fn setting_from_row(row: &Row) -> DbResult<Setting> {
    let setting_type = SettingType::parse(&row.get_string("setting_type")?);
    let raw = row.get_string("setting_value")?;
    Ok(Setting {
        key: row.get_string("setting_key")?,
        value: setting_type.decode(&raw),
        setting_type,
        description: row.get_opt_string("description")?,
        updated_at: row.get_datetime("updated_at")?,
    })
}

fn upsert_sql(dialect: Dialect, with_description: bool) -> String {
    let mut columns = vec!["key", "value", "type", "updated_at"];
    if with_description {
        columns.push("description");
    }
    let quoted: Vec<String> = columns.iter().map(|c| dialect.quote_ident(c)).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO settings ({}) VALUES ({}) {}",
        quoted.join(", "),
        placeholders,
        dialect.upsert_suffix("key", &columns[1..])
    )
}

#[async_trait]
impl SettingsRepository for SqlSettingsRepository {
    async fn get(&self, key: &str) -> RepoResult<Option<Setting>> {
        let sql = format!(
            "{} WHERE {} = ?",
            self.select_sql(),
            self.db.dialect().quote_ident("key")
        );
        let row = self.db.query_one(&sql, params![key]).await?;
        Ok(row.as_ref().map(setting_from_row).transpose()?)
    }

    async fn get_value(&self, key: &str) -> RepoResult<Option<Value>> {
        Ok(self.get(key).await?.map(|s| s.value))
    }

    async fn get_all(&self) -> RepoResult<Vec<Setting>> {
        let sql = format!(
            "{} ORDER BY {}",
            self.select_sql(),
            self.db.dialect().quote_ident("key")
        );
        let rows = self.db.query(&sql, params![]).await?;
        Ok(rows.iter().map(setting_from_row).collect::<DbResult<_>>()?)
    }

    async fn set(
        &self,
        key: &str,
        value: &Value,
        setting_type: Option<SettingType>,
        description: Option<&str>,
    ) -> RepoResult<Setting> {
        let key = key.trim();
        if key.is_empty() {
            return Err(RepoError::Invalid("setting key is required".to_string()));
        }

        let setting_type = setting_type.unwrap_or_else(|| SettingType::infer(value));
        let encoded = setting_type.encode(value);
        let now = Utc::now();

        let sql = upsert_sql(self.db.dialect(), description.is_some());
        let mut binds = params![key, encoded, setting_type.as_str(), now];
        if let Some(description) = description {
            binds.push(description.into());
        }
        self.db.execute(&sql, binds).await?;

        tracing::debug!("Set setting {} ({})", key, setting_type);
        self.get(key).await?.ok_or_else(|| {
            RepoError::Database(crate::db::DatabaseError::WriteFailed { operation: "upsert" })
        })
    }

    async fn delete(&self, key: &str) -> RepoResult<bool> {
        let sql = format!(
            "DELETE FROM settings WHERE {} = ?",
            self.db.dialect().quote_ident("key")
        );
        Ok(self.db.delete(&sql, params![key]).await? > 0)
    }
}
