//! Typed key/value settings
//!
//! Values are stored as text next to a type tag. Reading parses the text
//! back into a JSON value of the tagged type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type tag stored in the `type` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SettingType {
    #[default]
    String,
    Number,
    Boolean,
    Json,
}

impl SettingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingType::String => "string",
            SettingType::Number => "number",
            SettingType::Boolean => "boolean",
            SettingType::Json => "json",
        }
    }

    /// Unknown tags read as plain strings
    pub fn parse(s: &str) -> Self {
        match s {
            "number" => SettingType::Number,
            "boolean" => SettingType::Boolean,
            "json" => SettingType::Json,
            _ => SettingType::String,
        }
    }

    /// Pick a tag for a value being written
    pub fn infer(value: &Value) -> Self {
        match value {
            Value::Bool(_) => SettingType::Boolean,
            Value::Number(_) => SettingType::Number,
            Value::String(_) => SettingType::String,
            Value::Null | Value::Array(_) | Value::Object(_) => SettingType::Json,
        }
    }

    /// Text form stored in the `value` column
    pub fn encode(&self, value: &Value) -> String {
        match (self, value) {
            (SettingType::String, Value::String(s)) => s.clone(),
            (SettingType::Json, v) => v.to_string(),
            (_, Value::String(s)) => s.clone(),
            (_, v) => v.to_string(),
        }
    }

    /// Parse stored text. Malformed numbers and JSON read as `null`.
    pub fn decode(&self, raw: &str) -> Value {
        match self {
            SettingType::String => Value::String(raw.to_string()),
            SettingType::Number => serde_json::from_str::<serde_json::Number>(raw.trim())
                .map(Value::Number)
                .unwrap_or(Value::Null),
            SettingType::Boolean => {
                Value::Bool(matches!(raw.trim().to_lowercase().as_str(), "true" | "1"))
            }
            SettingType::Json => serde_json::from_str(raw).unwrap_or(Value::Null),
        }
    }
}

impl std::fmt::Display for SettingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored setting with its value already parsed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Setting {
    pub key: String,
    pub value: Value,
    #[serde(rename = "type")]
    pub setting_type: SettingType,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}
