//! Driver-agnostic bind values and result rows

use chrono::{DateTime, NaiveDateTime, Utc};

use super::error::{DatabaseError, DbResult};

/// A SQL parameter or column value, independent of the backing engine.
///
/// Booleans and timestamps are carried natively and bound as real
/// parameters by each driver, so SQL text never spells out engine-specific
/// literals for them.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&String> for SqlValue {
    fn from(value: &String) -> Self {
        SqlValue::Text(value.clone())
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(value as i64)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Int(value as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

/// Build a `Vec<SqlValue>` from heterogeneous expressions.
///
/// ```ignore
/// db.query("SELECT * FROM posts WHERE id = ? AND status = ?", params![id, "published"]).await?;
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::db::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::db::SqlValue::from($value)),+]
    };
}

/// Parse a stored timestamp.
///
/// SQLite hands timestamps back as text in whichever shape wrote them:
/// RFC 3339 from bound `DateTime<Utc>` values, `YYYY-MM-DD HH:MM:SS` from
/// `CURRENT_TIMESTAMP` defaults.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// A single result row. Column order is preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub(crate) fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Gets the raw value of a column by name.
    pub fn get(&self, column: &str) -> DbResult<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|idx| &self.values[idx])
            .ok_or_else(|| DatabaseError::ColumnNotFound(column.to_string()))
    }

    pub fn get_i64(&self, column: &str) -> DbResult<i64> {
        self.get_opt_i64(column)?
            .ok_or_else(|| decode_error(column, "integer"))
    }

    pub fn get_opt_i64(&self, column: &str) -> DbResult<Option<i64>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Int(v) => Ok(Some(*v)),
            SqlValue::Bool(b) => Ok(Some(*b as i64)),
            SqlValue::Text(s) => s
                .parse::<i64>()
                .map(Some)
                .map_err(|_| decode_error(column, "integer")),
            _ => Err(decode_error(column, "integer")),
        }
    }

    pub fn get_string(&self, column: &str) -> DbResult<String> {
        self.get_opt_string(column)?
            .ok_or_else(|| decode_error(column, "text"))
    }

    pub fn get_opt_string(&self, column: &str) -> DbResult<Option<String>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(s) => Ok(Some(s.clone())),
            SqlValue::Int(v) => Ok(Some(v.to_string())),
            SqlValue::Float(v) => Ok(Some(v.to_string())),
            SqlValue::Bool(b) => Ok(Some(b.to_string())),
            SqlValue::Timestamp(dt) => Ok(Some(dt.to_rfc3339())),
        }
    }

    /// Reads a boolean column. SQLite stores booleans as 0/1 integers.
    pub fn get_bool(&self, column: &str) -> DbResult<bool> {
        match self.get(column)? {
            SqlValue::Bool(b) => Ok(*b),
            SqlValue::Int(v) => Ok(*v != 0),
            _ => Err(decode_error(column, "bool")),
        }
    }

    pub fn get_datetime(&self, column: &str) -> DbResult<DateTime<Utc>> {
        self.get_opt_datetime(column)?
            .ok_or_else(|| decode_error(column, "timestamp"))
    }

    pub fn get_opt_datetime(&self, column: &str) -> DbResult<Option<DateTime<Utc>>> {
        match self.get(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Timestamp(dt) => Ok(Some(*dt)),
            SqlValue::Text(s) => parse_timestamp(s)
                .map(Some)
                .ok_or_else(|| decode_error(column, "timestamp")),
            _ => Err(decode_error(column, "timestamp")),
        }
    }

    /// Returns all column names in this row, in select order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

fn decode_error(column: &str, expected: &'static str) -> DatabaseError {
    DatabaseError::Decode {
        column: column.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_row() -> Row {
        Row::new(
            vec![
                "id".to_string(),
                "title".to_string(),
                "is_featured".to_string(),
                "category_id".to_string(),
                "created_at".to_string(),
            ],
            vec![
                SqlValue::Int(7),
                SqlValue::Text("Hello".to_string()),
                SqlValue::Int(1),
                SqlValue::Null,
                SqlValue::Text("2024-03-01 12:30:00".to_string()),
            ],
        )
    }

    #[test]
    fn test_typed_accessors() {
        let row = sample_row();
        assert_eq!(row.get_i64("id").unwrap(), 7);
        assert_eq!(row.get_string("title").unwrap(), "Hello");
        assert!(row.get_bool("is_featured").unwrap());
        assert_eq!(row.get_opt_i64("category_id").unwrap(), None);
        assert_eq!(
            row.get_datetime("created_at").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_column() {
        let row = sample_row();
        assert!(matches!(
            row.get("nope"),
            Err(DatabaseError::ColumnNotFound(c)) if c == "nope"
        ));
    }

    #[test]
    fn test_decode_error_on_null_required_value() {
        let row = sample_row();
        assert!(matches!(
            row.get_i64("category_id"),
            Err(DatabaseError::Decode { expected: "integer", .. })
        ));
        assert!(row.get_bool("title").is_err());
    }

    #[test]
    fn test_column_order_preserved() {
        let row = sample_row();
        assert_eq!(row.columns()[0], "id");
        assert_eq!(row.columns()[4], "created_at");
        assert_eq!(row.columns().len(), 5);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(parse_timestamp("2024-01-02 03:04:05"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02T03:04:05Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02T03:04:05+00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02 03:04:05.000"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_params_macro() {
        let none: Option<i64> = None;
        let values = params![1i64, "draft", true, none];
        assert_eq!(
            values,
            vec![
                SqlValue::Int(1),
                SqlValue::Text("draft".to_string()),
                SqlValue::Bool(true),
                SqlValue::Null,
            ]
        );
        assert!(params![].is_empty());
    }
}
