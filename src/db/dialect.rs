//! The few SQL spellings that still differ between MySQL and SQLite.
//!
//! Booleans and timestamps are bound as parameters, so what remains here is
//! syntax that cannot be parameterised.

use crate::config::Runtime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Mysql,
    Sqlite,
}

impl Dialect {
    pub fn for_runtime(runtime: Runtime) -> Self {
        match runtime {
            Runtime::Server => Dialect::Mysql,
            Runtime::Edge => Dialect::Sqlite,
        }
    }

    /// MySQL reads `\` inside string literals as an escape and `#` as a
    /// line comment. SQLite treats both as ordinary characters.
    pub fn mysql_lexing(&self) -> bool {
        matches!(self, Dialect::Mysql)
    }

    /// Quote an identifier that collides with a reserved word (`key`, `type`).
    pub fn quote_ident(&self, ident: &str) -> String {
        match self {
            Dialect::Mysql => format!("`{}`", ident.replace('`', "``")),
            Dialect::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }

    /// `INSERT` keyword that silently skips rows violating a unique key
    pub fn insert_ignore(&self) -> &'static str {
        match self {
            Dialect::Mysql => "INSERT IGNORE",
            Dialect::Sqlite => "INSERT OR IGNORE",
        }
    }

    /// Trailing clause turning an `INSERT` into an upsert that overwrites
    /// `columns` when `conflict` already exists.
    pub fn upsert_suffix(&self, conflict: &str, columns: &[&str]) -> String {
        match self {
            Dialect::Mysql => {
                let sets: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let col = self.quote_ident(c);
                        format!("{} = VALUES({})", col, col)
                    })
                    .collect();
                format!("ON DUPLICATE KEY UPDATE {}", sets.join(", "))
            }
            Dialect::Sqlite => {
                let sets: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        let col = self.quote_ident(c);
                        format!("{} = excluded.{}", col, col)
                    })
                    .collect();
                format!(
                    "ON CONFLICT({}) DO UPDATE SET {}",
                    self.quote_ident(conflict),
                    sets.join(", ")
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_runtime() {
        assert_eq!(Dialect::for_runtime(Runtime::Server), Dialect::Mysql);
        assert_eq!(Dialect::for_runtime(Runtime::Edge), Dialect::Sqlite);
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(Dialect::Mysql.quote_ident("key"), "`key`");
        assert_eq!(Dialect::Sqlite.quote_ident("key"), "\"key\"");
        assert_eq!(Dialect::Sqlite.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_upsert_suffix() {
        assert_eq!(
            Dialect::Sqlite.upsert_suffix("key", &["value", "type"]),
            "ON CONFLICT(\"key\") DO UPDATE SET \"value\" = excluded.\"value\", \"type\" = excluded.\"type\""
        );
        assert_eq!(
            Dialect::Mysql.upsert_suffix("key", &["value"]),
            "ON DUPLICATE KEY UPDATE `value` = VALUES(`value`)"
        );
    }

    #[test]
    fn test_insert_ignore() {
        assert_eq!(Dialect::Mysql.insert_ignore(), "INSERT IGNORE");
        assert_eq!(Dialect::Sqlite.insert_ignore(), "INSERT OR IGNORE");
    }
}
