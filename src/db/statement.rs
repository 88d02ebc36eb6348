//! Validated SQL statements
//!
//! A [`Statement`] pairs SQL text using positional `?` placeholders with its
//! bind values. Construction fails when the counts disagree, so a malformed
//! call never reaches a driver. Placeholders are counted with the lexing
//! rules of the target [`Dialect`].

use super::dialect::Dialect;
use super::error::{DatabaseError, DbResult};
use super::value::SqlValue;

/// Maximum SQL length kept in log previews
const PREVIEW_LEN: usize = 120;

#[derive(Debug, Clone)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    pub fn new(dialect: Dialect, sql: impl Into<String>, params: Vec<SqlValue>) -> DbResult<Self> {
        let sql = sql.into();
        let placeholders = count_placeholders(dialect, &sql);
        if placeholders != params.len() {
            return Err(DatabaseError::ParameterMismatch {
                placeholders,
                binds: params.len(),
            });
        }
        Ok(Self { sql, params })
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Single-line SQL truncated for logging
    pub fn preview(&self) -> String {
        let flat: String = self.sql.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.chars().count() > PREVIEW_LEN {
            let cut: String = flat.chars().take(PREVIEW_LEN).collect();
            format!("{}...", cut)
        } else {
            flat
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Scan {
    Code,
    Quoted(char),
    LineComment,
    BlockComment,
}

/// Count `?` placeholders outside string literals, quoted identifiers and
/// comments.
pub fn count_placeholders(dialect: Dialect, sql: &str) -> usize {
    let mysql = dialect.mysql_lexing();
    let mut count = 0;
    let mut state = Scan::Code;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match state {
            Scan::Code => match c {
                '?' => count += 1,
                '\'' | '"' | '`' => state = Scan::Quoted(c),
                '-' if chars.peek() == Some(&'-') => {
                    chars.next();
                    state = Scan::LineComment;
                }
                '#' if mysql => state = Scan::LineComment,
                '/' if chars.peek() == Some(&'*') => {
                    chars.next();
                    state = Scan::BlockComment;
                }
                _ => {}
            },
            Scan::Quoted(quote) => {
                if c == '\\' && mysql {
                    chars.next();
                } else if c == quote {
                    // doubled quote is an escaped quote
                    if chars.peek() == Some(&quote) {
                        chars.next();
                    } else {
                        state = Scan::Code;
                    }
                }
            }
            Scan::LineComment => {
                if c == '\n' {
                    state = Scan::Code;
                }
            }
            Scan::BlockComment => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = Scan::Code;
                }
            }
        }
    }

    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params;

    #[test]
    fn test_counts_plain_placeholders() {
        for dialect in [Dialect::Sqlite, Dialect::Mysql] {
            assert_eq!(count_placeholders(dialect, "SELECT * FROM posts"), 0);
            assert_eq!(
                count_placeholders(dialect, "UPDATE posts SET title = ?, slug = ? WHERE id = ?"),
                3
            );
        }
    }

    #[test]
    fn test_ignores_quoted_and_commented_marks() {
        for dialect in [Dialect::Sqlite, Dialect::Mysql] {
            assert_eq!(
                count_placeholders(dialect, "SELECT '?' AS q, \"a?b\", `c?` FROM t WHERE id = ?"),
                1
            );
            assert_eq!(count_placeholders(dialect, "SELECT 'it''s ?' WHERE a = ?"), 1);
            assert_eq!(
                count_placeholders(dialect, "SELECT 1 -- why?\n WHERE a = ? /* b = ? */"),
                1
            );
        }
    }

    #[test]
    fn test_backslash_and_hash_follow_dialect() {
        // MySQL: \' escapes the quote, so the literal is 'x\'?'
        assert_eq!(count_placeholders(Dialect::Mysql, "SELECT 'x\\'?' WHERE a = ?"), 1);
        assert_eq!(count_placeholders(Dialect::Mysql, "SELECT 1 # note ?\n, ?"), 1);

        // SQLite: a backslash is literal, the string ends right after it
        assert_eq!(count_placeholders(Dialect::Sqlite, "SELECT 'C:\\' AS p, ? AS q"), 1);
        assert_eq!(count_placeholders(Dialect::Sqlite, "SELECT '#', ? AS q"), 1);

        let stmt =
            Statement::new(Dialect::Sqlite, "SELECT 'C:\\' AS p, ? AS q", params![1i64]).unwrap();
        assert_eq!(stmt.params().len(), 1);
    }

    #[test]
    fn test_new_rejects_mismatch() {
        let err = Statement::new(Dialect::Sqlite, "SELECT * FROM tags WHERE id = ?", params![])
            .unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::ParameterMismatch {
                placeholders: 1,
                binds: 0
            }
        ));

        let err = Statement::new(Dialect::Sqlite, "SELECT 1", params![1i64]).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::ParameterMismatch {
                placeholders: 0,
                binds: 1
            }
        ));
    }

    #[test]
    fn test_new_accepts_matching_counts() {
        let stmt = Statement::new(Dialect::Sqlite, "SELECT * FROM tags WHERE id = ?", params![3i64]).unwrap();
        assert_eq!(stmt.params(), &[SqlValue::Int(3)]);
        assert_eq!(stmt.sql(), "SELECT * FROM tags WHERE id = ?");
    }

    #[test]
    fn test_preview_flattens_and_truncates() {
        let stmt = Statement::new(Dialect::Sqlite, "SELECT *\n   FROM posts\n  WHERE 1", params![]).unwrap();
        assert_eq!(stmt.preview(), "SELECT * FROM posts WHERE 1");

        let long = format!("SELECT {} FROM t", "a, ".repeat(100));
        let stmt = Statement::new(Dialect::Sqlite, long, params![]).unwrap();
        assert!(stmt.preview().ends_with("..."));
        assert_eq!(stmt.preview().chars().count(), PREVIEW_LEN + 3);
    }
}
