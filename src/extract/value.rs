//! SQL-ready cell values.

use std::fmt;

/// A cleaned cell: either `NULL` or a double-quoted, MySQL-escaped literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Null,
    /// The complete literal, quotes included.
    Literal(String),
}

impl SqlValue {
    /// Trim, escape and quote `raw`; `None` stays `NULL`.
    pub fn clean(raw: Option<&str>) -> Self {
        match raw {
            Some(raw) => SqlValue::Literal(quote(raw.trim())),
            None => SqlValue::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// The value as it appears in a statement.
    pub fn as_sql(&self) -> &str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Literal(literal) => literal,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_is_never_empty_string() {
        assert_eq!(SqlValue::clean(None).as_sql(), "NULL");
        assert_eq!(SqlValue::clean(Some("")).as_sql(), "\"\"");
        assert!(SqlValue::clean(None).is_null());
    }

    #[test]
    fn test_trim_and_quote() {
        assert_eq!(SqlValue::clean(Some("  Hello  \n")).to_string(), "\"Hello\"");
    }

    #[test]
    fn test_mysql_escapes() {
        let value = SqlValue::clean(Some("a'b\"c\\d\ne\rf\0g\x1ah"));
        assert_eq!(value.as_sql(), r#""a\'b\"c\\d\ne\rf\0g\Zh""#);
    }

    #[test]
    fn test_utf8_is_kept() {
        assert_eq!(SqlValue::clean(Some("café 東京")).as_sql(), "\"café 東京\"");
    }
}
