//! Shared pieces for building filtered queries.
//!
//! Filters are assembled as `AND`-joined fragments with positional `?`
//! placeholders and a matching list of bound values.

use std::str::FromStr;

use rusqlite::types::{Type, Value};
use rusqlite::Row;

/// Accumulates `WHERE` fragments and their parameters.
#[derive(Debug, Clone, Default)]
pub struct WhereClause {
    fragments: Vec<String>,
    params: Vec<Value>,
}

impl WhereClause {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `column = ?`.
    pub fn eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.fragments.push(format!("{column} = ?"));
        self.params.push(value.into());
        self
    }

    /// Adds a fragment with a single placeholder, e.g. `created_at < ?`.
    pub fn push(&mut self, fragment: &str, value: impl Into<Value>) -> &mut Self {
        self.fragments.push(fragment.to_string());
        self.params.push(value.into());
        self
    }

    /// Adds a fragment with no parameters, e.g. `summary IS NULL`.
    pub fn raw(&mut self, fragment: &str) -> &mut Self {
        self.fragments.push(fragment.to_string());
        self
    }

    /// Adds a case-insensitive substring match on `column`.
    ///
    /// `%` and `_` in `needle` match literally.
    pub fn contains(&mut self, column: &str, needle: &str) -> &mut Self {
        self.fragments.push(format!("{column} LIKE ? ESCAPE '\\'"));
        self.params.push(Value::Text(format!("%{}%", escape_like(needle))));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Renders the clause including the leading ` WHERE`, or an empty string.
    pub fn sql(&self) -> String {
        if self.fragments.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.fragments.join(" AND "))
        }
    }

    /// Values to bind, in placeholder order.
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Limit and offset for paginated reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    /// The first `limit` rows.
    pub fn first(limit: u32) -> Self {
        Self { limit, offset: 0 }
    }

    /// Page number `index` (zero based) of `size` rows.
    pub fn nth(index: u32, size: u32) -> Self {
        Self {
            limit: size,
            offset: index.saturating_mul(size),
        }
    }

    /// Renders ` LIMIT n OFFSET m`.
    pub fn sql(&self) -> String {
        format!(" LIMIT {} OFFSET {}", self.limit, self.offset)
    }
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Renders an optional page, or an empty string.
pub(crate) fn page_sql(page: Option<Page>) -> String {
    page.map(|p| p.sql()).unwrap_or_default()
}

/// Reads a text column and parses it into an enum.
pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Reads an optional JSON text column.
pub(crate) fn json_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|text| {
        serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

/// Encodes an optional JSON value for a text column.
pub(crate) fn json_param(value: Option<&serde_json::Value>) -> Option<String> {
    value.map(|v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_clause_renders_nothing() {
        let clause = WhereClause::new();
        assert!(clause.is_empty());
        assert_eq!(clause.sql(), "");
        assert!(clause.params().is_empty());
    }

    #[test]
    fn fragments_are_joined_with_and() {
        let mut clause = WhereClause::new();
        clause
            .eq("user_id", "u1".to_string())
            .push("internal_date_ms >= ?", 10_i64)
            .raw("summary IS NULL");

        assert_eq!(
            clause.sql(),
            " WHERE user_id = ? AND internal_date_ms >= ? AND summary IS NULL"
        );
        assert_eq!(
            clause.params(),
            &[Value::Text("u1".to_string()), Value::Integer(10)]
        );
    }

    #[test]
    fn contains_escapes_wildcards() {
        let mut clause = WhereClause::new();
        clause.contains("subject", "50%_off\\");
        assert_eq!(clause.sql(), " WHERE subject LIKE ? ESCAPE '\\'");
        assert_eq!(
            clause.params(),
            &[Value::Text("%50\\%\\_off\\\\%".to_string())]
        );
    }

    #[test]
    fn page_rendering() {
        assert_eq!(Page::first(5).sql(), " LIMIT 5 OFFSET 0");
        assert_eq!(Page::nth(2, 10).sql(), " LIMIT 10 OFFSET 20");
        assert_eq!(page_sql(None), "");
        assert_eq!(SortOrder::default().as_sql(), "DESC");
    }

    #[test]
    fn json_param_encodes_compact_text() {
        let value = serde_json::json!({"a": [1, 2]});
        assert_eq!(json_param(Some(&value)).as_deref(), Some(r#"{"a":[1,2]}"#));
        assert_eq!(json_param(None), None);
    }
}
