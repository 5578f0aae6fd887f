//! JSON schema files.
//!
//! ```json
//! {
//!   "database": "corpus",
//!   "doc_root": ".//MedlineCitation",
//!   "replace": [["$ART", "Article"]],
//!   "tables": [
//!     {"name": "docs", "columns": [
//!       {"name": "id", "type": "INT", "flags": "AUTO_INCREMENT PRIMARY KEY", "tag": "DOC_ID"},
//!       {"name": "title", "type": "TEXT", "tag": "$ART/ArticleTitle", "extract": "RECURSE_NO_TAGS"}
//!     ]}
//!   ],
//!   "sources": [{"files": ["data/*.xml"], "mode": "markup"}]
//! }
//! ```
//!
//! `replace` pairs are substituted, in order, into every other string of the
//! file before it is interpreted.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{Column, ColumnSource, Extraction, Schema, Table};
use crate::adapter::AdapterOptions;
use crate::error::{Error, Result};
use crate::pipeline::Source;

/// A trailing `[@name]` predicate names the attribute that holds the value.
static ATTRIBUTE_SHORTHAND: Lazy<Regex> = Lazy::new(|| Regex::new(r"@([^=]*?)]$").expect("valid regex"));

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFile {
    pub database: String,
    #[serde(default)]
    pub doc_root: Option<String>,
    #[serde(default)]
    pub replace: Vec<(String, String)>,
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    pub name: String,
    #[serde(default)]
    pub for_each: Option<String>,
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub sql_type: String,
    #[serde(default)]
    pub flags: String,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub attribute: Option<String>,
    #[serde(default)]
    pub extract: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceSpec {
    /// Glob patterns, expanded in order.
    #[serde(default)]
    pub files: Vec<String>,
    /// Text files listing one input path per line.
    #[serde(default)]
    pub file_lists: Vec<PathBuf>,
    #[serde(flatten)]
    pub options: AdapterOptions,
}

impl SchemaFile {
    /// Parse schema JSON, applying its `replace` pairs first.
    pub fn parse(text: &str) -> Result<Self> {
        let mut value: Value =
            serde_json::from_str(text).map_err(|e| Error::config(format!("schema is not valid JSON: {e}")))?;

        let replacements: Vec<(String, String)> = match value.get("replace") {
            Some(pairs) => serde_json::from_value(pairs.clone())
                .map_err(|e| Error::config(format!("`replace` must be a list of [from, to] pairs: {e}")))?,
            None => Vec::new(),
        };
        if !replacements.is_empty() {
            if let Value::Object(fields) = &mut value {
                for (_, field) in fields.iter_mut().filter(|(k, _)| k.as_str() != "replace") {
                    substitute(field, &replacements);
                }
            }
        }

        serde_json::from_value(value).map_err(|e| Error::config(e.to_string()))
    }

    /// Compile into a validated [`Schema`] plus its sources.
    pub fn build(self) -> Result<(Schema, Vec<Source>)> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for table_file in self.tables {
            let mut table = Table::new(&table_file.name);
            if let Some(path) = table_file.for_each.as_deref().filter(|p| !p.trim().is_empty()) {
                table = table
                    .with_for_each(path)
                    .map_err(|e| e.in_context(format!("table {}", table_file.name)))?;
            }
            for column in table_file.columns {
                let column = build_column(column).map_err(|e| e.in_context(format!("table {}", table_file.name)))?;
                table = table.with_column(column);
            }
            tables.push(table);
        }

        let mut schema = Schema::new(self.database, tables)?;
        if let Some(path) = self.doc_root.as_deref().filter(|p| !p.trim().is_empty()) {
            schema = schema.with_doc_root(path)?;
        }

        let sources = self
            .sources
            .into_iter()
            .map(|entry| {
                let source = Source::new(entry.files, entry.options).with_file_lists(entry.file_lists);
                source.validate()?;
                Ok(source)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok((schema, sources))
    }
}

fn build_column(column_file: ColumnSpec) -> Result<Column> {
    let source = ColumnSource::parse(column_file.tag.as_deref())
        .map_err(|e| e.in_context(format!("column {}", column_file.name)))?;

    let attribute = column_file.attribute.filter(|a| !a.trim().is_empty()).or_else(|| {
        let tag = column_file.tag.as_deref()?;
        let captures = ATTRIBUTE_SHORTHAND.captures(tag)?;
        Some(captures[1].trim().to_string())
    });

    let mut column = Column::new(column_file.name, column_file.sql_type, source)
        .with_flags(column_file.flags)
        .with_extraction(Extraction::from_flags(&column_file.extract));
    column.attribute = attribute;
    Ok(column)
}

fn substitute(value: &mut Value, replacements: &[(String, String)]) {
    let mut stack = vec![value];
    while let Some(value) = stack.pop() {
        match value {
            Value::String(s) => {
                for (from, to) in replacements {
                    if !from.is_empty() && s.contains(from.as_str()) {
                        *s = s.replace(from.as_str(), to);
                    }
                }
            }
            Value::Array(items) => stack.extend(items.iter_mut()),
            Value::Object(fields) => stack.extend(fields.values_mut()),
            _ => {}
        }
    }
}

/// Read and compile a schema file.
pub fn load(path: &Path) -> Result<(Schema, Vec<Source>)> {
    let text = std::fs::read_to_string(path)?;
    let loaded = load_str(&text)?;
    info!(
        path = %path.display(),
        database = %loaded.0.database,
        tables = loaded.0.tables.len(),
        sources = loaded.1.len(),
        "loaded schema"
    );
    Ok(loaded)
}

/// Compile schema JSON held in memory.
pub fn load_str(text: &str) -> Result<(Schema, Vec<Source>)> {
    SchemaFile::parse(text)?.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SourceMode;

    const SCHEMA: &str = r#"{
        "database": "corpus",
        "doc_root": ".//Citation",
        "replace": [["$ART", "Article"]],
        "tables": [
            {"name": "docs", "columns": [
                {"name": "id", "type": "INT", "flags": "AUTO_INCREMENT PRIMARY KEY", "tag": "DOC_ID"},
                {"name": "title", "type": "TEXT", "tag": "$ART/Title", "extract": "RECURSE_NO_TAGS"},
                {"name": "lang", "type": "TEXT", "tag": "$ART/Language[@code]"},
                {"name": "file", "type": "TEXT", "tag": "FILENAME"}
            ]},
            {"name": "authors", "for_each": ".//Author", "columns": [
                {"name": "row_id", "type": "INT", "flags": "AUTO_INCREMENT PRIMARY KEY"},
                {"name": "doc", "type": "INT", "tag": "DOC_ID"},
                {"name": "pos", "type": "INT", "tag": "FOREACH_INDEX"},
                {"name": "last", "type": "TEXT", "tag": "LastName"}
            ]}
        ],
        "sources": [
            {"files": ["data/*.xml"]},
            {"files": ["feed.jsonl"], "mode": "json", "batch_size": 50},
            {"files": ["page.html"], "mode": "lenient", "fake_root": true}
        ]
    }"#;

    #[test]
    fn test_load_full_schema() {
        let (schema, sources) = load_str(SCHEMA).unwrap();
        assert_eq!(schema.database, "corpus");
        assert_eq!(schema.doc_root.as_ref().map(|p| p.as_str()), Some(".//Citation"));
        assert_eq!(schema.tables.len(), 2);
        assert_eq!(schema.doc_id_table().map(|t| t.name.as_str()), Some("docs"));

        let docs = &schema.tables[0];
        assert_eq!(docs.columns[1].extraction, Extraction::RecurseNoTags);
        match &docs.columns[1].source {
            ColumnSource::Element(path) => assert_eq!(path.as_str(), "Article/Title"),
            other => panic!("unexpected source {other:?}"),
        }
        assert_eq!(docs.columns[2].attribute.as_deref(), Some("code"));
        assert_eq!(docs.columns[3].source, ColumnSource::Filename);

        let authors = &schema.tables[1];
        assert_eq!(authors.for_each.as_ref().map(|p| p.as_str()), Some(".//Author"));
        assert_eq!(authors.columns[0].source, ColumnSource::AutoGenerated);
        assert!(!authors.columns[1].is_doc_id_counter());

        assert_eq!(sources.len(), 3);
        assert_eq!(sources[0].options.mode, SourceMode::Markup);
        assert_eq!(sources[1].options.batch_size, 50);
        assert!(sources[2].options.fake_root);
    }

    #[test]
    fn test_explicit_attribute_wins_over_shorthand() {
        let column = build_column(ColumnSpec {
            name: "x".into(),
            sql_type: "TEXT".into(),
            flags: String::new(),
            tag: Some("Item[@id]".into()),
            attribute: Some("ref".into()),
            extract: String::new(),
        })
        .unwrap();
        assert_eq!(column.attribute.as_deref(), Some("ref"));
    }

    #[test]
    fn test_valued_predicate_is_not_shorthand() {
        let column = build_column(ColumnSpec {
            name: "x".into(),
            sql_type: "TEXT".into(),
            flags: String::new(),
            tag: Some("Id[@type='doi']".into()),
            attribute: None,
            extract: String::new(),
        })
        .unwrap();
        assert_eq!(column.attribute, None);
    }

    #[test]
    fn test_malformed_path_is_config_error() {
        let err = load_str(
            r#"{"database": "d", "tables": [{"name": "t", "columns": [{"name": "c", "type": "TEXT", "tag": "a[@"}]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("column c"));
    }

    #[test]
    fn test_unknown_field_is_config_error() {
        let err = load_str(r#"{"database": "d", "tables": [], "tabels": []}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_duplicate_counter_is_config_error() {
        let err = load_str(
            r#"{"database": "d", "tables": [
                {"name": "a", "columns": [{"name": "id", "type": "INT", "flags": "AUTO_INCREMENT", "tag": "DOC_ID"}]},
                {"name": "b", "columns": [{"name": "id", "type": "INT", "flags": "AUTO_INCREMENT", "tag": "DOC_ID"}]}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
