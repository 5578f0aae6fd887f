//! Ingestion schema: tables, their columns, and where column values come from.
//!
//! A [`Schema`] is built once (usually by [`config::load`]) and is read-only
//! afterwards. Every element path it mentions is compiled up front, so a
//! malformed path is a configuration error before any file is opened.

use tracing::debug;

use crate::document::CasedPath;
use crate::error::{Error, Result};

pub mod config;

pub use config::{load, load_str, SchemaFile};

/// Column source tag for the document identifier.
pub const DOC_ID_TAG: &str = "DOC_ID";
/// Column source tag for the 1-based position within the `for_each` group.
pub const FOREACH_INDEX_TAG: &str = "FOREACH_INDEX";
/// Column source tag for the source file name.
pub const FILENAME_TAG: &str = "FILENAME";

/// How a value is taken from a matched element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Extraction {
    /// The element's direct text.
    #[default]
    Text,
    /// Direct text followed by the tail of each immediate child.
    NoChildren,
    /// Markup serialization of the whole subtree.
    Recurse,
    /// Every text fragment of the subtree, joined by spaces.
    RecurseNoTags,
}

impl Extraction {
    /// Resolve a space-separated flag list. `RECURSE` wins over
    /// `NO_CHILDREN`, which wins over `RECURSE_NO_TAGS`; anything else is
    /// plain text.
    pub fn from_flags(flags: &str) -> Self {
        let flags: Vec<&str> = flags.split_whitespace().collect();
        if flags.contains(&"RECURSE") {
            Extraction::Recurse
        } else if flags.contains(&"NO_CHILDREN") {
            Extraction::NoChildren
        } else if flags.contains(&"RECURSE_NO_TAGS") {
            Extraction::RecurseNoTags
        } else {
            Extraction::Text
        }
    }
}

/// Where a column's value comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSource {
    DocId,
    ForEachIndex,
    Filename,
    /// No tag: always null, left to the sink's own identifier generation.
    AutoGenerated,
    /// First element matching the path under the working element.
    Element(CasedPath),
}

impl ColumnSource {
    pub fn parse(tag: Option<&str>) -> Result<Self> {
        let Some(tag) = tag.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(ColumnSource::AutoGenerated);
        };
        Ok(match tag {
            DOC_ID_TAG => ColumnSource::DocId,
            FOREACH_INDEX_TAG => ColumnSource::ForEachIndex,
            FILENAME_TAG => ColumnSource::Filename,
            path => ColumnSource::Element(CasedPath::compile(path)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub sql_type: String,
    /// Persistence flags, passed through to the table definition.
    pub flags: String,
    pub source: ColumnSource,
    /// Take this attribute of the matched element instead of its content.
    pub attribute: Option<String>,
    pub extraction: Extraction,
}

impl Column {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>, source: ColumnSource) -> Self {
        Column {
            name: name.into(),
            sql_type: sql_type.into(),
            flags: String::new(),
            source,
            attribute: None,
            extraction: Extraction::Text,
        }
    }

    pub fn with_flags(mut self, flags: impl Into<String>) -> Self {
        self.flags = flags.into();
        self
    }

    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn with_extraction(mut self, extraction: Extraction) -> Self {
        self.extraction = extraction;
        self
    }

    /// True for the `DOC_ID` column that owns the document counter.
    pub fn is_doc_id_counter(&self) -> bool {
        self.source == ColumnSource::DocId && self.flags.contains("AUTO_INCREMENT")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    /// One row per match; `None` means one row per document.
    pub for_each: Option<CasedPath>,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Table {
            name: name.into(),
            for_each: None,
            columns: Vec::new(),
        }
    }

    pub fn with_for_each(mut self, path: &str) -> Result<Self> {
        self.for_each = Some(CasedPath::compile(path)?);
        Ok(self)
    }

    pub fn with_column(mut self, column: Column) -> Self {
        self.columns.push(column);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub database: String,
    /// Selects the document roots inside each parsed tree.
    pub doc_root: Option<CasedPath>,
    pub tables: Vec<Table>,
    doc_id_table: Option<usize>,
}

impl Schema {
    /// Build a schema, rejecting more than one document-counter column.
    pub fn new(database: impl Into<String>, tables: Vec<Table>) -> Result<Self> {
        let mut doc_id_table = None;
        for (index, table) in tables.iter().enumerate() {
            for column in table.columns.iter().filter(|c| c.is_doc_id_counter()) {
                if let Some(first) = doc_id_table {
                    let first: &Table = &tables[first];
                    return Err(Error::config(format!(
                        "more than one DOC_ID column with AUTO_INCREMENT: {}.{} and {}.{}",
                        first.name,
                        first
                            .columns
                            .iter()
                            .find(|c| c.is_doc_id_counter())
                            .map_or("?", |c| c.name.as_str()),
                        table.name,
                        column.name
                    )));
                }
                doc_id_table = Some(index);
            }
        }

        let schema = Schema {
            database: database.into(),
            doc_root: None,
            tables,
            doc_id_table,
        };
        debug!(
            database = %schema.database,
            tables = schema.tables.len(),
            doc_id_table = schema.doc_id_table().map(|t| t.name.as_str()).unwrap_or("-"),
            "schema built"
        );
        Ok(schema)
    }

    pub fn with_doc_root(mut self, path: &str) -> Result<Self> {
        self.doc_root = Some(CasedPath::compile(path)?);
        Ok(self)
    }

    /// The table holding the auto-incremented document identifier.
    pub fn doc_id_table(&self) -> Option<&Table> {
        self.doc_id_table.map(|i| &self.tables[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_flag_precedence() {
        assert_eq!(Extraction::from_flags(""), Extraction::Text);
        assert_eq!(Extraction::from_flags("NO_CHILDREN"), Extraction::NoChildren);
        assert_eq!(Extraction::from_flags("RECURSE_NO_TAGS"), Extraction::RecurseNoTags);
        assert_eq!(Extraction::from_flags("RECURSE_NO_TAGS NO_CHILDREN"), Extraction::NoChildren);
        assert_eq!(Extraction::from_flags("NO_CHILDREN RECURSE"), Extraction::Recurse);
        assert_eq!(Extraction::from_flags("BOGUS"), Extraction::Text);
    }

    #[test]
    fn test_column_source_parsing() {
        assert_eq!(ColumnSource::parse(Some("DOC_ID")).unwrap(), ColumnSource::DocId);
        assert_eq!(ColumnSource::parse(Some("FOREACH_INDEX")).unwrap(), ColumnSource::ForEachIndex);
        assert_eq!(ColumnSource::parse(Some("FILENAME")).unwrap(), ColumnSource::Filename);
        assert_eq!(ColumnSource::parse(None).unwrap(), ColumnSource::AutoGenerated);
        assert_eq!(ColumnSource::parse(Some("  ")).unwrap(), ColumnSource::AutoGenerated);
        assert!(matches!(
            ColumnSource::parse(Some("Article/Title")).unwrap(),
            ColumnSource::Element(_)
        ));
        assert!(ColumnSource::parse(Some("/absolute")).is_err());
    }

    #[test]
    fn test_single_doc_id_counter() {
        let docs = Table::new("docs")
            .with_column(Column::new("id", "INT", ColumnSource::DocId).with_flags("AUTO_INCREMENT PRIMARY KEY"));
        let authors = Table::new("authors").with_column(Column::new("doc", "INT", ColumnSource::DocId));

        let schema = Schema::new("corpus", vec![docs, authors]).unwrap();
        assert_eq!(schema.doc_id_table().map(|t| t.name.as_str()), Some("docs"));
    }

    #[test]
    fn test_two_doc_id_counters_rejected() {
        let counter = || Column::new("id", "INT", ColumnSource::DocId).with_flags("AUTO_INCREMENT");
        let err = Schema::new(
            "corpus",
            vec![
                Table::new("a").with_column(counter()),
                Table::new("b").with_column(counter()),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("a.id and b.id"));
    }

    #[test]
    fn test_auto_increment_on_path_column_is_not_counter() {
        let column = Column::new("id", "INT", ColumnSource::parse(Some("PMID")).unwrap()).with_flags("AUTO_INCREMENT");
        assert!(!column.is_doc_id_counter());
    }
}
