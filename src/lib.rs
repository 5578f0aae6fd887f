//! # Smelter - Markup to Relational Rows
//!
//! A schema-driven ingester that turns XML, tag soup and line-delimited JSON
//! into rows for relational tables, plus a profiler for surveying the
//! element paths of an unfamiliar corpus.
//!
//! ## Modules
//!
//! - **adapter**: parse a source file into a document tree (markup, lenient, JSON)
//! - **document**: the element tree, relative element paths, dumps
//! - **schema**: tables and columns, loaded from a JSON schema file
//! - **extract**: compute one row per table (or per `for_each` match) of a document
//! - **profile**: per-path occurrence statistics across a corpus
//! - **sink**: destinations for table definitions and rows
//! - **pipeline**: walk sources and files, feeding extraction or profiling
//!
//! ## Quick Start
//!
//! ```rust
//! use smelter::adapter::{parse_reader, AdapterOptions};
//! use smelter::extract::{DocumentContext, RowExtractor};
//! use smelter::schema::load_str;
//!
//! # fn main() -> anyhow::Result<()> {
//! let (schema, _sources) = load_str(r#"{
//!     "database": "library",
//!     "tables": [{"name": "books", "for_each": ".//book", "columns": [
//!         {"name": "pos", "type": "INT", "tag": "FOREACH_INDEX"},
//!         {"name": "title", "type": "TEXT", "tag": "title"},
//!         {"name": "isbn", "type": "TEXT", "tag": "id[@isbn]"}
//!     ]}]
//! }"#)?;
//!
//! let xml = r#"<shelf><book><title>Dune</title><id isbn="441"/></book></shelf>"#;
//! let document = parse_reader(xml.as_bytes(), &AdapterOptions::default())?;
//!
//! let context = DocumentContext { doc_id: 1, filename: "shelf.xml", tag_case: document.tag_case };
//! let rows = RowExtractor::new(&schema).extract(&document.root, &context);
//!
//! assert_eq!(rows[0].get("title").map(|v| v.as_sql()), Some("\"Dune\""));
//! assert_eq!(rows[0].get("isbn").map(|v| v.as_sql()), Some("\"441\""));
//! # Ok(())
//! # }
//! ```

use std::io::Write;
use std::path::Path;

pub mod adapter;
pub mod document;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod profile;
pub mod schema;
pub mod sink;

// Re-export commonly used types for convenience
pub use adapter::{AdapterOptions, SourceMode};
pub use document::{Document, Element, TagCase};
pub use error::{Error, Result};
pub use extract::{Row, RowExtractor, SqlValue};
pub use pipeline::{Pipeline, RunReport, Source, WriteMode};
pub use profile::{PathProfiler, PathStat};
pub use schema::Schema;
pub use sink::{RowCollector, Sink, SqlScriptSink};

/// Main entry point: ingest every source of a schema file as a SQL script.
pub fn ingest_to_script<W: Write>(
    schema_path: &Path,
    writer: W,
    mode: WriteMode,
    high_water_mark: u64,
) -> Result<RunReport> {
    let (schema, sources) = schema::load(schema_path)?;
    let mut sink = SqlScriptSink::new(writer).with_high_water_mark(high_water_mark);
    Pipeline::new(&schema, &sources).ingest(&mut sink, mode)
}
