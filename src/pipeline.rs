//! Source iteration shared by ingestion and profiling.
//!
//! Sources are visited in schema order and their files in expansion order.
//! A file that cannot be parsed is logged and skipped; sink failures stop
//! the run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::adapter::{self, AdapterOptions};
use crate::document::{CasedPath, Document, Element};
use crate::error::{Error, Result};
use crate::extract::{DocumentContext, RowExtractor};
use crate::profile::PathProfiler;
use crate::schema::Schema;
use crate::sink::Sink;

/// A group of input files parsed with the same options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    /// Glob patterns; a pattern without wildcards names a single file.
    pub patterns: Vec<String>,
    /// Files listing one input path per line.
    pub file_lists: Vec<PathBuf>,
    pub options: AdapterOptions,
}

impl Source {
    pub fn new(patterns: Vec<String>, options: AdapterOptions) -> Self {
        Source {
            patterns,
            file_lists: Vec::new(),
            options,
        }
    }

    pub fn with_file_lists(mut self, file_lists: Vec<PathBuf>) -> Self {
        self.file_lists = file_lists;
        self
    }

    /// Check every pattern compiles.
    pub fn validate(&self) -> Result<()> {
        for pattern in &self.patterns {
            glob::Pattern::new(pattern).map_err(|e| Error::config(format!("bad file pattern `{pattern}`: {e}")))?;
        }
        Ok(())
    }

    /// Expand patterns, then file lists, into concrete paths. Unreadable
    /// list files are logged and skipped.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for pattern in &self.patterns {
            if !pattern.contains(['*', '?', '[']) {
                files.push(PathBuf::from(pattern));
                continue;
            }
            let paths =
                glob::glob(pattern).map_err(|e| Error::config(format!("bad file pattern `{pattern}`: {e}")))?;
            for entry in paths {
                match entry {
                    Ok(path) => files.push(path),
                    Err(e) => warn!("Skipping unreadable match of {}: {}", pattern, e),
                }
            }
        }

        for list in &self.file_lists {
            match fs::read_to_string(list) {
                Ok(text) => files.extend(
                    text.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with('#'))
                        .map(PathBuf::from),
                ),
                Err(e) => warn!("Skipping file list {}: {}", list.display(), e),
            }
        }

        Ok(files)
    }
}

/// Whether ingestion starts a fresh database or adds to an existing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteMode {
    #[default]
    Create,
    Append,
}

/// Hands out document ids by pre-increment from a starting mark.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocIdAllocator {
    last: u64,
}

impl DocIdAllocator {
    /// The first id handed out is `high_water_mark + 1`.
    pub fn starting_after(high_water_mark: u64) -> Self {
        DocIdAllocator { last: high_water_mark }
    }

    pub fn next_id(&mut self) -> u64 {
        self.last += 1;
        self.last
    }

    pub fn last(&self) -> u64 {
        self.last
    }
}

/// Counters for one pass over the sources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub files: usize,
    pub skipped_files: Vec<PathBuf>,
    pub documents: u64,
    pub rows: u64,
    /// Id of the first document of this run, if any was ingested.
    pub first_doc_id: Option<u64>,
}

/// Document roots of `document`: every match of `doc_root` evaluated from
/// the tree root, or the tree root itself.
pub fn document_roots<'d>(document: &'d Document, doc_root: Option<&CasedPath>) -> Vec<&'d Element> {
    match doc_root {
        Some(path) => path.for_case(document.tag_case).find_all(&document.root),
        None => vec![&document.root],
    }
}

pub struct Pipeline<'a> {
    schema: &'a Schema,
    sources: &'a [Source],
}

impl<'a> Pipeline<'a> {
    pub fn new(schema: &'a Schema, sources: &'a [Source]) -> Self {
        Pipeline { schema, sources }
    }

    /// Parse every file and hand its document roots to `visit`. Errors from
    /// `visit` abort the pass; parse failures only skip the file.
    pub fn for_each_document<F>(&self, mut visit: F) -> Result<RunReport>
    where
        F: FnMut(&Path, &Document, &[&Element]) -> Result<()>,
    {
        let mut report = RunReport::default();

        for (index, source) in self.sources.iter().enumerate() {
            let files = source.files()?;
            info!(
                source = index,
                mode = ?source.options.mode,
                files = files.len(),
                "Processing source"
            );

            for path in files {
                report.files += 1;
                info!("Processing file: {}", path.display());

                let document = match adapter::parse_file(&path, &source.options) {
                    Ok(document) => document,
                    Err(e @ Error::MalformedInput { .. }) => {
                        warn!("Skipping file: {}", e);
                        report.skipped_files.push(path);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                let roots = document_roots(&document, self.schema.doc_root.as_ref());
                debug!(path = %path.display(), documents = roots.len(), "selected document roots");
                report.documents += roots.len() as u64;
                visit(&path, &document, &roots)?;
            }
        }

        Ok(report)
    }

    /// Extract rows from every document into `sink`.
    pub fn ingest<S: Sink + ?Sized>(&self, sink: &mut S, mode: WriteMode) -> Result<RunReport> {
        let mut ids = match mode {
            WriteMode::Create => {
                sink.define(self.schema)?;
                DocIdAllocator::default()
            }
            WriteMode::Append => {
                sink.attach(self.schema)?;
                DocIdAllocator::starting_after(sink.high_water_mark(self.schema)?)
            }
        };
        info!(database = %self.schema.database, ?mode, next_doc_id = ids.last() + 1, "Starting ingestion");

        let extractor = RowExtractor::new(self.schema);
        let mut rows = 0u64;
        let mut first_doc_id = None;

        let mut report = self.for_each_document(|path, document, roots| {
            let filename = path.display().to_string();
            for root in roots {
                let doc_id = ids.next_id();
                first_doc_id.get_or_insert(doc_id);
                let context = DocumentContext {
                    doc_id,
                    filename: &filename,
                    tag_case: document.tag_case,
                };
                for row in extractor.extract(root, &context) {
                    sink.insert(&row)?;
                    rows += 1;
                }
            }
            Ok(())
        })?;
        sink.flush()?;

        report.rows = rows;
        report.first_doc_id = first_doc_id;
        info!(
            files = report.files,
            skipped = report.skipped_files.len(),
            documents = report.documents,
            rows = report.rows,
            "Ingestion complete"
        );
        Ok(report)
    }

    /// Feed every document root to `profiler`.
    pub fn profile(&self, profiler: &mut PathProfiler) -> Result<RunReport> {
        let report = self.for_each_document(|_, _, roots| {
            profiler.observe(roots.iter().copied());
            Ok(())
        })?;
        info!(documents = profiler.documents(), "Profiling complete");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::SourceMode;
    use crate::schema::{Column, ColumnSource, Table};
    use crate::sink::RowCollector;
    use std::io::Write as _;

    fn write(dir: &Path, name: &str, contents: &str) -> String {
        let path = dir.join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.display().to_string()
    }

    fn schema() -> Schema {
        Schema::new(
            "corpus",
            vec![Table::new("docs")
                .with_column(Column::new("id", "INT", ColumnSource::DocId).with_flags("AUTO_INCREMENT PRIMARY KEY"))
                .with_column(Column::new("title", "TEXT", ColumnSource::parse(Some("title")).unwrap()))],
        )
        .unwrap()
        .with_doc_root(".//rec")
        .unwrap()
    }

    #[test]
    fn test_doc_id_allocator() {
        let mut fresh = DocIdAllocator::default();
        assert_eq!(fresh.next_id(), 1);
        assert_eq!(fresh.next_id(), 2);

        let mut resumed = DocIdAllocator::starting_after(42);
        assert_eq!(resumed.next_id(), 43);
    }

    #[test]
    fn test_ingest_fresh_run() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(
            dir.path(),
            "a.xml",
            "<set><rec><title>One</title></rec><rec><title>Two</title></rec></set>",
        );
        let schema = schema();
        let sources = vec![Source::new(vec![file], AdapterOptions::default())];

        let mut sink = RowCollector::new();
        let report = Pipeline::new(&schema, &sources).ingest(&mut sink, WriteMode::Create).unwrap();

        assert_eq!(sink.defined, vec!["docs".to_string()]);
        assert_eq!(report.documents, 2);
        assert_eq!(report.rows, 2);
        assert_eq!(report.first_doc_id, Some(1));
        let ids: Vec<_> = sink.rows.iter().map(|r| r.values[0].as_sql().to_string()).collect();
        assert_eq!(ids, vec!["\"1\"", "\"2\""]);
    }

    #[test]
    fn test_append_continues_after_high_water_mark() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "a.xml", "<rec><title>Next</title></rec>");
        let schema = schema();
        let sources = vec![Source::new(vec![file], AdapterOptions::default())];

        let mut sink = RowCollector::new().with_high_water_mark(42);
        let report = Pipeline::new(&schema, &sources).ingest(&mut sink, WriteMode::Append).unwrap();

        assert!(sink.defined.is_empty());
        assert!(sink.attached);
        assert_eq!(report.first_doc_id, Some(43));
        assert_eq!(sink.rows[0].get("id").map(|v| v.as_sql()), Some("\"43\""));
    }

    #[test]
    fn test_malformed_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write(dir.path(), "bad.xml", "no elements at all");
        let missing = dir.path().join("missing.xml").display().to_string();
        let good = write(dir.path(), "good.xml", "<rec><title>Kept</title></rec>");
        let schema = schema();
        let sources = vec![Source::new(vec![bad, missing, good], AdapterOptions::default())];

        let mut sink = RowCollector::new();
        let report = Pipeline::new(&schema, &sources).ingest(&mut sink, WriteMode::Create).unwrap();

        assert_eq!(report.files, 3);
        assert_eq!(report.skipped_files.len(), 2);
        assert_eq!(sink.rows.len(), 1);
        assert_eq!(sink.rows[0].get("title").map(|v| v.as_sql()), Some("\"Kept\""));
    }

    #[test]
    fn test_json_source_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "feed.jsonl", "{\"a\":1}\n{\"a\":2}\n");
        let schema = Schema::new(
            "corpus",
            vec![Table::new("items")
                .with_for_each(".//item")
                .unwrap()
                .with_column(Column::new("a", "TEXT", ColumnSource::parse(Some("a")).unwrap()))],
        )
        .unwrap();
        let sources = vec![Source::new(
            vec![file],
            AdapterOptions::new(SourceMode::Json).with_batch_size(1),
        )];

        let mut sink = RowCollector::new();
        Pipeline::new(&schema, &sources).ingest(&mut sink, WriteMode::Create).unwrap();

        let values: Vec<_> = sink.rows.iter().map(|r| r.values[0].as_sql().to_string()).collect();
        assert_eq!(values, vec!["\"1\"", "\"2\""]);
    }

    #[test]
    fn test_glob_and_file_list_expansion() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "b.xml", "<rec/>");
        write(dir.path(), "a.xml", "<rec/>");
        write(dir.path(), "c.txt", "<rec/>");
        let list = write(dir.path(), "list.txt", "# inputs\n/data/one.xml\n\n/data/two.xml\n");

        let pattern = dir.path().join("*.xml").display().to_string();
        let source = Source::new(vec![pattern], AdapterOptions::default()).with_file_lists(vec![PathBuf::from(list)]);
        source.validate().unwrap();

        let names: Vec<_> = source
            .files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.xml", "b.xml", "one.xml", "two.xml"]);
    }

    #[test]
    fn test_bad_pattern_is_config_error() {
        let source = Source::new(vec!["data/[".to_string()], AdapterOptions::default());
        assert!(matches!(source.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_profile_counts_documents() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "a.xml", "<set><rec><title>x</title></rec><rec/></set>");
        let schema = schema();
        let sources = vec![Source::new(vec![file], AdapterOptions::default())];

        let mut profiler = PathProfiler::new();
        let report = Pipeline::new(&schema, &sources).profile(&mut profiler).unwrap();

        assert_eq!(report.documents, 2);
        let title = profiler.get("rec/title").unwrap();
        assert_eq!((title.min_count, title.max_count, title.total_count), (0, 1, 1));
    }

    #[test]
    fn test_document_roots_default_to_tree_root() {
        let document = Document::new(Element::new("only"), crate::document::TagCase::Preserve);
        let roots = document_roots(&document, None);
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].tag, "only");
    }
}
