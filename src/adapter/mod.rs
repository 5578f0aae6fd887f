//! Input adapters: turn a source file into a [`Document`] tree.
//!
//! Three modes are supported:
//!
//! - **markup**: XML-like input through a recovering tokenizer. Tag case is
//!   preserved and namespaces are resolved to Clark notation.
//! - **lenient**: anything tag-shaped through an HTML5 tree builder. Tags
//!   and attribute names come back lower-cased.
//! - **json**: line-delimited JSON, converted to markup in batches and then
//!   parsed as one tree under the synthetic corpus roots.
//!
//! With `fake_root` set, the whole file is wrapped in a synthetic root
//! element before parsing so that files holding several top-level records
//! (or none) still produce a single tree.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::document::{Document, TagCase};
use crate::error::{Error, Result};

mod html;
mod json;
mod markup;

/// Tag of the synthetic root wrapped around whole files.
pub const FAKE_ROOT_TAG: &str = "UniversalIngesterFakeRoot";

/// Tag of the element holding every converted JSON batch.
pub const DOCS_ROOT_TAG: &str = "UniversalIngesterDocs";

/// Default number of JSON lines converted per batch.
pub const DEFAULT_BATCH_SIZE: usize = 300;

/// Why a source could not be turned into a tree.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("no element found")]
    NoElement,

    #[error("invalid JSON in batch starting at line {line}: {message}")]
    Json { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How a source file is parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    #[default]
    Markup,
    Lenient,
    Json,
}

impl SourceMode {
    /// Tag case of trees produced in this mode.
    pub fn tag_case(self) -> TagCase {
        match self {
            SourceMode::Lenient => TagCase::Folded,
            SourceMode::Markup | SourceMode::Json => TagCase::Preserve,
        }
    }
}

/// Per-source parsing options.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    pub mode: SourceMode,
    pub fake_root: bool,
    pub batch_size: usize,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            mode: SourceMode::Markup,
            fake_root: false,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl AdapterOptions {
    pub fn new(mode: SourceMode) -> Self {
        Self { mode, ..Self::default() }
    }

    pub fn with_fake_root(mut self, fake_root: bool) -> Self {
        self.fake_root = fake_root;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Parse everything `reader` yields into a single document.
pub fn parse_reader<R: BufRead>(mut reader: R, options: &AdapterOptions) -> std::result::Result<Document, ParseError> {
    let tag_case = options.mode.tag_case();

    if options.mode == SourceMode::Json {
        let root = json::parse_json_lines(reader, options.batch_size)?;
        return Ok(Document::new(root, tag_case));
    }

    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    let text = String::from_utf8_lossy(&bytes);
    let text = text.strip_prefix('\u{feff}').unwrap_or(&*text);

    let root = match options.mode {
        // Lenient mode adds its synthetic root after tree building
        SourceMode::Lenient => html::parse_lenient(text, options.fake_root)?,
        _ if options.fake_root => markup::parse_markup(&wrap_in_fake_root(text))?,
        _ => markup::parse_markup(text)?,
    };
    Ok(Document::new(root, tag_case))
}

/// Open and parse one file. Any failure is reported as malformed input for
/// that file.
pub fn parse_file(path: &Path, options: &AdapterOptions) -> Result<Document> {
    let malformed = |source: ParseError| Error::MalformedInput {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|e| malformed(e.into()))?;
    let document = parse_reader(BufReader::new(file), options).map_err(malformed)?;
    debug!(path = %path.display(), root = %document.root.tag, "parsed source file");
    Ok(document)
}

/// Drop a leading `<?xml ...?>` declaration and wrap the rest in the
/// synthetic root.
fn wrap_in_fake_root(text: &str) -> String {
    let body = text.trim_start();
    let body = match body.strip_prefix("<?xml") {
        Some(rest) => rest.find("?>").map_or(body, |end| &rest[end + 2..]),
        None => body,
    };
    format!("<{FAKE_ROOT_TAG}>{body}</{FAKE_ROOT_TAG}>")
}
