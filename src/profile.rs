//! Corpus path profiling
//!
//! Counts how often every structural path occurs per document across a
//! corpus, to help write a schema for an unfamiliar source. A path is the
//! `/`-joined tags from the document root down to an element; below
//! `min_attribute_level` an element's attributes are folded into its step as
//! `tag[name='value',...]`, so differently attributed siblings are counted
//! apart.

use std::collections::BTreeMap;
use std::io::{self, Write};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::info;

use crate::document::Element;

static NAMESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{.*?\}").expect("valid regex"));
static HTTP_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"'http:/.*?'").expect("valid regex"));

/// Documents between progress log lines.
const PROGRESS_INTERVAL: u64 = 1000;

/// Occurrence statistics of one structural path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStat {
    /// Occurrences across all documents folded so far.
    pub total_count: u64,
    /// Occurrences in the document being observed.
    pub cur_count: u64,
    /// Fewest occurrences in any one document.
    pub min_count: u64,
    /// Most occurrences in any one document.
    pub max_count: u64,
    /// Longest direct text, in characters.
    pub max_text_length: usize,
}

impl Default for PathStat {
    fn default() -> Self {
        PathStat {
            total_count: 0,
            cur_count: 0,
            min_count: u64::MAX,
            max_count: 0,
            max_text_length: 0,
        }
    }
}

impl PathStat {
    fn fold(&mut self) {
        self.total_count += self.cur_count;
        self.max_count = self.max_count.max(self.cur_count);
        self.min_count = self.min_count.min(self.cur_count);
    }
}

#[derive(Debug, Clone)]
pub struct PathProfiler {
    stats: BTreeMap<String, PathStat>,
    min_attribute_level: usize,
    documents: u64,
}

impl Default for PathProfiler {
    fn default() -> Self {
        Self::new()
    }
}

impl PathProfiler {
    pub fn new() -> Self {
        PathProfiler {
            stats: BTreeMap::new(),
            min_attribute_level: 1,
            documents: 0,
        }
    }

    /// Attributes are part of a path step only at this depth or deeper.
    /// The document root is level 0.
    pub fn with_min_attribute_level(mut self, level: usize) -> Self {
        self.min_attribute_level = level;
        self
    }

    /// Count every element under `root` as one document.
    pub fn observe_document(&mut self, root: &Element) {
        // Paths unseen in this document still count as zero for min
        for stat in self.stats.values_mut() {
            stat.cur_count = 0;
        }

        let mut steps: Vec<String> = Vec::new();
        let mut stack = vec![(root, 0usize)];
        while let Some((element, level)) = stack.pop() {
            // Keep the ancestors' steps only
            steps.truncate(level);
            steps.push(self.step(element, level));

            let stat = self.stats.entry(steps.join("/")).or_default();
            stat.cur_count += 1;
            stat.max_text_length = stat.max_text_length.max(element.text_len());

            stack.extend(element.children.iter().rev().map(|child| (child, level + 1)));
        }

        for stat in self.stats.values_mut() {
            stat.fold();
        }

        self.documents += 1;
        if self.documents % PROGRESS_INTERVAL == 0 {
            info!(documents = self.documents, paths = self.stats.len(), "profiling progress");
        }
    }

    /// Observe each root as its own document.
    pub fn observe<'a>(&mut self, roots: impl IntoIterator<Item = &'a Element>) {
        for root in roots {
            self.observe_document(root);
        }
    }

    fn step(&self, element: &Element, level: usize) -> String {
        if level < self.min_attribute_level || element.attributes.is_empty() {
            return element.tag.clone();
        }
        let pairs: Vec<String> = element
            .attributes
            .iter()
            .map(|(name, value)| format!("{name}='{value}'"))
            .collect();
        format!("{}[{}]", element.tag, pairs.join(","))
    }

    pub fn get(&self, path: &str) -> Option<&PathStat> {
        self.stats.get(path)
    }

    /// All paths with their statistics, sorted by path.
    pub fn stats(&self) -> impl Iterator<Item = (&str, &PathStat)> {
        self.stats.iter().map(|(path, stat)| (path.as_str(), stat))
    }

    pub fn documents(&self) -> u64 {
        self.documents
    }

    /// One `path: min=N, max=N, total=N, maxTextLength=N` line per path.
    pub fn write_report<W: Write>(&self, out: &mut W, abbreviate: bool) -> io::Result<()> {
        for (path, stat) in &self.stats {
            let shown = if abbreviate { abbreviate_path(path) } else { path.clone() };
            writeln!(
                out,
                "{shown}: min={}, max={:2}, total={}, maxTextLength={}",
                stat.min_count, stat.max_count, stat.total_count, stat.max_text_length
            )?;
        }
        Ok(())
    }
}

/// Elide namespace qualifiers and `http:` attribute values.
pub fn abbreviate_path(path: &str) -> String {
    let path = NAMESPACE.replace_all(path, "{...}");
    HTTP_VALUE.replace_all(&path, "'http:/...'").into_owned()
}
