//! Line-delimited JSON to markup
//!
//! A two-stage transform that keeps at most one batch of JSON values in
//! memory:
//!
//! 1. lines are grouped into batches; each batch is turned into a JSON array
//!    literal, parsed, and rendered as a markup fragment
//!    `<root><item>...</item>...</root>`
//! 2. all fragments are wrapped in the synthetic corpus roots and parsed once
//!    by the recovering markup parser
//!
//! A batch only ends where no JSON value is open, so records spanning several
//! lines are never split. Separators are inserted at line boundaries between
//! two top-level values; values sharing a line must already be separated by
//! commas.

use std::io::BufRead;

use serde_json::Value;
use tracing::debug;

use super::{markup, ParseError, DOCS_ROOT_TAG, FAKE_ROOT_TAG};
use crate::document::serialize::escape_into;
use crate::document::Element;

/// Convert a whole JSON source into one tree.
pub(crate) fn parse_json_lines<R: BufRead>(reader: R, batch_size: usize) -> Result<Element, ParseError> {
    let markup = json_lines_to_markup(reader, batch_size)?;
    markup::parse_markup(&markup)
}

/// Stage one: every batch rendered as a fragment, wrapped in the corpus roots.
pub(crate) fn json_lines_to_markup<R: BufRead>(mut reader: R, batch_size: usize) -> Result<String, ParseError> {
    let batch_size = batch_size.max(1);
    let mut out = format!("<{FAKE_ROOT_TAG}><{DOCS_ROOT_TAG}>");

    let mut batch = BatchBuilder::default();
    let mut line = String::new();
    let mut line_number = 0usize;
    let mut batches = 0usize;

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read > 0 {
            line_number += 1;
            batch.push_line(&line, line_number);
        }

        // Flush only between values, or whatever is left at EOF
        let at_eof = read == 0;
        if batch.is_ready(batch_size) || (at_eof && !batch.is_empty()) {
            let first_line = batch.first_line;
            let literal = batch.take_array_literal();
            if let Some(literal) = literal {
                let value = parse_batch(literal, first_line)?;
                out.push('\n');
                write_fragment(&mut out, &value);
                batches += 1;
            }
        }

        if at_eof {
            break;
        }
    }

    debug!(batches, lines = line_number, "converted JSON source to markup");
    out.push_str(&format!("</{DOCS_ROOT_TAG}></{FAKE_ROOT_TAG}>"));
    Ok(out)
}

fn parse_batch(literal: String, first_line: usize) -> Result<Value, ParseError> {
    let mut bytes = literal.into_bytes();
    simd_json::serde::from_slice::<Value>(&mut bytes).map_err(|e| ParseError::Json {
        line: first_line,
        message: e.to_string(),
    })
}

/// Accumulates lines and tracks JSON nesting across line boundaries.
#[derive(Default)]
struct BatchBuilder {
    body: String,
    lines: usize,
    first_line: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl BatchBuilder {
    fn push_line(&mut self, line: &str, line_number: usize) {
        let trimmed = line.trim();
        if self.lines == 0 {
            self.first_line = line_number;
        }
        self.lines += 1;
        if trimmed.is_empty() {
            return;
        }

        // A new top-level value on its own line needs a separator
        if self.at_top_level() && !trimmed.starts_with(',') {
            if let Some(last) = self.body.trim_end().chars().last() {
                if last != ',' {
                    self.body.push(',');
                }
            }
        }
        self.body.push_str(line);
        self.scan(line);
    }

    fn at_top_level(&self) -> bool {
        self.depth == 0 && !self.in_string
    }

    fn scan(&mut self, line: &str) {
        for b in line.bytes() {
            // Brackets inside string literals do not count
            if self.in_string {
                match (self.escaped, b) {
                    (true, _) => self.escaped = false,
                    (false, b'\\') => self.escaped = true,
                    (false, b'"') => self.in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => self.depth = self.depth.saturating_sub(1),
                _ => {}
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.lines == 0
    }

    fn is_ready(&self, batch_size: usize) -> bool {
        self.lines >= batch_size && self.at_top_level()
    }

    /// The batch as `[ v1,v2,... ]`, or `None` when it held only blank lines.
    fn take_array_literal(&mut self) -> Option<String> {
        let body = std::mem::take(&mut self.body);
        self.lines = 0;

        // Trailing commas would make the array literal invalid
        let body = body.trim_end_matches(|c: char| c == ',' || c.is_whitespace());
        if body.trim().is_empty() {
            return None;
        }
        Some(format!("[ {body} ]"))
    }
}

enum Work<'a> {
    /// Emit `value` under `tag`; arrays expand into repeated `tag` elements.
    Value(&'a str, &'a Value),
    /// Emit exactly one `tag` element, even when `value` is an array.
    Entry(&'a str, &'a Value),
    Close(String),
}

/// Render one parsed batch as `<root><item>...</item>...</root>`.
fn write_fragment(out: &mut String, batch: &Value) {
    out.push_str("<root>");
    let mut stack = vec![Work::Value("item", batch)];

    while let Some(work) = stack.pop() {
        match work {
            Work::Value(key, Value::Array(items)) => {
                for item in items.iter().rev() {
                    stack.push(Work::Entry(key, item));
                }
            }
            Work::Value(key, value) | Work::Entry(key, value) => {
                let tag = open_tag(out, key);
                match value {
                    Value::Object(fields) => {
                        // Close after every field has been rendered
                        stack.push(Work::Close(tag));
                        for (field, child) in fields.iter().rev() {
                            stack.push(Work::Value(field, child));
                        }
                    }
                    // Array directly inside an array: members become `item`s
                    Value::Array(_) => {
                        stack.push(Work::Close(tag));
                        stack.push(Work::Value("item", value));
                    }
                    scalar => {
                        write_scalar(out, scalar);
                        close_tag(out, &tag);
                    }
                }
            }
            Work::Close(tag) => close_tag(out, &tag),
        }
    }

    out.push_str("</root>");
}

fn write_scalar(out: &mut String, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => escape_into(out, s, false),
        Value::Array(_) | Value::Object(_) => {}
    }
}

/// Open an element for `key` and return the tag to close it with. Digit-only
/// keys are prefixed with `n`, spaces become underscores, and keys that are
/// still not usable as tag names become `<key name="...">`.
fn open_tag(out: &mut String, key: &str) -> String {
    let tag = tag_for_key(key);
    out.push('<');
    out.push_str(&tag);
    if tag == "key" && key != "key" {
        out.push_str(" name=\"");
        escape_into(out, key, true);
        out.push('"');
    }
    out.push('>');
    tag
}

fn tag_for_key(key: &str) -> String {
    if !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit()) {
        return format!("n{key}");
    }
    if is_valid_tag(key) {
        return key.to_string();
    }
    let underscored = key.replace(' ', "_");
    if is_valid_tag(&underscored) {
        return underscored;
    }
    "key".to_string()
}

fn close_tag(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn is_valid_tag(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    if name.len() >= 3 && name.as_bytes()[..3].eq_ignore_ascii_case(b"xml") {
        return false;
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
