//! Recovering markup parser
//!
//! Builds an [`Element`] tree from XML-like markup without ever giving up on
//! a document that contains at least one element:
//!
//! - unknown entities and a `&` without `;` are kept literally
//! - a `<` that does not start a tag is text
//! - an end tag closes up to the nearest open element with that name; an end
//!   tag with no open match is ignored
//! - elements still open at end of input are closed
//! - content after the root element is closed is ignored
//!
//! Comments, processing instructions and declarations are skipped.
//! Whitespace-only text is dropped. Namespace prefixes are resolved to Clark
//! notation and `xmlns` declarations are not kept as attributes.

use std::borrow::Cow;

use memchr::memchr;

use super::ParseError;
use crate::document::Element;

const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// Parse `input` into a tree, failing only when it holds no element at all.
pub(crate) fn parse_markup(input: &str) -> Result<Element, ParseError> {
    let mut scanner = Scanner { input, pos: 0 };
    let mut builder = TreeBuilder::default();

    while !builder.is_complete() {
        let Some(token) = scanner.next_token() else {
            break;
        };
        match token {
            Token::Text(raw) => builder.text(&decode_entities(raw)),
            Token::CData(raw) => builder.text(raw),
            Token::Start {
                name,
                attributes,
                self_closing,
            } => builder.open(name, attributes, self_closing),
            Token::End(name) => builder.close(name),
        }
    }

    builder.finish()
}

enum Token<'a> {
    Text(&'a str),
    CData(&'a str),
    Start {
        name: &'a str,
        attributes: Vec<(&'a str, Cow<'a, str>)>,
        self_closing: bool,
    },
    End(&'a str),
}

struct Scanner<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn next_token(&mut self) -> Option<Token<'a>> {
        loop {
            let rest = &self.input[self.pos..];
            if rest.is_empty() {
                return None;
            }

            // Character data runs to the next `<`
            if !rest.starts_with('<') {
                let end = memchr(b'<', rest.as_bytes()).unwrap_or(rest.len());
                self.pos += end;
                return Some(Token::Text(&rest[..end]));
            }

            if rest.starts_with("<!--") {
                self.skip_past(4, "-->");
                continue;
            }

            if let Some(body) = rest.strip_prefix("<![CDATA[") {
                return Some(match body.find("]]>") {
                    Some(end) => {
                        self.pos += 9 + end + 3;
                        Token::CData(&body[..end])
                    }
                    None => {
                        self.pos = self.input.len();
                        Token::CData(body)
                    }
                });
            }

            if rest.starts_with("<?") {
                self.skip_past(2, "?>");
                continue;
            }

            if rest.starts_with("<!") {
                self.skip_declaration();
                continue;
            }

            if let Some(body) = rest.strip_prefix("</") {
                let (inner, consumed) = match memchr(b'>', body.as_bytes()) {
                    Some(end) => (&body[..end], 2 + end + 1),
                    None => (body, rest.len()),
                };
                self.pos += consumed;
                let name = inner.split_whitespace().next().unwrap_or("");
                if name.is_empty() {
                    continue;
                }
                return Some(Token::End(name));
            }

            match rest[1..].chars().next() {
                Some(c) if c.is_alphabetic() || c == '_' || c == ':' => return Some(self.start_tag()),
                // Bare `<` is kept as text
                _ => {
                    self.pos += 1;
                    return Some(Token::Text("<"));
                }
            }
        }
    }

    fn skip_past(&mut self, offset: usize, terminator: &str) {
        let rest = &self.input[self.pos + offset..];
        self.pos = match rest.find(terminator) {
            Some(end) => self.pos + offset + end + terminator.len(),
            None => self.input.len(),
        };
    }

    /// Skip `<!DOCTYPE ...>` including any internal subset in brackets.
    fn skip_declaration(&mut self) {
        let bytes = self.input.as_bytes();
        let mut depth = 0usize;
        let mut quote: Option<u8> = None;
        let mut i = self.pos + 2;

        while i < bytes.len() {
            let b = bytes[i];
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None => match b {
                    b'"' | b'\'' => quote = Some(b),
                    b'[' => depth += 1,
                    b']' => depth = depth.saturating_sub(1),
                    b'>' if depth == 0 => {
                        self.pos = i + 1;
                        return;
                    }
                    _ => {}
                },
            }
            i += 1;
        }
        self.pos = bytes.len();
    }

    /// Parse a start tag at `self.pos`. Delimiters are ASCII, so every slice
    /// boundary below falls on a char boundary.
    fn start_tag(&mut self) -> Token<'a> {
        let input = self.input;
        let bytes = input.as_bytes();
        let len = bytes.len();

        let mut i = self.pos + 1;
        let name_start = i;
        while i < len && !is_tag_delimiter(bytes[i]) {
            i += 1;
        }
        let name = &input[name_start..i];

        let mut attributes: Vec<(&'a str, Cow<'a, str>)> = Vec::new();
        let mut self_closing = false;

        loop {
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i >= len {
                break;
            }
            match bytes[i] {
                b'>' => {
                    i += 1;
                    break;
                }
                b'/' => {
                    if bytes.get(i + 1) == Some(&b'>') {
                        self_closing = true;
                        i += 2;
                        break;
                    }
                    i += 1;
                }
                // A new tag starts before this one was closed
                b'<' => break,
                _ => {
                    let attr_start = i;
                    while i < len && !is_tag_delimiter(bytes[i]) && bytes[i] != b'=' {
                        i += 1;
                    }
                    let attr_name = &input[attr_start..i];
                    if attr_name.is_empty() {
                        i += 1;
                        continue;
                    }

                    while i < len && bytes[i].is_ascii_whitespace() {
                        i += 1;
                    }
                    let raw_value = if i < len && bytes[i] == b'=' {
                        i += 1;
                        while i < len && bytes[i].is_ascii_whitespace() {
                            i += 1;
                        }
                        if i < len && (bytes[i] == b'"' || bytes[i] == b'\'') {
                            let quote = bytes[i];
                            let value_start = i + 1;
                            match memchr(quote, &bytes[value_start..]) {
                                Some(end) => {
                                    i = value_start + end + 1;
                                    &input[value_start..value_start + end]
                                }
                                None => {
                                    i = len;
                                    &input[value_start..]
                                }
                            }
                        } else {
                            let value_start = i;
                            while i < len && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                                i += 1;
                            }
                            &input[value_start..i]
                        }
                    } else {
                        ""
                    };

                    if !attributes.iter().any(|(n, _)| *n == attr_name) {
                        attributes.push((attr_name, normalize_attribute(raw_value)));
                    }
                }
            }
        }

        self.pos = i;
        Token::Start {
            name,
            attributes,
            self_closing,
        }
    }
}

fn is_tag_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'/' || b == b'>' || b == b'<'
}

/// Decode entities and fold literal tabs and newlines to spaces, as XML
/// attribute-value normalization does.
fn normalize_attribute(raw: &str) -> Cow<'_, str> {
    let decoded = decode_entities(raw);
    if decoded.contains(['\t', '\n', '\r']) {
        Cow::Owned(decoded.replace(['\t', '\n', '\r'], " "))
    } else {
        decoded
    }
}

/// Decode the predefined entities and numeric character references.
///
/// Returns Borrowed when no `&` is present.
pub(crate) fn decode_entities(input: &str) -> Cow<'_, str> {
    if memchr(b'&', input.as_bytes()).is_none() {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(amp) = memchr(b'&', rest.as_bytes()) {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];

        let decoded = rest[1..]
            .find(';')
            .filter(|&semi| semi > 0 && semi <= 32)
            .and_then(|semi| decode_entity(&rest[1..1 + semi]).map(|c| (c, semi + 2)));

        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);

    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else if let Some(dec) = name.strip_prefix('#') {
                dec.parse::<u32>().ok()?
            } else {
                return None;
            };
            char::from_u32(code).filter(|&c| c != '\0')
        }
    }
}

struct OpenElement {
    raw_name: String,
    element: Element,
    /// `(prefix, uri)` declared on this element; prefix "" is the default namespace.
    namespaces: Vec<(String, String)>,
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<OpenElement>,
    root: Option<Element>,
}

impl TreeBuilder {
    fn is_complete(&self) -> bool {
        self.root.is_some() && self.stack.is_empty()
    }

    fn open(&mut self, name: &str, attributes: Vec<(&str, Cow<'_, str>)>, self_closing: bool) {
        let mut namespaces = Vec::new();
        let mut plain = Vec::with_capacity(attributes.len());
        for (key, value) in attributes {
            // Namespace declarations are scoped to this element, not kept as attributes
            if key == "xmlns" {
                namespaces.push((String::new(), value.into_owned()));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                namespaces.push((prefix.to_string(), value.into_owned()));
            } else {
                plain.push((key, value));
            }
        }

        let mut element = Element::new(self.resolve(name, &namespaces, true));
        for (key, value) in plain {
            let key = self.resolve(key, &namespaces, false);
            // First occurrence of a duplicated attribute wins
            if element.attribute(&key).is_none() {
                element.attributes.push((key, value.into_owned()));
            }
        }

        if self_closing {
            self.attach(element);
        } else {
            self.stack.push(OpenElement {
                raw_name: name.to_string(),
                element,
                namespaces,
            });
        }
    }

    fn close(&mut self, name: &str) {
        // Stray end tag: nothing open by that name
        let Some(index) = self.stack.iter().rposition(|open| open.raw_name == name) else {
            return;
        };
        // Implicitly close anything left open inside it
        while self.stack.len() > index {
            if let Some(open) = self.stack.pop() {
                self.attach(open.element);
            }
        }
    }

    fn text(&mut self, data: &str) {
        if data.trim().is_empty() {
            return;
        }
        if let Some(open) = self.stack.last_mut() {
            open.element.append_text(data);
        }
    }

    fn attach(&mut self, element: Element) {
        match self.stack.last_mut() {
            Some(parent) => parent.element.children.push(element),
            // Later top-level elements are dropped
            None => {
                if self.root.is_none() {
                    self.root = Some(element);
                }
            }
        }
    }

    fn finish(mut self) -> Result<Element, ParseError> {
        // Truncated input: close whatever is still open
        while let Some(open) = self.stack.pop() {
            self.attach(open.element);
        }
        self.root.ok_or(ParseError::NoElement)
    }

    /// Resolve a prefixed or (for tags) default-namespaced name to Clark
    /// notation. Unbound prefixes leave the name untouched.
    fn resolve(&self, name: &str, declared: &[(String, String)], use_default: bool) -> String {
        let (prefix, local) = match name.split_once(':') {
            Some((p, l)) if !p.is_empty() && !l.is_empty() => (p, l),
            _ => ("", name),
        };
        if prefix.is_empty() && !use_default {
            return name.to_string();
        }
        if prefix == "xml" {
            return format!("{{{XML_NAMESPACE}}}{local}");
        }

        let uri = declared
            .iter()
            .rev()
            .chain(self.stack.iter().rev().flat_map(|open| open.namespaces.iter().rev()))
            .find(|(p, _)| p == prefix)
            .map(|(_, uri)| uri.as_str());

        match uri {
            Some(uri) if !uri.is_empty() => format!("{{{uri}}}{local}"),
            _ => name.to_string(),
        }
    }
}
