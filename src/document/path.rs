//! Relative element paths
//!
//! A small ElementPath dialect used by `forEachTag`, document-root selectors
//! and column tags:
//!
//! - `tag`, `{uri}tag` and `*` select children
//! - `.` selects the context element itself
//! - an empty step (`a//b`, `.//b`) searches all descendants
//! - predicates: `[@attr]`, `[@attr='v']`, `[child]`, `[child='text']`, `[n]`
//!
//! Paths are compiled once when the schema is loaded and evaluated many times.

use std::collections::{HashMap, HashSet};
use std::fmt;

use super::{Element, TagCase};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    SelfNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Name(String),
}

impl NameTest {
    fn matches(&self, element: &Element) -> bool {
        match self {
            NameTest::Any => true,
            NameTest::Name(name) => element.tag == *name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    HasAttribute(String),
    AttributeEquals(String, String),
    HasChild(String),
    ChildTextEquals(String, String),
    Position(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

/// A compiled relative path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementPath {
    source: String,
    steps: Vec<Step>,
}

impl ElementPath {
    /// Compile `expr`, folding tag and attribute names when `case` is
    /// [`TagCase::Folded`]. Predicate literals keep their case.
    pub fn compile(expr: &str, case: TagCase) -> Result<Self> {
        let expr = expr.trim();
        if expr.is_empty() {
            return Err(Error::config("empty element path"));
        }
        if expr.starts_with('/') {
            return Err(Error::config(format!(
                "absolute element path `{expr}` is not supported; use `.//` to search descendants"
            )));
        }

        let segments = split_outside(expr, b'/');
        let mut steps = Vec::with_capacity(segments.len());
        let mut descend = false;

        for (index, segment) in segments.iter().enumerate() {
            // `//` leaves an empty segment behind
            if segment.is_empty() {
                if descend || index == 0 || index == segments.len() - 1 {
                    return Err(Error::config(format!("malformed element path `{expr}`")));
                }
                descend = true;
                continue;
            }

            let axis = if descend { Axis::Descendant } else { Axis::Child };
            descend = false;

            if *segment == "." || segment.starts_with(".[") {
                if axis == Axis::Descendant {
                    return Err(Error::config(format!("malformed element path `{expr}`")));
                }
                steps.push(parse_step(segment, Axis::SelfNode, case, expr)?);
                continue;
            }

            steps.push(parse_step(segment, axis, case, expr)?);
        }

        Ok(ElementPath {
            source: expr.to_string(),
            steps,
        })
    }

    /// The expression this path was compiled from.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// All matching elements below (or at) `context`, in document order.
    pub fn find_all<'a>(&self, context: &'a Element) -> Vec<&'a Element> {
        let mut current = vec![context];
        let mut order: Option<HashMap<*const Element, usize>> = None;

        for step in &self.steps {
            let mut next = Vec::new();
            let mut seen = HashSet::new();

            for &node in &current {
                match step.axis {
                    Axis::SelfNode => {
                        if step.accepts_self(node) && seen.insert(node as *const Element) {
                            next.push(node);
                        }
                    }
                    Axis::Child => {
                        for found in step.select_children(node) {
                            if seen.insert(found as *const Element) {
                                next.push(found);
                            }
                        }
                    }
                    Axis::Descendant => {
                        // `[n]` counts among each anchor's own children
                        for anchor in node.iter() {
                            for found in step.select_children(anchor) {
                                if seen.insert(found as *const Element) {
                                    next.push(found);
                                }
                            }
                        }
                    }
                }
            }

            if next.is_empty() {
                return next;
            }

            // Anchors may nest; put matches back in document order
            let interleaved = step.axis == Axis::Descendant || current.len() > 1;
            if interleaved && next.len() > 1 {
                let order = order.get_or_insert_with(|| preorder_index(context));
                next.sort_by_key(|e| order.get(&(*e as *const Element)).copied().unwrap_or(usize::MAX));
            }
            current = next;
        }

        current
    }

    /// First matching element, if any.
    pub fn find<'a>(&self, context: &'a Element) -> Option<&'a Element> {
        self.find_all(context).into_iter().next()
    }
}

impl fmt::Display for ElementPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Step {
    fn accepts_self(&self, element: &Element) -> bool {
        self.predicates
            .iter()
            .all(|p| !matches!(p, Predicate::Position(n) if *n != 1) && p.holds(element))
    }

    /// Children of `parent` that pass the name test and every predicate.
    /// Position predicates count among the survivors of the preceding filters.
    fn select_children<'a>(&self, parent: &'a Element) -> Vec<&'a Element> {
        let mut selected: Vec<&'a Element> = parent
            .children
            .iter()
            .filter(|child| self.test.matches(child))
            .collect();

        for predicate in &self.predicates {
            selected = match predicate {
                Predicate::Position(n) => selected.get(n - 1).copied().into_iter().collect(),
                other => selected.into_iter().filter(|e| other.holds(e)).collect(),
            };
        }
        selected
    }
}

impl Predicate {
    fn holds(&self, element: &Element) -> bool {
        match self {
            Predicate::HasAttribute(name) => element.attribute(name).is_some(),
            Predicate::AttributeEquals(name, value) => element.attribute(name) == Some(value.as_str()),
            Predicate::HasChild(tag) => element.children.iter().any(|c| c.tag == *tag),
            Predicate::ChildTextEquals(tag, text) => element
                .children
                .iter()
                .any(|c| c.tag == *tag && c.text.as_deref().unwrap_or("") == text),
            Predicate::Position(_) => true,
        }
    }
}

/// Pre-order position of every element under `root`.
fn preorder_index(root: &Element) -> HashMap<*const Element, usize> {
    root.iter()
        .enumerate()
        .map(|(index, element)| (element as *const Element, index))
        .collect()
}

fn parse_step(segment: &str, axis: Axis, case: TagCase, expr: &str) -> Result<Step> {
    let malformed = || Error::config(format!("malformed element path `{expr}`"));

    let name_end = find_outside(segment, b'[').unwrap_or(segment.len());
    let name = &segment[..name_end];
    let local = name.rsplit_once('}').map_or(name, |(_, local)| local);
    if name.is_empty() || local.contains([']', '=', '\'', '"', '@']) || local.contains(char::is_whitespace) {
        return Err(malformed());
    }

    let test = if name == "*" || (name == "." && axis == Axis::SelfNode) {
        NameTest::Any
    } else {
        NameTest::Name(case.apply(name).into_owned())
    };

    let mut predicates = Vec::new();
    let mut rest = &segment[name_end..];
    while !rest.is_empty() {
        if !rest.starts_with('[') {
            return Err(malformed());
        }
        let close = closing_bracket(rest).ok_or_else(malformed)?;
        predicates.push(parse_predicate(&rest[1..close], case).ok_or_else(malformed)?);
        rest = &rest[close + 1..];
    }

    Ok(Step { axis, test, predicates })
}

fn parse_predicate(body: &str, case: TagCase) -> Option<Predicate> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }

    if body.bytes().all(|b| b.is_ascii_digit()) {
        let position: usize = body.parse().ok()?;
        return (position >= 1).then_some(Predicate::Position(position));
    }

    let (lhs, literal) = match find_outside(body, b'=') {
        Some(eq) => (body[..eq].trim(), Some(unquote(body[eq + 1..].trim())?)),
        None => (body, None),
    };

    if let Some(attribute) = lhs.strip_prefix('@') {
        let attribute = attribute.trim();
        if attribute.is_empty() {
            return None;
        }
        let attribute = case.apply(attribute).into_owned();
        Some(match literal {
            Some(value) => Predicate::AttributeEquals(attribute, value.to_string()),
            None => Predicate::HasAttribute(attribute),
        })
    } else {
        let tag = case.apply(lhs).into_owned();
        Some(match literal {
            Some(text) => Predicate::ChildTextEquals(tag, text.to_string()),
            None => Predicate::HasChild(tag),
        })
    }
}

fn unquote(literal: &str) -> Option<&str> {
    let bytes = literal.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'\'' || bytes[0] == b'"') && bytes[bytes.len() - 1] == bytes[0] {
        Some(&literal[1..literal.len() - 1])
    } else {
        None
    }
}

/// Position of `needle` outside of `{...}`, `[...]` and quoted literals.
fn find_outside(s: &str, needle: u8) -> Option<usize> {
    let mut braces = 0usize;
    let mut brackets = 0usize;
    let mut quote: Option<u8> = None;

    for (i, &b) in s.as_bytes().iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        if b == needle && braces == 0 && brackets == 0 {
            return Some(i);
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'{' => braces += 1,
            b'}' => braces = braces.saturating_sub(1),
            b'[' => brackets += 1,
            b']' => brackets = brackets.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// Index of the `]` closing the predicate that `s` starts with.
fn closing_bracket(s: &str) -> Option<usize> {
    find_outside(&s[1..], b']').map(|i| i + 1)
}

/// Split on `sep` outside of `{...}`, `[...]` and quoted literals.
fn split_outside(s: &str, sep: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(i) = find_outside(rest, sep) {
        parts.push(&rest[..i]);
        rest = &rest[i + 1..];
    }
    parts.push(rest);
    parts
}

/// A path compiled for both tag-case modes, so lookups never re-fold names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasedPath {
    exact: ElementPath,
    folded: ElementPath,
}

impl CasedPath {
    pub fn compile(expr: &str) -> Result<Self> {
        Ok(CasedPath {
            exact: ElementPath::compile(expr, TagCase::Preserve)?,
            folded: ElementPath::compile(expr, TagCase::Folded)?,
        })
    }

    pub fn for_case(&self, case: TagCase) -> &ElementPath {
        match case {
            TagCase::Preserve => &self.exact,
            TagCase::Folded => &self.folded,
        }
    }

    pub fn as_str(&self) -> &str {
        self.exact.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Element {
        Element::new("set")
            .with_child(
                Element::new("doc")
                    .with_attribute("lang", "en")
                    .with_child(Element::new("title").with_text("First"))
                    .with_child(
                        Element::new("authors")
                            .with_child(Element::new("author").with_text("Ada"))
                            .with_child(Element::new("author").with_text("Brian")),
                    ),
            )
            .with_child(
                Element::new("doc")
                    .with_attribute("lang", "fr")
                    .with_child(Element::new("title").with_text("Second"))
                    .with_child(Element::new("authors").with_child(Element::new("author").with_text("Chloé"))),
            )
    }

    fn texts(found: Vec<&Element>) -> Vec<&str> {
        found.iter().map(|e| e.text.as_deref().unwrap_or("")).collect()
    }

    fn path(expr: &str) -> ElementPath {
        ElementPath::compile(expr, TagCase::Preserve).unwrap()
    }

    #[test]
    fn test_child_steps() {
        let root = corpus();
        assert_eq!(texts(path("doc/title").find_all(&root)), vec!["First", "Second"]);
        assert_eq!(path("doc/authors/author").find_all(&root).len(), 3);
        assert!(path("title").find(&root).is_none());
    }

    #[test]
    fn test_descendant_search() {
        let root = corpus();
        assert_eq!(texts(path(".//author").find_all(&root)), vec!["Ada", "Brian", "Chloé"]);
        assert_eq!(texts(path("doc//author").find_all(&root)), vec!["Ada", "Brian", "Chloé"]);
    }

    fn nested_sections() -> Element {
        Element::new("doc")
            .with_child(
                Element::new("sec")
                    .with_child(Element::new("h").with_text("A"))
                    .with_child(Element::new("sec").with_child(Element::new("h").with_text("B")))
                    .with_child(Element::new("h").with_text("A2")),
            )
            .with_child(Element::new("sec").with_child(Element::new("h").with_text("C")))
    }

    #[test]
    fn test_nested_matches_in_document_order() {
        let root = nested_sections();
        let headings = |expr: &str| -> Vec<String> {
            path(expr)
                .find_all(&root)
                .iter()
                .map(|sec| sec.children[0].text.clone().unwrap_or_default())
                .collect()
        };
        assert_eq!(headings(".//sec"), vec!["A", "B", "C"]);
        assert_eq!(texts(path(".//sec/h").find_all(&root)), vec!["A", "B", "A2", "C"]);
        assert_eq!(texts(path(".//h").find_all(&root)), vec!["A", "B", "A2", "C"]);
        assert_eq!(texts(path(".//sec//h").find_all(&root)), vec!["A", "B", "A2", "C"]);
        assert_eq!(texts(path(".//h[2]").find_all(&root)), vec!["A2"]);
    }

    #[test]
    fn test_self_step() {
        let root = corpus();
        let found = path(".").find_all(&root);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].tag, "set");

        let doc = &root.children[0];
        assert_eq!(path(".[@lang='en']").find_all(doc).len(), 1);
        assert!(path(".[@never]").find(doc).is_none());
    }

    #[test]
    fn test_attribute_predicates() {
        let root = corpus();
        assert_eq!(path("doc[@lang]").find_all(&root).len(), 2);
        assert_eq!(texts(path("doc[@lang='fr']/title").find_all(&root)), vec!["Second"]);
        assert!(path("doc[@missing]").find(&root).is_none());
    }

    #[test]
    fn test_child_predicates_and_position() {
        let root = corpus();
        assert_eq!(texts(path("doc[title='Second']/title").find_all(&root)), vec!["Second"]);
        assert_eq!(path("doc[authors]").find_all(&root).len(), 2);
        assert_eq!(texts(path(".//author[2]").find_all(&root)), vec!["Brian"]);
        assert_eq!(texts(path("doc[2]/title").find_all(&root)), vec!["Second"]);
    }

    #[test]
    fn test_wildcard() {
        let root = corpus();
        assert_eq!(path("doc/*").find_all(&root).len(), 4);
    }

    #[test]
    fn test_namespaced_tags_keep_slashes_inside_braces() {
        let root = Element::new("{http://www.loc.gov/MARC21/slim}collection")
            .with_child(Element::new("{http://www.loc.gov/MARC21/slim}record").with_text("r"));
        let p = path("{http://www.loc.gov/MARC21/slim}record");
        assert_eq!(texts(p.find_all(&root)), vec!["r"]);
    }

    #[test]
    fn test_folded_compile_lowercases_names_only() {
        let root = Element::new("html").with_child(
            Element::new("item").with_attribute("kind", "Big").with_text("x"),
        );
        let p = ElementPath::compile("Item[@Kind='Big']", TagCase::Folded).unwrap();
        assert_eq!(texts(p.find_all(&root)), vec!["x"]);

        let exact = ElementPath::compile("Item", TagCase::Preserve).unwrap();
        assert!(exact.find(&root).is_none());
    }

    #[test]
    fn test_cased_path_selects_variant() {
        let p = CasedPath::compile("ArticleTitle").unwrap();
        let tree = Element::new("r").with_child(Element::new("articletitle"));
        assert!(p.for_case(TagCase::Preserve).find(&tree).is_none());
        assert!(p.for_case(TagCase::Folded).find(&tree).is_some());
        assert_eq!(p.as_str(), "ArticleTitle");
    }

    #[test]
    fn test_malformed_paths_are_config_errors() {
        for bad in ["", "/abs", "a/", "a///b", "a[", "a[@]", "a[0]", "a[@x=unquoted]", "a]b"] {
            assert!(
                matches!(ElementPath::compile(bad, TagCase::Preserve), Err(Error::Config(_))),
                "expected error for {bad:?}"
            );
        }
    }
}
