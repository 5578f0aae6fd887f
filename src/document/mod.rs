//! Normalized document tree
//!
//! Every adapter produces the same shape regardless of the source format: an
//! [`Element`] carrying a tag, ordered attributes, direct text, children and
//! tail text.
//!
//! ## Text vs Tail
//!
//! ```text
//! <p>Hello <b>world</b>!</p>
//! ```
//!
//! `p.text` is `"Hello "`, `b.text` is `"world"` and `b.tail` is `"!"`: tail
//! text follows an element's closing tag but still belongs to its parent.

use std::borrow::Cow;

pub mod dump;
pub mod path;
pub mod serialize;

pub use path::{CasedPath, ElementPath};

/// Whether tag names in a tree kept their source case.
///
/// Lenient markup parsing lower-cases every tag and attribute name, so lookups
/// against such a tree must fold the names they search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagCase {
    #[default]
    Preserve,
    Folded,
}

impl TagCase {
    /// Apply this case mode to a tag or attribute name.
    pub fn apply(self, name: &str) -> Cow<'_, str> {
        match self {
            TagCase::Preserve => Cow::Borrowed(name),
            TagCase::Folded => Cow::Owned(name.to_lowercase()),
        }
    }
}

/// One element of a document tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Tag name; namespaced tags use Clark notation `{uri}local`.
    pub tag: String,

    /// Attributes in document order.
    pub attributes: Vec<(String, String)>,

    /// Text before the first child.
    pub text: Option<String>,

    pub children: Vec<Element>,

    /// Text after this element's end tag, inside the parent.
    pub tail: Option<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Element {
            tag: tag.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_tail(mut self, tail: impl Into<String>) -> Self {
        self.tail = Some(tail.into());
        self
    }

    /// Value of the named attribute, if present.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Length of the direct text in characters.
    pub fn text_len(&self) -> usize {
        self.text.as_deref().map_or(0, |t| t.chars().count())
    }

    /// Pre-order traversal of this element and all its descendants.
    pub fn iter(&self) -> Descendants<'_> {
        Descendants {
            stack: vec![(0, self)],
        }
    }

    /// Append character data at the current end of this element's content:
    /// to the last child's tail if there is one, otherwise to the direct text.
    pub(crate) fn append_text(&mut self, data: &str) {
        let slot = match self.children.last_mut() {
            Some(last) => &mut last.tail,
            None => &mut self.text,
        };
        match slot {
            Some(existing) => existing.push_str(data),
            None => *slot = Some(data.to_string()),
        }
    }
}

/// Iterator returned by [`Element::iter`].
///
/// Uses an explicit stack so arbitrarily deep trees cannot exhaust the call
/// stack. [`Descendants::with_depth`] exposes the depth relative to the
/// starting element.
pub struct Descendants<'a> {
    stack: Vec<(usize, &'a Element)>,
}

impl<'a> Descendants<'a> {
    pub fn with_depth(self) -> DepthDescendants<'a> {
        DepthDescendants { inner: self }
    }

    fn next_entry(&mut self) -> Option<(usize, &'a Element)> {
        let (depth, element) = self.stack.pop()?;
        for child in element.children.iter().rev() {
            self.stack.push((depth + 1, child));
        }
        Some((depth, element))
    }
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().map(|(_, element)| element)
    }
}

/// Pre-order traversal yielding `(depth, element)` pairs.
pub struct DepthDescendants<'a> {
    inner: Descendants<'a>,
}

impl<'a> Iterator for DepthDescendants<'a> {
    type Item = (usize, &'a Element);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next_entry()
    }
}

/// A parsed source file: the tree root plus the case mode it was built under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub root: Element,
    pub tag_case: TagCase,
}

impl Document {
    pub fn new(root: Element, tag_case: TagCase) -> Self {
        Document { root, tag_case }
    }
}
