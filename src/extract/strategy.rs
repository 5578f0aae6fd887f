//! Extraction strategies applied to a matched element.

use std::borrow::Cow;

use crate::document::serialize::to_markup;
use crate::document::Element;
use crate::schema::Extraction;

impl Extraction {
    /// Raw (uncleaned) value of `element` under this strategy.
    pub fn apply<'e>(&self, element: &'e Element) -> Option<Cow<'e, str>> {
        match self {
            Extraction::Text => element.text.as_deref().map(Cow::Borrowed),
            Extraction::NoChildren => Some(text_without_children(element)),
            Extraction::Recurse => Some(Cow::Owned(to_markup(element))),
            Extraction::RecurseNoTags => Some(Cow::Owned(text_fragments(element).join(" "))),
        }
    }
}

fn text_without_children(element: &Element) -> Cow<'_, str> {
    let tails = element.children.iter().filter_map(|c| c.tail.as_deref());
    match (&element.text, element.children.iter().any(|c| c.tail.is_some())) {
        (Some(text), false) => Cow::Borrowed(text.as_str()),
        (text, _) => {
            let mut out = text.clone().unwrap_or_default();
            tails.for_each(|t| out.push_str(t));
            Cow::Owned(out)
        }
    }
}

enum Fragment<'a> {
    Element(&'a Element),
    Tail(&'a str),
}

/// Text and tail fragments of the subtree in document order. The root's own
/// tail is not part of it.
fn text_fragments(root: &Element) -> Vec<&str> {
    let mut out = Vec::new();
    let mut stack = vec![Fragment::Element(root)];

    while let Some(fragment) = stack.pop() {
        match fragment {
            Fragment::Element(element) => {
                if let Some(text) = &element.text {
                    out.push(text.as_str());
                }
                for child in element.children.iter().rev() {
                    if let Some(tail) = &child.tail {
                        stack.push(Fragment::Tail(tail));
                    }
                    stack.push(Fragment::Element(child));
                }
            }
            Fragment::Tail(tail) => out.push(tail),
        }
    }

    out
}
