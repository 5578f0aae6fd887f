//! Lenient markup through an HTML5 parser.
//!
//! For sources that are not well-formed XML at all. The HTML tree builder
//! repairs anything, lower-casing tag and attribute names on the way, and the
//! result is converted into the same [`Element`] shape the markup parser
//! produces.
//!
//! A source that spells out `<html>`, `<head>` or `<body>` is a page and keeps
//! its whole `html` tree. Anything else is tag soup: the tree builder's
//! implied page shell is dropped and the elements it wrapped become the
//! top-level elements.

use memchr::memchr_iter;
use scraper::{ElementRef, Html, Node};

use super::{ParseError, FAKE_ROOT_TAG};
use crate::document::Element;

const PAGE_TAGS: [&[u8]; 3] = [b"html", b"head", b"body"];

enum Child<'a> {
    Element(ElementRef<'a>),
    Text(&'a str),
}

/// Parse `input` leniently. Without `fake_root` the first top-level element
/// is the root; with it, every top-level element and text run is gathered
/// under a synthetic root.
pub(crate) fn parse_lenient(input: &str, fake_root: bool) -> Result<Element, ParseError> {
    let page = Html::parse_document(input);
    let html = page.root_element();

    let top_level = if declares_page(input) {
        vec![Child::Element(html)]
    } else {
        // Implied shell: lift out whatever head and body collected
        html.children()
            .filter_map(ElementRef::wrap)
            .flat_map(children_of)
            .collect()
    };

    if !fake_root {
        return top_level
            .into_iter()
            .find_map(|child| match child {
                Child::Element(element) => Some(convert(element)),
                Child::Text(_) => None,
            })
            .ok_or(ParseError::NoElement);
    }

    let mut root = Element::new(FAKE_ROOT_TAG.to_ascii_lowercase());
    for child in top_level {
        match child {
            Child::Text(text) => {
                if !text.trim().is_empty() {
                    root.append_text(text);
                }
            }
            Child::Element(element) => root.children.push(convert(element)),
        }
    }
    Ok(root)
}

/// Whether any start tag in `input` names one of the page-structure elements.
fn declares_page(input: &str) -> bool {
    let bytes = input.as_bytes();
    memchr_iter(b'<', bytes).any(|at| {
        let name = &bytes[at + 1..];
        PAGE_TAGS.iter().any(|tag| {
            name.len() >= tag.len()
                && name[..tag.len()].eq_ignore_ascii_case(tag)
                && name
                    .get(tag.len())
                    .map_or(true, |b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/')
        })
    })
}

fn children_of(element: ElementRef<'_>) -> Vec<Child<'_>> {
    element
        .children()
        .filter_map(|node| match node.value() {
            Node::Text(text) => Some(Child::Text(&**text)),
            Node::Element(_) => ElementRef::wrap(node).map(Child::Element),
            _ => None,
        })
        .collect()
}

fn shallow_copy(element: ElementRef<'_>) -> Element {
    let value = element.value();
    let mut copy = Element::new(value.name());
    for (name, attr) in value.attrs() {
        copy.attributes.push((name.to_string(), attr.to_string()));
    }
    copy
}

/// Convert a scraper subtree with an explicit stack of pending children.
fn convert(root: ElementRef<'_>) -> Element {
    let mut stack = vec![(shallow_copy(root), children_of(root).into_iter())];

    loop {
        let Some((_, pending)) = stack.last_mut() else {
            break;
        };

        match pending.next() {
            Some(Child::Text(text)) => {
                if !text.trim().is_empty() {
                    if let Some((current, _)) = stack.last_mut() {
                        current.append_text(text);
                    }
                }
            }
            Some(Child::Element(child)) => {
                stack.push((shallow_copy(child), children_of(child).into_iter()));
            }
            None => {
                let Some((finished, _)) = stack.pop() else {
                    break;
                };
                match stack.last_mut() {
                    Some((parent, _)) => parent.children.push(finished),
                    None => return finished,
                }
            }
        }
    }

    Element::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_lowercased() {
        let root = parse_lenient("<Record ID=\"9\"><Title>Hi</Title></Record>", false).unwrap();
        assert_eq!(root.tag, "record");
        assert_eq!(root.attribute("id"), Some("9"));
        assert_eq!(root.children[0].tag, "title");
        assert_eq!(root.children[0].text.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_unclosed_tags_are_repaired() {
        let root = parse_lenient("<div><p>one<p>two</div>", false).unwrap();
        assert_eq!(root.tag, "div");
        let texts: Vec<_> = root.children.iter().map(|c| c.text.as_deref()).collect();
        assert_eq!(texts, vec![Some("one"), Some("two")]);
    }

    #[test]
    fn test_mixed_content_keeps_tails() {
        let root = parse_lenient("<p>Hello <b>world</b>!</p>", false).unwrap();
        assert_eq!(root.text.as_deref(), Some("Hello "));
        assert_eq!(root.children[0].tail.as_deref(), Some("!"));
    }

    #[test]
    fn test_entities_are_decoded() {
        let root = parse_lenient("<span>caf&eacute; &amp; bar</span>", false).unwrap();
        assert_eq!(root.text.as_deref(), Some("café & bar"));
    }

    #[test]
    fn test_text_only_input_has_no_element() {
        assert!(matches!(parse_lenient("plain words", false), Err(ParseError::NoElement)));
    }

    #[test]
    fn test_full_page_keeps_head_and_body() {
        let root = parse_lenient(
            "<!DOCTYPE html><HTML><head><title>T</title></head><body><div><p>payload</p></div></body></HTML>",
            false,
        )
        .unwrap();
        assert_eq!(root.tag, "html");
        let tags: Vec<_> = root.children.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(tags, vec!["head", "body"]);
        assert_eq!(root.children[0].children[0].text.as_deref(), Some("T"));

        let p = root.iter().find(|e| e.tag == "p").unwrap();
        assert_eq!(p.text.as_deref(), Some("payload"));
    }

    #[test]
    fn test_fragment_starting_with_title_keeps_following_elements() {
        let root = parse_lenient("<title>T</title><div><p>payload</p></div>", true).unwrap();
        assert_eq!(root.tag, "universalingesterfakeroot");
        let tags: Vec<_> = root.children.iter().map(|c| c.tag.as_str()).collect();
        assert_eq!(tags, vec!["title", "div"]);
    }

    #[test]
    fn test_fake_root_gathers_siblings_and_text() {
        let root = parse_lenient("<rec>1</rec> between <rec>2</rec>", true).unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[0].tail.as_deref(), Some(" between "));
        assert_eq!(root.children[1].text.as_deref(), Some("2"));
    }

    #[test]
    fn test_fake_root_around_full_page() {
        let root = parse_lenient("<html><body><p>x</p></body></html>", true).unwrap();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].tag, "html");
    }

    #[test]
    fn test_page_detection_needs_a_whole_tag_name() {
        assert!(declares_page("<Body class=\"x\">"));
        assert!(declares_page("<head/>"));
        assert!(!declares_page("<header>x</header><bodytext/>"));
    }
}
