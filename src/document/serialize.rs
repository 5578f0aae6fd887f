//! Markup serialization of a subtree.
//!
//! Clark-notation tags are written back with an `xmlns` declaration wherever
//! the default namespace changes; namespaced attributes get generated
//! `ns0`, `ns1`, ... prefixes declared on the element that uses them.

use super::Element;

enum Work<'a> {
    Open(&'a Element, Option<&'a str>),
    Close(&'a Element),
    Tail(&'a Element),
}

/// Serialize `element` and its whole subtree, excluding its own tail.
pub fn to_markup(element: &Element) -> String {
    let mut out = String::new();
    let mut stack = vec![Work::Open(element, None)];

    while let Some(work) = stack.pop() {
        match work {
            Work::Open(el, inherited) => {
                let (namespace, local) = split_clark(&el.tag);
                out.push('<');
                out.push_str(local);
                if namespace != inherited {
                    out.push_str(" xmlns=\"");
                    escape_into(&mut out, namespace.unwrap_or(""), true);
                    out.push('"');
                }
                let mut generated = 0usize;
                for (name, value) in &el.attributes {
                    out.push(' ');
                    match split_clark(name) {
                        (Some(uri), local) => {
                            out.push_str(&format!("xmlns:ns{generated}=\""));
                            escape_into(&mut out, uri, true);
                            out.push_str(&format!("\" ns{generated}:{local}"));
                            generated += 1;
                        }
                        (None, local) => out.push_str(local),
                    }
                    out.push_str("=\"");
                    escape_into(&mut out, value, true);
                    out.push('"');
                }

                if el.children.is_empty() && el.text.is_none() {
                    out.push_str("/>");
                    continue;
                }

                out.push('>');
                if let Some(text) = &el.text {
                    escape_into(&mut out, text, false);
                }
                stack.push(Work::Close(el));
                for child in el.children.iter().rev() {
                    stack.push(Work::Tail(child));
                    stack.push(Work::Open(child, namespace));
                }
            }
            Work::Close(el) => {
                out.push_str("</");
                out.push_str(split_clark(&el.tag).1);
                out.push('>');
            }
            Work::Tail(el) => {
                if let Some(tail) = &el.tail {
                    escape_into(&mut out, tail, false);
                }
            }
        }
    }

    out
}

/// Split `{uri}local` into its namespace and local name.
fn split_clark(name: &str) -> (Option<&str>, &str) {
    if let Some(rest) = name.strip_prefix('{') {
        if let Some((uri, local)) = rest.split_once('}') {
            return (Some(uri), local);
        }
    }
    (None, name)
}

pub(crate) fn escape_into(out: &mut String, text: &str, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
