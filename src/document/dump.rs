//! Diagnostic tree dumps: positional path listings and indented outlines.

use std::collections::HashMap;
use std::io::{self, Write};

use super::Element;

/// Positional path of every element under `root`, lxml style:
/// `/root/child[2]/leaf`, where the index appears only when the parent has
/// several children with the same tag. Returned as `(level, path)` in
/// document order.
pub fn positional_paths(root: &Element) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut stack = vec![(0usize, format!("/{}", root.tag), root)];

    while let Some((level, path, element)) = stack.pop() {
        let children: Vec<_> = child_steps(element)
            .into_iter()
            .zip(&element.children)
            .map(|(step, child)| (level + 1, format!("{path}/{step}"), child))
            .collect();
        out.push((level, path));
        stack.extend(children.into_iter().rev());
    }

    out
}

/// Positional path of `target` within `root`, if it belongs to that tree.
pub fn path_of(root: &Element, target: &Element) -> Option<String> {
    let mut stack = vec![(format!("/{}", root.tag), root)];

    while let Some((path, element)) = stack.pop() {
        if std::ptr::eq(element, target) {
            return Some(path);
        }
        for (step, child) in child_steps(element).into_iter().zip(&element.children).rev() {
            stack.push((format!("{path}/{step}"), child));
        }
    }

    None
}

/// One path step per child of `parent`, in child order.
fn child_steps(parent: &Element) -> Vec<String> {
    let mut totals: HashMap<&str, usize> = HashMap::new();
    for child in &parent.children {
        *totals.entry(child.tag.as_str()).or_default() += 1;
    }

    // Running position per tag, only shown for repeated tags
    let mut seen: HashMap<&str, usize> = HashMap::with_capacity(totals.len());
    parent
        .children
        .iter()
        .map(|child| {
            let tag = child.tag.as_str();
            if totals.get(tag).copied().unwrap_or(0) > 1 {
                let position = seen.entry(tag).or_default();
                *position += 1;
                format!("{tag}[{position}]")
            } else {
                child.tag.clone()
            }
        })
        .collect()
}

/// Write `level path` lines for every element under `root`.
pub fn write_paths<W: Write>(root: &Element, out: &mut W) -> io::Result<()> {
    for (level, path) in positional_paths(root) {
        writeln!(out, "{level:2} {path}")?;
    }
    Ok(())
}

/// Write an indented outline of `root`: one line per element with its
/// attributes, optionally its text, and a `TAIL = "..."` line for tails.
pub fn write_outline<W: Write>(root: &Element, show_text: bool, out: &mut W) -> io::Result<()> {
    writeln!(out, "--------------------------------------")?;
    for (level, element) in root.iter().with_depth() {
        write!(out, "{level:2}{}{}", "  ".repeat(level), element.tag)?;

        if !element.attributes.is_empty() {
            let pairs: Vec<String> = element
                .attributes
                .iter()
                .map(|(k, v)| format!("({k:?}, {v:?})"))
                .collect();
            write!(out, " [{}]", pairs.join(", "))?;
        }

        match (&element.text, show_text) {
            (Some(text), true) => writeln!(out, "         {text}")?,
            _ => writeln!(out)?,
        }

        if let Some(tail) = &element.tail {
            writeln!(out, "TAIL = \"{tail}\"")?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> Element {
        Element::new("root")
            .with_child(Element::new("a").with_text("one"))
            .with_child(
                Element::new("a")
                    .with_attribute("id", "2")
                    .with_child(Element::new("b").with_tail("after")),
            )
            .with_child(Element::new("c"))
    }

    #[test]
    fn test_positional_paths() {
        let paths = positional_paths(&tree());
        assert_eq!(
            paths,
            vec![
                (0, "/root".to_string()),
                (1, "/root/a[1]".to_string()),
                (1, "/root/a[2]".to_string()),
                (2, "/root/a[2]/b".to_string()),
                (1, "/root/c".to_string()),
            ]
        );
    }

    #[test]
    fn test_wide_parent_numbers_each_tag_separately() {
        let mut root = Element::new("list");
        for i in 0..2000 {
            root = root.with_child(Element::new(if i % 2 == 0 { "rec" } else { "note" }));
        }
        root = root.with_child(Element::new("end"));

        let paths = positional_paths(&root);
        assert_eq!(paths.len(), 2002);
        assert_eq!(paths[1].1, "/list/rec[1]");
        assert_eq!(paths[2].1, "/list/note[1]");
        assert_eq!(paths[1999].1, "/list/rec[1000]");
        assert_eq!(paths[2000].1, "/list/note[1000]");
        assert_eq!(paths[2001].1, "/list/end");
    }

    #[test]
    fn test_path_of_finds_target() {
        let root = tree();
        let b = &root.children[1].children[0];
        assert_eq!(path_of(&root, b).as_deref(), Some("/root/a[2]/b"));

        let stranger = Element::new("b");
        assert_eq!(path_of(&root, &stranger), None);
    }

    #[test]
    fn test_outline_with_text() {
        let mut buf = Vec::new();
        write_outline(&tree(), true, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert!(text.contains(" 1  a         one\n"));
        assert!(text.contains(" 1  a [(\"id\", \"2\")]\n"));
        assert!(text.contains(" 2    b\nTAIL = \"after\"\n"));
    }

    #[test]
    fn test_outline_without_text() {
        let mut buf = Vec::new();
        write_outline(&tree(), false, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(!text.contains("one"));
    }
}
