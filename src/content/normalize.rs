//! Text normalization and removal of foreign (non-HTML) component tags.

use super::dom::{Element, Node};

/// Upper bound on cleanup passes. Each pass unwraps one nesting level of
/// foreign wrappers, so deeper nesting than this is left as-is.
pub const MAX_CLEANUP_PASSES: usize = 10;

/// Wrappers whose tag is removed and whose content is kept.
const UNWRAP: &[&str] = &["view", "text", "image", "activityindicator"];

/// Wrappers removed together with everything inside them.
const DROP_WITH_CONTENT: &[&str] = &[
    "scrollview",
    "touchableopacity",
    "touchablehighlight",
    "safeareaview",
    "script",
    "style",
    "noscript",
    "template",
];

fn is_artifact(ch: char) -> bool {
    matches!(ch, '\u{200B}'..='\u{200D}' | '\u{FEFF}' | '\u{00A0}')
}

/// Replace zero-width and non-breaking space artifacts with spaces, collapse
/// whitespace runs, and trim.
pub fn normalize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() || is_artifact(ch) {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

/// Normalize code while keeping its line structure: artifacts become spaces,
/// trailing whitespace is trimmed per line, blank edge lines are dropped.
/// Indentation is kept.
pub fn normalize_code(text: &str) -> String {
    let cleaned: String = text
        .replace("\r\n", "\n")
        .chars()
        .map(|c| if is_artifact(c) || c == '\t' { ' ' } else { c })
        .collect();
    let lines: Vec<&str> = cleaned.lines().map(str::trim_end).collect();
    let start = lines.iter().position(|l| !l.is_empty());
    let end = lines.iter().rposition(|l| !l.is_empty());
    match (start, end) {
        (Some(s), Some(e)) => lines[s..=e].join("\n"),
        _ => String::new(),
    }
}

/// Remove foreign component wrappers until the tree stops changing or
/// [`MAX_CLEANUP_PASSES`] is reached.
pub fn strip_foreign(mut nodes: Vec<Node>) -> Vec<Node> {
    for _ in 0..MAX_CLEANUP_PASSES {
        let (next, changed) = strip_pass(nodes);
        nodes = next;
        if !changed {
            break;
        }
    }
    nodes
}

fn strip_pass(nodes: Vec<Node>) -> (Vec<Node>, bool) {
    let mut out = Vec::with_capacity(nodes.len());
    let mut changed = false;
    for node in nodes {
        match node {
            Node::Element(e) if DROP_WITH_CONTENT.contains(&e.name.as_str()) => {
                changed = true;
            }
            Node::Element(e) if UNWRAP.contains(&e.name.as_str()) => {
                changed = true;
                // One level per pass; nested wrappers go in later passes.
                out.extend(e.children);
            }
            Node::Element(e) => {
                let Element {
                    name,
                    attrs,
                    children,
                } = e;
                let (children, inner_changed) = strip_pass(children);
                changed |= inner_changed;
                out.push(Node::Element(Element {
                    name,
                    attrs,
                    children,
                }));
            }
            text => out.push(text),
        }
    }
    (out, changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::dom::parse_fragment;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  Hello \n\t  world  "), "Hello world");
    }

    #[test]
    fn test_normalize_removes_artifacts() {
        assert_eq!(normalize_text("a\u{200B}b\u{00A0}c\u{FEFF}"), "a b c");
        assert_eq!(normalize_text("\u{200D}\u{00A0} "), "");
    }

    #[test]
    fn test_normalize_code_keeps_indentation() {
        let code = "\n\n  fn a() {\n      b();\u{00A0}\n  }\n\n";
        assert_eq!(normalize_code(code), "  fn a() {\n      b();\n  }");
    }

    #[test]
    fn test_unwrap_view_and_text() {
        let nodes = strip_foreign(parse_fragment("<View><Text><p>Hi</p></Text></View>"));
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            Node::Element(e) => assert_eq!(e.name, "p"),
            _ => panic!("expected p"),
        }
    }

    #[test]
    fn test_drop_scroll_view_with_content() {
        let nodes = strip_foreign(parse_fragment(
            "<ScrollView><p>hidden</p></ScrollView><p>shown</p><script>x()</script>",
        ));
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_nested_wrappers_inside_html() {
        let nodes = strip_foreign(parse_fragment(
            "<div><View><View><TouchableOpacity>x</TouchableOpacity>kept</View></View></div>",
        ));
        match &nodes[0] {
            Node::Element(div) => assert_eq!(div.text_content(), "kept"),
            _ => panic!("expected div"),
        }
    }
}
