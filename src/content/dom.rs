//! # Tolerant Markup Tree
//!
//! Builds a small element tree from article markup with `quick-xml`, which is
//! an XML reader, so HTML leniency is layered on top: void elements never take
//! children, end tags close the nearest matching open element (unmatched ones
//! are ignored), a new block opens implicitly close an open `<p>`, and named
//! HTML entities are resolved through [`html_entity`]. Unclosed elements are
//! closed at end of input. A `<` that cannot open a tag and a `&` that cannot
//! start an entity are read as text. A reader error stops parsing and keeps
//! whatever was built up to that point.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// A node in the markup tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    /// Lowercased tag name.
    pub name: String,
    /// Attributes with lowercased keys, in source order.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Elements whose start implicitly closes an open `<p>`.
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "figure", "footer", "form", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "hr", "ol", "p", "pre", "section", "table", "ul",
];

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attr("class").unwrap_or("").split_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c.eq_ignore_ascii_case(class))
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }

    /// Concatenated descendant text. `<br>` contributes a space.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out, true);
        out
    }

    /// Descendant text with `<br>` as a newline, for whitespace-preserving
    /// content such as code.
    pub fn raw_text(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out, false);
        out
    }

    /// Direct element children.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// All descendant elements in document order.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        collect_descendants(&self.children, &mut out);
        out
    }

    pub fn find_all(&self, names: &[&str]) -> Vec<&Element> {
        self.descendants()
            .into_iter()
            .filter(|e| names.contains(&e.name.as_str()))
            .collect()
    }

    pub fn find_first<F>(&self, pred: F) -> Option<&Element>
    where
        F: Fn(&Element) -> bool,
    {
        self.descendants().into_iter().find(|e| pred(e))
    }

    pub fn contains_any(&self, names: &[&str]) -> bool {
        self.descendants()
            .iter()
            .any(|e| names.contains(&e.name.as_str()))
    }

    /// Markup of the children, re-serialized.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            write_markup(child, &mut out);
        }
        out
    }

    pub fn has_element_children(&self) -> bool {
        self.child_elements().next().is_some()
    }
}

fn collect_text(nodes: &[Node], out: &mut String, br_as_space: bool) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if e.name == "br" => out.push(if br_as_space { ' ' } else { '\n' }),
            Node::Element(e) => {
                collect_text(&e.children, out, br_as_space);
                // Block boundaries inside inline text must not glue words.
                if br_as_space && is_block_name(&e.name) {
                    out.push(' ');
                }
            }
        }
    }
}

fn is_block_name(name: &str) -> bool {
    CLOSES_PARAGRAPH.contains(&name) || matches!(name, "li" | "tr" | "td" | "th" | "figcaption")
}

fn collect_descendants<'a>(nodes: &'a [Node], out: &mut Vec<&'a Element>) {
    for node in nodes {
        if let Node::Element(e) = node {
            out.push(e);
            collect_descendants(&e.children, out);
        }
    }
}

fn write_markup(node: &Node, out: &mut String) {
    match node {
        Node::Text(t) => out.push_str(&escape_text(t)),
        Node::Element(e) => {
            out.push('<');
            out.push_str(&e.name);
            for (k, v) in &e.attrs {
                out.push_str(&format!(" {}=\"{}\"", k, escape_text(v).replace('"', "&quot;")));
            }
            if e.is_void() {
                out.push_str(" />");
                return;
            }
            out.push('>');
            for child in &e.children {
                write_markup(child, out);
            }
            out.push_str(&format!("</{}>", e.name));
        }
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Resolve the named HTML entities that show up in article markup.
/// XML's predefined entities and numeric references are handled by quick-xml.
pub fn html_entity(name: &str) -> Option<&'static str> {
    Some(match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => "\u{00A0}",
        "shy" => "\u{00AD}",
        "ndash" => "\u{2013}",
        "mdash" => "\u{2014}",
        "hellip" => "\u{2026}",
        "laquo" => "\u{00AB}",
        "raquo" => "\u{00BB}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201C}",
        "rdquo" => "\u{201D}",
        "bdquo" => "\u{201E}",
        "bull" => "\u{2022}",
        "middot" => "\u{00B7}",
        "copy" => "\u{00A9}",
        "reg" => "\u{00AE}",
        "trade" => "\u{2122}",
        "deg" => "\u{00B0}",
        "times" => "\u{00D7}",
        "euro" => "\u{20AC}",
        "rarr" => "\u{2192}",
        "larr" => "\u{2190}",
        "zwnj" => "\u{200C}",
        "zwj" => "\u{200D}",
        _ => return None,
    })
}

fn unescape(raw: &str) -> String {
    match quick_xml::escape::unescape_with(raw, html_entity) {
        Ok(s) => s.into_owned(),
        // A bare '&' or unknown entity is kept as written.
        Err(_) => raw.to_string(),
    }
}

fn element_from_start(e: &BytesStart) -> Element {
    let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
    let mut element = Element::new(&name);
    for attr in e.html_attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_lowercase();
        let value = unescape(&String::from_utf8_lossy(&attr.value));
        element.attrs.push((key, value));
    }
    element
}

fn starts_entity(rest: &str) -> bool {
    let name = rest.strip_prefix('#').unwrap_or(rest);
    let len = name.bytes().take_while(u8::is_ascii_alphanumeric).count();
    len > 0 && name.as_bytes().get(len) == Some(&b';')
}

/// Escape `<` and `&` characters that can only be literal text.
fn escape_stray(markup: &str) -> Cow<'_, str> {
    let bytes = markup.as_bytes();
    let stray = |i: usize| match bytes[i] {
        b'<' => !matches!(
            bytes.get(i + 1),
            Some(&c) if c.is_ascii_alphabetic() || matches!(c, b'/' | b'!' | b'?')
        ),
        b'&' => !starts_entity(&markup[i + 1..]),
        _ => false,
    };
    if !(0..bytes.len()).any(stray) {
        return Cow::Borrowed(markup);
    }
    let mut out = String::with_capacity(markup.len() + 16);
    for (i, ch) in markup.char_indices() {
        match ch {
            '<' if stray(i) => out.push_str("&lt;"),
            '&' if stray(i) => out.push_str("&amp;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

/// Parse markup into a list of top-level nodes.
pub fn parse_fragment(markup: &str) -> Vec<Node> {
    let markup = escape_stray(markup);
    let mut reader = Reader::from_str(&markup);
    {
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.check_comments = false;
    }

    let mut root = Element::new("#root");
    let mut stack: Vec<Element> = Vec::new();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let element = element_from_start(e);
                if CLOSES_PARAGRAPH.contains(&element.name.as_str()) {
                    close_open(&mut stack, &mut root, "p", &["li", "td", "th", "div", "section"]);
                }
                if element.name == "li" {
                    close_open(&mut stack, &mut root, "li", &["ul", "ol"]);
                }
                if element.is_void() {
                    append(&mut stack, &mut root, Node::Element(element));
                } else {
                    stack.push(element);
                }
            }
            Ok(Event::Empty(ref e)) => {
                let element = element_from_start(e);
                append(&mut stack, &mut root, Node::Element(element));
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_lowercase();
                if let Some(pos) = stack.iter().rposition(|el| el.name == name) {
                    while stack.len() > pos {
                        pop_into_parent(&mut stack, &mut root);
                    }
                }
            }
            Ok(Event::Text(ref e)) => {
                let raw = String::from_utf8_lossy(e).into_owned();
                let text = unescape(&raw);
                if !text.is_empty() {
                    append(&mut stack, &mut root, Node::Text(text));
                }
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e).into_owned();
                append(&mut stack, &mut root, Node::Text(text));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(err) => {
                log::debug!(
                    "markup reader stopped at byte {}: {}",
                    reader.buffer_position(),
                    err
                );
                break;
            }
        }
        buf.clear();
    }

    while !stack.is_empty() {
        pop_into_parent(&mut stack, &mut root);
    }
    root.children
}

fn append(stack: &mut [Element], root: &mut Element, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(node),
        None => root.children.push(node),
    }
}

fn pop_into_parent(stack: &mut Vec<Element>, root: &mut Element) {
    if let Some(done) = stack.pop() {
        append(stack, root, Node::Element(done));
    }
}

/// Close the innermost open `name`, unless a `boundary` element is opened
/// after it.
fn close_open(stack: &mut Vec<Element>, root: &mut Element, name: &str, boundary: &[&str]) {
    for i in (0..stack.len()).rev() {
        if stack[i].name == name {
            while stack.len() > i {
                pop_into_parent(stack, root);
            }
            return;
        }
        if boundary.contains(&stack[i].name.as_str()) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single(markup: &str) -> Element {
        match parse_fragment(markup).into_iter().next() {
            Some(Node::Element(e)) => e,
            other => panic!("expected element, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_elements() {
        let p = single("<p>Hello <strong>bold</strong> world</p>");
        assert_eq!(p.name, "p");
        assert_eq!(p.children.len(), 3);
        assert_eq!(p.text_content(), "Hello bold world");
    }

    #[test]
    fn test_void_elements_take_no_children() {
        let nodes = parse_fragment("<p>a<br>b</p><img src=\"x.png\"><p>c</p>");
        assert_eq!(nodes.len(), 3);
        match &nodes[1] {
            Node::Element(img) => {
                assert_eq!(img.name, "img");
                assert_eq!(img.attr("src"), Some("x.png"));
                assert!(img.children.is_empty());
            }
            _ => panic!("expected img"),
        }
    }

    #[test]
    fn test_unclosed_paragraphs_close_implicitly() {
        let nodes = parse_fragment("<p>one<p>two");
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn test_unclosed_list_items() {
        let ul = single("<ul><li>a<li>b<li>c</ul>");
        assert_eq!(ul.find_all(&["li"]).len(), 3);
    }

    #[test]
    fn test_unmatched_end_tag_ignored() {
        let nodes = parse_fragment("<p>text</span></p>");
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_html_entities() {
        let p = single("<p>Tom&nbsp;&amp;&nbsp;Jerry &mdash; &#169;</p>");
        assert_eq!(p.text_content(), "Tom\u{a0}&\u{a0}Jerry \u{2014} \u{a9}");
    }

    #[test]
    fn test_bare_ampersand_kept() {
        let p = single("<p>Fish & chips</p>");
        assert_eq!(p.text_content(), "Fish & chips");
    }

    #[test]
    fn test_literal_less_than_is_text() {
        let nodes = parse_fragment("<p>Price < 10 euros</p><p>After</p>");
        assert_eq!(nodes.len(), 2);
        match (&nodes[0], &nodes[1]) {
            (Node::Element(first), Node::Element(second)) => {
                assert_eq!(first.text_content(), "Price < 10 euros");
                assert!(first.children.iter().all(|c| matches!(c, Node::Text(_))));
                assert_eq!(second.text_content(), "After");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_less_than_beside_entities() {
        let p = single("<p>x <= 3 & y<2 &amp; z</p>");
        assert_eq!(p.text_content(), "x <= 3 & y<2 & z");
    }

    #[test]
    fn test_unquoted_attributes() {
        let img = single("<img src=photo.jpg width=300>");
        assert_eq!(img.attr("src"), Some("photo.jpg"));
        assert_eq!(img.attr("width"), Some("300"));
    }

    #[test]
    fn test_tag_names_lowercased() {
        let div = single("<DIV CLASS=\"Tip\">x</DIV>");
        assert_eq!(div.name, "div");
        assert!(div.has_class("tip"));
    }

    #[test]
    fn test_raw_text_keeps_newlines() {
        let pre = single("<pre>fn main() {\n    run();\n}</pre>");
        assert_eq!(pre.raw_text(), "fn main() {\n    run();\n}");
    }

    #[test]
    fn test_inner_markup() {
        let p = single("<p>a <em>b</em></p>");
        assert_eq!(p.inner_markup(), "a <em>b</em>");
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_fragment("").is_empty());
    }
}
