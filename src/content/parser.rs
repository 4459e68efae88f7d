//! # Content Parser
//!
//! Walks the cleaned markup tree in document order and emits content blocks.
//!
//! Free text and inline fragments are collected and merged into one
//! paragraph until a block construct interrupts them. An explicit `<p>` is a
//! paragraph of its own and is never merged with its neighbours.

use super::dom::{self, Element, Node};
use super::normalize::{normalize_code, normalize_text, strip_foreign};
use super::{CalloutVariant, ContentBlock, ImageRef};

/// Elements that make a container structural rather than a text run.
const BLOCK_ELEMENTS: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "ul", "ol", "blockquote", "img", "figure", "table",
    "pre", "hr", "div", "section", "article", "aside",
];

/// Block elements that keep a multi-image container from becoming a gallery.
const TEXT_STRUCTURE: &[&str] = &[
    "h1", "h2", "h3", "h4", "h5", "h6", "p", "ul", "ol", "blockquote", "table", "pre",
];

const CONTAINERS: &[&str] = &[
    "div", "section", "article", "aside", "main", "header", "footer", "nav", "body", "html",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct ContentParser;

impl ContentParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse article markup into content blocks. Empty or unparseable input
    /// yields an empty vec.
    pub fn parse(&self, markup: &str) -> Vec<ContentBlock> {
        if markup.trim().is_empty() {
            return Vec::new();
        }
        let nodes = strip_foreign(dom::parse_fragment(markup));
        let mut out = Collector::default();
        for node in &nodes {
            self.parse_node(node, &mut out);
        }
        let blocks = out.finish();
        log::debug!("parsed {} content blocks", blocks.len());
        blocks
    }

    fn parse_node(&self, node: &Node, out: &mut Collector) {
        let element = match node {
            Node::Text(text) => {
                out.push_text(text);
                return;
            }
            Node::Element(e) => e,
        };

        match element.name.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                if let Some(block) = parse_heading(element) {
                    out.push_block(block);
                }
            }
            "p" => self.parse_paragraph(element, out),
            "ul" | "ol" => {
                if let Some(block) = parse_list(element) {
                    out.push_block(block);
                }
            }
            "blockquote" => {
                if let Some(block) = parse_quote(element) {
                    out.push_block(block);
                }
            }
            "img" => {
                if let Some(image) = image_ref(element) {
                    out.push_block(ContentBlock::Image(image));
                }
            }
            "figure" => {
                if let Some(block) = parse_figure(element) {
                    out.push_block(block);
                }
            }
            "hr" => out.push_block(ContentBlock::Separator),
            "pre" | "code" => {
                if let Some(block) = parse_code(element) {
                    out.push_block(block);
                }
            }
            "table" => {
                if let Some(block) = parse_table(element) {
                    out.push_block(block);
                }
            }
            "br" => {}
            name if CONTAINERS.contains(&name) => self.parse_container(element, out),
            _ => {
                if element.contains_any(BLOCK_ELEMENTS) {
                    for child in &element.children {
                        self.parse_node(child, out);
                    }
                } else {
                    out.push_inline(element);
                }
            }
        }
    }

    fn parse_paragraph(&self, element: &Element, out: &mut Collector) {
        if let Some(callout) = detect_callout(element) {
            out.push_block(callout);
            return;
        }
        let text = normalize_text(&element.text_content());
        if text.is_empty() {
            // CMS output often wraps images in paragraphs.
            if element.contains_any(&["img"]) {
                self.parse_container(element, out);
            }
            return;
        }
        let raw_markup = element
            .has_element_children()
            .then(|| element.inner_markup().trim().to_string());
        out.push_block(ContentBlock::Paragraph { text, raw_markup });
        // Inline images follow the paragraph as blocks of their own.
        for image in element.find_all(&["img"]).into_iter().filter_map(image_ref) {
            out.push_block(ContentBlock::Image(image));
        }
    }

    fn parse_container(&self, element: &Element, out: &mut Collector) {
        if let Some(callout) = detect_callout(element) {
            out.push_block(callout);
            return;
        }

        let images = element.find_all(&["img"]);
        let has_text_structure = element.contains_any(TEXT_STRUCTURE);

        if images.len() >= 2 && !has_text_structure {
            let images: Vec<ImageRef> = images.into_iter().filter_map(image_ref).collect();
            let mut gallery = (!images.is_empty()).then(|| gallery_or_single(images));
            // The gallery takes the place of the first image; text around it
            // stays where it was.
            for child in &element.children {
                match child {
                    Node::Element(e) if e.name == "img" || e.contains_any(&["img"]) => {
                        if let Some(block) = gallery.take() {
                            out.push_block(block);
                        }
                        out.push_text(&e.text_content());
                    }
                    _ => self.parse_node(child, out),
                }
            }
            return;
        }

        if images.len() == 1 && !has_text_structure {
            if let Some(mut image) = image_ref(images[0]) {
                let caption = normalize_text(&element.text_content());
                if !caption.is_empty() {
                    image.caption = Some(caption);
                }
                out.push_block(ContentBlock::Image(image));
            }
            return;
        }

        if !element.contains_any(BLOCK_ELEMENTS) {
            out.push_text(&element.text_content());
            return;
        }

        for child in &element.children {
            self.parse_node(child, out);
        }
    }
}

/// Accumulates paragraph fragments between block constructs.
#[derive(Default)]
struct Collector {
    blocks: Vec<ContentBlock>,
    fragments: Vec<String>,
    raw: Vec<String>,
    has_markup: bool,
}

impl Collector {
    fn push_text(&mut self, text: &str) {
        let text = normalize_text(text);
        if !text.is_empty() {
            self.raw.push(text.clone());
            self.fragments.push(text);
        }
    }

    fn push_inline(&mut self, element: &Element) {
        let text = normalize_text(&element.text_content());
        if text.is_empty() {
            return;
        }
        let mut wrapper = Element::new(&element.name);
        wrapper.children.push(Node::Element(element.clone()));
        self.raw.push(wrapper.inner_markup());
        self.fragments.push(text);
        self.has_markup = true;
    }

    fn push_block(&mut self, block: ContentBlock) {
        self.flush();
        self.blocks.push(block);
    }

    fn flush(&mut self) {
        if self.fragments.is_empty() {
            return;
        }
        let text = normalize_text(&self.fragments.join(" "));
        let raw_markup = self.has_markup.then(|| self.raw.join(" "));
        self.fragments.clear();
        self.raw.clear();
        self.has_markup = false;
        if !text.is_empty() {
            self.blocks.push(ContentBlock::Paragraph { text, raw_markup });
        }
    }

    fn finish(mut self) -> Vec<ContentBlock> {
        self.flush();
        self.blocks
    }
}

fn fold_heading_level(tag: &str) -> u8 {
    match tag.as_bytes().get(1) {
        Some(b'1') | Some(b'2') => 2,
        _ => 3,
    }
}

fn parse_heading(element: &Element) -> Option<ContentBlock> {
    let text = normalize_text(&element.text_content());
    if text.is_empty() {
        return None;
    }
    Some(ContentBlock::Heading {
        level: fold_heading_level(&element.name),
        text,
    })
}

/// Text of an element with the subtrees named in `skip` left out.
fn text_excluding(element: &Element, skip: &[&str]) -> String {
    let mut out = String::new();
    for child in &element.children {
        match child {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) if skip.contains(&e.name.as_str()) => out.push(' '),
            Node::Element(e) if e.name == "br" => out.push(' '),
            Node::Element(e) => {
                out.push_str(&text_excluding(e, skip));
                out.push(' ');
            }
        }
    }
    out
}

fn parse_list(element: &Element) -> Option<ContentBlock> {
    let items: Vec<String> = element
        .find_all(&["li"])
        .into_iter()
        .map(|li| normalize_text(&text_excluding(li, &["ul", "ol"])))
        .filter(|t| !t.is_empty())
        .collect();
    if items.is_empty() {
        return None;
    }
    Some(ContentBlock::List {
        ordered: element.name == "ol",
        items,
    })
}

fn parse_quote(element: &Element) -> Option<ContentBlock> {
    let author = element
        .find_first(|e| e.name == "cite" || e.name == "footer")
        .map(|cite| {
            normalize_text(&cite.text_content())
                .trim_start_matches(['—', '–', '-', ' '])
                .to_string()
        })
        .filter(|a| !a.is_empty());

    let without_author = normalize_text(&text_excluding(element, &["cite", "footer"]));
    let text = if without_author.is_empty() {
        normalize_text(&element.text_content())
    } else {
        without_author
    };
    if text.is_empty() {
        return None;
    }
    let author = if author.as_deref() == Some(text.as_str()) {
        None
    } else {
        author
    };
    Some(ContentBlock::Quote { text, author })
}

fn parse_dimension(value: Option<&str>) -> Option<u32> {
    let digits: String = value?
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok().filter(|v| *v > 0)
}

fn image_ref(element: &Element) -> Option<ImageRef> {
    let url = element
        .attr("src")
        .or_else(|| element.attr("data-src"))
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    Some(ImageRef {
        url: url.to_string(),
        alt: element
            .attr("alt")
            .map(normalize_text)
            .filter(|a| !a.is_empty()),
        caption: None,
        width: parse_dimension(element.attr("width")),
        height: parse_dimension(element.attr("height")),
    })
}

fn gallery_or_single(mut images: Vec<ImageRef>) -> ContentBlock {
    if images.len() == 1 {
        return ContentBlock::Image(images.remove(0));
    }
    ContentBlock::ImageGallery { images }
}

fn parse_figure(element: &Element) -> Option<ContentBlock> {
    let images: Vec<ImageRef> = element
        .find_all(&["img"])
        .into_iter()
        .filter_map(image_ref)
        .collect();
    if images.is_empty() {
        return None;
    }
    let caption = element
        .find_first(|e| e.name == "figcaption")
        .map(|c| normalize_text(&c.text_content()))
        .filter(|c| !c.is_empty());
    match gallery_or_single(images) {
        ContentBlock::Image(mut image) => {
            image.caption = caption;
            Some(ContentBlock::Image(image))
        }
        gallery => Some(gallery),
    }
}

fn language_of(element: &Element) -> Option<String> {
    let from_class = |e: &Element| {
        e.classes().find_map(|c| {
            c.strip_prefix("language-")
                .or_else(|| c.strip_prefix("lang-"))
                .filter(|l| !l.is_empty() && l.chars().all(|ch| ch.is_alphanumeric() || ch == '_'))
                .map(str::to_string)
        })
    };
    from_class(element).or_else(|| element.find_all(&["code"]).into_iter().find_map(from_class))
}

fn parse_code(element: &Element) -> Option<ContentBlock> {
    let text = normalize_code(&element.raw_text());
    if text.is_empty() {
        return None;
    }
    Some(ContentBlock::Code {
        text,
        language: language_of(element),
    })
}

/// Rows of this table only, not of tables nested in its cells.
fn table_rows(table: &Element) -> Vec<&Element> {
    let mut rows = Vec::new();
    for child in table.child_elements() {
        match child.name.as_str() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => {
                rows.extend(child.child_elements().filter(|r| r.name == "tr"));
            }
            _ => {}
        }
    }
    rows
}

fn parse_table(element: &Element) -> Option<ContentBlock> {
    let rows = table_rows(element);
    let first = rows.first()?;
    let cell_text = |cell: &&Element| normalize_text(&cell.text_content());

    let has_header = first.child_elements().any(|c| c.name == "th");
    let headers = has_header.then(|| {
        first
            .child_elements()
            .filter(|c| c.name == "th" || c.name == "td")
            .map(|c| cell_text(&c))
            .collect::<Vec<_>>()
    });

    let body: Vec<Vec<String>> = rows
        .iter()
        .skip(usize::from(has_header))
        .map(|row| {
            row.child_elements()
                .filter(|c| c.name == "td" || c.name == "th")
                .map(|c| cell_text(&c))
                .collect::<Vec<_>>()
        })
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    if body.is_empty() && headers.as_ref().map_or(true, |h| h.iter().all(String::is_empty)) {
        return None;
    }
    Some(ContentBlock::Table {
        headers,
        rows: body,
    })
}

fn callout_variant(element: &Element) -> Option<CalloutVariant> {
    ["class", "data-callout", "data-type"]
        .iter()
        .filter_map(|attr| element.attr(attr))
        .find_map(CalloutVariant::from_hint)
}

fn detect_callout(element: &Element) -> Option<ContentBlock> {
    let variant = callout_variant(element)?;
    let full = normalize_text(&element.text_content());
    if full.is_empty() {
        return None;
    }

    let title = element
        .find_first(|e| {
            matches!(
                e.name.as_str(),
                "strong" | "b" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
            ) || e.has_class("title")
                || e.has_class("heading")
        })
        .map(|t| normalize_text(&t.text_content()))
        .filter(|t| !t.is_empty());

    let (title, text) = match title {
        Some(title) => {
            let body = full
                .strip_prefix(title.as_str())
                .map(|rest| rest.trim_start_matches([':', ' ', '—', '-']).to_string())
                .unwrap_or_else(|| full.clone());
            if body.is_empty() {
                (None, title)
            } else {
                (Some(title), body)
            }
        }
        None => (None, full),
    };

    Some(ContentBlock::Callout {
        variant,
        title,
        text,
    })
}
