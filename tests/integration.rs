//! Integration tests for the pageflow export pipeline.
//!
//! These tests exercise the path from article markup to PDF bytes.
//! They verify:
//! - Markup parsing keeps text and merges loose fragments
//! - Flow places blocks inside the usable page area, deterministically
//! - Rendering survives unreachable images
//! - Documents survive a JSON round trip
//! - Assembly rejects empty input and produces a structurally valid PDF

use pageflow::config::ExportOptions;
use pageflow::content::{ContentBlock, ContentParser, ImageRef};
use pageflow::error::{AssemblyError, ExportError, ImageError};
use pageflow::image::{ImageFetcher, ImageFormat, ImageService, ProxyConfig};
use pageflow::layout::{Article, FlowEngine};
use pageflow::model::{BlockContent, Document, Orientation, PageFormat, PageKind};
use pageflow::pdf::PdfAssembler;
use pageflow::render::{PageRenderer, RenderOptions, MM_PER_INCH};
use pageflow::theme::{get_theme_config, ThemeRegistry, DEFAULT_THEME};
use pageflow::ExportService;
use proptest::collection::vec;
use proptest::prelude::*;
use std::sync::Arc;

// ─── Helpers ────────────────────────────────────────────────────

struct Offline;

impl ImageFetcher for Offline {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        Err(ImageError::Fetch {
            url: url.to_string(),
            reason: "network unreachable".to_string(),
        })
    }
}

fn layout(blocks: &[ContentBlock]) -> Document {
    FlowEngine::new().layout(
        blocks,
        &get_theme_config(DEFAULT_THEME),
        PageFormat::A4,
        Orientation::Portrait,
    )
}

fn parse(markup: &str) -> Vec<ContentBlock> {
    ContentParser::new().parse(markup)
}

fn offline_service(options: ExportOptions) -> ExportService {
    ExportService::with_fetcher(options, Arc::new(Offline)).unwrap()
}

fn low_res() -> ExportOptions {
    ExportOptions {
        dpi: 36,
        ..ExportOptions::default()
    }
}

fn sample_article_json() -> &'static str {
    r#"{
  "title": "Three Days in the Dolomites",
  "subtitle": "Huts, ridges and a lot of polenta",
  "author": "R. Vance",
  "body": "<h2>Day one</h2><p>We left Cortina before sunrise.</p><ul><li>Water</li><li>Map</li></ul><h2>Day two</h2><blockquote>The ridge was worth it. — Guide</blockquote><pre><code class=\"language-text\">N 46.5 E 12.1</code></pre>",
  "sections": [{ "title": "Gear", "markup": "<p>Light boots are enough in July.</p>" }],
  "meta": { "country": "Italy", "days": 3, "distanceKm": 42.5 },
  "recommendations": [{ "title": "Stay", "items": ["Rifugio Lagazuoi"] }]
}"#
}

/// Pixel at a millimetre position of a page rendered at `dpi`.
fn pixel_at(image: &image::RgbaImage, dpi: u32, x_mm: f64, y_mm: f64) -> [u8; 4] {
    let k = dpi as f64 / MM_PER_INCH;
    image.get_pixel((x_mm * k) as u32, (y_mm * k) as u32).0
}

fn block_strategy() -> impl Strategy<Value = ContentBlock> {
    prop_oneof![
        (2u8..=3, "[a-z]{1,12}").prop_map(|(level, text)| ContentBlock::heading(level, text)),
        (1usize..600)
            .prop_map(|n| ContentBlock::paragraph("word ".repeat(n).trim_end().to_string())),
        (1usize..8).prop_map(|n| ContentBlock::List {
            ordered: n % 2 == 0,
            items: (0..n).map(|i| format!("item {}", i)).collect(),
        }),
        "[a-z]{1,8}".prop_map(|name| ContentBlock::Image(ImageRef::new(format!("{}.jpg", name)))),
        Just(ContentBlock::Separator),
    ]
}

fn markup_fragment() -> impl Strategy<Value = String> {
    (0usize..9, "[a-z ]{0,12}").prop_map(|(kind, text)| match kind {
        0 => format!("<p>{}</p>", text),
        1 => format!("<h2>{}</h2>", text),
        2 => format!("<h3>{}</h3>", text),
        3 => format!("<ul><li>{}</li><li> </li></ul>", text),
        4 => format!("<blockquote>{}</blockquote>", text),
        5 => format!("<div>{}</div>", text),
        6 => format!("<span>{}</span>", text),
        7 => format!("<strong>{}</strong> &nbsp; ", text),
        _ => text,
    })
}

// ─── Scenarios ──────────────────────────────────────────────────

#[test]
fn test_two_paragraphs_share_one_content_page() {
    let doc = layout(&parse("<p>Hello</p><p>World</p>"));
    let pages: Vec<_> = doc.pages.iter().filter(|p| p.kind == PageKind::Content).collect();
    assert_eq!(pages.len(), 1);
    let blocks = &pages[0].blocks;
    assert_eq!(blocks.len(), 2);
    assert!(blocks
        .iter()
        .all(|b| matches!(b.content, BlockContent::Paragraph { .. })));
    assert!(blocks[1].position.y > blocks[0].position.y + blocks[0].position.height);
}

#[test]
fn test_section_heading_with_overlong_paragraph() {
    // Enough opening text to push the cursor well below the top margin.
    let mut markup = format!("<p>{}</p>", "opening remarks ".repeat(60));
    markup.push_str("<h2>The long part</h2><p>");
    markup.push_str(&"endless prose ".repeat(4000));
    markup.push_str("</p>");
    let doc = layout(&parse(&markup));

    let (index, page) = doc
        .pages
        .iter()
        .enumerate()
        .find(|(_, p)| {
            p.blocks
                .iter()
                .any(|b| matches!(b.content, BlockContent::Heading { level: 2, .. }))
        })
        .unwrap();
    // The heading opens its page rather than following the opening paragraph.
    assert!(matches!(page.blocks[0].content, BlockContent::Heading { level: 2, .. }));
    assert_eq!(page.blocks[0].position.y, page.content_area().y);

    // The paragraph cannot fit below the heading, so it takes the next page
    // whole, clamped to exactly the usable height.
    let next = &doc.pages[index + 1];
    let area = next.content_area();
    let paragraph = &next.blocks[0];
    assert!(matches!(paragraph.content, BlockContent::Paragraph { .. }));
    assert_eq!(paragraph.position.y, area.y);
    assert_eq!(paragraph.position.height, area.height);
}

#[test]
fn test_unreachable_image_renders_placeholder() {
    let options = ExportOptions {
        image_format: ImageFormat::Png,
        ..low_res()
    };
    let service = offline_service(options);
    let article = Article {
        title: "Photos".to_string(),
        body: "<img src=\"https://unreachable.invalid/photo.jpg\" alt=\"lost\">".to_string(),
        ..Article::default()
    };
    let doc = service.layout(&article);
    let (page, block) = doc
        .pages
        .iter()
        .find_map(|p| {
            p.blocks
                .iter()
                .find(|b| matches!(b.content, BlockContent::Image { .. }))
                .map(|b| (p, b))
        })
        .unwrap();

    let rendered = service.preview_page(&doc, &page.id).unwrap();
    assert_eq!(rendered.format, ImageFormat::Png);
    let pixels = image::load_from_memory(&rendered.image_data).unwrap().to_rgba8();
    let pos = block.position;
    assert_eq!(
        pixel_at(&pixels, rendered.dpi, pos.x + 2.0, pos.y + 2.0),
        [240, 240, 240, 255]
    );
}

#[test]
fn test_unknown_theme_is_default() {
    let theme = get_theme_config("not-a-real-theme");
    assert_eq!(theme, get_theme_config(DEFAULT_THEME));
    assert_eq!(theme.name, "minimal");
}

#[test]
fn test_assembling_zero_pages_fails() {
    let err = PdfAssembler::new().assemble(&[]).unwrap_err();
    assert!(matches!(err, AssemblyError::NoPages));
    assert!(err.to_string().contains("zero pages"));

    let wrapped: ExportError = err.into();
    assert!(wrapped.to_string().starts_with("PDF assembly failed"));
}

// ─── Pipeline ───────────────────────────────────────────────────

#[test]
fn test_full_article_export() {
    let result = pageflow::export(sample_article_json(), low_res()).unwrap();
    assert!(result.bytes.starts_with(b"%PDF-"));
    assert!(result.bytes.ends_with(b"%%EOF\n"));
    assert_eq!(result.size, result.bytes.len());
    assert!(result.filename.starts_with("Three_Days_in_the_Dolomites_"));

    let doc = pageflow::layout_json(sample_article_json(), low_res()).unwrap();
    assert_eq!(result.page_count, doc.page_count());
    let kinds: Vec<PageKind> = doc.pages.iter().map(|p| p.kind).collect();
    assert_eq!(kinds[0], PageKind::Cover);
    assert!(kinds.contains(&PageKind::Toc));
    assert!(kinds.contains(&PageKind::Meta));
    assert!(kinds.contains(&PageKind::Content));
    assert_eq!(kinds.last(), Some(&PageKind::Recommendations));

    let text = String::from_utf8_lossy(&result.bytes);
    assert_eq!(text.matches("/Type /Page ").count(), result.page_count);
    assert!(text.contains("(Three Days in the Dolomites)"));
}

#[test]
fn test_options_toggle_front_and_back_matter() {
    let options = ExportOptions {
        include_toc: false,
        include_recommendations: false,
        ..low_res()
    };
    let doc = pageflow::layout_json(sample_article_json(), options).unwrap();
    assert!(doc.pages.iter().all(|p| p.kind != PageKind::Toc));
    assert!(doc.pages.iter().all(|p| p.kind != PageKind::Recommendations));
}

#[test]
fn test_malformed_article_is_model_error() {
    let err = pageflow::export("{ \"title\": 5 }", low_res()).unwrap_err();
    assert!(matches!(err, ExportError::Model(_)));
}

#[test]
fn test_landscape_pages_render_wide() {
    let options = ExportOptions {
        orientation: Orientation::Landscape,
        page_format: PageFormat::A5,
        ..low_res()
    };
    let service = offline_service(options);
    let doc = service.layout(&Article {
        title: "Wide".to_string(),
        body: "<p>Across.</p>".to_string(),
        ..Article::default()
    });
    let page = service.preview_page(&doc, &doc.pages[0].id).unwrap();
    assert!(page.pixel_width > page.pixel_height);
}

#[test]
fn test_theme_switch_renders_with_new_palette() {
    let images = Arc::new(ImageService::with_fetcher(ProxyConfig::default(), Arc::new(Offline)));
    let renderer = PageRenderer::new(images).with_options(RenderOptions {
        format: ImageFormat::Png,
        ..RenderOptions::default()
    });
    let doc = layout(&parse("<p>Same words, different paper.</p>"));
    let page = doc.pages.iter().find(|p| p.kind == PageKind::Content).unwrap();

    let registry = ThemeRegistry::new();
    let sepia = registry.get("sepia");
    let dark = registry.get("dark");
    let a = renderer.paint(page, sepia, 36).unwrap();
    let b = renderer.paint(page, dark, 36).unwrap();
    assert_eq!(a.pixels().get_pixel(1, 1).0, sepia.colors.background.to_rgba8());
    assert_eq!(b.pixels().get_pixel(1, 1).0, dark.colors.background.to_rgba8());
}

// ─── Storage ────────────────────────────────────────────────────

#[test]
fn test_document_json_roundtrip() {
    let service = offline_service(low_res());
    let article = Article::from_json(sample_article_json()).unwrap();
    let doc = service.layout(&article);

    let json = doc.to_json().unwrap();
    let restored = Document::from_json(&json).unwrap();
    assert_eq!(restored.page_count(), doc.page_count());
    for (a, b) in doc.pages.iter().zip(&restored.pages) {
        assert_eq!(a.id, b.id);
        let ids_a: Vec<&str> = a.blocks.iter().map(|x| x.id.as_str()).collect();
        let ids_b: Vec<&str> = b.blocks.iter().map(|x| x.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    // A stored draft exports like a fresh one.
    let result = service.export_document(&restored).unwrap();
    assert_eq!(result.page_count, doc.page_count());
}

#[test]
fn test_options_file_drives_export() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("options.json");
    std::fs::write(&path, r#"{"dpi": 40, "theme": "dark", "imageFormat": "png"}"#).unwrap();
    let options = ExportOptions::from_path(&path).unwrap();
    let service = offline_service(options);
    let doc = service.layout(&Article {
        title: "Night".to_string(),
        body: "<p>Stars.</p>".to_string(),
        ..Article::default()
    });
    assert_eq!(doc.theme, "dark");
    let page = service.preview_page(&doc, &doc.pages[1].id).unwrap();
    assert_eq!(page.dpi, 40);
    assert_eq!(page.format, ImageFormat::Png);
}

// ─── Properties ─────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_parsed_blocks_have_text(fragments in vec(markup_fragment(), 0..12)) {
        let blocks = parse(&fragments.concat());
        for block in &blocks {
            if let Some(text) = block.text() {
                prop_assert!(!text.trim().is_empty(), "empty text in {:?}", block);
            }
            if let ContentBlock::List { items, .. } = block {
                prop_assert!(!items.is_empty());
                prop_assert!(items.iter().all(|i| !i.trim().is_empty()));
            }
        }
    }

    #[test]
    fn prop_loose_fragments_form_one_paragraph(words in vec("[a-z]{1,8}", 1..10)) {
        let markup: Vec<String> = words
            .iter()
            .enumerate()
            .map(|(i, w)| match i % 3 {
                0 => format!("<span>{}</span>", w),
                1 => format!("<strong>{}</strong>", w),
                _ => w.clone(),
            })
            .collect();
        let blocks = parse(&markup.join(" "));
        prop_assert_eq!(blocks.len(), 1);
        prop_assert_eq!(blocks[0].kind(), "paragraph");
        let expected = words.join(" ");
        prop_assert_eq!(blocks[0].text(), Some(expected.as_str()));
    }

    #[test]
    fn prop_only_front_matter_page_is_empty(blocks in vec(block_strategy(), 0..30)) {
        let doc = layout(&blocks);
        prop_assert_eq!(doc.pages[0].kind, PageKind::Cover);
        for page in doc.pages.iter().skip(1) {
            prop_assert!(!page.blocks.is_empty(), "empty page {}", page.index);
        }
    }

    #[test]
    fn prop_blocks_stay_inside_usable_area(blocks in vec(block_strategy(), 1..30)) {
        let doc = layout(&blocks);
        for page in doc.pages.iter().skip(1) {
            let area = page.content_area();
            for block in &page.blocks {
                let pos = block.position;
                prop_assert!(pos.height > 0.0);
                prop_assert!(pos.y >= area.y - 1e-9);
                prop_assert!(pos.y + pos.height <= area.bottom() + 1e-9);
            }
        }
    }

    #[test]
    fn prop_layout_is_deterministic(blocks in vec(block_strategy(), 0..30)) {
        let a = layout(&blocks);
        let b = layout(&blocks);
        prop_assert_eq!(a.page_count(), b.page_count());
        for (pa, pb) in a.pages.iter().zip(&b.pages) {
            prop_assert_eq!(pa.blocks.len(), pb.blocks.len());
            for (x, y) in pa.blocks.iter().zip(&pb.blocks) {
                prop_assert_eq!(x.position, y.position);
            }
        }
    }
}
