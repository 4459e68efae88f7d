//! Article import: turns an [`Article`] into a full document with front
//! matter, flowed content and back matter.

use serde::{Deserialize, Serialize};

use super::estimate::{line_height_mm, HeightEstimator, HeuristicEstimator, BLOCK_PADDING_MM};
use super::{cover_background, FlowEngine};
use crate::content::{normalize_text, ContentBlock, ContentParser};
use crate::error::ModelError;
use crate::model::{
    BlockContent, BlockPosition, BlockStyle, Document, DocumentBuilder, Margins, Orientation,
    PageFormat, PageKind, PositionedBlock, TextAlign, TextRole,
};
use crate::theme::Theme;

pub const NO_CONTENT: &str = "No content available.";
const UNTITLED: &str = "Untitled";
const TOC_TITLE: &str = "Contents";
const META_TITLE: &str = "Route details";
const MAP_TITLE: &str = "Map";
const RECOMMENDATIONS_TITLE: &str = "Recommendations";

// Cover geometry, in mm from the page edges.
const COVER_TITLE_ABOVE_CENTER_MM: f64 = 60.0;
const COVER_TITLE_HEIGHT_MM: f64 = 50.0;
const COVER_TITLE_SCALE: f64 = 1.5;
const COVER_SUBTITLE_BELOW_CENTER_MM: f64 = 5.0;
const COVER_SUBTITLE_HEIGHT_MM: f64 = 20.0;
const COVER_AUTHOR_FROM_BOTTOM_MM: f64 = 60.0;
const COVER_AUTHOR_HEIGHT_MM: f64 = 12.0;

const TOC_ENTRY_GAP_MM: f64 = 4.0;

/// An article as it arrives from the content source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Article {
    pub title: String,
    pub subtitle: Option<String>,
    pub author: Option<String>,
    pub cover_image: Option<String>,
    /// Body markup.
    #[serde(alias = "description")]
    pub body: String,
    /// Extra titled sections appended after the body.
    pub sections: Vec<ArticleSection>,
    pub meta: Option<RouteMeta>,
    pub map: Option<RouteMap>,
    pub recommendations: Vec<Recommendation>,
}

impl Article {
    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        Ok(serde_json::from_str(json)?)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleSection {
    pub title: String,
    #[serde(alias = "content")]
    pub markup: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteMeta {
    pub country: Option<String>,
    pub region: Option<String>,
    pub days: Option<u32>,
    pub distance_km: Option<f64>,
    pub difficulty: Option<String>,
}

impl RouteMeta {
    /// Label/value rows for the fields that are set.
    pub fn rows(&self) -> Vec<Vec<String>> {
        let text = |label: &str, value: &Option<String>| {
            value
                .as_deref()
                .map(normalize_text)
                .filter(|v| !v.is_empty())
                .map(|v| vec![label.to_string(), v])
        };
        [
            text("Country", &self.country),
            text("Region", &self.region),
            self.days.map(|d| vec!["Days".to_string(), d.to_string()]),
            self.distance_km
                .map(|d| vec!["Distance".to_string(), format!("{} km", d)]),
            text("Difficulty", &self.difficulty),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouteMap {
    pub image_url: Option<String>,
    pub points: Vec<String>,
    pub description: Option<String>,
}

impl RouteMap {
    pub fn is_empty(&self) -> bool {
        self.image_url.as_deref().map_or(true, |u| u.trim().is_empty())
            && self.points.iter().all(|p| p.trim().is_empty())
            && self
                .description
                .as_deref()
                .map_or(true, |d| d.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Recommendation {
    pub title: String,
    pub items: Vec<String>,
}

/// Which optional pages an import produces, and on what paper.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImportOptions {
    pub include_toc: bool,
    pub include_map: bool,
    pub include_recommendations: bool,
    pub page_format: PageFormat,
    pub orientation: Orientation,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            include_toc: true,
            include_map: true,
            include_recommendations: true,
            page_format: PageFormat::A4,
            orientation: Orientation::Portrait,
        }
    }
}

/// Builds documents from articles: cover, contents, route details, body,
/// map, recommendations.
#[derive(Debug, Clone)]
pub struct Importer<E = HeuristicEstimator> {
    parser: ContentParser,
    flow: FlowEngine<E>,
}

impl Default for Importer {
    fn default() -> Self {
        Self::with_flow(FlowEngine::new())
    }
}

impl Importer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: HeightEstimator> Importer<E> {
    pub fn with_flow(flow: FlowEngine<E>) -> Self {
        Self {
            parser: ContentParser::new(),
            flow,
        }
    }

    pub fn import(&self, article: &Article, theme: &Theme, options: &ImportOptions) -> Document {
        let title = match normalize_text(&article.title) {
            t if t.is_empty() => UNTITLED.to_string(),
            t => t,
        };
        let author = article
            .author
            .as_deref()
            .map(normalize_text)
            .filter(|a| !a.is_empty());

        let mut builder =
            DocumentBuilder::new(&title, &theme.name, options.page_format, options.orientation);
        builder.set_author(author.clone());

        let body = self.body_blocks(article, &title);

        self.add_cover(&mut builder, article, &title, author.as_deref(), theme);
        if options.include_toc {
            self.add_toc(&mut builder, &body, theme);
        }
        if let Some(meta) = article.meta.as_ref().filter(|m| !m.is_empty()) {
            let blocks = vec![
                ContentBlock::heading(2, META_TITLE),
                ContentBlock::Table {
                    headers: None,
                    rows: meta.rows(),
                },
            ];
            self.flow.flow(&mut builder, &blocks, theme, PageKind::Meta);
        }

        let pages = self.flow.flow(&mut builder, &body, theme, PageKind::Content);
        log::debug!("article '{}': {} blocks on {} content pages", title, body.len(), pages);

        if options.include_map {
            if let Some(map) = article.map.as_ref().filter(|m| !m.is_empty()) {
                self.add_map(&mut builder, map, theme);
            }
        }
        if options.include_recommendations {
            let blocks = recommendation_blocks(&article.recommendations);
            if !blocks.is_empty() {
                self.flow
                    .flow(&mut builder, &blocks, theme, PageKind::Recommendations);
            }
        }

        builder.build()
    }

    /// Parsed body plus extra sections, or the fallback when all are empty.
    fn body_blocks(&self, article: &Article, title: &str) -> Vec<ContentBlock> {
        let mut blocks = self.parser.parse(&article.body);
        for section in &article.sections {
            let heading = normalize_text(&section.title);
            let content = self.parser.parse(&section.markup);
            if content.is_empty() && heading.is_empty() {
                continue;
            }
            if !heading.is_empty() {
                blocks.push(ContentBlock::heading(2, heading));
            }
            blocks.extend(content);
        }
        if blocks.is_empty() {
            log::warn!("article '{}' has no parsable content; using fallback", title);
            blocks = vec![
                ContentBlock::heading(2, title),
                ContentBlock::paragraph(NO_CONTENT),
            ];
        }
        blocks
    }

    fn add_cover(
        &self,
        builder: &mut DocumentBuilder,
        article: &Article,
        title: &str,
        author: Option<&str>,
        theme: &Theme,
    ) {
        let (w, h) = page_size(builder);
        let margins = Margins::uniform(theme.spacing.page_padding);
        let area = margins.content_area(w, h);
        let typo = &theme.typography;
        let cover = &theme.colors.cover;

        let text_block = |y: f64, height: f64, text: &str, role: TextRole, style: BlockStyle| {
            PositionedBlock::new(
                BlockPosition::mm(area.x, y.max(area.y), area.width, height),
                BlockContent::Text {
                    text: text.to_string(),
                    role,
                },
            )
            .with_style(style)
        };

        let mut blocks = vec![text_block(
            h / 2.0 - COVER_TITLE_ABOVE_CENTER_MM,
            COVER_TITLE_HEIGHT_MM,
            title,
            TextRole::Title,
            BlockStyle {
                color: Some(cover.text),
                font_size: Some(typo.h1.size * COVER_TITLE_SCALE),
                font_weight: Some(typo.h1.weight),
                align: TextAlign::Center,
                ..BlockStyle::default()
            },
        )];

        if let Some(subtitle) = article
            .subtitle
            .as_deref()
            .map(normalize_text)
            .filter(|s| !s.is_empty())
        {
            blocks.push(text_block(
                h / 2.0 - COVER_SUBTITLE_BELOW_CENTER_MM,
                COVER_SUBTITLE_HEIGHT_MM,
                &subtitle,
                TextRole::Subtitle,
                BlockStyle {
                    color: Some(cover.text_secondary),
                    font_size: Some(typo.h3.size),
                    align: TextAlign::Center,
                    ..BlockStyle::default()
                },
            ));
        }

        if let Some(author) = author {
            blocks.push(text_block(
                h - COVER_AUTHOR_FROM_BOTTOM_MM,
                COVER_AUTHOR_HEIGHT_MM,
                author,
                TextRole::Byline,
                BlockStyle {
                    color: Some(cover.text_secondary),
                    align: TextAlign::Center,
                    ..BlockStyle::default()
                },
            ));
        }

        let mut background = cover_background(theme);
        background.image = article
            .cover_image
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        builder.push_page(PageKind::Cover, margins, Some(background), blocks);
    }

    /// One entry per level-2 heading, continued onto further pages as needed.
    fn add_toc(&self, builder: &mut DocumentBuilder, body: &[ContentBlock], theme: &Theme) {
        let entries: Vec<String> = body
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Heading { level: 2, text } => Some(text.as_str()),
                _ => None,
            })
            .enumerate()
            .map(|(i, text)| format!("{}. {}", i + 1, text))
            .collect();
        if entries.is_empty() {
            return;
        }

        let (w, h) = page_size(builder);
        let margins = Margins::uniform(theme.spacing.page_padding);
        let area = margins.content_area(w, h);
        let entry_height = line_height_mm(&theme.typography.body);
        let title_height = line_height_mm(&theme.typography.h1) + BLOCK_PADDING_MM;

        let mut blocks = vec![PositionedBlock::new(
            BlockPosition::mm(area.x, area.y, area.width, title_height.min(area.height)),
            BlockContent::Heading {
                level: 1,
                text: TOC_TITLE.to_string(),
            },
        )];
        let mut y = area.y + title_height + theme.spacing.section_spacing;

        for entry in entries {
            if y + entry_height > area.bottom() && !blocks.is_empty() {
                builder.push_page(PageKind::Toc, margins, None, std::mem::take(&mut blocks));
                y = area.y;
            }
            blocks.push(PositionedBlock::new(
                BlockPosition::mm(area.x, y, area.width, entry_height),
                BlockContent::Text {
                    text: entry,
                    role: TextRole::TocEntry,
                },
            ));
            y += entry_height + TOC_ENTRY_GAP_MM;
        }
        builder.push_page(PageKind::Toc, margins, None, blocks);
    }

    /// A heading, then the map filling the rest of the page.
    fn add_map(&self, builder: &mut DocumentBuilder, map: &RouteMap, theme: &Theme) {
        let (w, h) = page_size(builder);
        let margins = Margins::uniform(theme.spacing.page_padding);
        let area = margins.content_area(w, h);
        let heading_height = line_height_mm(&theme.typography.h2) + BLOCK_PADDING_MM;
        let map_top = area.y + heading_height + theme.spacing.block_spacing;

        let blocks = vec![
            PositionedBlock::new(
                BlockPosition::mm(area.x, area.y, area.width, heading_height),
                BlockContent::Heading {
                    level: 2,
                    text: MAP_TITLE.to_string(),
                },
            ),
            PositionedBlock::new(
                BlockPosition::mm(area.x, map_top, area.width, area.bottom() - map_top),
                BlockContent::Map {
                    image_url: map
                        .image_url
                        .as_deref()
                        .map(str::trim)
                        .filter(|u| !u.is_empty())
                        .map(str::to_string),
                    points: map
                        .points
                        .iter()
                        .map(|p| normalize_text(p))
                        .filter(|p| !p.is_empty())
                        .collect(),
                    description: map
                        .description
                        .as_deref()
                        .map(normalize_text)
                        .filter(|d| !d.is_empty()),
                },
            ),
        ];
        builder.push_page(PageKind::Map, margins, None, blocks);
    }
}

fn page_size(builder: &DocumentBuilder) -> (f64, f64) {
    let doc = builder.document();
    doc.page_format.dimensions_mm(doc.orientation)
}

/// A section heading, then each recommendation as a sub-heading and list.
fn recommendation_blocks(recommendations: &[Recommendation]) -> Vec<ContentBlock> {
    let mut blocks = Vec::new();
    for rec in recommendations {
        let title = normalize_text(&rec.title);
        let items: Vec<String> = rec
            .items
            .iter()
            .map(|i| normalize_text(i))
            .filter(|i| !i.is_empty())
            .collect();
        if title.is_empty() && items.is_empty() {
            continue;
        }
        if !title.is_empty() {
            blocks.push(ContentBlock::heading(3, title));
        }
        if !items.is_empty() {
            blocks.push(ContentBlock::List {
                ordered: false,
                items,
            });
        }
    }
    if !blocks.is_empty() {
        blocks.insert(0, ContentBlock::heading(2, RECOMMENDATIONS_TITLE));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::theme::get_theme_config;

    fn import(article: &Article) -> Document {
        Importer::new().import(article, &get_theme_config("minimal"), &ImportOptions::default())
    }

    fn kinds(doc: &Document) -> Vec<PageKind> {
        doc.pages.iter().map(|p| p.kind).collect()
    }

    fn texts(page: &crate::model::Page) -> Vec<String> {
        page.blocks
            .iter()
            .filter_map(|b| match &b.content {
                BlockContent::Text { text, .. } | BlockContent::Heading { text, .. } => {
                    Some(text.clone())
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_empty_article_gets_fallback() {
        let doc = import(&Article {
            title: "Lake trip".to_string(),
            ..Article::default()
        });
        assert_eq!(doc.title, "Lake trip");
        let content: Vec<_> = doc.pages.iter().filter(|p| p.kind == PageKind::Content).collect();
        assert_eq!(content.len(), 1);
        assert!(matches!(
            &content[0].blocks[1].content,
            BlockContent::Paragraph { text } if text == NO_CONTENT
        ));
    }

    #[test]
    fn test_cover_carries_title_subtitle_author() {
        let doc = import(&Article {
            title: "  Alps  ".to_string(),
            subtitle: Some("Ten days on foot".to_string()),
            author: Some("Sam".to_string()),
            cover_image: Some("data:image/png;base64,AAAA".to_string()),
            body: "<p>Go.</p>".to_string(),
            ..Article::default()
        });
        let cover = &doc.pages[0];
        assert_eq!(cover.kind, PageKind::Cover);
        assert_eq!(texts(cover), vec!["Alps", "Ten days on foot", "Sam"]);
        let bg = cover.background.as_ref().unwrap();
        assert!(bg.image.is_some());
        assert_eq!(doc.author.as_deref(), Some("Sam"));
    }

    #[test]
    fn test_toc_lists_section_headings() {
        let doc = import(&Article {
            title: "Guide".to_string(),
            body: "<h2>Getting there</h2><p>By train.</p><h3>Tickets</h3><h2>Where to stay</h2><p>Huts.</p>"
                .to_string(),
            ..Article::default()
        });
        assert_eq!(doc.pages[1].kind, PageKind::Toc);
        let toc = texts(&doc.pages[1]);
        assert_eq!(toc, vec!["Contents", "1. Getting there", "2. Where to stay"]);
    }

    #[test]
    fn test_toc_skipped_when_disabled_or_no_headings() {
        let article = Article {
            title: "Plain".to_string(),
            body: "<p>Just text.</p>".to_string(),
            ..Article::default()
        };
        assert!(!kinds(&import(&article)).contains(&PageKind::Toc));

        let article = Article {
            body: "<h2>Part</h2><p>x</p>".to_string(),
            ..article
        };
        let options = ImportOptions {
            include_toc: false,
            ..ImportOptions::default()
        };
        let doc = Importer::new().import(&article, &get_theme_config("minimal"), &options);
        assert!(!kinds(&doc).contains(&PageKind::Toc));
    }

    #[test]
    fn test_long_toc_continues() {
        let body: String = (0..60)
            .map(|i| format!("<h2>Stage {}</h2><p>walk</p>", i))
            .collect();
        let doc = import(&Article {
            title: "Long".to_string(),
            body,
            ..Article::default()
        });
        let toc_pages = doc.pages.iter().filter(|p| p.kind == PageKind::Toc).count();
        assert!(toc_pages >= 2);
        for page in doc.pages.iter().filter(|p| p.kind == PageKind::Toc) {
            let area = page.content_area();
            for b in &page.blocks {
                assert!(b.position.y + b.position.height <= area.bottom() + 1e-9);
            }
        }
    }

    #[test]
    fn test_meta_page_only_when_present() {
        let mut article = Article {
            title: "Route".to_string(),
            body: "<p>x</p>".to_string(),
            meta: Some(RouteMeta::default()),
            ..Article::default()
        };
        assert!(!kinds(&import(&article)).contains(&PageKind::Meta));

        article.meta = Some(RouteMeta {
            country: Some("Norway".to_string()),
            days: Some(5),
            ..RouteMeta::default()
        });
        let doc = import(&article);
        let meta = doc.pages.iter().find(|p| p.kind == PageKind::Meta).unwrap();
        let table = meta
            .blocks
            .iter()
            .find_map(|b| match &b.content {
                BlockContent::Table { rows, .. } => Some(rows.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(table, vec![vec!["Country", "Norway"], vec!["Days", "5"]]);
    }

    #[test]
    fn test_back_matter_order() {
        let doc = import(&Article {
            title: "Trip".to_string(),
            body: "<p>x</p>".to_string(),
            map: Some(RouteMap {
                points: vec!["Oslo".to_string(), "Bergen".to_string()],
                ..RouteMap::default()
            }),
            recommendations: vec![Recommendation {
                title: "Pack".to_string(),
                items: vec!["Boots".to_string(), " ".to_string()],
            }],
            ..Article::default()
        });
        assert_eq!(
            kinds(&doc),
            vec![
                PageKind::Cover,
                PageKind::Content,
                PageKind::Map,
                PageKind::Recommendations
            ]
        );
        let recs = doc.pages.last().unwrap();
        assert!(recs.blocks.iter().any(|b| matches!(
            &b.content,
            BlockContent::List { items, .. } if items == &vec!["Boots".to_string()]
        )));
    }

    #[test]
    fn test_sections_follow_body() {
        let doc = import(&Article {
            title: "Trip".to_string(),
            body: "<p>Intro</p>".to_string(),
            sections: vec![ArticleSection {
                title: "Pros".to_string(),
                markup: "<ul><li>Views</li></ul>".to_string(),
            }],
            ..Article::default()
        });
        let content: Vec<_> = doc
            .pages
            .iter()
            .filter(|p| p.kind == PageKind::Content)
            .flat_map(|p| p.blocks.iter().map(|b| b.kind()))
            .collect();
        assert_eq!(content, vec!["paragraph", "heading", "list"]);
    }

    #[test]
    fn test_article_from_json_accepts_description_alias() {
        let article = Article::from_json(r#"{"title":"T","description":"<p>x</p>"}"#).unwrap();
        assert_eq!(article.body, "<p>x</p>");
        assert!(Article::from_json("{").is_err());
    }
}
