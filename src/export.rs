//! The export pipeline: article → document → rendered pages → PDF.
//!
//! [`ExportService`] owns every stage's state (theme registry, image cache,
//! fonts) so nothing is global. Pages render one at a time in document
//! order; images referenced anywhere in the document are prefetched in
//! parallel first.

use crate::config::ExportOptions;
use crate::error::ExportError;
use crate::image::{ImageFetcher, ImageService};
use crate::layout::{Article, Importer};
use crate::model::{BlockContent, Document};
use crate::pdf::{PdfAssembler, PdfMetadata};
use crate::render::{PageRenderer, RenderedPage};
use crate::theme::{Theme, ThemeRegistry};
use chrono::Utc;
use std::sync::Arc;

const FALLBACK_FILENAME: &str = "document";

// Progress milestones, in percent.
const PROGRESS_PARSE: u8 = 5;
const PROGRESS_LAYOUT: u8 = 15;
const PROGRESS_RENDER_END: u8 = 90;
const PROGRESS_ASSEMBLE: u8 = 95;

/// A finished export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    pub bytes: Vec<u8>,
    /// `<title>_<YYYY-MM-DD>.pdf`, title characters other than letters and
    /// digits replaced by `_`.
    pub filename: String,
    pub size: usize,
    pub page_count: usize,
}

pub struct ExportService {
    options: ExportOptions,
    themes: ThemeRegistry,
    importer: Importer,
    renderer: PageRenderer,
}

impl ExportService {
    /// Validate `options`, register their fonts, and set up an image
    /// service with the default fetcher.
    pub fn new(options: ExportOptions) -> Result<Self, ExportError> {
        let images = ImageService::new(options.proxy.clone());
        Self::build(options, images)
    }

    pub fn with_fetcher(
        options: ExportOptions,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Result<Self, ExportError> {
        let images = ImageService::with_fetcher(options.proxy.clone(), fetcher);
        Self::build(options, images)
    }

    fn build(options: ExportOptions, images: ImageService) -> Result<Self, ExportError> {
        options.validate()?;
        let fonts = options.font_context()?;
        let renderer = PageRenderer::new(Arc::new(images))
            .with_fonts(fonts)
            .with_options(options.render_options());
        Ok(Self {
            options,
            themes: ThemeRegistry::new(),
            importer: Importer::new(),
            renderer,
        })
    }

    /// Replace the theme registry, e.g. to add custom themes.
    pub fn with_themes(mut self, themes: ThemeRegistry) -> Self {
        self.themes = themes;
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    pub fn themes(&self) -> &ThemeRegistry {
        &self.themes
    }

    pub fn images(&self) -> &Arc<ImageService> {
        self.renderer.images()
    }

    fn theme(&self, name: &str) -> &Theme {
        if !self.themes.contains(name) {
            log::warn!("unknown theme '{}', using '{}'", name, crate::theme::DEFAULT_THEME);
        }
        self.themes.get(name)
    }

    /// Parse and paginate an article with the configured theme.
    pub fn layout(&self, article: &Article) -> Document {
        let theme = self.theme(&self.options.theme);
        self.importer
            .import(article, theme, &self.options.import_options())
    }

    pub fn export(&self, article: &Article) -> Result<ExportResult, ExportError> {
        self.export_with_progress(article, |_, _| {})
    }

    /// Export an article, reporting `(percent, message)` after each phase
    /// and each page. The last report is `(100, "Done")`.
    pub fn export_with_progress<F>(
        &self,
        article: &Article,
        mut progress: F,
    ) -> Result<ExportResult, ExportError>
    where
        F: FnMut(u8, &str),
    {
        log::info!("exporting '{}'", article.title);
        progress(PROGRESS_PARSE, "Parsing content");
        let document = self.layout(article);
        progress(
            PROGRESS_LAYOUT,
            &format!("Laid out {} pages", document.page_count()),
        );
        self.export_document_with_progress(&document, progress)
    }

    pub fn export_document(&self, document: &Document) -> Result<ExportResult, ExportError> {
        self.export_document_with_progress(document, |_, _| {})
    }

    /// Render and assemble an already laid-out document, e.g. a stored
    /// draft.
    pub fn export_document_with_progress<F>(
        &self,
        document: &Document,
        mut progress: F,
    ) -> Result<ExportResult, ExportError>
    where
        F: FnMut(u8, &str),
    {
        let theme = self.theme(&document.theme);

        let urls = image_urls(document);
        if !urls.is_empty() {
            let loaded = self.images().prefetch(&urls);
            log::info!("prefetched {}/{} images", loaded, urls.len());
        }

        let total = document.page_count();
        let mut rendered = Vec::with_capacity(total);
        for (i, page) in document.pages.iter().enumerate() {
            let page_image = self
                .renderer
                .render_page(page, theme, self.options.dpi)
                .map_err(|e| ExportError::Render(format!("page {}: {}", page.index, e)))?;
            rendered.push(page_image);
            let done = i + 1;
            let span = (PROGRESS_RENDER_END - PROGRESS_LAYOUT) as usize;
            let percent = PROGRESS_LAYOUT as usize + span * done / total.max(1);
            progress(
                percent as u8,
                &format!("Rendered page {} of {}", done, total),
            );
        }

        progress(PROGRESS_ASSEMBLE, "Assembling PDF");
        let assembler = PdfAssembler::with_metadata(PdfMetadata {
            title: Some(document.title.clone()),
            author: document.author.clone(),
            subject: None,
            created: Some(Utc::now()),
        });
        let pdf = assembler.assemble(&rendered)?;
        let size = pdf.bytes.len();
        log::info!(
            "exported '{}': {} pages, {} bytes",
            document.title,
            pdf.page_count,
            size
        );
        progress(100, "Done");

        Ok(ExportResult {
            bytes: pdf.bytes,
            filename: export_filename(&document.title),
            size,
            page_count: pdf.page_count,
        })
    }

    /// Render one page of `document` for preview.
    pub fn preview_page(
        &self,
        document: &Document,
        page_id: &str,
    ) -> Result<RenderedPage, ExportError> {
        let page = document.page(page_id)?;
        let theme = self.theme(&document.theme);
        self.renderer
            .render_page(page, theme, self.options.dpi)
            .map_err(|e| ExportError::Render(e.to_string()))
    }
}

/// Every image URL a document references: page backgrounds, block
/// background images, image, gallery and map blocks.
pub fn image_urls(document: &Document) -> Vec<String> {
    let mut urls = Vec::new();
    for page in &document.pages {
        if let Some(url) = page.background.as_ref().and_then(|b| b.image.clone()) {
            urls.push(url);
        }
        for block in page.blocks.iter().filter(|b| !b.style.hidden) {
            if let Some(url) = &block.style.background_image {
                urls.push(url.clone());
            }
            match &block.content {
                BlockContent::Image { url, .. } => urls.push(url.clone()),
                BlockContent::Gallery { images, .. } => {
                    urls.extend(images.iter().map(|img| img.url.clone()))
                }
                BlockContent::Map {
                    image_url: Some(url),
                    ..
                } => urls.push(url.clone()),
                _ => {}
            }
        }
    }
    urls
}

fn export_filename(title: &str) -> String {
    let mut stem: String = title
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if stem.is_empty() {
        stem = FALLBACK_FILENAME.to_string();
    }
    format!("{}_{}.pdf", stem, Utc::now().format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AssemblyError, ImageError, ModelError};
    use crate::image::ImageFormat;
    use crate::model::PageKind;

    struct NoNetwork;

    impl ImageFetcher for NoNetwork {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
            Err(ImageError::Fetch {
                url: url.to_string(),
                reason: "offline".to_string(),
            })
        }
    }

    fn fast_options() -> ExportOptions {
        ExportOptions {
            dpi: 36,
            ..ExportOptions::default()
        }
    }

    fn service() -> ExportService {
        ExportService::with_fetcher(fast_options(), Arc::new(NoNetwork)).unwrap()
    }

    fn article() -> Article {
        Article {
            title: "Alpine Loop".to_string(),
            author: Some("Kim".to_string()),
            body: "<h2>Day one</h2><p>We set off early.</p><img src=\"https://example.com/a.jpg\">"
                .to_string(),
            ..Article::default()
        }
    }

    #[test]
    fn test_export_produces_pdf() {
        let result = service().export(&article()).unwrap();
        assert!(result.bytes.starts_with(b"%PDF-"));
        assert_eq!(result.size, result.bytes.len());
        assert!(result.page_count >= 2);
        assert!(result.filename.starts_with("Alpine_Loop_"));
        assert!(result.filename.ends_with(".pdf"));
    }

    #[test]
    fn test_progress_is_monotonic_and_ends_done() {
        let mut reports: Vec<(u8, String)> = Vec::new();
        service()
            .export_with_progress(&article(), |p, m| reports.push((p, m.to_string())))
            .unwrap();
        assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(reports.last().unwrap(), &(100, "Done".to_string()));
        assert!(reports.iter().any(|(_, m)| m.starts_with("Rendered page 1 of")));
    }

    #[test]
    fn test_layout_uses_configured_theme() {
        let svc = ExportService::with_fetcher(
            ExportOptions {
                theme: "sepia".to_string(),
                ..fast_options()
            },
            Arc::new(NoNetwork),
        )
        .unwrap();
        let doc = svc.layout(&article());
        assert_eq!(doc.theme, "sepia");
        assert_eq!(doc.pages[0].kind, PageKind::Cover);
    }

    #[test]
    fn test_unknown_theme_falls_back() {
        let svc = ExportService::with_fetcher(
            ExportOptions {
                theme: "not-a-real-theme".to_string(),
                ..fast_options()
            },
            Arc::new(NoNetwork),
        )
        .unwrap();
        assert_eq!(svc.layout(&article()).theme, "minimal");
    }

    #[test]
    fn test_invalid_options_rejected() {
        let err = ExportService::new(ExportOptions {
            dpi: 5,
            ..ExportOptions::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, ExportError::Config(_)));
    }

    #[test]
    fn test_empty_document_is_fatal() {
        let svc = service();
        let mut doc = svc.layout(&article());
        doc.pages.clear();
        let err = svc.export_document(&doc).unwrap_err();
        assert!(matches!(err, ExportError::Assembly(AssemblyError::NoPages)));
    }

    #[test]
    fn test_preview_page() {
        let svc = service();
        let doc = svc.layout(&article());
        let page = svc.preview_page(&doc, &doc.pages[1].id).unwrap();
        assert_eq!(page.page_index, 2);
        assert_eq!(page.format, ImageFormat::Jpeg);
        let err = svc.preview_page(&doc, "missing").unwrap_err();
        assert!(matches!(err, ExportError::Model(ModelError::PageNotFound(_))));
    }

    #[test]
    fn test_unreachable_images_are_prefetched_once() {
        let svc = service();
        svc.export(&article()).unwrap();
        let stats = svc.images().stats();
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_image_urls_collects_all_sources() {
        let doc = service().layout(&Article {
            cover_image: Some("cover.jpg".to_string()),
            body: "<img src=\"a.jpg\"><div class=\"gallery\"><img src=\"b.jpg\"><img src=\"c.jpg\"></div>"
                .to_string(),
            ..Article::default()
        });
        let urls = image_urls(&doc);
        for url in ["cover.jpg", "a.jpg", "b.jpg", "c.jpg"] {
            assert!(urls.iter().any(|u| u == url), "missing {}", url);
        }
    }

    #[test]
    fn test_filename_sanitizes_title() {
        let name = export_filename("Trip: Rome & Naples!");
        assert!(name.starts_with("Trip__Rome___Naples__"));
        assert!(export_filename("Путешествие").starts_with("Путешествие_"));
        assert!(export_filename("   ").starts_with("document_"));
    }
}
