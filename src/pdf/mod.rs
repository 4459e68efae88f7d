//! # PDF Assembler
//!
//! Combines rendered page images into one PDF file.
//!
//! Each page becomes a single full-page image XObject, sized so the page
//! keeps the physical dimensions it was rendered at (`pixels / dpi * 72`
//! points). JPEG pages are embedded as-is with `/DCTDecode`; anything else is
//! decoded and stored as Flate-compressed RGB, with an `/SMask` when the page
//! has transparency.
//!
//! ## PDF Structure (simplified)
//!
//! ```text
//! %PDF-1.7            <- header
//! 1 0 obj ... endobj  <- catalog, page tree, images, content streams, pages
//! ...
//! xref                <- cross-reference table (byte offsets of each object)
//! trailer             <- points to the root and info objects
//! %%EOF
//! ```

use std::fmt::Write as FmtWrite;
use std::io::Write as IoWrite;

use crate::error::AssemblyError;
use crate::image::loader::{is_jpeg, is_png};
use crate::image::ImageFormat;
use crate::render::RenderedPage;
use chrono::{DateTime, Utc};
use miniz_oxide::deflate::compress_to_vec_zlib;

const POINTS_PER_INCH: f64 = 72.0;

/// Document information written to the PDF Info dictionary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct AssembledPdf {
    pub bytes: Vec<u8>,
    pub page_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PdfAssembler {
    metadata: PdfMetadata,
}

/// Tracks allocated PDF objects during writing.
struct PdfBuilder {
    objects: Vec<Vec<u8>>,
}

impl PdfBuilder {
    fn push(&mut self, data: Vec<u8>) -> usize {
        self.objects.push(data);
        self.objects.len() - 1
    }

    fn push_stream(&mut self, dict: &str, body: &[u8]) -> usize {
        let mut data: Vec<u8> = Vec::with_capacity(body.len() + dict.len() + 32);
        let _ = write!(data, "<< {} /Length {} >>\nstream\n", dict, body.len());
        data.extend_from_slice(body);
        data.extend_from_slice(b"\nendstream");
        self.push(data)
    }
}

/// Pixels of one page, ready to embed.
enum PageImage<'a> {
    Jpeg { data: &'a [u8], gray: bool, width: u32, height: u32 },
    Decoded { rgb: Vec<u8>, alpha: Option<Vec<u8>>, width: u32, height: u32 },
}

impl PdfAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(metadata: PdfMetadata) -> Self {
        Self { metadata }
    }

    /// Assemble pages, ordered by page index, into a PDF.
    pub fn assemble(&self, pages: &[RenderedPage]) -> Result<AssembledPdf, AssemblyError> {
        if pages.is_empty() {
            return Err(AssemblyError::NoPages);
        }
        let mut ordered: Vec<&RenderedPage> = pages.iter().collect();
        ordered.sort_by_key(|p| p.page_index);

        let mut builder = PdfBuilder {
            objects: Vec::new(),
        };
        // 0 = placeholder (PDF objects are 1-indexed), 1 = Catalog, 2 = Pages
        builder.objects.push(Vec::new());
        builder.objects.push(Vec::new());
        builder.objects.push(Vec::new());

        let mut page_obj_ids = Vec::with_capacity(ordered.len());
        for page in ordered {
            let embedding = |reason: String| AssemblyError::Embedding {
                page_index: page.page_index,
                reason,
            };
            if page.dpi == 0 || page.pixel_width == 0 || page.pixel_height == 0 {
                return Err(embedding(format!(
                    "invalid raster {}x{} at {} dpi",
                    page.pixel_width, page.pixel_height, page.dpi
                )));
            }
            let image = page_image(page).map_err(embedding)?;
            let image_obj_id = write_image_xobject(&mut builder, &image);

            let width_pt = page.pixel_width as f64 / page.dpi as f64 * POINTS_PER_INCH;
            let height_pt = page.pixel_height as f64 / page.dpi as f64 * POINTS_PER_INCH;
            let content = format!(
                "q\n{:.4} 0 0 {:.4} 0 0 cm\n/Im0 Do\nQ\n",
                width_pt, height_pt
            );
            let compressed = compress_to_vec_zlib(content.as_bytes(), 6);
            let content_obj_id = builder.push_stream("/Filter /FlateDecode", &compressed);

            let page_dict = format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] \
                 /Contents {} 0 R /Resources << /XObject << /Im0 {} 0 R >> >> >>",
                width_pt, height_pt, content_obj_id, image_obj_id
            );
            page_obj_ids.push(builder.push(page_dict.into_bytes()));
        }

        builder.objects[1] = b"<< /Type /Catalog /Pages 2 0 R >>".to_vec();

        let kids: String = page_obj_ids
            .iter()
            .map(|id| format!("{} 0 R", id))
            .collect::<Vec<_>>()
            .join(" ");
        builder.objects[2] = format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids,
            page_obj_ids.len()
        )
        .into_bytes();

        let info_obj_id = builder.push(self.info_dict().into_bytes());
        let bytes = serialize(&builder, info_obj_id);

        log::debug!("assembled {} pages into {} bytes", page_obj_ids.len(), bytes.len());
        Ok(AssembledPdf {
            bytes,
            page_count: page_obj_ids.len(),
        })
    }

    fn info_dict(&self) -> String {
        let md = &self.metadata;
        let mut info = String::from("<< ");
        for (key, value) in [
            ("Title", &md.title),
            ("Author", &md.author),
            ("Subject", &md.subject),
        ] {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                let _ = write!(info, "/{} {} ", key, pdf_text_string(value));
            }
        }
        if let Some(created) = md.created {
            let _ = write!(info, "/CreationDate ({}) ", created.format("D:%Y%m%d%H%M%S+00'00'"));
        }
        let _ = write!(
            info,
            "/Producer (pageflow {}) /Creator (pageflow) >>",
            env!("CARGO_PKG_VERSION")
        );
        info
    }
}

fn page_image(page: &RenderedPage) -> Result<PageImage<'_>, String> {
    let data = page.image_data.as_slice();
    if data.is_empty() {
        return Err("page image is empty".to_string());
    }
    if page.format == ImageFormat::Jpeg && is_jpeg(data) {
        return Ok(PageImage::Jpeg {
            data,
            gray: jpeg_is_grayscale(data),
            width: page.pixel_width,
            height: page.pixel_height,
        });
    }
    if page.format == ImageFormat::Png && !is_png(data) {
        log::warn!("page {} is labelled PNG but is not; decoding anyway", page.page_index);
    }

    let img = crate::image::decode(data).map_err(|e| e.to_string())?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let pixel_count = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixel_count * 3);
    let mut alpha = Vec::with_capacity(pixel_count);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        rgb.extend_from_slice(&pixel.0[..3]);
        alpha.push(pixel.0[3]);
        has_alpha |= pixel.0[3] != 255;
    }
    Ok(PageImage::Decoded {
        rgb,
        alpha: has_alpha.then_some(alpha),
        width,
        height,
    })
}

/// Scan JPEG markers for the frame header and report a single-component
/// (grayscale) frame.
fn jpeg_is_grayscale(data: &[u8]) -> bool {
    let mut i = 2; // skip SOI marker (FF D8)
    while i + 1 < data.len() {
        if data[i] != 0xFF {
            break;
        }
        let marker = data[i + 1];
        // SOF markers: C0-C3, C5-C7, C9-CB, CD-CF
        let is_sof = matches!(marker, 0xC0..=0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF);
        if is_sof && i + 9 < data.len() {
            // length(2) + precision(1) + height(2) + width(2) + components(1)
            return data[i + 9] == 1;
        }
        if i + 3 < data.len() {
            let seg_len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
            i += 2 + seg_len;
        } else {
            break;
        }
    }
    false
}

fn write_image_xobject(builder: &mut PdfBuilder, image: &PageImage) -> usize {
    match image {
        PageImage::Jpeg {
            data,
            gray,
            width,
            height,
        } => {
            let color_space = if *gray { "/DeviceGray" } else { "/DeviceRGB" };
            let dict = format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace {} /BitsPerComponent 8 /Filter /DCTDecode",
                width, height, color_space
            );
            builder.push_stream(&dict, data)
        }
        PageImage::Decoded {
            rgb,
            alpha,
            width,
            height,
        } => {
            let smask_ref = alpha
                .as_ref()
                .map(|alpha| {
                    let dict = format!(
                        "/Type /XObject /Subtype /Image /Width {} /Height {} \
                         /ColorSpace /DeviceGray /BitsPerComponent 8 /Filter /FlateDecode",
                        width, height
                    );
                    let id = builder.push_stream(&dict, &compress_to_vec_zlib(alpha, 6));
                    format!(" /SMask {} 0 R", id)
                })
                .unwrap_or_default();
            let dict = format!(
                "/Type /XObject /Subtype /Image /Width {} /Height {} \
                 /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /FlateDecode{}",
                width, height, smask_ref
            );
            builder.push_stream(&dict, &compress_to_vec_zlib(rgb, 6))
        }
    }
}

/// A PDF text string: literal for printable ASCII, UTF-16BE hex otherwise.
fn pdf_text_string(s: &str) -> String {
    if s.chars().all(|c| (' '..='~').contains(&c)) {
        return format!("({})", escape_pdf_string(s));
    }
    let mut hex = String::from("<FEFF");
    for unit in s.encode_utf16() {
        let _ = write!(hex, "{:04X}", unit);
    }
    hex.push('>');
    hex
}

/// Escape special characters in a PDF literal string.
fn escape_pdf_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('(', "\\(")
        .replace(')', "\\)")
}

/// Serialize all objects into the final PDF byte stream.
fn serialize(builder: &PdfBuilder, info_obj_id: usize) -> Vec<u8> {
    let mut output: Vec<u8> = Vec::new();
    let mut offsets: Vec<usize> = vec![0; builder.objects.len()];

    output.extend_from_slice(b"%PDF-1.7\n");
    output.extend_from_slice(b"%\xe2\xe3\xcf\xd3\n");

    for (i, obj) in builder.objects.iter().enumerate().skip(1) {
        offsets[i] = output.len();
        let _ = write!(output, "{} 0 obj\n", i);
        output.extend_from_slice(obj);
        output.extend_from_slice(b"\nendobj\n\n");
    }

    let xref_offset = output.len();
    let _ = write!(output, "xref\n0 {}\n", builder.objects.len());
    let _ = write!(output, "0000000000 65535 f \n");
    for offset in offsets.iter().skip(1) {
        let _ = write!(output, "{:010} 00000 n \n", offset);
    }

    let _ = write!(
        output,
        "trailer\n<< /Size {} /Root 1 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
        builder.objects.len(),
        info_obj_id,
        xref_offset
    );
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn rendered(
        index: usize,
        format: ImageFormat,
        width: u32,
        height: u32,
        alpha: u8,
    ) -> RenderedPage {
        let pixels = RgbaImage::from_pixel(width, height, Rgba([200, 100, 50, alpha]));
        let img = DynamicImage::ImageRgba8(pixels);
        RenderedPage {
            page_id: format!("page-{}", index),
            page_index: index,
            image_data: crate::image::encode(&img, format, 80).unwrap(),
            format,
            pixel_width: width,
            pixel_height: height,
            dpi: 72,
        }
    }

    fn text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn test_zero_pages_is_fatal() {
        let err = PdfAssembler::new().assemble(&[]).unwrap_err();
        assert!(matches!(err, AssemblyError::NoPages));
    }

    #[test]
    fn test_pdf_structure() {
        let pdf = PdfAssembler::new()
            .assemble(&[rendered(1, ImageFormat::Jpeg, 10, 20, 255)])
            .unwrap();
        assert_eq!(pdf.page_count, 1);
        let bytes = &pdf.bytes;
        assert!(bytes.starts_with(b"%PDF-1.7"));
        assert!(bytes.ends_with(b"%%EOF\n"));

        // startxref points at the xref keyword.
        let s = text(bytes);
        let tail = &s[s.rfind("startxref\n").unwrap() + 10..];
        let offset: usize = tail.lines().next().unwrap().parse().unwrap();
        assert_eq!(&bytes[offset..offset + 4], b"xref");
    }

    #[test]
    fn test_jpeg_is_passed_through() {
        let page = rendered(1, ImageFormat::Jpeg, 8, 8, 255);
        let pdf = PdfAssembler::new().assemble(std::slice::from_ref(&page)).unwrap();
        let s = text(&pdf.bytes);
        assert!(s.contains("/Filter /DCTDecode"));
        assert!(s.contains("/ColorSpace /DeviceRGB"));
        assert!(pdf
            .bytes
            .windows(page.image_data.len())
            .any(|w| w == page.image_data.as_slice()));
    }

    #[test]
    fn test_png_with_alpha_gets_smask() {
        let pdf = PdfAssembler::new()
            .assemble(&[rendered(1, ImageFormat::Png, 4, 4, 128)])
            .unwrap();
        assert!(text(&pdf.bytes).contains("/SMask"));

        let opaque = PdfAssembler::new()
            .assemble(&[rendered(1, ImageFormat::Png, 4, 4, 255)])
            .unwrap();
        let s = text(&opaque.bytes);
        assert!(!s.contains("/SMask"));
        assert!(s.contains("/ColorSpace /DeviceRGB"));
    }

    #[test]
    fn test_page_size_from_pixels_and_dpi() {
        let mut page = rendered(1, ImageFormat::Jpeg, 1240, 10, 255);
        page.dpi = 150;
        let pdf = PdfAssembler::new().assemble(&[page]).unwrap();
        assert!(text(&pdf.bytes).contains("/MediaBox [0 0 595.20 4.80]"));
    }

    #[test]
    fn test_pages_sorted_by_index() {
        let pages = vec![
            rendered(2, ImageFormat::Jpeg, 20, 20, 255),
            rendered(1, ImageFormat::Jpeg, 10, 10, 255),
        ];
        let pdf = PdfAssembler::new().assemble(&pages).unwrap();
        let s = text(&pdf.bytes);
        let first = s.find("/MediaBox [0 0 10.00 10.00]").unwrap();
        let second = s.find("/MediaBox [0 0 20.00 20.00]").unwrap();
        assert!(first < second);
        assert_eq!(pdf.page_count, 2);
    }

    #[test]
    fn test_undecodable_page_is_embedding_error() {
        let mut page = rendered(3, ImageFormat::Png, 4, 4, 255);
        page.image_data = vec![1, 2, 3, 4, 5, 6];
        match PdfAssembler::new().assemble(&[page]) {
            Err(AssemblyError::Embedding { page_index, .. }) => assert_eq!(page_index, 3),
            other => panic!("expected embedding error, got {:?}", other.map(|p| p.page_count)),
        }
    }

    #[test]
    fn test_zero_dpi_is_embedding_error() {
        let mut page = rendered(1, ImageFormat::Jpeg, 4, 4, 255);
        page.dpi = 0;
        assert!(matches!(
            PdfAssembler::new().assemble(&[page]),
            Err(AssemblyError::Embedding { page_index: 1, .. })
        ));
    }

    #[test]
    fn test_metadata_in_pdf() {
        let pdf = PdfAssembler::with_metadata(PdfMetadata {
            title: Some("Walks (and more)".to_string()),
            author: Some("Ана".to_string()),
            subject: None,
            created: None,
        })
        .assemble(&[rendered(1, ImageFormat::Jpeg, 4, 4, 255)])
        .unwrap();
        let s = text(&pdf.bytes);
        assert!(s.contains("/Title (Walks \\(and more\\))"));
        assert!(s.contains("/Author <FEFF0410043D0430>"));
        assert!(s.contains("/Producer (pageflow"));
    }

    #[test]
    fn test_escape_pdf_string() {
        assert_eq!(escape_pdf_string("Hello (World)"), "Hello \\(World\\)");
        assert_eq!(escape_pdf_string("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_grayscale_jpeg_detection() {
        let gray = image::GrayImage::from_pixel(4, 4, image::Luma([90]));
        let mut buf = Vec::new();
        image::ImageEncoder::write_image(
            image::codecs::jpeg::JpegEncoder::new(&mut buf),
            gray.as_raw(),
            4,
            4,
            image::ColorType::L8,
        )
        .unwrap();
        assert!(jpeg_is_grayscale(&buf));
        let color = rendered(1, ImageFormat::Jpeg, 4, 4, 255);
        assert!(!jpeg_is_grayscale(&color.image_data));
    }
}
