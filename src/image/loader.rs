//! # Image Fetching and Decoding
//!
//! Turns a resolved image URL into pixels. Fetching is a seam
//! ([`ImageFetcher`]) so tests and embedders can supply bytes from anywhere.
//!
//! [`LocalFetcher`] handles everything that needs no network:
//! - `data:image/...;base64,...` and percent-encoded data URIs
//! - `file://` URLs and filesystem paths
//! - raw base64-encoded image data
//!
//! With the `http` feature, [`HttpFetcher`] adds `http(s)://` fetching and
//! falls back to [`LocalFetcher`] for everything else.

use crate::error::ImageError;
use image::DynamicImage;
use std::io::Cursor;

/// Fetch the raw bytes of an image.
pub trait ImageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError>;
}

/// Data URIs, local files and raw base64. No network access.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFetcher;

impl ImageFetcher for LocalFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        read_source_bytes(url)
    }
}

fn is_remote(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolve a source string to raw image bytes without touching the network.
fn read_source_bytes(src: &str) -> Result<Vec<u8>, ImageError> {
    if let Some(rest) = strip_prefix_ignore_case(src, "data:") {
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ImageError::InvalidUrl("data URI is missing its comma".to_string()))?;
        return if header.ends_with(";base64") {
            base64_decode(payload)
        } else {
            Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
        };
    }

    if strip_prefix_ignore_case(src, "blob:").is_some() {
        return Err(ImageError::Unsupported(
            "blob URLs only exist inside the page that created them".to_string(),
        ));
    }

    if is_remote(src) {
        return Err(ImageError::Fetch {
            url: src.to_string(),
            reason: "remote images need the `http` feature".to_string(),
        });
    }

    if let Some(path) = strip_prefix_ignore_case(src, "file://") {
        let path = urlencoding::decode(path)
            .map_err(|e| ImageError::InvalidUrl(format!("{}: {}", src, e)))?;
        return read_file(src, &path);
    }

    // Only explicit path shapes count as files; base64 data contains '/' too.
    if src.starts_with('/')
        || src.starts_with("./")
        || src.starts_with("../")
        || std::path::Path::new(src).is_file()
    {
        return read_file(src, src);
    }

    base64_decode(src).map_err(|_| ImageError::InvalidUrl(src.to_string()))
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn read_file(url: &str, path: &str) -> Result<Vec<u8>, ImageError> {
    std::fs::read(path).map_err(|e| ImageError::Fetch {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn base64_decode(input: &str) -> Result<Vec<u8>, ImageError> {
    use base64::Engine;
    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact)
        .map_err(|e| ImageError::Decode(format!("base64: {}", e)))
}

pub(crate) fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == 0xFF && data[1] == 0xD8
}

pub(crate) fn is_png(data: &[u8]) -> bool {
    data.len() >= 4 && data[0] == 0x89 && data[1] == 0x50 && data[2] == 0x4E && data[3] == 0x47
}

/// Decode image bytes of any supported format (JPEG, PNG, WebP).
pub fn decode(data: &[u8]) -> Result<DynamicImage, ImageError> {
    if data.len() < 4 {
        return Err(ImageError::Decode("image data too short".to_string()));
    }
    let reader = image::io::Reader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ImageError::Decode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(ImageError::Unsupported(
            "unrecognized image format (expected JPEG, PNG or WebP)".to_string(),
        ));
    }
    reader.decode().map_err(|e| ImageError::Decode(e.to_string()))
}

/// Fetches `http(s)` URLs with a blocking client; everything else goes to
/// [`LocalFetcher`].
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(20);

    pub fn new() -> Result<Self, ImageError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Self::TIMEOUT)
            .user_agent(concat!("pageflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ImageError::Fetch {
                url: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl ImageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
        if !is_remote(url) {
            return LocalFetcher.fetch(url);
        }
        let fail = |reason: String| ImageError::Fetch {
            url: url.to_string(),
            reason,
        };
        let response = self
            .client
            .get(url)
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| fail(e.to_string()))?;
        let bytes = response.bytes().map_err(|e| fail(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// The best fetcher this build supports.
pub fn default_fetcher() -> std::sync::Arc<dyn ImageFetcher> {
    #[cfg(feature = "http")]
    {
        match HttpFetcher::new() {
            Ok(fetcher) => return std::sync::Arc::new(fetcher),
            Err(e) => log::warn!("HTTP image fetching unavailable: {}", e),
        }
    }
    std::sync::Arc::new(LocalFetcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(color: [u8; 4]) -> Vec<u8> {
        let mut img = image::RgbaImage::new(1, 1);
        img.put_pixel(0, 0, image::Rgba(color));
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(encoder, img.as_raw(), 1, 1, image::ColorType::Rgba8)
            .unwrap();
        buf
    }

    #[test]
    fn test_is_jpeg() {
        assert!(is_jpeg(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(!is_jpeg(&[0x89, 0x50, 0x4E, 0x47]));
        assert!(!is_jpeg(&[0xFF]));
    }

    #[test]
    fn test_is_png() {
        assert!(is_png(&[0x89, 0x50, 0x4E, 0x47]));
        assert!(!is_png(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(!is_png(&[0x89, 0x50]));
    }

    #[test]
    fn test_invalid_data_uri() {
        assert!(matches!(
            LocalFetcher.fetch("data:image/png;base64"),
            Err(ImageError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_base64_data_uri() {
        use base64::Engine;
        let png = png_bytes([0, 255, 0, 255]);
        let b64 = base64::engine::general_purpose::STANDARD.encode(&png);
        let bytes = LocalFetcher
            .fetch(&format!("data:image/png;base64,{}", b64))
            .unwrap();
        assert_eq!(bytes, png);
        let img = decode(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (1, 1));
    }

    #[test]
    fn test_remote_without_http_feature_fails() {
        let err = LocalFetcher.fetch("https://example.com/a.jpg").unwrap_err();
        assert!(matches!(err, ImageError::Fetch { .. }));
    }

    #[test]
    fn test_blob_unsupported() {
        assert!(matches!(
            LocalFetcher.fetch("blob:https://x/1"),
            Err(ImageError::Unsupported(_))
        ));
    }

    #[test]
    fn test_file_url_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dot.png");
        std::fs::write(&path, png_bytes([255, 0, 0, 255])).unwrap();
        let path_str = path.to_str().unwrap();

        let direct = LocalFetcher.fetch(path_str).unwrap();
        let via_url = LocalFetcher.fetch(&format!("file://{}", path_str)).unwrap();
        assert_eq!(direct, via_url);

        let missing = LocalFetcher.fetch("/definitely/not/here.png").unwrap_err();
        assert!(matches!(missing, ImageError::Fetch { .. }));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode(&[0, 1]), Err(ImageError::Decode(_))));
        assert!(matches!(
            decode(&[0x00, 0x01, 0x02, 0x03, 0x04]),
            Err(ImageError::Unsupported(_))
        ));
    }

    #[test]
    fn test_decode_jpeg() {
        let img = image::RgbImage::from_fn(2, 2, |_, _| image::Rgb([0, 128, 255]));
        let mut buf = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new(&mut buf);
        image::ImageEncoder::write_image(encoder, img.as_raw(), 2, 2, image::ColorType::Rgb8)
            .unwrap();
        let decoded = decode(&buf).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (2, 2));
    }
}
