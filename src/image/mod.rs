//! # Image Service
//!
//! URL resolution, fetching, decoding, caching and re-encoding of article
//! images.
//!
//! Loads are cached per resolved URL for the life of the service. Each URL
//! gets a once-cell, so concurrent callers asking for the same image block on
//! the first fetch instead of starting their own. Failures are cached too: a
//! broken image is fetched once per session and then served as the same
//! error, which the renderer turns into a placeholder.

pub mod loader;
pub mod url;

pub use loader::{decode, default_fetcher, ImageFetcher, LocalFetcher};
#[cfg(feature = "http")]
pub use loader::HttpFetcher;
pub use url::{resolve_url, ProxyConfig};

use crate::error::ImageError;
use image::imageops::FilterType;
use image::{DynamicImage, ImageEncoder};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

type LoadResult = Result<Arc<DynamicImage>, ImageError>;

/// Output encoding for re-encoded images and rendered pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    #[default]
    #[serde(alias = "jpg")]
    Jpeg,
}

impl ImageFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizeOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG quality, 1-100. Ignored for PNG.
    pub quality: u8,
    pub format: ImageFormat,
}

impl Default for OptimizeOptions {
    fn default() -> Self {
        Self {
            max_width: url::DEFAULT_MAX_WIDTH,
            max_height: url::DEFAULT_MAX_WIDTH,
            quality: url::DEFAULT_QUALITY,
            format: ImageFormat::Jpeg,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImageStats {
    /// Distinct URLs with a settled or in-flight entry.
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
    pub failures: usize,
}

pub struct ImageService {
    proxy: ProxyConfig,
    fetcher: Arc<dyn ImageFetcher>,
    cache: Mutex<HashMap<String, Arc<OnceLock<LoadResult>>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    failures: AtomicUsize,
}

impl std::fmt::Debug for ImageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageService")
            .field("proxy", &self.proxy)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for ImageService {
    fn default() -> Self {
        Self::new(ProxyConfig::default())
    }
}

impl ImageService {
    pub fn new(proxy: ProxyConfig) -> Self {
        Self::with_fetcher(proxy, default_fetcher())
    }

    pub fn with_fetcher(proxy: ProxyConfig, fetcher: Arc<dyn ImageFetcher>) -> Self {
        Self {
            proxy,
            fetcher,
            cache: Mutex::new(HashMap::new()),
            hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn proxy(&self) -> &ProxyConfig {
        &self.proxy
    }

    /// The URL `raw` is actually loaded from. `None` for blank input.
    pub fn resolve(&self, raw: &str) -> Option<String> {
        resolve_url(raw, &self.proxy)
    }

    /// Load and decode an image, sharing the result with every other caller
    /// of the same resolved URL.
    pub fn load(&self, raw: &str) -> LoadResult {
        let resolved = self
            .resolve(raw)
            .ok_or_else(|| ImageError::InvalidUrl(raw.to_string()))?;

        let cell = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            match cache.get(&resolved) {
                Some(cell) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    Arc::clone(cell)
                }
                None => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    let cell = Arc::new(OnceLock::new());
                    cache.insert(resolved.clone(), Arc::clone(&cell));
                    cell
                }
            }
        };

        // The map lock is released; only callers of this URL wait here.
        cell.get_or_init(|| {
            let result = self
                .fetcher
                .fetch(&resolved)
                .and_then(|bytes| decode(&bytes))
                .map(Arc::new);
            match &result {
                Ok(img) => {
                    log::debug!("loaded image {} ({}x{})", resolved, img.width(), img.height())
                }
                Err(e) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    log::warn!("image {} unavailable: {}", resolved, e);
                }
            }
            result
        })
        .clone()
    }

    /// Warm the cache for `urls` in parallel. Returns how many loaded.
    pub fn prefetch(&self, urls: &[String]) -> usize {
        let mut unique: Vec<&String> = urls.iter().filter(|u| !u.trim().is_empty()).collect();
        unique.sort();
        unique.dedup();
        unique
            .par_iter()
            .filter(|url| self.load(url).is_ok())
            .count()
    }

    /// Downscale to fit the bounds (never upscaling) and re-encode.
    pub fn optimize(
        &self,
        image: &DynamicImage,
        options: &OptimizeOptions,
    ) -> Result<OptimizedImage, ImageError> {
        let fitted = fit_within(image, options.max_width, options.max_height);
        let img: &DynamicImage = fitted.as_ref().unwrap_or(image);
        let (width, height) = (img.width(), img.height());
        let bytes = encode(img, options.format, options.quality)?;
        Ok(OptimizedImage {
            bytes,
            width,
            height,
            format: options.format,
        })
    }

    /// Drop the cache entry for one URL. Returns whether it was cached.
    pub fn evict(&self, raw: &str) -> bool {
        let Some(resolved) = self.resolve(raw) else {
            return false;
        };
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&resolved)
            .is_some()
    }

    pub fn clear(&self) {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ImageStats {
        ImageStats {
            entries: self
                .cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// A copy of `image` scaled down to fit `max_width` x `max_height`, keeping
/// its aspect ratio. `None` when it already fits.
pub fn fit_within(image: &DynamicImage, max_width: u32, max_height: u32) -> Option<DynamicImage> {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 || (w <= max_width && h <= max_height) {
        return None;
    }
    let scale = (max_width as f64 / w as f64).min(max_height as f64 / h as f64);
    let nw = ((w as f64 * scale).round() as u32).max(1);
    let nh = ((h as f64 * scale).round() as u32).max(1);
    Some(image.resize_exact(nw, nh, FilterType::Lanczos3))
}

/// Encode pixels as PNG (RGBA) or JPEG (RGB, alpha flattened onto white).
pub fn encode(
    image: &DynamicImage,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    let (w, h) = (image.width(), image.height());
    let result = match format {
        ImageFormat::Png => {
            let rgba = image.to_rgba8();
            image::codecs::png::PngEncoder::new(&mut buf).write_image(
                rgba.as_raw(),
                w,
                h,
                image::ColorType::Rgba8,
            )
        }
        ImageFormat::Jpeg => {
            let rgb = flatten_on_white(image);
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
                .write_image(rgb.as_raw(), w, h, image::ColorType::Rgb8)
        }
    };
    result.map_err(|e| ImageError::Encode(e.to_string()))?;
    Ok(buf)
}

fn flatten_on_white(image: &DynamicImage) -> image::RgbImage {
    let rgba = image.to_rgba8();
    image::RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y).0;
        let a = p[3] as u32;
        let blend = |c: u8| ((c as u32 * a + 255 * (255 - a)) / 255) as u8;
        image::Rgb([blend(p[0]), blend(p[1]), blend(p[2])])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves a fixed PNG for any URL and counts calls.
    struct CountingFetcher {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl ImageFetcher for CountingFetcher {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, ImageError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ImageError::Fetch {
                    url: url.to_string(),
                    reason: "offline".to_string(),
                });
            }
            let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
                4,
                2,
                image::Rgba([10, 20, 30, 255]),
            ));
            encode(&img, ImageFormat::Png, 90)
        }
    }

    fn service(fetcher: Arc<CountingFetcher>) -> ImageService {
        ImageService::with_fetcher(ProxyConfig::default(), fetcher)
    }

    #[test]
    fn test_load_is_cached() {
        let fetcher = CountingFetcher::new(false);
        let svc = service(fetcher.clone());
        let a = svc.load("https://cdn.example.com/a.jpg").unwrap();
        let b = svc.load("https://cdn.example.com/a.jpg").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        let stats = svc.stats();
        assert_eq!((stats.entries, stats.hits, stats.misses), (1, 1, 1));
    }

    #[test]
    fn test_failures_are_cached() {
        let fetcher = CountingFetcher::new(true);
        let svc = service(fetcher.clone());
        assert!(svc.load("https://x.com/a.jpg").is_err());
        assert!(svc.load("https://x.com/a.jpg").is_err());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(svc.stats().failures, 1);
    }

    #[test]
    fn test_blank_url_is_invalid() {
        let svc = service(CountingFetcher::new(false));
        assert!(matches!(svc.load("  "), Err(ImageError::InvalidUrl(_))));
        assert_eq!(svc.stats().entries, 0);
    }

    #[test]
    fn test_concurrent_loads_share_one_fetch() {
        let fetcher = CountingFetcher::new(false);
        let svc = service(fetcher.clone());
        let urls: Vec<String> = (0..16).map(|_| "https://x.com/same.jpg".to_string()).collect();
        let loaded: usize = urls
            .par_iter()
            .filter(|u| svc.load(u).is_ok())
            .count();
        assert_eq!(loaded, 16);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_prefetch_dedups() {
        let fetcher = CountingFetcher::new(false);
        let svc = service(fetcher.clone());
        let urls = vec![
            "https://x.com/1.jpg".to_string(),
            "https://x.com/2.jpg".to_string(),
            "https://x.com/1.jpg".to_string(),
            String::new(),
        ];
        assert_eq!(svc.prefetch(&urls), 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_evict_and_clear() {
        let fetcher = CountingFetcher::new(false);
        let svc = service(fetcher.clone());
        svc.load("https://x.com/1.jpg").unwrap();
        assert!(svc.evict("https://x.com/1.jpg"));
        assert!(!svc.evict("https://x.com/1.jpg"));
        svc.load("https://x.com/1.jpg").unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        svc.clear();
        assert_eq!(svc.stats(), ImageStats::default());
    }

    #[test]
    fn test_optimize_downscales_keeping_aspect() {
        let svc = ImageService::default();
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(400, 200));
        let out = svc
            .optimize(
                &img,
                &OptimizeOptions {
                    max_width: 100,
                    max_height: 100,
                    quality: 80,
                    format: ImageFormat::Jpeg,
                },
            )
            .unwrap();
        assert_eq!((out.width, out.height), (100, 50));
        assert!(loader::is_jpeg(&out.bytes));
    }

    #[test]
    fn test_optimize_never_upscales() {
        let svc = ImageService::default();
        let img = DynamicImage::ImageRgb8(image::RgbImage::new(40, 30));
        let out = svc
            .optimize(
                &img,
                &OptimizeOptions {
                    format: ImageFormat::Png,
                    ..OptimizeOptions::default()
                },
            )
            .unwrap();
        assert_eq!((out.width, out.height), (40, 30));
        assert!(loader::is_png(&out.bytes));
    }

    #[test]
    fn test_jpeg_flattens_alpha_on_white() {
        let img = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            2,
            2,
            image::Rgba([0, 0, 0, 0]),
        ));
        let rgb = flatten_on_white(&img);
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
    }
}
