//! Image URL resolution: decide where an image reference is actually loaded
//! from.
//!
//! Local references (data URIs, blob and file URLs, filesystem paths) pass
//! through untouched. Remote images are routed through a resizing proxy so
//! exports never pull full-size originals, and references to development
//! hosts are rewritten to the public site first. With no public site
//! configured, development-host images are fetched directly: the proxy
//! cannot reach them.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PROXY: &str = "https://images.weserv.nl/";
pub const DEFAULT_MAX_WIDTH: u32 = 1600;
pub const DEFAULT_QUALITY: u8 = 85;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub base_url: String,
    pub max_width: u32,
    pub quality: u8,
    /// Origin that site-relative paths (`/uploads/a.jpg`) belong to. Without
    /// it they are treated as local files.
    pub public_origin: Option<String>,
    /// Host that loopback and private-network URLs are rewritten to. Without
    /// it such URLs bypass the proxy.
    pub canonical_host: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_PROXY.to_string(),
            max_width: DEFAULT_MAX_WIDTH,
            quality: DEFAULT_QUALITY,
            public_origin: None,
            canonical_host: None,
        }
    }
}

/// Whether `url` names something on this machine or inline data.
pub fn is_local(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("data:")
        || lower.starts_with("blob:")
        || lower.starts_with("file://")
        || url.starts_with("./")
        || url.starts_with("../")
        || url.starts_with('~')
}

/// Split `scheme://rest`.
fn split_scheme(url: &str) -> Option<(&str, &str)> {
    let (scheme, rest) = url.split_once("://")?;
    let valid = !scheme.is_empty()
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some((scheme, rest))
}

/// Split `host[:port]/path?query` into the authority and the remainder
/// (which keeps its leading `/`, `?` or `#`).
fn split_authority(rest: &str) -> (&str, &str) {
    let end = rest
        .find(|c: char| matches!(c, '/' | '?' | '#'))
        .unwrap_or(rest.len());
    rest.split_at(end)
}

/// The bare host name of an authority: no userinfo, port or IPv6 brackets.
pub fn host_name(authority: &str) -> String {
    let host = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = if let Some(v6) = host.strip_prefix('[') {
        v6.split(']').next().unwrap_or(v6)
    } else {
        host.split(':').next().unwrap_or(host)
    };
    host.to_ascii_lowercase()
}

/// Loopback and RFC 1918 hosts, which only resolve on a developer machine.
pub fn is_private_host(host: &str) -> bool {
    if host == "localhost" || host.ends_with(".localhost") || host == "::1" || host == "0.0.0.0" {
        return true;
    }
    let octets: Vec<u8> = host.split('.').filter_map(|p| p.parse().ok()).collect();
    if octets.len() != 4 || host.split('.').count() != 4 {
        return false;
    }
    match (octets[0], octets[1]) {
        (127, _) | (10, _) | (192, 168) => true,
        (172, b) => (16..=31).contains(&b),
        _ => false,
    }
}

/// Resolve an image reference to the URL it should be loaded from.
/// Returns `None` for blank input.
pub fn resolve_url(raw: &str, proxy: &ProxyConfig) -> Option<String> {
    let url = raw.trim();
    if url.is_empty() {
        return None;
    }
    if is_local(url) {
        return Some(url.to_string());
    }

    let mut url = match url.strip_prefix("//") {
        Some(rest) => format!("https://{}", rest),
        None => url.to_string(),
    };

    if url.starts_with('/') {
        match proxy.public_origin.as_deref() {
            Some(origin) => url = format!("{}{}", origin.trim_end_matches('/'), url),
            None => return Some(url),
        }
    }

    let Some((scheme, rest)) = split_scheme(&url) else {
        // A bare relative path.
        return Some(url);
    };
    let scheme = scheme.to_ascii_lowercase();
    if scheme != "http" && scheme != "https" {
        return Some(url);
    }

    let (authority, path) = split_authority(rest);
    let host = host_name(authority);

    let proxy_host = split_scheme(&proxy.base_url)
        .map(|(_, r)| host_name(split_authority(r).0))
        .unwrap_or_default();
    if !proxy_host.is_empty() && host == proxy_host {
        return Some(url);
    }

    let mut target = format!("{}{}", authority, path);
    if is_private_host(&host) {
        match proxy.canonical_host.as_deref() {
            Some(canonical) => {
                let canonical = canonical.trim_end_matches('/');
                let canonical = split_scheme(canonical).map_or(canonical, |(_, r)| r);
                target = format!("{}{}", canonical, path);
                url = format!("https://{}", target);
                log::debug!("rewrote private image host {} to {}", host, canonical);
            }
            None => {
                log::debug!("image on private host {} fetched directly", host);
                return Some(url);
            }
        }
    }

    if !proxy.enabled {
        return Some(url);
    }

    Some(format!(
        "{}?url={}&w={}&q={}&fit=inside",
        proxy.base_url,
        urlencoding::encode(&target),
        proxy.max_width,
        proxy.quality
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(url: &str) -> Option<String> {
        resolve_url(url, &ProxyConfig::default())
    }

    #[test]
    fn test_blank_is_none() {
        assert_eq!(resolve(""), None);
        assert_eq!(resolve("   "), None);
    }

    #[test]
    fn test_local_references_unchanged() {
        for url in [
            "data:image/png;base64,AAAA",
            "blob:https://site/123",
            "file:///tmp/a.png",
            "./a.png",
            "../img/a.png",
            "images/a.png",
            "/var/photos/a.jpg",
        ] {
            assert_eq!(resolve(url).as_deref(), Some(url));
        }
    }

    #[test]
    fn test_remote_goes_through_proxy() {
        let resolved = resolve("https://cdn.example.com/photos/lake.jpg").unwrap();
        assert_eq!(
            resolved,
            "https://images.weserv.nl/?url=cdn.example.com%2Fphotos%2Flake.jpg&w=1600&q=85&fit=inside"
        );
    }

    #[test]
    fn test_protocol_relative() {
        let resolved = resolve("//cdn.example.com/a.jpg").unwrap();
        assert!(resolved.contains("url=cdn.example.com%2Fa.jpg"));
    }

    #[test]
    fn test_proxy_urls_not_double_wrapped() {
        let url = "https://images.weserv.nl/?url=x.com%2Fa.jpg&w=1600";
        assert_eq!(resolve(url).as_deref(), Some(url));
    }

    #[test]
    fn test_private_hosts_rewritten() {
        let proxy = ProxyConfig {
            enabled: false,
            canonical_host: Some("https://travel.example.org".to_string()),
            ..ProxyConfig::default()
        };
        for url in [
            "http://localhost:3000/uploads/a.jpg",
            "http://127.0.0.1/uploads/a.jpg",
            "http://192.168.1.20/uploads/a.jpg",
            "http://172.20.0.5/uploads/a.jpg",
            "http://10.0.0.1/uploads/a.jpg",
            "http://[::1]:8080/uploads/a.jpg",
        ] {
            assert_eq!(
                resolve_url(url, &proxy).as_deref(),
                Some("https://travel.example.org/uploads/a.jpg"),
                "{}",
                url
            );
        }
    }

    #[test]
    fn test_private_hosts_bypass_proxy_without_canonical_host() {
        for url in [
            "http://localhost:3000/uploads/a.jpg",
            "http://192.168.1.20/uploads/a.jpg",
            "http://[::1]:8080/uploads/a.jpg",
        ] {
            assert_eq!(resolve(url).as_deref(), Some(url));
        }
        // Public hosts still go through the proxy with the same config.
        assert!(resolve("http://example.com/a.jpg")
            .unwrap()
            .starts_with(DEFAULT_PROXY));
    }

    #[test]
    fn test_private_host_detection() {
        assert!(is_private_host("172.16.0.1"));
        assert!(is_private_host("172.31.255.255"));
        assert!(!is_private_host("172.32.0.1"));
        assert!(!is_private_host("8.8.8.8"));
        assert!(!is_private_host("10.example.com"));
    }

    #[test]
    fn test_site_relative_with_origin() {
        let proxy = ProxyConfig {
            enabled: false,
            public_origin: Some("https://travel.example.org/".to_string()),
            ..ProxyConfig::default()
        };
        assert_eq!(
            resolve_url("/uploads/a.jpg", &proxy).as_deref(),
            Some("https://travel.example.org/uploads/a.jpg")
        );
    }

    #[test]
    fn test_proxy_disabled() {
        let proxy = ProxyConfig {
            enabled: false,
            ..ProxyConfig::default()
        };
        assert_eq!(
            resolve_url(" https://x.com/a.jpg ", &proxy).as_deref(),
            Some("https://x.com/a.jpg")
        );
    }
}
