//! # Themes
//!
//! A theme is a named bundle of colors, typography, spacing and block chrome.
//! Every theme carries every field, so renderers never have to fall back to
//! anything but the theme they were handed.
//!
//! Sizes follow print conventions: font sizes in points, everything else in
//! millimetres.

mod presets;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The theme used when a requested name is unknown.
pub const DEFAULT_THEME: &str = "minimal";

/// An RGBA color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
    pub const TRANSPARENT: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn rgb(r: f64, g: f64, b: f64) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`. Malformed input yields black.
    pub fn hex(hex: &str) -> Self {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return Self::BLACK;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).unwrap_or(0) as f64 / 255.0;
        match hex.len() {
            3 => Self::rgb(
                channel(&hex[0..1].repeat(2)),
                channel(&hex[1..2].repeat(2)),
                channel(&hex[2..3].repeat(2)),
            ),
            6 => Self::rgb(channel(&hex[0..2]), channel(&hex[2..4]), channel(&hex[4..6])),
            8 => Self {
                a: channel(&hex[6..8]),
                ..Self::rgb(channel(&hex[0..2]), channel(&hex[2..4]), channel(&hex[4..6]))
            },
            _ => Self::BLACK,
        }
    }

    pub fn with_alpha(self, a: f64) -> Self {
        Self {
            a: a.clamp(0.0, 1.0),
            ..self
        }
    }

    /// Linear interpolation toward `other`; `t` is clamped to `0..=1`.
    pub fn mix(self, other: Color, t: f64) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self {
            r: self.r + (other.r - self.r) * t,
            g: self.g + (other.g - self.g) * t,
            b: self.b + (other.b - self.b) * t,
            a: self.a + (other.a - self.a) * t,
        }
    }

    pub fn to_rgba8(self) -> [u8; 4] {
        let q = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// A complete, immutable theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub name: String,
    pub display_name: String,
    pub colors: ThemeColors,
    pub typography: Typography,
    pub spacing: Spacing,
    pub blocks: BlockChrome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeColors {
    // ── Text ───────────────────────────────────────────────────
    pub text: Color,
    pub text_secondary: Color,
    pub text_muted: Color,

    // ── Surfaces ───────────────────────────────────────────────
    pub background: Color,
    pub surface: Color,
    pub surface_alt: Color,

    // ── Accents & Borders ──────────────────────────────────────
    pub accent: Color,
    pub accent_strong: Color,
    pub accent_soft: Color,
    pub border: Color,
    pub border_light: Color,

    // ── Callouts ───────────────────────────────────────────────
    pub info: CalloutColors,
    pub warning: CalloutColors,
    pub tip: CalloutColors,
    pub danger: CalloutColors,

    pub cover: CoverColors,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalloutColors {
    pub background: Color,
    pub border: Color,
    pub text: Color,
    pub icon: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverColors {
    pub background: Color,
    /// Top-left to bottom-right.
    pub gradient: [Color; 2],
    pub text: Color,
    pub text_secondary: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Typography {
    pub heading_font: String,
    pub body_font: String,
    pub mono_font: String,
    pub h1: TextStyle,
    pub h2: TextStyle,
    pub h3: TextStyle,
    pub h4: TextStyle,
    pub body: TextStyle,
    pub small: TextStyle,
    pub caption: TextStyle,
}

impl Typography {
    /// The text style for a heading level. Levels past 4 use the h4 style.
    pub fn heading(&self, level: u8) -> &TextStyle {
        match level {
            0 | 1 => &self.h1,
            2 => &self.h2,
            3 => &self.h3,
            _ => &self.h4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyle {
    /// Points.
    pub size: f64,
    pub weight: u32,
    /// Multiplier of the font size.
    pub line_height: f64,
    /// Millimetres.
    pub margin_bottom: f64,
}

/// All values in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Spacing {
    pub page_padding: f64,
    pub section_spacing: f64,
    pub block_spacing: f64,
    pub element_spacing: f64,
    pub column_gap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockChrome {
    /// Millimetres.
    pub border_radius: f64,
    /// Millimetres.
    pub border_width: f64,
    pub shadow: bool,
}

/// Name-keyed lookup over the built-in presets plus any registered themes.
#[derive(Debug, Clone)]
pub struct ThemeRegistry {
    themes: BTreeMap<String, Theme>,
    fallback: Theme,
}

impl Default for ThemeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThemeRegistry {
    /// A registry holding the built-in presets.
    pub fn new() -> Self {
        let themes = presets::builtin()
            .into_iter()
            .map(|theme| (theme.name.clone(), theme))
            .collect();
        Self {
            themes,
            fallback: presets::minimal(),
        }
    }

    /// Look up a theme by name. Unknown names resolve to [`DEFAULT_THEME`].
    pub fn get(&self, name: &str) -> &Theme {
        let key = name.trim().to_lowercase();
        if let Some(theme) = self.themes.get(&key) {
            return theme;
        }
        log::debug!("unknown theme '{}', using '{}'", name, DEFAULT_THEME);
        &self.fallback
    }

    pub fn contains(&self, name: &str) -> bool {
        self.themes.contains_key(&name.trim().to_lowercase())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.themes.keys().map(String::as_str)
    }

    /// Add or replace a theme. Names are stored lowercase.
    pub fn register(&mut self, mut theme: Theme) {
        theme.name = theme.name.trim().to_lowercase();
        if theme.name == DEFAULT_THEME {
            self.fallback = theme.clone();
        }
        self.themes.insert(theme.name.clone(), theme);
    }
}

/// Resolve a built-in theme by name, falling back to the default theme.
pub fn get_theme_config(name: &str) -> Theme {
    ThemeRegistry::new().get(name).clone()
}
