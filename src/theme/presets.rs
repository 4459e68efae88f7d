//! Built-in theme presets. Each preset starts from `minimal` and overrides
//! what makes it distinct.

use super::{
    BlockChrome, CalloutColors, Color, CoverColors, Spacing, TextStyle, Theme, ThemeColors,
    Typography,
};

pub(super) fn builtin() -> Vec<Theme> {
    vec![
        minimal(),
        light(),
        dark(),
        sepia(),
        black_white(),
        newspaper(),
        travel_magazine(),
    ]
}

fn text(size: f64, weight: u32, line_height: f64, margin_bottom: f64) -> TextStyle {
    TextStyle {
        size,
        weight,
        line_height,
        margin_bottom,
    }
}

fn callout(background: &str, border: &str, text: &str) -> CalloutColors {
    CalloutColors {
        background: Color::hex(background),
        border: Color::hex(border),
        text: Color::hex(text),
        icon: Color::hex(border),
    }
}

pub(super) fn minimal() -> Theme {
    Theme {
        name: "minimal".to_string(),
        display_name: "Minimal".to_string(),
        colors: ThemeColors {
            text: Color::hex("#1a1a1a"),
            text_secondary: Color::hex("#4a4a4a"),
            text_muted: Color::hex("#8a8a8a"),
            background: Color::WHITE,
            surface: Color::hex("#f7f7f7"),
            surface_alt: Color::hex("#efefef"),
            accent: Color::hex("#2563eb"),
            accent_strong: Color::hex("#1d4ed8"),
            accent_soft: Color::hex("#dbeafe"),
            border: Color::hex("#d4d4d4"),
            border_light: Color::hex("#e8e8e8"),
            info: callout("#eff6ff", "#3b82f6", "#1e3a8a"),
            warning: callout("#fffbeb", "#f59e0b", "#78350f"),
            tip: callout("#f0fdf4", "#22c55e", "#14532d"),
            danger: callout("#fef2f2", "#ef4444", "#7f1d1d"),
            cover: CoverColors {
                background: Color::hex("#111827"),
                gradient: [Color::hex("#1f2937"), Color::hex("#111827")],
                text: Color::WHITE,
                text_secondary: Color::hex("#d1d5db"),
            },
        },
        typography: Typography {
            heading_font: "Helvetica".to_string(),
            body_font: "Helvetica".to_string(),
            mono_font: "Courier".to_string(),
            h1: text(32.0, 700, 1.2, 8.0),
            h2: text(24.0, 700, 1.3, 6.0),
            h3: text(18.0, 700, 1.35, 4.0),
            h4: text(15.0, 700, 1.4, 3.0),
            body: text(11.0, 400, 1.6, 4.0),
            small: text(9.0, 400, 1.5, 2.0),
            caption: text(8.5, 400, 1.4, 2.0),
        },
        spacing: Spacing {
            page_padding: 20.0,
            section_spacing: 12.0,
            block_spacing: 8.0,
            element_spacing: 4.0,
            column_gap: 8.0,
        },
        blocks: BlockChrome {
            border_radius: 2.0,
            border_width: 0.3,
            shadow: false,
        },
    }
}

fn light() -> Theme {
    let mut theme = minimal();
    theme.name = "light".to_string();
    theme.display_name = "Light".to_string();
    theme.colors.text = Color::hex("#1f2933");
    theme.colors.surface = Color::hex("#f5f7fa");
    theme.colors.surface_alt = Color::hex("#e4e7eb");
    theme.colors.accent = Color::hex("#0f766e");
    theme.colors.accent_strong = Color::hex("#115e59");
    theme.colors.accent_soft = Color::hex("#ccfbf1");
    theme.colors.cover = CoverColors {
        background: Color::hex("#f0fdfa"),
        gradient: [Color::hex("#ccfbf1"), Color::hex("#f0fdfa")],
        text: Color::hex("#134e4a"),
        text_secondary: Color::hex("#0f766e"),
    };
    theme.blocks.border_radius = 3.0;
    theme
}

fn dark() -> Theme {
    let mut theme = minimal();
    theme.name = "dark".to_string();
    theme.display_name = "Dark".to_string();
    theme.colors.text = Color::hex("#e5e7eb");
    theme.colors.text_secondary = Color::hex("#9ca3af");
    theme.colors.text_muted = Color::hex("#6b7280");
    theme.colors.background = Color::hex("#111827");
    theme.colors.surface = Color::hex("#1f2937");
    theme.colors.surface_alt = Color::hex("#374151");
    theme.colors.accent = Color::hex("#60a5fa");
    theme.colors.accent_strong = Color::hex("#93c5fd");
    theme.colors.accent_soft = Color::hex("#1e3a8a");
    theme.colors.border = Color::hex("#374151");
    theme.colors.border_light = Color::hex("#4b5563");
    theme.colors.info = callout("#172554", "#60a5fa", "#dbeafe");
    theme.colors.warning = callout("#422006", "#fbbf24", "#fef3c7");
    theme.colors.tip = callout("#052e16", "#4ade80", "#dcfce7");
    theme.colors.danger = callout("#450a0a", "#f87171", "#fee2e2");
    theme.colors.cover = CoverColors {
        background: Color::hex("#030712"),
        gradient: [Color::hex("#1e293b"), Color::hex("#030712")],
        text: Color::hex("#f9fafb"),
        text_secondary: Color::hex("#9ca3af"),
    };
    theme
}

fn sepia() -> Theme {
    let mut theme = minimal();
    theme.name = "sepia".to_string();
    theme.display_name = "Sepia".to_string();
    theme.colors.text = Color::hex("#3e2723");
    theme.colors.text_secondary = Color::hex("#5d4037");
    theme.colors.text_muted = Color::hex("#8d6e63");
    theme.colors.background = Color::hex("#f5f1e8");
    theme.colors.surface = Color::hex("#ede6d6");
    theme.colors.surface_alt = Color::hex("#e3d9c6");
    theme.colors.accent = Color::hex("#8d6e63");
    theme.colors.accent_strong = Color::hex("#6d4c41");
    theme.colors.accent_soft = Color::hex("#d7ccc8");
    theme.colors.border = Color::hex("#bcaaa4");
    theme.colors.border_light = Color::hex("#d7ccc8");
    theme.colors.cover = CoverColors {
        background: Color::hex("#4e342e"),
        gradient: [Color::hex("#6d4c41"), Color::hex("#3e2723")],
        text: Color::hex("#f5f1e8"),
        text_secondary: Color::hex("#d7ccc8"),
    };
    theme.typography.heading_font = "Times".to_string();
    theme.typography.body_font = "Times".to_string();
    theme
}

fn black_white() -> Theme {
    let mut theme = minimal();
    theme.name = "black-white".to_string();
    theme.display_name = "Black & White".to_string();
    theme.colors.text = Color::BLACK;
    theme.colors.text_secondary = Color::hex("#333333");
    theme.colors.text_muted = Color::hex("#666666");
    theme.colors.accent = Color::BLACK;
    theme.colors.accent_strong = Color::BLACK;
    theme.colors.accent_soft = Color::hex("#e5e5e5");
    theme.colors.border = Color::BLACK;
    theme.colors.info = callout("#ffffff", "#000000", "#000000");
    theme.colors.warning = callout("#f2f2f2", "#000000", "#000000");
    theme.colors.tip = callout("#ffffff", "#000000", "#000000");
    theme.colors.danger = callout("#e5e5e5", "#000000", "#000000");
    theme.colors.cover = CoverColors {
        background: Color::BLACK,
        gradient: [Color::BLACK, Color::hex("#333333")],
        text: Color::WHITE,
        text_secondary: Color::hex("#cccccc"),
    };
    theme.blocks.border_radius = 0.0;
    theme.blocks.border_width = 0.5;
    theme
}

fn newspaper() -> Theme {
    let mut theme = minimal();
    theme.name = "newspaper".to_string();
    theme.display_name = "Newspaper".to_string();
    theme.colors.text = Color::hex("#111111");
    theme.colors.background = Color::hex("#fbfaf7");
    theme.colors.accent = Color::hex("#c8102e");
    theme.colors.accent_strong = Color::hex("#a00d26");
    theme.colors.accent_soft = Color::hex("#f9d6dc");
    theme.colors.cover = CoverColors {
        background: Color::hex("#fbfaf7"),
        gradient: [Color::hex("#fbfaf7"), Color::hex("#ece8df")],
        text: Color::hex("#111111"),
        text_secondary: Color::hex("#c8102e"),
    };
    theme.typography.heading_font = "Times".to_string();
    theme.typography.body_font = "Times".to_string();
    theme.typography.h1 = text(42.0, 900, 1.1, 8.0);
    theme.typography.h2 = text(26.0, 800, 1.2, 5.0);
    theme.typography.body = text(10.5, 400, 1.5, 3.0);
    theme.spacing.page_padding = 20.0;
    theme.spacing.block_spacing = 6.0;
    theme.blocks.border_radius = 0.0;
    theme
}

fn travel_magazine() -> Theme {
    let mut theme = minimal();
    theme.name = "travel-magazine".to_string();
    theme.display_name = "Travel Magazine".to_string();
    theme.colors.text = Color::hex("#1c2b36");
    theme.colors.accent = Color::hex("#e76f51");
    theme.colors.accent_strong = Color::hex("#c2410c");
    theme.colors.accent_soft = Color::hex("#fde4dc");
    theme.colors.surface = Color::hex("#f4f1ea");
    theme.colors.tip = callout("#ecfdf5", "#2a9d8f", "#134e4a");
    theme.colors.cover = CoverColors {
        background: Color::hex("#264653"),
        gradient: [Color::hex("#2a9d8f"), Color::hex("#264653")],
        text: Color::WHITE,
        text_secondary: Color::hex("#e9c46a"),
    };
    theme.typography.h1 = text(38.0, 800, 1.15, 8.0);
    theme.typography.h2 = text(26.0, 700, 1.25, 6.0);
    theme.typography.body = text(11.5, 400, 1.65, 4.0);
    theme.spacing.block_spacing = 10.0;
    theme.blocks.border_radius = 4.0;
    theme.blocks.shadow = true;
    theme
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_names_unique() {
        let presets = builtin();
        let mut names: Vec<_> = presets.iter().map(|t| t.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), presets.len());
    }

    #[test]
    fn test_sepia_palette() {
        let sepia = sepia();
        assert_eq!(sepia.colors.background, Color::hex("#f5f1e8"));
        assert_eq!(sepia.colors.accent, Color::hex("#8d6e63"));
    }

    #[test]
    fn test_all_presets_have_positive_sizes() {
        for theme in builtin() {
            let t = &theme.typography;
            for style in [&t.h1, &t.h2, &t.h3, &t.h4, &t.body, &t.small, &t.caption] {
                assert!(style.size > 0.0 && style.line_height > 0.0, "{}", theme.name);
            }
            assert!(theme.spacing.page_padding > 0.0);
        }
    }
}
