//! # Text Layout
//!
//! Greedy line breaking over UAX #14 break opportunities, measured with real
//! font metrics from the [`FontContext`].
//!
//! Soft hyphens (U+00AD) are invisible unless a line breaks at one, in which
//! case a visible hyphen is drawn. A word wider than the line is broken at
//! the last character that fits.

use crate::font::FontContext;
use unicode_linebreak::{linebreaks, BreakOpportunity};

const SOFT_HYPHEN: char = '\u{00AD}';

/// A line of text after line breaking.
#[derive(Debug, Clone)]
pub struct BrokenLine {
    pub chars: Vec<char>,
    pub text: String,
    /// X offset of each character from the line start, in points.
    pub char_positions: Vec<f64>,
    /// Width without trailing spaces, in points.
    pub width: f64,
}

/// Font parameters for one run of text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontSpec<'a> {
    pub family: &'a str,
    pub weight: u32,
    pub italic: bool,
    /// Points.
    pub size: f64,
    pub letter_spacing: f64,
}

impl<'a> FontSpec<'a> {
    pub fn new(family: &'a str, size: f64) -> Self {
        Self {
            family,
            weight: 400,
            italic: false,
            size,
            letter_spacing: 0.0,
        }
    }

    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    pub fn italic(mut self, italic: bool) -> Self {
        self.italic = italic;
        self
    }
}

/// UAX #14 break opportunities indexed by char position.
///
/// Entry `i` is the opportunity to break *before* `chars[i]`. Index 0 is
/// always `None`.
fn compute_break_opportunities(text: &str) -> Vec<Option<BreakOpportunity>> {
    let char_count = text.chars().count();
    let mut result = vec![None; char_count];

    // linebreaks() reports byte offsets of the start of the next segment.
    let mut byte_to_char = vec![0usize; text.len() + 1];
    for (char_idx, (byte_idx, _)) in text.char_indices().enumerate() {
        byte_to_char[byte_idx] = char_idx;
    }
    byte_to_char[text.len()] = char_count;

    for (byte_offset, opp) in linebreaks(text) {
        let char_idx = byte_to_char[byte_offset];
        if char_idx > 0 && char_idx < char_count {
            result[char_idx] = Some(opp);
        }
    }

    result
}

fn is_newline(ch: char) -> bool {
    matches!(ch, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextLayout;

impl TextLayout {
    pub fn new() -> Self {
        Self
    }

    /// Break `text` into lines no wider than `max_width` points.
    pub fn break_into_lines(
        &self,
        fonts: &FontContext,
        text: &str,
        max_width: f64,
        font: &FontSpec,
    ) -> Vec<BrokenLine> {
        if text.is_empty() {
            return vec![self.make_line(&[], &[])];
        }

        let chars: Vec<char> = text.chars().collect();
        let widths = self.measure_chars(fonts, &chars, font);
        let hyphen_width = fonts.char_width('-', font.family, font.weight, font.italic, font.size)
            + font.letter_spacing;
        let break_opps = compute_break_opportunities(text);

        let mut lines = Vec::new();
        let mut line_start = 0;
        let mut line_width = 0.0;
        let mut last_break: Option<usize> = None;

        for (i, &ch) in chars.iter().enumerate() {
            match break_opps[i] {
                Some(BreakOpportunity::Mandatory) => {
                    let end = if is_newline(chars[i - 1]) { i - 1 } else { i };
                    lines.push(self.line_from(&chars[line_start..end], &widths[line_start..end]));
                    line_start = i;
                    line_width = 0.0;
                    last_break = None;
                }
                // The line may end after chars[i - 1].
                Some(BreakOpportunity::Allowed) => last_break = Some(i - 1),
                None => {}
            }

            if ch == SOFT_HYPHEN {
                last_break = Some(i);
                continue;
            }
            if is_newline(ch) {
                continue;
            }

            let char_width = widths[i];
            if line_width + char_width > max_width && line_start < i {
                match last_break.filter(|bp| *bp >= line_start) {
                    Some(bp) if chars[bp] == SOFT_HYPHEN => {
                        let mut line =
                            self.visible(&chars[line_start..bp], &widths[line_start..bp]);
                        line.0.push('-');
                        line.1.push(hyphen_width);
                        lines.push(self.make_line(&line.0, &line.1));
                        line_start = bp + 1;
                    }
                    Some(bp) => {
                        lines.push(
                            self.line_from(&chars[line_start..=bp], &widths[line_start..=bp]),
                        );
                        line_start = bp + 1;
                    }
                    None => {
                        // No break point: force one before the overflowing char.
                        lines.push(self.line_from(&chars[line_start..i], &widths[line_start..i]));
                        line_start = i;
                    }
                }
                line_width = self.visible(&chars[line_start..=i], &widths[line_start..=i])
                    .1
                    .iter()
                    .sum();
                last_break = None;
                continue;
            }

            line_width += char_width;
        }

        if line_start < chars.len() {
            lines.push(self.line_from(&chars[line_start..], &widths[line_start..]));
        }

        lines
    }

    /// Width of `text` on one line, in points.
    pub fn measure_width(&self, fonts: &FontContext, text: &str, font: &FontSpec) -> f64 {
        let chars: Vec<char> = text.chars().collect();
        self.measure_chars(fonts, &chars, font).iter().sum()
    }

    fn measure_chars(&self, fonts: &FontContext, chars: &[char], font: &FontSpec) -> Vec<f64> {
        chars
            .iter()
            .map(|&ch| {
                if ch == SOFT_HYPHEN || is_newline(ch) {
                    0.0
                } else {
                    fonts.char_width(ch, font.family, font.weight, font.italic, font.size)
                        + font.letter_spacing
                }
            })
            .collect()
    }

    /// Drop soft hyphens and newlines, keeping widths aligned.
    fn visible(&self, chars: &[char], widths: &[f64]) -> (Vec<char>, Vec<f64>) {
        chars
            .iter()
            .zip(widths)
            .filter(|(c, _)| **c != SOFT_HYPHEN && !is_newline(**c))
            .map(|(c, w)| (*c, *w))
            .unzip()
    }

    fn line_from(&self, chars: &[char], widths: &[f64]) -> BrokenLine {
        let (chars, widths) = self.visible(chars, widths);
        self.make_line(&chars, &widths)
    }

    fn make_line(&self, chars: &[char], widths: &[f64]) -> BrokenLine {
        let mut positions = Vec::with_capacity(chars.len());
        let mut x = 0.0;
        for &w in widths {
            positions.push(x);
            x += w;
        }

        // Trailing spaces take no room at the line end.
        let mut effective_width = x;
        let mut i = chars.len();
        while i > 0 && chars[i - 1] == ' ' {
            i -= 1;
            effective_width -= widths[i];
        }

        BrokenLine {
            text: chars.iter().collect(),
            chars: chars.to_vec(),
            char_positions: positions,
            width: effective_width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str, max_width: f64) -> Vec<BrokenLine> {
        TextLayout::new().break_into_lines(
            &FontContext::new(),
            text,
            max_width,
            &FontSpec::new("Helvetica", 12.0),
        )
    }

    #[test]
    fn test_single_line() {
        let lines = lines("Hello", 200.0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Hello");
    }

    #[test]
    fn test_line_break_at_space() {
        let lines = lines("Hello World", 40.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text.trim_end(), "Hello");
        assert_eq!(lines[1].text, "World");
        assert!(lines.iter().all(|l| l.width <= 40.0));
    }

    #[test]
    fn test_explicit_newline() {
        let lines = lines("Hello\nWorld", 200.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Hello");
        assert_eq!(lines[1].text, "World");
    }

    #[test]
    fn test_empty_string() {
        let lines = lines("", 200.0);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].width, 0.0);
    }

    #[test]
    fn test_long_word_forced_break() {
        let lines = lines("Supercalifragilistic", 30.0);
        assert!(lines.len() > 1);
        let joined: String = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(joined, "Supercalifragilistic");
    }

    #[test]
    fn test_soft_hyphen_break_shows_hyphen() {
        let lines = lines("extra\u{00AD}ordinary", 50.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "extra-");
        assert_eq!(lines[1].text, "ordinary");
    }

    #[test]
    fn test_soft_hyphen_invisible_when_unbroken() {
        let lines = lines("extra\u{00AD}ordinary", 500.0);
        assert_eq!(lines[0].text, "extraordinary");
    }

    #[test]
    fn test_bold_text_wider() {
        let tl = TextLayout::new();
        let fc = FontContext::new();
        let regular = tl.measure_width(&fc, "Hello World", &FontSpec::new("Helvetica", 12.0));
        let bold = tl.measure_width(
            &fc,
            "Hello World",
            &FontSpec::new("Helvetica", 12.0).weight(700),
        );
        assert!(bold > regular);
    }

    #[test]
    fn test_trailing_space_not_counted() {
        let lines = lines("Hello ", 200.0);
        let tl = TextLayout::new();
        let w = tl.measure_width(&FontContext::new(), "Hello", &FontSpec::new("Helvetica", 12.0));
        assert!((lines[0].width - w).abs() < 1e-9);
    }
}
