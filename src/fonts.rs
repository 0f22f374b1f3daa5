//! Font loading, shaping and text measurement.
//!
//! A [`FontManager`] with no faces loaded still measures text (with average
//! advance heuristics) so layout works everywhere; the rasterizer then paints
//! greeked ink bars instead of glyphs. Once a TTF/OTF face is loaded, text is
//! shaped with `rustybuzz` and painted from `ttf-parser` outlines.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tiny_skia::{Path as SkPath, PathBuilder};

use crate::error::{ExportError, Result};
use crate::style::{ComputedStyle, FontStyle, FontWeight};

/// Well-known locations of a general purpose sans face.
const SYSTEM_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// A loaded font face with metrics (font units).
#[derive(Clone)]
pub struct FontData {
    pub bytes: Arc<Vec<u8>>,
    pub units_per_em: f32,
    pub ascender: f32,
    pub descender: f32,
    pub line_gap: f32,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct FontKey {
    pub family: String,
    pub bold: bool,
    pub italic: bool,
}

impl FontKey {
    pub fn for_style(style: &ComputedStyle) -> Self {
        Self {
            family: style.font_family.clone(),
            bold: style.font_weight == FontWeight::Bold,
            italic: style.font_style == FontStyle::Italic,
        }
    }

    fn regular(&self) -> Self {
        Self {
            family: self.family.clone(),
            bold: false,
            italic: false,
        }
    }

    fn is_monospace(&self) -> bool {
        let family = self.family.to_ascii_lowercase();
        family.contains("mono") || family.contains("courier")
    }
}

/// A glyph positioned relative to the start of its run (px).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapedGlyph {
    pub id: u16,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShapedRun {
    pub glyphs: Vec<ShapedGlyph>,
    pub width: f32,
}

/// Loaded faces, keyed by family and variant.
#[derive(Clone, Default)]
pub struct FontManager {
    fonts: HashMap<FontKey, FontData>,
    /// First face loaded; used for any family without a face of its own.
    default_key: Option<FontKey>,
}

impl FontManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager with the first system sans face found, or none.
    pub fn with_system_font() -> Self {
        let mut mgr = Self::new();
        if let Some(path) = discover_system_font() {
            match mgr.load_font_file("Helvetica", false, false, &path) {
                Ok(()) => log::debug!("Loaded system font {}", path.display()),
                Err(e) => log::warn!("Ignoring system font {}: {e}", path.display()),
            }
        }
        mgr
    }

    /// Load a TTF/OTF face from bytes.
    pub fn load_font(&mut self, family: &str, bold: bool, italic: bool, bytes: Vec<u8>) -> Result<()> {
        let face = ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| ExportError::InvalidOptions(format!("failed to parse font {family}: {e}")))?;

        let data = FontData {
            units_per_em: face.units_per_em() as f32,
            ascender: face.ascender() as f32,
            descender: face.descender() as f32,
            line_gap: face.line_gap() as f32,
            bytes: Arc::new(bytes),
        };

        let key = FontKey {
            family: family.to_string(),
            bold,
            italic,
        };
        if self.default_key.is_none() {
            self.default_key = Some(key.clone());
        }
        self.fonts.insert(key, data);
        Ok(())
    }

    pub fn load_font_file(&mut self, family: &str, bold: bool, italic: bool, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        self.load_font(family, bold, italic, bytes)
    }

    /// `true` once at least one real face is loaded.
    pub fn has_real_fonts(&self) -> bool {
        self.default_key.is_some()
    }

    /// Face for `key`: exact match, the family's regular face, then the default.
    fn face(&self, key: &FontKey) -> Option<&FontData> {
        self.fonts
            .get(key)
            .or_else(|| self.fonts.get(&key.regular()))
            .or_else(|| self.default_key.as_ref().and_then(|k| self.fonts.get(k)))
    }

    /// Shape `text` into positioned glyphs. `None` without a real face.
    pub fn shape(&self, text: &str, font_size: f32, key: &FontKey) -> Option<ShapedRun> {
        let data = self.face(key)?;
        let face = rustybuzz::Face::from_slice(&data.bytes, 0)?;
        let mut buffer = rustybuzz::UnicodeBuffer::new();
        buffer.push_str(text);
        let output = rustybuzz::shape(&face, &[], buffer);

        let scale = font_size / data.units_per_em;
        let mut pen = 0.0f32;
        let glyphs = output
            .glyph_infos()
            .iter()
            .zip(output.glyph_positions())
            .map(|(info, pos)| {
                let glyph = ShapedGlyph {
                    id: info.glyph_id as u16,
                    x: pen + pos.x_offset as f32 * scale,
                    y: pos.y_offset as f32 * scale,
                };
                pen += pos.x_advance as f32 * scale;
                glyph
            })
            .collect();
        Some(ShapedRun { glyphs, width: pen })
    }

    /// Outline of a shaped run as a single fill path in pixel space, with the
    /// run starting at `x` and its baseline at `baseline`.
    pub fn run_path(
        &self,
        run: &ShapedRun,
        key: &FontKey,
        font_size: f32,
        x: f32,
        baseline: f32,
    ) -> Option<SkPath> {
        let data = self.face(key)?;
        let face = ttf_parser::Face::parse(&data.bytes, 0).ok()?;
        let scale = font_size / data.units_per_em;
        let mut pen = OutlinePen {
            builder: PathBuilder::new(),
            origin_x: 0.0,
            baseline,
            scale,
        };
        for glyph in &run.glyphs {
            pen.origin_x = x + glyph.x;
            // Glyphs without an outline (spaces) are simply skipped.
            let _ = face.outline_glyph(ttf_parser::GlyphId(glyph.id), &mut pen);
        }
        pen.builder.finish()
    }

    /// Width of `text` in px. Heuristic: average advance of 0.5 em, 0.55 em
    /// for bold and 0.6 em for monospace.
    pub fn measure_text_width(&self, text: &str, font_size: f32, key: &FontKey) -> f32 {
        if let Some(run) = self.shape(text, font_size, key) {
            return run.width;
        }
        let avg = if key.is_monospace() {
            0.6
        } else if key.bold {
            0.55
        } else {
            0.5
        };
        text.chars().count() as f32 * font_size * avg
    }

    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }

    /// Distance from the top of a line box to the baseline, in px.
    pub fn ascender_px(&self, font_size: f32, key: &FontKey) -> f32 {
        match self.face(key) {
            Some(data) => {
                let content = (data.ascender - data.descender).max(1.0);
                font_size * data.ascender / content
            }
            None => font_size * 0.75,
        }
    }
}

/// First existing candidate from the well-known system font locations.
pub fn discover_system_font() -> Option<PathBuf> {
    SYSTEM_FONT_CANDIDATES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.is_file())
}

struct OutlinePen {
    builder: PathBuilder,
    origin_x: f32,
    baseline: f32,
    scale: f32,
}

impl OutlinePen {
    // Font units are y-up; the pixmap is y-down.
    fn map(&self, x: f32, y: f32) -> (f32, f32) {
        (self.origin_x + x * self.scale, self.baseline - y * self.scale)
    }
}

impl ttf_parser::OutlineBuilder for OutlinePen {
    fn move_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.move_to(x, y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let (x, y) = self.map(x, y);
        self.builder.line_to(x, y);
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x, y) = self.map(x, y);
        self.builder.quad_to(x1, y1, x, y);
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        let (x1, y1) = self.map(x1, y1);
        let (x2, y2) = self.map(x2, y2);
        let (x, y) = self.map(x, y);
        self.builder.cubic_to(x1, y1, x2, y2, x, y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Word-wrap text to fit within `max_width` pixels. Returns a vec of lines.
///
/// With `preserve` set, explicit newlines and leading indentation survive;
/// otherwise all whitespace runs collapse to single spaces.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    key: &FontKey,
    max_width: f32,
    preserve: bool,
    fonts: &FontManager,
) -> Vec<String> {
    if preserve {
        let mut lines = Vec::new();
        for line in text.split('\n') {
            lines.extend(wrap_line(line.trim_end(), font_size, key, max_width, fonts));
        }
        return lines;
    }
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    wrap_line(&collapsed, font_size, key, max_width, fonts)
}

fn wrap_line(line: &str, font_size: f32, key: &FontKey, max_width: f32, fonts: &FontManager) -> Vec<String> {
    let body = line.trim_start();
    let indent = &line[..line.len() - body.len()];
    if body.is_empty() || max_width <= 0.0 {
        return vec![line.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = indent.to_string();
    let mut has_word = false;
    for word in body.split_whitespace() {
        let candidate = if has_word {
            format!("{current} {word}")
        } else {
            format!("{current}{word}")
        };
        if fonts.measure_text_width(&candidate, font_size, key) <= max_width {
            current = candidate;
            has_word = true;
            continue;
        }
        if has_word {
            lines.push(std::mem::take(&mut current));
            has_word = false;
        }
        // Start the word on a fresh line, breaking it where it overflows.
        for c in word.chars() {
            let mut next = current.clone();
            next.push(c);
            if has_word && fonts.measure_text_width(&next, font_size, key) > max_width {
                lines.push(std::mem::replace(&mut current, c.to_string()));
            } else {
                current = next;
            }
            has_word = true;
        }
    }
    lines.push(current);
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sans() -> FontKey {
        FontKey {
            family: "Helvetica".to_string(),
            bold: false,
            italic: false,
        }
    }

    #[test]
    fn heuristic_text_width() {
        let mgr = FontManager::new();
        let w = mgr.measure_text_width("Hello", 16.0, &sans());
        // 5 chars × 16 × 0.5 = 40
        assert!((w - 40.0).abs() < 0.1);
        let mono = FontKey {
            family: "Courier".to_string(),
            ..sans()
        };
        assert!(mgr.measure_text_width("Hello", 16.0, &mono) > w);
    }

    #[test]
    fn word_wrap_basic() {
        let mgr = FontManager::new();
        let lines = wrap_text("Hello world foo bar", 16.0, &sans(), 60.0, false, &mgr);
        assert!(lines.len() >= 2, "Expected wrapping, got {:?}", lines);
    }

    #[test]
    fn overlong_word_is_broken_to_fit() {
        let mgr = FontManager::new();
        let word = "a".repeat(25);
        // 5 px per glyph at 10 px: ten glyphs per 52 px line.
        let lines = wrap_text(&format!("short {word}"), 10.0, &sans(), 52.0, false, &mgr);
        assert_eq!(lines, vec!["short", "aaaaaaaaaa", "aaaaaaaaaa", "aaaaa"]);
        for line in &lines {
            assert!(mgr.measure_text_width(line, 10.0, &sans()) <= 52.0, "{line:?}");
        }
    }

    #[test]
    fn preserved_wrap_keeps_newlines_and_indent() {
        let mgr = FontManager::new();
        let lines = wrap_text("fn main() {\n    run();\n}", 13.0, &sans(), 1000.0, true, &mgr);
        assert_eq!(lines, vec!["fn main() {", "    run();", "}"]);
    }

    #[test]
    fn garbage_font_is_rejected() {
        let mut mgr = FontManager::new();
        let err = mgr.load_font("Broken", false, false, vec![0, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, ExportError::InvalidOptions(_)));
        assert!(!mgr.has_real_fonts());
    }

    #[test]
    fn no_face_means_no_shaping() {
        let mgr = FontManager::new();
        assert!(mgr.shape("abc", 12.0, &sans()).is_none());
        assert!((mgr.ascender_px(20.0, &sans()) - 15.0).abs() < 0.01);
    }

    #[test]
    fn system_font_shapes_when_present() {
        let Some(path) = discover_system_font() else {
            return;
        };
        let mut mgr = FontManager::new();
        mgr.load_font_file("Helvetica", false, false, &path).unwrap();
        let run = mgr.shape("Hello", 16.0, &sans()).unwrap();
        assert_eq!(run.glyphs.len(), 5);
        assert!(run.width > 0.0);
        assert!(mgr.run_path(&run, &sans(), 16.0, 0.0, 16.0).is_some());
    }
}
