//! Off-screen rasterizer – lays out a sanitized tree, paints it onto a
//! provider-owned surface and captures the result as an immutable RGB buffer.

use std::collections::HashMap;

use image::RgbImage;
use tiny_skia::{FillRule, FilterQuality, Paint, PathBuilder, Pixmap, PixmapPaint, Rect, Transform};

use crate::error::{ExportError, PartialContentWarning, Result, Stage};
use crate::fonts::{FontKey, FontManager};
use crate::images::{ImageLoader, ImageSet};
use crate::layout::{layout_tree, BoxContent, PositionedBox, TextBlock};
use crate::normalize::SanitizedNode;
use crate::style::{Color, TextAlign};
use crate::surface::{JobId, MountedSurface, SurfaceProvider};

/// Surface width and device scale of a rasterization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOptions {
    /// Layout width in CSS px.
    pub width: u32,
    /// Device pixels per CSS px.
    pub scale: f32,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            width: 1000,
            scale: 1.5,
        }
    }
}

/// Immutable RGB pixel buffer, top row first.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBuffer {
    image: RgbImage,
}

impl RasterBuffer {
    pub fn from_image(image: RgbImage) -> Self {
        Self { image }
    }

    /// A white buffer, mostly useful for exercising later stages.
    pub fn blank(width: u32, height: u32) -> Self {
        Self::from_image(RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}

/// Output of [`rasterize`].
#[derive(Debug, Clone)]
pub struct Rasterized {
    pub buffer: RasterBuffer,
    pub warnings: Vec<PartialContentWarning>,
}

/// Rasterize `tree` on a surface obtained from `provider` under `job`.
///
/// The surface is released before this returns, on success and on error.
pub fn rasterize(
    tree: &SanitizedNode,
    options: &RasterOptions,
    provider: &dyn SurfaceProvider,
    loader: &dyn ImageLoader,
    fonts: &FontManager,
    job: JobId,
) -> Result<Rasterized> {
    if options.width == 0 || options.scale.is_nan() || options.scale <= 0.0 {
        return Err(ExportError::raster(
            Stage::Surface,
            format!("unusable surface {}px at scale {}", options.width, options.scale),
        ));
    }

    let images = ImageSet::collect(tree, loader);
    let laid_out = layout_tree(tree, options.width as f32, fonts, &images.sizes())?;

    let px_width = (options.width as f32 * options.scale).ceil() as u32;
    let px_height = (laid_out.height.max(1.0) * options.scale).ceil() as u32;
    let mut surface = MountedSurface::mount(provider, job, px_width, px_height)?;

    let mut painter = Painter {
        pixmap: surface.pixmap_mut(),
        transform: Transform::from_scale(options.scale, options.scale),
        fonts,
        images: &images.images,
    };
    let root_bg = laid_out.root.colors.background;
    painter.fill_canvas(root_bg);
    painter.paint_box(&laid_out.root, root_bg);

    let buffer = capture(surface.pixmap())?;
    log::debug!(
        "{job}: rasterized {}x{} px ({} image warnings)",
        buffer.width(),
        buffer.height(),
        images.warnings.len()
    );
    Ok(Rasterized {
        buffer,
        warnings: images.warnings,
    })
}

/// Copy the surface into an RGB buffer, flattening any alpha over white.
fn capture(pixmap: &Pixmap) -> Result<RasterBuffer> {
    let mut rgb = Vec::with_capacity(pixmap.width() as usize * pixmap.height() as usize * 3);
    for px in pixmap.data().chunks_exact(4) {
        let inv = 255 - px[3];
        rgb.push(px[0].saturating_add(inv));
        rgb.push(px[1].saturating_add(inv));
        rgb.push(px[2].saturating_add(inv));
    }
    RgbImage::from_raw(pixmap.width(), pixmap.height(), rgb)
        .map(RasterBuffer::from_image)
        .ok_or_else(|| ExportError::raster(Stage::Encode, "surface size does not match its pixels"))
}

fn to_sk_color(color: Color) -> tiny_skia::Color {
    tiny_skia::Color::from_rgba(
        color.r.clamp(0.0, 1.0),
        color.g.clamp(0.0, 1.0),
        color.b.clamp(0.0, 1.0),
        color.a.clamp(0.0, 1.0),
    )
    .unwrap_or(tiny_skia::Color::BLACK)
}

fn fill_paint(color: Color) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color));
    paint.anti_alias = true;
    paint
}

struct Painter<'a> {
    pixmap: &'a mut Pixmap,
    transform: Transform,
    fonts: &'a FontManager,
    images: &'a HashMap<String, Pixmap>,
}

impl Painter<'_> {
    fn fill_canvas(&mut self, color: Color) {
        self.pixmap.fill(to_sk_color(color));
    }

    fn fill_rect(&mut self, x: f32, y: f32, w: f32, h: f32, color: Color) {
        if let Some(rect) = Rect::from_xywh(x, y, w, h) {
            self.pixmap
                .fill_rect(rect, &fill_paint(color), self.transform, None);
        }
    }

    fn paint_box(&mut self, b: &PositionedBox, parent_bg: Color) {
        let bg = b.colors.background;
        if bg != parent_bg && !matches!(b.content, BoxContent::Text(_)) {
            self.fill_rect(b.x, b.y, b.width, b.height, bg);
        }

        let s = &b.style;
        let border = b.colors.border;
        if s.border_width > 0.0 {
            let bw = s.border_width;
            self.fill_rect(b.x, b.y, b.width, bw, border);
            self.fill_rect(b.x, b.y + b.height - bw, b.width, bw, border);
            self.fill_rect(b.x + b.width - bw, b.y, bw, b.height, border);
        }
        if s.left_border() > 0.0 {
            self.fill_rect(b.x, b.y, s.left_border(), b.height, border);
        }

        match &b.content {
            BoxContent::Text(text) => self.paint_text(b, text),
            BoxContent::Image { src } => self.paint_image(b, src),
            BoxContent::Rule => self.fill_rect(b.x, b.y, b.width, b.height, border),
            BoxContent::None => {}
        }

        if let Some(marker) = &b.marker {
            self.paint_marker(b, marker);
        }

        for child in &b.children {
            self.paint_box(child, bg);
        }
    }

    fn paint_marker(&mut self, b: &PositionedBox, marker: &str) {
        let key = FontKey::for_style(&b.style);
        let size = b.style.font_size;
        let line_height = self.fonts.line_height_px(size, b.style.line_height);
        let width = self.fonts.measure_text_width(marker, size, &key);
        let x = b.x - width - 6.0;
        let baseline = b.y + (line_height - size) / 2.0 + self.fonts.ascender_px(size, &key);
        self.paint_run(marker, x, baseline, &key, size, b.colors.foreground);
    }

    fn paint_text(&mut self, b: &PositionedBox, text: &TextBlock) {
        let ascender = self.fonts.ascender_px(text.font_size, &text.key);
        let half_leading = (text.line_height - text.font_size) / 2.0;
        let color = b.colors.foreground;
        let last = text.lines.len().saturating_sub(1);

        for (i, line) in text.lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let top = b.y + i as f32 * text.line_height;
            let baseline = top + half_leading + ascender;
            let line_width = self.fonts.measure_text_width(line, text.font_size, &text.key);
            let slack = (b.width - line_width).max(0.0);

            let justify = text.align == TextAlign::Justify && i < last;
            let words: Vec<&str> = line.split(' ').filter(|w| !w.is_empty()).collect();
            if justify && words.len() > 1 && !line.starts_with(' ') {
                let space = self.fonts.measure_text_width(" ", text.font_size, &text.key);
                let gap = space + slack / (words.len() - 1) as f32;
                let mut x = b.x;
                for word in words {
                    self.paint_run(word, x, baseline, &text.key, text.font_size, color);
                    x += self.fonts.measure_text_width(word, text.font_size, &text.key) + gap;
                }
            } else {
                let x = match text.align {
                    TextAlign::Center => b.x + slack / 2.0,
                    TextAlign::Right => b.x + slack,
                    TextAlign::Left | TextAlign::Justify => b.x,
                };
                self.paint_run(line, x, baseline, &text.key, text.font_size, color);
                if text.underline {
                    let thickness = (text.font_size / 16.0).max(1.0);
                    self.fill_rect(x, baseline + text.font_size * 0.1, line_width, thickness, color);
                }
            }
        }
    }

    /// Glyph outlines with a real face; greeked word bars otherwise.
    fn paint_run(&mut self, run: &str, x: f32, baseline: f32, key: &FontKey, size: f32, color: Color) {
        if let Some(shaped) = self.fonts.shape(run, size, key) {
            if let Some(path) = self.fonts.run_path(&shaped, key, size, x, baseline) {
                self.pixmap.fill_path(
                    &path,
                    &fill_paint(color),
                    FillRule::Winding,
                    self.transform,
                    None,
                );
            }
            return;
        }

        let bar_height = size * 0.5;
        let bar_top = baseline - size * 0.6;
        let mut builder = PathBuilder::new();
        let mut offset = 0usize;
        for word in run.split(' ') {
            if !word.is_empty() {
                let start = self.fonts.measure_text_width(&run[..offset], size, key);
                let width = self.fonts.measure_text_width(word, size, key);
                if let Some(rect) = Rect::from_xywh(x + start, bar_top, width, bar_height) {
                    builder.push_rect(rect);
                }
            }
            offset += word.len() + 1;
        }
        if let Some(path) = builder.finish() {
            self.pixmap.fill_path(
                &path,
                &fill_paint(color),
                FillRule::Winding,
                self.transform,
                None,
            );
        }
    }

    fn paint_image(&mut self, b: &PositionedBox, src: &str) {
        let Some(image) = self.images.get(src) else {
            // Failed loads keep their region blank.
            return;
        };
        if image.width() == 0 || image.height() == 0 || b.width <= 0.0 || b.height <= 0.0 {
            return;
        }
        let sx = b.width / image.width() as f32;
        let sy = b.height / image.height() as f32;
        let local = Transform::from_row(sx, 0.0, 0.0, sy, b.x, b.y);
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..PixmapPaint::default()
        };
        self.pixmap.draw_pixmap(
            0,
            0,
            image.as_ref(),
            &paint,
            self.transform.pre_concat(local),
            None,
        );
    }
}
