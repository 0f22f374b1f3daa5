//! Document assembler – embeds each buffer slice as a full-width image on its
//! own page and emits PDF bytes using `printpdf` (v0.8 ops-based API).

use std::io::Cursor;

use ::image::{imageops, ImageFormat};
use printpdf::*;

use crate::error::{ExportError, Result, Stage};
use crate::page_plan::PagePlan;
use crate::pagination::{PageGeometry, PageSlice};
use crate::raster::RasterBuffer;

/// MIME type of every exported file.
pub const PDF_MIME: &str = "application/pdf";

/// Largest slice side, in pixels, that is embedded.
pub const MAX_SLICE_SIDE: u32 = 65_535;

const PT_TO_MM: f64 = 0.352778;

/// The finished document, ready for the host's save mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub filename: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl ExportedFile {
    pub fn pdf(label: &str, bytes: Vec<u8>) -> Self {
        Self {
            filename: output_filename(label),
            mime: PDF_MIME,
            bytes,
        }
    }
}

/// File name for a document labelled `label`: `<label>.pdf`, with path
/// separators, reserved and control characters replaced by `_`.
pub fn output_filename(label: &str) -> String {
    let cleaned: String = label
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let stem = if cleaned.to_ascii_lowercase().ends_with(".pdf") {
        &cleaned[..cleaned.len() - 4]
    } else {
        cleaned.as_str()
    };
    let stem = stem.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if stem.is_empty() {
        "export.pdf".to_string()
    } else {
        format!("{stem}.pdf")
    }
}

/// Build a PDF with one page per slice of `buffer`.
pub fn assemble(
    buffer: &RasterBuffer,
    slices: &[PageSlice],
    geometry: &PageGeometry,
    title: &str,
) -> Result<Vec<u8>> {
    let plan = PagePlan::new(title, *geometry, buffer.width(), buffer.height(), slices);
    assemble_plan(buffer, &plan)
}

/// Build a PDF laid out by `plan`, which must describe `buffer`.
pub fn assemble_plan(buffer: &RasterBuffer, plan: &PagePlan) -> Result<Vec<u8>> {
    let geometry = &plan.geometry;
    geometry.validate()?;
    if plan.pages.is_empty() {
        return Err(ExportError::assembly(Stage::Embed, "no slices to embed"));
    }
    if plan.buffer_width != buffer.width() || plan.buffer_height != buffer.height() {
        return Err(ExportError::assembly(
            Stage::Embed,
            format!(
                "plan is for a {}x{} buffer, got {}x{}",
                plan.buffer_width,
                plan.buffer_height,
                buffer.width(),
                buffer.height()
            ),
        ));
    }

    let page_w = Mm((geometry.page_width * PT_TO_MM) as f32);
    let page_h = Mm((geometry.page_height * PT_TO_MM) as f32);

    let mut doc = PdfDocument::new(&plan.title);
    let mut warnings: Vec<PdfWarnMsg> = Vec::new();
    let mut pages = Vec::with_capacity(plan.pages.len());

    for page in &plan.pages {
        let png = encode_slice(buffer, &page.slice)?;
        let raw = RawImage::decode_from_bytes(&png, &mut warnings).map_err(|e| {
            ExportError::assembly(Stage::Embed, format!("slice {}: {e}", page.slice.index))
        })?;
        let xobj_id = doc.add_image(&raw);

        // At dpi=72 printpdf renders 1 px = 1 pt, so scale = desired_pt / px.
        let scale_x = page.width_pt / buffer.width() as f64;
        let scale_y = page.height_pt / page.slice.height as f64;
        // PDF origin is bottom-left; the plan measures from the top.
        let bottom = geometry.page_height - page.y_pt - page.height_pt;

        let ops = vec![Op::UseXobject {
            id: xobj_id,
            transform: XObjectTransform {
                translate_x: Some(Pt(page.x_pt as f32)),
                translate_y: Some(Pt(bottom as f32)),
                dpi: Some(72.0),
                scale_x: Some(scale_x as f32),
                scale_y: Some(scale_y as f32),
                rotate: None,
            },
        }];
        pages.push(PdfPage::new(page_w, page_h, ops));
    }

    doc.with_pages(pages);
    let bytes = doc.save(&PdfSaveOptions::default(), &mut warnings);
    for w in &warnings {
        log::debug!("printpdf: {w:?}");
    }
    if bytes.is_empty() {
        return Err(ExportError::assembly(Stage::Finalize, "document serialized to no bytes"));
    }
    Ok(bytes)
}

/// Crop one slice out of the buffer and PNG-encode it.
fn encode_slice(buffer: &RasterBuffer, slice: &PageSlice) -> Result<Vec<u8>> {
    let width = buffer.width();
    if width == 0 || slice.height == 0 {
        return Err(ExportError::assembly(
            Stage::Embed,
            format!("slice {} is empty", slice.index),
        ));
    }
    if slice.end() > u64::from(buffer.height()) {
        return Err(ExportError::assembly(
            Stage::Embed,
            format!(
                "slice {} rows {}..{} exceed buffer height {}",
                slice.index,
                slice.y_offset,
                slice.end(),
                buffer.height()
            ),
        ));
    }
    if width > MAX_SLICE_SIDE || slice.height > MAX_SLICE_SIDE {
        return Err(ExportError::assembly(
            Stage::Embed,
            format!(
                "slice {} is {}x{} px, over the {MAX_SLICE_SIDE} px limit",
                slice.index, width, slice.height
            ),
        ));
    }

    let band = imageops::crop_imm(buffer.image(), 0, slice.y_offset, width, slice.height).to_image();
    let mut png = Vec::new();
    band.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ExportError::assembly(Stage::Encode, e))?;
    Ok(png)
}
