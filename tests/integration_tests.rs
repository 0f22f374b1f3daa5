//! Integration tests for the snapshot-forge pipeline.
//!
//! These tests validate:
//! - Pagination of tall and short buffers into A4 pages
//! - Sanitized trees are print-safe and stable under renormalization
//! - Surfaces are released whether a job succeeds or fails, and concurrent
//!   jobs never share one
//! - PDF output exists, has a valid header and one page per slice
//! - Options, content references and the save target behave at the edges

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use sha2::{Digest, Sha256};
use tiny_skia::Pixmap;

use snapshot_forge::assemble::assemble;
use snapshot_forge::content::{ContentRef, LiveContent, Theme};
use snapshot_forge::error::{ExportError, Result, Stage};
use snapshot_forge::fonts::FontManager;
use snapshot_forge::images::StandardImageLoader;
use snapshot_forge::normalize::{normalize, renormalize, ExclusionPolicy, NodeKind};
use snapshot_forge::pagination::{paginate, PageProfile};
use snapshot_forge::pipeline::{ExportOptions, Exporter};
use snapshot_forge::raster::{rasterize, RasterBuffer, RasterOptions};
use snapshot_forge::save::{DirectorySaveTarget, SaveTarget};
use snapshot_forge::surface::{JobId, MemorySurfaceProvider, SurfaceProvider};
use snapshot_forge::templates;

// =====================================================================
// Helpers
// =====================================================================

fn assert_valid_pdf(bytes: &[u8]) {
    assert!(bytes.len() > 100, "PDF too small: {} bytes", bytes.len());
    assert_eq!(&bytes[0..5], b"%PDF-", "Missing PDF header");
}

/// Page objects in a PDF (`/Type /Page`, not `/Pages`).
fn count_pages(pdf: &[u8]) -> usize {
    pdf.windows(6)
        .filter(|w| w.starts_with(b"/Page") && !w[5].is_ascii_alphabetic())
        .count()
}

/// Exporter with no system fonts so output does not depend on the host.
fn exporter_with(provider: Arc<dyn SurfaceProvider>) -> Exporter {
    Exporter::new()
        .with_surface_provider(provider)
        .with_fonts(FontManager::new())
}

/// Provider that refuses every surface.
struct FailingProvider;

impl SurfaceProvider for FailingProvider {
    fn create(&self, _job: JobId, _width: u32, _height: u32) -> Result<Pixmap> {
        Err(ExportError::raster(Stage::Surface, "display server unavailable"))
    }

    fn release(&self, _job: JobId) {}

    fn is_attached(&self, _job: JobId) -> bool {
        false
    }
}

/// Provider that counts creations and releases around an in-memory one.
#[derive(Default)]
struct CountingProvider {
    inner: MemorySurfaceProvider,
    created: AtomicUsize,
    released: AtomicUsize,
}

impl SurfaceProvider for CountingProvider {
    fn create(&self, job: JobId, width: u32, height: u32) -> Result<Pixmap> {
        let pixmap = self.inner.create(job, width, height)?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(pixmap)
    }

    fn release(&self, job: JobId) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.inner.release(job);
    }

    fn is_attached(&self, job: JobId) -> bool {
        self.inner.is_attached(job)
    }
}

// =====================================================================
// Pagination scenarios
// =====================================================================

#[test]
fn scenario_tall_buffer_makes_two_pages() {
    let geometry = PageProfile::A4Portrait.geometry();
    let slices = paginate(1200, 3000, &geometry).unwrap();
    assert_eq!(slices.len(), 2);

    // The first page is filled: one more row would not fit.
    let ratio = geometry.width_ratio(1200);
    let first_pt = slices[0].height_pt(ratio);
    assert!(first_pt <= geometry.content_height() + 1e-6);
    assert!(first_pt + ratio > geometry.content_height());
    assert_eq!(slices[0].height + slices[1].height, 3000);

    let buffer = RasterBuffer::blank(1200, 3000);
    let bytes = assemble(&buffer, &slices, &geometry, "Tall").unwrap();
    assert_valid_pdf(&bytes);
    assert_eq!(count_pages(&bytes), 2);
}

#[test]
fn scenario_short_buffer_makes_one_page() {
    let geometry = PageProfile::A4Portrait.geometry();
    let slices = paginate(1200, 500, &geometry).unwrap();
    assert_eq!(slices.len(), 1);
    assert_eq!(slices[0].height, 500);
    assert!(slices[0].height_pt(geometry.width_ratio(1200)) < 242.0);
}

#[test]
fn slices_cover_the_buffer_without_gaps() {
    let geometry = PageProfile::A4Portrait.geometry();
    for height in [1, 999, 1436, 1723, 1724, 5000, 20_000] {
        let slices = paginate(1200, height, &geometry).unwrap();
        let mut y = 0;
        for s in &slices {
            assert_eq!(s.y_offset, y);
            y += s.height;
        }
        assert_eq!(y, height);
    }
}

// =====================================================================
// Normalization
// =====================================================================

#[test]
fn scenario_table_cells_are_print_safe() {
    let doc = LiveContent::from_html(
        "<table><tr><th>Item</th><th>Qty</th></tr><tr><td>Widget</td><td>2</td></tr></table>",
        Theme::default(),
    );
    let tree = normalize(&ContentRef::new(&doc), &ExclusionPolicy::default()).unwrap();
    let mut cells = 0;
    tree.walk(&mut |n| {
        if matches!(n.kind, NodeKind::TableCell { .. }) {
            cells += 1;
            assert!(n.style.border_width > 0.0);
            assert!(n.colors.border.is_opaque());
            assert!(n.colors.background.is_opaque());
        }
    });
    assert_eq!(cells, 4);
}

#[test]
fn normalize_is_idempotent_on_samples() {
    let doc = LiveContent::from_html(templates::report_template(), templates::dark_theme());
    let tree = normalize(&ContentRef::anchored(&doc, "report"), &ExclusionPolicy::default()).unwrap();
    assert_eq!(renormalize(&tree), tree);
    assert_eq!(renormalize(&renormalize(&tree)), tree);
}

#[test]
fn watermark_never_reaches_the_export() {
    let html = r#"<div><p>Body</p><div data-watermark>DRAFT</div>
        <div class="absolute pointer-events-none">Confidential</div></div>"#;
    let doc = LiveContent::from_html(html, Theme::default());
    let tree = normalize(&ContentRef::new(&doc), &ExclusionPolicy::default()).unwrap();
    let text = tree.text_content();
    assert!(text.contains("Body"));
    assert!(!text.contains("DRAFT"));
    assert!(!text.contains("Confidential"));
}

#[test]
fn stray_close_tag_does_not_truncate_the_export() {
    let doc = LiveContent::from_html("<p>Intro</p></div><p>Total due: 42</p>", Theme::default());
    let tree = normalize(&ContentRef::new(&doc), &ExclusionPolicy::default()).unwrap();
    let text = tree.text_content();
    assert!(text.contains("Intro"));
    assert!(text.contains("Total due: 42"), "got {text:?}");
}

#[test]
fn dropped_content_is_unavailable() {
    let doc = LiveContent::from_html("<p>gone soon</p>", Theme::default());
    let content = ContentRef::new(&doc);
    drop(doc);
    let err = exporter_with(Arc::new(MemorySurfaceProvider::new()))
        .export_report(&content, "x")
        .unwrap_err();
    assert!(matches!(err, ExportError::ContentUnavailable { .. }));
    assert!(ContentRef::detached().resolve().is_err());
}

// =====================================================================
// Surfaces
// =====================================================================

#[test]
fn surface_released_after_success() {
    let provider = Arc::new(CountingProvider::default());
    let exporter = exporter_with(provider.clone());
    let doc = LiveContent::from_html(templates::invoice_template(), Theme::default());
    let outcome = exporter.export_report(&ContentRef::new(&doc), "Invoice").unwrap();
    assert_valid_pdf(&outcome.file.bytes);
    assert_eq!(provider.created.load(Ordering::SeqCst), 1);
    assert_eq!(provider.released.load(Ordering::SeqCst), 1);
    assert!(provider.inner.attached().is_empty());
}

#[test]
fn scenario_surface_failure_is_a_rasterization_error() {
    let exporter = exporter_with(Arc::new(FailingProvider));
    let doc = LiveContent::from_html(templates::minimal_template(), Theme::default());
    let err = exporter.export_report(&ContentRef::new(&doc), "Broken").unwrap_err();
    assert!(matches!(
        err,
        ExportError::RasterizationFailed {
            stage: Stage::Surface,
            ..
        }
    ));
    assert!(!err.user_message().is_empty());
}

#[test]
fn surface_released_after_over_budget_failure() {
    let provider = Arc::new(MemorySurfaceProvider::with_pixel_budget(1_000));
    let exporter = exporter_with(provider.clone());
    let doc = LiveContent::from_html(templates::minimal_template(), Theme::default());
    assert!(exporter.export_report(&ContentRef::new(&doc), "x").is_err());
    assert!(provider.attached().is_empty());
}

#[test]
fn concurrent_jobs_are_isolated() {
    let provider = Arc::new(MemorySurfaceProvider::new());
    let exporter = exporter_with(provider.clone());
    let doc = LiveContent::from_html(templates::invoice_template(), Theme::default());

    let handles: Vec<_> = (0..6)
        .map(|i| {
            let exporter = exporter.clone();
            let doc = doc.clone();
            thread::spawn(move || exporter.export_report(&ContentRef::new(&doc), &format!("r{i}")))
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let outcome = handle.join().unwrap().unwrap();
        assert_eq!(outcome.file.filename, format!("r{i}.pdf"));
        assert_valid_pdf(&outcome.file.bytes);
    }
    assert!(provider.attached().is_empty());
}

// =====================================================================
// End to end
// =====================================================================

#[test]
fn long_report_spans_several_pages() {
    let exporter = exporter_with(Arc::new(MemorySurfaceProvider::new()));
    let doc = LiveContent::from_html(&templates::long_report(40), Theme::default());
    let outcome = exporter.export_report(&ContentRef::new(&doc), "Operations Log").unwrap();
    assert_eq!(outcome.file.filename, "Operations Log.pdf");
    assert!(outcome.plan.page_count() > 1);
    assert_eq!(count_pages(&outcome.file.bytes), outcome.plan.page_count());
    let rows: u32 = outcome.plan.slices().iter().map(|s| s.height).sum();
    assert_eq!(rows, outcome.plan.buffer_height);
}

#[test]
fn broken_image_is_a_warning_not_an_error() {
    let exporter = exporter_with(Arc::new(MemorySurfaceProvider::new()));
    let doc = LiveContent::from_html(
        r#"<div><p>Logo below</p><img src="https://cdn.example.com/logo.png" style="width: 40px; height: 40px" /></div>"#,
        Theme::default(),
    );
    let outcome = exporter.export_report(&ContentRef::new(&doc), "img").unwrap();
    assert_eq!(outcome.warnings.len(), 1);
    assert_eq!(outcome.warnings[0].src, "https://cdn.example.com/logo.png");
    assert_valid_pdf(&outcome.file.bytes);
}

#[test]
fn rasterization_is_deterministic() {
    let doc = LiveContent::from_html(templates::report_template(), templates::dark_theme());
    let tree = normalize(&ContentRef::anchored(&doc, "report"), &ExclusionPolicy::default()).unwrap();
    let provider = MemorySurfaceProvider::new();
    let loader = StandardImageLoader::new();
    let fonts = FontManager::new();

    let digest = || {
        let out = rasterize(&tree, &RasterOptions::default(), &provider, &loader, &fonts, JobId::next()).unwrap();
        Sha256::digest(out.buffer.as_bytes())
    };
    assert_eq!(digest(), digest());
}

#[test]
fn invalid_options_are_rejected_up_front() {
    let exporter = exporter_with(Arc::new(MemorySurfaceProvider::new()));
    let doc = LiveContent::from_html("<p>x</p>", Theme::default());
    let options = ExportOptions {
        surface_width: 1600,
        ..ExportOptions::default()
    };
    let err = exporter
        .export_generic(&ContentRef::new(&doc), "x", &options)
        .unwrap_err();
    assert!(matches!(err, ExportError::InvalidOptions(_)));
}

#[test]
fn exported_file_saves_to_directory() {
    let dir = tempfile::tempdir().unwrap();
    let exporter = exporter_with(Arc::new(MemorySurfaceProvider::new()));
    let doc = LiveContent::from_html(templates::minimal_template(), Theme::default());
    let outcome = exporter.export_report(&ContentRef::new(&doc), "Q1/Q2 Summary").unwrap();
    let path = DirectorySaveTarget::new(dir.path()).save(&outcome.file).unwrap();
    assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("Q1_Q2 Summary.pdf"));
    assert_eq!(std::fs::read(&path).unwrap(), outcome.file.bytes);
}
