//! Pipeline – ties together normalization, rasterization, pagination and
//! assembly into a single export job.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::assemble::{assemble_plan, ExportedFile};
use crate::content::ContentRef;
use crate::error::{ExportError, PartialContentWarning, Result};
use crate::fonts::FontManager;
use crate::images::{ImageLoader, StandardImageLoader};
use crate::normalize::{normalize, ExclusionPolicy};
use crate::page_plan::PagePlan;
use crate::pagination::{paginate, PageProfile};
use crate::raster::{rasterize, RasterOptions};
use crate::surface::{JobId, MemorySurfaceProvider, SurfaceProvider};

/// Narrowest accepted surface width, in CSS px.
pub const MIN_SURFACE_WIDTH: u32 = 800;
/// Widest accepted surface width, in CSS px.
pub const MAX_SURFACE_WIDTH: u32 = 1200;
/// Largest accepted device scale.
pub const MAX_SCALE: f32 = 4.0;

/// Configuration for one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    /// Layout width of the off-screen surface in CSS px (default: 1000).
    pub surface_width: u32,
    /// Device pixels per CSS px (default: 1.5).
    pub scale: f32,
    /// Output page profile (default: A4 portrait, 15 pt margins).
    pub profile: PageProfile,
    /// Which nodes are left out of the export.
    pub exclusion: ExclusionPolicy,
}

impl Default for ExportOptions {
    fn default() -> Self {
        let raster = RasterOptions::default();
        Self {
            surface_width: raster.width,
            scale: raster.scale,
            profile: PageProfile::default(),
            exclusion: ExclusionPolicy::default(),
        }
    }
}

impl ExportOptions {
    /// Reject options no job could succeed with.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_SURFACE_WIDTH..=MAX_SURFACE_WIDTH).contains(&self.surface_width) {
            return Err(ExportError::InvalidOptions(format!(
                "surface width {} px is outside {MIN_SURFACE_WIDTH}..={MAX_SURFACE_WIDTH}",
                self.surface_width
            )));
        }
        if !self.scale.is_finite() || self.scale <= 0.0 || self.scale > MAX_SCALE {
            return Err(ExportError::InvalidOptions(format!(
                "scale {} is outside (0, {MAX_SCALE}]",
                self.scale
            )));
        }
        self.profile.geometry().validate()
    }

    pub fn raster_options(&self) -> RasterOptions {
        RasterOptions {
            width: self.surface_width,
            scale: self.scale,
        }
    }

    /// Parse options from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ExportError::InvalidOptions(format!("options JSON: {e}")))
    }
}

/// Result of a successful export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    pub file: ExportedFile,
    pub plan: PagePlan,
    /// Resources that could not be loaded and were left blank.
    pub warnings: Vec<PartialContentWarning>,
}

/// Entry point for hosts. Cheap to clone; clones share the surface
/// provider and image loader.
#[derive(Clone)]
pub struct Exporter {
    provider: Arc<dyn SurfaceProvider>,
    loader: Arc<dyn ImageLoader>,
    fonts: FontManager,
    defaults: ExportOptions,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    /// In-memory surfaces, data-URI/local-file images, first system font found.
    pub fn new() -> Self {
        Self {
            provider: Arc::new(MemorySurfaceProvider::new()),
            loader: Arc::new(StandardImageLoader::new()),
            fonts: FontManager::with_system_font(),
            defaults: ExportOptions::default(),
        }
    }

    pub fn with_surface_provider(mut self, provider: Arc<dyn SurfaceProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_image_loader(mut self, loader: Arc<dyn ImageLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_fonts(mut self, fonts: FontManager) -> Self {
        self.fonts = fonts;
        self
    }

    /// Options used by [`Exporter::export_report`].
    pub fn with_options(mut self, options: ExportOptions) -> Self {
        self.defaults = options;
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.defaults
    }

    pub fn surface_provider(&self) -> &Arc<dyn SurfaceProvider> {
        &self.provider
    }

    /// Export the referenced report as `<title>.pdf` with the exporter's
    /// default options.
    pub fn export_report(&self, content: &ContentRef, title: &str) -> Result<ExportOutcome> {
        ExportJob::new(self, &self.defaults).run(content, title)
    }

    /// Export the referenced content as `filename` with explicit options.
    pub fn export_generic(
        &self,
        content: &ContentRef,
        filename: &str,
        options: &ExportOptions,
    ) -> Result<ExportOutcome> {
        ExportJob::new(self, options).run(content, filename)
    }
}

#[cfg(feature = "async")]
impl Exporter {
    /// [`Exporter::export_report`] on the tokio blocking pool.
    pub async fn export_report_async(&self, content: ContentRef, title: String) -> Result<ExportOutcome> {
        let exporter = self.clone();
        tokio::task::spawn_blocking(move || exporter.export_report(&content, &title))
            .await
            .map_err(|e| ExportError::assembly(crate::error::Stage::Finalize, e))?
    }

    /// [`Exporter::export_generic`] on the tokio blocking pool.
    pub async fn export_generic_async(
        &self,
        content: ContentRef,
        filename: String,
        options: ExportOptions,
    ) -> Result<ExportOutcome> {
        let exporter = self.clone();
        tokio::task::spawn_blocking(move || exporter.export_generic(&content, &filename, &options))
            .await
            .map_err(|e| ExportError::assembly(crate::error::Stage::Finalize, e))?
    }
}

/// One export, from content reference to finished file. Every intermediate
/// (sanitized tree, surface, buffer) is owned by [`ExportJob::run`] and
/// dropped when it returns.
pub struct ExportJob<'a> {
    id: JobId,
    exporter: &'a Exporter,
    options: &'a ExportOptions,
}

impl<'a> ExportJob<'a> {
    pub fn new(exporter: &'a Exporter, options: &'a ExportOptions) -> Self {
        Self {
            id: JobId::next(),
            exporter,
            options,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn run(&self, content: &ContentRef, label: &str) -> Result<ExportOutcome> {
        let result = self.run_stages(content, label);
        if let Err(e) = &result {
            log::debug!("{}: aborted ({:?}): {e}", self.id, e.stage());
        }
        result
    }

    fn run_stages(&self, content: &ContentRef, label: &str) -> Result<ExportOutcome> {
        let id = self.id;
        self.options.validate()?;
        let file_name = crate::assemble::output_filename(label);
        let title = file_name.trim_end_matches(".pdf");

        let tree = normalize(content, &self.options.exclusion)?;
        log::debug!("{id}: normalized {} nodes", tree.count(|_| true));

        let rasterized = rasterize(
            &tree,
            &self.options.raster_options(),
            self.exporter.provider.as_ref(),
            self.exporter.loader.as_ref(),
            &self.exporter.fonts,
            id,
        )?;
        drop(tree);
        let buffer = rasterized.buffer;

        let geometry = self.options.profile.geometry();
        let slices = paginate(buffer.width(), buffer.height(), &geometry)?;
        log::debug!("{id}: {} page slices", slices.len());

        let plan = PagePlan::new(title, geometry, buffer.width(), buffer.height(), &slices);
        let bytes = assemble_plan(&buffer, &plan)?;
        drop(buffer);

        log::info!(
            "{id}: exported {file_name:?} ({} page{}, {} bytes)",
            plan.page_count(),
            if plan.page_count() == 1 { "" } else { "s" },
            bytes.len()
        );
        Ok(ExportOutcome {
            file: ExportedFile::pdf(label, bytes),
            plan,
            warnings: rasterized.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{LiveContent, Theme};

    #[test]
    fn pipeline_basic() {
        let doc = LiveContent::from_html("<h1>Hello</h1><p>World</p>", Theme::default());
        let outcome = Exporter::new()
            .export_report(&ContentRef::new(&doc), "Quarterly")
            .unwrap();
        assert_eq!(outcome.file.filename, "Quarterly.pdf");
        assert_eq!(outcome.file.mime, "application/pdf");
        assert_eq!(&outcome.file.bytes[0..5], b"%PDF-");
        assert_eq!(outcome.plan.page_count(), 1);
        assert_eq!(outcome.plan.buffer_width, 1500);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn options_defaults_and_bounds() {
        let options = ExportOptions::default();
        assert_eq!(options.surface_width, 1000);
        assert_eq!(options.scale, 1.5);
        assert!(options.validate().is_ok());

        for width in [799, 1201, 0] {
            let bad = ExportOptions {
                surface_width: width,
                ..ExportOptions::default()
            };
            assert!(matches!(bad.validate(), Err(ExportError::InvalidOptions(_))));
        }
        for scale in [0.0, -1.0, 4.5, f32::NAN] {
            let bad = ExportOptions {
                scale,
                ..ExportOptions::default()
            };
            assert!(bad.validate().is_err(), "scale {scale}");
        }
        let edge = ExportOptions {
            surface_width: 1200,
            scale: 4.0,
            ..ExportOptions::default()
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn options_from_partial_json() {
        let options = ExportOptions::from_json(r#"{"surface_width": 1200}"#).unwrap();
        assert_eq!(options.surface_width, 1200);
        assert_eq!(options.scale, 1.5);
        assert_eq!(options.profile, PageProfile::A4Portrait);
        assert!(ExportOptions::from_json("{not json").is_err());
    }

    #[test]
    fn generic_export_uses_given_options() {
        let doc = LiveContent::from_html("<p>Invoice body</p>", Theme::default());
        let options = ExportOptions {
            surface_width: 800,
            scale: 1.0,
            ..ExportOptions::default()
        };
        let outcome = Exporter::new()
            .export_generic(&ContentRef::new(&doc), "inv-42.pdf", &options)
            .unwrap();
        assert_eq!(outcome.file.filename, "inv-42.pdf");
        assert_eq!(outcome.plan.buffer_width, 800);
        assert_eq!(outcome.plan.title, "inv-42");
    }

    #[test]
    fn invalid_options_fail_before_any_surface() {
        let provider = Arc::new(MemorySurfaceProvider::new());
        let exporter = Exporter::new().with_surface_provider(provider.clone());
        let doc = LiveContent::from_html("<p>x</p>", Theme::default());
        let options = ExportOptions {
            scale: 0.0,
            ..ExportOptions::default()
        };
        assert!(exporter
            .export_generic(&ContentRef::new(&doc), "x", &options)
            .is_err());
        assert!(provider.attached().is_empty());
    }

    #[test]
    fn job_ids_are_unique() {
        let exporter = Exporter::new();
        let options = ExportOptions::default();
        let a = ExportJob::new(&exporter, &options);
        let b = ExportJob::new(&exporter, &options);
        assert_ne!(a.id(), b.id());
    }

    #[cfg(feature = "async")]
    mod async_exports {
        use super::*;
        use crate::error::Stage;
        use crate::surface::JobId;
        use tiny_skia::Pixmap;

        struct PanickingProvider;

        impl SurfaceProvider for PanickingProvider {
            fn create(&self, _job: JobId, _width: u32, _height: u32) -> Result<Pixmap> {
                panic!("surface driver crashed");
            }

            fn release(&self, _job: JobId) {}

            fn is_attached(&self, _job: JobId) -> bool {
                false
            }
        }

        #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
        async fn report_exports_on_blocking_pool() {
            let provider = Arc::new(MemorySurfaceProvider::new());
            let exporter = Exporter::new()
                .with_surface_provider(provider.clone())
                .with_fonts(FontManager::new());
            let doc = LiveContent::from_html("<h1>Async</h1><p>Body</p>", Theme::default());

            let outcome = exporter
                .export_report_async(ContentRef::new(&doc), "Async".to_string())
                .await
                .unwrap();
            assert_eq!(outcome.file.filename, "Async.pdf");
            assert_eq!(&outcome.file.bytes[0..5], b"%PDF-");

            let options = ExportOptions {
                surface_width: 800,
                ..ExportOptions::default()
            };
            let generic = exporter
                .export_generic_async(ContentRef::new(&doc), "async-generic.pdf".to_string(), options)
                .await
                .unwrap();
            assert_eq!(generic.plan.buffer_width, 1200);
            assert!(provider.attached().is_empty());
        }

        #[tokio::test]
        async fn crashed_job_is_an_assembly_failure() {
            let exporter = Exporter::new()
                .with_surface_provider(Arc::new(PanickingProvider))
                .with_fonts(FontManager::new());
            let doc = LiveContent::from_html("<p>x</p>", Theme::default());
            let err = exporter
                .export_report_async(ContentRef::new(&doc), "x".to_string())
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                ExportError::AssemblyFailed {
                    stage: Stage::Finalize,
                    ..
                }
            ));
        }
    }
}
