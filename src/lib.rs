//! # snapshot-forge – print-safe PDF snapshots of rendered screens
//!
//! This crate exports the report or invoice a host is currently showing as a
//! paginated, image-embedded PDF. The pipeline stages are:
//!
//! 1. **Resolve** – weak content reference → live document ([`content`])
//! 2. **Normalize** – detached, color-safe copy with overlays removed,
//!    print rules applied per category ([`normalize`], [`rules`], [`style`])
//! 3. **Rasterize** – taffy layout on an off-screen surface, painted with
//!    tiny-skia ([`layout`], [`surface`], [`raster`], [`images`], [`fonts`])
//! 4. **Paginate** – cut the buffer into page-height bands ([`pagination`])
//! 5. **Assemble** – one embedded image per page via printpdf ([`assemble`])
//!
//! [`pipeline::Exporter`] runs all stages as one job; [`save`] writes the
//! result. A C-compatible FFI surface is exposed via the [`ffi`] module.

pub mod assemble;
pub mod content;
pub mod dom;
pub mod error;
pub mod ffi;
pub mod fonts;
pub mod images;
pub mod layout;
pub mod normalize;
pub mod page_plan;
pub mod pagination;
pub mod pipeline;
pub mod raster;
pub mod rules;
pub mod save;
pub mod style;
pub mod surface;
pub mod templates;

// Re-exports for convenience
pub use assemble::{output_filename, ExportedFile, PDF_MIME};
pub use content::{ContentRef, LiveContent, Theme};
pub use error::{ExportError, PartialContentWarning, Result, Stage};
pub use normalize::{normalize, renormalize, ExclusionPolicy, SanitizedNode};
pub use pagination::{paginate, PageGeometry, PageProfile, PageSlice};
pub use pipeline::{ExportOptions, ExportOutcome, Exporter};
pub use save::{DirectorySaveTarget, SaveTarget};
pub use surface::{JobId, MemorySurfaceProvider, SurfaceProvider};
