//! Off-screen surfaces.
//!
//! A job asks a [`SurfaceProvider`] for a pixel surface under its own
//! [`JobId`] and holds it through a [`MountedSurface`] guard. Dropping the
//! guard releases the surface, so every exit path of a job (success, error,
//! panic unwinding) detaches it.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use tiny_skia::Pixmap;

use crate::error::{ExportError, Result, Stage};

/// Default pixel budget of [`MemorySurfaceProvider`]: 64 megapixels.
pub const DEFAULT_PIXEL_BUDGET: u64 = 64 * 1024 * 1024;

static NEXT_JOB: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique identifier of an export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u64);

impl JobId {
    pub fn next() -> Self {
        JobId(NEXT_JOB.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Host of off-screen surfaces.
pub trait SurfaceProvider: Send + Sync {
    /// Create and attach a white surface of `width` × `height` pixels for `job`.
    fn create(&self, job: JobId, width: u32, height: u32) -> Result<Pixmap>;

    /// Detach the surface of `job`. Releasing an unknown job is a no-op.
    fn release(&self, job: JobId);

    fn is_attached(&self, job: JobId) -> bool;
}

/// Scoped ownership of an attached surface.
pub struct MountedSurface<'p> {
    provider: &'p dyn SurfaceProvider,
    job: JobId,
    pixmap: Pixmap,
}

impl<'p> MountedSurface<'p> {
    pub fn mount(provider: &'p dyn SurfaceProvider, job: JobId, width: u32, height: u32) -> Result<Self> {
        let pixmap = provider.create(job, width, height)?;
        log::debug!("{job}: mounted {width}x{height} surface");
        Ok(Self {
            provider,
            job,
            pixmap,
        })
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn pixmap_mut(&mut self) -> &mut Pixmap {
        &mut self.pixmap
    }
}

impl Drop for MountedSurface<'_> {
    fn drop(&mut self) {
        self.provider.release(self.job);
        log::debug!("{}: surface released", self.job);
    }
}

/// In-process provider backed by heap pixmaps.
#[derive(Debug)]
pub struct MemorySurfaceProvider {
    attached: Mutex<HashSet<JobId>>,
    max_pixels: u64,
}

impl Default for MemorySurfaceProvider {
    fn default() -> Self {
        Self::with_pixel_budget(DEFAULT_PIXEL_BUDGET)
    }
}

impl MemorySurfaceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse surfaces larger than `max_pixels` in area.
    pub fn with_pixel_budget(max_pixels: u64) -> Self {
        Self {
            attached: Mutex::new(HashSet::new()),
            max_pixels,
        }
    }

    /// Jobs currently holding a surface, in ascending order.
    pub fn attached(&self) -> Vec<JobId> {
        let mut jobs: Vec<JobId> = match self.attached.lock() {
            Ok(set) => set.iter().copied().collect(),
            Err(poisoned) => poisoned.into_inner().iter().copied().collect(),
        };
        jobs.sort();
        jobs
    }
}

impl SurfaceProvider for MemorySurfaceProvider {
    fn create(&self, job: JobId, width: u32, height: u32) -> Result<Pixmap> {
        let area = width as u64 * height as u64;
        if area == 0 {
            return Err(ExportError::raster(
                Stage::Surface,
                format!("empty surface {width}x{height}"),
            ));
        }
        if area > self.max_pixels {
            return Err(ExportError::raster(
                Stage::Surface,
                format!(
                    "surface {width}x{height} exceeds the budget of {} pixels",
                    self.max_pixels
                ),
            ));
        }

        let mut attached = self
            .attached
            .lock()
            .map_err(|_| ExportError::raster(Stage::Surface, "surface registry poisoned"))?;
        if attached.contains(&job) {
            return Err(ExportError::raster(
                Stage::Surface,
                format!("{job} already holds a surface"),
            ));
        }
        let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
            ExportError::raster(Stage::Surface, format!("cannot allocate {width}x{height} surface"))
        })?;
        pixmap.fill(tiny_skia::Color::WHITE);
        attached.insert(job);
        Ok(pixmap)
    }

    fn release(&self, job: JobId) {
        if let Ok(mut attached) = self.attached.lock() {
            attached.remove(&job);
        }
    }

    fn is_attached(&self, job: JobId) -> bool {
        self.attached
            .lock()
            .map(|set| set.contains(&job))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_ids_are_unique() {
        let a = JobId::next();
        let b = JobId::next();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("job-"));
    }

    #[test]
    fn guard_releases_on_drop() {
        let provider = MemorySurfaceProvider::new();
        let job = JobId::next();
        {
            let surface = MountedSurface::mount(&provider, job, 10, 10).unwrap();
            assert!(provider.is_attached(job));
            assert_eq!(surface.pixmap().pixel(0, 0).map(|p| p.red()), Some(255));
        }
        assert!(!provider.is_attached(job));
        assert!(provider.attached().is_empty());
    }

    #[test]
    fn over_budget_is_rejected_without_attaching() {
        let provider = MemorySurfaceProvider::with_pixel_budget(100);
        let job = JobId::next();
        let err = MountedSurface::mount(&provider, job, 11, 10).err().unwrap();
        assert!(matches!(
            err,
            ExportError::RasterizationFailed {
                stage: Stage::Surface,
                ..
            }
        ));
        assert!(provider.attached().is_empty());
    }

    #[test]
    fn one_surface_per_job() {
        let provider = MemorySurfaceProvider::new();
        let job = JobId::next();
        let _first = MountedSurface::mount(&provider, job, 4, 4).unwrap();
        assert!(MountedSurface::mount(&provider, job, 4, 4).is_err());
        assert_eq!(provider.attached(), vec![job]);
    }
}
