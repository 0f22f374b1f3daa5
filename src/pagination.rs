//! Pagination – splits a tall raster buffer into page-height bands.
//!
//! The buffer is scaled uniformly so its width fills the printable width of
//! a page. Bands are cut at whole pixel rows from the top; the last band may
//! be shorter. Slices never overlap, leave no gaps, and their heights sum to
//! the buffer height.

use serde::{Deserialize, Serialize};

use crate::error::{ExportError, Result, Stage};

/// Tolerance when comparing the scaled height against the printable height.
pub const FIT_TOLERANCE: f64 = 1e-6;

/// Page size and uniform margin, in PDF points (1 pt = 1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageGeometry {
    pub page_width: f64,
    pub page_height: f64,
    pub margin: f64,
}

impl PageGeometry {
    pub fn content_width(&self) -> f64 {
        self.page_width - 2.0 * self.margin
    }

    pub fn content_height(&self) -> f64 {
        self.page_height - 2.0 * self.margin
    }

    /// Reject geometry that leaves no printable area.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.page_width, self.page_height, self.margin]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.margin < 0.0 || self.content_width() <= 0.0 || self.content_height() <= 0.0 {
            return Err(ExportError::InvalidOptions(format!(
                "page {}x{} pt with margin {} pt has no printable area",
                self.page_width, self.page_height, self.margin
            )));
        }
        Ok(())
    }

    /// Points per buffer pixel when a buffer `buffer_width` px wide fills the
    /// printable width.
    pub fn width_ratio(&self, buffer_width: u32) -> f64 {
        self.content_width() / buffer_width as f64
    }
}

/// Supported page profiles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageProfile {
    /// ISO A4 portrait with 15 pt margins.
    #[default]
    A4Portrait,
}

impl PageProfile {
    pub fn geometry(self) -> PageGeometry {
        match self {
            // A4: 210mm × 297mm = 595.28 × 841.89 points
            PageProfile::A4Portrait => PageGeometry {
                page_width: 595.28,
                page_height: 841.89,
                margin: 15.0,
            },
        }
    }
}

/// One band of the buffer, in buffer pixel rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSlice {
    /// Zero-based page index.
    pub index: usize,
    pub y_offset: u32,
    pub height: u32,
}

impl PageSlice {
    /// Rendered height on the page, in points.
    pub fn height_pt(&self, width_ratio: f64) -> f64 {
        self.height as f64 * width_ratio
    }

    /// One past the last buffer row of the slice. Widened so any offset and
    /// height can be compared against a buffer.
    pub fn end(&self) -> u64 {
        u64::from(self.y_offset) + u64::from(self.height)
    }
}

/// Cut a `buffer_width` × `buffer_height` buffer into page slices.
pub fn paginate(buffer_width: u32, buffer_height: u32, geometry: &PageGeometry) -> Result<Vec<PageSlice>> {
    geometry.validate()?;
    if buffer_width == 0 || buffer_height == 0 {
        return Err(ExportError::assembly(
            Stage::Paginate,
            format!("cannot paginate an empty {buffer_width}x{buffer_height} buffer"),
        ));
    }

    let ratio = geometry.width_ratio(buffer_width);
    let available = geometry.content_height();
    let scaled_height = buffer_height as f64 * ratio;

    if scaled_height <= available + FIT_TOLERANCE {
        return Ok(vec![PageSlice {
            index: 0,
            y_offset: 0,
            height: buffer_height,
        }]);
    }

    // Buffer rows that fit on one page; at least one so every slice advances.
    let per_page = (available / ratio).max(1.0);

    let mut slices = Vec::new();
    let mut start = 0u32;
    let mut k = 1u64;
    while start < buffer_height {
        let cut = (k as f64 * per_page).floor();
        let end = if cut >= buffer_height as f64 {
            buffer_height
        } else {
            cut as u32
        };
        slices.push(PageSlice {
            index: slices.len(),
            y_offset: start,
            height: end - start,
        });
        start = end;
        k += 1;
    }

    log::debug!(
        "Paginated {buffer_width}x{buffer_height} buffer into {} slices of up to {per_page:.2} rows",
        slices.len()
    );
    Ok(slices)
}
