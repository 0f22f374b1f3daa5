//! Page plan – the frozen description of where every slice of a buffer goes
//! in the output document. Serializable so hosts can log or inspect a job.

use serde::{Deserialize, Serialize};

use crate::pagination::{PageGeometry, PageSlice};

/// Placement of all slices of one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagePlan {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "PagePlan::default_title")]
    pub title: String,
    pub geometry: PageGeometry,
    pub buffer_width: u32,
    pub buffer_height: u32,
    /// Points per buffer pixel.
    pub width_ratio: f64,
    /// Ordered list of pages.
    pub pages: Vec<PlannedPage>,
}

/// One page: which buffer rows it shows and where, in points from the
/// page's top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlannedPage {
    pub slice: PageSlice,
    pub x_pt: f64,
    pub y_pt: f64,
    pub width_pt: f64,
    pub height_pt: f64,
}

impl PagePlan {
    pub fn new(
        title: &str,
        geometry: PageGeometry,
        buffer_width: u32,
        buffer_height: u32,
        slices: &[PageSlice],
    ) -> Self {
        let width_ratio = geometry.width_ratio(buffer_width);
        let pages = slices
            .iter()
            .map(|&slice| PlannedPage {
                slice,
                x_pt: geometry.margin,
                y_pt: geometry.margin,
                width_pt: geometry.content_width(),
                height_pt: slice.height_pt(width_ratio),
            })
            .collect();
        Self {
            title: title.to_string(),
            geometry,
            buffer_width,
            buffer_height,
            width_ratio,
            pages,
        }
    }

    fn default_title() -> String {
        "export".to_string()
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn slices(&self) -> Vec<PageSlice> {
        self.pages.iter().map(|p| p.slice).collect()
    }

    /// Serialise to JSON.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Deserialise from JSON.
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }
}
