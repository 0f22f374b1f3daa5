//! Error taxonomy for export jobs.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Pipeline stage an error was raised in, carried for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Resolve,
    Normalize,
    Layout,
    Surface,
    Paint,
    Encode,
    Paginate,
    Embed,
    Finalize,
    Save,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Resolve => "resolve",
            Stage::Normalize => "normalize",
            Stage::Layout => "layout",
            Stage::Surface => "surface",
            Stage::Paint => "paint",
            Stage::Encode => "encode",
            Stage::Paginate => "paginate",
            Stage::Embed => "embed",
            Stage::Finalize => "finalize",
            Stage::Save => "save",
        };
        f.write_str(name)
    }
}

/// Fatal errors that abort an export job.
#[derive(Error, Debug)]
pub enum ExportError {
    /// The content reference is missing or its document has been dropped.
    #[error("content unavailable: {reason}")]
    ContentUnavailable { reason: String },

    /// The off-screen surface could not be created, painted or encoded.
    #[error("rasterization failed at {stage}: {cause}")]
    RasterizationFailed { stage: Stage, cause: String },

    /// A slice could not be embedded or the document could not be finalized.
    #[error("assembly failed at {stage}: {cause}")]
    AssemblyFailed { stage: Stage, cause: String },

    /// Options were rejected before the job started.
    #[error("invalid export options: {0}")]
    InvalidOptions(String),

    /// I/O error while delivering the finished file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ExportError {
    pub fn content_unavailable(reason: impl Into<String>) -> Self {
        ExportError::ContentUnavailable {
            reason: reason.into(),
        }
    }

    pub fn raster(stage: Stage, cause: impl fmt::Display) -> Self {
        ExportError::RasterizationFailed {
            stage,
            cause: cause.to_string(),
        }
    }

    pub fn assembly(stage: Stage, cause: impl fmt::Display) -> Self {
        ExportError::AssemblyFailed {
            stage,
            cause: cause.to_string(),
        }
    }

    /// Stage the error was raised in, when it has one.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ExportError::ContentUnavailable { .. } => Some(Stage::Resolve),
            ExportError::RasterizationFailed { stage, .. }
            | ExportError::AssemblyFailed { stage, .. } => Some(*stage),
            ExportError::Io(_) => Some(Stage::Save),
            ExportError::InvalidOptions(_) => None,
        }
    }

    /// One sentence suitable for showing to the person who triggered the export.
    pub fn user_message(&self) -> &'static str {
        match self {
            ExportError::ContentUnavailable { .. } => {
                "There is nothing to export on this screen right now."
            }
            ExportError::RasterizationFailed { .. } => {
                "The report could not be rendered for export. Please try again."
            }
            ExportError::AssemblyFailed { .. } => {
                "The PDF could not be assembled. Please try again."
            }
            ExportError::InvalidOptions(_) => "The export settings are not valid.",
            ExportError::Io(_) => "The exported file could not be saved.",
        }
    }
}

/// Non-fatal: a referenced resource could not be loaded and was left blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialContentWarning {
    pub src: String,
    pub reason: String,
}

impl fmt::Display for PartialContentWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let preview = if self.src.len() > 80 {
            let mut end = 80;
            while !self.src.is_char_boundary(end) {
                end -= 1;
            }
            &self.src[..end]
        } else {
            &self.src
        };
        write!(f, "skipped {preview:?}: {}", self.reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_stage_and_cause() {
        let err = ExportError::raster(Stage::Surface, "no memory");
        assert_eq!(err.to_string(), "rasterization failed at surface: no memory");
        assert_eq!(err.stage(), Some(Stage::Surface));
    }

    #[test]
    fn warning_truncates_long_sources() {
        let w = PartialContentWarning {
            src: "x".repeat(200),
            reason: "decode".to_string(),
        };
        assert!(w.to_string().len() < 120);
    }
}
