//! Image sources referenced by content.
//!
//! Loading is behind the [`ImageLoader`] trait so hosts decide where bytes
//! come from. Failures never abort a job: the image region stays blank and
//! a [`PartialContentWarning`] is recorded instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};
use tiny_skia::Pixmap;

use crate::error::PartialContentWarning;
use crate::normalize::{NodeKind, SanitizedNode};

/// Fetches the encoded bytes of an image source.
pub trait ImageLoader: Send + Sync {
    fn load(&self, src: &str) -> Result<Vec<u8>, String>;
}

/// Loads `data:` URIs and local files. Remote URLs are never fetched.
#[derive(Debug, Clone, Default)]
pub struct StandardImageLoader {
    base_dir: Option<PathBuf>,
}

impl StandardImageLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve relative file paths against `dir`.
    pub fn with_base_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(dir.into()),
        }
    }

    fn resolve_path(&self, src: &str) -> PathBuf {
        let path = Path::new(src.strip_prefix("file://").unwrap_or(src));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl ImageLoader for StandardImageLoader {
    fn load(&self, src: &str) -> Result<Vec<u8>, String> {
        if src.is_empty() {
            return Err("image has no source".to_string());
        }
        if src.starts_with("data:") {
            return parse_data_uri(src);
        }
        if src.starts_with("http://") || src.starts_with("https://") {
            return Err("remote images are not fetched".to_string());
        }
        let path = self.resolve_path(src);
        std::fs::read(&path).map_err(|e| format!("cannot read {}: {e}", path.display()))
    }
}

/// Parse a `data:<mime>;base64,<data>` URI and return the raw decoded bytes.
pub fn parse_data_uri(src: &str) -> Result<Vec<u8>, String> {
    let rest = src
        .strip_prefix("data:")
        .ok_or_else(|| "not a data URI".to_string())?;
    let comma_pos = rest
        .find(',')
        .ok_or_else(|| "invalid data URI: missing `,` separator".to_string())?;
    let header = &rest[..comma_pos];
    if !header.contains(";base64") {
        return Err("only base64-encoded data URIs are supported".to_string());
    }
    BASE64_STD
        .decode(rest[comma_pos + 1..].trim())
        .map_err(|e| format!("base64 decode error: {e}"))
}

/// Decode PNG/JPEG bytes into a premultiplied pixmap.
pub fn decode_to_pixmap(bytes: &[u8]) -> Result<Pixmap, String> {
    let decoded = ::image::load_from_memory(bytes).map_err(|e| format!("decode error: {e}"))?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut pixmap = Pixmap::new(width, height)
        .ok_or_else(|| format!("unusable image size {width}x{height}"))?;
    for (src, dst) in rgba
        .as_raw()
        .chunks_exact(4)
        .zip(pixmap.data_mut().chunks_exact_mut(4))
    {
        let a = src[3];
        dst[0] = premul_u8(src[0], a);
        dst[1] = premul_u8(src[1], a);
        dst[2] = premul_u8(src[2], a);
        dst[3] = a;
    }
    Ok(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

/// Decoded images of a tree, keyed by source.
#[derive(Default)]
pub struct ImageSet {
    pub images: HashMap<String, Pixmap>,
    pub warnings: Vec<PartialContentWarning>,
}

impl ImageSet {
    /// Load every distinct image source in `root` through `loader`.
    pub fn collect(root: &SanitizedNode, loader: &dyn ImageLoader) -> Self {
        let mut srcs: Vec<&str> = Vec::new();
        root.walk(&mut |node| {
            if let NodeKind::Image { src } = &node.kind {
                if !srcs.contains(&src.as_str()) {
                    srcs.push(src.as_str());
                }
            }
        });

        let mut set = ImageSet::default();
        for src in srcs {
            match loader.load(src).and_then(|bytes| decode_to_pixmap(&bytes)) {
                Ok(pixmap) => {
                    set.images.insert(src.to_string(), pixmap);
                }
                Err(reason) => {
                    let warning = PartialContentWarning {
                        src: src.to_string(),
                        reason,
                    };
                    log::warn!("Leaving image blank: {warning}");
                    set.warnings.push(warning);
                }
            }
        }
        set
    }

    /// Intrinsic sizes, for layout.
    pub fn sizes(&self) -> HashMap<String, (u32, u32)> {
        self.images
            .iter()
            .map(|(src, p)| (src.clone(), (p.width(), p.height())))
            .collect()
    }
}
