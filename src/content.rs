//! Live content space – the parsed view a host screen is currently showing,
//! plus the theme that its colors are resolved against.
//!
//! Export jobs never hold the live tree strongly: they receive a
//! [`ContentRef`] and resolve it when the job starts. A host that drops or
//! replaces its content makes outstanding references resolve to
//! `ContentUnavailable`.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};

use crate::dom::{body_children, find_by_id, parse_html, DomNode, ElementNode, Tag};
use crate::error::{ExportError, Result};

/// Theme context of the host: custom properties plus base colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    /// Custom properties keyed by their full name, e.g. `--brand`.
    pub variables: HashMap<String, String>,
    /// Base text color of the host page.
    pub foreground: String,
    /// Base background color of the host page.
    pub background: String,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            variables: HashMap::new(),
            foreground: "#111827".to_string(),
            background: "#ffffff".to_string(),
        }
    }
}

impl Theme {
    pub fn with_variable(mut self, name: &str, value: &str) -> Self {
        let key = if name.starts_with("--") {
            name.to_string()
        } else {
            format!("--{name}")
        };
        self.variables.insert(key, value.to_string());
        self
    }
}

/// The content tree currently on display.
#[derive(Debug, Clone)]
pub struct LiveContent {
    pub nodes: Vec<DomNode>,
    pub theme: Theme,
}

impl LiveContent {
    pub fn new(nodes: Vec<DomNode>, theme: Theme) -> Arc<Self> {
        Arc::new(Self { nodes, theme })
    }

    /// Parse markup into a live document. `:root { --x: ... }` declarations
    /// found in `<style>` blocks are merged into the theme; variables already
    /// present in `theme` take precedence.
    pub fn from_html(html: &str, theme: Theme) -> Arc<Self> {
        let dom = parse_html(html);
        let mut theme = theme;
        let mut declared = HashMap::new();
        collect_root_variables(&dom, &mut declared);
        for (name, value) in declared {
            theme.variables.entry(name).or_insert(value);
        }
        Self::new(body_children(&dom), theme)
    }

    /// The element anchored by `id`, with its ancestors (outermost first).
    pub fn anchor_chain(&self, id: &str) -> Option<Vec<&ElementNode>> {
        find_by_id(&self.nodes, id)
    }
}

/// Weak handle to a [`LiveContent`], optionally narrowed to one element.
#[derive(Debug, Clone)]
pub struct ContentRef {
    doc: Weak<LiveContent>,
    anchor: Option<String>,
}

impl ContentRef {
    /// Reference the whole document.
    pub fn new(doc: &Arc<LiveContent>) -> Self {
        Self {
            doc: Arc::downgrade(doc),
            anchor: None,
        }
    }

    /// Reference the element whose `id` attribute is `anchor`.
    pub fn anchored(doc: &Arc<LiveContent>, anchor: impl Into<String>) -> Self {
        Self {
            doc: Arc::downgrade(doc),
            anchor: Some(anchor.into()),
        }
    }

    /// A reference that points at nothing.
    pub fn detached() -> Self {
        Self {
            doc: Weak::new(),
            anchor: None,
        }
    }

    pub fn anchor(&self) -> Option<&str> {
        self.anchor.as_deref()
    }

    /// Upgrade to the live document.
    pub fn resolve(&self) -> Result<Arc<LiveContent>> {
        self.doc
            .upgrade()
            .ok_or_else(|| ExportError::content_unavailable("content tree is no longer attached"))
    }
}

fn collect_root_variables(nodes: &[DomNode], out: &mut HashMap<String, String>) {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Style {
                for child in &e.children {
                    if let DomNode::Text(css) = child {
                        parse_root_block(css, out);
                    }
                }
            } else {
                collect_root_variables(&e.children, out);
            }
        }
    }
}

fn parse_root_block(css: &str, out: &mut HashMap<String, String>) {
    let mut rest = css;
    while let Some(start) = rest.find(":root") {
        let after = &rest[start + ":root".len()..];
        let Some(open) = after.find('{') else { return };
        let Some(close) = after[open..].find('}') else { return };
        let body = &after[open + 1..open + close];
        for decl in body.split(';') {
            if let Some((name, value)) = decl.split_once(':') {
                let name = name.trim();
                if name.starts_with("--") {
                    out.insert(name.to_string(), value.trim().to_string());
                }
            }
        }
        rest = &after[open + close..];
    }
}
