//! Layout engine – uses Taffy to compute block/flex layout of a sanitized
//! tree at a fixed surface width, then converts the result into a tree of
//! positioned boxes in surface (CSS pixel) coordinates.

use std::collections::HashMap;
use taffy::prelude::*;

use crate::error::{ExportError, Result, Stage};
use crate::fonts::{wrap_text, FontKey, FontManager};
use crate::normalize::{NodeKind, PrintColors, SanitizedNode};
use crate::style::{self, ComputedStyle, TextAlign, TextDecoration, WhiteSpace};

// ---------------------------------------------------------------------------
// Positioned tree
// ---------------------------------------------------------------------------

/// Wrapped text of a block, ready to paint.
#[derive(Debug, Clone, PartialEq)]
pub struct TextBlock {
    pub lines: Vec<String>,
    pub key: FontKey,
    pub font_size: f32,
    /// Line box height in px.
    pub line_height: f32,
    pub align: TextAlign,
    pub underline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BoxContent {
    None,
    Text(TextBlock),
    Image { src: String },
    Rule,
}

/// A positioned box in surface coordinates.
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub colors: PrintColors,
    pub content: BoxContent,
    /// List marker drawn in the left gutter.
    pub marker: Option<String>,
    pub children: Vec<PositionedBox>,
}

impl PositionedBox {
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a PositionedBox)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }
}

/// Result of laying out a whole tree.
#[derive(Debug, Clone)]
pub struct LaidOut {
    pub root: PositionedBox,
    /// Surface width in CSS px.
    pub width: f32,
    /// Total content height in CSS px, including the root's margins.
    pub height: f32,
}

// ---------------------------------------------------------------------------
// Build Taffy tree from sanitized nodes
// ---------------------------------------------------------------------------

struct NodeInfo {
    style: ComputedStyle,
    colors: PrintColors,
    content: BoxContent,
    marker: Option<String>,
}

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    image_sizes: &'a HashMap<String, (u32, u32)>,
    info: HashMap<NodeId, NodeInfo>,
}

fn layout_err(e: taffy::TaffyError) -> ExportError {
    ExportError::raster(Stage::Layout, e)
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, image_sizes: &'a HashMap<String, (u32, u32)>) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            image_sizes,
            info: HashMap::new(),
        }
    }

    fn collect_inline_text(node: &SanitizedNode, out: &mut String) {
        match &node.kind {
            NodeKind::Text(t) => out.push_str(t),
            NodeKind::LineBreak => out.push('\n'),
            _ => {
                for child in &node.children {
                    Self::collect_inline_text(child, out);
                }
            }
        }
    }

    fn record(&mut self, id: NodeId, node: &SanitizedNode, style: &ComputedStyle, content: BoxContent) {
        let marker = match &node.kind {
            NodeKind::ListItem { marker } => Some(marker.clone()),
            _ => None,
        };
        self.info.insert(
            id,
            NodeInfo {
                style: style.clone(),
                colors: node.colors,
                content,
                marker,
            },
        );
    }

    fn build_node(&mut self, node: &SanitizedNode, parent_width: f32) -> Result<NodeId> {
        match &node.kind {
            NodeKind::Text(text) => self.build_text_leaf(text, node, parent_width),
            NodeKind::Image { src } => self.build_image(src, node, parent_width),
            NodeKind::Rule => {
                let s = &node.style;
                let ts = Style {
                    size: Size {
                        width: taffy::Dimension::Percent(1.0),
                        height: taffy::Dimension::Length(s.border_width.max(1.0)),
                    },
                    margin: margin_rect(s),
                    ..Default::default()
                };
                let id = self.taffy.new_leaf(ts).map_err(layout_err)?;
                self.record(id, node, &node.style, BoxContent::Rule);
                Ok(id)
            }
            NodeKind::LineBreak => {
                let h = self
                    .fonts
                    .line_height_px(node.style.font_size, node.style.line_height);
                let ts = Style {
                    size: Size {
                        width: taffy::Dimension::Length(0.0),
                        height: taffy::Dimension::Length(h),
                    },
                    ..Default::default()
                };
                let id = self.taffy.new_leaf(ts).map_err(layout_err)?;
                self.record(id, node, &node.style, BoxContent::None);
                Ok(id)
            }
            _ => self.build_element(node, parent_width),
        }
    }

    fn build_element(&mut self, node: &SanitizedNode, parent_width: f32) -> Result<NodeId> {
        let s = &node.style;
        let my_width = match s.width {
            style::Dimension::Px(w) => w,
            style::Dimension::Percent(p) => parent_width * p / 100.0,
            style::Dimension::Auto => parent_width - s.margin_left - s.margin_right,
        };
        let inner_width =
            (my_width - s.padding_left - s.padding_right - s.left_border() - s.border_width).max(1.0);

        let mut child_nodes = Vec::new();
        if !node.children.is_empty() && node.children.iter().all(|c| c.kind.is_inline()) {
            // Inline runs are merged into one wrapped text block so they flow.
            let mut raw = String::new();
            for child in &node.children {
                Self::collect_inline_text(child, &mut raw);
            }
            if !raw.trim().is_empty() {
                child_nodes.push(self.build_text_leaf(&raw, node, inner_width)?);
            }
        } else {
            let is_flex_row = matches!(node.kind, NodeKind::TableRow)
                || (s.display == style::Display::Flex
                    && s.flex_direction == style::FlexDirection::Row);
            let child_build_width = if is_flex_row {
                let count = node.children.len().max(1);
                let gap_total = s.gap * count.saturating_sub(1) as f32;
                ((inner_width - gap_total) / count as f32).max(1.0)
            } else {
                inner_width
            };
            for child in &node.children {
                child_nodes.push(self.build_node(child, child_build_width)?);
            }
        }

        let ts = computed_to_taffy(s, &node.kind);
        let id = self
            .taffy
            .new_with_children(ts, &child_nodes)
            .map_err(layout_err)?;
        self.record(id, node, s, BoxContent::None);
        Ok(id)
    }

    /// A leaf holding wrapped text in the typography of `owner`.
    fn build_text_leaf(&mut self, text: &str, owner: &SanitizedNode, max_width: f32) -> Result<NodeId> {
        let s = &owner.style;
        let key = FontKey::for_style(s);
        let line_height = self.fonts.line_height_px(s.font_size, s.line_height);

        let lines: Vec<String> = match s.white_space {
            WhiteSpace::PreWrap => wrap_text(text, s.font_size, &key, max_width, true, self.fonts),
            WhiteSpace::Normal => text
                .split('\n')
                .flat_map(|segment| {
                    wrap_text(segment, s.font_size, &key, max_width, false, self.fonts)
                })
                .collect(),
        };

        let ts = Style {
            size: Size {
                width: taffy::Dimension::Auto,
                height: taffy::Dimension::Length(lines.len() as f32 * line_height),
            },
            min_size: Size {
                width: taffy::Dimension::Length(0.0),
                height: taffy::Dimension::Auto,
            },
            ..Default::default()
        };
        let id = self.taffy.new_leaf(ts).map_err(layout_err)?;

        // Text boxes paint only glyphs; box-model belongs to the owner.
        let mut text_style = s.clone();
        text_style.border_width = 0.0;
        text_style.border_left_width = 0.0;
        let content = BoxContent::Text(TextBlock {
            lines,
            font_size: s.font_size,
            line_height,
            align: s.text_align,
            underline: s.text_decoration == TextDecoration::Underline,
            key,
        });
        self.info.insert(
            id,
            NodeInfo {
                style: text_style,
                colors: owner.colors,
                content,
                marker: None,
            },
        );
        Ok(id)
    }

    fn build_image(&mut self, src: &str, node: &SanitizedNode, parent_width: f32) -> Result<NodeId> {
        let s = &node.style;
        let (w, h) = image_box(s, self.image_sizes.get(src).copied(), parent_width);
        let ts = Style {
            size: Size {
                width: taffy::Dimension::Length(w),
                height: taffy::Dimension::Length(h),
            },
            margin: margin_rect(s),
            flex_shrink: 0.0,
            ..Default::default()
        };
        let id = self.taffy.new_leaf(ts).map_err(layout_err)?;
        self.record(
            id,
            node,
            s,
            BoxContent::Image {
                src: src.to_string(),
            },
        );
        Ok(id)
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&mut self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox> {
        let layout = *self.taffy.layout(node).map_err(layout_err)?;
        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let mut children = Vec::new();
        for child in self.taffy.children(node).map_err(layout_err)? {
            children.push(self.extract(child, x, y)?);
        }

        let info = self
            .info
            .remove(&node)
            .ok_or_else(|| ExportError::raster(Stage::Layout, "layout node without source"))?;
        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            style: info.style,
            colors: info.colors,
            content: info.content,
            marker: info.marker,
            children,
        })
    }
}

/// Box size of an image: explicit sizes win, the other side follows the
/// intrinsic aspect ratio; never wider than the container.
fn image_box(s: &ComputedStyle, intrinsic: Option<(u32, u32)>, parent_width: f32) -> (f32, f32) {
    let known_w = match s.width {
        style::Dimension::Px(v) => Some(v),
        style::Dimension::Percent(p) => Some(parent_width * p / 100.0),
        style::Dimension::Auto => None,
    };
    let known_h = match s.height {
        style::Dimension::Px(v) => Some(v),
        _ => None,
    };
    let (w, h) = match intrinsic {
        Some((pw, ph)) if pw > 0 && ph > 0 => {
            let aspect = pw as f32 / ph as f32;
            match (known_w, known_h) {
                (Some(w), Some(h)) => (w, h),
                (Some(w), None) => (w, w / aspect),
                (None, Some(h)) => (h * aspect, h),
                (None, None) => (pw as f32, ph as f32),
            }
        }
        _ => (known_w.unwrap_or(0.0), known_h.unwrap_or(0.0)),
    };
    if w > parent_width && w > 0.0 {
        (parent_width, h * parent_width / w)
    } else {
        (w, h)
    }
}

fn margin_rect(s: &ComputedStyle) -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(s.margin_top),
        right: LengthPercentageAuto::Length(s.margin_right),
        bottom: LengthPercentageAuto::Length(s.margin_bottom),
        left: LengthPercentageAuto::Length(s.margin_left),
    }
}

fn padding_rect(s: &ComputedStyle) -> Rect<LengthPercentage> {
    Rect {
        top: LengthPercentage::Length(s.padding_top),
        right: LengthPercentage::Length(s.padding_right),
        bottom: LengthPercentage::Length(s.padding_bottom),
        left: LengthPercentage::Length(s.padding_left),
    }
}

fn border_rect(s: &ComputedStyle) -> Rect<LengthPercentage> {
    Rect {
        top: LengthPercentage::Length(s.border_width),
        right: LengthPercentage::Length(s.border_width),
        bottom: LengthPercentage::Length(s.border_width),
        left: LengthPercentage::Length(s.left_border()),
    }
}

fn dim_to_taffy(d: style::Dimension) -> taffy::Dimension {
    match d {
        style::Dimension::Auto => taffy::Dimension::Auto,
        style::Dimension::Px(v) => taffy::Dimension::Length(v),
        style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
    }
}

fn computed_to_taffy(s: &ComputedStyle, kind: &NodeKind) -> Style {
    let mut ts = Style {
        margin: margin_rect(s),
        padding: padding_rect(s),
        border: border_rect(s),
        ..Default::default()
    };

    // Table model: rows are flex rows of equal-width cells.
    match kind {
        NodeKind::Table => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
            ts.size.width = dim_to_taffy(s.width);
            ts.min_size.width = taffy::Dimension::Length(0.0);
            return ts;
        }
        NodeKind::TableRow => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Row;
            ts.align_items = Some(taffy::AlignItems::Stretch);
            ts.size.width = taffy::Dimension::Percent(1.0);
            ts.min_size.width = taffy::Dimension::Length(0.0);
            return ts;
        }
        NodeKind::TableCell { .. } => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
            ts.flex_grow = 1.0;
            ts.flex_shrink = 1.0;
            ts.flex_basis = taffy::Dimension::Length(0.0);
            ts.min_size.width = taffy::Dimension::Length(0.0);
            return ts;
        }
        _ => {}
    }

    match s.display {
        style::Display::Flex => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = match s.flex_direction {
                style::FlexDirection::Row => taffy::FlexDirection::Row,
                style::FlexDirection::Column => taffy::FlexDirection::Column,
            };
            ts.flex_wrap = match s.flex_wrap {
                style::FlexWrap::NoWrap => taffy::FlexWrap::NoWrap,
                style::FlexWrap::Wrap => taffy::FlexWrap::Wrap,
            };
            ts.justify_content = Some(match s.justify_content {
                style::JustifyContent::Start => taffy::JustifyContent::Start,
                style::JustifyContent::End => taffy::JustifyContent::End,
                style::JustifyContent::Center => taffy::JustifyContent::Center,
                style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
                style::JustifyContent::SpaceAround => taffy::JustifyContent::SpaceAround,
                style::JustifyContent::SpaceEvenly => taffy::JustifyContent::SpaceEvenly,
            });
            ts.align_items = Some(match s.align_items {
                style::AlignItems::Start => taffy::AlignItems::Start,
                style::AlignItems::End => taffy::AlignItems::End,
                style::AlignItems::Center => taffy::AlignItems::Center,
                style::AlignItems::Stretch => taffy::AlignItems::Stretch,
            });
        }
        style::Display::Grid => {
            ts.display = taffy::Display::Grid;
            let cols = s.grid_columns.max(1);
            ts.grid_template_columns = vec![taffy::TrackSizingFunction::from_flex(1.0); cols];
        }
        style::Display::None => {
            ts.display = taffy::Display::None;
        }
        _ => {
            // Everything else stacks vertically.
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
        }
    }

    ts.size = Size {
        width: dim_to_taffy(s.width),
        height: dim_to_taffy(s.height),
    };
    ts.min_size = Size {
        width: if s.flex_shrink > 0.0 || s.flex_grow > 0.0 {
            taffy::Dimension::Length(0.0)
        } else {
            dim_to_taffy(s.min_width)
        },
        height: taffy::Dimension::Auto,
    };
    ts.max_size = Size {
        width: dim_to_taffy(s.max_width),
        height: taffy::Dimension::Auto,
    };
    ts.flex_grow = s.flex_grow;
    ts.flex_shrink = s.flex_shrink;
    ts.gap = Size {
        width: LengthPercentage::Length(s.gap),
        height: LengthPercentage::Length(s.gap),
    };
    ts
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Lay out `root` on a surface `width` CSS px wide.
///
/// `image_sizes` maps image sources to their intrinsic pixel size; images
/// missing from it keep only their explicit dimensions.
pub fn layout_tree(
    root: &SanitizedNode,
    width: f32,
    fonts: &FontManager,
    image_sizes: &HashMap<String, (u32, u32)>,
) -> Result<LaidOut> {
    let mut builder = LayoutBuilder::new(fonts, image_sizes);
    let content = builder.build_node(root, width)?;

    let surface_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: taffy::Dimension::Length(width),
            height: taffy::Dimension::Auto,
        },
        ..Default::default()
    };
    let surface = builder
        .taffy
        .new_with_children(surface_style, &[content])
        .map_err(layout_err)?;

    builder
        .taffy
        .compute_layout(
            surface,
            Size {
                width: AvailableSpace::Definite(width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(layout_err)?;

    let height = builder.taffy.layout(surface).map_err(layout_err)?.size.height;
    let root_box = builder.extract(content, 0.0, 0.0)?;
    log::debug!("Laid out {width}x{height} css px");
    Ok(LaidOut {
        root: root_box,
        width,
        height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentRef, LiveContent, Theme};
    use crate::normalize::{normalize, ExclusionPolicy};

    fn lay_out(html: &str, width: f32) -> LaidOut {
        let live = LiveContent::from_html(html, Theme::default());
        let root = normalize(&ContentRef::new(&live), &ExclusionPolicy::default()).unwrap();
        layout_tree(&root, width, &FontManager::new(), &HashMap::new()).unwrap()
    }

    #[test]
    fn layout_simple_paragraph() {
        let out = lay_out("<p>Hello world</p>", 1000.0);
        assert!(out.height > 0.0);
        let mut texts = 0;
        out.root.walk(&mut |b| {
            if let BoxContent::Text(t) = &b.content {
                texts += 1;
                assert_eq!(t.lines, vec!["Hello world"]);
                assert!(b.width > 0.0 && b.height > 0.0);
            }
        });
        assert_eq!(texts, 1);
    }

    #[test]
    fn long_text_wraps_and_grows() {
        let words = "lorem ipsum dolor sit amet ".repeat(40);
        let narrow = lay_out(&format!("<p>{words}</p>"), 800.0);
        let wide = lay_out(&format!("<p>{words}</p>"), 1200.0);
        assert!(narrow.height > wide.height);
    }

    #[test]
    fn table_cells_share_row_width() {
        let out = lay_out(
            "<table><tr><td>a</td><td>b</td></tr></table>",
            1000.0,
        );
        let mut widths = Vec::new();
        out.root.walk(&mut |b| {
            // Cells are the only boxes with both a border and cell padding.
            if b.style.border_width > 0.0 && b.style.padding_top == 6.0 {
                widths.push(b.width);
            }
        });
        assert_eq!(widths.len(), 2, "{widths:?}");
        assert!((widths[0] - widths[1]).abs() < 1.0);
    }

    #[test]
    fn list_items_carry_markers() {
        let out = lay_out("<ol><li>one</li><li>two</li></ol>", 1000.0);
        let mut markers = Vec::new();
        out.root.walk(&mut |b| {
            if let Some(m) = &b.marker {
                markers.push(m.clone());
            }
        });
        assert_eq!(markers, vec!["1.", "2."]);
    }

    #[test]
    fn image_keeps_aspect_and_fits_container() {
        let s = ComputedStyle::default();
        assert_eq!(image_box(&s, Some((400, 200)), 1000.0), (400.0, 200.0));
        assert_eq!(image_box(&s, Some((2000, 1000)), 1000.0), (1000.0, 500.0));
        assert_eq!(image_box(&s, None, 1000.0), (0.0, 0.0));
    }
}
