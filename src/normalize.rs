//! Content normalizer – builds the detached, print-safe copy of a live
//! content tree.
//!
//! Each element goes through two independent passes:
//!
//! 1. **Style resolution** against the live element, with the theme's custom
//!    properties and every ancestor's inline declarations in scope. This is
//!    where the on-screen foreground, background and border colors come from.
//! 2. **Layout copy** of the same element with variable-derived color
//!    declarations stripped, which supplies sizes and spacing.
//!
//! The copy then receives the resolved colors and the print rules for its
//! category. Because neither pass reads the other's output, the order in
//! which colors are stripped and re-applied cannot change the result.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::content::{ContentRef, LiveContent};
use crate::dom::{DomNode, ElementNode, Tag};
use crate::error::{ExportError, Result};
use crate::rules::{rules_for, Category};
use crate::style::{
    declared_variables, inherit_text_properties, parse_color, resolve_style,
    strip_variable_colors, Color, ComputedStyle, Display, Position, Variables, WhiteSpace,
};

/// Which nodes count as decorative overlays and are left out of the copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionPolicy {
    /// Presence of any of these attributes excludes an element.
    pub marker_attributes: Vec<String>,
    /// Any of these classes excludes an element.
    pub marker_classes: Vec<String>,
    /// Text of known overlay labels, compared case-insensitively against
    /// out-of-flow, non-interactive elements.
    pub decorative_labels: Vec<String>,
}

impl Default for ExclusionPolicy {
    fn default() -> Self {
        Self {
            marker_attributes: vec![
                "data-export-exclude".to_string(),
                "data-watermark".to_string(),
            ],
            marker_classes: vec!["watermark".to_string()],
            decorative_labels: vec![
                "DRAFT".to_string(),
                "CONFIDENTIAL".to_string(),
                "PREVIEW".to_string(),
                "SAMPLE".to_string(),
            ],
        }
    }
}

impl ExclusionPolicy {
    /// `true` when `element`, styled as `live` on screen, is decorative.
    pub fn excludes(&self, element: &ElementNode, live: &ComputedStyle) -> bool {
        if self.marker_attributes.iter().any(|a| element.has_attr(a)) {
            return true;
        }
        let classes = element.classes();
        if self.marker_classes.iter().any(|c| classes.contains(&c.as_str())) {
            return true;
        }
        if !(live.is_out_of_flow() && live.pointer_events_none) {
            return false;
        }
        if element.attr("aria-hidden") == Some("true") {
            return true;
        }
        let text = element.text_content();
        self.decorative_labels
            .iter()
            .any(|label| label.eq_ignore_ascii_case(&text))
    }
}

/// Explicit, opaque colors carried by every sanitized node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintColors {
    pub foreground: Color,
    pub background: Color,
    pub border: Color,
}

/// Kind of a sanitized node.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container,
    Heading { level: u8 },
    Paragraph,
    Table,
    TableRow,
    TableCell { header: bool },
    List { ordered: bool },
    ListItem { marker: String },
    Quote,
    Code { block: bool },
    Inline,
    LineBreak,
    Rule,
    Image { src: String },
    Text(String),
}

impl NodeKind {
    pub fn category(&self) -> Category {
        match self {
            NodeKind::Heading { level } => Category::Heading(*level),
            NodeKind::Paragraph => Category::Paragraph,
            NodeKind::Table => Category::Table,
            NodeKind::TableRow => Category::TableRow,
            NodeKind::TableCell { header: true } => Category::HeaderCell,
            NodeKind::TableCell { header: false } => Category::DataCell,
            NodeKind::List { .. } => Category::List,
            NodeKind::ListItem { .. } => Category::ListItem,
            NodeKind::Quote => Category::Quote,
            NodeKind::Code { block } => Category::Code { block: *block },
            NodeKind::Container
            | NodeKind::Inline
            | NodeKind::LineBreak
            | NodeKind::Rule
            | NodeKind::Image { .. }
            | NodeKind::Text(_) => Category::Other,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            NodeKind::Inline
                | NodeKind::LineBreak
                | NodeKind::Text(_)
                | NodeKind::Code { block: false }
        )
    }
}

/// A node of the print-safe copy.
#[derive(Debug, Clone, PartialEq)]
pub struct SanitizedNode {
    pub kind: NodeKind,
    pub style: ComputedStyle,
    pub colors: PrintColors,
    pub children: Vec<SanitizedNode>,
}

impl SanitizedNode {
    /// Visit this node and all descendants, depth first.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a SanitizedNode)) {
        f(self);
        for child in &self.children {
            child.walk(f);
        }
    }

    pub fn count(&self, pred: impl Fn(&SanitizedNode) -> bool) -> usize {
        let mut n = 0;
        self.walk(&mut |node| {
            if pred(node) {
                n += 1;
            }
        });
        n
    }

    /// All text in the subtree, space separated.
    pub fn text_content(&self) -> String {
        let mut parts = Vec::new();
        self.walk(&mut |node| {
            if let NodeKind::Text(t) = &node.kind {
                parts.push(t.as_str());
            }
        });
        parts.join(" ")
    }
}

/// Build the print-safe copy of the content referenced by `content`.
pub fn normalize(content: &ContentRef, policy: &ExclusionPolicy) -> Result<SanitizedNode> {
    let live = content.resolve()?;
    match content.anchor() {
        Some(anchor) => {
            let chain = live.anchor_chain(anchor).ok_or_else(|| {
                ExportError::content_unavailable(format!("no element with id {anchor:?}"))
            })?;
            let (root, ancestors) = chain
                .split_last()
                .ok_or_else(|| ExportError::content_unavailable("empty anchor chain"))?;
            normalize_tree(&live, ancestors, root, policy)
        }
        None => {
            let blank = live
                .nodes
                .iter()
                .all(|n| matches!(n, DomNode::Text(t) if t.trim().is_empty()));
            if blank {
                return Err(ExportError::content_unavailable("content tree is empty"));
            }
            let root = ElementNode::with_children(Tag::Body, live.nodes.clone());
            normalize_tree(&live, &[], &root, policy)
        }
    }
}

/// Normalize `root`, whose on-screen ancestors (outermost first) are
/// `ancestors`, within `live`.
pub fn normalize_tree(
    live: &LiveContent,
    ancestors: &[&ElementNode],
    root: &ElementNode,
    policy: &ExclusionPolicy,
) -> Result<SanitizedNode> {
    let mut vars: Variables = live.theme.variables.clone();
    let mut page = ComputedStyle::default();
    if let Some(fg) = parse_color(&live.theme.foreground, &vars) {
        page.color = fg;
    }
    let page_bg = parse_color(&live.theme.background, &vars)
        .map(|c| c.over(Color::WHITE))
        .unwrap_or(Color::WHITE);
    page.background_color = page_bg;

    // Cascade through the ancestors so inherited colors and variables match
    // what the screen shows for the root.
    let mut live_parent = page;
    let mut effective_bg = page_bg;
    for ancestor in ancestors {
        for (name, value) in declared_variables(ancestor) {
            vars.insert(name, value);
        }
        let style = resolve_style(ancestor, Some(&live_parent), &vars);
        effective_bg = blend_background(style.background_color, effective_bg);
        live_parent = style;
    }

    let mut print_root = ComputedStyle::default();
    inherit_text_properties(&mut print_root, &live_parent);

    let builder = CopyBuilder { policy };
    let scope = Scope {
        vars: Cow::Borrowed(&vars),
        live_parent: &live_parent,
        print_parent: &print_root,
        effective_bg,
        in_pre: false,
    };
    builder
        .element(root, &scope, None)
        .ok_or_else(|| ExportError::content_unavailable("content root is excluded from export"))
}

/// Re-run the color-safety and rule pass over an already sanitized tree.
///
/// The result equals the input for any tree produced by [`normalize`].
pub fn renormalize(node: &SanitizedNode) -> SanitizedNode {
    let (style, colors) = finalize(
        &node.kind,
        node.style.clone(),
        node.colors.foreground,
        node.colors.background,
        node.colors.border,
    );
    SanitizedNode {
        kind: node.kind.clone(),
        style,
        colors,
        children: node.children.iter().map(renormalize).collect(),
    }
}

struct Scope<'s> {
    vars: Cow<'s, Variables>,
    live_parent: &'s ComputedStyle,
    print_parent: &'s ComputedStyle,
    effective_bg: Color,
    in_pre: bool,
}

struct CopyBuilder<'p> {
    policy: &'p ExclusionPolicy,
}

impl CopyBuilder<'_> {
    fn element(
        &self,
        e: &ElementNode,
        scope: &Scope<'_>,
        list_marker: Option<String>,
    ) -> Option<SanitizedNode> {
        if e.tag.is_metadata() {
            return None;
        }

        // Pass 1: style resolution against the live element.
        let declared = declared_variables(e);
        let vars: Cow<'_, Variables> = if declared.is_empty() {
            Cow::Borrowed(scope.vars.as_ref())
        } else {
            let mut owned = scope.vars.as_ref().clone();
            owned.extend(declared);
            Cow::Owned(owned)
        };
        let live = resolve_style(e, Some(scope.live_parent), &vars);
        if live.display == Display::None || self.policy.excludes(e, &live) {
            return None;
        }
        let background = blend_background(live.background_color, scope.effective_bg);
        let foreground = live.color.over(background);
        let border = live.border_color.unwrap_or(live.color).over(background);

        // Pass 2: layout from the stripped copy.
        let mut copy = ElementNode::new(e.tag.clone());
        copy.attributes = e.attributes.clone();
        if let Some(inline) = e.inline_style() {
            copy.attributes
                .insert("style".to_string(), strip_variable_colors(inline));
        }
        let mut layout = resolve_style(&copy, Some(scope.print_parent), &Variables::new());
        layout.position = Position::Static;

        let kind = classify(e, scope.in_pre, list_marker);
        let (style, colors) = finalize(&kind, layout, foreground, background, border);

        let in_pre = scope.in_pre || e.tag == Tag::Pre;
        let child_scope = Scope {
            vars,
            live_parent: &live,
            print_parent: &style,
            effective_bg: colors.background,
            in_pre,
        };
        let children = self.children(e, &kind, &child_scope, &style, &colors);

        Some(SanitizedNode {
            kind,
            style,
            colors,
            children,
        })
    }

    fn children(
        &self,
        e: &ElementNode,
        kind: &NodeKind,
        scope: &Scope<'_>,
        style: &ComputedStyle,
        colors: &PrintColors,
    ) -> Vec<SanitizedNode> {
        let ordered = matches!(kind, NodeKind::List { ordered: true });
        let mut counter = 0u32;
        let mut out = Vec::new();
        for child in &e.children {
            match child {
                DomNode::Element(ce) => {
                    let marker = (ce.tag == Tag::Li).then(|| {
                        counter += 1;
                        if ordered {
                            format!("{counter}.")
                        } else {
                            "\u{2022}".to_string()
                        }
                    });
                    if let Some(node) = self.element(ce, scope, marker) {
                        out.push(node);
                    }
                }
                DomNode::Text(t) => {
                    if let Some(text) = clean_text(t, style.white_space) {
                        out.push(text_node(text, style, colors));
                    }
                }
            }
        }
        out
    }
}

/// Force explicit colors onto `style`, then apply the print rules for `kind`.
fn finalize(
    kind: &NodeKind,
    mut style: ComputedStyle,
    foreground: Color,
    background: Color,
    border: Color,
) -> (ComputedStyle, PrintColors) {
    style.color = foreground;
    style.background_color = background;
    style.border_color = Some(border);
    rules_for(kind.category()).apply(&mut style);

    let background = style.background_color.over(background);
    style.background_color = background;
    let border = style.border_color.unwrap_or(foreground).over(background);
    style.border_color = Some(border);
    (
        style,
        PrintColors {
            foreground,
            background,
            border,
        },
    )
}

fn blend_background(own: Color, backdrop: Color) -> Color {
    if own.is_transparent() {
        backdrop
    } else {
        own.over(backdrop)
    }
}

fn classify(e: &ElementNode, in_pre: bool, list_marker: Option<String>) -> NodeKind {
    if let Some(level) = e.tag.heading_level() {
        return NodeKind::Heading { level };
    }
    match &e.tag {
        Tag::P => NodeKind::Paragraph,
        Tag::Table => NodeKind::Table,
        Tag::Tr => NodeKind::TableRow,
        Tag::Th => NodeKind::TableCell { header: true },
        Tag::Td => NodeKind::TableCell { header: false },
        Tag::Ul => NodeKind::List { ordered: false },
        Tag::Ol => NodeKind::List { ordered: true },
        Tag::Li => NodeKind::ListItem {
            marker: list_marker.unwrap_or_else(|| "\u{2022}".to_string()),
        },
        Tag::Blockquote => NodeKind::Quote,
        Tag::Pre => NodeKind::Code { block: true },
        Tag::Code if in_pre => NodeKind::Inline,
        Tag::Code => NodeKind::Code { block: false },
        Tag::Span | Tag::Strong | Tag::Em | Tag::A => NodeKind::Inline,
        Tag::Br => NodeKind::LineBreak,
        Tag::Hr => NodeKind::Rule,
        Tag::Img => NodeKind::Image {
            src: e.src().unwrap_or_default().to_string(),
        },
        _ => NodeKind::Container,
    }
}

fn clean_text(raw: &str, white_space: WhiteSpace) -> Option<String> {
    match white_space {
        WhiteSpace::Normal => {
            if raw.trim().is_empty() {
                return None;
            }
            // Keep a single leading/trailing space so inline runs stay apart.
            let mut text = String::new();
            if raw.starts_with(char::is_whitespace) {
                text.push(' ');
            }
            text.push_str(&raw.split_whitespace().collect::<Vec<_>>().join(" "));
            if raw.ends_with(char::is_whitespace) {
                text.push(' ');
            }
            Some(text)
        }
        WhiteSpace::PreWrap => {
            let text = raw.trim_start_matches('\n').trim_end();
            (!text.is_empty()).then(|| text.to_string())
        }
    }
}

fn text_node(text: String, parent: &ComputedStyle, colors: &PrintColors) -> SanitizedNode {
    let mut style = parent.clone();
    // Text renders inline – box-model properties belong to the parent.
    style.border_width = 0.0;
    style.border_left_width = 0.0;
    style.margin_top = 0.0;
    style.margin_right = 0.0;
    style.margin_bottom = 0.0;
    style.margin_left = 0.0;
    style.padding_top = 0.0;
    style.padding_right = 0.0;
    style.padding_bottom = 0.0;
    style.padding_left = 0.0;
    SanitizedNode {
        kind: NodeKind::Text(text),
        style,
        colors: *colors,
        children: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Theme;

    fn sanitize(html: &str) -> SanitizedNode {
        let live = LiveContent::from_html(html, Theme::default());
        normalize(&ContentRef::new(&live), &ExclusionPolicy::default()).unwrap()
    }

    fn first_of(root: &SanitizedNode, pred: impl Fn(&NodeKind) -> bool) -> SanitizedNode {
        let mut found = None;
        root.walk(&mut |n| {
            if found.is_none() && pred(&n.kind) {
                found = Some(n.clone());
            }
        });
        found.expect("node not found")
    }

    #[test]
    fn watermark_is_removed() {
        let root = sanitize(
            r#"<div><p>Total due</p><div data-watermark class="absolute pointer-events-none">ACME</div></div>"#,
        );
        assert!(!root.text_content().contains("ACME"));
        assert!(root.text_content().contains("Total due"));
    }

    #[test]
    fn decorative_label_needs_overlay_positioning() {
        let overlay = sanitize(
            r#"<p>Body</p><div style="position: absolute; pointer-events: none">Draft</div>"#,
        );
        assert!(!overlay.text_content().contains("Draft"));

        // The same label in normal flow is content.
        let in_flow = sanitize("<p>Body</p><div>Draft</div>");
        assert!(in_flow.text_content().contains("Draft"));
    }

    #[test]
    fn theme_variables_resolve_to_explicit_colors() {
        let html = r#"<div style="--panel: #1f2937; background: var(--panel); color: var(--ink, #fefefe)"><p>x</p></div>"#;
        let root = sanitize(html);
        assert_eq!(root.colors.background.to_hex(), "#ffffff");
        let panel = &root.children[0];
        assert_eq!(panel.colors.background.to_hex(), "#1f2937");
        assert_eq!(panel.colors.foreground.to_hex(), "#fefefe");
        let p = first_of(panel, |k| *k == NodeKind::Paragraph);
        assert_eq!(p.colors.background.to_hex(), "#1f2937");
    }

    #[test]
    fn table_cells_get_borders_and_backgrounds() {
        let root = sanitize(
            "<table><tr><th>Item</th><th>Qty</th></tr><tr><td>Widget</td><td>2</td></tr></table>",
        );
        let mut cells = 0;
        root.walk(&mut |n| {
            if let NodeKind::TableCell { header } = n.kind {
                cells += 1;
                assert!(n.style.border_width > 0.0);
                assert!(n.colors.border.is_opaque());
                assert!(n.colors.background.is_opaque());
                if header {
                    assert_eq!(n.colors.background.to_hex(), "#f3f4f6");
                }
            }
        });
        assert_eq!(cells, 4);
    }

    #[test]
    fn every_node_has_opaque_colors() {
        let root = sanitize(
            r#"<h1 style="color: rgba(0,0,0,0.5)">T</h1><blockquote>q</blockquote><pre>a
  b</pre><ul><li>one</li></ul>"#,
        );
        root.walk(&mut |n| {
            assert!(n.colors.foreground.is_opaque(), "{:?}", n.kind);
            assert!(n.colors.background.is_opaque(), "{:?}", n.kind);
            assert!(n.colors.border.is_opaque(), "{:?}", n.kind);
        });
    }

    #[test]
    fn renormalize_is_identity() {
        let root = sanitize(
            r#"<h2>Summary</h2><p style="color: var(--x, #333)">Text <code>x</code></p><table><tr><th>A</th></tr></table>"#,
        );
        assert_eq!(renormalize(&root), root);
    }

    #[test]
    fn ordered_list_markers_count_up() {
        let root = sanitize("<ol><li>a</li><li>b</li></ol>");
        let mut markers = Vec::new();
        root.walk(&mut |n| {
            if let NodeKind::ListItem { marker } = &n.kind {
                markers.push(marker.clone());
            }
        });
        assert_eq!(markers, vec!["1.", "2."]);
    }

    #[test]
    fn pre_keeps_line_breaks() {
        let root = sanitize("<pre>line one\n  line two</pre>");
        let code = first_of(&root, |k| *k == NodeKind::Code { block: true });
        assert_eq!(code.text_content(), "line one\n  line two");
    }

    #[test]
    fn anchored_root_inherits_ancestor_colors() {
        let html = r#"<div style="background: #000000; color: #ffffff"><section id="report"><p>x</p></section></div>"#;
        let live = LiveContent::from_html(html, Theme::default());
        let root = normalize(
            &ContentRef::anchored(&live, "report"),
            &ExclusionPolicy::default(),
        )
        .unwrap();
        assert_eq!(root.colors.background.to_hex(), "#000000");
        assert_eq!(root.colors.foreground.to_hex(), "#ffffff");
    }

    #[test]
    fn missing_anchor_is_unavailable() {
        let live = LiveContent::from_html("<p>x</p>", Theme::default());
        let err = normalize(
            &ContentRef::anchored(&live, "nope"),
            &ExclusionPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::ContentUnavailable { .. }));
    }

    #[test]
    fn blank_document_is_unavailable() {
        for html in ["", "   \n  "] {
            let live = LiveContent::from_html(html, Theme::default());
            let err = normalize(&ContentRef::new(&live), &ExclusionPolicy::default()).unwrap_err();
            assert!(matches!(err, ExportError::ContentUnavailable { .. }), "{html:?}");
        }
    }
}
