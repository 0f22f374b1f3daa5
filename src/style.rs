//! Style resolver – maps host utility classes, inline CSS and theme custom
//! properties to a flat [`ComputedStyle`].
//!
//! This is what a live screen "computes" for each element. The normalizer
//! runs it twice per node: once against the live element (with variables) to
//! obtain the colors actually shown, and once against the stripped copy to
//! obtain layout.

use std::collections::HashMap;

use crate::dom::{ElementNode, Tag};

/// Custom properties in scope for an element, keyed by `--name`.
pub type Variables = HashMap<String, String>;

/// Fully resolved style for a single element.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_wrap: FlexWrap,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,
    pub grid_columns: usize,
    pub position: Position,
    pub pointer_events_none: bool,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,
    pub min_width: Dimension,
    pub max_width: Dimension,

    // Spacing (px)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border. `border_color: None` means currentColor.
    pub border_width: f32,
    pub border_left_width: f32,
    pub border_color: Option<Color>,

    // Typography
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_family: String,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,
    pub font_style: FontStyle,
    pub white_space: WhiteSpace,

    // Background
    pub background_color: Color,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_wrap: FlexWrap::NoWrap,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            grid_columns: 0,
            position: Position::Static,
            pointer_events_none: false,
            width: Dimension::Auto,
            height: Dimension::Auto,
            min_width: Dimension::Auto,
            max_width: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_left_width: 0.0,
            border_color: None,
            font_size: 16.0,
            font_weight: FontWeight::Normal,
            font_family: "Helvetica".to_string(),
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.4,
            text_decoration: TextDecoration::None,
            font_style: FontStyle::Normal,
            white_space: WhiteSpace::Normal,
            background_color: Color::TRANSPARENT,
        }
    }
}

impl ComputedStyle {
    pub fn is_monospace(&self) -> bool {
        let family = self.font_family.to_ascii_lowercase();
        family.contains("mono") || family.contains("courier") || family.contains("consolas")
    }

    /// Width of the left edge, which may carry a wider accent border.
    pub fn left_border(&self) -> f32 {
        self.border_width.max(self.border_left_width)
    }

    pub fn is_out_of_flow(&self) -> bool {
        matches!(self.position, Position::Absolute | Position::Fixed)
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    Grid,
    Inline,
    InlineBlock,
    ListItem,
    TableRow,
    TableCell,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexWrap {
    NoWrap,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
    SpaceAround,
    SpaceEvenly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Static,
    Relative,
    Absolute,
    Fixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    Normal,
    /// Preserve newlines, wrap long lines.
    PreWrap,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn from_rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            r: r as f32 / 255.0,
            g: g as f32 / 255.0,
            b: b as f32 / 255.0,
            a: a as f32 / 255.0,
        }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn is_opaque(&self) -> bool {
        self.a > 0.999
    }

    /// Composite `self` over an opaque backdrop, yielding an opaque color.
    pub fn over(self, backdrop: Color) -> Color {
        if self.is_opaque() {
            return self;
        }
        let a = self.a.clamp(0.0, 1.0);
        Color::rgb(
            self.r * a + backdrop.r * (1.0 - a),
            self.g * a + backdrop.g * (1.0 - a),
            self.b * a + backdrop.b * (1.0 - a),
        )
    }

    pub fn to_rgba8(&self) -> [u8; 4] {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        [q(self.r), q(self.g), q(self.b), q(self.a)]
    }

    pub fn to_hex(&self) -> String {
        let [r, g, b, _] = self.to_rgba8();
        format!("#{r:02x}{g:02x}{b:02x}")
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().trim_start_matches('#');
        if !hex.is_ascii() {
            return None;
        }
        let channel = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 | 4 => {
                let mut c = [255u8; 4];
                for (i, ch) in hex.chars().enumerate() {
                    c[i] = channel(&ch.to_string().repeat(2))?;
                }
                Some(Self::from_rgba8(c[0], c[1], c[2], c[3]))
            }
            6 | 8 => {
                let mut c = [255u8; 4];
                for i in 0..hex.len() / 2 {
                    c[i] = channel(&hex[i * 2..i * 2 + 2])?;
                }
                Some(Self::from_rgba8(c[0], c[1], c[2], c[3]))
            }
            _ => None,
        }
    }

    fn named(name: &str) -> Option<Self> {
        let hex = match name {
            "black" => "000000",
            "white" => "ffffff",
            "gray" | "grey" => "808080",
            "silver" => "c0c0c0",
            "red" => "ff0000",
            "maroon" => "800000",
            "green" => "008000",
            "lime" => "00ff00",
            "blue" => "0000ff",
            "navy" => "000080",
            "yellow" => "ffff00",
            "orange" => "ffa500",
            "purple" => "800080",
            "teal" => "008080",
            "transparent" => return Some(Color::TRANSPARENT),
            _ => return None,
        };
        Self::from_hex(hex)
    }
}

/// Parse a CSS color value, resolving `var(--x, fallback)` against `vars`.
///
/// Returns `None` for values that cannot be resolved (including
/// `currentColor`, which callers treat as "inherit the text color").
pub fn parse_color(value: &str, vars: &Variables) -> Option<Color> {
    parse_color_depth(value, vars, 0)
}

fn parse_color_depth(value: &str, vars: &Variables, depth: usize) -> Option<Color> {
    if depth > 8 {
        return None;
    }
    let v = value.trim().trim_end_matches("!important").trim();
    let lower = v.to_ascii_lowercase();
    if lower.starts_with("var(") && lower.ends_with(')') {
        // Custom property names are case-sensitive, so slice the original.
        let inner = &v[4..v.len() - 1];
        let (name, fallback) = match inner.split_once(',') {
            Some((n, f)) => (n.trim(), Some(f.trim())),
            None => (inner.trim(), None),
        };
        let resolved = vars
            .get(name)
            .and_then(|val| parse_color_depth(val, vars, depth + 1));
        return resolved.or_else(|| fallback.and_then(|f| parse_color_depth(f, vars, depth + 1)));
    }
    if lower.starts_with('#') {
        return Color::from_hex(&lower);
    }
    if let Some(args) = lower
        .strip_prefix("rgba(")
        .or_else(|| lower.strip_prefix("rgb("))
        .and_then(|s| s.strip_suffix(')'))
    {
        return parse_rgb_args(args);
    }
    Color::named(&lower)
}

fn parse_rgb_args(args: &str) -> Option<Color> {
    let parts: Vec<&str> = args
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() < 3 {
        return None;
    }
    let channel = |s: &str| -> Option<f32> {
        if let Some(p) = s.strip_suffix('%') {
            p.parse::<f32>().ok().map(|v| v / 100.0)
        } else {
            s.parse::<f32>().ok().map(|v| v / 255.0)
        }
    };
    let alpha = match parts.get(3) {
        Some(a) => match a.strip_suffix('%') {
            Some(p) => p.parse::<f32>().ok()? / 100.0,
            None => a.parse::<f32>().ok()?,
        },
        None => 1.0,
    };
    Some(Color {
        r: channel(parts[0])?.clamp(0.0, 1.0),
        g: channel(parts[1])?.clamp(0.0, 1.0),
        b: channel(parts[2])?.clamp(0.0, 1.0),
        a: alpha.clamp(0.0, 1.0),
    })
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element, inheriting text properties from its parent.
pub fn resolve_style(
    element: &ElementNode,
    parent: Option<&ComputedStyle>,
    vars: &Variables,
) -> ComputedStyle {
    let mut style = base_style_for_tag(&element.tag);

    if let Some(p) = parent {
        inherit_text_properties(&mut style, p);
        // Tag defaults for bold/monospace elements beat inherited values.
        match element.tag {
            Tag::Strong | Tag::Th => style.font_weight = FontWeight::Bold,
            Tag::Em => style.font_style = FontStyle::Italic,
            Tag::Code | Tag::Pre => style.font_family = "Courier".to_string(),
            _ => {}
        }
        if element.tag.heading_level().is_some() {
            style.font_size = base_style_for_tag(&element.tag).font_size;
            style.font_weight = FontWeight::Bold;
        }
    }

    for class in element.classes() {
        apply_utility_class(&mut style, class);
    }

    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline, vars);
    }

    style
}

/// Copy inheritable text properties from `parent`.
pub fn inherit_text_properties(style: &mut ComputedStyle, parent: &ComputedStyle) {
    style.font_size = parent.font_size;
    style.font_weight = parent.font_weight;
    style.font_family = parent.font_family.clone();
    style.color = parent.color;
    style.text_align = parent.text_align;
    style.line_height = parent.line_height;
    style.font_style = parent.font_style;
    style.white_space = parent.white_space;
}

/// Custom properties declared in an element's inline style.
pub fn declared_variables(element: &ElementNode) -> Vec<(String, String)> {
    element
        .inline_style()
        .map(|inline| {
            declarations(inline)
                .filter(|(prop, _)| prop.starts_with("--"))
                .map(|(p, v)| (p.to_string(), v.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

/// Remove theme-derived color declarations (`var(...)` values on color
/// properties) and custom property declarations from an inline style.
pub fn strip_variable_colors(style_str: &str) -> String {
    declarations(style_str)
        .filter(|(prop, val)| {
            !prop.starts_with("--") && !(is_color_property(prop) && val.contains("var("))
        })
        .map(|(p, v)| format!("{p}: {v}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn is_color_property(prop: &str) -> bool {
    matches!(
        prop,
        "color"
            | "background"
            | "background-color"
            | "border"
            | "border-color"
            | "border-left"
            | "border-left-color"
            | "outline-color"
            | "fill"
            | "stroke"
    )
}

fn declarations(style_str: &str) -> impl Iterator<Item = (&str, &str)> {
    style_str.split(';').filter_map(|decl| {
        let (prop, val) = decl.split_once(':')?;
        let (prop, val) = (prop.trim(), val.trim());
        if prop.is_empty() || val.is_empty() {
            None
        } else {
            Some((prop, val))
        }
    })
}

/// Default styles based on tag semantics.
fn base_style_for_tag(tag: &Tag) -> ComputedStyle {
    let mut s = ComputedStyle::default();
    match tag {
        Tag::H1 => {
            s.font_size = 32.0;
            s.font_weight = FontWeight::Bold;
        }
        Tag::H2 => {
            s.font_size = 24.0;
            s.font_weight = FontWeight::Bold;
        }
        Tag::H3 => {
            s.font_size = 20.0;
            s.font_weight = FontWeight::Bold;
        }
        Tag::H4 | Tag::H5 | Tag::H6 => {
            s.font_size = 16.0;
            s.font_weight = FontWeight::Bold;
        }
        Tag::P => {
            s.margin_bottom = 10.0;
        }
        Tag::Ul | Tag::Ol => {
            s.margin_bottom = 10.0;
            s.padding_left = 24.0;
        }
        Tag::Li => {
            s.display = Display::ListItem;
        }
        Tag::Table => {
            s.display = Display::Grid;
        }
        Tag::Tr => {
            s.display = Display::TableRow;
        }
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
            }
        }
        Tag::Span | Tag::Strong | Tag::Em | Tag::A | Tag::Code | Tag::Br => {
            s.display = Display::Inline;
            match tag {
                Tag::Strong => s.font_weight = FontWeight::Bold,
                Tag::Em => s.font_style = FontStyle::Italic,
                Tag::A => s.text_decoration = TextDecoration::Underline,
                Tag::Code => s.font_family = "Courier".to_string(),
                _ => {}
            }
        }
        Tag::Pre => {
            s.font_family = "Courier".to_string();
            s.white_space = WhiteSpace::PreWrap;
        }
        Tag::Img => {
            s.display = Display::InlineBlock;
        }
        Tag::Hr => {
            s.border_width = 1.0;
            s.margin_top = 8.0;
            s.margin_bottom = 8.0;
        }
        Tag::Head | Tag::Style | Tag::Script => {
            s.display = Display::None;
        }
        Tag::Div
        | Tag::Section
        | Tag::Blockquote
        | Tag::Thead
        | Tag::Tbody
        | Tag::Body
        | Tag::Html
        | Tag::Unknown(_) => {}
    }
    s
}

/// Apply a single host utility class.
fn apply_utility_class(s: &mut ComputedStyle, class: &str) {
    // Theme-variant classes only apply on the live screen.
    if class.starts_with("dark:") || class.starts_with("hover:") || class.starts_with("focus:") {
        return;
    }
    match class {
        // Display
        "flex" => s.display = Display::Flex,
        "grid" => s.display = Display::Grid,
        "block" => s.display = Display::Block,
        "inline" => s.display = Display::Inline,
        "inline-block" => s.display = Display::InlineBlock,
        "hidden" => s.display = Display::None,

        // Positioning
        "absolute" => s.position = Position::Absolute,
        "fixed" => s.position = Position::Fixed,
        "relative" => s.position = Position::Relative,
        "pointer-events-none" => s.pointer_events_none = true,

        // Flex
        "flex-row" => s.flex_direction = FlexDirection::Row,
        "flex-col" => s.flex_direction = FlexDirection::Column,
        "flex-wrap" => s.flex_wrap = FlexWrap::Wrap,
        "flex-nowrap" => s.flex_wrap = FlexWrap::NoWrap,
        "flex-grow" | "grow" => s.flex_grow = 1.0,
        "flex-shrink" | "shrink" => s.flex_shrink = 1.0,
        "flex-1" => {
            s.flex_grow = 1.0;
            s.flex_shrink = 1.0;
        }
        "justify-start" => s.justify_content = JustifyContent::Start,
        "justify-end" => s.justify_content = JustifyContent::End,
        "justify-center" => s.justify_content = JustifyContent::Center,
        "justify-between" => s.justify_content = JustifyContent::SpaceBetween,
        "justify-around" => s.justify_content = JustifyContent::SpaceAround,
        "justify-evenly" => s.justify_content = JustifyContent::SpaceEvenly,
        "items-start" => s.align_items = AlignItems::Start,
        "items-end" => s.align_items = AlignItems::End,
        "items-center" => s.align_items = AlignItems::Center,
        "items-stretch" => s.align_items = AlignItems::Stretch,

        // Typography
        "font-bold" | "font-semibold" => s.font_weight = FontWeight::Bold,
        "font-normal" => s.font_weight = FontWeight::Normal,
        "font-mono" => s.font_family = "Courier".to_string(),
        "font-sans" => s.font_family = "Helvetica".to_string(),
        "italic" => s.font_style = FontStyle::Italic,
        "not-italic" => s.font_style = FontStyle::Normal,
        "underline" => s.text_decoration = TextDecoration::Underline,
        "no-underline" => s.text_decoration = TextDecoration::None,
        "text-left" => s.text_align = TextAlign::Left,
        "text-center" => s.text_align = TextAlign::Center,
        "text-right" => s.text_align = TextAlign::Right,
        "text-justify" => s.text_align = TextAlign::Justify,
        "whitespace-pre-wrap" | "whitespace-pre" => s.white_space = WhiteSpace::PreWrap,
        "text-xs" => s.font_size = 12.0,
        "text-sm" => s.font_size = 14.0,
        "text-base" => s.font_size = 16.0,
        "text-lg" => s.font_size = 18.0,
        "text-xl" => s.font_size = 20.0,
        "text-2xl" => s.font_size = 24.0,
        "text-3xl" => s.font_size = 30.0,
        "text-4xl" => s.font_size = 36.0,

        // Borders
        "border" => s.border_width = 1.0,
        "border-0" => s.border_width = 0.0,
        "border-2" => s.border_width = 2.0,
        "border-l-4" => s.border_left_width = 4.0,

        // Width
        "w-full" => s.width = Dimension::Percent(100.0),
        "w-auto" => s.width = Dimension::Auto,
        "w-1/2" => s.width = Dimension::Percent(50.0),
        "w-1/3" => s.width = Dimension::Percent(33.333),
        "w-2/3" => s.width = Dimension::Percent(66.666),
        "w-1/4" => s.width = Dimension::Percent(25.0),
        "w-3/4" => s.width = Dimension::Percent(75.0),

        _ => {
            try_parse_spacing_class(s, class);
            try_parse_color_class(s, class);
            try_parse_gap_class(s, class);
            try_parse_grid_cols_class(s, class);
            try_parse_size_class(s, class);
        }
    }
}

fn try_parse_spacing_class(s: &mut ComputedStyle, class: &str) {
    // p-{n}, px-{n}, m-{n}, mt-{n}, ... (1 unit = 4px)
    let Some((prefix, value_str)) = class.rsplit_once('-') else {
        return;
    };
    let value: f32 = match value_str.parse::<f32>() {
        Ok(v) => v * 4.0,
        Err(_) => return,
    };

    match prefix {
        "p" => {
            s.padding_top = value;
            s.padding_right = value;
            s.padding_bottom = value;
            s.padding_left = value;
        }
        "px" => {
            s.padding_left = value;
            s.padding_right = value;
        }
        "py" => {
            s.padding_top = value;
            s.padding_bottom = value;
        }
        "pt" => s.padding_top = value,
        "pr" => s.padding_right = value,
        "pb" => s.padding_bottom = value,
        "pl" => s.padding_left = value,
        "m" => {
            s.margin_top = value;
            s.margin_right = value;
            s.margin_bottom = value;
            s.margin_left = value;
        }
        "mx" => {
            s.margin_left = value;
            s.margin_right = value;
        }
        "my" => {
            s.margin_top = value;
            s.margin_bottom = value;
        }
        "mt" => s.margin_top = value,
        "mr" => s.margin_right = value,
        "mb" => s.margin_bottom = value,
        "ml" => s.margin_left = value,
        _ => {}
    }
}

const PALETTE: &[(&str, &str)] = &[
    ("red-500", "#ef4444"),
    ("red-700", "#b91c1c"),
    ("blue-500", "#3b82f6"),
    ("blue-700", "#1d4ed8"),
    ("indigo-600", "#4f46e5"),
    ("green-500", "#22c55e"),
    ("green-700", "#15803d"),
    ("yellow-500", "#eab308"),
    ("gray-50", "#f9fafb"),
    ("gray-100", "#f3f4f6"),
    ("gray-200", "#e5e7eb"),
    ("gray-300", "#d1d5db"),
    ("gray-500", "#6b7280"),
    ("gray-600", "#4b5563"),
    ("gray-700", "#374151"),
    ("gray-800", "#1f2937"),
    ("gray-900", "#111827"),
    ("white", "#ffffff"),
    ("black", "#000000"),
];

fn try_parse_color_class(s: &mut ComputedStyle, class: &str) {
    for (name, hex) in PALETTE {
        let Some(color) = Color::from_hex(hex) else {
            continue;
        };
        if class.strip_prefix("text-") == Some(name) {
            s.color = color;
            return;
        }
        if class.strip_prefix("bg-") == Some(name) {
            s.background_color = color;
            return;
        }
        if class.strip_prefix("border-") == Some(name) {
            s.border_color = Some(color);
            return;
        }
    }
}

fn try_parse_gap_class(s: &mut ComputedStyle, class: &str) {
    if let Some(rest) = class.strip_prefix("gap-") {
        if let Ok(v) = rest.parse::<f32>() {
            s.gap = v * 4.0;
        }
    }
}

fn try_parse_grid_cols_class(s: &mut ComputedStyle, class: &str) {
    if let Some(rest) = class.strip_prefix("grid-cols-") {
        if let Ok(n) = rest.parse::<usize>() {
            s.grid_columns = n;
        }
    }
}

fn try_parse_size_class(s: &mut ComputedStyle, class: &str) {
    if let Some(rest) = class.strip_prefix("w-") {
        if let Ok(v) = rest.parse::<f32>() {
            s.width = Dimension::Px(v * 4.0);
        }
    } else if let Some(rest) = class.strip_prefix("h-") {
        if let Ok(v) = rest.parse::<f32>() {
            s.height = Dimension::Px(v * 4.0);
        }
    }
}

// ---------------------------------------------------------------------------
// Inline style parsing (limited subset)
// ---------------------------------------------------------------------------

pub fn apply_inline_style(s: &mut ComputedStyle, style_str: &str, vars: &Variables) {
    for (prop, val) in declarations(style_str) {
        apply_css_property(s, prop, val, vars);
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str, vars: &Variables) {
    match prop {
        "display" => {
            s.display = match val {
                "flex" => Display::Flex,
                "grid" => Display::Grid,
                "block" => Display::Block,
                "inline" => Display::Inline,
                "inline-block" => Display::InlineBlock,
                "none" => Display::None,
                _ => s.display,
            }
        }
        "position" => {
            s.position = match val {
                "absolute" => Position::Absolute,
                "fixed" => Position::Fixed,
                "relative" => Position::Relative,
                _ => Position::Static,
            }
        }
        "pointer-events" => s.pointer_events_none = val == "none",
        "flex-direction" => {
            s.flex_direction = match val {
                "row" => FlexDirection::Row,
                "column" => FlexDirection::Column,
                _ => s.flex_direction,
            }
        }
        "justify-content" => {
            s.justify_content = match val {
                "flex-end" | "end" => JustifyContent::End,
                "center" => JustifyContent::Center,
                "space-between" => JustifyContent::SpaceBetween,
                "space-around" => JustifyContent::SpaceAround,
                "space-evenly" => JustifyContent::SpaceEvenly,
                _ => JustifyContent::Start,
            }
        }
        "font-size" => {
            if let Some(px) = parse_px(val) {
                s.font_size = px;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = match val {
                "italic" => FontStyle::Italic,
                _ => FontStyle::Normal,
            }
        }
        "font-family" => {
            s.font_family = val
                .split(',')
                .next()
                .unwrap_or(val)
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string();
        }
        "white-space" => {
            s.white_space = match val {
                "pre" | "pre-wrap" | "pre-line" => WhiteSpace::PreWrap,
                _ => WhiteSpace::Normal,
            }
        }
        "color" => {
            if let Some(c) = parse_color(val, vars) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = parse_color(val, vars) {
                s.background_color = c;
            }
        }
        "text-align" => {
            s.text_align = match val {
                "center" => TextAlign::Center,
                "right" | "end" => TextAlign::Right,
                "justify" => TextAlign::Justify,
                _ => TextAlign::Left,
            }
        }
        "width" => s.width = parse_dimension(val),
        "height" => s.height = parse_dimension(val),
        "max-width" => s.max_width = parse_dimension(val),
        "min-width" => s.min_width = parse_dimension(val),
        "margin" => apply_shorthand_spacing(
            val,
            &mut s.margin_top,
            &mut s.margin_right,
            &mut s.margin_bottom,
            &mut s.margin_left,
        ),
        "margin-top" => set_px(&mut s.margin_top, val),
        "margin-right" => set_px(&mut s.margin_right, val),
        "margin-bottom" => set_px(&mut s.margin_bottom, val),
        "margin-left" => set_px(&mut s.margin_left, val),
        "padding" => apply_shorthand_spacing(
            val,
            &mut s.padding_top,
            &mut s.padding_right,
            &mut s.padding_bottom,
            &mut s.padding_left,
        ),
        "padding-top" => set_px(&mut s.padding_top, val),
        "padding-right" => set_px(&mut s.padding_right, val),
        "padding-bottom" => set_px(&mut s.padding_bottom, val),
        "padding-left" => set_px(&mut s.padding_left, val),
        "border" => {
            let (width, color) = parse_border_shorthand(val, vars);
            if let Some(w) = width {
                s.border_width = w;
            }
            if color.is_some() {
                s.border_color = color;
            }
        }
        "border-left" => {
            let (width, color) = parse_border_shorthand(val, vars);
            if let Some(w) = width {
                s.border_left_width = w;
            }
            if color.is_some() {
                s.border_color = color;
            }
        }
        "border-width" => set_px(&mut s.border_width, val),
        "border-left-width" => set_px(&mut s.border_left_width, val),
        "border-color" | "border-left-color" => {
            if let Some(c) = parse_color(val, vars) {
                s.border_color = Some(c);
            }
        }
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(px) = parse_px(val) {
                s.line_height = px / s.font_size;
            }
        }
        "gap" => set_px(&mut s.gap, val),
        _ => {}
    }
}

fn set_px(target: &mut f32, val: &str) {
    if let Some(px) = parse_px(val) {
        *target = px;
    }
}

fn parse_border_shorthand(val: &str, vars: &Variables) -> (Option<f32>, Option<Color>) {
    if val == "none" || val == "0" {
        return (Some(0.0), None);
    }
    let mut width = None;
    let mut color = None;
    // var(...) may contain spaces after commas; rejoin function tokens.
    let mut tokens: Vec<String> = Vec::new();
    for part in val.split_whitespace() {
        match tokens.last_mut() {
            Some(last) if last.matches('(').count() > last.matches(')').count() => {
                last.push(' ');
                last.push_str(part);
            }
            _ => tokens.push(part.to_string()),
        }
    }
    for token in &tokens {
        if let Some(px) = parse_px(token) {
            width = Some(px);
        } else if let Some(c) = parse_color(token, vars) {
            color = Some(c);
        }
    }
    (width, color)
}

pub(crate) fn parse_px(s: &str) -> Option<f32> {
    let s = s.trim().trim_end_matches("!important").trim();
    let s = s.strip_suffix("px").unwrap_or(s);
    s.parse().ok()
}

fn parse_dimension(s: &str) -> Dimension {
    let s = s.trim();
    if s == "auto" {
        Dimension::Auto
    } else if let Some(p) = s.strip_suffix('%') {
        p.parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto)
    } else {
        parse_px(s).map(Dimension::Px).unwrap_or(Dimension::Auto)
    }
}

fn apply_shorthand_spacing(
    val: &str,
    top: &mut f32,
    right: &mut f32,
    bottom: &mut f32,
    left: &mut f32,
) {
    let parts: Vec<f32> = val.split_whitespace().filter_map(parse_px).collect();
    match parts.len() {
        1 => {
            *top = parts[0];
            *right = parts[0];
            *bottom = parts[0];
            *left = parts[0];
        }
        2 => {
            *top = parts[0];
            *bottom = parts[0];
            *right = parts[1];
            *left = parts[1];
        }
        3 => {
            *top = parts[0];
            *right = parts[1];
            *left = parts[1];
            *bottom = parts[2];
        }
        4 => {
            *top = parts[0];
            *right = parts[1];
            *bottom = parts[2];
            *left = parts[3];
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_html, DomNode};

    fn no_vars() -> Variables {
        Variables::new()
    }

    #[test]
    fn utility_padding() {
        let mut s = ComputedStyle::default();
        apply_utility_class(&mut s, "p-4");
        assert_eq!(s.padding_top, 16.0);
        assert_eq!(s.padding_left, 16.0);
    }

    #[test]
    fn inline_style_font_size() {
        let mut s = ComputedStyle::default();
        apply_inline_style(&mut s, "font-size: 24px; color: #ff0000", &no_vars());
        assert_eq!(s.font_size, 24.0);
        assert!((s.color.r - 1.0).abs() < 0.01);
    }

    #[test]
    fn color_from_hex() {
        let c = Color::from_hex("#ff8800").unwrap();
        assert!((c.r - 1.0).abs() < 0.01);
        assert!((c.g - 0.533).abs() < 0.01);
        assert_eq!(Color::from_hex("#fff").unwrap(), Color::WHITE);
        assert!(Color::from_hex("#zzzzzz").is_none());
    }

    #[test]
    fn variables_resolve_with_fallback() {
        let mut vars = Variables::new();
        vars.insert("--brand".to_string(), "#1a365d".to_string());
        assert_eq!(
            parse_color("var(--brand)", &vars).map(|c| c.to_hex()),
            Some("#1a365d".to_string())
        );
        assert_eq!(
            parse_color("var(--missing, rgb(255, 0, 0))", &vars).map(|c| c.to_hex()),
            Some("#ff0000".to_string())
        );
        assert!(parse_color("var(--missing)", &vars).is_none());
    }

    #[test]
    fn self_referencing_variable_terminates() {
        let mut vars = Variables::new();
        vars.insert("--loop".to_string(), "var(--loop)".to_string());
        assert!(parse_color("var(--loop)", &vars).is_none());
    }

    #[test]
    fn rgba_composites_over_backdrop() {
        let c = parse_color("rgba(0, 0, 0, 0.5)", &no_vars()).unwrap();
        let flat = c.over(Color::WHITE);
        assert!(flat.is_opaque());
        assert!((flat.r - 0.5).abs() < 0.01);
    }

    #[test]
    fn strip_removes_variable_colors_only() {
        let stripped =
            strip_variable_colors("color: var(--fg); padding: 4px; --brand: red; background: #fff");
        assert_eq!(stripped, "padding: 4px; background: #fff");
    }

    #[test]
    fn border_shorthand_sets_width_and_color() {
        let mut s = ComputedStyle::default();
        apply_inline_style(&mut s, "border: 2px solid #d1d5db", &no_vars());
        assert_eq!(s.border_width, 2.0);
        assert_eq!(s.border_color.map(|c| c.to_hex()), Some("#d1d5db".to_string()));
    }

    #[test]
    fn dark_variant_classes_are_ignored() {
        let nodes = parse_html(r#"<div class="bg-white dark:bg-gray-900">x</div>"#);
        let DomNode::Element(e) = &nodes[0] else {
            panic!("Expected element");
        };
        let s = resolve_style(e, None, &no_vars());
        assert_eq!(s.background_color, Color::WHITE);
    }
}
