//! Print rules – a fixed table from element category to the presentation
//! declarations every exported copy gets, whatever the host styled it as.
//!
//! Rules are applied after host classes and inline styles, so they always
//! win. Every value is a constant, which makes application idempotent.

use crate::style::{Color, ComputedStyle, Dimension, FontStyle, FontWeight, TextAlign, WhiteSpace};

/// Element categories the rule table knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Heading(u8),
    Paragraph,
    Table,
    TableRow,
    HeaderCell,
    DataCell,
    List,
    ListItem,
    Quote,
    Code { block: bool },
    /// Anything else: containers, inline runs, images, text.
    Other,
}

/// A set of presentation declarations. `None` leaves the property alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeclarationSet {
    pub font_size: Option<f32>,
    pub font_weight: Option<FontWeight>,
    pub font_style: Option<FontStyle>,
    pub font_family: Option<&'static str>,
    pub line_height: Option<f32>,
    pub text_align: Option<TextAlign>,
    pub white_space: Option<WhiteSpace>,
    pub width: Option<Dimension>,
    pub margin_top: Option<f32>,
    pub margin_bottom: Option<f32>,
    /// Applied to all four sides.
    pub padding: Option<f32>,
    pub padding_left: Option<f32>,
    pub border_width: Option<f32>,
    pub border_left_width: Option<f32>,
    pub border_color: Option<Color>,
    pub background_color: Option<Color>,
}

impl DeclarationSet {
    pub fn is_empty(&self) -> bool {
        *self == DeclarationSet::default()
    }

    /// Write the declarations into `style`.
    pub fn apply(&self, style: &mut ComputedStyle) {
        if let Some(v) = self.font_size {
            style.font_size = v;
        }
        if let Some(v) = self.font_weight {
            style.font_weight = v;
        }
        if let Some(v) = self.font_style {
            style.font_style = v;
        }
        if let Some(v) = self.font_family {
            style.font_family = v.to_string();
        }
        if let Some(v) = self.line_height {
            style.line_height = v;
        }
        if let Some(v) = self.text_align {
            style.text_align = v;
        }
        if let Some(v) = self.white_space {
            style.white_space = v;
        }
        if let Some(v) = self.width {
            style.width = v;
        }
        if let Some(v) = self.margin_top {
            style.margin_top = v;
        }
        if let Some(v) = self.margin_bottom {
            style.margin_bottom = v;
        }
        if let Some(v) = self.padding {
            style.padding_top = v;
            style.padding_right = v;
            style.padding_bottom = v;
            style.padding_left = v;
        }
        if let Some(v) = self.padding_left {
            style.padding_left = v;
        }
        if let Some(v) = self.border_width {
            style.border_width = v;
        }
        if let Some(v) = self.border_left_width {
            style.border_left_width = v;
        }
        if let Some(c) = self.border_color {
            style.border_color = Some(c);
        }
        if let Some(c) = self.background_color {
            style.background_color = c;
        }
    }
}

const HEADER_SHADE: Color = Color::rgb(0.953, 0.957, 0.965); // #f3f4f6
const CELL_BORDER: Color = Color::rgb(0.820, 0.835, 0.859); // #d1d5db
const QUOTE_ACCENT: Color = Color::rgb(0.420, 0.447, 0.502); // #6b7280
const TINT: Color = Color::rgb(0.976, 0.980, 0.984); // #f9fafb

/// Heading scale: (font size, margin top, margin bottom) for h1..h6.
const HEADINGS: [(f32, f32, f32); 6] = [
    (28.0, 20.0, 12.0),
    (22.0, 18.0, 10.0),
    (18.0, 16.0, 8.0),
    (16.0, 14.0, 6.0),
    (14.0, 12.0, 6.0),
    (13.0, 10.0, 4.0),
];

/// Look up the print declarations for `category`.
pub fn rules_for(category: Category) -> DeclarationSet {
    match category {
        Category::Heading(level) => {
            let idx = (level.clamp(1, 6) - 1) as usize;
            let (size, top, bottom) = HEADINGS[idx];
            DeclarationSet {
                font_size: Some(size),
                font_weight: Some(FontWeight::Bold),
                line_height: Some(1.3),
                margin_top: Some(top),
                margin_bottom: Some(bottom),
                ..Default::default()
            }
        }
        Category::Paragraph => DeclarationSet {
            text_align: Some(TextAlign::Justify),
            line_height: Some(1.6),
            margin_top: Some(0.0),
            margin_bottom: Some(10.0),
            ..Default::default()
        },
        Category::Table => DeclarationSet {
            width: Some(Dimension::Percent(100.0)),
            margin_bottom: Some(12.0),
            border_width: Some(1.0),
            border_color: Some(CELL_BORDER),
            ..Default::default()
        },
        Category::TableRow => DeclarationSet::default(),
        Category::HeaderCell => DeclarationSet {
            font_weight: Some(FontWeight::Bold),
            text_align: Some(TextAlign::Left),
            padding: Some(6.0),
            border_width: Some(1.0),
            border_color: Some(CELL_BORDER),
            background_color: Some(HEADER_SHADE),
            ..Default::default()
        },
        Category::DataCell => DeclarationSet {
            padding: Some(6.0),
            border_width: Some(1.0),
            border_color: Some(CELL_BORDER),
            ..Default::default()
        },
        Category::List => DeclarationSet {
            padding_left: Some(24.0),
            margin_top: Some(0.0),
            margin_bottom: Some(10.0),
            ..Default::default()
        },
        Category::ListItem => DeclarationSet {
            margin_bottom: Some(4.0),
            line_height: Some(1.5),
            ..Default::default()
        },
        Category::Quote => DeclarationSet {
            font_style: Some(FontStyle::Italic),
            padding: Some(8.0),
            padding_left: Some(14.0),
            margin_bottom: Some(10.0),
            border_width: Some(0.0),
            border_left_width: Some(4.0),
            border_color: Some(QUOTE_ACCENT),
            background_color: Some(TINT),
            ..Default::default()
        },
        Category::Code { block: false } => DeclarationSet {
            font_family: Some("Courier"),
            background_color: Some(TINT),
            ..Default::default()
        },
        Category::Code { block: true } => DeclarationSet {
            font_family: Some("Courier"),
            font_size: Some(13.0),
            line_height: Some(1.4),
            white_space: Some(WhiteSpace::PreWrap),
            text_align: Some(TextAlign::Left),
            padding: Some(10.0),
            margin_bottom: Some(10.0),
            border_width: Some(1.0),
            border_color: Some(CELL_BORDER),
            background_color: Some(TINT),
            ..Default::default()
        },
        Category::Other => DeclarationSet::default(),
    }
}
