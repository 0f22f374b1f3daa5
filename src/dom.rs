//! HTML parser – converts the markup of an on-screen view into a simple
//! content tree.
//!
//! The supported subset covers what report and invoice screens render:
//! - Structural: div, section, p, h1-h6, ul, ol, li, table, thead, tbody,
//!   tr, td, th, blockquote, pre, img, br, hr
//! - Inline: span, strong, b, em, i, a, code
//! - Styling via `class`, `style` and `id` attributes

use std::collections::HashMap;

// ---------------------------------------------------------------------------
// DOM types
// ---------------------------------------------------------------------------

/// The tag name of a supported element.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Tag {
    Div,
    Section,
    P,
    H1,
    H2,
    H3,
    H4,
    H5,
    H6,
    Ul,
    Ol,
    Li,
    Table,
    Thead,
    Tbody,
    Tr,
    Td,
    Th,
    Blockquote,
    Pre,
    Code,
    Span,
    Strong,
    Em,
    A,
    Img,
    Br,
    Hr,
    Body,
    Html,
    Head,
    Style,
    Script,
    /// Catch-all for unknown tags – they are kept and treated as containers.
    Unknown(String),
}

impl Tag {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "div" => Tag::Div,
            "section" | "article" | "main" | "header" | "footer" => Tag::Section,
            "p" => Tag::P,
            "h1" => Tag::H1,
            "h2" => Tag::H2,
            "h3" => Tag::H3,
            "h4" => Tag::H4,
            "h5" => Tag::H5,
            "h6" => Tag::H6,
            "ul" => Tag::Ul,
            "ol" => Tag::Ol,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "thead" => Tag::Thead,
            "tbody" | "tfoot" => Tag::Tbody,
            "tr" => Tag::Tr,
            "td" => Tag::Td,
            "th" => Tag::Th,
            "blockquote" => Tag::Blockquote,
            "pre" => Tag::Pre,
            "code" => Tag::Code,
            "span" => Tag::Span,
            "strong" | "b" => Tag::Strong,
            "em" | "i" => Tag::Em,
            "a" => Tag::A,
            "img" => Tag::Img,
            "br" => Tag::Br,
            "hr" => Tag::Hr,
            "body" => Tag::Body,
            "html" => Tag::Html,
            "head" => Tag::Head,
            "style" => Tag::Style,
            "script" => Tag::Script,
            _ => Tag::Unknown(s.to_string()),
        }
    }

    /// Heading level for h1-h6.
    pub fn heading_level(&self) -> Option<u8> {
        match self {
            Tag::H1 => Some(1),
            Tag::H2 => Some(2),
            Tag::H3 => Some(3),
            Tag::H4 => Some(4),
            Tag::H5 => Some(5),
            Tag::H6 => Some(6),
            _ => None,
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(
            self,
            Tag::Span | Tag::Strong | Tag::Em | Tag::A | Tag::Code | Tag::Br
        )
    }

    /// Elements that never have children or a closing tag.
    pub fn is_void(&self) -> bool {
        matches!(self, Tag::Img | Tag::Br | Tag::Hr)
    }

    /// Elements whose body is raw text up to the matching close tag.
    fn is_raw_text(&self) -> bool {
        matches!(self, Tag::Style | Tag::Script)
    }

    /// Elements that never contribute visible content.
    pub fn is_metadata(&self) -> bool {
        matches!(self, Tag::Head | Tag::Style | Tag::Script)
    }
}

/// A node in the content tree.
#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(ElementNode),
    Text(String),
}

/// An element node carrying tag, attributes, and children.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub tag: Tag,
    pub attributes: HashMap<String, String>,
    pub children: Vec<DomNode>,
}

impl ElementNode {
    pub fn new(tag: Tag) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children: Vec::new(),
        }
    }

    pub fn with_children(tag: Tag, children: Vec<DomNode>) -> Self {
        Self {
            tag,
            attributes: HashMap::new(),
            children,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|s| s.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attributes
            .get("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    pub fn inline_style(&self) -> Option<&str> {
        self.attr("style")
    }

    pub fn src(&self) -> Option<&str> {
        self.attr("src")
    }

    /// Concatenated text of this subtree with whitespace collapsed.
    pub fn text_content(&self) -> String {
        let mut raw = String::new();
        collect_text(&self.children, &mut raw);
        raw.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

fn collect_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(t) => {
                out.push_str(t);
                out.push(' ');
            }
            DomNode::Element(e) if !e.tag.is_metadata() => collect_text(&e.children, out),
            DomNode::Element(_) => {}
        }
    }
}

// ---------------------------------------------------------------------------
// Parser – simple recursive descent over HTML
// ---------------------------------------------------------------------------

/// Parse an HTML string into a list of DOM nodes.
pub fn parse_html(html: &str) -> Vec<DomNode> {
    let mut parser = Parser::new(html);
    parser.parse_nodes()
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
    /// Open elements above the current position.
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn parse_nodes(&mut self) -> Vec<DomNode> {
        let mut nodes = Vec::new();
        loop {
            self.skip_whitespace_preserve();
            if self.eof() {
                break;
            }
            if self.starts_with("</") {
                if self.depth > 0 {
                    break;
                }
                // Unmatched close tag at the top level.
                self.skip_past('>');
                continue;
            }
            if let Some(node) = self.parse_node() {
                nodes.push(node);
            }
        }
        nodes
    }

    fn parse_node(&mut self) -> Option<DomNode> {
        if self.starts_with("<!--") {
            self.skip_comment();
            return None;
        }
        if self.starts_with("<!") || self.starts_with("<?") {
            // Doctype / processing instruction
            self.skip_past('>');
            return None;
        }
        if self.starts_with("<") {
            Some(self.parse_element())
        } else {
            Some(self.parse_text())
        }
    }

    fn parse_text(&mut self) -> DomNode {
        let start = self.pos;
        while !self.eof() && !self.starts_with("<") {
            self.advance_char();
        }
        DomNode::Text(decode_entities(&self.input[start..self.pos]))
    }

    fn parse_element(&mut self) -> DomNode {
        self.advance_char(); // '<'
        let tag_name = self.parse_name();
        let tag = Tag::parse(&tag_name);
        let mut elem = ElementNode::new(tag.clone());

        loop {
            self.skip_whitespace();
            if self.eof() || self.starts_with(">") || self.starts_with("/>") {
                break;
            }
            let before = self.pos;
            let (key, value) = self.parse_attribute();
            if self.pos == before {
                // Stray character inside the tag; step over it.
                self.advance_char();
                continue;
            }
            if !key.is_empty() {
                elem.attributes.insert(key.to_ascii_lowercase(), value);
            }
        }

        if self.starts_with("/>") {
            self.pos += 2;
            return DomNode::Element(elem);
        }
        if self.starts_with(">") {
            self.pos += 1;
        }
        if tag.is_void() {
            return DomNode::Element(elem);
        }

        if tag.is_raw_text() {
            let close = format!("</{}", tag_name.to_ascii_lowercase());
            let start = self.pos;
            let rest = self.input[start..].to_ascii_lowercase();
            let end = rest.find(&close).map(|i| start + i).unwrap_or(self.input.len());
            let body = &self.input[start..end];
            if !body.trim().is_empty() {
                elem.children.push(DomNode::Text(body.to_string()));
            }
            self.pos = end;
        } else {
            self.depth += 1;
            elem.children = self.parse_nodes();
            self.depth -= 1;
        }

        // Closing tag
        if self.starts_with("</") {
            self.pos += 2;
            self.parse_name();
            self.skip_past('>');
        }

        DomNode::Element(elem)
    }

    fn parse_name(&mut self) -> String {
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_alphanumeric() || c == '-' || c == '_' || c == ':' {
                self.advance_char();
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn parse_attribute(&mut self) -> (String, String) {
        let key = self.parse_name();
        self.skip_whitespace();
        if !self.starts_with("=") {
            return (key, String::new());
        }
        self.pos += 1;
        self.skip_whitespace();
        let value = self.parse_attr_value();
        (key, value)
    }

    fn parse_attr_value(&mut self) -> String {
        for quote in ['"', '\''] {
            if self.current_char_is(quote) {
                self.pos += 1;
                let start = self.pos;
                while !self.eof() && !self.current_char_is(quote) {
                    self.advance_char();
                }
                let val = self.input[start..self.pos].to_string();
                if !self.eof() {
                    self.pos += 1;
                }
                return decode_entities(&val);
            }
        }
        let start = self.pos;
        while !self.eof() {
            let c = self.current_char();
            if c.is_whitespace() || c == '>' || c == '/' {
                break;
            }
            self.advance_char();
        }
        self.input[start..self.pos].to_string()
    }

    fn skip_whitespace(&mut self) {
        while !self.eof() && self.current_char().is_whitespace() {
            self.advance_char();
        }
    }

    fn skip_whitespace_preserve(&mut self) {
        // Skip runs of pure whitespace between elements, but keep whitespace
        // that leads into text.
        let saved = self.pos;
        self.skip_whitespace();
        if !self.eof() && !self.starts_with("<") {
            self.pos = saved;
        }
    }

    fn skip_comment(&mut self) {
        self.pos += 4;
        match self.input[self.pos..].find("-->") {
            Some(i) => self.pos += i + 3,
            None => self.pos = self.input.len(),
        }
    }

    fn skip_past(&mut self, c: char) {
        match self.input[self.pos..].find(c) {
            Some(i) => self.pos += i + c.len_utf8(),
            None => self.pos = self.input.len(),
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        self.input[self.pos..].starts_with(s)
    }

    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn current_char(&self) -> char {
        self.input[self.pos..].chars().next().unwrap_or('\0')
    }

    fn current_char_is(&self, c: char) -> bool {
        !self.eof() && self.current_char() == c
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.input[self.pos..].chars().next() {
            self.pos += c.len_utf8();
        }
    }
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{00A0}")
        .replace("&amp;", "&")
}

// ---------------------------------------------------------------------------
// Convenience helpers
// ---------------------------------------------------------------------------

/// Find the `<body>` element and return its children, or return all nodes if
/// no `<body>` is present.
pub fn body_children(nodes: &[DomNode]) -> Vec<DomNode> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.tag == Tag::Body {
                return e.children.clone();
            }
            if e.tag == Tag::Html {
                let inner = body_children(&e.children);
                if !inner.is_empty() {
                    return inner;
                }
            }
        }
    }
    nodes
        .iter()
        .filter(|n| !matches!(n, DomNode::Element(e) if e.tag.is_metadata()))
        .cloned()
        .collect()
}

/// Depth-first search for the element whose `id` attribute equals `id`,
/// returning the chain of ancestors (outermost first) and the element.
pub fn find_by_id<'a>(nodes: &'a [DomNode], id: &str) -> Option<Vec<&'a ElementNode>> {
    for node in nodes {
        if let DomNode::Element(e) = node {
            if e.id() == Some(id) {
                return Some(vec![e]);
            }
            if let Some(mut chain) = find_by_id(&e.children, id) {
                chain.insert(0, e);
                return Some(chain);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_div() {
        let html = r#"<div class="flex p-4"><p>Hello</p></div>"#;
        let nodes = parse_html(html);
        assert_eq!(nodes.len(), 1);
        if let DomNode::Element(e) = &nodes[0] {
            assert_eq!(e.tag, Tag::Div);
            assert_eq!(e.classes(), vec!["flex", "p-4"]);
            assert_eq!(e.children.len(), 1);
        } else {
            panic!("Expected element");
        }
    }

    #[test]
    fn stray_close_tag_keeps_following_content() {
        let nodes = parse_html("<p>Intro</p></div><p>Total due: 42</p>");
        assert_eq!(nodes.len(), 2);
        if let DomNode::Element(p) = &nodes[1] {
            assert_eq!(p.tag, Tag::P);
            assert!(matches!(&p.children[0], DomNode::Text(t) if t == "Total due: 42"));
        } else {
            panic!("Expected p element");
        }
    }

    #[test]
    fn parse_void_elements() {
        let nodes = parse_html(r#"<p>a<br>b</p><img src="logo.png"><hr/>"#);
        assert_eq!(nodes.len(), 3);
        if let DomNode::Element(p) = &nodes[0] {
            assert_eq!(p.children.len(), 3);
        } else {
            panic!("Expected p element");
        }
        if let DomNode::Element(img) = &nodes[1] {
            assert_eq!(img.src(), Some("logo.png"));
        } else {
            panic!("Expected img element");
        }
    }

    #[test]
    fn parse_table_with_sections() {
        let html = r#"<table><thead><tr><th>Name</th></tr></thead><tbody><tr><td>Alice</td></tr></tbody></table>"#;
        let nodes = parse_html(html);
        if let DomNode::Element(table) = &nodes[0] {
            assert_eq!(table.tag, Tag::Table);
            assert_eq!(table.children.len(), 2);
        } else {
            panic!("Expected table");
        }
    }

    #[test]
    fn style_body_is_raw_text() {
        let nodes = parse_html("<style>p > a { color: red }</style><p>x</p>");
        assert_eq!(nodes.len(), 2);
        if let DomNode::Element(style) = &nodes[0] {
            assert_eq!(style.tag, Tag::Style);
            assert_eq!(style.children.len(), 1);
        } else {
            panic!("Expected style element");
        }
    }

    #[test]
    fn entities_are_decoded_once() {
        let nodes = parse_html("<p>&amp;lt; &lt;b&gt;</p>");
        if let DomNode::Element(p) = &nodes[0] {
            assert_eq!(p.text_content(), "&lt; <b>");
        } else {
            panic!("Expected p element");
        }
    }

    #[test]
    fn find_by_id_returns_ancestor_chain() {
        let nodes = parse_html(r#"<div id="outer"><section><p id="target">x</p></section></div>"#);
        let chain = find_by_id(&nodes, "target").unwrap();
        assert_eq!(chain.len(), 3);
        assert_eq!(chain[0].id(), Some("outer"));
        assert_eq!(chain[2].tag, Tag::P);
        assert!(find_by_id(&nodes, "missing").is_none());
    }
}
