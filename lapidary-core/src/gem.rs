//! Gems: the styled content tree produced by grinding
//!
//! A [`Gem`] is either a piece of text or a control node (empty text) such as
//! a paragraph break or the container of a list item. Its [`GemClass`] carries
//! the structural type, style flags, flush mode, text filters and an optional
//! explicit [`Length`].

use crate::tree::{NodeId, Tree};
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

pub type GemTree = Tree<Gem>;

/// Structural type of a gem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum GemType {
    #[default]
    Plain,
    Indent,
    List,
    DefList,
    Table,
    /// Title level 1 (part) to 7 (subparagraph)
    Title(u8),
    Contents,
}

impl GemType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "plain" => Some(GemType::Plain),
            "indent" => Some(GemType::Indent),
            "list" => Some(GemType::List),
            "dlist" => Some(GemType::DefList),
            "table" => Some(GemType::Table),
            "contents" => Some(GemType::Contents),
            _ => {
                let level: u8 = name.strip_prefix("title")?.parse().ok()?;
                (1..=7).contains(&level).then_some(GemType::Title(level))
            }
        }
    }

    /// Gems of this type get their own output contexts
    pub fn is_structural(&self) -> bool {
        !matches!(self, GemType::Plain)
    }

    pub fn title_level(&self) -> Option<u8> {
        match self {
            GemType::Title(level) => Some(*level),
            _ => None,
        }
    }
}

impl fmt::Display for GemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GemType::Plain => write!(f, "plain"),
            GemType::Indent => write!(f, "indent"),
            GemType::List => write!(f, "list"),
            GemType::DefList => write!(f, "dlist"),
            GemType::Table => write!(f, "table"),
            GemType::Title(level) => write!(f, "title{}", level),
            GemType::Contents => write!(f, "contents"),
        }
    }
}

/// Set of style flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Style(u8);

const STYLE_NAMES: [(&str, Style); 6] = [
    ("em", Style::EM),
    ("strong", Style::STRONG),
    ("code", Style::CODE),
    ("under", Style::UNDER),
    ("caps", Style::CAPS),
    ("number", Style::NUMBER),
];

impl Style {
    pub const NONE: Style = Style(0);
    pub const EM: Style = Style(1);
    pub const STRONG: Style = Style(1 << 1);
    pub const CODE: Style = Style(1 << 2);
    pub const UNDER: Style = Style(1 << 3);
    pub const CAPS: Style = Style(1 << 4);
    pub const NUMBER: Style = Style(1 << 5);

    pub fn from_name(name: &str) -> Option<Style> {
        STYLE_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, style)| *style)
    }

    /// Parse a comma separated flag list; unknown names are returned
    pub fn parse_list(list: &str) -> (Style, Vec<String>) {
        let mut style = Style::NONE;
        let mut unknown = Vec::new();
        for name in list.split(',').filter(|n| !n.is_empty()) {
            match Style::from_name(name) {
                Some(flag) => style = style | flag,
                None => unknown.push(name.to_string()),
            }
        }
        (style, unknown)
    }

    pub fn contains(self, other: Style) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn names(self) -> Vec<&'static str> {
        STYLE_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for Style {
    type Output = Style;
    fn bitor(self, rhs: Style) -> Style {
        Style(self.0 | rhs.0)
    }
}

impl BitAnd for Style {
    type Output = Style;
    fn bitand(self, rhs: Style) -> Style {
        Style(self.0 & rhs.0)
    }
}

impl Not for Style {
    type Output = Style;
    fn not(self) -> Style {
        Style(!self.0)
    }
}

/// Horizontal alignment of a gem's lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Flush {
    Left,
    Right,
    Center,
    #[default]
    Inherit,
}

impl Flush {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "left" => Some(Flush::Left),
            "right" => Some(Flush::Right),
            "center" => Some(Flush::Center),
            _ => None,
        }
    }
}

/// Partial layout measurements; unset fields are filled by rule inheritance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Length {
    pub left: Option<usize>,
    pub right: Option<usize>,
    pub indent: Option<usize>,
    pub spacing: Option<usize>,
    pub above: Option<usize>,
    pub below: Option<usize>,
}

/// Fully resolved measurements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Measure {
    pub left: usize,
    pub right: usize,
    pub indent: usize,
    pub spacing: usize,
    pub above: usize,
    pub below: usize,
}

impl Length {
    /// Parse `key value` pairs such as `left 4 spacing 1`
    ///
    /// Returns the length and the words that could not be understood.
    pub fn parse<'a>(words: impl IntoIterator<Item = &'a str>) -> (Length, Vec<String>) {
        let mut length = Length::default();
        let mut unknown = Vec::new();
        let mut words = words.into_iter();
        while let Some(key) = words.next() {
            let slot = match key {
                "left" => &mut length.left,
                "right" => &mut length.right,
                "indent" => &mut length.indent,
                "spacing" => &mut length.spacing,
                "above" => &mut length.above,
                "below" => &mut length.below,
                _ => {
                    unknown.push(key.to_string());
                    continue;
                }
            };
            match words.next().map(str::parse::<usize>) {
                Some(Ok(value)) => *slot = Some(value),
                Some(Err(_)) | None => unknown.push(key.to_string()),
            }
        }
        (length, unknown)
    }

    /// Fill every unset field from `other`
    pub fn merge_missing(&mut self, other: &Length) {
        self.left = self.left.or(other.left);
        self.right = self.right.or(other.right);
        self.indent = self.indent.or(other.indent);
        self.spacing = self.spacing.or(other.spacing);
        self.above = self.above.or(other.above);
        self.below = self.below.or(other.below);
    }

    pub fn is_complete(&self) -> bool {
        self.left.is_some()
            && self.right.is_some()
            && self.indent.is_some()
            && self.spacing.is_some()
            && self.above.is_some()
            && self.below.is_some()
    }

    pub fn resolve(&self) -> Measure {
        Measure {
            left: self.left.unwrap_or(0),
            right: self.right.unwrap_or(0),
            indent: self.indent.unwrap_or(0),
            spacing: self.spacing.unwrap_or(0),
            above: self.above.unwrap_or(0),
            below: self.below.unwrap_or(0),
        }
    }
}

/// Type, style and layout hints attached to a gem
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct GemClass {
    pub ty: GemType,
    pub style: Style,
    /// Flags explicitly cleared (`/-flag`), removed from the inherited style
    pub unstyle: Style,
    pub flush: Flush,
    pub filters: Vec<String>,
    pub length: Option<Length>,
}

impl GemClass {
    pub fn new(ty: GemType) -> Self {
        Self {
            ty,
            ..Self::default()
        }
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = self.style | style;
        self
    }

    /// Clear `style` from whatever this class is combined over
    pub fn without_style(mut self, style: Style) -> Self {
        self.style = self.style & !style;
        self.unstyle = self.unstyle | style;
        self
    }

    pub fn with_flush(mut self, flush: Flush) -> Self {
        self.flush = flush;
        self
    }

    /// Combine with an inherited class; this class wins on conflicts
    pub fn over(&self, inherited: &GemClass) -> GemClass {
        let mut filters = inherited.filters.clone();
        filters.extend(self.filters.iter().cloned());
        GemClass {
            ty: self.ty,
            style: (inherited.style & !self.unstyle) | self.style,
            unstyle: self.unstyle,
            flush: match self.flush {
                Flush::Inherit => inherited.flush,
                own => own,
            },
            filters,
            length: self.length,
        }
    }

    /// Apply a `/flag` or `/-flag` modifier; false if the name is unknown
    pub fn modify(&mut self, modifier: &str) -> bool {
        let (clear, name) = match modifier.strip_prefix('-') {
            Some(name) => (true, name),
            None => (false, modifier),
        };
        if let Some(flag) = Style::from_name(name) {
            if clear {
                self.style = self.style & !flag;
                self.unstyle = self.unstyle | flag;
            } else {
                self.style = self.style | flag;
                self.unstyle = self.unstyle & !flag;
            }
            return true;
        }
        match Flush::from_name(name) {
            Some(flush) => {
                self.flush = if clear { Flush::Inherit } else { flush };
                true
            }
            None => false,
        }
    }
}

/// Control role of a gem without text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Control {
    #[default]
    None,
    /// Paragraph break
    Break,
    LineBreak,
    /// Placeholder carrying data for layout (contents range, empty counter)
    Marker,
}

/// A node of the styled content tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gem {
    text: String,
    class: GemClass,
    width: usize,
    spaced: bool,
    control: Control,
}

impl Gem {
    pub fn text(text: impl Into<String>, class: GemClass, spaced: bool) -> Self {
        Self {
            text: text.into(),
            class,
            width: 0,
            spaced,
            control: Control::None,
        }
    }

    /// A gem without text that holds children
    pub fn container(class: GemClass) -> Self {
        Self::text(String::new(), class, false)
    }

    /// A control gem whose text is data, never printed as content
    pub fn marker(text: impl Into<String>, class: GemClass) -> Self {
        Self {
            control: Control::Marker,
            ..Self::text(text, class, false)
        }
    }

    pub fn paragraph_break(class: GemClass) -> Self {
        Self {
            control: Control::Break,
            ..Self::container(class)
        }
    }

    pub fn line_break(class: GemClass) -> Self {
        Self {
            control: Control::LineBreak,
            ..Self::container(class)
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    pub fn get_text(&self) -> &str {
        &self.text
    }

    pub fn class(&self) -> &GemClass {
        &self.class
    }

    pub fn ty(&self) -> GemType {
        self.class.ty
    }

    pub fn style(&self) -> Style {
        self.class.style
    }

    pub fn flush(&self) -> Flush {
        self.class.flush
    }

    /// Relative cell width (table cells only)
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn spaced(&self) -> bool {
        self.spaced
    }

    pub fn is_control(&self) -> bool {
        self.control != Control::None
    }

    pub fn is_marker(&self) -> bool {
        self.control == Control::Marker
    }

    pub fn is_break(&self) -> bool {
        self.control == Control::Break
    }

    pub fn is_line_break(&self) -> bool {
        self.control == Control::LineBreak
    }

    pub fn is_structural(&self) -> bool {
        self.class.ty.is_structural()
    }
}

/// Remove trailing breaks and collapse a line break followed by a paragraph
/// break, bottom-up through the subtree
pub fn polish(tree: &mut GemTree, id: NodeId) {
    for child in tree.children(id).to_vec() {
        polish(tree, child);
    }

    let mut next_is_break = false;
    for child in tree.children(id).to_vec().into_iter().rev() {
        let gem = tree.get(child);
        if gem.is_line_break() && next_is_break {
            tree.detach(child);
            continue;
        }
        next_is_break = gem.is_break();
    }

    while let Some(last) = tree.last_child(id) {
        let gem = tree.get(last);
        if gem.is_break() || gem.is_line_break() {
            tree.detach(last);
        } else {
            break;
        }
    }
}

/// JSON view of a gem subtree
pub fn dump(tree: &GemTree, id: NodeId) -> Value {
    let gem = tree.get(id);
    let children: Vec<Value> = tree.children(id).iter().map(|&c| dump(tree, c)).collect();
    json!({
        "type": gem.ty().to_string(),
        "text": gem.text,
        "style": gem.style().names(),
        "width": gem.width,
        "spaced": gem.spaced,
        "control": gem.control,
        "children": children,
    })
}
