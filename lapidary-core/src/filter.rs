//! The format mini-language
//!
//! A format string is compiled once into a [`FormatProgram`]: up to five
//! segments (main, pre `@<…@>`, post `@>…@<`, anchor-prepend `@[…@]` and
//! anchor-append `@]…@[`), each a list of [`Piece`]s. Running a piece list
//! against a gem's text produces [`Segment`]s for the layout.

use crate::error::{Diagnostics, DocError, Location, Result};
use crate::segment::{plain_text, Directive, Segment};

/// Which part of a format string applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Main,
    Pre,
    Post,
    AnchorPrepend,
    AnchorAppend,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Main,
        Category::Pre,
        Category::Post,
        Category::AnchorPrepend,
        Category::AnchorAppend,
    ];

    fn index(self) -> usize {
        match self {
            Category::Main => 0,
            Category::Pre => 1,
            Category::Post => 2,
            Category::AnchorPrepend => 3,
            Category::AnchorAppend => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberStyle {
    Decimal,
    AlphaLower,
    AlphaUpper,
    RomanLower,
    RomanUpper,
}

/// Where a numeric escape takes its value from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Position among non-control siblings
    Ordinal,
    /// The input text read as an integer
    Input,
    /// The persistent variable `x`
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprToken {
    Number(i64),
    Value(ValueSource),
    Op(Operator),
}

/// A compiled element of a format segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Piece {
    Literal(String),
    Input,
    Upper,
    Lower,
    Capitalized,
    Html,
    Number { style: NumberStyle, source: ValueSource },
    Directive(Directive),
    Substitute(Vec<(String, String)>),
    Eval(Vec<ExprToken>),
}

/// State carried across every filter run of one compile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterVars {
    pub x: i64,
}

/// What a filter runs against
#[derive(Debug, Clone, Copy)]
pub struct FilterInput<'a> {
    pub text: &'a str,
    pub ordinal: usize,
    /// Spacing given to the first output word
    pub spaced: bool,
}

/// A compiled format string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatProgram {
    segments: [Option<Vec<Piece>>; 5],
}

impl FormatProgram {
    pub fn compile(text: &str, loc: &Location, diagnostics: &mut Diagnostics) -> Result<Self> {
        let mut program = FormatProgram::default();
        for (category, source) in Category::ALL.into_iter().zip(split_segments(text)) {
            if let Some(source) = source {
                program.segments[category.index()] = Some(compile_pieces(&source, loc, diagnostics)?);
            }
        }
        Ok(program)
    }

    pub fn get(&self, category: Category) -> Option<&[Piece]> {
        self.segments[category.index()].as_deref()
    }

    pub fn defines(&self, category: Category) -> bool {
        self.segments[category.index()].is_some()
    }
}

/// Cut a format string into its five segments
///
/// The main segment is present only when non-empty; the others whenever
/// their opening delimiter appears.
fn split_segments(text: &str) -> [Option<String>; 5] {
    let mut parts: [Option<String>; 5] = Default::default();
    let mut main = String::new();
    let mut current = Category::Main;
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '@' {
            push_to(&mut parts, &mut main, current, c.to_string());
            continue;
        }
        let Some(next) = chars.next() else {
            push_to(&mut parts, &mut main, current, "@".to_string());
            break;
        };
        let switch = match (current, next) {
            (Category::Main, '<') => Some(Category::Pre),
            (Category::Main, '>') => Some(Category::Post),
            (Category::Main, '[') => Some(Category::AnchorPrepend),
            (Category::Main, ']') => Some(Category::AnchorAppend),
            (Category::Pre, '>')
            | (Category::Post, '<')
            | (Category::AnchorPrepend, ']')
            | (Category::AnchorAppend, '[') => Some(Category::Main),
            _ => None,
        };
        match switch {
            Some(category) => {
                if category != Category::Main {
                    parts[category.index()].get_or_insert_with(String::new);
                }
                current = category;
            }
            None => push_to(&mut parts, &mut main, current, format!("@{}", next)),
        }
    }
    if !main.is_empty() {
        parts[Category::Main.index()] = Some(main);
    }
    parts
}

fn push_to(parts: &mut [Option<String>; 5], main: &mut String, category: Category, text: String) {
    match category {
        Category::Main => main.push_str(&text),
        other => parts[other.index()].get_or_insert_with(String::new).push_str(&text),
    }
}

fn malformed(loc: &Location, message: impl Into<String>) -> DocError {
    DocError::MalformedFilter {
        loc: loc.clone(),
        message: message.into(),
    }
}

/// Text between `(` and the next unescaped `)`
fn read_parenthesized(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, escape: char, loc: &Location) -> Result<String> {
    if chars.next() != Some('(') {
        return Err(malformed(loc, format!("'@{}' needs a parenthesized argument", escape)));
    }
    let mut out = String::new();
    while let Some(c) = chars.next() {
        match c {
            ')' => return Ok(out),
            '@' => match chars.next() {
                Some(n @ ('@' | '{' | '}' | '$' | ')')) => out.push(n),
                Some(n) => {
                    out.push('@');
                    out.push(n);
                }
                None => out.push('@'),
            },
            _ => out.push(c),
        }
    }
    Err(malformed(loc, format!("unterminated '@{}(' argument", escape)))
}

fn compile_pieces(text: &str, loc: &Location, diagnostics: &mut Diagnostics) -> Result<Vec<Piece>> {
    let mut pieces = Vec::new();
    let mut literal = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '@' {
            literal.push(c);
            continue;
        }
        let Some(escape) = chars.next() else {
            break;
        };
        let piece = match escape {
            '@' | '{' | '}' | '$' => {
                literal.push(escape);
                continue;
            }
            't' => Piece::Input,
            'U' => Piece::Upper,
            'L' => Piece::Lower,
            'C' => Piece::Capitalized,
            'h' => Piece::Html,
            'n' => number(NumberStyle::Decimal, ValueSource::Ordinal),
            'a' => number(NumberStyle::AlphaLower, ValueSource::Ordinal),
            'A' => number(NumberStyle::AlphaUpper, ValueSource::Ordinal),
            'l' => Piece::Directive(Directive::AlignLeft),
            'm' => Piece::Directive(Directive::AlignCenter),
            'e' => Piece::Directive(Directive::AlignRight),
            '|' => Piece::Directive(Directive::LineBreak),
            '/' => Piece::Directive(Directive::ParagraphBreak),
            '+' => Piece::Directive(Directive::RawBreaks),
            '-' => Piece::Directive(Directive::CleanBreaks),
            'k' => Piece::Directive(Directive::Anchor),
            'T' => Piece::Directive(Directive::Tab),
            '_' => Piece::Directive(Directive::HardSpace),
            'P' => Piece::Directive(Directive::PrefixEnd),
            'r' | 'R' => {
                let source = match chars.next() {
                    Some('n') => ValueSource::Ordinal,
                    Some('t') => ValueSource::Input,
                    Some('x') => ValueSource::Variable,
                    Some(other) => {
                        return Err(malformed(loc, format!("unknown roman numeral source '{}'", other)))
                    }
                    None => return Err(malformed(loc, format!("'@{}' needs a source character", escape))),
                };
                let style = if escape == 'r' {
                    NumberStyle::RomanLower
                } else {
                    NumberStyle::RomanUpper
                };
                number(style, source)
            }
            'I' => {
                let style = match chars.next() {
                    Some('1') => NumberStyle::Decimal,
                    Some('a') => NumberStyle::AlphaLower,
                    Some('A') => NumberStyle::AlphaUpper,
                    Some('i') => NumberStyle::RomanLower,
                    Some('I') => NumberStyle::RomanUpper,
                    Some(other) => return Err(malformed(loc, format!("unknown numbering style '{}'", other))),
                    None => return Err(malformed(loc, "'@I' needs a style character")),
                };
                number(style, ValueSource::Ordinal)
            }
            'f' | 'u' => {
                let Some(fill) = chars.next() else {
                    return Err(malformed(loc, format!("'@{}' needs a fill character", escape)));
                };
                if escape == 'f' {
                    Piece::Directive(Directive::Fill(fill))
                } else {
                    Piece::Directive(Directive::Underfill(fill))
                }
            }
            'p' => Piece::Directive(Directive::PrefixStart(read_parenthesized(&mut chars, 'p', loc)?)),
            's' => {
                let list = read_parenthesized(&mut chars, 's', loc)?;
                Piece::Substitute(parse_substitutions(&list, loc, diagnostics))
            }
            'v' => {
                let expr = read_parenthesized(&mut chars, 'v', loc)?;
                Piece::Eval(parse_expression(&expr, loc, diagnostics))
            }
            // Unknown escapes are dropped
            _ => continue,
        };
        if !literal.is_empty() {
            pieces.push(Piece::Literal(std::mem::take(&mut literal)));
        }
        pieces.push(piece);
    }
    if !literal.is_empty() {
        pieces.push(Piece::Literal(literal));
    }
    Ok(pieces)
}

fn number(style: NumberStyle, source: ValueSource) -> Piece {
    Piece::Number { style, source }
}

fn parse_substitutions(list: &str, loc: &Location, diagnostics: &mut Diagnostics) -> Vec<(String, String)> {
    list.split(',')
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.split_once('=') {
            Some((from, to)) if !from.is_empty() => Some((from.to_string(), to.to_string())),
            _ => {
                diagnostics.warn(loc.clone(), format!("ignoring substitution '{}'", entry));
                None
            }
        })
        .collect()
}

fn parse_expression(expr: &str, loc: &Location, diagnostics: &mut Diagnostics) -> Vec<ExprToken> {
    let mut tokens = Vec::new();
    let mut chars = expr.chars().peekable();
    while let Some(c) = chars.next() {
        let token = match c {
            '0'..='9' => {
                let mut value = i64::from(c as u8 - b'0');
                while let Some(d) = chars.peek().and_then(|d| d.to_digit(10)) {
                    value = value.saturating_mul(10).saturating_add(i64::from(d));
                    chars.next();
                }
                ExprToken::Number(value)
            }
            'x' => ExprToken::Value(ValueSource::Variable),
            'n' => ExprToken::Value(ValueSource::Ordinal),
            't' => ExprToken::Value(ValueSource::Input),
            '+' => ExprToken::Op(Operator::Add),
            '-' => ExprToken::Op(Operator::Sub),
            '*' => ExprToken::Op(Operator::Mul),
            '/' => ExprToken::Op(Operator::Div),
            '%' => ExprToken::Op(Operator::Rem),
            '=' => ExprToken::Op(Operator::Store),
            c if c.is_whitespace() => continue,
            other => {
                diagnostics.warn(loc.clone(), format!("ignoring '{}' in expression '{}'", other, expr));
                continue;
            }
        };
        tokens.push(token);
    }
    tokens
}

/// Collects output text into words and directives
struct Emitter {
    out: Vec<Segment>,
    word: String,
    first_spaced: bool,
    started: bool,
    space_before: bool,
}

impl Emitter {
    fn new(first_spaced: bool) -> Self {
        Self {
            out: Vec::new(),
            word: String::new(),
            first_spaced,
            started: false,
            space_before: false,
        }
    }

    fn push_str(&mut self, text: &str) {
        for c in text.chars() {
            if c.is_whitespace() {
                self.end_word();
                self.space_before = true;
            } else {
                self.word.push(c);
            }
        }
    }

    fn end_word(&mut self) {
        if self.word.is_empty() {
            return;
        }
        let spaced = self.space_before || (!self.started && self.first_spaced);
        self.out.push(Segment::word(std::mem::take(&mut self.word), spaced));
        self.started = true;
        self.space_before = false;
    }

    fn directive(&mut self, directive: Directive) {
        self.end_word();
        self.out.push(Segment::Directive(directive));
    }

    fn finish(mut self) -> Vec<Segment> {
        self.end_word();
        self.out
    }
}

/// Run a compiled segment against an input
pub fn run(pieces: &[Piece], input: &FilterInput<'_>, vars: &mut FilterVars) -> Vec<Segment> {
    let mut emitter = Emitter::new(input.spaced);
    for piece in pieces {
        match piece {
            Piece::Literal(text) => emitter.push_str(text),
            Piece::Input => emitter.push_str(input.text),
            Piece::Upper => emitter.push_str(&input.text.to_uppercase()),
            Piece::Lower => emitter.push_str(&input.text.to_lowercase()),
            Piece::Capitalized => emitter.push_str(&capitalize(input.text)),
            Piece::Html => emitter.push_str(&html_escape(input.text)),
            Piece::Number { style, source } => {
                let value = value_of(*source, input, vars);
                emitter.push_str(&format_number(value, *style));
            }
            Piece::Directive(directive) => emitter.directive(directive.clone()),
            Piece::Substitute(table) => {
                let text = table
                    .iter()
                    .fold(input.text.to_string(), |text, (from, to)| text.replace(from.as_str(), to));
                emitter.push_str(&text);
            }
            Piece::Eval(tokens) => {
                if let Some(value) = evaluate(tokens, input, vars) {
                    emitter.push_str(&value.to_string());
                }
            }
        }
    }
    emitter.finish()
}

/// Run a filter for its text only, as used by `@apply` chains
pub fn run_text(pieces: &[Piece], input: &FilterInput<'_>, vars: &mut FilterVars) -> String {
    plain_text(&run(pieces, input, vars))
}

fn value_of(source: ValueSource, input: &FilterInput<'_>, vars: &FilterVars) -> i64 {
    match source {
        ValueSource::Ordinal => input.ordinal as i64,
        ValueSource::Input => input.text.trim().parse().unwrap_or(0),
        ValueSource::Variable => vars.x,
    }
}

/// Strict left-to-right evaluation; `None` when the result is stored
fn evaluate(tokens: &[ExprToken], input: &FilterInput<'_>, vars: &mut FilterVars) -> Option<i64> {
    let mut acc = 0i64;
    let mut op = Operator::Add;
    let mut stored = false;
    for token in tokens {
        let operand = match token {
            ExprToken::Number(n) => *n,
            ExprToken::Value(source) => value_of(*source, input, vars),
            ExprToken::Op(Operator::Store) => {
                vars.x = acc;
                stored = true;
                continue;
            }
            ExprToken::Op(next) => {
                op = *next;
                continue;
            }
        };
        acc = match op {
            Operator::Add => acc.wrapping_add(operand),
            Operator::Sub => acc.wrapping_sub(operand),
            Operator::Mul => acc.wrapping_mul(operand),
            Operator::Div => acc.checked_div(operand).unwrap_or(0),
            Operator::Rem => acc.checked_rem(operand).unwrap_or(0),
            Operator::Store => acc,
        };
    }
    (!stored).then_some(acc)
}

pub fn format_number(value: i64, style: NumberStyle) -> String {
    match style {
        NumberStyle::Decimal => value.to_string(),
        NumberStyle::AlphaLower => alphabetic(value),
        NumberStyle::AlphaUpper => alphabetic(value).to_uppercase(),
        NumberStyle::RomanLower => roman(value),
        NumberStyle::RomanUpper => roman(value).to_uppercase(),
    }
}

/// `1 → a`, `26 → z`, `27 → aa`; empty for values below one
pub fn alphabetic(mut value: i64) -> String {
    let mut out = Vec::new();
    while value > 0 {
        value -= 1;
        out.push(b'a' + (value % 26) as u8);
        value /= 26;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

/// Largest value written as a roman numeral; larger values stay decimal
pub const MAX_ROMAN: i64 = 3999;

/// Lower-case roman numeral; empty for values below one
pub fn roman(mut value: i64) -> String {
    if value > MAX_ROMAN {
        return value.to_string();
    }
    const NUMERALS: [(i64, &str); 13] = [
        (1000, "m"),
        (900, "cm"),
        (500, "d"),
        (400, "cd"),
        (100, "c"),
        (90, "xc"),
        (50, "l"),
        (40, "xl"),
        (10, "x"),
        (9, "ix"),
        (5, "v"),
        (4, "iv"),
        (1, "i"),
    ];
    let mut out = String::new();
    for (step, numeral) in NUMERALS {
        while value >= step {
            out.push_str(numeral);
            value -= step;
        }
    }
    out
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
