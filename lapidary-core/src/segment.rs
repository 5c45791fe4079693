//! Typed output stream shared by the filter language, layout and renderer

use serde::Serialize;
use unicode_segmentation::UnicodeSegmentation;

/// Layout instruction embedded in a segment stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Directive {
    AlignLeft,
    AlignCenter,
    AlignRight,
    /// Pad the rest of the line with the character at this point
    Fill(char),
    /// Underline the finished line with the character
    Underfill(char),
    /// Start a prefix repeated at the start of every following line
    PrefixStart(String),
    PrefixEnd,
    /// Every break is kept, even repeated or leading ones
    RawBreaks,
    /// Consecutive breaks collapse (default)
    CleanBreaks,
    /// Marks the line anchor texts attach to
    Anchor,
    Tab,
    /// Unbreakable space between the neighbouring words
    HardSpace,
    LineBreak,
    ParagraphBreak,
    /// Ensure at least this many blank lines
    Skip(usize),
    /// Text inserted at the nearest anchor marker
    AnchorText { append: bool, text: String },
}

/// One element of a context's output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Segment {
    Word { text: String, spaced: bool },
    Directive(Directive),
}

impl Segment {
    pub fn word(text: impl Into<String>, spaced: bool) -> Self {
        Segment::Word {
            text: text.into(),
            spaced,
        }
    }
}

impl From<Directive> for Segment {
    fn from(directive: Directive) -> Self {
        Segment::Directive(directive)
    }
}

/// Number of character cells a string occupies
pub fn cell_width(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Width of the words in a stream laid out on one line
pub fn line_width(segments: &[Segment]) -> usize {
    let mut width = 0;
    let mut first = true;
    for segment in segments {
        match segment {
            Segment::Word { text, spaced } => {
                if *spaced && !first {
                    width += 1;
                }
                width += cell_width(text);
                first = false;
            }
            Segment::Directive(Directive::HardSpace) => {
                width += 1;
            }
            Segment::Directive(_) => {}
        }
    }
    width
}

/// Words of a stream joined as they would print on one line
pub fn plain_text(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        match segment {
            Segment::Word { text, spaced } => {
                if *spaced && !out.is_empty() {
                    out.push(' ');
                }
                out.push_str(text);
            }
            Segment::Directive(Directive::HardSpace) => out.push(' '),
            Segment::Directive(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_width_glues_unspaced_words() {
        let segments = vec![
            Segment::word("Hello", false),
            Segment::word("world", true),
            Segment::word(".", false),
            Directive::LineBreak.into(),
        ];
        assert_eq!(line_width(&segments), 12);
        assert_eq!(plain_text(&segments), "Hello world.");
    }

    #[test]
    fn test_cell_width_counts_graphemes() {
        assert_eq!(cell_width("e\u{301}t\u{e9}"), 3);
    }
}
