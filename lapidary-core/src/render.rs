//! Rendering a finished schedule into text lines
//!
//! A ring of [`OutputState`]s holds the contexts being rendered. With a
//! single state its context streams straight into the document (raw mode);
//! with several, each state contributes its next line to a shared output row
//! at its left edge (structured mode). Whenever states run dry, `advance`
//! promotes the contexts that were waiting on them.

use crate::gem::Flush;
use crate::schedule::{ContextId, OutputContext, Schedule};
use crate::segment::{cell_width, Directive, Segment};
use std::collections::{HashSet, VecDeque};
use unicode_segmentation::UnicodeSegmentation;

/// Progress of the render through the context graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start(ContextId),
    Finish(ContextId),
}

/// Where anchored text goes in a finished line, as byte offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AnchorPoint {
    at: usize,
    tail: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Line {
    text: String,
    anchor: Option<AnchorPoint>,
}

impl Line {
    /// Put `pad` in front of the line
    fn indent(&mut self, pad: &str) {
        if pad.is_empty() {
            return;
        }
        self.text.insert_str(0, pad);
        if let Some(anchor) = &mut self.anchor {
            anchor.at += pad.len();
            anchor.tail += pad.len();
        }
    }

    fn attach(&mut self, append: bool, text: &str) -> bool {
        let Some(anchor) = &mut self.anchor else {
            return false;
        };
        if append {
            self.text.insert_str(anchor.tail, text);
        } else {
            self.text.insert_str(anchor.at, text);
            anchor.at += text.len();
        }
        anchor.tail += text.len();
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Row {
    Text(Line),
    /// At least this many blank lines before the next text
    Gap(usize),
    /// A blank line kept under raw breaks
    Empty,
}

#[derive(Debug, Clone)]
struct Word {
    text: String,
    spaced: bool,
}

fn words_width(words: &[Word]) -> usize {
    words
        .iter()
        .enumerate()
        .map(|(i, w)| cell_width(&w.text) + usize::from(w.spaced && i > 0))
        .sum()
}

/// Breaks one context's segments into aligned lines
#[derive(Debug)]
struct LineBreaker {
    width: usize,
    indent: usize,
    align: Flush,
    words: Vec<Word>,
    /// Word index the anchor sits before
    anchor: Option<usize>,
    /// Anchored text waiting for the current line to finish
    pending: Vec<(bool, String)>,
    fill: Option<(usize, char)>,
    underfill: Option<char>,
    prefix: Option<String>,
    hard_space: bool,
    glue: bool,
    raw_breaks: bool,
    paragraph_start: bool,
    rows: VecDeque<Row>,
    /// Anchored text with no anchor in this context
    orphans: Vec<(bool, String)>,
}

impl LineBreaker {
    fn new(ctx: &OutputContext, prefix: Option<String>) -> Self {
        Self {
            width: ctx.width(),
            indent: ctx.indent,
            align: ctx.align,
            words: Vec::new(),
            anchor: None,
            pending: Vec::new(),
            fill: None,
            underfill: None,
            prefix,
            hard_space: false,
            glue: false,
            raw_breaks: false,
            paragraph_start: true,
            rows: VecDeque::new(),
            orphans: Vec::new(),
        }
    }

    fn avail(&self) -> usize {
        let prefix = self.prefix.as_deref().map(cell_width).unwrap_or(0);
        let indent = if self.paragraph_start { self.indent } else { 0 };
        self.width.saturating_sub(prefix + indent).max(1)
    }

    fn push(&mut self, segment: &Segment) {
        match segment {
            Segment::Word { text, spaced } => self.push_word(text, *spaced),
            Segment::Directive(directive) => self.directive(directive),
        }
    }

    fn push_word(&mut self, text: &str, spaced: bool) {
        let glue = std::mem::take(&mut self.glue);
        let hard_space = std::mem::take(&mut self.hard_space);
        let mut text = text.to_string();
        if hard_space && !self.words.is_empty() {
            text.insert(0, ' ');
        }
        let spaced = spaced && !glue && !hard_space && !self.words.is_empty();
        self.words.push(Word { text, spaced });
        self.wrap();
    }

    fn directive(&mut self, directive: &Directive) {
        match directive {
            Directive::AlignLeft => self.align = Flush::Left,
            Directive::AlignCenter => self.align = Flush::Center,
            Directive::AlignRight => self.align = Flush::Right,
            Directive::Fill(c) => self.fill = Some((self.words.len(), *c)),
            Directive::Underfill(c) => self.underfill = Some(*c),
            Directive::PrefixStart(prefix) => self.prefix = Some(prefix.clone()),
            Directive::PrefixEnd => self.prefix = None,
            Directive::RawBreaks => self.raw_breaks = true,
            Directive::CleanBreaks => self.raw_breaks = false,
            Directive::Anchor => self.anchor = Some(self.words.len()),
            Directive::Tab => {
                let used = words_width(&self.words);
                let stop = (used / 8 + 1) * 8;
                self.words.push(Word {
                    text: " ".repeat(stop - used),
                    spaced: false,
                });
                self.glue = true;
                self.wrap();
            }
            Directive::HardSpace => self.hard_space = true,
            Directive::LineBreak => {
                if !self.words.is_empty() {
                    self.finish_line();
                } else if self.raw_breaks {
                    self.rows.push_back(Row::Empty);
                }
            }
            Directive::ParagraphBreak => {
                self.end_line();
                if self.raw_breaks {
                    self.rows.push_back(Row::Empty);
                } else {
                    self.push_gap(1);
                }
                self.paragraph_start = true;
            }
            Directive::Skip(n) => {
                self.end_line();
                self.push_gap(*n);
                self.paragraph_start = true;
            }
            Directive::AnchorText { append, text } => self.anchor_text(*append, text),
        }
    }

    fn push_gap(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        match self.rows.back_mut() {
            Some(Row::Gap(m)) => *m = (*m).max(n),
            _ => self.rows.push_back(Row::Gap(n)),
        }
    }

    /// Current line if it has an anchor, else the latest queued line with one
    fn anchor_text(&mut self, append: bool, text: &str) {
        if self.anchor.is_some() {
            self.pending.push((append, text.to_string()));
            return;
        }
        let queued = self.rows.iter_mut().rev().find_map(|row| match row {
            Row::Text(line) if line.anchor.is_some() => Some(line),
            _ => None,
        });
        match queued {
            Some(line) => {
                line.attach(append, text);
            }
            None => self.orphans.push((append, text.to_string())),
        }
    }

    fn wrap(&mut self) {
        while words_width(&self.words) > self.avail() {
            match self.words.iter().rposition(|w| w.spaced).filter(|&i| i > 0) {
                Some(at) => self.split_at(at),
                None => self.hard_split(),
            }
        }
    }

    /// Finish the words before `at` as a line; the rest start the next one
    fn split_at(&mut self, at: usize) {
        let mut rest = self.words.split_off(at);
        if let Some(first) = rest.first_mut() {
            first.spaced = false;
        }
        let anchor = match self.anchor {
            Some(a) if a >= at => {
                self.anchor = None;
                Some(a - at)
            }
            _ => None,
        };
        let pending = if anchor.is_some() {
            std::mem::take(&mut self.pending)
        } else {
            Vec::new()
        };
        let fill = match self.fill {
            Some((i, c)) if i >= at => {
                self.fill = None;
                Some((i - at, c))
            }
            _ => None,
        };
        self.finish_line();
        self.words = rest;
        self.anchor = anchor;
        self.pending = pending;
        self.fill = fill;
    }

    /// Cut a single chunk wider than the line at the line width
    fn hard_split(&mut self) {
        let avail = self.avail();
        let joined: String = self.words.iter().map(|w| w.text.as_str()).collect();
        let graphemes: Vec<&str> = joined.graphemes(true).collect();
        let cut = avail.min(graphemes.len());
        self.words = vec![
            Word {
                text: graphemes[..cut].concat(),
                spaced: false,
            },
            Word {
                text: graphemes[cut..].concat(),
                spaced: false,
            },
        ];
        self.anchor = self.anchor.map(|a| a.min(1));
        self.fill = self.fill.map(|(i, c)| (i.min(1), c));
        self.split_at(1);
    }

    fn end_line(&mut self) {
        if !self.words.is_empty() {
            self.finish_line();
        }
    }

    fn finish_line(&mut self) {
        let words = std::mem::take(&mut self.words);
        let fill_index = self.fill.map(|(i, _)| i);
        let mut text = String::new();
        let mut anchor_at = None;
        let mut fill_at = None;
        for (i, word) in words.iter().enumerate() {
            if word.spaced && !text.is_empty() {
                text.push(' ');
            }
            if self.anchor == Some(i) {
                anchor_at = Some(text.len());
            }
            if fill_index == Some(i) {
                fill_at = Some(text.len());
            }
            text.push_str(&word.text);
        }
        if self.anchor == Some(words.len()) {
            anchor_at = Some(text.len());
        }
        if fill_index == Some(words.len()) {
            fill_at = Some(text.len());
        }

        let avail = self.avail();
        let mut width = cell_width(&text);
        if let (Some(at), Some((_, c))) = (fill_at, self.fill) {
            if width < avail {
                let pad = c.to_string().repeat(avail - width);
                text.insert_str(at, &pad);
                if let Some(anchor) = anchor_at.as_mut().filter(|a| **a >= at) {
                    *anchor += pad.len();
                }
                width = avail;
            }
        }

        let mut line = Line {
            text,
            anchor: anchor_at.map(|at| AnchorPoint { at, tail: at }),
        };
        for (append, text) in std::mem::take(&mut self.pending) {
            line.attach(append, &text);
        }

        let slack = avail.saturating_sub(width);
        let pad = match self.align {
            Flush::Right => slack,
            Flush::Center => slack / 2,
            Flush::Left | Flush::Inherit => 0,
        };
        let indent = if self.paragraph_start { self.indent } else { 0 };
        let lead = " ".repeat(pad + indent);
        line.indent(&lead);
        if let Some(prefix) = &self.prefix {
            line.indent(prefix);
        }
        self.rows.push_back(Row::Text(line));

        if let Some(c) = self.underfill.take() {
            let mut under = Line {
                text: c.to_string().repeat(width),
                anchor: None,
            };
            under.indent(&lead);
            if let Some(prefix) = &self.prefix {
                under.indent(prefix);
            }
            self.rows.push_back(Row::Text(under));
        }

        self.anchor = None;
        self.fill = None;
        self.paragraph_start = false;
    }
}

/// Rendering cursor over one context
#[derive(Debug)]
pub struct OutputState {
    context: ContextId,
    cursor: usize,
    breaker: LineBreaker,
    done: bool,
    /// A text line of this state has been placed
    shown: bool,
}

impl OutputState {
    fn new(id: ContextId, ctx: &OutputContext, prefix: Option<String>) -> Self {
        Self {
            context: id,
            cursor: 0,
            breaker: LineBreaker::new(ctx, prefix),
            done: false,
            shown: false,
        }
    }

    pub fn context(&self) -> ContextId {
        self.context
    }

    /// All segments consumed and every line handed out
    pub fn exhausted(&self) -> bool {
        self.done && self.breaker.rows.is_empty()
    }

    fn step(&mut self, ctx: &OutputContext) {
        match ctx.segments().get(self.cursor) {
            Some(segment) => {
                self.breaker.push(segment);
                self.cursor += 1;
            }
            None => {
                self.breaker.end_line();
                self.done = true;
            }
        }
    }

    fn has_text(&self) -> bool {
        self.breaker.rows.iter().any(|r| matches!(r, Row::Text(_)))
    }

    /// Pull segments until a text line is queued; blank rows at either end
    /// of a column are dropped
    fn pump(&mut self, ctx: &OutputContext) {
        while !self.done && !self.has_text() {
            self.step(ctx);
        }
        if !self.shown {
            while matches!(self.breaker.rows.front(), Some(Row::Gap(_))) {
                self.breaker.rows.pop_front();
            }
        }
        if self.done && !self.has_text() {
            self.breaker.rows.clear();
        }
    }

    /// Next line of this column; `None` renders blank
    fn filled_line(&mut self) -> Option<Line> {
        match self.breaker.rows.front_mut()? {
            Row::Text(_) => match self.breaker.rows.pop_front() {
                Some(Row::Text(line)) => {
                    self.shown = true;
                    Some(line)
                }
                _ => None,
            },
            Row::Gap(n) if *n > 1 => {
                *n -= 1;
                None
            }
            Row::Gap(_) | Row::Empty => {
                self.breaker.rows.pop_front();
                None
            }
        }
    }
}

/// Lines written so far
#[derive(Debug, Default)]
struct Document {
    lines: Vec<Line>,
    pending: usize,
    /// Line prefix carried from one raw context to the next
    prefix: Option<String>,
}

impl Document {
    fn push(&mut self, row: Row, left: usize) {
        match row {
            Row::Gap(n) => self.pending = self.pending.max(n),
            Row::Empty => {
                self.flush_pending();
                self.lines.push(Line::default());
            }
            Row::Text(mut line) => {
                self.flush_pending();
                line.indent(&" ".repeat(left));
                self.lines.push(line);
            }
        }
    }

    /// Blank lines owed before the next line, never at the top
    fn flush_pending(&mut self) {
        let blanks = std::mem::take(&mut self.pending);
        if !self.lines.is_empty() {
            self.lines.extend(std::iter::repeat_with(Line::default).take(blanks));
        }
    }

    fn attach(&mut self, append: bool, text: &str) {
        let attached = self
            .lines
            .iter_mut()
            .rev()
            .find(|l| l.anchor.is_some())
            .map(|l| l.attach(append, text))
            .unwrap_or(false);
        if !attached {
            tracing::debug!(text, "no anchor for anchored text");
        }
    }

    fn finish(self, crlf: bool) -> String {
        let eol = if crlf { "\r\n" } else { "\n" };
        let lines: Vec<&str> = self.lines.iter().map(|l| l.text.trim_end()).collect();
        let first = lines.iter().position(|l| !l.is_empty());
        let last = lines.iter().rposition(|l| !l.is_empty());
        let (Some(first), Some(last)) = (first, last) else {
            return String::new();
        };
        let mut out = String::new();
        for line in &lines[first..=last] {
            out.push_str(line);
            out.push_str(eol);
        }
        out
    }
}

/// Walks a schedule in dependency order and produces the output text
pub struct Renderer<'a> {
    schedule: &'a Schedule,
    crlf: bool,
    states: Vec<OutputState>,
    started: HashSet<ContextId>,
    /// Contexts fully rendered, kept after their states are purged
    finished: HashSet<ContextId>,
    trace: Vec<Event>,
    doc: Document,
}

impl<'a> Renderer<'a> {
    pub fn new(schedule: &'a Schedule, crlf: bool) -> Self {
        Self {
            schedule,
            crlf,
            states: Vec::new(),
            started: HashSet::new(),
            finished: HashSet::new(),
            trace: Vec::new(),
            doc: Document::default(),
        }
    }

    /// Order in which contexts started and finished
    pub fn trace(&self) -> &[Event] {
        &self.trace
    }

    pub fn render(mut self) -> (String, Vec<Event>) {
        let schedule = self.schedule;
        let Some(root) = schedule.root() else {
            return (String::new(), self.trace);
        };
        self.started.insert(root);
        self.trace.push(Event::Start(root));
        self.states.push(OutputState::new(root, schedule.context(root), None));

        loop {
            self.advance();
            if self.states.is_empty() {
                break;
            }
            if self.states.iter().all(OutputState::exhausted) {
                tracing::warn!(
                    waiting = self.states.len(),
                    "contexts left waiting on predecessors that never rendered"
                );
                break;
            }
            if self.states.len() == 1 {
                self.render_raw();
            } else {
                self.render_row();
            }
        }
        tracing::debug!(lines = self.doc.lines.len(), "rendered document");
        (self.doc.finish(self.crlf), self.trace)
    }

    /// Promote followers whose predecessors have all finished
    ///
    /// Each new state goes in front of its first exhausted predecessor in
    /// ring order. Exhausted states are purged once none of their followers
    /// is still waiting to start. Returns whether any state was added.
    fn advance(&mut self) -> bool {
        let schedule = self.schedule;
        let mut progressed = false;
        loop {
            for state in &self.states {
                if state.exhausted() && self.finished.insert(state.context) {
                    self.trace.push(Event::Finish(state.context));
                }
            }

            let mut ring = Vec::with_capacity(self.states.len());
            let mut spliced = false;
            for state in std::mem::take(&mut self.states) {
                if state.exhausted() {
                    for next in schedule.follows(state.context) {
                        if self.started.contains(&next)
                            || !schedule.precedes(next).iter().all(|p| self.finished.contains(p))
                        {
                            continue;
                        }
                        self.started.insert(next);
                        self.trace.push(Event::Start(next));
                        ring.push(OutputState::new(next, schedule.context(next), self.doc.prefix.clone()));
                        spliced = true;
                    }
                }
                ring.push(state);
            }

            let started = &self.started;
            ring.retain(|s| !(s.exhausted() && schedule.follows(s.context).iter().all(|c| started.contains(c))));
            self.states = ring;

            if !spliced {
                return progressed;
            }
            progressed = true;
        }
    }

    /// Stream the only active context into the document
    fn render_raw(&mut self) {
        let schedule = self.schedule;
        let Some(state) = self.states.first_mut() else {
            return;
        };
        let ctx = schedule.context(state.context);
        loop {
            while let Some(row) = state.breaker.rows.pop_front() {
                self.doc.push(row, ctx.left);
            }
            for (append, text) in state.breaker.orphans.drain(..) {
                self.doc.attach(append, &text);
            }
            if state.done {
                break;
            }
            state.step(ctx);
        }
        self.doc.prefix = state.breaker.prefix.clone();
    }

    /// One output row across every active context
    fn render_row(&mut self) {
        let schedule = self.schedule;
        loop {
            for state in &mut self.states {
                state.pump(schedule.context(state.context));
            }
            if !self.advance() {
                break;
            }
        }
        if self.states.len() < 2 || self.states.iter().all(OutputState::exhausted) {
            return;
        }

        let mut placed: Vec<(usize, String)> = Vec::new();
        for state in &mut self.states {
            let left = schedule.context(state.context).left;
            if let Some(line) = state.filled_line() {
                placed.push((left, line.text));
            }
            state.breaker.orphans.clear();
        }
        placed.sort_by_key(|(left, _)| *left);

        let mut text = String::new();
        let mut column = 0;
        for (left, piece) in placed {
            if left > column {
                text.push_str(&" ".repeat(left - column));
                column = left;
            }
            column += cell_width(&piece);
            text.push_str(&piece);
        }
        self.doc.push(Row::Text(Line { text, anchor: None }), 0);
    }
}

/// Render a schedule to text
pub fn render(schedule: &Schedule, crlf: bool) -> String {
    Renderer::new(schedule, crlf).render().0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(text: &str) -> Vec<Segment> {
        text.split_whitespace().map(|w| Segment::word(w, true)).collect()
    }

    fn single(width: usize, segments: Vec<Segment>) -> String {
        let mut schedule = Schedule::new();
        let root = schedule.add(OutputContext::new(0, width, Flush::Left));
        schedule.context_mut(root).extend(segments);
        render(&schedule, false)
    }

    #[test]
    fn test_empty_schedule_renders_nothing() {
        assert_eq!(render(&Schedule::new(), false), "");
        assert_eq!(single(72, Vec::new()), "");
    }

    #[test]
    fn test_words_wrap_at_width() {
        assert_eq!(single(10, words("aaa bbb ccc ddd")), "aaa bbb\nccc ddd\n");
    }

    #[test]
    fn test_long_chunks_are_cut() {
        assert_eq!(single(5, words("abcdefghijkl")), "abcde\nfghij\nkl\n");
    }

    #[test]
    fn test_unspaced_words_wrap_together() {
        let segments = vec![
            Segment::word("aaaa", true),
            Segment::word("bbb", true),
            Segment::word(".", false),
        ];
        assert_eq!(single(8, segments), "aaaa\nbbb.\n");
    }

    #[test]
    fn test_paragraph_spacing_collapses() {
        let mut segments = words("a");
        segments.push(Directive::ParagraphBreak.into());
        segments.push(Directive::ParagraphBreak.into());
        segments.extend(words("b"));
        segments.push(Directive::Skip(2).into());
        segments.extend(words("c"));
        segments.push(Directive::ParagraphBreak.into());
        assert_eq!(single(20, segments), "a\n\nb\n\n\nc\n");
    }

    #[test]
    fn test_raw_breaks_keep_every_break() {
        let mut segments = vec![Directive::RawBreaks.into()];
        segments.extend(words("a"));
        segments.push(Directive::ParagraphBreak.into());
        segments.push(Directive::ParagraphBreak.into());
        segments.extend(words("b"));
        assert_eq!(single(20, segments), "a\n\n\nb\n");
    }

    #[test]
    fn test_alignment_and_fill() {
        let mut segments = vec![Directive::AlignRight.into()];
        segments.extend(words("ab"));
        segments.push(Directive::LineBreak.into());
        segments.push(Directive::AlignCenter.into());
        segments.extend(words("cd"));
        segments.push(Directive::LineBreak.into());
        segments.push(Directive::AlignLeft.into());
        segments.push(Segment::word("Intro", false));
        segments.push(Directive::Fill('.').into());
        segments.push(Segment::word("3", false));
        assert_eq!(single(12, segments), "          ab\n     cd\nIntro......3\n");
    }

    #[test]
    fn test_underfill_prefix_and_tab() {
        let segments = vec![
            Directive::Underfill('=').into(),
            Segment::word("Title", false),
            Directive::LineBreak.into(),
            Directive::PrefixStart("> ".to_string()).into(),
            Segment::word("quoted", false),
            Directive::LineBreak.into(),
            Directive::PrefixEnd.into(),
            Segment::word("a", false),
            Directive::Tab.into(),
            Segment::word("b", true),
        ];
        assert_eq!(single(40, segments), "Title\n=====\n> quoted\na       b\n");
    }

    #[test]
    fn test_hard_space_keeps_words_together() {
        let segments = vec![
            Segment::word("aaa", false),
            Segment::word("bbb", true),
            Directive::HardSpace.into(),
            Segment::word("ccc", true),
        ];
        assert_eq!(single(8, segments), "aaa\nbbb ccc\n");
    }

    #[test]
    fn test_anchored_text_reaches_earlier_line() {
        let segments = vec![
            Directive::Anchor.into(),
            Segment::word("Title", false),
            Directive::LineBreak.into(),
            Segment::word("body", false),
            Directive::AnchorText {
                append: false,
                text: "*".to_string(),
            }
            .into(),
            Directive::AnchorText {
                append: true,
                text: "+".to_string(),
            }
            .into(),
        ];
        assert_eq!(single(20, segments), "*+Title\nbody\n");
    }

    #[test]
    fn test_anchor_in_current_line() {
        let segments = vec![
            Segment::word("see", false),
            Directive::Anchor.into(),
            Segment::word("here", true),
            Directive::AnchorText {
                append: false,
                text: "[1]".to_string(),
            }
            .into(),
        ];
        assert_eq!(single(20, segments), "see [1]here\n");
    }

    #[test]
    fn test_crlf_line_ends() {
        let mut schedule = Schedule::new();
        let root = schedule.add(OutputContext::new(0, 10, Flush::Left));
        let ctx = schedule.context_mut(root);
        ctx.extend(words("a"));
        ctx.push(Directive::LineBreak);
        ctx.extend(words("b"));
        assert_eq!(render(&schedule, true), "a\r\nb\r\n");
    }

    /// root, then two columns, joined again by `after`, then `last`
    fn fan_in(left: Vec<Segment>, right: Vec<Segment>) -> (Schedule, [ContextId; 5]) {
        let mut schedule = Schedule::new();
        let root = schedule.add(OutputContext::new(0, 20, Flush::Left));
        schedule.context_mut(root).extend(words("a"));
        let c1 = schedule.add(OutputContext::new(0, 10, Flush::Left));
        schedule.context_mut(c1).extend(left);
        let c2 = schedule.add(OutputContext::new(10, 20, Flush::Left));
        schedule.context_mut(c2).extend(right);
        let after = schedule.add(OutputContext::new(0, 20, Flush::Left));
        schedule.context_mut(after).extend(words("d"));
        let last = schedule.add(OutputContext::new(2, 20, Flush::Left));
        schedule.context_mut(last).extend(words("e"));
        schedule.link(root, c1);
        schedule.link(root, c2);
        schedule.link(c1, after);
        schedule.link(c2, after);
        schedule.link(after, last);
        (schedule, [root, c1, c2, after, last])
    }

    fn assert_topological(schedule: &Schedule, trace: &[Event]) {
        for relation in schedule.relations() {
            let finish = trace.iter().position(|e| *e == Event::Finish(relation.source));
            let start = trace.iter().position(|e| *e == Event::Start(relation.target));
            match (finish, start) {
                (Some(finish), Some(start)) => assert!(finish < start, "{:?}", relation),
                other => panic!("{:?} never ran: {:?}", relation, other),
            }
        }
    }

    #[test]
    fn test_columns_render_side_by_side() {
        let (schedule, _) = fan_in(words("b"), words("c"));
        let (text, trace) = Renderer::new(&schedule, false).render();
        assert_eq!(text, "a\nb         c\nd\n  e\n");
        assert_topological(&schedule, &trace);
    }

    #[test]
    fn test_fan_in_waits_for_the_longest_column() {
        let mut left = words("b1");
        left.push(Directive::LineBreak.into());
        left.extend(words("b2"));
        let (schedule, [_, c1, c2, after, _]) = fan_in(left, words("c"));
        let (text, trace) = Renderer::new(&schedule, false).render();
        assert_eq!(text, "a\nb1        c\nb2\nd\n  e\n");
        assert_topological(&schedule, &trace);

        let finish_c2 = trace.iter().position(|e| *e == Event::Finish(c2));
        let finish_c1 = trace.iter().position(|e| *e == Event::Finish(c1));
        let start_after = trace.iter().position(|e| *e == Event::Start(after));
        assert!(finish_c2 < finish_c1);
        assert!(finish_c1 < start_after);
    }

    #[test]
    fn test_column_blank_rows_inside_only() {
        let mut left = vec![Directive::Skip(1).into()];
        left.extend(words("x"));
        left.push(Directive::ParagraphBreak.into());
        left.extend(words("y"));
        left.push(Directive::Skip(3).into());
        let (schedule, _) = fan_in(left, words("c"));
        let text = render(&schedule, false);
        assert_eq!(text, "a\nx         c\n\ny\nd\n  e\n");
    }
}
