//! Layout scheduling: gem tree to a graph of output contexts
//!
//! Plain runs of gems are pulled into the current [`OutputContext`] as
//! segments. Every structural gem fans out into contexts of its own, linked
//! from the context it interrupts, and converges on a single follow context
//! that picks up the remaining siblings.

use crate::error::{Diagnostics, Location, Result};
use crate::filter::{run, run_text, Category, FilterInput, FilterVars, FormatProgram, Piece};
use crate::gem::{Flush, GemTree, GemType, Measure};
use crate::rules::RuleSet;
use crate::segment::{line_width, Directive, Segment};
use crate::selector::ordinal;
use crate::tree::NodeId;
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ContextId(usize);

impl ContextId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Position of a context's cursor in the gem tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Enter(NodeId),
    Leave(NodeId),
}

/// A rectangular output region and the segments laid out into it
#[derive(Debug, Clone, Serialize)]
pub struct OutputContext {
    pub left: usize,
    pub right: usize,
    pub align: Flush,
    /// First-line indent of every paragraph
    pub indent: usize,
    segments: Vec<Segment>,
    #[serde(skip)]
    top: Option<NodeId>,
    #[serde(skip)]
    pos: Option<Step>,
}

impl OutputContext {
    pub fn new(left: usize, right: usize, align: Flush) -> Self {
        Self {
            left,
            right: right.max(left),
            align,
            indent: 0,
            segments: Vec::new(),
            top: None,
            pos: None,
        }
    }

    pub fn width(&self) -> usize {
        self.right - self.left
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn push(&mut self, segment: impl Into<Segment>) {
        self.segments.push(segment.into());
    }

    pub fn extend(&mut self, segments: impl IntoIterator<Item = Segment>) {
        self.segments.extend(segments);
    }

    /// Start pulling the children of `top`
    pub fn bind(&mut self, top: NodeId) {
        self.top = Some(top);
        self.pos = None;
    }

    /// Continue pulling the children of `top` after `pos`
    pub fn resume(&mut self, top: Option<NodeId>, pos: Option<Step>) {
        self.top = top;
        self.pos = pos;
    }

    /// Depth-first walk below `top`; structural gems are left without
    /// descending, since they lay out their own children
    pub fn next_pos(&mut self, tree: &GemTree) -> Option<Step> {
        let top = self.top?;
        let next = match self.pos {
            None => Step::Enter(tree.first_child(top)?),
            Some(Step::Enter(id)) => match tree.first_child(id) {
                Some(child) if !tree.get(id).is_structural() => Step::Enter(child),
                _ => Step::Leave(id),
            },
            Some(Step::Leave(id)) => {
                if id == top {
                    return None;
                }
                match tree.next_sibling(id) {
                    Some(sibling) => Step::Enter(sibling),
                    None => match tree.parent(id) {
                        Some(parent) if parent != top => Step::Leave(parent),
                        _ => return None,
                    },
                }
            }
        };
        self.pos = Some(next);
        Some(next)
    }
}

/// `target` renders only once `source` is fully rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextRelation {
    pub source: ContextId,
    pub target: ContextId,
}

/// Every context of a document and the relations between them
#[derive(Debug, Clone, Default, Serialize)]
pub struct Schedule {
    contexts: Vec<OutputContext>,
    relations: Vec<ContextRelation>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, context: OutputContext) -> ContextId {
        self.contexts.push(context);
        ContextId(self.contexts.len() - 1)
    }

    /// The first context added, where rendering starts
    pub fn root(&self) -> Option<ContextId> {
        (!self.contexts.is_empty()).then_some(ContextId(0))
    }

    pub fn context(&self, id: ContextId) -> &OutputContext {
        &self.contexts[id.0]
    }

    pub fn context_mut(&mut self, id: ContextId) -> &mut OutputContext {
        &mut self.contexts[id.0]
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn relations(&self) -> &[ContextRelation] {
        &self.relations
    }

    pub fn link(&mut self, source: ContextId, target: ContextId) {
        let relation = ContextRelation { source, target };
        if !self.relations.contains(&relation) {
            self.relations.push(relation);
        }
    }

    /// Contexts that wait for `id`, in link order
    pub fn follows(&self, id: ContextId) -> Vec<ContextId> {
        self.relations
            .iter()
            .filter(|r| r.source == id)
            .map(|r| r.target)
            .collect()
    }

    /// Contexts `id` waits for
    pub fn precedes(&self, id: ContextId) -> Vec<ContextId> {
        self.relations
            .iter()
            .filter(|r| r.target == id)
            .map(|r| r.source)
            .collect()
    }

    pub fn clear(&mut self) {
        self.contexts.clear();
        self.relations.clear();
    }
}

fn resolve_flush(flush: Flush, inherited: Flush) -> Flush {
    match flush {
        Flush::Inherit => inherited,
        own => own,
    }
}

/// Builds the schedule for one gem tree
pub struct Layout<'a> {
    tree: &'a GemTree,
    rules: &'a RuleSet,
    diagnostics: &'a mut Diagnostics,
    schedule: Schedule,
    vars: FilterVars,
    programs: HashMap<String, FormatProgram>,
    /// The next word continues the one a container prefix just emitted
    glue: bool,
}

impl<'a> Layout<'a> {
    pub fn new(tree: &'a GemTree, rules: &'a RuleSet, diagnostics: &'a mut Diagnostics) -> Self {
        Self {
            tree,
            rules,
            diagnostics,
            schedule: Schedule::new(),
            vars: FilterVars::default(),
            programs: HashMap::new(),
            glue: false,
        }
    }

    /// Lay out the whole tree on a page `width` cells wide
    pub fn run(mut self, width: usize) -> Result<Schedule> {
        let root = self.schedule.add(OutputContext::new(0, width, Flush::Left));
        let end = self.fill(root, self.tree.root())?;
        tracing::debug!(
            contexts = self.schedule.len(),
            relations = self.schedule.relations().len(),
            last = end.index(),
            "laid out document"
        );
        Ok(self.schedule)
    }

    /// Pull the children of `top` into `ctx`; returns the context the run ended in
    pub fn fill(&mut self, ctx: ContextId, top: NodeId) -> Result<ContextId> {
        let tree = self.tree;
        let mut current = ctx;
        self.schedule.context_mut(current).bind(top);

        while let Some(step) = self.schedule.context_mut(current).next_pos(tree) {
            match step {
                Step::Enter(id) => {
                    let gem = tree.get(id);
                    if gem.is_structural() {
                        let follow = self.process(current, id)?;
                        self.schedule.context_mut(follow).resume(Some(top), Some(step));
                        current = follow;
                    } else if gem.is_break() {
                        self.glue = false;
                        self.schedule.context_mut(current).push(Directive::ParagraphBreak);
                    } else if gem.is_line_break() {
                        self.glue = false;
                        self.schedule.context_mut(current).push(Directive::LineBreak);
                    } else if gem.is_marker() {
                        continue;
                    } else if gem.get_text().is_empty() {
                        let spaced = tree
                            .first_child(id)
                            .map(|c| tree.get(c).spaced())
                            .unwrap_or(false);
                        let pre = self.decoration(id, Category::Pre, spaced);
                        self.glue = pre.iter().any(|s| matches!(s, Segment::Word { .. }));
                        self.schedule.context_mut(current).extend(pre);
                    } else {
                        let segments = self.text_segments(id)?;
                        self.schedule.context_mut(current).extend(segments);
                    }
                }
                Step::Leave(id) => {
                    let gem = tree.get(id);
                    if !gem.is_structural() && !gem.is_control() && gem.get_text().is_empty() {
                        let post = self.decoration(id, Category::Post, false);
                        self.schedule.context_mut(current).extend(post);
                    }
                }
            }
        }
        Ok(current)
    }

    /// Dispatch a structural gem; returns its follow context
    fn process(&mut self, host: ContextId, id: NodeId) -> Result<ContextId> {
        self.glue = false;
        match self.tree.get(id).ty() {
            GemType::Title(_) => self.process_title(host, id),
            GemType::Indent => self.process_indent(host, id),
            GemType::List => self.process_list(host, id),
            GemType::DefList => self.process_dlist(host, id),
            GemType::Table => self.process_table(host, id),
            GemType::Contents => self.process_contents(host, id),
            GemType::Plain => Ok(host),
        }
    }

    fn program(&mut self, filter: &str) -> Result<&FormatProgram> {
        if !self.programs.contains_key(filter) {
            // Already validated when the filter was applied
            let program = FormatProgram::compile(filter, &Location::default(), self.diagnostics)?;
            self.programs.insert(filter.to_string(), program);
        }
        Ok(&self.programs[filter])
    }

    /// A text gem through its class filters and the format rules matching it
    fn text_segments(&mut self, id: NodeId) -> Result<Vec<Segment>> {
        let tree = self.tree;
        let rules = self.rules;
        let gem = tree.get(id);
        let ordinal = ordinal(tree, id);

        let mut text = gem.get_text().to_string();
        for filter in &gem.class().filters {
            let Some(main) = self.program(filter)?.get(Category::Main).map(<[Piece]>::to_vec) else {
                continue;
            };
            let input = FilterInput {
                text: &text,
                ordinal,
                spaced: false,
            };
            text = run_text(&main, &input, &mut self.vars);
        }

        let glue = std::mem::take(&mut self.glue);
        let spaced = gem.spaced() && !glue;
        let format = rules.format(tree, id);
        let input = FilterInput {
            text: &text,
            ordinal,
            spaced,
        };
        let mut out = Vec::new();
        if let Some(pre) = format.get(Category::Pre) {
            out.extend(run(pre, &input, &mut self.vars));
        }
        let glued = out.iter().any(|s| matches!(s, Segment::Word { .. }));
        let plain = [Piece::Input];
        let main = format.get(Category::Main).unwrap_or(&plain);
        out.extend(run(
            main,
            &FilterInput {
                spaced: spaced && !glued,
                ..input
            },
            &mut self.vars,
        ));
        if let Some(post) = format.get(Category::Post) {
            out.extend(run(post, &FilterInput { spaced: false, ..input }, &mut self.vars));
        }
        for (category, append) in [(Category::AnchorPrepend, false), (Category::AnchorAppend, true)] {
            if let Some(pieces) = format.get(category) {
                let text = run_text(pieces, &input, &mut self.vars);
                if !text.is_empty() {
                    out.push(Directive::AnchorText { append, text }.into());
                }
            }
        }
        Ok(out)
    }

    /// Pre or post segment of a container's format, run on empty input
    fn decoration(&mut self, id: NodeId, category: Category, spaced: bool) -> Vec<Segment> {
        let tree = self.tree;
        let format = self.rules.format(tree, id);
        match format.get(category) {
            Some(pieces) => {
                let input = FilterInput {
                    text: "",
                    ordinal: ordinal(tree, id),
                    spaced,
                };
                run(pieces, &input, &mut self.vars)
            }
            None => Vec::new(),
        }
    }

    /// New context linked from every one of `from`
    fn branch(&mut self, from: &[ContextId], left: usize, right: usize, align: Flush) -> ContextId {
        let ctx = self.schedule.add(OutputContext::new(left, right, align));
        for &source in from {
            self.schedule.link(source, ctx);
        }
        ctx
    }

    /// Context with the host's geometry continuing after `ends`
    fn follow(&mut self, host: ContextId, ends: &[ContextId], below: usize) -> ContextId {
        let (left, right, align, indent) = self.geometry(host);
        let ctx = self.branch(ends, left, right, align);
        let context = self.schedule.context_mut(ctx);
        context.indent = indent;
        context.push(Directive::Skip(below));
        ctx
    }

    fn geometry(&self, ctx: ContextId) -> (usize, usize, Flush, usize) {
        let c = self.schedule.context(ctx);
        (c.left, c.right, c.align, c.indent)
    }

    /// Host span narrowed by the measure's margins
    fn margins(&self, host: ContextId, m: &Measure) -> (usize, usize) {
        let (left, right, _, _) = self.geometry(host);
        let inner_left = (left + m.left).min(right);
        let inner_right = right.saturating_sub(m.right).max(inner_left);
        (inner_left, inner_right)
    }

    fn measure(&mut self, host: ContextId, id: NodeId) -> Measure {
        let m = self.rules.length(self.tree, id);
        self.schedule.context_mut(host).push(Directive::Skip(m.above));
        m
    }

    fn align_of(&self, host: ContextId, id: NodeId) -> Flush {
        resolve_flush(self.tree.get(id).flush(), self.schedule.context(host).align)
    }

    /// Counter column beside the title text, then a follow context
    fn process_title(&mut self, host: ContextId, id: NodeId) -> Result<ContextId> {
        let tree = self.tree;
        let m = self.measure(host, id);
        let (left, right, _, _) = self.geometry(host);
        let align = self.align_of(host, id);

        let counter = match tree.child(id, 0) {
            Some(c) if !tree.get(c).is_marker() && !tree.get(c).get_text().is_empty() => self.text_segments(c)?,
            _ => Vec::new(),
        };

        let mut ends = Vec::new();
        let text_left = if counter.is_empty() {
            left
        } else {
            let column = (left + line_width(&counter) + m.spacing).min(right);
            let ctx = self.branch(&[host], left, column, Flush::Left);
            self.schedule.context_mut(ctx).extend(counter);
            ends.push(ctx);
            column
        };

        let text = self.branch(&[host], text_left, right, align);
        let pre = self.decoration(id, Category::Pre, false);
        self.glue = pre.iter().any(|s| matches!(s, Segment::Word { .. }));
        self.schedule.context_mut(text).extend(pre);
        let end = match tree.child(id, 1) {
            Some(body) => self.fill(text, body)?,
            None => text,
        };
        let post = self.decoration(id, Category::Post, false);
        self.schedule.context_mut(end).extend(post);
        ends.push(end);

        Ok(self.follow(host, &ends, m.below))
    }

    /// A single narrower region
    fn process_indent(&mut self, host: ContextId, id: NodeId) -> Result<ContextId> {
        let m = self.measure(host, id);
        let (left, right) = self.margins(host, &m);
        let align = self.align_of(host, id);
        let inner = self.branch(&[host], left, right, align);
        self.schedule.context_mut(inner).indent = m.indent;
        let end = self.fill(inner, id)?;
        Ok(self.follow(host, &[end], m.below))
    }

    fn items(&self, id: NodeId) -> Vec<NodeId> {
        self.tree
            .children(id)
            .iter()
            .copied()
            .filter(|&c| !self.tree.get(c).is_control())
            .collect()
    }

    /// Bullet column and text column per item, each item after the previous
    fn process_list(&mut self, host: ContextId, id: NodeId) -> Result<ContextId> {
        let m = self.measure(host, id);
        let (left, right) = self.margins(host, &m);
        let align = self.align_of(host, id);
        let items = self.items(id);

        let bullets: Vec<Vec<Segment>> = items
            .iter()
            .map(|&item| self.decoration(item, Category::Pre, false))
            .collect();
        let widest = bullets.iter().map(|b| line_width(b)).max().unwrap_or(0);
        let column = (left + widest + m.spacing).min(right);

        let mut ends = vec![host];
        for (item, bullet) in items.into_iter().zip(bullets) {
            let mark = self.branch(&ends, left, column, Flush::Left);
            self.schedule.context_mut(mark).extend(bullet);
            let text = self.branch(&ends, column, right, align);
            let end = self.fill(text, item)?;
            ends = vec![mark, end];
        }
        Ok(self.follow(host, &ends, m.below))
    }

    /// Like a list, with each item's term laid out as its bullet
    fn process_dlist(&mut self, host: ContextId, id: NodeId) -> Result<ContextId> {
        let tree = self.tree;
        let m = self.measure(host, id);
        let (left, right) = self.margins(host, &m);
        let align = self.align_of(host, id);
        let half = left + (right - left) / 2;

        let mut terms = Vec::new();
        let mut term_contexts = Vec::new();
        for item in self.items(id) {
            let term = self.schedule.add(OutputContext::new(left, half, Flush::Left));
            let end = match tree.child(item, 0) {
                Some(t) => self.fill(term, t)?,
                None => term,
            };
            // Every context made while filling the term
            term_contexts.extend((term.index()..self.schedule.len()).map(ContextId));
            terms.push((item, term, end));
        }
        let widest = terms
            .iter()
            .map(|&(_, term, _)| line_width(self.schedule.context(term).segments()))
            .max()
            .unwrap_or(0);
        let column = (left + widest + m.spacing).min(half.max(left + 1)).min(right);

        for ctx in term_contexts {
            let context = self.schedule.context_mut(ctx);
            context.right = context.right.min(column);
            context.left = context.left.min(context.right);
        }

        let mut ends = vec![host];
        for (item, term, term_end) in terms {
            for &source in &ends {
                self.schedule.link(source, term);
            }
            let text = self.branch(&ends, column, right, align);
            let end = match tree.child(item, 1) {
                Some(definition) => self.fill(text, definition)?,
                None => text,
            };
            ends = vec![term_end, end];
        }
        Ok(self.follow(host, &ends, m.below))
    }

    /// Rows of cells at proportional edges; each row waits for the previous one
    fn process_table(&mut self, host: ContextId, id: NodeId) -> Result<ContextId> {
        let tree = self.tree;
        let m = self.measure(host, id);
        let (left, right) = self.margins(host, &m);
        let align = self.align_of(host, id);
        let avail = right - left;
        let total = tree.get(id).width();
        let edge = |cum: usize| {
            let scaled = (avail as u128 * cum as u128 + total as u128 / 2) / total.max(1) as u128;
            left + usize::try_from(scaled).unwrap_or(avail).min(avail)
        };

        let mut ends = vec![host];
        for row in self.items(id) {
            let mut row_ends = Vec::new();
            let mut cum = 0;
            for cell in self.items(row) {
                let width = tree.get(cell).width();
                if width == 0 || total == 0 {
                    continue;
                }
                let start = edge(cum);
                cum = cum.saturating_add(width);
                let end = edge(cum).saturating_sub(m.spacing).max(start);
                let ctx = self.branch(&ends, start, end, align);
                row_ends.push(self.fill(ctx, cell)?);
            }
            if !row_ends.is_empty() {
                ends = row_ends;
            }
        }
        Ok(self.follow(host, &ends, m.below))
    }

    /// One line per title in the level range, indented by level
    fn process_contents(&mut self, host: ContextId, id: NodeId) -> Result<ContextId> {
        let tree = self.tree;
        let m = self.measure(host, id);
        let (left, right, align, _) = self.geometry(host);

        let mut range = tree
            .children(id)
            .iter()
            .filter(|&&c| tree.get(c).is_marker())
            .filter_map(|&c| tree.get(c).get_text().parse::<u8>().ok());
        let min = range.next().unwrap_or(1);
        let max = range.next().unwrap_or(7);

        let titles: Vec<(NodeId, u8)> = tree
            .descendants(tree.root())
            .into_iter()
            .filter_map(|n| tree.get(n).ty().title_level().map(|level| (n, level)))
            .filter(|(_, level)| (min..=max).contains(level))
            .collect();

        let mut previous = host;
        for (title, level) in titles {
            let indent = usize::from(level - min) * m.indent;
            let ctx = self.branch(&[previous], (left + indent).min(right), right, align);
            if let Some(counter) = tree.child(title, 0) {
                let gem = tree.get(counter);
                if !gem.is_marker() && !gem.get_text().is_empty() {
                    let segments = self.text_segments(counter)?;
                    let context = self.schedule.context_mut(ctx);
                    context.extend(segments);
                    context.push(Directive::HardSpace);
                }
            }
            previous = match tree.child(title, 1) {
                Some(body) => self.fill(ctx, body)?,
                None => ctx,
            };
            self.schedule.context_mut(previous).push(Directive::LineBreak);
        }
        Ok(self.follow(host, &[previous], m.below))
    }
}
