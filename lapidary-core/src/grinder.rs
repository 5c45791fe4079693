//! Grinding: command tree to gem tree
//!
//! Each command is interpreted by its rule kind. Independent commands get a
//! gem of their own, style commands only change the class their arguments
//! are ground under. `@format` and `@length` register rules as they are met,
//! so rules apply to the whole document regardless of position.

use crate::commands::{CommandKind, RuleFlags};
use crate::error::{Diagnostics, Result};
use crate::filter::FormatProgram;
use crate::gem::{polish, Gem, GemClass, GemTree, GemType, Length, Style};
use crate::rules::RuleSet;
use crate::selector::Selector;
use crate::shard::{Command, MacroTable, Shard, ShardTree};
use crate::tree::NodeId;

/// Number of title levels
pub const LEVELS: usize = 7;

/// Largest relative column width accepted by `@table`
pub const MAX_COLUMN_WIDTH: usize = 10_000;

pub struct Grinder<'a> {
    shards: &'a ShardTree,
    macros: &'a MacroTable,
    gems: &'a mut GemTree,
    rules: &'a mut RuleSet,
    diagnostics: &'a mut Diagnostics,
    counters: [usize; LEVELS],
    /// Macro call commands, innermost last
    calls: Vec<NodeId>,
    pending_space: bool,
}

/// Class for text ground under `class`
fn inline(class: &GemClass) -> GemClass {
    GemClass {
        ty: GemType::Plain,
        unstyle: Style::NONE,
        length: None,
        ..class.clone()
    }
}

impl<'a> Grinder<'a> {
    pub fn new(
        shards: &'a ShardTree,
        macros: &'a MacroTable,
        gems: &'a mut GemTree,
        rules: &'a mut RuleSet,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            shards,
            macros,
            gems,
            rules,
            diagnostics,
            counters: [0; LEVELS],
            calls: Vec::new(),
            pending_space: false,
        }
    }

    /// Grind the shard tree into the root gem, then polish the result
    pub fn grind(&mut self) -> Result<()> {
        let root = self.gems.root();
        let class = self.gems.get(root).class().clone();
        self.grind_shard(self.shards.root(), root, &class)?;
        polish(self.gems, root);
        Ok(())
    }

    pub fn grind_shard(&mut self, shard: NodeId, parent: NodeId, class: &GemClass) -> Result<()> {
        let shards = self.shards;
        match shards.get(shard) {
            Shard::Statement | Shard::Block => {
                for &child in shards.children(shard) {
                    self.grind_shard(child, parent, class)?;
                }
            }
            Shard::Token(token) => {
                let spaced = token.spaced || std::mem::take(&mut self.pending_space);
                self.gems
                    .append(parent, Gem::text(token.unescape(), inline(class), spaced));
            }
            Shard::Break => {
                self.pending_space = false;
                self.gems.append(parent, Gem::paragraph_break(inline(class)));
            }
            Shard::Command(command) => self.grind_command(shard, command, parent, class)?,
        }
        Ok(())
    }

    fn grind_command(&mut self, node: NodeId, cmd: &Command, parent: NodeId, class: &GemClass) -> Result<()> {
        if cmd.spaced {
            self.pending_space = true;
        }
        self.leading_break(cmd, parent, class);

        let combined = cmd.class.over(class);
        match cmd.rule.kind {
            CommandKind::Region => {
                let gem = self.gems.append(parent, Gem::container(combined.clone()));
                self.grind_args(node, gem, &combined)?;
            }
            CommandKind::Counter(level) => return self.grind_title(node, cmd, parent, class, level),
            CommandKind::List => self.grind_list(node, parent, &combined, false)?,
            CommandKind::DefList => self.grind_list(node, parent, &combined, true)?,
            CommandKind::Table => self.grind_table(node, cmd, parent, &combined)?,
            CommandKind::Apply => {
                let mut filtered = combined;
                if let Some(format) = self.arg_raw(node, 0) {
                    // Compiled here only to report malformed filters early
                    FormatProgram::compile(&format, &cmd.location(), self.diagnostics)?;
                    filtered.filters.push(format);
                }
                if let Some(body) = self.arg(node, 1) {
                    self.grind_shard(body, parent, &filtered)?;
                }
            }
            CommandKind::Set => {
                let mut measured = combined;
                let (length, unknown) = Length::parse(self.arg_words(node, 0).iter().map(String::as_str));
                self.warn_unknown(cmd, "length", &unknown);
                measured.length = Some(length);
                let gem = self.gems.append(parent, Gem::container(measured.clone()));
                if let Some(body) = self.arg(node, 1) {
                    self.grind_shard(body, gem, &measured)?;
                }
            }
            CommandKind::Format => self.register_format(node, cmd)?,
            CommandKind::Length => self.register_length(node, cmd)?,
            CommandKind::Contents => {
                let words = self.arg_words(node, 0);
                let level = |i: usize, default: usize| {
                    words
                        .get(i)
                        .and_then(|w| w.parse::<usize>().ok())
                        .map(|l| l.clamp(1, LEVELS))
                        .unwrap_or(default)
                };
                let (min, max) = (level(0, 1), level(1, LEVELS));
                let gem = self.gems.append(parent, Gem::container(combined.clone()));
                self.gems.append(gem, Gem::marker(min.to_string(), inline(&combined)));
                self.gems.append(gem, Gem::marker(max.to_string(), inline(&combined)));
            }
            CommandKind::Arg => self.grind_arg(node, parent, class, false)?,
            CommandKind::RArg => self.grind_arg(node, parent, class, true)?,
            // Emitted by the leading break
            CommandKind::LineBreak => {}
            CommandKind::MacroCall => self.grind_macro(node, cmd, parent, &combined)?,
            _ => self.grind_args(node, parent, &combined)?,
        }

        self.trailing_break(cmd, parent, class);
        Ok(())
    }

    fn leading_break(&mut self, cmd: &Command, parent: NodeId, class: &GemClass) {
        if cmd.rule.has(RuleFlags::BREAKING) {
            self.gems.append(parent, Gem::paragraph_break(inline(class)));
        } else if cmd.rule.has(RuleFlags::LINE_BREAKING) {
            self.gems.append(parent, Gem::line_break(inline(class)));
        }
    }

    fn trailing_break(&mut self, cmd: &Command, parent: NodeId, class: &GemClass) {
        if cmd.rule.has(RuleFlags::POST_BREAKING) {
            self.pending_space = false;
            self.leading_break(cmd, parent, class);
        }
    }

    fn grind_args(&mut self, node: NodeId, parent: NodeId, class: &GemClass) -> Result<()> {
        let shards = self.shards;
        for &arg in shards.children(node) {
            self.grind_shard(arg, parent, class)?;
        }
        Ok(())
    }

    fn arg(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.shards.child(node, index)
    }

    /// Escaped text of a verbatim argument
    fn arg_raw(&self, node: NodeId, index: usize) -> Option<String> {
        match self.shards.get(self.arg(node, index)?) {
            Shard::Token(token) => Some(token.text.clone()),
            _ => None,
        }
    }

    /// Unescaped words of an argument
    fn arg_words(&self, node: NodeId, index: usize) -> Vec<String> {
        let Some(arg) = self.arg(node, index) else {
            return Vec::new();
        };
        self.shards
            .descendants(arg)
            .into_iter()
            .filter_map(|n| match self.shards.get(n) {
                Shard::Token(token) => Some(token.unescape()),
                _ => None,
            })
            .collect()
    }

    fn warn_unknown(&mut self, cmd: &Command, what: &str, unknown: &[String]) {
        for word in unknown {
            self.diagnostics
                .warn(cmd.location(), format!("ignoring '{}' in {} of '@{}'", word, what, cmd.name));
        }
    }

    fn selector(&mut self, node: NodeId, cmd: &Command) -> Result<Selector> {
        let text = self.arg_raw(node, 0).map(|t| crate::source::unescape(&t)).unwrap_or_default();
        Selector::compile(&text, &cmd.location(), self.diagnostics)
    }

    /// `@format{selectors}{format}`
    fn register_format(&mut self, node: NodeId, cmd: &Command) -> Result<()> {
        let selector = self.selector(node, cmd)?;
        let format = self.arg_raw(node, 1).unwrap_or_default();
        let program = FormatProgram::compile(&format, &cmd.location(), self.diagnostics)?;
        self.rules.add_format(selector, program);
        Ok(())
    }

    /// `@length{selectors}{spec}`
    fn register_length(&mut self, node: NodeId, cmd: &Command) -> Result<()> {
        let selector = self.selector(node, cmd)?;
        let words = self.arg_words(node, 1);
        let (length, unknown) = Length::parse(words.iter().map(String::as_str));
        self.warn_unknown(cmd, "length", &unknown);
        self.rules.add_length(selector, length);
        Ok(())
    }

    /// Dotted counter path after bumping `level`
    fn next_counter(&mut self, level: usize) -> String {
        self.counters[level - 1] += 1;
        for deeper in &mut self.counters[level..] {
            *deeper = 0;
        }
        if level == 1 {
            return self.counters[0].to_string();
        }
        let path = &self.counters[1..level];
        let first = path.iter().position(|&c| c != 0).unwrap_or(path.len() - 1);
        path[first..]
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Title gem with [counter, body]; the second argument follows in the parent
    fn grind_title(&mut self, node: NodeId, cmd: &Command, parent: NodeId, class: &GemClass, level: u8) -> Result<()> {
        let combined = cmd.class.over(class);
        let text_class = inline(&combined);
        let title = self.gems.append(parent, Gem::container(combined.clone()));

        if combined.style.contains(Style::NUMBER) {
            let counter = self.next_counter(usize::from(level));
            self.gems.append(title, Gem::text(counter, text_class.clone(), false));
        } else {
            self.gems.append(title, Gem::marker("", text_class.clone()));
        }

        let body = self.gems.append(title, Gem::container(text_class.clone()));
        self.pending_space = false;
        if let Some(arg) = self.arg(node, 0) {
            self.grind_shard(arg, body, &text_class)?;
        }

        self.trailing_break(cmd, parent, class);
        if let Some(arg) = self.arg(node, 1) {
            self.grind_shard(arg, parent, class)?;
        }
        Ok(())
    }

    /// Top-level `@item` commands of the list argument and what follows them
    fn items(&self, node: NodeId) -> Vec<(NodeId, Vec<NodeId>)> {
        let Some(arg) = self.arg(node, 0) else {
            return Vec::new();
        };
        let mut items: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        for &child in self.shards.children(arg) {
            let is_item = matches!(
                self.shards.get(child),
                Shard::Command(c) if c.rule.kind == CommandKind::Item
            );
            if is_item {
                items.push((child, Vec::new()));
            } else if let Some((_, rest)) = items.last_mut() {
                rest.push(child);
            }
            // Content before the first item is dropped
        }
        items
    }

    fn grind_list(&mut self, node: NodeId, parent: NodeId, combined: &GemClass, definitions: bool) -> Result<()> {
        let list = self.gems.append(parent, Gem::container(combined.clone()));
        let item_class = inline(combined);

        for (item, rest) in self.items(node) {
            let gem = self.gems.append(list, Gem::container(item_class.clone()));
            self.pending_space = false;
            let (head, body) = if definitions {
                let term = self.gems.append(gem, Gem::container(item_class.clone()));
                let definition = self.gems.append(gem, Gem::container(item_class.clone()));
                (term, definition)
            } else {
                (gem, gem)
            };
            if let Some(arg) = self.arg(item, 0) {
                self.grind_shard(arg, head, &item_class)?;
            }
            self.pending_space = false;
            for shard in rest {
                self.grind_shard(shard, body, &item_class)?;
            }
        }
        Ok(())
    }

    fn grind_table(&mut self, node: NodeId, cmd: &Command, parent: NodeId, combined: &GemClass) -> Result<()> {
        let mut widths = Vec::new();
        for word in self.arg_words(node, 0) {
            match word.parse::<usize>() {
                Ok(width) if width > MAX_COLUMN_WIDTH => {
                    self.diagnostics.warn(
                        cmd.location(),
                        format!("column width '{}' clamped to {}", word, MAX_COLUMN_WIDTH),
                    );
                    widths.push(MAX_COLUMN_WIDTH);
                }
                Ok(width) => widths.push(width),
                Err(_) => self
                    .diagnostics
                    .warn(cmd.location(), format!("ignoring column width '{}'", word)),
            }
        }
        let total = widths.iter().fold(0usize, |sum, &w| sum.saturating_add(w));
        let table = self.gems.append(parent, Gem::container(combined.clone()).with_width(total));
        let Some(body) = self.arg(node, 1) else {
            return Ok(());
        };
        let shards = self.shards;
        for &child in shards.children(body) {
            if let Shard::Command(row) = shards.get(child) {
                if row.rule.kind == CommandKind::Row {
                    self.grind_row(child, row, table, combined, &widths)?;
                }
            }
        }
        Ok(())
    }

    fn grind_row(&mut self, node: NodeId, cmd: &Command, table: NodeId, combined: &GemClass, widths: &[usize]) -> Result<()> {
        let class = inline(combined);
        let row = self.gems.append(table, Gem::container(class.clone()));
        let Some(content) = self.arg(node, 0) else {
            return Ok(());
        };
        let mut column = 0;
        let mut cell = None;

        let shards = self.shards;
        for &child in shards.children(content) {
            let span = match shards.get(child) {
                Shard::Command(c) if c.rule.kind == CommandKind::Tab => Some(1),
                Shard::Command(c) if c.rule.kind == CommandKind::Span => Some(
                    self.arg_words(child, 0)
                        .first()
                        .and_then(|w| w.parse::<usize>().ok())
                        .unwrap_or(1)
                        .max(1),
                ),
                _ => None,
            };
            let current = match (span, cell) {
                (None, Some(gem)) => gem,
                (span, _) => {
                    let columns = span.unwrap_or(1);
                    let width = if column < widths.len() {
                        widths[column..column.saturating_add(columns).min(widths.len())]
                            .iter()
                            .fold(0usize, |sum, &w| sum.saturating_add(w))
                    } else {
                        self.diagnostics
                            .warn(cmd.location(), "table cell beyond the column widths is not laid out");
                        0
                    };
                    column = column.saturating_add(columns);
                    self.pending_space = false;
                    let gem = self.gems.append(row, Gem::container(class.clone()).with_width(width));
                    cell = Some(gem);
                    if span.is_some() {
                        continue;
                    }
                    gem
                }
            };
            self.grind_shard(child, current, &class)?;
        }
        Ok(())
    }

    /// `@arg{n}` / `@rarg{n}` resolved against the innermost caller
    fn grind_arg(&mut self, node: NodeId, parent: NodeId, class: &GemClass, reverse: bool) -> Result<()> {
        let n: i64 = self
            .arg_words(node, 0)
            .first()
            .and_then(|w| w.parse().ok())
            .unwrap_or(1);
        let Some(caller) = self.calls.pop() else {
            return Ok(());
        };
        let shards = self.shards;
        let args = shards.children(caller);
        let index = if reverse || n < 0 {
            args.len().checked_sub(n.unsigned_abs() as usize)
        } else {
            (n as usize).checked_sub(1)
        };
        // The caller's frame is off the stack while its argument grinds
        let result = match index.and_then(|i| args.get(i)) {
            Some(&arg) => self.grind_shard(arg, parent, class),
            None => Ok(()),
        };
        self.calls.push(caller);
        result
    }

    fn grind_macro(&mut self, node: NodeId, cmd: &Command, parent: NodeId, class: &GemClass) -> Result<()> {
        let Some(id) = cmd.macro_id else {
            return Ok(());
        };
        let body = self.macros.get(id).body;
        self.calls.push(node);
        let result = self.grind_shard(body, parent, class);
        self.calls.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;
    use crate::parser::Parser;
    use crate::source::Source;

    struct Ground {
        gems: GemTree,
        rules: RuleSet,
        diagnostics: Diagnostics,
    }

    fn grind(text: &str) -> Ground {
        let mut shards = ShardTree::new(Shard::Statement);
        let mut macros = MacroTable::new();
        let mut diagnostics = Diagnostics::default();
        let loader = MemoryLoader::new();
        let root = shards.root();
        let mut src = Source::new("t.lp", text);
        Parser::new(&mut shards, &mut macros, &loader, &mut diagnostics)
            .parse_document(&mut src, root)
            .unwrap();
        let mut gems = GemTree::new(Gem::container(GemClass::default()));
        let mut rules = RuleSet::new();
        Grinder::new(&shards, &macros, &mut gems, &mut rules, &mut diagnostics)
            .grind()
            .unwrap();
        Ground {
            gems,
            rules,
            diagnostics,
        }
    }

    fn texts(gems: &GemTree, id: NodeId) -> Vec<String> {
        gems.descendants(id)
            .into_iter()
            .map(|n| gems.get(n))
            .filter(|g| !g.is_control() && !g.get_text().is_empty())
            .map(|g| g.get_text().to_string())
            .collect()
    }

    fn of_type(gems: &GemTree, ty: GemType) -> Vec<NodeId> {
        gems.descendants(gems.root())
            .into_iter()
            .filter(|&n| gems.get(n).ty() == ty)
            .collect()
    }

    fn counters(gems: &GemTree) -> Vec<String> {
        gems.descendants(gems.root())
            .into_iter()
            .filter(|&n| gems.get(n).ty().title_level().is_some())
            .filter_map(|n| gems.first_child(n))
            .map(|c| gems.get(c).get_text().to_string())
            .collect()
    }

    #[test]
    fn test_style_commands_mark_text() {
        let ground = grind("Hello @em{world}.");
        let gems = &ground.gems;
        let kids: Vec<_> = gems.children(gems.root()).iter().map(|&c| gems.get(c)).collect();
        assert_eq!(kids.len(), 3);
        assert!(!kids[0].style().contains(Style::EM));
        assert!(kids[1].style().contains(Style::EM));
        assert!(kids[1].spaced());
        assert!(!kids[2].spaced());
        assert_eq!(kids[2].get_text(), ".");
    }

    #[test]
    fn test_section_counters_are_monotonic() {
        let ground = grind("@section{A} @section{B} @section{C}");
        assert_eq!(counters(&ground.gems), vec!["1", "2", "3"]);
    }

    #[test]
    fn test_chapter_resets_sections() {
        let ground = grind("@section{A} @section{B} @chapter{C} @section{D} @part{P} @section{E}");
        assert_eq!(counters(&ground.gems), vec!["1", "2", "1", "1.1", "1", "1"]);
    }

    #[test]
    fn test_unnumbered_title_keeps_counter() {
        let ground = grind("@section/-number{A} @section{B}");
        assert_eq!(counters(&ground.gems), vec!["", "1"]);
    }

    #[test]
    fn test_title_second_argument_follows() {
        let ground = grind("@section{Intro}{Hello}");
        let gems = &ground.gems;
        let kids = gems.children(gems.root());
        assert_eq!(kids.len(), 4);
        assert!(gems.get(kids[0]).is_break());
        let title = kids[1];
        assert_eq!(gems.get(title).ty(), GemType::Title(3));
        assert_eq!(texts(gems, title), vec!["1", "Intro"]);
        assert!(gems.get(kids[2]).is_break());
        assert_eq!(gems.get(kids[3]).get_text(), "Hello");
    }

    #[test]
    fn test_list_items_collect_following_content() {
        let ground = grind("@list{ignored @item A a @item{B} b}");
        let gems = &ground.gems;
        let list = of_type(gems, GemType::List)[0];
        let items = gems.children(list);
        assert_eq!(items.len(), 2);
        assert_eq!(texts(gems, items[0]), vec!["A", "a"]);
        assert_eq!(texts(gems, items[1]), vec!["B", "b"]);
    }

    #[test]
    fn test_enum_sets_number_flag() {
        let ground = grind("@enum{@item x}");
        let list = of_type(&ground.gems, GemType::List)[0];
        assert!(ground.gems.get(list).style().contains(Style::NUMBER));
    }

    #[test]
    fn test_definition_list_splits_term() {
        let ground = grind("@dlist{@item{Term} definition text}");
        let gems = &ground.gems;
        let list = of_type(gems, GemType::DefList)[0];
        let item = gems.children(list)[0];
        let parts = gems.children(item);
        assert_eq!(parts.len(), 2);
        assert_eq!(texts(gems, parts[0]), vec!["Term"]);
        assert_eq!(texts(gems, parts[1]), vec!["definition", "text"]);
    }

    #[test]
    fn test_table_cells_and_spans() {
        let ground = grind("@table{10 20 30}{@row{@tab A @tab B @tab C @tab D} @row{@span{2} AB @tab C}}");
        let gems = &ground.gems;
        let table = of_type(gems, GemType::Table)[0];
        assert_eq!(gems.get(table).width(), 60);
        let rows = gems.children(table);
        let widths = |row: NodeId| -> Vec<usize> { gems.children(row).iter().map(|&c| gems.get(c).width()).collect() };
        assert_eq!(widths(rows[0]), vec![10, 20, 30, 0]);
        assert_eq!(widths(rows[1]), vec![30, 30]);
        assert_eq!(texts(gems, gems.children(rows[1])[0]), vec!["AB"]);
        assert_eq!(ground.diagnostics.entries().len(), 1);
    }

    #[test]
    fn test_huge_column_widths_are_clamped() {
        let ground = grind("@table{18446744073709551615 1}{@row{@tab A @tab B}}@table{1}{@row{@span{18446744073709551615} C}}");
        let gems = &ground.gems;
        let tables = of_type(gems, GemType::Table);
        assert_eq!(gems.get(tables[0]).width(), MAX_COLUMN_WIDTH + 1);
        let cells = gems.children(gems.children(tables[0])[0]);
        assert_eq!(gems.get(cells[0]).width(), MAX_COLUMN_WIDTH);
        assert_eq!(ground.diagnostics.entries().len(), 1);
        let wide = gems.children(gems.children(tables[1])[0]);
        assert_eq!(gems.get(wide[0]).width(), 1);
    }

    #[test]
    fn test_macro_arguments() {
        let ground = grind("@macro{dup t}{@arg@arg}@dup{X}");
        assert_eq!(texts(&ground.gems, ground.gems.root()), vec!["X", "X"]);
    }

    #[test]
    fn test_nested_macro_restores_caller() {
        let source = "@macro{inner s}{[@arg]}@macro{outer ss}{@inner{@arg{2}} @arg{1}}@outer{A}{B}";
        let ground = grind(source);
        assert_eq!(texts(&ground.gems, ground.gems.root()), vec!["[", "B", "]", "A"]);
    }

    #[test]
    fn test_rarg_and_missing_arguments() {
        let ground = grind("@macro{pick ss}{@rarg @arg{-2} @arg{5}}@pick{one}{two}");
        assert_eq!(texts(&ground.gems, ground.gems.root()), vec!["two", "one"]);
    }

    #[test]
    fn test_macro_body_binds_earlier_definitions() {
        let ground = grind("@macro{m}{one}@macro{m}{two @m}@m");
        assert_eq!(texts(&ground.gems, ground.gems.root()), vec!["two", "one"]);
        assert!(ground.diagnostics.is_empty());
    }

    #[test]
    fn test_rules_register_in_order() {
        let ground = grind("@format{caps}{@U} @length{list}{left 2 bogus}");
        assert_eq!(ground.rules.format_rules().len(), 1);
        assert_eq!(ground.rules.length_rules().len(), 1);
        assert_eq!(ground.diagnostics.entries().len(), 1);
    }

    #[test]
    fn test_apply_and_set() {
        let ground = grind("@apply{@U}{a} @set{left 4}{b}");
        let gems = &ground.gems;
        let kids = gems.children(gems.root());
        assert_eq!(gems.get(kids[0]).class().filters, vec!["@U".to_string()]);
        let indent = of_type(gems, GemType::Indent)[0];
        assert_eq!(gems.get(indent).class().length.and_then(|l| l.left), Some(4));
        assert_eq!(texts(gems, indent), vec!["b"]);
    }

    #[test]
    fn test_contents_markers() {
        let ground = grind("@contents{2 3}");
        let gems = &ground.gems;
        let contents = of_type(gems, GemType::Contents)[0];
        let range: Vec<_> = gems.children(contents).iter().map(|&c| gems.get(c).get_text()).collect();
        assert_eq!(range, vec!["2", "3"]);
    }

    #[test]
    fn test_breaks_are_polished() {
        let ground = grind("a @br\n\nb @br");
        let gems = &ground.gems;
        let kids: Vec<_> = gems.children(gems.root()).iter().map(|&c| gems.get(c)).collect();
        assert_eq!(kids.len(), 3);
        assert!(kids[1].is_break());
    }
}
