//! The compile pipeline: parse, grind, lay out, render

use crate::error::{Diagnostic, Diagnostics, Result};
use crate::gem::{Gem, GemClass, GemTree};
use crate::grinder::Grinder;
use crate::loader::{FsLoader, SourceLoader};
use crate::parser::Parser;
use crate::render::render;
use crate::rules::RuleSet;
use crate::schedule::{Layout, Schedule};
use crate::shard::{MacroTable, Shard, ShardTree};
use crate::source::Source;
use std::path::PathBuf;

/// Default page width in cells
pub const DEFAULT_WIDTH: usize = 72;

/// Macro that switches output to CR LF line ends when defined
pub const CRLF_MACRO: &str = "CR_NL";

/// Rules read before every document unless disabled
pub const PRELUDE: &str = r"@format{style caps}{@U}
@length{title}{above 1 below 1 spacing 1}
@length{list}{left 2 spacing 1}
@format{parent list !style number}{@<*@>}
@format{parent list style number}{@<@n.@>}
@length{dlist}{left 2 spacing 2}
@length{table}{spacing 1}
@length{indent}{left 4}
@length{indent center parent !center, indent right parent !right, indent left parent !left}{left 0 right 0}
@length{contents}{indent 2 below 1}
";

/// Options for a compile
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub width: usize,
    /// Read [`PRELUDE`] before the document
    pub prelude: bool,
    /// Directories searched for included files
    pub include_dirs: Vec<PathBuf>,
    pub crlf: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            prelude: true,
            include_dirs: Vec::new(),
            crlf: false,
        }
    }
}

/// Owns the state of one compile at a time
///
/// Every call to [`Processor::compile`] starts from empty trees, rules and
/// macros, so nothing leaks from one document into the next.
pub struct Processor {
    options: CompileOptions,
    loader: Box<dyn SourceLoader>,
    shards: ShardTree,
    macros: MacroTable,
    gems: GemTree,
    rules: RuleSet,
    diagnostics: Diagnostics,
}

impl Processor {
    pub fn new(options: CompileOptions, loader: Box<dyn SourceLoader>) -> Self {
        Self {
            options,
            loader,
            shards: ShardTree::new(Shard::Statement),
            macros: MacroTable::new(),
            gems: GemTree::new(Gem::container(GemClass::default())),
            rules: RuleSet::new(),
            diagnostics: Diagnostics::default(),
        }
    }

    /// Processor reading includes from disk through `options.include_dirs`
    pub fn with_fs_loader(options: CompileOptions) -> Self {
        let loader = FsLoader::new(options.include_dirs.clone());
        Self::new(options, Box::new(loader))
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    fn reset(&mut self) {
        self.shards = ShardTree::new(Shard::Statement);
        self.macros.clear();
        self.gems = GemTree::new(Gem::container(GemClass::default()));
        self.rules.clear();
        self.diagnostics.clear();
    }

    /// Parse the prelude and the document into a fresh command tree
    pub fn parse_only(&mut self, name: &str, text: &str) -> Result<&ShardTree> {
        self.reset();
        let root = self.shards.root();
        let loader = self.loader.as_ref();
        let mut parser = Parser::new(&mut self.shards, &mut self.macros, loader, &mut self.diagnostics);
        if self.options.prelude {
            let mut prelude = Source::new("<prelude>", PRELUDE);
            parser.parse_document(&mut prelude, root)?;
        }
        let mut src = Source::new(name, text);
        parser.parse_document(&mut src, root)?;
        tracing::debug!(shards = self.shards.len(), macros = self.macros.len(), "parsed {}", name);
        Ok(&self.shards)
    }

    /// Parse and grind, leaving the gem tree and rules in place
    pub fn grind_only(&mut self, name: &str, text: &str) -> Result<&GemTree> {
        self.parse_only(name, text)?;
        Grinder::new(
            &self.shards,
            &self.macros,
            &mut self.gems,
            &mut self.rules,
            &mut self.diagnostics,
        )
        .grind()?;
        tracing::debug!(
            gems = self.gems.len(),
            formats = self.rules.format_rules().len(),
            lengths = self.rules.length_rules().len(),
            "ground {}",
            name
        );
        Ok(&self.gems)
    }

    /// Everything up to the schedule
    pub fn schedule(&mut self, name: &str, text: &str) -> Result<Schedule> {
        self.grind_only(name, text)?;
        Layout::new(&self.gems, &self.rules, &mut self.diagnostics).run(self.options.width)
    }

    /// Compile `text` to its formatted output
    pub fn compile(&mut self, name: &str, text: &str) -> Result<String> {
        let schedule = self.schedule(name, text)?;
        let crlf = self.options.crlf || self.macros.contains(CRLF_MACRO);
        let output = render(&schedule, crlf);
        tracing::info!(
            contexts = schedule.len(),
            warnings = self.diagnostics.entries().len(),
            "compiled {}",
            name
        );
        Ok(output)
    }

    pub fn shards(&self) -> &ShardTree {
        &self.shards
    }

    pub fn gems(&self) -> &GemTree {
        &self.gems
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn macros(&self) -> &MacroTable {
        &self.macros
    }

    /// Warnings from the last compile
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.diagnostics.entries()
    }
}
