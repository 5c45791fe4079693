//! # lapidary-core
//!
//! Compiler for the lapidary document language: plain text with `@command`
//! markup, compiled to formatted plain text.
//!
//! A compile runs in four passes:
//! - the [`parser`] reads tokens into a command tree, resolving macros,
//!   conditionals and includes on the way
//! - the [`grinder`] interprets the commands into a tree of styled gems and
//!   registers the `@format` and `@length` rules
//! - the [`schedule`] layout splits the gem tree into output contexts, each
//!   a rectangle of columns with a stream of segments
//! - the [`render`] pass walks the contexts in dependency order and produces
//!   the final lines
//!
//! ## Example
//!
//! ```ignore
//! let out = lapidary_core::compile("@section{Intro}{Hello @em{world}.}")?;
//! assert_eq!(out, "1 Intro\n\nHello world.\n");
//! ```

pub mod commands;
pub mod error;
pub mod filter;
pub mod gem;
pub mod grinder;
pub mod loader;
pub mod parser;
pub mod processor;
pub mod render;
pub mod rules;
pub mod schedule;
pub mod segment;
pub mod selector;
pub mod shard;
pub mod source;
pub mod tree;

#[cfg(test)]
mod tests;

pub use error::{Diagnostic, Diagnostics, DocError, Location, Result, Severity};
pub use filter::{Category, FormatProgram};
pub use gem::{Gem, GemClass, GemTree, GemType, Length, Measure};
pub use loader::{FsLoader, LoadedSource, MemoryLoader, SourceLoader};
pub use processor::{CompileOptions, Processor, DEFAULT_WIDTH, PRELUDE};
pub use render::{Event, Renderer};
pub use rules::RuleSet;
pub use schedule::{ContextId, ContextRelation, Layout, OutputContext, Schedule};
pub use segment::{Directive, Segment};
pub use selector::Selector;
pub use shard::{MacroTable, Shard, ShardTree};
pub use source::{Source, Token, TokenKind};
pub use tree::{NodeId, Tree};

/// Compile a document with default options and no include directories
pub fn compile(text: &str) -> Result<String> {
    Processor::new(CompileOptions::default(), Box::new(MemoryLoader::new())).compile("<input>", text)
}
