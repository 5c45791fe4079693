//! The command tree built by the parser, and the macro table

use crate::commands::CommandRule;
use crate::error::Location;
use crate::gem::GemClass;
use crate::source::Token;
use crate::tree::{NodeId, Tree};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub type ShardTree = Tree<Shard>;

/// A node of the command tree
#[derive(Debug, Clone)]
pub enum Shard {
    /// Sequence of blocks, commands and breaks
    Statement,
    /// Flat run of tokens
    Block,
    Token(Token),
    /// Blank line
    Break,
    Command(Command),
}

/// A command invocation; its arguments are the node's children
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub rule: &'static CommandRule,
    pub macro_id: Option<MacroId>,
    /// Rule class with `/flag` modifiers applied
    pub class: GemClass,
    pub spaced: bool,
    pub file: Arc<str>,
    pub line: usize,
}

impl Command {
    pub fn location(&self) -> Location {
        Location::new(self.file.clone(), self.line)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacroId(usize);

/// A user macro; `body` is a detached statement in the shard tree
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub signature: String,
    pub body: NodeId,
}

/// Macros in definition order with the latest definition per name
#[derive(Debug, Default)]
pub struct MacroTable {
    macros: Vec<Macro>,
    by_name: HashMap<String, MacroId>,
}

impl MacroTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a macro; an existing one with the same name is shadowed
    pub fn define(&mut self, name: impl Into<String>, signature: impl Into<String>, body: NodeId) -> MacroId {
        let id = MacroId(self.macros.len());
        let name = name.into();
        self.by_name.insert(name.clone(), id);
        self.macros.push(Macro {
            name,
            signature: signature.into(),
            body,
        });
        id
    }

    pub fn lookup(&self, name: &str) -> Option<MacroId> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn get(&self, id: MacroId) -> &Macro {
        &self.macros[id.0]
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn clear(&mut self) {
        self.macros.clear();
        self.by_name.clear();
    }
}

/// JSON view of a command subtree
pub fn dump(tree: &ShardTree, id: NodeId) -> Value {
    let children: Vec<Value> = tree.children(id).iter().map(|&c| dump(tree, c)).collect();
    match tree.get(id) {
        Shard::Statement => json!({ "statement": children }),
        Shard::Block => json!({ "block": children }),
        Shard::Token(token) => json!({ "token": token.text, "spaced": token.spaced }),
        Shard::Break => json!("break"),
        Shard::Command(command) => json!({
            "command": command.name,
            "kind": command.rule.kind,
            "style": command.class.style.names(),
            "line": command.line,
            "args": children,
        }),
    }
}
