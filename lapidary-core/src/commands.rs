//! The static command-rule table
//!
//! Every built-in `@name` resolves to a [`CommandRule`] describing its
//! semantic category, layout flags, the class its gem starts from and the
//! argument signature (one character per argument: `b` block of tokens,
//! `t` verbatim text, anything else a full statement).

use crate::gem::{Flush, GemClass, GemType, Style};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;

/// Semantic category of a command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommandKind {
    /// Contributes style to its argument only
    Style,
    /// Region with its own gem (indent, flush blocks)
    Region,
    /// Numbered title at the given level
    Counter(u8),
    List,
    DefList,
    Item,
    Table,
    Row,
    Tab,
    Span,
    Apply,
    Set,
    Format,
    Length,
    Contents,
    Arg,
    RArg,
    LineBreak,
    MacroDef,
    IfDef,
    IfNotDef,
    Else,
    Include,
    Require,
    MacroCall,
}

/// Layout flags of a command rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RuleFlags(u8);

impl RuleFlags {
    pub const NONE: RuleFlags = RuleFlags(0);
    /// Owns its content in a gem of its own
    pub const INDEPENDENT: RuleFlags = RuleFlags(1);
    /// Paragraph break before
    pub const BREAKING: RuleFlags = RuleFlags(1 << 1);
    /// Line break before
    pub const LINE_BREAKING: RuleFlags = RuleFlags(1 << 2);
    /// Repeat the leading break after the command
    pub const POST_BREAKING: RuleFlags = RuleFlags(1 << 3);
    /// Resolved by the parser and elided from the tree
    pub const TIDY: RuleFlags = RuleFlags(1 << 4);

    const BLOCK: RuleFlags = RuleFlags(1 | 1 << 1 | 1 << 3);

    pub fn contains(self, other: RuleFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Static description of a command
#[derive(Debug, Clone, Serialize)]
pub struct CommandRule {
    pub name: &'static str,
    pub kind: CommandKind,
    pub flags: RuleFlags,
    pub class: GemClass,
    pub signature: &'static str,
}

impl CommandRule {
    fn new(name: &'static str, kind: CommandKind, signature: &'static str) -> Self {
        Self {
            name,
            kind,
            flags: RuleFlags::NONE,
            class: GemClass::default(),
            signature,
        }
    }

    fn flags(mut self, flags: RuleFlags) -> Self {
        self.flags = flags;
        self
    }

    fn class(mut self, class: GemClass) -> Self {
        self.class = class;
        self
    }

    pub fn has(&self, flags: RuleFlags) -> bool {
        self.flags.contains(flags)
    }
}

const TITLES: [&str; 7] = [
    "part",
    "chapter",
    "section",
    "subsection",
    "subsubsection",
    "paragraph",
    "subparagraph",
];

static COMMAND_RULES: Lazy<HashMap<&'static str, CommandRule>> = Lazy::new(|| {
    let mut rules = vec![
        CommandRule::new("br", CommandKind::LineBreak, "").flags(RuleFlags::LINE_BREAKING),
        CommandRule::new("indent", CommandKind::Region, "s")
            .flags(RuleFlags::BLOCK)
            .class(GemClass::new(GemType::Indent)),
        CommandRule::new("list", CommandKind::List, "s")
            .flags(RuleFlags::BLOCK)
            .class(GemClass::new(GemType::List).without_style(Style::NUMBER)),
        CommandRule::new("enum", CommandKind::List, "s")
            .flags(RuleFlags::BLOCK)
            .class(GemClass::new(GemType::List).with_style(Style::NUMBER)),
        CommandRule::new("dlist", CommandKind::DefList, "s")
            .flags(RuleFlags::BLOCK)
            .class(GemClass::new(GemType::DefList)),
        CommandRule::new("item", CommandKind::Item, "s"),
        CommandRule::new("table", CommandKind::Table, "bs")
            .flags(RuleFlags::BLOCK)
            .class(GemClass::new(GemType::Table)),
        CommandRule::new("row", CommandKind::Row, "s"),
        CommandRule::new("tab", CommandKind::Tab, ""),
        CommandRule::new("span", CommandKind::Span, "b"),
        CommandRule::new("apply", CommandKind::Apply, "ts"),
        CommandRule::new("set", CommandKind::Set, "bs")
            .flags(RuleFlags::BLOCK)
            .class(GemClass::new(GemType::Indent)),
        CommandRule::new("format", CommandKind::Format, "tt"),
        CommandRule::new("length", CommandKind::Length, "tb"),
        CommandRule::new("contents", CommandKind::Contents, "b")
            .flags(RuleFlags::BLOCK)
            .class(GemClass::new(GemType::Contents)),
        CommandRule::new("arg", CommandKind::Arg, "b"),
        CommandRule::new("rarg", CommandKind::RArg, "b"),
        CommandRule::new("macro", CommandKind::MacroDef, "bs").flags(RuleFlags::TIDY),
        CommandRule::new("ifdef", CommandKind::IfDef, "bs").flags(RuleFlags::TIDY),
        CommandRule::new("ifndef", CommandKind::IfNotDef, "bs").flags(RuleFlags::TIDY),
        CommandRule::new("else", CommandKind::Else, "s").flags(RuleFlags::TIDY),
        CommandRule::new("include", CommandKind::Include, "b").flags(RuleFlags::TIDY),
        CommandRule::new("require", CommandKind::Require, "b").flags(RuleFlags::TIDY),
    ];

    for (name, style) in [
        ("em", Style::EM),
        ("strong", Style::STRONG),
        ("code", Style::CODE),
        ("under", Style::UNDER),
        ("caps", Style::CAPS),
    ] {
        rules.push(
            CommandRule::new(name, CommandKind::Style, "s").class(GemClass::new(GemType::Plain).with_style(style)),
        );
    }

    for (name, flush) in [("left", Flush::Left), ("center", Flush::Center), ("right", Flush::Right)] {
        rules.push(
            CommandRule::new(name, CommandKind::Region, "s")
                .flags(RuleFlags::BLOCK)
                .class(GemClass::new(GemType::Indent).with_flush(flush)),
        );
    }

    for (level, name) in (1u8..).zip(TITLES) {
        rules.push(
            CommandRule::new(name, CommandKind::Counter(level), "ss")
                .flags(RuleFlags::BLOCK)
                .class(GemClass::new(GemType::Title(level)).with_style(Style::NUMBER)),
        );
    }

    rules.into_iter().map(|rule| (rule.name, rule)).collect()
});

static MACRO_CALL: Lazy<CommandRule> =
    Lazy::new(|| CommandRule::new("macro call", CommandKind::MacroCall, ""));

/// Look up a built-in command by name
pub fn lookup(name: &str) -> Option<&'static CommandRule> {
    COMMAND_RULES.get(name)
}

/// The rule shared by every macro invocation
pub fn macro_call() -> &'static CommandRule {
    &MACRO_CALL
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_titles() {
        let section = lookup("section").unwrap();
        assert_eq!(section.kind, CommandKind::Counter(3));
        assert!(section.has(RuleFlags::INDEPENDENT));
        assert!(section.class.style.contains(Style::NUMBER));
        assert_eq!(section.signature.len(), 2);
    }

    #[test]
    fn test_style_commands_are_not_independent() {
        let em = lookup("em").unwrap();
        assert_eq!(em.kind, CommandKind::Style);
        assert!(!em.has(RuleFlags::INDEPENDENT));
        assert_eq!(em.class.style, Style::EM);
    }

    #[test]
    fn test_bullet_list_drops_inherited_numbering() {
        let list = lookup("list").unwrap();
        let numbered = GemClass::new(GemType::List).with_style(Style::NUMBER | Style::EM);
        let combined = list.class.over(&numbered);
        assert!(!combined.style.contains(Style::NUMBER));
        assert!(combined.style.contains(Style::EM));
        assert!(lookup("enum").unwrap().class.over(&combined).style.contains(Style::NUMBER));
    }

    #[test]
    fn test_br_breaks_the_line_before_itself() {
        let br = lookup("br").unwrap();
        assert!(br.has(RuleFlags::LINE_BREAKING));
        assert!(!br.has(RuleFlags::BREAKING));
    }

    #[test]
    fn test_tidy_commands() {
        for name in ["macro", "ifdef", "ifndef", "else", "include", "require"] {
            assert!(lookup(name).unwrap().has(RuleFlags::TIDY), "{name}");
        }
        assert!(lookup("nope").is_none());
    }
}
