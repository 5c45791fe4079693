//! Recursive-descent parser from tokens to the command tree
//!
//! Macro definitions, conditionals and includes are resolved here and never
//! reach the tree. Command arguments are read according to the signature of
//! the matched rule or macro.

use crate::commands::{self, CommandKind, RuleFlags};
use crate::error::{Diagnostics, DocError, Location, Result};
use crate::loader::SourceLoader;
use crate::shard::{Command, MacroTable, Shard, ShardTree};
use crate::source::{Source, Token, TokenKind};
use crate::tree::NodeId;

/// Includes nested deeper than this abort the compile
pub const MAX_INCLUDE_DEPTH: usize = 16;

pub struct Parser<'a> {
    tree: &'a mut ShardTree,
    macros: &'a mut MacroTable,
    loader: &'a dyn SourceLoader,
    diagnostics: &'a mut Diagnostics,
    depth: usize,
}

impl<'a> Parser<'a> {
    pub fn new(
        tree: &'a mut ShardTree,
        macros: &'a mut MacroTable,
        loader: &'a dyn SourceLoader,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        Self {
            tree,
            macros,
            loader,
            diagnostics,
            depth: 0,
        }
    }

    /// Parse a whole source into `parent`
    pub fn parse_document(&mut self, src: &mut Source, parent: NodeId) -> Result<()> {
        self.parse_statement(src, parent, false, false)
    }

    /// Read a statement into `parent` until the closing `}` or end of input
    ///
    /// `lead_space` marks the first word as spaced (a spaced `{` opened it).
    pub fn parse_statement(
        &mut self,
        src: &mut Source,
        parent: NodeId,
        until_close: bool,
        mut lead_space: bool,
    ) -> Result<()> {
        loop {
            let mut token = src.get_token_or_blank();
            match token.kind {
                TokenKind::End if until_close => {
                    return Err(DocError::UnexpectedEndOfInput {
                        loc: location(src, token.line),
                    })
                }
                TokenKind::End => return Ok(()),
                TokenKind::Close if until_close => return Ok(()),
                TokenKind::Close => {
                    return Err(DocError::UnbalancedBlock {
                        loc: location(src, token.line),
                    })
                }
                TokenKind::Blank => {
                    self.tree.append(parent, Shard::Break);
                }
                TokenKind::Open => {
                    let inner = self.tree.append(parent, Shard::Statement);
                    self.parse_statement(src, inner, true, token.spaced || lead_space)?;
                }
                TokenKind::Word => {
                    token.spaced |= lead_space;
                    self.push_word(parent, token);
                }
                TokenKind::Command => {
                    token.spaced |= lead_space;
                    self.parse_at(src, parent, token)?;
                }
            }
            lead_space = false;
        }
    }

    /// Append a word, grouping it with a directly preceding block
    fn push_word(&mut self, parent: NodeId, token: Token) {
        let block = match self.tree.last_child(parent) {
            Some(last) if matches!(self.tree.get(last), Shard::Block) => last,
            _ => self.tree.append(parent, Shard::Block),
        };
        self.tree.append(block, Shard::Token(token));
    }

    /// Parse `@name/mod/-mod{arg}…` whose name token was just read
    pub fn parse_at(&mut self, src: &mut Source, parent: NodeId, token: Token) -> Result<()> {
        let mut parts = token.text.split('/');
        let name = parts.next().unwrap_or_default().to_string();
        let modifiers: Vec<&str> = parts.collect();

        let (rule, macro_id, signature) = match self.macros.lookup(&name) {
            Some(id) => (commands::macro_call(), Some(id), self.macros.get(id).signature.clone()),
            None => match commands::lookup(&name) {
                Some(rule) => (rule, None, rule.signature.to_string()),
                None => {
                    self.diagnostics
                        .warn(location(src, token.line), format!("unknown command '@{}'", name));
                    let literal = Token::word(format!("@{}", token.text), token.spaced, token.line);
                    self.push_word(parent, literal);
                    return Ok(());
                }
            },
        };

        let mut class = rule.class.clone();
        for modifier in modifiers {
            if !class.modify(modifier) {
                self.diagnostics.warn(
                    location(src, token.line),
                    format!("unknown modifier '/{}' on '@{}'", modifier, name),
                );
            }
        }

        if rule.has(RuleFlags::TIDY) {
            return match rule.kind {
                CommandKind::MacroDef => self.parse_macro(src, token.line),
                CommandKind::IfDef => self.parse_conditional(src, parent, false),
                CommandKind::IfNotDef => self.parse_conditional(src, parent, true),
                CommandKind::Include => self.parse_include(src, parent, false, token.line),
                CommandKind::Require => self.parse_include(src, parent, true, token.line),
                _ => {
                    self.diagnostics
                        .warn(location(src, token.line), "'@else' without a conditional");
                    self.skip_argument(src)
                }
            };
        }

        let node = self.tree.append(
            parent,
            Shard::Command(Command {
                name,
                rule,
                macro_id,
                class,
                spaced: token.spaced,
                file: src.file().clone(),
                line: token.line,
            }),
        );
        self.parse_arguments(src, node, &signature)
    }

    /// An argument follows only as a `{` directly attached to what precedes
    fn next_is_argument(src: &mut Source) -> bool {
        let next = src.peek_token();
        next.is(TokenKind::Open) && !next.spaced
    }

    fn parse_arguments(&mut self, src: &mut Source, node: NodeId, signature: &str) -> Result<()> {
        for kind in signature.chars() {
            if !Self::next_is_argument(src) {
                break;
            }
            src.get_token();
            match kind {
                'b' => {
                    let block = self.tree.append(node, Shard::Block);
                    for token in read_words(src)? {
                        self.tree.append(block, Shard::Token(token));
                    }
                }
                't' => {
                    let text = src.read_verbatim()?;
                    self.tree.append(node, Shard::Token(text));
                }
                _ => {
                    let statement = self.tree.append(node, Shard::Statement);
                    self.parse_statement(src, statement, true, false)?;
                }
            }
        }
        Ok(())
    }

    fn skip_argument(&mut self, src: &mut Source) -> Result<()> {
        if Self::next_is_argument(src) {
            src.get_token();
            src.read_verbatim()?;
        }
        Ok(())
    }

    /// Read a `{words}` header argument, if present
    fn read_header(&mut self, src: &mut Source) -> Result<Option<Vec<String>>> {
        if !Self::next_is_argument(src) {
            return Ok(None);
        }
        src.get_token();
        let words = read_words(src)?.iter().map(Token::unescape).collect();
        Ok(Some(words))
    }

    /// `@macro{name signature}{body}`
    fn parse_macro(&mut self, src: &mut Source, line: usize) -> Result<()> {
        let Some(header) = self.read_header(src)? else {
            self.diagnostics.warn(location(src, line), "'@macro' without a name");
            return Ok(());
        };
        let Some(name) = header.first().cloned() else {
            self.diagnostics.warn(location(src, line), "'@macro' without a name");
            return self.skip_argument(src);
        };
        let signature = header.get(1).cloned().unwrap_or_default();

        let body = self.tree.new_node(Shard::Statement);
        if Self::next_is_argument(src) {
            src.get_token();
            self.parse_statement(src, body, true, false)?;
        }
        tracing::debug!("Defined macro '{}' ({})", name, signature);
        self.macros.define(name, signature, body);
        Ok(())
    }

    /// `@ifdef{name}{…}` / `@ifndef{name}{…}` with an optional `@else{…}`
    fn parse_conditional(&mut self, src: &mut Source, parent: NodeId, negate: bool) -> Result<()> {
        let name = self
            .read_header(src)?
            .and_then(|words| words.first().cloned())
            .unwrap_or_default();
        let take = self.macros.contains(&name) != negate;

        self.parse_branch(src, parent, take)?;

        let next = src.peek_token();
        if next.is(TokenKind::Command) && next.text == "else" {
            src.get_token();
            self.parse_branch(src, parent, !take)?;
        }
        Ok(())
    }

    /// Splice a branch into `parent` or skip it unparsed
    fn parse_branch(&mut self, src: &mut Source, parent: NodeId, take: bool) -> Result<()> {
        if !Self::next_is_argument(src) {
            return Ok(());
        }
        if take {
            src.get_token();
            self.parse_statement(src, parent, true, false)
        } else {
            self.skip_argument(src)
        }
    }

    /// `@include{path}` / `@require{path}`
    fn parse_include(&mut self, src: &mut Source, parent: NodeId, required: bool, line: usize) -> Result<()> {
        let path = self.read_header(src)?.unwrap_or_default().concat();
        let loc = location(src, line);
        if self.depth >= MAX_INCLUDE_DEPTH {
            return Err(DocError::IncludeDepth { loc, path });
        }

        match self.loader.load(&path, src.file()) {
            Ok(loaded) => {
                tracing::debug!("Including {}", loaded.name);
                let mut inner = Source::new(loaded.name, &loaded.text);
                self.depth += 1;
                let result = self.parse_statement(&mut inner, parent, false, false);
                self.depth -= 1;
                result
            }
            Err(err) if required => Err(DocError::RequireFailed {
                loc,
                path,
                reason: err.to_string(),
            }),
            Err(err) => {
                self.diagnostics
                    .warn(loc, format!("cannot include '{}': {}", path, err));
                Ok(())
            }
        }
    }
}

/// Tokens up to the `}` closing an already consumed `{`
///
/// Commands are kept as literal text and nested braces as words.
fn read_words(src: &mut Source) -> Result<Vec<Token>> {
    let mut words = Vec::new();
    let mut depth = 0usize;
    loop {
        let token = src.get_token();
        match token.kind {
            TokenKind::End => {
                return Err(DocError::UnexpectedEndOfInput {
                    loc: location(src, token.line),
                })
            }
            TokenKind::Close if depth == 0 => return Ok(words),
            TokenKind::Close => {
                depth -= 1;
                words.push(Token::word("@}", token.spaced, token.line));
            }
            TokenKind::Open => {
                depth += 1;
                words.push(Token::word("@{", token.spaced, token.line));
            }
            TokenKind::Command => {
                words.push(Token::word(format!("@{}", token.text), token.spaced, token.line));
            }
            TokenKind::Word | TokenKind::Blank => words.push(token),
        }
    }
}

fn location(src: &Source, line: usize) -> Location {
    Location::new(src.file().clone(), line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::MemoryLoader;

    #[derive(Debug)]
    struct Parsed {
        tree: ShardTree,
        macros: MacroTable,
        diagnostics: Diagnostics,
    }

    fn parse_with(text: &str, loader: &dyn SourceLoader) -> Result<Parsed> {
        let mut tree = ShardTree::new(Shard::Statement);
        let mut macros = MacroTable::new();
        let mut diagnostics = Diagnostics::default();
        let root = tree.root();
        let mut src = Source::new("main.lp", text);
        Parser::new(&mut tree, &mut macros, loader, &mut diagnostics).parse_document(&mut src, root)?;
        Ok(Parsed {
            tree,
            macros,
            diagnostics,
        })
    }

    fn parse(text: &str) -> Parsed {
        parse_with(text, &MemoryLoader::new()).unwrap()
    }

    fn words(tree: &ShardTree, id: NodeId) -> Vec<String> {
        tree.descendants(id)
            .into_iter()
            .filter_map(|n| match tree.get(n) {
                Shard::Token(token) => Some(token.unescape()),
                _ => None,
            })
            .collect()
    }

    fn command_names(tree: &ShardTree) -> Vec<String> {
        tree.descendants(tree.root())
            .into_iter()
            .filter_map(|n| match tree.get(n) {
                Shard::Command(c) => Some(c.name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_words_group_into_blocks() {
        let parsed = parse("one two\n\nthree");
        let root = parsed.tree.root();
        let kids = parsed.tree.children(root);
        assert_eq!(kids.len(), 3);
        assert!(matches!(parsed.tree.get(kids[0]), Shard::Block));
        assert!(matches!(parsed.tree.get(kids[1]), Shard::Break));
        assert_eq!(words(&parsed.tree, root), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_arguments_follow_signature() {
        let parsed = parse("@section{Intro}{Body text} @table{10 20}{x}");
        let tree = &parsed.tree;
        let root = tree.root();
        let section = tree.children(root)[0];
        assert_eq!(tree.children(section).len(), 2);
        let table = tree.children(root)[1];
        let widths = tree.children(table)[0];
        assert!(matches!(tree.get(widths), Shard::Block));
        assert_eq!(words(tree, widths), vec!["10", "20"]);
    }

    #[test]
    fn test_spaced_brace_is_not_an_argument() {
        let parsed = parse("@em {x}");
        let tree = &parsed.tree;
        let kids = tree.children(tree.root());
        assert_eq!(kids.len(), 2);
        assert!(tree.children(kids[0]).is_empty());
        assert!(matches!(tree.get(kids[1]), Shard::Statement));
    }

    #[test]
    fn test_verbatim_argument() {
        let parsed = parse("@format{list}{@<* @>@t}");
        let tree = &parsed.tree;
        let format = tree.children(tree.root())[0];
        let args: Vec<_> = tree
            .children(format)
            .iter()
            .map(|&a| match tree.get(a) {
                Shard::Token(t) => t.text.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(args, vec!["list", "@<* @>@t"]);
    }

    #[test]
    fn test_modifiers_apply_to_class() {
        let parsed = parse("@section/-number/center{T}");
        let tree = &parsed.tree;
        let Shard::Command(cmd) = tree.get(tree.children(tree.root())[0]) else {
            panic!("expected command");
        };
        assert_eq!(cmd.name, "section");
        assert!(!cmd.class.style.contains(crate::gem::Style::NUMBER));
        assert_eq!(cmd.class.flush, crate::gem::Flush::Center);
    }

    #[test]
    fn test_unknown_command_is_literal() {
        let parsed = parse("a @zap b");
        assert_eq!(words(&parsed.tree, parsed.tree.root()), vec!["a", "@zap", "b"]);
        assert_eq!(parsed.diagnostics.entries().len(), 1);
    }

    #[test]
    fn test_macro_registers_and_is_called() {
        let parsed = parse("@macro{dup t}{@arg@arg}@dup{X}");
        assert!(parsed.macros.contains("dup"));
        let tree = &parsed.tree;
        let kids = tree.children(tree.root());
        assert_eq!(kids.len(), 1);
        let Shard::Command(call) = tree.get(kids[0]) else {
            panic!("expected macro call");
        };
        assert_eq!(call.rule.kind, CommandKind::MacroCall);
        assert!(call.macro_id.is_some());
        assert_eq!(words(tree, kids[0]), vec!["X"]);
    }

    #[test]
    fn test_macro_not_visible_before_definition() {
        let parsed = parse("@late @macro{late}{x}@late");
        assert_eq!(parsed.diagnostics.entries().len(), 1);
        assert_eq!(command_names(&parsed.tree), vec!["late"]);
    }

    #[test]
    fn test_conditionals_splice_winner() {
        let parsed = parse("@macro{A}{}@ifdef{A}{yes}@else{no} @ifndef{A}{@macro{B}{}}");
        assert_eq!(words(&parsed.tree, parsed.tree.root()), vec!["yes"]);
        assert!(!parsed.macros.contains("B"));
    }

    #[test]
    fn test_include_and_require() {
        let loader = MemoryLoader::new().with_file("part.lp", "included @macro{M}{}");
        let parsed = parse_with("before @include{part.lp} after @include{missing.lp}", &loader).unwrap();
        assert_eq!(
            words(&parsed.tree, parsed.tree.root()),
            vec!["before", "included", "after"]
        );
        assert!(parsed.macros.contains("M"));
        assert_eq!(parsed.diagnostics.entries().len(), 1);

        let err = parse_with("@require{missing.lp}", &loader).unwrap_err();
        assert!(matches!(err, DocError::RequireFailed { ref path, .. } if path == "missing.lp"));
    }

    #[test]
    fn test_recursive_include_is_bounded() {
        let loader = MemoryLoader::new().with_file("self.lp", "@include{self.lp}");
        let err = parse_with("@include{self.lp}", &loader).unwrap_err();
        assert!(matches!(err, DocError::IncludeDepth { .. }));
    }

    #[test]
    fn test_block_errors() {
        let err = parse_with("a } b", &MemoryLoader::new()).unwrap_err();
        assert!(matches!(err, DocError::UnbalancedBlock { .. }));
        let err = parse_with("@em{open", &MemoryLoader::new()).unwrap_err();
        assert!(matches!(err, DocError::UnexpectedEndOfInput { .. }));
    }
}
