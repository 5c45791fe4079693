//! Source reading and tokenization
//!
//! Comments are stripped from the raw text first (`$` to end of line and
//! `$* ... *$` blocks, keeping every newline so line numbers stay exact).
//! The remaining text is cut into raw lexemes by a logos lexer, and
//! [`Source`] assembles those into the tokens the parser consumes: words,
//! commands, braces and blank-line markers.

use crate::error::{DocError, Location, Result};
use logos::Logos;
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;

/// Raw lexemes of the comment-free source text
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum Lexeme {
    #[regex(r"[ \t\r\f]+")]
    Space,

    #[token("\n")]
    Newline,

    #[token("{")]
    Open,

    #[token("}")]
    Close,

    #[regex(r"@[A-Za-z][A-Za-z0-9_]*(/-?[A-Za-z][A-Za-z0-9_]*)*")]
    Command,

    #[regex(r"([^ \t\r\f\n{}@]|@[^A-Za-z \t\r\f\n])+")]
    Word,

    #[token("@")]
    Stray,
}

/// Kind of a token produced by [`Source`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TokenKind {
    Word,
    Command,
    Open,
    Close,
    Blank,
    End,
}

/// A text fragment as written in the source (escapes intact)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    /// Whitespace preceded the token
    pub spaced: bool,
    pub line: usize,
}

impl Token {
    pub fn word(text: impl Into<String>, spaced: bool, line: usize) -> Self {
        Self {
            kind: TokenKind::Word,
            text: text.into(),
            spaced,
            line,
        }
    }

    fn marker(kind: TokenKind, spaced: bool, line: usize) -> Self {
        Self {
            kind,
            text: String::new(),
            spaced,
            line,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// The literal text with `@@`, `@{`, `@}` and `@$` resolved
    pub fn unescape(&self) -> String {
        unescape(&self.text)
    }
}

/// Resolve the four literal escapes; any other `@x` passes through
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '@' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(n @ ('@' | '{' | '}' | '$')) => out.push(n),
            Some(n) => {
                out.push('@');
                out.push(n);
            }
            None => out.push('@'),
        }
    }
    out
}

/// Inverse of [`unescape`] for the four special characters
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '@' | '{' | '}' | '$') {
            out.push('@');
        }
        out.push(c);
    }
    out
}

/// Remove `$` line comments and `$* ... *$` block comments, keeping newlines
pub fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '@' => {
                out.push('@');
                if let Some(n) = chars.next() {
                    out.push(n);
                }
            }
            '$' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for b in chars.by_ref() {
                    if b == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && b == '$' {
                        break;
                    }
                    prev = b;
                }
            }
            '$' => {
                while let Some(&n) = chars.peek() {
                    if n == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Token stream over one source file
pub struct Source {
    file: Arc<str>,
    text: String,
    lexemes: Vec<(Lexeme, Range<usize>)>,
    line_starts: Vec<usize>,
    cursor: usize,
    /// Cursor before the last token read from the lexemes
    last_origin: usize,
    pushed: Vec<Token>,
    started: bool,
    after_blank: bool,
}

impl Source {
    pub fn new(file: impl Into<Arc<str>>, raw: &str) -> Self {
        let text = strip_comments(raw);
        let mut lexemes = Vec::new();
        let mut lex = Lexeme::lexer(&text);
        while let Some(result) = lex.next() {
            // Every character is covered by some lexeme; anything odd is text
            let lexeme = result.unwrap_or(Lexeme::Word);
            lexemes.push((lexeme, lex.span()));
        }
        let line_starts = std::iter::once(0)
            .chain(text.match_indices('\n').map(|(i, _)| i + 1))
            .collect();
        Self {
            file: file.into(),
            text,
            lexemes,
            line_starts,
            cursor: 0,
            last_origin: 0,
            pushed: Vec::new(),
            started: false,
            after_blank: false,
        }
    }

    pub fn file(&self) -> &Arc<str> {
        &self.file
    }

    fn line_of(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&start| start <= offset)
    }

    fn current_line(&self) -> usize {
        let offset = self
            .lexemes
            .get(self.cursor)
            .map(|(_, r)| r.start)
            .unwrap_or(self.text.len());
        self.line_of(offset)
    }

    /// Location of the next unread token
    pub fn location(&self) -> Location {
        let line = self
            .pushed
            .last()
            .map(|t| t.line)
            .unwrap_or_else(|| self.current_line());
        Location::new(self.file.clone(), line)
    }

    /// Next token, including blank-line markers
    pub fn get_token_or_blank(&mut self) -> Token {
        if let Some(token) = self.pushed.pop() {
            return token;
        }
        self.last_origin = self.cursor;
        let mut spaced = std::mem::take(&mut self.after_blank);
        let mut newlines = 0;
        while let Some((lexeme, range)) = self.lexemes.get(self.cursor).cloned() {
            self.cursor += 1;
            let line = self.line_of(range.start);
            match lexeme {
                Lexeme::Space => spaced = true,
                Lexeme::Newline => {
                    spaced = true;
                    newlines += 1;
                }
                _ if newlines >= 2 && self.started => {
                    self.cursor -= 1;
                    self.after_blank = true;
                    return Token::marker(TokenKind::Blank, true, line.saturating_sub(1));
                }
                Lexeme::Open => return self.start(Token::marker(TokenKind::Open, spaced, line)),
                Lexeme::Close => return self.start(Token::marker(TokenKind::Close, spaced, line)),
                Lexeme::Command => {
                    let token = Token {
                        kind: TokenKind::Command,
                        text: self.text[range.start + 1..range.end].to_string(),
                        spaced,
                        line,
                    };
                    return self.start(token);
                }
                Lexeme::Word | Lexeme::Stray => {
                    let token = Token::word(&self.text[range], spaced, line);
                    return self.start(token);
                }
            }
        }
        Token::marker(TokenKind::End, spaced, self.line_of(self.text.len()))
    }

    fn start(&mut self, token: Token) -> Token {
        self.started = true;
        token
    }

    /// Next token, skipping blank-line markers
    pub fn get_token(&mut self) -> Token {
        loop {
            let token = self.get_token_or_blank();
            if !token.is(TokenKind::Blank) {
                return token;
            }
        }
    }

    /// Next token; end of input is an error
    pub fn must_get_token(&mut self) -> Result<Token> {
        let token = self.get_token();
        if token.is(TokenKind::End) {
            return Err(DocError::UnexpectedEndOfInput {
                loc: Location::new(self.file.clone(), token.line),
            });
        }
        Ok(token)
    }

    /// Return a token so the next read yields it again
    pub fn push_token(&mut self, token: Token) {
        self.pushed.push(token);
    }

    /// Peek at the next token (blank markers included)
    pub fn peek_token(&mut self) -> &Token {
        if self.pushed.is_empty() {
            let token = self.get_token_or_blank();
            self.pushed.push(token);
        }
        // A token was pushed just above when the stack was empty
        &self.pushed[self.pushed.len() - 1]
    }

    /// Raw escaped text up to the `}` matching an already consumed `{`
    ///
    /// The closing brace is consumed. Nested braces are kept in the text.
    pub fn read_verbatim(&mut self) -> Result<Token> {
        if !self.pushed.is_empty() {
            // Only a peeked token can be pending here; read it again as text
            self.pushed.clear();
            self.cursor = self.last_origin;
            self.after_blank = false;
        }
        let start = self
            .cursor
            .checked_sub(1)
            .and_then(|i| self.lexemes.get(i))
            .map(|(_, r)| r.end)
            .unwrap_or(0);
        let line = self.line_of(start);
        let mut depth = 0usize;
        while let Some((lexeme, range)) = self.lexemes.get(self.cursor).cloned() {
            self.cursor += 1;
            match lexeme {
                Lexeme::Open => depth += 1,
                Lexeme::Close if depth == 0 => {
                    self.started = true;
                    return Ok(Token::word(&self.text[start..range.start], false, line));
                }
                Lexeme::Close => depth -= 1,
                _ => {}
            }
        }
        Err(DocError::UnexpectedEndOfInput {
            loc: Location::new(self.file.clone(), line),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let mut src = Source::new("t", source);
        let mut out = Vec::new();
        loop {
            let token = src.get_token_or_blank();
            out.push(token.kind);
            if token.is(TokenKind::End) {
                return out;
            }
        }
    }

    #[test]
    fn test_words_and_commands() {
        let mut src = Source::new("t", "Hello @em{world}.");
        let hello = src.get_token();
        assert_eq!(hello.text, "Hello");
        assert!(!hello.spaced);
        let em = src.get_token();
        assert_eq!(em.kind, TokenKind::Command);
        assert_eq!(em.text, "em");
        assert!(em.spaced);
        let open = src.get_token();
        assert_eq!(open.kind, TokenKind::Open);
        assert!(!open.spaced);
        assert_eq!(src.get_token().text, "world");
        assert_eq!(src.get_token().kind, TokenKind::Close);
        let dot = src.get_token();
        assert_eq!(dot.text, ".");
        assert!(!dot.spaced);
        assert_eq!(src.get_token().kind, TokenKind::End);
    }

    #[test]
    fn test_command_modifiers_stay_in_name() {
        let mut src = Source::new("t", "@section/-number/center{x}");
        assert_eq!(src.get_token().text, "section/-number/center");
    }

    #[test]
    fn test_blank_line_is_a_token() {
        assert_eq!(
            kinds("one\n\n  \ntwo"),
            vec![TokenKind::Word, TokenKind::Blank, TokenKind::Word, TokenKind::End]
        );
        // Leading blank lines are not paragraph breaks
        assert_eq!(kinds("\n\n\nword"), vec![TokenKind::Word, TokenKind::End]);
    }

    #[test]
    fn test_token_after_blank_is_spaced() {
        let mut src = Source::new("t", "a\n\nb");
        src.get_token();
        assert_eq!(src.get_token_or_blank().kind, TokenKind::Blank);
        assert!(src.get_token().spaced);
    }

    #[test]
    fn test_comments_are_stripped() {
        let mut src = Source::new("t", "a $ comment\nb $* block\ncomment *$ c");
        let a = src.get_token();
        let b = src.get_token();
        let c = src.get_token();
        assert_eq!((a.text.as_str(), b.text.as_str(), c.text.as_str()), ("a", "b", "c"));
        assert_eq!(b.line, 2);
        assert_eq!(c.line, 3);
    }

    #[test]
    fn test_escapes_survive_comment_stripping() {
        let mut src = Source::new("t", "cost @$5 @{x@}");
        src.get_token();
        let price = src.get_token();
        assert_eq!(price.text, "@$5");
        assert_eq!(price.unescape(), "$5");
        assert_eq!(src.get_token().unescape(), "{x}");
    }

    #[test]
    fn test_unescape_round_trip() {
        for literal in ["@", "{", "}", "$", "a@b{c}d$e"] {
            assert_eq!(unescape(&escape(literal)), literal);
        }
        assert_eq!(unescape("@x"), "@x");
    }

    #[test]
    fn test_must_get_token_reports_end() {
        let mut src = Source::new("doc.lp", "one\ntwo");
        src.must_get_token().unwrap();
        src.must_get_token().unwrap();
        let err = src.must_get_token().unwrap_err();
        assert!(matches!(err, DocError::UnexpectedEndOfInput { ref loc } if loc.line == 2));
    }

    #[test]
    fn test_push_token_lookahead() {
        let mut src = Source::new("t", "a b");
        let a = src.get_token();
        src.push_token(a.clone());
        assert_eq!(src.get_token(), a);
        assert_eq!(src.get_token().text, "b");
    }

    #[test]
    fn test_read_verbatim_keeps_nesting_and_spacing() {
        let mut src = Source::new("t", "{a  {b} @} c} tail");
        assert_eq!(src.get_token().kind, TokenKind::Open);
        let raw = src.read_verbatim().unwrap();
        assert_eq!(raw.text, "a  {b} @} c");
        assert_eq!(src.get_token().text, "tail");
    }

    #[test]
    fn test_read_verbatim_after_peek() {
        let mut src = Source::new("t", "{x y}z");
        src.get_token();
        assert_eq!(src.peek_token().text, "x");
        assert_eq!(src.read_verbatim().unwrap().text, "x y");
        assert_eq!(src.get_token().text, "z");
    }

    #[test]
    fn test_read_verbatim_unterminated() {
        let mut src = Source::new("t", "{never closed");
        src.get_token();
        assert!(src.read_verbatim().is_err());
    }
}
