//! Selector programs matched against the gem tree
//!
//! A [`GemTest`] is compiled from whitespace separated words. Each word is a
//! pointer move or a predicate, optionally prefixed with `!` (negate) or `^`
//! (holds for some strict ancestor of the pointer). On a move, `!` asserts
//! the move is impossible and leaves the pointer in place, while `^` retries
//! the move from each ancestor until one succeeds. `try … pass` turns the
//! enclosed predicates into an alternative.

use crate::error::{Diagnostics, DocError, Location, Result};
use crate::gem::{Flush, GemTree, GemType, Style};
use crate::tree::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    Parent,
    Next,
    Prev,
    First,
    Last,
    Following,
    Preceding,
    Itself,
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Type(GemType),
    AnyTitle,
    Flush(Flush),
    Text(String),
    Prefix(String),
    Child(usize),
    Nth(usize),
    Style(Style),
    Only(Style),
    Top,
    Me,
    Ancestor,
    Break,
    LineBreak,
    Control,
    Children(usize),
    Width(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Op {
    Move {
        movement: Move,
        count: usize,
        negate: bool,
        escalate: bool,
    },
    Test {
        predicate: Predicate,
        negate: bool,
        escalate: bool,
    },
    Try,
    Pass,
}

/// A compiled selector program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GemTest {
    source: String,
    ops: Vec<Op>,
}

impl GemTest {
    /// Compile the words of one selector term
    pub fn compile(words: &[&str], loc: &Location, diagnostics: &mut Diagnostics) -> Result<Self> {
        let source = words.join(" ");
        let mut ops = Vec::new();
        let mut open_try = false;
        let mut words = words.iter().copied().peekable();

        while let Some(word) = words.next() {
            let (negate, escalate, name) = split_prefixes(word);

            if let Some(movement) = move_named(name) {
                let count = match words.peek().and_then(|w| w.parse::<usize>().ok()) {
                    Some(count) => {
                        words.next();
                        count
                    }
                    None => 1,
                };
                ops.push(Op::Move {
                    movement,
                    count,
                    negate,
                    escalate,
                });
                continue;
            }

            let predicate = match name {
                "try" if open_try => {
                    diagnostics.warn(loc.clone(), format!("nested 'try' ignored in '{}'", source));
                    continue;
                }
                "try" => {
                    open_try = true;
                    ops.push(Op::Try);
                    continue;
                }
                "pass" if open_try => {
                    open_try = false;
                    ops.push(Op::Pass);
                    continue;
                }
                "pass" => {
                    diagnostics.warn(loc.clone(), format!("'pass' without 'try' in '{}'", source));
                    continue;
                }
                "text" | "prefix" => {
                    let Some(arg) = words.next() else {
                        diagnostics.warn(loc.clone(), format!("'{}' needs a word in '{}'", name, source));
                        continue;
                    };
                    if name == "text" {
                        Predicate::Text(arg.to_string())
                    } else {
                        Predicate::Prefix(arg.to_string())
                    }
                }
                "child" | "nth" | "children" | "width" => {
                    let Some(n) = words.next().and_then(|w| w.parse::<usize>().ok()) else {
                        diagnostics.warn(loc.clone(), format!("'{}' needs a number in '{}'", name, source));
                        continue;
                    };
                    match name {
                        "child" => Predicate::Child(n),
                        "nth" => Predicate::Nth(n),
                        "children" => Predicate::Children(n),
                        _ => Predicate::Width(n),
                    }
                }
                "style" | "only" => {
                    let (style, unknown) = Style::parse_list(words.next().unwrap_or_default());
                    for flag in unknown {
                        diagnostics.warn(loc.clone(), format!("unknown style flag '{}' in '{}'", flag, source));
                    }
                    if name == "style" {
                        Predicate::Style(style)
                    } else {
                        Predicate::Only(style)
                    }
                }
                "title" => Predicate::AnyTitle,
                "top" => Predicate::Top,
                "me" => Predicate::Me,
                "ancestor" => Predicate::Ancestor,
                "break" => Predicate::Break,
                "linebreak" => Predicate::LineBreak,
                "control" => Predicate::Control,
                other => match (GemType::from_name(other), Flush::from_name(other)) {
                    (Some(ty), _) => Predicate::Type(ty),
                    (None, Some(flush)) => Predicate::Flush(flush),
                    (None, None) => {
                        diagnostics.warn(
                            loc.clone(),
                            format!("unknown selector token '{}' in '{}'", word, source),
                        );
                        continue;
                    }
                },
            };
            ops.push(Op::Test {
                predicate,
                negate,
                escalate,
            });
        }

        if open_try {
            return Err(DocError::UnterminatedTry {
                loc: loc.clone(),
                test: source,
            });
        }
        Ok(Self { source, ops })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Run the program with the pointer starting at `gem`
    pub fn matches(&self, tree: &GemTree, gem: NodeId) -> bool {
        let mut pointer = Some(gem);
        // Pointer saved at `try` and whether an alternative succeeded
        let mut attempt: Option<(Option<NodeId>, bool)> = None;

        for op in &self.ops {
            match op {
                Op::Try => attempt = Some((pointer, false)),
                Op::Pass => {
                    if let Some((saved, succeeded)) = attempt.take() {
                        if !succeeded {
                            return false;
                        }
                        pointer = saved;
                    }
                }
                Op::Move {
                    movement,
                    count,
                    negate,
                    escalate,
                } => {
                    // `self` recovers from a null pointer
                    let from = if *movement == Move::Itself { Some(gem) } else { pointer };
                    let target = from.and_then(|p| {
                        if *escalate {
                            std::iter::once(p)
                                .chain(tree.ancestors(p))
                                .find_map(|a| step(tree, gem, a, *movement, *count))
                        } else {
                            step(tree, gem, p, *movement, *count)
                        }
                    });
                    pointer = match (*negate, target) {
                        (false, target) => target,
                        (true, None) => from,
                        (true, Some(_)) => None,
                    };
                    if pointer.is_none() && attempt.is_none() {
                        return false;
                    }
                }
                Op::Test {
                    predicate,
                    negate,
                    escalate,
                } => {
                    let holds = pointer.map(|p| {
                        let base = if *escalate {
                            tree.ancestors(p).any(|a| check(tree, gem, a, predicate))
                        } else {
                            check(tree, gem, p, predicate)
                        };
                        base != *negate
                    });
                    match attempt.as_mut() {
                        Some((_, succeeded)) => *succeeded |= holds == Some(true),
                        None if holds != Some(true) => return false,
                        None => {}
                    }
                }
            }
        }
        true
    }
}

fn split_prefixes(word: &str) -> (bool, bool, &str) {
    let mut negate = false;
    let mut escalate = false;
    let mut rest = word;
    loop {
        if let Some(r) = rest.strip_prefix('!') {
            negate = !negate;
            rest = r;
        } else if let Some(r) = rest.strip_prefix('^') {
            escalate = true;
            rest = r;
        } else {
            return (negate, escalate, rest);
        }
    }
}

fn move_named(name: &str) -> Option<Move> {
    Some(match name {
        "parent" => Move::Parent,
        "next" => Move::Next,
        "prev" => Move::Prev,
        "first" => Move::First,
        "last" => Move::Last,
        "following" => Move::Following,
        "preceding" => Move::Preceding,
        "self" => Move::Itself,
        "final" => Move::Final,
        _ => return None,
    })
}

fn step(tree: &GemTree, gem: NodeId, from: NodeId, movement: Move, count: usize) -> Option<NodeId> {
    let mut at = from;
    for _ in 0..count.max(1) {
        at = match movement {
            Move::Parent => tree.parent(at)?,
            Move::Next => tree.next_sibling(at)?,
            Move::Prev => tree.prev_sibling(at)?,
            Move::First => tree.first_child(at)?,
            Move::Last => tree.last_child(at)?,
            Move::Following => {
                let mut next = tree.next_sibling(at)?;
                while tree.get(next).is_control() {
                    next = tree.next_sibling(next)?;
                }
                next
            }
            Move::Preceding => {
                let mut prev = tree.prev_sibling(at)?;
                while tree.get(prev).is_control() {
                    prev = tree.prev_sibling(prev)?;
                }
                prev
            }
            Move::Itself => gem,
            Move::Final => tree.last_child(tree.parent(at)?)?,
        };
    }
    Some(at)
}

/// 1-based position among the parent's non-control children
pub fn ordinal(tree: &GemTree, id: NodeId) -> usize {
    let Some(parent) = tree.parent(id) else {
        return 1;
    };
    tree.children(parent)
        .iter()
        .take_while(|&&c| c != id)
        .filter(|&&c| !tree.get(c).is_control())
        .count()
        + 1
}

fn check(tree: &GemTree, gem: NodeId, at: NodeId, predicate: &Predicate) -> bool {
    let node = tree.get(at);
    match predicate {
        Predicate::Type(ty) => node.ty() == *ty,
        Predicate::AnyTitle => node.ty().title_level().is_some(),
        Predicate::Flush(flush) => node.flush() == *flush,
        Predicate::Text(text) => node.get_text() == text,
        Predicate::Prefix(prefix) => node.get_text().starts_with(prefix.as_str()),
        Predicate::Child(n) => tree.index_in_parent(at).map(|i| i + 1) == Some(*n),
        Predicate::Nth(n) => tree.parent(at).is_some() && !node.is_control() && ordinal(tree, at) == *n,
        Predicate::Style(style) => node.style().contains(*style),
        Predicate::Only(style) => (node.style() & !*style).is_empty(),
        Predicate::Top => at == tree.root(),
        Predicate::Me => at == gem,
        Predicate::Ancestor => tree.is_ancestor(at, gem),
        Predicate::Break => node.is_break(),
        Predicate::LineBreak => node.is_line_break(),
        Predicate::Control => node.is_control(),
        Predicate::Children(n) => tree.children(at).len() == *n,
        Predicate::Width(n) => node.width() == *n,
    }
}

/// An OR of selector terms
///
/// Terms are separated by a comma ending a word or standing alone, so
/// flag lists such as `style em,strong` stay intact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    terms: Vec<GemTest>,
}

impl Selector {
    pub fn compile(text: &str, loc: &Location, diagnostics: &mut Diagnostics) -> Result<Self> {
        let mut terms = Vec::new();
        let mut words: Vec<&str> = Vec::new();
        for word in text.split_whitespace() {
            match word.strip_suffix(',') {
                Some(last) => {
                    if !last.is_empty() {
                        words.push(last);
                    }
                    if !words.is_empty() {
                        terms.push(GemTest::compile(&words, loc, diagnostics)?);
                    }
                    words.clear();
                }
                None => words.push(word),
            }
        }
        if !words.is_empty() {
            terms.push(GemTest::compile(&words, loc, diagnostics)?);
        }
        Ok(Self { terms })
    }

    /// True when any term matches; an empty selector matches everything
    pub fn matches(&self, tree: &GemTree, gem: NodeId) -> bool {
        self.terms.is_empty() || self.terms.iter().any(|term| term.matches(tree, gem))
    }

    pub fn terms(&self) -> &[GemTest] {
        &self.terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gem::{Gem, GemClass};

    struct Fixture {
        tree: GemTree,
        table: NodeId,
        row: NodeId,
        cells: [NodeId; 3],
        text: NodeId,
    }

    fn fixture() -> Fixture {
        let mut tree = GemTree::new(Gem::container(GemClass::default()));
        let root = tree.root();
        let table = tree.append(root, Gem::container(GemClass::new(GemType::Table)).with_width(30));
        let row = tree.append(table, Gem::container(GemClass::default()));
        let a = tree.append(row, Gem::container(GemClass::default()).with_width(10));
        tree.append(row, Gem::line_break(GemClass::default()));
        let b = tree.append(row, Gem::container(GemClass::default()).with_width(20));
        let c = tree.append(row, Gem::container(GemClass::default()));
        let text = tree.append(
            b,
            Gem::text("Hello", GemClass::default().with_style(Style::EM | Style::CAPS), false),
        );
        Fixture {
            tree,
            table,
            row,
            cells: [a, b, c],
            text,
        }
    }

    fn test(text: &str) -> GemTest {
        let words: Vec<&str> = text.split_whitespace().collect();
        GemTest::compile(&words, &Location::default(), &mut Diagnostics::default()).unwrap()
    }

    fn matching(f: &Fixture, text: &str) -> Vec<NodeId> {
        let t = test(text);
        f.tree
            .descendants(f.tree.root())
            .into_iter()
            .filter(|&n| t.matches(&f.tree, n))
            .collect()
    }

    #[test]
    fn test_type_and_negation() {
        let f = fixture();
        assert_eq!(matching(&f, "table"), vec![f.table]);
        let others = matching(&f, "!table");
        assert_eq!(others.len(), f.tree.len() - 1);
        assert!(!others.contains(&f.table));
    }

    #[test]
    fn test_child_counts_controls() {
        let f = fixture();
        assert_eq!(matching(&f, "child 3"), vec![f.cells[1]]);
        assert_eq!(matching(&f, "nth 2"), vec![f.cells[1]]);
        assert!(test("child 2").matches(&f.tree, f.tree.children(f.row)[1]));
    }

    #[test]
    fn test_moves_and_escalation() {
        let f = fixture();
        assert_eq!(matching(&f, "!control parent parent table"), f.cells.to_vec());
        assert!(test("^table").matches(&f.tree, f.text));
        assert!(!test("!^table").matches(&f.tree, f.text));
        assert!(!test("parent 2 me").matches(&f.tree, f.row));
        assert!(test("parent 3 table self me").matches(&f.tree, f.text));
        assert!(test("following width 20").matches(&f.tree, f.cells[0]));
        assert!(test("final children 0").matches(&f.tree, f.cells[0]));
        assert!(!test("parent first child 1 ancestor").matches(&f.tree, f.text));
        assert!(test("parent ancestor").matches(&f.tree, f.text));
        assert!(!test("parent 9 top").matches(&f.tree, f.text));
        assert!(test("parent 3 top").matches(&f.tree, f.cells[0]));
    }

    #[test]
    fn test_negated_and_escalated_moves() {
        let f = fixture();
        assert!(test("parent table").matches(&f.tree, f.row));
        assert!(!test("!parent table").matches(&f.tree, f.row));
        assert_eq!(matching(&f, "!parent"), vec![f.tree.root()]);
        assert!(test("!next").matches(&f.tree, f.cells[2]));
        assert!(!test("!next").matches(&f.tree, f.cells[0]));
        // The text has no sibling, its cell does
        assert!(!test("next").matches(&f.tree, f.text));
        assert!(test("^next children 0").matches(&f.tree, f.text));
        assert!(test("!^next").matches(&f.tree, f.cells[2]));
    }

    #[test]
    fn test_style_and_text() {
        let f = fixture();
        assert!(test("style em").matches(&f.tree, f.text));
        assert!(!test("style em,strong").matches(&f.tree, f.text));
        assert!(test("only em,caps,code").matches(&f.tree, f.text));
        assert!(!test("only em").matches(&f.tree, f.text));
        assert!(test("text Hello prefix He").matches(&f.tree, f.text));
        assert!(test("!control").matches(&f.tree, f.text));
        assert!(test("linebreak").matches(&f.tree, f.tree.children(f.row)[1]));
    }

    #[test]
    fn test_try_pass_is_an_alternative() {
        let f = fixture();
        let alt = test("try list table pass");
        assert!(alt.matches(&f.tree, f.table));
        assert!(!alt.matches(&f.tree, f.row));
        // A null pointer inside try is a failed attempt only
        assert!(test("try parent 9 table self width 10 pass").matches(&f.tree, f.cells[0]));
        assert!(!test("try parent 9 table pass").matches(&f.tree, f.cells[0]));
        assert!(test("try next width 99 self width 10 pass").matches(&f.tree, f.cells[0]));
    }

    #[test]
    fn test_unterminated_try_is_fatal() {
        let err = GemTest::compile(&["try", "table"], &Location::default(), &mut Diagnostics::default())
            .unwrap_err();
        assert!(matches!(err, DocError::UnterminatedTry { .. }));
    }

    #[test]
    fn test_unknown_token_warns() {
        let mut diagnostics = Diagnostics::default();
        let t = GemTest::compile(&["sparkly", "table"], &Location::default(), &mut diagnostics).unwrap();
        assert_eq!(diagnostics.entries().len(), 1);
        assert_eq!(t.source(), "sparkly table");
    }

    #[test]
    fn test_selector_terms() {
        let f = fixture();
        let mut diagnostics = Diagnostics::default();
        let selector = Selector::compile("table, style em,caps", &Location::default(), &mut diagnostics).unwrap();
        assert_eq!(selector.terms().len(), 2);
        assert!(selector.matches(&f.tree, f.table));
        assert!(selector.matches(&f.tree, f.text));
        assert!(!selector.matches(&f.tree, f.row));
        let any = Selector::compile("  ", &Location::default(), &mut diagnostics).unwrap();
        assert!(any.matches(&f.tree, f.row));
        assert!(diagnostics.is_empty());
    }
}
