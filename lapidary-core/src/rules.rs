//! Format and length rules registered by `@format` and `@length`

use crate::filter::{Category, FormatProgram, Piece};
use crate::gem::{GemTree, Length, Measure};
use crate::selector::Selector;
use crate::tree::NodeId;

#[derive(Debug, Clone)]
pub struct FormatRule {
    pub selector: Selector,
    pub program: FormatProgram,
}

#[derive(Debug, Clone)]
pub struct LengthRule {
    pub selector: Selector,
    pub length: Length,
}

/// Rules in declaration order
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    formats: Vec<FormatRule>,
    lengths: Vec<LengthRule>,
}

/// The format segments chosen for one gem
#[derive(Debug, Clone, Copy, Default)]
pub struct ResolvedFormat<'a> {
    parts: [Option<&'a [Piece]>; 5],
}

impl<'a> ResolvedFormat<'a> {
    pub fn get(&self, category: Category) -> Option<&'a [Piece]> {
        self.parts[slot(category)]
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(Option::is_none)
    }
}

fn slot(category: Category) -> usize {
    Category::ALL
        .iter()
        .position(|&c| c == category)
        .unwrap_or_default()
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_format(&mut self, selector: Selector, program: FormatProgram) {
        self.formats.push(FormatRule { selector, program });
    }

    pub fn add_length(&mut self, selector: Selector, length: Length) {
        self.lengths.push(LengthRule { selector, length });
    }

    pub fn format_rules(&self) -> &[FormatRule] {
        &self.formats
    }

    pub fn length_rules(&self) -> &[LengthRule] {
        &self.lengths
    }

    pub fn clear(&mut self) {
        self.formats.clear();
        self.lengths.clear();
    }

    /// First matching rule per category, in declaration order
    pub fn format(&self, tree: &GemTree, gem: NodeId) -> ResolvedFormat<'_> {
        let mut resolved = ResolvedFormat::default();
        for rule in &self.formats {
            let missing: Vec<Category> = Category::ALL
                .into_iter()
                .filter(|&c| resolved.get(c).is_none() && rule.program.defines(c))
                .collect();
            if missing.is_empty() || !rule.selector.matches(tree, gem) {
                continue;
            }
            for category in missing {
                resolved.parts[slot(category)] = rule.program.get(category);
            }
            if resolved.parts.iter().all(Option::is_some) {
                break;
            }
        }
        resolved
    }

    /// Explicit length first, then later rules before earlier ones
    pub fn length(&self, tree: &GemTree, gem: NodeId) -> Measure {
        let mut length = tree.get(gem).class().length.unwrap_or_default();
        for rule in self.lengths.iter().rev() {
            if length.is_complete() {
                break;
            }
            if rule.selector.matches(tree, gem) {
                length.merge_missing(&rule.length);
            }
        }
        length.resolve()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Diagnostics, Location};
    use crate::gem::{Gem, GemClass, GemType};

    fn selector(text: &str) -> Selector {
        Selector::compile(text, &Location::default(), &mut Diagnostics::default()).unwrap()
    }

    fn program(text: &str) -> FormatProgram {
        FormatProgram::compile(text, &Location::default(), &mut Diagnostics::default()).unwrap()
    }

    fn list_tree() -> (GemTree, NodeId, NodeId) {
        let mut tree = GemTree::new(Gem::container(GemClass::default()));
        let root = tree.root();
        let list = tree.append(root, Gem::container(GemClass::new(GemType::List)));
        let item = tree.append(list, Gem::container(GemClass::default()));
        (tree, list, item)
    }

    #[test]
    fn test_first_match_per_category() {
        let (tree, _, item) = list_tree();
        let mut rules = RuleSet::new();
        rules.add_format(selector("parent list"), program("@<*@>"));
        rules.add_format(selector(""), program("@<-@>@U"));
        rules.add_format(selector("table"), program("@>never@<"));
        let resolved = rules.format(&tree, item);
        assert_eq!(
            resolved.get(Category::Pre),
            Some(&[Piece::Literal("*".to_string())][..])
        );
        assert_eq!(resolved.get(Category::Main), Some(&[Piece::Upper][..]));
        assert!(resolved.get(Category::Post).is_none());
    }

    #[test]
    fn test_length_inheritance_order() {
        let (mut tree, list, _) = list_tree();
        let mut rules = RuleSet::new();
        rules.add_length(selector("list"), Length::parse(["left", "2", "spacing", "1"]).0);
        rules.add_length(selector("list"), Length::parse(["left", "6"]).0);
        let measure = rules.length(&tree, list);
        assert_eq!((measure.left, measure.spacing, measure.right), (6, 1, 0));

        let explicit = Length::parse(["left", "9"]).0;
        let mut class = GemClass::new(GemType::List);
        class.length = Some(explicit);
        let set = tree.append(tree.root(), Gem::container(class));
        let measure = rules.length(&tree, set);
        assert_eq!((measure.left, measure.spacing), (9, 1));
    }
}
