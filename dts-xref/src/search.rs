//! Whole-tree searches by node name or property statement.

use std::str::FromStr;

use regex::Regex;

use crate::tree::{NodeId, Tree};

/// A regular expression that has to match the entire text.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&format!("^(?:{pattern})$")).map(Self)
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl FromStr for Pattern {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Properties of one node that matched a statement pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyMatch<'t> {
    pub node: NodeId,
    /// `(key, value)` pairs, in order of first appearance in the node.
    pub props: Vec<(&'t str, &'t str)>,
}

impl Tree {
    /// Every node whose full name matches `pattern`, in pre-order.
    pub fn find_nodes_by_name(&self, pattern: &Pattern) -> Vec<NodeId> {
        self.descendants(self.root())
            .filter(|&id| {
                self.node(id)
                    .name()
                    .map_or(false, |name| pattern.is_match(name))
            })
            .collect()
    }

    /// Every node with at least one property whose statement (`key = value`, or `key`
    /// when valueless) matches `pattern`, in pre-order.
    pub fn find_property_matches(&self, pattern: &Pattern) -> Vec<PropertyMatch<'_>> {
        self.find_property_matches_under(self.root(), pattern)
    }

    /// Same as [`Tree::find_property_matches`], limited to the subtree rooted at `from`.
    pub fn find_property_matches_under(
        &self,
        from: NodeId,
        pattern: &Pattern,
    ) -> Vec<PropertyMatch<'_>> {
        self.descendants(from)
            .filter_map(|id| {
                let props: Vec<_> = self
                    .node(id)
                    .effective_props()
                    .into_iter()
                    .filter(|(key, value)| {
                        if value.is_empty() {
                            pattern.is_match(key)
                        } else {
                            pattern.is_match(&format!("{key} = {value}"))
                        }
                    })
                    .collect();

                (!props.is_empty()).then_some(PropertyMatch { node: id, props })
            })
            .collect()
    }
}
