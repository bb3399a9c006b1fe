//! Arena-backed device tree.
//!
//! Nodes live in a single vector owned by [`Tree`] and refer to each other through
//! [`NodeId`] handles. Parent links are plain handles, so the structure has no
//! ownership cycles.

use std::cell::OnceCell;
use std::collections::{HashMap, HashSet};

use crate::ast;
use crate::ast::STATUS_DISABLED;
use crate::error::TreeError;

/// Handle of a node inside the [`Tree`] that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Default)]
pub struct Node {
    name: Option<String>,
    props: Vec<Property>,
    // key -> index of its last occurrence in `props`
    lookup: OnceCell<HashMap<String, usize>>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    pub fn name(&self) -> Result<&str, TreeError> {
        self.name.as_deref().ok_or(TreeError::NameUnset)
    }

    /// All properties in insertion order, duplicates included.
    pub fn props(&self) -> &[Property] {
        &self.props
    }

    /// Value of the last property named `key`.
    ///
    /// A valueless property yields `Some("")`, a missing one `None`.
    pub fn prop(&self, key: &str) -> Option<&str> {
        self.lookup()
            .get(key)
            .map(|&i| self.props[i].value.as_str())
    }

    /// One entry per distinct key, in order of first appearance, carrying the last value.
    pub fn effective_props(&self) -> Vec<(&str, &str)> {
        let lookup = self.lookup();
        let mut seen = HashSet::new();

        self.props
            .iter()
            .filter(|p| seen.insert(p.key.as_str()))
            .map(|p| (p.key.as_str(), self.props[lookup[&p.key]].value.as_str()))
            .collect()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_disabled(&self) -> bool {
        self.prop("status") == Some(STATUS_DISABLED)
    }

    fn lookup(&self) -> &HashMap<String, usize> {
        self.lookup.get_or_init(|| {
            self.props
                .iter()
                .enumerate()
                .map(|(i, p)| (p.key.clone(), i))
                .collect()
        })
    }

    fn push_statement(&mut self, key: &str, value: &str) {
        self.props.push(Property {
            key: key.to_string(),
            value: value.to_string(),
        });
        self.lookup.take();
    }
}

#[derive(Debug)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

impl Tree {
    /// Create a tree holding a lone root node named `/`.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                name: Some("/".to_string()),
                ..Default::default()
            }],
        }
    }

    pub(crate) fn from_ast(root: &ast::Node, keep_disabled: bool) -> Self {
        fn insert(
            tree: &mut Tree,
            node: &ast::Node,
            parent: Option<NodeId>,
            keep_disabled: bool,
        ) -> NodeId {
            let id = NodeId(tree.nodes.len());
            tree.nodes.push(Node {
                name: Some(node.name.to_string()),
                props: node
                    .contents
                    .props
                    .iter()
                    .map(|p| Property {
                        key: p.name.to_string(),
                        value: p.value.to_string(),
                    })
                    .collect(),
                parent,
                ..Default::default()
            });

            for child in &node.contents.children {
                if keep_disabled || !child.is_disabled() {
                    let child = insert(tree, child, Some(id), keep_disabled);
                    tree.nodes[id.0].children.push(child);
                }
            }

            id
        }

        let mut tree = Tree { nodes: Vec::new() };
        insert(&mut tree, root, None, keep_disabled);
        tree
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Borrow a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not handed out by this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Allocate a detached, unnamed node.
    pub fn new_node(&mut self) -> NodeId {
        self.nodes.push(Node::default());
        NodeId(self.nodes.len() - 1)
    }

    pub fn set_name(&mut self, id: NodeId, name: &str) -> Result<(), TreeError> {
        let node = self.node_mut(id)?;
        if let Some(existing) = &node.name {
            return Err(TreeError::NameAlreadySet(existing.clone()));
        }
        node.name = Some(name.to_string());
        Ok(())
    }

    /// Append a property statement such as `reg = <0x2>;` or `bias-pull-down`.
    ///
    /// The trailing `;` is optional; key and value are trimmed.
    pub fn add_statement(&mut self, id: NodeId, statement: &str) -> Result<(), TreeError> {
        let statement = statement.trim_end().trim_end_matches(';');
        let node = self.node_mut(id)?;
        if !statement.trim().is_empty() {
            let prop = ast::Property::from_statement(statement);
            node.push_statement(prop.name, prop.value);
        }
        Ok(())
    }

    /// Link `child` under `parent`. A node's parent can only be set once.
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), TreeError> {
        self.node_mut(parent)?;
        if self.node_mut(child)?.parent.is_some() {
            return Err(TreeError::ParentAlreadySet);
        }
        if parent == child {
            return Err(TreeError::SelfParent);
        }
        if self.ancestors(parent).any(|a| a == child) {
            return Err(TreeError::Cycle);
        }

        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    /// Strict ancestors of `id`, closest first.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.node(id).parent, move |&p| self.node(p).parent)
    }

    /// Whether neither `id` nor any of its ancestors is disabled.
    pub fn is_live(&self, id: NodeId) -> bool {
        !self.node(id).is_disabled() && self.ancestors(id).all(|a| !self.node(a).is_disabled())
    }

    /// `from` and all of its descendants, in pre-order.
    pub fn descendants(&self, from: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![from],
            skip_disabled: false,
        }
    }

    /// Like [`Tree::descendants`], but disabled nodes and their subtrees are skipped.
    pub fn enabled_descendants(&self, from: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![from],
            skip_disabled: true,
        }
    }

    /// Render the tree back to source text.
    ///
    /// Disabled subtrees are left out unless `with_disabled` is set.
    pub fn dump(&self, with_disabled: bool) -> Result<String, TreeError> {
        let mut out = String::new();
        self.dump_node(self.root(), 0, with_disabled, &mut out)?;
        Ok(out)
    }

    fn dump_node(
        &self,
        id: NodeId,
        depth: usize,
        with_disabled: bool,
        out: &mut String,
    ) -> Result<(), TreeError> {
        let node = self.node(id);
        let name = node.name()?;
        if !with_disabled && node.is_disabled() {
            return Ok(());
        }

        let indent = "\t".repeat(depth);
        out.push_str(&format!("{indent}{name} {{\n"));
        for prop in &node.props {
            if prop.value.is_empty() {
                out.push_str(&format!("{indent}\t{};\n", prop.key));
            } else {
                out.push_str(&format!("{indent}\t{} = {};\n", prop.key, prop.value));
            }
        }
        for &child in &node.children {
            if !with_disabled && self.node(child).is_disabled() {
                continue;
            }
            out.push('\n');
            self.dump_node(child, depth + 1, with_disabled, out)?;
        }
        out.push_str(&format!("{indent}}};\n"));

        Ok(())
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, TreeError> {
        self.nodes.get_mut(id.0).ok_or(TreeError::UnknownNode(id))
    }
}

/// Pre-order walk returned by [`Tree::descendants`] and [`Tree::enabled_descendants`].
pub struct Descendants<'t> {
    tree: &'t Tree,
    stack: Vec<NodeId>,
    skip_disabled: bool,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        loop {
            let id = self.stack.pop()?;
            let node = self.tree.node(id);
            if self.skip_disabled && node.is_disabled() {
                continue;
            }
            self.stack.extend(node.children.iter().rev());
            return Some(id);
        }
    }
}
