//! Syntax tree produced by the parser, borrowing from the source text.
//!
//! It is converted into an owned [`Tree`](crate::tree::Tree) once parsing succeeds.

pub(crate) const STATUS_DISABLED: &str = "\"disabled\"";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Node<'s> {
    pub name: &'s str,
    pub contents: NodeContents<'s>,
}

impl<'s> Node<'s> {
    /// Whether the node's own (last) `status` property reads `"disabled"`.
    pub fn is_disabled(&self) -> bool {
        self.contents
            .props
            .iter()
            .rev()
            .find(|p| p.name == "status")
            .map_or(false, |p| p.value == STATUS_DISABLED)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct NodeContents<'s> {
    pub props: Vec<Property<'s>>,
    pub children: Vec<Node<'s>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Property<'s> {
    pub name: &'s str,
    pub value: &'s str,
}

impl<'s> Property<'s> {
    /// Split a statement (without its terminator) at the first `=`.
    ///
    /// Both sides are trimmed; a statement without `=` yields an empty value.
    pub fn from_statement(statement: &'s str) -> Self {
        match statement.split_once('=') {
            Some((name, value)) => Property {
                name: name.trim(),
                value: value.trim(),
            },
            None => Property {
                name: statement.trim(),
                value: "",
            },
        }
    }
}
