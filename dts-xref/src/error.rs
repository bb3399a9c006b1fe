use thiserror::Error;

use crate::tree::NodeId;

/// Structural problems in the source text. Parsing never returns a partial tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no root node found")]
    NoRoot,
    #[error("input ends inside an open block (line {line})")]
    Truncated { line: u32 },
    #[error("syntax error at {line}.{column} near `{near}`")]
    Syntax { line: u32, column: usize, near: String },
}

/// Violations of the tree construction contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("node name is not set yet")]
    NameUnset,
    #[error("node name has already been set to `{0}`")]
    NameAlreadySet(String),
    #[error("node parent has already been set")]
    ParentAlreadySet,
    #[error("a node cannot be its own parent")]
    SelfParent,
    #[error("linking the node would make it its own ancestor")]
    Cycle,
    #[error("{0:?} does not belong to this tree")]
    UnknownNode(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("unable to detect the platform from the root `compatible` property")]
    PlatformUnknown,
    #[error(transparent)]
    Tree(#[from] TreeError),
}
