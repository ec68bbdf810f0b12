//! Syntax tree consumed by the inference engine
//!
//! The external parser's output is lowered into an immutable arena tree with
//! parent links and byte ranges; every analysis addresses nodes by id.

pub mod location;
pub mod lower;
pub mod tree;

pub use location::LineIndex;
pub use lower::lower_module;
pub use tree::{
    BinaryOp, BoolOp, CompareOp, Constant, ExprContext, Node, NodeId, NodeKind, ParamKind,
    SyntaxTree, TextSpan, TreeBuilder, UnaryOp,
};

/// Identifies one file snapshot loaded into a session.
///
/// Re-parsing a file allocates a fresh id; ids are never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct FileId(pub u32);

/// A node inside a specific file snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub file: FileId,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(file: FileId, node: NodeId) -> Self {
        Self { file, node }
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "file#{}", self.0)
    }
}
