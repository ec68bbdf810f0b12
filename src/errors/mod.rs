use crate::ast::{FileId, NodeId};
use crate::compiled::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub col: usize,
    pub end_line: usize,
    pub end_col: usize,
}

impl SourceLocation {
    pub fn new(line: usize, col: usize, end_line: usize, end_col: usize) -> Self {
        Self { line, col, end_line, end_col }
    }

    pub fn from_range(start: (usize, usize), end: (usize, usize)) -> Self {
        Self::new(start.0, start.1, end.0, end.1)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Failures of the query API.
///
/// Analysis ambiguity (unresolved names, cycles, bridge failures during
/// inference) is never reported here; those surface as empty or
/// Unknown-bearing value sets.
#[derive(Debug, Error)]
pub enum InferError {
    #[error("{}: parse error: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("unknown file {0}")]
    UnknownFile(FileId),

    #[error("node {} does not exist in {file}", node.0)]
    UnknownNode { file: FileId, node: NodeId },

    #[error("node {} in {file} is a {found}, expected {expected}", node.0)]
    InvalidNode {
        file: FileId,
        node: NodeId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("query cancelled")]
    Cancelled,

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl InferError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InferError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, InferError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, InferError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = InferError::Parse {
            path: PathBuf::from("pkg/mod.py"),
            message: "unexpected indent".to_string(),
        };
        assert_eq!(err.to_string(), "pkg/mod.py: parse error: unexpected indent");

        let err = InferError::UnknownNode {
            file: FileId(3),
            node: NodeId(17),
        };
        assert_eq!(err.to_string(), "node 17 does not exist in file#3");
    }

    #[test]
    fn test_bridge_error_converts() {
        let err: InferError = BridgeError::Timeout { millis: 50 }.into();
        assert!(matches!(err, InferError::Bridge(_)));
        assert!(!err.is_cancelled());
        assert!(InferError::Cancelled.is_cancelled());
    }
}
