//! Resolution contexts
//!
//! A context says "which activation of which scope" a node is evaluated in:
//! the same function body evaluated for two different call sites gets two
//! contexts, and therefore two cache entries.

use crate::ast::{FileId, NodeRef};
use crate::core::value::{ArgsId, ContextId, ValueId};
use crate::core::value_set::ValueSet;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Module { file: FileId },
    /// Class body of `class`
    Class { class: ValueId },
    /// One execution of `function` with `arguments`
    Function { function: ValueId, arguments: ArgsId },
    Comprehension,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context {
    pub kind: ContextKind,
    /// Scope-opening node whose body this context evaluates
    pub scope: NodeRef,
    pub parent: Option<ContextId>,
}

impl Context {
    pub fn module(file: FileId, root: NodeRef) -> Self {
        Self {
            kind: ContextKind::Module { file },
            scope: root,
            parent: None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, ContextKind::Function { .. })
    }
}

/// How the parameters of one function execution are supplied
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Arguments {
    /// No call site is known
    Anonymous,
    /// Already evaluated arguments
    Values {
        positional: Vec<ValueSet>,
        keywords: Vec<(String, ValueSet)>,
    },
}

impl Arguments {
    pub fn positional(values: Vec<ValueSet>) -> Self {
        Arguments::Values {
            positional: values,
            keywords: Vec::new(),
        }
    }
}
