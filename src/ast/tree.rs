//! Arena syntax tree consumed by the inference engine
//!
//! Every node lives in a flat `Vec` and is addressed by a [`NodeId`]. Parent
//! links and child lists are filled in once at construction time, after which
//! the tree is immutable and shared behind an `Arc` for the lifetime of every
//! analysis that touches it.

use crate::ast::location::LineIndex;
use crate::errors::SourceLocation;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Index of a node inside one [`SyntaxTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Half-open byte range `[start, end)` into the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextSpan {
    pub start: u32,
    pub end: u32,
}

impl TextSpan {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, offset: u32) -> bool {
        self.start <= offset && offset < self.end.max(self.start + 1)
    }

    pub fn len(&self) -> u32 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprContext {
    Load,
    Store,
    Del,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    /// `None` when the literal does not fit in an `i64`
    Int(Option<i64>),
    Float(f64),
    Complex,
    Str(String),
    Bytes(Vec<u8>),
    Ellipsis,
    Tuple(Vec<Constant>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    FloorDiv,
}

impl BinaryOp {
    /// Name of the dunder method implementing the operator
    pub fn dunder(self) -> &'static str {
        match self {
            BinaryOp::Add => "__add__",
            BinaryOp::Sub => "__sub__",
            BinaryOp::Mult => "__mul__",
            BinaryOp::MatMult => "__matmul__",
            BinaryOp::Div => "__truediv__",
            BinaryOp::Mod => "__mod__",
            BinaryOp::Pow => "__pow__",
            BinaryOp::LShift => "__lshift__",
            BinaryOp::RShift => "__rshift__",
            BinaryOp::BitOr => "__or__",
            BinaryOp::BitXor => "__xor__",
            BinaryOp::BitAnd => "__and__",
            BinaryOp::FloorDiv => "__floordiv__",
        }
    }

    /// Reflected dunder, tried on the right operand
    pub fn reflected(self) -> &'static str {
        match self {
            BinaryOp::Add => "__radd__",
            BinaryOp::Sub => "__rsub__",
            BinaryOp::Mult => "__rmul__",
            BinaryOp::MatMult => "__rmatmul__",
            BinaryOp::Div => "__rtruediv__",
            BinaryOp::Mod => "__rmod__",
            BinaryOp::Pow => "__rpow__",
            BinaryOp::LShift => "__rlshift__",
            BinaryOp::RShift => "__rrshift__",
            BinaryOp::BitOr => "__ror__",
            BinaryOp::BitXor => "__rxor__",
            BinaryOp::BitAnd => "__rand__",
            BinaryOp::FloorDiv => "__rfloordiv__",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Invert,
    Not,
    UAdd,
    USub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    PositionalOnly,
    Normal,
    VarArgs,
    KeywordOnly,
    VarKeywords,
}

/// One variant per syntactic form the engine understands.
///
/// Child references are stored inline so evaluators can pattern-match the
/// exact shape they need; [`Node::children`] lists the same ids in source order.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Module {
        body: Vec<NodeId>,
    },

    // Statements
    FunctionDef {
        name: String,
        is_async: bool,
        decorators: Vec<NodeId>,
        params: Vec<NodeId>,
        returns: Option<NodeId>,
        body: Vec<NodeId>,
    },
    ClassDef {
        name: String,
        decorators: Vec<NodeId>,
        bases: Vec<NodeId>,
        keywords: Vec<NodeId>,
        body: Vec<NodeId>,
    },
    Param {
        name: String,
        kind: ParamKind,
        annotation: Option<NodeId>,
        default: Option<NodeId>,
    },
    Return {
        value: Option<NodeId>,
    },
    Delete {
        targets: Vec<NodeId>,
    },
    Assign {
        targets: Vec<NodeId>,
        value: NodeId,
    },
    AugAssign {
        target: NodeId,
        op: BinaryOp,
        value: NodeId,
    },
    AnnAssign {
        target: NodeId,
        annotation: NodeId,
        value: Option<NodeId>,
    },
    For {
        target: NodeId,
        iter: NodeId,
        body: Vec<NodeId>,
        orelse: Vec<NodeId>,
        is_async: bool,
    },
    While {
        test: NodeId,
        body: Vec<NodeId>,
        orelse: Vec<NodeId>,
    },
    If {
        test: NodeId,
        body: Vec<NodeId>,
        orelse: Vec<NodeId>,
    },
    With {
        items: Vec<NodeId>,
        body: Vec<NodeId>,
        is_async: bool,
    },
    WithItem {
        context: NodeId,
        target: Option<NodeId>,
    },
    Match {
        subject: NodeId,
        cases: Vec<NodeId>,
    },
    MatchCase {
        captures: Vec<NodeId>,
        guard: Option<NodeId>,
        body: Vec<NodeId>,
    },
    /// A name bound by a match pattern, optionally constrained by a class pattern.
    /// `whole` is set when the capture binds the subject itself rather than a part of it.
    Capture {
        name: String,
        class: Option<NodeId>,
        whole: bool,
    },
    Raise {
        exc: Option<NodeId>,
        cause: Option<NodeId>,
    },
    Try {
        body: Vec<NodeId>,
        handlers: Vec<NodeId>,
        orelse: Vec<NodeId>,
        finalbody: Vec<NodeId>,
    },
    ExceptHandler {
        type_: Option<NodeId>,
        name: Option<String>,
        body: Vec<NodeId>,
    },
    Assert {
        test: NodeId,
        msg: Option<NodeId>,
    },
    Import {
        names: Vec<NodeId>,
    },
    ImportFrom {
        module: Option<String>,
        level: u32,
        names: Vec<NodeId>,
    },
    Alias {
        name: String,
        asname: Option<String>,
    },
    Global {
        names: Vec<String>,
    },
    Nonlocal {
        names: Vec<String>,
    },
    ExprStmt {
        value: NodeId,
    },
    Pass,
    Break,
    Continue,

    // Expressions
    BoolOp {
        op: BoolOp,
        values: Vec<NodeId>,
    },
    NamedExpr {
        target: NodeId,
        value: NodeId,
    },
    BinOp {
        left: NodeId,
        op: BinaryOp,
        right: NodeId,
    },
    UnaryOp {
        op: UnaryOp,
        operand: NodeId,
    },
    Lambda {
        params: Vec<NodeId>,
        body: NodeId,
    },
    IfExp {
        test: NodeId,
        body: NodeId,
        orelse: NodeId,
    },
    Dict {
        keys: Vec<Option<NodeId>>,
        values: Vec<NodeId>,
    },
    Set {
        elts: Vec<NodeId>,
    },
    ListComp {
        elt: NodeId,
        generators: Vec<NodeId>,
    },
    SetComp {
        elt: NodeId,
        generators: Vec<NodeId>,
    },
    GeneratorExp {
        elt: NodeId,
        generators: Vec<NodeId>,
    },
    DictComp {
        key: NodeId,
        value: NodeId,
        generators: Vec<NodeId>,
    },
    Comprehension {
        target: NodeId,
        iter: NodeId,
        ifs: Vec<NodeId>,
        is_async: bool,
    },
    Await {
        value: NodeId,
    },
    Yield {
        value: Option<NodeId>,
    },
    YieldFrom {
        value: NodeId,
    },
    Compare {
        left: NodeId,
        ops: Vec<CompareOp>,
        comparators: Vec<NodeId>,
    },
    Call {
        func: NodeId,
        args: Vec<NodeId>,
        keywords: Vec<NodeId>,
    },
    Keyword {
        arg: Option<String>,
        value: NodeId,
    },
    FormattedValue {
        value: NodeId,
    },
    JoinedStr {
        values: Vec<NodeId>,
    },
    Constant(Constant),
    Attribute {
        value: NodeId,
        attr: String,
        ctx: ExprContext,
    },
    Subscript {
        value: NodeId,
        slice: NodeId,
        ctx: ExprContext,
    },
    Starred {
        value: NodeId,
        ctx: ExprContext,
    },
    Name {
        id: String,
        ctx: ExprContext,
    },
    List {
        elts: Vec<NodeId>,
        ctx: ExprContext,
    },
    Tuple {
        elts: Vec<NodeId>,
        ctx: ExprContext,
    },
    Slice {
        lower: Option<NodeId>,
        upper: Option<NodeId>,
        step: Option<NodeId>,
    },

    /// Anything the lowering pass does not model; always evaluates to nothing
    Unsupported {
        what: String,
    },
}

impl NodeKind {
    /// Child ids in source order
    pub fn child_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        let opt = |out: &mut Vec<NodeId>, id: &Option<NodeId>| {
            if let Some(id) = id {
                out.push(*id);
            }
        };

        match self {
            NodeKind::Module { body } => out.extend(body),
            NodeKind::FunctionDef { decorators, params, returns, body, .. } => {
                out.extend(decorators);
                out.extend(params);
                opt(&mut out, returns);
                out.extend(body);
            }
            NodeKind::ClassDef { decorators, bases, keywords, body, .. } => {
                out.extend(decorators);
                out.extend(bases);
                out.extend(keywords);
                out.extend(body);
            }
            NodeKind::Param { annotation, default, .. } => {
                opt(&mut out, annotation);
                opt(&mut out, default);
            }
            NodeKind::Return { value } => opt(&mut out, value),
            NodeKind::Delete { targets } => out.extend(targets),
            NodeKind::Assign { targets, value } => {
                out.extend(targets);
                out.push(*value);
            }
            NodeKind::AugAssign { target, value, .. } => {
                out.push(*target);
                out.push(*value);
            }
            NodeKind::AnnAssign { target, annotation, value } => {
                out.push(*target);
                out.push(*annotation);
                opt(&mut out, value);
            }
            NodeKind::For { target, iter, body, orelse, .. } => {
                out.push(*target);
                out.push(*iter);
                out.extend(body);
                out.extend(orelse);
            }
            NodeKind::While { test, body, orelse } | NodeKind::If { test, body, orelse } => {
                out.push(*test);
                out.extend(body);
                out.extend(orelse);
            }
            NodeKind::With { items, body, .. } => {
                out.extend(items);
                out.extend(body);
            }
            NodeKind::WithItem { context, target } => {
                out.push(*context);
                opt(&mut out, target);
            }
            NodeKind::Match { subject, cases } => {
                out.push(*subject);
                out.extend(cases);
            }
            NodeKind::MatchCase { captures, guard, body } => {
                out.extend(captures);
                opt(&mut out, guard);
                out.extend(body);
            }
            NodeKind::Capture { class, .. } => opt(&mut out, class),
            NodeKind::Raise { exc, cause } => {
                opt(&mut out, exc);
                opt(&mut out, cause);
            }
            NodeKind::Try { body, handlers, orelse, finalbody } => {
                out.extend(body);
                out.extend(handlers);
                out.extend(orelse);
                out.extend(finalbody);
            }
            NodeKind::ExceptHandler { type_, body, .. } => {
                opt(&mut out, type_);
                out.extend(body);
            }
            NodeKind::Assert { test, msg } => {
                out.push(*test);
                opt(&mut out, msg);
            }
            NodeKind::Import { names } | NodeKind::ImportFrom { names, .. } => out.extend(names),
            NodeKind::ExprStmt { value } => out.push(*value),
            NodeKind::BoolOp { values, .. } => out.extend(values),
            NodeKind::NamedExpr { target, value } => {
                out.push(*target);
                out.push(*value);
            }
            NodeKind::BinOp { left, right, .. } => {
                out.push(*left);
                out.push(*right);
            }
            NodeKind::UnaryOp { operand, .. } => out.push(*operand),
            NodeKind::Lambda { params, body } => {
                out.extend(params);
                out.push(*body);
            }
            NodeKind::IfExp { test, body, orelse } => {
                out.push(*body);
                out.push(*test);
                out.push(*orelse);
            }
            NodeKind::Dict { keys, values } => {
                for (key, value) in keys.iter().zip(values) {
                    opt(&mut out, key);
                    out.push(*value);
                }
            }
            NodeKind::Set { elts } => out.extend(elts),
            NodeKind::ListComp { elt, generators }
            | NodeKind::SetComp { elt, generators }
            | NodeKind::GeneratorExp { elt, generators } => {
                out.push(*elt);
                out.extend(generators);
            }
            NodeKind::DictComp { key, value, generators } => {
                out.push(*key);
                out.push(*value);
                out.extend(generators);
            }
            NodeKind::Comprehension { target, iter, ifs, .. } => {
                out.push(*target);
                out.push(*iter);
                out.extend(ifs);
            }
            NodeKind::Await { value } | NodeKind::YieldFrom { value } => out.push(*value),
            NodeKind::Yield { value } => opt(&mut out, value),
            NodeKind::Compare { left, comparators, .. } => {
                out.push(*left);
                out.extend(comparators);
            }
            NodeKind::Call { func, args, keywords } => {
                out.push(*func);
                out.extend(args);
                out.extend(keywords);
            }
            NodeKind::Keyword { value, .. } => out.push(*value),
            NodeKind::FormattedValue { value } => out.push(*value),
            NodeKind::JoinedStr { values } => out.extend(values),
            NodeKind::Attribute { value, .. } | NodeKind::Starred { value, .. } => out.push(*value),
            NodeKind::Subscript { value, slice, .. } => {
                out.push(*value);
                out.push(*slice);
            }
            NodeKind::List { elts, .. } | NodeKind::Tuple { elts, .. } => out.extend(elts),
            NodeKind::Slice { lower, upper, step } => {
                opt(&mut out, lower);
                opt(&mut out, upper);
                opt(&mut out, step);
            }
            NodeKind::Alias { .. }
            | NodeKind::Global { .. }
            | NodeKind::Nonlocal { .. }
            | NodeKind::Pass
            | NodeKind::Break
            | NodeKind::Continue
            | NodeKind::Constant(_)
            | NodeKind::Name { .. }
            | NodeKind::Unsupported { .. } => {}
        }

        out
    }

    /// Short, stable label used in logs and descriptors
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Module { .. } => "module",
            NodeKind::FunctionDef { .. } => "function_def",
            NodeKind::ClassDef { .. } => "class_def",
            NodeKind::Param { .. } => "param",
            NodeKind::Return { .. } => "return",
            NodeKind::Delete { .. } => "delete",
            NodeKind::Assign { .. } => "assign",
            NodeKind::AugAssign { .. } => "aug_assign",
            NodeKind::AnnAssign { .. } => "ann_assign",
            NodeKind::For { .. } => "for",
            NodeKind::While { .. } => "while",
            NodeKind::If { .. } => "if",
            NodeKind::With { .. } => "with",
            NodeKind::WithItem { .. } => "with_item",
            NodeKind::Match { .. } => "match",
            NodeKind::MatchCase { .. } => "match_case",
            NodeKind::Capture { .. } => "capture",
            NodeKind::Raise { .. } => "raise",
            NodeKind::Try { .. } => "try",
            NodeKind::ExceptHandler { .. } => "except_handler",
            NodeKind::Assert { .. } => "assert",
            NodeKind::Import { .. } => "import",
            NodeKind::ImportFrom { .. } => "import_from",
            NodeKind::Alias { .. } => "alias",
            NodeKind::Global { .. } => "global",
            NodeKind::Nonlocal { .. } => "nonlocal",
            NodeKind::ExprStmt { .. } => "expr_stmt",
            NodeKind::Pass => "pass",
            NodeKind::Break => "break",
            NodeKind::Continue => "continue",
            NodeKind::BoolOp { .. } => "bool_op",
            NodeKind::NamedExpr { .. } => "named_expr",
            NodeKind::BinOp { .. } => "bin_op",
            NodeKind::UnaryOp { .. } => "unary_op",
            NodeKind::Lambda { .. } => "lambda",
            NodeKind::IfExp { .. } => "if_exp",
            NodeKind::Dict { .. } => "dict",
            NodeKind::Set { .. } => "set",
            NodeKind::ListComp { .. } => "list_comp",
            NodeKind::SetComp { .. } => "set_comp",
            NodeKind::GeneratorExp { .. } => "generator_exp",
            NodeKind::DictComp { .. } => "dict_comp",
            NodeKind::Comprehension { .. } => "comprehension",
            NodeKind::Await { .. } => "await",
            NodeKind::Yield { .. } => "yield",
            NodeKind::YieldFrom { .. } => "yield_from",
            NodeKind::Compare { .. } => "compare",
            NodeKind::Call { .. } => "call",
            NodeKind::Keyword { .. } => "keyword",
            NodeKind::FormattedValue { .. } => "formatted_value",
            NodeKind::JoinedStr { .. } => "joined_str",
            NodeKind::Constant(_) => "constant",
            NodeKind::Attribute { .. } => "attribute",
            NodeKind::Subscript { .. } => "subscript",
            NodeKind::Starred { .. } => "starred",
            NodeKind::Name { .. } => "name",
            NodeKind::List { .. } => "list",
            NodeKind::Tuple { .. } => "tuple",
            NodeKind::Slice { .. } => "slice",
            NodeKind::Unsupported { .. } => "unsupported",
        }
    }

    /// Whether the node opens its own scope
    pub fn is_scope(&self) -> bool {
        matches!(
            self,
            NodeKind::Module { .. }
                | NodeKind::FunctionDef { .. }
                | NodeKind::ClassDef { .. }
                | NodeKind::Lambda { .. }
                | NodeKind::ListComp { .. }
                | NodeKind::SetComp { .. }
                | NodeKind::GeneratorExp { .. }
                | NodeKind::DictComp { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub span: TextSpan,
}

/// Immutable syntax tree for one file snapshot
#[derive(Debug)]
pub struct SyntaxTree {
    nodes: Vec<Node>,
    root: NodeId,
    source: Arc<str>,
    line_index: LineIndex,
    path: Option<PathBuf>,
    is_stub: bool,
}

impl SyntaxTree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        id.index() < self.nodes.len()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.node(id).kind
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn span(&self, id: NodeId) -> TextSpan {
        self.node(id).span
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_stub(&self) -> bool {
        self.is_stub
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Source text covered by a node
    pub fn text(&self, id: NodeId) -> &str {
        let span = self.span(id);
        self.source
            .get(span.start as usize..span.end as usize)
            .unwrap_or("")
    }

    pub fn location(&self, id: NodeId) -> SourceLocation {
        self.line_index.span_location(self.span(id))
    }

    pub fn line_index(&self) -> &LineIndex {
        &self.line_index
    }

    /// Strict ancestors, innermost first
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            tree: self,
            next: self.parent(id),
        }
    }

    /// Pre-order traversal of `id` and everything below it
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            tree: self,
            stack: vec![id],
        }
    }

    /// Innermost node whose span contains `offset`
    pub fn node_at_offset(&self, offset: u32) -> Option<NodeId> {
        let mut current = self.root;
        if !self.span(current).contains(offset) && offset as usize != self.source.len() {
            return None;
        }
        'descend: loop {
            for &child in &self.node(current).children {
                if self.span(child).contains(offset) {
                    current = child;
                    continue 'descend;
                }
            }
            return Some(current);
        }
    }

    /// Name expressions spelling `identifier`, in source order
    pub fn find_names(&self, identifier: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .filter(|&id| matches!(self.kind(id), NodeKind::Name { id: name, .. } if name == identifier))
            .collect()
    }

    /// Definition nodes (`def`/`class`) named `identifier`, in source order
    pub fn find_definitions(&self, identifier: &str) -> Vec<NodeId> {
        self.descendants(self.root)
            .filter(|&id| match self.kind(id) {
                NodeKind::FunctionDef { name, .. } | NodeKind::ClassDef { name, .. } => name == identifier,
                _ => false,
            })
            .collect()
    }

    /// The name a declaring node introduces, when it has one
    pub fn declared_name(&self, id: NodeId) -> Option<&str> {
        match self.kind(id) {
            NodeKind::FunctionDef { name, .. }
            | NodeKind::ClassDef { name, .. }
            | NodeKind::Param { name, .. }
            | NodeKind::Capture { name, .. } => Some(name),
            NodeKind::Name { id, .. } => Some(id),
            NodeKind::Attribute { attr, .. } => Some(attr),
            NodeKind::ExceptHandler { name, .. } => name.as_deref(),
            NodeKind::Alias { name, asname } => Some(match asname {
                Some(asname) => asname.as_str(),
                None => name.split('.').next().unwrap_or(name),
            }),
            _ => None,
        }
    }
}

pub struct Ancestors<'a> {
    tree: &'a SyntaxTree,
    next: Option<NodeId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.tree.parent(current);
        Some(current)
    }
}

pub struct Descendants<'a> {
    tree: &'a SyntaxTree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.stack.pop()?;
        self.stack
            .extend(self.tree.node(current).children.iter().rev().copied());
        Some(current)
    }
}

/// Bottom-up tree construction: children are allocated before their parent
pub struct TreeBuilder {
    nodes: Vec<Node>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn alloc(&mut self, kind: NodeKind, span: TextSpan) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let children = kind.child_ids();
        for &child in &children {
            self.nodes[child.index()].parent = Some(id);
        }
        self.nodes.push(Node {
            kind,
            parent: None,
            children,
            span,
        });
        id
    }

    pub fn finish(self, root: NodeId, source: &str, path: Option<PathBuf>, is_stub: bool) -> SyntaxTree {
        SyntaxTree {
            nodes: self.nodes,
            root,
            source: Arc::from(source),
            line_index: LineIndex::new(source),
            path,
            is_stub,
        }
    }
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_tree() -> SyntaxTree {
        // x = 1
        let mut builder = TreeBuilder::new();
        let target = builder.alloc(
            NodeKind::Name { id: "x".to_string(), ctx: ExprContext::Store },
            TextSpan::new(0, 1),
        );
        let value = builder.alloc(NodeKind::Constant(Constant::Int(Some(1))), TextSpan::new(4, 5));
        let assign = builder.alloc(
            NodeKind::Assign { targets: vec![target], value },
            TextSpan::new(0, 5),
        );
        let module = builder.alloc(NodeKind::Module { body: vec![assign] }, TextSpan::new(0, 5));
        builder.finish(module, "x = 1", None, false)
    }

    #[test]
    fn test_parent_links() {
        let tree = small_tree();
        let names = tree.find_names("x");
        assert_eq!(names.len(), 1);
        let parent = tree.parent(names[0]).unwrap();
        assert!(matches!(tree.kind(parent), NodeKind::Assign { .. }));
        assert_eq!(tree.ancestors(names[0]).count(), 2);
    }

    #[test]
    fn test_node_at_offset() {
        let tree = small_tree();
        let node = tree.node_at_offset(4).unwrap();
        assert!(matches!(tree.kind(node), NodeKind::Constant(Constant::Int(Some(1)))));
        assert_eq!(tree.text(node), "1");
    }

    #[test]
    fn test_descendants_preorder() {
        let tree = small_tree();
        let labels: Vec<_> = tree
            .descendants(tree.root())
            .map(|id| tree.kind(id).label())
            .collect();
        assert_eq!(labels, vec!["module", "assign", "name", "constant"]);
    }
}
