//! Scope construction
//!
//! One pass over a tree records, for every scope-opening node, which nodes
//! declare which names. Reassignments accumulate: every textual binding of a
//! name in a scope is kept, whatever control flow surrounds it. The only
//! branches pruned are `sys.version_info` checks, which are decided against
//! the configured target version.

use crate::ast::{CompareOp, Constant, ExprContext, NodeId, NodeKind, SyntaxTree};
use crate::frontend::config::PythonVersion;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Module,
    Class,
    Function,
    Comprehension,
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub node: NodeId,
    pub kind: ScopeKind,
    /// Lexically enclosing scope
    pub parent: Option<NodeId>,
    names: HashMap<String, Vec<NodeId>>,
    globals: HashSet<String>,
    nonlocals: HashSet<String>,
    star_imports: Vec<NodeId>,
    /// `self.<attr> = ...` targets found in the methods of a class
    instance_attrs: HashMap<String, Vec<NodeId>>,
}

impl Scope {
    fn new(node: NodeId, kind: ScopeKind, parent: Option<NodeId>) -> Self {
        Self {
            node,
            kind,
            parent,
            names: HashMap::new(),
            globals: HashSet::new(),
            nonlocals: HashSet::new(),
            star_imports: Vec::new(),
            instance_attrs: HashMap::new(),
        }
    }

    /// Declaring nodes for `name`, in source order
    pub fn get(&self, name: &str) -> &[NodeId] {
        self.names.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    pub fn is_nonlocal(&self, name: &str) -> bool {
        self.nonlocals.contains(name)
    }

    /// `from m import *` statements directly in this scope
    pub fn star_imports(&self) -> &[NodeId] {
        &self.star_imports
    }

    pub fn instance_attribute(&self, name: &str) -> &[NodeId] {
        self.instance_attrs.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn instance_attribute_names(&self) -> impl Iterator<Item = &str> {
        self.instance_attrs.keys().map(String::as_str)
    }
}

/// Every scope of one file, keyed by its opening node
#[derive(Debug, Clone)]
pub struct ScopeIndex {
    scopes: HashMap<NodeId, Scope>,
    root: NodeId,
}

impl ScopeIndex {
    pub fn build(tree: &SyntaxTree, version: PythonVersion) -> Self {
        let root = tree.root();
        let mut builder = Builder {
            tree,
            version,
            scopes: HashMap::new(),
            root,
        };
        builder.open(root, ScopeKind::Module, None);
        if let NodeKind::Module { body } = tree.kind(root) {
            builder.stmts(root, body);
        }
        Self {
            scopes: builder.scopes,
            root,
        }
    }

    pub fn scope(&self, node: NodeId) -> Option<&Scope> {
        self.scopes.get(&node)
    }

    pub fn module(&self) -> &Scope {
        &self.scopes[&self.root]
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// The scope `node` is evaluated in.
///
/// Decorators, default values, annotations and base classes belong to the
/// scope around the definition; the first iterable of a comprehension belongs
/// to the scope around the comprehension.
pub fn enclosing_scope(tree: &SyntaxTree, node: NodeId) -> NodeId {
    let mut prev = node;
    for ancestor in tree.ancestors(node) {
        let belongs = match tree.kind(ancestor) {
            NodeKind::Module { .. } => true,
            NodeKind::FunctionDef { params, body, .. } => {
                body.contains(&prev) || (prev == node && params.contains(&node))
            }
            NodeKind::Lambda { params, body } => *body == prev || (prev == node && params.contains(&node)),
            NodeKind::ClassDef { body, .. } => body.contains(&prev),
            NodeKind::ListComp { generators, .. }
            | NodeKind::SetComp { generators, .. }
            | NodeKind::GeneratorExp { generators, .. }
            | NodeKind::DictComp { generators, .. } => match generators.first() {
                Some(&first) if first == prev => match tree.kind(first) {
                    NodeKind::Comprehension { iter, .. } => !is_within(tree, node, *iter),
                    _ => true,
                },
                _ => true,
            },
            _ => false,
        };
        if belongs {
            return ancestor;
        }
        prev = ancestor;
    }
    tree.root()
}

fn is_within(tree: &SyntaxTree, node: NodeId, container: NodeId) -> bool {
    node == container || tree.ancestors(node).any(|a| a == container)
}

/// Static outcome of an `if` test on `sys.version_info`, when it is one
pub fn version_check(tree: &SyntaxTree, test: NodeId, version: PythonVersion) -> Option<bool> {
    let NodeKind::Compare { left, ops, comparators } = tree.kind(test) else {
        return None;
    };
    if ops.len() != 1 || comparators.len() != 1 {
        return None;
    }

    let target = [i64::from(version.major), i64::from(version.minor)];
    let (actual, expected): (Vec<i64>, Vec<i64>) = match tree.kind(*left) {
        NodeKind::Attribute { value, attr, .. } if attr == "version_info" && is_name(tree, *value, "sys") => {
            (target.to_vec(), int_tuple(tree, comparators[0])?)
        }
        NodeKind::Subscript { value, slice, .. } => {
            let NodeKind::Attribute { value: base, attr, .. } = tree.kind(*value) else {
                return None;
            };
            if attr != "version_info" || !is_name(tree, *base, "sys") {
                return None;
            }
            let index = match tree.kind(*slice) {
                NodeKind::Constant(Constant::Int(Some(i))) if (0..2).contains(i) => *i as usize,
                _ => return None,
            };
            let expected = match tree.kind(comparators[0]) {
                NodeKind::Constant(Constant::Int(Some(i))) => *i,
                _ => return None,
            };
            (vec![target[index]], vec![expected])
        }
        _ => return None,
    };

    let ordering = actual.cmp(&expected);
    Some(match ops[0] {
        CompareOp::GtE => ordering != Ordering::Less,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::LtE => ordering != Ordering::Greater,
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        _ => return None,
    })
}

fn is_name(tree: &SyntaxTree, node: NodeId, expected: &str) -> bool {
    matches!(tree.kind(node), NodeKind::Name { id, .. } if id == expected)
}

fn int_tuple(tree: &SyntaxTree, node: NodeId) -> Option<Vec<i64>> {
    let NodeKind::Tuple { elts, .. } = tree.kind(node) else {
        return None;
    };
    elts.iter()
        .map(|&elt| match tree.kind(elt) {
            NodeKind::Constant(Constant::Int(Some(i))) => Some(*i),
            _ => None,
        })
        .collect()
}

struct Builder<'a> {
    tree: &'a SyntaxTree,
    version: PythonVersion,
    scopes: HashMap<NodeId, Scope>,
    root: NodeId,
}

impl<'a> Builder<'a> {
    fn open(&mut self, node: NodeId, kind: ScopeKind, parent: Option<NodeId>) {
        let mut scope = Scope::new(node, kind, parent);
        if matches!(kind, ScopeKind::Function | ScopeKind::Module) {
            self.collect_declarations(node, &mut scope);
        }
        self.scopes.insert(node, scope);
    }

    /// `global`/`nonlocal` statements of a scope, without entering nested scopes
    fn collect_declarations(&self, node: NodeId, scope: &mut Scope) {
        let mut stack: Vec<NodeId> = self.tree.node(node).children.clone();
        while let Some(id) = stack.pop() {
            match self.tree.kind(id) {
                NodeKind::Global { names } => scope.globals.extend(names.iter().cloned()),
                NodeKind::Nonlocal { names } => scope.nonlocals.extend(names.iter().cloned()),
                kind if kind.is_scope() => {}
                _ => stack.extend(self.tree.node(id).children.iter().copied()),
            }
        }
    }

    fn kind_of(&self, scope: NodeId) -> ScopeKind {
        self.scopes.get(&scope).map_or(ScopeKind::Module, |s| s.kind)
    }

    fn parent_of(&self, scope: NodeId) -> Option<NodeId> {
        self.scopes.get(&scope).and_then(|s| s.parent)
    }

    /// Nearest enclosing function scope, skipping classes and comprehensions
    fn enclosing_function(&self, scope: NodeId) -> Option<NodeId> {
        let mut current = self.parent_of(scope);
        while let Some(id) = current {
            if self.kind_of(id) == ScopeKind::Function {
                return Some(id);
            }
            current = self.parent_of(id);
        }
        None
    }

    fn bind(&mut self, scope: NodeId, name: &str, node: NodeId) {
        let target = match self.scopes.get(&scope) {
            Some(s) if s.globals.contains(name) => self.root,
            Some(s) if s.nonlocals.contains(name) => self.enclosing_function(scope).unwrap_or(scope),
            _ => scope,
        };
        if let Some(s) = self.scopes.get_mut(&target) {
            s.names.entry(name.to_string()).or_default().push(node);
        }
    }

    /// Assignment walrus targets bind in the nearest non-comprehension scope
    fn binding_scope(&self, scope: NodeId) -> NodeId {
        let mut current = scope;
        while self.kind_of(current) == ScopeKind::Comprehension {
            match self.parent_of(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }

    fn stmts(&mut self, scope: NodeId, body: &[NodeId]) {
        for &stmt in body {
            self.stmt(scope, stmt);
        }
    }

    fn stmt(&mut self, scope: NodeId, id: NodeId) {
        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::FunctionDef { name, decorators, params, returns, body, .. } => {
                self.bind(scope, name, id);
                self.exprs(scope, decorators);
                self.param_parts(scope, params);
                if let Some(returns) = returns {
                    self.expr(scope, *returns);
                }
                self.open(id, ScopeKind::Function, Some(scope));
                self.declare_params(id, params);
                self.stmts(id, body);
                if self.kind_of(scope) == ScopeKind::Class {
                    self.collect_instance_attrs(scope, id);
                }
            }
            NodeKind::ClassDef { name, decorators, bases, keywords, body } => {
                self.bind(scope, name, id);
                self.exprs(scope, decorators);
                self.exprs(scope, bases);
                self.exprs(scope, keywords);
                self.open(id, ScopeKind::Class, Some(scope));
                self.stmts(id, body);
            }
            NodeKind::Assign { targets, value } => {
                self.expr(scope, *value);
                for &target in targets {
                    self.target(scope, target);
                }
            }
            NodeKind::AugAssign { target, value, .. } => {
                self.expr(scope, *value);
                self.target(scope, *target);
            }
            NodeKind::AnnAssign { target, annotation, value } => {
                self.expr(scope, *annotation);
                if let Some(value) = value {
                    self.expr(scope, *value);
                }
                self.target(scope, *target);
            }
            NodeKind::For { target, iter, body, orelse, .. } => {
                self.expr(scope, *iter);
                self.target(scope, *target);
                self.stmts(scope, body);
                self.stmts(scope, orelse);
            }
            NodeKind::While { test, body, orelse } => {
                self.expr(scope, *test);
                self.stmts(scope, body);
                self.stmts(scope, orelse);
            }
            NodeKind::If { test, body, orelse } => match version_check(tree, *test, self.version) {
                Some(true) => self.stmts(scope, body),
                Some(false) => self.stmts(scope, orelse),
                None => {
                    self.expr(scope, *test);
                    self.stmts(scope, body);
                    self.stmts(scope, orelse);
                }
            },
            NodeKind::With { items, body, .. } => {
                for &item in items {
                    if let NodeKind::WithItem { context, target } = tree.kind(item) {
                        self.expr(scope, *context);
                        if let Some(target) = target {
                            self.target(scope, *target);
                        }
                    }
                }
                self.stmts(scope, body);
            }
            NodeKind::Match { subject, cases } => {
                self.expr(scope, *subject);
                for &case in cases {
                    if let NodeKind::MatchCase { captures, guard, body } = tree.kind(case) {
                        for &capture in captures {
                            if let NodeKind::Capture { name, class, .. } = tree.kind(capture) {
                                self.bind(scope, name, capture);
                                if let Some(class) = class {
                                    self.expr(scope, *class);
                                }
                            }
                        }
                        if let Some(guard) = guard {
                            self.expr(scope, *guard);
                        }
                        self.stmts(scope, body);
                    }
                }
            }
            NodeKind::Try { body, handlers, orelse, finalbody } => {
                self.stmts(scope, body);
                for &handler in handlers {
                    if let NodeKind::ExceptHandler { type_, name, body } = tree.kind(handler) {
                        if let Some(type_) = type_ {
                            self.expr(scope, *type_);
                        }
                        if let Some(name) = name {
                            self.bind(scope, name, handler);
                        }
                        self.stmts(scope, body);
                    }
                }
                self.stmts(scope, orelse);
                self.stmts(scope, finalbody);
            }
            NodeKind::Import { names } => {
                for &alias in names {
                    if let Some(name) = tree.declared_name(alias) {
                        self.bind(scope, name, alias);
                    }
                }
            }
            NodeKind::ImportFrom { names, .. } => {
                for &alias in names {
                    match tree.kind(alias) {
                        NodeKind::Alias { name, .. } if name == "*" => {
                            if let Some(s) = self.scopes.get_mut(&scope) {
                                s.star_imports.push(id);
                            }
                        }
                        _ => {
                            if let Some(name) = tree.declared_name(alias) {
                                self.bind(scope, name, alias);
                            }
                        }
                    }
                }
            }
            NodeKind::Return { value: Some(value) } | NodeKind::ExprStmt { value } => self.expr(scope, *value),
            NodeKind::Raise { exc, cause } => {
                for part in [exc, cause].into_iter().flatten() {
                    self.expr(scope, *part);
                }
            }
            NodeKind::Assert { test, msg } => {
                self.expr(scope, *test);
                if let Some(msg) = msg {
                    self.expr(scope, *msg);
                }
            }
            NodeKind::Delete { targets } => self.exprs(scope, targets),
            _ => {}
        }
    }

    fn param_parts(&mut self, scope: NodeId, params: &[NodeId]) {
        for &param in params {
            if let NodeKind::Param { annotation, default, .. } = self.tree.kind(param) {
                for part in [annotation, default].into_iter().flatten() {
                    self.expr(scope, *part);
                }
            }
        }
    }

    fn declare_params(&mut self, function: NodeId, params: &[NodeId]) {
        for &param in params {
            if let NodeKind::Param { name, .. } = self.tree.kind(param) {
                if let Some(s) = self.scopes.get_mut(&function) {
                    s.names.entry(name.clone()).or_default().push(param);
                }
            }
        }
    }

    /// Bind the names an assignment target introduces
    fn target(&mut self, scope: NodeId, target: NodeId) {
        match self.tree.kind(target) {
            NodeKind::Name { id, .. } => self.bind(scope, id, target),
            NodeKind::Tuple { elts, .. } | NodeKind::List { elts, .. } => {
                for &elt in elts {
                    self.target(scope, elt);
                }
            }
            NodeKind::Starred { value, .. } => self.target(scope, *value),
            NodeKind::Attribute { value, .. } => self.expr(scope, *value),
            NodeKind::Subscript { value, slice, .. } => {
                self.expr(scope, *value);
                self.expr(scope, *slice);
            }
            _ => {}
        }
    }

    fn exprs(&mut self, scope: NodeId, exprs: &[NodeId]) {
        for &expr in exprs {
            self.expr(scope, expr);
        }
    }

    /// Expressions only matter for the scopes and walrus bindings inside them
    fn expr(&mut self, scope: NodeId, id: NodeId) {
        let tree = self.tree;
        match tree.kind(id) {
            NodeKind::Lambda { params, body } => {
                self.param_parts(scope, params);
                self.open(id, ScopeKind::Function, Some(scope));
                self.declare_params(id, params);
                self.expr(id, *body);
            }
            NodeKind::ListComp { elt, generators }
            | NodeKind::SetComp { elt, generators }
            | NodeKind::GeneratorExp { elt, generators } => {
                self.comprehension(scope, id, generators);
                self.expr(id, *elt);
            }
            NodeKind::DictComp { key, value, generators } => {
                self.comprehension(scope, id, generators);
                self.expr(id, *key);
                self.expr(id, *value);
            }
            NodeKind::NamedExpr { target, value } => {
                self.expr(scope, *value);
                if let NodeKind::Name { id: name, .. } = tree.kind(*target) {
                    let binding = self.binding_scope(scope);
                    self.bind(binding, name, *target);
                }
            }
            _ => {
                for &child in &tree.node(id).children {
                    self.expr(scope, child);
                }
            }
        }
    }

    fn comprehension(&mut self, scope: NodeId, comp: NodeId, generators: &[NodeId]) {
        self.open(comp, ScopeKind::Comprehension, Some(scope));
        for (i, &generator) in generators.iter().enumerate() {
            if let NodeKind::Comprehension { target, iter, ifs, .. } = self.tree.kind(generator) {
                self.expr(if i == 0 { scope } else { comp }, *iter);
                self.target(comp, *target);
                self.exprs(comp, ifs);
            }
        }
    }

    /// Record `self.<attr> = ...` targets of a method on its class scope
    fn collect_instance_attrs(&mut self, class: NodeId, method: NodeId) {
        let tree = self.tree;
        let NodeKind::FunctionDef { params, decorators, .. } = tree.kind(method) else {
            return;
        };
        let static_like = decorators.iter().any(|&d| {
            matches!(tree.kind(d), NodeKind::Name { id, .. } if id == "staticmethod" || id == "classmethod")
        });
        let receiver = match params.first().map(|&p| tree.kind(p)) {
            Some(NodeKind::Param { name, .. }) if !static_like => name.clone(),
            _ => return,
        };

        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = tree.node(method).children.clone();
        while let Some(id) = stack.pop() {
            match tree.kind(id) {
                NodeKind::Attribute { value, attr, ctx: ExprContext::Store } if is_name(tree, *value, &receiver) => {
                    found.push((attr.clone(), id));
                }
                kind if kind.is_scope() => {}
                _ => stack.extend(tree.node(id).children.iter().copied()),
            }
        }
        found.sort_by_key(|(_, id)| *id);

        if let Some(scope) = self.scopes.get_mut(&class) {
            for (attr, id) in found {
                scope.instance_attrs.entry(attr).or_default().push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_module;

    fn build(source: &str) -> (SyntaxTree, ScopeIndex) {
        let tree = parse_module(source, None).unwrap();
        let index = ScopeIndex::build(&tree, PythonVersion::new(3, 11));
        (tree, index)
    }

    #[test]
    fn test_reassignment_accumulates() {
        let (_, index) = build("x = 1\nif c:\n    x = 'a'\nelse:\n    x = None\n");
        assert_eq!(index.module().get("x").len(), 3);
    }

    #[test]
    fn test_function_scope_and_params() {
        let (tree, index) = build("def f(a, b=1):\n    c = a\n    return c\n");
        let f = tree.find_definitions("f")[0];
        let scope = index.scope(f).unwrap();
        assert_eq!(scope.kind, ScopeKind::Function);
        assert_eq!(scope.get("a").len(), 1);
        assert_eq!(scope.get("c").len(), 1);
        assert!(index.module().get("c").is_empty());
        assert_eq!(index.module().get("f"), &[f]);
    }

    #[test]
    fn test_global_redirects_binding() {
        let (tree, index) = build("x = 1\ndef f():\n    global x\n    x = 2\n");
        let f = tree.find_definitions("f")[0];
        assert_eq!(index.module().get("x").len(), 2);
        assert!(index.scope(f).unwrap().get("x").is_empty());
        assert!(index.scope(f).unwrap().is_global("x"));
    }

    #[test]
    fn test_nonlocal_binds_in_enclosing_function() {
        let (tree, index) = build("def outer():\n    n = 0\n    def inner():\n        nonlocal n\n        n = 1\n");
        let outer = tree.find_definitions("outer")[0];
        assert_eq!(index.scope(outer).unwrap().get("n").len(), 2);
    }

    #[test]
    fn test_comprehension_scope() {
        let (tree, index) = build("xs = [1]\nys = [x for x in xs]\n");
        assert!(index.module().get("x").is_empty());
        let comp = tree
            .descendants(tree.root())
            .find(|&id| matches!(tree.kind(id), NodeKind::ListComp { .. }))
            .unwrap();
        assert_eq!(index.scope(comp).unwrap().get("x").len(), 1);

        // The first iterable is evaluated outside the comprehension.
        let xs_load = tree.find_names("xs")[1];
        assert_eq!(enclosing_scope(&tree, xs_load), tree.root());
        let x_load = tree.find_names("x")[0];
        assert_eq!(enclosing_scope(&tree, x_load), comp);
    }

    #[test]
    fn test_walrus_escapes_comprehension() {
        let (_, index) = build("vals = [y := 5 for _ in range(2)]\n");
        assert_eq!(index.module().get("y").len(), 1);
    }

    #[test]
    fn test_defaults_belong_to_outer_scope() {
        let (tree, _) = build("d = 1\ndef f(a=d):\n    return a\n");
        let d_load = tree.find_names("d")[1];
        assert_eq!(enclosing_scope(&tree, d_load), tree.root());
        let f = tree.find_definitions("f")[0];
        let a_load = tree.find_names("a")[0];
        assert_eq!(enclosing_scope(&tree, a_load), f);
    }

    #[test]
    fn test_version_check_prunes_branch() {
        let source = "import sys\nif sys.version_info >= (3, 8):\n    new = 1\nelse:\n    old = 1\nif sys.version_info[0] < 3:\n    py2 = 1\n";
        let (_, index) = build(source);
        assert_eq!(index.module().get("new").len(), 1);
        assert!(index.module().get("old").is_empty());
        assert!(index.module().get("py2").is_empty());
    }

    #[test]
    fn test_star_imports_and_instance_attrs() {
        let source = "from os.path import *\nclass C:\n    def __init__(self, v):\n        self.v = v\n        self.w = 1\n    @staticmethod\n    def s(x):\n        x.nope = 1\n";
        let (tree, index) = build(source);
        assert_eq!(index.module().star_imports().len(), 1);
        let class = tree.find_definitions("C")[0];
        let scope = index.scope(class).unwrap();
        assert_eq!(scope.instance_attribute("v").len(), 1);
        assert_eq!(scope.instance_attribute("w").len(), 1);
        assert!(scope.instance_attribute("nope").is_empty());
    }

    #[test]
    fn test_except_and_match_bindings() {
        let source = "try:\n    pass\nexcept ValueError as err:\n    pass\nmatch p:\n    case Point(x=0) as pt:\n        pass\n";
        let (_, index) = build(source);
        assert_eq!(index.module().get("err").len(), 1);
        assert_eq!(index.module().get("pt").len(), 1);
    }
}
