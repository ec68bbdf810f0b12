//! Name resolution and declaration evaluation
//!
//! A name reference is resolved to the declaring nodes the filter chain
//! produces, and each declaring node is evaluated on its own. Declaring nodes
//! are `def`/`class` statements, parameters, import aliases, assignment and
//! loop targets, `with`/`except` names and match captures.

use crate::analysis::builtins::MODULE_DUNDERS;
use crate::analysis::filter::FilterChain;
use crate::analysis::scope::enclosing_scope;
use crate::analysis::Session;
use crate::ast::{Constant, NodeId, NodeKind, NodeRef, SyntaxTree};
use crate::core::{Arguments, ContextId, InstancePayload, ModuleId, Value, ValueSet};
use crate::performance::cache::Slot;
use tracing::{debug, trace};

/// Decorators that leave the decorated function in place for inference
const TRANSPARENT_DECORATORS: &[&str] = &[
    "staticmethod",
    "classmethod",
    "property",
    "cached_property",
    "abstractmethod",
    "overload",
    "final",
    "override",
    "runtime_checkable",
];

/// One level of tuple unpacking on the way from a target to its statement
#[derive(Debug, Clone, Copy)]
struct Unpack {
    index: usize,
    len: usize,
    star: Option<usize>,
}

impl Session {
    /// Values of the name `name` referenced at `node`
    pub(crate) fn infer_name(&mut self, node: NodeRef, name: &str, ctx: ContextId) -> ValueSet {
        let decls = self.lookup_name(node, name);
        if decls.is_empty() {
            if MODULE_DUNDERS.contains(&name) {
                let module = self.modules.by_file(node.file);
                return self.module_dunder(module, name);
            }
            debug!(file = %node.file, node = node.node.0, name, "name unresolved");
            return ValueSet::empty();
        }
        decls.iter().map(|&decl| self.infer_binding(decl, ctx)).collect()
    }

    /// Declaring nodes for `name` as seen from `node`.
    ///
    /// Lexical scopes first; within a scope direct declarations shadow star
    /// imports. The builtins module closes the chain.
    pub(crate) fn lookup_name(&mut self, node: NodeRef, name: &str) -> Vec<NodeRef> {
        let (Some(tree), Some(index)) = (self.tree_of(node.file), self.scopes_of(node.file)) else {
            return Vec::new();
        };
        let start = enclosing_scope(&tree, node.node);
        let chain = FilterChain::for_name(&index, start, name);

        for filter in chain.iter() {
            let direct = filter.get(name);
            if !direct.is_empty() {
                return direct.iter().map(|&d| NodeRef::new(node.file, d)).collect();
            }
            let mut starred = Vec::new();
            for &import in filter.star_imports() {
                starred.extend(self.star_import_declarations(NodeRef::new(node.file, import), name));
            }
            if !starred.is_empty() {
                return starred;
            }
        }

        if self.is_builtins_file(node.file) {
            return Vec::new();
        }
        match self.builtins_module() {
            Some(builtins) => self.module_declarations(builtins, name),
            None => Vec::new(),
        }
    }

    /// Top-level declarations of `name` visible to importers of `module`.
    ///
    /// The stub is consulted first; the implementation only when the stub
    /// declares nothing under that name.
    pub(crate) fn module_declarations(&mut self, module: ModuleId, name: &str) -> Vec<NodeRef> {
        let files: Vec<_> = self.modules.get(module).files().collect();
        for file in files {
            let (Some(tree), Some(index)) = (self.tree_of(file), self.scopes_of(file)) else {
                continue;
            };
            let scope = index.module();
            let mut decls: Vec<NodeRef> = scope
                .get(name)
                .iter()
                .filter(|&&decl| is_exported(&tree, decl, name))
                .map(|&decl| NodeRef::new(file, decl))
                .collect();
            if decls.is_empty() {
                for &import in scope.star_imports() {
                    decls.extend(self.star_import_declarations(NodeRef::new(file, import), name));
                }
            }
            if !decls.is_empty() {
                return decls;
            }
        }
        Vec::new()
    }

    /// Declarations of `name` pulled in by the `from m import *` at `import`
    fn star_import_declarations(&mut self, import: NodeRef, name: &str) -> Vec<NodeRef> {
        let Some(tree) = self.tree_of(import.file) else {
            return Vec::new();
        };
        let NodeKind::ImportFrom { module, level, .. } = tree.kind(import.node) else {
            return Vec::new();
        };
        let Some(target) = self.resolve_import_target(import.file, module.as_deref(), *level) else {
            return Vec::new();
        };
        if !self.star_guard.insert(target) {
            trace!(module = %self.modules.get(target).name, "star import cycle");
            return Vec::new();
        }

        let exported = match self.module_all(target) {
            Some(all) => all.iter().any(|n| n == name),
            None => !name.starts_with('_'),
        };
        let decls = if exported {
            self.module_declarations(target, name)
        } else {
            Vec::new()
        };
        self.star_guard.remove(&target);
        decls
    }

    /// Literal `__all__` of `module`, when it declares one
    pub(crate) fn module_all(&self, module: ModuleId) -> Option<Vec<String>> {
        let mut all: Option<Vec<String>> = None;
        for file in self.modules.get(module).files() {
            let (Some(tree), Some(index)) = (self.tree_of(file), self.scopes_of(file)) else {
                continue;
            };
            for &decl in index.module().get("__all__") {
                let Some(statement) = tree.parent(decl) else {
                    continue;
                };
                let value = match tree.kind(statement) {
                    NodeKind::Assign { value, .. } => Some(*value),
                    NodeKind::AnnAssign { value, .. } => *value,
                    NodeKind::AugAssign { value, .. } => Some(*value),
                    _ => None,
                };
                if let Some(names) = value.and_then(|v| string_sequence(&tree, v)) {
                    all.get_or_insert_with(Vec::new).extend(names);
                }
            }
            if all.is_some() {
                break;
            }
        }
        all
    }

    /// Member `name` of module `module` as importers see it
    pub(crate) fn module_member(&mut self, module: ModuleId, name: &str) -> ValueSet {
        let decls = self.module_declarations(module, name);
        if !decls.is_empty() {
            return decls
                .iter()
                .map(|&decl| {
                    let ctx = self.module_context(decl.file);
                    self.infer_binding(decl, ctx)
                })
                .collect();
        }

        if let Some(compiled) = self.modules.get(module).compiled {
            if self.compiled.get(compiled).is_empty() {
                return self.unknown();
            }
            if let Some(member) = self.compiled.member(compiled, name) {
                return self.compiled_value(member);
            }
        }
        if let Some(submodule) = self.import_submodule(module, name) {
            return ValueSet::single(self.module_value(submodule));
        }
        if MODULE_DUNDERS.contains(&name) {
            return self.module_dunder(Some(module), name);
        }
        ValueSet::empty()
    }

    /// Values bound by declaring node `decl`
    pub(crate) fn infer_binding(&mut self, decl: NodeRef, ctx: ContextId) -> ValueSet {
        let scope = self.scope_of(decl);
        let ctx = self.context_for_scope(ctx, scope);
        self.cached(decl, ctx, Slot::Binding, |s| s.binding_uncached(decl, ctx))
    }

    fn binding_uncached(&mut self, decl: NodeRef, ctx: ContextId) -> ValueSet {
        let Some(tree) = self.tree_of(decl.file) else {
            return ValueSet::empty();
        };
        let at = |id: NodeId| NodeRef::new(decl.file, id);

        match tree.kind(decl.node) {
            NodeKind::FunctionDef { decorators, .. } => {
                let function = self.pool.value(Value::Function {
                    def: decl,
                    context: ctx,
                    bound: None,
                });
                self.apply_decorators(ValueSet::single(function), &tree, decl, decorators, ctx)
            }
            NodeKind::ClassDef { decorators, .. } => {
                let class = self.pool.value(Value::Class { def: decl, context: ctx });
                self.apply_decorators(ValueSet::single(class), &tree, decl, decorators, ctx)
            }
            NodeKind::Param { .. } => self.param_values(decl, ctx),
            NodeKind::Alias { .. } => self.import_binding(&tree, decl),
            NodeKind::ExceptHandler { type_, .. } => match type_ {
                Some(type_) => {
                    let classes = self.eval(at(*type_), ctx);
                    self.exception_instances(&classes)
                }
                None => self.builtin_instance("BaseException"),
            },
            NodeKind::Capture { class, whole, .. } => {
                if let Some(class) = class {
                    let classes = self.eval(at(*class), ctx);
                    return self.instantiate_all(&classes);
                }
                if *whole {
                    let subject = tree.ancestors(decl.node).find_map(|a| match tree.kind(a) {
                        NodeKind::Match { subject, .. } => Some(*subject),
                        _ => None,
                    });
                    if let Some(subject) = subject {
                        return self.eval(at(subject), ctx);
                    }
                }
                self.unknown()
            }
            NodeKind::Name { .. } | NodeKind::Attribute { .. } | NodeKind::Starred { .. } => {
                self.target_binding(&tree, decl, ctx)
            }
            other => {
                debug!(file = %decl.file, node = decl.node.0, kind = other.label(), "not a declaring node");
                ValueSet::empty()
            }
        }
    }

    /// Apply decorators innermost first.
    ///
    /// Decorators that only tag a method are skipped; one whose call yields
    /// nothing leaves the value undecorated.
    fn apply_decorators(
        &mut self,
        value: ValueSet,
        tree: &SyntaxTree,
        decl: NodeRef,
        decorators: &[NodeId],
        ctx: ContextId,
    ) -> ValueSet {
        if !self.config.infer.follow_decorators {
            return value;
        }
        let mut current = value;
        for &decorator in decorators.iter().rev() {
            match decorator_name(tree, decorator) {
                Some(name) if TRANSPARENT_DECORATORS.contains(&name) => continue,
                Some("setter") | Some("deleter") => return ValueSet::empty(),
                _ => {}
            }
            let callee = self.eval(NodeRef::new(decl.file, decorator), ctx);
            let arguments = self.pool.arguments(Arguments::positional(vec![current.clone()]));
            let result = self.call(&callee, arguments);
            if !result.is_empty() {
                current = result;
            }
        }
        current
    }

    /// `import a.b`, `import a.b as c` and `from m import x`
    fn import_binding(&mut self, tree: &SyntaxTree, decl: NodeRef) -> ValueSet {
        let NodeKind::Alias { name, asname } = tree.kind(decl.node) else {
            return ValueSet::empty();
        };
        let Some(statement) = tree.parent(decl.node) else {
            return ValueSet::empty();
        };

        match tree.kind(statement) {
            NodeKind::Import { .. } => {
                let target = match asname {
                    Some(_) => name.as_str(),
                    None => name.split('.').next().unwrap_or(name),
                };
                match self.resolve_import_target(decl.file, Some(target), 0) {
                    Some(module) => ValueSet::single(self.module_value(module)),
                    None => ValueSet::empty(),
                }
            }
            NodeKind::ImportFrom { module, level, .. } => {
                match self.resolve_import_target(decl.file, module.as_deref(), *level) {
                    Some(target) => self.module_member(target, name),
                    None => ValueSet::empty(),
                }
            }
            _ => ValueSet::empty(),
        }
    }

    /// Assignment, loop, `with` and walrus targets
    fn target_binding(&mut self, tree: &SyntaxTree, decl: NodeRef, ctx: ContextId) -> ValueSet {
        let at = |id: NodeId| NodeRef::new(decl.file, id);
        let mut path = Vec::new();
        let mut child = decl.node;

        while let Some(parent) = tree.parent(child) {
            let assigned = match tree.kind(parent) {
                NodeKind::Tuple { elts, .. } | NodeKind::List { elts, .. } => {
                    let Some(index) = elts.iter().position(|&e| e == child) else {
                        return ValueSet::empty();
                    };
                    let star = elts.iter().position(|&e| matches!(tree.kind(e), NodeKind::Starred { .. }));
                    path.push(Unpack {
                        index,
                        len: elts.len(),
                        star,
                    });
                    child = parent;
                    continue;
                }
                NodeKind::Starred { .. } => {
                    child = parent;
                    continue;
                }
                NodeKind::Assign { value, .. } => self.eval(at(*value), ctx),
                NodeKind::AnnAssign { annotation, value, .. } => {
                    let declared = self.annotation_values(at(*annotation), ctx);
                    match value {
                        _ if !declared.is_empty() => declared,
                        Some(value) => self.eval(at(*value), ctx),
                        None => ValueSet::empty(),
                    }
                }
                NodeKind::AugAssign { target, op, value } => {
                    let prior = self.eval(at(*target), ctx);
                    let operand = self.eval(at(*value), ctx);
                    self.binary_op(&prior, *op, &operand)
                }
                NodeKind::For { iter, .. } => {
                    let iterable = self.eval(at(*iter), ctx);
                    self.iterate(&iterable)
                }
                NodeKind::WithItem { context, .. } => {
                    let manager = self.eval(at(*context), ctx);
                    self.enter_values(&manager)
                }
                NodeKind::NamedExpr { value, .. } => self.eval_at(at(*value), ctx),
                NodeKind::Comprehension { iter, .. } => {
                    let iterable = self.eval_at(at(*iter), ctx);
                    self.iterate(&iterable)
                }
                _ => return ValueSet::empty(),
            };
            return path
                .iter()
                .rev()
                .fold(assigned, |values, step| self.unpack_index(&values, *step));
        }
        ValueSet::empty()
    }

    /// Element `step.index` of each unpacked value
    fn unpack_index(&mut self, values: &ValueSet, step: Unpack) -> ValueSet {
        values.flat_map(|v| {
            let value = self.pool.get(v).clone();
            match value {
                Value::Instance {
                    payload: InstancePayload::Sequence(elements),
                    ..
                } => self.unpack_sequence(&elements, step),
                Value::Instance {
                    class,
                    payload: InstancePayload::TypeArgs(args),
                } if step.star.is_none() && self.is_builtin_class(class, "tuple") => match args.len() {
                    1 => args[0].clone(),
                    _ => args.get(step.index).cloned().unwrap_or_default(),
                },
                _ => {
                    let items = self.iterate(&ValueSet::single(v));
                    if step.star == Some(step.index) {
                        self.container("list", InstancePayload::TypeArgs(vec![items]))
                    } else {
                        items
                    }
                }
            }
        })
    }

    fn unpack_sequence(&mut self, elements: &[ValueSet], step: Unpack) -> ValueSet {
        let Some(star) = step.star else {
            return elements.get(step.index).cloned().unwrap_or_default();
        };
        let after = step.len - star - 1;
        if step.index < star {
            return elements.get(step.index).cloned().unwrap_or_default();
        }
        if step.index > star {
            let from_end = step.len - step.index;
            return match elements.len().checked_sub(from_end) {
                Some(i) => elements[i].clone(),
                None => ValueSet::empty(),
            };
        }
        let end = elements.len().saturating_sub(after).max(star);
        let rest: ValueSet = elements.get(star..end).unwrap_or_default().iter().cloned().collect();
        self.container("list", InstancePayload::TypeArgs(vec![rest]))
    }

    /// `with m as x` binds what `__enter__` returns, or `m` itself
    fn enter_values(&mut self, managers: &ValueSet) -> ValueSet {
        managers.flat_map(|manager| {
            let manager = ValueSet::single(manager);
            let anonymous = self.pool.arguments(Arguments::Anonymous);
            let entered = self.call_method(&manager, "__enter__", anonymous);
            if entered.is_empty() {
                manager
            } else {
                entered
            }
        })
    }

    /// `except E` binds instances of `E`, or of each class in a tuple
    fn exception_instances(&mut self, classes: &ValueSet) -> ValueSet {
        classes.flat_map(|v| match self.pool.get(v).clone() {
            Value::Class { .. } => ValueSet::single(self.plain_instance(v)),
            Value::Instance {
                payload: InstancePayload::Sequence(elements),
                ..
            } => {
                let members: ValueSet = elements.into_iter().collect();
                self.exception_instances(&members)
            }
            Value::Instance {
                payload: InstancePayload::TypeArgs(args),
                ..
            } => {
                let members: ValueSet = args.into_iter().collect();
                self.exception_instances(&members)
            }
            Value::Unknown | Value::Compiled(_) => self.unknown(),
            _ => ValueSet::empty(),
        })
    }

    fn instantiate_all(&mut self, classes: &ValueSet) -> ValueSet {
        classes.flat_map(|v| match self.pool.get(v) {
            Value::Class { .. } => ValueSet::single(self.plain_instance(v)),
            Value::Unknown | Value::Compiled(_) => self.unknown(),
            _ => ValueSet::empty(),
        })
    }
}

/// Stubs re-export imported names only in the `import x as x` form
fn is_exported(tree: &SyntaxTree, decl: NodeId, name: &str) -> bool {
    if !tree.is_stub() {
        return true;
    }
    match tree.kind(decl) {
        NodeKind::Alias { asname, .. } => asname.as_deref() == Some(name),
        _ => true,
    }
}

/// Last dotted component of a decorator expression, ignoring a call
pub(crate) fn decorator_name(tree: &SyntaxTree, decorator: NodeId) -> Option<&str> {
    match tree.kind(decorator) {
        NodeKind::Name { id, .. } => Some(id),
        NodeKind::Attribute { attr, .. } => Some(attr),
        NodeKind::Call { func, .. } => decorator_name(tree, *func),
        _ => None,
    }
}

fn string_sequence(tree: &SyntaxTree, node: NodeId) -> Option<Vec<String>> {
    let (NodeKind::List { elts, .. } | NodeKind::Tuple { elts, .. }) = tree.kind(node) else {
        return None;
    };
    elts.iter()
        .map(|&elt| match tree.kind(elt) {
            NodeKind::Constant(Constant::Str(s)) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{parse_module, Config};

    fn session_with(source: &str) -> (Session, crate::ast::FileId) {
        let mut session = Session::new(Config::default());
        let file = session.add_source(None, source).unwrap();
        (session, file)
    }

    fn last_name(session: &Session, file: crate::ast::FileId, name: &str) -> NodeRef {
        let tree = session.tree(file).unwrap();
        let node = *tree.find_names(name).last().unwrap();
        NodeRef::new(file, node)
    }

    #[test]
    fn test_decorator_name_strips_call_and_module() {
        let tree = parse_module("@functools.lru_cache(maxsize=1)\ndef f(): pass\n", None).unwrap();
        let NodeKind::Module { body } = tree.kind(tree.root()) else { panic!() };
        let NodeKind::FunctionDef { decorators, .. } = tree.kind(body[0]) else { panic!() };
        assert_eq!(decorator_name(&tree, decorators[0]), Some("lru_cache"));
    }

    #[test]
    fn test_string_sequence_requires_literals() {
        let tree = parse_module("__all__ = ['a', 'b']\nother = ['a', x]\n", None).unwrap();
        let NodeKind::Module { body } = tree.kind(tree.root()) else { panic!() };
        let NodeKind::Assign { value, .. } = tree.kind(body[0]) else { panic!() };
        assert_eq!(string_sequence(&tree, *value), Some(vec!["a".to_string(), "b".to_string()]));
        let NodeKind::Assign { value, .. } = tree.kind(body[1]) else { panic!() };
        assert_eq!(string_sequence(&tree, *value), None);
    }

    #[test]
    fn test_lookup_prefers_inner_scope() {
        let (mut session, file) = session_with("x = 1\ndef f():\n    x = 'a'\n    return x\n");
        let reference = last_name(&session, file, "x");
        let decls = session.lookup_name(reference, "x");
        assert_eq!(decls.len(), 1);
        let tree = session.tree(file).unwrap();
        assert_eq!(enclosing_scope(&tree, decls[0].node), enclosing_scope(&tree, reference.node));
    }

    #[test]
    fn test_builtins_close_the_chain() {
        let (mut session, file) = session_with("len\n");
        let reference = last_name(&session, file, "len");
        let decls = session.lookup_name(reference, "len");
        assert_eq!(decls.len(), 1);
        assert_ne!(decls[0].file, file);
    }

    #[test]
    fn test_unpack_with_star_target() {
        let (mut session, file) = session_with("a, *rest, z = (1, 2, 3, 4)\n");
        let ctx = session.module_context(file);
        let z = NodeRef::new(file, session.tree(file).unwrap().find_names("z")[0]);
        let values = session.infer_binding(z, ctx);
        let literal = values.iter().next().and_then(|v| session.pool.get(v).literal().cloned());
        assert_eq!(literal, Some(crate::core::LiteralValue::Int(4)));

        let rest = NodeRef::new(file, session.tree(file).unwrap().find_names("rest")[0]);
        let values = session.infer_binding(rest, ctx);
        assert_eq!(values.len(), 1);
        let value = session.pool.get(values.iter().next().unwrap());
        assert!(matches!(value, Value::Instance { payload: InstancePayload::TypeArgs(args), .. } if args[0].len() == 2));
    }

    #[test]
    fn test_dunder_name_without_declaration() {
        let (mut session, file) = session_with("__name__\n");
        let reference = last_name(&session, file, "__name__");
        let ctx = session.module_context(file);
        let values = session.infer_name(reference, "__name__", ctx);
        let literal = values.iter().next().and_then(|v| session.pool.get(v).literal().cloned());
        assert_eq!(literal, Some(crate::core::LiteralValue::Str("__main__".to_string())));
    }
}
