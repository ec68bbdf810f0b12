//! Calls, argument binding and function execution
//!
//! Executing a function creates an activation context keyed by the function
//! value and the call's evaluated arguments, so one body evaluated for two
//! different call sites lands in two cache entries. Source functions return
//! the union of their `return` expressions; stub functions return their
//! annotation, with type variables filled in from the receiver and the
//! arguments.

use crate::analysis::builtins::SpecialForm;
use crate::analysis::members::{method_kind, MethodKind};
use crate::analysis::Session;
use crate::ast::{FileId, NodeId, NodeKind, NodeRef, ParamKind, SyntaxTree};
use crate::compiled::CompiledCall;
use crate::core::{
    Arguments, ArgsId, Context, ContextId, ContextKind, InstancePayload, LiteralValue, Value, ValueId, ValueSet,
};
use crate::performance::cache::{CacheKey, Slot};
use crate::performance::metrics::Counter;
use std::collections::HashMap;

/// Type variable name to the values it stands for in one call
pub(crate) type TypeVarMap = HashMap<String, ValueSet>;

/// Parameter shape used for argument binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub has_default: bool,
}

/// What one parameter receives from a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ParamBinding {
    Values(ValueSet),
    /// Surplus positionals collected by `*args`
    Rest(Vec<ValueSet>),
    /// Surplus keywords collected by `**kwargs`
    Keywords(Vec<(String, ValueSet)>),
    Default,
    Missing,
}

/// Bind call arguments to parameters.
///
/// `skip` parameters at the front are already satisfied by the receiver.
pub(crate) fn bind_arguments(
    params: &[ParamSpec],
    skip: usize,
    positional: &[ValueSet],
    keywords: &[(String, ValueSet)],
) -> Vec<ParamBinding> {
    let mut bindings = vec![ParamBinding::Missing; params.len()];
    let mut remaining = positional.iter();

    for (i, param) in params.iter().enumerate().skip(skip) {
        match param.kind {
            ParamKind::PositionalOnly | ParamKind::Normal => {
                if let Some(values) = remaining.next() {
                    bindings[i] = ParamBinding::Values(values.clone());
                }
            }
            ParamKind::VarArgs => {
                bindings[i] = ParamBinding::Rest(remaining.by_ref().cloned().collect());
            }
            ParamKind::KeywordOnly | ParamKind::VarKeywords => {}
        }
    }

    let mut extra = Vec::new();
    for (name, values) in keywords {
        let target = params.iter().enumerate().skip(skip).find(|(_, p)| {
            &p.name == name && matches!(p.kind, ParamKind::Normal | ParamKind::KeywordOnly)
        });
        match target {
            Some((i, _)) if bindings[i] == ParamBinding::Missing => {
                bindings[i] = ParamBinding::Values(values.clone());
            }
            Some(_) => {}
            None => extra.push((name.clone(), values.clone())),
        }
    }

    for (i, param) in params.iter().enumerate().skip(skip) {
        match param.kind {
            ParamKind::VarKeywords => bindings[i] = ParamBinding::Keywords(std::mem::take(&mut extra)),
            ParamKind::VarArgs if bindings[i] == ParamBinding::Missing => bindings[i] = ParamBinding::Rest(Vec::new()),
            _ if bindings[i] == ParamBinding::Missing && param.has_default => bindings[i] = ParamBinding::Default,
            _ => {}
        }
    }
    bindings
}

fn param_specs(tree: &SyntaxTree, params: &[NodeId]) -> Vec<ParamSpec> {
    params
        .iter()
        .filter_map(|&p| match tree.kind(p) {
            NodeKind::Param { name, kind, default, .. } => Some(ParamSpec {
                name: name.clone(),
                kind: *kind,
                has_default: default.is_some(),
            }),
            _ => None,
        })
        .collect()
}

fn def_params(tree: &SyntaxTree, def: NodeId) -> &[NodeId] {
    match tree.kind(def) {
        NodeKind::FunctionDef { params, .. } | NodeKind::Lambda { params, .. } => params,
        _ => &[],
    }
}

/// `return` and `yield` nodes of a function body, not counting nested scopes
fn body_exits(tree: &SyntaxTree, def: NodeId) -> (Vec<NodeId>, Vec<NodeId>) {
    let mut returns = Vec::new();
    let mut yields = Vec::new();
    let mut stack: Vec<NodeId> = match tree.kind(def) {
        NodeKind::FunctionDef { body, .. } => body.iter().rev().copied().collect(),
        _ => Vec::new(),
    };
    while let Some(id) = stack.pop() {
        match tree.kind(id) {
            NodeKind::Return { .. } => returns.push(id),
            NodeKind::Yield { .. } | NodeKind::YieldFrom { .. } => yields.push(id),
            kind if kind.is_scope() => continue,
            _ => {}
        }
        stack.extend(tree.node(id).children.iter().rev().copied());
    }
    (returns, yields)
}

impl Session {
    /// A `Call` node: callee and arguments evaluated in `ctx`
    pub(crate) fn evaluate_call(
        &mut self,
        func: NodeRef,
        args: &[NodeId],
        keywords: &[NodeId],
        ctx: ContextId,
    ) -> ValueSet {
        let callee = self.eval(func, ctx);
        if args.is_empty() && keywords.is_empty() {
            if let Some(sup) = self.builtin_class("super") {
                if callee.contains(sup) {
                    let rest = callee.without(sup);
                    let anonymous = self.pool.arguments(Arguments::Anonymous);
                    return self.super_values(ctx).union(&self.call(&rest, anonymous));
                }
            }
        }
        let arguments = self.evaluate_arguments(func.file, args, keywords, ctx);
        self.call(&callee, arguments)
    }

    /// Evaluate call arguments; a call without any is anonymous
    pub(crate) fn evaluate_arguments(
        &mut self,
        file: FileId,
        args: &[NodeId],
        keywords: &[NodeId],
        ctx: ContextId,
    ) -> ArgsId {
        if args.is_empty() && keywords.is_empty() {
            return self.pool.arguments(Arguments::Anonymous);
        }
        let Some(tree) = self.tree_of(file) else {
            return self.pool.arguments(Arguments::Anonymous);
        };

        let mut positional = Vec::with_capacity(args.len());
        for &arg in args {
            match tree.kind(arg) {
                NodeKind::Starred { value, .. } => {
                    let spread = self.eval(NodeRef::new(file, *value), ctx);
                    positional.push(self.iterate(&spread));
                }
                _ => positional.push(self.eval(NodeRef::new(file, arg), ctx)),
            }
        }

        let mut named = Vec::new();
        for &keyword in keywords {
            if let NodeKind::Keyword { arg: Some(name), value } = tree.kind(keyword) {
                named.push((name.clone(), self.eval(NodeRef::new(file, *value), ctx)));
            }
        }

        self.pool.arguments(Arguments::Values {
            positional,
            keywords: named,
        })
    }

    /// Call every callable value in `callee`; the rest contribute nothing
    pub(crate) fn call(&mut self, callee: &ValueSet, arguments: ArgsId) -> ValueSet {
        callee.flat_map(|v| self.call_value(v, arguments))
    }

    /// Look up `name` on `values` and call it
    pub(crate) fn call_method(&mut self, values: &ValueSet, name: &str, arguments: ArgsId) -> ValueSet {
        let method = self.member_of_set(values, name);
        self.call(&method, arguments)
    }

    fn call_value(&mut self, callee: ValueId, arguments: ArgsId) -> ValueSet {
        match self.pool.get(callee) {
            Value::Function { .. } => self.execute_function(callee, arguments),
            Value::Class { .. } => self.instantiate(callee, arguments),
            Value::Instance { .. } => self.call_method(&ValueSet::single(callee), "__call__", arguments),
            Value::Compiled(id) => {
                let id = *id;
                match self.compiled.call(id) {
                    CompiledCall::Instance(instance) => ValueSet::single(self.pool.value(Value::Compiled(instance))),
                    CompiledCall::Unknown => self.unknown(),
                    CompiledCall::NotCallable => ValueSet::empty(),
                }
            }
            Value::Unknown => self.unknown(),
            Value::Module(_) | Value::Literal(_) => ValueSet::empty(),
        }
    }

    /// Calling a class creates an instance, with a few builtins modelled
    fn instantiate(&mut self, class: ValueId, arguments: ArgsId) -> ValueSet {
        let positional = match self.pool.get_arguments(arguments) {
            Arguments::Values { positional, .. } => positional.clone(),
            Arguments::Anonymous => Vec::new(),
        };

        if positional.len() == 1 {
            if self.is_builtin_class(class, "type") {
                return self.type_of(&positional[0]);
            }
            for name in ["list", "set", "frozenset", "tuple"] {
                if self.is_builtin_class(class, name) {
                    let elements = self.iterate(&positional[0]);
                    let instance = self.pool.value(Value::Instance {
                        class,
                        payload: InstancePayload::TypeArgs(vec![elements]),
                    });
                    return ValueSet::single(instance);
                }
            }
        }
        match self.special_form(class) {
            Some(SpecialForm::Any) => self.unknown(),
            _ => ValueSet::single(self.pool.value(Value::Instance {
                class,
                payload: InstancePayload::Plain { arguments },
            })),
        }
    }

    /// `type(x)`
    fn type_of(&mut self, values: &ValueSet) -> ValueSet {
        values.flat_map(|v| match self.pool.get(v) {
            Value::Instance { class, .. } => ValueSet::single(*class),
            Value::Literal(literal) => {
                let name = literal.class_name();
                self.builtin_class(name).map(ValueSet::single).unwrap_or_default()
            }
            Value::Class { .. } => self.builtin_class("type").map(ValueSet::single).unwrap_or_default(),
            Value::Module(_) => self.builtin_class("module").map(ValueSet::single).unwrap_or_default(),
            Value::Function { .. } => self.builtin_class("function").map(ValueSet::single).unwrap_or_default(),
            Value::Compiled(_) | Value::Unknown => self.unknown(),
        })
    }

    /// `super()` inside a method: the receiver seen as an instance of each base
    fn super_values(&mut self, ctx: ContextId) -> ValueSet {
        let mut current = Some(ctx);
        while let Some(id) = current {
            let context = self.pool.get_context(id).clone();
            if let ContextKind::Function { function, .. } = context.kind {
                let class = context
                    .parent
                    .and_then(|parent| match self.pool.get_context(parent).kind {
                        ContextKind::Class { class } => Some(class),
                        _ => None,
                    });
                if let Some(class) = class {
                    return self.super_of(class, function);
                }
            }
            current = context.parent;
        }
        ValueSet::empty()
    }

    fn super_of(&mut self, class: ValueId, function: ValueId) -> ValueSet {
        let receiver = match self.pool.get(function) {
            Value::Function { bound, .. } => *bound,
            _ => None,
        };
        let payload = match receiver.map(|r| self.pool.get(r)) {
            Some(Value::Instance { payload, .. }) => Some(payload.clone()),
            Some(Value::Class { .. }) => None,
            _ => Some(InstancePayload::Plain {
                arguments: self.pool.arguments(Arguments::Anonymous),
            }),
        };
        let mut bases: ValueSet = self.class_bases(class).into_iter().collect();
        if bases.is_empty() {
            bases = self.builtin_class("object").map(ValueSet::single).unwrap_or_default();
        }
        bases.flat_map(|base| {
            if !self.pool.get(base).is_class() {
                return ValueSet::empty();
            }
            match &payload {
                Some(payload) => ValueSet::single(self.pool.value(Value::Instance {
                    class: base,
                    payload: payload.clone(),
                })),
                None => ValueSet::single(base),
            }
        })
    }

    /// Run `function` with `arguments`
    fn execute_function(&mut self, function: ValueId, arguments: ArgsId) -> ValueSet {
        let Value::Function { def, context, .. } = *self.pool.get(function) else {
            return ValueSet::empty();
        };
        let Some(tree) = self.tree_of(def.file) else {
            return ValueSet::empty();
        };
        let execution = self.pool.context(Context {
            kind: ContextKind::Function { function, arguments },
            scope: def,
            parent: Some(context),
        });

        if tree.is_stub() {
            return self.stub_returns(&tree, function, def, execution);
        }

        let key = CacheKey::new(def, execution, Slot::Returns);
        if let Some(values) = self.cache.get(&key) {
            return values.clone();
        }
        if !self.limiter.push_execution(def) {
            self.metrics.increment(Counter::ExecutionsRefused);
            return ValueSet::empty();
        }
        self.metrics.increment(Counter::Executions);
        let values = self.cached(def, execution, Slot::Returns, |s| s.returns_of(&tree, def, execution));
        self.limiter.pop_execution(def);
        values
    }

    fn returns_of(&mut self, tree: &SyntaxTree, def: NodeRef, execution: ContextId) -> ValueSet {
        let at = |id: NodeId| NodeRef::new(def.file, id);
        let (returns_annotation, is_lambda_body) = match tree.kind(def.node) {
            NodeKind::FunctionDef { returns, .. } => (*returns, None),
            NodeKind::Lambda { body, .. } => (None, Some(*body)),
            _ => return ValueSet::empty(),
        };
        if let Some(body) = is_lambda_body {
            return self.eval(at(body), execution);
        }

        let (returns, yields) = body_exits(tree, def.node);
        if !yields.is_empty() {
            return self.container("generator", InstancePayload::Generator { execution });
        }
        if let Some(annotation) = returns_annotation {
            let declared = self.annotation_values(at(annotation), execution);
            if !declared.is_empty() {
                return declared;
            }
        }
        if returns.is_empty() {
            return self.literal(LiteralValue::None);
        }

        let mut out = ValueSet::empty();
        for ret in returns {
            match tree.kind(ret) {
                NodeKind::Return { value: Some(value) } => out.union_with(&self.eval(at(*value), execution)),
                _ => out.union_with(&self.literal(LiteralValue::None)),
            }
        }
        out
    }

    /// Union of what a generator's execution yields
    pub(crate) fn yields_of(&mut self, execution: ContextId) -> ValueSet {
        let def = self.pool.get_context(execution).scope;
        self.cached(def, execution, Slot::Yields, |s| {
            let Some(tree) = s.tree_of(def.file) else {
                return ValueSet::empty();
            };
            let (_, yields) = body_exits(&tree, def.node);
            let mut out = ValueSet::empty();
            for node in yields {
                let values = match tree.kind(node) {
                    NodeKind::Yield { value: Some(value) } => s.eval(NodeRef::new(def.file, *value), execution),
                    NodeKind::YieldFrom { value } => {
                        let inner = s.eval(NodeRef::new(def.file, *value), execution);
                        s.iterate(&inner)
                    }
                    _ => s.literal(LiteralValue::None),
                };
                out.union_with(&values);
            }
            out
        })
    }

    /// Stub functions return their annotation with type variables filled in
    fn stub_returns(&mut self, tree: &SyntaxTree, function: ValueId, def: NodeRef, execution: ContextId) -> ValueSet {
        let NodeKind::FunctionDef { returns, .. } = tree.kind(def.node) else {
            return self.unknown();
        };
        let Some(returns) = returns else {
            return self.unknown();
        };
        let returns = NodeRef::new(def.file, *returns);
        self.cached(def, execution, Slot::Returns, |s| {
            let vars = s.call_type_vars(function, execution);
            s.annotation_with(returns, execution, &vars)
        })
    }

    /// Values of parameter `decl` in activation `ctx`
    pub(crate) fn param_values(&mut self, decl: NodeRef, ctx: ContextId) -> ValueSet {
        let Some(tree) = self.tree_of(decl.file) else {
            return ValueSet::empty();
        };
        let NodeKind::Param { kind, annotation, default, .. } = tree.kind(decl.node) else {
            return ValueSet::empty();
        };
        let Some(def) = tree.parent(decl.node) else {
            return ValueSet::empty();
        };
        let params = def_params(&tree, def);
        let Some(position) = params.iter().position(|&p| p == decl.node) else {
            return ValueSet::empty();
        };
        let at = |id: NodeId| NodeRef::new(decl.file, id);

        let (function, arguments) = match self.pool.get_context(ctx).kind {
            ContextKind::Function { function, arguments } => (function, arguments),
            _ => return ValueSet::empty(),
        };
        let Value::Function { context: def_ctx, bound, .. } = *self.pool.get(function) else {
            return ValueSet::empty();
        };
        let owner = match self.pool.get_context(def_ctx).kind {
            ContextKind::Class { class } => Some(class),
            _ => None,
        };
        let method = match owner {
            Some(_) => method_kind(&tree, def),
            None if bound.is_some() => MethodKind::Plain,
            None => MethodKind::Static,
        };
        let takes_receiver = method != MethodKind::Static && matches!(kind, ParamKind::PositionalOnly | ParamKind::Normal);
        let anonymous = matches!(self.pool.get_arguments(arguments), Arguments::Anonymous);

        if position == 0 && takes_receiver {
            if let Some(receiver) = bound {
                return ValueSet::single(receiver);
            }
            if let (Some(class), true) = (owner, anonymous) {
                return match method {
                    MethodKind::Class => ValueSet::single(class),
                    _ => ValueSet::single(self.plain_instance(class)),
                };
            }
        }

        if let Some(annotation) = annotation {
            let declared = self.annotation_values(at(*annotation), ctx);
            if !declared.is_empty() {
                return match kind {
                    ParamKind::VarArgs => self.container("tuple", InstancePayload::TypeArgs(vec![declared])),
                    ParamKind::VarKeywords => {
                        let key = self.builtin_instance("str");
                        self.container("dict", InstancePayload::TypeArgs(vec![key, declared]))
                    }
                    _ => declared,
                };
            }
        }

        let binding = match self.pool.get_arguments(arguments).clone() {
            Arguments::Anonymous => match kind {
                ParamKind::VarArgs => ParamBinding::Rest(Vec::new()),
                ParamKind::VarKeywords => ParamBinding::Keywords(Vec::new()),
                _ if default.is_some() => ParamBinding::Default,
                _ => ParamBinding::Missing,
            },
            Arguments::Values { positional, keywords } => {
                let specs = param_specs(&tree, params);
                let skip = usize::from(bound.is_some() && takes_receiver_at_zero(&specs, method));
                bind_arguments(&specs, skip, &positional, &keywords)
                    .into_iter()
                    .nth(position)
                    .unwrap_or(ParamBinding::Missing)
            }
        };

        match binding {
            ParamBinding::Values(values) => values,
            ParamBinding::Rest(values) => self.container("tuple", InstancePayload::Sequence(values)),
            ParamBinding::Keywords(pairs) => {
                let pairs = pairs
                    .into_iter()
                    .map(|(name, values)| (self.literal(LiteralValue::Str(name)), values))
                    .collect();
                self.container("dict", InstancePayload::Mapping(pairs))
            }
            ParamBinding::Default => match default {
                Some(default) => self.eval_at(at(*default), ctx),
                None => ValueSet::empty(),
            },
            ParamBinding::Missing => ValueSet::empty(),
        }
    }

    /// Type variables of one stub call: receiver first, then arguments
    fn call_type_vars(&mut self, function: ValueId, execution: ContextId) -> TypeVarMap {
        let mut vars = TypeVarMap::new();
        let Value::Function { def, bound, .. } = *self.pool.get(function) else {
            return vars;
        };
        if let Some(receiver) = bound {
            self.receiver_type_vars(receiver, &mut vars);
        }

        let Some(tree) = self.tree_of(def.file) else {
            return vars;
        };
        let params = def_params(&tree, def.node).to_vec();
        for param in params {
            let NodeKind::Param { annotation: Some(annotation), .. } = tree.kind(param) else {
                continue;
            };
            let values = self.param_values(NodeRef::new(def.file, param), execution);
            if values.is_empty() {
                continue;
            }
            self.match_type_vars(NodeRef::new(def.file, *annotation), &values, execution, &mut vars);
        }
        vars
    }

    /// Type variables bound by what an instance carries
    fn receiver_type_vars(&mut self, receiver: ValueId, vars: &mut TypeVarMap) {
        let Value::Instance { class, payload } = self.pool.get(receiver).clone() else {
            return;
        };
        let params = self.class_type_params(class);
        let bind = |vars: &mut TypeVarMap, i: usize, values: ValueSet| {
            if let Some(name) = params.get(i) {
                vars.entry(name.clone()).or_default().union_with(&values);
            }
        };
        match payload {
            InstancePayload::TypeArgs(args) => {
                if params.len() == 1 && args.len() > 1 {
                    bind(vars, 0, args.into_iter().collect());
                } else {
                    for (i, values) in args.into_iter().enumerate() {
                        bind(vars, i, values);
                    }
                }
            }
            InstancePayload::Sequence(elements) => bind(vars, 0, elements.into_iter().collect()),
            InstancePayload::Mapping(pairs) => {
                let (keys, values): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
                bind(vars, 0, keys.into_iter().collect());
                bind(vars, 1, values.into_iter().collect());
            }
            InstancePayload::Generator { execution } => {
                let yielded = self.yields_of(execution);
                bind(vars, 0, yielded);
            }
            InstancePayload::Plain { .. } => {}
        }
        self.base_type_vars(class, vars);
    }

    /// `class IntList(list[int])` fixes the base's type variables
    fn base_type_vars(&mut self, class: ValueId, vars: &mut TypeVarMap) {
        let Value::Class { def, context } = *self.pool.get(class) else {
            return;
        };
        let Some(tree) = self.tree_of(def.file) else {
            return;
        };
        let NodeKind::ClassDef { bases, .. } = tree.kind(def.node) else {
            return;
        };
        for &base in bases {
            let NodeKind::Subscript { value, slice, .. } = tree.kind(base) else {
                continue;
            };
            let base_classes = self.eval_at(NodeRef::new(def.file, *value), context);
            let args = subscript_elements(&tree, *slice);
            for base_class in base_classes.iter() {
                if !self.pool.get(base_class).is_class() {
                    continue;
                }
                let params = self.class_type_params(base_class);
                for (name, &arg) in params.iter().zip(&args) {
                    if vars.contains_key(name) {
                        continue;
                    }
                    let values = self.annotation_values(NodeRef::new(def.file, arg), context);
                    vars.insert(name.clone(), values);
                }
            }
        }
    }

    /// Type parameters of a generic class, in order.
    ///
    /// An explicit `Generic[...]` or `Protocol[...]` base decides; otherwise
    /// the type variables of the subscripted bases in order of appearance.
    pub(crate) fn class_type_params(&mut self, class: ValueId) -> Vec<String> {
        let Value::Class { def, context } = *self.pool.get(class) else {
            return Vec::new();
        };
        let Some(tree) = self.tree_of(def.file) else {
            return Vec::new();
        };
        let NodeKind::ClassDef { bases, .. } = tree.kind(def.node) else {
            return Vec::new();
        };

        let mut params = Vec::new();
        for &base in bases {
            let NodeKind::Subscript { value, slice, .. } = tree.kind(base) else {
                continue;
            };
            let names: Vec<String> = subscript_elements(&tree, *slice)
                .into_iter()
                .filter(|&arg| self.is_type_var(NodeRef::new(def.file, arg)))
                .filter_map(|arg| tree.declared_name(arg).map(str::to_string))
                .collect();
            let base_values = self.eval_at(NodeRef::new(def.file, *value), context);
            let explicit = base_values
                .iter()
                .any(|v| matches!(self.special_form(v), Some(SpecialForm::Generic | SpecialForm::Protocol)));
            if explicit {
                return names;
            }
            for name in names {
                if !params.contains(&name) {
                    params.push(name);
                }
            }
        }
        params
    }

    /// Whether the name at `node` refers to a `TypeVar(...)` assignment
    pub(crate) fn is_type_var(&mut self, node: NodeRef) -> bool {
        let Some(tree) = self.tree_of(node.file) else {
            return false;
        };
        let NodeKind::Name { id, .. } = tree.kind(node.node) else {
            return false;
        };
        let decls = self.lookup_name(node, id);
        decls.iter().any(|decl| {
            let Some(decl_tree) = self.tree_of(decl.file) else {
                return false;
            };
            let Some(NodeKind::Assign { value, .. }) = decl_tree.parent(decl.node).map(|p| decl_tree.kind(p)) else {
                return false;
            };
            let NodeKind::Call { func, .. } = decl_tree.kind(*value) else {
                return false;
            };
            matches!(
                decl_tree.kind(*func),
                NodeKind::Name { id, .. } | NodeKind::Attribute { attr: id, .. } if id == "TypeVar"
            )
        })
    }

    /// Match annotation `annotation` against `values`, recording type variables
    fn match_type_vars(&mut self, annotation: NodeRef, values: &ValueSet, ctx: ContextId, vars: &mut TypeVarMap) {
        let Some(tree) = self.tree_of(annotation.file) else {
            return;
        };
        let at = |id: NodeId| NodeRef::new(annotation.file, id);
        match tree.kind(annotation.node) {
            NodeKind::Name { id, .. } => {
                if self.is_type_var(annotation) {
                    let widened = self.widen(values);
                    vars.entry(id.clone()).or_default().union_with(&widened);
                }
            }
            NodeKind::BinOp { left, right, .. } => {
                self.match_type_vars(at(*left), values, ctx, vars);
                self.match_type_vars(at(*right), values, ctx, vars);
            }
            NodeKind::Subscript { value, slice, .. } => {
                let base = self.eval_at(at(*value), ctx);
                let form = base.iter().find_map(|v| self.special_form(v));
                let args = subscript_elements(&tree, *slice);
                match form {
                    Some(SpecialForm::Type) => {
                        let instances = self.instances_of_classes(values);
                        if let Some(&arg) = args.first() {
                            self.match_type_vars(at(arg), &instances, ctx, vars);
                        }
                    }
                    Some(SpecialForm::Optional | SpecialForm::Union) => {
                        let none = self.literal(LiteralValue::None);
                        let without_none = match none.iter().next() {
                            Some(none) => values.without(none),
                            None => values.clone(),
                        };
                        for arg in args {
                            self.match_type_vars(at(arg), &without_none, ctx, vars);
                        }
                    }
                    Some(_) => {}
                    None => {
                        for (i, arg) in args.into_iter().enumerate() {
                            let element = self.type_arg(values, i);
                            if !element.is_empty() {
                                self.match_type_vars(at(arg), &element, ctx, vars);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn instances_of_classes(&mut self, values: &ValueSet) -> ValueSet {
        values.flat_map(|v| match self.pool.get(v) {
            Value::Class { .. } => ValueSet::single(self.plain_instance(v)),
            _ => ValueSet::empty(),
        })
    }
}

/// Bound receivers occupy the first parameter only for methods that take one
fn takes_receiver_at_zero(specs: &[ParamSpec], method: MethodKind) -> bool {
    method != MethodKind::Static
        && specs
            .first()
            .map_or(false, |p| matches!(p.kind, ParamKind::PositionalOnly | ParamKind::Normal))
}

/// Elements of a subscript slice: `X[a, b]` has two, `X[a]` one
pub(crate) fn subscript_elements(tree: &SyntaxTree, slice: NodeId) -> Vec<NodeId> {
    match tree.kind(slice) {
        NodeKind::Tuple { elts, .. } => elts.clone(),
        _ => vec![slice],
    }
}
