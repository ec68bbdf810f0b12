//! Attribute lookup
//!
//! Classes are searched own body first, then each base in declared order.
//! The first base branch that produces anything wins, but a base expression
//! that evaluates to several classes contributes all of them. Instances see
//! class members first and `self.<name>` assignments second.

use crate::analysis::names::decorator_name;
use crate::analysis::scope::enclosing_scope;
use crate::analysis::Session;
use crate::ast::{NodeId, NodeKind, NodeRef, SyntaxTree};
use crate::compiled::{CompiledShape, MemberKind};
use crate::core::{
    Arguments, CompiledId, Context, ContextId, ContextKind, InstancePayload, ModuleId, Value, ValueId, ValueSet,
};
use std::collections::HashSet;
use tracing::trace;

/// How a function found in a class body binds on attribute access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MethodKind {
    Plain,
    Static,
    Class,
    Property,
}

/// Method kind from the decorators of `def`
pub(crate) fn method_kind(tree: &SyntaxTree, def: NodeId) -> MethodKind {
    let NodeKind::FunctionDef { decorators, .. } = tree.kind(def) else {
        return MethodKind::Plain;
    };
    for &decorator in decorators {
        match decorator_name(tree, decorator) {
            Some("staticmethod") => return MethodKind::Static,
            Some("classmethod") => return MethodKind::Class,
            Some("property" | "cached_property" | "getter") => return MethodKind::Property,
            _ => {}
        }
    }
    MethodKind::Plain
}

/// Where a class member comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Member {
    /// Declared in the body of `owner`
    Declared { owner: ValueId, decl: NodeRef },
    /// Attribute of a compiled base class
    Compiled(CompiledId),
    /// A base could not be characterized
    Unknown,
}

/// Shape of a value as far as attribute lookup cares
#[derive(Clone, Copy)]
enum Receiver {
    Module(ModuleId),
    Class,
    Instance(ValueId),
    Builtin(&'static str),
    Compiled(CompiledId),
    Unknown,
}

impl Session {
    /// `values.name` for every value in the set
    pub(crate) fn member_of_set(&mut self, values: &ValueSet, name: &str) -> ValueSet {
        values.flat_map(|v| self.member(v, name))
    }

    pub(crate) fn member(&mut self, value: ValueId, name: &str) -> ValueSet {
        match self.receiver(value) {
            Receiver::Module(module) => self.module_member(module, name),
            Receiver::Class => self.class_attribute(value, name),
            Receiver::Instance(class) => self.instance_attribute(value, class, name),
            Receiver::Builtin(class_name) => match self.builtin_class(class_name) {
                Some(class) => self.instance_attribute(value, class, name),
                None => self.unknown(),
            },
            Receiver::Compiled(id) => self.compiled_member(id, name),
            Receiver::Unknown => self.unknown(),
        }
    }

    fn receiver(&self, value: ValueId) -> Receiver {
        match self.pool.get(value) {
            Value::Module(module) => Receiver::Module(*module),
            Value::Class { .. } => Receiver::Class,
            Value::Instance { class, .. } => Receiver::Instance(*class),
            Value::Literal(literal) => Receiver::Builtin(literal.class_name()),
            Value::Function { .. } => Receiver::Builtin("function"),
            Value::Compiled(id) => Receiver::Compiled(*id),
            Value::Unknown => Receiver::Unknown,
        }
    }

    /// Context the body of `class` is evaluated in
    pub(crate) fn class_context(&mut self, class: ValueId) -> Option<ContextId> {
        let Value::Class { def, context } = self.pool.get(class).clone() else {
            return None;
        };
        Some(self.pool.context(Context {
            kind: ContextKind::Class { class },
            scope: def,
            parent: Some(context),
        }))
    }

    /// Evaluated base class expressions of `class`, in declared order
    pub(crate) fn class_bases(&mut self, class: ValueId) -> Vec<ValueSet> {
        let Value::Class { def, context } = self.pool.get(class).clone() else {
            return Vec::new();
        };
        let Some(tree) = self.tree_of(def.file) else {
            return Vec::new();
        };
        let NodeKind::ClassDef { bases, .. } = tree.kind(def.node) else {
            return Vec::new();
        };
        bases
            .iter()
            .map(|&base| self.eval_at(NodeRef::new(def.file, base), context))
            .collect()
    }

    /// Classes in lookup order: `class`, then each base depth first
    pub(crate) fn linearize(&mut self, class: ValueId) -> Vec<ValueId> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        self.linearize_into(class, &mut visited, &mut order);
        if let Some(object) = self.builtin_class("object") {
            if visited.insert(object) {
                order.push(object);
            }
        }
        order
    }

    fn linearize_into(&mut self, class: ValueId, visited: &mut HashSet<ValueId>, order: &mut Vec<ValueId>) {
        if !self.pool.get(class).is_class() || !visited.insert(class) {
            return;
        }
        order.push(class);
        for base in self.class_bases(class) {
            for candidate in base.iter() {
                self.linearize_into(candidate, visited, order);
            }
        }
    }

    fn class_members(&mut self, class: ValueId, name: &str) -> Vec<Member> {
        let mut visited = HashSet::new();
        let found = self.class_members_guarded(class, name, &mut visited);
        if !found.is_empty() {
            return found;
        }
        match self.builtin_class("object") {
            Some(object) if !visited.contains(&object) => self.class_members_guarded(object, name, &mut visited),
            _ => Vec::new(),
        }
    }

    fn class_members_guarded(&mut self, class: ValueId, name: &str, visited: &mut HashSet<ValueId>) -> Vec<Member> {
        if !visited.insert(class) {
            trace!(class = class.0, "class hierarchy cycle");
            return Vec::new();
        }
        let Some(def) = self.pool.get(class).definition() else {
            return Vec::new();
        };
        if let Some(index) = self.scopes_of(def.file) {
            if let Some(scope) = index.scope(def.node) {
                let own = scope.get(name);
                if !own.is_empty() {
                    return own
                        .iter()
                        .map(|&decl| Member::Declared {
                            owner: class,
                            decl: NodeRef::new(def.file, decl),
                        })
                        .collect();
                }
            }
        }

        for base in self.class_bases(class) {
            let mut found = Vec::new();
            for candidate in base.iter() {
                match self.pool.get(candidate) {
                    Value::Class { .. } => found.extend(self.class_members_guarded(candidate, name, visited)),
                    Value::Compiled(id) => {
                        let id = *id;
                        if let Some(member) = self.compiled.member(id, name) {
                            found.push(Member::Compiled(member));
                        }
                    }
                    Value::Unknown => found.push(Member::Unknown),
                    _ => {}
                }
            }
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    fn member_values(&mut self, member: Member) -> ValueSet {
        match member {
            Member::Declared { owner, decl } => match self.class_context(owner) {
                Some(ctx) => self.infer_binding(decl, ctx),
                None => ValueSet::empty(),
            },
            Member::Compiled(id) => self.compiled_value(id),
            Member::Unknown => self.unknown(),
        }
    }

    /// `C.name`
    fn class_attribute(&mut self, class: ValueId, name: &str) -> ValueSet {
        let members = self.class_members(class, name);
        if members.is_empty() {
            // Attributes every class has through its metaclass
            return match self.builtin_class("type") {
                Some(metaclass) if metaclass != class => {
                    let members = self.class_members(metaclass, name);
                    let mut out = ValueSet::empty();
                    for member in members {
                        let values = self.member_values(member);
                        out.union_with(&self.bind_to_instance(&values, class, metaclass));
                    }
                    out
                }
                _ => ValueSet::empty(),
            };
        }

        let mut out = ValueSet::empty();
        for member in members {
            let values = self.member_values(member);
            out.union_with(&self.bind_to_class(&values, class));
        }
        out
    }

    /// `instance.name` where `instance` is an instance of `class`
    fn instance_attribute(&mut self, instance: ValueId, class: ValueId, name: &str) -> ValueSet {
        let members = self.class_members(class, name);
        if !members.is_empty() {
            let mut out = ValueSet::empty();
            for member in members {
                let values = self.member_values(member);
                out.union_with(&self.bind_to_instance(&values, instance, class));
            }
            return out;
        }

        let assigned = self.self_attribute_values(instance, class, name);
        if !assigned.is_empty() {
            return assigned;
        }

        let fallback = self.class_members(class, "__getattr__");
        if fallback.is_empty() {
            return ValueSet::empty();
        }
        let mut getattr = ValueSet::empty();
        for member in fallback {
            let values = self.member_values(member);
            getattr.union_with(&self.bind_to_instance(&values, instance, class));
        }
        let key = self.builtin_instance("str");
        let arguments = self.pool.arguments(Arguments::positional(vec![key]));
        self.call(&getattr, arguments)
    }

    /// Methods found through a class: classmethods bind the class
    fn bind_to_class(&mut self, values: &ValueSet, class: ValueId) -> ValueSet {
        values.flat_map(|v| match self.pool.get(v).clone() {
            Value::Function { def, context, bound: None } if self.method_kind_of(def) == MethodKind::Class => {
                ValueSet::single(self.pool.value(Value::Function {
                    def,
                    context,
                    bound: Some(class),
                }))
            }
            _ => ValueSet::single(v),
        })
    }

    /// Methods found through an instance bind the receiver; properties run
    fn bind_to_instance(&mut self, values: &ValueSet, instance: ValueId, class: ValueId) -> ValueSet {
        values.flat_map(|v| match self.pool.get(v).clone() {
            Value::Function { def, context, bound: None } => {
                let receiver = match self.method_kind_of(def) {
                    MethodKind::Static => return ValueSet::single(v),
                    MethodKind::Class => class,
                    MethodKind::Plain | MethodKind::Property => instance,
                };
                let method = ValueSet::single(self.pool.value(Value::Function {
                    def,
                    context,
                    bound: Some(receiver),
                }));
                if self.method_kind_of(def) == MethodKind::Property {
                    let anonymous = self.pool.arguments(Arguments::Anonymous);
                    self.call(&method, anonymous)
                } else {
                    method
                }
            }
            _ => ValueSet::single(v),
        })
    }

    pub(crate) fn method_kind_of(&self, def: NodeRef) -> MethodKind {
        self.tree_of(def.file)
            .map_or(MethodKind::Plain, |tree| method_kind(&tree, def.node))
    }

    /// Values assigned to `self.<name>` in the methods of `class` and its bases
    fn self_attribute_values(&mut self, instance: ValueId, class: ValueId, name: &str) -> ValueSet {
        for owner in self.linearize(class) {
            let Some(def) = self.pool.get(owner).definition() else {
                continue;
            };
            let (Some(tree), Some(index)) = (self.tree_of(def.file), self.scopes_of(def.file)) else {
                continue;
            };
            let decls = index
                .scope(def.node)
                .map(|scope| scope.instance_attribute(name).to_vec())
                .unwrap_or_default();
            if decls.is_empty() {
                continue;
            }

            let mut out = ValueSet::empty();
            for decl in decls {
                let method = NodeRef::new(def.file, enclosing_scope(&tree, decl));
                let Some(ctx) = self.method_context(owner, method, instance) else {
                    continue;
                };
                out.union_with(&self.infer_binding(NodeRef::new(def.file, decl), ctx));
            }
            return out;
        }
        ValueSet::empty()
    }

    /// Activation of `method` with `instance` as receiver.
    ///
    /// `__init__` sees the arguments the instance was created with.
    fn method_context(&mut self, owner: ValueId, method: NodeRef, instance: ValueId) -> Option<ContextId> {
        let class_ctx = self.class_context(owner)?;
        let function = self.pool.value(Value::Function {
            def: method,
            context: class_ctx,
            bound: Some(instance),
        });
        let is_init = self
            .tree_of(method.file)
            .map_or(false, |tree| tree.declared_name(method.node) == Some("__init__"));
        let arguments = match self.pool.get(instance) {
            Value::Instance {
                payload: InstancePayload::Plain { arguments },
                ..
            } if is_init => *arguments,
            _ => self.pool.arguments(Arguments::Anonymous),
        };
        Some(self.pool.context(Context {
            kind: ContextKind::Function { function, arguments },
            scope: method,
            parent: Some(class_ctx),
        }))
    }

    fn compiled_member(&mut self, id: CompiledId, name: &str) -> ValueSet {
        if self.compiled.get(id).is_empty() {
            return self.unknown();
        }
        match self.compiled.member(id, name) {
            Some(member) => self.compiled_value(member),
            None => ValueSet::empty(),
        }
    }

    /// Value for a compiled object: constants become literals, attributes of
    /// a known builtin type become instances of it
    pub(crate) fn compiled_value(&mut self, id: CompiledId) -> ValueSet {
        if let Some(literal) = self.compiled.literal(id) {
            return self.literal(literal);
        }
        let object = self.compiled.get(id);
        if object.is_empty() {
            return self.unknown();
        }
        if let CompiledShape::Member(member) = &object.shape {
            if member.kind == MemberKind::Other {
                if let Some(type_name) = member.type_name.clone() {
                    if let Some(class) = self.builtin_class(&type_name) {
                        return ValueSet::single(self.plain_instance(class));
                    }
                }
            }
        }
        ValueSet::single(self.pool.value(Value::Compiled(id)))
    }

    /// Attribute names of `value`, for completion
    pub(crate) fn member_names(&mut self, value: ValueId) -> Vec<String> {
        let mut names = Vec::new();
        match self.receiver(value) {
            Receiver::Module(module) => names.extend(self.module_member_names(module)),
            Receiver::Class => {
                for class in self.linearize(value) {
                    names.extend(self.class_body_names(class, false));
                }
            }
            Receiver::Instance(class) => {
                for class in self.linearize(class) {
                    names.extend(self.class_body_names(class, true));
                }
            }
            Receiver::Builtin(class_name) => {
                if let Some(class) = self.builtin_class(class_name) {
                    for class in self.linearize(class) {
                        names.extend(self.class_body_names(class, true));
                    }
                }
            }
            Receiver::Compiled(id) => names.extend(self.compiled.names(id)),
            Receiver::Unknown => {}
        }
        names.sort();
        names.dedup();
        names
    }

    fn class_body_names(&self, class: ValueId, with_instance: bool) -> Vec<String> {
        let Some(def) = self.pool.get(class).definition() else {
            return Vec::new();
        };
        let Some(scope) = self.scopes_of(def.file) else {
            return Vec::new();
        };
        let Some(scope) = scope.scope(def.node) else {
            return Vec::new();
        };
        let mut names: Vec<String> = scope.names().map(str::to_string).collect();
        if with_instance {
            names.extend(scope.instance_attribute_names().map(str::to_string));
        }
        names
    }

    /// Names importers of `module` can access
    pub(crate) fn module_member_names(&mut self, module: ModuleId) -> Vec<String> {
        let record = self.modules.get(module).clone();
        let mut names = Vec::new();
        for file in record.files() {
            let (Some(tree), Some(index)) = (self.tree_of(file), self.scopes_of(file)) else {
                continue;
            };
            let scope = index.module();
            for name in scope.names() {
                let exported = scope.get(name).iter().any(|&decl| {
                    !tree.is_stub() || !matches!(tree.kind(decl), NodeKind::Alias { asname, .. } if asname.as_deref() != Some(name))
                });
                if exported {
                    names.push(name.to_string());
                }
            }
            for &import in scope.star_imports() {
                names.extend(self.star_import_names(NodeRef::new(file, import)));
            }
        }
        if let Some(compiled) = record.compiled {
            names.extend(self.compiled.names(compiled));
        }
        names
    }

    pub(crate) fn star_import_names(&mut self, import: NodeRef) -> Vec<String> {
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
            return Vec::new();
        }
        let names = match self.module_all(target) {
            Some(all) => all,
            None => self
                .module_member_names(target)
                .into_iter()
                .filter(|name| !name.starts_with('_'))
                .collect(),
        };
        self.star_guard.remove(&target);
        names
    }

    /// Declaring nodes behind `value.name`, for goto
    pub(crate) fn member_declarations(&mut self, value: ValueId, name: &str) -> Vec<NodeRef> {
        let class = match self.receiver(value) {
            Receiver::Module(module) => return self.module_declarations(module, name),
            Receiver::Class => value,
            Receiver::Instance(class) => class,
            Receiver::Builtin(class_name) => match self.builtin_class(class_name) {
                Some(class) => class,
                None => return Vec::new(),
            },
            Receiver::Compiled(_) | Receiver::Unknown => return Vec::new(),
        };

        let declared: Vec<NodeRef> = self
            .class_members(class, name)
            .into_iter()
            .filter_map(|member| match member {
                Member::Declared { decl, .. } => Some(decl),
                _ => None,
            })
            .collect();
        if !declared.is_empty() || matches!(self.receiver(value), Receiver::Class) {
            return declared;
        }

        for owner in self.linearize(class) {
            let Some(def) = self.pool.get(owner).definition() else {
                continue;
            };
            let Some(index) = self.scopes_of(def.file) else {
                continue;
            };
            if let Some(scope) = index.scope(def.node) {
                let decls = scope.instance_attribute(name);
                if !decls.is_empty() {
                    return decls.iter().map(|&d| NodeRef::new(def.file, d)).collect();
                }
            }
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse_module;

    #[test]
    fn test_method_kind_from_decorators() {
        let tree = parse_module(
            "class C:\n    @staticmethod\n    def s(): pass\n    @classmethod\n    def c(cls): pass\n    @property\n    def p(self): pass\n    def m(self): pass\n",
            None,
        )
        .unwrap();
        let kinds: Vec<MethodKind> = ["s", "c", "p", "m"]
            .iter()
            .map(|name| method_kind(&tree, tree.find_definitions(name)[0]))
            .collect();
        assert_eq!(
            kinds,
            vec![MethodKind::Static, MethodKind::Class, MethodKind::Property, MethodKind::Plain]
        );
    }
}
