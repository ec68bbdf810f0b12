//! Annotation evaluation
//!
//! An annotation names a type; evaluating it produces the values an object
//! of that type would be. Classes become instances, typing special forms
//! get their meaning here, and type variables are substituted from the map
//! the caller collected at the call site.

use crate::analysis::builtins::SpecialForm;
use crate::analysis::calls::{subscript_elements, TypeVarMap};
use crate::analysis::Session;
use crate::ast::{BinaryOp, Constant, NodeId, NodeKind, NodeRef};
use crate::compiled::CompiledCall;
use crate::core::{ContextId, ContextKind, InstancePayload, LiteralValue, Value, ValueId, ValueSet};

impl Session {
    /// Values described by annotation `annotation` evaluated in `ctx`
    pub(crate) fn annotation_values(&mut self, annotation: NodeRef, ctx: ContextId) -> ValueSet {
        self.annotation_with(annotation, ctx, &TypeVarMap::new())
    }

    /// Like [`annotation_values`](Self::annotation_values), substituting `vars`
    pub(crate) fn annotation_with(&mut self, annotation: NodeRef, ctx: ContextId, vars: &TypeVarMap) -> ValueSet {
        let Some(tree) = self.tree_of(annotation.file) else {
            return ValueSet::empty();
        };
        let at = |id: NodeId| NodeRef::new(annotation.file, id);

        match tree.kind(annotation.node) {
            NodeKind::Constant(Constant::Str(text)) => self.forward_reference(annotation, text, ctx),
            NodeKind::Constant(Constant::None) => self.literal(LiteralValue::None),
            NodeKind::Constant(_) => ValueSet::empty(),
            NodeKind::Name { id, .. } => {
                if let Some(values) = vars.get(id) {
                    return values.clone();
                }
                if self.is_type_var(annotation) {
                    return ValueSet::empty();
                }
                let values = self.eval_at(annotation, ctx);
                self.described_by(&values, ctx)
            }
            NodeKind::Attribute { .. } => {
                let values = self.eval_at(annotation, ctx);
                self.described_by(&values, ctx)
            }
            NodeKind::BinOp {
                left,
                op: BinaryOp::BitOr,
                right,
            } => {
                let left = self.annotation_with(at(*left), ctx, vars);
                left.union(&self.annotation_with(at(*right), ctx, vars))
            }
            NodeKind::Subscript { value, slice, .. } => {
                let base = self.eval_at(at(*value), ctx);
                let args: Vec<NodeRef> = subscript_elements(&tree, *slice).into_iter().map(at).collect();
                base.flat_map(|class| self.generic_annotation(class, &args, ctx, vars))
            }
            _ => ValueSet::empty(),
        }
    }

    /// `Base[args]` for one value of the subscripted base
    fn generic_annotation(&mut self, base: ValueId, args: &[NodeRef], ctx: ContextId, vars: &TypeVarMap) -> ValueSet {
        let first = args.first().copied();
        match self.special_form(base) {
            Some(SpecialForm::Optional) => {
                let inner = match first {
                    Some(arg) => self.annotation_with(arg, ctx, vars),
                    None => ValueSet::empty(),
                };
                inner.union(&self.literal(LiteralValue::None))
            }
            Some(SpecialForm::Union) => args
                .iter()
                .map(|&arg| self.annotation_with(arg, ctx, vars))
                .collect(),
            Some(SpecialForm::Type) => match first {
                Some(arg) => {
                    let instances = self.annotation_with(arg, ctx, vars);
                    self.classes_of(&instances)
                }
                None => self.unknown(),
            },
            Some(SpecialForm::ClassVar | SpecialForm::Final | SpecialForm::Annotated) => match first {
                Some(arg) => self.annotation_with(arg, ctx, vars),
                None => self.unknown(),
            },
            Some(SpecialForm::Literal) => args.iter().map(|&arg| self.eval_at(arg, ctx)).collect(),
            Some(SpecialForm::NoReturn) => ValueSet::empty(),
            Some(_) => self.unknown(),
            None => match self.pool.get(base) {
                Value::Class { .. } => {
                    let mut type_args = Vec::with_capacity(args.len());
                    for &arg in args {
                        if self.is_ellipsis(arg) {
                            continue;
                        }
                        type_args.push(self.annotation_with(arg, ctx, vars));
                    }
                    ValueSet::single(self.pool.value(Value::Instance {
                        class: base,
                        payload: InstancePayload::TypeArgs(type_args),
                    }))
                }
                Value::Compiled(_) | Value::Unknown => self.unknown(),
                _ => ValueSet::empty(),
            },
        }
    }

    /// What evaluated annotation expressions stand for as a type
    fn described_by(&mut self, values: &ValueSet, ctx: ContextId) -> ValueSet {
        values.flat_map(|v| match self.pool.get(v).clone() {
            Value::Class { .. } => match self.special_form(v) {
                None => ValueSet::single(self.plain_instance(v)),
                Some(SpecialForm::NoReturn) => ValueSet::empty(),
                Some(SpecialForm::SelfType) => self.self_type(ctx),
                Some(_) => self.unknown(),
            },
            Value::Literal(LiteralValue::None) => ValueSet::single(v),
            Value::Compiled(id) => match self.compiled.call(id) {
                CompiledCall::Instance(instance) => ValueSet::single(self.pool.value(Value::Compiled(instance))),
                _ => self.unknown(),
            },
            Value::Unknown => self.unknown(),
            // Type variables declared with `TypeVar(...)` and other instances
            Value::Instance { class, .. } if self.class_name(class).as_deref() == Some("TypeVar") => ValueSet::empty(),
            Value::Instance { .. } => self.unknown(),
            Value::Function { .. } | Value::Module(_) | Value::Literal(_) => ValueSet::empty(),
        })
    }

    /// `Self` inside a class: the receiver of the running method when known
    fn self_type(&mut self, ctx: ContextId) -> ValueSet {
        let mut current = Some(ctx);
        while let Some(id) = current {
            let context = self.pool.get_context(id).clone();
            match context.kind {
                ContextKind::Function { function, .. } => {
                    if let Value::Function { bound: Some(receiver), .. } = *self.pool.get(function) {
                        if matches!(self.pool.get(receiver), Value::Instance { .. }) {
                            return ValueSet::single(receiver);
                        }
                    }
                }
                ContextKind::Class { class } => return ValueSet::single(self.plain_instance(class)),
                _ => {}
            }
            current = context.parent;
        }
        self.unknown()
    }

    /// Classes of the instances in `values`, for `Type[X]`
    fn classes_of(&mut self, values: &ValueSet) -> ValueSet {
        values.flat_map(|v| match self.pool.get(v).clone() {
            Value::Instance { class, .. } => ValueSet::single(class),
            Value::Literal(literal) => {
                let name = literal.class_name();
                self.builtin_class(name).map(ValueSet::single).unwrap_or_default()
            }
            Value::Unknown | Value::Compiled(_) => self.unknown(),
            _ => ValueSet::empty(),
        })
    }

    /// A string annotation naming a dotted path, like `"pkg.mod.Class"`
    fn forward_reference(&mut self, annotation: NodeRef, text: &str, ctx: ContextId) -> ValueSet {
        let text = text.trim();
        let mut parts = text.split('.');
        let Some(head) = parts.next() else {
            return ValueSet::empty();
        };
        let is_dotted_name = text
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c == '_' || c.is_alphanumeric()));
        if !is_dotted_name {
            return self.unknown();
        }
        if head == "None" {
            return self.literal(LiteralValue::None);
        }
        let mut values = self.infer_name(annotation, head, ctx);
        for part in parts {
            values = self.member_of_set(&values, part);
        }
        self.described_by(&values, ctx)
    }

    fn is_ellipsis(&self, node: NodeRef) -> bool {
        self.tree_of(node.file)
            .map_or(false, |tree| matches!(tree.kind(node.node), NodeKind::Constant(Constant::Ellipsis)))
    }
}
