//! Iteration, subscripts and container element types

use crate::analysis::Session;
use crate::ast::{NodeKind, NodeRef};
use crate::core::{Arguments, ContextId, InstancePayload, LiteralValue, Value, ValueId, ValueSet};

/// Builtin containers whose first type argument is the element type
const ELEMENT_CONTAINERS: &[&str] = &["list", "set", "frozenset", "generator", "dict", "reversed", "enumerate"];

/// Python-style index into a sequence of `len` items
fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let len = i64::try_from(len).ok()?;
    let index = if index < 0 { index + len } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

impl Session {
    /// Values produced by iterating over `values`
    pub(crate) fn iterate(&mut self, values: &ValueSet) -> ValueSet {
        values.flat_map(|v| self.iterate_value(v))
    }

    fn iterate_value(&mut self, value: ValueId) -> ValueSet {
        match self.pool.get(value).clone() {
            Value::Instance { class, payload } => match payload {
                InstancePayload::Sequence(elements) => elements.into_iter().collect(),
                InstancePayload::Mapping(pairs) => pairs.into_iter().map(|(key, _)| key).collect(),
                InstancePayload::Generator { execution } => self.yields_of(execution),
                InstancePayload::TypeArgs(args) => {
                    if self.is_builtin_class(class, "tuple") {
                        return args.into_iter().collect();
                    }
                    if self.is_element_container(class) {
                        return args.into_iter().next().unwrap_or_default();
                    }
                    self.iteration_protocol(value)
                }
                InstancePayload::Plain { .. } => self.iteration_protocol(value),
            },
            Value::Literal(LiteralValue::Str(_)) => self.builtin_instance("str"),
            Value::Literal(LiteralValue::Bytes(_)) => self.builtin_instance("int"),
            Value::Literal(_) => {
                let widened = self.widen(&ValueSet::single(value));
                widened.flat_map(|v| self.iteration_protocol(v))
            }
            Value::Compiled(_) | Value::Unknown => self.unknown(),
            Value::Class { .. } | Value::Function { .. } | Value::Module(_) => ValueSet::empty(),
        }
    }

    /// `next(iter(value))` through the class's dunder methods
    fn iteration_protocol(&mut self, value: ValueId) -> ValueSet {
        let anonymous = self.pool.arguments(Arguments::Anonymous);
        let iterator = self.call_method(&ValueSet::single(value), "__iter__", anonymous);
        if iterator.is_empty() {
            return ValueSet::empty();
        }
        self.call_method(&iterator, "__next__", anonymous)
    }

    fn is_element_container(&mut self, class: ValueId) -> bool {
        ELEMENT_CONTAINERS.iter().any(|name| self.is_builtin_class(class, name))
    }

    /// Values stored under the keys of a mapping
    pub(crate) fn mapping_values(&mut self, values: &ValueSet) -> ValueSet {
        values.flat_map(|v| match self.pool.get(v).clone() {
            Value::Instance {
                payload: InstancePayload::Mapping(pairs),
                ..
            } => pairs.into_iter().map(|(_, value)| value).collect(),
            Value::Instance {
                payload: InstancePayload::TypeArgs(args),
                ..
            } if args.len() >= 2 => args[1].clone(),
            Value::Instance { .. } => {
                let anonymous = self.pool.arguments(Arguments::Anonymous);
                let listed = self.call_method(&ValueSet::single(v), "values", anonymous);
                self.iterate(&listed)
            }
            Value::Compiled(_) | Value::Unknown => self.unknown(),
            _ => ValueSet::empty(),
        })
    }

    /// The `index`-th type argument carried by `values`.
    ///
    /// Displays and generators answer for their element types; plain
    /// instances fall back to iteration for the first argument.
    pub(crate) fn type_arg(&mut self, values: &ValueSet, index: usize) -> ValueSet {
        values.flat_map(|v| match self.pool.get(v).clone() {
            Value::Instance { class, payload } => match payload {
                InstancePayload::TypeArgs(args) => args.get(index).cloned().unwrap_or_default(),
                InstancePayload::Sequence(elements) if self.is_builtin_class(class, "tuple") => {
                    elements.get(index).cloned().unwrap_or_default()
                }
                InstancePayload::Sequence(elements) if index == 0 => elements.into_iter().collect(),
                InstancePayload::Mapping(pairs) => match index {
                    0 => pairs.into_iter().map(|(key, _)| key).collect(),
                    1 => pairs.into_iter().map(|(_, value)| value).collect(),
                    _ => ValueSet::empty(),
                },
                InstancePayload::Generator { execution } if index == 0 => self.yields_of(execution),
                InstancePayload::Plain { .. } if index == 0 => self.iterate_value(v),
                _ => ValueSet::empty(),
            },
            Value::Literal(_) if index == 0 => self.iterate_value(v),
            _ => ValueSet::empty(),
        })
    }

    /// `value[slice]`
    pub(crate) fn subscript(&mut self, value: NodeRef, slice: NodeRef, ctx: ContextId) -> ValueSet {
        let base = self.eval(value, ctx);
        let Some(tree) = self.tree_of(slice.file) else {
            return ValueSet::empty();
        };
        if matches!(tree.kind(slice.node), NodeKind::Slice { .. }) {
            return base.flat_map(|v| self.slice_of(v));
        }
        let index = self.eval(slice, ctx);
        base.flat_map(|v| self.index_value(v, &index))
    }

    /// `value[a:b]` keeps the container, losing positions
    fn slice_of(&mut self, value: ValueId) -> ValueSet {
        match self.pool.get(value).clone() {
            Value::Instance {
                class,
                payload: InstancePayload::Sequence(elements),
            } => {
                let element: ValueSet = elements.into_iter().collect();
                ValueSet::single(self.pool.value(Value::Instance {
                    class,
                    payload: InstancePayload::TypeArgs(vec![element]),
                }))
            }
            Value::Instance { .. } => ValueSet::single(value),
            Value::Literal(_) => self.widen(&ValueSet::single(value)),
            Value::Compiled(_) | Value::Unknown => self.unknown(),
            _ => ValueSet::empty(),
        }
    }

    fn index_value(&mut self, value: ValueId, index: &ValueSet) -> ValueSet {
        let literal_index = self.literal_int(index);
        match self.pool.get(value).clone() {
            // `list[int]` and `Optional[X]` in expression position
            Value::Class { .. } => ValueSet::single(value),
            Value::Instance { class, payload } => match payload {
                InstancePayload::Sequence(elements) => {
                    match literal_index.and_then(|i| normalize_index(i, elements.len())) {
                        Some(i) => elements[i].clone(),
                        None => elements.into_iter().collect(),
                    }
                }
                InstancePayload::Mapping(pairs) => {
                    let selected: ValueSet = pairs
                        .iter()
                        .filter(|(key, _)| index.iter().any(|i| key.contains(i)))
                        .map(|(_, value)| value.clone())
                        .collect();
                    if selected.is_empty() {
                        pairs.into_iter().map(|(_, value)| value).collect()
                    } else {
                        selected
                    }
                }
                InstancePayload::TypeArgs(args) if self.is_builtin_class(class, "dict") => {
                    args.get(1).cloned().unwrap_or_default()
                }
                InstancePayload::TypeArgs(args) if self.is_builtin_class(class, "tuple") => {
                    if args.len() == 1 {
                        return args[0].clone();
                    }
                    match literal_index.and_then(|i| normalize_index(i, args.len())) {
                        Some(i) => args[i].clone(),
                        None => args.into_iter().collect(),
                    }
                }
                InstancePayload::TypeArgs(args) if self.is_element_container(class) => {
                    args.into_iter().next().unwrap_or_default()
                }
                _ => self.getitem(value, index),
            },
            Value::Literal(LiteralValue::Str(text)) => {
                let chars: Vec<char> = text.chars().collect();
                match literal_index.and_then(|i| normalize_index(i, chars.len())) {
                    Some(i) => self.literal(LiteralValue::Str(chars[i].to_string())),
                    None => self.builtin_instance("str"),
                }
            }
            Value::Literal(LiteralValue::Bytes(bytes)) => {
                match literal_index.and_then(|i| normalize_index(i, bytes.len())) {
                    Some(i) => self.literal(LiteralValue::Int(i64::from(bytes[i]))),
                    None => self.builtin_instance("int"),
                }
            }
            Value::Literal(_) => {
                let widened = self.widen(&ValueSet::single(value));
                widened.flat_map(|v| self.getitem(v, index))
            }
            Value::Compiled(_) | Value::Unknown => self.unknown(),
            Value::Function { .. } | Value::Module(_) => ValueSet::empty(),
        }
    }

    fn getitem(&mut self, value: ValueId, index: &ValueSet) -> ValueSet {
        let arguments = self.pool.arguments(Arguments::positional(vec![index.clone()]));
        self.call_method(&ValueSet::single(value), "__getitem__", arguments)
    }

    /// The single integer an index set stands for, if it is exactly one literal
    fn literal_int(&self, index: &ValueSet) -> Option<i64> {
        if index.len() != 1 {
            return None;
        }
        let id = index.iter().next()?;
        self.pool.get(id).literal()?.as_int()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_index() {
        assert_eq!(normalize_index(0, 3), Some(0));
        assert_eq!(normalize_index(-1, 3), Some(2));
        assert_eq!(normalize_index(3, 3), None);
        assert_eq!(normalize_index(-4, 3), None);
        assert_eq!(normalize_index(0, 0), None);
    }
}
