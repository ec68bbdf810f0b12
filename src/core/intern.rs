//! Interning pool for values, contexts and argument lists
//!
//! Each analysis session owns one pool; identical structures map to the same
//! compact id, which is what makes identity-based deduplication and cache keys
//! cheap. Nothing is ever removed, so ids stay valid for the whole session.

use crate::core::context::{Arguments, Context};
use crate::core::value::{ArgsId, ContextId, LiteralValue, Value, ValueId};
use std::collections::HashMap;
use std::hash::Hash;

/// Bidirectional `T` ↔ index mapping
#[derive(Debug)]
pub struct Interner<T> {
    to_id: HashMap<T, u32>,
    items: Vec<T>,
}

impl<T: Hash + Eq + Clone> Interner<T> {
    pub fn new() -> Self {
        Self {
            to_id: HashMap::new(),
            items: Vec::new(),
        }
    }

    pub fn intern(&mut self, item: T) -> u32 {
        if let Some(&id) = self.to_id.get(&item) {
            return id;
        }
        let id = self.items.len() as u32;
        self.to_id.insert(item.clone(), id);
        self.items.push(item);
        id
    }

    pub fn get_id(&self, item: &T) -> Option<u32> {
        self.to_id.get(item).copied()
    }

    pub fn get(&self, id: u32) -> &T {
        &self.items[id as usize]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Hash + Eq + Clone> Default for Interner<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The session's value, context and argument tables
#[derive(Debug)]
pub struct ValuePool {
    values: Interner<Value>,
    contexts: Interner<Context>,
    arguments: Interner<Arguments>,
    unknown: ValueId,
}

impl ValuePool {
    pub fn new() -> Self {
        let mut values = Interner::new();
        let unknown = ValueId(values.intern(Value::Unknown));
        Self {
            values,
            contexts: Interner::new(),
            arguments: Interner::new(),
            unknown,
        }
    }

    pub fn value(&mut self, value: Value) -> ValueId {
        ValueId(self.values.intern(value))
    }

    pub fn literal(&mut self, literal: LiteralValue) -> ValueId {
        self.value(Value::Literal(literal))
    }

    pub fn unknown(&self) -> ValueId {
        self.unknown
    }

    pub fn get(&self, id: ValueId) -> &Value {
        self.values.get(id.0)
    }

    pub fn context(&mut self, context: Context) -> ContextId {
        ContextId(self.contexts.intern(context))
    }

    pub fn get_context(&self, id: ContextId) -> &Context {
        self.contexts.get(id.0)
    }

    pub fn arguments(&mut self, arguments: Arguments) -> ArgsId {
        ArgsId(self.arguments.intern(arguments))
    }

    pub fn get_arguments(&self, id: ArgsId) -> &Arguments {
        self.arguments.get(id.0)
    }

    /// Number of interned values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Default for ValuePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let mut pool = ValuePool::new();
        let a = pool.literal(LiteralValue::Int(1));
        let b = pool.literal(LiteralValue::Int(1));
        let c = pool.literal(LiteralValue::Str("1".into()));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.get(a), &Value::Literal(LiteralValue::Int(1)));
    }

    #[test]
    fn test_unknown_is_preinterned() {
        let mut pool = ValuePool::new();
        let unknown = pool.unknown();
        assert_eq!(pool.value(Value::Unknown), unknown);
        assert!(pool.get(unknown).is_unknown());
    }

    #[test]
    fn test_arguments_interning() {
        let mut pool = ValuePool::new();
        let a = pool.arguments(Arguments::Anonymous);
        let b = pool.arguments(Arguments::Anonymous);
        assert_eq!(a, b);
        assert_eq!(pool.get_arguments(a), &Arguments::Anonymous);
    }

    #[test]
    fn test_generic_interner() {
        let mut interner = Interner::new();
        assert_eq!(interner.intern("a"), 0);
        assert_eq!(interner.intern("b"), 1);
        assert_eq!(interner.intern("a"), 0);
        assert_eq!(interner.get_id(&"b"), Some(1));
        assert_eq!(*interner.get(1), "b");
        assert_eq!(interner.len(), 2);
    }
}
