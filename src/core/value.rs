//! Value model
//!
//! A `Value` is one candidate for what an expression denotes. Values are
//! interned in the session pool and referred to by [`ValueId`]; nothing here
//! owns another value directly, only through [`ValueSet`]s of ids.

use crate::ast::{Constant, NodeRef};
use crate::core::value_set::ValueSet;
use std::fmt;

/// Interned [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

/// Interned [`Context`](crate::core::context::Context)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(pub u32);

/// Interned [`Arguments`](crate::core::context::Arguments)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgsId(pub u32);

/// Index into the session's module registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub u32);

/// Index into the session's compiled object pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompiledId(pub u32);

/// A concrete constant.
///
/// Floats are stored as raw bits so literals compare structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LiteralValue {
    None,
    Bool(bool),
    Int(i64),
    Float(u64),
    Complex,
    Str(String),
    Bytes(Vec<u8>),
    Ellipsis,
}

impl LiteralValue {
    pub fn float(value: f64) -> Self {
        LiteralValue::Float(value.to_bits())
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            LiteralValue::Float(bits) => Some(f64::from_bits(*bits)),
            LiteralValue::Int(i) => Some(*i as f64),
            LiteralValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            LiteralValue::Int(i) => Some(*i),
            LiteralValue::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Builtin class the literal is an instance of
    pub fn class_name(&self) -> &'static str {
        match self {
            LiteralValue::None => "NoneType",
            LiteralValue::Bool(_) => "bool",
            LiteralValue::Int(_) => "int",
            LiteralValue::Float(_) => "float",
            LiteralValue::Complex => "complex",
            LiteralValue::Str(_) => "str",
            LiteralValue::Bytes(_) => "bytes",
            LiteralValue::Ellipsis => "ellipsis",
        }
    }

    /// Literal for a constant, when it has a scalar literal form.
    ///
    /// Oversized ints and tuples have none; callers model those as instances.
    pub fn from_constant(constant: &Constant) -> Option<Self> {
        Some(match constant {
            Constant::None => LiteralValue::None,
            Constant::Bool(b) => LiteralValue::Bool(*b),
            Constant::Int(Some(i)) => LiteralValue::Int(*i),
            Constant::Int(None) | Constant::Tuple(_) => return None,
            Constant::Float(f) => LiteralValue::float(*f),
            Constant::Complex => LiteralValue::Complex,
            Constant::Str(s) => LiteralValue::Str(s.clone()),
            Constant::Bytes(b) => LiteralValue::Bytes(b.clone()),
            Constant::Ellipsis => LiteralValue::Ellipsis,
        })
    }
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::None => write!(f, "None"),
            LiteralValue::Bool(true) => write!(f, "True"),
            LiteralValue::Bool(false) => write!(f, "False"),
            LiteralValue::Int(i) => write!(f, "{i}"),
            LiteralValue::Float(bits) => write!(f, "{:?}", f64::from_bits(*bits)),
            LiteralValue::Complex => write!(f, "complex"),
            LiteralValue::Str(s) => write!(f, "{s:?}"),
            LiteralValue::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            LiteralValue::Ellipsis => write!(f, "Ellipsis"),
        }
    }
}

/// Extra state carried by an instance beyond its class
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InstancePayload {
    /// Created by calling the class; the arguments feed `__init__`
    Plain { arguments: ArgsId },
    /// List, tuple or set display with per-position element sets
    Sequence(Vec<ValueSet>),
    /// Dict display as key/value pairs
    Mapping(Vec<(ValueSet, ValueSet)>),
    /// Instance described by a generic annotation such as `List[int]`
    TypeArgs(Vec<ValueSet>),
    /// Generator produced by executing a function containing `yield`
    Generator { execution: ContextId },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Module(ModuleId),
    /// Class statement evaluated in `context`
    Class { def: NodeRef, context: ContextId },
    /// `def` or `lambda` evaluated in `context`, optionally bound to a receiver
    Function {
        def: NodeRef,
        context: ContextId,
        bound: Option<ValueId>,
    },
    Instance { class: ValueId, payload: InstancePayload },
    Literal(LiteralValue),
    Compiled(CompiledId),
    /// Something exists but its shape could not be determined
    Unknown,
}

impl Value {
    pub fn is_class(&self) -> bool {
        matches!(self, Value::Class { .. })
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Value::Function { .. })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    /// Node this value was declared by, when it has one
    pub fn definition(&self) -> Option<NodeRef> {
        match self {
            Value::Class { def, .. } | Value::Function { def, .. } => Some(*def),
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<&LiteralValue> {
        match self {
            Value::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            Value::Module(_) => "module",
            Value::Class { .. } => "class",
            Value::Function { .. } => "function",
            Value::Instance { .. } | Value::Literal(_) => "instance",
            Value::Compiled(_) => "compiled",
            Value::Unknown => "unknown",
        }
    }
}
