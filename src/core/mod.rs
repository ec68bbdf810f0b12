//! Core value model: values, value sets, contexts and the interning pool

pub mod context;
pub mod intern;
pub mod value;
pub mod value_set;

pub use context::{Arguments, Context, ContextKind};
pub use intern::{Interner, ValuePool};
pub use value::{
    ArgsId, CompiledId, ContextId, InstancePayload, LiteralValue, ModuleId, Value, ValueId,
};
pub use value_set::ValueSet;
