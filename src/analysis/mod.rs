//! Lazy value inference
//!
//! Scopes and filters decide which declarations a name can mean; the
//! session evaluates expressions into value sets on demand, memoizing each
//! `(node, context)` result and breaking cycles through the evaluation cache.

pub mod api;
pub mod builtins;
pub mod engine;
pub mod filter;
pub mod scope;

mod annotations;
mod calls;
mod members;
mod names;
mod operators;
mod sequences;

pub use api::{Completion, DeclarationSite, ParamInfo, Reference, Signature, ValueDescriptor, ValueKind};
pub use engine::{CancelToken, Session, SharedSession};
pub use filter::{Filter, FilterChain};
pub use scope::{Scope, ScopeIndex, ScopeKind};
