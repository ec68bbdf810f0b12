//! Native bridge: structural signatures for modules without source

pub mod bridge;
pub mod object;
pub mod subprocess;

pub use bridge::{
    BridgeError, ConstantRepr, MemberKind, MemberSignature, ModuleSignature, NativeBridge, StaticBridge,
};
pub use object::{CompiledCall, CompiledObject, CompiledPool, CompiledShape};
pub use subprocess::SubprocessBridge;
