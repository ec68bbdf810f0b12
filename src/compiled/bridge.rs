//! Native bridge port
//!
//! The engine asks a bridge for the structural signature of a module that has
//! no inspectable source. Implementations may run a real interpreter
//! ([`SubprocessBridge`](crate::compiled::SubprocessBridge)) or serve canned
//! signatures ([`StaticBridge`]).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("native runtime unavailable: {0}")]
    Unavailable(String),

    #[error("failed to start {}: {source}", executable.display())]
    Spawn {
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("introspection timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("native runtime crashed: {0}")]
    Crashed(String),

    #[error("malformed bridge response: {0}")]
    Protocol(String),

    #[error("introspection failed: {0}")]
    Remote(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Module,
    Class,
    Function,
    Constant,
    Other,
}

/// Constant value reported for a member, when cheap to obtain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum ConstantRepr {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSignature {
    pub name: String,
    pub kind: MemberKind,
    /// Number of required positional parameters, when the signature is known
    #[serde(default)]
    pub arity: Option<u32>,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub constant: Option<ConstantRepr>,
    /// Name of the runtime type for `other` members
    #[serde(default)]
    pub type_name: Option<String>,
    /// Class members, one level deep
    #[serde(default)]
    pub members: Vec<MemberSignature>,
}

impl MemberSignature {
    pub fn new(name: impl Into<String>, kind: MemberKind) -> Self {
        Self {
            name: name.into(),
            kind,
            arity: None,
            params: Vec::new(),
            constant: None,
            type_name: None,
            members: Vec::new(),
        }
    }

    pub fn function(name: impl Into<String>, params: &[&str]) -> Self {
        Self {
            arity: Some(params.len() as u32),
            params: params.iter().map(|p| p.to_string()).collect(),
            ..Self::new(name, MemberKind::Function)
        }
    }

    pub fn constant(name: impl Into<String>, value: ConstantRepr) -> Self {
        Self {
            constant: Some(value),
            ..Self::new(name, MemberKind::Constant)
        }
    }

    pub fn class(name: impl Into<String>, members: Vec<MemberSignature>) -> Self {
        Self {
            members,
            ..Self::new(name, MemberKind::Class)
        }
    }

    pub fn member(&self, name: &str) -> Option<&MemberSignature> {
        self.members.iter().find(|m| m.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleSignature {
    pub name: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub members: Vec<MemberSignature>,
}

impl ModuleSignature {
    pub fn new(name: impl Into<String>, members: Vec<MemberSignature>) -> Self {
        Self {
            name: name.into(),
            file: None,
            members,
        }
    }

    pub fn member(&self, name: &str) -> Option<&MemberSignature> {
        self.members.iter().find(|m| m.name == name)
    }
}

/// Capability to introspect modules that have no source
pub trait NativeBridge: Send + Sync {
    /// Structural signature of module `name`; `paths` are extra import roots
    fn introspect_module(&self, name: &str, paths: &[PathBuf]) -> Result<Arc<ModuleSignature>, BridgeError>;

    /// Label used in diagnostics
    fn describe(&self) -> String;
}

/// Bridge serving a fixed set of signatures
#[derive(Debug, Default)]
pub struct StaticBridge {
    modules: HashMap<String, Arc<ModuleSignature>>,
    calls: AtomicUsize,
}

impl StaticBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, signature: ModuleSignature) -> Self {
        self.modules.insert(signature.name.clone(), Arc::new(signature));
        self
    }

    /// Number of introspection requests served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl NativeBridge for StaticBridge {
    fn introspect_module(&self, name: &str, _paths: &[PathBuf]) -> Result<Arc<ModuleSignature>, BridgeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.modules
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::Remote(format!("ModuleNotFoundError: No module named '{name}'")))
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_json_shape() {
        let json = r#"{
            "name": "_speedups",
            "members": [
                {"name": "VERSION", "kind": "constant", "constant": {"type": "int", "value": 3}},
                {"name": "NOTHING", "kind": "constant", "constant": {"type": "none"}},
                {"name": "encode", "kind": "function", "arity": 1, "params": ["data"]},
                {"name": "Codec", "kind": "class", "members": [
                    {"name": "reset", "kind": "function", "arity": 1, "params": ["self"]}
                ]}
            ]
        }"#;
        let sig: ModuleSignature = serde_json::from_str(json).unwrap();
        assert_eq!(sig.member("VERSION").unwrap().constant, Some(ConstantRepr::Int(3)));
        assert_eq!(sig.member("NOTHING").unwrap().constant, Some(ConstantRepr::None));
        assert_eq!(sig.member("encode").unwrap().arity, Some(1));
        assert!(sig.member("Codec").unwrap().member("reset").is_some());
        assert!(sig.file.is_none());
    }

    #[test]
    fn test_static_bridge() {
        let bridge = StaticBridge::new().with_module(ModuleSignature::new(
            "_native",
            vec![MemberSignature::function("run", &["x"])],
        ));
        let sig = bridge.introspect_module("_native", &[]).unwrap();
        assert_eq!(sig.members.len(), 1);
        let err = bridge.introspect_module("missing", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::Remote(_)));
        assert_eq!(bridge.calls(), 2);
    }
}
