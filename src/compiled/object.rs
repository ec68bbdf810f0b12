//! Session pool of compiled objects
//!
//! A compiled object is a node in the signature tree reported by the native
//! bridge: a module, one of its members, or an instance of a compiled class.
//! An `Empty` object stands for a module whose introspection failed; every
//! attribute of it is Unknown.

use crate::compiled::bridge::{ConstantRepr, MemberKind, MemberSignature, ModuleSignature};
use crate::core::{CompiledId, LiteralValue};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub enum CompiledShape {
    Module(Arc<ModuleSignature>),
    Member(MemberSignature),
    Instance { class: CompiledId },
    Empty,
}

#[derive(Debug, Clone)]
pub struct CompiledObject {
    /// Dotted name of the owning module
    pub module: String,
    /// Dotted path below the module, empty for the module itself
    pub qualname: String,
    pub shape: CompiledShape,
}

impl CompiledObject {
    pub fn name(&self) -> &str {
        match self.qualname.rsplit('.').next() {
            Some(last) if !last.is_empty() => last,
            _ => self.module.rsplit('.').next().unwrap_or(&self.module),
        }
    }

    pub fn kind(&self) -> MemberKind {
        match &self.shape {
            CompiledShape::Module(_) | CompiledShape::Empty => MemberKind::Module,
            CompiledShape::Member(member) => member.kind,
            CompiledShape::Instance { .. } => MemberKind::Other,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.shape, CompiledShape::Empty)
    }

    /// Parameter names, for callables
    pub fn params(&self) -> Option<&[String]> {
        match &self.shape {
            CompiledShape::Member(member) if member.arity.is_some() || !member.params.is_empty() => {
                Some(&member.params)
            }
            _ => None,
        }
    }
}

/// Result of calling a compiled object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompiledCall {
    Instance(CompiledId),
    /// Callable, but the result cannot be described
    Unknown,
    NotCallable,
}

#[derive(Debug, Default)]
pub struct CompiledPool {
    objects: Vec<CompiledObject>,
    index: HashMap<(String, String, u8), CompiledId>,
}

impl CompiledPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn intern(&mut self, object: CompiledObject, tag: u8) -> CompiledId {
        let key = (object.module.clone(), object.qualname.clone(), tag);
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = CompiledId(self.objects.len() as u32);
        self.objects.push(object);
        self.index.insert(key, id);
        id
    }

    pub fn module(&mut self, signature: Arc<ModuleSignature>) -> CompiledId {
        let module = signature.name.clone();
        self.intern(
            CompiledObject {
                module,
                qualname: String::new(),
                shape: CompiledShape::Module(signature),
            },
            0,
        )
    }

    /// Placeholder for a module whose introspection failed
    pub fn empty(&mut self, module: &str) -> CompiledId {
        self.intern(
            CompiledObject {
                module: module.to_string(),
                qualname: String::new(),
                shape: CompiledShape::Empty,
            },
            1,
        )
    }

    pub fn get(&self, id: CompiledId) -> &CompiledObject {
        &self.objects[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn child(&mut self, parent: CompiledId, member: MemberSignature) -> CompiledId {
        let owner = self.get(parent);
        let qualname = if owner.qualname.is_empty() {
            member.name.clone()
        } else {
            format!("{}.{}", owner.qualname, member.name)
        };
        let module = owner.module.clone();
        self.intern(
            CompiledObject {
                module,
                qualname,
                shape: CompiledShape::Member(member),
            },
            2,
        )
    }

    /// Attribute `name` of `id`; `None` when the signature says it does not exist
    pub fn member(&mut self, id: CompiledId, name: &str) -> Option<CompiledId> {
        let found = match &self.get(id).shape {
            CompiledShape::Module(signature) => signature.member(name).cloned(),
            CompiledShape::Member(member) => member.member(name).cloned(),
            CompiledShape::Instance { class } => {
                let class = *class;
                return self.member(class, name);
            }
            CompiledShape::Empty => None,
        }?;
        Some(self.child(id, found))
    }

    pub fn call(&mut self, id: CompiledId) -> CompiledCall {
        let object = self.get(id);
        match &object.shape {
            CompiledShape::Member(member) => match member.kind {
                MemberKind::Class => {
                    let instance = CompiledObject {
                        module: object.module.clone(),
                        qualname: object.qualname.clone(),
                        shape: CompiledShape::Instance { class: id },
                    };
                    CompiledCall::Instance(self.intern(instance, 3))
                }
                MemberKind::Function | MemberKind::Other => CompiledCall::Unknown,
                MemberKind::Module | MemberKind::Constant => CompiledCall::NotCallable,
            },
            CompiledShape::Empty => CompiledCall::Unknown,
            CompiledShape::Module(_) | CompiledShape::Instance { .. } => CompiledCall::NotCallable,
        }
    }

    /// Member names, sorted
    pub fn names(&self, id: CompiledId) -> Vec<String> {
        let mut names: Vec<String> = match &self.get(id).shape {
            CompiledShape::Module(signature) => signature.members.iter().map(|m| m.name.clone()).collect(),
            CompiledShape::Member(member) => member.members.iter().map(|m| m.name.clone()).collect(),
            CompiledShape::Instance { class } => return self.names(*class),
            CompiledShape::Empty => Vec::new(),
        };
        names.sort();
        names.dedup();
        names
    }

    /// Literal for a constant member, when one was reported
    pub fn literal(&self, id: CompiledId) -> Option<LiteralValue> {
        let CompiledShape::Member(member) = &self.get(id).shape else {
            return None;
        };
        Some(match member.constant.as_ref()? {
            ConstantRepr::None => LiteralValue::None,
            ConstantRepr::Bool(b) => LiteralValue::Bool(*b),
            ConstantRepr::Int(i) => LiteralValue::Int(*i),
            ConstantRepr::Float(f) => LiteralValue::float(*f),
            ConstantRepr::Str(s) => LiteralValue::Str(s.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature() -> Arc<ModuleSignature> {
        Arc::new(ModuleSignature::new(
            "_native",
            vec![
                MemberSignature::constant("LIMIT", ConstantRepr::Int(10)),
                MemberSignature::function("run", &["x"]),
                MemberSignature::class("Engine", vec![MemberSignature::function("start", &["self"])]),
            ],
        ))
    }

    #[test]
    fn test_member_lookup_is_interned() {
        let mut pool = CompiledPool::new();
        let module = pool.module(signature());
        let a = pool.member(module, "run").unwrap();
        let b = pool.member(module, "run").unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.get(a).name(), "run");
        assert!(pool.member(module, "missing").is_none());
    }

    #[test]
    fn test_constant_literal() {
        let mut pool = CompiledPool::new();
        let module = pool.module(signature());
        let limit = pool.member(module, "LIMIT").unwrap();
        assert_eq!(pool.literal(limit), Some(LiteralValue::Int(10)));
        assert_eq!(pool.call(limit), CompiledCall::NotCallable);
    }

    #[test]
    fn test_class_call_yields_instance_with_members() {
        let mut pool = CompiledPool::new();
        let module = pool.module(signature());
        let class = pool.member(module, "Engine").unwrap();
        let CompiledCall::Instance(instance) = pool.call(class) else {
            panic!("expected instance");
        };
        let start = pool.member(instance, "start").unwrap();
        assert_eq!(pool.get(start).qualname, "Engine.start");
        assert_eq!(pool.names(instance), vec!["start".to_string()]);
    }

    #[test]
    fn test_empty_module() {
        let mut pool = CompiledPool::new();
        let empty = pool.empty("broken");
        assert!(pool.get(empty).is_empty());
        assert!(pool.member(empty, "anything").is_none());
        assert_eq!(pool.call(empty), CompiledCall::Unknown);
        assert_eq!(pool.get(empty).name(), "broken");
    }
}
