//! Bundled stubs and builtin lookups
//!
//! `builtins`, `typing`, `typing_extensions` and `sys` ship with the engine
//! as stub sources. They are parsed lazily, the first time something imports
//! or looks up a builtin name.

use crate::analysis::Session;
use crate::ast::{FileId, NodeKind, SyntaxTree};
use crate::core::{LiteralValue, ModuleId, Value, ValueId, ValueSet};
use crate::frontend::parse_module;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

const BUILTINS: &str = include_str!("stubs/builtins.pyi");
const TYPING: &str = include_str!("stubs/typing.pyi");
const SYS: &str = include_str!("stubs/sys.pyi");

/// Directory prefix of bundled stub paths; never exists on disk
pub const BUNDLED_ROOT: &str = "<bundled>";

/// Stub source for a bundled module name
pub fn bundled_source(name: &str) -> Option<&'static str> {
    match name {
        "builtins" => Some(BUILTINS),
        "typing" | "typing_extensions" => Some(TYPING),
        "sys" => Some(SYS),
        _ => None,
    }
}

pub fn bundled_path(name: &str) -> PathBuf {
    PathBuf::from(BUNDLED_ROOT).join(format!("{name}.pyi"))
}

const BUNDLED_MODULES: &[&str] = &["builtins", "typing", "typing_extensions", "sys"];

/// Bundled stubs, parsed once per process and shared by every session
static BUNDLED_TREES: Lazy<HashMap<&'static str, Arc<SyntaxTree>>> = Lazy::new(|| {
    let mut trees = HashMap::new();
    for &name in BUNDLED_MODULES {
        let Some(source) = bundled_source(name) else {
            continue;
        };
        match parse_module(source, Some(&bundled_path(name))) {
            Ok(tree) => {
                trees.insert(name, Arc::new(tree));
            }
            Err(err) => warn!(module = name, error = %err, "bundled stub failed to parse"),
        }
    }
    trees
});

/// Parsed tree of a bundled stub
pub(crate) fn bundled_tree(name: &str) -> Option<Arc<SyntaxTree>> {
    BUNDLED_TREES.get(name).cloned()
}

/// Typing constructs the annotation evaluator interprets itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SpecialForm {
    Any,
    Union,
    Optional,
    Type,
    ClassVar,
    Final,
    Literal,
    Annotated,
    Callable,
    Generic,
    Protocol,
    NoReturn,
    SelfType,
    TypeAlias,
}

impl SpecialForm {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Any" => SpecialForm::Any,
            "Union" => SpecialForm::Union,
            "Optional" => SpecialForm::Optional,
            "Type" => SpecialForm::Type,
            "ClassVar" => SpecialForm::ClassVar,
            "Final" => SpecialForm::Final,
            "Literal" => SpecialForm::Literal,
            "Annotated" => SpecialForm::Annotated,
            "Callable" => SpecialForm::Callable,
            "Generic" => SpecialForm::Generic,
            "Protocol" => SpecialForm::Protocol,
            "NoReturn" | "Never" => SpecialForm::NoReturn,
            "Self" => SpecialForm::SelfType,
            "TypeAlias" => SpecialForm::TypeAlias,
            _ => return None,
        })
    }
}

/// Names every module defines implicitly
pub(crate) const MODULE_DUNDERS: &[&str] = &["__name__", "__file__", "__doc__", "__package__"];

impl Session {
    pub(crate) fn builtins_module(&mut self) -> Option<ModuleId> {
        self.resolve_module("builtins")
    }

    /// Class `name` from the builtins stub
    pub(crate) fn builtin_class(&mut self, name: &str) -> Option<ValueId> {
        if let Some(&class) = self.builtin_classes.get(name) {
            return class;
        }
        let class = self.builtins_module().and_then(|builtins| {
            let values = self.module_member(builtins, name);
            let found = values.iter().find(|&v| self.pool.get(v).is_class());
            found
        });
        self.builtin_classes.insert(name.to_string(), class);
        class
    }

    /// Instance of builtin class `name`, Unknown when the stub lacks it
    pub(crate) fn builtin_instance(&mut self, name: &str) -> ValueSet {
        match self.builtin_class(name) {
            Some(class) => ValueSet::single(self.plain_instance(class)),
            None => self.unknown(),
        }
    }

    /// Literals widen to instances of their class
    pub(crate) fn widen(&mut self, values: &ValueSet) -> ValueSet {
        values.flat_map(|v| match self.pool.get(v) {
            Value::Literal(LiteralValue::None) => ValueSet::single(v),
            Value::Literal(literal) => {
                let class = literal.class_name();
                self.builtin_instance(class)
            }
            _ => ValueSet::single(v),
        })
    }

    pub(crate) fn is_typing_file(&self, file: FileId) -> bool {
        self.modules
            .by_file(file)
            .map(|m| self.modules.get(m).name.as_str())
            .map_or(false, |name| name == "typing" || name == "typing_extensions")
    }

    pub(crate) fn is_builtins_file(&self, file: FileId) -> bool {
        self.modules
            .by_file(file)
            .map_or(false, |m| self.modules.get(m).name == "builtins")
    }

    /// The typing special form `value` stands for, if any
    pub(crate) fn special_form(&self, value: ValueId) -> Option<SpecialForm> {
        let Value::Class { def, .. } = self.pool.get(value) else {
            return None;
        };
        if !self.is_typing_file(def.file) {
            return None;
        }
        let tree = self.tree_of(def.file)?;
        match tree.kind(def.node) {
            NodeKind::ClassDef { name, .. } => SpecialForm::from_name(name),
            _ => None,
        }
    }

    /// Builtin class named `name`, checked by identity with the stub's class
    pub(crate) fn is_builtin_class(&mut self, value: ValueId, name: &str) -> bool {
        self.builtin_class(name) == Some(value)
    }

    /// Name of the class `value` was declared as
    pub(crate) fn class_name(&self, value: ValueId) -> Option<String> {
        let def = self.pool.get(value).definition()?;
        let tree = self.tree_of(def.file)?;
        tree.declared_name(def.node).map(str::to_string)
    }

    /// Values of the implicit module attributes
    pub(crate) fn module_dunder(&mut self, module: Option<ModuleId>, name: &str) -> ValueSet {
        match name {
            "__name__" => match module {
                Some(m) => {
                    let name = self.modules.get(m).name.clone();
                    self.literal(LiteralValue::Str(name))
                }
                None => self.literal(LiteralValue::Str("__main__".to_string())),
            },
            "__file__" | "__package__" => self.builtin_instance("str"),
            "__doc__" => {
                let none = self.literal(LiteralValue::None);
                self.builtin_instance("str").union(&none)
            }
            _ => ValueSet::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::Config;

    #[test]
    fn test_bundled_sources_parse() {
        for name in BUNDLED_MODULES {
            let tree = bundled_tree(name).unwrap_or_else(|| panic!("{name} stub failed to parse"));
            assert!(tree.is_stub());
        }
        assert!(bundled_source("os").is_none());
        assert!(bundled_tree("os").is_none());
    }

    #[test]
    fn test_builtin_classes_are_memoized() {
        let mut session = Session::new(Config::default());
        let int = session.builtin_class("int").unwrap();
        assert_eq!(session.builtin_class("int"), Some(int));
        assert!(session.builtin_class("no_such_class").is_none());
        assert_eq!(session.class_name(int).as_deref(), Some("int"));
    }

    #[test]
    fn test_special_forms_come_from_typing() {
        let mut session = Session::new(Config::default());
        let typing = session.resolve_module("typing").unwrap();
        let optional = session.module_member(typing, "Optional");
        let optional = optional.iter().next().unwrap();
        assert_eq!(session.special_form(optional), Some(SpecialForm::Optional));

        let int = session.builtin_class("int").unwrap();
        assert_eq!(session.special_form(int), None);
    }

    #[test]
    fn test_widen_keeps_none() {
        let mut session = Session::new(Config::default());
        let one = session.literal(LiteralValue::Int(1));
        let none = session.literal(LiteralValue::None);
        let widened = session.widen(&one.union(&none));
        assert_eq!(widened.len(), 2);
        assert!(widened.contains(none.iter().next().unwrap()));
    }
}
