//! Query surface
//!
//! Everything an editor asks for goes through one of the `Session` methods
//! below. Values leave the engine as [`ValueDescriptor`]s; internal ids are
//! never exposed. Each query runs under [`Session::run_query`], which resets
//! the execution budget and turns a cancellation into `InferError::Cancelled`.

use crate::analysis::builtins::MODULE_DUNDERS;
use crate::analysis::filter::FilterChain;
use crate::analysis::members::MethodKind;
use crate::analysis::scope::enclosing_scope;
use crate::analysis::Session;
use crate::ast::{FileId, NodeId, NodeKind, NodeRef, ParamKind, SyntaxTree};
use crate::core::{ModuleId, Value, ValueId, ValueSet};
use crate::errors::{InferError, Result, SourceLocation};
use crate::frontend::UnknownPolicy;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, instrument};

/// Alias chains longer than this are not followed by goto
const MAX_ALIAS_HOPS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Module,
    Class,
    Function,
    Instance,
    Literal,
    Compiled,
    Unknown,
}

/// Where a value or name was declared
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeclarationSite {
    pub file: FileId,
    pub path: Option<PathBuf>,
    pub name: Option<String>,
    pub location: SourceLocation,
}

/// One inferred value as seen by a client
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ValueDescriptor {
    pub kind: ValueKind,
    /// Class name for instances, declared name otherwise
    pub name: String,
    pub declaration: Option<DeclarationSite>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub name: String,
    pub values: Vec<ValueDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamInfo {
    pub name: String,
    /// `None` for compiled callables, whose parameter kinds are not reported
    pub kind: Option<ParamKind>,
    pub has_default: bool,
    /// Annotation source text
    pub annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    pub name: String,
    pub params: Vec<ParamInfo>,
    pub declaration: Option<DeclarationSite>,
}

/// A name or attribute node resolving to the queried declarations
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reference {
    pub file: FileId,
    pub node: u32,
    pub location: SourceLocation,
}

impl Session {
    /// Inferred values of expression `node`
    #[instrument(skip(self))]
    pub fn infer(&mut self, file: FileId, node: NodeId) -> Result<Vec<ValueDescriptor>> {
        let values = self.infer_value_set(file, node)?;
        Ok(self.describe(&values))
    }

    /// Inferred value set of expression `node`, with the unknown policy applied
    pub fn infer_value_set(&mut self, file: FileId, node: NodeId) -> Result<ValueSet> {
        self.run_query("infer", |s| {
            s.checked_node(file, node)?;
            let node = NodeRef::new(file, node);
            let ctx = s.query_context(node);
            let values = s.eval(node, ctx);
            Ok(s.apply_unknown_policy(values))
        })
    }

    /// Values of every declaration visible at the name reference `node`
    #[instrument(skip(self))]
    pub fn resolve_name(&mut self, file: FileId, node: NodeId) -> Result<Vec<ValueDescriptor>> {
        let values = self.run_query("resolve_name", |s| {
            let tree = s.checked_node(file, node)?;
            let NodeKind::Name { id, .. } = tree.kind(node) else {
                return Err(invalid(&tree, file, node, "name"));
            };
            let node = NodeRef::new(file, node);
            let ctx = s.query_context(node);
            let values = s.infer_name(node, id, ctx);
            Ok(s.apply_unknown_policy(values))
        })?;
        Ok(self.describe(&values))
    }

    /// Declaration sites of the name or attribute at `node`, following imports
    #[instrument(skip(self))]
    pub fn goto(&mut self, file: FileId, node: NodeId) -> Result<Vec<DeclarationSite>> {
        self.run_query("goto", |s| {
            s.checked_node(file, node)?;
            let decls = s.declarations_of(NodeRef::new(file, node))?;
            Ok(decls.into_iter().filter_map(|decl| s.site(decl)).collect())
        })
    }

    /// Name and attribute nodes across loaded files resolving to the same
    /// declarations as `node`
    #[instrument(skip(self))]
    pub fn references(&mut self, file: FileId, node: NodeId) -> Result<Vec<Reference>> {
        self.run_query("references", |s| {
            let tree = s.checked_node(file, node)?;
            let Some(name) = tree.declared_name(node).map(str::to_string) else {
                return Err(invalid(&tree, file, node, "name"));
            };
            let targets: HashSet<NodeRef> = s.declarations_of(NodeRef::new(file, node))?.into_iter().collect();
            if targets.is_empty() {
                return Ok(Vec::new());
            }

            let mut found = Vec::new();
            for candidate_file in s.files() {
                let Some(candidate_tree) = s.tree_of(candidate_file) else {
                    continue;
                };
                for candidate in candidate_tree.descendants(candidate_tree.root()) {
                    if candidate_tree.declared_name(candidate) != Some(name.as_str()) {
                        continue;
                    }
                    let candidate_ref = NodeRef::new(candidate_file, candidate);
                    let decls = s.declarations_of(candidate_ref).unwrap_or_default();
                    if targets.contains(&candidate_ref) || decls.iter().any(|d| targets.contains(d)) {
                        found.push(Reference {
                            file: candidate_file,
                            node: candidate.0,
                            location: candidate_tree.location(candidate),
                        });
                    }
                }
            }
            debug!(name = %name, count = found.len(), "references collected");
            Ok(found)
        })
    }

    /// Names visible at `node` starting with `prefix`, innermost scope first
    #[instrument(skip(self))]
    pub fn completions(&mut self, file: FileId, node: NodeId, prefix: &str) -> Result<Vec<Completion>> {
        self.run_query("completions", |s| {
            let tree = s.checked_node(file, node)?;
            let names = s.visible_names(&tree, NodeRef::new(file, node));
            let at = NodeRef::new(file, node);
            let ctx = s.query_context(at);
            let mut out = Vec::new();
            for name in names.into_iter().filter(|n| n.starts_with(prefix)) {
                if !prefix.starts_with('_') && name.starts_with("__") && !MODULE_DUNDERS.contains(&name.as_str()) {
                    continue;
                }
                let values = s.infer_name(at, &name, ctx);
                let values = s.apply_unknown_policy(values);
                out.push(Completion {
                    values: s.describe(&values),
                    name,
                });
            }
            Ok(out)
        })
    }

    /// Attributes of the values of expression `node` starting with `prefix`
    #[instrument(skip(self))]
    pub fn attribute_completions(&mut self, file: FileId, node: NodeId, prefix: &str) -> Result<Vec<Completion>> {
        self.run_query("attribute_completions", |s| {
            s.checked_node(file, node)?;
            let at = NodeRef::new(file, node);
            let ctx = s.query_context(at);
            let base = s.eval(at, ctx);

            let mut names: Vec<String> = Vec::new();
            for value in base.iter() {
                names.extend(s.member_names(value));
            }
            names.sort();
            names.dedup();

            let mut out = Vec::new();
            for name in names.into_iter().filter(|n| n.starts_with(prefix)) {
                let values = s.member_of_set(&base, &name);
                let values = s.apply_unknown_policy(values);
                out.push(Completion {
                    values: s.describe(&values),
                    name,
                });
            }
            Ok(out)
        })
    }

    /// Module-level names of `file` with their values, in declaration order
    #[instrument(skip(self))]
    pub fn outline(&mut self, file: FileId) -> Result<Vec<Completion>> {
        self.run_query("outline", |s| {
            let tree = s.tree(file)?;
            let Some(index) = s.scopes_of(file) else {
                return Err(InferError::UnknownFile(file));
            };
            let root = NodeRef::new(file, tree.root());
            let ctx = s.module_context(file);
            let mut out = Vec::new();
            for name in index.module().names() {
                let values = s.infer_name(root, name, ctx);
                let values = s.apply_unknown_policy(values);
                out.push(Completion {
                    name: name.to_string(),
                    values: s.describe(&values),
                });
            }
            out.sort_by_key(|c| index.module().get(&c.name).first().copied());
            Ok(out)
        })
    }

    /// Parameter lists of everything the call at `node` may invoke
    #[instrument(skip(self))]
    pub fn signatures(&mut self, file: FileId, node: NodeId) -> Result<Vec<Signature>> {
        self.run_query("signatures", |s| {
            let tree = s.checked_node(file, node)?;
            let NodeKind::Call { func, .. } = tree.kind(node) else {
                return Err(invalid(&tree, file, node, "call"));
            };
            let func = NodeRef::new(file, *func);
            let ctx = s.query_context(func);
            let callees = s.eval(func, ctx);
            let mut out = Vec::new();
            for callee in callees.iter() {
                if let Some(signature) = s.signature_of(callee) {
                    if !out.contains(&signature) {
                        out.push(signature);
                    }
                }
            }
            Ok(out)
        })
    }

    // Descriptors

    pub(crate) fn apply_unknown_policy(&self, values: ValueSet) -> ValueSet {
        let unknown = self.pool.unknown();
        match self.config.infer.unknown_policy {
            UnknownPolicy::Collapse if values.len() > 1 && values.contains(unknown) => ValueSet::single(unknown),
            _ => values,
        }
    }

    /// Client view of `values`, ordered by kind and name
    pub fn describe(&self, values: &ValueSet) -> Vec<ValueDescriptor> {
        let mut out: Vec<ValueDescriptor> = values.iter().map(|v| self.descriptor(v)).collect();
        out.sort_by(|a, b| (a.kind as u8, &a.name).cmp(&(b.kind as u8, &b.name)));
        out.dedup();
        out
    }

    fn descriptor(&self, value: ValueId) -> ValueDescriptor {
        let (kind, name, declaration) = match self.pool.get(value) {
            Value::Module(module) => (ValueKind::Module, self.modules.get(*module).name.clone(), self.module_site(*module)),
            Value::Class { def, .. } => (ValueKind::Class, self.declared(*def), self.site(*def)),
            Value::Function { def, .. } => (ValueKind::Function, self.declared(*def), self.site(*def)),
            Value::Instance { class, .. } => {
                let def = self.pool.get(*class).definition();
                let name = def.map(|d| self.declared(d)).unwrap_or_else(|| "object".to_string());
                (ValueKind::Instance, name, def.and_then(|d| self.site(d)))
            }
            Value::Literal(literal) => (ValueKind::Literal, literal.to_string(), None),
            Value::Compiled(id) => {
                let object = self.compiled.get(*id);
                let name = if object.qualname.is_empty() {
                    object.module.clone()
                } else {
                    format!("{}.{}", object.module, object.qualname)
                };
                (ValueKind::Compiled, name, None)
            }
            Value::Unknown => (ValueKind::Unknown, "unknown".to_string(), None),
        };
        ValueDescriptor { kind, name, declaration }
    }

    fn declared(&self, def: NodeRef) -> String {
        self.tree_of(def.file)
            .and_then(|tree| tree.declared_name(def.node).map(str::to_string))
            .unwrap_or_else(|| "<lambda>".to_string())
    }

    fn site(&self, decl: NodeRef) -> Option<DeclarationSite> {
        let tree = self.tree_of(decl.file)?;
        if !tree.contains(decl.node) {
            return None;
        }
        Some(DeclarationSite {
            file: decl.file,
            path: self.path(decl.file).map(PathBuf::from),
            name: tree.declared_name(decl.node).map(str::to_string),
            location: tree.location(decl.node),
        })
    }

    fn module_site(&self, module: ModuleId) -> Option<DeclarationSite> {
        let root = self.module_root(module)?;
        let mut site = self.site(root)?;
        site.name = Some(self.modules.get(module).name.clone());
        Some(site)
    }

    fn module_root(&self, module: ModuleId) -> Option<NodeRef> {
        let file = self.modules.get(module).files().next()?;
        let tree = self.tree_of(file)?;
        Some(NodeRef::new(file, tree.root()))
    }

    // Declarations

    /// Declaring nodes behind the name, attribute or definition at `node`
    fn declarations_of(&mut self, node: NodeRef) -> Result<Vec<NodeRef>> {
        let tree = self.checked_node(node.file, node.node)?;
        let decls = match tree.kind(node.node) {
            NodeKind::Name { id, .. } => self.lookup_name(node, id),
            NodeKind::Attribute { value, attr, .. } => {
                let base = NodeRef::new(node.file, *value);
                let ctx = self.query_context(base);
                let values = self.eval(base, ctx);
                let mut decls = Vec::new();
                for value in values.iter() {
                    for decl in self.member_declarations(value, attr) {
                        if !decls.contains(&decl) {
                            decls.push(decl);
                        }
                    }
                }
                decls
            }
            NodeKind::FunctionDef { .. }
            | NodeKind::ClassDef { .. }
            | NodeKind::Param { .. }
            | NodeKind::Alias { .. }
            | NodeKind::Capture { .. }
            | NodeKind::ExceptHandler { .. } => vec![node],
            _ => return Err(invalid(&tree, node.file, node.node, "name or attribute")),
        };
        Ok(self.follow_imports(decls))
    }

    /// Replace import aliases by what they import
    fn follow_imports(&mut self, decls: Vec<NodeRef>) -> Vec<NodeRef> {
        let mut out = Vec::new();
        let mut pending: Vec<(NodeRef, usize)> = decls.into_iter().map(|d| (d, 0)).collect();
        while let Some((decl, hops)) = pending.pop() {
            let followed = if hops < MAX_ALIAS_HOPS { self.alias_target(decl) } else { None };
            match followed {
                Some(targets) if !targets.is_empty() => {
                    pending.extend(targets.into_iter().rev().map(|t| (t, hops + 1)));
                }
                _ => {
                    if !out.contains(&decl) {
                        out.push(decl);
                    }
                }
            }
        }
        out
    }

    /// Declarations an import alias refers to; `None` for anything else
    fn alias_target(&mut self, decl: NodeRef) -> Option<Vec<NodeRef>> {
        let tree = self.tree_of(decl.file)?;
        let NodeKind::Alias { name, asname } = tree.kind(decl.node) else {
            return None;
        };
        let statement = tree.parent(decl.node)?;
        match tree.kind(statement) {
            NodeKind::Import { .. } => {
                let target = match asname {
                    Some(_) => name.as_str(),
                    None => name.split('.').next().unwrap_or(name),
                };
                let module = self.resolve_import_target(decl.file, Some(target), 0)?;
                Some(self.module_root(module).into_iter().collect())
            }
            NodeKind::ImportFrom { module, level, .. } => {
                let target = self.resolve_import_target(decl.file, module.as_deref(), *level)?;
                let decls = self.module_declarations(target, name);
                if !decls.is_empty() {
                    return Some(decls);
                }
                let submodule = self.import_submodule(target, name)?;
                Some(self.module_root(submodule).into_iter().collect())
            }
            _ => None,
        }
    }

    /// Names visible from `node`: lexical scopes, their star imports, builtins
    fn visible_names(&mut self, tree: &SyntaxTree, node: NodeRef) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut push = |names: &mut Vec<String>, name: String| {
            if seen.insert(name.clone()) {
                names.push(name);
            }
        };

        if let Some(index) = self.scopes_of(node.file) {
            let start = enclosing_scope(tree, node.node);
            let chain = FilterChain::visible(&index, start);
            let mut star_imports = Vec::new();
            for filter in chain.iter() {
                for name in filter.names() {
                    push(&mut names, name.to_string());
                }
                star_imports.extend(filter.star_imports().iter().map(|&i| NodeRef::new(node.file, i)));
            }
            for import in star_imports {
                for name in self.star_import_names(import) {
                    push(&mut names, name);
                }
            }
        }
        for dunder in MODULE_DUNDERS {
            push(&mut names, dunder.to_string());
        }
        if !self.is_builtins_file(node.file) {
            if let Some(builtins) = self.builtins_module() {
                for name in self.module_member_names(builtins) {
                    if !name.starts_with('_') {
                        push(&mut names, name);
                    }
                }
            }
        }
        names
    }

    // Signatures

    fn signature_of(&mut self, callee: ValueId) -> Option<Signature> {
        match self.pool.get(callee).clone() {
            Value::Function { def, bound, .. } => {
                let tree = self.tree_of(def.file)?;
                let mut params = param_infos(&tree, def.node);
                let skip_receiver = bound.is_some() && self.method_kind_of(def) != MethodKind::Static;
                if skip_receiver && !params.is_empty() {
                    params.remove(0);
                }
                Some(Signature {
                    name: self.declared(def),
                    params,
                    declaration: self.site(def),
                })
            }
            Value::Class { def, .. } => {
                let init = self.member(callee, "__init__");
                let init = init.iter().find(|&v| self.pool.get(v).is_function())?;
                let mut signature = self.signature_of(init)?;
                // Accessed through the class, `__init__` is unbound
                if !signature.params.is_empty() {
                    signature.params.remove(0);
                }
                signature.name = self.declared(def);
                signature.declaration = self.site(def);
                Some(signature)
            }
            Value::Instance { .. } => {
                let call = self.member(callee, "__call__");
                let call = call.iter().find(|&v| self.pool.get(v).is_function())?;
                self.signature_of(call)
            }
            Value::Compiled(id) => {
                let object = self.compiled.get(id);
                let params = object.params()?;
                Some(Signature {
                    name: object.name().to_string(),
                    params: params
                        .iter()
                        .map(|name| ParamInfo {
                            name: name.clone(),
                            kind: None,
                            has_default: false,
                            annotation: None,
                        })
                        .collect(),
                    declaration: None,
                })
            }
            _ => None,
        }
    }
}

fn param_infos(tree: &SyntaxTree, def: NodeId) -> Vec<ParamInfo> {
    let params = match tree.kind(def) {
        NodeKind::FunctionDef { params, .. } | NodeKind::Lambda { params, .. } => params,
        _ => return Vec::new(),
    };
    params
        .iter()
        .filter_map(|&p| match tree.kind(p) {
            NodeKind::Param {
                name,
                kind,
                annotation,
                default,
            } => Some(ParamInfo {
                name: name.clone(),
                kind: Some(*kind),
                has_default: default.is_some(),
                annotation: annotation.map(|a| tree.text(a).to_string()),
            }),
            _ => None,
        })
        .collect()
}

fn invalid(tree: &SyntaxTree, file: FileId, node: NodeId, expected: &'static str) -> InferError {
    InferError::InvalidNode {
        file,
        node,
        expected,
        found: tree.kind(node).label(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::Config;

    fn session(source: &str) -> (Session, FileId) {
        let mut session = Session::new(Config::default());
        let file = session.add_source(None, source).unwrap();
        (session, file)
    }

    fn last_name(session: &Session, file: FileId, name: &str) -> NodeId {
        *session.tree(file).unwrap().find_names(name).last().unwrap()
    }

    #[test]
    fn test_infer_reports_literal_descriptors() {
        let (mut session, file) = session("x = 1 if c else 'a'\nx\n");
        let node = last_name(&session, file, "x");
        let values = session.infer(file, node).unwrap();
        let names: Vec<&str> = values.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(values.len(), 2);
        assert!(names.contains(&"1"));
        assert!(names.contains(&"\"a\""));
        assert!(values.iter().all(|v| v.kind == ValueKind::Literal));
    }

    #[test]
    fn test_resolve_name_rejects_non_names() {
        let (mut session, file) = session("x = 1\n");
        let tree = session.tree(file).unwrap();
        let err = session.resolve_name(file, tree.root()).unwrap_err();
        assert!(matches!(err, InferError::InvalidNode { expected: "name", .. }));
    }

    #[test]
    fn test_unknown_node_is_an_error() {
        let (mut session, file) = session("x = 1\n");
        let err = session.infer(file, NodeId(10_000)).unwrap_err();
        assert!(matches!(err, InferError::UnknownNode { .. }));
    }

    #[test]
    fn test_goto_local_definition() {
        let (mut session, file) = session("def f():\n    pass\nf()\n");
        let node = last_name(&session, file, "f");
        let sites = session.goto(file, node).unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites[0].name.as_deref(), Some("f"));
        assert_eq!(sites[0].location.line, 1);
    }

    #[test]
    fn test_completions_filter_by_prefix() {
        let (mut session, file) = session("alpha = 1\nalps = 'x'\nbeta = 2\nal\n");
        let node = last_name(&session, file, "al");
        let names: Vec<String> = session
            .completions(file, node, "al")
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert!(names.contains(&"alpha".to_string()));
        assert!(names.contains(&"alps".to_string()));
        assert!(!names.contains(&"beta".to_string()));
        assert!(names.contains(&"all".to_string()), "builtins are completed too");
    }

    #[test]
    fn test_signatures_skip_bound_receiver() {
        let (mut session, file) = session(
            "class C:\n    def __init__(self, a, b=1):\n        pass\n    def m(self, x):\n        pass\nC(1)\nC(1).m(2)\n",
        );
        let tree = session.tree(file).unwrap();
        let calls: Vec<NodeId> = tree
            .descendants(tree.root())
            .filter(|&n| matches!(tree.kind(n), NodeKind::Call { .. }))
            .collect();

        let ctor = session.signatures(file, calls[0]).unwrap();
        assert_eq!(ctor.len(), 1);
        assert_eq!(ctor[0].name, "C");
        let params: Vec<&str> = ctor[0].params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, vec!["a", "b"]);
        assert!(ctor[0].params[1].has_default);

        let method_call = calls
            .iter()
            .copied()
            .find(|&c| matches!(tree.kind(c), NodeKind::Call { func, .. } if matches!(tree.kind(*func), NodeKind::Attribute { .. })))
            .unwrap();
        let method = session.signatures(file, method_call).unwrap();
        assert_eq!(method[0].params.len(), 1);
        assert_eq!(method[0].params[0].name, "x");
    }
}
