//! Inference session
//!
//! A [`Session`] owns every file snapshot, the interning pool, the evaluation
//! cache and the module registry. Evaluation is lazy: nothing is computed
//! until a query asks for a node, and each `(node, context, slot)` result is
//! computed at most once per snapshot.
//!
//! The evaluator is split across the sibling modules of `analysis`, each of
//! which adds an `impl Session` block for one concern.

use crate::analysis::scope::{enclosing_scope, ScopeIndex};
use crate::ast::{Constant, FileId, NodeId, NodeKind, NodeRef, SyntaxTree};
use crate::compiled::{CompiledPool, NativeBridge, SubprocessBridge};
use crate::core::{
    Arguments, Context, ContextId, ContextKind, InstancePayload, LiteralValue, ModuleId, Value, ValueId,
    ValuePool, ValueSet,
};
use crate::errors::{InferError, Result};
use crate::frontend::{parse_file, parse_module, Config};
use crate::imports::{ModuleFinder, ModuleRegistry};
use crate::performance::cache::{CacheKey, CacheStats, EvalCache, ExecutionLimiter, Lookup, Slot};
use crate::performance::incremental::{ContentHash, DependencyGraph};
use crate::performance::metrics::{Counter, PerformanceMetrics, QueryTimer};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Session shared between threads; queries take the lock for their duration
pub type SharedSession = Arc<Mutex<Session>>;

/// Cooperative cancellation flag, checked at every evaluation step
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One parsed snapshot of a file
#[derive(Debug, Clone)]
pub(crate) struct SourceFile {
    pub(crate) tree: Arc<SyntaxTree>,
    pub(crate) scopes: Arc<ScopeIndex>,
    pub(crate) hash: ContentHash,
    pub(crate) path: Option<PathBuf>,
    pub(crate) bundled: bool,
}

pub struct Session {
    pub(crate) config: Config,
    pub(crate) files: HashMap<FileId, SourceFile>,
    next_file: u32,
    /// Path of every loaded snapshot, disk files and buffers alike
    pub(crate) paths: HashMap<PathBuf, FileId>,
    /// Paths registered from memory; they shadow the filesystem
    pub(crate) overlays: HashSet<PathBuf>,
    pub(crate) pool: ValuePool,
    pub(crate) cache: EvalCache,
    pub(crate) limiter: ExecutionLimiter,
    pub(crate) modules: ModuleRegistry,
    pub(crate) finder: ModuleFinder,
    pub(crate) compiled: CompiledPool,
    pub(crate) bridge: Option<Arc<dyn NativeBridge>>,
    pub(crate) deps: DependencyGraph,
    pub(crate) metrics: Arc<PerformanceMetrics>,
    cancel: CancelToken,
    cancelled: bool,
    /// Modules currently searched through `from m import *`
    pub(crate) star_guard: HashSet<ModuleId>,
    pub(crate) builtin_classes: HashMap<String, Option<ValueId>>,
}

impl Session {
    pub fn new(config: Config) -> Self {
        let finder = ModuleFinder::new(config.resolved_search_paths(), config.project.stub_packages);
        let bridge = match (&config.project.native_runtime, config.bridge.enabled) {
            (Some(executable), true) => {
                info!(executable = %executable.display(), "native bridge configured");
                let bridge = SubprocessBridge::new(executable, Duration::from_millis(config.bridge.timeout_ms))
                    .with_max_members(config.bridge.max_members);
                Some(Arc::new(bridge) as Arc<dyn NativeBridge>)
            }
            _ => None,
        };

        Self {
            limiter: ExecutionLimiter::new(config.infer.limits()),
            config,
            files: HashMap::new(),
            next_file: 0,
            paths: HashMap::new(),
            overlays: HashSet::new(),
            pool: ValuePool::new(),
            cache: EvalCache::new(),
            modules: ModuleRegistry::new(),
            finder,
            compiled: CompiledPool::new(),
            bridge,
            deps: DependencyGraph::new(),
            metrics: Arc::new(PerformanceMetrics::new()),
            cancel: CancelToken::new(),
            cancelled: false,
            star_guard: HashSet::new(),
            builtin_classes: HashMap::new(),
        }
    }

    /// Replace the native bridge, or disable it with `None`
    pub fn with_bridge(mut self, bridge: Option<Arc<dyn NativeBridge>>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<PerformanceMetrics> {
        &self.metrics
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cached results keyed on nodes of `file`
    pub fn cache_entries(&self, file: FileId) -> usize {
        self.cache.entries_for(file)
    }

    /// Token that cancels the running query when triggered from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // File snapshots

    /// Register an in-memory buffer; a path lets it take part in imports.
    ///
    /// Registering a path that is already loaded replaces that snapshot.
    pub fn add_source(&mut self, path: Option<&Path>, source: &str) -> Result<FileId> {
        if let Some(&existing) = path.and_then(|p| self.paths.get(p)) {
            if let Some(p) = path {
                self.overlays.insert(p.to_path_buf());
            }
            return self.update_source(existing, source);
        }
        let tree = parse_module(source, path)?;
        let file = self.insert_file(tree, ContentHash::from_source(source), path.map(Path::to_path_buf), false);
        if let Some(path) = path {
            self.overlays.insert(path.to_path_buf());
            self.modules.clear_missing();
        }
        debug!(%file, path = ?path, "buffer registered");
        Ok(file)
    }

    /// Load a file from disk, or return the snapshot already loaded for it
    pub fn load_file(&mut self, path: &Path) -> Result<FileId> {
        if let Some(&file) = self.paths.get(path) {
            return Ok(file);
        }
        let (source, tree) = parse_file(path)?;
        let file = self.insert_file(tree, ContentHash::from_source(&source), Some(path.to_path_buf()), false);
        debug!(%file, path = %path.display(), "file loaded");
        Ok(file)
    }

    /// Replace the contents of `file`.
    ///
    /// Unchanged content keeps the current snapshot. Otherwise a new snapshot
    /// with a fresh id supersedes the old one, whose id stops resolving.
    pub fn update_source(&mut self, file: FileId, source: &str) -> Result<FileId> {
        let entry = self.files.get(&file).ok_or(InferError::UnknownFile(file))?;
        let hash = ContentHash::from_source(source);
        if entry.hash == hash {
            return Ok(file);
        }
        let path = entry.path.clone();
        let tree = parse_module(source, path.as_deref())?;

        self.invalidate_file(file)?;
        let new = self.insert_file(tree, hash, path, false);
        self.deps.retarget(file, new);
        self.modules.retarget(file, new);
        self.files.remove(&file);
        info!(old = %file, new = %new, hash = %hash.short_hex(), "file snapshot replaced");
        Ok(new)
    }

    /// Drop cached results for `file` and everything that imports it
    pub fn invalidate_file(&mut self, file: FileId) -> Result<()> {
        if !self.files.contains_key(&file) {
            return Err(InferError::UnknownFile(file));
        }
        // A module created since the last lookup may now satisfy an import.
        self.modules.clear_missing();
        for affected in self.deps.invalidate(&[file]) {
            let removed = self.cache.invalidate_file(affected);
            self.metrics.increment(Counter::InvalidatedFiles);
            debug!(file = %affected, removed, "cache invalidated");
        }
        Ok(())
    }

    pub fn tree(&self, file: FileId) -> Result<Arc<SyntaxTree>> {
        self.tree_of(file).ok_or(InferError::UnknownFile(file))
    }

    pub fn path(&self, file: FileId) -> Option<&Path> {
        self.files.get(&file).and_then(|f| f.path.as_deref())
    }

    /// Ids of the snapshots currently loaded, bundled stubs excluded
    pub fn files(&self) -> Vec<FileId> {
        let mut files: Vec<FileId> = self
            .files
            .iter()
            .filter(|(_, f)| !f.bundled)
            .map(|(&id, _)| id)
            .collect();
        files.sort();
        files
    }

    pub(crate) fn insert_file(
        &mut self,
        tree: impl Into<Arc<SyntaxTree>>,
        hash: ContentHash,
        path: Option<PathBuf>,
        bundled: bool,
    ) -> FileId {
        let tree = tree.into();
        let file = FileId(self.next_file);
        self.next_file += 1;
        let scopes = ScopeIndex::build(&tree, self.config.project.target_version);
        if let Some(path) = &path {
            self.paths.insert(path.clone(), file);
        }
        self.files.insert(
            file,
            SourceFile {
                tree,
                scopes: Arc::new(scopes),
                hash,
                path,
                bundled,
            },
        );
        file
    }

    pub(crate) fn tree_of(&self, file: FileId) -> Option<Arc<SyntaxTree>> {
        self.files.get(&file).map(|f| Arc::clone(&f.tree))
    }

    pub(crate) fn scopes_of(&self, file: FileId) -> Option<Arc<ScopeIndex>> {
        self.files.get(&file).map(|f| Arc::clone(&f.scopes))
    }

    pub(crate) fn is_bundled(&self, file: FileId) -> bool {
        self.files.get(&file).map_or(false, |f| f.bundled)
    }

    /// Check that `node` exists in a loaded snapshot
    pub(crate) fn checked_node(&self, file: FileId, node: NodeId) -> Result<Arc<SyntaxTree>> {
        let tree = self.tree(file)?;
        if !tree.contains(node) {
            return Err(InferError::UnknownNode { file, node });
        }
        Ok(tree)
    }

    // Contexts

    pub(crate) fn module_context(&mut self, file: FileId) -> ContextId {
        let root = self.tree_of(file).map_or(NodeId(0), |t| t.root());
        self.pool.context(Context::module(file, NodeRef::new(file, root)))
    }

    /// Scope-opening node `node` is evaluated in
    pub(crate) fn scope_of(&self, node: NodeRef) -> NodeRef {
        let scope = self
            .tree_of(node.file)
            .map_or(node.node, |tree| enclosing_scope(&tree, node.node));
        NodeRef::new(node.file, scope)
    }

    /// Context for evaluating nodes of `scope`.
    ///
    /// Reuses the activation on `ctx`'s chain when there is one; otherwise
    /// builds a call-site-free activation nested the way the source is.
    pub(crate) fn context_for_scope(&mut self, ctx: ContextId, scope: NodeRef) -> ContextId {
        let mut current = Some(ctx);
        while let Some(id) = current {
            let context = self.pool.get_context(id);
            if context.scope == scope {
                return id;
            }
            current = context.parent;
        }
        self.fresh_context(ctx, scope)
    }

    fn fresh_context(&mut self, ctx: ContextId, scope: NodeRef) -> ContextId {
        let Some(tree) = self.tree_of(scope.file) else {
            return self.module_context(scope.file);
        };
        let kind = tree.kind(scope.node);
        if matches!(kind, NodeKind::Module { .. }) {
            return self.module_context(scope.file);
        }

        let parent_scope = NodeRef::new(scope.file, enclosing_scope(&tree, scope.node));
        let parent = self.context_for_scope(ctx, parent_scope);
        let context_kind = match kind {
            NodeKind::FunctionDef { .. } | NodeKind::Lambda { .. } => {
                let function = self.pool.value(Value::Function {
                    def: scope,
                    context: parent,
                    bound: None,
                });
                let arguments = self.pool.arguments(Arguments::Anonymous);
                ContextKind::Function { function, arguments }
            }
            NodeKind::ClassDef { .. } => {
                let class = self.pool.value(Value::Class {
                    def: scope,
                    context: parent,
                });
                ContextKind::Class { class }
            }
            _ => ContextKind::Comprehension,
        };
        self.pool.context(Context {
            kind: context_kind,
            scope,
            parent: Some(parent),
        })
    }

    /// Default context for a query on `node`
    pub(crate) fn query_context(&mut self, node: NodeRef) -> ContextId {
        let module = self.module_context(node.file);
        let scope = self.scope_of(node);
        self.context_for_scope(module, scope)
    }

    // Cancellation and query bookkeeping

    pub(crate) fn is_cancelled(&mut self) -> bool {
        if !self.cancelled && self.cancel.is_cancelled() {
            self.cancelled = true;
        }
        self.cancelled
    }

    /// Run one public query: fresh execution budget, timing, cancellation
    pub(crate) fn run_query<T>(&mut self, name: &'static str, query: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let metrics = Arc::clone(&self.metrics);
        let _timer = QueryTimer::start(&metrics, name);
        metrics.increment(Counter::Queries);
        self.limiter.reset();
        self.cache.begin_query();
        self.cancelled = false;

        let result = query(self);

        if self.cancelled || self.cancel.is_cancelled() {
            self.cache.clear_in_progress();
            self.cancelled = false;
            self.cancel.reset();
            metrics.increment(Counter::Cancelled);
            debug!(query = name, "query cancelled");
            return Err(InferError::Cancelled);
        }
        result
    }

    /// Memoized evaluation of one `(node, context, slot)` key
    pub(crate) fn cached(
        &mut self,
        node: NodeRef,
        ctx: ContextId,
        slot: Slot,
        compute: impl FnOnce(&mut Self) -> ValueSet,
    ) -> ValueSet {
        if self.is_cancelled() {
            return ValueSet::empty();
        }
        let key = CacheKey::new(node, ctx, slot);
        match self.cache.begin(key) {
            Lookup::Hit(values) => values,
            Lookup::Provisional(values) => {
                self.limiter.note_truncation();
                values
            }
            Lookup::Cycle => ValueSet::empty(),
            Lookup::Miss => {
                if !self.limiter.enter() {
                    debug!(file = %node.file, node = node.node.0, "evaluation depth limit reached");
                    self.cache.abort(key);
                    return ValueSet::empty();
                }
                let truncations = self.limiter.truncations();
                let values = compute(self);
                self.limiter.leave();
                if self.cancelled {
                    self.cache.abort(key);
                } else if self.limiter.truncations() != truncations {
                    self.cache.finish_provisional(key, &values);
                } else {
                    self.cache.finish(key, &values);
                }
                values
            }
        }
    }

    // Expressions

    /// Values of expression `node` in `ctx`
    pub(crate) fn eval(&mut self, node: NodeRef, ctx: ContextId) -> ValueSet {
        self.cached(node, ctx, Slot::Value, |s| s.eval_uncached(node, ctx))
    }

    /// Evaluate `node` in the activation of its own scope
    pub(crate) fn eval_at(&mut self, node: NodeRef, ctx: ContextId) -> ValueSet {
        let scope = self.scope_of(node);
        let ctx = self.context_for_scope(ctx, scope);
        self.eval(node, ctx)
    }

    fn eval_uncached(&mut self, node: NodeRef, ctx: ContextId) -> ValueSet {
        let Some(tree) = self.tree_of(node.file) else {
            return ValueSet::empty();
        };
        if !tree.contains(node.node) {
            return ValueSet::empty();
        }
        let at = |id: NodeId| NodeRef::new(node.file, id);

        match tree.kind(node.node) {
            NodeKind::Constant(constant) => self.constant(constant),
            NodeKind::Name { id, .. } => self.infer_name(node, id, ctx),
            NodeKind::Attribute { value, attr, .. } => {
                let base = self.eval(at(*value), ctx);
                self.member_of_set(&base, attr)
            }
            NodeKind::Call { func, args, keywords } => self.evaluate_call(at(*func), args, keywords, ctx),
            NodeKind::Subscript { value, slice, .. } => self.subscript(at(*value), at(*slice), ctx),
            NodeKind::BinOp { left, op, right } => {
                let left = self.eval(at(*left), ctx);
                let right = self.eval(at(*right), ctx);
                self.binary_op(&left, *op, &right)
            }
            NodeKind::UnaryOp { op, operand } => {
                let operand = self.eval(at(*operand), ctx);
                self.unary_op(*op, &operand)
            }
            NodeKind::BoolOp { values, .. } => values.iter().map(|&v| self.eval(at(v), ctx)).collect(),
            NodeKind::Compare { .. } => self.builtin_instance("bool"),
            NodeKind::IfExp { body, orelse, .. } => {
                let body = self.eval(at(*body), ctx);
                body.union(&self.eval(at(*orelse), ctx))
            }
            NodeKind::NamedExpr { value, .. } | NodeKind::Await { value } | NodeKind::Starred { value, .. } => {
                self.eval(at(*value), ctx)
            }
            NodeKind::Lambda { .. } => ValueSet::single(self.pool.value(Value::Function {
                def: node,
                context: ctx,
                bound: None,
            })),
            NodeKind::List { elts, .. } => self.sequence_display("list", node.file, elts, ctx),
            NodeKind::Tuple { elts, .. } => self.sequence_display("tuple", node.file, elts, ctx),
            NodeKind::Set { elts } => self.sequence_display("set", node.file, elts, ctx),
            NodeKind::Dict { keys, values } => self.mapping_display(node.file, keys, values, ctx),
            NodeKind::ListComp { elt, .. } => self.comprehension_display("list", node, &[*elt], ctx),
            NodeKind::SetComp { elt, .. } => self.comprehension_display("set", node, &[*elt], ctx),
            NodeKind::GeneratorExp { elt, .. } => self.comprehension_display("generator", node, &[*elt], ctx),
            NodeKind::DictComp { key, value, .. } => self.comprehension_display("dict", node, &[*key, *value], ctx),
            NodeKind::JoinedStr { .. } | NodeKind::FormattedValue { .. } => self.builtin_instance("str"),
            NodeKind::Slice { .. } => self.builtin_instance("slice"),
            NodeKind::Yield { .. } | NodeKind::YieldFrom { .. } => self.unknown(),
            NodeKind::FunctionDef { .. }
            | NodeKind::ClassDef { .. }
            | NodeKind::Param { .. }
            | NodeKind::Alias { .. }
            | NodeKind::Capture { .. }
            | NodeKind::ExceptHandler { .. } => self.infer_binding(node, ctx),
            NodeKind::Unsupported { what } => {
                warn!(file = %node.file, node = node.node.0, what = %what, "unsupported syntax evaluates to nothing");
                self.metrics.increment(Counter::MalformedNodes);
                ValueSet::empty()
            }
            _ => ValueSet::empty(),
        }
    }

    fn constant(&mut self, constant: &Constant) -> ValueSet {
        match constant {
            Constant::Int(None) => self.builtin_instance("int"),
            Constant::Tuple(items) => {
                let elements = items.iter().map(|item| self.constant(item)).collect();
                self.container("tuple", InstancePayload::Sequence(elements))
            }
            other => match LiteralValue::from_constant(other) {
                Some(literal) => self.literal(literal),
                None => ValueSet::empty(),
            },
        }
    }

    /// `[a, b]`, `(a, b)` and `{a, b}`; a starred element loses positions
    fn sequence_display(&mut self, class: &str, file: FileId, elts: &[NodeId], ctx: ContextId) -> ValueSet {
        let Some(tree) = self.tree_of(file) else {
            return ValueSet::empty();
        };
        let starred = elts.iter().any(|&e| matches!(tree.kind(e), NodeKind::Starred { .. }));
        if starred {
            let mut element = ValueSet::empty();
            for &elt in elts {
                match tree.kind(elt) {
                    NodeKind::Starred { value, .. } => {
                        let spread = self.eval(NodeRef::new(file, *value), ctx);
                        element.union_with(&self.iterate(&spread));
                    }
                    _ => element.union_with(&self.eval(NodeRef::new(file, elt), ctx)),
                }
            }
            return self.container(class, InstancePayload::TypeArgs(vec![element]));
        }
        let elements = elts.iter().map(|&e| self.eval(NodeRef::new(file, e), ctx)).collect();
        self.container(class, InstancePayload::Sequence(elements))
    }

    fn mapping_display(&mut self, file: FileId, keys: &[Option<NodeId>], values: &[NodeId], ctx: ContextId) -> ValueSet {
        let mut pairs = Vec::with_capacity(values.len());
        for (key, &value) in keys.iter().zip(values) {
            let value_set = self.eval(NodeRef::new(file, value), ctx);
            match key {
                Some(key) => {
                    let key_set = self.eval(NodeRef::new(file, *key), ctx);
                    pairs.push((key_set, value_set));
                }
                // `**other` merges another mapping
                None => {
                    let keys = self.iterate(&value_set);
                    let values = self.mapping_values(&value_set);
                    pairs.push((keys, values));
                }
            }
        }
        self.container("dict", InstancePayload::Mapping(pairs))
    }

    /// Comprehensions evaluate their element expressions in their own scope
    fn comprehension_display(&mut self, class: &str, node: NodeRef, parts: &[NodeId], ctx: ContextId) -> ValueSet {
        let comp_ctx = self.pool.context(Context {
            kind: ContextKind::Comprehension,
            scope: node,
            parent: Some(ctx),
        });
        let args = parts
            .iter()
            .map(|&part| self.eval(NodeRef::new(node.file, part), comp_ctx))
            .collect();
        self.container(class, InstancePayload::TypeArgs(args))
    }

    // Small constructors

    pub(crate) fn unknown(&self) -> ValueSet {
        ValueSet::single(self.pool.unknown())
    }

    pub(crate) fn literal(&mut self, literal: LiteralValue) -> ValueSet {
        ValueSet::single(self.pool.literal(literal))
    }

    pub(crate) fn module_value(&mut self, module: ModuleId) -> ValueId {
        self.pool.value(Value::Module(module))
    }

    /// Instance of builtin `class` carrying `payload`
    pub(crate) fn container(&mut self, class: &str, payload: InstancePayload) -> ValueSet {
        match self.builtin_class(class) {
            Some(class) => ValueSet::single(self.pool.value(Value::Instance { class, payload })),
            None => self.unknown(),
        }
    }

    /// Instance of `class` created without known arguments
    pub(crate) fn plain_instance(&mut self, class: ValueId) -> ValueId {
        let arguments = self.pool.arguments(Arguments::Anonymous);
        self.pool.value(Value::Instance {
            class,
            payload: InstancePayload::Plain { arguments },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_roundtrip() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn test_update_source_keeps_snapshot_when_unchanged() {
        let mut session = Session::new(Config::default());
        let file = session.add_source(None, "x = 1\n").unwrap();
        assert_eq!(session.update_source(file, "x = 1\n").unwrap(), file);

        let next = session.update_source(file, "x = 2\n").unwrap();
        assert_ne!(next, file);
        assert!(matches!(session.tree(file), Err(InferError::UnknownFile(_))));
        assert!(session.tree(next).is_ok());
    }

    #[test]
    fn test_parse_error_keeps_old_snapshot() {
        let mut session = Session::new(Config::default());
        let file = session.add_source(Some(Path::new("/virtual/m.py")), "x = 1\n").unwrap();
        let err = session.update_source(file, "def (:\n").unwrap_err();
        assert!(matches!(err, InferError::Parse { .. }));
        assert!(session.tree(file).is_ok());
    }

    #[test]
    fn test_shared_session_across_threads() {
        let shared = Session::new(Config::default()).shared();
        let file = shared.lock().add_source(None, "value = 41 + 1\nvalue\n").unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || {
                    let mut session = shared.lock();
                    let node = *session.tree(file).unwrap().find_names("value").last().unwrap();
                    session.infer(file, node).unwrap()
                })
            })
            .collect();
        for handle in handles {
            let values = handle.join().unwrap();
            assert_eq!(values.len(), 1);
            assert_eq!(values[0].name, "42");
        }
    }

    #[test]
    fn test_context_for_scope_builds_nested_activation() {
        let mut session = Session::new(Config::default());
        let file = session
            .add_source(None, "class C:\n    def m(self):\n        return self\n")
            .unwrap();
        let tree = session.tree(file).unwrap();
        let name = tree.find_names("self")[0];
        let ctx = session.query_context(NodeRef::new(file, name));
        let context = session.pool.get_context(ctx).clone();
        assert!(context.is_function());
        let parent = context.parent.map(|p| session.pool.get_context(p).clone()).unwrap();
        assert!(matches!(parent.kind, ContextKind::Class { .. }));
    }
}
