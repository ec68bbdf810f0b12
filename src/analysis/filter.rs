//! Name filters
//!
//! A filter is a view over the declarations of one scope. A name is looked up
//! by walking an ordered chain of filters from the innermost scope outward and
//! stopping at the first one that declares it. Class scopes are visible only
//! from their own body, never from the methods nested inside them.

use crate::analysis::scope::{Scope, ScopeIndex, ScopeKind};
use crate::ast::NodeId;

#[derive(Debug, Clone, Copy)]
pub struct Filter<'a> {
    scope: &'a Scope,
}

impl<'a> Filter<'a> {
    pub fn new(scope: &'a Scope) -> Self {
        Self { scope }
    }

    pub fn scope_node(&self) -> NodeId {
        self.scope.node
    }

    pub fn kind(&self) -> ScopeKind {
        self.scope.kind
    }

    pub fn get(&self, name: &str) -> &'a [NodeId] {
        self.scope.get(name)
    }

    pub fn star_imports(&self) -> &'a [NodeId] {
        self.scope.star_imports()
    }

    /// Declared names in lexical order of their first declaration
    pub fn names(&self) -> Vec<&'a str> {
        let mut names: Vec<(&'a str, NodeId)> = self
            .scope
            .names()
            .map(|name| (name, self.scope.get(name)[0]))
            .collect();
        names.sort_by_key(|&(_, first)| first);
        names.into_iter().map(|(name, _)| name).collect()
    }
}

/// Ordered filters a lookup consults, innermost first
#[derive(Debug, Clone)]
pub struct FilterChain<'a> {
    filters: Vec<Filter<'a>>,
}

impl<'a> FilterChain<'a> {
    /// Chain for resolving `name` from `start`.
    ///
    /// A `global` declaration on the way jumps straight to the module scope;
    /// a `nonlocal` one skips the declaring scope, whose bindings of the name
    /// were recorded on the enclosing function.
    pub fn for_name(index: &'a ScopeIndex, start: NodeId, name: &str) -> Self {
        let mut filters = Vec::new();
        let mut current = index.scope(start);
        let mut first = true;

        while let Some(scope) = current {
            if scope.is_global(name) {
                filters.push(Filter::new(index.module()));
                break;
            }
            let visible = first || scope.kind != ScopeKind::Class;
            if visible && !scope.is_nonlocal(name) {
                filters.push(Filter::new(scope));
            }
            first = false;
            current = scope.parent.and_then(|parent| index.scope(parent));
        }

        Self { filters }
    }

    /// Every scope visible from `start`, for completion
    pub fn visible(index: &'a ScopeIndex, start: NodeId) -> Self {
        let mut filters = Vec::new();
        let mut current = index.scope(start);
        let mut first = true;

        while let Some(scope) = current {
            if first || scope.kind != ScopeKind::Class {
                filters.push(Filter::new(scope));
            }
            first = false;
            current = scope.parent.and_then(|parent| index.scope(parent));
        }

        Self { filters }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Filter<'a>> {
        self.filters.iter()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// First filter with direct declarations of `name`
    pub fn first_match(&self, name: &str) -> Option<(Filter<'a>, &'a [NodeId])> {
        self.filters.iter().find_map(|filter| {
            let found = filter.get(name);
            (!found.is_empty()).then_some((*filter, found))
        })
    }
}
