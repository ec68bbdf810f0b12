//! Change detection and bulk invalidation
//!
//! - Content-addressed hashing decides whether a new buffer differs at all
//! - Import edges between file snapshots decide which caches a change reaches

use crate::ast::FileId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Content hash for change detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn from_content(content: &[u8]) -> Self {
        let hash = blake3::hash(content);
        Self(*hash.as_bytes())
    }

    pub fn from_source(content: &str) -> Self {
        Self::from_content(content.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn short_hex(&self) -> String {
        self.0[..8].iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Import edges between loaded files
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// File -> files it imports
    dependencies: DashMap<FileId, HashSet<FileId>>,

    /// File -> files that import it
    dependents: DashMap<FileId, HashSet<FileId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `importer` imports `imported`
    pub fn add_edge(&self, importer: FileId, imported: FileId) {
        if importer == imported {
            return;
        }
        self.dependencies.entry(importer).or_default().insert(imported);
        self.dependents.entry(imported).or_default().insert(importer);
    }

    pub fn dependents_of(&self, file: FileId) -> Vec<FileId> {
        let mut out: Vec<FileId> = self
            .dependents
            .get(&file)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    pub fn dependencies_of(&self, file: FileId) -> Vec<FileId> {
        let mut out: Vec<FileId> = self
            .dependencies
            .get(&file)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default();
        out.sort();
        out
    }

    /// All files whose results may depend on `changed`, including itself
    pub fn invalidate(&self, changed: &[FileId]) -> HashSet<FileId> {
        let mut invalid = HashSet::new();
        let mut worklist: Vec<FileId> = changed.to_vec();

        while let Some(id) = worklist.pop() {
            if invalid.insert(id) {
                if let Some(deps) = self.dependents.get(&id) {
                    worklist.extend(deps.iter());
                }
            }
        }

        invalid
    }

    /// Move every edge of `old` onto the snapshot `new`
    pub fn retarget(&self, old: FileId, new: FileId) {
        if let Some((_, deps)) = self.dependencies.remove(&old) {
            for dep in &deps {
                if let Some(mut back) = self.dependents.get_mut(dep) {
                    back.remove(&old);
                    back.insert(new);
                }
            }
            self.dependencies.insert(new, deps);
        }
        if let Some((_, importers)) = self.dependents.remove(&old) {
            for importer in &importers {
                if let Some(mut forward) = self.dependencies.get_mut(importer) {
                    forward.remove(&old);
                    forward.insert(new);
                }
            }
            self.dependents.insert(new, importers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash() {
        let hash1 = ContentHash::from_source("def foo(): pass");
        let hash2 = ContentHash::from_source("def foo(): pass");
        let hash3 = ContentHash::from_source("def bar(): pass");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.short_hex().len(), 16);
    }

    #[test]
    fn test_invalidate_follows_importers() {
        let graph = DependencyGraph::new();
        let (a, b, c, d) = (FileId(1), FileId(2), FileId(3), FileId(4));

        // c imports b, b imports a; d is unrelated
        graph.add_edge(b, a);
        graph.add_edge(c, b);
        graph.add_edge(d, c);

        let invalid = graph.invalidate(&[b]);
        assert_eq!(invalid.len(), 3);
        assert!(invalid.contains(&b));
        assert!(invalid.contains(&c));
        assert!(invalid.contains(&d));
        assert!(!invalid.contains(&a));
    }

    #[test]
    fn test_cycles_terminate() {
        let graph = DependencyGraph::new();
        graph.add_edge(FileId(1), FileId(2));
        graph.add_edge(FileId(2), FileId(1));
        assert_eq!(graph.invalidate(&[FileId(1)]).len(), 2);
    }

    #[test]
    fn test_retarget_moves_edges() {
        let graph = DependencyGraph::new();
        let (a, b, a2) = (FileId(1), FileId(2), FileId(3));
        graph.add_edge(b, a);

        graph.retarget(a, a2);

        assert_eq!(graph.dependents_of(a2), vec![b]);
        assert_eq!(graph.dependencies_of(b), vec![a2]);
        assert!(graph.dependents_of(a).is_empty());
        assert!(graph.dependencies_of(a).is_empty());
    }
}
