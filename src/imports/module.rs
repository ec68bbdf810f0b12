//! Module records
//!
//! A record is created the first time an import resolves and lives for the
//! rest of the session. It names the files backing the module: a stub and an
//! implementation are both kept so lookups can prefer the declared member and
//! fall back to the implementation for names the stub does not cover.

use crate::ast::FileId;
use crate::core::{CompiledId, ModuleId};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Source files on disk or registered buffers
    Source,
    /// Stubs shipped with the engine
    Bundled,
    /// Introspected through the native bridge
    Native,
    /// Package directory without `__init__`
    Namespace,
}

#[derive(Debug, Clone)]
pub struct ModuleRecord {
    pub name: String,
    pub origin: ModuleOrigin,
    pub stub: Option<FileId>,
    pub implementation: Option<FileId>,
    pub compiled: Option<CompiledId>,
    pub is_package: bool,
    pub package_dirs: Vec<PathBuf>,
    /// Path of the file the module was built from, stub first
    pub path: Option<PathBuf>,
}

impl ModuleRecord {
    pub fn new(name: impl Into<String>, origin: ModuleOrigin) -> Self {
        Self {
            name: name.into(),
            origin,
            stub: None,
            implementation: None,
            compiled: None,
            is_package: false,
            package_dirs: Vec::new(),
            path: None,
        }
    }

    /// Files whose top-level scope contributes members, in priority order
    pub fn files(&self) -> impl Iterator<Item = FileId> + '_ {
        self.stub.into_iter().chain(self.implementation)
    }
}

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    records: Vec<ModuleRecord>,
    by_name: HashMap<String, ModuleId>,
    by_file: HashMap<FileId, ModuleId>,
    /// Names known not to resolve
    missing: HashSet<String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: ModuleRecord) -> ModuleId {
        if let Some(&id) = self.by_name.get(&record.name) {
            return id;
        }
        let id = ModuleId(self.records.len() as u32);
        for file in record.files() {
            self.by_file.insert(file, id);
        }
        self.missing.remove(&record.name);
        self.by_name.insert(record.name.clone(), id);
        self.records.push(record);
        id
    }

    pub fn get(&self, id: ModuleId) -> &ModuleRecord {
        &self.records[id.0 as usize]
    }

    pub fn lookup(&self, name: &str) -> Option<ModuleId> {
        self.by_name.get(name).copied()
    }

    /// Module whose stub or implementation is `file`
    pub fn by_file(&self, file: FileId) -> Option<ModuleId> {
        self.by_file.get(&file).copied()
    }

    pub fn mark_missing(&mut self, name: &str) {
        self.missing.insert(name.to_string());
    }

    pub fn is_missing(&self, name: &str) -> bool {
        self.missing.contains(name)
    }

    /// Point records at the snapshot that replaced `old`
    pub fn retarget(&mut self, old: FileId, new: FileId) {
        let Some(id) = self.by_file.remove(&old) else {
            return;
        };
        let record = &mut self.records[id.0 as usize];
        if record.stub == Some(old) {
            record.stub = Some(new);
        }
        if record.implementation == Some(old) {
            record.implementation = Some(new);
        }
        self.by_file.insert(new, id);
    }

    /// Forget negative lookups, after a buffer is added or a file invalidated
    pub fn clear_missing(&mut self) {
        self.missing.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &ModuleRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| (ModuleId(i as u32), record))
    }
}
