//! Import resolution inside a session
//!
//! Order of precedence for an absolute name: modules already registered,
//! the bundled stubs, buffers and search roots (through [`ModuleFinder`]),
//! and finally the native bridge. A name that resolves nowhere is remembered
//! as missing until a buffer is registered or a file is invalidated.
//!
//! [`ModuleFinder`]: crate::imports::ModuleFinder

use crate::analysis::builtins::{bundled_path, bundled_source, bundled_tree};
use crate::analysis::Session;
use crate::ast::FileId;
use crate::compiled::BridgeError;
use crate::core::{CompiledId, ModuleId};
use crate::frontend::parse_file;
use crate::imports::{ModuleLocation, ModuleOrigin, ModuleRecord, OverlayProbe};
use crate::performance::incremental::ContentHash;
use crate::performance::metrics::Counter;
use std::path::Path;
use tracing::{debug, warn};

impl Session {
    /// Module for the absolute dotted `name`
    pub(crate) fn resolve_module(&mut self, name: &str) -> Option<ModuleId> {
        if let Some(id) = self.modules.lookup(name) {
            return Some(id);
        }
        if self.modules.is_missing(name) {
            return None;
        }
        if let Some(id) = self.load_bundled(name) {
            return Some(id);
        }

        let location = {
            let probe = OverlayProbe::new(&self.overlays);
            self.finder.find(name, &probe)
        };
        let resolved = match location {
            Some(location) => self.module_from_location(location),
            None => self.compiled_module(name).map(|compiled| self.native_record(name, compiled)),
        };

        if resolved.is_none() {
            self.modules.mark_missing(name);
            self.metrics.increment(Counter::ImportMisses);
            debug!(module = name, "import unresolved");
        }
        resolved
    }

    /// `from <dots><module> import ...` seen from `importer`
    pub(crate) fn resolve_relative(&mut self, importer: FileId, level: u32, module: Option<&str>) -> Option<ModuleId> {
        let path = self.path(importer)?.to_path_buf();
        let location = {
            let probe = OverlayProbe::new(&self.overlays);
            self.finder.find_relative(&path, level, module, &probe)
        };
        match location {
            Some(location) => self.module_from_location(location),
            None => {
                self.metrics.increment(Counter::ImportMisses);
                debug!(importer = %path.display(), level, module = ?module, "relative import unresolved");
                None
            }
        }
    }

    /// Target module of an `import` or `from ... import` statement
    pub(crate) fn resolve_import_target(
        &mut self,
        importer: FileId,
        module: Option<&str>,
        level: u32,
    ) -> Option<ModuleId> {
        let target = if level > 0 {
            self.resolve_relative(importer, level, module)
        } else {
            self.resolve_module(module?)
        }?;
        self.record_import(importer, target);
        Some(target)
    }

    /// Submodule `child` of package `parent`
    pub(crate) fn import_submodule(&mut self, parent: ModuleId, child: &str) -> Option<ModuleId> {
        let record = self.modules.get(parent);
        let full = format!("{}.{}", record.name, child);
        if let Some(id) = self.modules.lookup(&full) {
            return Some(id);
        }
        if self.modules.is_missing(&full) {
            return None;
        }
        let dirs = record.package_dirs.clone();
        let native_parent = record.compiled.is_some();

        let location = if dirs.is_empty() {
            None
        } else {
            let probe = OverlayProbe::new(&self.overlays);
            self.finder.find_in_dirs(&dirs, child, &full, &probe)
        };
        let resolved = match location {
            Some(location) => self.module_from_location(location),
            None if native_parent => self.compiled_module(&full).map(|compiled| self.native_record(&full, compiled)),
            None => None,
        };
        if resolved.is_none() {
            self.modules.mark_missing(&full);
        }
        resolved
    }

    /// Record that `importer`'s results depend on the files of `module`
    pub(crate) fn record_import(&mut self, importer: FileId, module: ModuleId) {
        let files: Vec<FileId> = self.modules.get(module).files().collect();
        for file in files {
            self.deps.add_edge(importer, file);
        }
    }

    fn module_from_location(&mut self, location: ModuleLocation) -> Option<ModuleId> {
        if let Some(id) = self.modules.lookup(&location.name) {
            return Some(id);
        }
        let stub = location.stub.as_deref().and_then(|p| self.load_module_file(p));
        let implementation = location.implementation.as_deref().and_then(|p| self.load_module_file(p));

        if stub.is_none() && implementation.is_none() && !location.is_namespace() {
            // Only a native extension, or every candidate file failed to parse
            location.native.as_ref()?;
            let compiled = self
                .compiled_module(&location.name)
                .unwrap_or_else(|| self.compiled.empty(&location.name));
            let id = self.native_record(&location.name, compiled);
            return Some(id);
        }

        let origin = if location.is_namespace() {
            ModuleOrigin::Namespace
        } else {
            ModuleOrigin::Source
        };
        let mut record = ModuleRecord::new(location.name.clone(), origin);
        record.stub = stub;
        record.implementation = implementation;
        record.is_package = location.is_package;
        record.path = location.stub.or(location.implementation);
        record.package_dirs = location.package_dirs;
        debug!(module = %record.name, stub = ?record.stub, implementation = ?record.implementation, "module registered");
        Some(self.modules.insert(record))
    }

    fn native_record(&mut self, name: &str, compiled: CompiledId) -> ModuleId {
        let mut record = ModuleRecord::new(name, ModuleOrigin::Native);
        record.compiled = Some(compiled);
        self.modules.insert(record)
    }

    /// Ask the bridge for `name`.
    ///
    /// `None` when there is no bridge or the runtime reports that the module
    /// does not exist. Any other failure yields an empty compiled module so
    /// its members read as Unknown.
    fn compiled_module(&mut self, name: &str) -> Option<CompiledId> {
        let bridge = self.bridge.clone()?;
        match bridge.introspect_module(name, self.finder.roots()) {
            Ok(signature) => Some(self.compiled.module(signature)),
            Err(BridgeError::Remote(message)) if is_missing_module(&message) => {
                debug!(module = name, %message, "native runtime cannot import module");
                None
            }
            Err(err) => {
                warn!(module = name, bridge = %bridge.describe(), error = %err, "introspection failed");
                self.metrics.increment(Counter::BridgeFailures);
                Some(self.compiled.empty(name))
            }
        }
    }

    fn load_module_file(&mut self, path: &Path) -> Option<FileId> {
        if let Some(&file) = self.paths.get(path) {
            return Some(file);
        }
        match parse_file(path) {
            Ok((source, tree)) => Some(self.insert_file(tree, ContentHash::from_source(&source), Some(path.to_path_buf()), false)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "imported file skipped");
                None
            }
        }
    }

    fn load_bundled(&mut self, name: &str) -> Option<ModuleId> {
        let source = bundled_source(name)?;
        let tree = bundled_tree(name)?;
        let path = bundled_path(name);
        let file = self.insert_file(tree, ContentHash::from_source(source), Some(path.clone()), true);
        let mut record = ModuleRecord::new(name, ModuleOrigin::Bundled);
        record.stub = Some(file);
        record.path = Some(path);
        Some(self.modules.insert(record))
    }
}

fn is_missing_module(message: &str) -> bool {
    message.starts_with("ModuleNotFoundError") || message.starts_with("ImportError")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::{MemberSignature, ModuleSignature, StaticBridge};
    use crate::frontend::Config;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn session_with_root(root: &Path) -> Session {
        Session::new(Config::with_search_paths([root]))
    }

    #[test]
    fn test_bundled_modules_take_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("typing.py"), "x = 1\n").unwrap();
        let mut session = session_with_root(dir.path());
        let id = session.resolve_module("typing").unwrap();
        assert_eq!(session.modules.get(id).origin, ModuleOrigin::Bundled);
    }

    #[test]
    fn test_stub_and_implementation_are_paired() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("m.py"), "def f():\n    return 'a'\n").unwrap();
        fs::write(dir.path().join("m.pyi"), "def f() -> int: ...\n").unwrap();
        let mut session = session_with_root(dir.path());
        let id = session.resolve_module("m").unwrap();
        let record = session.modules.get(id);
        assert!(record.stub.is_some());
        assert!(record.implementation.is_some());
    }

    #[test]
    fn test_missing_module_is_cached() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with_root(dir.path());
        assert!(session.resolve_module("nowhere").is_none());
        assert!(session.modules.is_missing("nowhere"));
        assert_eq!(session.metrics.get_counter(Counter::ImportMisses), 1);
        assert!(session.resolve_module("nowhere").is_none());
        assert_eq!(session.metrics.get_counter(Counter::ImportMisses), 1);
    }

    #[test]
    fn test_unparseable_module_is_unresolvable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.py"), "def (:\n").unwrap();
        let mut session = session_with_root(dir.path());
        assert!(session.resolve_module("broken").is_none());
    }

    #[test]
    fn test_bridge_fills_in_unfound_modules() {
        let dir = TempDir::new().unwrap();
        let bridge = StaticBridge::new().with_module(ModuleSignature::new(
            "_speedups",
            vec![MemberSignature::function("encode", &["data"])],
        ));
        let mut session = session_with_root(dir.path()).with_bridge(Some(Arc::new(bridge)));
        let id = session.resolve_module("_speedups").unwrap();
        assert_eq!(session.modules.get(id).origin, ModuleOrigin::Native);
        assert!(session.resolve_module("_absent").is_none());
    }

    #[test]
    fn test_submodule_lookup_through_package_dirs() {
        let dir = TempDir::new().unwrap();
        let pkg = dir.path().join("pkg");
        fs::create_dir(&pkg).unwrap();
        fs::write(pkg.join("__init__.py"), "").unwrap();
        fs::write(pkg.join("sub.py"), "y = 2\n").unwrap();
        let mut session = session_with_root(dir.path());
        let parent = session.resolve_module("pkg").unwrap();
        let child = session.import_submodule(parent, "sub").unwrap();
        assert_eq!(session.modules.get(child).name, "pkg.sub");
        assert!(session.import_submodule(parent, "absent").is_none());
    }

    #[test]
    fn test_overlay_buffer_is_importable() {
        let dir = TempDir::new().unwrap();
        let mut session = session_with_root(dir.path());
        assert!(session.resolve_module("fresh").is_none());
        let path = dir.path().join("fresh.py");
        let file = session.add_source(Some(&path), "z = 3\n").unwrap();
        let id = session.resolve_module("fresh").unwrap();
        assert_eq!(session.modules.get(id).implementation, Some(file));
    }
}
