//! Filesystem search for importable modules
//!
//! Each search root is probed in order. Within one root an interface stub
//! (`.pyi`, or a file inside a `<pkg>-stubs` package) and an implementation
//! (`.py`, or a native extension) are looked up together, so a merged module
//! always pairs files from the same root.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Existence checks used while probing; lets in-memory buffers shadow disk files
pub trait FileProbe {
    fn is_file(&self, path: &Path) -> bool;
    fn is_dir(&self, path: &Path) -> bool;
}

/// Probe backed by the real filesystem plus a set of in-memory paths
#[derive(Debug, Default)]
pub struct OverlayProbe<'a> {
    overlays: Option<&'a HashSet<PathBuf>>,
}

impl<'a> OverlayProbe<'a> {
    pub fn new(overlays: &'a HashSet<PathBuf>) -> Self {
        Self { overlays: Some(overlays) }
    }

    pub fn disk() -> Self {
        Self { overlays: None }
    }
}

impl FileProbe for OverlayProbe<'_> {
    fn is_file(&self, path: &Path) -> bool {
        self.overlays.map_or(false, |o| o.contains(path)) || path.is_file()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
            || self
                .overlays
                .map_or(false, |o| o.iter().any(|p| p.starts_with(path) && p != path))
    }
}

/// Where a module's files were found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLocation {
    pub name: String,
    pub stub: Option<PathBuf>,
    pub implementation: Option<PathBuf>,
    /// Compiled extension file, when no Python implementation exists
    pub native: Option<PathBuf>,
    pub is_package: bool,
    /// Directories searched for submodules
    pub package_dirs: Vec<PathBuf>,
}

impl ModuleLocation {
    fn namespace(name: &str, dirs: Vec<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            stub: None,
            implementation: None,
            native: None,
            is_package: true,
            package_dirs: dirs,
        }
    }

    /// A directory without `__init__` spread over one or more roots
    pub fn is_namespace(&self) -> bool {
        self.stub.is_none() && self.implementation.is_none() && self.native.is_none()
    }

    fn has_files(&self) -> bool {
        !self.is_namespace()
    }
}

#[derive(Debug, Clone)]
pub struct ModuleFinder {
    roots: Vec<PathBuf>,
    stub_packages: bool,
}

impl ModuleFinder {
    pub fn new(roots: Vec<PathBuf>, stub_packages: bool) -> Self {
        Self { roots, stub_packages }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Locate the absolute module `name` (dotted)
    pub fn find(&self, name: &str, probe: &dyn FileProbe) -> Option<ModuleLocation> {
        let parts: Vec<&str> = name.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        self.find_in(&self.roots, &parts, name, self.stub_packages, probe)
    }

    /// Locate `name` below explicit directories, used for submodules of a package
    pub fn find_in_dirs(
        &self,
        dirs: &[PathBuf],
        child: &str,
        full_name: &str,
        probe: &dyn FileProbe,
    ) -> Option<ModuleLocation> {
        self.find_in(dirs, &[child], full_name, false, probe)
    }

    /// Resolve `from <dots><module> import ...` relative to the importing file
    pub fn find_relative(
        &self,
        importer: &Path,
        level: u32,
        module: Option<&str>,
        probe: &dyn FileProbe,
    ) -> Option<ModuleLocation> {
        let mut base = importer.parent()?.to_path_buf();
        for _ in 1..level {
            base = base.parent()?.to_path_buf();
        }

        match module {
            Some(module) => {
                let parts: Vec<&str> = module.split('.').collect();
                let name = match self.module_name_for(&base) {
                    Some(package) if !package.is_empty() => format!("{package}.{module}"),
                    _ => format!("{}/{}", base.display(), module),
                };
                self.find_in(std::slice::from_ref(&base), &parts, &name, false, probe)
            }
            None => {
                let name = self
                    .module_name_for(&base)
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| base.display().to_string());
                let stub = base.join("__init__.pyi");
                let implementation = base.join("__init__.py");
                let location = ModuleLocation {
                    name,
                    stub: probe.is_file(&stub).then_some(stub),
                    implementation: probe.is_file(&implementation).then_some(implementation),
                    native: None,
                    is_package: true,
                    package_dirs: vec![base.clone()],
                };
                (location.has_files() || probe.is_dir(&base)).then_some(location)
            }
        }
    }

    /// Dotted module name of a file or package directory below one of the roots
    pub fn module_name_for(&self, path: &Path) -> Option<String> {
        let relative = self
            .roots
            .iter()
            .filter_map(|root| path.strip_prefix(root).ok())
            .min_by_key(|rel| rel.components().count())?;

        let mut parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if let Some(last) = parts.last_mut() {
            if let Some(stem) = last.strip_suffix(".pyi").or_else(|| last.strip_suffix(".py")) {
                *last = stem.to_string();
            }
        }
        if parts.last().map_or(false, |l| l == "__init__") {
            parts.pop();
        }
        if let Some(first) = parts.first_mut() {
            if let Some(package) = first.strip_suffix("-stubs") {
                *first = package.to_string();
            }
        }
        Some(parts.join("."))
    }

    fn find_in(
        &self,
        roots: &[PathBuf],
        parts: &[&str],
        name: &str,
        stub_packages: bool,
        probe: &dyn FileProbe,
    ) -> Option<ModuleLocation> {
        let mut namespace_dirs = Vec::new();

        for root in roots {
            let location = probe_root(root, parts, name, stub_packages, probe);
            if location.has_files() {
                trace!(module = name, root = %root.display(), "module found");
                return Some(location);
            }
            let dir = parts.iter().fold(root.clone(), |dir, part| dir.join(part));
            if probe.is_dir(&dir) {
                namespace_dirs.push(dir);
            }
        }

        if namespace_dirs.is_empty() {
            None
        } else {
            Some(ModuleLocation::namespace(name, namespace_dirs))
        }
    }
}

fn probe_root(root: &Path, parts: &[&str], name: &str, stub_packages: bool, probe: &dyn FileProbe) -> ModuleLocation {
    let (last, parents) = match parts.split_last() {
        Some(split) => split,
        None => return ModuleLocation::namespace(name, Vec::new()),
    };
    let dir = parents.iter().fold(root.to_path_buf(), |dir, part| dir.join(part));
    let package = dir.join(last);

    let mut package_dirs = Vec::new();
    let mut is_package = false;

    let implementation = {
        let init = package.join("__init__.py");
        if probe.is_file(&init) {
            is_package = true;
            Some(init)
        } else {
            let module = dir.join(format!("{last}.py"));
            probe.is_file(&module).then_some(module)
        }
    };

    let mut stub = None;
    if stub_packages {
        let stubs_dir = parts[1..]
            .iter()
            .fold(root.join(format!("{}-stubs", parts[0])), |dir, part| dir.join(part));
        let init = stubs_dir.join("__init__.pyi");
        if probe.is_file(&init) {
            is_package = true;
            package_dirs.push(stubs_dir.clone());
            stub = Some(init);
        } else if parts.len() > 1 {
            let file = stubs_dir.with_extension("pyi");
            if probe.is_file(&file) {
                stub = Some(file);
            }
        }
    }
    if stub.is_none() {
        let init = package.join("__init__.pyi");
        if probe.is_file(&init) {
            is_package = true;
            stub = Some(init);
        } else {
            let module = dir.join(format!("{last}.pyi"));
            stub = probe.is_file(&module).then_some(module);
        }
    }

    let native = if implementation.is_none() {
        find_extension(&dir, last)
    } else {
        None
    };

    if is_package || probe.is_dir(&package) {
        package_dirs.insert(0, package);
    }

    ModuleLocation {
        name: name.to_string(),
        stub,
        implementation,
        native,
        is_package,
        package_dirs,
    }
}

/// `<name>.so`, `<name>.<tag>.so` or the `.pyd` equivalents
fn find_extension(dir: &Path, name: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    let mut found: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            let Some(rest) = file_name.strip_prefix(name) else {
                return false;
            };
            rest.starts_with('.') && (rest.ends_with(".so") || rest.ends_with(".pyd"))
        })
        .collect();
    found.sort();
    found.into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "").unwrap();
        path
    }

    #[test]
    fn test_plain_module_and_package() {
        let dir = TempDir::new().unwrap();
        let module = touch(dir.path(), "util.py");
        let init = touch(dir.path(), "pkg/__init__.py");
        let sub = touch(dir.path(), "pkg/sub.py");
        let finder = ModuleFinder::new(vec![dir.path().to_path_buf()], true);
        let probe = OverlayProbe::disk();

        let util = finder.find("util", &probe).unwrap();
        assert_eq!(util.implementation, Some(module));
        assert!(!util.is_package);

        let pkg = finder.find("pkg", &probe).unwrap();
        assert_eq!(pkg.implementation, Some(init));
        assert!(pkg.is_package);

        let sub_loc = finder.find("pkg.sub", &probe).unwrap();
        assert_eq!(sub_loc.implementation, Some(sub));
        assert!(finder.find("missing", &probe).is_none());
    }

    #[test]
    fn test_stub_next_to_implementation() {
        let dir = TempDir::new().unwrap();
        let implementation = touch(dir.path(), "lib.py");
        let stub = touch(dir.path(), "lib.pyi");
        let finder = ModuleFinder::new(vec![dir.path().to_path_buf()], true);
        let loc = finder.find("lib", &OverlayProbe::disk()).unwrap();
        assert_eq!(loc.stub, Some(stub));
        assert_eq!(loc.implementation, Some(implementation));
    }

    #[test]
    fn test_stub_package() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "fancy/__init__.py");
        let stub = touch(dir.path(), "fancy-stubs/__init__.pyi");
        let finder = ModuleFinder::new(vec![dir.path().to_path_buf()], true);
        let loc = finder.find("fancy", &OverlayProbe::disk()).unwrap();
        assert_eq!(loc.stub, Some(stub));
        assert!(loc.implementation.is_some());

        let without = ModuleFinder::new(vec![dir.path().to_path_buf()], false);
        assert!(without.find("fancy", &OverlayProbe::disk()).unwrap().stub.is_none());
    }

    #[test]
    fn test_root_order_and_namespace() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(first.path(), "ns/a.py");
        touch(second.path(), "ns/b.py");
        let winner = touch(first.path(), "dup.py");
        touch(second.path(), "dup.py");

        let finder = ModuleFinder::new(vec![first.path().to_path_buf(), second.path().to_path_buf()], true);
        let probe = OverlayProbe::disk();
        assert_eq!(finder.find("dup", &probe).unwrap().implementation, Some(winner));

        let ns = finder.find("ns", &probe).unwrap();
        assert!(ns.is_namespace());
        assert_eq!(ns.package_dirs.len(), 2);
        assert!(finder.find("ns.b", &probe).is_some());
    }

    #[test]
    fn test_native_extension() {
        let dir = TempDir::new().unwrap();
        let ext = touch(dir.path(), "_speedups.cpython-311-x86_64-linux-gnu.so");
        let finder = ModuleFinder::new(vec![dir.path().to_path_buf()], true);
        let loc = finder.find("_speedups", &OverlayProbe::disk()).unwrap();
        assert_eq!(loc.native, Some(ext));
        assert!(loc.implementation.is_none());
    }

    #[test]
    fn test_relative_and_module_names() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "app/__init__.py");
        let main = touch(dir.path(), "app/main.py");
        let helpers = touch(dir.path(), "app/helpers.py");
        let finder = ModuleFinder::new(vec![dir.path().to_path_buf()], true);
        let probe = OverlayProbe::disk();

        assert_eq!(finder.module_name_for(&main).as_deref(), Some("app.main"));
        assert_eq!(
            finder.module_name_for(&dir.path().join("app/__init__.py")).as_deref(),
            Some("app")
        );

        let loc = finder.find_relative(&main, 1, Some("helpers"), &probe).unwrap();
        assert_eq!(loc.implementation, Some(helpers));
        assert_eq!(loc.name, "app.helpers");

        let package = finder.find_relative(&main, 1, None, &probe).unwrap();
        assert_eq!(package.name, "app");
        assert!(package.is_package);
    }

    #[test]
    fn test_overlay_shadows_disk() {
        let dir = TempDir::new().unwrap();
        let buffer = dir.path().join("buffer.py");
        let mut overlays = HashSet::new();
        overlays.insert(buffer.clone());
        let finder = ModuleFinder::new(vec![dir.path().to_path_buf()], true);
        let loc = finder.find("buffer", &OverlayProbe::new(&overlays)).unwrap();
        assert_eq!(loc.implementation, Some(buffer));
    }
}
