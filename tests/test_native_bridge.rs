use pysense::compiled::{ConstantRepr, MemberSignature, ModuleSignature};
use pysense::{BridgeError, Config, FileId, NativeBridge, NodeId, NodeKind, Session, StaticBridge, ValueKind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn speedups() -> StaticBridge {
    StaticBridge::new().with_module(ModuleSignature::new(
        "_speedups",
        vec![
            MemberSignature::constant("VERSION", ConstantRepr::Int(3)),
            MemberSignature::function("encode", &["data", "level"]),
            MemberSignature::class("Encoder", vec![MemberSignature::function("flush", &[])]),
        ],
    ))
}

fn session_with(bridge: Arc<dyn NativeBridge>, source: &str) -> (Session, FileId) {
    let mut session = Session::new(Config::default()).with_bridge(Some(bridge));
    let file = session.add_source(None, source).unwrap();
    (session, file)
}

fn last_name(session: &Session, file: FileId, name: &str) -> NodeId {
    *session.tree(file).unwrap().find_names(name).last().unwrap()
}

/// Bridge whose runtime always dies
#[derive(Default)]
struct CrashingBridge {
    calls: AtomicUsize,
}

impl NativeBridge for CrashingBridge {
    fn introspect_module(&self, _name: &str, _paths: &[PathBuf]) -> Result<Arc<ModuleSignature>, BridgeError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(BridgeError::Crashed("exit status 139".to_string()))
    }

    fn describe(&self) -> String {
        "crashing".to_string()
    }
}

#[test]
fn test_compiled_constant_becomes_literal() {
    let (mut session, file) = session_with(Arc::new(speedups()), "from _speedups import VERSION\nVERSION\n");
    let node = last_name(&session, file, "VERSION");
    let values = session.infer(file, node).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].kind, ValueKind::Literal);
    assert_eq!(values[0].name, "3");
}

#[test]
fn test_compiled_function_and_signature() {
    let (mut session, file) = session_with(Arc::new(speedups()), "import _speedups\n_speedups.encode(b'x')\n");
    let tree = session.tree(file).unwrap();
    let call = tree
        .descendants(tree.root())
        .find(|&n| matches!(tree.kind(n), NodeKind::Call { .. }))
        .unwrap();
    let NodeKind::Call { func, .. } = tree.kind(call) else {
        unreachable!()
    };

    let callee = session.infer(file, *func).unwrap();
    assert_eq!(callee.len(), 1);
    assert_eq!(callee[0].kind, ValueKind::Compiled);
    assert!(callee[0].name.ends_with("encode"));

    let signatures = session.signatures(file, call).unwrap();
    assert_eq!(signatures.len(), 1);
    let params: Vec<&str> = signatures[0].params.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(params, vec!["data", "level"]);
    assert!(signatures[0].params.iter().all(|p| p.kind.is_none()));
}

#[test]
fn test_compiled_module_completions() {
    let (mut session, file) = session_with(Arc::new(speedups()), "import _speedups\n_speedups\n");
    let node = last_name(&session, file, "_speedups");
    let names: Vec<String> = session
        .attribute_completions(file, node, "")
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert!(names.contains(&"VERSION".to_string()));
    assert!(names.contains(&"encode".to_string()));
    assert!(names.contains(&"Encoder".to_string()));
}

#[test]
fn test_bridge_is_asked_once_per_module() {
    let bridge = Arc::new(speedups());
    let (mut session, file) = session_with(
        bridge.clone(),
        "import _speedups\nfrom _speedups import encode\n_speedups.VERSION\nencode\n",
    );
    let node = last_name(&session, file, "encode");
    session.infer(file, node).unwrap();
    let node = last_name(&session, file, "_speedups");
    session.infer(file, node).unwrap();
    assert_eq!(bridge.calls(), 1);
}

#[test]
fn test_missing_native_module_is_empty() {
    let (mut session, file) = session_with(Arc::new(speedups()), "import _absent\n_absent\n");
    let node = last_name(&session, file, "_absent");
    assert!(session.infer(file, node).unwrap().is_empty());
}

#[test]
fn test_crashed_runtime_yields_unknown_members() {
    let bridge = Arc::new(CrashingBridge::default());
    let (mut session, file) = session_with(bridge.clone(), "from _native import thing\nthing\n");
    let node = last_name(&session, file, "thing");
    let values = session.infer(file, node).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].kind, ValueKind::Unknown);
    assert_eq!(bridge.calls.load(Ordering::Relaxed), 1);
}

#[test]
fn test_no_bridge_leaves_native_imports_unresolved() {
    let mut session = Session::new(Config::default()).with_bridge(None);
    let file = session.add_source(None, "import _speedups\n_speedups\n").unwrap();
    let node = last_name(&session, file, "_speedups");
    assert!(session.infer(file, node).unwrap().is_empty());
}

#[cfg(unix)]
#[test]
fn test_configured_runtime_that_dies_degrades_to_unknown() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::TempDir::new().unwrap();
    let runtime = dir.path().join("broken-python");
    std::fs::write(&runtime, "#!/bin/sh\nexit 1\n").unwrap();
    let mut perms = std::fs::metadata(&runtime).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&runtime, perms).unwrap();

    let mut config = Config::default();
    config.project.native_runtime = Some(runtime);
    config.bridge.timeout_ms = 2000;
    let mut session = Session::new(config);
    let file = session.add_source(None, "import _native_only\n_native_only.attr\n").unwrap();
    let tree = session.tree(file).unwrap();
    let node = tree
        .descendants(tree.root())
        .find(|&n| matches!(tree.kind(n), NodeKind::Attribute { .. }))
        .unwrap();
    let values = session.infer(file, node).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].kind, ValueKind::Unknown);
}
