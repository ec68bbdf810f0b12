use pysense::{Config, FileId, InferError, NodeId, Session};
use std::fs;
use tempfile::TempDir;

fn last_name(session: &Session, file: FileId, name: &str) -> NodeId {
    *session.tree(file).unwrap().find_names(name).last().unwrap()
}

fn inferred(session: &mut Session, file: FileId, node: NodeId) -> Vec<String> {
    session.infer(file, node).unwrap().into_iter().map(|v| v.name).collect()
}

#[test]
fn test_invalidate_drops_entries_and_recomputes() {
    let mut session = Session::new(Config::default());
    let file = session.add_source(None, "def f():\n    return 2\nv = f()\nv\n").unwrap();
    let node = last_name(&session, file, "v");

    let before = inferred(&mut session, file, node);
    assert!(session.cache_entries(file) > 0);

    session.invalidate_file(file).unwrap();
    assert_eq!(session.cache_entries(file), 0);

    let after = inferred(&mut session, file, node);
    assert_eq!(before, after);
    assert!(session.cache_entries(file) > 0);
}

#[test]
fn test_update_source_replaces_snapshot() {
    let mut session = Session::new(Config::default());
    let file = session.add_source(None, "x = 1\nx\n").unwrap();
    let node = last_name(&session, file, "x");
    assert_eq!(inferred(&mut session, file, node), vec!["1"]);

    let updated = session.update_source(file, "x = 'new'\nx\n").unwrap();
    assert_ne!(updated, file);
    assert!(matches!(session.tree(file), Err(InferError::UnknownFile(_))));

    let node = last_name(&session, updated, "x");
    assert_eq!(inferred(&mut session, updated, node), vec!["\"new\""]);
}

#[test]
fn test_module_created_later_is_found_after_invalidation() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("main.py"), "from later import VALUE\nVALUE\n").unwrap();

    let mut session = Session::new(Config::with_search_paths([dir.path()]));
    let main = session.load_file(&dir.path().join("main.py")).unwrap();
    let node = last_name(&session, main, "VALUE");
    assert!(inferred(&mut session, main, node).is_empty());

    fs::write(dir.path().join("later.py"), "VALUE = 7\n").unwrap();
    assert!(inferred(&mut session, main, node).is_empty());

    session.invalidate_file(main).unwrap();
    assert_eq!(inferred(&mut session, main, node), vec!["7"]);
}

#[test]
fn test_editing_dependency_invalidates_importer() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("conf.py"), "LEVEL = 1\n").unwrap();
    fs::write(dir.path().join("main.py"), "from conf import LEVEL\nLEVEL\n").unwrap();

    let mut session = Session::new(Config::with_search_paths([dir.path()]));
    let main = session.load_file(&dir.path().join("main.py")).unwrap();
    let node = last_name(&session, main, "LEVEL");
    assert_eq!(inferred(&mut session, main, node), vec!["1"]);

    session.add_source(Some(&dir.path().join("conf.py")), "LEVEL = 'debug'\n").unwrap();
    assert_eq!(inferred(&mut session, main, node), vec!["\"debug\""]);
}

#[test]
fn test_unchanged_source_keeps_cache() {
    let mut session = Session::new(Config::default());
    let file = session.add_source(None, "y = 3\ny\n").unwrap();
    let node = last_name(&session, file, "y");
    inferred(&mut session, file, node);
    let entries = session.cache_entries(file);

    let same = session.update_source(file, "y = 3\ny\n").unwrap();
    assert_eq!(same, file);
    assert_eq!(session.cache_entries(file), entries);
}

#[test]
fn test_invalidating_unknown_file_fails() {
    let mut session = Session::new(Config::default());
    let file = session.add_source(None, "pass\n").unwrap();
    let replaced = session.update_source(file, "z = 0\n").unwrap();
    assert_ne!(replaced, file);
    assert!(matches!(session.invalidate_file(file), Err(InferError::UnknownFile(_))));
}

#[test]
fn test_cancelled_query_reports_error() {
    let mut session = Session::new(Config::default());
    let file = session.add_source(None, "w = 1\nw\n").unwrap();
    let node = last_name(&session, file, "w");
    let token = session.cancel_token();
    token.cancel();
    assert!(matches!(session.infer(file, node), Err(InferError::Cancelled)));

    token.reset();
    assert_eq!(inferred(&mut session, file, node), vec!["1"]);
}
