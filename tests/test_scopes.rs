use pysense::{Config, FileId, NodeId, Session};

fn session(source: &str) -> (Session, FileId) {
    let mut session = Session::new(Config::default());
    let file = session.add_source(None, source).unwrap();
    (session, file)
}

fn name_at(session: &Session, file: FileId, name: &str, index: usize) -> NodeId {
    session.tree(file).unwrap().find_names(name)[index]
}

fn inferred(session: &mut Session, file: FileId, node: NodeId) -> Vec<String> {
    session.infer(file, node).unwrap().into_iter().map(|v| v.name).collect()
}

#[test]
fn test_function_local_shadows_module() {
    let (mut session, file) = session("x = 1\ndef f():\n    x = 's'\n    return x\nx\n");
    // x: module store, local store, return, module load
    let inner = name_at(&session, file, "x", 2);
    let outer = name_at(&session, file, "x", 3);
    assert_eq!(inferred(&mut session, file, inner), vec!["\"s\""]);
    assert_eq!(inferred(&mut session, file, outer), vec!["1"]);
}

#[test]
fn test_methods_skip_class_scope() {
    let (mut session, file) = session("y = 1\nclass K:\n    y = 'class'\n    def m(self):\n        return y\n");
    let in_method = name_at(&session, file, "y", 2);
    assert_eq!(inferred(&mut session, file, in_method), vec!["1"]);
}

#[test]
fn test_class_body_sees_its_own_names() {
    let (mut session, file) = session("z = 1\nclass K:\n    z = 'class'\n    w = z\n");
    let in_body = name_at(&session, file, "z", 2);
    assert_eq!(inferred(&mut session, file, in_body), vec!["\"class\""]);
}

#[test]
fn test_global_assignment_reaches_module() {
    let (mut session, file) = session("counter = 0\ndef bump():\n    global counter\n    counter = 'x'\ncounter\n");
    let nodes = session.tree(file).unwrap().find_names("counter");
    let values = inferred(&mut session, file, *nodes.last().unwrap());
    assert_eq!(values.len(), 2);
    assert!(values.contains(&"0".to_string()));
    assert!(values.contains(&"\"x\"".to_string()));
}

#[test]
fn test_nonlocal_assignment_reaches_enclosing_function() {
    let source = "def outer():\n    n = 0\n    def inner():\n        nonlocal n\n        n = 'one'\n    return n\nr = outer()\nr\n";
    let (mut session, file) = session(source);
    let nodes = session.tree(file).unwrap().find_names("r");
    let values = inferred(&mut session, file, *nodes.last().unwrap());
    assert!(values.contains(&"0".to_string()));
    assert!(values.contains(&"\"one\"".to_string()));
}

#[test]
fn test_closure_sees_enclosing_parameter() {
    let source = "def make(v):\n    def get():\n        return v\n    return get\ng = make(7)\nres = g()\nres\n";
    let (mut session, file) = session(source);
    let nodes = session.tree(file).unwrap().find_names("res");
    assert_eq!(inferred(&mut session, file, *nodes.last().unwrap()), vec!["7"]);
}

#[test]
fn test_comprehension_variable_does_not_leak() {
    let (mut session, file) = session("k = 'outer'\nsquares = [k for k in (1, 2)]\nk\n");
    let nodes = session.tree(file).unwrap().find_names("k");
    assert_eq!(inferred(&mut session, file, *nodes.last().unwrap()), vec!["\"outer\""]);
}

#[test]
fn test_builtins_resolve_after_module() {
    let (mut session, file) = session("print\n");
    let node = name_at(&session, file, "print", 0);
    let values = session.infer(file, node).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].name, "print");
}

#[test]
fn test_module_redefinition_of_builtin_wins() {
    let (mut session, file) = session("def len(x):\n    return 'mine'\nlen\n");
    let node = name_at(&session, file, "len", 0);
    let values = session.infer(file, node).unwrap();
    assert_eq!(values.len(), 1);
    assert!(values[0].declaration.as_ref().is_some_and(|d| d.file == file));
}
