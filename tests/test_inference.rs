use pysense::performance::Counter;
use pysense::{Config, FileId, NodeId, NodeKind, Session, ValueDescriptor, ValueKind};

fn session(source: &str) -> (Session, FileId) {
    let mut session = Session::new(Config::default());
    let file = session.add_source(None, source).unwrap();
    (session, file)
}

fn last_name(session: &Session, file: FileId, name: &str) -> NodeId {
    *session.tree(file).unwrap().find_names(name).last().unwrap()
}

fn names(values: &[ValueDescriptor]) -> Vec<&str> {
    values.iter().map(|v| v.name.as_str()).collect()
}

#[test]
fn test_call_result_folds_arithmetic() {
    let (mut session, file) = session("def f(x):\n    return x + 1\ny = f(5)\ny\n");
    let node = last_name(&session, file, "y");
    let values = session.infer(file, node).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].kind, ValueKind::Literal);
    assert_eq!(values[0].name, "6");
}

#[test]
fn test_branches_union() {
    let (mut session, file) = session("if flag:\n    v = 1\nelse:\n    v = 'one'\nv\n");
    let node = last_name(&session, file, "v");
    let values = session.infer(file, node).unwrap();
    let found = names(&values);
    assert_eq!(values.len(), 2);
    assert!(found.contains(&"1"));
    assert!(found.contains(&"\"one\""));
}

#[test]
fn test_each_call_site_gets_its_own_arguments() {
    let (mut session, file) = session("def ident(v):\n    return v\na = ident(1)\nb = ident('s')\na\nb\n");
    let a = last_name(&session, file, "a");
    let b = last_name(&session, file, "b");
    assert_eq!(names(&session.infer(file, a).unwrap()), vec!["1"]);
    assert_eq!(names(&session.infer(file, b).unwrap()), vec!["\"s\""]);
}

#[test]
fn test_recursion_terminates() {
    let source = "def fib(n):\n    if n < 2:\n        return n\n    return fib(n - 1) + fib(n - 2)\nr = fib(10)\nr\n";
    let (mut session, file) = session(source);
    let node = last_name(&session, file, "r");
    let values = session.infer(file, node).unwrap();
    assert!(names(&values).contains(&"10"));
}

#[test]
fn test_mutual_recursion_terminates_empty() {
    let (mut session, file) = session("def f():\n    return g()\ndef g():\n    return f()\nr = f()\nr\n");
    let node = last_name(&session, file, "r");
    assert!(session.infer(file, node).unwrap().is_empty());
}

#[test]
fn test_self_recursion_without_base_is_empty() {
    let (mut session, file) = session("def f():\n    return f()\nr = f()\nr\n");
    let node = last_name(&session, file, "r");
    assert!(session.infer(file, node).unwrap().is_empty());
}

fn call_with_text(session: &Session, file: FileId, text: &str) -> NodeId {
    let tree = session.tree(file).unwrap();
    tree.descendants(tree.root())
        .find(|&n| matches!(tree.kind(n), NodeKind::Call { .. }) && tree.text(n) == text)
        .unwrap()
}

fn many_calls_source() -> String {
    let calls: Vec<String> = (0..12).map(|i| format!("ident({i})")).collect();
    format!("def ident(v):\n    return v\nt = [{}]\nt\n", calls.join(", "))
}

#[test]
fn test_refused_execution_does_not_leak_into_later_queries() {
    let source = many_calls_source();

    let (mut fresh, file) = session(&source);
    let call = call_with_text(&fresh, file, "ident(11)");
    assert_eq!(names(&fresh.infer(file, call).unwrap()), vec!["11"]);

    let (mut session, file) = session(&source);
    let t = last_name(&session, file, "t");
    session.infer(file, t).unwrap();
    assert!(session.metrics().get_counter(Counter::ExecutionsRefused) > 0);

    let call = call_with_text(&session, file, "ident(11)");
    assert_eq!(names(&session.infer(file, call).unwrap()), vec!["11"]);
    assert_eq!(names(&session.infer(file, call).unwrap()), vec!["11"]);
}

#[test]
fn test_self_referential_assignment_is_empty() {
    let (mut session, file) = session("a = b\nb = a\na\n");
    let node = last_name(&session, file, "a");
    assert!(session.infer(file, node).unwrap().is_empty());
}

#[test]
fn test_containers_and_subscripts() {
    let source = "items = [1, 'two']\nfirst = items[0]\nd = {'k': 3.5}\nval = d['k']\nfirst\nval\n";
    let (mut session, file) = session(source);
    let first = last_name(&session, file, "first");
    let val = last_name(&session, file, "val");
    assert_eq!(names(&session.infer(file, first).unwrap()), vec!["1"]);
    assert_eq!(names(&session.infer(file, val).unwrap()), vec!["3.5"]);
}

#[test]
fn test_loop_target_iterates_elements() {
    let (mut session, file) = session("for item in (1, 2):\n    pass\nitem\n");
    let node = last_name(&session, file, "item");
    let found = session.infer(file, node).unwrap();
    assert_eq!(found.len(), 2);
    assert!(found.iter().all(|v| v.kind == ValueKind::Literal));
}

#[test]
fn test_builtin_call_returns_instance() {
    let (mut session, file) = session("n = len('abc')\nn\n");
    let node = last_name(&session, file, "n");
    let values = session.infer(file, node).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].kind, ValueKind::Instance);
    assert_eq!(values[0].name, "int");
}

#[test]
fn test_unresolved_name_is_empty() {
    let (mut session, file) = session("missing_thing\n");
    let node = last_name(&session, file, "missing_thing");
    assert!(session.infer(file, node).unwrap().is_empty());
}

#[test]
fn test_inference_is_deterministic() {
    let source = "class A:\n    def go(self):\n        return [self, 1]\nx = A().go()\nx\n";
    let mut runs = Vec::new();
    for _ in 0..3 {
        let (mut session, file) = session(source);
        let node = last_name(&session, file, "x");
        runs.push(session.infer(file, node).unwrap());
    }
    assert_eq!(runs[0], runs[1]);
    assert_eq!(runs[1], runs[2]);
}

#[test]
fn test_repeated_query_hits_cache() {
    let (mut session, file) = session("def f():\n    return 1\nz = f()\nz\n");
    let node = last_name(&session, file, "z");
    let first = session.infer(file, node).unwrap();
    let hits_before = session.cache_stats().hits;
    let second = session.infer(file, node).unwrap();
    assert_eq!(first, second);
    assert!(session.cache_stats().hits > hits_before);
}
