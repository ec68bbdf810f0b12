use crate::ast::{lower_module, SyntaxTree};
use crate::errors::{InferError, Result};
use rustpython_parser::{parse, Mode};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Whether a path names an interface stub
pub fn is_stub_path(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "pyi")
}

/// Parse and lower one source buffer
#[instrument(skip(source), fields(len = source.len()))]
pub fn parse_module(source: &str, path: Option<&Path>) -> Result<SyntaxTree> {
    let display = path.map_or_else(|| "<string>".to_string(), |p| p.display().to_string());
    let module = parse(source, Mode::Module, &display).map_err(|e| InferError::Parse {
        path: path.map_or_else(|| PathBuf::from("<string>"), Path::to_path_buf),
        message: e.to_string(),
    })?;
    let is_stub = path.map_or(false, is_stub_path);
    Ok(lower_module(&module, source, path.map(Path::to_path_buf), is_stub))
}

/// Read, parse and lower a file from disk
pub fn parse_file(path: &Path) -> Result<(String, SyntaxTree)> {
    let source = std::fs::read_to_string(path).map_err(|e| InferError::io(path, e))?;
    let tree = parse_module(&source, Some(path))?;
    Ok((source, tree))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let tree = parse_module("x = 1 + 2", None).unwrap();
        assert!(!tree.is_stub());
        assert_eq!(tree.find_names("x").len(), 1);
    }

    #[test]
    fn test_parse_stub_path() {
        let tree = parse_module("def f() -> int: ...\n", Some(Path::new("m.pyi"))).unwrap();
        assert!(tree.is_stub());
        assert_eq!(tree.find_definitions("f").len(), 1);
    }

    #[test]
    fn test_parse_error() {
        let err = parse_module("def (:\n", Some(Path::new("bad.py"))).unwrap_err();
        match err {
            InferError::Parse { path, .. } => assert_eq!(path, PathBuf::from("bad.py")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
