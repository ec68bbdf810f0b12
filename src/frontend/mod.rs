//! Frontend components
//!
//! Parser entry points wrapping rustpython-parser, and project configuration.

pub mod config;
pub mod parser;

pub use config::{Config, PythonVersion, UnknownPolicy};
pub use parser::{parse_file, parse_module};
