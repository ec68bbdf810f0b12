use crate::errors::{InferError, Result};
use crate::performance::cache::ExecutionLimits;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// File names probed by [`Config::discover`], in order
pub const CONFIG_FILE_NAMES: &[&str] = &["pysense.toml", ".pysenserc"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub project: ProjectConfig,

    #[serde(default)]
    pub infer: InferConfig,

    #[serde(default)]
    pub bridge: BridgeConfig,

    #[serde(default)]
    pub log: LogSettings,

    /// Directory the configuration was loaded from; relative search paths resolve against it
    #[serde(skip)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Ordered import roots; entries may be glob patterns
    #[serde(default)]
    pub search_paths: Vec<String>,

    #[serde(default)]
    pub target_version: PythonVersion,

    /// Interpreter used by the native bridge
    #[serde(default)]
    pub native_runtime: Option<PathBuf>,

    /// Honour `<pkg>-stubs` directories
    #[serde(default = "default_true")]
    pub stub_packages: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferConfig {
    #[serde(default = "default_recursion_limit")]
    pub recursion_limit: usize,

    #[serde(default = "default_per_function_recursion_limit")]
    pub per_function_recursion_limit: usize,

    #[serde(default = "default_per_function_execution_limit")]
    pub per_function_execution_limit: usize,

    #[serde(default = "default_total_execution_limit")]
    pub total_execution_limit: usize,

    #[serde(default)]
    pub unknown_policy: UnknownPolicy,

    #[serde(default = "default_true")]
    pub follow_decorators: bool,
}

/// What to report when a result holds both known values and Unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownPolicy {
    /// Report every value, Unknown included
    #[default]
    Keep,
    /// Report only Unknown
    Collapse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_members")]
    pub max_members: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormatSetting,

    /// Log directory; stderr when absent
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormatSetting {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Language version used to decide `sys.version_info` checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
}

impl PythonVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for PythonVersion {
    fn default() -> Self {
        Self::new(3, 11)
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PythonVersion {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| format!("invalid python version '{s}'"))?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| format!("invalid python version '{s}'"))?,
            None => 0,
        };
        Ok(Self::new(major, minor))
    }
}

impl TryFrom<String> for PythonVersion {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PythonVersion> for String {
    fn from(version: PythonVersion) -> Self {
        version.to_string()
    }
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            target_version: PythonVersion::default(),
            native_runtime: None,
            stub_packages: true,
        }
    }
}

impl Default for InferConfig {
    fn default() -> Self {
        let limits = ExecutionLimits::default();
        Self {
            recursion_limit: limits.recursion_limit,
            per_function_recursion_limit: limits.per_function_recursion_limit,
            per_function_execution_limit: limits.per_function_execution_limit,
            total_execution_limit: limits.total_execution_limit,
            unknown_policy: UnknownPolicy::Keep,
            follow_decorators: true,
        }
    }
}

impl InferConfig {
    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            recursion_limit: self.recursion_limit,
            per_function_recursion_limit: self.per_function_recursion_limit,
            per_function_execution_limit: self.per_function_execution_limit,
            total_execution_limit: self.total_execution_limit,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: default_timeout_ms(),
            max_members: default_max_members(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormatSetting::Pretty,
            directory: None,
        }
    }
}

fn default_true() -> bool { true }
fn default_recursion_limit() -> usize { ExecutionLimits::default().recursion_limit }
fn default_per_function_recursion_limit() -> usize { ExecutionLimits::default().per_function_recursion_limit }
fn default_per_function_execution_limit() -> usize { ExecutionLimits::default().per_function_execution_limit }
fn default_total_execution_limit() -> usize { ExecutionLimits::default().total_execution_limit }
fn default_timeout_ms() -> u64 { 5000 }
fn default_max_members() -> usize { 2000 }
fn default_log_level() -> String { "info".to_string() }

impl Config {
    /// In-memory configuration over explicit search roots
    pub fn with_search_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut config = Self::default();
        config.project.search_paths = paths
            .into_iter()
            .map(|p| p.as_ref().to_string_lossy().into_owned())
            .collect();
        config
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| InferError::io(path, e))?;
        let mut config = Self::parse(&content)?;
        config.root = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| InferError::Config(e.to_string()))
    }

    /// Find and load configuration from the current directory or its parents
    pub fn discover() -> Self {
        std::env::current_dir()
            .ok()
            .and_then(|dir| Self::discover_from(&dir))
            .unwrap_or_default()
    }

    pub fn discover_from(start: &Path) -> Option<Self> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            for name in CONFIG_FILE_NAMES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    match Self::load(&candidate) {
                        Ok(config) => return Some(config),
                        Err(err) => tracing::warn!(path = %candidate.display(), error = %err, "ignoring invalid config"),
                    }
                }
            }
            current = dir.parent().map(Path::to_path_buf);
        }

        None
    }

    /// Search roots in priority order with globs expanded and relative entries anchored
    pub fn resolved_search_paths(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for entry in &self.project.search_paths {
            let anchored = match &self.root {
                Some(root) if Path::new(entry).is_relative() => root.join(entry),
                _ => PathBuf::from(entry),
            };
            let pattern = anchored.to_string_lossy().into_owned();
            if pattern.contains(|c| matches!(c, '*' | '?' | '[')) {
                match glob::glob(&pattern) {
                    Ok(paths) => {
                        let mut matched: Vec<PathBuf> =
                            paths.filter_map(|p| p.ok()).filter(|p| p.is_dir()).collect();
                        matched.sort();
                        out.extend(matched);
                    }
                    Err(err) => tracing::warn!(pattern = %pattern, error = %err, "invalid search path pattern"),
                }
            } else {
                out.push(anchored);
            }
        }
        out.dedup();
        out
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| InferError::Config(e.to_string()))?;
        fs::write(path, content).map_err(|e| InferError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.project.target_version, PythonVersion::new(3, 11));
        assert_eq!(config.infer.per_function_recursion_limit, 2);
        assert_eq!(config.infer.unknown_policy, UnknownPolicy::Keep);
        assert!(config.bridge.enabled);
        assert!(config.project.stub_packages);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[project]
search_paths = ["src", "lib"]
target_version = "3.8"

[infer]
total_execution_limit = 50
unknown_policy = "collapse"

[bridge]
timeout_ms = 250
"#;

        let config = Config::parse(toml).unwrap();
        assert_eq!(config.project.search_paths, vec!["src", "lib"]);
        assert_eq!(config.project.target_version, PythonVersion::new(3, 8));
        assert_eq!(config.infer.total_execution_limit, 50);
        assert_eq!(config.infer.recursion_limit, 400);
        assert_eq!(config.infer.unknown_policy, UnknownPolicy::Collapse);
        assert_eq!(config.bridge.timeout_ms, 250);
    }

    #[test]
    fn test_invalid_config_is_error() {
        let err = Config::parse("[project]\ntarget_version = \"three\"\n").unwrap_err();
        assert!(matches!(err, InferError::Config(_)));
    }

    #[test]
    fn test_version_ordering() {
        assert!(PythonVersion::new(3, 10) > PythonVersion::new(3, 9));
        assert_eq!("3".parse::<PythonVersion>().unwrap(), PythonVersion::new(3, 0));
    }

    #[test]
    fn test_discover_and_globs() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("vendor/a")).unwrap();
        fs::create_dir_all(temp.path().join("vendor/b")).unwrap();
        fs::create_dir_all(temp.path().join("src/deep")).unwrap();
        fs::write(
            temp.path().join("pysense.toml"),
            "[project]\nsearch_paths = [\"src\", \"vendor/*\"]\n",
        )
        .unwrap();

        let config = Config::discover_from(&temp.path().join("src/deep")).unwrap();
        let paths = config.resolved_search_paths();
        assert_eq!(
            paths,
            vec![
                temp.path().join("src"),
                temp.path().join("vendor/a"),
                temp.path().join("vendor/b"),
            ]
        );
    }

    #[test]
    fn test_save_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("pysense.toml");
        let mut config = Config::default();
        config.infer.follow_decorators = false;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert!(!loaded.infer.follow_decorators);
        assert_eq!(loaded.root.as_deref(), Some(temp.path()));
        assert!(Config::generate_default().contains("[infer]"));
    }
}
