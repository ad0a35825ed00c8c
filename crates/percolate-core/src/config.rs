use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

use crate::cache::CacheOptions;
use crate::compiler::ProcessCompiler;
use crate::errors::PercolateError;
use crate::scanner::DEFAULT_SOURCE_EXTENSION;

/// Default project file name
pub const CONFIG_FILE_NAME: &str = "percolate.yaml";

/// External compiler invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerCommand {
    /// Program to run (default: coffee)
    #[serde(default = "default_command")]
    pub command: String,

    /// Arguments; the source arrives on stdin (default: --stdio --print --bare)
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

fn default_command() -> String {
    "coffee".to_string()
}

fn default_args() -> Vec<String> {
    vec![
        "--stdio".to_string(),
        "--print".to_string(),
        "--bare".to_string(),
    ]
}

impl Default for CompilerCommand {
    fn default() -> Self {
        Self {
            command: default_command(),
            args: default_args(),
        }
    }
}

impl CompilerCommand {
    pub fn to_compiler(&self) -> ProcessCompiler {
        ProcessCompiler::new(self.command.clone(), self.args.clone())
    }
}

/// Concatenated output built from a root module and a pool of candidates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleOptions {
    /// Pattern naming the root module(s), relative to the source root
    pub root: String,

    /// Pattern naming every module that may satisfy a dependency
    pub include: String,

    /// File the compiled bundle is written to
    pub out_file: String,
}

/// Project configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PercolateConfig {
    /// Directory module identifiers are relative to (default: .)
    #[serde(default = "default_source_root")]
    pub source_root: String,

    /// Suffix of module files, without the dot (default: coffee)
    #[serde(
        default = "default_source_extension",
        deserialize_with = "deserialize_extension"
    )]
    pub source_extension: String,

    /// Patterns of modules compiled one file at a time
    #[serde(default)]
    pub files: Vec<String>,

    /// Optional bundle
    #[serde(default)]
    pub bundle: Option<BundleOptions>,

    /// Output directory for individually compiled files
    #[serde(default)]
    pub out_dir: Option<String>,

    #[serde(default)]
    pub compiler: CompilerCommand,

    #[serde(default)]
    pub cache: CacheOptions,

    /// Pretty-print diagnostics (default: true)
    #[serde(default = "default_true")]
    pub pretty: bool,
}

fn default_source_root() -> String {
    ".".to_string()
}

fn default_source_extension() -> String {
    DEFAULT_SOURCE_EXTENSION.to_string()
}

/// Strip the leading dot a module suffix may be written with
pub fn normalize_extension(extension: &str) -> String {
    extension.trim_start_matches('.').to_string()
}

fn deserialize_extension<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(|ext| normalize_extension(&ext))
}

fn default_true() -> bool {
    true
}

impl Default for PercolateConfig {
    fn default() -> Self {
        Self {
            source_root: default_source_root(),
            source_extension: default_source_extension(),
            files: Vec::new(),
            bundle: None,
            out_dir: None,
            compiler: CompilerCommand::default(),
            cache: CacheOptions::default(),
            pretty: true,
        }
    }
}

/// Values given on the command line, each overriding the file when set
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub source_root: Option<String>,
    pub source_extension: Option<String>,
    pub files: Option<Vec<String>>,
    pub bundle_root: Option<String>,
    pub bundle_include: Option<String>,
    pub bundle_out_file: Option<String>,
    pub out_dir: Option<String>,
    pub compiler_command: Option<String>,
    pub compiler_args: Option<Vec<String>>,
    pub cache_max_entries: Option<usize>,
    pub cache_time_to_live_secs: Option<u64>,
    pub pretty: Option<bool>,
}

impl PercolateConfig {
    /// Load configuration from a YAML file, or JSON when the extension is `.json`
    pub fn from_file(path: &Path) -> Result<Self, PercolateError> {
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(&content).map_err(|e| PercolateError::ConfigError(e.to_string()))
        } else {
            serde_yaml::from_str(&content).map_err(|e| PercolateError::ConfigError(e.to_string()))
        }
    }

    /// Write a starter configuration to a file
    pub fn init_file(path: &Path) -> Result<(), PercolateError> {
        let config = PercolateConfig {
            files: vec!["src/**/*.coffee".to_string()],
            bundle: Some(BundleOptions {
                root: "src/main.coffee".to_string(),
                include: "src/**/*.coffee".to_string(),
                out_file: "dist/app.js".to_string(),
            }),
            out_dir: Some("dist".to_string()),
            ..PercolateConfig::default()
        };
        let yaml =
            serde_yaml::to_string(&config).map_err(|e| PercolateError::ConfigError(e.to_string()))?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Apply command-line overrides on top of this configuration
    ///
    /// A bundle needs all three of root, include and out file; partial bundle
    /// flags only replace the fields they name on an existing bundle.
    pub fn merge(&mut self, overrides: &CliOverrides) {
        if let Some(ref root) = overrides.source_root {
            self.source_root = root.clone();
        }
        if let Some(ref ext) = overrides.source_extension {
            self.source_extension = normalize_extension(ext);
        }
        if let Some(ref files) = overrides.files {
            self.files = files.clone();
        }
        if let Some(ref out_dir) = overrides.out_dir {
            self.out_dir = Some(out_dir.clone());
        }
        if let Some(ref command) = overrides.compiler_command {
            self.compiler.command = command.clone();
        }
        if let Some(ref args) = overrides.compiler_args {
            self.compiler.args = args.clone();
        }
        if let Some(max) = overrides.cache_max_entries {
            self.cache.max_entries = max;
        }
        if let Some(ttl) = overrides.cache_time_to_live_secs {
            self.cache.time_to_live_secs = ttl;
        }
        if let Some(pretty) = overrides.pretty {
            self.pretty = pretty;
        }

        match (
            &overrides.bundle_root,
            &overrides.bundle_include,
            &overrides.bundle_out_file,
        ) {
            (Some(root), Some(include), Some(out_file)) => {
                self.bundle = Some(BundleOptions {
                    root: root.clone(),
                    include: include.clone(),
                    out_file: out_file.clone(),
                });
            }
            (root, include, out_file) => {
                if let Some(bundle) = self.bundle.as_mut() {
                    if let Some(root) = root {
                        bundle.root = root.clone();
                    }
                    if let Some(include) = include {
                        bundle.include = include.clone();
                    }
                    if let Some(out_file) = out_file {
                        bundle.out_file = out_file.clone();
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = PercolateConfig::default();
        assert_eq!(config.source_extension, "coffee");
        assert_eq!(config.cache.max_entries, 100);
        assert_eq!(config.cache.time_to_live_secs, 600);
        assert_eq!(config.compiler.command, "coffee");
        assert!(config.bundle.is_none());
        assert!(config.pretty);
    }

    #[test]
    fn test_deserialize_yaml() {
        let yaml = r#"
sourceRoot: web
bundle:
  root: js/main.coffee
  include: js/**/*.coffee
  outFile: dist/app.js
cache:
  maxEntries: 5
"#;
        let config: PercolateConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.source_root, "web");
        let bundle = config.bundle.unwrap();
        assert_eq!(bundle.include, "js/**/*.coffee");
        assert_eq!(config.cache.max_entries, 5);
        assert_eq!(config.cache.time_to_live_secs, 600);
    }

    #[test]
    fn test_deserialize_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("percolate.json");
        std::fs::write(
            &path,
            r#"{ "sourceExtension": "cs", "compiler": { "command": "cat", "args": [] } }"#,
        )
        .unwrap();

        let config = PercolateConfig::from_file(&path).unwrap();
        assert_eq!(config.source_extension, "cs");
        assert_eq!(config.compiler.command, "cat");
        assert!(config.compiler.args.is_empty());
    }

    #[test]
    fn test_file_extension_loses_leading_dot() {
        let dir = TempDir::new().unwrap();
        let yaml = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&yaml, "sourceExtension: .coffee\n").unwrap();
        let json = dir.path().join("percolate.json");
        std::fs::write(&json, r#"{ "sourceExtension": ".cs" }"#).unwrap();

        assert_eq!(PercolateConfig::from_file(&yaml).unwrap().source_extension, "coffee");
        assert_eq!(PercolateConfig::from_file(&json).unwrap().source_extension, "cs");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "cache: [1, 2").unwrap();

        assert!(matches!(
            PercolateConfig::from_file(&path),
            Err(PercolateError::ConfigError(_))
        ));
    }

    #[test]
    fn test_init_file_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        PercolateConfig::init_file(&path).unwrap();
        let config = PercolateConfig::from_file(&path).unwrap();

        assert_eq!(config.bundle.unwrap().out_file, "dist/app.js");
        assert_eq!(config.out_dir.as_deref(), Some("dist"));
    }

    #[test]
    fn test_merge_overrides() {
        let mut config = PercolateConfig::default();
        config.merge(&CliOverrides {
            source_extension: Some(".cs".to_string()),
            bundle_root: Some("main.cs".to_string()),
            bundle_include: Some("**/*.cs".to_string()),
            bundle_out_file: Some("app.js".to_string()),
            cache_max_entries: Some(3),
            ..CliOverrides::default()
        });

        assert_eq!(config.source_extension, "cs");
        assert_eq!(config.bundle.as_ref().unwrap().root, "main.cs");
        assert_eq!(config.cache.max_entries, 3);
    }

    #[test]
    fn test_partial_bundle_override_needs_existing_bundle() {
        let mut config = PercolateConfig::default();
        let overrides = CliOverrides {
            bundle_out_file: Some("other.js".to_string()),
            ..CliOverrides::default()
        };

        config.merge(&overrides);
        assert!(config.bundle.is_none());

        config.bundle = Some(BundleOptions {
            root: "main.coffee".to_string(),
            include: "**/*.coffee".to_string(),
            out_file: "app.js".to_string(),
        });
        config.merge(&overrides);
        assert_eq!(config.bundle.unwrap().out_file, "other.js");
    }
}
