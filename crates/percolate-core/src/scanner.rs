//! Static extraction of class definitions and dependency directives.
//!
//! The scanner never looks past single lines: a class is anything following
//! `class ` on a line without a `#` before it, an inheritance dependency is the
//! same shape with `extends`, and the two `#= require` directive forms name a
//! symbol or a whole module. Text that doesn't match is silently ignored.

use regex::Regex;
use std::sync::LazyLock;

/// Default suffix of script module identifiers, without the leading dot
pub const DEFAULT_SOURCE_EXTENSION: &str = "coffee";

static CLASS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^#\n]*class[ \t]([A-Za-z_$-][A-Za-z0-9_$-]*)").expect("valid class pattern")
});

static EXTENDS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[^#\n]*extends[ \t]([A-Za-z_$-][A-Za-z0-9_$-]*)")
        .expect("valid extends pattern")
});

static SYMBOL_DIRECTIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)#=[ \t]*require[ \t]+([A-Za-z_$-][A-Za-z0-9_$-]*)")
        .expect("valid symbol directive pattern")
});

static MODULE_DIRECTIVE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)#=[ \t]*require[ \t]*<([A-Za-z_$-][A-Za-z0-9_$.-]*)>")
        .expect("valid module directive pattern")
});

/// Everything the scanner found in one module's text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Class names declared in the text, in order of appearance
    pub defined_symbols: Vec<String>,

    /// Symbols required from elsewhere, before filtering against local definitions
    pub symbol_dependencies: Vec<String>,

    /// Module names required via `#= require <Module>`, suffix stripped
    pub module_dependencies: Vec<String>,
}

/// Stateless extractor for definitions and `#= require` directives
#[derive(Debug, Clone)]
pub struct DependencyScanner {
    suffix: String,
}

impl Default for DependencyScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyScanner {
    pub fn new() -> Self {
        Self::with_extension(DEFAULT_SOURCE_EXTENSION)
    }

    /// Create a scanner for modules whose identifiers end in `.{extension}`
    pub fn with_extension(extension: &str) -> Self {
        let extension = extension.trim_start_matches('.');
        Self {
            suffix: format!(".{}", extension),
        }
    }

    /// Scan a module's text
    pub fn scan(&self, text: &str) -> ScanResult {
        ScanResult {
            defined_symbols: self.find_classes(text),
            symbol_dependencies: self.find_class_dependencies(text),
            module_dependencies: self.find_module_dependencies(text),
        }
    }

    /// Class names declared outside of comments
    pub fn find_classes(&self, text: &str) -> Vec<String> {
        capture_all(&CLASS_PATTERN, text)
    }

    /// Superclasses from `extends` clauses, then `#= require Symbol` directives
    pub fn find_class_dependencies(&self, text: &str) -> Vec<String> {
        let mut dependencies = capture_all(&EXTENDS_PATTERN, text);

        // An extends clause must not be read a second time as a directive
        let without_extends = EXTENDS_PATTERN.replace_all(text, "");
        dependencies.extend(capture_all(&SYMBOL_DIRECTIVE_PATTERN, &without_extends));

        dependencies
    }

    /// Module names from `#= require <Module>` directives
    pub fn find_module_dependencies(&self, text: &str) -> Vec<String> {
        capture_all(&MODULE_DIRECTIVE_PATTERN, text)
            .into_iter()
            .map(|name| self.strip_suffix(&name).to_string())
            .collect()
    }

    /// Remove every `#= require` directive, module form first
    pub fn strip_directives(&self, text: &str) -> String {
        let stripped = MODULE_DIRECTIVE_PATTERN.replace_all(text, "");
        SYMBOL_DIRECTIVE_PATTERN
            .replace_all(&stripped, "")
            .into_owned()
    }

    /// Drop the source suffix from an identifier, if present
    pub fn strip_suffix<'a>(&self, identifier: &'a str) -> &'a str {
        identifier
            .strip_suffix(self.suffix.as_str())
            .unwrap_or(identifier)
    }
}

fn capture_all(pattern: &Regex, text: &str) -> Vec<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_classes() {
        let scanner = DependencyScanner::new();
        let classes = scanner.find_classes("class Horse extends Animal\nclass Animal");
        assert_eq!(classes, vec!["Horse", "Animal"]);
    }

    #[test]
    fn test_classes_in_comments_are_ignored() {
        let scanner = DependencyScanner::new();
        let classes = scanner.find_classes("# class Hidden\nclass Visible\nx = 1 # class Trailing");
        assert_eq!(classes, vec!["Visible"]);
    }

    #[test]
    fn test_find_class_dependencies_for_superclasses() {
        let scanner = DependencyScanner::new();
        let deps = scanner.find_class_dependencies("class Horse extends Animal\nclass Animal");
        assert_eq!(deps, vec!["Animal"]);
    }

    #[test]
    fn test_find_class_dependencies_for_require_directive() {
        let scanner = DependencyScanner::new();
        let deps = scanner.find_class_dependencies("#= require ClassName");
        assert_eq!(deps, vec!["ClassName"]);
    }

    #[test]
    fn test_extends_before_directives() {
        let scanner = DependencyScanner::new();
        let deps =
            scanner.find_class_dependencies("#= require Helper\nclass Snake extends Animal\n");
        assert_eq!(deps, vec!["Animal", "Helper"]);
    }

    #[test]
    fn test_find_module_dependencies() {
        let scanner = DependencyScanner::new();
        let deps = scanner.find_module_dependencies("#= require <Filename.coffee>\n() ->  ");
        assert_eq!(deps, vec!["Filename"]);
    }

    #[test]
    fn test_find_module_dependencies_no_space() {
        let scanner = DependencyScanner::new();
        let deps = scanner.find_module_dependencies("#= require<Filename.coffee>");
        assert_eq!(deps, vec!["Filename"]);
    }

    #[test]
    fn test_find_module_dependencies_no_suffix() {
        let scanner = DependencyScanner::new();
        let deps = scanner.find_module_dependencies("#= require <Filename>\n() ->  ");
        assert_eq!(deps, vec!["Filename"]);
    }

    #[test]
    fn test_module_directive_is_not_a_symbol_directive() {
        let scanner = DependencyScanner::new();
        let result = scanner.scan("#= require <animal>\n");
        assert!(result.symbol_dependencies.is_empty());
        assert_eq!(result.module_dependencies, vec!["animal"]);
    }

    #[test]
    fn test_malformed_directives_are_ignored() {
        let scanner = DependencyScanner::new();
        let result = scanner.scan("#= require\n#= require <>\n#= requires\n");
        assert_eq!(result, ScanResult::default());
    }

    #[test]
    fn test_bare_directive_does_not_reach_the_next_line() {
        let scanner = DependencyScanner::new();
        let text = "#= require\nclass Foo\n#= require\n<animal>\n";

        let result = scanner.scan(text);
        assert_eq!(result.defined_symbols, vec!["Foo"]);
        assert!(result.symbol_dependencies.is_empty());
        assert!(result.module_dependencies.is_empty());
        assert_eq!(scanner.strip_directives(text), text);
    }

    #[test]
    fn test_class_name_must_be_on_the_same_line() {
        let scanner = DependencyScanner::new();
        assert!(scanner.find_classes("class\nFoo").is_empty());
        assert!(scanner.find_class_dependencies("x extends\nFoo").is_empty());
    }

    #[test]
    fn test_custom_extension() {
        let scanner = DependencyScanner::with_extension(".cs");
        assert_eq!(scanner.find_module_dependencies("#= require <util.cs>"), vec!["util"]);
        assert_eq!(scanner.strip_suffix("util.coffee"), "util.coffee");
    }

    #[test]
    fn test_strip_directives() {
        let scanner = DependencyScanner::new();
        let stripped =
            scanner.strip_directives("#= require <animal>\n#=require Snake\nclass Python\n");
        assert!(!stripped.contains("#= require"));
        assert!(!stripped.contains("#=require"));
        assert!(stripped.contains("class Python"));
    }
}
