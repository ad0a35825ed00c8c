use crate::scanner::DependencyScanner;

/// One scanned module: its name, what it declares, and what it needs
///
/// Built fresh for every concatenation from freshly fetched text. All derived
/// lists come from `content` at construction time and never change afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDescriptor {
    name: String,
    defined_symbols: Vec<String>,
    symbol_dependencies: Vec<String>,
    module_dependencies: Vec<String>,
    content: String,
}

impl ModuleDescriptor {
    /// Scan `content` and describe the module identified by `identifier`
    ///
    /// The name is the identifier's last path segment without the scanner's
    /// source suffix. Symbols the module defines itself are dropped from its
    /// symbol dependencies.
    pub fn new(identifier: &str, content: impl Into<String>, scanner: &DependencyScanner) -> Self {
        let content = content.into();
        let scan = scanner.scan(&content);

        let symbol_dependencies = scan
            .symbol_dependencies
            .into_iter()
            .filter(|symbol| !scan.defined_symbols.contains(symbol))
            .collect();

        Self {
            name: scanner.strip_suffix(file_name(identifier)).to_string(),
            defined_symbols: scan.defined_symbols,
            symbol_dependencies,
            module_dependencies: scan.module_dependencies,
            content,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn defined_symbols(&self) -> &[String] {
        &self.defined_symbols
    }

    pub fn symbol_dependencies(&self) -> &[String] {
        &self.symbol_dependencies
    }

    pub fn module_dependencies(&self) -> &[String] {
        &self.module_dependencies
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn defines(&self, symbol: &str) -> bool {
        self.defined_symbols.iter().any(|s| s == symbol)
    }

    pub fn has_dependencies(&self) -> bool {
        !self.symbol_dependencies.is_empty() || !self.module_dependencies.is_empty()
    }
}

/// Last segment of a `/` or `\` separated identifier
pub(crate) fn file_name(identifier: &str) -> &str {
    identifier
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_definitions_are_not_dependencies() {
        let scanner = DependencyScanner::new();
        let module = ModuleDescriptor::new(
            "horse.coffee",
            "class Horse extends Animal\nclass Animal",
            &scanner,
        );

        assert_eq!(module.defined_symbols(), ["Horse", "Animal"]);
        assert!(module.symbol_dependencies().is_empty());
        assert!(!module.has_dependencies());
    }

    #[test]
    fn test_name_strips_directories_and_suffix() {
        let scanner = DependencyScanner::new();
        let unix = ModuleDescriptor::new("/WEB-INF/js/app/snake.coffee", "", &scanner);
        let windows = ModuleDescriptor::new(r"js\app\snake.coffee", "", &scanner);
        let bare = ModuleDescriptor::new("snake", "", &scanner);

        assert_eq!(unix.name(), "snake");
        assert_eq!(windows.name(), "snake");
        assert_eq!(bare.name(), "snake");
    }

    #[test]
    fn test_content_keeps_directives() {
        let scanner = DependencyScanner::new();
        let text = "#= require <animal>\nclass Snake extends Animal\n";
        let module = ModuleDescriptor::new("snake.coffee", text, &scanner);

        assert_eq!(module.content(), text);
        assert_eq!(module.module_dependencies(), ["animal"]);
        assert_eq!(module.symbol_dependencies(), ["Animal"]);
        assert!(module.defines("Snake"));
    }

    #[test]
    fn test_duplicate_definitions_are_preserved() {
        let scanner = DependencyScanner::new();
        let module = ModuleDescriptor::new("twice.coffee", "class A\nclass A\n", &scanner);
        assert_eq!(module.defined_symbols(), ["A", "A"]);
    }
}
