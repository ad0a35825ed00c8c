use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::resolver::CyclicDependencyError;

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
}

/// Stable identifiers for the findings the resolver reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticCode {
    /// No module defines a required symbol
    MissingSymbol,
    /// No module carries a required module name
    MissingModule,
    /// A bundle's modules require each other in a loop
    CyclicDependency,
}

impl DiagnosticCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticCode::MissingSymbol => "P0001",
            DiagnosticCode::MissingModule => "P0002",
            DiagnosticCode::CyclicDependency => "P0003",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diagnostic message attached to the module that triggered it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub module: Option<String>,
    pub code: Option<DiagnosticCode>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Warning, message)
    }

    fn with_level(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            module: None,
            code: None,
            message: message.into(),
        }
    }

    pub fn in_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_code(mut self, code: DiagnosticCode) -> Self {
        self.code = Some(code);
        self
    }

    /// A required symbol that no known module defines
    pub fn missing_symbol(symbol: &str, needed_by: &str) -> Self {
        Self::warning(format!(
            "Couldn't find class {}, needed by {}",
            symbol, needed_by
        ))
        .in_module(needed_by)
        .with_code(DiagnosticCode::MissingSymbol)
    }

    /// A required module name that no known module carries
    pub fn missing_module(module: &str, required_by: &str) -> Self {
        Self::warning(format!(
            "Couldn't find file {}, required by file {}",
            module, required_by
        ))
        .in_module(required_by)
        .with_code(DiagnosticCode::MissingModule)
    }

    /// A bundle that could not be ordered
    pub fn cyclic_dependency(cycle: &CyclicDependencyError, bundle: &str) -> Self {
        Self::error(format!("Error building {}: {}", bundle, cycle))
            .in_module(bundle)
            .with_code(DiagnosticCode::CyclicDependency)
    }
}

/// Trait for handling diagnostics
/// This allows for dependency injection and testing with mock handlers
pub trait DiagnosticHandler: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);

    fn error_count(&self) -> usize {
        count_level(&self.get_diagnostics(), DiagnosticLevel::Error)
    }

    fn warning_count(&self) -> usize {
        count_level(&self.get_diagnostics(), DiagnosticLevel::Warning)
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic>;
}

fn count_level(diagnostics: &[Diagnostic], level: DiagnosticLevel) -> usize {
    diagnostics.iter().filter(|d| d.level == level).count()
}

/// Console-based diagnostic handler that prints to stderr
pub struct ConsoleDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
    pretty: bool,
}

impl ConsoleDiagnosticHandler {
    pub fn new(pretty: bool) -> Self {
        Self {
            diagnostics: Mutex::new(Vec::new()),
            pretty,
        }
    }
}

impl DiagnosticHandler for ConsoleDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        let code_str = diagnostic
            .code
            .map(|c| format!(" [{}]", c))
            .unwrap_or_default();

        if self.pretty {
            let level_str = match diagnostic.level {
                DiagnosticLevel::Error => "\x1b[31merror\x1b[0m",
                DiagnosticLevel::Warning => "\x1b[33mwarning\x1b[0m",
            };
            eprintln!("{}{}: {}", level_str, code_str, diagnostic.message);
        } else {
            let level_str = match diagnostic.level {
                DiagnosticLevel::Error => "error",
                DiagnosticLevel::Warning => "warning",
            };
            eprintln!("{}{}: {}", level_str, code_str, diagnostic.message);
        }

        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Collecting diagnostic handler for testing
/// Collects all diagnostics without printing
#[derive(Default)]
pub struct CollectingDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl CollectingDiagnosticHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diagnostics carrying the given code
    pub fn with_code(&self, code: DiagnosticCode) -> Vec<Diagnostic> {
        self.get_diagnostics()
            .into_iter()
            .filter(|d| d.code == Some(code))
            .collect()
    }
}

impl DiagnosticHandler for CollectingDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_creation() {
        let diag = Diagnostic::error("Test error");

        assert_eq!(diag.level, DiagnosticLevel::Error);
        assert_eq!(diag.message, "Test error");
        assert!(diag.module.is_none());
    }

    #[test]
    fn test_missing_reference_diagnostics() {
        let symbol = Diagnostic::missing_symbol("Animal", "snake");
        assert_eq!(symbol.level, DiagnosticLevel::Warning);
        assert_eq!(symbol.code, Some(DiagnosticCode::MissingSymbol));
        assert_eq!(symbol.module.as_deref(), Some("snake"));
        assert!(symbol.message.contains("Animal"));

        let module = Diagnostic::missing_module("Filename", "main");
        assert_eq!(module.code, Some(DiagnosticCode::MissingModule));
        assert!(module.message.contains("Filename"));
    }

    #[test]
    fn test_cyclic_dependency_diagnostic() {
        let cycle = CyclicDependencyError {
            cycle: vec!["a".to_string(), "b".to_string(), "a".to_string()],
        };
        let diag = Diagnostic::cyclic_dependency(&cycle, "dist/app.js");

        assert_eq!(diag.level, DiagnosticLevel::Error);
        assert_eq!(diag.code, Some(DiagnosticCode::CyclicDependency));
        assert_eq!(
            diag.message,
            "Error building dist/app.js: Cyclic dependency: a -> b -> a"
        );
    }

    #[test]
    fn test_collecting_handler() {
        let handler = CollectingDiagnosticHandler::new();

        handler.report(Diagnostic::error("Error 1"));
        handler.report(Diagnostic::missing_symbol("Animal", "snake"));
        handler.report(Diagnostic::error("Error 2"));

        assert_eq!(handler.error_count(), 2);
        assert_eq!(handler.warning_count(), 1);
        assert_eq!(handler.with_code(DiagnosticCode::MissingSymbol).len(), 1);
        assert_eq!(handler.get_diagnostics().len(), 3);
    }

    #[test]
    fn test_warnings_are_not_errors() {
        let handler = CollectingDiagnosticHandler::new();

        handler.report(Diagnostic::missing_module("util", "main"));

        assert_eq!(handler.error_count(), 0);
        assert_eq!(handler.warning_count(), 1);
    }
}
