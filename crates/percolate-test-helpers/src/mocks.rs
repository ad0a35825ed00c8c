//! Mock implementations for testing

use percolate_core::compiler::{CompileFailure, Compiler};
use percolate_core::diagnostics::{Diagnostic, DiagnosticHandler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock diagnostic handler that collects diagnostics
#[derive(Debug, Default)]
pub struct MockDiagnosticHandler {
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl MockDiagnosticHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Messages of everything reported so far
    pub fn messages(&self) -> Vec<String> {
        self.get_diagnostics()
            .into_iter()
            .map(|d| d.message)
            .collect()
    }
}

impl DiagnosticHandler for MockDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics.lock().unwrap().push(diagnostic);
    }

    fn get_diagnostics(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().unwrap().clone()
    }
}

/// Uppercases its input and counts calls across every clone
#[derive(Debug, Clone, Default)]
pub struct CountingCompiler {
    calls: Arc<AtomicUsize>,
    delay: Option<Duration>,
}

impl CountingCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every compilation
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Shared counter, for handing clones to other threads
    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Compiler for CountingCompiler {
    fn compile(&mut self, source: &str) -> Result<String, CompileFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(source.to_uppercase())
    }
}

/// Always fails with the same message
#[derive(Debug, Clone)]
pub struct FailingCompiler {
    message: String,
}

impl FailingCompiler {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Compiler for FailingCompiler {
    fn compile(&mut self, _source: &str) -> Result<String, CompileFailure> {
        Err(CompileFailure::new(self.message.clone()))
    }
}

/// Panics on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct PanickingCompiler;

impl Compiler for PanickingCompiler {
    fn compile(&mut self, _source: &str) -> Result<String, CompileFailure> {
        panic!("compiler crashed")
    }
}
