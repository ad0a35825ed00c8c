//! Concatenation helpers for tests
//!
//! Build a concatenator wired to a [`MockDiagnosticHandler`] through the
//! container, the same way the command line tool wires its own.

use crate::mocks::MockDiagnosticHandler;
use percolate_core::cache::CompilationCache;
use percolate_core::concat::ConcatError;
use percolate_core::config::PercolateConfig;
use percolate_core::di::Container;
use percolate_core::source::SourceProvider;
use std::sync::Arc;

/// Container with default configuration and a collecting handler
pub fn test_container() -> (Container, Arc<MockDiagnosticHandler>) {
    let diagnostics = MockDiagnosticHandler::new();
    let container = Container::with_dependencies(
        PercolateConfig::default(),
        diagnostics.clone(),
        Arc::new(CompilationCache::default()),
    );
    (container, diagnostics)
}

/// Concatenate `roots` against `pool`, returning the output and whatever was reported
pub fn concatenate(
    roots: &[&str],
    pool: &[&str],
    source: &dyn SourceProvider,
) -> (Result<String, ConcatError>, Arc<MockDiagnosticHandler>) {
    let (container, diagnostics) = test_container();
    let roots: Vec<String> = roots.iter().map(|s| s.to_string()).collect();
    let pool: Vec<String> = pool.iter().map(|s| s.to_string()).collect();

    let result = container.concatenator().concatenate(&roots, &pool, source);
    (result, diagnostics)
}
