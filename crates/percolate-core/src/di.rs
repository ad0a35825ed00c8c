use crate::cache::CompilationCache;
use crate::concat::Concatenator;
use crate::config::PercolateConfig;
use crate::diagnostics::{ConsoleDiagnosticHandler, DiagnosticHandler};
use crate::scanner::DependencyScanner;
use crate::source::DirectorySource;
use std::sync::Arc;

/// Dependency injection container
/// Owns the shared configuration, diagnostics and compilation cache, and builds
/// the per-build collaborators from them
pub struct Container {
    config: Arc<PercolateConfig>,
    diagnostic_handler: Arc<dyn DiagnosticHandler>,
    cache: Arc<CompilationCache>,
}

impl Container {
    /// Create a new container with production dependencies
    pub fn new(config: PercolateConfig) -> Self {
        let config = Arc::new(config);
        let diagnostic_handler = Arc::new(ConsoleDiagnosticHandler::new(config.pretty));
        let cache = Arc::new(CompilationCache::new(&config.cache));

        Container {
            config,
            diagnostic_handler,
            cache,
        }
    }

    /// Create a container with custom dependencies (for testing)
    pub fn with_dependencies(
        config: PercolateConfig,
        diagnostic_handler: Arc<dyn DiagnosticHandler>,
        cache: Arc<CompilationCache>,
    ) -> Self {
        Container {
            config: Arc::new(config),
            diagnostic_handler,
            cache,
        }
    }

    pub fn config(&self) -> &Arc<PercolateConfig> {
        &self.config
    }

    pub fn diagnostic_handler(&self) -> &Arc<dyn DiagnosticHandler> {
        &self.diagnostic_handler
    }

    pub fn cache(&self) -> &Arc<CompilationCache> {
        &self.cache
    }

    /// Scanner for the configured source extension
    pub fn scanner(&self) -> DependencyScanner {
        DependencyScanner::with_extension(&self.config.source_extension)
    }

    /// Concatenator reporting to this container's diagnostics
    pub fn concatenator(&self) -> Concatenator {
        Concatenator::new(self.scanner(), self.diagnostic_handler.clone())
    }

    /// Modules under the configured source root
    pub fn source(&self) -> DirectorySource {
        DirectorySource::new(&self.config.source_root)
    }

    pub fn error_count(&self) -> usize {
        self.diagnostic_handler.error_count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostic_handler.warning_count()
    }
}
