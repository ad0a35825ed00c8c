use indexmap::{IndexMap, IndexSet};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::diagnostics::DiagnosticHandler;
use crate::module::ModuleDescriptor;
use crate::resolver::{CyclicDependencyError, DependencyResolver};
use crate::scanner::DependencyScanner;
use crate::source::{SourceError, SourceProvider};

#[derive(Debug, Error)]
pub enum ConcatError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Cycle(#[from] CyclicDependencyError),
}

/// Joins root modules and everything they need into one dependency-ordered text
pub struct Concatenator {
    scanner: DependencyScanner,
    diagnostics: Arc<dyn DiagnosticHandler>,
}

impl Concatenator {
    pub fn new(scanner: DependencyScanner, diagnostics: Arc<dyn DiagnosticHandler>) -> Self {
        Self {
            scanner,
            diagnostics,
        }
    }

    pub fn scanner(&self) -> &DependencyScanner {
        &self.scanner
    }

    /// Fetch and scan every root and pool module, then emit the roots in the
    /// given order, each preceded by its not-yet-emitted dependencies
    ///
    /// Pool modules nothing reaches are left out. The result carries no
    /// `#= require` directives.
    pub fn concatenate(
        &self,
        roots: &[String],
        pool: &[String],
        source: &dyn SourceProvider,
    ) -> Result<String, ConcatError> {
        let modules = self.describe(roots, pool, source)?;
        let descriptors: Vec<ModuleDescriptor> = modules.into_values().collect();

        let mut resolver = DependencyResolver::new(&descriptors, self.diagnostics.clone());
        let mut ordered = Vec::new();

        for root in roots {
            let name = self.scanner.strip_suffix(crate::module::file_name(root));
            let Some(module) = descriptors.iter().find(|m| m.name() == name) else {
                continue;
            };
            ordered.extend(resolver.resolve(module)?);
        }

        info!(
            "Concatenated {} of {} module(s) from {} root(s)",
            ordered.len(),
            descriptors.len(),
            roots.len()
        );

        let joined = ordered
            .iter()
            .map(|m| m.content())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(self.scanner.strip_directives(&joined))
    }

    /// One descriptor per distinct module name, in input order (roots first)
    fn describe(
        &self,
        roots: &[String],
        pool: &[String],
        source: &dyn SourceProvider,
    ) -> Result<IndexMap<String, ModuleDescriptor>, SourceError> {
        let ids: IndexSet<&String> = roots.iter().chain(pool).collect();
        let mut modules = IndexMap::with_capacity(ids.len());

        for id in ids {
            let text = source.read(id)?;
            let module = ModuleDescriptor::new(id, text, &self.scanner);
            debug!(
                "Scanned {}: classes {:?}, needs {:?}, requires {:?}",
                id,
                module.defined_symbols(),
                module.symbol_dependencies(),
                module.module_dependencies()
            );

            if modules.contains_key(module.name()) {
                debug!("Skipping {}: module {} already known", id, module.name());
                continue;
            }
            modules.insert(module.name().to_string(), module);
        }

        Ok(modules)
    }
}
