use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::diagnostics::{Diagnostic, DiagnosticHandler};
use crate::module::ModuleDescriptor;

/// A module (transitively) requires itself
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cyclic dependency: {}", .cycle.join(" -> "))]
pub struct CyclicDependencyError {
    /// Module names along the cycle, starting and ending with the same module
    pub cycle: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    InProgress,
    Done,
}

/// Orders modules so that every dependency precedes its dependents
///
/// One resolver serves a whole concatenation: its visit state is shared by
/// every root it resolves, so a module reachable from two roots is emitted
/// once, by whichever root reaches it first.
pub struct DependencyResolver<'a> {
    modules: &'a [ModuleDescriptor],
    /// First module (in input order) defining each symbol
    symbol_index: FxHashMap<&'a str, usize>,
    /// First module (in input order) carrying each name
    name_index: FxHashMap<&'a str, usize>,
    state: FxHashMap<&'a str, VisitState>,
    /// Names currently being resolved, outermost first
    path: Vec<&'a str>,
    diagnostics: Arc<dyn DiagnosticHandler>,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(modules: &'a [ModuleDescriptor], diagnostics: Arc<dyn DiagnosticHandler>) -> Self {
        let mut symbol_index = FxHashMap::default();
        let mut name_index = FxHashMap::default();

        for (i, module) in modules.iter().enumerate() {
            name_index.entry(module.name()).or_insert(i);
            for symbol in module.defined_symbols() {
                symbol_index.entry(symbol.as_str()).or_insert(i);
            }
        }

        Self {
            modules,
            symbol_index,
            name_index,
            state: FxHashMap::default(),
            path: Vec::new(),
            diagnostics,
        }
    }

    /// Resolve `root`, returning the modules not yet emitted by this resolver
    /// in an order where each appears after all of its dependencies
    ///
    /// A failed call leaves only completed modules marked, so the resolver
    /// stays usable for further roots.
    pub fn resolve(
        &mut self,
        root: &'a ModuleDescriptor,
    ) -> Result<Vec<&'a ModuleDescriptor>, CyclicDependencyError> {
        let mut ordered = Vec::new();
        if let Err(err) = self.visit(root, &mut ordered) {
            self.path.clear();
            self.state.retain(|_, state| *state == VisitState::Done);
            return Err(err);
        }
        Ok(ordered)
    }

    fn visit(
        &mut self,
        module: &'a ModuleDescriptor,
        ordered: &mut Vec<&'a ModuleDescriptor>,
    ) -> Result<(), CyclicDependencyError> {
        let name = module.name();
        let modules = self.modules;

        match self.state.get(name) {
            Some(VisitState::Done) => return Ok(()),
            Some(VisitState::InProgress) => return Err(self.cycle_to(name)),
            None => {}
        }

        if !module.has_dependencies() {
            self.emit(module, ordered);
            return Ok(());
        }

        self.state.insert(name, VisitState::InProgress);
        self.path.push(name);

        for symbol in module.symbol_dependencies() {
            match self.symbol_index.get(symbol.as_str()) {
                Some(&i) => self.visit(&modules[i], ordered)?,
                None => {
                    warn!("Couldn't find class {}, needed by {}", symbol, name);
                    self.diagnostics
                        .report(Diagnostic::missing_symbol(symbol, name));
                }
            }
        }

        for required in module.module_dependencies() {
            match self.name_index.get(required.as_str()) {
                Some(&i) => self.visit(&modules[i], ordered)?,
                None => {
                    warn!("Couldn't find file {}, required by file {}", required, name);
                    self.diagnostics
                        .report(Diagnostic::missing_module(required, name));
                }
            }
        }

        self.path.pop();
        self.emit(module, ordered);
        Ok(())
    }

    fn emit(&mut self, module: &'a ModuleDescriptor, ordered: &mut Vec<&'a ModuleDescriptor>) {
        debug!("Resolved module {}", module.name());
        self.state.insert(module.name(), VisitState::Done);
        ordered.push(module);
    }

    fn cycle_to(&self, name: &str) -> CyclicDependencyError {
        let start = self.path.iter().position(|n| *n == name).unwrap_or(0);
        let mut cycle: Vec<String> = self.path[start..].iter().map(|n| n.to_string()).collect();
        cycle.push(name.to_string());
        CyclicDependencyError { cycle }
    }
}
