pub mod cache;
pub mod compiler;
pub mod concat;
pub mod config;
pub mod di;
pub mod diagnostics;
pub mod errors;
pub mod fingerprint;
pub mod module;
pub mod resolver;
pub mod scanner;
pub mod source;

pub use cache::{CacheOptions, CompilationCache};
pub use compiler::{CompileError, CompileFailure, Compiler, PassthroughCompiler, ProcessCompiler};
pub use concat::{ConcatError, Concatenator};
pub use config::{CliOverrides, PercolateConfig};
pub use di::Container;
pub use diagnostics::{
    CollectingDiagnosticHandler, ConsoleDiagnosticHandler, Diagnostic, DiagnosticCode,
    DiagnosticHandler, DiagnosticLevel,
};
pub use errors::PercolateError;
pub use fingerprint::SourceFingerprints;
pub use module::ModuleDescriptor;
pub use resolver::{CyclicDependencyError, DependencyResolver};
pub use scanner::{DependencyScanner, ScanResult};
pub use source::{
    DirectorySource, MemorySource, ModuleEnumerator, SourceError, SourceProvider, VirtualFile,
};
