use thiserror::Error;

use crate::compiler::CompileError;
use crate::concat::ConcatError;
use crate::resolver::CyclicDependencyError;
use crate::source::SourceError;

/// Everything that can stop a build
#[derive(Debug, Error)]
pub enum PercolateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Cycle(#[from] CyclicDependencyError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl From<ConcatError> for PercolateError {
    fn from(err: ConcatError) -> Self {
        match err {
            ConcatError::Source(e) => PercolateError::Source(e),
            ConcatError::Cycle(e) => PercolateError::Cycle(e),
        }
    }
}
