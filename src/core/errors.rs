//! Fatal error types.
//!
//! Anything in here aborts a run: the inputs are malformed in a way that makes
//! further analysis meaningless. Recoverable findings are collected into
//! reports instead (see `ops::sanity` and `ops::validate`).

use std::path::PathBuf;

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::arch::Arch;
use crate::core::compilation::CompilationType;
use crate::core::declaration::{Availability, DeclarationLocation};

/// Convenience alias for results carrying a [`VersionerError`].
pub type VersionerResult<T> = Result<T, VersionerError>;

#[derive(Debug, Error, MietteDiagnostic)]
pub enum VersionerError {
    #[error("availability attribute mismatch for `{symbol}` at {location}: {existing} vs {found}")]
    #[diagnostic(
        code(versioner::header::availability_mismatch),
        help("the same declaration cannot carry two different availability annotations")
    )]
    AvailabilityMismatch {
        symbol: String,
        location: String,
        existing: Availability,
        found: Availability,
    },

    #[error("declaration `{symbol}` is a tentative definition ({location})")]
    #[diagnostic(
        code(versioner::header::tentative_definition),
        help("declare the variable `extern` or give it an initializer")
    )]
    TentativeDefinition { symbol: String, location: String },

    #[error("multiple definitions for `{symbol}` at {compilation_type}")]
    #[diagnostic(code(versioner::header::multiple_definitions))]
    MultipleDefinitions {
        symbol: String,
        compilation_type: CompilationType,
        locations: Vec<DeclarationLocation>,
    },

    #[error("{file}:{line}: {message}")]
    #[diagnostic(code(versioner::header::preprocessor))]
    Preprocessor {
        file: String,
        line: u32,
        message: String,
    },

    #[error("failed to read {}", path.display())]
    #[diagnostic(code(versioner::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {} as ELF: {message}", path.display())]
    #[diagnostic(code(versioner::symbols::elf))]
    Elf { path: PathBuf, message: String },

    #[error("unsupported architecture `{0}`")]
    #[diagnostic(code(versioner::catalog::unsupported_arch))]
    UnsupportedArch(Arch),

    #[error("unsupported API level {0}")]
    #[diagnostic(code(versioner::catalog::unsupported_api_level))]
    UnsupportedApiLevel(u32),

    #[error("invalid target catalog: {0}")]
    #[diagnostic(code(versioner::catalog::invalid))]
    InvalidCatalog(String),

    #[error("failed to start worker pool: {0}")]
    #[diagnostic(code(versioner::compile::worker_pool))]
    WorkerPool(String),
}

impl VersionerError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VersionerError::Io {
            path: path.into(),
            source,
        }
    }
}
