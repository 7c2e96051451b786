//! High-level operations.
//!
//! Each stage of a versioner run lives in its own module; `versioner::run`
//! drives them in order.

pub mod compile;
pub mod dump;
pub mod sanity;
pub mod validate;
pub mod versioner;

pub use compile::{compile_headers, CompileOptions, DEFAULT_JOBS};
pub use dump::{
    dump_functions, dump_multiply_declared, dump_symbols, dump_variables, Dumps, ExportDump,
    SymbolDump,
};
pub use sanity::{sanity_check, SanityIssue, SanityReport};
pub use validate::{
    validate, Finding, ValidateOptions, ValidationIssue, ValidationMode, ValidationReport,
};
pub use versioner::{
    format_outcome, format_outcome_json, run, DumpOptions, OutputFormat, VersionerOptions,
    VersionerOutcome,
};
