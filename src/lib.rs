//! Versioner - availability checking for C platform headers
//!
//! This crate compiles a tree of C headers once per (architecture, API
//! level) pair, merges the declarations it finds, checks that their
//! availability annotations are consistent, and cross-validates them against
//! the symbols the platform's libraries actually export.

pub mod core;
pub mod database;
pub mod header;
pub mod ops;
pub mod symbols;
pub mod util;

/// Test fixtures for versioner unit tests.
///
/// Only available when running tests. Provides builders for declarations,
/// databases and catalogs, plus helpers that lay out header and platform
/// trees on disk.
#[cfg(test)]
pub mod test_support;

pub use core::{
    Arch, Availability, CompilationType, Declaration, DeclarationLocation, TargetCatalog,
    VersionerError, VersionerResult,
};
pub use database::{DeclarationDatabase, PlatformSource, PlatformSymbolDatabase};
pub use header::{HeaderParser, SourceParser};
pub use ops::{run, VersionerOptions, VersionerOutcome};
