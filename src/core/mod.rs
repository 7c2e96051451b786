//! Core data structures for versioner.
//!
//! This module contains the foundational types used throughout the crate:
//! - Architectures and the target catalog
//! - Compilation types and the compilation matrix
//! - Declarations, locations and availability metadata
//! - Fatal error types

pub mod arch;
pub mod catalog;
pub mod compilation;
pub mod declaration;
pub mod errors;

pub use arch::Arch;
pub use catalog::{ArchTarget, TargetCatalog};
pub use compilation::{compilation_matrix, CompilationType};
pub use declaration::{
    Availability, Declaration, DeclarationKind, DeclarationLocation, HeaderDatabase, Linkage,
    LocationKey, SymbolKind,
};
pub use errors::{VersionerError, VersionerResult};
