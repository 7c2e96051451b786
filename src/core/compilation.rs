//! Compilation types and the compilation matrix.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::core::arch::Arch;
use crate::core::catalog::TargetCatalog;
use crate::core::errors::{VersionerError, VersionerResult};

/// One cell of the validation matrix: an architecture at an API level.
///
/// Ordered by architecture first, then API level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CompilationType {
    pub arch: Arch,
    pub api_level: u32,
}

impl CompilationType {
    pub fn new(arch: Arch, api_level: u32) -> Self {
        CompilationType { arch, api_level }
    }
}

impl fmt::Display for CompilationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.arch, self.api_level)
    }
}

/// Generate every valid (arch, level) pair for the selection.
///
/// Empty selections mean "everything the catalog supports". Levels below an
/// architecture's floor are dropped silently; selecting something the catalog
/// does not know about is an error.
pub fn compilation_matrix(
    catalog: &TargetCatalog,
    archs: &BTreeSet<Arch>,
    api_levels: &BTreeSet<u32>,
) -> VersionerResult<BTreeSet<CompilationType>> {
    for &arch in archs {
        if !catalog.supports_arch(arch) {
            return Err(VersionerError::UnsupportedArch(arch));
        }
    }
    for &level in api_levels {
        if !catalog.supports_api_level(level) {
            return Err(VersionerError::UnsupportedApiLevel(level));
        }
    }

    let archs: BTreeSet<Arch> = if archs.is_empty() {
        catalog.archs().collect()
    } else {
        archs.clone()
    };
    let levels = if api_levels.is_empty() {
        catalog.api_levels()
    } else {
        api_levels
    };

    let mut matrix = BTreeSet::new();
    for arch in archs {
        let floor = catalog.min_api(arch)?;
        for &level in levels.iter().filter(|&&level| level >= floor) {
            matrix.insert(CompilationType::new(arch, level));
        }
    }

    tracing::debug!("compilation matrix has {} entries", matrix.len());
    Ok(matrix)
}
