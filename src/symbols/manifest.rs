//! Plain-text symbol manifests.
//!
//! A manifest lists one exported symbol per line. The file suffix decides the
//! kind: `libc.so.functions.txt` lists functions, `libc.so.variables.txt`
//! lists variables.

use std::collections::BTreeSet;
use std::path::Path;

use crate::core::{SymbolKind, VersionerError, VersionerResult};

pub const FUNCTIONS_SUFFIX: &str = ".functions.txt";
pub const VARIABLES_SUFFIX: &str = ".variables.txt";

/// Kind of the symbols listed in a manifest, from its file name.
pub fn manifest_kind(file_name: &str) -> Option<SymbolKind> {
    if file_name.ends_with(FUNCTIONS_SUFFIX) {
        Some(SymbolKind::Function)
    } else if file_name.ends_with(VARIABLES_SUFFIX) {
        Some(SymbolKind::Variable)
    } else {
        None
    }
}

/// Whether `path` names a symbol manifest.
pub fn is_manifest(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(manifest_kind)
        .is_some()
}

/// Read the symbol names listed in a manifest.
///
/// Lines are trimmed and blank lines skipped. Duplicates are harmless.
pub fn read_manifest(path: &Path) -> VersionerResult<BTreeSet<String>> {
    let contents = std::fs::read_to_string(path).map_err(|e| VersionerError::io(path, e))?;
    Ok(parse_manifest(&contents, path))
}

fn parse_manifest(contents: &str, path: &Path) -> BTreeSet<String> {
    let mut symbols = BTreeSet::new();
    for line in contents.lines() {
        let name = line.trim();
        if name.is_empty() {
            continue;
        }
        if !symbols.insert(name.to_string()) {
            tracing::debug!("duplicate symbol `{}` in {}", name, path.display());
        }
    }
    symbols
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_manifest_kind() {
        assert_eq!(
            manifest_kind("libc.so.functions.txt"),
            Some(SymbolKind::Function)
        );
        assert_eq!(
            manifest_kind("libm.so.variables.txt"),
            Some(SymbolKind::Variable)
        );
        assert_eq!(manifest_kind("libc.so"), None);
        assert!(is_manifest(Path::new("/tmp/symbols/libdl.so.functions.txt")));
    }

    #[test]
    fn test_read_manifest_trims_and_dedups() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("libc.so.functions.txt");
        std::fs::write(&path, "  malloc \n\nfree\nmalloc\n\t\n").unwrap();

        let symbols = read_manifest(&path).unwrap();
        assert_eq!(
            symbols.into_iter().collect::<Vec<_>>(),
            vec!["free".to_string(), "malloc".to_string()]
        );
    }

    #[test]
    fn test_read_manifest_missing() {
        let tmp = TempDir::new().unwrap();
        let err = read_manifest(&tmp.path().join("nope.functions.txt")).unwrap_err();
        assert!(matches!(err, VersionerError::Io { .. }));
    }
}
