//! Test fixtures for common test scenarios.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::{
    Arch, ArchTarget, Availability, CompilationType, DeclarationLocation, HeaderDatabase, Linkage,
    LocationKey, SymbolKind, TargetCatalog,
};
use crate::database::platform::manifest_dir;
use crate::database::DeclarationDatabase;

/// An extern function declaration at `filename:line:1`.
pub fn location(filename: &str, line: u32, availability: Availability) -> DeclarationLocation {
    DeclarationLocation {
        key: LocationKey {
            filename: filename.to_string(),
            line,
            column: 1,
            kind: SymbolKind::Function,
            linkage: Linkage::Extern,
            is_definition: false,
        },
        availability,
    }
}

/// An extern variable declaration at `filename:line:1`.
pub fn variable_location(
    filename: &str,
    line: u32,
    availability: Availability,
) -> DeclarationLocation {
    let mut loc = location(filename, line, availability);
    loc.key.kind = SymbolKind::Variable;
    loc
}

/// An inline (static) function definition at `filename:line:1`.
pub fn inline_location(
    filename: &str,
    line: u32,
    availability: Availability,
) -> DeclarationLocation {
    let mut loc = location(filename, line, availability);
    loc.key.linkage = Linkage::Static;
    loc.key.is_definition = true;
    loc
}

/// A header database holding the given `(name, location)` pairs.
pub fn header_db(entries: &[(&str, DeclarationLocation)]) -> HeaderDatabase {
    let mut db = HeaderDatabase::new();
    for (name, loc) in entries {
        db.insert(name, loc.clone()).unwrap();
    }
    db
}

/// A declaration database from `(type, name, location)` triples.
pub fn declaration_db(
    entries: &[(CompilationType, &str, DeclarationLocation)],
) -> DeclarationDatabase {
    let mut per_type: BTreeMap<CompilationType, HeaderDatabase> = BTreeMap::new();
    for (compilation_type, name, loc) in entries {
        per_type
            .entry(*compilation_type)
            .or_default()
            .insert(name, loc.clone())
            .unwrap();
    }
    DeclarationDatabase::from_headers(per_type)
}

/// A catalog with the given `(arch, floor)` pairs and API levels.
pub fn catalog(archs: &[(Arch, u32)], levels: &[u32]) -> TargetCatalog {
    let defaults = TargetCatalog::default();
    TargetCatalog::new(
        levels.iter().copied(),
        archs.iter().map(|&(arch, min_api)| {
            (
                arch,
                ArchTarget {
                    min_api,
                    triple: defaults.triple(arch).unwrap().to_string(),
                },
            )
        }),
    )
    .unwrap()
}

/// Write a header at `root/relative`, creating parent directories.
pub fn write_header(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, contents).unwrap();
    path
}

/// Write a symbol manifest into the NDK platform layout under `root`.
pub fn write_manifest(
    root: &Path,
    arch: Arch,
    api_level: u32,
    file_name: &str,
    symbols: &[&str],
) -> PathBuf {
    let dir = manifest_dir(root, arch, api_level);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(file_name);
    let mut contents = symbols.join("\n");
    contents.push('\n');
    std::fs::write(&path, contents).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_location_builders() {
        let var = variable_location("a.h", 2, Availability::default());
        assert_eq!(var.kind(), SymbolKind::Variable);

        let inline = inline_location("a.h", 3, Availability::default());
        assert!(inline.is_definition());
        assert_eq!(inline.linkage(), Linkage::Static);
    }

    #[test]
    fn test_write_manifest_layout() {
        let tmp = TempDir::new().unwrap();
        let path = write_manifest(tmp.path(), Arch::Arm, 9, "libc.so.functions.txt", &["a", "b"]);
        assert!(path.ends_with("android-9/arch-arm/symbols/libc.so.functions.txt"));
        assert_eq!(std::fs::read_to_string(path).unwrap(), "a\nb\n");
    }
}
