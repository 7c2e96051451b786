//! The platform symbol database: what the libraries actually export.
//!
//! Platform trees follow the NDK layout, one directory per API level:
//!
//! ```text
//! platforms/
//!   android-9/arch-arm/usr/lib/libc.so
//!   android-9/arch-arm/symbols/libc.so.functions.txt
//!   android-14/arch-arm/symbols/libc.so.functions.txt
//! ```
//!
//! Manifest trees are layered: a level only carries the files that changed
//! since the nearest lower level, so lookups fall back level by level.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use walkdir::WalkDir;

use crate::core::{
    Arch, CompilationType, SymbolKind, TargetCatalog, VersionerError, VersionerResult,
};
use crate::database::{transpose, SymbolTable};
use crate::symbols::{self, manifest_kind};

/// Directory holding everything for one API level.
pub fn level_dir(root: &Path, api_level: u32) -> PathBuf {
    root.join(format!("android-{}", api_level))
}

/// Directory holding one architecture at one API level.
pub fn arch_dir(root: &Path, arch: Arch, api_level: u32) -> PathBuf {
    level_dir(root, api_level).join(format!("arch-{}", arch))
}

/// Directory holding the symbol manifests of one architecture at one API level.
pub fn manifest_dir(root: &Path, arch: Arch, api_level: u32) -> PathBuf {
    arch_dir(root, arch, api_level).join("symbols")
}

/// Find `file_name` for `arch` at `api_level`, falling back to lower levels.
///
/// Walks down to the architecture's floor, skipping levels the catalog does
/// not support. Returns `None` below the floor or when no level has the file.
pub fn find_manifest(
    root: &Path,
    catalog: &TargetCatalog,
    arch: Arch,
    api_level: u32,
    file_name: &str,
) -> VersionerResult<Option<PathBuf>> {
    let floor = catalog.min_api(arch)?;
    for level in (floor..=api_level).rev() {
        if !catalog.supports_api_level(level) {
            continue;
        }
        let candidate = manifest_dir(root, arch, level).join(file_name);
        if candidate.is_file() {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// `symbol -> compilation type -> kind`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformSymbolDatabase {
    symbols: SymbolTable<SymbolKind>,
}

impl PlatformSymbolDatabase {
    pub fn from_per_type(per_type: BTreeMap<CompilationType, BTreeMap<String, SymbolKind>>) -> Self {
        PlatformSymbolDatabase {
            symbols: transpose(per_type),
        }
    }

    pub fn symbols(&self) -> &SymbolTable<SymbolKind> {
        &self.symbols
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<CompilationType, SymbolKind>)> {
        self.symbols.iter()
    }

    pub fn get(&self, symbol: &str) -> Option<&BTreeMap<CompilationType, SymbolKind>> {
        self.symbols.get(symbol)
    }

    /// Kind of `symbol` as exported at `compilation_type`, if exported there.
    pub fn kind(&self, symbol: &str, compilation_type: CompilationType) -> Option<SymbolKind> {
        self.symbols.get(symbol)?.get(&compilation_type).copied()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// Where platform symbols come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformSource {
    /// Shared libraries whose dynamic symbol tables are read directly.
    Libraries(PathBuf),
    /// Layered `*.functions.txt` / `*.variables.txt` manifests.
    Manifests(PathBuf),
}

impl PlatformSource {
    /// Pick the strategy from the contents of `root`.
    pub fn detect(root: &Path) -> VersionerResult<Self> {
        if !root.is_dir() {
            return Err(VersionerError::io(
                root,
                std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
            ));
        }

        let has_manifests = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .any(|entry| entry.file_type().is_file() && symbols::is_manifest(entry.path()));

        Ok(if has_manifests {
            PlatformSource::Manifests(root.to_path_buf())
        } else {
            PlatformSource::Libraries(root.to_path_buf())
        })
    }

    pub fn root(&self) -> &Path {
        match self {
            PlatformSource::Libraries(root) | PlatformSource::Manifests(root) => root,
        }
    }

    /// Build the database for every entry of `matrix`.
    pub fn build(
        &self,
        catalog: &TargetCatalog,
        matrix: &BTreeSet<CompilationType>,
    ) -> VersionerResult<PlatformSymbolDatabase> {
        let per_type = match self {
            PlatformSource::Libraries(root) => build_from_libraries(root, matrix)?,
            PlatformSource::Manifests(root) => build_from_manifests(root, catalog, matrix)?,
        };

        let db = PlatformSymbolDatabase::from_per_type(per_type);
        tracing::info!(
            "platform symbol database has {} symbols from {}",
            db.len(),
            self.root().display()
        );
        Ok(db)
    }
}

fn is_shared_library(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(".so") || name.contains(".so."))
        && !symbols::is_manifest(path)
}

fn build_from_libraries(
    root: &Path,
    matrix: &BTreeSet<CompilationType>,
) -> VersionerResult<BTreeMap<CompilationType, BTreeMap<String, SymbolKind>>> {
    matrix
        .par_iter()
        .map(|&compilation_type| {
            let mut dir = arch_dir(root, compilation_type.arch, compilation_type.api_level);
            // The shared level directory holds other archs' `arch-*` trees.
            let mut depth = usize::MAX;
            if !dir.is_dir() {
                dir = level_dir(root, compilation_type.api_level);
                depth = 1;
            }
            if !dir.is_dir() {
                return Err(VersionerError::io(
                    &dir,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "missing platform directory"),
                ));
            }

            let mut exports = BTreeMap::new();
            for entry in WalkDir::new(&dir)
                .max_depth(depth)
                .follow_links(true)
                .sort_by_file_name() {
                let entry = entry.map_err(|e| {
                    let path = e.path().unwrap_or(&dir).to_path_buf();
                    VersionerError::io(path, e.into())
                })?;
                if !entry.file_type().is_file() || !is_shared_library(entry.path()) {
                    continue;
                }
                for (name, kind) in symbols::read_exports(entry.path())? {
                    exports.entry(name).or_insert(kind);
                }
            }

            tracing::debug!("{}: {} exported symbols", compilation_type, exports.len());
            Ok((compilation_type, exports))
        })
        .collect()
}

/// Manifest file names present for `arch` at any supported level.
fn manifest_names(
    root: &Path,
    catalog: &TargetCatalog,
    arch: Arch,
) -> VersionerResult<BTreeSet<String>> {
    let floor = catalog.min_api(arch)?;
    let mut names = BTreeSet::new();
    for &level in catalog.api_levels().iter().filter(|&&level| level >= floor) {
        let dir = manifest_dir(root, arch, level);
        if !dir.is_dir() {
            continue;
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| VersionerError::io(&dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| VersionerError::io(&dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                if manifest_kind(name).is_some() {
                    names.insert(name.to_string());
                }
            }
        }
    }
    Ok(names)
}

fn build_from_manifests(
    root: &Path,
    catalog: &TargetCatalog,
    matrix: &BTreeSet<CompilationType>,
) -> VersionerResult<BTreeMap<CompilationType, BTreeMap<String, SymbolKind>>> {
    let archs: BTreeSet<Arch> = matrix.iter().map(|t| t.arch).collect();
    let mut wanted = BTreeMap::new();
    for arch in archs {
        wanted.insert(arch, manifest_names(root, catalog, arch)?);
    }

    let mut per_type = BTreeMap::new();
    for &compilation_type in matrix {
        let mut exports: BTreeMap<String, SymbolKind> = BTreeMap::new();
        for file_name in &wanted[&compilation_type.arch] {
            let Some(kind) = manifest_kind(file_name) else {
                continue;
            };
            let Some(path) = find_manifest(
                root,
                catalog,
                compilation_type.arch,
                compilation_type.api_level,
                file_name,
            )?
            else {
                continue;
            };

            for name in symbols::read_manifest(&path)? {
                match exports.get(&name) {
                    Some(&existing) if existing != kind => {
                        tracing::warn!(
                            "`{}` is listed as both {} and {} for {}",
                            name,
                            existing,
                            kind,
                            compilation_type
                        );
                    }
                    Some(_) => {}
                    None => {
                        exports.insert(name, kind);
                    }
                }
            }
        }

        tracing::debug!("{}: {} exported symbols", compilation_type, exports.len());
        per_type.insert(compilation_type, exports);
    }

    Ok(per_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{catalog, write_manifest};
    use tempfile::TempDir;

    fn arm_catalog(levels: &[u32]) -> TargetCatalog {
        catalog(&[(Arch::Arm, 9)], levels)
    }

    #[test]
    fn test_find_manifest_falls_back_to_lower_level() {
        let tmp = TempDir::new().unwrap();
        let catalog = arm_catalog(&[9, 12, 14]);
        write_manifest(tmp.path(), Arch::Arm, 9, "libc.so.functions.txt", &["malloc"]);

        let found = find_manifest(tmp.path(), &catalog, Arch::Arm, 14, "libc.so.functions.txt")
            .unwrap()
            .unwrap();
        assert_eq!(found, manifest_dir(tmp.path(), Arch::Arm, 9).join("libc.so.functions.txt"));
    }

    #[test]
    fn test_find_manifest_prefers_nearest_level() {
        let tmp = TempDir::new().unwrap();
        let catalog = arm_catalog(&[9, 12, 14]);
        write_manifest(tmp.path(), Arch::Arm, 9, "libc.so.functions.txt", &["malloc"]);
        write_manifest(tmp.path(), Arch::Arm, 12, "libc.so.functions.txt", &["malloc", "free"]);

        let found = find_manifest(tmp.path(), &catalog, Arch::Arm, 14, "libc.so.functions.txt")
            .unwrap()
            .unwrap();
        assert_eq!(found, manifest_dir(tmp.path(), Arch::Arm, 12).join("libc.so.functions.txt"));
    }

    #[test]
    fn test_find_manifest_stops_at_floor() {
        let tmp = TempDir::new().unwrap();
        let catalog = arm_catalog(&[9, 12, 14]);
        // Present below the floor, which must never be consulted.
        write_manifest(tmp.path(), Arch::Arm, 8, "libc.so.functions.txt", &["malloc"]);

        assert!(find_manifest(tmp.path(), &catalog, Arch::Arm, 14, "libc.so.functions.txt")
            .unwrap()
            .is_none());
        assert!(find_manifest(tmp.path(), &catalog, Arch::Arm, 8, "libc.so.functions.txt")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_find_manifest_skips_unsupported_levels() {
        let tmp = TempDir::new().unwrap();
        let catalog = arm_catalog(&[9, 14]);
        write_manifest(tmp.path(), Arch::Arm, 12, "libc.so.functions.txt", &["malloc"]);
        write_manifest(tmp.path(), Arch::Arm, 9, "libc.so.functions.txt", &["free"]);

        let found = find_manifest(tmp.path(), &catalog, Arch::Arm, 14, "libc.so.functions.txt")
            .unwrap()
            .unwrap();
        assert_eq!(found, manifest_dir(tmp.path(), Arch::Arm, 9).join("libc.so.functions.txt"));
    }

    #[test]
    fn test_build_from_layered_manifests() {
        let tmp = TempDir::new().unwrap();
        let catalog = arm_catalog(&[9, 12, 14]);
        write_manifest(tmp.path(), Arch::Arm, 9, "libc.so.functions.txt", &["malloc"]);
        write_manifest(tmp.path(), Arch::Arm, 9, "libc.so.variables.txt", &["environ"]);
        write_manifest(tmp.path(), Arch::Arm, 14, "libc.so.functions.txt", &["malloc", "foo"]);

        let source = PlatformSource::detect(tmp.path()).unwrap();
        assert!(matches!(source, PlatformSource::Manifests(_)));

        let matrix = [9, 12, 14]
            .into_iter()
            .map(|level| CompilationType::new(Arch::Arm, level))
            .collect();
        let db = source.build(&catalog, &matrix).unwrap();

        let arm = |level| CompilationType::new(Arch::Arm, level);
        assert_eq!(db.kind("malloc", arm(12)), Some(SymbolKind::Function));
        assert_eq!(db.kind("foo", arm(12)), None);
        assert_eq!(db.kind("foo", arm(14)), Some(SymbolKind::Function));
        // Variables manifest only exists at 9 and is inherited upward.
        assert_eq!(db.kind("environ", arm(14)), Some(SymbolKind::Variable));
    }

    #[test]
    fn test_detect_libraries() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(arch_dir(tmp.path(), Arch::Arm, 9)).unwrap();
        let source = PlatformSource::detect(tmp.path()).unwrap();
        assert_eq!(source, PlatformSource::Libraries(tmp.path().to_path_buf()));
    }

    #[test]
    fn test_detect_missing_root() {
        let tmp = TempDir::new().unwrap();
        let err = PlatformSource::detect(&tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, VersionerError::Io { .. }));
    }

    #[test]
    fn test_libraries_missing_level_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let matrix = [CompilationType::new(Arch::Arm, 9)].into_iter().collect();
        let err = PlatformSource::Libraries(tmp.path().to_path_buf())
            .build(&arm_catalog(&[9]), &matrix)
            .unwrap_err();
        assert!(matches!(err, VersionerError::Io { .. }));
    }

    #[test]
    fn test_level_fallback_ignores_other_archs() {
        let tmp = TempDir::new().unwrap();
        let arm = arch_dir(tmp.path(), Arch::Arm, 14);
        std::fs::create_dir_all(&arm).unwrap();
        // Not a readable ELF file, so walking into it would fail the build.
        std::fs::write(arm.join("libm.so"), b"not elf").unwrap();

        let x86 = CompilationType::new(Arch::X86, 14);
        let matrix = [x86].into_iter().collect();
        let db = PlatformSource::Libraries(tmp.path().to_path_buf())
            .build(&catalog(&[(Arch::X86, 9)], &[14]), &matrix)
            .unwrap();
        assert!(db.is_empty());
    }

    #[test]
    fn test_is_shared_library() {
        assert!(is_shared_library(Path::new("libc.so")));
        assert!(is_shared_library(Path::new("libfoo.so.1")));
        assert!(!is_shared_library(Path::new("libc.a")));
        assert!(!is_shared_library(Path::new("libc.so.functions.txt")));
    }
}
