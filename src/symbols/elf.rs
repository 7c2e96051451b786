//! Dynamic symbol tables of shared libraries.

use std::collections::BTreeMap;
use std::path::Path;

use goblin::elf::section_header::SHN_UNDEF;
use goblin::elf::sym::{
    STB_GLOBAL, STB_GNU_UNIQUE, STB_WEAK, STT_COMMON, STT_FUNC, STT_GNU_IFUNC, STT_OBJECT, STT_TLS,
};
use goblin::elf::Elf;

use crate::core::{SymbolKind, VersionerError, VersionerResult};

/// Map an ELF symbol type to the kind of declaration it satisfies.
pub fn symbol_kind(st_type: u8) -> Option<SymbolKind> {
    match st_type {
        STT_FUNC | STT_GNU_IFUNC => Some(SymbolKind::Function),
        STT_OBJECT | STT_TLS | STT_COMMON => Some(SymbolKind::Variable),
        _ => None,
    }
}

/// Read the symbols a shared library exports through its dynamic symbol table.
///
/// Undefined (imported) and local symbols are ignored, as are symbols whose
/// type is neither code nor data.
pub fn read_exports(path: &Path) -> VersionerResult<BTreeMap<String, SymbolKind>> {
    let bytes = std::fs::read(path).map_err(|e| VersionerError::io(path, e))?;
    let elf = Elf::parse(&bytes).map_err(|e| VersionerError::Elf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut exports = BTreeMap::new();
    for sym in elf.dynsyms.iter() {
        if sym.st_shndx == SHN_UNDEF as usize {
            continue;
        }
        if !matches!(sym.st_bind(), STB_GLOBAL | STB_WEAK | STB_GNU_UNIQUE) {
            continue;
        }
        let Some(kind) = symbol_kind(sym.st_type()) else {
            continue;
        };
        let name = elf
            .dynstrtab
            .get_at(sym.st_name)
            .ok_or_else(|| VersionerError::Elf {
                path: path.to_path_buf(),
                message: format!("bad symbol name offset {}", sym.st_name),
            })?;
        if name.is_empty() {
            continue;
        }
        exports.insert(name.to_string(), kind);
    }

    tracing::debug!("{}: {} exported symbols", path.display(), exports.len());
    Ok(exports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_symbol_kind() {
        assert_eq!(symbol_kind(STT_FUNC), Some(SymbolKind::Function));
        assert_eq!(symbol_kind(STT_OBJECT), Some(SymbolKind::Variable));
        assert_eq!(symbol_kind(STT_TLS), Some(SymbolKind::Variable));
        assert_eq!(symbol_kind(goblin::elf::sym::STT_SECTION), None);
    }

    #[test]
    fn test_read_exports_rejects_non_elf() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("libc.so");
        std::fs::write(&path, b"not an elf file at all").unwrap();

        let err = read_exports(&path).unwrap_err();
        assert!(matches!(err, VersionerError::Elf { .. }));
    }

    #[test]
    fn test_read_exports_missing_file() {
        let tmp = TempDir::new().unwrap();
        let err = read_exports(&tmp.path().join("libmissing.so")).unwrap_err();
        assert!(matches!(err, VersionerError::Io { .. }));
    }
}
