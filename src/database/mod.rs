//! Symbol-keyed, target-keyed databases.
//!
//! Both the header side and the library side are first produced per
//! compilation type and then transposed into `symbol -> type -> value` maps.

pub mod declarations;
pub mod platform;

use std::collections::BTreeMap;

use crate::core::CompilationType;

pub use declarations::{DeclarationDatabase, DeclarationType, LocationIndex};
pub use platform::{find_manifest, PlatformSource, PlatformSymbolDatabase};

/// `symbol -> type -> value`
pub type SymbolTable<V> = BTreeMap<String, BTreeMap<CompilationType, V>>;

/// Turn per-type symbol maps into a per-symbol map of types.
///
/// Types partition the input, so every cell is written at most once.
pub fn transpose<V, I>(per_type: I) -> SymbolTable<V>
where
    I: IntoIterator<Item = (CompilationType, BTreeMap<String, V>)>,
{
    let mut result: SymbolTable<V> = BTreeMap::new();
    for (compilation_type, symbols) in per_type {
        for (name, value) in symbols {
            result
                .entry(name)
                .or_default()
                .insert(compilation_type, value);
        }
    }
    result
}

/// The per-type view of a symbol table at `compilation_type`.
pub fn project<V: Clone>(
    table: &SymbolTable<V>,
    compilation_type: CompilationType,
) -> BTreeMap<String, V> {
    table
        .iter()
        .filter_map(|(name, types)| {
            types
                .get(&compilation_type)
                .map(|value| (name.clone(), value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Arch;

    #[test]
    fn test_transpose_round_trip() {
        let arm9 = CompilationType::new(Arch::Arm, 9);
        let arm14 = CompilationType::new(Arch::Arm, 14);
        let x86 = CompilationType::new(Arch::X86, 9);

        let mut per_type = BTreeMap::new();
        per_type.insert(
            arm9,
            BTreeMap::from([("foo".to_string(), 1), ("bar".to_string(), 2)]),
        );
        per_type.insert(arm14, BTreeMap::from([("foo".to_string(), 3)]));
        per_type.insert(x86, BTreeMap::new());

        let table = transpose(per_type.clone());
        assert_eq!(table["foo"].len(), 2);
        assert_eq!(table["foo"][&arm14], 3);
        assert_eq!(table["bar"].keys().collect::<Vec<_>>(), vec![&arm9]);

        for (compilation_type, symbols) in &per_type {
            assert_eq!(&project(&table, *compilation_type), symbols);
        }
    }
}
