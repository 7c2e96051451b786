//! The merged declaration database.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::{
    CompilationType, Declaration, HeaderDatabase, LocationKey, VersionerError, VersionerResult,
};
use crate::database::{transpose, SymbolTable};

/// How a symbol is declared at a single compilation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationType {
    /// Not declared at all.
    Nonexistent,
    /// Exactly one declaration and no definition.
    Unique,
    /// Defined inline in a header.
    Inlined,
    /// Declared in more than one place.
    MultiplyDeclared,
}

/// Which compilation types observed each source location of each symbol.
///
/// Kept apart from [`DeclarationLocation`](crate::core::DeclarationLocation)
/// so that a location's identity never changes after it is recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationIndex {
    tags: BTreeMap<String, BTreeMap<LocationKey, BTreeSet<CompilationType>>>,
}

impl LocationIndex {
    pub fn record(&mut self, symbol: &str, key: &LocationKey, compilation_type: CompilationType) {
        self.tags
            .entry(symbol.to_string())
            .or_default()
            .entry(key.clone())
            .or_default()
            .insert(compilation_type);
    }

    /// Compilation types at which `key` was seen for `symbol`.
    pub fn types(&self, symbol: &str, key: &LocationKey) -> Option<&BTreeSet<CompilationType>> {
        self.tags.get(symbol)?.get(key)
    }

    /// Every location of `symbol` with the types that observed it.
    pub fn locations(
        &self,
        symbol: &str,
    ) -> impl Iterator<Item = (&LocationKey, &BTreeSet<CompilationType>)> {
        self.tags.get(symbol).into_iter().flat_map(|keys| keys.iter())
    }
}

/// `symbol -> compilation type -> declaration`, built once per run.
#[derive(Debug, Clone, Default)]
pub struct DeclarationDatabase {
    symbols: SymbolTable<Declaration>,
    index: LocationIndex,
}

impl DeclarationDatabase {
    /// Merge per-type header databases into one symbol-keyed database.
    pub fn from_headers(per_type: BTreeMap<CompilationType, HeaderDatabase>) -> Self {
        let mut index = LocationIndex::default();
        for (compilation_type, header_db) in &per_type {
            for (name, declaration) in &header_db.declarations {
                for key in declaration.location_keys() {
                    index.record(name, key, *compilation_type);
                }
            }
        }

        let symbols = transpose(
            per_type
                .into_iter()
                .map(|(compilation_type, db)| (compilation_type, db.declarations)),
        );

        DeclarationDatabase { symbols, index }
    }

    pub fn symbols(&self) -> &SymbolTable<Declaration> {
        &self.symbols
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<CompilationType, Declaration>)> {
        self.symbols.iter()
    }

    pub fn get(&self, symbol: &str) -> Option<&BTreeMap<CompilationType, Declaration>> {
        self.symbols.get(symbol)
    }

    pub fn declaration(
        &self,
        symbol: &str,
        compilation_type: CompilationType,
    ) -> Option<&Declaration> {
        self.symbols.get(symbol)?.get(&compilation_type)
    }

    pub fn index(&self) -> &LocationIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Classify how `symbol` is declared at `compilation_type`.
    ///
    /// More than one definition visible to a single target is an error.
    pub fn declaration_type(
        &self,
        symbol: &str,
        compilation_type: CompilationType,
    ) -> VersionerResult<DeclarationType> {
        let mut declarations = 0;
        let mut definitions = 0;
        for (key, types) in self.index.locations(symbol) {
            if !types.contains(&compilation_type) {
                continue;
            }
            if key.is_definition {
                definitions += 1;
            } else {
                declarations += 1;
            }
        }

        if definitions > 1 {
            let locations = self
                .declaration(symbol, compilation_type)
                .map(|decl| decl.locations.iter().cloned().collect())
                .unwrap_or_default();
            return Err(VersionerError::MultipleDefinitions {
                symbol: symbol.to_string(),
                compilation_type,
                locations,
            });
        }

        Ok(if declarations > 1 {
            DeclarationType::MultiplyDeclared
        } else if definitions == 1 {
            DeclarationType::Inlined
        } else if declarations == 1 {
            DeclarationType::Unique
        } else {
            DeclarationType::Nonexistent
        })
    }
}
