//! Listings of the declaration and platform databases.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::core::{
    Availability, CompilationType, Declaration, DeclarationKind, Linkage, LocationKey,
    VersionerResult,
};
use crate::database::{DeclarationDatabase, DeclarationType, PlatformSymbolDatabase};
use crate::util::fs::relative_display;

/// One source location of a dumped symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationDump {
    /// `file:line:column`, relative to the dump base when possible.
    pub position: String,
    pub linkage: Linkage,
    pub definition: bool,
    pub availability: Availability,
    /// Compilation types that saw this location.
    pub types: Vec<CompilationType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolDump {
    pub name: String,
    pub kind: DeclarationKind,
    pub locations: Vec<LocationDump>,
}

impl fmt::Display for SymbolDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {}: ", self.name)?;
        for location in &self.locations {
            let kind = if location.definition {
                "definition"
            } else {
                "declaration"
            };
            writeln!(
                f,
                "    {} {} {} @ {}",
                location.linkage, self.kind, kind, location.position
            )?;
            writeln!(f, "      availability: {}", location.availability)?;
            writeln!(f, "      types: {}", join_types(&location.types))?;
        }
        Ok(())
    }
}

/// An exported symbol and where it is exported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportDump {
    pub name: String,
    pub types: Vec<CompilationType>,
}

impl fmt::Display for ExportDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "    {}: {}", self.name, join_types(&self.types))
    }
}

fn join_types(types: &[CompilationType]) -> String {
    types
        .iter()
        .map(CompilationType::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Every listing requested for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dumps {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub functions: Option<Vec<SymbolDump>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Vec<SymbolDump>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multiply_declared: Option<Vec<SymbolDump>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<ExportDump>>,
}

impl Dumps {
    pub fn is_empty(&self) -> bool {
        self.functions.is_none()
            && self.variables.is_none()
            && self.multiply_declared.is_none()
            && self.symbols.is_none()
    }
}

impl fmt::Display for Dumps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(symbols) = &self.symbols {
            writeln!(f, "\nSymbols:")?;
            for symbol in symbols {
                write!(f, "{}", symbol)?;
            }
        }
        if let Some(functions) = &self.functions {
            writeln!(f, "\nFunctions:")?;
            for symbol in functions {
                write!(f, "{}", symbol)?;
            }
        }
        if let Some(variables) = &self.variables {
            writeln!(f, "\nVariables:")?;
            for symbol in variables {
                write!(f, "{}", symbol)?;
            }
        }
        if let Some(multiply_declared) = &self.multiply_declared {
            writeln!(f)?;
            if multiply_declared.is_empty() {
                writeln!(f, "No multiply declared symbols.")?;
            } else {
                writeln!(f, "Multiply declared symbols:")?;
                for symbol in multiply_declared {
                    write!(f, "{}", symbol)?;
                }
            }
        }
        Ok(())
    }
}

fn symbol_dump(
    db: &DeclarationDatabase,
    name: &str,
    declarations: &[&Declaration],
    base: &Path,
) -> SymbolDump {
    let mut kinds = declarations.iter().map(|decl| decl.kind());
    let first = kinds.next().unwrap_or(DeclarationKind::Inconsistent);
    let kind = if kinds.all(|other| other == first) {
        first
    } else {
        DeclarationKind::Inconsistent
    };

    let availability_of = |key: &LocationKey| {
        declarations
            .iter()
            .flat_map(|decl| decl.locations.iter())
            .find(|location| &location.key == key)
            .map(|location| location.availability)
            .unwrap_or_default()
    };

    let locations = db
        .index()
        .locations(name)
        .map(|(key, types)| LocationDump {
            position: format!(
                "{}:{}:{}",
                relative_display(base, Path::new(&key.filename)),
                key.line,
                key.column
            ),
            linkage: key.linkage,
            definition: key.is_definition,
            availability: availability_of(key),
            types: types.iter().copied().collect(),
        })
        .collect();

    SymbolDump {
        name: name.to_string(),
        kind,
        locations,
    }
}

fn dump_kind(db: &DeclarationDatabase, wanted: DeclarationKind, base: &Path) -> Vec<SymbolDump> {
    db.iter()
        .filter_map(|(name, cells)| {
            let declarations: Vec<&Declaration> = cells.values().collect();
            let dump = symbol_dump(db, name, &declarations, base);
            (dump.kind == wanted).then_some(dump)
        })
        .collect()
}

/// Symbols declared as functions, positions relative to `base`.
pub fn dump_functions(db: &DeclarationDatabase, base: &Path) -> Vec<SymbolDump> {
    dump_kind(db, DeclarationKind::Function, base)
}

/// Symbols declared as variables, positions relative to `base`.
pub fn dump_variables(db: &DeclarationDatabase, base: &Path) -> Vec<SymbolDump> {
    dump_kind(db, DeclarationKind::Variable, base)
}

/// Symbols declared in more than one place at some compilation type.
///
/// Fails if a symbol has several definitions visible to one target.
pub fn dump_multiply_declared(
    db: &DeclarationDatabase,
    base: &Path,
) -> VersionerResult<Vec<SymbolDump>> {
    let mut dumps = Vec::new();
    for (name, cells) in db.iter() {
        let mut multiply_declared = false;
        for &compilation_type in cells.keys() {
            if db.declaration_type(name, compilation_type)? == DeclarationType::MultiplyDeclared {
                multiply_declared = true;
            }
        }
        if multiply_declared {
            let declarations: Vec<&Declaration> = cells.values().collect();
            dumps.push(symbol_dump(db, name, &declarations, base));
        }
    }
    Ok(dumps)
}

/// Every exported symbol with the compilation types exporting it.
pub fn dump_symbols(platform: &PlatformSymbolDatabase) -> Vec<ExportDump> {
    platform
        .iter()
        .map(|(name, types)| ExportDump {
            name: name.clone(),
            types: types.keys().copied().collect(),
        })
        .collect()
}
