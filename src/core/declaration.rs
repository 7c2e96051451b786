//! Header declarations and their availability metadata.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::core::errors::{VersionerError, VersionerResult};

/// API-level range in which a declaration is meant to be usable.
///
/// Zero means "unspecified" for each field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Availability {
    pub introduced: u32,
    pub deprecated: u32,
    pub obsoleted: u32,
}

impl Availability {
    pub fn new(introduced: u32, deprecated: u32, obsoleted: u32) -> Self {
        Availability {
            introduced,
            deprecated,
            obsoleted,
        }
    }

    pub fn introduced(level: u32) -> Self {
        Availability {
            introduced: level,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.introduced == 0 && self.deprecated == 0 && self.obsoleted == 0
    }

    /// Whether `level` lies inside `[introduced, obsoleted)`.
    ///
    /// An unspecified `introduced` starts at `floor`; an unspecified
    /// `obsoleted` never ends.
    pub fn covers(&self, level: u32, floor: u32) -> bool {
        let low = if self.introduced == 0 {
            floor
        } else {
            self.introduced
        };
        level >= low && (self.obsoleted == 0 || level < self.obsoleted)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no availability");
        }

        let parts: Vec<String> = [
            ("introduced", self.introduced),
            ("deprecated", self.deprecated),
            ("obsoleted", self.obsoleted),
        ]
        .into_iter()
        .filter(|(_, value)| *value != 0)
        .map(|(name, value)| format!("{} = {}", name, value))
        .collect();

        f.write_str(&parts.join(", "))
    }
}

/// Kind of an exported symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Variable,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Variable => "variable",
        }
    }
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a declaration, aggregated over all of its locations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationKind {
    Function,
    Variable,
    /// Locations disagree; should not happen for well-formed headers.
    Inconsistent,
}

impl DeclarationKind {
    /// Whether an exported symbol of `kind` satisfies this declaration.
    pub fn matches(&self, kind: SymbolKind) -> bool {
        matches!(
            (self, kind),
            (DeclarationKind::Function, SymbolKind::Function)
                | (DeclarationKind::Variable, SymbolKind::Variable)
        )
    }
}

impl From<SymbolKind> for DeclarationKind {
    fn from(kind: SymbolKind) -> Self {
        match kind {
            SymbolKind::Function => DeclarationKind::Function,
            SymbolKind::Variable => DeclarationKind::Variable,
        }
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclarationKind::Function => f.write_str("function"),
            DeclarationKind::Variable => f.write_str("variable"),
            DeclarationKind::Inconsistent => f.write_str("inconsistent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    Extern,
    Static,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Linkage::Extern => f.write_str("extern"),
            Linkage::Static => f.write_str("static"),
        }
    }
}

/// Identity of a declaration location: everything except its availability.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LocationKey {
    pub filename: String,
    pub line: u32,
    pub column: u32,
    pub kind: SymbolKind,
    pub linkage: Linkage,
    pub is_definition: bool,
}

/// A single place a symbol is declared.
///
/// Equality and ordering only consider the identity key; two locations with
/// the same key must carry the same availability.
#[derive(Debug, Clone, Serialize)]
pub struct DeclarationLocation {
    #[serde(flatten)]
    pub key: LocationKey,
    pub availability: Availability,
}

impl DeclarationLocation {
    pub fn filename(&self) -> &str {
        &self.key.filename
    }

    pub fn line(&self) -> u32 {
        self.key.line
    }

    pub fn column(&self) -> u32 {
        self.key.column
    }

    pub fn kind(&self) -> SymbolKind {
        self.key.kind
    }

    pub fn linkage(&self) -> Linkage {
        self.key.linkage
    }

    pub fn is_definition(&self) -> bool {
        self.key.is_definition
    }

    /// `file:line:column`
    pub fn position(&self) -> String {
        format!(
            "{}:{}:{}",
            self.key.filename, self.key.line, self.key.column
        )
    }
}

impl PartialEq for DeclarationLocation {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for DeclarationLocation {}

impl PartialOrd for DeclarationLocation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DeclarationLocation {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for DeclarationLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} @ {}\t[{}]",
            self.key.linkage,
            self.key.kind,
            if self.key.is_definition {
                "definition"
            } else {
                "declaration"
            },
            self.position(),
            self.availability
        )
    }
}

/// A named symbol and every location it was declared at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Declaration {
    pub name: String,
    pub locations: BTreeSet<DeclarationLocation>,
}

impl Declaration {
    pub fn new(name: impl Into<String>) -> Self {
        Declaration {
            name: name.into(),
            locations: BTreeSet::new(),
        }
    }

    /// Record a location, merging with an identical one.
    ///
    /// Fails if a location with the same identity key was already recorded
    /// with a different availability.
    pub fn add_location(&mut self, location: DeclarationLocation) -> VersionerResult<()> {
        if let Some(existing) = self.locations.get(&location) {
            if existing.availability != location.availability {
                return Err(VersionerError::AvailabilityMismatch {
                    symbol: self.name.clone(),
                    location: location.position(),
                    existing: existing.availability,
                    found: location.availability,
                });
            }
            return Ok(());
        }

        self.locations.insert(location);
        Ok(())
    }

    pub fn kind(&self) -> DeclarationKind {
        let mut kinds = self.locations.iter().map(|loc| loc.kind());
        let Some(first) = kinds.next() else {
            return DeclarationKind::Inconsistent;
        };
        if kinds.all(|kind| kind == first) {
            first.into()
        } else {
            DeclarationKind::Inconsistent
        }
    }

    pub fn has_definition(&self) -> bool {
        self.locations.iter().any(|loc| loc.is_definition())
    }

    /// The availability shared by every location, if they agree.
    pub fn availability(&self) -> Option<Availability> {
        let mut values = self.locations.iter().map(|loc| loc.availability);
        let first = values.next()?;
        values.all(|value| value == first).then_some(first)
    }

    /// Identity keys of every location.
    pub fn location_keys(&self) -> impl Iterator<Item = &LocationKey> {
        self.locations.iter().map(|loc| &loc.key)
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "    {} declared in {} locations:",
            self.name,
            self.locations.len()
        )?;
        for location in &self.locations {
            writeln!(f, "        {}", location)?;
        }
        Ok(())
    }
}

/// Declarations extracted for a single compilation type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderDatabase {
    pub declarations: BTreeMap<String, Declaration>,
}

impl HeaderDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a location for `name`, creating the declaration if needed.
    pub fn insert(&mut self, name: &str, location: DeclarationLocation) -> VersionerResult<()> {
        self.declarations
            .entry(name.to_string())
            .or_insert_with(|| Declaration::new(name))
            .add_location(location)
    }

    pub fn get(&self, name: &str) -> Option<&Declaration> {
        self.declarations.get(name)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}
