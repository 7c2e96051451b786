//! Availability sanity checks over the declaration database.
//!
//! Runs before cross-validation. A symbol has to carry one availability per
//! compilation type, keep it stable across API levels of an architecture
//! (unless a different declaration takes over), and be consistently either a
//! function or a variable.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::core::{Availability, CompilationType, Declaration, DeclarationKind, DeclarationLocation};
use crate::database::DeclarationDatabase;
use crate::util::Diagnostic;

/// A problem found by [`sanity_check`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SanityIssue {
    /// Locations visible at one compilation type disagree on availability.
    InconsistentLocations {
        symbol: String,
        compilation_type: CompilationType,
        locations: Vec<DeclarationLocation>,
    },
    /// Availability changed between two levels of the same architecture.
    AvailabilityDrift {
        symbol: String,
        earlier: CompilationType,
        earlier_availability: Availability,
        later: CompilationType,
        later_availability: Availability,
        locations: Vec<DeclarationLocation>,
    },
    /// Declared both as a function and as a variable.
    InconsistentKind {
        symbol: String,
        compilation_type: CompilationType,
        locations: Vec<DeclarationLocation>,
    },
}

impl SanityIssue {
    pub fn symbol(&self) -> &str {
        match self {
            SanityIssue::InconsistentLocations { symbol, .. }
            | SanityIssue::AvailabilityDrift { symbol, .. }
            | SanityIssue::InconsistentKind { symbol, .. } => symbol,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            SanityIssue::InconsistentLocations {
                symbol,
                compilation_type,
                locations,
            } => with_locations(
                Diagnostic::error(format!(
                    "inconsistent availability for `{}` at {}",
                    symbol, compilation_type
                )),
                locations,
            ),
            SanityIssue::AvailabilityDrift {
                symbol,
                earlier,
                earlier_availability,
                later,
                later_availability,
                locations,
            } => with_locations(
                Diagnostic::error(format!("availability of `{}` changed", symbol))
                    .with_context(format!("{}: {}", earlier, earlier_availability))
                    .with_context(format!("{}: {}", later, later_availability)),
                locations,
            ),
            SanityIssue::InconsistentKind {
                symbol,
                compilation_type,
                locations,
            } => with_locations(
                Diagnostic::error(format!(
                    "`{}` is declared as both a function and a variable at {}",
                    symbol, compilation_type
                )),
                locations,
            ),
        }
    }
}

fn with_locations(mut diagnostic: Diagnostic, locations: &[DeclarationLocation]) -> Diagnostic {
    for location in locations {
        diagnostic = diagnostic.with_location(location.to_string());
    }
    diagnostic
}

/// Outcome of [`sanity_check`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SanityReport {
    pub issues: Vec<SanityIssue>,
}

impl SanityReport {
    pub fn passed(&self) -> bool {
        self.issues.is_empty()
    }
}

fn shares_location(earlier: &Declaration, later: &Declaration) -> bool {
    let keys: BTreeSet<_> = earlier.location_keys().collect();
    later.location_keys().any(|key| keys.contains(key))
}

/// Check every declaration cell for availability and kind consistency.
pub fn sanity_check(db: &DeclarationDatabase) -> SanityReport {
    let mut issues = BTreeSet::new();

    for (symbol, cells) in db.iter() {
        let mut previous: Option<(CompilationType, &Declaration, Availability)> = None;

        for (&compilation_type, declaration) in cells {
            let locations: Vec<DeclarationLocation> =
                declaration.locations.iter().cloned().collect();

            if declaration.kind() == DeclarationKind::Inconsistent {
                issues.insert(SanityIssue::InconsistentKind {
                    symbol: symbol.clone(),
                    compilation_type,
                    locations: locations.clone(),
                });
            }

            let Some(availability) = declaration.availability() else {
                issues.insert(SanityIssue::InconsistentLocations {
                    symbol: symbol.clone(),
                    compilation_type,
                    locations,
                });
                continue;
            };

            if let Some((earlier, earlier_decl, earlier_availability)) = previous {
                if earlier.arch == compilation_type.arch
                    && earlier_availability != availability
                    && shares_location(earlier_decl, declaration)
                {
                    issues.insert(SanityIssue::AvailabilityDrift {
                        symbol: symbol.clone(),
                        earlier,
                        earlier_availability,
                        later: compilation_type,
                        later_availability: availability,
                        locations,
                    });
                }
            }
            previous = Some((compilation_type, declaration, availability));
        }
    }

    let report = SanityReport {
        issues: issues.into_iter().collect(),
    };
    if report.passed() {
        tracing::info!("sanity check passed for {} symbols", db.len());
    } else {
        tracing::info!("sanity check found {} issues", report.issues.len());
    }
    report
}
