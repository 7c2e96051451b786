//! Cross-validation of declared availability against exported symbols.
//!
//! Every mode checks that what the headers promise is exported. Stub mode
//! additionally checks the reverse direction: NDK stubs must not export a
//! symbol outside the levels its declaration allows, and a symbol must not
//! vanish from the stubs once it has appeared. Real device libraries may
//! legitimately export symbols early, so that direction is skipped for them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

use crate::core::{
    Arch, CompilationType, Declaration, DeclarationKind, DeclarationLocation, SymbolKind,
    TargetCatalog, VersionerResult,
};
use crate::database::{DeclarationDatabase, PlatformSymbolDatabase};
use crate::util::Diagnostic;

/// Which direction(s) to validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Compare against NDK stub libraries, in both directions.
    #[default]
    Stub,
    /// Compare against real device libraries, headers to libraries only.
    Real,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    pub mode: ValidationMode,
    /// Report exported symbols that no header declares.
    pub warn_undeclared: bool,
}

/// What is wrong with one symbol on one architecture.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationIssue {
    KindMismatch {
        api_level: u32,
        declared: SymbolKind,
        exported: SymbolKind,
    },
    /// Declared available but not exported at some of those levels.
    MissingExport { api_levels: Vec<u32> },
    /// Declared available but not exported at any of those levels.
    NeverExported { api_levels: Vec<u32> },
    ExportedTooEarly { api_level: u32, introduced: u32 },
    ExportedAfterObsoleted { api_level: u32, obsoleted: u32 },
    /// Disappeared from the stubs after first appearing.
    StubGap { api_levels: Vec<u32> },
    /// Exported but declared in no header for this architecture.
    Undeclared { api_levels: Vec<u32> },
}

impl ValidationIssue {
    /// Whether this issue fails the run.
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            ValidationIssue::NeverExported { .. } | ValidationIssue::Undeclared { .. }
        )
    }
}

struct Levels<'a>(&'a [u32]);

impl fmt::Display for Levels<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let levels: Vec<String> = self.0.iter().map(u32::to_string).collect();
        f.write_str(&levels.join(", "))
    }
}

/// A validation issue with the symbol, architecture and declarations involved.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Finding {
    pub symbol: String,
    pub arch: Arch,
    #[serde(flatten)]
    pub issue: ValidationIssue,
    pub locations: Vec<DeclarationLocation>,
}

impl Finding {
    pub fn message(&self) -> String {
        let (symbol, arch) = (&self.symbol, self.arch);
        match &self.issue {
            ValidationIssue::KindMismatch {
                api_level,
                declared,
                exported,
            } => format!(
                "`{}` is declared as a {} but exported as a {} at {}-{}",
                symbol, declared, exported, arch, api_level
            ),
            ValidationIssue::MissingExport { api_levels } => format!(
                "`{}` is missing from {} libraries at API levels {}",
                symbol,
                arch,
                Levels(api_levels)
            ),
            ValidationIssue::NeverExported { api_levels } => format!(
                "`{}` is declared for {} but never exported (API levels {})",
                symbol,
                arch,
                Levels(api_levels)
            ),
            ValidationIssue::ExportedTooEarly {
                api_level,
                introduced,
            } => format!(
                "`{}` is exported too early for {}: API level {}, introduced = {}",
                symbol, arch, api_level, introduced
            ),
            ValidationIssue::ExportedAfterObsoleted {
                api_level,
                obsoleted,
            } => format!(
                "`{}` is still exported for {} at API level {}, obsoleted = {}",
                symbol, arch, api_level, obsoleted
            ),
            ValidationIssue::StubGap { api_levels } => format!(
                "gap in stub availability for `{}` on {}: expected at API levels {}",
                symbol,
                arch,
                Levels(api_levels)
            ),
            ValidationIssue::Undeclared { api_levels } => format!(
                "`{}` is exported for {} (API levels {}) but not declared in any header",
                symbol,
                arch,
                Levels(api_levels)
            ),
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diagnostic = match &self.issue {
            ValidationIssue::NeverExported { .. } => Diagnostic::note(self.message()),
            ValidationIssue::Undeclared { .. } => Diagnostic::warning(self.message()),
            _ => Diagnostic::error(self.message()),
        };
        for location in &self.locations {
            diagnostic = diagnostic.with_location(location.to_string());
        }
        diagnostic
    }
}

/// Outcome of [`validate`], sorted by symbol then architecture.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub mode: ValidationMode,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        !self.findings.iter().any(|f| f.issue.is_failure())
    }

    pub fn failures(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.issue.is_failure())
    }
}

fn by_arch<V>(cells: &BTreeMap<CompilationType, V>) -> BTreeMap<Arch, Vec<(u32, &V)>> {
    let mut grouped: BTreeMap<Arch, Vec<(u32, &V)>> = BTreeMap::new();
    for (compilation_type, value) in cells {
        grouped
            .entry(compilation_type.arch)
            .or_default()
            .push((compilation_type.api_level, value));
    }
    grouped
}

fn union_locations(cells: &[(u32, &Declaration)]) -> Vec<DeclarationLocation> {
    let locations: BTreeSet<&DeclarationLocation> =
        cells.iter().flat_map(|(_, decl)| decl.locations.iter()).collect();
    locations.into_iter().cloned().collect()
}

/// The declaration governing `level`: the nearest declared level at or
/// below it, or the earliest declared level when there is none.
fn resolve<'a>(cells: &[(u32, &'a Declaration)], level: u32) -> Option<&'a Declaration> {
    cells
        .iter()
        .rev()
        .find(|(declared, _)| *declared <= level)
        .or_else(|| cells.first())
        .map(|(_, decl)| *decl)
}

/// Validate declarations against exports.
pub fn validate(
    catalog: &TargetCatalog,
    matrix: &BTreeSet<CompilationType>,
    decls: &DeclarationDatabase,
    platform: &PlatformSymbolDatabase,
    options: &ValidateOptions,
) -> VersionerResult<ValidationReport> {
    let mut findings = BTreeSet::new();

    let mut levels_by_arch: BTreeMap<Arch, Vec<u32>> = BTreeMap::new();
    for compilation_type in matrix {
        levels_by_arch
            .entry(compilation_type.arch)
            .or_default()
            .push(compilation_type.api_level);
    }

    for (symbol, cells) in decls.iter() {
        for (arch, arch_cells) in by_arch(cells) {
            let floor = catalog.min_api(arch)?;
            let levels = levels_by_arch.get(&arch).map(Vec::as_slice).unwrap_or_default();
            check_declared(symbol, arch, floor, levels, &arch_cells, platform, &mut findings);
        }
    }

    let stub = options.mode == ValidationMode::Stub;
    if stub || options.warn_undeclared {
        for (symbol, exports) in platform.iter() {
            let declared = decls.get(symbol).map(by_arch).unwrap_or_default();
            for (arch, exported) in by_arch(exports) {
                let exported: Vec<u32> = exported.into_iter().map(|(level, _)| level).collect();
                let arch_cells = declared.get(&arch).map(Vec::as_slice).unwrap_or_default();

                if arch_cells.is_empty() {
                    if options.warn_undeclared {
                        findings.insert(Finding {
                            symbol: symbol.clone(),
                            arch,
                            issue: ValidationIssue::Undeclared {
                                api_levels: exported.clone(),
                            },
                            locations: Vec::new(),
                        });
                    }
                } else if stub {
                    check_exported(symbol, arch, &exported, arch_cells, &mut findings);
                }

                if stub {
                    let levels = levels_by_arch.get(&arch).map(Vec::as_slice).unwrap_or_default();
                    check_gap(symbol, arch, &exported, levels, arch_cells, &mut findings);
                }
            }
        }
    }

    let report = ValidationReport {
        mode: options.mode,
        findings: findings.into_iter().collect(),
    };
    tracing::info!(
        "validation found {} issues ({} failing)",
        report.findings.len(),
        report.failures().count()
    );
    Ok(report)
}

/// Headers to libraries: everything declared available must be exported.
///
/// Every level of `levels` inside the declared interval is checked, including
/// levels the declaration was not compiled in at.
fn check_declared(
    symbol: &str,
    arch: Arch,
    floor: u32,
    levels: &[u32],
    cells: &[(u32, &Declaration)],
    platform: &PlatformSymbolDatabase,
    findings: &mut BTreeSet<Finding>,
) {
    let mut eligible = Vec::new();
    let mut missing = Vec::new();

    for &level in levels {
        let Some(declaration) = resolve(cells, level) else {
            continue;
        };
        let Some(availability) = declaration.availability() else {
            continue;
        };
        if !availability.covers(level, floor) {
            continue;
        }

        let inline = cells
            .iter()
            .any(|&(declared, decl)| declared == level && decl.has_definition());

        match platform.kind(symbol, CompilationType::new(arch, level)) {
            Some(exported) => {
                eligible.push(level);
                let kind = declaration.kind();
                if kind != DeclarationKind::Inconsistent && !kind.matches(exported) {
                    let declared = match exported {
                        SymbolKind::Function => SymbolKind::Variable,
                        SymbolKind::Variable => SymbolKind::Function,
                    };
                    findings.insert(Finding {
                        symbol: symbol.to_string(),
                        arch,
                        issue: ValidationIssue::KindMismatch {
                            api_level: level,
                            declared,
                            exported,
                        },
                        locations: declaration.locations.iter().cloned().collect(),
                    });
                }
            }
            // Inline definitions need no export.
            None if inline => {}
            None => {
                eligible.push(level);
                missing.push(level);
            }
        }
    }

    if missing.is_empty() {
        return;
    }
    let issue = if missing.len() == eligible.len() {
        ValidationIssue::NeverExported {
            api_levels: missing,
        }
    } else {
        ValidationIssue::MissingExport {
            api_levels: missing,
        }
    };
    findings.insert(Finding {
        symbol: symbol.to_string(),
        arch,
        issue,
        locations: union_locations(cells),
    });
}

/// Libraries to headers: nothing may be exported outside its declared range.
fn check_exported(
    symbol: &str,
    arch: Arch,
    exported: &[u32],
    cells: &[(u32, &Declaration)],
    findings: &mut BTreeSet<Finding>,
) {
    let mut too_early = None;
    let mut after_obsoleted = None;

    for &level in exported {
        let Some(availability) = resolve(cells, level).and_then(Declaration::availability) else {
            continue;
        };

        if availability.introduced != 0 && level < availability.introduced {
            too_early.get_or_insert(ValidationIssue::ExportedTooEarly {
                api_level: level,
                introduced: availability.introduced,
            });
        }
        if availability.obsoleted != 0 && level >= availability.obsoleted {
            after_obsoleted.get_or_insert(ValidationIssue::ExportedAfterObsoleted {
                api_level: level,
                obsoleted: availability.obsoleted,
            });
        }
    }

    for issue in too_early.into_iter().chain(after_obsoleted) {
        findings.insert(Finding {
            symbol: symbol.to_string(),
            arch,
            issue,
            locations: union_locations(cells),
        });
    }
}

/// Stubs never drop a symbol once it has appeared, unless it was removed.
fn check_gap(
    symbol: &str,
    arch: Arch,
    exported: &[u32],
    levels: &[u32],
    cells: &[(u32, &Declaration)],
    findings: &mut BTreeSet<Finding>,
) {
    let obsoleted = cells
        .iter()
        .filter_map(|(_, decl)| decl.availability())
        .map(|availability| availability.obsoleted)
        .find(|&obsoleted| obsoleted != 0);

    let Some(&first) = exported.first() else {
        return;
    };
    let gaps: Vec<u32> = levels
        .iter()
        .copied()
        .filter(|&level| level > first && !exported.contains(&level))
        .filter(|&level| obsoleted.map_or(true, |obsoleted| level < obsoleted))
        .collect();

    if !gaps.is_empty() {
        findings.insert(Finding {
            symbol: symbol.to_string(),
            arch,
            issue: ValidationIssue::StubGap { api_levels: gaps },
            locations: union_locations(cells),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Availability;
    use crate::test_support::{catalog, declaration_db, inline_location, location, variable_location};

    fn ct(level: u32) -> CompilationType {
        CompilationType::new(Arch::Arm, level)
    }

    fn matrix(levels: &[u32]) -> BTreeSet<CompilationType> {
        levels.iter().map(|&level| ct(level)).collect()
    }

    fn platform(entries: &[(u32, &str, SymbolKind)]) -> PlatformSymbolDatabase {
        let mut per_type: BTreeMap<CompilationType, BTreeMap<String, SymbolKind>> =
            BTreeMap::new();
        for &(level, name, kind) in entries {
            per_type
                .entry(ct(level))
                .or_default()
                .insert(name.to_string(), kind);
        }
        PlatformSymbolDatabase::from_per_type(per_type)
    }

    fn run(
        levels: &[u32],
        decls: &DeclarationDatabase,
        platform: &PlatformSymbolDatabase,
        mode: ValidationMode,
    ) -> ValidationReport {
        let cat = catalog(&[(Arch::Arm, 9)], levels);
        let options = ValidateOptions {
            mode,
            warn_undeclared: false,
        };
        validate(&cat, &matrix(levels), decls, platform, &options).unwrap()
    }

    fn foo_introduced_at_14() -> DeclarationDatabase {
        let loc = location("foo.h", 1, Availability::introduced(14));
        declaration_db(&[(ct(9), "foo", loc.clone()), (ct(14), "foo", loc)])
    }

    #[test]
    fn test_introduced_symbol_exported_on_time() {
        let decls = foo_introduced_at_14();
        let platform = platform(&[(14, "foo", SymbolKind::Function)]);
        for mode in [ValidationMode::Stub, ValidationMode::Real] {
            let report = run(&[9, 14], &decls, &platform, mode);
            assert!(report.passed(), "{:?}", report);
            assert!(report.findings.is_empty());
        }
    }

    #[test]
    fn test_exported_too_early_only_fails_stub_mode() {
        let decls = foo_introduced_at_14();
        let platform = platform(&[(9, "foo", SymbolKind::Function), (14, "foo", SymbolKind::Function)]);

        assert!(run(&[9, 14], &decls, &platform, ValidationMode::Real).passed());

        let report = run(&[9, 14], &decls, &platform, ValidationMode::Stub);
        assert!(!report.passed());
        assert_eq!(report.findings.len(), 1);
        assert_eq!(
            report.findings[0].issue,
            ValidationIssue::ExportedTooEarly {
                api_level: 9,
                introduced: 14
            }
        );
        assert!(report.findings[0].message().contains("too early"));
        assert_eq!(report.findings[0].locations.len(), 1);
    }

    #[test]
    fn test_too_early_reported_once_per_arch() {
        let loc = location("foo.h", 1, Availability::introduced(14));
        let decls = declaration_db(&[
            (ct(9), "foo", loc.clone()),
            (ct(12), "foo", loc.clone()),
            (ct(14), "foo", loc),
        ]);
        let platform = platform(&[
            (9, "foo", SymbolKind::Function),
            (12, "foo", SymbolKind::Function),
            (14, "foo", SymbolKind::Function),
        ]);
        let report = run(&[9, 12, 14], &decls, &platform, ValidationMode::Stub);
        assert_eq!(report.failures().count(), 1);
    }

    #[test]
    fn test_partial_gap_is_missing_export() {
        let loc = location("bar.h", 2, Availability::default());
        let decls = declaration_db(&[
            (ct(9), "bar", loc.clone()),
            (ct(12), "bar", loc.clone()),
            (ct(14), "bar", loc),
        ]);
        let platform = platform(&[(9, "bar", SymbolKind::Function), (14, "bar", SymbolKind::Function)]);

        let report = run(&[9, 12, 14], &decls, &platform, ValidationMode::Real);
        assert!(!report.passed());
        assert_eq!(
            report.findings[0].issue,
            ValidationIssue::MissingExport {
                api_levels: vec![12]
            }
        );
    }

    #[test]
    fn test_levels_without_declaration_are_checked() {
        let decls = declaration_db(&[(
            ct(21),
            "late",
            location("late.h", 1, Availability::introduced(14)),
        )]);
        let platform = platform(&[(21, "late", SymbolKind::Function)]);

        for mode in [ValidationMode::Stub, ValidationMode::Real] {
            let report = run(&[9, 14, 21], &decls, &platform, mode);
            assert!(!report.passed());
            assert_eq!(
                report.findings[0].issue,
                ValidationIssue::MissingExport {
                    api_levels: vec![14]
                }
            );
        }
    }

    #[test]
    fn test_never_exported_does_not_fail() {
        let loc = location("baz.h", 2, Availability::default());
        let decls = declaration_db(&[(ct(9), "baz", loc.clone()), (ct(14), "baz", loc)]);
        let platform = platform(&[]);

        let report = run(&[9, 14], &decls, &platform, ValidationMode::Stub);
        assert!(report.passed());
        assert_eq!(
            report.findings[0].issue,
            ValidationIssue::NeverExported {
                api_levels: vec![9, 14]
            }
        );
    }

    #[test]
    fn test_inline_definitions_need_no_export() {
        let decls = declaration_db(&[
            (ct(9), "helper", inline_location("h.h", 1, Availability::default())),
            (ct(14), "helper", location("h.h", 5, Availability::default())),
        ]);
        let platform = platform(&[(14, "helper", SymbolKind::Function)]);
        let report = run(&[9, 14], &decls, &platform, ValidationMode::Real);
        assert!(report.findings.is_empty());
    }

    #[test]
    fn test_kind_mismatch() {
        let decls = declaration_db(&[(
            ct(9),
            "environ",
            variable_location("unistd.h", 3, Availability::default()),
        )]);
        let platform = platform(&[(9, "environ", SymbolKind::Function)]);
        let report = run(&[9], &decls, &platform, ValidationMode::Real);
        assert!(!report.passed());
        assert!(matches!(
            report.findings[0].issue,
            ValidationIssue::KindMismatch {
                declared: SymbolKind::Variable,
                exported: SymbolKind::Function,
                ..
            }
        ));
    }

    #[test]
    fn test_exported_after_obsoleted() {
        let loc = location("old.h", 1, Availability::new(9, 0, 14));
        let decls = declaration_db(&[(ct(9), "old", loc.clone()), (ct(14), "old", loc)]);
        let platform = platform(&[(9, "old", SymbolKind::Function), (14, "old", SymbolKind::Function)]);

        let report = run(&[9, 14], &decls, &platform, ValidationMode::Stub);
        assert_eq!(
            report.findings[0].issue,
            ValidationIssue::ExportedAfterObsoleted {
                api_level: 14,
                obsoleted: 14
            }
        );
        assert!(run(&[9, 14], &decls, &platform, ValidationMode::Real).passed());
    }

    #[test]
    fn test_stub_gap() {
        let loc = location("gap.h", 1, Availability::default());
        let decls = declaration_db(&[
            (ct(9), "gappy", loc.clone()),
            (ct(12), "gappy", loc.clone()),
            (ct(14), "gappy", loc),
        ]);
        let platform = platform(&[(9, "gappy", SymbolKind::Function), (14, "gappy", SymbolKind::Function)]);

        let report = run(&[9, 12, 14], &decls, &platform, ValidationMode::Stub);
        assert!(report.findings.iter().any(|f| f.issue
            == ValidationIssue::StubGap {
                api_levels: vec![12]
            }));
    }

    #[test]
    fn test_undeclared_exports() {
        let decls = declaration_db(&[]);
        let platform = platform(&[(9, "hidden", SymbolKind::Function)]);
        let cat = catalog(&[(Arch::Arm, 9)], &[9]);

        let quiet = validate(&cat, &matrix(&[9]), &decls, &platform, &ValidateOptions::default())
            .unwrap();
        assert!(quiet.findings.is_empty());

        let options = ValidateOptions {
            mode: ValidationMode::Real,
            warn_undeclared: true,
        };
        let loud = validate(&cat, &matrix(&[9]), &decls, &platform, &options).unwrap();
        assert!(loud.passed());
        assert!(matches!(
            loud.findings[0].issue,
            ValidationIssue::Undeclared { .. }
        ));
    }

    #[test]
    fn test_findings_sorted_by_symbol() {
        let decls = declaration_db(&[
            (ct(9), "zeta", location("z.h", 1, Availability::default())),
            (ct(9), "alpha", location("a.h", 1, Availability::default())),
        ]);
        let report = run(&[9], &decls, &platform(&[]), ValidationMode::Real);
        let symbols: Vec<&str> = report.findings.iter().map(|f| f.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["alpha", "zeta"]);
    }
}
