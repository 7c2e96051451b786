//! The full versioner pipeline and its output formats.

use std::collections::BTreeSet;
use std::fmt::Write;
use std::path::PathBuf;

use serde::Serialize;

use crate::core::{compilation_matrix, Arch, TargetCatalog, VersionerResult};
use crate::database::PlatformSource;
use crate::header::HeaderParser;
use crate::ops::compile::{compile_headers, CompileOptions, DEFAULT_JOBS};
use crate::ops::dump::{
    dump_functions, dump_multiply_declared, dump_symbols, dump_variables, Dumps,
};
use crate::ops::sanity::{sanity_check, SanityReport};
use crate::ops::validate::{validate, ValidateOptions, ValidationMode, ValidationReport};
use crate::util::Severity;

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable output (default)
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = OutputFormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            _ => Err(OutputFormatParseError(s.to_string())),
        }
    }
}

/// Error parsing output format option.
#[derive(Debug, Clone)]
pub struct OutputFormatParseError(pub String);

impl std::fmt::Display for OutputFormatParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid output format '{}', valid values: human, json",
            self.0
        )
    }
}

impl std::error::Error for OutputFormatParseError {}

/// Which listings to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DumpOptions {
    pub functions: bool,
    pub variables: bool,
    pub multiply_declared: bool,
    /// Requires a platform directory.
    pub symbols: bool,
}

/// Options for a whole run.
#[derive(Debug, Clone)]
pub struct VersionerOptions {
    pub header_dir: PathBuf,
    pub dependency_dir: Option<PathBuf>,
    /// Platform tree to validate against; headers are only checked for
    /// internal consistency without one.
    pub platform_dir: Option<PathBuf>,
    /// Empty means every supported architecture.
    pub archs: BTreeSet<Arch>,
    /// Empty means every supported API level.
    pub api_levels: BTreeSet<u32>,
    pub mode: ValidationMode,
    pub jobs: usize,
    pub warn_undeclared: bool,
    pub dump: DumpOptions,
    /// Dumped positions are shown relative to this directory.
    pub dump_base: PathBuf,
    pub progress: bool,
}

impl VersionerOptions {
    pub fn new(header_dir: impl Into<PathBuf>) -> Self {
        VersionerOptions {
            header_dir: header_dir.into(),
            dependency_dir: None,
            platform_dir: None,
            archs: BTreeSet::new(),
            api_levels: BTreeSet::new(),
            mode: ValidationMode::default(),
            jobs: DEFAULT_JOBS,
            warn_undeclared: false,
            dump: DumpOptions::default(),
            dump_base: PathBuf::from("."),
            progress: false,
        }
    }
}

/// Everything a run found.
#[derive(Debug, Clone, Serialize)]
pub struct VersionerOutcome {
    pub passed: bool,
    pub symbols: usize,
    pub compilation_types: usize,
    pub sanity: SanityReport,
    /// Absent when no platform was given or the sanity check failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Dumps::is_empty")]
    pub dumps: Dumps,
}

impl VersionerOutcome {
    pub fn passed(&self) -> bool {
        self.passed
    }
}

/// Compile the headers, check them, and validate them against the platform.
pub fn run(
    catalog: &TargetCatalog,
    parser: &dyn HeaderParser,
    options: &VersionerOptions,
) -> VersionerResult<VersionerOutcome> {
    let matrix = compilation_matrix(catalog, &options.archs, &options.api_levels)?;

    let compile_options = CompileOptions {
        header_dir: options.header_dir.clone(),
        dependency_dir: options.dependency_dir.clone(),
        jobs: options.jobs,
        progress: options.progress,
    };
    let decls = compile_headers(parser, catalog, &matrix, &compile_options)?;

    let base = &options.dump_base;
    let mut dumps = Dumps {
        functions: options.dump.functions.then(|| dump_functions(&decls, base)),
        variables: options.dump.variables.then(|| dump_variables(&decls, base)),
        multiply_declared: None,
        symbols: None,
    };
    if options.dump.multiply_declared {
        dumps.multiply_declared = Some(dump_multiply_declared(&decls, base)?);
    }

    let platform = match &options.platform_dir {
        Some(dir) => {
            let source = PlatformSource::detect(dir)?;
            tracing::info!("reading platform symbols from {:?}", source);
            Some(source.build(catalog, &matrix)?)
        }
        None => None,
    };
    if options.dump.symbols {
        dumps.symbols = platform.as_ref().map(dump_symbols);
    }

    let sanity = sanity_check(&decls);
    let validation = match &platform {
        Some(platform) if sanity.passed() => {
            let validate_options = ValidateOptions {
                mode: options.mode,
                warn_undeclared: options.warn_undeclared,
            };
            Some(validate(
                catalog,
                &matrix,
                &decls,
                platform,
                &validate_options,
            )?)
        }
        Some(_) => {
            tracing::warn!("skipping validation: sanity check failed");
            None
        }
        None => None,
    };

    let passed = sanity.passed() && validation.as_ref().map_or(true, ValidationReport::passed);
    Ok(VersionerOutcome {
        passed,
        symbols: decls.len(),
        compilation_types: matrix.len(),
        sanity,
        validation,
        dumps,
    })
}

/// Format an outcome for the terminal.
///
/// Notes and warnings about validation findings are only shown when
/// `verbose` is set.
pub fn format_outcome(outcome: &VersionerOutcome, verbose: bool, color: bool) -> String {
    let mut output = String::new();

    if !outcome.dumps.is_empty() {
        write!(output, "{}", outcome.dumps).unwrap();
        writeln!(output).unwrap();
    }

    for issue in &outcome.sanity.issues {
        write!(output, "{}", issue.to_diagnostic().format(color)).unwrap();
    }

    if let Some(validation) = &outcome.validation {
        for finding in &validation.findings {
            let diagnostic = finding.to_diagnostic();
            if diagnostic.severity == Severity::Error || verbose {
                write!(output, "{}", diagnostic.format(color)).unwrap();
            }
        }
    }

    if !outcome.sanity.passed() {
        writeln!(
            output,
            "sanity check failed: {} issues",
            outcome.sanity.issues.len()
        )
        .unwrap();
    } else if let Some(validation) = outcome.validation.as_ref().filter(|v| !v.passed()) {
        writeln!(
            output,
            "validation failed: {} failing issues",
            validation.failures().count()
        )
        .unwrap();
    } else {
        let checked = if outcome.validation.is_some() {
            "validated"
        } else {
            "checked"
        };
        writeln!(
            output,
            "{} {} symbols across {} compilation types",
            checked, outcome.symbols, outcome.compilation_types
        )
        .unwrap();
    }

    output
}

/// Format an outcome as JSON.
pub fn format_outcome_json(outcome: &VersionerOutcome) -> String {
    serde_json::to_string_pretty(outcome)
        .unwrap_or_else(|e| format!(r#"{{"error": "Failed to serialize outcome: {}"}}"#, e))
}
