//! Versioner CLI - availability checking for C platform headers

use std::io::IsTerminal;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use versioner::core::TargetCatalog;
use versioner::header::SourceParser;
use versioner::ops::{
    format_outcome, format_outcome_json, run, DumpOptions, OutputFormat, ValidationMode,
    VersionerOptions,
};

mod cli;

use cli::Cli;

fn main() {
    match execute() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Returns whether the run passed.
fn execute() -> Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("versioner=debug")
    } else {
        EnvFilter::new("versioner=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let output_format: OutputFormat = cli
        .format
        .parse()
        .with_context(|| format!("invalid output format: {}", cli.format))?;

    let catalog = match &cli.catalog {
        Some(path) => TargetCatalog::load(path)
            .with_context(|| format!("failed to load catalog {}", path.display()))?,
        None => TargetCatalog::default(),
    };

    let mut options = VersionerOptions::new(&cli.header_path);
    options.dependency_dir = cli.deps_path.clone();
    options.platform_dir = cli.platform.clone();
    options.archs = cli.archs.iter().copied().collect();
    options.api_levels = cli.api_levels.iter().copied().collect();
    options.mode = if cli.real {
        ValidationMode::Real
    } else {
        ValidationMode::Stub
    };
    options.jobs = cli.jobs;
    options.warn_undeclared = cli.warn_undeclared;
    options.dump = DumpOptions {
        functions: cli.dump_functions,
        variables: cli.dump_variables,
        multiply_declared: cli.dump_multiply_declared,
        symbols: cli.dump_symbols,
    };
    options.dump_base = std::env::current_dir().context("failed to get current directory")?;
    options.progress = !cli.verbose && output_format == OutputFormat::Human;

    let outcome = run(&catalog, &SourceParser::new(), &options)
        .with_context(|| format!("failed to check headers in {}", cli.header_path.display()))?;

    let output = match output_format {
        OutputFormat::Human => {
            let color = !cli.no_color && std::io::stdout().is_terminal();
            format_outcome(&outcome, cli.verbose, color)
        }
        OutputFormat::Json => format_outcome_json(&outcome),
    };
    print!("{}", output);
    if output_format == OutputFormat::Json {
        println!();
    }

    Ok(outcome.passed())
}
