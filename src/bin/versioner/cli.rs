//! CLI definitions using clap.

use std::path::PathBuf;

use clap::Parser;
use versioner::core::Arch;

/// Validate availability annotations in C platform headers against the
/// symbols exported by the platform's libraries.
#[derive(Parser)]
#[command(name = "versioner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root of the headers to check
    pub header_path: PathBuf,

    /// Directory whose entries are added to the include search path
    pub deps_path: Option<PathBuf>,

    /// API level to check (repeatable, defaults to all)
    #[arg(short = 'a', long = "api", value_name = "LEVEL")]
    pub api_levels: Vec<u32>,

    /// Architecture to check (repeatable, defaults to all)
    #[arg(long = "arch", value_name = "ARCH")]
    pub archs: Vec<Arch>,

    /// Platform tree (stub libraries, real libraries, or symbol manifests)
    #[arg(short, long, value_name = "DIR")]
    pub platform: Option<PathBuf>,

    /// Compare against real device libraries instead of NDK stubs
    #[arg(short, long, requires = "platform")]
    pub real: bool,

    /// Number of parallel jobs
    #[arg(short, long, default_value_t = versioner::ops::DEFAULT_JOBS)]
    pub jobs: usize,

    /// Target catalog (TOML) replacing the built-in Android table
    #[arg(long, value_name = "FILE", env = "VERSIONER_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Warn about exported symbols that no header declares
    #[arg(short = 'u', long)]
    pub warn_undeclared: bool,

    /// List functions declared in the headers
    #[arg(long)]
    pub dump_functions: bool,

    /// List variables declared in the headers
    #[arg(long)]
    pub dump_variables: bool,

    /// List symbols declared in more than one place
    #[arg(long)]
    pub dump_multiply_declared: bool,

    /// List symbols exported by the platform
    #[arg(long, requires = "platform")]
    pub dump_symbols: bool,

    /// Output format: human, json
    #[arg(long, default_value = "human")]
    pub format: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}
