use std::path::PathBuf;

use chrono::NaiveTime;
use clap::{Parser, ValueEnum};
use dotweave::weaver::TimeOfDay;

/// dotweave - rewrite `_Debug_Weaver` methods of a compiled module in place
#[derive(Debug, Parser)]
#[command(name = "dotweave-cli", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(flatten)]
    pub weave: WeaveArgs,
}

/// Output and logging options.
#[derive(Debug, Parser)]
pub struct GlobalOptions {
    /// Emit the report as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,

    /// Enable verbose (debug-level) logging output.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Where referenced assemblies are looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ResolverKind {
    /// Only the module's directory and the `--reference` paths.
    Search,
    /// Only the built-in catalog of core library types.
    Runtime,
    /// The search path first, then the built-in catalog.
    Chain,
}

#[derive(Debug, Parser)]
pub struct WeaveArgs {
    /// Path to the compiled module.
    #[arg(value_name = "FILE")]
    pub path: PathBuf,

    /// Path to the symbol file; defaults to <stem>.pdb next to the module.
    #[arg(long, value_name = "FILE")]
    pub symbols: Option<PathBuf>,

    /// Referenced module file or directory to search (repeatable).
    #[arg(short = 'r', long = "reference", value_name = "PATH")]
    pub references: Vec<String>,

    /// Preprocessor symbol of the build (repeatable).
    #[arg(short = 'D', long = "define", value_name = "SYMBOL")]
    pub defines: Vec<String>,

    /// Reference resolution policy.
    #[arg(long, value_enum, default_value_t = ResolverKind::Chain)]
    pub resolver: ResolverKind,

    /// Time of day to inject instead of the local clock, as HH:MM:SS.
    #[arg(long, value_name = "HH:MM:SS", value_parser = parse_time)]
    pub time: Option<TimeOfDay>,

    /// Replace marker bodies instead of keeping the original instructions as dead code.
    #[arg(long)]
    pub strip_original: bool,

    /// Weave and report, but do not write the files back.
    #[arg(long)]
    pub dry_run: bool,
}

fn parse_time(value: &str) -> Result<TimeOfDay, String> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .map(TimeOfDay::from)
        .map_err(|e| format!("expected HH:MM:SS: {e}"))
}
