use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "stampede",
    author,
    version,
    about = "Declarative YAML-driven load testing tool",
    long_about = "stampede executes a tree of load tests described in a YAML document.\n\nEach test is a sequence of steps: HTTP calls, script executions, log emissions, loops, and parallel thread groups. Steps can compute URLs, bodies, headers and assertions with embedded Lua expressions.\n\nThe run prints per-step statistics and can write an HTML report.",
    after_help = "Examples:\n  stampede -f loadtest.yaml\n  stampede -f loadtest.yaml -r report.html\n  stampede -f loadtest.yaml -v"
)]
pub struct Cli {
    /// Path to the test definition YAML
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    pub file: PathBuf,

    /// Write an HTML report to this path after the run
    #[arg(short = 'r', long = "report", value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
