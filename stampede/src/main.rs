mod cli;
mod exit_codes;
mod report;
mod run;
mod run_error;
mod summary;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::exit_codes::ExitCode;

#[tokio::main]
async fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(v) => v,
        Err(err) => {
            use clap::error::ErrorKind;
            let _ = err.print();
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
                _ => ExitCode::Fatal,
            };
            std::process::exit(code.as_i32());
        }
    };

    init_tracing(cli.verbose);

    let code = match run::run(cli).await {
        Ok(()) => ExitCode::Success,
        Err(err) => {
            tracing::error!("{err:#}");
            err.exit_code()
        }
    };

    std::process::exit(code.as_i32());
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
