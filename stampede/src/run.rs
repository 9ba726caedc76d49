use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use tracing::info;

use crate::cli::Cli;
use crate::report;
use crate::run_error::RunError;
use crate::summary;
use stampede_core::{Config, RunContext, RunStats};
use stampede_lua::ScriptHost;

pub async fn run(cli: Cli) -> Result<(), RunError> {
    let config = load_config(&cli.file).map_err(RunError::Config)?;

    config
        .validate()
        .map_err(|err| RunError::Config(anyhow::Error::new(err).context("invalid config file")))?;

    let host = ScriptHost::new().map_err(|err| {
        RunError::Internal(anyhow::Error::new(err).context("can't create script host"))
    })?;
    let stats = Arc::new(RunStats::new());
    let ctx = RunContext::new(stats.clone());

    info!("starting tests");
    stats.set_start();

    stampede_core::runner::run_config(&config, &host, &ctx)
        .await
        .map_err(|err| {
            RunError::Config(anyhow::Error::new(err).context("error running tests"))
        })?;

    stats.set_end();
    info!("successfully finished tests");

    let run_summary = stats.aggregate();
    summary::log_summary(&run_summary);

    if let Some(path) = &cli.report {
        info!("writing report to {} ...", path.display());

        let html = report::render(&run_summary)
            .map_err(|err| RunError::Internal(err.context("error generating report")))?;

        std::fs::write(path, html).map_err(|err| {
            RunError::Internal(
                anyhow::Error::new(err)
                    .context(format!("error writing report to {}", path.display())),
            )
        })?;

        info!("successfully generated report");
    }

    Ok(())
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("can't read file {}", path.display()))?;

    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("can't parse yaml file {}", path.display()))?;

    Ok(config)
}
