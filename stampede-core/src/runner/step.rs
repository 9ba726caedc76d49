use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use super::http::run_http;
use super::{RunContext, StepPath};
use crate::config::{ExecStep, LoadTestStep, LogStep, LoopStep, StepVariant, ThreadsStep};
use crate::stats::{StepExecution, StepStats, StepStatus};
use stampede_lua::{ScriptHost, Value};

const DEFAULT_COUNTER_VARIABLE: &str = "counter";

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, thiserror::Error)]
pub(super) enum StepError {
    #[error("error executing '{label}': {source}")]
    Script {
        label: &'static str,
        source: stampede_lua::Error,
    },

    #[error("'{0}' must return a string")]
    ExpectedString(&'static str),

    #[error("error executing 'expr' for header '{name}': {source}")]
    HeaderExpr {
        name: String,
        source: stampede_lua::Error,
    },

    #[error("header item must have a name")]
    HeaderMissingName,

    #[error("header '{0}' must have a child of 'value' | 'expr'")]
    HeaderMissingValue(String),

    #[error("can't parse 'timeout': {0}")]
    InvalidTimeout(String),

    #[error("can't execute http request: {0}")]
    Http(#[from] crate::http::Error),

    #[error("can't assign response object: {0}")]
    ResponseObject(#[source] stampede_lua::Error),

    #[error("{0}")]
    Assertion(String),
}

/// Execute one step: resolve its record path, skip it when disabled,
/// dispatch its variant, and publish the resulting execution record.
///
/// Failures are recorded and logged, never propagated; the returned status
/// lets group steps apply their continuation rules.
pub(super) fn run_step<'a>(
    step: &'a LoadTestStep,
    path: StepPath,
    host: &'a ScriptHost,
    ctx: &'a RunContext,
) -> BoxFuture<'a, StepStatus> {
    Box::pin(async move {
        // Explicitly named steps are recorded under their bare name so that
        // executions of the same step aggregate across loops and threads.
        let record_path = step
            .name
            .clone()
            .unwrap_or_else(|| path.to_string());

        if step.is_disabled() {
            debug!("skipped test step '{path}'");
            ctx.stats.add(StepExecution {
                path: record_path,
                has_explicit_name: step.name.is_some(),
                is_group: step.is_group(),
                started_at: Instant::now(),
                duration_total: Duration::ZERO,
                status: StepStatus::Skipped,
                error: None,
                stats: StepStats::default(),
            });
            return StepStatus::Skipped;
        }

        debug!("starting test step '{path}'");

        let started_at = Instant::now();
        let mut stats = StepStats::default();

        let result = match step.variant() {
            Some(StepVariant::Loop(inner)) => run_loop(inner, &path, host, ctx).await,
            Some(StepVariant::Threads(inner)) => run_threads(inner, &path, host, ctx).await,
            Some(StepVariant::Log(inner)) => run_log(inner, &path, host),
            Some(StepVariant::Http(inner)) => run_http(inner, host, ctx, &mut stats).await,
            Some(StepVariant::Exec(inner)) => run_exec(inner, host),
            // Unreachable after validation.
            None => Ok(()),
        };

        let duration_total = started_at.elapsed();

        let (status, error) = match result {
            Ok(()) => (StepStatus::Success, None),
            Err(err) => {
                error!("test step {path} failed: {err}");
                (StepStatus::Failed, Some(err.to_string()))
            }
        };

        ctx.stats.add(StepExecution {
            path: record_path,
            has_explicit_name: step.name.is_some(),
            is_group: step.is_group(),
            started_at,
            duration_total,
            status,
            error,
            stats,
        });

        debug!("finished test step '{path}'");
        status
    })
}

/// Bounded and/or conditional iteration. Child failures do not end the
/// loop; a failing `while` evaluation fails the loop step itself.
async fn run_loop(
    step: &LoopStep,
    path: &StepPath,
    host: &ScriptHost,
    ctx: &RunContext,
) -> Result<(), StepError> {
    let counter_variable = step
        .counter_variable
        .as_deref()
        .unwrap_or(DEFAULT_COUNTER_VARIABLE);

    let mut counter: i64 = 0;

    loop {
        if let Some(count) = step.count {
            if counter >= count as i64 {
                return Ok(());
            }
        }

        if let Some(condition) = &step.r#while {
            let value = host
                .eval(condition.as_str())
                .map_err(|source| StepError::Script {
                    label: "while",
                    source,
                })?;
            if !value.truthy() {
                return Ok(());
            }
        }

        host.set(counter_variable, &Value::Int(counter))
            .map_err(|source| StepError::Script {
                label: "counter_variable",
                source,
            })?;

        for (i, child) in step.steps.iter().enumerate() {
            run_step(child, path.for_step(child, i), host, ctx).await;
        }

        counter += 1;
    }
}

/// Spawn `count` parallel workers over the shared child list.
///
/// Each worker gets a forked script host and its index in the counter
/// variable. A failing child ends that worker early, and a worker whose
/// host cannot be forked is logged and never started; the step returns
/// once every started worker has joined and is never itself reported as
/// failed.
async fn run_threads(
    step: &ThreadsStep,
    path: &StepPath,
    host: &ScriptHost,
    ctx: &RunContext,
) -> Result<(), StepError> {
    let counter_variable = step
        .counter_variable
        .clone()
        .unwrap_or_else(|| DEFAULT_COUNTER_VARIABLE.to_string());

    let mut workers = Vec::with_capacity(step.count as usize);

    for i in 0..step.count {
        let worker_host = match host.fork() {
            Ok(worker_host) => worker_host,
            Err(err) => {
                error!("worker {i} failed to fork: {err}");
                continue;
            }
        };
        let steps = step.steps.clone();
        let path = path.clone();
        let ctx = ctx.clone();
        let counter_variable = counter_variable.clone();

        workers.push(tokio::spawn(async move {
            if let Err(err) = worker_host.set(&counter_variable, &Value::Int(i as i64)) {
                error!("worker {i} failed to bind counter variable: {err}");
                return;
            }

            for (j, child) in steps.iter().enumerate() {
                let status = run_step(child, path.for_step(child, j), &worker_host, &ctx).await;
                if status == StepStatus::Failed {
                    error!("step {j} of worker {i} failed, stopping worker");
                    return;
                }
            }
        }));
    }

    for worker in workers {
        let _ = worker.await;
    }

    Ok(())
}

fn run_log(step: &LogStep, path: &StepPath, host: &ScriptHost) -> Result<(), StepError> {
    if let Some(msg) = &step.msg {
        info!("[{path}]: {msg}");
        return Ok(());
    }

    if let Some(expr) = &step.expr {
        let value = host
            .eval(expr.as_str())
            .map_err(|source| StepError::Script {
                label: "expr",
                source,
            })?;
        info!("[{path}]: {value}");
    }

    Ok(())
}

fn run_exec(step: &ExecStep, host: &ScriptHost) -> Result<(), StepError> {
    host.eval(step.script.as_str())
        .map(|_| ())
        .map_err(|source| StepError::Script {
            label: "script",
            source,
        })
}
