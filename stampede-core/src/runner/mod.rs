//! The step-tree executor: walks the configured tests and publishes one
//! [`StepExecution`](crate::stats::StepExecution) per step invocation.
//!
//! Step-level failures (script, transport, assertion) are recorded in the
//! run statistics and never abort the run; only validation and script var
//! setup are fatal.

mod http;
mod step;

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::{Config, LoadTest, LoadTestStep};
use crate::http::HttpClient;
use crate::stats::RunStats;
use stampede_lua::{ScriptHost, Value};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("can't set value for var '{0}'")]
    SetVar(String),
}

/// Shared handles every step executor needs. Cloning is cheap; the HTTP
/// client shares its connection pool across clones.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub client: HttpClient,
    pub stats: Arc<RunStats>,
}

impl RunContext {
    #[must_use]
    pub fn new(stats: Arc<RunStats>) -> Self {
        Self {
            client: HttpClient::default(),
            stats,
        }
    }
}

/// Dotted identifier locating a step inside the tree, e.g. `checkout.2.buy`.
#[derive(Debug, Clone, Default)]
pub struct StepPath(Vec<String>);

impl StepPath {
    #[must_use]
    pub fn root(segment: impl Into<String>) -> Self {
        Self(vec![segment.into()])
    }

    #[must_use]
    pub fn child(&self, segment: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Path for a child step: its explicit name, or its list index.
    #[must_use]
    pub fn for_step(&self, step: &LoadTestStep, index: usize) -> Self {
        match &step.name {
            Some(name) => self.child(name.clone()),
            None => self.child(index.to_string()),
        }
    }
}

impl fmt::Display for StepPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Run every enabled top-level test in declared order.
pub async fn run_config(config: &Config, host: &ScriptHost, ctx: &RunContext) -> Result<()> {
    for test in &config.tests {
        run_test(test, host, ctx).await?;
    }
    Ok(())
}

async fn run_test(test: &LoadTest, host: &ScriptHost, ctx: &RunContext) -> Result<()> {
    let path = StepPath::root(test.name.clone());

    if test.is_disabled() {
        debug!("skipped test {path}");
        return Ok(());
    }

    debug!("starting test {path}");

    for (key, value) in &test.vars {
        let value = yaml_to_value(value);
        host.set(key, &value)
            .map_err(|_| Error::SetVar(key.clone()))?;
    }

    for (i, child) in test.steps.iter().enumerate() {
        step::run_step(child, path.for_step(child, i), host, ctx).await;
    }

    debug!("finished test {path}");
    Ok(())
}

/// Convert an initial `vars` entry into a script value.
pub(crate) fn yaml_to_value(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(v) => Value::Bool(*v),
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        serde_yaml::Value::String(v) => Value::String(v.clone()),
        serde_yaml::Value::Sequence(items) => {
            Value::Array(items.iter().map(yaml_to_value).collect())
        }
        serde_yaml::Value::Mapping(entries) => Value::Object(
            entries
                .iter()
                .filter_map(|(key, value)| Some((yaml_key(key)?, yaml_to_value(value))))
                .collect(),
        ),
        serde_yaml::Value::Tagged(tagged) => yaml_to_value(&tagged.value),
    }
}

fn yaml_key(key: &serde_yaml::Value) -> Option<String> {
    match key {
        serde_yaml::Value::String(v) => Some(v.clone()),
        serde_yaml::Value::Number(v) => Some(v.to_string()),
        serde_yaml::Value::Bool(v) => Some(v.to_string()),
        _ => None,
    }
}
