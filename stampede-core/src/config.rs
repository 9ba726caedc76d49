//! The test definition document: a tree of load tests and steps.
//!
//! The model is deserialized once from YAML and is read-only afterwards.
//! Structural rules that serde cannot express (exactly one step variant,
//! positive counts, non-empty names) are enforced by [`Config::validate`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const CONFIG_VERSION_V1: &str = "v1";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    fn nested(self, context: impl std::fmt::Display) -> Self {
        Self(format!("{context}: {self}"))
    }
}

/// A script fragment evaluated in the test's script host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptExpr(String);

impl ScriptExpr {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<LoadTest>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version != CONFIG_VERSION_V1 {
            return Err(ValidationError::new(format!(
                "unsupported config version '{}'",
                self.version
            )));
        }

        for test in &self.tests {
            test.validate()
                .map_err(|err| err.nested(format!("error in load test '{}'", test.name)))?;
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTest {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    /// Initial script variables, bound before the first step runs.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, serde_yaml::Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<LoadTestStep>,
}

impl LoadTest {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::new("no name for load test defined"));
        }

        if self.steps.is_empty() {
            return Err(ValidationError::new(format!(
                "no steps defined for load test '{}'",
                self.name
            )));
        }

        validate_steps(&self.steps, &format!("of load test '{}'", self.name))
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }
}

fn validate_steps(steps: &[LoadTestStep], context: &str) -> Result<(), ValidationError> {
    for (i, step) in steps.iter().enumerate() {
        step.validate()
            .map_err(|err| err.nested(format!("error in step {} {context}", i + 1)))?;
    }
    Ok(())
}

/// One unit of declared work. Exactly one variant field is populated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoadTestStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#loop: Option<LoopStep>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<ThreadsStep>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<LogStep>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpStep>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<ExecStep>,
}

#[derive(Debug, Clone, Copy)]
pub enum StepVariant<'a> {
    Loop(&'a LoopStep),
    Threads(&'a ThreadsStep),
    Log(&'a LogStep),
    Http(&'a HttpStep),
    Exec(&'a ExecStep),
}

impl LoadTestStep {
    #[must_use]
    pub fn variant(&self) -> Option<StepVariant<'_>> {
        if let Some(v) = &self.r#loop {
            return Some(StepVariant::Loop(v));
        }
        if let Some(v) = &self.threads {
            return Some(StepVariant::Threads(v));
        }
        if let Some(v) = &self.log {
            return Some(StepVariant::Log(v));
        }
        if let Some(v) = &self.http {
            return Some(StepVariant::Http(v));
        }
        if let Some(v) = &self.exec {
            return Some(StepVariant::Exec(v));
        }
        None
    }

    /// Group steps (loop, threads) produce no leaf statistics of their own.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.r#loop.is_some() || self.threads.is_some()
    }

    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled.unwrap_or(false)
    }

    fn populated_variants(&self) -> usize {
        usize::from(self.r#loop.is_some())
            + usize::from(self.threads.is_some())
            + usize::from(self.log.is_some())
            + usize::from(self.http.is_some())
            + usize::from(self.exec.is_some())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.populated_variants() != 1 {
            return Err(ValidationError::new(
                "step must contain exactly one of 'loop' | 'threads' | 'log' | 'http' | 'exec'",
            ));
        }

        let name = self.name.as_deref().unwrap_or_default();
        let nested = |kind: &str, err: ValidationError| {
            err.nested(format!("error in step '{name}': invalid {kind}"))
        };

        match self.variant() {
            Some(StepVariant::Loop(v)) => v.validate().map_err(|err| nested("loop", err)),
            Some(StepVariant::Threads(v)) => v.validate().map_err(|err| nested("threads", err)),
            Some(StepVariant::Log(v)) => v.validate().map_err(|err| nested("log", err)),
            Some(StepVariant::Http(v)) => v.validate().map_err(|err| nested("http", err)),
            Some(StepVariant::Exec(v)) => v.validate().map_err(|err| nested("exec", err)),
            None => unreachable!("populated_variants() == 1"),
        }
    }
}

/// Bounded and/or conditional iteration over a child step list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#while: Option<ScriptExpr>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_variable: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<LoadTestStep>,
}

impl LoopStep {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.count.is_none() && self.r#while.is_none() {
            return Err(ValidationError::new(
                "loop must contain one of 'count' | 'while'",
            ));
        }

        if self.count == Some(0) {
            return Err(ValidationError::new("count must be greater than 0"));
        }

        validate_steps(&self.steps, "of loop")
    }
}

/// N parallel virtual users running a shared child step list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadsStep {
    pub count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counter_variable: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<LoadTestStep>,
}

impl ThreadsStep {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.count == 0 {
            return Err(ValidationError::new("count must be greater than 0"));
        }

        validate_steps(&self.steps, "of threads")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<ScriptExpr>,
}

impl LogStep {
    fn validate(&self) -> Result<(), ValidationError> {
        match (&self.msg, &self.expr) {
            (Some(msg), None) if msg.is_empty() => {
                Err(ValidationError::new("msg must not be empty"))
            }
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(ValidationError::new(
                "log must contain exactly one of 'msg' | 'expr'",
            )),
        }
    }
}

/// A script fragment evaluated for its side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecStep {
    pub script: ScriptExpr,
}

impl ExecStep {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.script.is_empty() {
            return Err(ValidationError::new("script must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Connect,
    Options,
    Trace,
    Patch,
}

impl HttpMethod {
    #[must_use]
    pub fn as_method(self) -> http::Method {
        match self {
            Self::Get => http::Method::GET,
            Self::Post => http::Method::POST,
            Self::Put => http::Method::PUT,
            Self::Delete => http::Method::DELETE,
            Self::Head => http::Method::HEAD,
            Self::Connect => http::Method::CONNECT,
            Self::Options => http::Method::OPTIONS,
            Self::Trace => http::Method::TRACE,
            Self::Patch => http::Method::PATCH,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<ScriptExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<ScriptExpr>,
}

/// A predicate over the HTTP response. All populated clauses must hold,
/// evaluated in field order; the first failing clause fails the step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HttpAssertion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Full status line, e.g. `200 OK`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statuscode: Option<u16>,

    /// First `Content-Type` header value, compared exactly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contenttype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_body_length: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_body_length: Option<u64>,

    /// Script expression that must evaluate to boolean true.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expr: Option<ScriptExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpStep {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_expr: Option<ScriptExpr>,

    pub method: HttpMethod,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<HttpBody>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HttpHeader>,

    /// Duration string, e.g. `500ms` or `1.5s`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assertions: Vec<HttpAssertion>,
}

impl HttpStep {
    fn validate(&self) -> Result<(), ValidationError> {
        match (&self.url, &self.url_expr) {
            (Some(url), None) if url.is_empty() => {
                Err(ValidationError::new("'url' must not be empty"))
            }
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(ValidationError::new(
                "http must contain exactly one of 'url' | 'url_expr'",
            )),
        }
    }
}
