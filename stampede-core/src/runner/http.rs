use std::collections::BTreeMap;
use std::time::Instant;

use bytes::Bytes;

use super::RunContext;
use super::step::StepError;
use crate::config::{HttpAssertion, HttpStep};
use crate::duration::parse_duration;
use crate::http::{HttpRequest, HttpResponse, request_wire_bytes};
use crate::stats::StepStats;
use stampede_lua::{ScriptHost, Value};

/// Execute one HTTP step: resolve url/body/headers (literal or scripted),
/// issue the request under the optional timeout, record sizes and phase
/// timings into `stats`, publish the `response` object into the script
/// host, then run the assertions in declared order.
///
/// `stats` is filled progressively so byte counts survive a transport
/// failure.
pub(super) async fn run_http(
    step: &HttpStep,
    host: &ScriptHost,
    ctx: &RunContext,
    stats: &mut StepStats,
) -> Result<(), StepError> {
    let url = match (&step.url, &step.url_expr) {
        (Some(url), _) => url.clone(),
        (None, Some(expr)) => {
            let value = host
                .eval(expr.as_str())
                .map_err(|source| StepError::Script {
                    label: "url_expr",
                    source,
                })?;
            match value {
                Value::String(url) => url,
                _ => return Err(StepError::ExpectedString("url_expr")),
            }
        }
        // Unreachable after validation.
        (None, None) => String::new(),
    };

    let body = match &step.request_body {
        Some(body) if body.value.is_some() => body.value.clone().unwrap_or_default(),
        Some(body) => match &body.expr {
            Some(expr) => host
                .eval(expr.as_str())
                .map_err(|source| StepError::Script {
                    label: "request_body",
                    source,
                })?
                .to_string(),
            None => String::new(),
        },
        None => String::new(),
    };

    let timeout = match &step.timeout {
        Some(raw) => Some(parse_duration(raw).map_err(StepError::InvalidTimeout)?),
        None => None,
    };

    let mut headers = Vec::with_capacity(step.headers.len());
    for header in &step.headers {
        if header.name.is_empty() {
            return Err(StepError::HeaderMissingName);
        }

        let value = match (&header.value, &header.expr) {
            (Some(value), _) => value.clone(),
            (None, Some(expr)) => host
                .eval(expr.as_str())
                .map_err(|source| StepError::HeaderExpr {
                    name: header.name.clone(),
                    source,
                })?
                .to_string(),
            (None, None) => return Err(StepError::HeaderMissingValue(header.name.clone())),
        };
        headers.push((header.name.clone(), value));
    }

    let request = HttpRequest {
        method: step.method.as_method(),
        url,
        headers,
        body: Bytes::from(body),
        timeout,
    };

    stats.bytes_sent = Some(request_wire_bytes(&request)?);

    let sent = Instant::now();
    let response = match ctx.client.request(request).await {
        Ok(response) => response,
        Err(err) => {
            stats.duration_request = Some(sent.elapsed());
            return Err(err.into());
        }
    };

    stats.duration_request = Some(response.duration_request);
    stats.duration_response = Some(response.duration_response);
    stats.code = Some(response.status.to_string());
    stats.bytes_received = Some(response.bytes_received);

    publish_response(&response, host)?;

    for assertion in &step.assertions {
        verify_assertion(assertion, &response, host).map_err(StepError::Assertion)?;
    }

    Ok(())
}

/// Make the response visible to scripts as
/// `response = { status, statuscode, header = { Name = first_value } }`.
fn publish_response(response: &HttpResponse, host: &ScriptHost) -> Result<(), StepError> {
    let mut header = BTreeMap::new();
    for (name, value) in &response.headers {
        header
            .entry(name.clone())
            .or_insert_with(|| Value::String(value.clone()));
    }

    let mut object = BTreeMap::new();
    object.insert(
        "status".to_string(),
        Value::String(response.status_line.clone()),
    );
    object.insert("statuscode".to_string(), Value::Int(response.status.into()));
    object.insert("header".to_string(), Value::Object(header));

    host.set("response", &Value::Object(object))
        .map_err(StepError::ResponseObject)
}

fn verify_assertion(
    assertion: &HttpAssertion,
    response: &HttpResponse,
    host: &ScriptHost,
) -> Result<(), String> {
    let name = assertion
        .name
        .as_ref()
        .map(|name| format!("'{name}' "))
        .unwrap_or_default();

    if let Some(expected) = &assertion.status {
        if response.status_line != *expected {
            return Err(format!(
                "assertion {name}on http response status failed: expected '{expected}', got '{}'",
                response.status_line
            ));
        }
    }

    if let Some(expected) = assertion.statuscode {
        if response.status != expected {
            return Err(format!(
                "assertion {name}on http response status code failed: expected {expected}, got {}",
                response.status
            ));
        }
    }

    if let Some(expected) = &assertion.contenttype {
        let got = response.first_header("content-type").unwrap_or_default();
        if got != expected {
            return Err(format!(
                "assertion {name}on http response content type failed: expected '{expected}', got '{got}'"
            ));
        }
    }

    if let Some(min) = assertion.min_body_length {
        if response.bytes_received < min {
            return Err(format!(
                "assertion {name}on http response body length failed: expected >= {min}, got {}",
                response.bytes_received
            ));
        }
    }

    if let Some(max) = assertion.max_body_length {
        if response.bytes_received > max {
            return Err(format!(
                "assertion {name}on http response body length failed: expected <= {max}, got {}",
                response.bytes_received
            ));
        }
    }

    if let Some(expr) = &assertion.expr {
        let value = host
            .eval(expr.as_str())
            .map_err(|err| format!("error executing 'expr' for assertion {name}: {err}"))?;

        match value.as_bool() {
            Some(true) => {}
            Some(false) => return Err(format!("assertion {name}failed")),
            None => {
                return Err(format!("'expr' of assertion {name}must return a boolean"));
            }
        }
    }

    Ok(())
}
