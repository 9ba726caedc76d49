//! HTML report rendering.
//!
//! The report is a single self-contained document: run header, global
//! counters, a table of per-step rollups (groups and anonymous steps are
//! excluded), and a JSON payload the embedded script renders as an
//! execution timeline.

use anyhow::Context as _;
use askama::Template;
use serde::Serialize;

use stampede_core::RunSummary;
use stampede_core::stats::StepRollup;

#[derive(Template)]
#[template(path = "report.html")]
struct ReportTemplate {
    datetime: String,
    duration_total: String,
    count_steps_total: u64,
    count_steps_skipped: u64,
    count_steps_succeeded: u64,
    count_steps_failed: u64,
    steps: Vec<ReportStep>,
    executions_json: String,
}

struct ReportStep {
    name: String,
    count_total: u64,
    count_skipped: u64,
    count_succeeded: u64,
    count_failed: u64,
    duration_avg_ms: u128,
    duration_min_ms: u128,
    duration_max_ms: u128,
    bytes_sent: String,
    bytes_received: String,
    codes: Vec<ReportCode>,
    errors: Vec<String>,
}

struct ReportCode {
    value: String,
    count: u64,
}

#[derive(Serialize)]
struct Timeline {
    steps: Vec<TimelineStep>,
}

#[derive(Serialize)]
struct TimelineStep {
    name: String,
    executions: Vec<TimelineExecution>,
}

#[derive(Serialize)]
struct TimelineExecution {
    /// Milliseconds since run start.
    start_time: u64,
    duration_total: u64,
}

pub fn render(summary: &RunSummary) -> anyhow::Result<String> {
    let reported: Vec<&StepRollup> = summary
        .steps
        .iter()
        .filter(|step| !step.is_group && step.has_explicit_name)
        .collect();

    let timeline = Timeline {
        steps: reported
            .iter()
            .map(|step| TimelineStep {
                name: step.path.clone(),
                executions: step
                    .executions
                    .iter()
                    .map(|span| TimelineExecution {
                        start_time: span.start_offset.as_millis() as u64,
                        duration_total: span.duration_total.as_millis() as u64,
                    })
                    .collect(),
            })
            .collect(),
    };

    let executions_json = serde_json::to_string(&timeline)
        .context("encode timeline json")?
        .replace("</script", "<\\/script");

    let template = ReportTemplate {
        datetime: summary.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        duration_total: format!("{:.1?}", summary.duration_total),
        count_steps_total: summary.count_steps_total,
        count_steps_skipped: summary.count_steps_skipped,
        count_steps_succeeded: summary.count_steps_succeeded,
        count_steps_failed: summary.count_steps_failed,
        steps: reported.into_iter().map(report_step).collect(),
        executions_json,
    };

    template.render().context("render report template")
}

fn report_step(step: &StepRollup) -> ReportStep {
    ReportStep {
        name: step.path.clone(),
        count_total: step.count_total,
        count_skipped: step.count_skipped,
        count_succeeded: step.count_succeeded,
        count_failed: step.count_failed,
        duration_avg_ms: step.duration_avg.as_millis(),
        duration_min_ms: step.duration_min.as_millis(),
        duration_max_ms: step.duration_max.as_millis(),
        bytes_sent: format_byte_stats(&step.bytes_sent),
        bytes_received: format_byte_stats(&step.bytes_received),
        codes: step
            .codes
            .iter()
            .map(|(value, count)| ReportCode {
                value: value.clone(),
                count: *count,
            })
            .collect(),
        errors: step.errors.clone(),
    }
}

fn format_byte_stats(stats: &Option<stampede_core::stats::ByteStats>) -> String {
    match stats {
        Some(stats) => format!(
            "{:.0} b (min {} / max {})",
            stats.avg, stats.min, stats.max
        ),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use stampede_core::stats::{ByteStats, ExecutionSpan};

    fn rollup(path: &str, named: bool, group: bool) -> StepRollup {
        StepRollup {
            path: path.to_string(),
            has_explicit_name: named,
            is_group: group,
            count_total: 2,
            count_skipped: 0,
            count_succeeded: 1,
            count_failed: 1,
            duration_min: Duration::from_millis(10),
            duration_max: Duration::from_millis(30),
            duration_avg: Duration::from_millis(20),
            bytes_sent: Some(ByteStats {
                min: 100,
                max: 120,
                avg: 110.0,
            }),
            bytes_received: None,
            codes: BTreeMap::from([("200".to_string(), 2)]),
            errors: vec!["assertion failed".to_string()],
            executions: vec![
                ExecutionSpan {
                    start_offset: Duration::from_millis(0),
                    duration_total: Duration::from_millis(10),
                },
                ExecutionSpan {
                    start_offset: Duration::from_millis(15),
                    duration_total: Duration::from_millis(30),
                },
            ],
        }
    }

    fn summary() -> RunSummary {
        RunSummary {
            started_at: chrono::DateTime::from_timestamp(1_700_000_000, 0)
                .unwrap_or_else(chrono::Utc::now),
            duration_total: Duration::from_millis(1500),
            count_steps_total: 4,
            count_steps_skipped: 0,
            count_steps_succeeded: 3,
            count_steps_failed: 1,
            steps: vec![
                rollup("check", true, false),
                rollup("swarm", true, true),
                rollup("t.2", false, false),
            ],
        }
    }

    #[test]
    fn report_contains_counters_and_named_leaf_steps_only() {
        let html = render(&summary()).unwrap_or_else(|err| panic!("{err:#}"));

        assert!(html.contains("2023-11-14"));
        assert!(html.contains("check"));
        assert!(html.contains("200"));
        assert!(html.contains("assertion failed"));

        // Groups and anonymous steps are filtered from the table.
        assert!(!html.contains("swarm"));
        assert!(!html.contains("t.2"));
    }

    #[test]
    fn report_embeds_the_timeline_json() {
        let html = render(&summary()).unwrap_or_else(|err| panic!("{err:#}"));

        assert!(html.contains(r#""steps":[{"name":"check""#), "html: {html}");
        assert!(html.contains(r#""start_time":15"#));
        assert!(html.contains(r#""duration_total":30"#));
    }

    #[test]
    fn script_terminators_in_json_are_escaped() {
        let mut s = summary();
        s.steps[0].path = "</script><script>alert(1)".to_string();
        let html = render(&s).unwrap_or_else(|err| panic!("{err:#}"));
        assert!(!html.contains("</script><script>alert(1)\""));
    }
}
