//! Run statistics: a concurrent sink of per-step execution records and the
//! post-run aggregation that rolls them up per step path.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        })
    }
}

/// Measurements a leaf step variant reports for one invocation.
/// Fields stay unset unless the variant produced them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepStats {
    pub duration_request: Option<Duration>,
    pub duration_response: Option<Duration>,
    /// Status code as a decimal string, e.g. `"200"`.
    pub code: Option<String>,
    pub bytes_sent: Option<u64>,
    pub bytes_received: Option<u64>,
}

/// Canonical record of one step invocation.
#[derive(Debug, Clone)]
pub struct StepExecution {
    /// Explicit step name, or the dotted path synthesised from the parents
    /// and the step index.
    pub path: String,
    pub has_explicit_name: bool,
    /// True for loop/threads steps; groups have no leaf stats of their own.
    pub is_group: bool,
    pub started_at: Instant,
    pub duration_total: Duration,
    pub status: StepStatus,
    pub error: Option<String>,
    pub stats: StepStats,
}

#[derive(Debug, Clone, Copy)]
struct RunStart {
    instant: Instant,
    datetime: DateTime<Utc>,
}

/// Thread-safe sink of step executions.
///
/// `add` is the only mutation path and holds the mutex just for the append.
/// The start/end boundaries are set once by the orchestrator; after
/// `set_end` the stats are read-only.
#[derive(Debug, Default)]
pub struct RunStats {
    executions: Mutex<Vec<StepExecution>>,
    started: OnceLock<RunStart>,
    ended: OnceLock<Instant>,
}

impl RunStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_start(&self) {
        let _ = self.started.set(RunStart {
            instant: Instant::now(),
            datetime: Utc::now(),
        });
    }

    pub fn set_end(&self) {
        let _ = self.ended.set(Instant::now());
    }

    pub fn add(&self, execution: StepExecution) {
        let mut executions = self
            .executions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        executions.push(execution);
    }

    /// Roll the recorded executions up per distinct step path.
    ///
    /// Runs single-threaded after `set_end`; the result is deterministic
    /// for a given execution list regardless of append order, modulo
    /// floating-point byte averages.
    #[must_use]
    pub fn aggregate(&self) -> RunSummary {
        let executions = self
            .executions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let run_start = self.started.get().copied();
        let start_instant = run_start
            .map(|s| s.instant)
            .or_else(|| executions.iter().map(|e| e.started_at).min())
            .unwrap_or_else(Instant::now);
        let started_at = run_start.map_or_else(Utc::now, |s| s.datetime);

        let duration_total = match (run_start, self.ended.get()) {
            (Some(start), Some(end)) => end.duration_since(start.instant),
            _ => executions
                .iter()
                .map(|e| e.started_at.duration_since(start_instant) + e.duration_total)
                .max()
                .unwrap_or_default(),
        };

        let mut summary = RunSummary {
            started_at,
            duration_total,
            count_steps_total: 0,
            count_steps_skipped: 0,
            count_steps_succeeded: 0,
            count_steps_failed: 0,
            steps: Vec::new(),
        };

        let mut index_by_path: HashMap<String, usize> = HashMap::new();
        let mut builders: Vec<RollupBuilder> = Vec::new();

        for execution in &executions {
            summary.count_steps_total += 1;
            match execution.status {
                StepStatus::Success => summary.count_steps_succeeded += 1,
                StepStatus::Failed => summary.count_steps_failed += 1,
                StepStatus::Skipped => summary.count_steps_skipped += 1,
            }

            let idx = *index_by_path
                .entry(execution.path.clone())
                .or_insert_with(|| {
                    builders.push(RollupBuilder::new(execution));
                    builders.len() - 1
                });
            builders[idx].record(execution, start_instant);
        }

        summary.steps = builders.into_iter().map(RollupBuilder::finish).collect();
        summary
    }
}

/// Aggregated view of a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub duration_total: Duration,
    pub count_steps_total: u64,
    pub count_steps_skipped: u64,
    pub count_steps_succeeded: u64,
    pub count_steps_failed: u64,
    /// One rollup per distinct path, in first-seen order.
    pub steps: Vec<StepRollup>,
}

/// Aggregate over byte samples. Only present when at least one execution
/// reported the field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ByteStats {
    pub min: u64,
    pub max: u64,
    pub avg: f64,
}

/// One execution reduced to what the report timeline needs.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSpan {
    /// Offset from run start.
    pub start_offset: Duration,
    pub duration_total: Duration,
}

#[derive(Debug, Clone)]
pub struct StepRollup {
    pub path: String,
    pub has_explicit_name: bool,
    pub is_group: bool,
    pub count_total: u64,
    pub count_skipped: u64,
    pub count_succeeded: u64,
    pub count_failed: u64,
    pub duration_min: Duration,
    pub duration_max: Duration,
    /// `round(sum / count)`.
    pub duration_avg: Duration,
    pub bytes_sent: Option<ByteStats>,
    pub bytes_received: Option<ByteStats>,
    /// Status-code string -> occurrence count.
    pub codes: BTreeMap<String, u64>,
    /// Distinct error messages in first-seen order.
    pub errors: Vec<String>,
    pub executions: Vec<ExecutionSpan>,
}

#[derive(Debug, Default)]
struct SampleAgg {
    count: u64,
    sum: u64,
    min: u64,
    max: u64,
}

impl SampleAgg {
    fn record(&mut self, sample: u64) {
        if self.count == 0 {
            self.min = sample;
            self.max = sample;
        } else {
            self.min = self.min.min(sample);
            self.max = self.max.max(sample);
        }
        self.sum = self.sum.saturating_add(sample);
        self.count += 1;
    }

    fn finish(&self) -> Option<ByteStats> {
        if self.count == 0 {
            return None;
        }
        Some(ByteStats {
            min: self.min,
            max: self.max,
            avg: self.sum as f64 / self.count as f64,
        })
    }
}

struct RollupBuilder {
    path: String,
    has_explicit_name: bool,
    is_group: bool,
    count_total: u64,
    count_skipped: u64,
    count_succeeded: u64,
    count_failed: u64,
    duration_sum: Duration,
    duration_min: Duration,
    duration_max: Duration,
    bytes_sent: SampleAgg,
    bytes_received: SampleAgg,
    codes: BTreeMap<String, u64>,
    errors: Vec<String>,
    errors_seen: HashSet<String>,
    executions: Vec<ExecutionSpan>,
}

impl RollupBuilder {
    fn new(first: &StepExecution) -> Self {
        Self {
            path: first.path.clone(),
            has_explicit_name: first.has_explicit_name,
            is_group: first.is_group,
            count_total: 0,
            count_skipped: 0,
            count_succeeded: 0,
            count_failed: 0,
            duration_sum: Duration::ZERO,
            duration_min: Duration::ZERO,
            duration_max: Duration::ZERO,
            bytes_sent: SampleAgg::default(),
            bytes_received: SampleAgg::default(),
            codes: BTreeMap::new(),
            errors: Vec::new(),
            errors_seen: HashSet::new(),
            executions: Vec::new(),
        }
    }

    fn record(&mut self, execution: &StepExecution, run_start: Instant) {
        if self.count_total == 0 {
            self.duration_min = execution.duration_total;
            self.duration_max = execution.duration_total;
        } else {
            self.duration_min = self.duration_min.min(execution.duration_total);
            self.duration_max = self.duration_max.max(execution.duration_total);
        }
        self.duration_sum = self.duration_sum.saturating_add(execution.duration_total);
        self.count_total += 1;

        match execution.status {
            StepStatus::Success => self.count_succeeded += 1,
            StepStatus::Failed => self.count_failed += 1,
            StepStatus::Skipped => self.count_skipped += 1,
        }

        if let Some(bytes) = execution.stats.bytes_sent {
            self.bytes_sent.record(bytes);
        }
        if let Some(bytes) = execution.stats.bytes_received {
            self.bytes_received.record(bytes);
        }
        if let Some(code) = &execution.stats.code {
            *self.codes.entry(code.clone()).or_insert(0) += 1;
        }
        if let Some(error) = &execution.error {
            if self.errors_seen.insert(error.clone()) {
                self.errors.push(error.clone());
            }
        }

        self.executions.push(ExecutionSpan {
            start_offset: execution.started_at.duration_since(run_start),
            duration_total: execution.duration_total,
        });
    }

    fn finish(self) -> StepRollup {
        let avg_nanos = (self.duration_sum.as_nanos() as f64 / self.count_total as f64).round();
        StepRollup {
            path: self.path,
            has_explicit_name: self.has_explicit_name,
            is_group: self.is_group,
            count_total: self.count_total,
            count_skipped: self.count_skipped,
            count_succeeded: self.count_succeeded,
            count_failed: self.count_failed,
            duration_min: self.duration_min,
            duration_max: self.duration_max,
            duration_avg: Duration::from_nanos(avg_nanos as u64),
            bytes_sent: self.bytes_sent.finish(),
            bytes_received: self.bytes_received.finish(),
            codes: self.codes,
            errors: self.errors,
            executions: self.executions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn execution(path: &str, status: StepStatus, millis: u64) -> StepExecution {
        StepExecution {
            path: path.to_string(),
            has_explicit_name: true,
            is_group: false,
            started_at: Instant::now(),
            duration_total: Duration::from_millis(millis),
            status,
            error: None,
            stats: StepStats::default(),
        }
    }

    #[test]
    fn global_counters_add_up() {
        let stats = RunStats::new();
        stats.add(execution("a", StepStatus::Success, 10));
        stats.add(execution("a", StepStatus::Failed, 20));
        stats.add(execution("b", StepStatus::Skipped, 0));

        let summary = stats.aggregate();
        assert_eq!(summary.count_steps_total, 3);
        assert_eq!(
            summary.count_steps_total,
            summary.count_steps_succeeded + summary.count_steps_failed + summary.count_steps_skipped
        );
    }

    #[test]
    fn duration_rollup_orders_min_avg_max() {
        let stats = RunStats::new();
        for millis in [10, 30, 20] {
            stats.add(execution("a", StepStatus::Success, millis));
        }

        let summary = stats.aggregate();
        let rollup = &summary.steps[0];
        assert_eq!(rollup.duration_min, Duration::from_millis(10));
        assert_eq!(rollup.duration_max, Duration::from_millis(30));
        assert_eq!(rollup.duration_avg, Duration::from_millis(20));
        assert!(rollup.duration_min <= rollup.duration_avg);
        assert!(rollup.duration_avg <= rollup.duration_max);
    }

    #[test]
    fn byte_stats_absent_without_samples() {
        let stats = RunStats::new();
        stats.add(execution("a", StepStatus::Success, 5));

        let summary = stats.aggregate();
        assert_eq!(summary.steps[0].bytes_sent, None);
        assert_eq!(summary.steps[0].bytes_received, None);
        assert!(summary.steps[0].codes.is_empty());
    }

    #[test]
    fn byte_stats_cover_only_reporting_executions() {
        let stats = RunStats::new();

        let mut with_bytes = execution("a", StepStatus::Success, 5);
        with_bytes.stats.bytes_received = Some(100);
        with_bytes.stats.code = Some("200".to_string());
        stats.add(with_bytes);

        let mut with_bytes = execution("a", StepStatus::Success, 5);
        with_bytes.stats.bytes_received = Some(300);
        with_bytes.stats.code = Some("200".to_string());
        stats.add(with_bytes);

        stats.add(execution("a", StepStatus::Skipped, 0));

        let summary = stats.aggregate();
        let rollup = &summary.steps[0];
        let received = rollup.bytes_received.expect("bytes_received present");
        assert_eq!(received.min, 100);
        assert_eq!(received.max, 300);
        assert!((received.avg - 200.0).abs() < f64::EPSILON);
        assert_eq!(rollup.codes.get("200"), Some(&2));
    }

    #[test]
    fn errors_deduplicate_by_message() {
        let stats = RunStats::new();
        for _ in 0..3 {
            let mut failed = execution("a", StepStatus::Failed, 1);
            failed.error = Some("boom".to_string());
            stats.add(failed);
        }
        let mut failed = execution("a", StepStatus::Failed, 1);
        failed.error = Some("other".to_string());
        stats.add(failed);

        let summary = stats.aggregate();
        assert_eq!(summary.steps[0].errors, vec!["boom", "other"]);
    }

    #[test]
    fn aggregation_is_deterministic_under_append_order() {
        let executions: Vec<StepExecution> = (0..10)
            .map(|i| {
                let mut e = execution(if i % 2 == 0 { "a" } else { "b" }, StepStatus::Success, i);
                e.stats.bytes_sent = Some(i * 100);
                e
            })
            .collect();

        let forward = RunStats::new();
        for e in &executions {
            forward.add(e.clone());
        }
        let reversed = RunStats::new();
        for e in executions.iter().rev() {
            reversed.add(e.clone());
        }

        let a = forward.aggregate();
        let b = reversed.aggregate();
        assert_eq!(a.count_steps_total, b.count_steps_total);

        for rollup in &a.steps {
            let other = b
                .steps
                .iter()
                .find(|r| r.path == rollup.path)
                .expect("path present in both");
            assert_eq!(rollup.count_total, other.count_total);
            assert_eq!(rollup.duration_min, other.duration_min);
            assert_eq!(rollup.duration_max, other.duration_max);
            assert_eq!(rollup.duration_avg, other.duration_avg);
            assert_eq!(rollup.bytes_sent, other.bytes_sent);
        }
    }
}
