//! Human-readable run summary, emitted through the process logger after
//! aggregation: global counters first, then one block per explicitly named
//! leaf step.

use tracing::info;

use stampede_core::RunSummary;

pub fn log_summary(summary: &RunSummary) {
    info!("######################## Run stats ########################");
    info!("Steps total:   {}", summary.count_steps_total);
    info!("Steps skipped: {}", summary.count_steps_skipped);
    info!("Steps success: {}", summary.count_steps_succeeded);
    info!("Steps failed:  {}", summary.count_steps_failed);

    for step in &summary.steps {
        if step.is_group || !step.has_explicit_name {
            continue;
        }

        info!("");
        info!("Step {}:", step.path);
        info!("   Count total:    {}", step.count_total);
        info!("   Count skipped:  {}", step.count_skipped);
        info!("   Count success:  {}", step.count_succeeded);
        info!("   Count failed:   {}", step.count_failed);
        info!("   Avg duration:   {} ms", step.duration_avg.as_millis());
        info!("   Max duration:   {} ms", step.duration_max.as_millis());
        info!("   Min duration:   {} ms", step.duration_min.as_millis());

        if let Some(sent) = &step.bytes_sent {
            info!("   Avg bytes sent: {:.0} b", sent.avg);
            info!("   Max bytes sent: {} b", sent.max);
            info!("   Min bytes sent: {} b", sent.min);
        }

        if let Some(received) = &step.bytes_received {
            info!("   Avg bytes received: {:.0} b", received.avg);
            info!("   Max bytes received: {} b", received.max);
            info!("   Min bytes received: {} b", received.min);
        }

        for (code, count) in &step.codes {
            info!("   Code {code}:       {count}");
        }

        for error in &step.errors {
            info!("   Error: {error}");
        }
    }
}
