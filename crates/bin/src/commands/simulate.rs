//! Incident simulators
//!
//! `storm` replays a storage outage: a burst of uncaught ENOSPC failures
//! goes through the global handlers, so dedup, the remote bypass and the
//! fatal budget all act on it. `dedup` fires identical application errors
//! at the logger and counts what reached the sinks.

use std::time::Duration;

use anyhow::bail;
use logshield_application::logger::RecordOutcome;
use logshield_domain::LogEvent;
use tracing::{info, warn};

use crate::startup::Stack;

pub async fn storm(stack: &Stack, count: usize, interval: Duration) -> anyhow::Result<()> {
    let handlers = stack.install_handlers();
    let stats = stack.spawn_stats_reporter();
    let reporter = handlers.reporter();

    info!(count, threshold = stack.config.fatal.threshold, "Starting failure storm");
    let mut queued = 0usize;
    for i in 0..count {
        let error = std::io::Error::from_raw_os_error(28);
        if reporter.report_task_failure(format!("storm-writer-{}", i), &error) {
            queued += 1;
        }
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
    }
    if queued == 0 && count > 0 {
        bail!("exception handler pump stopped");
    }
    if reporter.dropped() > 0 {
        warn!(dropped = reporter.dropped(), "Failure queue overflowed during the storm");
    }

    // Below the threshold the process survives; wait for the backlog
    let expected = queued.min(stack.config.fatal.threshold as usize) as u32;
    while stack.tracker.snapshot().consecutive_count < expected {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    stats.abort();
    handlers.shutdown();

    let report = stack.health_reporter().report();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub async fn dedup(stack: &Stack, count: usize) -> anyhow::Result<()> {
    let mut emitted = 0usize;
    for _ in 0..count {
        let event = LogEvent::error("Simulated duplicate: payment gateway rejected the request");
        if let RecordOutcome::Emitted { .. } = stack.logger.record(event).await {
            emitted += 1;
        }
    }

    let summary_every = stack.config.dedup.summary_every as usize;
    let expected = if count == 0 {
        0
    } else {
        1 + (count - 1) / summary_every
    };
    let stats = stack.logger.health().error_stats;

    println!("Reported: {}", count);
    println!("Emitted:  {} (expected {})", emitted, expected);
    println!(
        "Stats:    total_errors={} unique_errors={} suppressed_total={}",
        stats.total_errors, stats.unique_errors, stats.suppressed_total
    );
    Ok(())
}
