// src/harvest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter};
use once_cell::sync::OnceCell;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use super::{HarvestReport, Harvester};

/// What one trigger of the harvest job ended up doing.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed(HarvestReport),
    /// Another cycle was still running; this trigger was dropped.
    Skipped,
    Failed(String),
}

/// Reset + harvest as one critical section.
pub struct HarvestJob {
    harvester: Harvester,
    accounts: Vec<String>,
    window_hours: i64,
    gate: Mutex<()>,
}

impl HarvestJob {
    pub fn new(harvester: Harvester, accounts: Vec<String>, window_hours: i64) -> Self {
        Self {
            harvester,
            accounts,
            window_hours,
            gate: Mutex::new(()),
        }
    }

    /// Never overlaps with itself: a trigger that arrives mid-cycle is skipped.
    pub async fn run_cycle(&self) -> CycleOutcome {
        let Ok(_guard) = self.gate.try_lock() else {
            warn!(target: "scheduler", "previous harvest cycle still running, skipping trigger");
            return CycleOutcome::Skipped;
        };
        describe_cycle_metrics();
        counter!("harvest_cycles_total").increment(1);

        if let Err(e) = self.harvester.storage().reset_dataset() {
            error!(target: "scheduler", error = ?e, "unhandled error in scheduled job");
            return CycleOutcome::Failed(e.to_string());
        }
        let report = self.harvester.harvest(&self.accounts, self.window_hours).await;
        info!(
            target: "scheduler",
            window_hours = self.window_hours,
            downloaded = report.downloaded(),
            failed = report.failed(),
            "harvest cycle completed"
        );
        CycleOutcome::Completed(report)
    }
}

fn describe_cycle_metrics() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("harvest_cycles_total", "Harvest cycles started.");
    });
}

/// Runs `job` immediately, then every `interval` measured from the previous
/// scheduled tick. Ticks missed while a cycle is still running are skipped.
/// Stops when `shutdown` flips to `true` (or its sender is dropped); an
/// in-flight cycle is aborted and its partial output is purged by the next reset.
pub fn spawn_harvest_scheduler(
    job: Arc<HarvestJob>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let period = interval.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(target: "scheduler", every_secs = period.as_secs(), "scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_shutdown(&mut shutdown) => break,
            }

            // Run on its own task so a panic inside a cycle is caught and logged
            // instead of killing the scheduler.
            let cycle_job = Arc::clone(&job);
            let mut cycle = tokio::spawn(async move { cycle_job.run_cycle().await });
            tokio::select! {
                res = &mut cycle => {
                    if let Err(e) = res {
                        error!(target: "scheduler", error = %e, "harvest cycle aborted unexpectedly");
                    }
                }
                _ = wait_for_shutdown(&mut shutdown) => {
                    cycle.abort();
                    warn!(target: "scheduler", "shutdown requested during harvest cycle");
                    break;
                }
            }
        }
        info!(target: "scheduler", "scheduler stopped");
    })
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
