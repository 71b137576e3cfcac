// ABOUTME: Recurring scheduler for the sync pipeline
// ABOUTME: Daily trigger, fixed-delay retries for transient failures, no catch-up

use tokio::time::{interval, MissedTickBehavior};

use crate::config::ScheduleConfig;
use crate::error::SyncError;
use crate::pipeline::{Pipeline, RunOptions};

/// Runs the pipeline on a recurring schedule.
///
/// One run at a time: a tick waits for the previous run to finish, and
/// missed windows are skipped rather than replayed, because the insert
/// step is not idempotent under reruns.
pub struct SyncScheduler {
    pipeline: Pipeline,
    schedule: ScheduleConfig,
}

impl SyncScheduler {
    pub fn new(pipeline: Pipeline, schedule: ScheduleConfig) -> Self {
        Self { pipeline, schedule }
    }

    /// Run until a shutdown signal arrives.
    pub async fn run(&self, mut shutdown: tokio::sync::broadcast::Receiver<()>) -> anyhow::Result<()> {
        let mut ticker = interval(self.schedule.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut windows = 0u64;
        tracing::info!(
            "Starting scheduler: every {}h, {} retries with {}min fixed delay",
            self.schedule.interval_hours,
            self.schedule.max_retries,
            self.schedule.retry_delay_minutes
        );

        loop {
            tokio::select! {
                biased; // Check shutdown first

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {
                    windows += 1;
                    tracing::info!("Starting scheduled window {}", windows);

                    tokio::select! {
                        biased;
                        _ = shutdown.recv() => {
                            tracing::info!("Shutdown signal received during run, stopping");
                            break;
                        }
                        _ = self.run_window() => {}
                    }
                }
            }
        }

        Ok(())
    }

    /// One scheduled window: the run plus up to `max_retries` retries with
    /// a fixed delay, for retryable errors only. Fatal errors and the
    /// partial-apply window are surfaced once and left for an operator.
    async fn run_window(&self) {
        let max_retries = self.schedule.max_retries;
        let delay = self.schedule.retry_delay();

        for attempt in 0..=max_retries {
            match self.pipeline.run(RunOptions::default()).await {
                Ok(report) => {
                    tracing::info!(
                        "Window succeeded on attempt {}: {} inserted, {} closed",
                        attempt + 1,
                        report.inserted,
                        report.closed
                    );
                    return;
                }
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    tracing::warn!(
                        "Run failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt + 1,
                        max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e @ SyncError::PartialApply(_)) => {
                    tracing::error!(
                        "Run left the warehouse partially applied: {}. \
                         Not retrying; operator intervention required.",
                        e
                    );
                    return;
                }
                Err(e) => {
                    tracing::error!("Run failed, giving up this window: {:?}", e);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::ScheduleConfig;
    use std::time::Duration;

    #[test]
    fn test_default_schedule_is_daily_with_fixed_backoff() {
        let schedule = ScheduleConfig::default();
        assert_eq!(schedule.interval(), Duration::from_secs(24 * 3600));
        assert_eq!(schedule.max_retries, 5);
        assert_eq!(schedule.retry_delay(), Duration::from_secs(600));
    }
}
