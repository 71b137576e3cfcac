// ABOUTME: Single-run orchestration - extract, reconcile, render, branch, mutate
// ABOUTME: Owns the partial-apply fence between the update and insert steps

use chrono::Local;
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::error::{Result, SyncError};
use crate::extract::SnapshotExtractor;
use crate::flow::FlowPlan;
use crate::reconcile;
use crate::render;
use crate::state::RunState;
use crate::storage::SnapshotStore;
use crate::utils::sanitize_url;
use crate::warehouse::{DimensionReader, MutationExecutor};

/// Options for one pipeline invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop after the flow plan and report the rendered payloads
    pub dry_run: bool,
    /// Clear a leftover insert-pending marker before starting
    pub acknowledge_partial: bool,
}

/// What one run did (or, for a dry run, would have done).
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub source_rows: usize,
    pub warehouse_rows: usize,
    pub new_rows: usize,
    pub changed_rows: usize,
    pub unchanged: usize,
    pub closed: u64,
    pub inserted: u64,
    pub update_skipped: bool,
    pub insert_skipped: bool,
    pub dry_run: bool,
    /// Rendered payloads, kept for dry-run display
    pub rendered_insert: Option<String>,
    pub rendered_keys: String,
    pub duration_ms: u64,
}

/// The employee-dimension sync pipeline.
pub struct Pipeline {
    config: PipelineConfig,
    state_path: PathBuf,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, state_path: PathBuf) -> Self {
        Self { config, state_path }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run.
    ///
    /// Order of operations: extract and stage the snapshot, fetch it back,
    /// read the current dimension, reconcile, render, plan the branches,
    /// then close-out update followed by insert. The insert-pending marker
    /// is persisted before the insert executes; a failure after a
    /// committed update surfaces as [`SyncError::PartialApply`] and blocks
    /// subsequent runs until acknowledged.
    pub async fn run(&self, opts: RunOptions) -> Result<RunReport> {
        let start = std::time::Instant::now();

        let mut state = RunState::load(&self.state_path)?;
        if let Some(pending) = &state.insert_pending {
            if opts.acknowledge_partial {
                tracing::warn!(
                    "Clearing insert-pending marker from {} (update_applied={})",
                    pending.started_at,
                    pending.update_applied
                );
                state.acknowledge_partial();
                state.save(&self.state_path)?;
            } else if !opts.dry_run {
                return Err(SyncError::State(format!(
                    "A previous run left the warehouse mid-mutation at {} \
                     (update applied: {}, keys closed: {}). Verify the dimension \
                     table and re-run with --acknowledge-partial.",
                    pending.started_at, pending.update_applied, pending.keys_closed
                )));
            }
        }

        tracing::info!(
            "Starting sync run: source={}, warehouse={}",
            sanitize_url(&self.config.source.url),
            sanitize_url(&self.config.warehouse.url)
        );

        // Extract and stage
        let store = SnapshotStore::new(&self.config.storage).await?;
        let extractor = SnapshotExtractor::new(&self.config.source, &store);
        extractor.extract_and_stage().await?;
        let source_rows = extractor.fetch().await?;

        // Current warehouse state
        let warehouse_client = crate::postgres::connect_with_retry(&self.config.warehouse.url)
            .await
            .map_err(|e| {
                SyncError::Warehouse(format!(
                    "Failed to connect to warehouse {}: {:#}",
                    sanitize_url(&self.config.warehouse.url),
                    e
                ))
            })?;
        let reader = DimensionReader::new(&warehouse_client, &self.config.warehouse.table);
        let warehouse_rows = reader.read_current().await?;

        // Classify and render
        let run_date = Local::now().date_naive();
        let outcome = reconcile::reconcile(&source_rows, &warehouse_rows, run_date)?;
        let rendered_insert = render::render_insert_payload(&outcome.insert_batch)?;
        let rendered_keys = render::render_update_keys(&outcome.update_keys)?;
        let plan = FlowPlan::from_rendered(&rendered_keys, rendered_insert.as_deref());

        let mut report = RunReport {
            source_rows: source_rows.len(),
            warehouse_rows: warehouse_rows.len(),
            new_rows: outcome.insert_batch.new_rows,
            changed_rows: outcome.insert_batch.changed_rows,
            unchanged: outcome.unchanged,
            update_skipped: !plan.update.is_execute(),
            insert_skipped: !plan.insert.is_execute(),
            dry_run: opts.dry_run,
            rendered_insert,
            rendered_keys,
            ..Default::default()
        };

        if opts.dry_run {
            report.duration_ms = start.elapsed().as_millis() as u64;
            return Ok(report);
        }

        // Mutation phase
        let executor = MutationExecutor::new(&warehouse_client, &self.config.warehouse.table);

        let mut update_applied = false;
        if plan.update.is_execute() {
            report.closed = executor.close_rows(&outcome.update_keys, run_date).await?;
            update_applied = true;
        } else {
            tracing::info!("No changed rows - skipping close-out update");
        }

        if plan.insert.is_execute() {
            // Fence the non-idempotent insert: from here until success the
            // state file says a mutation is in flight.
            state.mark_insert_pending(update_applied, report.closed as usize);
            state.save(&self.state_path)?;

            match executor.insert_rows(&outcome.insert_batch).await {
                Ok(inserted) => report.inserted = inserted,
                Err(e) if update_applied => {
                    return Err(SyncError::PartialApply(e.to_string()));
                }
                Err(e) => return Err(e),
            }
        } else {
            tracing::info!("Insert payload empty - skipping insert");
        }

        state.record_success(report.inserted, report.closed);
        state.save(&self.state_path)?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Run complete: {} new, {} changed, {} unchanged, {} closed, {} inserted in {}ms",
            report.new_rows,
            report.changed_rows,
            report.unchanged,
            report.closed,
            report.inserted,
            report.duration_ms
        );
        Ok(report)
    }
}
