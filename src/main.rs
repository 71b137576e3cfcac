// ABOUTME: CLI entry point for dimension-sync
// ABOUTME: Parses commands and routes to run, plan, sync, and state handlers

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dimension_sync::config::PipelineConfig;
use dimension_sync::daemon::SyncScheduler;
use dimension_sync::pipeline::{Pipeline, RunOptions, RunReport};
use dimension_sync::state::RunState;

#[derive(Parser)]
#[command(name = "dimension-sync")]
#[command(about = "SCD Type 2 sync of an employee dimension from an HR source", long_about = None)]
#[command(version)]
struct Cli {
    /// Set the log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log: String,
    /// Path to the pipeline configuration TOML
    #[arg(long, global = true, default_value = "dimension-sync.toml")]
    config: PathBuf,
    /// Override the run-state file location
    #[arg(long = "state-file", global = true)]
    state_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single sync run against the warehouse
    Run {
        /// Clear a leftover partial-apply marker and proceed
        #[arg(long)]
        acknowledge_partial: bool,
    },
    /// Run the pipeline up to the flow plan and print what would change
    Plan,
    /// Run on the configured schedule until stopped
    Sync {
        /// Run a single scheduled window and exit
        #[arg(long)]
        once: bool,
    },
    /// Inspect or clear the persisted run state
    State {
        #[command(subcommand)]
        command: StateCommands,
    },
}

#[derive(Subcommand)]
enum StateCommands {
    /// Show the persisted run state
    Show,
    /// Clear the insert-pending marker after manual verification
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over --log, matching common tooling
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log.clone()));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let state_path = cli
        .state_file
        .clone()
        .unwrap_or_else(RunState::default_path);

    match cli.command {
        Commands::Run {
            acknowledge_partial,
        } => {
            let config = PipelineConfig::load(&cli.config)?;
            let pipeline = Pipeline::new(config, state_path);
            let report = pipeline
                .run(RunOptions {
                    dry_run: false,
                    acknowledge_partial,
                })
                .await
                .context("Sync run failed")?;
            print_report(&report);
            Ok(())
        }
        Commands::Plan => {
            let config = PipelineConfig::load(&cli.config)?;
            let pipeline = Pipeline::new(config, state_path);
            let report = pipeline
                .run(RunOptions {
                    dry_run: true,
                    acknowledge_partial: false,
                })
                .await
                .context("Plan failed")?;
            print_plan(&report);
            Ok(())
        }
        Commands::Sync { once } => {
            let config = PipelineConfig::load(&cli.config)?;
            let schedule = config.schedule.clone();
            let pipeline = Pipeline::new(config, state_path);

            if once {
                let report = pipeline
                    .run(RunOptions::default())
                    .await
                    .context("Sync run failed")?;
                print_report(&report);
                return Ok(());
            }

            let scheduler = SyncScheduler::new(pipeline, schedule);

            let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel::<()>(1);
            tokio::spawn(async move {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to listen for Ctrl+C");
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
            });

            scheduler.run(shutdown_rx).await
        }
        Commands::State { command } => match command {
            StateCommands::Show => {
                let state = RunState::load(&state_path)?;
                match &state.last_success_at {
                    Some(at) => println!(
                        "Last successful run: {} ({} inserted, {} closed)",
                        at, state.last_inserted, state.last_closed
                    ),
                    None => println!("No successful run recorded."),
                }
                match &state.insert_pending {
                    Some(pending) => println!(
                        "WARNING: insert-pending marker set at {} (update applied: {}, keys closed: {})",
                        pending.started_at, pending.update_applied, pending.keys_closed
                    ),
                    None => println!("No mutation in flight."),
                }
                Ok(())
            }
            StateCommands::Clear => {
                let mut state = RunState::load(&state_path)?;
                match state.acknowledge_partial() {
                    Some(pending) => {
                        state.save(&state_path)?;
                        println!(
                            "Cleared insert-pending marker from {} (update applied: {}).",
                            pending.started_at, pending.update_applied
                        );
                    }
                    None => println!("No insert-pending marker to clear."),
                }
                Ok(())
            }
        },
    }
}

fn print_report(report: &RunReport) {
    println!();
    println!("========================================");
    println!("Sync run complete");
    println!("========================================");
    println!("  Source rows:    {}", report.source_rows);
    println!("  Warehouse rows: {}", report.warehouse_rows);
    println!("  New:            {}", report.new_rows);
    println!("  Changed:        {}", report.changed_rows);
    println!("  Unchanged:      {}", report.unchanged);
    println!("  Rows closed:    {}", report.closed);
    println!("  Rows inserted:  {}", report.inserted);
    if report.update_skipped {
        println!("  (update step skipped - no changed rows)");
    }
    if report.insert_skipped {
        println!("  (insert step skipped - empty payload)");
    }
    println!("  Duration:       {}ms", report.duration_ms);
}

fn print_plan(report: &RunReport) {
    println!();
    println!("========================================");
    println!("Dry run - no mutations applied");
    println!("========================================");
    println!(
        "  Would close {} rows, insert {} rows ({} new, {} changed), {} unchanged",
        if report.update_skipped {
            0
        } else {
            report.changed_rows
        },
        report.new_rows + report.changed_rows,
        report.new_rows,
        report.changed_rows,
        report.unchanged
    );
    match &report.rendered_insert {
        Some(payload) => {
            println!();
            println!("Insert payload:");
            println!("  {}", payload);
        }
        None => println!("  Insert step would be skipped (empty payload)."),
    }
    if report.rendered_keys.is_empty() {
        println!("  Update step would be skipped (no changed keys).");
    } else {
        println!();
        println!("Keys to close: {}", report.rendered_keys);
    }
}
