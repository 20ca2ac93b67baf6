//! # stagerun - Staged Pipeline Runner
//!
//! The main binary for running a bounded slice of an ordered stage pipeline.
//!
//! ## Usage
//!
//! ```bash
//! # Run every stage (pretrain, finetune, decode)
//! stagerun
//!
//! # Resume from finetune and stop after it
//! stagerun run --current-stage 1 --stop-stage 1
//!
//! # Inspect what a window selects
//! stagerun plan -c 1
//! stagerun -p my_pipeline.toml stages
//! ```

use clap::Parser;
use stagerun::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    init_tracing(cli.verbose);

    // Execute command
    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        if let Some((index, label)) = e.failed_stage() {
            eprintln!(
                "Stage {} ({}) failed; later stages were not run. Resume with: stagerun --current-stage {}",
                index, label, index
            );
        }
        std::process::exit(cli::exit_code(&e));
    }
}

/// Initialize tracing — STAGERUN_LOG_FORMAT=json enables machine-parseable output.
///
/// Logs go to stderr so `--json-mode` output on stdout stays parseable.
fn init_tracing(verbose: bool) {
    let log_format = std::env::var("STAGERUN_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if verbose {
        "stagerun=debug,stagerun_core=debug"
    } else {
        "stagerun=info,stagerun_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
