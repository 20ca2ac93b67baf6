//! # stagerun CLI Module
//!
//! This module implements the CLI interface for stagerun.
//!
//! ## Available Commands
//!
//! - `run` - Check the precondition, then run the selected stages (default)
//! - `plan` - Show which stages the bounds select, without running anything
//! - `stages` - List the stage table
//! - `check` - Run only the precondition check
//!
//! Stage bounds (`--current-stage`, `--stop-stage`, `--no-stop`) are global
//! and override the `[run]` section of the pipeline file.

mod commands;

use crate::config::BoundsOverride;
use clap::{Args, Parser, Subcommand};
use stagerun_core::PipelineError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// stagerun - staged pipeline runner
///
/// Runs the pipeline stages whose index lies between --current-stage and
/// --stop-stage (inclusive), in order, stopping at the first failure.
#[derive(Parser, Debug)]
#[command(name = "stagerun")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress progress and summary output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Pipeline file (TOML); defaults to ./stagerun.toml, then the built-in pipeline
    #[arg(short, long, global = true)]
    pub pipeline: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    #[command(flatten)]
    pub bounds: BoundsArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Stage selection window.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct BoundsArgs {
    /// First stage index to run (inclusive)
    #[arg(short = 'c', long, global = true)]
    pub current_stage: Option<u32>,

    /// Last stage index to run (inclusive)
    #[arg(short = 's', long, global = true)]
    pub stop_stage: Option<u32>,

    /// Ignore the pipeline file's stop stage and run to the end
    #[arg(long, global = true, conflicts_with = "stop_stage")]
    pub no_stop: bool,
}

impl From<BoundsArgs> for BoundsOverride {
    fn from(args: BoundsArgs) -> Self {
        Self {
            current_stage: args.current_stage,
            stop_stage: args.stop_stage,
            no_stop: args.no_stop,
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the selected stages
    Run {
        /// Do not check the working directory / environment before running
        #[arg(long)]
        skip_precondition: bool,
    },

    /// Show which stages would run, without running them
    Plan,

    /// List every stage in the pipeline
    Stages,

    /// Check the environment precondition only
    Check,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), PipelineError> {
    let cwd = std::env::current_dir().map_err(|e| {
        PipelineError::Precondition(format!("cannot determine working directory: {}", e))
    })?;

    let loaded = load_pipeline(cli.pipeline.as_deref(), &cwd)?;
    let bounds = BoundsOverride::from(cli.bounds).apply(loaded.pipeline.bounds);
    let output = OutputMode {
        json: cli.json_mode,
        quiet: cli.quiet,
    };

    tracing::debug!("Pipeline {} with bounds {}", loaded.source, bounds);

    match cli.command {
        Some(Commands::Run { skip_precondition }) => {
            cmd_run(&loaded, bounds, &cwd, skip_precondition, output)
        }
        Some(Commands::Plan) => cmd_plan(&loaded, bounds, output),
        Some(Commands::Stages) => cmd_stages(&loaded, output),
        Some(Commands::Check) => cmd_check(&loaded, &cwd, output),
        None => {
            // No subcommand - run the pipeline by default
            cmd_run(&loaded, bounds, &cwd, false, output)
        }
    }
}

/// Process exit status for a failed invocation.
///
/// A stage that exited with a code passes it through; everything else is 1.
#[must_use]
pub fn exit_code(err: &PipelineError) -> i32 {
    match err {
        PipelineError::StageFailed { source, .. } => source
            .exit_code()
            .filter(|code| (1..=255).contains(code))
            .unwrap_or(1),
        _ => 1,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use stagerun_core::{ActionError, RunBounds, StageIndex};

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("parse")
    }

    #[test]
    fn defaults_leave_file_bounds_alone() {
        let cli = parse(&["stagerun"]);
        assert!(cli.command.is_none());
        let bounds = BoundsOverride::from(cli.bounds).apply(RunBounds::between(0, 2));
        assert_eq!(bounds, RunBounds::between(0, 2));
    }

    #[test]
    fn bounds_are_global() {
        let cli = parse(&["stagerun", "plan", "--current-stage", "1", "-s", "1"]);
        assert_eq!(cli.command, Some(Commands::Plan));
        let bounds = BoundsOverride::from(cli.bounds).apply(RunBounds::all());
        assert_eq!(bounds, RunBounds::between(1, 1));
    }

    #[test]
    fn no_stop_conflicts_with_stop_stage() {
        let result = Cli::try_parse_from(["stagerun", "--stop-stage", "2", "--no-stop"]);
        assert!(result.is_err());
    }

    #[test]
    fn run_flags() {
        let cli = parse(&["stagerun", "run", "--skip-precondition", "-p", "pipe.toml"]);
        assert_eq!(
            cli.command,
            Some(Commands::Run {
                skip_precondition: true
            })
        );
        assert_eq!(cli.pipeline, Some(PathBuf::from("pipe.toml")));
    }

    #[test]
    fn exit_code_passes_stage_status_through() {
        let failed = |source| PipelineError::StageFailed {
            index: StageIndex(1),
            label: "finetune".to_string(),
            source,
        };

        assert_eq!(
            exit_code(&failed(ActionError::Exit {
                program: "python".to_string(),
                code: 3
            })),
            3
        );
        assert_eq!(
            exit_code(&failed(ActionError::Terminated {
                program: "python".to_string()
            })),
            1
        );
        assert_eq!(exit_code(&PipelineError::Precondition("cwd".to_string())), 1);
    }
}
