//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::config::{Pipeline, PipelineFile, PipelineSource};
use stagerun_core::{OutcomeStatus, PipelineError, RunBounds, RunReport, RunState};
use std::path::Path;

/// How command output is rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputMode {
    pub json: bool,
    pub quiet: bool,
}

/// A built pipeline and where its definition came from.
#[derive(Debug)]
pub struct LoadedPipeline {
    pub pipeline: Pipeline,
    pub source: PipelineSource,
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Check the precondition, then run the stages inside `bounds`.
pub fn cmd_run(
    loaded: &LoadedPipeline,
    bounds: RunBounds,
    cwd: &Path,
    skip_precondition: bool,
    output: OutputMode,
) -> Result<(), PipelineError> {
    let pipeline = &loaded.pipeline;

    if skip_precondition {
        tracing::warn!("Skipping precondition check");
    } else {
        pipeline.precondition.check(cwd)?;
    }

    tracing::info!(
        "Running pipeline {} with stage bounds {}",
        loaded.source,
        bounds
    );

    let table = pipeline.runner.table();
    let announce = !output.json && !output.quiet;
    let result = pipeline.runner.run_observed(bounds, |state| {
        if let (true, RunState::Running(index)) = (announce, state) {
            let label = table.get(index).map(|s| s.label()).unwrap_or("?");
            println!("==> Stage {}: {}", index, label);
        }
    });

    match result {
        Ok(report) => {
            print_report(&report, output);
            Ok(())
        }
        Err(err) => {
            if output.json {
                print_failure_json(&err, bounds);
            }
            Err(err)
        }
    }
}

fn print_report(report: &RunReport, output: OutputMode) {
    if output.json {
        println!(
            "{}",
            serde_json::to_string_pretty(report).unwrap_or_default()
        );
        return;
    }

    if output.quiet {
        return;
    }

    let executed = report.executed().len();
    let skipped = report.skipped().len();

    println!();
    println!("Pipeline Complete");
    println!("=================");
    println!("Bounds:  {}", report.bounds);
    println!("Ran:     {}", executed);
    println!("Skipped: {}", skipped);

    if !report.outcomes.is_empty() {
        println!();
        for outcome in &report.outcomes {
            match &outcome.status {
                OutcomeStatus::Succeeded { elapsed_ms } => println!(
                    "  {:>3}  {:<12} ok ({} ms)",
                    outcome.index, outcome.label, elapsed_ms
                ),
                OutcomeStatus::Skipped => {
                    println!("  {:>3}  {:<12} skipped", outcome.index, outcome.label);
                }
            }
        }
    }

    if executed == 0 {
        println!();
        println!(
            "No stage index falls inside {}; nothing was run.",
            report.bounds
        );
    }
}

fn print_failure_json(err: &PipelineError, bounds: RunBounds) {
    let failed = err.failed_stage();
    let output = serde_json::json!({
        "status": "failed",
        "bounds": bounds,
        "failed_stage": failed.map(|(index, _)| index),
        "label": failed.map(|(_, label)| label),
        "error": err.to_string(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).unwrap_or_default()
    );
}

// =============================================================================
// PLAN COMMAND
// =============================================================================

/// Show the bounds decision for every stage without running anything.
pub fn cmd_plan(
    loaded: &LoadedPipeline,
    bounds: RunBounds,
    output: OutputMode,
) -> Result<(), PipelineError> {
    let planned = loaded.pipeline.runner.plan(bounds);

    if output.json {
        let stages: Vec<_> = planned
            .iter()
            .map(|p| {
                serde_json::json!({
                    "index": p.stage.index(),
                    "label": p.stage.label(),
                    "config": p.stage.config_path().display().to_string(),
                    "command": p.stage.describe(),
                    "included": p.included,
                })
            })
            .collect();
        let output = serde_json::json!({
            "pipeline": loaded.source.to_string(),
            "bounds": bounds,
            "stages": stages,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Pipeline Plan");
    println!("=============");
    println!("Pipeline: {}", loaded.source);
    println!("Bounds:   {}", bounds);
    println!();

    for p in &planned {
        let decision = if p.included { "run " } else { "skip" };
        println!(
            "  [{}] {:>3}  {:<12} {}",
            decision,
            p.stage.index(),
            p.stage.label(),
            p.stage.describe()
        );
    }

    if !planned.iter().any(|p| p.included) {
        println!();
        println!("No stage would run.");
    }

    Ok(())
}

// =============================================================================
// STAGES COMMAND
// =============================================================================

/// List the stage table.
pub fn cmd_stages(loaded: &LoadedPipeline, output: OutputMode) -> Result<(), PipelineError> {
    let table = loaded.pipeline.runner.table();

    if output.json {
        let stages: Vec<_> = table
            .iter()
            .map(|s| {
                serde_json::json!({
                    "index": s.index(),
                    "label": s.label(),
                    "config": s.config_path().display().to_string(),
                    "command": s.describe(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&stages).unwrap_or_default()
        );
        return Ok(());
    }

    println!("Pipeline Stages ({})", loaded.source);
    println!("===============");
    for stage in table {
        println!(
            "  {:>3}  {:<12} {}",
            stage.index(),
            stage.label(),
            stage.describe()
        );
    }
    if table.is_empty() {
        println!("  (no stages defined)");
    }

    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Run only the precondition gate.
pub fn cmd_check(
    loaded: &LoadedPipeline,
    cwd: &Path,
    output: OutputMode,
) -> Result<(), PipelineError> {
    loaded.pipeline.precondition.check(cwd)?;

    if output.json {
        let output = serde_json::json!({
            "status": "ok",
            "working_dir": cwd.display().to_string(),
            "precondition": loaded.pipeline.precondition,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output).unwrap_or_default()
        );
    } else if !output.quiet {
        if loaded.pipeline.precondition.is_empty() {
            println!("No precondition defined; environment OK");
        } else {
            println!("Precondition satisfied in {}", cwd.display());
        }
    }

    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Locate, parse and validate the pipeline definition.
pub fn load_pipeline(
    explicit: Option<&Path>,
    cwd: &Path,
) -> Result<LoadedPipeline, PipelineError> {
    let (file, source) = PipelineFile::discover(explicit, cwd)?;
    let pipeline = file.build()?;
    tracing::debug!(
        "Loaded {} stages from {}",
        pipeline.runner.table().len(),
        source
    );
    Ok(LoadedPipeline { pipeline, source })
}
