//! # Stage Runner
//!
//! Executes the stages of a [`StageTable`] that fall inside a [`RunBounds`]
//! window, one at a time, in table order.
//!
//! ## Run State Machine
//!
//! ```text
//! NotStarted ──► Running(i) ──► Running(j) ──► ... ──► Completed
//!                    │              │
//!                    ▼              ▼
//!                Failed(i)      Failed(j)
//! ```
//!
//! - Stages outside the window are skipped without side effects
//! - The first failing stage ends the run (fail-fast); later stages are never attempted
//! - An empty selection goes straight from `NotStarted` to `Completed`
//!
//! Recovery is the operator's job: rerun with `current` set to the failed
//! stage's index so the stages that already succeeded are skipped.

use crate::{PipelineError, RunBounds, StageIndex, StageSpec, StageTable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

// =============================================================================
// RUN STATE
// =============================================================================

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum RunState {
    NotStarted,
    Running(StageIndex),
    Completed,
    Failed(StageIndex),
}

impl RunState {
    /// Whether no further transition can happen.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "not started"),
            RunState::Running(index) => write!(f, "running stage {}", index),
            RunState::Completed => write!(f, "completed"),
            RunState::Failed(index) => write!(f, "failed at stage {}", index),
        }
    }
}

// =============================================================================
// PLAN
// =============================================================================

/// A stage together with the bounds decision for it.
#[derive(Debug, Clone, Copy)]
pub struct PlannedStage<'a> {
    pub stage: &'a StageSpec,
    pub included: bool,
}

/// Decide, for every stage in the table, whether it runs under `bounds`.
///
/// Pure: nothing is invoked. [`StageRunner::run`] makes exactly the same
/// decisions, so this doubles as a dry run.
#[must_use]
pub fn plan(table: &StageTable, bounds: RunBounds) -> Vec<PlannedStage<'_>> {
    table
        .iter()
        .map(|stage| PlannedStage {
            stage,
            included: bounds.includes(stage.index()),
        })
        .collect()
}

// =============================================================================
// RUN REPORT
// =============================================================================

/// What happened to one stage in a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Outside the bounds; not invoked.
    Skipped,
    /// Invoked and succeeded.
    Succeeded { elapsed_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub index: StageIndex,
    pub label: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

/// Result of a run that reached `Completed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub bounds: RunBounds,
    pub outcomes: Vec<StageOutcome>,
}

impl RunReport {
    /// Indices of the stages that were invoked, in invocation order.
    #[must_use]
    pub fn executed(&self) -> Vec<StageIndex> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.status, OutcomeStatus::Succeeded { .. }))
            .map(|o| o.index)
            .collect()
    }

    /// Indices of the stages that were skipped.
    #[must_use]
    pub fn skipped(&self) -> Vec<StageIndex> {
        self.outcomes
            .iter()
            .filter(|o| o.status == OutcomeStatus::Skipped)
            .map(|o| o.index)
            .collect()
    }

    /// Whether the run invoked nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.executed().is_empty()
    }
}

// =============================================================================
// STAGE RUNNER
// =============================================================================

/// Owns a stage table and runs bounded slices of it.
#[derive(Debug)]
pub struct StageRunner {
    table: StageTable,
}

impl StageRunner {
    #[must_use]
    pub fn new(table: StageTable) -> Self {
        Self { table }
    }

    #[must_use]
    pub fn table(&self) -> &StageTable {
        &self.table
    }

    /// See [`plan`].
    #[must_use]
    pub fn plan(&self, bounds: RunBounds) -> Vec<PlannedStage<'_>> {
        plan(&self.table, bounds)
    }

    /// Run every stage inside `bounds`, stopping at the first failure.
    pub fn run(&self, bounds: RunBounds) -> Result<RunReport, PipelineError> {
        self.run_observed(bounds, |_| {})
    }

    /// Like [`run`](Self::run), reporting every state transition to `observe`.
    ///
    /// `observe` sees `NotStarted` first and exactly one terminal state last.
    pub fn run_observed<F>(
        &self,
        bounds: RunBounds,
        mut observe: F,
    ) -> Result<RunReport, PipelineError>
    where
        F: FnMut(RunState),
    {
        let mut transition = |state: RunState| {
            tracing::debug!("Pipeline {}", state);
            observe(state);
        };

        transition(RunState::NotStarted);

        if bounds.is_empty() {
            tracing::warn!("Stage bounds {} are inverted; no stage will run", bounds);
        }

        let mut outcomes = Vec::with_capacity(self.table.len());

        for stage in &self.table {
            if !bounds.includes(stage.index()) {
                tracing::trace!("Skipping stage {} ({})", stage.index(), stage.label());
                outcomes.push(StageOutcome {
                    index: stage.index(),
                    label: stage.label().to_string(),
                    status: OutcomeStatus::Skipped,
                });
                continue;
            }

            transition(RunState::Running(stage.index()));
            tracing::info!("Stage {}: {}", stage.index(), stage.label());

            let started = Instant::now();
            if let Err(source) = stage.action().invoke(stage.config_path()) {
                tracing::error!(
                    "Stage {} ({}) failed: {}",
                    stage.index(),
                    stage.label(),
                    source
                );
                transition(RunState::Failed(stage.index()));
                return Err(PipelineError::StageFailed {
                    index: stage.index(),
                    label: stage.label().to_string(),
                    source,
                });
            }

            let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            tracing::info!(
                "Stage {} ({}) finished in {} ms",
                stage.index(),
                stage.label(),
                elapsed_ms
            );
            outcomes.push(StageOutcome {
                index: stage.index(),
                label: stage.label().to_string(),
                status: OutcomeStatus::Succeeded { elapsed_ms },
            });
        }

        transition(RunState::Completed);
        Ok(RunReport { bounds, outcomes })
    }
}

// =============================================================================
// TESTS
// =============================================================================
