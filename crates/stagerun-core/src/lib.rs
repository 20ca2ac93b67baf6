//! # stagerun-core
//!
//! The stage runner for multi-step pipelines - THE RUNNER.
//!
//! A pipeline is a declarative table of stages (pretrain, finetune, decode,
//! ...), each with an index, a label, a configuration file and an action that
//! consumes it. A run selects the stages whose index lies in an inclusive
//! window and executes them in ascending order, stopping at the first failure.
//!
//! ## Layout
//!
//! - `types` → `StageIndex`, `RunBounds`, error types
//! - `action` → the `StageAction` seam and `CommandAction`
//! - `stage` → `StageSpec` and the validated `StageTable`
//! - `runner` → `StageRunner`, `plan`, run state and reports
//! - `precondition` → the one-time environment gate
//!
//! ## Constraints
//!
//! - Strictly sequential: later stages consume what earlier ones produce
//! - No retries, no timeouts, no cancellation
//! - Actions are opaque; only success or failure is observed
//!
//! ## Example
//!
//! ```
//! use std::path::Path;
//! use stagerun_core::{ActionError, RunBounds, StageRunner, StageSpec, StageTable};
//!
//! let ok = |_: &Path| -> Result<(), ActionError> { Ok(()) };
//! let table = StageTable::new(vec![
//!     StageSpec::new(0, "pretrain", "pretrain.json", ok),
//!     StageSpec::new(1, "finetune", "finetune.json", ok),
//!     StageSpec::new(2, "decode", "decode.json", ok),
//! ])?;
//!
//! let report = StageRunner::new(table).run(RunBounds::between(1, 1))?;
//! assert_eq!(report.executed().len(), 1);
//! # Ok::<(), stagerun_core::PipelineError>(())
//! ```

// =============================================================================
// MODULES
// =============================================================================

pub mod action;
pub mod precondition;
pub mod runner;
pub mod stage;
pub mod types;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use action::{CommandAction, StageAction};
pub use precondition::Precondition;
pub use runner::{
    OutcomeStatus, PlannedStage, RunReport, RunState, StageOutcome, StageRunner, plan,
};
pub use stage::{StageSpec, StageTable};
pub use types::{ActionError, PipelineError, RunBounds, StageIndex};
