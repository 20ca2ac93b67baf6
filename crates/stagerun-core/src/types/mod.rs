//! # Core Type Definitions
//!
//! This module contains the value types shared by every part of the runner:
//! - Stage identifiers (`StageIndex`)
//! - The inclusive selection window (`RunBounds`)
//! - Error types (`ActionError`, `PipelineError`)
//!
//! ## Selection Guarantees
//!
//! - Indices are unsigned, so a stage can never sit below stage 0
//! - `RunBounds::includes` is the ONLY place the window is evaluated
//! - An upper bound of `None` means "run to the end of the table"

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// STAGE IDENTIFIER
// =============================================================================

/// Position of a stage in the pipeline.
///
/// Indices are unique within a table and strictly ascending in table order,
/// but need not be contiguous (`0, 1, 5` is a valid table).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct StageIndex(pub u32);

impl StageIndex {
    /// Create a new stage index.
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Get the raw index value.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl From<u32> for StageIndex {
    fn from(index: u32) -> Self {
        Self(index)
    }
}

impl fmt::Display for StageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// RUN BOUNDS
// =============================================================================

/// Inclusive window of stage indices selected for one run.
///
/// `current` is the first index that may run, `stop` the last. When `stop`
/// is `None` the window is open-ended and every stage at or after `current`
/// runs, however many stages the table grows to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunBounds {
    /// First stage index to run (inclusive).
    pub current: StageIndex,
    /// Last stage index to run (inclusive), or `None` for no upper bound.
    pub stop: Option<StageIndex>,
}

impl RunBounds {
    /// Create bounds from an explicit window.
    #[must_use]
    pub const fn new(current: StageIndex, stop: Option<StageIndex>) -> Self {
        Self { current, stop }
    }

    /// Bounds selecting `[current, stop]`.
    #[must_use]
    pub const fn between(current: u32, stop: u32) -> Self {
        Self::new(StageIndex(current), Some(StageIndex(stop)))
    }

    /// Bounds selecting every stage from `current` to the end of the table.
    #[must_use]
    pub const fn starting_at(current: u32) -> Self {
        Self::new(StageIndex(current), None)
    }

    /// Bounds selecting the whole table.
    #[must_use]
    pub const fn all() -> Self {
        Self::starting_at(0)
    }

    /// Whether a stage with this index is inside the window.
    ///
    /// Both ends are inclusive.
    #[must_use]
    pub fn includes(&self, index: StageIndex) -> bool {
        self.current <= index && self.stop.is_none_or(|stop| stop >= index)
    }

    /// Whether the window is inverted and can select nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stop.is_some_and(|stop| stop < self.current)
    }
}

impl Default for RunBounds {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for RunBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stop {
            Some(stop) => write!(f, "[{}, {}]", self.current, stop),
            None => write!(f, "[{}, end]", self.current),
        }
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Failure reported by a single stage action.
///
/// The runner never looks inside an action; this is the only signal it gets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The external program could not be started at all.
    #[error("failed to start `{program}`: {message}")]
    Spawn { program: String, message: String },

    /// The external program ran and exited with a non-zero status.
    #[error("`{program}` exited with status {code}")]
    Exit { program: String, code: i32 },

    /// The external program was terminated by a signal.
    #[error("`{program}` was terminated by a signal")]
    Terminated { program: String },

    /// An in-process action failed.
    #[error("{0}")]
    Failed(String),
}

impl ActionError {
    /// Exit code of the failed program, when it exited normally.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ActionError::Exit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors that can occur while building or running a pipeline.
///
/// - No retries and no partial recovery
/// - A stage failure halts the pipeline and names the stage
/// - Configuration errors are raised before any stage runs
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The environment gate failed; nothing was run.
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// An included stage's action failed; later stages were not attempted.
    #[error("Stage {index} ({label}) failed: {source}")]
    StageFailed {
        index: StageIndex,
        label: String,
        #[source]
        source: ActionError,
    },

    /// Two stages in the table share an index.
    #[error("Duplicate stage index: {0}")]
    DuplicateStage(StageIndex),

    /// Stage indices are not strictly ascending in table order.
    #[error("Stage {next} is listed after stage {previous}; stages must be in ascending order")]
    StageOrder {
        previous: StageIndex,
        next: StageIndex,
    },

    /// A stage definition is malformed.
    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    /// The pipeline definition could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Index and label of the stage that failed, if this is a stage failure.
    #[must_use]
    pub fn failed_stage(&self) -> Option<(StageIndex, &str)> {
        match self {
            PipelineError::StageFailed { index, label, .. } => Some((*index, label)),
            _ => None,
        }
    }

    /// Whether this error comes from a malformed stage table or pipeline file.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            PipelineError::DuplicateStage(_)
                | PipelineError::StageOrder { .. }
                | PipelineError::InvalidStage(_)
                | PipelineError::Config(_)
        )
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_are_inclusive_at_both_ends() {
        let bounds = RunBounds::between(1, 2);
        assert!(!bounds.includes(StageIndex(0)));
        assert!(bounds.includes(StageIndex(1)));
        assert!(bounds.includes(StageIndex(2)));
        assert!(!bounds.includes(StageIndex(3)));
    }

    #[test]
    fn open_bounds_have_no_upper_limit() {
        let bounds = RunBounds::starting_at(2);
        assert!(!bounds.includes(StageIndex(1)));
        assert!(bounds.includes(StageIndex(2)));
        assert!(bounds.includes(StageIndex(u32::MAX)));
    }

    #[test]
    fn inverted_bounds_are_empty() {
        let bounds = RunBounds::between(2, 0);
        assert!(bounds.is_empty());
        assert!((0..5).all(|i| !bounds.includes(StageIndex(i))));
        assert!(!RunBounds::all().is_empty());
        assert!(!RunBounds::between(3, 3).is_empty());
    }

    #[test]
    fn bounds_display() {
        assert_eq!(RunBounds::between(0, 2).to_string(), "[0, 2]");
        assert_eq!(RunBounds::starting_at(1).to_string(), "[1, end]");
    }

    #[test]
    fn failed_stage_identifies_stage() {
        let err = PipelineError::StageFailed {
            index: StageIndex(1),
            label: "finetune".to_string(),
            source: ActionError::Exit {
                program: "python".to_string(),
                code: 3,
            },
        };
        assert_eq!(err.failed_stage(), Some((StageIndex(1), "finetune")));
        assert!(!err.is_configuration());
        assert_eq!(
            err.to_string(),
            "Stage 1 (finetune) failed: `python` exited with status 3"
        );
    }

    #[test]
    fn configuration_errors_are_classified() {
        assert!(PipelineError::DuplicateStage(StageIndex(0)).is_configuration());
        assert!(PipelineError::Config("bad".to_string()).is_configuration());
        assert!(!PipelineError::Precondition("cwd".to_string()).is_configuration());
    }

    #[test]
    fn exit_code_only_for_normal_exit() {
        let exit = ActionError::Exit {
            program: "false".to_string(),
            code: 1,
        };
        let killed = ActionError::Terminated {
            program: "sleep".to_string(),
        };
        assert_eq!(exit.exit_code(), Some(1));
        assert_eq!(killed.exit_code(), None);
    }
}
