//! # Stage Table
//!
//! The declarative list of stages a pipeline consists of.
//!
//! A [`StageTable`] is validated once, at construction:
//! - every label is non-empty
//! - no two stages share an index
//! - indices are strictly ascending in table order
//!
//! After that it is immutable. Which stages *run* is decided separately by
//! [`RunBounds`](crate::RunBounds), never by slicing the table.

use crate::{PipelineError, StageAction, StageIndex};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

// =============================================================================
// STAGE SPEC
// =============================================================================

/// One stage: an index, a label, a configuration file and the action that consumes it.
pub struct StageSpec {
    index: StageIndex,
    label: String,
    config_path: PathBuf,
    action: Box<dyn StageAction>,
}

impl StageSpec {
    /// Define a stage.
    pub fn new(
        index: u32,
        label: impl Into<String>,
        config_path: impl Into<PathBuf>,
        action: impl StageAction + 'static,
    ) -> Self {
        Self {
            index: StageIndex(index),
            label: label.into(),
            config_path: config_path.into(),
            action: Box::new(action),
        }
    }

    #[must_use]
    pub fn index(&self) -> StageIndex {
        self.index
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    #[must_use]
    pub fn action(&self) -> &dyn StageAction {
        self.action.as_ref()
    }

    /// What running this stage will do, rendered for humans.
    #[must_use]
    pub fn describe(&self) -> String {
        self.action.describe(&self.config_path)
    }
}

impl fmt::Debug for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageSpec")
            .field("index", &self.index)
            .field("label", &self.label)
            .field("config_path", &self.config_path)
            .finish()
    }
}

impl fmt::Display for StageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.index, self.label)
    }
}

// =============================================================================
// STAGE TABLE
// =============================================================================

/// A validated, ordered list of stages.
#[derive(Debug, Default)]
pub struct StageTable {
    stages: Vec<StageSpec>,
}

impl StageTable {
    /// Validate and wrap a list of stages.
    ///
    /// Duplicate indices are reported before ordering problems, so a table
    /// like `[0, 1, 0]` yields `DuplicateStage(0)` rather than an order error.
    pub fn new(stages: Vec<StageSpec>) -> Result<Self, PipelineError> {
        if let Some(stage) = stages.iter().find(|s| s.label.trim().is_empty()) {
            return Err(PipelineError::InvalidStage(format!(
                "stage {} has an empty label",
                stage.index
            )));
        }

        let mut seen = BTreeSet::new();
        for stage in &stages {
            if !seen.insert(stage.index) {
                return Err(PipelineError::DuplicateStage(stage.index));
            }
        }

        for (previous, next) in stages.iter().zip(stages.iter().skip(1)) {
            if next.index <= previous.index {
                return Err(PipelineError::StageOrder {
                    previous: previous.index,
                    next: next.index,
                });
            }
        }

        Ok(Self { stages })
    }

    /// Iterate stages in table (ascending index) order.
    pub fn iter(&self) -> impl Iterator<Item = &StageSpec> {
        self.stages.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Look up a stage by index.
    #[must_use]
    pub fn get(&self, index: StageIndex) -> Option<&StageSpec> {
        self.stages
            .binary_search_by_key(&index, |s| s.index)
            .ok()
            .and_then(|pos| self.stages.get(pos))
    }

    /// All defined indices, ascending.
    #[must_use]
    pub fn indices(&self) -> Vec<StageIndex> {
        self.stages.iter().map(|s| s.index).collect()
    }

    /// Highest defined index, if any.
    #[must_use]
    pub fn last_index(&self) -> Option<StageIndex> {
        self.stages.last().map(|s| s.index)
    }
}

impl<'a> IntoIterator for &'a StageTable {
    type Item = &'a StageSpec;
    type IntoIter = std::slice::Iter<'a, StageSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.stages.iter()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ActionError;

    fn noop(_: &Path) -> Result<(), ActionError> {
        Ok(())
    }

    fn stage(index: u32, label: &str) -> StageSpec {
        StageSpec::new(index, label, format!("{label}.json"), noop)
    }

    #[test]
    fn valid_table_keeps_order() {
        let table = StageTable::new(vec![
            stage(0, "pretrain"),
            stage(1, "finetune"),
            stage(5, "decode"),
        ])
        .expect("table");
        assert_eq!(
            table.indices(),
            vec![StageIndex(0), StageIndex(1), StageIndex(5)]
        );
        assert_eq!(table.last_index(), Some(StageIndex(5)));
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn duplicate_index_rejected() {
        let result = StageTable::new(vec![stage(0, "a"), stage(1, "b"), stage(0, "c")]);
        assert!(matches!(
            result,
            Err(PipelineError::DuplicateStage(StageIndex(0)))
        ));
    }

    #[test]
    fn descending_index_rejected() {
        let result = StageTable::new(vec![stage(2, "a"), stage(1, "b")]);
        assert!(matches!(
            result,
            Err(PipelineError::StageOrder {
                previous: StageIndex(2),
                next: StageIndex(1)
            })
        ));
    }

    #[test]
    fn empty_label_rejected() {
        let result = StageTable::new(vec![stage(0, "  ")]);
        assert!(matches!(result, Err(PipelineError::InvalidStage(_))));
    }

    #[test]
    fn get_by_index() {
        let table =
            StageTable::new(vec![stage(0, "pretrain"), stage(3, "decode")]).expect("table");
        assert_eq!(
            table.get(StageIndex(3)).map(StageSpec::label),
            Some("decode")
        );
        assert!(table.get(StageIndex(1)).is_none());
    }

    #[test]
    fn empty_table_is_valid() {
        let table = StageTable::new(Vec::new()).expect("table");
        assert!(table.is_empty());
        assert_eq!(table.last_index(), None);
    }

    #[test]
    fn stage_display() {
        assert_eq!(stage(2, "decode").to_string(), "2: decode");
    }
}
