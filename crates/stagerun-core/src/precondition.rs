//! # Precondition Gate
//!
//! One-time environment check performed before the first stage runs.
//! It is not part of per-stage logic: if it fails, nothing runs.
//!
//! Checks, in order:
//! 1. the working directory's final component matches `working_dir_name`
//! 2. every path in `required_paths` exists (relative paths resolve against the working directory)
//! 3. every variable in `required_env` is set

use crate::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Requirements the invoking environment must meet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Precondition {
    /// Expected name of the directory the pipeline is started from.
    pub working_dir_name: Option<String>,
    /// Files or directories that must exist.
    pub required_paths: Vec<PathBuf>,
    /// Environment variables that must be set.
    pub required_env: Vec<String>,
}

impl Precondition {
    /// A gate that always passes.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Require the pipeline to be started from a directory with this name.
    #[must_use]
    pub fn in_directory(name: impl Into<String>) -> Self {
        Self {
            working_dir_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Whether the gate checks anything at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.working_dir_name.is_none()
            && self.required_paths.is_empty()
            && self.required_env.is_empty()
    }

    /// Check against an explicit working directory and the process environment.
    pub fn check(&self, cwd: &Path) -> Result<(), PipelineError> {
        self.check_with_env(cwd, |name| std::env::var_os(name).is_some())
    }

    /// Check with a custom environment lookup.
    pub fn check_with_env<F>(&self, cwd: &Path, is_set: F) -> Result<(), PipelineError>
    where
        F: Fn(&str) -> bool,
    {
        if let Some(expected) = &self.working_dir_name {
            let actual = cwd.file_name().and_then(|name| name.to_str());
            if actual != Some(expected.as_str()) {
                return Err(PipelineError::Precondition(format!(
                    "run this pipeline from the `{}` directory (current: {})",
                    expected,
                    cwd.display()
                )));
            }
        }

        for path in &self.required_paths {
            let resolved = cwd.join(path);
            if !resolved.exists() {
                return Err(PipelineError::Precondition(format!(
                    "required path not found: {}",
                    resolved.display()
                )));
            }
        }

        let missing = self.required_env.iter().find(|name| !is_set(name.as_str()));
        if let Some(missing) = missing {
            return Err(PipelineError::Precondition(format!(
                "environment variable {} is not set",
                missing
            )));
        }

        tracing::debug!("Precondition satisfied in {}", cwd.display());
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================
