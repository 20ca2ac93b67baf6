//! # Pipeline File
//!
//! Loads the stage table, default bounds and precondition gate from TOML.
//!
//! ```toml
//! [run]
//! current_stage = 0
//! stop_stage = 2          # omit for no upper bound
//!
//! [precondition]
//! working_dir_name = "athena"
//!
//! [environment]           # applied to every stage command
//! PYTHONPATH = "."
//!
//! [[stage]]
//! index = 0
//! label = "pretrain"
//! config = "examples/asr/hkust/mpc.json"
//! program = "python"
//! args = ["athena/main.py"]
//! ```
//!
//! Without a file, [`PipelineFile::builtin`] provides the HKUST
//! pretrain / finetune / decode table.

use serde::{Deserialize, Serialize};
use stagerun_core::{
    CommandAction, PipelineError, Precondition, RunBounds, StageIndex, StageRunner, StageSpec,
    StageTable,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File picked up from the working directory when `--pipeline` is not given.
pub const DEFAULT_PIPELINE_FILE: &str = "stagerun.toml";

/// Maximum pipeline file size (1 MB).
const MAX_PIPELINE_FILE_SIZE: u64 = 1024 * 1024;

// =============================================================================
// FILE SCHEMA
// =============================================================================

/// Default bounds stored in the pipeline file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSection {
    pub current_stage: u32,
    pub stop_stage: Option<u32>,
}

/// One `[[stage]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageEntry {
    pub index: u32,
    pub label: String,
    /// Configuration file handed to the command as its last argument.
    pub config: PathBuf,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The whole pipeline file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineFile {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub precondition: Precondition,
    /// Variables set for every stage; a stage's own `env` wins on conflicts.
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub stage: Vec<StageEntry>,
}

// =============================================================================
// LOADING
// =============================================================================

/// Where a pipeline definition came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineSource {
    File(PathBuf),
    Builtin,
}

impl std::fmt::Display for PipelineSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineSource::File(path) => write!(f, "{}", path.display()),
            PipelineSource::Builtin => write!(f, "<built-in>"),
        }
    }
}

impl PipelineFile {
    /// Parse a pipeline definition from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Read and parse a pipeline file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            PipelineError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;

        if !metadata.is_file() {
            return Err(PipelineError::Config(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        if metadata.len() > MAX_PIPELINE_FILE_SIZE {
            return Err(PipelineError::Config(format!(
                "Pipeline file size {} bytes exceeds maximum allowed {} bytes",
                metadata.len(),
                MAX_PIPELINE_FILE_SIZE
            )));
        }

        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;

        toml::from_str(&text)
            .map_err(|e| PipelineError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Resolve which definition to use.
    ///
    /// An explicit path must exist. Otherwise `stagerun.toml` in `cwd` is used
    /// when present, and the built-in table when not.
    pub fn discover(
        explicit: Option<&Path>,
        cwd: &Path,
    ) -> Result<(Self, PipelineSource), PipelineError> {
        if let Some(path) = explicit {
            return Ok((Self::load(path)?, PipelineSource::File(path.to_path_buf())));
        }

        let default = cwd.join(DEFAULT_PIPELINE_FILE);
        if default.is_file() {
            tracing::debug!("Using pipeline file {}", default.display());
            return Ok((Self::load(&default)?, PipelineSource::File(default)));
        }

        tracing::debug!("No {} found; using built-in pipeline", DEFAULT_PIPELINE_FILE);
        Ok((Self::builtin(), PipelineSource::Builtin))
    }

    /// The HKUST speech recipe: pretrain, finetune, decode.
    ///
    /// Must be started from the `athena` checkout.
    #[must_use]
    pub fn builtin() -> Self {
        let stage = |index: u32, label: &str, script: &str, config: &str| StageEntry {
            index,
            label: label.to_string(),
            config: PathBuf::from(config),
            program: "python".to_string(),
            args: vec![script.to_string()],
            working_dir: None,
            env: BTreeMap::new(),
        };

        Self {
            run: RunSection::default(),
            precondition: Precondition::in_directory("athena"),
            environment: BTreeMap::new(),
            stage: vec![
                stage(0, "pretrain", "athena/main.py", "examples/asr/hkust/mpc.json"),
                stage(
                    1,
                    "finetune",
                    "athena/main.py",
                    "examples/asr/hkust/mtl_transformer.json",
                ),
                stage(
                    2,
                    "decode",
                    "athena/decode_main.py",
                    "examples/asr/hkust/mtl_transformer.json",
                ),
            ],
        }
    }

    /// Default bounds declared in the `[run]` section.
    #[must_use]
    pub fn default_bounds(&self) -> RunBounds {
        RunBounds::new(
            StageIndex(self.run.current_stage),
            self.run.stop_stage.map(StageIndex),
        )
    }

    /// Turn the definition into a validated runner.
    pub fn build(self) -> Result<Pipeline, PipelineError> {
        let bounds = self.default_bounds();
        let environment = self.environment;

        let stages = self
            .stage
            .into_iter()
            .map(|entry| entry.into_spec(&environment))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pipeline {
            runner: StageRunner::new(StageTable::new(stages)?),
            precondition: self.precondition,
            bounds,
        })
    }
}

impl StageEntry {
    /// The command this stage runs, with `environment` under the stage's own `env`.
    #[must_use]
    pub fn command(&self, environment: &BTreeMap<String, String>) -> CommandAction {
        let mut action =
            CommandAction::new(self.program.as_str()).args(self.args.iter().cloned());
        for (key, value) in environment.iter().chain(self.env.iter()) {
            action = action.with_env(key, value);
        }
        if let Some(dir) = &self.working_dir {
            action = action.with_working_dir(dir);
        }
        action
    }

    fn into_spec(
        self,
        environment: &BTreeMap<String, String>,
    ) -> Result<StageSpec, PipelineError> {
        if self.program.trim().is_empty() {
            return Err(PipelineError::InvalidStage(format!(
                "stage {} ({}) has no program",
                self.index, self.label
            )));
        }

        let action = self.command(environment);
        Ok(StageSpec::new(self.index, self.label, self.config, action))
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

/// A loaded pipeline: runner, gate and the file's default bounds.
#[derive(Debug)]
pub struct Pipeline {
    pub runner: StageRunner,
    pub precondition: Precondition,
    pub bounds: RunBounds,
}

/// Bounds requested on the command line, layered over the file's defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoundsOverride {
    pub current_stage: Option<u32>,
    pub stop_stage: Option<u32>,
    /// Drop the file's upper bound and run to the end.
    pub no_stop: bool,
}

impl BoundsOverride {
    /// Apply the overrides to `base`.
    ///
    /// An explicit `stop_stage` wins over `no_stop`.
    #[must_use]
    pub fn apply(&self, base: RunBounds) -> RunBounds {
        let current = self.current_stage.map(StageIndex).unwrap_or(base.current);
        let stop = match (self.stop_stage, self.no_stop) {
            (Some(stop), _) => Some(StageIndex(stop)),
            (None, true) => None,
            (None, false) => base.stop,
        };
        RunBounds::new(current, stop)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_is_valid() {
        let pipeline = PipelineFile::builtin().build().expect("build");
        let labels: Vec<&str> = pipeline.runner.table().iter().map(StageSpec::label).collect();
        assert_eq!(labels, vec!["pretrain", "finetune", "decode"]);
        assert_eq!(pipeline.bounds, RunBounds::all());
        assert_eq!(
            pipeline.precondition.working_dir_name.as_deref(),
            Some("athena")
        );
    }

    #[test]
    fn builtin_decode_command() {
        let pipeline = PipelineFile::builtin().build().expect("build");
        let decode = pipeline.runner.table().get(StageIndex(2)).expect("decode");
        assert_eq!(
            decode.describe(),
            "python athena/decode_main.py examples/asr/hkust/mtl_transformer.json"
        );
    }

    #[test]
    fn override_layers() {
        let base = RunBounds::between(0, 2);

        assert_eq!(BoundsOverride::default().apply(base), base);
        assert_eq!(
            BoundsOverride {
                current_stage: Some(1),
                ..Default::default()
            }
            .apply(base),
            RunBounds::between(1, 2)
        );
        assert_eq!(
            BoundsOverride {
                no_stop: true,
                ..Default::default()
            }
            .apply(base),
            RunBounds::starting_at(0)
        );
        assert_eq!(
            BoundsOverride {
                stop_stage: Some(1),
                no_stop: true,
                ..Default::default()
            }
            .apply(base),
            RunBounds::between(0, 1)
        );
    }

    #[test]
    fn stage_env_wins_over_global_environment() {
        let mut file = PipelineFile::builtin();
        file.environment
            .insert("PYTHONPATH".to_string(), "global".to_string());
        file.environment
            .insert("CUDA_VISIBLE_DEVICES".to_string(), "0".to_string());
        file.stage[0]
            .env
            .insert("PYTHONPATH".to_string(), "stage".to_string());

        let command = file.stage[0].command(&file.environment);
        assert_eq!(
            command.env().get("PYTHONPATH").map(String::as_str),
            Some("stage")
        );
        assert_eq!(
            command.env().get("CUDA_VISIBLE_DEVICES").map(String::as_str),
            Some("0")
        );
    }

    #[test]
    fn empty_program_rejected() {
        let mut file = PipelineFile::builtin();
        file.stage[1].program = " ".to_string();
        let err = file.build().expect_err("no program");
        assert!(matches!(err, PipelineError::InvalidStage(_)));
    }
}
