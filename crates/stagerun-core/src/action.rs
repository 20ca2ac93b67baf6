//! # Stage Actions
//!
//! A stage action is the opaque collaborator a stage hands its configuration
//! file to. The runner only observes `Ok(())` or an [`ActionError`].
//!
//! Two implementations ship with the crate:
//! - [`CommandAction`]: spawns `program args... <config>` and waits for it
//! - any `Fn(&Path) -> Result<(), ActionError>` closure (in-process actions, mocks)

use crate::ActionError;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

// =============================================================================
// ACTION TRAIT
// =============================================================================

/// The work a stage performs with its configuration file.
///
/// Actions must be `Send + Sync` so a table can be built on one thread and
/// run on another. Stages still run strictly one at a time.
pub trait StageAction: Send + Sync {
    /// Run the action to completion with the given configuration path.
    ///
    /// Blocks until the work is done. There is no timeout.
    fn invoke(&self, config: &Path) -> Result<(), ActionError>;

    /// Human-readable rendering of what `invoke` will do, for logs and dry runs.
    fn describe(&self, config: &Path) -> String {
        format!("<in-process action> {}", config.display())
    }
}

impl<F> StageAction for F
where
    F: Fn(&Path) -> Result<(), ActionError> + Send + Sync,
{
    fn invoke(&self, config: &Path) -> Result<(), ActionError> {
        self(config)
    }
}

// =============================================================================
// COMMAND ACTION
// =============================================================================

/// An external command that receives the configuration path as its last argument.
///
/// Standard streams are inherited, so the child's output goes straight to the
/// terminal. Only the exit status is inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAction {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl CommandAction {
    /// Create an action running `program` with no extra arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// Append a fixed argument placed before the configuration path.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append fixed arguments placed before the configuration path.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the program from this directory instead of the caller's.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for the child. Later values win.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The program to spawn.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Fixed arguments, without the configuration path.
    #[must_use]
    pub fn fixed_args(&self) -> &[String] {
        &self.args
    }

    /// Environment variables set for the child.
    #[must_use]
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Render the full command line for a configuration path.
    #[must_use]
    pub fn command_line(&self, config: &Path) -> String {
        let config = config.display().to_string();
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .chain(std::iter::once(config.as_str()))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn build(&self, config: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(config).envs(&self.env);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl StageAction for CommandAction {
    fn invoke(&self, config: &Path) -> Result<(), ActionError> {
        tracing::debug!("Spawning: {}", self.command_line(config));

        let status = self
            .build(config)
            .status()
            .map_err(|e| ActionError::Spawn {
                program: self.program.clone(),
                message: e.to_string(),
            })?;

        if status.success() {
            return Ok(());
        }

        match status.code() {
            Some(code) => Err(ActionError::Exit {
                program: self.program.clone(),
                code,
            }),
            None => Err(ActionError::Terminated {
                program: self.program.clone(),
            }),
        }
    }

    fn describe(&self, config: &Path) -> String {
        match &self.working_dir {
            Some(dir) => format!(
                "(cd {} && {})",
                quote(&dir.display().to_string()),
                self.command_line(config)
            ),
            None => self.command_line(config),
        }
    }
}

impl fmt::Display for CommandAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", quote(arg))?;
        }
        Ok(())
    }
}

/// Single-quote a word if it contains whitespace or quotes.
fn quote(word: &str) -> String {
    if word.is_empty() || word.contains(|c: char| c.is_whitespace() || c == '\'' || c == '"') {
        format!("'{}'", word.replace('\'', r"'\''"))
    } else {
        word.to_string()
    }
}

// =============================================================================
// TESTS
// =============================================================================
