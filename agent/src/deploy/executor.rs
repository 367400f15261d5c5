//! Build executor
//!
//! Runs the fixed pipeline steps (pull, build, relocate artifact) in the source
//! working directory, and the restart step separately once the coordinator decides
//! the build should go live.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::errors::AgentError;
use crate::storage::settings::PipelineSettings;
use crate::utils::tail_chars;

/// Keep this many trailing characters of a step's output
const MAX_OUTPUT_CHARS: usize = 16 * 1024;

/// A named shell step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub command: String,
}

impl Step {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

/// Result of running one command to completion
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was killed by a signal
    pub exit_code: Option<i32>,

    /// Combined stdout and stderr
    pub output: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs a single step to completion
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, step: &Step, work_dir: &Path) -> Result<CommandOutput, AgentError>;
}

/// Runs steps through `sh -c`, with stderr folded into stdout
#[derive(Debug, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, step: &Step, work_dir: &Path) -> Result<CommandOutput, AgentError> {
        let script = format!("exec 2>&1\n{}", step.command);
        let output = Command::new("sh")
            .current_dir(work_dir)
            .args(["-c", &script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                AgentError::DeployError(format!("Failed to spawn step '{}': {}", step.name, e))
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CommandOutput {
            exit_code: output.status.code(),
            output: combined,
        })
    }
}

/// Identifies the step that stopped the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    /// Position of the step in the full pipeline (restart is last)
    pub index: usize,
    pub name: String,
    pub exit_code: Option<i32>,
    pub output: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exit_code {
            Some(code) => write!(
                f,
                "step {} ({}) exited with status {}",
                self.index, self.name, code
            ),
            None => write!(f, "step {} ({}) did not exit normally", self.index, self.name),
        }
    }
}

impl std::error::Error for StepFailure {}

/// The ordered steps of the deployment pipeline
#[derive(Debug, Clone)]
pub struct PipelineSteps {
    /// Pull, build and relocate, run for every deployment
    pub build: Vec<Step>,

    /// Supervisor restart, run only when the build goes live
    pub restart: Step,
}

impl PipelineSteps {
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        let pull = settings
            .pull_cmd
            .clone()
            .unwrap_or_else(|| format!("git pull origin {}", shell_quote(&settings.branch)));

        let deploy_dir = settings.deploy_dir.to_string_lossy();
        let relocate = format!(
            "mkdir -p {dir} && mv -f {artifact} {dir}/",
            dir = shell_quote(&deploy_dir),
            artifact = shell_quote(&settings.artifact),
        );

        Self {
            build: vec![
                Step::new("pull", pull),
                Step::new("build", settings.build_cmd.clone()),
                Step::new("relocate", relocate),
            ],
            restart: Step::new("restart", settings.restart_cmd.clone()),
        }
    }
}

/// Executes pipeline steps sequentially in a fixed working directory
pub struct BuildExecutor {
    runner: Arc<dyn CommandRunner>,
    work_dir: PathBuf,
    steps: PipelineSteps,
}

impl BuildExecutor {
    pub fn new(runner: Arc<dyn CommandRunner>, work_dir: PathBuf, steps: PipelineSteps) -> Self {
        Self {
            runner,
            work_dir,
            steps,
        }
    }

    pub fn steps(&self) -> &PipelineSteps {
        &self.steps
    }

    /// Run pull, build and relocate, stopping at the first failure.
    ///
    /// Returns the combined output of all steps on success.
    pub async fn build(&self) -> Result<String, StepFailure> {
        self.run_steps(&self.steps.build, 0).await
    }

    /// Restart the serving process
    pub async fn restart(&self) -> Result<String, StepFailure> {
        let index = self.steps.build.len();
        self.run_steps(std::slice::from_ref(&self.steps.restart), index)
            .await
    }

    async fn run_steps(&self, steps: &[Step], offset: usize) -> Result<String, StepFailure> {
        let mut transcript = String::new();

        for (i, step) in steps.iter().enumerate() {
            let index = offset + i;
            info!(step = %step.name, index, "Running pipeline step");
            debug!(command = %step.command, "Step command");

            let result = match self.runner.run(step, &self.work_dir).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(step = %step.name, error = %e, "Pipeline step could not start");
                    return Err(StepFailure {
                        index,
                        name: step.name.clone(),
                        exit_code: None,
                        output: e.to_string(),
                    });
                }
            };

            if !result.success() {
                warn!(step = %step.name, exit_code = ?result.exit_code, "Pipeline step failed");
                return Err(StepFailure {
                    index,
                    name: step.name.clone(),
                    exit_code: result.exit_code,
                    output: tail_chars(&result.output, MAX_OUTPUT_CHARS),
                });
            }

            transcript.push_str(&result.output);
        }

        Ok(tail_chars(&transcript, MAX_OUTPUT_CHARS))
    }
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
