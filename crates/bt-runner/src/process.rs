//! Invocation of the external benchmark executable.

use bt_types::{BtResult, ProcessError, ReporterSpec};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// Arguments for one benchmark execution:
/// `<executable> <config-reference> <dataset-path> [<reporter>:<arguments> ...]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Reference to the built configuration (path of the loadable artifact).
    pub config_ref: String,
    pub dataset: PathBuf,
    pub reporters: Vec<ReporterSpec>,
}

impl Invocation {
    pub fn new(
        config_ref: impl Into<String>,
        dataset: impl Into<PathBuf>,
        reporters: Vec<ReporterSpec>,
    ) -> Self {
        Self {
            config_ref: config_ref.into(),
            dataset: dataset.into(),
            reporters,
        }
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.reporters.len() + 2);
        args.push(self.config_ref.clone());
        args.push(self.dataset.display().to_string());
        args.extend(self.reporters.iter().map(ReporterSpec::to_arg));
        args
    }
}

/// Captured result of a finished benchmark process.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Any exit other than status 0 counts as a crash.
    pub fn crashed(&self) -> bool {
        self.exit_code != Some(0)
    }
}

/// Starts benchmark processes and waits for their output.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    executable: PathBuf,
    working_dir: Option<PathBuf>,
}

impl ProcessRunner {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            working_dir: None,
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Run the executable to completion.
    ///
    /// A non-zero exit is not an error: the output is returned with
    /// [`ProcessOutput::crashed`] set so the caller can decide what partial
    /// output is worth.
    pub async fn run(&self, invocation: &Invocation) -> BtResult<ProcessOutput> {
        let executable = self.executable.display().to_string();
        let args = invocation.args();

        let mut command = Command::new(&self.executable);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        debug!(executable = %executable, args = ?args, "starting benchmark process");

        let started = Instant::now();
        let child = command.spawn().map_err(|e| ProcessError::SpawnFailed {
            executable: executable.clone(),
            message: e.to_string(),
        })?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ProcessError::OutputFailed {
                executable: executable.clone(),
                message: e.to_string(),
            })?;

        let result = ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            elapsed: started.elapsed(),
        };

        if result.crashed() {
            warn!(
                executable = %executable,
                exit_code = ?result.exit_code,
                "benchmark process exited abnormally"
            );
        } else {
            debug!(elapsed_ms = result.elapsed.as_millis() as u64, "benchmark process finished");
        }

        Ok(result)
    }
}
