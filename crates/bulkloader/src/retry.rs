//! Retry policy for the import/export subprocess steps
//!
//! A step is one invocation of an external command. Its exit code decides
//! what happens next:
//! - `SUCCESS` ends the step
//! - `WARNING` ends the step but is reported as non-fatal
//! - `ERROR` fails immediately
//! - `RETRYABLE` waits the interval and runs again while retries remain

use async_trait::async_trait;
use bulkloader_common::types::ExitCode;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

/// Default number of retries after the first attempt
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Default wait between attempts, in seconds
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 10;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("{step} failed with exit code ERROR on attempt {attempts}")]
    Failed { step: String, attempts: u32 },

    #[error("{step} still retryable after {attempts} attempts")]
    Exhausted { step: String, attempts: u32 },
}

/// Retry count and interval for one direction (import or export)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    pub count: u32,
    pub interval: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            count: DEFAULT_RETRY_COUNT,
            interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
        }
    }
}

impl RetrySettings {
    pub fn new(count: u32, interval: Duration) -> Self {
        Self { count, interval }
    }

    /// Upper bound on invocations, first attempt included
    pub fn max_attempts(&self) -> u32 {
        self.count.saturating_add(1)
    }
}

/// Result of a step that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepOutcome {
    pub code: ExitCode,
    pub attempts: u32,
}

impl StepOutcome {
    pub fn is_warning(&self) -> bool {
        self.code == ExitCode::Warning
    }
}

/// One invocation of an external step
#[async_trait]
pub trait SubprocessRunner: Send + Sync {
    async fn run(&self) -> ExitCode;
}

/// Runs a command and maps its status through the exit-code table.
///
/// A command that cannot be spawned, is killed by a signal, or exits with an
/// unknown status counts as `ERROR`.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    program: PathBuf,
    args: Vec<OsString>,
    envs: Vec<(OsString, OsString)>,
}

impl CommandRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).kill_on_drop(true);
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        command
    }
}

#[async_trait]
impl SubprocessRunner for CommandRunner {
    async fn run(&self) -> ExitCode {
        let status = match self.command().status().await {
            Ok(status) => status,
            Err(e) => {
                error!(program = %self.program.display(), error = %e, "Failed to start subprocess");
                return ExitCode::Error;
            },
        };

        let Some(raw) = status.code() else {
            error!(program = %self.program.display(), "Subprocess terminated by signal");
            return ExitCode::Error;
        };

        match ExitCode::find(raw) {
            Some(code) => code,
            None => {
                error!(program = %self.program.display(), exit_status = raw, "Unknown subprocess exit status");
                ExitCode::Error
            },
        }
    }
}

/// Drives a [`SubprocessRunner`] until it settles or retries run out
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    settings: RetrySettings,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> RetrySettings {
        self.settings
    }

    pub async fn execute<R>(&self, step: &str, runner: &R) -> Result<StepOutcome, RetryError>
    where
        R: SubprocessRunner + ?Sized,
    {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            debug!(step, attempt = attempts, "Running step");

            match runner.run().await {
                ExitCode::Success => {
                    info!(step, attempts, "Step completed");
                    return Ok(StepOutcome {
                        code: ExitCode::Success,
                        attempts,
                    });
                },
                ExitCode::Warning => {
                    warn!(step, attempts, "Step completed with warning");
                    return Ok(StepOutcome {
                        code: ExitCode::Warning,
                        attempts,
                    });
                },
                ExitCode::Error => {
                    error!(step, attempts, "Step failed");
                    return Err(RetryError::Failed {
                        step: step.to_string(),
                        attempts,
                    });
                },
                ExitCode::Retryable => {
                    if attempts >= self.settings.max_attempts() {
                        error!(step, attempts, "Retries exhausted");
                        return Err(RetryError::Exhausted {
                            step: step.to_string(),
                            attempts,
                        });
                    }
                    warn!(
                        step,
                        attempt = attempts,
                        max_attempts = self.settings.max_attempts(),
                        interval_secs = self.settings.interval.as_secs(),
                        "Step is retryable, waiting before next attempt"
                    );
                    tokio::time::sleep(self.settings.interval).await;
                },
            }
        }
    }
}
