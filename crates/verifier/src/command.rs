//! External command abstraction for testability.
//!
//! Every `helm` and `kubectl` call goes through the [`CommandRunner`] trait.
//! Production code uses [`ProcessRunner`], tests use `MockRunner`.
//!
//! ```text
//!   LifecycleVerifier / Tunnel
//!             │
//!             ▼
//!      ┌──────────────┐
//!      │CommandRunner │ (trait)
//!      └──────────────┘
//!         │        │
//!         ▼        ▼
//!   ┌──────────┐ ┌──────┐
//!   │ Process  │ │ Mock │
//!   └────┬─────┘ └──────┘
//!        │
//!        ▼
//!   helm / kubectl
//! ```
//!
//! Synchronous commands are awaited to completion and their output captured.
//! Background commands (port-forward) are spawned and returned as a
//! [`BackgroundChild`] that the caller must [`terminate`](BackgroundChild::terminate).

use std::fmt;
use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, warn};

use deploycheck_core::metrics::{
    COMMAND_DURATION_SECONDS, COMMANDS_TOTAL, LABEL_PROGRAM, LABEL_RESULT,
};

use crate::error::VerifierError;

/// A program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Invocation {
    /// Shell-like rendering for logs and error messages. Arguments containing
    /// whitespace are single-quoted.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.chars().any(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Exit code and captured output of one finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InvocationResult {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl InvocationResult {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Converts a non-zero exit into [`VerifierError::CommandFailed`].
    pub fn check(self, invocation: &Invocation) -> Result<Self, VerifierError> {
        if self.success() {
            Ok(self)
        } else {
            Err(VerifierError::CommandFailed {
                command: invocation.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_owned(),
            })
        }
    }
}

/// Handle to a process running in the background.
pub trait BackgroundChild: Send + 'static {
    /// Returns the exit code if the process has already exited.
    ///
    /// The outer `Option` is `None` while the process is still running; the
    /// inner one is `None` when it was killed by a signal.
    fn try_exit(&mut self) -> Result<Option<Option<i32>>, VerifierError>;

    /// `true` while the process has not exited. A failed status poll counts
    /// as not running.
    fn is_running(&mut self) -> bool {
        matches!(self.try_exit(), Ok(None))
    }

    /// Kills the process and waits for it to exit.
    ///
    /// Terminating an already-exited process succeeds.
    fn terminate(self) -> impl Future<Output = Result<(), VerifierError>> + Send;
}

/// Trait abstracting external command execution.
///
/// # Error handling
///
/// - program cannot be started: [`VerifierError::Spawn`]
/// - per-command timeout exceeded: [`VerifierError::CommandTimeout`]
/// - non-zero exit is **not** an error at this layer; callers decide via
///   [`InvocationResult::check`]
pub trait CommandRunner: Send + Sync + 'static {
    type Child: BackgroundChild;

    /// Runs the command to completion and captures its output.
    fn run(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<InvocationResult, VerifierError>> + Send;

    /// Starts the command in the background.
    fn spawn(
        &self,
        invocation: &Invocation,
    ) -> impl Future<Output = Result<Self::Child, VerifierError>> + Send;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    /// Creates a runner that kills synchronous commands after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for ProcessRunner {
    type Child = ProcessChild;

    async fn run(&self, invocation: &Invocation) -> Result<InvocationResult, VerifierError> {
        debug!(command = %invocation, "running command");
        let started = std::time::Instant::now();

        let output = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        // dropping the timed-out future kills the child (kill_on_drop)
        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                record_command(&invocation.program, false, started.elapsed());
                return Err(VerifierError::Spawn {
                    program: invocation.program.clone(),
                    reason: e.to_string(),
                });
            }
            Err(_elapsed) => {
                record_command(&invocation.program, false, started.elapsed());
                warn!(command = %invocation, timeout_secs = self.timeout.as_secs(), "command timed out");
                return Err(VerifierError::CommandTimeout {
                    command: invocation.to_string(),
                    timeout: self.timeout,
                });
            }
        };

        let result = InvocationResult {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        record_command(&invocation.program, result.success(), started.elapsed());

        debug!(
            command = %invocation,
            exit_code = ?result.exit_code,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "command finished"
        );
        Ok(result)
    }

    async fn spawn(&self, invocation: &Invocation) -> Result<ProcessChild, VerifierError> {
        debug!(command = %invocation, "spawning background command");
        let child = tokio::process::Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| VerifierError::Spawn {
                program: invocation.program.clone(),
                reason: e.to_string(),
            })?;

        Ok(ProcessChild {
            child,
            command: invocation.to_string(),
        })
    }
}

fn record_command(program: &str, success: bool, elapsed: Duration) {
    let result = if success { "success" } else { "failure" };
    counter!(COMMANDS_TOTAL, LABEL_PROGRAM => program.to_owned(), LABEL_RESULT => result)
        .increment(1);
    histogram!(COMMAND_DURATION_SECONDS, LABEL_PROGRAM => program.to_owned())
        .record(elapsed.as_secs_f64());
}

/// A background process started by [`ProcessRunner::spawn`].
#[derive(Debug)]
pub struct ProcessChild {
    child: tokio::process::Child,
    command: String,
}

impl BackgroundChild for ProcessChild {
    fn try_exit(&mut self) -> Result<Option<Option<i32>>, VerifierError> {
        match self.child.try_wait() {
            Ok(Some(status)) => Ok(Some(status.code())),
            Ok(None) => Ok(None),
            Err(e) => Err(VerifierError::Tunnel(format!(
                "failed to poll '{}': {e}",
                self.command
            ))),
        }
    }

    async fn terminate(mut self) -> Result<(), VerifierError> {
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        // start_kill fails only if the process already exited
        if let Err(e) = self.child.start_kill() {
            debug!(command = %self.command, error = %e, "kill on exited process");
        }
        self.child
            .wait()
            .await
            .map(|status| {
                debug!(command = %self.command, exit_code = ?status.code(), "background command stopped");
            })
            .map_err(|e| VerifierError::Tunnel(format!("failed to reap '{}': {e}", self.command)))
    }
}

/// Test runner with scripted responses.
///
/// Each rule matches when the rendered command line contains its needle.
/// A rule replays its responses in order and then keeps returning the last
/// one. Unmatched commands succeed with empty output.
#[cfg(test)]
#[derive(Default)]
pub struct MockRunner {
    rules: std::sync::Mutex<Vec<MockRule>>,
    calls: std::sync::Mutex<Vec<String>>,
    fail_spawn: bool,
    child_exits_immediately: bool,
    terminated: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
struct MockRule {
    needle: String,
    responses: std::collections::VecDeque<Result<InvocationResult, String>>,
}

#[cfg(test)]
impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful response with the given stdout.
    pub fn ok(stdout: &str) -> InvocationResult {
        InvocationResult {
            exit_code: Some(0),
            stdout: stdout.to_owned(),
            stderr: String::new(),
        }
    }

    /// Failing response with the given stderr.
    pub fn failed(code: i32, stderr: &str) -> InvocationResult {
        InvocationResult {
            exit_code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_owned(),
        }
    }

    pub fn on(self, needle: &str, response: InvocationResult) -> Self {
        self.on_sequence(needle, vec![response])
    }

    pub fn on_sequence(self, needle: &str, responses: Vec<InvocationResult>) -> Self {
        self.rules
            .lock()
            .expect("rules lock")
            .push(MockRule {
                needle: needle.to_owned(),
                responses: responses.into_iter().map(Ok).collect(),
            });
        self
    }

    /// Makes matching commands fail to spawn.
    pub fn on_spawn_error(self, needle: &str) -> Self {
        self.rules
            .lock()
            .expect("rules lock")
            .push(MockRule {
                needle: needle.to_owned(),
                responses: std::iter::once(Err("No such file or directory".to_owned())).collect(),
            });
        self
    }

    pub fn with_failing_spawn(mut self) -> Self {
        self.fail_spawn = true;
        self
    }

    pub fn with_exiting_children(mut self) -> Self {
        self.child_exits_immediately = true;
        self
    }

    /// Rendered command lines, in call order (runs and spawns).
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn called(&self, needle: &str) -> bool {
        self.calls().iter().any(|c| c.contains(needle))
    }

    pub fn terminated_children(&self) -> usize {
        self.terminated.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
pub struct MockChild {
    exits_immediately: bool,
    terminated: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl BackgroundChild for MockChild {
    fn try_exit(&mut self) -> Result<Option<Option<i32>>, VerifierError> {
        Ok(self.exits_immediately.then_some(Some(1)))
    }

    async fn terminate(self) -> Result<(), VerifierError> {
        self.terminated
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
impl CommandRunner for MockRunner {
    type Child = MockChild;

    async fn run(&self, invocation: &Invocation) -> Result<InvocationResult, VerifierError> {
        let rendered = invocation.to_string();
        self.calls.lock().expect("calls lock").push(rendered.clone());

        let mut rules = self.rules.lock().expect("rules lock");
        let Some(rule) = rules.iter_mut().find(|r| rendered.contains(&r.needle)) else {
            return Ok(InvocationResult {
                exit_code: Some(0),
                ..Default::default()
            });
        };
        let response = if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        };
        match response {
            Some(Ok(result)) => Ok(result),
            Some(Err(reason)) => Err(VerifierError::Spawn {
                program: invocation.program.clone(),
                reason,
            }),
            None => Ok(InvocationResult::default()),
        }
    }

    async fn spawn(&self, invocation: &Invocation) -> Result<MockChild, VerifierError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(invocation.to_string());
        if self.fail_spawn {
            return Err(VerifierError::Spawn {
                program: invocation.program.clone(),
                reason: "mock spawn failure".to_owned(),
            });
        }
        Ok(MockChild {
            exits_immediately: self.child_exits_immediately,
            terminated: std::sync::Arc::clone(&self.terminated),
        })
    }
}
