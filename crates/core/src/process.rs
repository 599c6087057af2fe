//! Child-process execution for external command-line tools
//!
//! [`CommandRunner`] is the single chokepoint for every CLI interaction.
//! A non-zero exit is an ordinary, inspectable [`CliInvocationResult`]; only a
//! failure to start the process is an error. Callers that require success
//! check the exit code themselves (see [`CliInvocationResult::ensure_success`]).

use crate::errors::{CliError, Result};
use crate::redaction;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

/// Output of one CLI invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliInvocationResult {
    /// Everything the process wrote to stdout
    pub stdout: String,
    /// Everything the process wrote to stderr
    pub stderr: String,
    /// Process exit code (-1 when terminated by a signal)
    pub exit_code: i32,
}

impl CliInvocationResult {
    /// Whether the process exited with code 0
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Convert a non-zero exit into [`CliError::NonZeroExit`]
    pub fn ensure_success(self, command: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(CliError::NonZeroExit {
                command: command.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            }
            .into())
        }
    }
}

/// Spawn options applied to a single invocation
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Working directory for the child
    pub cwd: Option<PathBuf>,
    /// Extra environment variables for the child
    pub env: HashMap<String, String>,
}

impl SpawnOptions {
    /// Run the child in `cwd`
    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Self::default()
        }
    }
}

/// Abstraction over spawning a command and collecting its output
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run `program` with `args` to completion
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> Result<CliInvocationResult>;
}

impl<T: CommandRunner> CommandRunner for &T {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> Result<CliInvocationResult> {
        (*self).run(program, args, options).await
    }
}

static ANSI_CSI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ANSI regex"));

/// Remove ANSI CSI sequences and literal two-character `\n` sequences
///
/// Applied to stdout of `--json` invocations so the result parses cleanly.
pub fn sanitize_json_output(raw: &str) -> String {
    ANSI_CSI.replace_all(raw, "").replace("\\n", "")
}

/// Render a command line for logs and error messages, with secrets redacted
pub fn display_command(program: &str, args: &[String]) -> String {
    let mut line = program.to_string();
    for arg in args {
        line.push(' ');
        line.push_str(arg);
    }
    redaction::redact(&line)
}

/// [`CommandRunner`] backed by real child processes
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a new SystemRunner
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(program = %program))]
    async fn run(
        &self,
        program: &str,
        args: &[String],
        options: &SpawnOptions,
    ) -> Result<CliInvocationResult> {
        debug!("Running: {}", display_command(program, args));

        let mut command = tokio::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &options.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &options.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|source| CliError::SpawnFailed {
            program: program.to_string(),
            source,
        })?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        // Drain both pipes concurrently so neither can fill up and stall the child
        let read_stdout = async {
            let mut buf = Vec::new();
            if let Some(pipe) = stdout_pipe.as_mut() {
                pipe.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let read_stderr = async {
            let mut buf = Vec::new();
            if let Some(pipe) = stderr_pipe.as_mut() {
                pipe.read_to_end(&mut buf).await?;
            }
            Ok::<_, std::io::Error>(buf)
        };
        let (stdout, stderr, status) = tokio::join!(read_stdout, read_stderr, child.wait());

        let io_error = |source| CliError::SpawnFailed {
            program: program.to_string(),
            source,
        };
        let stdout = String::from_utf8_lossy(&stdout.map_err(io_error)?).into_owned();
        let stderr = String::from_utf8_lossy(&stderr.map_err(io_error)?).into_owned();
        let exit_code = status.map_err(io_error)?.code().unwrap_or(-1);

        let stdout = if args.iter().any(|a| a == "--json") {
            sanitize_json_output(&stdout)
        } else {
            stdout
        };

        debug!(exit_code, "Finished: {}", display_command(program, args));
        if exit_code != 0 {
            debug!("stderr: {}", redaction::redact(stderr.trim()));
        }

        Ok(CliInvocationResult {
            stdout,
            stderr,
            exit_code,
        })
    }
}

pub mod mock {
    //! Scriptable [`CommandRunner`] for tests
    //!
    //! Responses are keyed by the first argument (the sub-command, e.g.
    //! `org:list`). Unkeyed invocations get the default response. Every call
    //! is recorded for later verification.

    use super::{CliInvocationResult, CommandRunner, SpawnOptions};
    use crate::errors::{CliError, Result};
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    /// Record of one invocation
    #[derive(Debug, Clone)]
    pub struct MockCall {
        /// Program that was invoked
        pub program: String,
        /// Arguments passed
        pub args: Vec<String>,
        /// Working directory, if any
        pub cwd: Option<std::path::PathBuf>,
    }

    impl MockCall {
        /// The sub-command (first argument), or the program when there are no args
        pub fn key(&self) -> &str {
            self.args.first().map(String::as_str).unwrap_or(&self.program)
        }

        /// Whether `flag` is immediately followed by `value`
        pub fn has_flag_value(&self, flag: &str, value: &str) -> bool {
            self.args
                .windows(2)
                .any(|pair| pair[0] == flag && pair[1] == value)
        }
    }

    /// Side effect executed when a keyed response is consumed
    pub type MockEffect = Arc<dyn Fn(&MockCall) + Send + Sync>;

    #[derive(Default)]
    struct MockRunnerState {
        responses: HashMap<String, VecDeque<CliInvocationResult>>,
        sticky: HashMap<String, CliInvocationResult>,
        effects: HashMap<String, MockEffect>,
        unspawnable: Vec<String>,
        default_response: CliInvocationResult,
        history: Vec<MockCall>,
    }

    /// Mock command runner
    #[derive(Clone, Default)]
    pub struct MockRunner {
        state: Arc<Mutex<MockRunnerState>>,
    }

    impl std::fmt::Debug for MockRunner {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("MockRunner").finish_non_exhaustive()
        }
    }

    impl MockRunner {
        /// Create a runner that answers every call with exit code 0 and no output
        pub fn new() -> Self {
            Self::default()
        }

        fn lock(&self) -> MutexGuard<'_, MockRunnerState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Always answer `key` with `response`
        pub fn respond(&self, key: &str, response: CliInvocationResult) -> &Self {
            let mut state = self.lock();
            state.sticky.insert(key.to_string(), response);
            self
        }

        /// Answer the next call to `key` with `response` (queued, consumed once)
        pub fn respond_once(&self, key: &str, response: CliInvocationResult) -> &Self {
            let mut state = self.lock();
            state
                .responses
                .entry(key.to_string())
                .or_default()
                .push_back(response);
            self
        }

        /// Answer `key` with exit code 0 and `stdout`
        pub fn respond_ok(&self, key: &str, stdout: impl Into<String>) -> &Self {
            self.respond(
                key,
                CliInvocationResult {
                    stdout: stdout.into(),
                    ..CliInvocationResult::default()
                },
            )
        }

        /// Answer `key` with a non-zero exit and `stderr`
        pub fn respond_err(&self, key: &str, exit_code: i32, stderr: impl Into<String>) -> &Self {
            self.respond(
                key,
                CliInvocationResult {
                    stdout: String::new(),
                    stderr: stderr.into(),
                    exit_code,
                },
            )
        }

        /// Run `effect` whenever `key` is invoked (e.g. create files a real CLI would)
        pub fn on_call(&self, key: &str, effect: MockEffect) -> &Self {
            let mut state = self.lock();
            state.effects.insert(key.to_string(), effect);
            self
        }

        /// Make `program` fail to spawn
        pub fn fail_spawn(&self, program: &str) -> &Self {
            let mut state = self.lock();
            state.unspawnable.push(program.to_string());
            self
        }

        /// All recorded calls, oldest first
        pub fn history(&self) -> Vec<MockCall> {
            self.lock().history.clone()
        }

        /// Recorded calls whose key is `key`
        pub fn calls_to(&self, key: &str) -> Vec<MockCall> {
            self.history()
                .into_iter()
                .filter(|call| call.key() == key)
                .collect()
        }

        /// Whether `key` was invoked at least once
        pub fn was_called(&self, key: &str) -> bool {
            !self.calls_to(key).is_empty()
        }
    }

    impl CommandRunner for MockRunner {
        async fn run(
            &self,
            program: &str,
            args: &[String],
            options: &SpawnOptions,
        ) -> Result<CliInvocationResult> {
            let call = MockCall {
                program: program.to_string(),
                args: args.to_vec(),
                cwd: options.cwd.clone(),
            };

            let (response, effect) = {
                let mut state = self.lock();
                state.history.push(call.clone());

                if state.unspawnable.iter().any(|p| p == program) {
                    return Err(CliError::SpawnFailed {
                        program: program.to_string(),
                        source: std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "mock: program not found",
                        ),
                    }
                    .into());
                }

                let key = call.key().to_string();
                let queued = state.responses.get_mut(&key).and_then(VecDeque::pop_front);
                let response = queued
                    .or_else(|| state.sticky.get(&key).cloned())
                    .unwrap_or_else(|| state.default_response.clone());
                (response, state.effects.get(&key).cloned())
            };

            if let Some(effect) = effect {
                if response.success() {
                    effect(&call);
                }
            }

            let stdout = if args.iter().any(|a| a == "--json") {
                super::sanitize_json_output(&response.stdout)
            } else {
                response.stdout.clone()
            };
            Ok(CliInvocationResult {
                stdout,
                ..response
            })
        }
    }
}
