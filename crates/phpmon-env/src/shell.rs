//! Shell executor seam
//!
//! Commands are literal strings run through `/bin/sh -c`. The testable shell
//! resolves them by exact string match against scripted [`FakeShellOutput`]s;
//! an unscripted command is a missing fixture and fails immediately.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use phpmon_core::prelude::*;
use serde::Serialize;
use tokio::process::Command;
use tokio::time::timeout;

use crate::command::TestableCommand;
use crate::filesystem::{FakeFile, TestableFileSystem};

/// Default timeout for a single shell invocation
pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(60);

/// Output stream a fake command writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellStream {
    #[default]
    StdOut,
    StdErr,
}

/// Captured output of one shell invocation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ShellOutput {
    pub out: String,
    pub err: String,
    pub exit_code: i32,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn has_error_output(&self) -> bool {
        !self.err.trim().is_empty()
    }

    /// Whatever the command printed, preferring stdout
    pub fn text(&self) -> &str {
        if self.out.is_empty() {
            &self.err
        } else {
            &self.out
        }
    }
}

/// Runs shell commands
pub trait Shell: Send + Sync {
    fn run<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<ShellOutput>>;

    /// Run a command and treat a non-zero exit status as a hard failure
    fn run_checked<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<ShellOutput>> {
        Box::pin(async move {
            let output = self.run(command).await?;
            if output.success() {
                Ok(output)
            } else {
                warn!("Command exited with {}: {}", output.exit_code, command);
                Err(Error::command_failed(command, output.text().trim()))
            }
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Real shell
// ─────────────────────────────────────────────────────────────────────────────

/// Shell backed by `/bin/sh`
#[derive(Debug, Clone)]
pub struct RealShell {
    /// Prepended to `PATH` so `brew`, `php` and `valet` resolve
    extra_path: String,
    timeout: Duration,
}

impl RealShell {
    pub fn new(extra_path: impl Into<String>) -> Self {
        Self {
            extra_path: extra_path.into(),
            timeout: DEFAULT_SHELL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn path_variable(&self) -> String {
        match std::env::var("PATH") {
            Ok(path) if !path.is_empty() => format!("{}:{}", self.extra_path, path),
            _ => format!("{}:/usr/bin:/bin:/usr/sbin:/sbin", self.extra_path),
        }
    }

    async fn execute(&self, command: &str) -> Result<ShellOutput> {
        debug!("Running shell command: {}", command);

        let output = timeout(
            self.timeout,
            Command::new("/bin/sh")
                .arg("-c")
                .arg(command)
                .env("PATH", self.path_variable())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::CommandTimeout {
            command: command.to_string(),
        })??;

        let result = ShellOutput {
            out: String::from_utf8_lossy(&output.stdout).to_string(),
            err: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        };

        trace!("Shell output for `{}`: {:?}", command, result);
        Ok(result)
    }
}

impl Shell for RealShell {
    fn run<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<ShellOutput>> {
        Box::pin(self.execute(command))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Testable shell
// ─────────────────────────────────────────────────────────────────────────────

/// A scripted mutation applied when a fake command succeeds
///
/// Effects let fixtures model commands that really change the system (a
/// `brew link` that swaps the active binary) next to commands that exit
/// cleanly and change nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEffect {
    /// Register or replace a fake file
    WriteFile { path: String, file: FakeFile },
    /// Remove a fake file (and its children) if present
    RemoveFile { path: String },
    /// Replace the scripted output of a fake command runner invocation
    SetCommandOutput { command: String, output: String },
    /// Re-script another fake shell command
    SetShellOutput {
        command: String,
        output: Box<FakeShellOutput>,
    },
}

impl FakeEffect {
    pub fn write(path: impl Into<String>, file: FakeFile) -> Self {
        FakeEffect::WriteFile {
            path: path.into(),
            file,
        }
    }

    pub fn remove(path: impl Into<String>) -> Self {
        FakeEffect::RemoveFile { path: path.into() }
    }

    pub fn command_output(command: impl Into<String>, output: impl Into<String>) -> Self {
        FakeEffect::SetCommandOutput {
            command: command.into(),
            output: output.into(),
        }
    }

    pub fn shell_output(command: impl Into<String>, output: FakeShellOutput) -> Self {
        FakeEffect::SetShellOutput {
            command: command.into(),
            output: Box::new(output),
        }
    }
}

/// Scripted result of a fake shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeShellOutput {
    pub output: String,
    pub stream: ShellStream,
    pub delay: Duration,
    pub exit_code: i32,
    pub effects: Vec<FakeEffect>,
}

impl FakeShellOutput {
    /// Output on stdout, returned immediately
    pub fn instant(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            stream: ShellStream::StdOut,
            delay: Duration::ZERO,
            exit_code: 0,
            effects: Vec::new(),
        }
    }

    /// Output on stdout after `seconds`
    pub fn delayed(seconds: f64, output: impl Into<String>) -> Self {
        Self {
            delay: Duration::from_secs_f64(seconds),
            ..Self::instant(output)
        }
    }

    /// Output on stderr with a non-zero exit status
    pub fn failure(output: impl Into<String>) -> Self {
        Self {
            stream: ShellStream::StdErr,
            exit_code: 1,
            ..Self::instant(output)
        }
    }

    pub fn on_stream(mut self, stream: ShellStream) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_effect(mut self, effect: FakeEffect) -> Self {
        self.effects.push(effect);
        self
    }

    fn to_output(&self) -> ShellOutput {
        let (out, err) = match self.stream {
            ShellStream::StdOut => (self.output.clone(), String::new()),
            ShellStream::StdErr => (String::new(), self.output.clone()),
        };
        ShellOutput {
            out,
            err,
            exit_code: self.exit_code,
        }
    }
}

/// Shell that answers from an exact-match table of scripted outputs
#[derive(Default)]
pub struct TestableShell {
    outputs: Mutex<HashMap<String, FakeShellOutput>>,
    history: Mutex<Vec<String>>,
    filesystem: Option<Arc<TestableFileSystem>>,
    commands: Option<Arc<TestableCommand>>,
}

impl TestableShell {
    pub fn new(outputs: HashMap<String, FakeShellOutput>) -> Self {
        Self {
            outputs: Mutex::new(outputs),
            ..Default::default()
        }
    }

    /// Targets for [`FakeEffect`]s
    pub fn with_effect_targets(
        mut self,
        filesystem: Arc<TestableFileSystem>,
        commands: Arc<TestableCommand>,
    ) -> Self {
        self.filesystem = Some(filesystem);
        self.commands = Some(commands);
        self
    }

    fn outputs(&self) -> MutexGuard<'_, HashMap<String, FakeShellOutput>> {
        self.outputs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn history_guard(&self) -> MutexGuard<'_, Vec<String>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Script (or re-script) a command
    pub fn set(&self, command: impl Into<String>, output: FakeShellOutput) {
        self.outputs().insert(command.into(), output);
    }

    /// Every command run so far, in order
    pub fn history(&self) -> Vec<String> {
        self.history_guard().clone()
    }

    /// How many times `command` has been run
    pub fn count(&self, command: &str) -> usize {
        self.history_guard().iter().filter(|c| *c == command).count()
    }

    fn apply(&self, effects: &[FakeEffect]) {
        for effect in effects {
            match effect {
                FakeEffect::WriteFile { path, file } => match &self.filesystem {
                    Some(fs) => fs.insert(path.clone(), file.clone()),
                    None => warn!("No fake filesystem to apply effect on {}", path),
                },
                FakeEffect::RemoveFile { path } => match &self.filesystem {
                    Some(fs) => {
                        // Children go with the entry, like `rm -rf`
                        let prefix = format!("{}/", path);
                        for child in fs.paths().into_iter().filter(|p| p.starts_with(&prefix)) {
                            fs.forget(&child);
                        }
                        fs.forget(path);
                    }
                    None => warn!("No fake filesystem to apply effect on {}", path),
                },
                FakeEffect::SetCommandOutput { command, output } => match &self.commands {
                    Some(commands) => commands.set(command.clone(), output.clone()),
                    None => warn!("No fake command runner to apply effect on {}", command),
                },
                FakeEffect::SetShellOutput { command, output } => {
                    self.set(command.clone(), (**output).clone());
                }
            }
        }
    }

    async fn execute(&self, command: &str) -> Result<ShellOutput> {
        self.history_guard().push(command.to_string());

        let scripted = self.outputs().get(command).cloned();
        let Some(scripted) = scripted else {
            error!("No fake shell output registered for: {}", command);
            return Err(Error::missing_fixture(command));
        };

        if !scripted.delay.is_zero() {
            tokio::time::sleep(scripted.delay).await;
        }

        if scripted.exit_code == 0 {
            self.apply(&scripted.effects);
        }

        Ok(scripted.to_output())
    }
}

impl Shell for TestableShell {
    fn run<'a>(&'a self, command: &'a str) -> BoxFuture<'a, Result<ShellOutput>> {
        Box::pin(self.execute(command))
    }
}
