//! Direct process invocation seam
//!
//! Unlike [`crate::shell::Shell`], a [`CommandRunner`] starts a binary with an
//! argument list and no shell in between. Only stdout is returned.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use futures_util::future::BoxFuture;
use phpmon_core::prelude::*;
use tokio::process::Command;
use tokio::time::timeout;

/// Default timeout for a direct invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Key a fake command is registered under: the path and its arguments joined
/// by single spaces
pub fn command_key(path: &str, arguments: &[&str]) -> String {
    if arguments.is_empty() {
        path.to_string()
    } else {
        format!("{} {}", path, arguments.join(" "))
    }
}

/// Runs a binary directly
pub trait CommandRunner: Send + Sync {
    /// Run `path` with `arguments` and return stdout, optionally trimming
    /// trailing newlines
    fn run<'a>(
        &'a self,
        path: &'a str,
        arguments: &'a [&'a str],
        trim_newlines: bool,
    ) -> BoxFuture<'a, Result<String>>;
}

fn finish(output: String, trim_newlines: bool) -> String {
    if trim_newlines {
        output.trim_end_matches(['\n', '\r']).to_string()
    } else {
        output
    }
}

/// Runs commands with `tokio::process`
#[derive(Debug, Clone)]
pub struct RealCommand {
    timeout: Duration,
}

impl Default for RealCommand {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl RealCommand {
    pub fn new() -> Self {
        Self::default()
    }

    async fn execute(&self, path: &str, arguments: &[&str], trim_newlines: bool) -> Result<String> {
        let key = command_key(path, arguments);
        debug!("Running command: {}", key);

        let output = timeout(
            self.timeout,
            Command::new(path)
                .args(arguments)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| Error::CommandTimeout {
            command: key.clone(),
        })??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("Command {} exited with {:?}: {}", key, output.status.code(), stderr.trim());
        }

        Ok(finish(
            String::from_utf8_lossy(&output.stdout).to_string(),
            trim_newlines,
        ))
    }
}

impl CommandRunner for RealCommand {
    fn run<'a>(
        &'a self,
        path: &'a str,
        arguments: &'a [&'a str],
        trim_newlines: bool,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(self.execute(path, arguments, trim_newlines))
    }
}

/// Fake command runner answering from a table keyed by [`command_key`]
#[derive(Debug, Default)]
pub struct TestableCommand {
    outputs: Mutex<HashMap<String, String>>,
}

impl TestableCommand {
    pub fn new(outputs: HashMap<String, String>) -> Self {
        Self {
            outputs: Mutex::new(outputs),
        }
    }

    fn outputs(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.outputs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, command: impl Into<String>, output: impl Into<String>) {
        self.outputs().insert(command.into(), output.into());
    }
}

impl CommandRunner for TestableCommand {
    fn run<'a>(
        &'a self,
        path: &'a str,
        arguments: &'a [&'a str],
        trim_newlines: bool,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let key = command_key(path, arguments);
            match self.outputs().get(&key) {
                Some(output) => Ok(finish(output.clone(), trim_newlines)),
                None => {
                    error!("No fake command output registered for: {}", key);
                    Err(Error::missing_fixture(key))
                }
            }
        })
    }
}
