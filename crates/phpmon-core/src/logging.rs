//! Logging configuration using tracing
//!
//! Events go to a daily file under the local data directory and, depending on
//! how the command line was invoked, to stderr. Stdout is left to command
//! output so `--json` stays parseable.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::Result;

/// Environment variable holding filter directives that replace the defaults
pub const LOG_ENV_VAR: &str = "PHPMON_LOG";

const LOG_FILE_NAME: &str = "phpmon.log";

/// Targets that log at info by default; everything else logs warnings only
const CRATE_TARGETS: [&str; 4] = ["phpmon", "phpmon_core", "phpmon_env", "phpmon_app"];

/// Where log events are written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Append to the daily log file
    pub file: bool,
    /// Echo events at or above this level to stderr
    pub stderr: Option<Level>,
}

impl LogOptions {
    /// Options for one command line invocation
    ///
    /// A simulated machine never touches the log file; JSON output keeps
    /// stderr silent.
    pub fn for_cli(simulated: bool, json: bool) -> Self {
        let stderr = match (json, simulated) {
            (true, _) => None,
            (false, true) => Some(Level::INFO),
            (false, false) => Some(Level::WARN),
        };
        Self {
            file: !simulated,
            stderr,
        }
    }
}

/// Default filter directives: info for the workspace crates, warn elsewhere
pub fn default_directives() -> String {
    let mut directives: Vec<String> = CRATE_TARGETS
        .iter()
        .map(|target| format!("{}=info", target))
        .collect();
    directives.push("warn".to_string());
    directives.join(",")
}

/// Initialize the logging subsystem
///
/// `PHPMON_LOG` replaces [`default_directives`] when set.
///
/// # Examples
/// ```bash
/// PHPMON_LOG=phpmon_app=debug phpmon status
/// PHPMON_LOG=trace phpmon php switch 8.2
/// ```
pub fn init(options: LogOptions) -> Result<()> {
    let env_filter = EnvFilter::try_from_env(LOG_ENV_VAR)
        .unwrap_or_else(|_| EnvFilter::new(default_directives()));

    let log_dir = log_directory();
    let file_layer = if options.file {
        std::fs::create_dir_all(&log_dir)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);
        Some(
            fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_timer(fmt::time::ChronoLocal::new(
                    "%Y-%m-%d %H:%M:%S%.3f".to_string(),
                )),
        )
    } else {
        None
    };

    let stderr_layer = options.stderr.map(|level| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .without_time()
            .with_target(false)
            .with_filter(LevelFilter::from_level(level))
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();

    if options.file {
        tracing::info!("phpmon {} logging to {}", env!("CARGO_PKG_VERSION"), log_dir.display());
    }
    Ok(())
}

fn log_directory() -> PathBuf {
    let base = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    base.join("php-monitor").join("logs")
}

/// Base path of the rolling log file (the appender adds a date suffix)
pub fn log_file_path() -> PathBuf {
    log_directory().join(LOG_FILE_NAME)
}
