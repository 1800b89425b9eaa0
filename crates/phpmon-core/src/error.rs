//! Application error types with rich context

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Environment Errors (filesystem seam)
    // ─────────────────────────────────────────────────────────────
    #[error("File is missing: {path}")]
    FileMissing { path: String },

    #[error("File already exists: {path}")]
    AlreadyExists { path: String },

    // ─────────────────────────────────────────────────────────────
    // External Command Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Command failed: `{command}`: {output}")]
    CommandFailed { command: String, output: String },

    #[error("Command timed out: `{command}`")]
    CommandTimeout { command: String },

    #[error("No fixture registered for command: `{command}`")]
    MissingFixture { command: String },

    // ─────────────────────────────────────────────────────────────
    // Domain Errors
    // ─────────────────────────────────────────────────────────────
    #[error("PHP version not found: {version}")]
    VersionNotFound { version: String },

    #[error("Service not found: {name}")]
    ServiceNotFound { name: String },

    #[error("Site not found: {name}")]
    SiteNotFound { name: String },

    #[error("Proxy not found: {domain}")]
    ProxyNotFound { domain: String },

    #[error("Site is not linked and cannot be unlinked: {name}")]
    NotLinked { name: String },

    #[error("PHP extension not found: {name}")]
    ExtensionNotFound { name: String },

    #[error("Another operation is in progress")]
    Busy,

    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn file_missing(path: impl Into<String>) -> Self {
        Self::FileMissing { path: path.into() }
    }

    pub fn already_exists(path: impl Into<String>) -> Self {
        Self::AlreadyExists { path: path.into() }
    }

    pub fn command_failed(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::CommandFailed {
            command: command.into(),
            output: output.into(),
        }
    }

    pub fn missing_fixture(command: impl Into<String>) -> Self {
        Self::MissingFixture {
            command: command.into(),
        }
    }

    pub fn version_not_found(version: impl Into<String>) -> Self {
        Self::VersionNotFound {
            version: version.into(),
        }
    }

    pub fn service_not_found(name: impl Into<String>) -> Self {
        Self::ServiceNotFound { name: name.into() }
    }

    pub fn site_not_found(name: impl Into<String>) -> Self {
        Self::SiteNotFound { name: name.into() }
    }

    pub fn proxy_not_found(domain: impl Into<String>) -> Self {
        Self::ProxyNotFound {
            domain: domain.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The command text to show in a hard-failure report, if any
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::CommandFailed { command, .. }
            | Error::CommandTimeout { command }
            | Error::MissingFixture { command } => Some(command),
            _ => None,
        }
    }

    /// Errors raised by the filesystem seam
    pub fn is_environment(&self) -> bool {
        matches!(
            self,
            Error::FileMissing { .. } | Error::AlreadyExists { .. } | Error::Io(_)
        )
    }

    /// Check if this is a recoverable error
    ///
    /// Recoverable errors leave every snapshot in its previous state; the
    /// caller may retry or surface the message.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::FileMissing { .. }
                | Error::AlreadyExists { .. }
                | Error::CommandFailed { .. }
                | Error::CommandTimeout { .. }
                | Error::Busy
                | Error::VersionNotFound { .. }
                | Error::ServiceNotFound { .. }
                | Error::SiteNotFound { .. }
                | Error::ProxyNotFound { .. }
                | Error::NotLinked { .. }
                | Error::ExtensionNotFound { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Logging and recovery helpers for engine results
pub trait ResultExt<T> {
    /// Log the error at warn level under `context` and pass it on
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// `Ok(None)` when the error is [`Error::FileMissing`]
    ///
    /// Missing files are how absent installations show up, so callers treat
    /// them as "not there" rather than as a failure.
    fn or_missing(self) -> Result<Option<T>>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::warn!(command = err.command(), "{}: {}", context.into(), err);
            err
        })
    }

    fn or_missing(self) -> Result<Option<T>> {
        match self.map_err(Into::<Error>::into) {
            Ok(value) => Ok(Some(value)),
            Err(Error::FileMissing { path }) => {
                tracing::trace!("Treating missing {} as absent", path);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}
