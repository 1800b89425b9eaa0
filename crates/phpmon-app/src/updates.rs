//! Update check
//!
//! PHP Monitor does no network I/O. The [`UpdateChecker`] seam exists so a
//! release feed can be plugged in; the only implementation is a stub that
//! answers from a version it was given.

use phpmon_core::prelude::*;
use phpmon_core::VersionNumber;
use serde::Serialize;

/// Version of this build
pub fn current_version() -> Option<VersionNumber> {
    VersionNumber::parse(env!("CARGO_PKG_VERSION"))
}

/// Result of comparing this build against the latest release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    UpToDate,
    Available { version: VersionNumber },
    /// No release information
    Unknown,
}

#[trait_variant::make(UpdateChecker: Send)]
pub trait LocalUpdateChecker {
    /// Latest released version, if the checker knows one
    async fn latest_version(&self) -> Result<Option<VersionNumber>>;
}

/// Answers from a fixed version instead of a release feed
#[derive(Debug, Default)]
pub struct StubUpdateChecker {
    latest: Option<VersionNumber>,
}

impl StubUpdateChecker {
    /// Checker that knows no releases
    pub fn offline() -> Self {
        Self::default()
    }

    pub fn with_latest(latest: VersionNumber) -> Self {
        Self {
            latest: Some(latest),
        }
    }
}

impl UpdateChecker for StubUpdateChecker {
    async fn latest_version(&self) -> Result<Option<VersionNumber>> {
        Ok(self.latest)
    }
}

/// Compare `current` with what `checker` reports
pub async fn check_for_updates<U>(checker: &U, current: VersionNumber) -> Result<UpdateStatus>
where
    U: UpdateChecker + Sync,
{
    let status = match checker.latest_version().await? {
        Some(latest) if latest > current => UpdateStatus::Available { version: latest },
        Some(_) => UpdateStatus::UpToDate,
        None => UpdateStatus::Unknown,
    };
    debug!("Update check for {}: {:?}", current, status);
    Ok(status)
}
