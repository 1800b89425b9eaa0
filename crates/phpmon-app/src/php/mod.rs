//! PHP installation resolver
//!
//! Discovers installed PHP formulae, resolves the active installation into an
//! immutable snapshot and performs version switches and extension toggles.
//! Snapshots are replaced wholesale, never mutated; a failed re-resolve
//! leaves the previous snapshot current.

pub mod detect;
pub mod extensions;
pub mod install;
pub mod switcher;

use std::sync::Arc;

use phpmon_core::prelude::*;
use phpmon_env::Environment;
use tokio::sync::RwLock;

use crate::events::{EventBus, StateEvent};

pub use detect::{detect_installed_versions, InstalledPhpFormula};
pub use install::{resolve_active_installation, ActivePhpInstallation, PhpExtension, PhpLimits};

/// Owns the installed-versions list and the active installation snapshot
pub struct PhpResolver {
    env: Environment,
    bus: EventBus,
    installed: RwLock<Arc<[InstalledPhpFormula]>>,
    current: RwLock<Option<Arc<ActivePhpInstallation>>>,
}

impl PhpResolver {
    pub fn new(env: Environment, bus: EventBus) -> Self {
        Self {
            env,
            bus,
            installed: RwLock::new(Vec::new().into()),
            current: RwLock::new(None),
        }
    }

    /// Current snapshot, if one has been resolved
    pub async fn current(&self) -> Option<Arc<ActivePhpInstallation>> {
        self.current.read().await.clone()
    }

    /// Last detected installed versions
    pub async fn installed(&self) -> Arc<[InstalledPhpFormula]> {
        self.installed.read().await.clone()
    }

    /// Re-run detection and store the result
    pub async fn detect_installed_versions(&self) -> Result<Arc<[InstalledPhpFormula]>> {
        let installed: Arc<[InstalledPhpFormula]> =
            detect_installed_versions(&self.env).await?.into();
        *self.installed.write().await = installed.clone();
        Ok(installed)
    }

    /// Resolve the live configuration and make it the current snapshot
    pub async fn resolve_active_installation(&self) -> Result<Arc<ActivePhpInstallation>> {
        let installed = self.installed().await;
        let install = Arc::new(resolve_active_installation(&self.env, &installed).await?);

        let previous = self.current.write().await.replace(install.clone());
        if previous.as_ref().map(|p| p.version) != Some(install.version) {
            info!("Active PHP version is now {}", install.version);
        }

        self.bus.publish(StateEvent::PhpInstallationChanged {
            version: install.version,
        });
        Ok(install)
    }

    /// Current snapshot, resolving one first when there is none
    pub async fn current_or_resolve(&self) -> Result<Arc<ActivePhpInstallation>> {
        match self.current().await {
            Some(install) => Ok(install),
            None => self.resolve_active_installation().await,
        }
    }
}
