//! Switching the linked PHP version

use phpmon_core::prelude::*;
use phpmon_core::{ActionOutcome, VersionNumber};

use super::PhpResolver;

impl PhpResolver {
    /// Make `version` (`8.2`, `8.2.3`, `php@8.2`) the linked PHP version
    ///
    /// Unlinks the current formula, links the target and re-resolves. Any
    /// failing step aborts with its command and leaves the previous snapshot
    /// current. The outcome compares the re-resolved version to the target.
    pub async fn switch_to(&self, version: &str) -> Result<ActionOutcome> {
        let target_version =
            VersionNumber::parse(version).ok_or_else(|| Error::version_not_found(version))?;

        let installed = self.detect_installed_versions().await?;
        let target = installed
            .iter()
            .find(|i| i.version.same_minor(&target_version))
            .cloned()
            .ok_or_else(|| Error::version_not_found(target_version.short()))?;

        let brew = self.env.paths.brew();
        let current = self.current().await;

        info!("Switching to PHP {} ({})", target.version.short(), target.formula);

        match &current {
            Some(install) => {
                let unlink = format!("{} unlink {}", brew, install.formula);
                self.env.shell.run_checked(&unlink).await?;
            }
            None => warn!("No active PHP installation to unlink"),
        }

        let link = format!("{} link {} --overwrite --force", brew, target.formula);
        self.env.shell.run_checked(&link).await?;

        if !self.env.fs.file_exists(&self.env.paths.php()) {
            return Err(Error::version_not_found(format!(
                "{} (no PHP binary after linking)",
                target.version.short()
            )));
        }

        let install = self.resolve_active_installation().await?;
        let outcome = ActionOutcome::verify(install.version.same_minor(&target.version), link);

        if !outcome.is_changed() {
            warn!(
                "Linked {} but PHP reports {}",
                target.formula, install.version
            );
        }
        Ok(outcome)
    }
}
