//! State-changing domain actions
//!
//! Each action runs one Valet command, then re-reads the affected site or
//! proxy from disk. A command that exits cleanly without producing the
//! expected state yields [`ActionOutcome::Unchanged`].

use phpmon_core::prelude::*;
use phpmon_core::{ActionOutcome, VersionNumber};

use super::{DomainController, Proxy};

impl DomainController {
    pub async fn secure(&self, name: &str) -> Result<ActionOutcome> {
        self.set_secure(name, true).await
    }

    pub async fn unsecure(&self, name: &str) -> Result<ActionOutcome> {
        self.set_secure(name, false).await
    }

    /// Flip the TLS state of a site
    pub async fn toggle_secure(&self, name: &str) -> Result<ActionOutcome> {
        let site = self.find_site(name).await?;
        self.set_secure(name, !site.secured).await
    }

    #[instrument(skip(self))]
    async fn set_secure(&self, name: &str, secure: bool) -> Result<ActionOutcome> {
        let site = self.find_site(name).await?;
        let command = format!(
            "cd '{}' && sudo {} {} && exit;",
            site.path,
            self.env.paths.valet(),
            if secure { "secure" } else { "unsecure" }
        );
        self.env.shell.run_checked(&command).await?;

        let updated = self
            .reread_site(&site.tld, &site.name, &site.path, site.linked)
            .await;
        Ok(ActionOutcome::verify(updated.secured == secure, command))
    }

    /// Serve a site with a specific PHP version (`X.Y`)
    #[instrument(skip(self))]
    pub async fn isolate(&self, name: &str, version: &str) -> Result<ActionOutcome> {
        let version = VersionNumber::parse(version)
            .ok_or_else(|| Error::version_not_found(version))?
            .short();
        let site = self.find_site(name).await?;

        let command = format!(
            "sudo {} isolate php@{} --site '{}' && exit;",
            self.env.paths.valet(),
            version,
            site.name
        );
        self.env.shell.run_checked(&command).await?;

        let updated = self
            .reread_site(&site.tld, &site.name, &site.path, site.linked)
            .await;
        Ok(ActionOutcome::verify(
            updated.isolated_version.as_deref() == Some(version.as_str()),
            command,
        ))
    }

    /// Return a site to the global PHP version
    #[instrument(skip(self))]
    pub async fn unisolate(&self, name: &str) -> Result<ActionOutcome> {
        let site = self.find_site(name).await?;
        let command = format!(
            "sudo {} unisolate --site '{}' && exit;",
            self.env.paths.valet(),
            site.name
        );
        self.env.shell.run_checked(&command).await?;

        let updated = self
            .reread_site(&site.tld, &site.name, &site.path, site.linked)
            .await;
        Ok(ActionOutcome::verify(!updated.is_isolated(), command))
    }

    /// Link the directory at `path` as `<name>.<tld>`
    #[instrument(skip(self))]
    pub async fn link(&self, path: &str, name: &str) -> Result<ActionOutcome> {
        let tld = self.loaded_listing().await?.tld.clone();
        let command = format!(
            "cd '{}' && {} link '{}' && exit;",
            path,
            self.env.paths.valet(),
            name
        );
        self.env.shell.run_checked(&command).await?;

        let link = format!("{}/{}", self.env.paths.valet_sites(), name);
        let linked = self.env.fs.is_symlink(&link);
        if linked {
            self.reread_site(&tld, name, &link, true).await;
        }
        Ok(ActionOutcome::verify(linked, command))
    }

    /// Remove a link created with [`DomainController::link`]
    #[instrument(skip(self))]
    pub async fn unlink(&self, name: &str) -> Result<ActionOutcome> {
        let site = self.find_site(name).await?;
        if !site.linked {
            return Err(Error::NotLinked {
                name: name.to_string(),
            });
        }

        let command = format!("{} unlink '{}'", self.env.paths.valet(), site.name);
        self.env.shell.run_checked(&command).await?;

        let removed = !self.env.fs.any_exists(&site.path);
        if removed {
            self.forget_site(&site.name).await;
        }
        Ok(ActionOutcome::verify(removed, command))
    }

    /// Forward `<domain>.<tld>` to `target`
    #[instrument(skip(self))]
    pub async fn proxy(&self, domain: &str, target: &str, secure: bool) -> Result<ActionOutcome> {
        let tld = self.loaded_listing().await?.tld.clone();
        let command = proxy_command(&self.env.paths.valet(), domain, target, secure);
        self.env.shell.run_checked(&command).await?;

        let created = self.reread_proxy(&tld, domain).await;
        Ok(ActionOutcome::verify(created.is_some(), command))
    }

    #[instrument(skip(self))]
    pub async fn unproxy(&self, domain: &str) -> Result<ActionOutcome> {
        let proxy = self.find_proxy(domain).await?;
        let command = format!("sudo {} unproxy {}", self.env.paths.valet(), proxy.domain);
        self.env.shell.run_checked(&command).await?;

        let remaining = self.reread_proxy(&proxy.tld, &proxy.domain).await;
        Ok(ActionOutcome::verify(remaining.is_none(), command))
    }

    /// Recreate a proxy with the opposite TLS state and restart nginx
    #[instrument(skip(self))]
    pub async fn toggle_proxy_secure(&self, domain: &str) -> Result<ActionOutcome> {
        let proxy = self.find_proxy(domain).await?;
        let secure = !proxy.secured;
        let valet = self.env.paths.valet();

        self.env
            .shell
            .run_checked(&format!("sudo {} unproxy {}", valet, proxy.domain))
            .await?;
        let command = proxy_command(&valet, &proxy.domain, &proxy.target, secure);
        self.env.shell.run_checked(&command).await?;
        self.env
            .shell
            .run_checked(&format!(
                "sudo {} services restart nginx",
                self.env.paths.brew()
            ))
            .await?;

        let updated = self.reread_proxy(&proxy.tld, &proxy.domain).await;
        Ok(ActionOutcome::verify(
            updated.is_some_and(|p: Proxy| p.secured == secure),
            command,
        ))
    }
}

fn proxy_command(valet: &str, domain: &str, target: &str, secure: bool) -> String {
    let mut command = format!("sudo {} proxy {} {}", valet, domain, target);
    if secure {
        command.push_str(" --secure");
    }
    command
}

#[cfg(test)]
mod tests {
    use super::super::DomainController;
    use crate::events::{EventBus, StateEvent};
    use phpmon_core::{ActionOutcome, Error};
    use phpmon_env::{FakeShellOutput, TestableConfiguration, TestableEnvironment};

    const VALET: &str = "/opt/homebrew/bin/valet";

    async fn controller(t: &TestableEnvironment) -> DomainController {
        let controller = DomainController::new(t.env.clone(), EventBus::default());
        controller.list_domains().await.unwrap();
        controller
    }

    #[tokio::test]
    async fn test_secure_site() {
        let t = TestableConfiguration::working().into_environment();
        let controller = controller(&t).await;

        let outcome = controller.secure("example").await.unwrap();
        assert_eq!(outcome, ActionOutcome::Changed);
        assert!(controller.listing().await.site("example").unwrap().secured);
    }

    #[tokio::test]
    async fn test_unsecure_site() {
        let t = TestableConfiguration::working().into_environment();
        let controller = controller(&t).await;

        let outcome = controller.toggle_secure("api").await.unwrap();
        assert!(outcome.is_changed());
        assert!(!controller.listing().await.site("api").unwrap().secured);
    }

    #[tokio::test]
    async fn test_secure_without_effect_is_unchanged() {
        let command = format!("cd '/Users/phpmon/Code/example' && sudo {} secure && exit;", VALET);
        let t = TestableConfiguration::working()
            .with_shell(command.clone(), FakeShellOutput::instant(""))
            .into_environment();
        let controller = controller(&t).await;

        let outcome = controller.secure("example").await.unwrap();
        assert_eq!(outcome, ActionOutcome::Unchanged { command });
    }

    #[tokio::test]
    async fn test_failed_command_is_an_error() {
        let command = format!("cd '/Users/phpmon/Code/example' && sudo {} secure && exit;", VALET);
        let t = TestableConfiguration::working()
            .with_shell(command.clone(), FakeShellOutput::failure("sudo: a password is required"))
            .into_environment();
        let controller = controller(&t).await;

        let err = controller.secure("example").await.unwrap_err();
        assert_eq!(err.command(), Some(command.as_str()));
    }

    #[tokio::test]
    async fn test_isolate_and_unisolate() {
        let t = TestableConfiguration::working().into_environment();
        let controller = controller(&t).await;

        assert!(controller.isolate("example", "8.1").await.unwrap().is_changed());
        let listing = controller.listing().await;
        assert_eq!(
            listing.site("example").unwrap().isolated_version.as_deref(),
            Some("8.1")
        );

        assert!(controller.unisolate("shop").await.unwrap().is_changed());
        assert!(!controller.listing().await.site("shop").unwrap().is_isolated());
    }

    #[tokio::test]
    async fn test_isolate_rejects_bad_version() {
        let t = TestableConfiguration::working().into_environment();
        let controller = controller(&t).await;
        let err = controller.isolate("example", "latest").await.unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_link_and_unlink() {
        let t = TestableConfiguration::working().into_environment();
        let controller = controller(&t).await;

        let outcome = controller.link("/Users/phpmon/Projects/blog", "blog").await.unwrap();
        assert!(outcome.is_changed());
        let listing = controller.listing().await;
        let blog = listing.site("blog").unwrap();
        assert!(blog.linked);
        assert_eq!(blog.alias_path.as_deref(), Some("/Users/phpmon/Projects/blog"));

        assert!(controller.unlink("legacy").await.unwrap().is_changed());
        assert!(controller.listing().await.site("legacy").is_none());
    }

    #[tokio::test]
    async fn test_unlink_parked_site_fails() {
        let t = TestableConfiguration::working().into_environment();
        let controller = controller(&t).await;
        let err = controller.unlink("api").await.unwrap_err();
        assert!(matches!(err, Error::NotLinked { .. }));
    }

    #[tokio::test]
    async fn test_proxy_and_unproxy() {
        let t = TestableConfiguration::working().into_environment();
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let controller = DomainController::new(t.env.clone(), bus);
        controller.list_domains().await.unwrap();

        let outcome = controller
            .proxy("mailpit", "http://127.0.0.1:8025", false)
            .await
            .unwrap();
        assert!(outcome.is_changed());
        let domains: Vec<String> = controller
            .listing()
            .await
            .proxies
            .iter()
            .map(|p| p.domain.clone())
            .collect();
        assert_eq!(domains, vec!["mailpit", "vite"]);

        assert!(controller.unproxy("vite").await.unwrap().is_changed());
        assert!(controller.listing().await.proxy("vite").is_none());

        let mut changed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let StateEvent::DomainChanged { name } = event {
                changed.push(name);
            }
        }
        assert_eq!(changed, vec!["mailpit", "vite"]);
    }

    #[tokio::test]
    async fn test_toggle_proxy_secure() {
        let t = TestableConfiguration::working().into_environment();
        let controller = controller(&t).await;

        assert!(controller.toggle_proxy_secure("vite").await.unwrap().is_changed());
        assert!(controller.listing().await.proxy("vite").unwrap().secured);
        assert_eq!(
            t.shell
                .count("sudo /opt/homebrew/bin/brew services restart nginx"),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_proxy() {
        let t = TestableConfiguration::working().into_environment();
        let controller = controller(&t).await;
        let err = controller.unproxy("mailpit").await.unwrap_err();
        assert!(matches!(err, Error::ProxyNotFound { .. }));
    }
}
