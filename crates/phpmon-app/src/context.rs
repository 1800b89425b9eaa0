//! Application context
//!
//! [`AppContext`] is constructed once with an [`Environment`] and the user's
//! [`Settings`]. It owns the components and routes every state-changing
//! operation through the [`Orchestrator`], reporting outcomes on the
//! [`EventBus`].

use std::future::Future;
use std::sync::Arc;

use phpmon_core::prelude::*;
use phpmon_core::ActionOutcome;
use phpmon_env::Environment;

use crate::brew::{BrewFormula, BrewFormulaeHandler};
use crate::config::{PreferenceKey, Settings};
use crate::domains::DomainController;
use crate::events::{EventBus, NoticeKind, StateEvent};
use crate::orchestrator::{Behaviour, BehaviourTarget, Orchestrator};
use crate::php::{ActivePhpInstallation, PhpResolver};
use crate::services::ServicesManager;

const AFTER_PHP_CHANGE: &[Behaviour] = &[
    Behaviour::ReloadsPhpInstallation,
    Behaviour::ReloadsServices,
    Behaviour::NotifiesObservers,
];
const AFTER_CONFIG_CHANGE: &[Behaviour] = &[Behaviour::ReloadsServices, Behaviour::NotifiesObservers];
const AFTER_DOMAIN_CHANGE: &[Behaviour] = &[Behaviour::NotifiesObservers];

/// Owns the environment, the components and the orchestrator
pub struct AppContext {
    env: Environment,
    settings: Settings,
    bus: EventBus,
    orchestrator: Orchestrator,
    php: PhpResolver,
    services: ServicesManager,
    domains: DomainController,
}

impl AppContext {
    pub fn new(env: Environment, settings: Settings) -> Self {
        let bus = EventBus::default();
        Self {
            orchestrator: Orchestrator::new(bus.clone()),
            php: PhpResolver::new(env.clone(), bus.clone()),
            services: ServicesManager::new(env.clone(), bus.clone(), &settings.custom_services),
            domains: DomainController::new(env.clone(), bus.clone()),
            env,
            settings,
            bus,
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn php(&self) -> &PhpResolver {
        &self.php
    }

    pub fn services(&self) -> &ServicesManager {
        &self.services
    }

    pub fn domains(&self) -> &DomainController {
        &self.domains
    }

    pub fn is_busy(&self) -> bool {
        self.orchestrator.is_busy()
    }

    /// Detect PHP, resolve the active installation, query services and list
    /// domains
    ///
    /// A machine without PHP or Valet still starts; those failures are logged
    /// and leave the corresponding snapshot empty.
    pub async fn startup(&self) -> Result<()> {
        self.orchestrator
            .run("startup", AFTER_CONFIG_CHANGE, self, async {
                let installed = self.php.detect_installed_versions().await?;
                debug!("Detected {} PHP versions", installed.len());

                if let Err(e) = self.reload_php_installation().await {
                    warn!("No active PHP installation: {}", e);
                }
                if let Err(e) = self.domains.list_domains().await {
                    warn!("Could not list domains: {}", e);
                }
                Ok(())
            })
            .await
    }

    /// Re-resolve the active installation unless an operation is running
    pub async fn refresh_active_installation(&self) -> Result<Option<Arc<ActivePhpInstallation>>> {
        if self.is_busy() {
            debug!("Skipping PHP refresh while busy");
            return Ok(None);
        }
        self.reload_php_installation().await?;
        Ok(self.php.current().await)
    }

    // ─────────────────────────────────────────────────────────
    // PHP
    // ─────────────────────────────────────────────────────────

    pub async fn switch_php(&self, version: &str) -> Result<ActionOutcome> {
        self.switch_php_with(version, |_| {}).await
    }

    /// [`AppContext::switch_php`] with a completion callback
    pub async fn switch_php_with<C>(&self, version: &str, completion: C) -> Result<ActionOutcome>
    where
        C: FnOnce(&Result<ActionOutcome>),
    {
        let description = format!("Switch to PHP {}", version);
        self.orchestrator
            .execute(
                "switch_php",
                AFTER_PHP_CHANGE,
                self,
                self.php.switch_to(version),
                |result| {
                    self.report(&description, result, true);
                    completion(result);
                },
            )
            .await
    }

    /// Enable or disable an extension of the active installation
    pub async fn toggle_extension(&self, name: &str) -> Result<ActionOutcome> {
        let services = self
            .settings
            .flag(PreferenceKey::AutoRestartAfterExtensionToggle)
            .then_some(&self.services);
        self.perform(
            "toggle_extension",
            &format!("Toggle extension {}", name),
            AFTER_CONFIG_CHANGE,
            true,
            self.php.toggle_extension(name, services),
        )
        .await
    }

    /// Supported PHP formulae from `handler`
    pub async fn load_formulae<H>(&self, handler: &H, load_outdated: bool) -> Result<Vec<BrewFormula>>
    where
        H: BrewFormulaeHandler + Sync,
    {
        handler.load_php_versions(load_outdated).await
    }

    // ─────────────────────────────────────────────────────────
    // Services
    // ─────────────────────────────────────────────────────────

    pub async fn toggle_service(&self, name: &str) -> Result<ActionOutcome> {
        self.perform(
            "toggle_service",
            &format!("Toggle service {}", name),
            AFTER_DOMAIN_CHANGE,
            self.settings.flag(PreferenceKey::NotifyAboutServices),
            self.services.toggle_service(name),
        )
        .await
    }

    // ─────────────────────────────────────────────────────────
    // Domains
    // ─────────────────────────────────────────────────────────

    pub async fn secure(&self, site: &str) -> Result<ActionOutcome> {
        self.perform_secure_toggle(&format!("Secure {}", site), self.domains.secure(site))
            .await
    }

    pub async fn unsecure(&self, site: &str) -> Result<ActionOutcome> {
        self.perform_secure_toggle(&format!("Unsecure {}", site), self.domains.unsecure(site))
            .await
    }

    pub async fn toggle_secure(&self, site: &str) -> Result<ActionOutcome> {
        self.perform_secure_toggle(
            &format!("Toggle TLS for {}", site),
            self.domains.toggle_secure(site),
        )
        .await
    }

    pub async fn toggle_proxy_secure(&self, domain: &str) -> Result<ActionOutcome> {
        self.perform_secure_toggle(
            &format!("Toggle TLS for proxy {}", domain),
            self.domains.toggle_proxy_secure(domain),
        )
        .await
    }

    pub async fn isolate(&self, site: &str, version: &str) -> Result<ActionOutcome> {
        self.perform_domain(
            &format!("Isolate {} on PHP {}", site, version),
            self.domains.isolate(site, version),
        )
        .await
    }

    pub async fn unisolate(&self, site: &str) -> Result<ActionOutcome> {
        self.perform_domain(&format!("Unisolate {}", site), self.domains.unisolate(site))
            .await
    }

    pub async fn link(&self, path: &str, name: &str) -> Result<ActionOutcome> {
        self.perform_domain(&format!("Link {}", name), self.domains.link(path, name))
            .await
    }

    pub async fn unlink(&self, site: &str) -> Result<ActionOutcome> {
        self.perform_domain(&format!("Unlink {}", site), self.domains.unlink(site))
            .await
    }

    pub async fn proxy(&self, domain: &str, target: &str, secure: bool) -> Result<ActionOutcome> {
        self.perform_domain(
            &format!("Proxy {} to {}", domain, target),
            self.domains.proxy(domain, target, secure),
        )
        .await
    }

    pub async fn unproxy(&self, domain: &str) -> Result<ActionOutcome> {
        self.perform_domain(&format!("Unproxy {}", domain), self.domains.unproxy(domain))
            .await
    }

    async fn perform_secure_toggle<F>(&self, description: &str, task: F) -> Result<ActionOutcome>
    where
        F: Future<Output = Result<ActionOutcome>>,
    {
        let notify = self.settings.flag(PreferenceKey::NotifyAboutSecureToggle);
        self.perform("secure_toggle", description, AFTER_DOMAIN_CHANGE, notify, task)
            .await
    }

    async fn perform_domain<F>(&self, description: &str, task: F) -> Result<ActionOutcome>
    where
        F: Future<Output = Result<ActionOutcome>>,
    {
        self.perform("domain_action", description, AFTER_DOMAIN_CHANGE, true, task)
            .await
    }

    async fn perform<F>(
        &self,
        name: &str,
        description: &str,
        behaviours: &[Behaviour],
        notify: bool,
        task: F,
    ) -> Result<ActionOutcome>
    where
        F: Future<Output = Result<ActionOutcome>>,
    {
        self.orchestrator
            .execute(name, behaviours, self, task, |result| {
                self.report(description, result, notify)
            })
            .await
    }

    /// Notices for verified outcomes; failures are reported by the orchestrator
    fn report(&self, description: &str, result: &Result<ActionOutcome>, notify: bool) {
        match result {
            Ok(ActionOutcome::Changed) if notify => {
                self.bus
                    .notice(NoticeKind::Changed, format!("{}: done.", description), None);
            }
            Ok(ActionOutcome::Unchanged { command }) => {
                warn!("{} had no effect (`{}`)", description, command);
                self.bus.notice(
                    NoticeKind::StateUnchanged,
                    format!("{}: the command ran but nothing changed.", description),
                    Some(command.clone()),
                );
            }
            _ => {}
        }
    }
}

impl BehaviourTarget for AppContext {
    async fn reload_php_installation(&self) -> Result<()> {
        let install = self.php.resolve_active_installation().await?;
        self.services.retarget_php(&install.formula).await;
        Ok(())
    }

    async fn reload_services(&self) -> Result<()> {
        self.services.reload_services_status().await
    }

    /// Re-broadcast the current snapshots
    async fn notify_observers(&self) {
        if let Some(install) = self.php.current().await {
            self.bus.publish(StateEvent::PhpInstallationChanged {
                version: install.version,
            });
        }
        let summary = self.services.summary().await;
        self.bus.publish(StateEvent::ServicesUpdated {
            severity: summary.severity,
            message: summary.message,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::AppContext;
    use crate::brew::FakeBrewFormulaeHandler;
    use crate::config::Settings;
    use crate::events::{NoticeKind, StateEvent};
    use crate::orchestrator::Behaviour;
    use phpmon_core::{ActionOutcome, Error, StatusSeverity};
    use phpmon_env::{FakeShellOutput, TestableConfiguration, TestableEnvironment};

    async fn started(config: TestableConfiguration, settings: Settings) -> (AppContext, TestableEnvironment) {
        let t = config.into_environment();
        let context = AppContext::new(t.env.clone(), settings);
        context.startup().await.unwrap();
        (context, t)
    }

    fn notices(rx: &mut tokio::sync::broadcast::Receiver<StateEvent>) -> Vec<(NoticeKind, Option<String>)> {
        let mut notices = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let StateEvent::Notice(notice) = event {
                notices.push((notice.kind, notice.command));
            }
        }
        notices
    }

    #[tokio::test]
    async fn test_startup_working_preset() {
        let (context, _t) = started(TestableConfiguration::working(), Settings::default()).await;

        let install = context.php().current().await.unwrap();
        assert_eq!(install.version.long(), "8.1.10");
        assert_eq!(install.formula, "php@8.1");

        let summary = context.services().summary().await;
        assert_eq!(summary.severity, StatusSeverity::Healthy);
        assert_eq!(context.services().snapshot().await[0].name(), "php@8.1");

        assert_eq!(context.domains().listing().await.sites.len(), 4);
        assert!(!context.is_busy());
    }

    #[tokio::test]
    async fn test_startup_broken_preset() {
        let (context, _t) = started(TestableConfiguration::broken(), Settings::default()).await;

        assert!(context.php().current().await.is_none());
        assert_eq!(
            context.services().summary().await.severity,
            StatusSeverity::Critical
        );
        assert!(context.domains().listing().await.sites.is_empty());
    }

    #[tokio::test]
    async fn test_switch_php_reports_change() {
        let (context, t) = started(TestableConfiguration::working(), Settings::default()).await;
        let mut rx = context.bus().subscribe();

        let outcome = context.switch_php("8.2").await.unwrap();
        assert_eq!(outcome, ActionOutcome::Changed);
        assert_eq!(context.php().current().await.unwrap().version.long(), "8.2.3");
        assert_eq!(context.services().snapshot().await[0].name(), "php");
        assert_eq!(
            t.shell.count("sudo /opt/homebrew/bin/brew services info php --json"),
            1
        );

        assert_eq!(notices(&mut rx), vec![(NoticeKind::Changed, None)]);
    }

    #[tokio::test]
    async fn test_switch_php_failure_reports_command() {
        let link = "/opt/homebrew/bin/brew link php --overwrite --force";
        let (context, _t) = started(
            TestableConfiguration::working()
                .with_shell(link, FakeShellOutput::failure("Error: Could not symlink bin/php")),
            Settings::default(),
        )
        .await;
        let mut rx = context.bus().subscribe();
        let mut completed = 0;

        let result = context
            .switch_php_with("8.2", |r| {
                assert!(r.is_err());
                completed += 1;
            })
            .await;

        assert_eq!(result.unwrap_err().command(), Some(link));
        assert_eq!(completed, 1);
        assert!(!context.is_busy());
        assert_eq!(
            context.php().current().await.unwrap().version.long(),
            "8.1.10"
        );
        assert_eq!(
            notices(&mut rx),
            vec![(NoticeKind::HardFailure, Some(link.to_string()))]
        );
    }

    #[tokio::test]
    async fn test_secure_without_effect_publishes_unchanged() {
        let command = "cd '/Users/phpmon/Code/example' && sudo /opt/homebrew/bin/valet secure && exit;";
        let (context, _t) = started(
            TestableConfiguration::working().with_shell(command, FakeShellOutput::instant("")),
            Settings::default(),
        )
        .await;
        let mut rx = context.bus().subscribe();

        let outcome = context.secure("example").await.unwrap();
        assert!(!outcome.is_changed());
        assert_eq!(
            notices(&mut rx),
            vec![(NoticeKind::StateUnchanged, Some(command.to_string()))]
        );
    }

    #[tokio::test]
    async fn test_secure_toggle_notice_follows_preference() {
        let settings = Settings {
            notify_about_secure_toggle: false,
            ..Default::default()
        };
        let (context, _t) = started(TestableConfiguration::working(), settings).await;
        let mut rx = context.bus().subscribe();

        assert!(context.secure("example").await.unwrap().is_changed());
        assert!(notices(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_toggle_extension_without_restart() {
        let settings = Settings {
            auto_restart_after_extension_toggle: false,
            ..Default::default()
        };
        let (context, t) = started(TestableConfiguration::working(), settings).await;

        assert!(context.toggle_extension("xdebug").await.unwrap().is_changed());
        assert_eq!(
            t.shell.count("sudo /opt/homebrew/bin/brew services restart php@8.1"),
            0
        );
    }

    #[tokio::test]
    async fn test_toggle_extension_restarts_php() {
        let (context, t) = started(TestableConfiguration::working(), Settings::default()).await;

        assert!(context.toggle_extension("xdebug").await.unwrap().is_changed());
        assert_eq!(
            t.shell.count("sudo /opt/homebrew/bin/brew services restart php@8.1"),
            1
        );
    }

    #[tokio::test]
    async fn test_refresh_skipped_while_busy() {
        let (context, _t) = started(TestableConfiguration::working(), Settings::default()).await;

        let skipped = context
            .orchestrator()
            .run("hold", &[Behaviour::NotifiesObservers], &context, async {
                context.refresh_active_installation().await
            })
            .await
            .unwrap();
        assert!(skipped.is_none());

        let refreshed = context.refresh_active_installation().await.unwrap();
        assert_eq!(refreshed.unwrap().version.long(), "8.1.10");
    }

    #[tokio::test]
    async fn test_operation_rejected_while_busy() {
        let (context, _t) = started(TestableConfiguration::working(), Settings::default()).await;

        let result = context
            .orchestrator()
            .run("hold", &[], &context, async { context.toggle_service("dnsmasq").await })
            .await;
        assert!(matches!(result, Err(Error::Busy)));
        assert!(!context.is_busy());
    }

    #[tokio::test]
    async fn test_load_formulae() {
        let (context, _t) = started(TestableConfiguration::working(), Settings::default()).await;
        let formulae = context
            .load_formulae(&FakeBrewFormulaeHandler, true)
            .await
            .unwrap();
        assert_eq!(formulae.len(), 4);
    }
}
