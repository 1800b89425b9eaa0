//! Service registry
//!
//! Tracks the Homebrew services PHP Monitor manages and their live status.
//! The first three services (PHP, nginx, dnsmasq) decide the aggregate
//! health; user-configured extras are listed but never affect it.

use std::sync::Arc;

use futures_util::future::join_all;
use phpmon_core::prelude::*;
use phpmon_core::{ActionOutcome, HomebrewFormula, ServiceStatus, StatusSeverity};
use phpmon_env::Environment;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::events::{EventBus, NoticeKind, StateEvent};

/// Number of leading services that decide the aggregate status
pub const KEY_SERVICE_COUNT: usize = 3;

/// One record of `brew services info <name> --json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct HomebrewService {
    pub name: String,
    pub service_name: Option<String>,
    pub running: bool,
    pub loaded: bool,
    pub pid: Option<u32>,
    pub status: Option<String>,
    pub command: Option<String>,
    pub working_dir: Option<String>,
}

impl HomebrewService {
    /// First record of a `brew services info --json` payload
    ///
    /// An empty array or unparsable output means the formula has no service.
    pub fn parse(json: &str) -> Option<Self> {
        match serde_json::from_str::<Vec<HomebrewService>>(json.trim()) {
            Ok(services) => services.into_iter().next(),
            Err(e) => {
                debug!("Unparsable service info: {}", e);
                None
            }
        }
    }

    /// The binary the service launches
    pub fn binary(&self) -> Option<&str> {
        self.command
            .as_deref()
            .and_then(|command| command.split_whitespace().next())
    }
}

/// A managed service and its last known status
#[derive(Debug, Clone, Serialize)]
pub struct ServiceWrapper {
    pub formula: HomebrewFormula,
    pub status: ServiceStatus,
    pub service: Option<HomebrewService>,
}

impl ServiceWrapper {
    pub fn loading(formula: HomebrewFormula) -> Self {
        Self {
            formula,
            status: ServiceStatus::Loading,
            service: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.formula.name
    }
}

/// Aggregate health of the key services
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServicesSummary {
    pub severity: StatusSeverity,
    pub message: String,
}

/// Derive the aggregate status from the first [`KEY_SERVICE_COUNT`] services
pub fn summarize(services: &[ServiceWrapper]) -> ServicesSummary {
    let key = &services[..services.len().min(KEY_SERVICE_COUNT)];

    let (severity, message) = if key.iter().any(|s| s.status.is_missing()) {
        (StatusSeverity::Critical, "A key service is not installed.")
    } else if key.iter().any(|s| s.status == ServiceStatus::Stopped) {
        (StatusSeverity::Warning, "A key service is not running.")
    } else if key.is_empty() || key.iter().any(|s| s.status == ServiceStatus::Loading) {
        (StatusSeverity::Pending, "Loading...")
    } else {
        (StatusSeverity::Healthy, "All Valet services are OK.")
    };

    ServicesSummary {
        severity,
        message: message.to_string(),
    }
}

/// Owns the service list and its status snapshot
pub struct ServicesManager {
    env: Environment,
    bus: EventBus,
    services: RwLock<Arc<[ServiceWrapper]>>,
}

impl ServicesManager {
    /// Key formulae followed by `custom` extras (not elevated)
    pub fn new(env: Environment, bus: EventBus, custom: &[String]) -> Self {
        let services: Vec<ServiceWrapper> = HomebrewFormula::key_formulae()
            .into_iter()
            .chain(custom.iter().map(|name| HomebrewFormula::new(name.clone(), false)))
            .map(ServiceWrapper::loading)
            .collect();

        Self {
            env,
            bus,
            services: RwLock::new(services.into()),
        }
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Arc<[ServiceWrapper]> {
        self.services.read().await.clone()
    }

    pub async fn summary(&self) -> ServicesSummary {
        summarize(&self.snapshot().await)
    }

    pub async fn service(&self, name: &str) -> Option<ServiceWrapper> {
        self.snapshot()
            .await
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// Point the PHP service at the formula of the active installation
    pub async fn retarget_php(&self, formula: &str) {
        let mut guard = self.services.write().await;
        if guard.first().map(|s| s.name()) == Some(formula) {
            return;
        }

        let mut services = guard.to_vec();
        if let Some(php) = services.first_mut() {
            debug!("PHP service now tracks {}", formula);
            php.formula.name = formula.to_string();
            php.status = ServiceStatus::Loading;
            php.service = None;
        }
        *guard = services.into();
    }

    fn sudo(formula: &HomebrewFormula) -> &'static str {
        if formula.elevated {
            "sudo "
        } else {
            ""
        }
    }

    fn info_command(&self, formula: &HomebrewFormula) -> String {
        format!(
            "{}{} services info {} --json",
            Self::sudo(formula),
            self.env.paths.brew(),
            formula.name
        )
    }

    fn action_command(&self, formula: &HomebrewFormula, action: &str) -> String {
        format!(
            "{}{} services {} {}",
            Self::sudo(formula),
            self.env.paths.brew(),
            action,
            formula.name
        )
    }

    /// Query one service; failures degrade to "not installed"
    async fn query(&self, formula: HomebrewFormula) -> ServiceWrapper {
        let command = self.info_command(&formula);
        let service = match self.env.shell.run(&command).await {
            Ok(output) if output.success() => HomebrewService::parse(&output.out),
            Ok(output) => {
                warn!("Service query for {} failed: {}", formula.name, output.text().trim());
                None
            }
            Err(e) => {
                warn!("Service query for {} failed: {}", formula.name, e);
                None
            }
        };

        let status = match &service {
            None => ServiceStatus::NotInstalled,
            Some(s) if s.running => ServiceStatus::Running,
            Some(s) => match s.binary() {
                Some(binary) if !self.env.fs.file_exists(binary) => ServiceStatus::MissingBinary,
                _ => ServiceStatus::Stopped,
            },
        };

        ServiceWrapper {
            formula,
            status,
            service,
        }
    }

    async fn publish(&self) {
        let summary = self.summary().await;
        self.bus.publish(StateEvent::ServicesUpdated {
            severity: summary.severity,
            message: summary.message,
        });
    }

    /// Re-query every service concurrently and replace the snapshot
    pub async fn reload_services_status(&self) -> Result<()> {
        let formulae: Vec<HomebrewFormula> = self
            .snapshot()
            .await
            .iter()
            .map(|s| s.formula.clone())
            .collect();

        let updated: Vec<ServiceWrapper> =
            join_all(formulae.into_iter().map(|f| self.query(f))).await;

        debug!(
            "Service statuses: {}",
            updated
                .iter()
                .map(|s| format!("{}={}", s.name(), s.status.label()))
                .collect::<Vec<_>>()
                .join(", ")
        );

        *self.services.write().await = updated.into();
        self.publish().await;
        Ok(())
    }

    /// Re-query a single service and splice it into the snapshot
    pub async fn reload_service(&self, name: &str) -> Result<ServiceWrapper> {
        let current = self
            .service(name)
            .await
            .ok_or_else(|| Error::service_not_found(name))?;
        let updated = self.query(current.formula).await;

        let mut guard = self.services.write().await;
        let services: Vec<ServiceWrapper> = guard
            .iter()
            .map(|s| {
                if s.name() == name {
                    updated.clone()
                } else {
                    s.clone()
                }
            })
            .collect();
        *guard = services.into();
        drop(guard);

        self.publish().await;
        Ok(updated)
    }

    /// Start a stopped service or stop a running one
    ///
    /// The outcome reflects the re-queried status, not the exit code.
    pub async fn toggle_service(&self, name: &str) -> Result<ActionOutcome> {
        let current = self
            .service(name)
            .await
            .ok_or_else(|| Error::service_not_found(name))?;

        let was_running = current.status.is_running();
        let action = if was_running { "stop" } else { "start" };
        let command = self.action_command(&current.formula, action);

        info!("{} service {}", if was_running { "Stopping" } else { "Starting" }, name);
        self.env.shell.run_checked(&command).await?;

        let updated = self.reload_service(name).await?;
        let outcome = ActionOutcome::verify(updated.status.is_running() != was_running, command);

        if !was_running && !outcome.is_changed() {
            self.bus.notice(
                NoticeKind::CouldNotStart,
                format!("{} could not be started.", current.formula.display_name),
                Some(self.action_command(&current.formula, action)),
            );
        }
        Ok(outcome)
    }

    /// `brew services restart`, used after configuration changes
    pub async fn restart_service(&self, name: &str) -> Result<()> {
        let current = self
            .service(name)
            .await
            .ok_or_else(|| Error::service_not_found(name))?;
        let command = self.action_command(&current.formula, "restart");
        self.env.shell.run_checked(&command).await?;
        Ok(())
    }
}
