//! Core domain type definitions

use serde::Serialize;

/// A Homebrew formula managed as a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HomebrewFormula {
    /// Formula name as understood by `brew` (e.g. "nginx", "php@8.1")
    pub name: String,
    /// Human-readable name
    pub display_name: String,
    /// Whether `brew services` must run through `sudo` for this formula
    pub elevated: bool,
}

impl HomebrewFormula {
    pub fn new(name: impl Into<String>, elevated: bool) -> Self {
        let name = name.into();
        Self {
            display_name: name.clone(),
            name,
            elevated,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn php() -> Self {
        Self::new("php", true).with_display_name("PHP")
    }

    pub fn nginx() -> Self {
        Self::new("nginx", true)
    }

    pub fn dnsmasq() -> Self {
        Self::new("dnsmasq", true)
    }

    /// The three formulae every Valet setup needs, in registry order
    pub fn key_formulae() -> Vec<Self> {
        vec![Self::php(), Self::nginx(), Self::dnsmasq()]
    }
}

/// Live status of a managed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Not queried yet
    #[default]
    Loading,
    /// Formula is not installed (brew reports no service)
    NotInstalled,
    /// Service is known but its binary is gone
    MissingBinary,
    /// Installed but not running
    Stopped,
    /// Running
    Running,
}

impl ServiceStatus {
    /// Not installed, or installed without a usable binary
    pub fn is_missing(&self) -> bool {
        matches!(self, ServiceStatus::NotInstalled | ServiceStatus::MissingBinary)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, ServiceStatus::Running)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ServiceStatus::Loading => "loading",
            ServiceStatus::NotInstalled => "not installed",
            ServiceStatus::MissingBinary => "missing binary",
            ServiceStatus::Stopped => "stopped",
            ServiceStatus::Running => "running",
        }
    }
}

/// Aggregate health of the key services, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusSeverity {
    Healthy,
    Pending,
    Warning,
    Critical,
}

/// Verified result of a state-changing operation
///
/// Commands may exit successfully without doing anything (privileged
/// commands in particular). Every operation re-reads the affected state and
/// reports `Unchanged` when the post-condition does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    /// The post-condition holds
    Changed,
    /// The command ran but the observed state is the same as before
    Unchanged { command: String },
}

impl ActionOutcome {
    /// Pick the outcome from a post-condition check
    pub fn verify(took_effect: bool, command: impl Into<String>) -> Self {
        if took_effect {
            ActionOutcome::Changed
        } else {
            ActionOutcome::Unchanged {
                command: command.into(),
            }
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(self, ActionOutcome::Changed)
    }
}
