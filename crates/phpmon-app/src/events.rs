//! State change events broadcast to observers
//!
//! Components publish a [`StateEvent`] after replacing a snapshot. Any number
//! of observers (the command line front end, tests) subscribe through
//! [`EventBus::subscribe`].

use chrono::{DateTime, Local};
use phpmon_core::prelude::*;
use phpmon_core::{StatusSeverity, VersionNumber};
use serde::Serialize;
use tokio::sync::broadcast;

/// Kind of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// A service was asked to start and is still not running
    CouldNotStart,
    /// A command ran but the observed state did not change
    StateUnchanged,
    /// A step failed outright
    HardFailure,
    /// The requested change was observed
    Changed,
}

/// A user-facing notice with the command to diagnose it, when there is one
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
    pub command: Option<String>,
    pub timestamp: DateTime<Local>,
}

impl Notice {
    pub fn new(kind: NoticeKind, message: impl Into<String>, command: Option<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            command,
            timestamp: Local::now(),
        }
    }
}

/// State change signals
#[derive(Debug, Clone)]
pub enum StateEvent {
    // ─────────────────────────────────────────────────────────
    // Orchestration
    // ─────────────────────────────────────────────────────────
    /// The busy flag was set or cleared
    BusyChanged { busy: bool },

    /// An operation was refused because another one is in flight
    OperationRejected { operation: String },

    // ─────────────────────────────────────────────────────────
    // Snapshots
    // ─────────────────────────────────────────────────────────
    /// A new active PHP installation snapshot is current
    PhpInstallationChanged { version: VersionNumber },

    /// Service statuses were re-queried
    ServicesUpdated {
        severity: StatusSeverity,
        message: String,
    },

    /// The full domain listing was re-read
    DomainsUpdated { sites: usize, proxies: usize },

    /// One site or proxy was re-read, added or removed
    DomainChanged { name: String },

    // ─────────────────────────────────────────────────────────
    // Notices
    // ─────────────────────────────────────────────────────────
    Notice(Notice),
}

impl StateEvent {
    /// Short label for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BusyChanged { .. } => "busy_changed",
            Self::OperationRejected { .. } => "operation_rejected",
            Self::PhpInstallationChanged { .. } => "php_installation_changed",
            Self::ServicesUpdated { .. } => "services_updated",
            Self::DomainsUpdated { .. } => "domains_updated",
            Self::DomainChanged { .. } => "domain_changed",
            Self::Notice(_) => "notice",
        }
    }
}

/// Broadcast channel for [`StateEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<StateEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: StateEvent) {
        trace!("Publishing {}", event.event_type());
        // Ignore send errors (no subscribers is fine)
        let _ = self.tx.send(event);
    }

    pub fn notice(&self, kind: NoticeKind, message: impl Into<String>, command: Option<String>) {
        self.publish(StateEvent::Notice(Notice::new(kind, message, command)));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::default();
        bus.publish(StateEvent::BusyChanged { busy: true });
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.notice(
            NoticeKind::HardFailure,
            "Could not link php",
            Some("brew link php --overwrite --force".to_string()),
        );

        for rx in [&mut first, &mut second] {
            match rx.recv().await.unwrap() {
                StateEvent::Notice(notice) => {
                    assert_eq!(notice.kind, NoticeKind::HardFailure);
                    assert_eq!(
                        notice.command.as_deref(),
                        Some("brew link php --overwrite --force")
                    );
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }

    #[test]
    fn test_event_type_labels() {
        let events = vec![
            StateEvent::BusyChanged { busy: false },
            StateEvent::OperationRejected {
                operation: "switch".to_string(),
            },
            StateEvent::PhpInstallationChanged {
                version: VersionNumber::new(8, 1, Some(10)),
            },
            StateEvent::ServicesUpdated {
                severity: StatusSeverity::Healthy,
                message: String::new(),
            },
            StateEvent::DomainsUpdated {
                sites: 0,
                proxies: 0,
            },
            StateEvent::DomainChanged {
                name: "example".to_string(),
            },
            StateEvent::Notice(Notice::new(NoticeKind::Changed, "ok", None)),
        ];

        for event in events {
            let label = event.event_type();
            assert!(!label.is_empty());
            assert_eq!(label, label.to_lowercase());
        }
    }
}
