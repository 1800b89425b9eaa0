//! phpmon-app - Orchestration engine for PHP Monitor
//!
//! This crate implements the service registry, the PHP installation resolver,
//! the domain/proxy controller and the busy-state orchestrator, wired
//! together by an explicitly constructed [`AppContext`]. Preferences, startup
//! checks, the stubbed update check and the Homebrew/Valet adapters live
//! here as well.

pub mod brew;
pub mod checks;
pub mod config;
pub mod context;
pub mod domains;
pub mod events;
pub mod orchestrator;
pub mod php;
pub mod services;
pub mod updates;
pub mod valet;

// Re-export primary types
pub use brew::{BrewFormula, BrewFormulaeHandler, FakeBrewFormulaeHandler, RealBrewFormulaeHandler};
pub use checks::{run_startup_checks, CheckFailure, StartupCheck};
pub use config::{PreferenceKey, PreferenceValue, Settings};
pub use context::AppContext;
pub use domains::{DomainController, DomainListing, Proxy, Site};
pub use events::{EventBus, Notice, NoticeKind, StateEvent};
pub use orchestrator::{Behaviour, BehaviourTarget, Orchestrator};
pub use php::{ActivePhpInstallation, InstalledPhpFormula, PhpExtension, PhpResolver};
pub use services::{ServiceWrapper, ServicesManager, ServicesSummary};
pub use updates::{check_for_updates, StubUpdateChecker, UpdateChecker, UpdateStatus};
pub use valet::ValetConfig;
