//! # phpmon-core - Core Domain Types
//!
//! Foundation crate for PHP Monitor. Provides the error taxonomy, logging
//! setup, version numbers and the formula/service types shared by the
//! environment layer and the orchestration engine.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (serde, thiserror, regex, tracing).
//!
//! ## Public API
//!
//! ### Domain Types (`types`)
//! - [`HomebrewFormula`] - A managed formula (name, display name, elevation)
//! - [`ServiceStatus`] - Live status of a managed service
//! - [`StatusSeverity`] - Aggregate health of the key services
//! - [`ActionOutcome`] - Verified result of a state-changing operation
//!
//! ### Versions (`version`)
//! - [`VersionNumber`] - Parsed `major.minor[.patch]` version
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Error enum split into environment, command and domain errors
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ## Prelude
//!
//! Import commonly used types with:
//! ```rust
//! use phpmon_core::prelude::*;
//! ```

pub mod error;
pub mod logging;
pub mod types;
pub mod version;

/// Prelude for common imports used throughout all PHP Monitor crates
pub mod prelude {
    pub use super::error::{Error, Result, ResultExt};
    pub use tracing::{debug, error, info, instrument, trace, warn};
}

// Re-export commonly used types at crate root for convenience
pub use error::{Error, Result, ResultExt};
pub use types::{ActionOutcome, HomebrewFormula, ServiceStatus, StatusSeverity};
pub use version::VersionNumber;
