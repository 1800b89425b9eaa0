//! Preferences
//!
//! Supports:
//! - `~/.config/phpmon/settings.toml` - Persisted preferences
//! - Key/value access through [`PreferenceKey`]

pub mod settings;
pub mod types;

pub use settings::{load_settings, save_settings};
pub use types::*;
