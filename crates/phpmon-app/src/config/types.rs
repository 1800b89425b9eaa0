//! Preference types
//!
//! Defines:
//! - `Settings` - The persisted preferences
//! - `PreferenceKey` / `PreferenceValue` - Key/value access to them
//! - `IconType` - How the active PHP version is displayed

use std::fmt;
use std::str::FromStr;

use phpmon_core::prelude::*;
use serde::{Deserialize, Serialize};

/// How the active PHP version is displayed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IconType {
    #[default]
    Php,
    Elephant,
    None,
}

impl fmt::Display for IconType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IconType::Php => "php",
            IconType::Elephant => "elephant",
            IconType::None => "none",
        };
        write!(f, "{}", label)
    }
}

impl FromStr for IconType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "php" => Ok(IconType::Php),
            "elephant" => Ok(IconType::Elephant),
            "none" => Ok(IconType::None),
            other => Err(Error::config(format!("Unknown icon type: {}", other))),
        }
    }
}

/// Persisted preferences (`~/.config/phpmon/settings.toml`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Extra Homebrew formulae to manage next to php, nginx and dnsmasq
    pub custom_services: Vec<String>,

    pub icon_type: IconType,

    /// Show the active version instead of a static icon
    pub dynamic_icon: bool,

    /// Include the patch number in the dynamic icon
    pub full_php_version_dynamic_icon: bool,

    pub notify_about_secure_toggle: bool,

    pub notify_about_services: bool,

    /// Restart PHP-FPM after an extension was enabled or disabled
    pub auto_restart_after_extension_toggle: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            custom_services: Vec::new(),
            icon_type: IconType::default(),
            dynamic_icon: true,
            full_php_version_dynamic_icon: false,
            notify_about_secure_toggle: true,
            notify_about_services: true,
            auto_restart_after_extension_toggle: true,
        }
    }
}

/// Preference keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceKey {
    CustomServices,
    IconType,
    DynamicIcon,
    FullPhpVersionDynamicIcon,
    NotifyAboutSecureToggle,
    NotifyAboutServices,
    AutoRestartAfterExtensionToggle,
}

impl PreferenceKey {
    pub const ALL: [PreferenceKey; 7] = [
        PreferenceKey::CustomServices,
        PreferenceKey::IconType,
        PreferenceKey::DynamicIcon,
        PreferenceKey::FullPhpVersionDynamicIcon,
        PreferenceKey::NotifyAboutSecureToggle,
        PreferenceKey::NotifyAboutServices,
        PreferenceKey::AutoRestartAfterExtensionToggle,
    ];

    /// Name used in the settings file
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferenceKey::CustomServices => "custom_services",
            PreferenceKey::IconType => "icon_type",
            PreferenceKey::DynamicIcon => "dynamic_icon",
            PreferenceKey::FullPhpVersionDynamicIcon => "full_php_version_dynamic_icon",
            PreferenceKey::NotifyAboutSecureToggle => "notify_about_secure_toggle",
            PreferenceKey::NotifyAboutServices => "notify_about_services",
            PreferenceKey::AutoRestartAfterExtensionToggle => {
                "auto_restart_after_extension_toggle"
            }
        }
    }
}

impl FromStr for PreferenceKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PreferenceKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| Error::config(format!("Unknown preference: {}", s)))
    }
}

/// A preference value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
}

impl PreferenceValue {
    /// Parse command line text into the value type `key` holds
    ///
    /// Lists are comma separated.
    pub fn parse_for(key: PreferenceKey, text: &str) -> Result<Self> {
        match key {
            PreferenceKey::CustomServices => Ok(PreferenceValue::List(
                text.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            )),
            PreferenceKey::IconType => Ok(PreferenceValue::Text(text.to_string())),
            _ => match text {
                "true" | "yes" | "on" => Ok(PreferenceValue::Bool(true)),
                "false" | "no" | "off" => Ok(PreferenceValue::Bool(false)),
                other => Err(Error::config(format!(
                    "{} expects true or false, got {:?}",
                    key.as_str(),
                    other
                ))),
            },
        }
    }
}

impl fmt::Display for PreferenceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreferenceValue::Bool(flag) => write!(f, "{}", flag),
            PreferenceValue::Text(text) => write!(f, "{}", text),
            PreferenceValue::List(items) => write!(f, "{}", items.join(",")),
        }
    }
}

impl Settings {
    pub fn get(&self, key: PreferenceKey) -> PreferenceValue {
        match key {
            PreferenceKey::CustomServices => PreferenceValue::List(self.custom_services.clone()),
            PreferenceKey::IconType => PreferenceValue::Text(self.icon_type.to_string()),
            PreferenceKey::DynamicIcon => PreferenceValue::Bool(self.dynamic_icon),
            PreferenceKey::FullPhpVersionDynamicIcon => {
                PreferenceValue::Bool(self.full_php_version_dynamic_icon)
            }
            PreferenceKey::NotifyAboutSecureToggle => {
                PreferenceValue::Bool(self.notify_about_secure_toggle)
            }
            PreferenceKey::NotifyAboutServices => PreferenceValue::Bool(self.notify_about_services),
            PreferenceKey::AutoRestartAfterExtensionToggle => {
                PreferenceValue::Bool(self.auto_restart_after_extension_toggle)
            }
        }
    }

    /// Set `key`; fails when `value` has the wrong type for it
    pub fn set(&mut self, key: PreferenceKey, value: PreferenceValue) -> Result<()> {
        match (key, value) {
            (PreferenceKey::CustomServices, PreferenceValue::List(services)) => {
                self.custom_services = services;
            }
            (PreferenceKey::IconType, PreferenceValue::Text(icon)) => {
                self.icon_type = icon.parse()?;
            }
            (PreferenceKey::DynamicIcon, PreferenceValue::Bool(flag)) => {
                self.dynamic_icon = flag;
            }
            (PreferenceKey::FullPhpVersionDynamicIcon, PreferenceValue::Bool(flag)) => {
                self.full_php_version_dynamic_icon = flag;
            }
            (PreferenceKey::NotifyAboutSecureToggle, PreferenceValue::Bool(flag)) => {
                self.notify_about_secure_toggle = flag;
            }
            (PreferenceKey::NotifyAboutServices, PreferenceValue::Bool(flag)) => {
                self.notify_about_services = flag;
            }
            (PreferenceKey::AutoRestartAfterExtensionToggle, PreferenceValue::Bool(flag)) => {
                self.auto_restart_after_extension_toggle = flag;
            }
            (key, value) => {
                return Err(Error::config(format!(
                    "Invalid value {:?} for {}",
                    value,
                    key.as_str()
                )));
            }
        }
        Ok(())
    }

    /// Typed bool preference; `false` for keys that hold other types
    pub fn flag(&self, key: PreferenceKey) -> bool {
        matches!(self.get(key), PreferenceValue::Bool(true))
    }
}
