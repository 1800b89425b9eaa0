//! Well-known locations of Homebrew, PHP and Valet

use std::path::Path;

use phpmon_core::prelude::*;
use serde::Serialize;

/// Homebrew prefix on Apple Silicon
pub const ARM_PREFIX: &str = "/opt/homebrew";

/// Homebrew prefix on Intel
pub const INTEL_PREFIX: &str = "/usr/local";

/// Directory holding the sudoers drop-ins for `brew` and `valet`
pub const SUDOERS_DIR: &str = "/private/etc/sudoers.d";

/// Resolved locations for one machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paths {
    /// Homebrew prefix
    pub prefix: String,
    /// User home directory
    pub home: String,
}

impl Paths {
    pub fn new(prefix: impl Into<String>, home: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            home: home.into(),
        }
    }

    /// Prefix Homebrew uses on the given CPU architecture
    pub fn prefix_for_architecture(arch: &str) -> &'static str {
        match arch {
            "arm64" | "aarch64" => ARM_PREFIX,
            _ => INTEL_PREFIX,
        }
    }

    /// Paths for the running machine
    ///
    /// A `brew` found on `PATH` wins over the architecture default.
    pub fn detect() -> Self {
        let home = dirs::home_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| "~".to_string());

        let prefix = which::which("brew")
            .ok()
            .and_then(|brew| {
                brew.parent()
                    .and_then(Path::parent)
                    .map(|p| p.to_string_lossy().to_string())
            })
            .unwrap_or_else(|| {
                Self::prefix_for_architecture(std::env::consts::ARCH).to_string()
            });

        debug!("Using Homebrew prefix {} and home {}", prefix, home);
        Self::new(prefix, home)
    }

    pub fn is_arm(&self) -> bool {
        self.prefix == ARM_PREFIX
    }

    pub fn bin(&self) -> String {
        format!("{}/bin", self.prefix)
    }

    pub fn opt(&self) -> String {
        format!("{}/opt", self.prefix)
    }

    pub fn cellar(&self) -> String {
        format!("{}/Cellar", self.prefix)
    }

    pub fn etc(&self) -> String {
        format!("{}/etc", self.prefix)
    }

    pub fn brew(&self) -> String {
        format!("{}/brew", self.bin())
    }

    pub fn php(&self) -> String {
        format!("{}/php", self.bin())
    }

    pub fn php_config(&self) -> String {
        format!("{}/php-config", self.bin())
    }

    pub fn valet(&self) -> String {
        format!("{}/valet", self.bin())
    }

    /// `<opt>/<formula>`
    pub fn formula_opt(&self, formula: &str) -> String {
        format!("{}/{}", self.opt(), formula)
    }

    /// `<etc>/php/<major.minor>`
    pub fn php_etc(&self, short_version: &str) -> String {
        format!("{}/php/{}", self.etc(), short_version)
    }

    pub fn valet_config_dir(&self) -> String {
        format!("{}/.config/valet", self.home)
    }

    pub fn valet_config_file(&self) -> String {
        format!("{}/config.json", self.valet_config_dir())
    }

    pub fn valet_sites(&self) -> String {
        format!("{}/Sites", self.valet_config_dir())
    }

    pub fn valet_nginx(&self) -> String {
        format!("{}/Nginx", self.valet_config_dir())
    }

    pub fn valet_certificates(&self) -> String {
        format!("{}/Certificates", self.valet_config_dir())
    }

    pub fn app_config_dir(&self) -> String {
        format!("{}/.config/phpmon", self.home)
    }

    pub fn settings_file(&self) -> String {
        format!("{}/settings.toml", self.app_config_dir())
    }

    pub fn sudoers_brew(&self) -> String {
        format!("{}/brew", SUDOERS_DIR)
    }

    pub fn sudoers_valet(&self) -> String {
        format!("{}/valet", SUDOERS_DIR)
    }
}
