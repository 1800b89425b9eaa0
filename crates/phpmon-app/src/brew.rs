//! Homebrew PHP formulae catalogue
//!
//! The [`BrewFormulaeHandler`] lists the PHP formulae PHP Monitor supports
//! together with what is installed and what Homebrew could upgrade to.

use phpmon_core::prelude::*;
use phpmon_env::Environment;
use serde::{Deserialize, Serialize};

use crate::php::detect_installed_versions;

/// Supported PHP formulae: (formula, display name, prerelease tap)
pub const SUPPORTED_PHP_FORMULAE: &[(&str, &str, bool)] = &[
    ("shivammathur/php/php@8.3", "PHP 8.3", true),
    ("php", "PHP (latest)", false),
    ("php@8.1", "PHP 8.1", false),
    ("php@8.0", "PHP 8.0", false),
    ("php@7.4", "PHP 7.4", false),
];

/// One entry of the PHP formulae catalogue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrewFormula {
    pub name: String,
    pub display_name: String,
    pub installed_version: Option<String>,
    pub upgrade_version: Option<String>,
    pub prerelease: bool,
}

impl BrewFormula {
    pub fn is_installed(&self) -> bool {
        self.installed_version.is_some()
    }

    pub fn has_upgrade(&self) -> bool {
        self.upgrade_version.is_some()
    }

    /// Formula name without a tap prefix
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// One record of `brew outdated --json --formulae`
#[derive(Debug, Clone, Deserialize)]
pub struct OutdatedFormula {
    pub name: String,
    #[serde(default)]
    pub installed_versions: Vec<String>,
    pub current_version: String,
}

#[derive(Debug, Deserialize)]
struct OutdatedReport {
    #[serde(default)]
    formulae: Vec<OutdatedFormula>,
}

/// Parse `brew outdated --json --formulae`
pub fn parse_outdated(json: &str) -> Result<Vec<OutdatedFormula>> {
    let report: OutdatedReport = serde_json::from_str(json.trim())?;
    Ok(report.formulae)
}

/// Source of the PHP formulae catalogue
#[trait_variant::make(BrewFormulaeHandler: Send)]
pub trait LocalBrewFormulaeHandler {
    /// Supported formulae, optionally with upgrade information
    async fn load_php_versions(&self, load_outdated: bool) -> Result<Vec<BrewFormula>>;
}

/// Catalogue built from detection and `brew outdated`
pub struct RealBrewFormulaeHandler {
    env: Environment,
}

impl RealBrewFormulaeHandler {
    pub fn new(env: Environment) -> Self {
        Self { env }
    }

    async fn outdated(&self) -> Vec<OutdatedFormula> {
        let command = format!("{} outdated --json --formulae", self.env.paths.brew());
        let output = match self.env.shell.run(&command).await {
            Ok(output) if output.success() => output,
            Ok(output) => {
                warn!("brew outdated failed: {}", output.text().trim());
                return Vec::new();
            }
            Err(e) => {
                warn!("brew outdated failed: {}", e);
                return Vec::new();
            }
        };

        parse_outdated(&output.out).unwrap_or_else(|e| {
            warn!("Unparsable brew outdated output: {}", e);
            Vec::new()
        })
    }
}

impl BrewFormulaeHandler for RealBrewFormulaeHandler {
    async fn load_php_versions(&self, load_outdated: bool) -> Result<Vec<BrewFormula>> {
        let installed = detect_installed_versions(&self.env).await?;
        let outdated = if load_outdated {
            self.outdated().await
        } else {
            Vec::new()
        };

        Ok(SUPPORTED_PHP_FORMULAE
            .iter()
            .map(|&(name, display_name, prerelease)| {
                let short = name.rsplit('/').next().unwrap_or(name);
                BrewFormula {
                    name: name.to_string(),
                    display_name: display_name.to_string(),
                    installed_version: installed
                        .iter()
                        .find(|i| i.formula == short)
                        .map(|i| i.version.long()),
                    upgrade_version: outdated
                        .iter()
                        .find(|o| o.name == short)
                        .map(|o| o.current_version.clone()),
                    prerelease,
                }
            })
            .collect())
    }
}

/// Fixed catalogue for tests
#[derive(Debug, Default)]
pub struct FakeBrewFormulaeHandler;

impl BrewFormulaeHandler for FakeBrewFormulaeHandler {
    async fn load_php_versions(&self, load_outdated: bool) -> Result<Vec<BrewFormula>> {
        let entry = |name: &str, display: &str, installed: Option<&str>, upgrade: Option<&str>| {
            BrewFormula {
                name: name.to_string(),
                display_name: display.to_string(),
                installed_version: installed.map(str::to_string),
                upgrade_version: if load_outdated {
                    upgrade.map(str::to_string)
                } else {
                    None
                },
                prerelease: false,
            }
        };

        Ok(vec![
            entry("php", "PHP (latest)", Some("8.2.3"), Some("8.2.4")),
            entry("php@8.1", "PHP 8.1", Some("8.1.10"), None),
            entry("php@8.0", "PHP 8.0", None, None),
            entry("php@7.4", "PHP 7.4", None, None),
        ])
    }
}
