//! Installed PHP version detection

use std::collections::BTreeMap;
use std::sync::LazyLock;

use phpmon_core::prelude::*;
use phpmon_core::VersionNumber;
use phpmon_env::Environment;
use regex::Regex;
use serde::Serialize;

static PHP_FORMULA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^php(@\d+\.\d+)?$").expect("Invalid formula regex"));

/// An installed PHP formula
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstalledPhpFormula {
    /// `php` or `php@X.Y`
    pub formula: String,
    /// Version provided, with the patch level when the keg reveals it
    pub version: VersionNumber,
    /// Cellar keg the opt symlink points to
    pub keg: Option<String>,
}

/// Resolve a symlink target relative to the directory holding the link
pub(crate) fn resolve_link(base_dir: &str, target: &str) -> String {
    if target.starts_with('/') {
        return target.to_string();
    }

    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for segment in target.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Version from the last component of a keg path (`…/Cellar/php/8.2.3_1`)
fn keg_version(keg: &str) -> Option<VersionNumber> {
    keg.rsplit('/').next().and_then(VersionNumber::parse)
}

/// List installed PHP formulae, deduplicated by major.minor, oldest first
///
/// Candidates come from `ls <opt> | grep php`; a candidate counts only when a
/// `bin/php` binary exists under its opt directory or its keg.
pub async fn detect_installed_versions(env: &Environment) -> Result<Vec<InstalledPhpFormula>> {
    let paths = &env.paths;
    let command = format!("ls {} | grep php", paths.opt());
    let output = env.shell.run(&command).await?;
    if !output.success() {
        debug!("No PHP formulae found in {}", paths.opt());
        return Ok(Vec::new());
    }

    let mut found: BTreeMap<(u32, u32), InstalledPhpFormula> = BTreeMap::new();

    for name in output.out.lines().map(str::trim) {
        if !PHP_FORMULA.is_match(name) {
            continue;
        }

        let opt = paths.formula_opt(name);
        let keg = env
            .fs
            .symlink_target(&opt)
            .ok()
            .map(|target| resolve_link(&paths.opt(), &target));

        let from_name = VersionNumber::parse(name);
        let from_keg = keg.as_deref().and_then(keg_version);
        let version = match (from_name, from_keg) {
            (Some(named), Some(keg)) if named.same_minor(&keg) => keg,
            (Some(named), _) => named,
            (None, Some(keg)) => keg,
            (None, None) => {
                warn!("Could not determine the version of {}", name);
                continue;
            }
        };

        let has_binary = env.fs.file_exists(&format!("{}/bin/php", opt))
            || keg
                .as_deref()
                .is_some_and(|k| env.fs.file_exists(&format!("{}/bin/php", k)));
        if !has_binary {
            debug!("Skipping {}: no PHP binary", name);
            continue;
        }

        found
            .entry((version.major, version.minor))
            .or_insert(InstalledPhpFormula {
                formula: name.to_string(),
                version,
                keg,
            });
    }

    let installed: Vec<InstalledPhpFormula> = found.into_values().collect();
    info!(
        "Detected PHP versions: {}",
        installed
            .iter()
            .map(|i| i.version.short())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(installed)
}
