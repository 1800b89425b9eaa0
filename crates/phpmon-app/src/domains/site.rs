//! Sites served by Valet

use std::sync::LazyLock;

use phpmon_core::prelude::*;
use phpmon_env::Environment;
use regex::Regex;
use serde::Serialize;

static ISOLATION_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\s*ISOLATED_PHP_VERSION=(?:php@)?(\d+\.?\d+)").expect("Invalid isolation regex")
});

/// A directory served as `<name>.<tld>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Site {
    pub name: String,
    pub tld: String,
    /// The parked entry or the link in Valet's `Sites` directory
    pub path: String,
    /// Symlink target, when the entry is a symlink
    pub alias_path: Option<String>,
    /// Created with `valet link`
    pub linked: bool,
    pub secured: bool,
    /// `X.Y` when the site is isolated
    pub isolated_version: Option<String>,
    /// `require.php` from the site's `composer.json`
    pub composer_php: Option<String>,
}

impl Site {
    pub fn host(&self) -> String {
        format!("{}.{}", self.name, self.tld)
    }

    pub fn is_isolated(&self) -> bool {
        self.isolated_version.is_some()
    }

    /// Derive every attribute from the live filesystem
    pub fn read(env: &Environment, tld: &str, name: &str, path: &str, linked: bool) -> Self {
        let host = format!("{}.{}", name, tld);
        let alias_path = if env.fs.is_symlink(path) {
            env.fs.symlink_target(path).ok()
        } else {
            None
        };

        let secured = env
            .fs
            .file_exists(&format!("{}/{}.crt", env.paths.valet_certificates(), host));

        Self {
            name: name.to_string(),
            tld: tld.to_string(),
            path: path.to_string(),
            linked: linked && alias_path.is_some(),
            composer_php: composer_php(env, alias_path.as_deref().unwrap_or(path)),
            alias_path,
            secured,
            isolated_version: isolated_version(env, &host),
        }
    }
}

/// Isolation marker in the site's Nginx configuration
fn isolated_version(env: &Environment, host: &str) -> Option<String> {
    let config = format!("{}/{}", env.paths.valet_nginx(), host);
    if !env.fs.file_exists(&config) {
        return None;
    }

    let content = env.fs.read_to_string(&config).ok()?;
    let raw = ISOLATION_MARKER.captures(&content)?.get(1)?.as_str();
    if raw.contains('.') {
        Some(raw.to_string())
    } else {
        // Valet also writes the compact form (`php@81`)
        let (major, minor) = raw.split_at(1);
        Some(format!("{}.{}", major, minor))
    }
}

/// PHP constraint from `<path>/composer.json`
fn composer_php(env: &Environment, path: &str) -> Option<String> {
    let composer = format!("{}/composer.json", path);
    if !env.fs.file_exists(&composer) {
        return None;
    }

    let content = env.fs.read_to_string(&composer).ok()?;
    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(json) => json["require"]["php"].as_str().map(str::to_string),
        Err(e) => {
            debug!("Unparsable {}: {}", composer, e);
            None
        }
    }
}
