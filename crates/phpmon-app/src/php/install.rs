//! The active PHP installation snapshot

use std::sync::LazyLock;

use phpmon_core::prelude::*;
use phpmon_core::VersionNumber;
use phpmon_env::Environment;
use regex::Regex;
use serde::Serialize;

use super::detect::{resolve_link, InstalledPhpFormula};

static EXTENSION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(;)?\s*(zend_extension|extension)\s*=\s*"?([^"\s;]+)"?"#)
        .expect("Invalid extension line regex")
});

/// Resource limits reported by `ini_get`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PhpLimits {
    pub memory_limit: String,
    pub upload_max_filesize: String,
    pub post_max_size: String,
}

/// An extension line found in a scanned ini file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhpExtension {
    /// `opcache`, `xdebug`, ...
    pub name: String,
    /// The ini file that loads it
    pub ini_file: String,
    pub enabled: bool,
    /// `zend_extension` rather than `extension`
    pub zend: bool,
}

impl PhpExtension {
    /// Parse one ini line, commented out or not
    pub fn parse_line(ini_file: &str, line: &str) -> Option<Self> {
        let caps = EXTENSION_LINE.captures(line)?;
        let value = caps.get(3)?.as_str();
        let file_name = value.rsplit('/').next().unwrap_or(value);
        let name = file_name.strip_suffix(".so").unwrap_or(file_name);
        if name.is_empty() {
            return None;
        }

        Some(Self {
            name: name.to_string(),
            ini_file: ini_file.to_string(),
            enabled: caps.get(1).is_none(),
            zend: &caps[2] == "zend_extension",
        })
    }

    /// Every extension line in an ini file
    pub fn parse_ini(ini_file: &str, content: &str) -> Vec<Self> {
        content
            .lines()
            .filter_map(|line| Self::parse_line(ini_file, line))
            .collect()
    }

    /// Whether `line` is the ini line that loads this extension
    pub fn matches_line(&self, line: &str) -> bool {
        Self::parse_line(&self.ini_file, line).is_some_and(|e| e.name == self.name)
    }
}

/// Immutable description of the linked PHP version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivePhpInstallation {
    pub version: VersionNumber,
    /// Formula providing the version (`php` or `php@X.Y`)
    pub formula: String,
    /// `<opt>/<formula>`
    pub path: String,
    /// Cellar keg behind `path`
    pub symlink_target: Option<String>,
    pub extension_dir: String,
    /// Additional ini files PHP scanned at startup
    pub ini_files: Vec<String>,
    pub limits: PhpLimits,
    pub extensions: Vec<PhpExtension>,
}

impl ActivePhpInstallation {
    pub fn extension(&self, name: &str) -> Option<&PhpExtension> {
        self.extensions.iter().find(|e| e.name == name)
    }
}

async fn ini_get(env: &Environment, key: &str) -> Result<String> {
    let expression = format!("echo ini_get('{}');", key);
    env.command
        .run(&env.paths.php(), &["-r", expression.as_str()], true)
        .await
}

/// Split the comma separated `php_ini_scanned_files()` output
pub fn parse_scanned_files(output: &str) -> Vec<String> {
    output
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read the live PHP configuration into a new snapshot
///
/// `installed` maps the reported version to its formula; without a match the
/// formula is assumed to be `php`.
pub async fn resolve_active_installation(
    env: &Environment,
    installed: &[InstalledPhpFormula],
) -> Result<ActivePhpInstallation> {
    let paths = &env.paths;
    if !env.fs.file_exists(&paths.php()) {
        return Err(Error::version_not_found(format!(
            "no PHP binary at {}",
            paths.php()
        )));
    }

    let reported = env
        .command
        .run(&paths.php_config(), &["--version"], true)
        .await?;
    let version = VersionNumber::parse(&reported)
        .ok_or_else(|| Error::version_not_found(reported.trim().to_string()))?;

    let formula = installed
        .iter()
        .find(|i| i.version.same_minor(&version))
        .map(|i| i.formula.clone())
        .unwrap_or_else(|| "php".to_string());

    let path = paths.formula_opt(&formula);
    let symlink_target = if env.fs.is_symlink(&path) {
        env.fs
            .symlink_target(&path)
            .ok()
            .map(|t| resolve_link(&paths.opt(), &t))
    } else {
        None
    };

    let limits = PhpLimits {
        memory_limit: ini_get(env, "memory_limit").await?,
        upload_max_filesize: ini_get(env, "upload_max_filesize").await?,
        post_max_size: ini_get(env, "post_max_size").await?,
    };
    let extension_dir = ini_get(env, "extension_dir").await?;

    let scanned = env
        .command
        .run(&paths.php(), &["-r", "echo php_ini_scanned_files();"], true)
        .await?;
    let ini_files = parse_scanned_files(&scanned);

    let mut extensions = Vec::new();
    for ini_file in &ini_files {
        match env.fs.read_to_string(ini_file).or_missing() {
            Ok(Some(content)) => extensions.extend(PhpExtension::parse_ini(ini_file, &content)),
            Ok(None) => debug!("Scanned ini file {} no longer exists", ini_file),
            Err(e) => warn!("Could not read {}: {}", ini_file, e),
        }
    }

    debug!(
        "Resolved PHP {} ({}) with {} extensions",
        version,
        formula,
        extensions.len()
    );

    Ok(ActivePhpInstallation {
        version,
        formula,
        path,
        symlink_target,
        extension_dir,
        ini_files,
        limits,
        extensions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::php::detect::detect_installed_versions;
    use phpmon_env::TestableConfiguration;

    #[test]
    fn test_parse_extension_lines() {
        let opcache = PhpExtension::parse_line(
            "ext-opcache.ini",
            r#"zend_extension="/opt/homebrew/opt/php@8.1/lib/php/20210902/opcache.so""#,
        )
        .unwrap();
        assert_eq!(opcache.name, "opcache");
        assert!(opcache.enabled);
        assert!(opcache.zend);

        let xdebug = PhpExtension::parse_line("ext-xdebug.ini", r#";zend_extension="xdebug.so""#)
            .unwrap();
        assert_eq!(xdebug.name, "xdebug");
        assert!(!xdebug.enabled);

        let apcu = PhpExtension::parse_line("ext-apcu.ini", "extension=apcu").unwrap();
        assert_eq!(apcu.name, "apcu");
        assert!(!apcu.zend);
    }

    #[test]
    fn test_parse_ignores_other_lines() {
        let content = "[xdebug]\nxdebug.mode=debug\n; a comment\nmemory_limit = 128M\n";
        assert!(PhpExtension::parse_ini("x.ini", content).is_empty());
    }

    #[test]
    fn test_parse_scanned_files() {
        let files = parse_scanned_files("/etc/a.ini,\n/etc/b.ini,\n/etc/c.ini\n");
        assert_eq!(files, vec!["/etc/a.ini", "/etc/b.ini", "/etc/c.ini"]);
        assert!(parse_scanned_files("").is_empty());
    }

    #[tokio::test]
    async fn test_resolve_working_preset() {
        let t = TestableConfiguration::working().into_environment();
        let installed = detect_installed_versions(&t.env).await.unwrap();
        let install = resolve_active_installation(&t.env, &installed).await.unwrap();

        assert_eq!(install.version.long(), "8.1.10");
        assert_eq!(install.formula, "php@8.1");
        assert_eq!(install.path, "/opt/homebrew/opt/php@8.1");
        assert_eq!(
            install.symlink_target.as_deref(),
            Some("/opt/homebrew/Cellar/php@8.1/8.1.10")
        );
        assert_eq!(install.limits.memory_limit, "128M");
        assert_eq!(install.limits.upload_max_filesize, "2M");
        assert_eq!(install.limits.post_max_size, "8M");
        assert_eq!(install.ini_files.len(), 4);

        let names: Vec<&str> = install.extensions.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["apcu", "opcache", "xdebug"]);
        assert!(!install.extension("xdebug").unwrap().enabled);
    }

    #[tokio::test]
    async fn test_resolve_without_binary() {
        let t = TestableConfiguration::broken().into_environment();
        let err = resolve_active_installation(&t.env, &[]).await.unwrap_err();
        assert!(matches!(err, Error::VersionNotFound { .. }));
    }
}
