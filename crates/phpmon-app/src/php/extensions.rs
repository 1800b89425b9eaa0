//! Enabling and disabling PHP extensions

use phpmon_core::prelude::*;
use phpmon_core::ActionOutcome;

use super::{PhpExtension, PhpResolver};
use crate::services::ServicesManager;

/// Comment out or restore the line that loads `extension`
fn rewrite_ini(content: &str, extension: &PhpExtension) -> String {
    let mut rewritten: Vec<String> = content
        .lines()
        .map(|line| {
            if !extension.matches_line(line) {
                line.to_string()
            } else if extension.enabled {
                format!(";{}", line.trim_start())
            } else {
                line.trim_start().trim_start_matches(';').trim_start().to_string()
            }
        })
        .collect();

    if content.ends_with('\n') {
        rewritten.push(String::new());
    }
    rewritten.join("\n")
}

/// Sibling path the rewritten ini is staged at
fn staging_path(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((dir, name)) => format!("{}/.{}.phpmon", dir, name),
        None => format!(".{}.phpmon", path),
    }
}

impl PhpResolver {
    /// Replace the content of `path`
    ///
    /// The new content is written next to it first; `path` is only removed
    /// once that write has succeeded.
    fn replace_file(&self, path: &str, content: &str) -> Result<()> {
        let staged = staging_path(path);
        if self.env.fs.any_exists(&staged) {
            self.env.fs.remove(&staged)?;
        }
        self.env.fs.write_atomically(&staged, content)?;

        if let Err(e) = self.env.fs.remove(path) {
            let _ = self.env.fs.remove(&staged);
            return Err(e);
        }
        self.env.fs.move_item(&staged, path)
    }

    /// Flip an extension in the ini file that loads it
    ///
    /// With `services`, the PHP service is restarted before the installation
    /// is re-resolved. The outcome compares the re-read flag to the old one.
    pub async fn toggle_extension(
        &self,
        name: &str,
        services: Option<&ServicesManager>,
    ) -> Result<ActionOutcome> {
        let install = self.current_or_resolve().await?;
        let extension = install
            .extension(name)
            .cloned()
            .ok_or_else(|| Error::ExtensionNotFound {
                name: name.to_string(),
            })?;

        let ini_file = extension.ini_file.clone();
        let content = self.env.fs.read_to_string(&ini_file)?;
        let rewritten = rewrite_ini(&content, &extension);

        info!(
            "{} extension {} in {}",
            if extension.enabled { "Disabling" } else { "Enabling" },
            name,
            ini_file
        );
        self.replace_file(&ini_file, &rewritten)?;

        if let Some(services) = services {
            services.restart_service(&install.formula).await?;
        }

        let updated = self.resolve_active_installation().await?;
        let flipped = updated
            .extension(name)
            .is_some_and(|e| e.enabled != extension.enabled);
        Ok(ActionOutcome::verify(flipped, ini_file))
    }
}
