//! Valet configuration and version

use phpmon_core::prelude::*;
use phpmon_core::VersionNumber;
use phpmon_env::Environment;
use serde::{Deserialize, Serialize};

/// `~/.config/valet/config.json`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ValetConfig {
    #[serde(default = "default_tld")]
    pub tld: String,

    /// Parked directories
    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default = "default_loopback")]
    pub loopback: String,
}

fn default_tld() -> String {
    "test".to_string()
}

fn default_loopback() -> String {
    "127.0.0.1".to_string()
}

impl Default for ValetConfig {
    fn default() -> Self {
        Self {
            tld: default_tld(),
            paths: Vec::new(),
            loopback: default_loopback(),
        }
    }
}

impl ValetConfig {
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read Valet's configuration file through the environment
    pub fn load(env: &Environment) -> Result<Self> {
        let path = env.paths.valet_config_file();
        let content = env
            .fs
            .read_to_string(&path)
            .context("Failed to read Valet configuration")?;
        Self::parse(&content)
    }
}

/// Version reported by `valet --version`
pub async fn valet_version(env: &Environment) -> Result<VersionNumber> {
    let command = format!("{} --version", env.paths.valet());
    let output = env.shell.run_checked(&command).await?;
    VersionNumber::parse(&output.out).ok_or_else(|| {
        Error::version_not_found(format!("Valet version in {:?}", output.out.trim()))
    })
}
