//! Environment health checks run before the engine is used

use phpmon_core::prelude::*;
use phpmon_env::Environment;
use serde::Serialize;

/// A check that did not pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckFailure {
    pub check: StartupCheck,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartupCheck {
    BrewBinary,
    PhpBinary,
    ValetBinary,
    ValetConfig,
    BrewSudoers,
    ValetSudoers,
}

impl StartupCheck {
    pub fn label(&self) -> &'static str {
        match self {
            StartupCheck::BrewBinary => "Homebrew binary",
            StartupCheck::PhpBinary => "PHP binary",
            StartupCheck::ValetBinary => "Valet binary",
            StartupCheck::ValetConfig => "Valet configuration",
            StartupCheck::BrewSudoers => "Homebrew sudoers entry",
            StartupCheck::ValetSudoers => "Valet sudoers entry",
        }
    }
}

/// Every failed check, in the order they run
pub async fn run_startup_checks(env: &Environment) -> Vec<CheckFailure> {
    let paths = &env.paths;
    let mut failures = Vec::new();

    let binaries = [
        (StartupCheck::BrewBinary, paths.brew(), "Homebrew is not installed"),
        (StartupCheck::PhpBinary, paths.php(), "PHP is not installed or not linked"),
        (StartupCheck::ValetBinary, paths.valet(), "Laravel Valet is not installed"),
    ];
    for (check, path, message) in binaries {
        if !env.fs.file_exists(&path) {
            failures.push(CheckFailure {
                check,
                message: format!("{} ({} is missing)", message, path),
            });
        }
    }

    if !env.fs.directory_exists(&paths.valet_config_dir()) {
        failures.push(CheckFailure {
            check: StartupCheck::ValetConfig,
            message: format!(
                "Valet has not been set up ({} is missing); run `valet install`",
                paths.valet_config_dir()
            ),
        });
    }

    let sudoers = [
        (StartupCheck::BrewSudoers, paths.sudoers_brew(), paths.brew()),
        (StartupCheck::ValetSudoers, paths.sudoers_valet(), paths.valet()),
    ];
    for (check, file, binary) in sudoers {
        if !sudoers_allows(env, &file, &binary).await {
            failures.push(CheckFailure {
                check,
                message: format!("{} does not allow `{} *`; run `valet trust`", file, binary),
            });
        }
    }

    for failure in &failures {
        warn!("Startup check failed: {}: {}", failure.check.label(), failure.message);
    }
    if failures.is_empty() {
        info!("All startup checks passed");
    }
    failures
}

/// The drop-in is readable and grants `<binary> *`
async fn sudoers_allows(env: &Environment, file: &str, binary: &str) -> bool {
    match env.shell.run(&format!("cat {}", file)).await {
        Ok(output) if output.success() => output.out.contains(&format!("{} *", binary)),
        Ok(_) => false,
        Err(e) => {
            debug!("Could not read {}: {}", file, e);
            false
        }
    }
}
