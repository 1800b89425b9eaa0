//! Command dispatch and output

use std::path::PathBuf;

use color_eyre::eyre::eyre;
use color_eyre::Result;
use phpmon_app::config::save_settings;
use phpmon_app::{
    check_for_updates, run_startup_checks, AppContext, DomainListing, PreferenceKey,
    PreferenceValue, RealBrewFormulaeHandler, ServiceWrapper, Settings, StubUpdateChecker,
    UpdateStatus,
};
use phpmon_core::ActionOutcome;
use phpmon_env::Environment;
use serde::Serialize;
use serde_json::json;

use crate::{Command, PhpCommand};

/// Run `command`; `Ok(false)` when it completed without the requested effect
pub async fn run(
    command: Command,
    env: Environment,
    settings: Settings,
    settings_path: Option<PathBuf>,
    json: bool,
) -> Result<bool> {
    match command {
        Command::Prefs { key, value } => return prefs(settings, settings_path, key, value, json),
        Command::Updates => return updates(json).await,
        _ => {}
    }

    let context = AppContext::new(env.clone(), settings);

    match command {
        Command::Check => {
            let failures = run_startup_checks(&env).await;
            if json {
                print_json(&failures)?;
            } else if failures.is_empty() {
                println!("✅ All checks passed");
            } else {
                for failure in &failures {
                    println!("❌ {}: {}", failure.check.label(), failure.message);
                }
            }
            Ok(failures.is_empty())
        }
        Command::Php(PhpCommand::Formulae { outdated }) => {
            let handler = RealBrewFormulaeHandler::new(env);
            let formulae = context.load_formulae(&handler, outdated).await?;
            if json {
                print_json(&formulae)?;
            } else {
                for formula in &formulae {
                    let installed = formula.installed_version.as_deref().unwrap_or("-");
                    let upgrade = formula
                        .upgrade_version
                        .as_deref()
                        .map(|v| format!(" (upgrade to {})", v))
                        .unwrap_or_default();
                    println!("{:<28} {:<10}{}", formula.name, installed, upgrade);
                }
            }
            Ok(true)
        }
        command => {
            context.startup().await?;
            run_started(command, &context, json).await
        }
    }
}

async fn run_started(command: Command, context: &AppContext, json: bool) -> Result<bool> {
    match command {
        Command::Status => {
            status(context, json).await?;
            Ok(true)
        }
        Command::Services => {
            let services = context.services().snapshot().await;
            if json {
                print_json(&*services)?;
            } else {
                print_services(&services);
            }
            Ok(true)
        }
        Command::ToggleService { name } => {
            report(&format!("Toggled {}", name), context.toggle_service(&name).await?, json)
        }
        Command::Php(php) => run_php(php, context, json).await,
        Command::Domains => {
            let listing = context.domains().listing().await;
            if json {
                print_json(&*listing)?;
            } else {
                print_domains(&listing);
            }
            Ok(true)
        }
        Command::Secure { site } => {
            report(&format!("Secured {}", site), context.secure(&site).await?, json)
        }
        Command::Unsecure { site } => {
            report(&format!("Unsecured {}", site), context.unsecure(&site).await?, json)
        }
        Command::Isolate { site, version } => report(
            &format!("Isolated {} on PHP {}", site, version),
            context.isolate(&site, &version).await?,
            json,
        ),
        Command::Unisolate { site } => {
            report(&format!("Unisolated {}", site), context.unisolate(&site).await?, json)
        }
        Command::Link { path, name } => {
            report(&format!("Linked {}", name), context.link(&path, &name).await?, json)
        }
        Command::Unlink { site } => {
            report(&format!("Unlinked {}", site), context.unlink(&site).await?, json)
        }
        Command::Proxy {
            domain,
            target,
            secure,
        } => report(
            &format!("Proxying {} to {}", domain, target),
            context.proxy(&domain, &target, secure).await?,
            json,
        ),
        Command::Unproxy { domain } => {
            report(&format!("Removed proxy {}", domain), context.unproxy(&domain).await?, json)
        }
        // Handled before startup
        Command::Check | Command::Prefs { .. } | Command::Updates => Ok(true),
    }
}

async fn run_php(command: PhpCommand, context: &AppContext, json: bool) -> Result<bool> {
    match command {
        PhpCommand::Info => {
            let install = context.php().current_or_resolve().await?;
            if json {
                print_json(&*install)?;
            } else {
                println!("PHP {} ({})", install.version, install.formula);
                println!("  path:                {}", install.path);
                if let Some(target) = &install.symlink_target {
                    println!("  keg:                 {}", target);
                }
                println!("  extension dir:       {}", install.extension_dir);
                println!("  memory_limit:        {}", install.limits.memory_limit);
                println!("  upload_max_filesize: {}", install.limits.upload_max_filesize);
                println!("  post_max_size:       {}", install.limits.post_max_size);
                println!("  ini files:           {}", install.ini_files.len());
            }
            Ok(true)
        }
        PhpCommand::Versions => {
            let installed = context.php().installed().await;
            let current = context.php().current().await;
            if json {
                print_json(&*installed)?;
            } else {
                for version in installed.iter() {
                    let active = current
                        .as_ref()
                        .is_some_and(|c| c.version.same_minor(&version.version));
                    println!(
                        "{} {:<10} {}",
                        if active { "*" } else { " " },
                        version.formula,
                        version.version
                    );
                }
            }
            Ok(true)
        }
        PhpCommand::Switch { version } => report(
            &format!("Switched to PHP {}", version),
            context.switch_php(&version).await?,
            json,
        ),
        PhpCommand::Extensions => {
            let install = context.php().current_or_resolve().await?;
            if json {
                print_json(&install.extensions)?;
            } else {
                for extension in &install.extensions {
                    println!(
                        "[{}] {:<16} {}",
                        if extension.enabled { "x" } else { " " },
                        extension.name,
                        extension.ini_file
                    );
                }
            }
            Ok(true)
        }
        PhpCommand::ToggleExtension { name } => report(
            &format!("Toggled extension {}", name),
            context.toggle_extension(&name).await?,
            json,
        ),
        // Handled before startup
        PhpCommand::Formulae { .. } => Ok(true),
    }
}

async fn updates(json: bool) -> Result<bool> {
    let current = phpmon_app::updates::current_version()
        .ok_or_else(|| eyre!("Unparsable build version"))?;
    let status = check_for_updates(&StubUpdateChecker::offline(), current).await?;
    if json {
        print_json(&status)?;
        return Ok(true);
    }
    match status {
        UpdateStatus::UpToDate => println!("✅ PHP Monitor {} is up to date", current),
        UpdateStatus::Available { version } => {
            println!("⬆️  PHP Monitor {} is available (running {})", version, current)
        }
        UpdateStatus::Unknown => println!("PHP Monitor {}; no release information", current),
    }
    Ok(true)
}

fn prefs(
    mut settings: Settings,
    settings_path: Option<PathBuf>,
    key: Option<String>,
    value: Option<String>,
    json: bool,
) -> Result<bool> {
    let Some(key) = key else {
        if json {
            print_json(&settings)?;
        } else {
            for key in PreferenceKey::ALL {
                println!("{:<36} {}", key.as_str(), settings.get(key));
            }
        }
        return Ok(true);
    };

    let key: PreferenceKey = key.parse()?;
    let Some(value) = value else {
        println!("{}", settings.get(key));
        return Ok(true);
    };

    settings.set(key, PreferenceValue::parse_for(key, &value)?)?;
    let path = settings_path.ok_or_else(|| eyre!("Preferences are read-only with --preset"))?;
    save_settings(&path, &settings)?;
    println!("✅ {} = {}", key.as_str(), settings.get(key));
    Ok(true)
}

async fn status(context: &AppContext, json: bool) -> Result<()> {
    let install = context.php().current().await;
    let summary = context.services().summary().await;
    let listing = context.domains().listing().await;

    if json {
        return print_json(&json!({
            "php": install.as_deref(),
            "services": summary,
            "sites": listing.sites.len(),
            "proxies": listing.proxies.len(),
        }));
    }

    match &install {
        Some(install) => println!("PHP:      {} ({})", install.version, install.formula),
        None => println!("PHP:      not linked"),
    }
    println!("Services: {}", summary.message);
    println!(
        "Domains:  {} sites, {} proxies",
        listing.sites.len(),
        listing.proxies.len()
    );
    Ok(())
}

fn print_services(services: &[ServiceWrapper]) {
    for service in services {
        println!("{:<12} {}", service.name(), service.status.label());
    }
}

fn print_domains(listing: &DomainListing) {
    for site in &listing.sites {
        let mut flags = Vec::new();
        if site.secured {
            flags.push("secure".to_string());
        }
        if site.linked {
            flags.push("linked".to_string());
        }
        if let Some(version) = &site.isolated_version {
            flags.push(format!("php {}", version));
        }
        println!("{:<24} {:<28} {}", site.host(), flags.join(", "), site.path);
    }
    for proxy in &listing.proxies {
        let scheme = if proxy.secured { "https" } else { "http" };
        println!("{:<24} {}://{} -> {}", proxy.host(), scheme, proxy.host(), proxy.target);
    }
}

fn report(description: &str, outcome: ActionOutcome, json: bool) -> Result<bool> {
    let changed = outcome.is_changed();
    if json {
        print_json(&outcome)?;
        return Ok(changed);
    }

    match outcome {
        ActionOutcome::Changed => println!("✅ {}", description),
        ActionOutcome::Unchanged { command } => {
            println!("⚠️  Nothing changed. To diagnose, run:");
            println!("   {}", command);
        }
    }
    Ok(changed)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phpmon_env::TestableConfiguration;

    fn working() -> Environment {
        TestableConfiguration::working().into_environment().env
    }

    #[tokio::test]
    async fn test_json_listings_on_working_machine() {
        for command in [Command::Services, Command::Domains, Command::Status] {
            assert!(run(command, working(), Settings::default(), None, true)
                .await
                .unwrap());
        }
        let versions = Command::Php(PhpCommand::Versions);
        assert!(run(versions, working(), Settings::default(), None, true)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_prefs_are_read_only_without_a_settings_file() {
        let prefs = Command::Prefs {
            key: Some("dynamic_icon".to_string()),
            value: Some("false".to_string()),
        };
        assert!(run(prefs, working(), Settings::default(), None, false)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_updates_without_network() {
        assert!(run(Command::Updates, working(), Settings::default(), None, true)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_failed_checks_exit_unsuccessfully() {
        let env = TestableConfiguration::broken().into_environment().env;
        assert!(!run(Command::Check, env, Settings::default(), None, true)
            .await
            .unwrap());
    }
}
