//! PHP Monitor - Supervise a Homebrew PHP toolchain and Laravel Valet
//!
//! This is the binary entry point. All logic lives in the workspace crates.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use phpmon_app::config::load_settings;
use phpmon_app::Settings;
use phpmon_core::logging::LogOptions;
use phpmon_env::{Environment, TestableConfiguration};

/// PHP Monitor - Supervise a Homebrew PHP toolchain and Laravel Valet
#[derive(Parser, Debug)]
#[command(name = "phpmon")]
#[command(about = "Supervise a Homebrew PHP toolchain and Laravel Valet", long_about = None)]
struct Args {
    /// Run against a simulated machine instead of this one
    #[arg(long, value_enum)]
    preset: Option<Preset>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Preset {
    /// PHP 8.1 active, Valet configured, every service running
    Working,
    /// Nothing installed
    Broken,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that Homebrew, PHP and Valet are set up
    Check,
    /// Active PHP version and service health
    Status,
    /// List managed services
    Services,
    /// Start a stopped service or stop a running one
    ToggleService { name: String },
    /// PHP versions, formulae and extensions
    #[command(subcommand)]
    Php(PhpCommand),
    /// List sites and proxies
    Domains,
    /// Serve a site over HTTPS
    Secure { site: String },
    /// Serve a site over HTTP
    Unsecure { site: String },
    /// Serve a site with a specific PHP version
    Isolate { site: String, version: String },
    /// Serve a site with the global PHP version
    Unisolate { site: String },
    /// Serve a directory as <name>.<tld>
    Link { path: String, name: String },
    /// Remove a linked site
    Unlink { site: String },
    /// Forward <domain>.<tld> to another URL
    Proxy {
        domain: String,
        target: String,
        #[arg(long)]
        secure: bool,
    },
    /// Remove a proxy
    Unproxy { domain: String },
    /// Compare this build with the latest release
    Updates,
    /// Show preferences, or set one
    Prefs {
        key: Option<String>,
        value: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum PhpCommand {
    /// Details of the active installation
    Info,
    /// Installed PHP versions
    Versions,
    /// Supported PHP formulae
    Formulae {
        /// Ask Homebrew for available upgrades
        #[arg(long)]
        outdated: bool,
    },
    /// Link another installed PHP version
    Switch { version: String },
    /// Extensions of the active installation
    Extensions,
    /// Enable or disable an extension
    ToggleExtension { name: String },
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    phpmon_core::logging::init(LogOptions::for_cli(args.preset.is_some(), args.json))?;
    tracing::debug!("Running {:?} (preset: {:?})", args.command, args.preset);

    // Presets never touch the settings file
    let (env, settings, settings_path) = match args.preset {
        Some(Preset::Working) => (
            TestableConfiguration::working().into_environment().env,
            Settings::default(),
            None,
        ),
        Some(Preset::Broken) => (
            TestableConfiguration::broken().into_environment().env,
            Settings::default(),
            None,
        ),
        None => {
            let env = Environment::real();
            let path = PathBuf::from(env.paths.settings_file());
            let settings = load_settings(&path);
            (env, settings, Some(path))
        }
    };

    let succeeded = commands::run(args.command, env, settings, settings_path, args.json).await?;
    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
