//! Testable environment presets
//!
//! A [`TestableConfiguration`] is plain data: fake files, scripted shell
//! outputs and scripted command outputs. [`TestableConfiguration::into_environment`]
//! wires the three fakes together (shell effects mutate the same filesystem
//! and command table the engine reads) and returns the handles so tests can
//! inspect or re-script them.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{command_key, TestableCommand};
use crate::environment::Environment;
use crate::filesystem::{FakeFile, TestableFileSystem};
use crate::paths::Paths;
use crate::shell::{FakeEffect, FakeShellOutput, TestableShell};

/// Home directory used by the presets
pub const PRESET_HOME: &str = "/Users/phpmon";

/// Fixture data for a fake machine
#[derive(Debug, Clone)]
pub struct TestableConfiguration {
    pub architecture: String,
    pub home: String,
    pub filesystem: HashMap<String, FakeFile>,
    pub shell_outputs: HashMap<String, FakeShellOutput>,
    pub command_outputs: HashMap<String, String>,
}

/// The fakes behind an [`Environment`], kept for inspection
pub struct TestableEnvironment {
    pub env: Environment,
    pub fs: Arc<TestableFileSystem>,
    pub shell: Arc<TestableShell>,
    pub command: Arc<TestableCommand>,
}

impl TestableConfiguration {
    /// An empty arm64 machine
    pub fn empty() -> Self {
        Self {
            architecture: "arm64".to_string(),
            home: PRESET_HOME.to_string(),
            filesystem: HashMap::new(),
            shell_outputs: HashMap::new(),
            command_outputs: HashMap::new(),
        }
    }

    pub fn paths(&self) -> Paths {
        Paths::new(
            Paths::prefix_for_architecture(&self.architecture),
            self.home.clone(),
        )
    }

    pub fn with_file(mut self, path: impl Into<String>, file: FakeFile) -> Self {
        self.filesystem.insert(path.into(), file);
        self
    }

    pub fn without_file(mut self, path: &str) -> Self {
        self.filesystem.remove(path);
        self
    }

    pub fn with_shell(mut self, command: impl Into<String>, output: FakeShellOutput) -> Self {
        self.shell_outputs.insert(command.into(), output);
        self
    }

    pub fn with_command(mut self, command: impl Into<String>, output: impl Into<String>) -> Self {
        self.command_outputs.insert(command.into(), output.into());
        self
    }

    /// Build the fakes and the environment that uses them
    pub fn into_environment(self) -> TestableEnvironment {
        let paths = self.paths();
        let fs = Arc::new(TestableFileSystem::new(self.filesystem));
        let command = Arc::new(TestableCommand::new(self.command_outputs));
        let shell = Arc::new(
            TestableShell::new(self.shell_outputs).with_effect_targets(fs.clone(), command.clone()),
        );

        let env = Environment::new(fs.clone(), shell.clone(), command.clone(), paths);
        TestableEnvironment {
            env,
            fs,
            shell,
            command,
        }
    }

    /// A machine where Homebrew, PHP 8.1.10 (`php@8.1`) and Valet work
    ///
    /// The `php` formula (8.2.3) is installed but not linked, so switching to
    /// 8.2 succeeds.
    pub fn working() -> Self {
        let config = Self::empty();
        let p = config.paths();
        let php_81_ini = format!("{}/conf.d", p.php_etc("8.1"));
        let php_82_ini = format!("{}/conf.d", p.php_etc("8.2"));
        let sites = p.valet_sites();
        let nginx = p.valet_nginx();
        let certs = p.valet_certificates();
        let code = format!("{}/Code", config.home);
        let projects = format!("{}/Projects", config.home);
        let php_config_version = command_key(&p.php_config(), &["--version"]);
        let scanned_files = command_key(&p.php(), &["-r", "echo php_ini_scanned_files();"]);

        config
            // Homebrew and binaries
            .with_file(p.brew(), FakeFile::binary())
            .with_file(p.php(), FakeFile::binary())
            .with_file(p.php_config(), FakeFile::binary())
            .with_file(p.valet(), FakeFile::binary())
            .with_file(p.opt(), FakeFile::directory())
            .with_file(
                p.formula_opt("php"),
                FakeFile::symlink(format!("{}/php/8.2.3", p.cellar())),
            )
            .with_file(format!("{}/php/8.2.3", p.cellar()), FakeFile::directory())
            .with_file(format!("{}/php/8.2.3/bin/php", p.cellar()), FakeFile::binary())
            .with_file(
                p.formula_opt("php@8.1"),
                FakeFile::symlink(format!("{}/php@8.1/8.1.10", p.cellar())),
            )
            .with_file(format!("{}/php@8.1/8.1.10", p.cellar()), FakeFile::directory())
            .with_file(format!("{}/php@8.1/8.1.10/bin/php", p.cellar()), FakeFile::binary())
            .with_file(
                format!("{}/sbin/php-fpm", p.formula_opt("php@8.1")),
                FakeFile::binary(),
            )
            .with_file(format!("{}/sbin/php-fpm", p.formula_opt("php")), FakeFile::binary())
            .with_file(format!("{}/bin/nginx", p.formula_opt("nginx")), FakeFile::binary())
            .with_file(format!("{}/sbin/dnsmasq", p.formula_opt("dnsmasq")), FakeFile::binary())
            // PHP configuration
            .with_file(php_81_ini.clone(), FakeFile::directory())
            .with_file(
                format!("{}/ext-opcache.ini", php_81_ini),
                FakeFile::text(format!(
                    "[opcache]\nzend_extension=\"{}/lib/php/20210902/opcache.so\"\n",
                    p.formula_opt("php@8.1")
                )),
            )
            .with_file(
                format!("{}/ext-apcu.ini", php_81_ini),
                FakeFile::text("[apcu]\nextension=\"apcu.so\"\napc.enabled=1\n"),
            )
            .with_file(
                format!("{}/ext-xdebug.ini", php_81_ini),
                FakeFile::text("[xdebug]\n;zend_extension=\"xdebug.so\"\nxdebug.mode=debug\n"),
            )
            .with_file(
                format!("{}/php-memory-limits.ini", php_81_ini),
                FakeFile::text("memory_limit = 128M\npost_max_size = 8M\nupload_max_filesize = 2M\n"),
            )
            .with_file(php_82_ini.clone(), FakeFile::directory())
            .with_file(
                format!("{}/ext-opcache.ini", php_82_ini),
                FakeFile::text(format!(
                    "[opcache]\nzend_extension=\"{}/lib/php/20220829/opcache.so\"\n",
                    p.formula_opt("php")
                )),
            )
            // Valet
            .with_file(p.valet_config_dir(), FakeFile::directory())
            .with_file(
                p.valet_config_file(),
                FakeFile::text(format!(
                    "{{\n    \"tld\": \"test\",\n    \"loopback\": \"127.0.0.1\",\n    \"paths\": [\n        \"{}\",\n        \"{}\"\n    ]\n}}\n",
                    sites, code
                )),
            )
            .with_file(sites.clone(), FakeFile::directory())
            .with_file(
                format!("{}/legacy", sites),
                FakeFile::symlink(format!("{}/legacy", projects)),
            )
            .with_file(projects.clone(), FakeFile::directory())
            .with_file(format!("{}/legacy", projects), FakeFile::directory())
            .with_file(format!("{}/blog", projects), FakeFile::directory())
            .with_file(code.clone(), FakeFile::directory())
            .with_file(format!("{}/example", code), FakeFile::directory())
            .with_file(
                format!("{}/example/composer.json", code),
                FakeFile::text("{\n    \"require\": {\n        \"php\": \"^8.1\",\n        \"laravel/framework\": \"^10.0\"\n    }\n}\n"),
            )
            .with_file(format!("{}/api", code), FakeFile::directory())
            .with_file(format!("{}/shop", code), FakeFile::directory())
            .with_file(format!("{}/notes.txt", code), FakeFile::text("not a site"))
            .with_file(certs.clone(), FakeFile::directory())
            .with_file(format!("{}/api.test.crt", certs), FakeFile::text("CERTIFICATE"))
            .with_file(format!("{}/api.test.key", certs), FakeFile::text("KEY"))
            .with_file(nginx.clone(), FakeFile::directory())
            .with_file(
                format!("{}/shop.test", nginx),
                FakeFile::text(isolated_config("shop.test", "8.2")),
            )
            .with_file(
                format!("{}/vite.test", nginx),
                FakeFile::text(proxy_config("vite.test", "http://127.0.0.1:5173")),
            )
            // Detection and active installation
            .with_shell(
                format!("ls {} | grep php", p.opt()),
                FakeShellOutput::instant("php\nphp-cs-fixer\nphp@8.1\n"),
            )
            .with_command(php_config_version.clone(), "8.1.10")
            .with_command(ini_get(&p, "memory_limit"), "128M")
            .with_command(ini_get(&p, "upload_max_filesize"), "2M")
            .with_command(ini_get(&p, "post_max_size"), "8M")
            .with_command(ini_get(&p, "extension_dir"), "/opt/homebrew/lib/php/pecl/20210902")
            .with_command(
                scanned_files.clone(),
                format!(
                    "{0}/ext-apcu.ini,\n{0}/ext-opcache.ini,\n{0}/ext-xdebug.ini,\n{0}/php-memory-limits.ini\n",
                    php_81_ini
                ),
            )
            // Services
            .with_shell(
                service_info(&p, "php@8.1"),
                FakeShellOutput::instant(service_json(&p, "php@8.1", true)),
            )
            .with_shell(
                service_info(&p, "php"),
                FakeShellOutput::instant(service_json(&p, "php", true)),
            )
            .with_shell(
                service_info(&p, "nginx"),
                FakeShellOutput::delayed(0.05, service_json(&p, "nginx", true)),
            )
            .with_shell(
                service_info(&p, "dnsmasq"),
                FakeShellOutput::instant(service_json(&p, "dnsmasq", true)),
            )
            .with_shell(
                format!("sudo {} services stop dnsmasq", p.brew()),
                FakeShellOutput::instant("==> Successfully stopped `dnsmasq`").with_effect(
                    FakeEffect::shell_output(
                        service_info(&p, "dnsmasq"),
                        FakeShellOutput::instant(service_json(&p, "dnsmasq", false)),
                    ),
                ),
            )
            .with_shell(
                format!("sudo {} services start dnsmasq", p.brew()),
                FakeShellOutput::instant("==> Successfully started `dnsmasq`").with_effect(
                    FakeEffect::shell_output(
                        service_info(&p, "dnsmasq"),
                        FakeShellOutput::instant(service_json(&p, "dnsmasq", true)),
                    ),
                ),
            )
            .with_shell(
                format!("sudo {} services restart php@8.1", p.brew()),
                FakeShellOutput::instant("==> Successfully restarted `php@8.1`"),
            )
            .with_shell(
                format!("sudo {} services restart nginx", p.brew()),
                FakeShellOutput::instant("==> Successfully restarted `nginx`"),
            )
            // Switching
            .with_shell(
                format!("{} unlink php@8.1", p.brew()),
                FakeShellOutput::instant("Unlinking /opt/homebrew/Cellar/php@8.1/8.1.10... 25 symlinks removed.")
                    .with_effect(FakeEffect::remove(p.php()))
                    .with_effect(FakeEffect::remove(p.php_config())),
            )
            .with_shell(
                format!("{} unlink php", p.brew()),
                FakeShellOutput::instant("Unlinking /opt/homebrew/Cellar/php/8.2.3... 25 symlinks removed.")
                    .with_effect(FakeEffect::remove(p.php()))
                    .with_effect(FakeEffect::remove(p.php_config())),
            )
            .with_shell(
                format!("{} link php --overwrite --force", p.brew()),
                FakeShellOutput::instant("Linking /opt/homebrew/Cellar/php/8.2.3... 25 symlinks created.")
                    .with_effect(FakeEffect::write(p.php(), FakeFile::binary()))
                    .with_effect(FakeEffect::write(p.php_config(), FakeFile::binary()))
                    .with_effect(FakeEffect::command_output(php_config_version.clone(), "8.2.3"))
                    .with_effect(FakeEffect::command_output(
                        ini_get(&p, "extension_dir"),
                        "/opt/homebrew/lib/php/pecl/20220829",
                    ))
                    .with_effect(FakeEffect::command_output(
                        scanned_files.clone(),
                        format!("{}/ext-opcache.ini\n", php_82_ini),
                    )),
            )
            .with_shell(
                format!("{} link php@8.1 --overwrite --force", p.brew()),
                FakeShellOutput::instant("Linking /opt/homebrew/Cellar/php@8.1/8.1.10... 25 symlinks created.")
                    .with_effect(FakeEffect::write(p.php(), FakeFile::binary()))
                    .with_effect(FakeEffect::write(p.php_config(), FakeFile::binary()))
                    .with_effect(FakeEffect::command_output(php_config_version, "8.1.10"))
                    .with_effect(FakeEffect::command_output(
                        ini_get(&p, "extension_dir"),
                        "/opt/homebrew/lib/php/pecl/20210902",
                    ))
                    .with_effect(FakeEffect::command_output(
                        scanned_files,
                        format!(
                            "{0}/ext-apcu.ini,\n{0}/ext-opcache.ini,\n{0}/ext-xdebug.ini,\n{0}/php-memory-limits.ini\n",
                            php_81_ini
                        ),
                    )),
            )
            // Domains
            .with_shell(
                format!("cd '{}/example' && sudo {} secure && exit;", code, p.valet()),
                FakeShellOutput::instant("The [example.test] site has been secured with a fresh TLS certificate.")
                    .with_effect(FakeEffect::write(
                        format!("{}/example.test.crt", certs),
                        FakeFile::text("CERTIFICATE"),
                    )),
            )
            .with_shell(
                format!("cd '{}/api' && sudo {} unsecure && exit;", code, p.valet()),
                FakeShellOutput::instant("The [api.test] site will now serve traffic over HTTP.")
                    .with_effect(FakeEffect::remove(format!("{}/api.test.crt", certs)))
                    .with_effect(FakeEffect::remove(format!("{}/api.test.key", certs))),
            )
            .with_shell(
                format!("sudo {} isolate php@8.1 --site 'example' && exit;", p.valet()),
                FakeShellOutput::instant("The site [example.test] is now using php@8.1.").with_effect(
                    FakeEffect::write(
                        format!("{}/example.test", nginx),
                        FakeFile::text(isolated_config("example.test", "8.1")),
                    ),
                ),
            )
            .with_shell(
                format!("sudo {} unisolate --site 'shop' && exit;", p.valet()),
                FakeShellOutput::instant("The site [shop.test] is now using the default PHP version.")
                    .with_effect(FakeEffect::remove(format!("{}/shop.test", nginx))),
            )
            .with_shell(
                format!("cd '{}/blog' && {} link 'blog' && exit;", projects, p.valet()),
                FakeShellOutput::instant("A [blog] symbolic link has been created").with_effect(
                    FakeEffect::write(
                        format!("{}/blog", sites),
                        FakeFile::symlink(format!("{}/blog", projects)),
                    ),
                ),
            )
            .with_shell(
                format!("{} unlink 'legacy'", p.valet()),
                FakeShellOutput::instant("The [legacy] symbolic link has been removed.")
                    .with_effect(FakeEffect::remove(format!("{}/legacy", sites))),
            )
            .with_shell(
                format!("sudo {} proxy mailpit http://127.0.0.1:8025", p.valet()),
                FakeShellOutput::instant("Valet will now proxy [http://mailpit.test] traffic to [http://127.0.0.1:8025].")
                    .with_effect(FakeEffect::write(
                        format!("{}/mailpit.test", nginx),
                        FakeFile::text(proxy_config("mailpit.test", "http://127.0.0.1:8025")),
                    )),
            )
            .with_shell(
                format!("sudo {} unproxy vite", p.valet()),
                FakeShellOutput::instant("Valet will no longer proxy [http://vite.test].")
                    .with_effect(FakeEffect::remove(format!("{}/vite.test", nginx))),
            )
            .with_shell(
                format!("sudo {} proxy vite http://127.0.0.1:5173 --secure", p.valet()),
                FakeShellOutput::instant("Valet will now proxy [https://vite.test] traffic to [http://127.0.0.1:5173].")
                    .with_effect(FakeEffect::write(
                        format!("{}/vite.test", nginx),
                        FakeFile::text(proxy_config("vite.test", "http://127.0.0.1:5173")),
                    ))
                    .with_effect(FakeEffect::write(
                        format!("{}/vite.test.crt", certs),
                        FakeFile::text("CERTIFICATE"),
                    )),
            )
            // Versions and health
            .with_shell(
                format!("{} --version", p.valet()),
                FakeShellOutput::instant("Laravel Valet 3.1.11\n"),
            )
            .with_shell(
                format!("{} outdated --json --formulae", p.brew()),
                FakeShellOutput::instant(
                    r#"{"formulae":[{"name":"php","installed_versions":["8.2.3"],"current_version":"8.2.4","pinned":false,"pinned_version":null}],"casks":[]}"#,
                ),
            )
            .with_shell(
                format!("cat {}", p.sudoers_brew()),
                FakeShellOutput::instant(format!(
                    "Cmnd_Alias BREW = {} *\n%admin ALL=(root) NOPASSWD:SETENV: BREW\n",
                    p.brew()
                )),
            )
            .with_shell(
                format!("cat {}", p.sudoers_valet()),
                FakeShellOutput::instant(format!(
                    "Cmnd_Alias VALET = {} *\n%admin ALL=(root) NOPASSWD:SETENV: VALET\n",
                    p.valet()
                )),
            )
    }

    /// A machine without Homebrew, PHP or Valet
    pub fn broken() -> Self {
        let config = Self::empty();
        let p = config.paths();
        let not_found = |binary: String| {
            FakeShellOutput::failure(format!("sh: {}: No such file or directory", binary))
        };

        let mut config = config
            .with_shell(format!("ls {} | grep php", p.opt()), FakeShellOutput::failure(""))
            .with_shell(format!("{} --version", p.valet()), not_found(p.valet()))
            .with_shell(
                format!("{} outdated --json --formulae", p.brew()),
                not_found(p.brew()),
            )
            .with_shell(
                format!("cat {}", p.sudoers_brew()),
                FakeShellOutput::failure(format!(
                    "cat: {}: No such file or directory",
                    p.sudoers_brew()
                )),
            )
            .with_shell(
                format!("cat {}", p.sudoers_valet()),
                FakeShellOutput::failure(format!(
                    "cat: {}: No such file or directory",
                    p.sudoers_valet()
                )),
            );

        for formula in ["php", "nginx", "dnsmasq"] {
            config = config.with_shell(service_info(&p, formula), not_found(p.brew()));
        }
        config
    }
}

/// `sudo <brew> services info <formula> --json`
pub fn service_info(paths: &Paths, formula: &str) -> String {
    format!("sudo {} services info {} --json", paths.brew(), formula)
}

/// Command key for `<php> -r echo ini_get('<key>');`
pub fn ini_get(paths: &Paths, key: &str) -> String {
    command_key(&paths.php(), &["-r", format!("echo ini_get('{}');", key).as_str()])
}

/// `brew services info --json` payload for a formula
pub fn service_json(paths: &Paths, formula: &str, running: bool) -> String {
    let command = match formula {
        "nginx" => format!("{}/bin/nginx -g daemon off;", paths.formula_opt("nginx")),
        "dnsmasq" => format!(
            "{}/sbin/dnsmasq --keep-in-foreground -C {}/etc/dnsmasq.conf -7 {}/etc/dnsmasq.d,*.conf",
            paths.formula_opt("dnsmasq"),
            paths.prefix,
            paths.prefix
        ),
        php => format!(
            "{}/sbin/php-fpm --nodaemonize",
            paths.formula_opt(php)
        ),
    };
    let pid = if running { "1234" } else { "null" };
    let status = if running { "started" } else { "none" };

    format!(
        r#"[{{"name":"{formula}","service_name":"homebrew.mxcl.{formula}","running":{running},"loaded":{running},"schedulable":false,"pid":{pid},"exit_code":0,"user":"root","status":"{status}","file":"/Library/LaunchDaemons/homebrew.mxcl.{formula}.plist","command":"{command}","working_dir":"{prefix}","root_dir":null,"log_path":null,"error_log_path":null,"interval":null,"cron":null}}]"#,
        formula = formula,
        running = running,
        pid = pid,
        status = status,
        command = command,
        prefix = paths.prefix,
    )
}

fn isolated_config(host: &str, version: &str) -> String {
    format!(
        "# ISOLATED_PHP_VERSION=php@{version}\nserver {{\n    listen 127.0.0.1:80;\n    server_name {host} www.{host} *.{host};\n    root /;\n    charset utf-8;\n}}\n",
        version = version,
        host = host
    )
}

fn proxy_config(host: &str, target: &str) -> String {
    format!(
        "server {{\n    listen 127.0.0.1:80;\n    server_name {host} www.{host} *.{host};\n    location / {{\n        proxy_pass {target};\n        proxy_set_header Host $host;\n    }}\n}}\n",
        host = host,
        target = target
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_working_preset_has_binaries() {
        let t = TestableConfiguration::working().into_environment();
        let paths = &t.env.paths;
        assert_eq!(paths.prefix, "/opt/homebrew");
        assert!(t.env.fs.file_exists(&paths.brew()));
        assert!(t.env.fs.file_exists(&paths.php()));
        assert!(t.env.fs.directory_exists(&paths.valet_config_dir()));
        assert!(t.env.fs.is_symlink(&paths.formula_opt("php")));
    }

    #[test]
    fn test_broken_preset_has_no_files() {
        let t = TestableConfiguration::broken().into_environment();
        assert!(t.fs.paths().is_empty());
        assert!(!t.env.fs.file_exists(&t.env.paths.php()));
    }

    #[tokio::test]
    async fn test_working_preset_reports_php_81() {
        let t = TestableConfiguration::working().into_environment();
        let version = t
            .env
            .command
            .run(&t.env.paths.php_config(), &["--version"], true)
            .await
            .unwrap();
        assert_eq!(version, "8.1.10");
    }

    #[tokio::test]
    async fn test_link_effect_switches_version() {
        let t = TestableConfiguration::working().into_environment();
        let paths = t.env.paths.clone();

        t.env
            .shell
            .run_checked(&format!("{} unlink php@8.1", paths.brew()))
            .await
            .unwrap();
        assert!(!t.env.fs.file_exists(&paths.php()));

        t.env
            .shell
            .run_checked(&format!("{} link php --overwrite --force", paths.brew()))
            .await
            .unwrap();
        assert!(t.env.fs.file_exists(&paths.php()));

        let version = t
            .env
            .command
            .run(&paths.php_config(), &["--version"], true)
            .await
            .unwrap();
        assert_eq!(version, "8.2.3");
    }

    #[test]
    fn test_service_json_is_valid() {
        let paths = Paths::new(ARM, PRESET_HOME);
        let value: serde_json::Value =
            serde_json::from_str(&service_json(&paths, "nginx", false)).unwrap();
        assert_eq!(value[0]["name"], "nginx");
        assert_eq!(value[0]["running"], false);
        assert!(value[0]["pid"].is_null());
    }

    const ARM: &str = crate::paths::ARM_PREFIX;

    #[test]
    fn test_builder_overrides() {
        let config = TestableConfiguration::working()
            .without_file("/opt/homebrew/bin/valet")
            .with_command("/bin/true", "");
        assert!(!config.filesystem.contains_key("/opt/homebrew/bin/valet"));
        assert!(config.command_outputs.contains_key("/bin/true"));
    }
}
