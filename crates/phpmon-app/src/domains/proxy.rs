//! Reverse proxies configured through `valet proxy`

use std::sync::LazyLock;

use phpmon_env::Environment;
use regex::Regex;
use serde::Serialize;

static PROXY_PASS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"proxy_pass\s+([^;\s]+)\s*;").expect("Invalid proxy_pass regex"));

/// A domain forwarded to another URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Proxy {
    pub domain: String,
    pub target: String,
    pub tld: String,
    pub secured: bool,
}

impl Proxy {
    pub fn host(&self) -> String {
        format!("{}.{}", self.domain, self.tld)
    }

    /// Read `<Nginx>/<file_name>`; `None` unless it is a proxy configuration
    pub fn read(env: &Environment, tld: &str, file_name: &str) -> Option<Self> {
        let path = format!("{}/{}", env.paths.valet_nginx(), file_name);
        if !env.fs.file_exists(&path) {
            return None;
        }

        let content = env.fs.read_to_string(&path).ok()?;
        let target = PROXY_PASS.captures(&content)?.get(1)?.as_str().to_string();

        let suffix = format!(".{}", tld);
        let domain = file_name.strip_suffix(&suffix).unwrap_or(file_name).to_string();
        let secured = env.fs.file_exists(&format!(
            "{}/{}.crt",
            env.paths.valet_certificates(),
            file_name
        ));

        Some(Self {
            domain,
            target,
            tld: tld.to_string(),
            secured,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phpmon_env::TestableConfiguration;

    #[test]
    fn test_read_proxy() {
        let t = TestableConfiguration::working().into_environment();
        let proxy = Proxy::read(&t.env, "test", "vite.test").unwrap();
        assert_eq!(proxy.domain, "vite");
        assert_eq!(proxy.target, "http://127.0.0.1:5173");
        assert_eq!(proxy.host(), "vite.test");
        assert!(!proxy.secured);
    }

    #[test]
    fn test_isolation_config_is_not_a_proxy() {
        let t = TestableConfiguration::working().into_environment();
        assert!(Proxy::read(&t.env, "test", "shop.test").is_none());
        assert!(Proxy::read(&t.env, "test", "missing.test").is_none());
    }
}
