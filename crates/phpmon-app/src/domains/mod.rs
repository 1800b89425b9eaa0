//! Domain/proxy controller
//!
//! Lists Valet sites and proxies and performs the state-changing domain
//! actions (see [`actions`]). The listing is an immutable snapshot; actions
//! re-read only the entity they touched and splice it in.

pub mod actions;
pub mod proxy;
pub mod site;

use std::collections::HashSet;
use std::sync::Arc;

use phpmon_core::prelude::*;
use phpmon_env::Environment;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::events::{EventBus, StateEvent};
use crate::valet::ValetConfig;

pub use proxy::Proxy;
pub use site::Site;

/// Sites and proxies known to Valet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DomainListing {
    pub tld: String,
    pub sites: Vec<Site>,
    pub proxies: Vec<Proxy>,
}

impl DomainListing {
    pub fn site(&self, name: &str) -> Option<&Site> {
        self.sites.iter().find(|s| s.name == name)
    }

    pub fn proxy(&self, domain: &str) -> Option<&Proxy> {
        self.proxies.iter().find(|p| p.domain == domain)
    }
}

/// Owns the domain listing snapshot
pub struct DomainController {
    env: Environment,
    bus: EventBus,
    listing: RwLock<Arc<DomainListing>>,
}

impl DomainController {
    pub fn new(env: Environment, bus: EventBus) -> Self {
        Self {
            env,
            bus,
            listing: RwLock::new(Arc::new(DomainListing::default())),
        }
    }

    /// Current snapshot
    pub async fn listing(&self) -> Arc<DomainListing> {
        self.listing.read().await.clone()
    }

    /// Re-read every site and proxy
    pub async fn list_domains(&self) -> Result<Arc<DomainListing>> {
        let listing = Arc::new(self.scan()?);
        *self.listing.write().await = listing.clone();

        debug!(
            "Found {} sites and {} proxies",
            listing.sites.len(),
            listing.proxies.len()
        );
        self.bus.publish(StateEvent::DomainsUpdated {
            sites: listing.sites.len(),
            proxies: listing.proxies.len(),
        });
        Ok(listing)
    }

    fn scan(&self) -> Result<DomainListing> {
        let config = ValetConfig::load(&self.env)?;
        let fs = &self.env.fs;
        let linked_dir = self.env.paths.valet_sites();

        let mut directories: Vec<String> = Vec::new();
        for dir in config.paths.iter().chain(std::iter::once(&linked_dir)) {
            if !directories.contains(dir) {
                directories.push(dir.clone());
            }
        }

        let mut seen = HashSet::new();
        let mut sites = Vec::new();
        for dir in &directories {
            if !fs.directory_exists(dir) {
                debug!("Skipping missing site directory {}", dir);
                continue;
            }

            let entries = fs.list_directory(dir).unwrap_or_else(|e| {
                warn!("Could not list {}: {}", dir, e);
                Vec::new()
            });

            for entry in entries {
                let path = format!("{}/{}", dir, entry);
                if !(fs.directory_exists(&path) || fs.is_symlink(&path)) {
                    continue;
                }
                if !seen.insert(entry.clone()) {
                    continue;
                }
                sites.push(Site::read(
                    &self.env,
                    &config.tld,
                    &entry,
                    &path,
                    *dir == linked_dir,
                ));
            }
        }

        let nginx = self.env.paths.valet_nginx();
        let proxies = if fs.directory_exists(&nginx) {
            fs.list_directory(&nginx)?
                .iter()
                .filter_map(|file| Proxy::read(&self.env, &config.tld, file))
                .collect()
        } else {
            Vec::new()
        };

        Ok(DomainListing {
            tld: config.tld,
            sites,
            proxies,
        })
    }

    /// Listing that has been read at least once
    async fn loaded_listing(&self) -> Result<Arc<DomainListing>> {
        let listing = self.listing().await;
        if listing.tld.is_empty() {
            self.list_domains().await
        } else {
            Ok(listing)
        }
    }

    async fn find_site(&self, name: &str) -> Result<Site> {
        if let Some(site) = self.loaded_listing().await?.site(name) {
            return Ok(site.clone());
        }
        // The site may have appeared since the last scan
        self.list_domains()
            .await?
            .site(name)
            .cloned()
            .ok_or_else(|| Error::site_not_found(name))
    }

    async fn find_proxy(&self, domain: &str) -> Result<Proxy> {
        if let Some(proxy) = self.loaded_listing().await?.proxy(domain) {
            return Ok(proxy.clone());
        }
        self.list_domains()
            .await?
            .proxy(domain)
            .cloned()
            .ok_or_else(|| Error::proxy_not_found(domain))
    }

    /// Replace the listing through `update` and announce `name`
    async fn splice<F>(&self, name: &str, update: F)
    where
        F: FnOnce(&mut DomainListing),
    {
        let mut guard = self.listing.write().await;
        let mut listing = (**guard).clone();
        update(&mut listing);
        *guard = Arc::new(listing);
        drop(guard);

        self.bus.publish(StateEvent::DomainChanged {
            name: name.to_string(),
        });
    }

    /// Re-read one site, add or replace it in the listing
    async fn reread_site(&self, tld: &str, name: &str, path: &str, linked: bool) -> Site {
        let site = Site::read(&self.env, tld, name, path, linked);
        let updated = site.clone();
        self.splice(name, move |listing| {
            match listing.sites.iter_mut().find(|s| s.name == updated.name) {
                Some(existing) => *existing = updated,
                None => listing.sites.push(updated),
            }
        })
        .await;
        site
    }

    async fn forget_site(&self, name: &str) {
        self.splice(name, |listing| listing.sites.retain(|s| s.name != name))
            .await;
    }

    /// Re-read one proxy; returns `None` (and drops it) when its file is gone
    async fn reread_proxy(&self, tld: &str, domain: &str) -> Option<Proxy> {
        let file_name = format!("{}.{}", domain, tld);
        let proxy = Proxy::read(&self.env, tld, &file_name);
        let updated = proxy.clone();
        self.splice(domain, move |listing| match updated {
            Some(updated) => {
                match listing.proxies.iter_mut().find(|p| p.domain == updated.domain) {
                    Some(existing) => *existing = updated,
                    None => {
                        listing.proxies.push(updated);
                        listing.proxies.sort_by(|a, b| a.host().cmp(&b.host()));
                    }
                }
            }
            None => listing.proxies.retain(|p| p.domain != domain),
        })
        .await;
        proxy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phpmon_env::{FakeFile, TestableConfiguration};

    #[tokio::test]
    async fn test_list_domains_working_preset() {
        let t = TestableConfiguration::working().into_environment();
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let controller = DomainController::new(t.env, bus);

        let listing = controller.list_domains().await.unwrap();
        let names: Vec<&str> = listing.sites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["legacy", "api", "example", "shop"]);
        assert!(listing.site("legacy").unwrap().linked);
        assert!(!listing.site("api").unwrap().linked);

        let domains: Vec<&str> = listing.proxies.iter().map(|p| p.domain.as_str()).collect();
        assert_eq!(domains, vec!["vite"]);

        assert!(matches!(
            rx.recv().await.unwrap(),
            StateEvent::DomainsUpdated {
                sites: 4,
                proxies: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_list_domains_deduplicates_names() {
        let t = TestableConfiguration::working()
            .with_file("/Users/phpmon/.config/valet/Sites/api", FakeFile::symlink("/tmp/api"))
            .into_environment();
        let controller = DomainController::new(t.env, EventBus::default());
        let listing = controller.list_domains().await.unwrap();
        assert_eq!(listing.sites.iter().filter(|s| s.name == "api").count(), 1);
        assert!(listing.site("api").unwrap().linked);
    }

    #[tokio::test]
    async fn test_list_domains_without_valet() {
        let t = TestableConfiguration::broken().into_environment();
        let controller = DomainController::new(t.env, EventBus::default());
        let err = controller.list_domains().await.unwrap_err();
        assert!(err.is_environment());
    }

    #[tokio::test]
    async fn test_find_unknown_site() {
        let t = TestableConfiguration::working().into_environment();
        let controller = DomainController::new(t.env, EventBus::default());
        let err = controller.find_site("nope").await.unwrap_err();
        assert!(matches!(err, Error::SiteNotFound { .. }));
        let err = controller.find_proxy("nope").await.unwrap_err();
        assert!(matches!(err, Error::ProxyNotFound { .. }));
    }
}
