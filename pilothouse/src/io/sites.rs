//! Site registry backed by the sites directory.
//!
//! Every immediate subdirectory whose name is a valid DNS label is a site,
//! served at `<name>.<tld>`.

use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, warn};

static SITE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?$").expect("valid site regex"));

/// A locally served site.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Site {
    /// Directory name under the sites directory.
    pub name: String,
    /// Hostname the site is served at.
    pub host: String,
}

/// Source of configured sites.
pub trait SiteRegistry {
    /// All sites, sorted by hostname.
    fn sites(&self) -> Result<Vec<Site>>;

    /// Hostnames of [`SiteRegistry::sites`], in the same order.
    fn hosts(&self) -> Result<Vec<String>> {
        Ok(self.sites()?.into_iter().map(|site| site.host).collect())
    }
}

/// Registry that scans a directory on every call.
#[derive(Debug, Clone)]
pub struct DirectorySiteRegistry {
    sites_dir: PathBuf,
    tld: String,
}

impl DirectorySiteRegistry {
    pub fn new(sites_dir: impl Into<PathBuf>, tld: impl Into<String>) -> Self {
        Self {
            sites_dir: sites_dir.into(),
            tld: tld.into(),
        }
    }
}

impl SiteRegistry for DirectorySiteRegistry {
    fn sites(&self) -> Result<Vec<Site>> {
        if !self.sites_dir.is_dir() {
            debug!(sites_dir = %self.sites_dir.display(), "sites directory missing");
            return Ok(Vec::new());
        }

        let mut sites = Vec::new();
        for entry in fs::read_dir(&self.sites_dir)
            .with_context(|| format!("read {}", self.sites_dir.display()))?
        {
            let entry = entry.context("read sites entry")?;
            let file_type = entry
                .file_type()
                .with_context(|| format!("stat {}", entry.path().display()))?;
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                continue;
            }
            if !SITE_NAME_RE.is_match(&name) {
                warn!(site = %name, "skipping site with invalid hostname label");
                continue;
            }
            sites.push(Site {
                host: format!("{name}.{}", self.tld),
                name,
            });
        }

        sites.sort_by(|a, b| a.host.cmp(&b.host));
        sites.dedup_by(|a, b| a.host == b.host);
        Ok(sites)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_yields_no_sites() {
        let temp = tempfile::tempdir().expect("tempdir");
        let registry = DirectorySiteRegistry::new(temp.path().join("nope"), "test");
        assert!(registry.sites().expect("sites").is_empty());
    }

    #[test]
    fn lists_valid_directories_sorted() {
        let temp = tempfile::tempdir().expect("tempdir");
        for name in ["zeta", "alpha", "mid-site", "Bad_Name", ".hidden"] {
            fs::create_dir(temp.path().join(name)).expect("mkdir");
        }
        fs::write(temp.path().join("notes.txt"), "not a site").expect("write");

        let registry = DirectorySiteRegistry::new(temp.path(), "test");
        let hosts = registry.hosts().expect("hosts");
        assert_eq!(hosts, vec!["alpha.test", "mid-site.test", "zeta.test"]);

        let sites = registry.sites().expect("sites");
        assert_eq!(sites[1].name, "mid-site");
    }

    #[test]
    fn uses_configured_tld() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::create_dir(temp.path().join("blog")).expect("mkdir");
        let registry = DirectorySiteRegistry::new(temp.path(), "localhost");
        assert_eq!(registry.hosts().expect("hosts"), vec!["blog.localhost"]);
    }
}
