//! Per-site Nginx virtual-host generation.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{debug, instrument};

use super::config::{AppConfig, Paths};
use super::sites::Site;

const SITE_TEMPLATE: &str = include_str!("templates/nginx_site.conf");
const TEMPLATE_NAME: &str = "site.conf";

/// Directory, relative to the run directory, holding generated vhosts.
pub const SITES_CONFIG_DIR: &str = "nginx-sites";

#[derive(Debug, Clone, Serialize)]
struct SiteContext<'a> {
    name: &'a str,
    host: &'a str,
}

/// Template engine wrapper around minijinja.
struct VhostEngine<'s> {
    env: Environment<'s>,
}

impl<'s> VhostEngine<'s> {
    fn new(source: &'s str) -> Result<Self> {
        let mut env = Environment::new();
        env.add_template(TEMPLATE_NAME, source)
            .context("parse nginx site template")?;
        Ok(Self { env })
    }

    fn render(&self, site: &Site, php_container: &str) -> Result<String> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        let rendered = template.render(context! {
            site => SiteContext { name: &site.name, host: &site.host },
            php_container => php_container,
        })?;
        Ok(rendered)
    }
}

/// Regenerate one vhost file per site under `<run>/nginx-sites/`.
///
/// Returns the written paths in site order.
#[instrument(skip_all, fields(sites = sites.len()))]
pub fn update_sites_nginx_config(
    paths: &Paths,
    config: &AppConfig,
    sites: &[Site],
) -> Result<Vec<PathBuf>> {
    let out_dir = paths.run_dir.join(SITES_CONFIG_DIR);
    if out_dir.exists() {
        fs::remove_dir_all(&out_dir)
            .with_context(|| format!("remove {}", out_dir.display()))?;
    }
    fs::create_dir_all(&out_dir).with_context(|| format!("create {}", out_dir.display()))?;

    let source = load_template_source(&paths.nginx_site_template())?;
    let engine = VhostEngine::new(&source)?;
    let mut written = Vec::with_capacity(sites.len());
    for site in sites {
        let mut rendered = engine
            .render(site, &config.default_php_container)
            .with_context(|| format!("render nginx config for {}", site.host))?;
        if !rendered.ends_with('\n') {
            rendered.push('\n');
        }
        let path = out_dir.join(format!("{}.conf", site.host));
        fs::write(&path, rendered).with_context(|| format!("write {}", path.display()))?;
        debug!(host = %site.host, path = %path.display(), "wrote nginx site config");
        written.push(path);
    }
    Ok(written)
}

/// Custom template at `custom` when it exists, else the built-in one.
fn load_template_source(custom: &Path) -> Result<Cow<'static, str>> {
    if !custom.is_file() {
        return Ok(Cow::Borrowed(SITE_TEMPLATE));
    }
    let source =
        fs::read_to_string(custom).with_context(|| format!("read {}", custom.display()))?;
    debug!(template = %custom.display(), "using custom nginx site template");
    Ok(Cow::Owned(source))
}
