//! Run-directory generation for `pilothouse up`.
//!
//! The run directory is a snapshot derived entirely from the app templates,
//! the user's home directory and the site registry. It is emptied and rebuilt
//! on every call; nothing from a previous build survives.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::core::hosts::render_hosts_file;
use crate::core::template::populate_template;
use crate::io::certs::regenerate_https_certificate;
use crate::io::config::{AppConfig, Paths};
use crate::io::fs_ops::{copy_file, copy_tree, create_dir, empty_dir, write_file};
use crate::io::nginx::update_sites_nginx_config;
use crate::io::process::CommandExecutor;
use crate::io::sites::SiteRegistry;

pub const README_FILE: &str = "readme.txt";
pub const ENV_FILE: &str = ".env";
pub const COMPOSE_FILE: &str = "docker-compose.yml";
pub const OVERRIDE_FILE: &str = "docker-compose.override.yml";
pub const CONFIG_DIR: &str = "config";
pub const NGINX_DEFAULT_SITE_DIR: &str = "nginx-default-site";
pub const HOSTS_FILE: &str = "hosts.txt";

pub const README_TEXT: &str = "All files in this directory are programmatically generated on \
`pilothouse up`. Do not manually edit any of these files, as your changes will not persist.";

/// What a build produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFilesReport {
    /// Site hosts the build was generated for, in output order.
    pub hosts: Vec<String>,
    pub override_copied: bool,
    pub vhosts: Vec<PathBuf>,
    /// Certificate covering `localhost` and every host.
    pub certificate: PathBuf,
}

/// Variables substituted into the compose template.
///
/// Built-in path and container values come first; entries from the
/// `[compose]` config table override them.
pub fn compose_variables(paths: &Paths, config: &AppConfig) -> BTreeMap<String, String> {
    let mut vars = BTreeMap::new();
    let builtins = [
        ("app_directory", paths.app_dir.display().to_string()),
        ("home_directory", paths.home_dir.display().to_string()),
        ("run_directory", paths.run_dir.display().to_string()),
        ("sites_directory", paths.sites_dir.display().to_string()),
        ("project_name", config.project_name.clone()),
        ("default_php_container", config.default_php_container.clone()),
    ];
    for (key, value) in builtins {
        vars.insert(key.to_string(), value);
    }
    for (key, value) in &config.compose {
        vars.insert(key.clone(), value.clone());
    }
    vars
}

/// Rebuild the run directory from scratch.
#[instrument(skip_all, fields(run_dir = %paths.run_dir.display()))]
pub fn build_run_files<E, S>(
    paths: &Paths,
    config: &AppConfig,
    executor: &E,
    sites: &S,
) -> Result<RunFilesReport>
where
    E: CommandExecutor,
    S: SiteRegistry,
{
    let run_dir = &paths.run_dir;
    let site_list = sites.sites()?;
    let hosts: Vec<String> = site_list.iter().map(|site| site.host.clone()).collect();

    create_dir(&paths.home_dir).context("prepare home directory")?;
    empty_dir(run_dir).context("reset run directory")?;
    write_file(&run_dir.join(README_FILE), README_TEXT).context("write run directory marker")?;

    copy_file(&paths.env_template(), &run_dir.join(ENV_FILE))?;
    copy_tree(&paths.config_source(), &run_dir.join(CONFIG_DIR))?;

    let template_path = paths.compose_template();
    let template = fs::read_to_string(&template_path)
        .with_context(|| format!("read {}", template_path.display()))?;
    let compose = populate_template(&template, &compose_variables(paths, config));
    write_file(&run_dir.join(COMPOSE_FILE), &compose)?;

    let override_copied = paths.override_file.is_file();
    if override_copied {
        copy_file(&paths.override_file, &run_dir.join(OVERRIDE_FILE))?;
        debug!(source = %paths.override_file.display(), "copied compose override");
    }

    copy_tree(
        &paths.nginx_default_site_source(),
        &run_dir.join(NGINX_DEFAULT_SITE_DIR),
    )?;

    let vhosts = update_sites_nginx_config(paths, config, &site_list)?;

    write_file(&run_dir.join(HOSTS_FILE), &render_hosts_file(&hosts))?;

    let certificate = regenerate_https_certificate(executor, paths, config, &hosts)?;

    info!(sites = hosts.len(), override_copied, "run files generated");
    Ok(RunFilesReport {
        hosts,
        override_copied,
        vhosts,
        certificate,
    })
}
