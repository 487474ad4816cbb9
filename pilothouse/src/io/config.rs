//! Orchestrator configuration stored under `<home>/config.toml`, plus the
//! canonical filesystem layout derived from the app and home directories.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

/// Environment variable overriding the home directory.
pub const HOME_ENV: &str = "PILOTHOUSE_HOME";
/// Environment variable overriding the app directory.
pub const APP_DIR_ENV: &str = "PILOTHOUSE_APP_DIR";

const HOME_DIR_NAME: &str = ".pilothouse";

/// All canonical paths the orchestrator reads from or writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    /// Installation directory holding templates and static config.
    pub app_dir: PathBuf,
    /// Per-user state directory.
    pub home_dir: PathBuf,
    /// Fully regenerated docker-compose working directory.
    pub run_dir: PathBuf,
    pub sites_dir: PathBuf,
    /// Optional user-supplied compose override.
    pub override_file: PathBuf,
    pub config_file: PathBuf,
}

impl Paths {
    pub fn new(app_dir: impl Into<PathBuf>, home_dir: impl Into<PathBuf>) -> Self {
        let app_dir = app_dir.into();
        let home_dir = home_dir.into();
        Self {
            run_dir: home_dir.join("run"),
            sites_dir: home_dir.join("sites"),
            override_file: home_dir.join("docker-compose.custom.yml"),
            config_file: home_dir.join("config.toml"),
            app_dir,
            home_dir,
        }
    }

    /// Resolve paths from the process environment.
    ///
    /// The app directory is `app_dir` when given, then `PILOTHOUSE_APP_DIR`, then
    /// the current directory. The home directory is `PILOTHOUSE_HOME`, falling back
    /// to `~/.pilothouse`.
    pub fn from_env(app_dir: Option<PathBuf>) -> Result<Self> {
        let app_dir = match app_dir.or_else(|| std::env::var_os(APP_DIR_ENV).map(PathBuf::from)) {
            Some(dir) => dir,
            None => std::env::current_dir().context("resolve current directory")?,
        };
        let home_dir = match std::env::var_os(HOME_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => std::env::var_os("HOME")
                .map(|home| PathBuf::from(home).join(HOME_DIR_NAME))
                .ok_or_else(|| anyhow!("cannot resolve home directory: set {HOME_ENV} or HOME"))?,
        };
        Ok(Self::new(app_dir, home_dir))
    }

    /// Apply config-level overrides (currently the sites directory).
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        if let Some(sites_dir) = &config.sites_directory {
            self.sites_dir = if sites_dir.is_absolute() {
                sites_dir.clone()
            } else {
                self.home_dir.join(sites_dir)
            };
        }
        self
    }

    pub fn env_template(&self) -> PathBuf {
        self.run_templates_dir().join(".env")
    }

    pub fn compose_template(&self) -> PathBuf {
        self.run_templates_dir().join("docker-compose.yml")
    }

    /// Custom vhost template; the built-in one is used when absent.
    pub fn nginx_site_template(&self) -> PathBuf {
        self.app_dir.join("templates").join("nginx").join("site.conf")
    }

    pub fn config_source(&self) -> PathBuf {
        self.app_dir.join("config")
    }

    pub fn nginx_default_site_source(&self) -> PathBuf {
        self.app_dir.join("nginx-default-site")
    }

    fn run_templates_dir(&self) -> PathBuf {
        self.app_dir.join("templates").join("run")
    }
}

/// Orchestrator configuration (TOML).
///
/// Missing fields default to the stock stack layout.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Compose project name; also the prefix of runtime container names.
    pub project_name: String,

    /// Container used for the stack liveness probe.
    pub default_php_container: String,

    /// Container the `mysqladmin ping` probe runs in.
    pub mysql_probe_container: String,

    pub compose_program: String,
    pub docker_program: String,
    pub openssl_program: String,

    /// Top-level domain appended to site directory names.
    pub site_tld: String,

    /// Sites directory, relative to the home directory unless absolute.
    pub sites_directory: Option<PathBuf>,

    /// Per-subprocess timeout. Unset means wait indefinitely.
    pub command_timeout_secs: Option<u64>,

    /// Extra variables substituted into the compose template.
    pub compose: BTreeMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_name: "pilothouse".to_string(),
            default_php_container: "php70".to_string(),
            mysql_probe_container: "php70".to_string(),
            compose_program: "docker-compose".to_string(),
            docker_program: "docker".to_string(),
            openssl_program: "openssl".to_string(),
            site_tld: "test".to_string(),
            sites_directory: None,
            command_timeout_secs: None,
            compose: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("project_name", &self.project_name),
            ("default_php_container", &self.default_php_container),
            ("mysql_probe_container", &self.mysql_probe_container),
            ("compose_program", &self.compose_program),
            ("docker_program", &self.docker_program),
            ("openssl_program", &self.openssl_program),
            ("site_tld", &self.site_tld),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(anyhow!("{name} must be non-empty"));
            }
        }
        if !self
            .project_name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
        {
            return Err(anyhow!(
                "project_name must contain only lowercase letters, digits, '-' or '_'"
            ));
        }
        if self.command_timeout_secs == Some(0) {
            return Err(anyhow!("command_timeout_secs must be > 0 when set"));
        }
        Ok(())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AppConfig::default()`.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        let cfg = AppConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AppConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Resolve paths from the environment, load the config they point at, and
/// apply its path overrides.
pub fn load_environment(app_dir: Option<PathBuf>) -> Result<(Paths, AppConfig)> {
    let paths = Paths::from_env(app_dir)?;
    let config = load_config(&paths.config_file)?;
    let paths = paths.with_config(&config);
    Ok((paths, config))
}
