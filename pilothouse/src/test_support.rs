//! Test-only helpers: scripted executors, simulated time and a temp app layout.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::io::config::Paths;
use crate::io::console::Reporter;
use crate::io::process::{CommandExecutor, CommandRequest, CommandResult};
use crate::io::sites::{Site, SiteRegistry};
use crate::readiness::Sleeper;

/// Successful capture result with the given (already trimmed) stdout.
pub fn ok(stdout: &str) -> CommandResult {
    exited(0, stdout)
}

/// Finished process with an explicit exit code.
pub fn exited(code: i32, stdout: &str) -> CommandResult {
    CommandResult {
        code: Some(code),
        stdout: stdout.to_string(),
        timed_out: false,
    }
}

type Responder = Box<dyn Fn(&CommandRequest) -> Result<CommandResult>>;

enum Script {
    Queue(RefCell<VecDeque<CommandResult>>),
    Always(CommandResult),
    Respond(Responder),
}

/// Executor returning scripted results and recording every request.
pub struct ScriptedExecutor {
    script: Script,
    calls: RefCell<Vec<CommandRequest>>,
}

impl ScriptedExecutor {
    /// Return `results` in order; error once exhausted.
    pub fn new(results: Vec<CommandResult>) -> Self {
        Self::from_script(Script::Queue(RefCell::new(results.into())))
    }

    /// Return `result` for every request.
    pub fn always(result: CommandResult) -> Self {
        Self::from_script(Script::Always(result))
    }

    /// Compute each result from the request.
    pub fn with<F>(respond: F) -> Self
    where
        F: Fn(&CommandRequest) -> Result<CommandResult> + 'static,
    {
        Self::from_script(Script::Respond(Box::new(respond)))
    }

    fn from_script(script: Script) -> Self {
        Self {
            script,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CommandRequest> {
        self.calls.borrow().clone()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn run(&self, request: &CommandRequest) -> Result<CommandResult> {
        self.calls.borrow_mut().push(request.clone());
        match &self.script {
            Script::Queue(queue) => queue
                .borrow_mut()
                .pop_front()
                .ok_or_else(|| anyhow!("scripted executor exhausted at {}", request.display_line())),
            Script::Always(result) => Ok(result.clone()),
            Script::Respond(respond) => respond(request),
        }
    }
}

/// Sleeper that only accumulates the requested time.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    total: Cell<Duration>,
    calls: Cell<u32>,
}

impl RecordingSleeper {
    pub fn total(&self) -> Duration {
        self.total.get()
    }

    pub fn calls(&self) -> u32 {
        self.calls.get()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.total.set(self.total.get() + duration);
        self.calls.set(self.calls.get() + 1);
    }
}

/// Reporter capturing lines instead of printing them.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    lines: RefCell<Vec<String>>,
}

impl RecordingReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines.borrow().clone()
    }
}

impl Reporter for RecordingReporter {
    fn info(&self, message: &str) {
        self.lines.borrow_mut().push(message.to_string());
    }

    fn error(&self, message: &str) {
        self.lines.borrow_mut().push(message.to_string());
    }
}

/// In-memory site registry; names map to `<name>.test`.
#[derive(Debug, Clone)]
pub struct StaticSites {
    sites: Vec<Site>,
}

impl StaticSites {
    pub fn new(names: &[&str]) -> Self {
        Self {
            sites: names
                .iter()
                .map(|name| Site {
                    name: (*name).to_string(),
                    host: format!("{name}.test"),
                })
                .collect(),
        }
    }
}

impl SiteRegistry for StaticSites {
    fn sites(&self) -> Result<Vec<Site>> {
        Ok(self.sites.clone())
    }
}

/// Compose template used by [`TestLayout`].
pub const COMPOSE_TEMPLATE: &str = "\
version: '3'
services:
  mysql:
    image: mysql:5.7
    ports:
      - \"{{mysql_port}}:3306\"
  nginx:
    image: nginx:stable
    volumes:
      - {{sites_directory}}:/var/www/html
      - {{run_directory}}/nginx-sites:/etc/nginx/conf.d/sites
  {{default_php_container}}:
    image: pilothouse/{{default_php_container}}
    labels:
      untouched: \"{{not_a_variable}}\"
";

/// Temporary app + home directory with the files a build expects.
pub struct TestLayout {
    _temp: TempDir,
    pub paths: Paths,
}

impl TestLayout {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        let paths = Paths::new(temp.path().join("app"), temp.path().join("home"));

        write(&paths.env_template(), "MYSQL_ROOT_PASSWORD=root\n")?;
        write(&paths.compose_template(), COMPOSE_TEMPLATE)?;
        write(
            &paths.config_source().join("php").join("php.ini"),
            "memory_limit = 256M\n",
        )?;
        write(
            &paths.config_source().join("nginx").join("nginx.conf"),
            "worker_processes auto;\n",
        )?;
        write(
            &paths.nginx_default_site_source().join("index.html"),
            "<h1>Pilothouse</h1>\n",
        )?;
        fs::create_dir_all(&paths.home_dir).context("create home dir")?;

        Ok(Self { _temp: temp, paths })
    }

    /// Create a site directory under the sites directory.
    pub fn add_site(&self, name: &str) -> Result<()> {
        fs::create_dir_all(self.paths.sites_dir.join(name)).context("create site dir")
    }
}

fn write(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}
