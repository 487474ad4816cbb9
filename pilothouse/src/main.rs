//! Local development stack orchestrator.
//!
//! Regenerates `~/.pilothouse/run/` from templates and the sites directory,
//! drives docker-compose, and waits for the stack to converge.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};

use pilothouse::dns::{generate_local_site_internal_hosts, report_propagation};
use pilothouse::exit_codes;
use pilothouse::io::compose::{Compose, ComposeInvocation};
use pilothouse::io::config::{AppConfig, Paths, load_environment};
use pilothouse::io::console::{ConsoleReporter, Reporter, grey, red};
use pilothouse::io::process::{OutputMode, SystemExecutor};
use pilothouse::io::sites::{DirectorySiteRegistry, SiteRegistry};
use pilothouse::logging;
use pilothouse::readiness::{
    MysqlTimeoutError, SystemNotRunningError, ThreadSleeper, require_system_up, wait_for_mysql,
};
use pilothouse::run_files::{COMPOSE_FILE, build_run_files};

#[derive(Parser)]
#[command(
    name = "pilothouse",
    version,
    about = "Local development stack orchestrator around docker-compose"
)]
struct Cli {
    /// Directory holding templates, `config/` and `nginx-default-site/`.
    #[arg(long, global = true)]
    app_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Regenerate run files, start the stack, and wait for it to converge.
    Up,
    /// Stop and remove the stack's containers.
    Down,
    /// `down` followed by `up`.
    Restart,
    /// Exit 0 if the stack is running, 1 otherwise.
    Status,
    /// Regenerate the run directory without touching containers.
    Build,
    /// Block until MySQL accepts connections.
    WaitMysql,
    /// Point site hostnames at Nginx inside the PHP containers.
    Hosts,
    /// List configured site hostnames.
    Sites,
}

/// Immutable per-invocation state shared by every command.
struct App {
    paths: Paths,
    config: AppConfig,
    executor: SystemExecutor,
    sites: DirectorySiteRegistry,
    reporter: ConsoleReporter,
}

impl App {
    fn load(app_dir: Option<PathBuf>) -> Result<Self> {
        let (paths, config) = load_environment(app_dir)?;
        let sites = DirectorySiteRegistry::new(&paths.sites_dir, &config.site_tld);
        Ok(Self {
            paths,
            config,
            executor: SystemExecutor,
            sites,
            reporter: ConsoleReporter,
        })
    }

    fn compose(&self) -> Compose<'_, SystemExecutor> {
        Compose::new(&self.executor, &self.paths, &self.config)
    }
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        let failure = describe_failure(&err);
        match &failure.stream {
            Stream::Stdout => println!("{}", failure.message),
            Stream::Stderr => eprintln!("{}", failure.message),
        }
        std::process::exit(failure.exit_code);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// How a failed command is presented to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Failure {
    stream: Stream,
    message: String,
    exit_code: i32,
}

fn describe_failure(err: &anyhow::Error) -> Failure {
    let (stream, message) = if err.downcast_ref::<SystemNotRunningError>().is_some() {
        let message = format!(
            "{}{}{}",
            red("Pilothouse is not running. Please run "),
            grey("pilothouse up"),
            red(" first.")
        );
        (Stream::Stdout, message)
    } else if let Some(timeout) = err.downcast_ref::<MysqlTimeoutError>() {
        (Stream::Stderr, timeout.to_string())
    } else {
        (Stream::Stderr, format!("{err:#}"))
    };
    Failure {
        stream,
        message,
        exit_code: exit_codes::FAILURE,
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let app = App::load(cli.app_dir)?;
    match cli.command {
        Command::Up => cmd_up(&app),
        Command::Down => cmd_down(&app),
        Command::Restart => {
            cmd_down(&app)?;
            cmd_up(&app)
        }
        Command::Status => cmd_status(&app),
        Command::Build => cmd_build(&app),
        Command::WaitMysql => {
            require_system_up(&app.compose())?;
            wait_for_mysql(&app.compose(), &ThreadSleeper, &app.reporter)?;
            Ok(())
        }
        Command::Hosts => {
            require_system_up(&app.compose())?;
            cmd_hosts(&app)
        }
        Command::Sites => cmd_sites(&app),
    }
}

fn cmd_up(app: &App) -> Result<()> {
    build_run_files(&app.paths, &app.config, &app.executor, &app.sites)?;

    let compose = app.compose();
    let started = compose.run(&ComposeInvocation::new(["up", "-d"], OutputMode::Stream))?;
    if !started.success() {
        bail!("docker-compose up failed with status {:?}", started.code);
    }

    wait_for_mysql(&compose, &ThreadSleeper, &app.reporter)?;
    cmd_hosts(app)?;
    app.reporter.info("Pilothouse is running.");
    Ok(())
}

fn cmd_down(app: &App) -> Result<()> {
    if !app.paths.run_dir.join(COMPOSE_FILE).is_file() {
        app.reporter.info("Pilothouse has not been started; nothing to stop.");
        return Ok(());
    }
    let stopped = app
        .compose()
        .run(&ComposeInvocation::new(["down"], OutputMode::Stream))?;
    if !stopped.success() {
        bail!("docker-compose down failed with status {:?}", stopped.code);
    }
    Ok(())
}

fn cmd_status(app: &App) -> Result<()> {
    require_system_up(&app.compose())?;
    app.reporter.info("Pilothouse is running.");
    Ok(())
}

fn cmd_build(app: &App) -> Result<()> {
    let report = build_run_files(&app.paths, &app.config, &app.executor, &app.sites)?;
    app.reporter.info(&format!(
        "Generated {} for {} site(s).",
        app.paths.run_dir.display(),
        report.hosts.len()
    ));
    Ok(())
}

fn cmd_hosts(app: &App) -> Result<()> {
    let report = generate_local_site_internal_hosts(&app.compose(), &app.sites)?;
    report_propagation(&report, &app.reporter);
    Ok(())
}

fn cmd_sites(app: &App) -> Result<()> {
    for host in app.sites.hosts()? {
        println!("{host}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_up() {
        let cli = Cli::parse_from(["pilothouse", "up"]);
        assert!(matches!(cli.command, Command::Up));
        assert!(cli.app_dir.is_none());
    }

    #[test]
    fn parse_global_app_dir_after_subcommand() {
        let cli = Cli::parse_from(["pilothouse", "status", "--app-dir", "/opt/pilothouse"]);
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.app_dir, Some(PathBuf::from("/opt/pilothouse")));
    }

    #[test]
    fn parse_wait_mysql_kebab_case() {
        let cli = Cli::parse_from(["pilothouse", "wait-mysql"]);
        assert!(matches!(cli.command, Command::WaitMysql));
    }

    #[test]
    fn mysql_timeout_prints_its_message_and_fails() {
        let err = anyhow::Error::new(MysqlTimeoutError { attempts: 31 }).context("wait for mysql");

        let failure = describe_failure(&err);

        assert_eq!(failure.stream, Stream::Stderr);
        assert_eq!(failure.message, "Error: MySQL could not be started.");
        assert_eq!(failure.exit_code, exit_codes::FAILURE);
    }

    #[test]
    fn stack_down_is_reported_on_stdout() {
        let failure = describe_failure(&anyhow::Error::new(SystemNotRunningError));

        assert_eq!(failure.stream, Stream::Stdout);
        assert!(failure.message.contains("pilothouse up"));
        assert_eq!(failure.exit_code, exit_codes::FAILURE);
    }

    #[test]
    fn other_errors_keep_their_context_chain() {
        let err = anyhow::anyhow!("no such file").context("read config.toml");

        let failure = describe_failure(&err);

        assert_eq!(failure.stream, Stream::Stderr);
        assert_eq!(failure.message, "read config.toml: no such file");
        assert_eq!(failure.exit_code, exit_codes::FAILURE);
    }
}
