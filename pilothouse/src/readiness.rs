//! Stack readiness checks for `pilothouse up` and commands that need a
//! running stack.
//!
//! Probes run a shell command inside a service container and compare the
//! trimmed output against an exact literal. Anything else, including spawn
//! failures and non-zero exits, counts as "not ready".

use std::fmt;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, instrument, warn};

use crate::core::wait::{MysqlPoll, POLL_INTERVAL, PollAction};
use crate::io::compose::Compose;
use crate::io::console::Reporter;
use crate::io::process::CommandExecutor;

/// Output the liveness probe must produce.
pub const RUNNING_LITERAL: &str = "Running";
const LIVENESS_SCRIPT: &str = "echo \"Running\"";

/// Output `mysqladmin ping` produces once the server accepts connections.
pub const MYSQL_ALIVE_LITERAL: &str = "mysqld is alive";
const MYSQL_PING_SCRIPT: &str =
    "mysqladmin ping --no-beep --host=mysql --user=root --password=root";

pub const WAITING_NOTICE: &str = "Waiting for MySQL...";
pub const READY_NOTICE: &str = "MySQL is ready.";

/// The stack was required but the liveness probe failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemNotRunningError;

impl fmt::Display for SystemNotRunningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pilothouse is not running. Please run `pilothouse up` first.")
    }
}

impl std::error::Error for SystemNotRunningError {}

/// MySQL never answered the ping within the poll budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlTimeoutError {
    pub attempts: u32,
}

impl fmt::Display for MysqlTimeoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error: MySQL could not be started.")
    }
}

impl std::error::Error for MysqlTimeoutError {}

/// Blocking delay between probes.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Summary of a successful [`wait_for_mysql`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MysqlReady {
    /// Probes issued, including the successful one.
    pub attempts: u32,
}

/// Run `script` in `container` and report whether trimmed stdout equals `expected`.
fn probe<E: CommandExecutor>(
    compose: &Compose<'_, E>,
    container: &str,
    script: &str,
    expected: &str,
) -> bool {
    match compose.exec_capture(container, script) {
        Ok(result) => {
            debug!(container, exit_code = ?result.code, output = %result.stdout, "probe finished");
            result.stdout == expected
        }
        Err(err) => {
            debug!(container, err = %format!("{err:#}"), "probe could not run");
            false
        }
    }
}

/// Whether the stack is up, judged by the default PHP container.
///
/// Single-shot; never blocks beyond the probe itself.
pub fn is_system_up<E: CommandExecutor>(compose: &Compose<'_, E>) -> bool {
    let container = compose.config().default_php_container.clone();
    probe(compose, &container, LIVENESS_SCRIPT, RUNNING_LITERAL)
}

/// Fail with [`SystemNotRunningError`] unless [`is_system_up`].
pub fn require_system_up<E: CommandExecutor>(compose: &Compose<'_, E>) -> Result<()> {
    if is_system_up(compose) {
        return Ok(());
    }
    warn!("stack is not running");
    Err(SystemNotRunningError.into())
}

/// Block until MySQL answers a ping, probing once per second.
///
/// Gives up with [`MysqlTimeoutError`] after 31 probes. Progress notices are
/// only shown when the wait lasts beyond the first four probes.
#[instrument(skip_all)]
pub fn wait_for_mysql<E, S, R>(
    compose: &Compose<'_, E>,
    sleeper: &S,
    reporter: &R,
) -> Result<MysqlReady>
where
    E: CommandExecutor,
    S: Sleeper,
    R: Reporter,
{
    let container = compose.config().mysql_probe_container.clone();
    let mut poll = MysqlPoll::new();

    loop {
        let alive = probe(compose, &container, MYSQL_PING_SCRIPT, MYSQL_ALIVE_LITERAL);
        match poll.observe(alive) {
            PollAction::Ready { announce_ready } => {
                if announce_ready {
                    reporter.info(READY_NOTICE);
                }
                info!(attempts = poll.attempts(), "mysql ready");
                return Ok(MysqlReady {
                    attempts: poll.attempts(),
                });
            }
            PollAction::Retry { announce_waiting } => {
                if announce_waiting {
                    reporter.info(WAITING_NOTICE);
                }
                sleeper.sleep(POLL_INTERVAL);
            }
            PollAction::GiveUp => {
                let err = MysqlTimeoutError {
                    attempts: poll.attempts(),
                };
                warn!(attempts = err.attempts, "mysql did not become ready");
                return Err(err.into());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::{AppConfig, Paths};
    use crate::io::process::{CommandRequest, OutputMode};
    use crate::test_support::{RecordingReporter, RecordingSleeper, ScriptedExecutor, exited, ok};
    use anyhow::anyhow;

    fn fixtures() -> (Paths, AppConfig) {
        (Paths::new("/app", "/home/dev/.pilothouse"), AppConfig::default())
    }

    #[test]
    fn system_up_when_output_matches_exactly() {
        let (paths, config) = fixtures();
        let executor = ScriptedExecutor::always(ok("Running"));
        let compose = Compose::new(&executor, &paths, &config);

        assert!(is_system_up(&compose));
        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].mode, OutputMode::Capture);
        assert_eq!(
            calls[0].args,
            vec![
                "-p",
                "pilothouse",
                "exec",
                "-T",
                "php70",
                "/bin/sh",
                "-c",
                "echo \"Running\""
            ]
        );
    }

    #[test]
    fn system_down_for_any_other_output() {
        let (paths, config) = fixtures();
        for output in ["", "running", "Running!", "Not Running", "ERROR: No container found"] {
            let executor = ScriptedExecutor::always(ok(output));
            let compose = Compose::new(&executor, &paths, &config);
            assert!(!is_system_up(&compose), "output {output:?} must not count as up");
        }
    }

    #[test]
    fn system_down_when_exec_cannot_spawn() {
        let (paths, config) = fixtures();
        let executor =
            ScriptedExecutor::with(|_: &CommandRequest| Err(anyhow!("docker-compose not found")));
        let compose = Compose::new(&executor, &paths, &config);
        assert!(!is_system_up(&compose));
    }

    #[test]
    fn system_down_on_non_zero_exit() {
        let (paths, config) = fixtures();
        let executor = ScriptedExecutor::always(exited(1, ""));
        let compose = Compose::new(&executor, &paths, &config);
        assert!(!is_system_up(&compose));
    }

    #[test]
    fn require_system_up_returns_typed_error() {
        let (paths, config) = fixtures();
        let executor = ScriptedExecutor::always(ok(""));
        let compose = Compose::new(&executor, &paths, &config);

        let err = require_system_up(&compose).unwrap_err();
        assert!(err.downcast_ref::<SystemNotRunningError>().is_some());
        assert_eq!(executor.calls().len(), 1);
    }

    #[test]
    fn require_system_up_passes_when_running() {
        let (paths, config) = fixtures();
        let executor = ScriptedExecutor::always(ok("Running"));
        let compose = Compose::new(&executor, &paths, &config);
        require_system_up(&compose).expect("running");
    }

    #[test]
    fn mysql_ready_immediately_is_silent() {
        let (paths, config) = fixtures();
        let executor = ScriptedExecutor::always(ok(MYSQL_ALIVE_LITERAL));
        let compose = Compose::new(&executor, &paths, &config);
        let sleeper = RecordingSleeper::default();
        let reporter = RecordingReporter::default();

        let ready = wait_for_mysql(&compose, &sleeper, &reporter).expect("ready");

        assert_eq!(ready.attempts, 1);
        assert!(reporter.lines().is_empty());
        assert_eq!(sleeper.total(), Duration::ZERO);
        assert!(executor.calls()[0].args.iter().any(|a| a.starts_with("mysqladmin ping")));
    }

    #[test]
    fn mysql_ready_on_sixth_attempt_reports_once_each() {
        let (paths, config) = fixtures();
        let mut responses = vec![ok("mysqladmin: connect to server failed"); 5];
        responses.push(ok(MYSQL_ALIVE_LITERAL));
        let executor = ScriptedExecutor::new(responses);
        let compose = Compose::new(&executor, &paths, &config);
        let sleeper = RecordingSleeper::default();
        let reporter = RecordingReporter::default();

        let ready = wait_for_mysql(&compose, &sleeper, &reporter).expect("ready");

        assert_eq!(ready.attempts, 6);
        assert_eq!(reporter.lines(), vec![WAITING_NOTICE, READY_NOTICE]);
        assert_eq!(sleeper.total(), Duration::from_millis(5000));
        assert_eq!(executor.calls().len(), 6);
    }

    #[test]
    fn mysql_ready_on_fourth_attempt_is_silent() {
        let (paths, config) = fixtures();
        let mut responses = vec![ok(""); 3];
        responses.push(ok(MYSQL_ALIVE_LITERAL));
        let executor = ScriptedExecutor::new(responses);
        let compose = Compose::new(&executor, &paths, &config);
        let sleeper = RecordingSleeper::default();
        let reporter = RecordingReporter::default();

        wait_for_mysql(&compose, &sleeper, &reporter).expect("ready");

        assert!(reporter.lines().is_empty());
        assert_eq!(sleeper.total(), Duration::from_millis(3000));
    }

    #[test]
    fn mysql_timeout_after_thirty_one_probes() {
        let (paths, config) = fixtures();
        let executor = ScriptedExecutor::always(exited(1, ""));
        let compose = Compose::new(&executor, &paths, &config);
        let sleeper = RecordingSleeper::default();
        let reporter = RecordingReporter::default();

        let err = wait_for_mysql(&compose, &sleeper, &reporter).unwrap_err();

        let timeout = err
            .downcast_ref::<MysqlTimeoutError>()
            .expect("timeout error");
        assert_eq!(timeout.attempts, 31);
        assert_eq!(executor.calls().len(), 31);
        assert_eq!(sleeper.total(), Duration::from_millis(30_000));
        assert_eq!(reporter.lines(), vec![WAITING_NOTICE]);
    }

    #[test]
    fn mysql_probe_uses_configured_container() {
        let (paths, mut config) = fixtures();
        config.mysql_probe_container = "php72".to_string();
        let executor = ScriptedExecutor::always(ok(MYSQL_ALIVE_LITERAL));
        let compose = Compose::new(&executor, &paths, &config);

        wait_for_mysql(&compose, &RecordingSleeper::default(), &RecordingReporter::default())
            .expect("ready");

        assert_eq!(executor.calls()[0].args[4], "php72");
    }
}
