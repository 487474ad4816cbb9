//! `docker-compose` and `docker` invocations for the run directory.

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use super::config::{AppConfig, Paths};
use super::process::{CommandExecutor, CommandRequest, CommandResult, OutputMode};

/// Format string returning a container's network-assigned IP address.
pub const NETWORK_IP_FORMAT: &str = "{{range .NetworkSettings.Networks}}{{.IPAddress}}{{end}}";

/// A request to the compose CLI, before project flags are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposeInvocation {
    pub args: Vec<String>,
    pub mode: OutputMode,
}

impl ComposeInvocation {
    pub fn new<I, S>(args: I, mode: OutputMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    /// `exec -T <container> /bin/sh -c <script>`.
    ///
    /// TTY allocation is always disabled so execs work without a terminal.
    pub fn exec_shell(container: &str, script: &str, mode: OutputMode) -> Self {
        Self::new(
            ["exec", "-T", container, "/bin/sh", "-c", script],
            mode,
        )
    }
}

/// Compose driver bound to the run directory and project.
pub struct Compose<'a, E: CommandExecutor> {
    executor: &'a E,
    paths: &'a Paths,
    config: &'a AppConfig,
}

impl<'a, E: CommandExecutor> Compose<'a, E> {
    pub fn new(executor: &'a E, paths: &'a Paths, config: &'a AppConfig) -> Self {
        Self {
            executor,
            paths,
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.config
    }

    /// Run `docker-compose -p <project> <args>` in the run directory.
    #[instrument(skip_all, fields(args = ?invocation.args))]
    pub fn run(&self, invocation: &ComposeInvocation) -> Result<CommandResult> {
        let mut args = vec!["-p".to_string(), self.config.project_name.clone()];
        args.extend(invocation.args.iter().cloned());
        let request = self.request(&self.config.compose_program, args, invocation.mode);
        self.executor
            .run(&request)
            .with_context(|| format!("run {}", request.display_line()))
    }

    /// Run a shell script inside `container`, capturing trimmed stdout.
    pub fn exec_capture(&self, container: &str, script: &str) -> Result<CommandResult> {
        self.run(&ComposeInvocation::exec_shell(
            container,
            script,
            OutputMode::Capture,
        ))
    }

    /// Run a shell script inside `container` with output on the console.
    pub fn exec_stream(&self, container: &str, script: &str) -> Result<CommandResult> {
        self.run(&ComposeInvocation::exec_shell(
            container,
            script,
            OutputMode::Stream,
        ))
    }

    /// Run the container runtime CLI directly.
    pub fn docker(&self, args: &[&str], mode: OutputMode) -> Result<CommandResult> {
        let args = args.iter().map(|arg| (*arg).to_string()).collect();
        let request = self.request(&self.config.docker_program, args, mode);
        self.executor
            .run(&request)
            .with_context(|| format!("run {}", request.display_line()))
    }

    /// Full runtime-assigned name of a compose service's container.
    pub fn container_docker_name(&self, container: &str) -> Result<String> {
        let filter = format!("name={}_{}_", self.config.project_name, container);
        let result = self.docker(
            &["ps", "-a", "--format", "{{.Names}}", "--filter", filter.as_str()],
            OutputMode::Capture,
        )?;
        debug!(container, name = %result.stdout, "resolved container name");
        Ok(result.stdout)
    }

    /// Network-assigned IP address of a compose service's container.
    ///
    /// Returns an empty string when the container or its address is unknown.
    pub fn container_internal_ip(&self, container: &str) -> Result<String> {
        let name = self.container_docker_name(container)?;
        if name.is_empty() {
            return Ok(String::new());
        }
        let result = self.docker(
            &["inspect", "--format", NETWORK_IP_FORMAT, name.as_str()],
            OutputMode::Capture,
        )?;
        if !result.success() {
            return Ok(String::new());
        }
        Ok(result.stdout)
    }

    fn request(&self, program: &str, args: Vec<String>, mode: OutputMode) -> CommandRequest {
        CommandRequest {
            directory: self.paths.run_dir.clone(),
            program: program.to_string(),
            args,
            mode,
            timeout: self.config.command_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedExecutor, exited, ok};

    fn fixtures() -> (Paths, AppConfig) {
        (Paths::new("/app", "/home/dev/.pilothouse"), AppConfig::default())
    }

    #[test]
    fn run_prefixes_project_and_uses_run_dir() {
        let (paths, config) = fixtures();
        let executor = ScriptedExecutor::always(ok(""));
        let compose = Compose::new(&executor, &paths, &config);

        compose
            .run(&ComposeInvocation::new(["up", "-d"], OutputMode::Stream))
            .expect("run");

        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "docker-compose");
        assert_eq!(calls[0].args, vec!["-p", "pilothouse", "up", "-d"]);
        assert_eq!(calls[0].directory, paths.run_dir);
        assert_eq!(calls[0].mode, OutputMode::Stream);
    }

    #[test]
    fn exec_shell_disables_tty() {
        let invocation = ComposeInvocation::exec_shell("php70", "echo hi", OutputMode::Capture);
        assert_eq!(
            invocation.args,
            vec!["exec", "-T", "php70", "/bin/sh", "-c", "echo hi"]
        );
        assert_eq!(invocation.mode, OutputMode::Capture);
    }

    #[test]
    fn internal_ip_resolves_name_then_inspects() {
        let (paths, config) = fixtures();
        let executor = ScriptedExecutor::new(vec![ok("pilothouse_nginx_1"), ok("172.18.0.4")]);
        let compose = Compose::new(&executor, &paths, &config);

        let ip = compose.container_internal_ip("nginx").expect("ip");
        assert_eq!(ip, "172.18.0.4");

        let calls = executor.calls();
        assert_eq!(calls[0].program, "docker");
        assert_eq!(
            calls[0].args,
            vec![
                "ps",
                "-a",
                "--format",
                "{{.Names}}",
                "--filter",
                "name=pilothouse_nginx_"
            ]
        );
        assert_eq!(
            calls[1].args,
            vec!["inspect", "--format", NETWORK_IP_FORMAT, "pilothouse_nginx_1"]
        );
    }

    #[test]
    fn internal_ip_empty_when_container_missing() {
        let (paths, config) = fixtures();
        let executor = ScriptedExecutor::new(vec![ok("")]);
        let compose = Compose::new(&executor, &paths, &config);

        assert_eq!(compose.container_internal_ip("nginx").expect("ip"), "");
        assert_eq!(executor.calls().len(), 1);
    }

    #[test]
    fn internal_ip_empty_when_inspect_fails() {
        let (paths, config) = fixtures();
        let executor =
            ScriptedExecutor::new(vec![ok("pilothouse_nginx_1"), exited(1, "Error: No such object")]);
        let compose = Compose::new(&executor, &paths, &config);

        assert_eq!(compose.container_internal_ip("nginx").expect("ip"), "");
    }
}
