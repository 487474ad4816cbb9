//! Local development stack orchestrator around docker-compose.
//!
//! Generates the run directory (compose file, certificates, hosts entries,
//! Nginx vhosts) from templates and the site registry, then drives the
//! container runtime and checks that the stack converged.
//!
//! - **[`core`]**: Pure, deterministic logic (template population, hosts
//!   rendering, the MySQL poll state machine). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem, subprocesses, console).
//!   Subprocesses go through [`io::process::CommandExecutor`] so tests never
//!   spawn docker.
//!
//! Orchestration modules ([`run_files`], [`readiness`], [`dns`]) combine the two
//! to implement CLI commands. None of them exit the process; typed errors are
//! returned and the binary decides.

pub mod core;
pub mod dns;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod readiness;
pub mod run_files;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
