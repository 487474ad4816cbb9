//! Internal DNS for local sites inside the PHP runtime containers.
//!
//! Sites resolve to `127.0.0.1` on the host, which is wrong from inside a
//! container. This points every site hostname at the Nginx container's
//! network address in each PHP container's `/etc/hosts`.

use anyhow::Result;
use tracing::{error, info, instrument, warn};

use crate::core::hosts::{hosts_append_script, render_host_block};
use crate::io::compose::Compose;
use crate::io::console::Reporter;
use crate::io::process::CommandExecutor;
use crate::io::sites::SiteRegistry;

/// Compose service fronting every site.
pub const NGINX_CONTAINER: &str = "nginx";

/// PHP runtime versions shipped with the stack.
pub const PHP_VERSIONS: [&str; 4] = ["php56", "php70", "php71", "php72"];
const DEBUG_SUFFIX: &str = "-xdebug";

pub const NGINX_IP_MISSING: &str =
    "Could not get Nginx container internal IP. Skipping adding local site hosts to PHP containers";

/// Every container that receives site host entries: each PHP version
/// followed by its xdebug variant.
pub fn propagation_targets() -> Vec<String> {
    PHP_VERSIONS
        .iter()
        .flat_map(|version| [version.to_string(), format!("{version}{DEBUG_SUFFIX}")])
        .collect()
}

/// Result of updating a single container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerOutcome {
    Applied,
    /// The exec ran but exited unsuccessfully.
    Failed { code: Option<i32> },
    /// The exec could not be run at all.
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerResult {
    pub container: String,
    pub outcome: ContainerOutcome,
}

/// What [`generate_local_site_internal_hosts`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropagationReport {
    /// No sites are configured; nothing was executed.
    NoSites,
    /// The Nginx container address could not be resolved; nothing was executed.
    NoNginxIp,
    /// Every target container was attempted.
    Applied {
        nginx_ip: String,
        results: Vec<ContainerResult>,
    },
}

impl PropagationReport {
    /// Containers whose update did not apply.
    pub fn failures(&self) -> Vec<&ContainerResult> {
        match self {
            Self::Applied { results, .. } => results
                .iter()
                .filter(|result| result.outcome != ContainerOutcome::Applied)
                .collect(),
            Self::NoSites | Self::NoNginxIp => Vec::new(),
        }
    }
}

/// Show the operator what propagation could not do.
pub fn report_propagation<R: Reporter>(report: &PropagationReport, reporter: &R) {
    if *report == PropagationReport::NoNginxIp {
        reporter.error(NGINX_IP_MISSING);
    }
    for failure in report.failures() {
        reporter.error(&format!(
            "Could not update hosts in {}: {:?}",
            failure.container, failure.outcome
        ));
    }
}

/// Append `<nginx-ip> <host>` entries for every site to each PHP container's
/// hosts file and refresh its CA trust store.
///
/// Each container is attempted regardless of earlier failures. Only a failing
/// site listing is returned as an error.
#[instrument(skip_all)]
pub fn generate_local_site_internal_hosts<E, S>(
    compose: &Compose<'_, E>,
    sites: &S,
) -> Result<PropagationReport>
where
    E: CommandExecutor,
    S: SiteRegistry,
{
    let hosts = sites.hosts()?;
    if hosts.is_empty() {
        return Ok(PropagationReport::NoSites);
    }

    let nginx_ip = match compose.container_internal_ip(NGINX_CONTAINER) {
        Ok(ip) => ip,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "nginx address lookup failed");
            String::new()
        }
    };
    if nginx_ip.is_empty() {
        error!("{NGINX_IP_MISSING}");
        return Ok(PropagationReport::NoNginxIp);
    }

    let script = hosts_append_script(&render_host_block(&nginx_ip, &hosts));
    let mut results = Vec::new();
    for container in propagation_targets() {
        let outcome = match compose.exec_stream(&container, &script) {
            Ok(result) if result.success() => ContainerOutcome::Applied,
            Ok(result) => {
                warn!(container = %container, exit_code = ?result.code, "hosts update failed");
                ContainerOutcome::Failed { code: result.code }
            }
            Err(err) => {
                warn!(container = %container, err = %format!("{err:#}"), "hosts update could not run");
                ContainerOutcome::Error(format!("{err:#}"))
            }
        };
        results.push(ContainerResult { container, outcome });
    }

    info!(
        nginx_ip = %nginx_ip,
        hosts = hosts.len(),
        failed = results
            .iter()
            .filter(|r| r.outcome != ContainerOutcome::Applied)
            .count(),
        "propagated site hosts"
    );
    Ok(PropagationReport::Applied { nginx_ip, results })
}
