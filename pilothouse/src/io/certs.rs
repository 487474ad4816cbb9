//! Self-signed HTTPS certificate covering every local site.
//!
//! The key pair is produced by `openssl`; this module only writes the request
//! config and drives the command.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use super::config::{AppConfig, Paths};
use super::process::{CommandExecutor, CommandRequest, OutputMode};

/// Directory, relative to the run directory, holding the certificate.
pub const HTTPS_DIR: &str = "https";
pub const CERTIFICATE_FILE: &str = "pilothouse.crt";
pub const KEY_FILE: &str = "pilothouse.key";
const REQUEST_CONFIG_FILE: &str = "openssl.cnf";
const VALIDITY_DAYS: &str = "825";

/// Render the `openssl req` config with one DNS SAN per host, plus `localhost`.
pub fn render_request_config(hosts: &[String]) -> String {
    let mut buf = String::from(
        "[req]\n\
         distinguished_name = req_distinguished_name\n\
         x509_extensions = v3_req\n\
         prompt = no\n\
         \n\
         [req_distinguished_name]\n\
         CN = Pilothouse\n\
         \n\
         [v3_req]\n\
         keyUsage = critical, digitalSignature, keyEncipherment\n\
         extendedKeyUsage = serverAuth\n\
         subjectAltName = @alt_names\n\
         \n\
         [alt_names]\n\
         DNS.1 = localhost\n",
    );
    for (index, host) in hosts.iter().enumerate() {
        buf.push_str(&format!("DNS.{} = {host}\n", index + 2));
    }
    buf
}

/// Regenerate the certificate and key under `<run>/https/`.
///
/// Returns the certificate path.
#[instrument(skip_all, fields(hosts = hosts.len()))]
pub fn regenerate_https_certificate<E: CommandExecutor>(
    executor: &E,
    paths: &Paths,
    config: &AppConfig,
    hosts: &[String],
) -> Result<PathBuf> {
    let dir = paths.run_dir.join(HTTPS_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let request_config = dir.join(REQUEST_CONFIG_FILE);
    fs::write(&request_config, render_request_config(hosts))
        .with_context(|| format!("write {}", request_config.display()))?;

    let request = CommandRequest {
        directory: dir.clone(),
        program: config.openssl_program.clone(),
        args: [
            "req",
            "-x509",
            "-nodes",
            "-newkey",
            "rsa:2048",
            "-sha256",
            "-days",
            VALIDITY_DAYS,
            "-keyout",
            KEY_FILE,
            "-out",
            CERTIFICATE_FILE,
            "-config",
            REQUEST_CONFIG_FILE,
        ]
        .iter()
        .map(|arg| (*arg).to_string())
        .collect(),
        mode: OutputMode::Capture,
        timeout: config.command_timeout(),
    };
    let result = executor
        .run(&request)
        .context("run openssl to generate certificate")?;
    if !result.success() {
        bail!(
            "certificate generation failed with status {:?}",
            result.code
        );
    }

    let certificate = dir.join(CERTIFICATE_FILE);
    info!(path = %certificate.display(), "regenerated https certificate");
    Ok(certificate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedExecutor, exited, ok};

    #[test]
    fn request_config_lists_every_host() {
        let config = render_request_config(&["a.test".to_string(), "b.test".to_string()]);
        assert!(config.contains("DNS.1 = localhost\nDNS.2 = a.test\nDNS.3 = b.test\n"));
    }

    #[test]
    fn runs_openssl_in_https_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = Paths::new(temp.path().join("app"), temp.path().join("home"));
        let executor = ScriptedExecutor::always(ok(""));

        let cert = regenerate_https_certificate(
            &executor,
            &paths,
            &AppConfig::default(),
            &["a.test".to_string()],
        )
        .expect("certificate");

        let dir = paths.run_dir.join(HTTPS_DIR);
        assert_eq!(cert, dir.join(CERTIFICATE_FILE));
        assert!(dir.join(REQUEST_CONFIG_FILE).is_file());
        let calls = executor.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "openssl");
        assert_eq!(calls[0].directory, dir);
        assert_eq!(calls[0].args[0], "req");
    }

    #[test]
    fn openssl_failure_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = Paths::new(temp.path().join("app"), temp.path().join("home"));
        let executor = ScriptedExecutor::always(exited(1, ""));

        let err = regenerate_https_certificate(&executor, &paths, &AppConfig::default(), &[])
            .unwrap_err();
        assert!(err.to_string().contains("certificate generation failed"));
    }
}
