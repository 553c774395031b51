//! Helm adapter for release install, upgrade and removal.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{KdeployError, Result, ToolError};

use super::process::CommandSpec;
use super::{ReleaseInfo, ReleaseManager, ReleaseOptions, UninstallOptions};

/// Tool name used in errors.
const TOOL: &str = "helm";

/// Chart value toggling TLS on the application ingress.
const TLS_VALUE: &str = "global.tls.enabled";

/// Chart value toggling the bundled external-DNS controller.
const EXTERNAL_DNS_VALUE: &str = "externalDns.enabled";

/// Chart value carrying the public domain.
const DOMAIN_VALUE: &str = "global.domain";

/// Timeout for read-only release queries.
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for `helm version`.
const VERSION_TIMEOUT: Duration = Duration::from_secs(15);

/// Helm CLI adapter.
#[derive(Debug, Clone)]
pub struct HelmCli {
    /// Helm binary.
    binary: String,
}

/// One entry of `helm list -o json`.
#[derive(Debug, Deserialize)]
struct ListedRelease {
    name: String,
    #[serde(default)]
    chart: String,
    #[serde(default)]
    app_version: String,
}

impl HelmCli {
    /// Creates a new Helm adapter.
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Builds the shared arguments of `upgrade` invocations.
    fn release_args(release: &str, opts: &ReleaseOptions) -> Vec<String> {
        let mut args = vec![
            String::from("upgrade"),
            release.to_string(),
            opts.chart.clone(),
            String::from("--namespace"),
            opts.namespace.clone(),
        ];

        if let Some(version) = &opts.chart_version {
            args.push(String::from("--version"));
            args.push(version.clone());
        }
        for file in &opts.values_files {
            args.push(String::from("--values"));
            args.push(file.display().to_string());
        }

        args.push(String::from("--set"));
        args.push(format!("{TLS_VALUE}={}", opts.tls_enabled));
        args.push(String::from("--set"));
        args.push(format!("{EXTERNAL_DNS_VALUE}={}", opts.external_dns));
        args.push(String::from("--set-string"));
        args.push(format!("{DOMAIN_VALUE}={}", opts.domain));

        if opts.wait {
            args.push(String::from("--wait"));
            args.push(String::from("--timeout"));
            args.push(format!("{}s", opts.timeout.as_secs()));
        }

        args
    }
}

#[async_trait]
impl ReleaseManager for HelmCli {
    async fn is_available(&self) -> bool {
        CommandSpec::new(TOOL, &self.binary)
            .args(["version", "--short"])
            .timeout(VERSION_TIMEOUT)
            .succeeds()
            .await
    }

    async fn install_or_upgrade(&self, release: &str, opts: &ReleaseOptions) -> Result<()> {
        info!(
            "Installing release {release} into {} (tls: {})",
            opts.namespace, opts.tls_enabled
        );
        CommandSpec::new(TOOL, &self.binary)
            .args(Self::release_args(release, opts))
            .args(["--install", "--create-namespace"])
            .run()
            .await?;
        Ok(())
    }

    async fn upgrade(&self, release: &str, opts: &ReleaseOptions) -> Result<()> {
        info!(
            "Upgrading release {release} in {} (tls: {})",
            opts.namespace, opts.tls_enabled
        );
        CommandSpec::new(TOOL, &self.binary)
            .args(Self::release_args(release, opts))
            .arg("--reuse-values")
            .run()
            .await?;
        Ok(())
    }

    async fn uninstall(&self, release: &str, namespace: &str, opts: &UninstallOptions) -> Result<()> {
        info!("Uninstalling release {release} from {namespace}");
        let mut command = CommandSpec::new(TOOL, &self.binary)
            .args(["uninstall", release, "--namespace", namespace])
            .timeout(opts.timeout + QUERY_TIMEOUT);
        if opts.wait {
            command = command
                .arg("--wait")
                .args(["--timeout", &format!("{}s", opts.timeout.as_secs())]);
        }
        command.run().await?;
        Ok(())
    }

    async fn get_installed_version(
        &self,
        release: &str,
        namespace: &str,
    ) -> Result<Option<ReleaseInfo>> {
        let output = CommandSpec::new(TOOL, &self.binary)
            .args(["list", "--namespace", namespace, "--output", "json", "--filter"])
            .arg(release_filter(release))
            .timeout(QUERY_TIMEOUT)
            .run()
            .await?;

        let info = parse_release_list(&output.stdout, release)?;
        debug!("Release {release} in {namespace}: {info:?}");
        Ok(info)
    }
}

/// Builds an anchored `--filter` regex matching only this release name.
fn release_filter(release: &str) -> String {
    let mut filter = String::with_capacity(release.len() + 2);
    filter.push('^');
    for c in release.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            filter.push('\\');
        }
        filter.push(c);
    }
    filter.push('$');
    filter
}

/// Parses `helm list -o json` output and picks the named release.
fn parse_release_list(stdout: &str, release: &str) -> Result<Option<ReleaseInfo>> {
    if stdout.trim().is_empty() {
        return Ok(None);
    }

    let releases: Vec<ListedRelease> = serde_json::from_str(stdout).map_err(|e| {
        KdeployError::Tool(ToolError::InvalidOutput {
            tool: TOOL.to_string(),
            message: format!("cannot parse release list: {e}"),
        })
    })?;

    Ok(releases
        .into_iter()
        .find(|r| r.name == release)
        .map(|r| ReleaseInfo {
            chart_version: chart_version(&r.chart),
            app_version: (!r.app_version.is_empty()).then_some(r.app_version),
        }))
}

/// Extracts the version suffix from a `<chart>-<version>` string.
fn chart_version(chart: &str) -> Option<String> {
    chart
        .char_indices()
        .find(|&(i, c)| {
            c == '-'
                && chart[i + 1..]
                    .chars()
                    .next()
                    .is_some_and(|n| n.is_ascii_digit())
        })
        .map(|(i, _)| chart[i + 1..].to_string())
}
