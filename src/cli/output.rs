//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::dns::DnsRecord;
use crate::error::KdeployError;
use crate::orchestrator::{CleanupOutcome, DeployOutcome, DeployReport};
use crate::reconciler::{DeploymentScope, DestroyOutcome, DestroyReport, StepStatus};
use crate::state::DeploymentStatus;

use super::commands::OutputFormat;
use super::status::{DeploymentSummary, StatusReport};

/// Output formatter for CLI.
#[derive(Debug, Clone, Copy)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// DNS record row for table display.
#[derive(Tabled)]
struct DnsRecordRow {
    #[tabled(rename = "Hostname")]
    hostname: String,
    #[tabled(rename = "Type")]
    record_type: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Observed")]
    observed: String,
    #[tabled(rename = "Status")]
    status: String,
}

/// Teardown step row for table display.
#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Step")]
    step: String,
    #[tabled(rename = "Result")]
    status: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Deployment row for table display.
#[derive(Tabled)]
struct DeploymentRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "URL")]
    url: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns true if output is JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Formats the result of a deploy run.
    #[must_use]
    pub fn format_deploy(&self, report: &DeployReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_deploy_text(report),
        }
    }

    /// Formats a deploy report as text.
    fn format_deploy_text(report: &DeployReport) -> String {
        let mut output = String::new();

        match &report.outcome {
            DeployOutcome::Complete { tls_enabled } => {
                let tls = if *tls_enabled { "TLS enabled" } else { "TLS disabled" };
                let _ = writeln!(
                    output,
                    "\n{} {} deployed ({tls})",
                    "✓".green(),
                    report.name.bold()
                );
            }
            DeployOutcome::DeployedWithoutTls => {
                let _ = writeln!(
                    output,
                    "\n{} {} deployed without TLS",
                    "⚠".yellow(),
                    report.name.bold()
                );
                let _ = writeln!(
                    output,
                    "   DNS validation was skipped. Once the records below resolve, run \
                     'kdeploy deploy {}' again to enable TLS.",
                    report.name
                );
            }
            DeployOutcome::Failed { error, cleanup } => {
                let _ = writeln!(
                    output,
                    "\n{} Deploy of {} failed: {error}",
                    "✗".red(),
                    report.name.bold()
                );
                let _ = writeln!(output, "   Cleanup: {}", Self::format_cleanup(cleanup));
            }
        }

        if let Some(url) = &report.url {
            let _ = writeln!(output, "   URL: {url}");
        }

        if !report.dns_records.is_empty() {
            output.push('\n');
            output.push_str(&Self::format_records_table(&report.dns_records));
            output.push('\n');
        }

        let phases: Vec<String> = report.phases.iter().map(ToString::to_string).collect();
        let _ = writeln!(output, "\n   Phases: {}", phases.join(" → ").dimmed());

        output
    }

    /// Formats DNS records while waiting for propagation.
    #[must_use]
    pub fn format_dns_progress(&self, records: &[DnsRecord]) -> String {
        let verified = records.iter().filter(|r| r.verified).count();
        let mut output = format!(
            "\nDNS records ({verified}/{} verified). Create these records with your DNS provider:\n",
            records.len()
        );
        output.push_str(&Self::format_records_table(records));
        output.push_str("\nType 'skip' and press Enter to finish without TLS.\n");
        output
    }

    /// Builds the DNS record table.
    fn format_records_table(records: &[DnsRecord]) -> String {
        let rows: Vec<DnsRecordRow> = records
            .iter()
            .map(|r| DnsRecordRow {
                hostname: r.hostname.clone(),
                record_type: r.record_type.to_string(),
                target: r.target.clone(),
                observed: r
                    .resolved
                    .as_ref()
                    .map_or_else(|| String::from("-"), |v| Self::truncate(&v.join(", "), 40)),
                status: if r.verified {
                    "verified".green().to_string()
                } else if r.is_resolved() {
                    "mismatch".yellow().to_string()
                } else {
                    "pending".dimmed().to_string()
                },
            })
            .collect();

        Table::new(rows).to_string()
    }

    /// Formats the live scope shown before a destroy is confirmed.
    #[must_use]
    pub fn format_scope(&self, name: &str, scope: &DeploymentScope) -> String {
        let mark = |present: bool| {
            if present {
                "present".yellow().to_string()
            } else {
                "absent".dimmed().to_string()
            }
        };

        let mut output = format!("\nResources for {}:\n", name.bold());
        let cluster = if scope.cluster_accessible {
            "reachable".green().to_string()
        } else {
            "unreachable".red().to_string()
        };
        let _ = writeln!(output, "   Cluster:        {cluster}");
        let _ = writeln!(output, "   Release:        {}", mark(scope.has_helm_release));
        let _ = writeln!(output, "   Namespace:      {}", mark(scope.has_namespace));
        let _ = writeln!(output, "   Infrastructure: {}", mark(scope.has_infrastructure));
        let _ = writeln!(output, "   Local files:    {}", mark(scope.has_local_files));
        output
    }

    /// Formats the result of a destroy run.
    #[must_use]
    pub fn format_destroy(&self, report: &DestroyReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_destroy_text(report),
        }
    }

    /// Formats a destroy report as text.
    fn format_destroy_text(report: &DestroyReport) -> String {
        let name = &report.identity.name;
        match report.outcome {
            DestroyOutcome::NothingToDestroy => {
                return format!("{} Nothing to destroy for {name}.\n", "✓".green());
            }
            DestroyOutcome::Cancelled => {
                return format!("{} Destroy cancelled; nothing was changed.\n", "⚠".yellow());
            }
            DestroyOutcome::Completed => {}
        }

        let rows: Vec<StepRow> = report
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| StepRow {
                index: i + 1,
                step: s.step.to_string(),
                status: match s.status {
                    StepStatus::Success => "success".green().to_string(),
                    StepStatus::Error => "error".red().to_string(),
                    StepStatus::Skipped => "skipped".dimmed().to_string(),
                },
                detail: s.message.as_deref().map_or_else(String::new, |m| Self::truncate(m, 60)),
            })
            .collect();

        let mut output = format!("\n{}\n", Table::new(rows));
        if report.has_errors() {
            let _ = writeln!(
                output,
                "\n{} Destroy of {name} finished with errors; re-run destroy to retry.",
                "✗".red()
            );
        } else {
            let _ = writeln!(output, "\n{} {name} destroyed.", "✓".green());
        }
        output
    }

    /// Formats a deployment's status.
    #[must_use]
    pub fn format_status(&self, report: &StatusReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_status_text(report),
        }
    }

    /// Formats status as text.
    fn format_status_text(report: &StatusReport) -> String {
        let mut output = format!("\nDeployment: {}\n\n", report.name.bold());

        let _ = writeln!(output, "   Status:  {}", Self::format_deploy_status(report.status));
        if let Some(phase) = report.phase {
            let _ = writeln!(output, "   Phase:   {phase}");
        }
        let _ = writeln!(
            output,
            "   Updated: {}",
            report.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        if let Some(app) = &report.application {
            let na = || String::from("-");
            let _ = writeln!(output, "\n   Release:   {}", app.release_name.clone().unwrap_or_else(na));
            let _ = writeln!(output, "   Namespace: {}", app.namespace.clone().unwrap_or_else(na));
            let _ = writeln!(output, "   Chart:     {}", app.chart_version.clone().unwrap_or_else(na));
            let _ = writeln!(output, "   App:       {}", app.app_version.clone().unwrap_or_else(na));
            if let Some(hps) = &app.hps_version {
                let _ = writeln!(output, "   HPS:       {hps}");
            }
            let _ = writeln!(output, "   URL:       {}", app.url.clone().unwrap_or_else(na));
            let _ = writeln!(output, "   TLS:       {}", if app.tls_enabled { "on" } else { "off" });
        }

        if let Some(probe) = &report.health {
            let verdict = if probe.healthy {
                "healthy".green().to_string()
            } else {
                "unhealthy".red().to_string()
            };
            let detail = match (probe.status_code, probe.response_time_ms, &probe.error) {
                (Some(code), Some(ms), _) => format!("HTTP {code} in {ms}ms"),
                (_, _, Some(error)) => Self::truncate(error, 60),
                _ => String::new(),
            };
            let _ = writeln!(output, "\n   Health:  {verdict} {}", detail.dimmed());
        }

        if let Some(run) = &report.last_run {
            let mark = if run.success { "✓".green() } else { "✗".red() };
            let _ = write!(
                output,
                "\n   Last run: {mark} {:?} at {}",
                run.operation,
                run.timestamp.format("%Y-%m-%d %H:%M")
            );
            if let Some(error) = &run.error {
                let _ = write!(output, " ({})", Self::truncate(error, 60));
            }
            output.push('\n');
        }

        if report.status == DeploymentStatus::WaitingDns {
            let _ = writeln!(
                output,
                "\n   Waiting for DNS. Run 'kdeploy deploy {}' to resume.",
                report.name
            );
        }

        output
    }

    /// Formats the deployment list.
    #[must_use]
    pub fn format_list(&self, deployments: &[DeploymentSummary]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(deployments).unwrap_or_default(),
            OutputFormat::Text => {
                if deployments.is_empty() {
                    return String::from("No deployments found.\n");
                }
                let rows: Vec<DeploymentRow> = deployments
                    .iter()
                    .map(|d| DeploymentRow {
                        name: d.name.clone(),
                        status: Self::format_deploy_status(d.status),
                        url: d.url.clone().unwrap_or_else(|| String::from("-")),
                        updated: d.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats a fatal error.
    #[must_use]
    pub fn format_error(&self, error: &KdeployError) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "status": "error",
                    "retryable": error.is_retryable(),
                    "message": error.to_string(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => format!("{} {error}", "✗".red()),
        }
    }

    /// Formats a cleanup outcome.
    fn format_cleanup(cleanup: &CleanupOutcome) -> String {
        match cleanup {
            CleanupOutcome::NotNeeded => String::from("no infrastructure was created"),
            CleanupOutcome::Destroyed => "infrastructure destroyed".green().to_string(),
            CleanupOutcome::DestroyFailed { error } => {
                format!("{} ({})", "destroy failed".red(), Self::truncate(error, 60))
            }
            CleanupOutcome::Kept => "infrastructure kept; run 'kdeploy destroy --infra' later"
                .yellow()
                .to_string(),
            CleanupOutcome::Abandoned => "no decision; infrastructure left in place"
                .yellow()
                .to_string(),
        }
    }

    /// Formats a deployment status with color.
    fn format_deploy_status(status: DeploymentStatus) -> String {
        let label = status.to_string();
        match status {
            DeploymentStatus::Running => label.green().to_string(),
            DeploymentStatus::Deploying | DeploymentStatus::WaitingDns => {
                label.yellow().to_string()
            }
            DeploymentStatus::Failed => label.red().to_string(),
            DeploymentStatus::Pending | DeploymentStatus::Destroyed => label.dimmed().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::DeployPhase;
    use crate::reconciler::DeploymentIdentity;
    use uuid::Uuid;

    fn report(outcome: DeployOutcome) -> DeployReport {
        DeployReport {
            name: String::from("prod"),
            run_id: Uuid::nil(),
            outcome,
            phases: vec![DeployPhase::Loading, DeployPhase::Preflight],
            url: Some(String::from("http://app.example.com")),
            dns_records: Vec::new(),
        }
    }

    #[test]
    fn test_skipped_dns_tells_operator_to_rerun() {
        colored::control::set_override(false);
        let text = OutputFormatter::new(OutputFormat::Text)
            .format_deploy(&report(DeployOutcome::DeployedWithoutTls));
        assert!(text.contains("kdeploy deploy prod"));
        assert!(text.contains("loading → preflight"));
    }

    #[test]
    fn test_deploy_json_flattens_outcome() {
        let json = OutputFormatter::new(OutputFormat::Json).format_deploy(&report(
            DeployOutcome::Failed {
                error: String::from("boom"),
                cleanup: CleanupOutcome::Kept,
            },
        ));
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["result"], "failed");
        assert_eq!(value["cleanup"]["status"], "kept");
        assert_eq!(value["phases"][1], "preflight");
    }

    #[test]
    fn test_nothing_to_destroy() {
        colored::control::set_override(false);
        let report = DestroyReport {
            identity: DeploymentIdentity {
                name: String::from("prod"),
                namespace: String::from("prod"),
                release: String::from("prod"),
            },
            scope: DeploymentScope::default(),
            outcome: DestroyOutcome::NothingToDestroy,
            steps: Vec::new(),
        };
        let text = OutputFormatter::new(OutputFormat::Text).format_destroy(&report);
        assert!(text.contains("Nothing to destroy for prod"));
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("ééééééééééé", 6), "ééé...");
    }
}
