//! kdeploy CLI entrypoint.
//!
//! This is the main entrypoint for the kdeploy command-line tool.

use std::io::Write;
use std::process::ExitCode;

use kdeploy::cli::{
    Cli, Commands, DeploymentSummary, FailurePolicy, OutputFormatter, StatusReport,
    TerminalOperator,
};
use kdeploy::config::{ConfigParser, ConfigValidator, DeploymentConfig, DeploymentLayout};
use kdeploy::error::Result;
use kdeploy::orchestrator::{DeployOptions, Orchestrator};
use kdeploy::reconciler::{DestroyReconciler, DestroyRequest};
use kdeploy::state::LocalStateStore;
use kdeploy::tools::{
    EndpointProber, HelmCli, HickoryResolver, HttpProber, KubectlCli, TerraformCli, Toolchain,
};

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.verbose, cli.log_json);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    let result = runtime.block_on(run(cli));

    // A stdin read may still be parked on a blocking thread.
    runtime.shutdown_background();

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            let message = formatter.format_error(&e);
            if formatter.is_json() {
                let _ = emit(&message);
            } else {
                eprintln!("{message}");
            }
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// Logs go to stderr so JSON output on stdout stays parseable.
fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("kdeploy=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point. Returns false when the command ran but did not succeed.
async fn run(cli: Cli) -> Result<bool> {
    let formatter = OutputFormatter::new(cli.output);
    let layout = cli.home.clone().map_or_else(DeploymentLayout::from_user_home, |home| {
        Ok(DeploymentLayout::new(home))
    })?;
    debug!("Using kdeploy home: {}", layout.home().display());

    let terraform = TerraformCli::new(cli.terraform_bin.as_str(), layout.clone());
    let helm = HelmCli::new(cli.helm_bin.as_str());
    let kubectl = KubectlCli::new(cli.kubectl_bin.as_str());
    let resolver = HickoryResolver::default();
    let tools = Toolchain {
        infra: &terraform,
        release: &helm,
        cluster: &kubectl,
        dns: &resolver,
    };

    match cli.command {
        Commands::Deploy {
            name,
            skip_infra,
            skip_dns,
            on_failure,
        } => cmd_deploy(&layout, tools, &name, skip_infra, skip_dns, on_failure, formatter).await,
        Commands::Destroy {
            name,
            infra,
            delete_local,
            force,
        } => {
            let request = DestroyRequest {
                destroy_infra: infra,
                delete_local,
                force,
            };
            cmd_destroy(&layout, tools, &name, &request, formatter).await
        }
        Commands::Status { name, health } => cmd_status(&layout, &name, health, formatter).await,
        Commands::List => cmd_list(&layout, formatter).await,
    }
}

/// Deploy, or resume deploying, a named deployment.
async fn cmd_deploy(
    layout: &DeploymentLayout,
    tools: Toolchain<'_>,
    name: &str,
    skip_infra: bool,
    skip_dns: bool,
    on_failure: FailurePolicy,
    formatter: OutputFormatter,
) -> Result<bool> {
    let config = load_config(layout, name)?;
    let store = LocalStateStore::new(layout.clone());

    let cancel = CancellationToken::new();
    let operator = TerminalOperator::stdin(formatter).with_skip_token(cancel.clone());
    let opts = DeployOptions {
        skip_infra,
        skip_dns,
        cleanup: on_failure.into(),
        cancel,
        ..DeployOptions::default()
    };

    let report = Orchestrator::new(&config, layout, &store, tools, &operator)
        .run(&opts)
        .await;
    operator.finish();
    let report = report?;

    emit(&formatter.format_deploy(&report))?;
    Ok(report.succeeded())
}

/// Destroy a deployment's resources.
async fn cmd_destroy(
    layout: &DeploymentLayout,
    tools: Toolchain<'_>,
    name: &str,
    request: &DestroyRequest,
    formatter: OutputFormatter,
) -> Result<bool> {
    // The config only improves naming; destroy must work without it.
    let config = if layout.config_path(name).exists() {
        match load_config(layout, name) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring unreadable config for {name}: {e}");
                None
            }
        }
    } else {
        None
    };

    let store = LocalStateStore::new(layout.clone());
    let operator = TerminalOperator::stdin(formatter);

    let report = DestroyReconciler::new(name, layout, &store, tools, &operator)
        .with_config(config.as_ref())
        .run(request)
        .await?;

    emit(&formatter.format_destroy(&report))?;
    Ok(!report.has_errors())
}

/// Show deployment status.
async fn cmd_status(
    layout: &DeploymentLayout,
    name: &str,
    include_health: bool,
    formatter: OutputFormatter,
) -> Result<bool> {
    let store = LocalStateStore::new(layout.clone());
    let prober = if include_health {
        Some(HttpProber::new()?)
    } else {
        None
    };

    let report = StatusReport::gather(
        &store,
        name,
        prober.as_ref().map(|p| p as &dyn EndpointProber),
    )
    .await?;

    emit(&formatter.format_status(&report))?;
    Ok(report.health.as_ref().is_none_or(|h| h.healthy))
}

/// List known deployments.
async fn cmd_list(layout: &DeploymentLayout, formatter: OutputFormatter) -> Result<bool> {
    let store = LocalStateStore::new(layout.clone());
    let deployments = DeploymentSummary::gather_all(&store).await?;

    emit(&formatter.format_list(&deployments))?;
    Ok(true)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Loads and validates a deployment's config, applying `.env` and `KDEPLOY_*` overrides.
fn load_config(layout: &DeploymentLayout, name: &str) -> Result<DeploymentConfig> {
    let config = ConfigParser::new().load(layout, name)?;

    let validation = ConfigValidator::new().validate(&config)?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    info!("Loaded configuration for {name}");
    Ok(config)
}

/// Writes command output to stdout.
fn emit(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", text.trim_end())?;
    Ok(())
}
