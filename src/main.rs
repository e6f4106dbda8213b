//! Binary entry point for the `capacity-hunter` CLI.

mod cli;

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use capacity_hunter::cancel::{CancelHandle, cancel_pair};
use capacity_hunter::config::{ConfigError, ProvisionConfig};
use capacity_hunter::oci::OciCliBackend;
use capacity_hunter::profile::ProfileCatalog;
use capacity_hunter::readiness::{Readiness, ReadinessPolicy};
use capacity_hunter::scheduler::{
    BudgetError, ProvisioningReport, RetryBudget, RetryScheduler, RunOutcome, SchedulerError,
};
use capacity_hunter::ssh_key::private_key_hint;

use cli::Cli;

const RULE: &str = "==================================================";

#[derive(Debug, Error)]
enum CliError {
    #[error("invalid retry budget: {0}")]
    Budget(#[from] BudgetError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Operator-facing details used to render the success summary.
struct SummaryContext<'a> {
    ssh_public_key_file: &'a str,
    ip_file: &'a str,
    deploy_hint: &'a str,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_tracing();

    let exit_code = match run(&cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

async fn run(cli: &Cli) -> Result<i32, CliError> {
    let budget = RetryBudget::new(cli.hours, Duration::from_secs(cli.interval))?;
    let config = ProvisionConfig::load_without_cli_args()?;
    let context = config.provision_context()?;

    let (handle, cancel) = cancel_pair();
    spawn_interrupt_listener(handle);

    write_banner(io::stdout(), cli.hours, &budget);

    let readiness = ReadinessPolicy {
        strict: config.strict_readiness,
        ..ReadinessPolicy::default()
    };
    let mut scheduler = RetryScheduler::new(
        OciCliBackend::with_process_runner(config.oci_cli_config()),
        config.result_store(),
        ProfileCatalog::free_tier(),
        context,
        budget,
        cancel,
    )
    .with_readiness_policy(readiness)
    .with_progress(io::stdout());

    let outcome = scheduler.run().await?;
    let summary = SummaryContext {
        ssh_public_key_file: &config.ssh_public_key_file,
        ip_file: &config.ip_file,
        deploy_hint: &config.deploy_hint,
    };
    Ok(write_outcome(io::stdout(), &outcome, cli.hours, &summary))
}

fn spawn_interrupt_listener(handle: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });
}

fn write_banner(mut target: impl Write, hours: f64, budget: &RetryBudget) {
    writeln!(
        target,
        "Will retry for up to {hours} hours ({} attempts)",
        budget.max_attempts()
    )
    .ok();
    writeln!(target, "Retry interval: {} seconds", budget.interval().as_secs()).ok();
    writeln!(target, "Press Ctrl+C to stop").ok();
    writeln!(target).ok();
}

/// Writes the final summary and returns the process exit code.
fn write_outcome(
    mut target: impl Write,
    outcome: &RunOutcome,
    hours: f64,
    summary: &SummaryContext<'_>,
) -> i32 {
    match outcome {
        RunOutcome::Succeeded(report) => {
            write_success(target, report, summary);
            0
        }
        RunOutcome::TimedOut { .. } => {
            writeln!(target, "Timed out after {hours} hours. Run again later.").ok();
            1
        }
        RunOutcome::Aborted { .. } => {
            writeln!(target, "Stopped by user.").ok();
            0
        }
    }
}

fn write_success(mut target: impl Write, report: &ProvisioningReport, summary: &SummaryContext<'_>) {
    let result = &report.result;
    writeln!(target, "{RULE}").ok();
    writeln!(target, "VM READY!").ok();
    writeln!(target, "{RULE}").ok();
    writeln!(target, "  Instance:  {}", result.instance_id).ok();
    writeln!(target, "  Config:    {}", result.profile_used).ok();
    if let Readiness::Unconfirmed { last_state, .. } = &report.readiness {
        let state = last_state
            .as_ref()
            .map_or_else(|| String::from("unknown"), ToString::to_string);
        writeln!(target, "  State:     {state} (RUNNING not confirmed)").ok();
    }

    let Some(ip) = result.public_ip else {
        writeln!(
            target,
            "  Public IP: not resolved; look it up in the OCI console"
        )
        .ok();
        return;
    };
    writeln!(target, "  Public IP: {ip}").ok();
    writeln!(
        target,
        "  SSH:       ssh -i {} ubuntu@{ip}",
        private_key_hint(summary.ssh_public_key_file)
    )
    .ok();
    if report.persisted {
        writeln!(target, "  Saved to:  {}", summary.ip_file).ok();
    }
    writeln!(target).ok();
    writeln!(target, "Next step:").ok();
    writeln!(target, "  {} {ip}", summary.deploy_hint).ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
