//! BDD step definitions for the capacity hunting workflow.

use std::time::Duration;

use capacity_hunter::cancel::cancel_pair;
use capacity_hunter::cloud::{InstanceId, LifecycleState};
use capacity_hunter::profile::ProfileCatalog;
use capacity_hunter::readiness::Readiness;
use capacity_hunter::result_store::ProvisioningResult;
use capacity_hunter::scheduler::{ProvisioningReport, RetryBudget, RetryScheduler, RunOutcome};
use capacity_hunter::test_support::{ScriptedCloud, provision_context};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Builder;
use tokio::time::Instant;

use super::test_helpers::{ADDRESS, ProvisioningContext, ScenarioRun};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("invalid scenario setup: {0}")]
    Setup(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a \"{hours}\" hour budget with a \"{interval}\" second interval")]
fn budget(
    mut provisioning_context: ProvisioningContext,
    hours: f64,
    interval: u64,
) -> Result<ProvisioningContext, StepError> {
    provisioning_context.budget = RetryBudget::new(hours, Duration::from_secs(interval))
        .map_err(|err| StepError::Setup(err.to_string()))?;
    Ok(provisioning_context)
}

#[given("the first \"{count}\" launches report no capacity")]
fn launches_without_capacity(
    provisioning_context: ProvisioningContext,
    count: u32,
) -> ProvisioningContext {
    for _ in 0..count {
        provisioning_context
            .cloud
            .push_launch_failure(ScriptedCloud::capacity_error());
    }
    provisioning_context
}

#[given("the next launch returns instance \"{instance_id}\"")]
fn next_launch_succeeds(
    provisioning_context: ProvisioningContext,
    instance_id: String,
) -> ProvisioningContext {
    provisioning_context.cloud.push_launch_success(instance_id.trim());
    provisioning_context
}

#[given("the instance has no VNIC attachments")]
fn no_attachments(provisioning_context: ProvisioningContext) -> ProvisioningContext {
    provisioning_context.cloud.set_attachments(Vec::new());
    provisioning_context
}

#[given("the instance never reports running")]
fn never_running(provisioning_context: ProvisioningContext) -> ProvisioningContext {
    provisioning_context
        .cloud
        .set_default_state(LifecycleState::Provisioning);
    provisioning_context
}

#[given("the operator cancels after \"{seconds}\" seconds")]
fn operator_cancels(
    mut provisioning_context: ProvisioningContext,
    seconds: u64,
) -> ProvisioningContext {
    provisioning_context.cancel_after = Some(Duration::from_secs(seconds));
    provisioning_context
}

#[when("the retry scheduler runs")]
fn scheduler_runs(
    mut provisioning_context: ProvisioningContext,
) -> Result<ProvisioningContext, StepError> {
    let runtime = Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|err| StepError::Setup(format!("runtime: {err}")))?;
    let run = runtime.block_on(run_scheduler(&provisioning_context));
    provisioning_context.run = Some(run);
    Ok(provisioning_context)
}

async fn run_scheduler(context: &ProvisioningContext) -> ScenarioRun {
    let (handle, cancel) = cancel_pair();
    if let Some(delay) = context.cancel_after {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            handle.cancel();
        });
    }
    let mut scheduler = RetryScheduler::new(
        context.cloud.clone(),
        context.store.clone(),
        ProfileCatalog::free_tier(),
        provision_context(),
        context.budget,
        cancel,
    );

    let origin = Instant::now();
    let outcome = scheduler.run().await.map_err(|err| err.to_string());
    ScenarioRun {
        outcome,
        elapsed: origin.elapsed(),
    }
}

fn outcome(provisioning_context: &ProvisioningContext) -> Result<&RunOutcome, StepError> {
    let Some(run) = &provisioning_context.run else {
        return Err(StepError::Assertion(String::from("scheduler did not run")));
    };
    run.outcome
        .as_ref()
        .map_err(|err| StepError::Assertion(format!("run failed unexpectedly: {err}")))
}

fn report(provisioning_context: &ProvisioningContext) -> Result<&ProvisioningReport, StepError> {
    match outcome(provisioning_context)? {
        RunOutcome::Succeeded(report) => Ok(report),
        other => Err(StepError::Assertion(format!("expected success, got {other:?}"))),
    }
}

fn expect_outcome(
    provisioning_context: &ProvisioningContext,
    expected: &RunOutcome,
) -> Result<(), StepError> {
    let actual = outcome(provisioning_context)?;
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {actual:?}"
        )))
    }
}

#[then("the run succeeds after \"{count}\" attempts")]
fn run_succeeds(provisioning_context: &ProvisioningContext, count: u64) -> Result<(), StepError> {
    let attempts = report(provisioning_context)?.attempts;
    if attempts == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected success after {count} attempts, got {attempts}"
        )))
    }
}

#[then("the run times out after \"{count}\" attempts")]
fn run_times_out(provisioning_context: &ProvisioningContext, count: u64) -> Result<(), StepError> {
    expect_outcome(provisioning_context, &RunOutcome::TimedOut { attempts: count })
}

#[then("the run is aborted after \"{count}\" attempts")]
fn run_aborted(provisioning_context: &ProvisioningContext, count: u64) -> Result<(), StepError> {
    expect_outcome(provisioning_context, &RunOutcome::Aborted { attempts: count })
}

#[then("\"{count}\" launch attempts were made")]
fn launch_count(
    provisioning_context: &ProvisioningContext,
    count: usize,
) -> Result<(), StepError> {
    let launches = provisioning_context.cloud.launches().len();
    if launches == count {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} launches, got {launches}"
        )))
    }
}

#[then("the \"{label}\" profile result for \"{instance_id}\" is persisted")]
fn result_persisted(
    provisioning_context: &ProvisioningContext,
    label: String,
    instance_id: String,
) -> Result<(), StepError> {
    let profile = ProfileCatalog::free_tier()
        .iter()
        .find(|profile| profile.label == label)
        .cloned()
        .ok_or_else(|| StepError::Setup(format!("unknown profile {label}")))?;
    let expected = ProvisioningResult {
        public_ip: Some(ADDRESS),
        instance_id: InstanceId::new(instance_id),
        profile_used: profile,
    };

    if report(provisioning_context)?.result != expected {
        return Err(StepError::Assertion(format!(
            "reported result differs from {expected:?}"
        )));
    }
    let persisted = provisioning_context.store.persisted();
    if persisted == [expected] {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "unexpected persisted results: {persisted:?}"
        )))
    }
}

#[then("nothing is persisted")]
fn nothing_persisted(provisioning_context: &ProvisioningContext) -> Result<(), StepError> {
    let persisted = provisioning_context.store.persisted();
    if persisted.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no persisted results, got {persisted:?}"
        )))
    }
}

#[then("the public address is unresolved")]
fn address_unresolved(provisioning_context: &ProvisioningContext) -> Result<(), StepError> {
    let report = report(provisioning_context)?;
    if report.result.public_ip.is_none() && !report.persisted {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no address, got {:?}",
            report.result.public_ip
        )))
    }
}

#[then("readiness is unconfirmed after \"{polls}\" polls")]
fn readiness_unconfirmed(
    provisioning_context: &ProvisioningContext,
    polls: u32,
) -> Result<(), StepError> {
    let expected = Readiness::Unconfirmed {
        polls,
        last_state: Some(LifecycleState::Provisioning),
    };
    let actual = &report(provisioning_context)?.readiness;
    if *actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?}, got {actual:?}"
        )))
    }
}

#[then("the scheduler waited \"{seconds}\" seconds")]
fn elapsed(provisioning_context: &ProvisioningContext, seconds: u64) -> Result<(), StepError> {
    let Some(run) = &provisioning_context.run else {
        return Err(StepError::Assertion(String::from("scheduler did not run")));
    };
    if run.elapsed == Duration::from_secs(seconds) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {seconds}s on the paused clock, got {:?}",
            run.elapsed
        )))
    }
}
