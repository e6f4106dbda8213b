//! BDD scenarios for the capacity hunting workflow.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ProvisioningContext, provisioning_context};

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Medium profile launches on the fifty-ninth attempt"
)]
fn scenario_medium_launches_late(provisioning_context: ProvisioningContext) {
    let _ = provisioning_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Budget runs out after sixty attempts"
)]
fn scenario_budget_exhausted(provisioning_context: ProvisioningContext) {
    let _ = provisioning_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Operator cancels while waiting for the next pass"
)]
fn scenario_cancel_between_passes(provisioning_context: ProvisioningContext) {
    let _ = provisioning_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Instance has no network attachments"
)]
fn scenario_no_attachments(provisioning_context: ProvisioningContext) {
    let _ = provisioning_context;
}

#[scenario(
    path = "tests/features/provisioning.feature",
    name = "Instance never confirms RUNNING"
)]
fn scenario_unconfirmed_readiness(provisioning_context: ProvisioningContext) {
    let _ = provisioning_context;
}
