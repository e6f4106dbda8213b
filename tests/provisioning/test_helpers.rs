//! Shared fixtures for provisioning BDD scenarios.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use capacity_hunter::scheduler::{RetryBudget, RunOutcome};
use capacity_hunter::test_support::{MemoryResultStore, ScriptedCloud};
use rstest::fixture;

pub const ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));

#[derive(Clone, Debug)]
pub struct ProvisioningContext {
    pub cloud: ScriptedCloud,
    pub store: MemoryResultStore,
    pub budget: RetryBudget,
    pub cancel_after: Option<Duration>,
    pub run: Option<ScenarioRun>,
}

/// What the scheduler returned and how long it took on the paused clock.
#[derive(Clone, Debug)]
pub struct ScenarioRun {
    pub outcome: Result<RunOutcome, String>,
    pub elapsed: Duration,
}

#[fixture]
pub fn provisioning_context() -> ProvisioningContext {
    let cloud = ScriptedCloud::new();
    cloud.set_public_ip(Some(ADDRESS));
    ProvisioningContext {
        cloud,
        store: MemoryResultStore::new(),
        budget: RetryBudget::from_parts(60, Duration::from_secs(60)),
        cancel_after: None,
        run: None,
    }
}
