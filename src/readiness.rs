//! Post-allocation readiness polling.
//!
//! Polling is optimistic: running out of polls is not a failure and the
//! caller moves on regardless of the last observed state.

use std::time::Duration;

use tracing::{debug, info};

use crate::cancel::{CancelSignal, Cancelled};
use crate::cloud::{CloudApi, InstanceId, LifecycleState};
use crate::profile::ResourceProfile;

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_POLLS: u32 = 120;
const SETTLE_DELAY: Duration = Duration::from_secs(5);
const PROGRESS_EVERY: u32 = 6;

/// An instance the run has allocated.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionedInstance {
    /// Provider identifier.
    pub instance_id: InstanceId,
    /// Profile that was allocated.
    pub profile_used: ResourceProfile,
    /// Last state observed by polling, if any.
    pub lifecycle_state: Option<LifecycleState>,
}

impl ProvisionedInstance {
    /// Wraps a freshly launched instance whose state is not yet known.
    #[must_use]
    pub const fn new(instance_id: InstanceId, profile_used: ResourceProfile) -> Self {
        Self {
            instance_id,
            profile_used,
            lifecycle_state: None,
        }
    }
}

/// Polling cadence and limits.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadinessPolicy {
    /// Delay between state queries.
    pub poll_interval: Duration,
    /// Maximum number of state queries.
    pub max_polls: u32,
    /// Extra wait after polling, before network lookups.
    pub settle_delay: Duration,
    /// Emit a progress line every this many polls.
    pub progress_every: u32,
    /// Treat an unconfirmed instance as a failure.
    pub strict: bool,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            max_polls: MAX_POLLS,
            settle_delay: SETTLE_DELAY,
            progress_every: PROGRESS_EVERY,
            strict: false,
        }
    }
}

/// Result of polling.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Readiness {
    /// The instance reported `RUNNING`.
    Running {
        /// Number of queries issued.
        polls: u32,
    },
    /// The poll budget ran out first.
    Unconfirmed {
        /// Number of queries issued.
        polls: u32,
        /// Last successfully observed state.
        last_state: Option<LifecycleState>,
    },
}

impl Readiness {
    /// Returns `true` when the instance was seen running.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

/// Polls an instance until it runs or the poll budget is spent.
#[derive(Debug)]
pub struct InstanceReadinessPoller<'a, C> {
    cloud: &'a C,
    policy: ReadinessPolicy,
    cancel: &'a CancelSignal,
}

impl<'a, C: CloudApi> InstanceReadinessPoller<'a, C> {
    /// Creates a poller.
    #[must_use]
    pub const fn new(cloud: &'a C, policy: ReadinessPolicy, cancel: &'a CancelSignal) -> Self {
        Self {
            cloud,
            policy,
            cancel,
        }
    }

    /// Polls until `RUNNING` or `max_polls`, then waits the settle delay.
    /// Query errors are ignored. Updates `instance.lifecycle_state` with each
    /// observed state.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] when cancellation interrupts a sleep.
    pub async fn wait(&self, instance: &mut ProvisionedInstance) -> Result<Readiness, Cancelled> {
        let mut readiness = Readiness::Unconfirmed {
            polls: 0,
            last_state: None,
        };

        for poll in 0..self.policy.max_polls {
            let polls = poll + 1;
            match self.cloud.instance_state(&instance.instance_id).await {
                Ok(state) if state.is_running() => {
                    instance.lifecycle_state = Some(state);
                    readiness = Readiness::Running { polls };
                    break;
                }
                Ok(state) => {
                    if self.should_report(poll) {
                        let elapsed = self.policy.poll_interval.saturating_mul(poll).as_secs();
                        info!(
                            instance_id = %instance.instance_id,
                            %state,
                            "[{elapsed}s] {state}"
                        );
                    }
                    instance.lifecycle_state = Some(state);
                }
                Err(err) => {
                    debug!(instance_id = %instance.instance_id, error = %err, "state query failed");
                }
            }
            readiness = Readiness::Unconfirmed {
                polls,
                last_state: instance.lifecycle_state.clone(),
            };
            self.cancel.sleep(self.policy.poll_interval).await?;
        }

        self.cancel.sleep(self.policy.settle_delay).await?;
        Ok(readiness)
    }

    const fn should_report(&self, poll: u32) -> bool {
        self.policy.progress_every != 0 && poll.is_multiple_of(self.policy.progress_every)
    }
}
