//! The retry loop that walks the profile catalog until an instance is
//! allocated, the attempt budget is spent, or the operator cancels.
//!
//! Each pass tries every profile in catalog order. A successful launch hands
//! the instance to readiness polling, address resolution and persistence. A
//! pass without success is followed by a sleep of one interval. Every sleep
//! races the cancel signal.

use std::fmt;
use std::io::{self, Write};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::attempt::{AttemptOutcome, ProvisionAttempt};
use crate::cancel::CancelSignal;
use crate::classify::AttemptFailure;
use crate::cloud::{CloudApi, InstanceId, ProvisionContext};
use crate::network::NetworkResolver;
use crate::profile::{ProfileCatalog, ResourceProfile};
use crate::readiness::{InstanceReadinessPoller, ProvisionedInstance, Readiness, ReadinessPolicy};
use crate::result_store::{ProvisioningResult, ResultStoreError, ResultWriter};

const SECONDS_PER_HOUR: u32 = 3600;
const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(30);

/// Errors raised while deriving a [`RetryBudget`].
#[derive(Clone, Debug, Error, PartialEq)]
pub enum BudgetError {
    /// Raised when the hour count is zero, negative, or not finite.
    #[error("hours must be a positive number, got {hours}")]
    InvalidHours {
        /// Rejected value.
        hours: f64,
    },
    /// Raised when the hour count does not fit in a duration.
    #[error("hours value {hours} is too large")]
    HoursOutOfRange {
        /// Rejected value.
        hours: f64,
    },
    /// Raised when the interval is shorter than one second.
    #[error("retry interval must be at least one second")]
    IntervalTooShort,
}

/// Attempt cap derived from a wall-clock allowance.
///
/// The cap is `floor(hours × 3600 / interval)` and counts individual launch
/// attempts across all profiles, not passes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryBudget {
    max_attempts: u64,
    interval: Duration,
    started_at: Instant,
}

impl RetryBudget {
    /// Derives the budget from an hour allowance and a pass interval.
    ///
    /// # Errors
    ///
    /// Returns [`BudgetError`] when `hours` is not a positive finite number
    /// or `interval` is shorter than one second.
    ///
    /// # Examples
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use capacity_hunter::scheduler::RetryBudget;
    /// # fn main() -> Result<(), capacity_hunter::scheduler::BudgetError> {
    /// let budget = RetryBudget::new(2.0, Duration::from_secs(60))?;
    /// assert_eq!(budget.max_attempts(), 120);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(hours: f64, interval: Duration) -> Result<Self, BudgetError> {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(BudgetError::InvalidHours { hours });
        }
        if interval < Duration::from_secs(1) {
            return Err(BudgetError::IntervalTooShort);
        }
        let allowance = Duration::try_from_secs_f64(hours)
            .ok()
            .and_then(|per_hour| per_hour.checked_mul(SECONDS_PER_HOUR))
            .ok_or(BudgetError::HoursOutOfRange { hours })?;
        let max_attempts = allowance
            .as_nanos()
            .checked_div(interval.as_nanos())
            .and_then(|attempts| u64::try_from(attempts).ok())
            .ok_or(BudgetError::HoursOutOfRange { hours })?;
        Ok(Self::from_parts(max_attempts, interval))
    }

    /// Builds a budget with an explicit attempt cap.
    #[must_use]
    pub fn from_parts(max_attempts: u64, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            started_at: Instant::now(),
        }
    }

    /// Maximum number of launch attempts.
    #[must_use]
    pub const fn max_attempts(&self) -> u64 {
        self.max_attempts
    }

    /// Sleep between passes.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Time since the budget was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Delays applied between attempts within a pass.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Pacing {
    /// Pause after a capacity, transient or rate-limited failure.
    pub attempt_pause: Duration,
    /// Extra wait after a rate-limited failure.
    pub rate_limit_cooldown: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            attempt_pause: Duration::ZERO,
            rate_limit_cooldown: RATE_LIMIT_COOLDOWN,
        }
    }
}

impl Pacing {
    /// Delay before the next attempt after a failure of `kind`.
    #[must_use]
    pub const fn delay_after(&self, kind: AttemptFailure) -> Duration {
        match kind {
            AttemptFailure::CapacityUnavailable | AttemptFailure::Transient => self.attempt_pause,
            AttemptFailure::RateLimited => self
                .attempt_pause
                .saturating_add(self.rate_limit_cooldown),
            AttemptFailure::QuotaExceeded => Duration::ZERO,
        }
    }
}

/// Lifecycle of a scheduler run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulerState {
    /// Constructed, not yet running.
    Idle,
    /// Walking the catalog.
    Attempting,
    /// Sleeping between passes.
    Waiting,
    /// An instance was allocated and handed off.
    Succeeded,
    /// The attempt budget ran out.
    TimedOut,
    /// The operator cancelled the run.
    Aborted,
}

impl fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Attempting => "attempting",
            Self::Waiting => "waiting",
            Self::Succeeded => "succeeded",
            Self::TimedOut => "timed out",
            Self::Aborted => "aborted",
        };
        f.write_str(label)
    }
}

/// Everything known about a successful allocation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisioningReport {
    /// The allocation and its resolved address.
    pub result: ProvisioningResult,
    /// How readiness polling ended.
    pub readiness: Readiness,
    /// Attempts made, including the successful one.
    pub attempts: u64,
    /// Whether the result was written to the result store.
    pub persisted: bool,
}

/// Terminal outcome of a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// An instance was allocated.
    Succeeded(ProvisioningReport),
    /// The attempt budget was exhausted without success.
    TimedOut {
        /// Attempts made.
        attempts: u64,
    },
    /// The operator cancelled the run.
    Aborted {
        /// Attempts made before cancellation.
        attempts: u64,
    },
}

/// Failures after an instance was allocated. Both name the instance so the
/// operator can find it.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Raised when writing the result fails.
    #[error("instance {instance_id} was created but its result could not be saved: {source}")]
    Persist {
        /// Allocated instance.
        instance_id: InstanceId,
        /// Underlying store error.
        #[source]
        source: ResultStoreError,
    },
    /// Raised in strict mode when the instance never reported `RUNNING`.
    #[error("instance {instance_id} was created but never reported RUNNING")]
    NotReady {
        /// Allocated instance.
        instance_id: InstanceId,
    },
}

enum PassResult {
    Launched(InstanceId, ResourceProfile),
    Exhausted,
    Cancelled,
}

/// Drives launch attempts across the catalog under a [`RetryBudget`].
///
/// Each attempt writes one progress line to `P`; the default discards it.
#[derive(Debug)]
pub struct RetryScheduler<C, W, P = io::Sink> {
    cloud: C,
    writer: W,
    progress: P,
    catalog: ProfileCatalog,
    context: ProvisionContext,
    budget: RetryBudget,
    cancel: CancelSignal,
    pacing: Pacing,
    readiness: ReadinessPolicy,
    state: SchedulerState,
    attempts: u64,
}

impl<C, W> RetryScheduler<C, W>
where
    C: CloudApi,
    W: ResultWriter,
{
    /// Creates a scheduler in the [`SchedulerState::Idle`] state.
    #[must_use]
    pub fn new(
        cloud: C,
        writer: W,
        catalog: ProfileCatalog,
        context: ProvisionContext,
        budget: RetryBudget,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            cloud,
            writer,
            progress: io::sink(),
            catalog,
            context,
            budget,
            cancel,
            pacing: Pacing::default(),
            readiness: ReadinessPolicy::default(),
            state: SchedulerState::Idle,
            attempts: 0,
        }
    }
}

impl<C, W, P> RetryScheduler<C, W, P>
where
    C: CloudApi,
    W: ResultWriter,
    P: Write,
{
    /// Sends the per-attempt progress lines to `progress`.
    #[must_use]
    pub fn with_progress<Q: Write>(self, progress: Q) -> RetryScheduler<C, W, Q> {
        RetryScheduler {
            cloud: self.cloud,
            writer: self.writer,
            progress,
            catalog: self.catalog,
            context: self.context,
            budget: self.budget,
            cancel: self.cancel,
            pacing: self.pacing,
            readiness: self.readiness,
            state: self.state,
            attempts: self.attempts,
        }
    }

    /// Overrides the delays between attempts.
    #[must_use]
    pub const fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// Overrides readiness polling.
    #[must_use]
    pub const fn with_readiness_policy(mut self, policy: ReadinessPolicy) -> Self {
        self.readiness = policy;
        self
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> SchedulerState {
        self.state
    }

    /// Attempts made so far.
    #[must_use]
    pub const fn attempts(&self) -> u64 {
        self.attempts
    }

    /// The budget in force.
    #[must_use]
    pub const fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    /// Runs until success, budget exhaustion or cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] only for failures after an instance was
    /// allocated. Launch failures are absorbed by the retry policy.
    pub async fn run(&mut self) -> Result<RunOutcome, SchedulerError> {
        self.transition(SchedulerState::Attempting);
        loop {
            match self.run_pass().await {
                PassResult::Launched(instance_id, profile) => {
                    return self.hand_off(instance_id, profile).await;
                }
                PassResult::Cancelled => return Ok(self.abort()),
                PassResult::Exhausted => {}
            }

            if self.budget_spent() {
                self.transition(SchedulerState::TimedOut);
                return Ok(RunOutcome::TimedOut {
                    attempts: self.attempts,
                });
            }

            self.transition(SchedulerState::Waiting);
            let interval = self.budget.interval();
            info!(
                attempts = self.attempts,
                max_attempts = self.budget.max_attempts(),
                "no profile available, next pass in {}s",
                interval.as_secs()
            );
            if self.cancel.sleep(interval).await.is_err() {
                return Ok(self.abort());
            }
            self.transition(SchedulerState::Attempting);
        }
    }

    async fn run_pass(&mut self) -> PassResult {
        for profile in self.catalog.iter() {
            if self.cancel.is_cancelled() {
                return PassResult::Cancelled;
            }
            if self.attempts >= self.budget.max_attempts() {
                return PassResult::Exhausted;
            }
            self.attempts += 1;

            debug!(attempt = self.attempts, profile = %profile.label, "launching");
            let record = ProvisionAttempt::new(&self.cloud, &self.context)
                .execute(self.attempts, profile)
                .await;
            writeln!(self.progress, "{record}").ok();

            let kind = match record.outcome {
                AttemptOutcome::Launched(instance_id) => {
                    info!(
                        attempt = record.sequence,
                        profile = %profile.label,
                        instance_id = %instance_id,
                        at = %record.timestamp.format("%H:%M:%S"),
                        "instance launched"
                    );
                    return PassResult::Launched(instance_id, profile.clone());
                }
                AttemptOutcome::Failed { kind, error } => {
                    debug!(
                        attempt = record.sequence,
                        profile = %profile.label,
                        %kind,
                        error = %error,
                        at = %record.timestamp.format("%H:%M:%S"),
                        "{kind}"
                    );
                    kind
                }
            };

            if self.attempts >= self.budget.max_attempts() {
                return PassResult::Exhausted;
            }
            match kind {
                AttemptFailure::RateLimited => {
                    info!(
                        cooldown_secs = self.pacing.rate_limit_cooldown.as_secs(),
                        "rate limited, cooling down"
                    );
                }
                AttemptFailure::QuotaExceeded => {
                    info!(profile = %profile.label, "service limit reached, skipping profile");
                }
                AttemptFailure::CapacityUnavailable | AttemptFailure::Transient => {}
            }
            if self.cancel.sleep(self.pacing.delay_after(kind)).await.is_err() {
                return PassResult::Cancelled;
            }
        }
        PassResult::Exhausted
    }

    async fn hand_off(
        &mut self,
        instance_id: InstanceId,
        profile: ResourceProfile,
    ) -> Result<RunOutcome, SchedulerError> {
        let mut instance = ProvisionedInstance::new(instance_id, profile);

        let polled = InstanceReadinessPoller::new(&self.cloud, self.readiness, &self.cancel)
            .wait(&mut instance)
            .await;
        let Ok(readiness) = polled else {
            return Ok(self.abort());
        };
        if !readiness.is_running() {
            if self.readiness.strict {
                return Err(SchedulerError::NotReady {
                    instance_id: instance.instance_id,
                });
            }
            warn!(instance_id = %instance.instance_id, "instance not confirmed RUNNING, continuing");
        }

        let resolver = NetworkResolver::new(&self.cloud, &self.context.compartment_id);
        let public_ip = match resolver.resolve(&instance).await {
            Ok(ip) => ip,
            Err(err) => {
                warn!(instance_id = %instance.instance_id, error = %err, "address lookup failed");
                None
            }
        };

        let result = ProvisioningResult {
            public_ip,
            instance_id: instance.instance_id,
            profile_used: instance.profile_used,
        };
        let persisted = if result.public_ip.is_some() {
            self.writer
                .persist(&result)
                .map_err(|source| SchedulerError::Persist {
                    instance_id: result.instance_id.clone(),
                    source,
                })?;
            true
        } else {
            warn!(instance_id = %result.instance_id, "no public address resolved, nothing persisted");
            false
        };

        self.transition(SchedulerState::Succeeded);
        Ok(RunOutcome::Succeeded(ProvisioningReport {
            result,
            readiness,
            attempts: self.attempts,
            persisted,
        }))
    }

    const fn budget_spent(&self) -> bool {
        self.attempts >= self.budget.max_attempts()
    }

    fn abort(&mut self) -> RunOutcome {
        self.transition(SchedulerState::Aborted);
        RunOutcome::Aborted {
            attempts: self.attempts,
        }
    }

    fn transition(&mut self, next: SchedulerState) {
        if self.state != next {
            info!(
                from = %self.state,
                to = %next,
                elapsed_secs = self.budget.elapsed().as_secs(),
                "scheduler state changed"
            );
            self.state = next;
        }
    }
}
