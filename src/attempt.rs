//! A single launch attempt for one profile.

use std::fmt;

use chrono::{DateTime, Local};

use crate::classify::{AttemptFailure, classify};
use crate::cloud::{CloudApi, InstanceId, ProviderError, ProvisionContext};
use crate::profile::ResourceProfile;

/// What one attempt produced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum AttemptOutcome {
    /// The provider accepted the launch.
    Launched(InstanceId),
    /// The provider refused; `kind` drives the retry policy.
    Failed {
        /// Classified failure.
        kind: AttemptFailure,
        /// Raw provider error, kept for logging.
        error: ProviderError,
    },
}

/// Ephemeral log entry for one attempt.
#[derive(Clone, Debug)]
pub struct AttemptRecord<'p> {
    /// 1-based position across the whole run.
    pub sequence: u64,
    /// Profile requested.
    pub profile: &'p ResourceProfile,
    /// Wall-clock time the attempt started.
    pub timestamp: DateTime<Local>,
    /// Result of the attempt.
    pub outcome: AttemptOutcome,
}

impl AttemptRecord<'_> {
    /// Returns the failure kind, or `None` when the launch succeeded.
    #[must_use]
    pub const fn failure(&self) -> Option<AttemptFailure> {
        match &self.outcome {
            AttemptOutcome::Launched(_) => None,
            AttemptOutcome::Failed { kind, .. } => Some(*kind),
        }
    }
}

/// Renders the operator progress line, for example
/// `[09:30:05] #3 Trying Minimum (1 OCPU / 6 GB)... No capacity`.
impl fmt::Display for AttemptRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] #{} Trying {}... ",
            self.timestamp.format("%H:%M:%S"),
            self.sequence,
            self.profile
        )?;
        match &self.outcome {
            AttemptOutcome::Launched(instance_id) => write!(f, "SUCCESS! Instance ID: {instance_id}"),
            AttemptOutcome::Failed { kind, error } => match kind {
                AttemptFailure::CapacityUnavailable => f.write_str("No capacity"),
                AttemptFailure::RateLimited => f.write_str("Rate limited, waiting extra..."),
                AttemptFailure::QuotaExceeded => f.write_str("Limit exceeded, skipping profile"),
                AttemptFailure::Transient => write!(f, "Error: {error}"),
            },
        }
    }
}

/// Performs exactly one launch call and classifies the result. Retrying is
/// left to the caller.
#[derive(Debug)]
pub struct ProvisionAttempt<'a, C> {
    cloud: &'a C,
    context: &'a ProvisionContext,
}

impl<'a, C: CloudApi> ProvisionAttempt<'a, C> {
    /// Binds the attempt to a provider and launch context.
    #[must_use]
    pub const fn new(cloud: &'a C, context: &'a ProvisionContext) -> Self {
        Self { cloud, context }
    }

    /// Launches `profile` and records the classified outcome.
    pub async fn execute<'p>(&self, sequence: u64, profile: &'p ResourceProfile) -> AttemptRecord<'p> {
        let timestamp = Local::now();
        let outcome = match self.cloud.launch(profile, self.context).await {
            Ok(instance_id) => AttemptOutcome::Launched(instance_id),
            Err(error) => AttemptOutcome::Failed {
                kind: classify(&error),
                error,
            },
        };
        AttemptRecord {
            sequence,
            profile,
            timestamp,
            outcome,
        }
    }
}
