//! Core library for the `capacity-hunter` provisioning tool.
//!
//! The crate retries creation of an Oracle Cloud free-tier ARM instance
//! across a prioritised list of shape profiles until one is allocated or a
//! time budget runs out. On success it waits for the instance to run,
//! resolves its public address and records the result for the deployment
//! step that follows.

pub mod attempt;
pub mod cancel;
pub mod classify;
pub mod cloud;
pub mod command;
pub mod config;
pub mod network;
pub mod oci;
pub mod paths;
pub mod profile;
pub mod readiness;
pub mod result_store;
pub mod scheduler;
pub mod ssh_key;
pub mod test_support;

pub use attempt::{AttemptOutcome, AttemptRecord, ProvisionAttempt};
pub use cancel::{CancelHandle, CancelSignal, Cancelled, cancel_pair};
pub use classify::{AttemptFailure, classify};
pub use cloud::{
    CloudApi, InstanceId, LifecycleState, ProviderError, ProvisionContext, VnicAttachment,
};
pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, ProvisionConfig};
pub use network::NetworkResolver;
pub use oci::{OciCliBackend, OciCliConfig};
pub use profile::{CatalogError, ProfileCatalog, ResourceProfile};
pub use readiness::{InstanceReadinessPoller, ProvisionedInstance, Readiness, ReadinessPolicy};
pub use result_store::{FileResultStore, ProvisioningResult, ResultStoreError, ResultWriter};
pub use scheduler::{
    BudgetError, Pacing, ProvisioningReport, RetryBudget, RetryScheduler, RunOutcome,
    SchedulerError, SchedulerState,
};
