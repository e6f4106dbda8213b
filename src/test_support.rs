//! Test support utilities shared across unit and integration tests.
//!
//! The fakes here record every call behind `Arc<Mutex<_>>` so they can be
//! handed to code that requires `Send` futures.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::time::Instant;

use crate::cloud::{
    CloudApi, CloudFuture, InstanceId, LifecycleState, ProviderError, ProvisionContext,
    VnicAttachment,
};
use crate::command::{CommandError, CommandFuture, CommandOutput, CommandRunner};
use crate::profile::ResourceProfile;
use crate::result_store::{ProvisioningResult, ResultStoreError, ResultWriter};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Whether `flag` appears anywhere in the arguments.
    #[must_use]
    pub fn has_flag(&self, flag: &str) -> bool {
        self.args.iter().any(|arg| arg == flag)
    }

    /// Returns the value following `flag`, if present.
    #[must_use]
    pub fn arg_value(&self, flag: &str) -> Option<String> {
        self.args
            .iter()
            .position(|arg| arg == flag)
            .and_then(|index| self.args.get(index + 1))
            .map(|value| value.to_string_lossy().into_owned())
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful response with the given stdout.
    pub fn push_success(&self, stdout: impl Into<String>) {
        self.push_output(Some(0), stdout, "");
    }

    /// Pushes a failing response with the given exit code and stderr.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.push_output(Some(code), "", stderr);
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> CommandFuture<'a> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        let response = lock(&self.responses)
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            });
        Box::pin(async move { response })
    }
}

/// A launch request observed by [`ScriptedCloud`].
#[derive(Clone, Debug)]
pub struct LaunchCall {
    /// Label of the requested profile.
    pub label: String,
    /// Tokio clock reading when the request was made.
    pub at: Instant,
}

#[derive(Debug)]
struct CloudState {
    launches: VecDeque<Result<InstanceId, ProviderError>>,
    launch_calls: Vec<LaunchCall>,
    states: VecDeque<Result<LifecycleState, ProviderError>>,
    default_state: LifecycleState,
    state_queries: usize,
    attachments: Result<Vec<VnicAttachment>, ProviderError>,
    attachment_queries: Vec<String>,
    public_ip: Option<IpAddr>,
}

impl Default for CloudState {
    fn default() -> Self {
        Self {
            launches: VecDeque::new(),
            launch_calls: Vec::new(),
            states: VecDeque::new(),
            default_state: LifecycleState::Running,
            state_queries: 0,
            attachments: Ok(vec![VnicAttachment {
                id: String::from("ocid1.vnicattachment.scripted"),
                vnic_id: String::from("ocid1.vnic.scripted"),
            }]),
            attachment_queries: Vec::new(),
            public_ip: None,
        }
    }
}

/// In-memory [`CloudApi`] with scripted responses.
///
/// Launches fail with a capacity error once the scripted queue is empty.
/// State queries fall back to a default state (initially `RUNNING`). One VNIC
/// attachment is reported by default, without a public address.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCloud {
    state: Arc<Mutex<CloudState>>,
}

impl ScriptedCloud {
    /// Creates a provider with the defaults described above.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The error the provider returns when a shape has no free hosts.
    #[must_use]
    pub fn capacity_error() -> ProviderError {
        ProviderError::Service {
            code: String::from("InternalError"),
            message: String::from("Out of host capacity."),
            status: Some(500),
        }
    }

    /// A throttling error.
    #[must_use]
    pub fn rate_limited() -> ProviderError {
        ProviderError::Service {
            code: String::from("TooManyRequests"),
            message: String::from("Too many requests for the user"),
            status: Some(429),
        }
    }

    /// A service limit error.
    #[must_use]
    pub fn limit_exceeded() -> ProviderError {
        ProviderError::Service {
            code: String::from("LimitExceeded"),
            message: String::from("The following service limits were exceeded: standard-a1-core-count"),
            status: Some(400),
        }
    }

    /// Queues a successful launch returning `instance_id`.
    pub fn push_launch_success(&self, instance_id: &str) {
        lock(&self.state)
            .launches
            .push_back(Ok(InstanceId::new(instance_id)));
    }

    /// Queues a failed launch.
    pub fn push_launch_failure(&self, error: ProviderError) {
        lock(&self.state).launches.push_back(Err(error));
    }

    /// Queues a state query response.
    pub fn push_state(&self, state: Result<LifecycleState, ProviderError>) {
        lock(&self.state).states.push_back(state);
    }

    /// Sets the state reported once the queue is empty.
    pub fn set_default_state(&self, state: LifecycleState) {
        lock(&self.state).default_state = state;
    }

    /// Sets the VNIC attachments reported for every instance.
    pub fn set_attachments(&self, attachments: Vec<VnicAttachment>) {
        lock(&self.state).attachments = Ok(attachments);
    }

    /// Makes attachment listing fail.
    pub fn set_attachments_error(&self, error: ProviderError) {
        lock(&self.state).attachments = Err(error);
    }

    /// Sets the public address reported for every VNIC.
    pub fn set_public_ip(&self, ip: Option<IpAddr>) {
        lock(&self.state).public_ip = ip;
    }

    /// Returns every launch request made so far.
    #[must_use]
    pub fn launches(&self) -> Vec<LaunchCall> {
        lock(&self.state).launch_calls.clone()
    }

    /// Returns the profile labels of every launch request, in order.
    #[must_use]
    pub fn launch_labels(&self) -> Vec<String> {
        lock(&self.state)
            .launch_calls
            .iter()
            .map(|call| call.label.clone())
            .collect()
    }

    /// Returns how many state queries were made.
    #[must_use]
    pub fn state_queries(&self) -> usize {
        lock(&self.state).state_queries
    }

    /// Returns the compartment passed to each attachment listing.
    #[must_use]
    pub fn attachment_queries(&self) -> Vec<String> {
        lock(&self.state).attachment_queries.clone()
    }
}

impl CloudApi for ScriptedCloud {
    fn launch<'a>(
        &'a self,
        profile: &'a ResourceProfile,
        _context: &'a ProvisionContext,
    ) -> CloudFuture<'a, InstanceId> {
        let mut state = lock(&self.state);
        state.launch_calls.push(LaunchCall {
            label: profile.label.clone(),
            at: Instant::now(),
        });
        let response = state
            .launches
            .pop_front()
            .unwrap_or_else(|| Err(Self::capacity_error()));
        Box::pin(async move { response })
    }

    fn instance_state<'a>(
        &'a self,
        _instance_id: &'a InstanceId,
    ) -> CloudFuture<'a, LifecycleState> {
        let mut state = lock(&self.state);
        state.state_queries += 1;
        let fallback = state.default_state.clone();
        let response = state.states.pop_front().unwrap_or(Ok(fallback));
        Box::pin(async move { response })
    }

    fn list_vnic_attachments<'a>(
        &'a self,
        compartment_id: &'a str,
        _instance_id: &'a InstanceId,
    ) -> CloudFuture<'a, Vec<VnicAttachment>> {
        let mut state = lock(&self.state);
        state.attachment_queries.push(compartment_id.to_owned());
        let response = state.attachments.clone();
        Box::pin(async move { response })
    }

    fn vnic_public_ip<'a>(&'a self, _vnic_id: &'a str) -> CloudFuture<'a, Option<IpAddr>> {
        let ip = lock(&self.state).public_ip;
        Box::pin(async move { Ok(ip) })
    }
}

/// In-memory [`ResultWriter`] that records what it was asked to persist.
#[derive(Clone, Debug, Default)]
pub struct MemoryResultStore {
    persisted: Arc<Mutex<Vec<ProvisioningResult>>>,
    failure: Arc<Mutex<Option<String>>>,
}

impl MemoryResultStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with `message`.
    pub fn fail_with(&self, message: &str) {
        *lock(&self.failure) = Some(message.to_owned());
    }

    /// Returns every persisted result.
    #[must_use]
    pub fn persisted(&self) -> Vec<ProvisioningResult> {
        lock(&self.persisted).clone()
    }
}

impl ResultWriter for MemoryResultStore {
    fn persist(&self, result: &ProvisioningResult) -> Result<(), ResultStoreError> {
        if let Some(message) = lock(&self.failure).clone() {
            return Err(ResultStoreError::Io {
                path: "memory".into(),
                message,
            });
        }
        if result.public_ip.is_none() {
            return Err(ResultStoreError::MissingAddress {
                instance_id: result.instance_id.clone(),
            });
        }
        lock(&self.persisted).push(result.clone());
        Ok(())
    }
}

/// Returns a complete launch context with placeholder identifiers.
#[must_use]
pub fn provision_context() -> ProvisionContext {
    ProvisionContext {
        compartment_id: String::from("ocid1.compartment.oc1..test"),
        availability_domain: String::from("Uocm:EU-FRANKFURT-1-AD-1"),
        image_id: String::from("ocid1.image.oc1..ubuntu"),
        subnet_id: String::from("ocid1.subnet.oc1..public"),
        ssh_public_key: String::from("ssh-ed25519 AAAAC3NzaC1lZDI1NTE5 operator@example"),
        shape: String::from("VM.Standard.A1.Flex"),
        display_name: String::from("capacity-hunter"),
        boot_volume_size_gb: 100,
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Removes variables while holding the global mutex, restoring them on drop.
    pub async fn remove_vars(keys: &[&str]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(keys.len());
        for key in keys {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::remove_var(key) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
