//! Cloud provider abstraction for launching and inspecting compute instances.
//!
//! The retry loop only needs four capabilities from the provider: launch an
//! instance for a given shape configuration, read its lifecycle state, list
//! its network attachments and read the public address of an attachment.

use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use serde::Deserialize;
use thiserror::Error;

use crate::profile::ResourceProfile;

/// Placement and boot parameters shared by every launch attempt.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionContext {
    /// Compartment (account scope) that owns the instance.
    pub compartment_id: String,
    /// Availability domain the instance is placed in.
    pub availability_domain: String,
    /// Boot image identifier.
    pub image_id: String,
    /// Subnet the primary VNIC is attached to.
    pub subnet_id: String,
    /// Public key material installed as an authorised SSH key.
    pub ssh_public_key: String,
    /// Flexible shape name (for example `VM.Standard.A1.Flex`).
    pub shape: String,
    /// Display name given to the instance.
    pub display_name: String,
    /// Boot volume size in gigabytes.
    pub boot_volume_size_gb: u32,
}

impl ProvisionContext {
    /// Validates the context, returning the first empty field name.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidRequest`] when any string field is empty
    /// or the boot volume size is zero.
    pub fn validate(&self) -> Result<(), ProviderError> {
        let fields = [
            ("compartment_id", &self.compartment_id),
            ("availability_domain", &self.availability_domain),
            ("image_id", &self.image_id),
            ("subnet_id", &self.subnet_id),
            ("ssh_public_key", &self.ssh_public_key),
            ("shape", &self.shape),
            ("display_name", &self.display_name),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ProviderError::InvalidRequest((*name).to_owned()));
        }
        if self.boot_volume_size_gb == 0 {
            return Err(ProviderError::InvalidRequest(String::from(
                "boot_volume_size_gb",
            )));
        }
        Ok(())
    }
}

/// Provider identifier of a launched instance.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Wraps a provider identifier.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle states reported by the provider for an instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(from = "String")]
pub enum LifecycleState {
    /// Hardware is being allocated.
    Provisioning,
    /// The instance is booting.
    Starting,
    /// The instance is usable.
    Running,
    /// The instance is shutting down.
    Stopping,
    /// The instance is powered off.
    Stopped,
    /// The instance is being deleted.
    Terminating,
    /// The instance has been deleted.
    Terminated,
    /// Any state this tool does not model explicitly.
    Other(String),
}

impl LifecycleState {
    /// Returns `true` when the instance has reached the running condition.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl From<String> for LifecycleState {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "PROVISIONING" => Self::Provisioning,
            "STARTING" => Self::Starting,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            "TERMINATING" => Self::Terminating,
            "TERMINATED" => Self::Terminated,
            _ => Self::Other(value),
        }
    }
}

impl From<&str> for LifecycleState {
    fn from(value: &str) -> Self {
        Self::from(value.to_owned())
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Provisioning => "PROVISIONING",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::Other(raw) => raw.as_str(),
        };
        f.write_str(label)
    }
}

/// Link between an instance and one of its virtual network interfaces.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct VnicAttachment {
    /// Attachment identifier.
    #[serde(default)]
    pub id: String,
    /// Identifier of the attached VNIC.
    pub vnic_id: String,
}

/// Errors returned by provider calls.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProviderError {
    /// The provider rejected the request with a structured service error.
    #[error("service error {code}: {message}")]
    Service {
        /// Provider error code (for example `TooManyRequests`).
        code: String,
        /// Provider error message.
        message: String,
        /// HTTP status reported alongside the error, if any.
        status: Option<u16>,
    },
    /// The call never produced a provider response (network or process
    /// failure).
    #[error("transport failure: {0}")]
    Transport(String),
    /// The provider answered with output this tool could not interpret.
    #[error("malformed provider response: {0}")]
    Malformed(String),
    /// The request was rejected locally before reaching the provider.
    #[error("missing or empty field: {0}")]
    InvalidRequest(String),
}

/// Future returned by provider operations.
pub type CloudFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Capability surface consumed from the cloud provider.
pub trait CloudApi {
    /// Requests a new instance sized by `profile`. Does not retry.
    fn launch<'a>(
        &'a self,
        profile: &'a ResourceProfile,
        context: &'a ProvisionContext,
    ) -> CloudFuture<'a, InstanceId>;

    /// Reads the current lifecycle state of an instance.
    fn instance_state<'a>(&'a self, instance_id: &'a InstanceId)
    -> CloudFuture<'a, LifecycleState>;

    /// Lists the VNIC attachments of an instance.
    fn list_vnic_attachments<'a>(
        &'a self,
        compartment_id: &'a str,
        instance_id: &'a InstanceId,
    ) -> CloudFuture<'a, Vec<VnicAttachment>>;

    /// Reads the public address of a VNIC, if it has one.
    fn vnic_public_ip<'a>(&'a self, vnic_id: &'a str) -> CloudFuture<'a, Option<IpAddr>>;
}
