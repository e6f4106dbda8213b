//! JSON shapes printed by the `oci` CLI.

use serde::Deserialize;

use crate::cloud::{InstanceId, LifecycleState, VnicAttachment};

/// Every `oci` response wraps its payload in a `data` field.
#[derive(Debug, Deserialize)]
pub(super) struct Envelope<T> {
    pub(super) data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct InstanceData {
    pub(super) id: InstanceId,
    pub(super) lifecycle_state: LifecycleState,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(super) struct VnicData {
    #[serde(default)]
    pub(super) public_ip: Option<String>,
}

pub(super) type AttachmentList = Vec<VnicAttachment>;

/// Body printed after `ServiceError:` on stderr.
#[derive(Debug, Deserialize)]
pub(super) struct ServiceErrorBody {
    #[serde(default)]
    pub(super) code: String,
    #[serde(default)]
    pub(super) message: String,
    #[serde(default)]
    pub(super) status: Option<u16>,
}
