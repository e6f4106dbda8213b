//! Resolves the public address of a provisioned instance.

use std::net::IpAddr;

use tracing::debug;

use crate::cloud::{CloudApi, ProviderError};
use crate::readiness::ProvisionedInstance;

/// Looks up the public address through the instance's first VNIC.
#[derive(Debug)]
pub struct NetworkResolver<'a, C> {
    cloud: &'a C,
    compartment_id: &'a str,
}

impl<'a, C: CloudApi> NetworkResolver<'a, C> {
    /// Creates a resolver scoped to `compartment_id`.
    #[must_use]
    pub const fn new(cloud: &'a C, compartment_id: &'a str) -> Self {
        Self {
            cloud,
            compartment_id,
        }
    }

    /// Returns the public address of the first attached VNIC. Zero
    /// attachments, or a VNIC without a public address, yield `Ok(None)`.
    /// Performs a single lookup without retrying.
    ///
    /// # Errors
    ///
    /// Returns the [`ProviderError`] from either provider call.
    pub async fn resolve(
        &self,
        instance: &ProvisionedInstance,
    ) -> Result<Option<IpAddr>, ProviderError> {
        let attachments = self
            .cloud
            .list_vnic_attachments(self.compartment_id, &instance.instance_id)
            .await?;
        let Some(first) = attachments.first() else {
            debug!(instance_id = %instance.instance_id, "instance has no VNIC attachments");
            return Ok(None);
        };
        self.cloud.vnic_public_ip(&first.vnic_id).await
    }
}
