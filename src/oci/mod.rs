//! Oracle Cloud backend driven through the `oci` command-line client.
//!
//! Authentication, request signing and region selection are delegated to the
//! CLI and its own configuration file (`~/.oci/config`), so this module only
//! builds argument vectors and parses the JSON the CLI prints.

mod error;
mod types;

use std::ffi::OsString;
use std::net::IpAddr;

use serde::de::DeserializeOwned;
use serde_json::json;

use crate::cloud::{
    CloudApi, CloudFuture, InstanceId, LifecycleState, ProviderError, ProvisionContext,
    VnicAttachment,
};
use crate::command::{CommandRunner, ProcessCommandRunner};
use crate::profile::ResourceProfile;

use error::failure_from_output;
use types::{AttachmentList, Envelope, InstanceData, VnicData};

/// Default name of the OCI CLI binary.
pub const DEFAULT_OCI_BIN: &str = "oci";

/// Settings for invoking the CLI.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OciCliConfig {
    /// Path to the `oci` executable.
    pub oci_bin: String,
    /// Profile name in the CLI configuration file; the CLI default is used
    /// when absent.
    pub profile: Option<String>,
}

impl Default for OciCliConfig {
    fn default() -> Self {
        Self {
            oci_bin: DEFAULT_OCI_BIN.to_owned(),
            profile: None,
        }
    }
}

/// [`CloudApi`] implementation that shells out to the `oci` CLI.
#[derive(Clone, Debug)]
pub struct OciCliBackend<R: CommandRunner> {
    config: OciCliConfig,
    runner: R,
}

impl OciCliBackend<ProcessCommandRunner> {
    /// Creates a backend wired to the real process runner.
    #[must_use]
    pub const fn with_process_runner(config: OciCliConfig) -> Self {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> OciCliBackend<R> {
    /// Creates a backend using the provided configuration and runner.
    #[must_use]
    pub const fn new(config: OciCliConfig, runner: R) -> Self {
        Self { config, runner }
    }

    fn build_args(&self, subcommand: &[&str], options: &[(&str, String)]) -> Vec<OsString> {
        let mut args: Vec<OsString> = subcommand.iter().map(OsString::from).collect();
        for (flag, value) in options {
            args.push(OsString::from(*flag));
            args.push(OsString::from(value));
        }
        if let Some(profile) = &self.config.profile {
            args.push(OsString::from("--profile"));
            args.push(OsString::from(profile));
        }
        // The scheduler owns retries; one call must be one API request.
        args.push(OsString::from("--no-retry"));
        args.push(OsString::from("--output"));
        args.push(OsString::from("json"));
        args
    }

    /// Runs the CLI and returns stdout when it exits cleanly.
    async fn run_oci(&self, operation: &str, args: &[OsString]) -> Result<String, ProviderError> {
        let output = self.runner.run(&self.config.oci_bin, args).await?;
        if output.is_success() {
            return Ok(output.stdout);
        }
        Err(failure_from_output(operation, &output))
    }

    async fn run_oci_json<T>(&self, operation: &str, args: &[OsString]) -> Result<T, ProviderError>
    where
        T: DeserializeOwned,
    {
        let stdout = self.run_oci(operation, args).await?;
        parse_data(operation, &stdout)
    }

    fn launch_args(&self, profile: &ResourceProfile, context: &ProvisionContext) -> Vec<OsString> {
        let shape_config = json!({
            "ocpus": profile.cpu_count,
            "memoryInGBs": profile.memory_size_gb,
        });
        let metadata = json!({ "ssh_authorized_keys": context.ssh_public_key });
        self.build_args(
            &["compute", "instance", "launch"],
            &[
                ("--compartment-id", context.compartment_id.clone()),
                ("--availability-domain", context.availability_domain.clone()),
                ("--display-name", context.display_name.clone()),
                ("--shape", context.shape.clone()),
                ("--shape-config", shape_config.to_string()),
                ("--image-id", context.image_id.clone()),
                (
                    "--boot-volume-size-in-gbs",
                    context.boot_volume_size_gb.to_string(),
                ),
                ("--subnet-id", context.subnet_id.clone()),
                ("--assign-public-ip", String::from("true")),
                ("--vnic-display-name", format!("{}-vnic", context.display_name)),
                ("--metadata", metadata.to_string()),
            ],
        )
    }
}

fn parse_data<T>(operation: &str, stdout: &str) -> Result<T, ProviderError>
where
    T: DeserializeOwned,
{
    serde_json::from_str::<Envelope<T>>(stdout)
        .map(|envelope| envelope.data)
        .map_err(|err| ProviderError::Malformed(format!("{operation}: {err}")))
}

impl<R> CloudApi for OciCliBackend<R>
where
    R: CommandRunner + Sync,
{
    fn launch<'a>(
        &'a self,
        profile: &'a ResourceProfile,
        context: &'a ProvisionContext,
    ) -> CloudFuture<'a, InstanceId> {
        Box::pin(async move {
            context.validate()?;
            let args = self.launch_args(profile, context);
            let instance: InstanceData = self.run_oci_json("launch instance", &args).await?;
            Ok(instance.id)
        })
    }

    fn instance_state<'a>(
        &'a self,
        instance_id: &'a InstanceId,
    ) -> CloudFuture<'a, LifecycleState> {
        Box::pin(async move {
            let args = self.build_args(
                &["compute", "instance", "get"],
                &[("--instance-id", instance_id.as_str().to_owned())],
            );
            let instance: InstanceData = self.run_oci_json("get instance", &args).await?;
            Ok(instance.lifecycle_state)
        })
    }

    fn list_vnic_attachments<'a>(
        &'a self,
        compartment_id: &'a str,
        instance_id: &'a InstanceId,
    ) -> CloudFuture<'a, Vec<VnicAttachment>> {
        Box::pin(async move {
            let args = self.build_args(
                &["compute", "vnic-attachment", "list"],
                &[
                    ("--compartment-id", compartment_id.to_owned()),
                    ("--instance-id", instance_id.as_str().to_owned()),
                ],
            );
            let stdout = self.run_oci("list vnic attachments", &args).await?;
            // The CLI prints nothing at all for an empty list.
            if stdout.trim().is_empty() {
                return Ok(Vec::new());
            }
            parse_data::<AttachmentList>("list vnic attachments", &stdout)
        })
    }

    fn vnic_public_ip<'a>(&'a self, vnic_id: &'a str) -> CloudFuture<'a, Option<IpAddr>> {
        Box::pin(async move {
            let args = self.build_args(
                &["network", "vnic", "get"],
                &[("--vnic-id", vnic_id.to_owned())],
            );
            let vnic: VnicData = self.run_oci_json("get vnic", &args).await?;
            vnic.public_ip
                .map(|raw| {
                    raw.parse::<IpAddr>().map_err(|err| {
                        ProviderError::Malformed(format!("get vnic: public-ip {raw}: {err}"))
                    })
                })
                .transpose()
        })
    }
}
