//! Configuration loading via `ortho-config`.

use std::ffi::OsString;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::cloud::ProvisionContext;
use crate::oci::{DEFAULT_OCI_BIN, OciCliConfig};
use crate::result_store::{DEFAULT_IP_FILE, DEFAULT_RECORD_FILE, FileResultStore};
use crate::ssh_key::{SshKeyError, load_public_key};

const APP_NAME: &str = "capacity-hunter";
const CONFIG_FILE: &str = "capacity-hunter.toml";

/// Provisioning settings merged from defaults, configuration files and
/// `CAPACITY_HUNTER_*` environment variables.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "CAPACITY_HUNTER",
    discovery(
        app_name = "capacity-hunter",
        env_var = "CAPACITY_HUNTER_CONFIG_PATH",
        config_file_name = "capacity-hunter.toml",
        dotfile_name = ".capacity-hunter.toml",
        project_file_name = "capacity-hunter.toml"
    )
)]
pub struct ProvisionConfig {
    /// Compartment that owns the instance. Required.
    #[ortho_config(default = String::new())]
    pub compartment_id: String,
    /// Availability domain to launch into (for example
    /// `Uocm:EU-FRANKFURT-1-AD-1`). Required.
    #[ortho_config(default = String::new())]
    pub availability_domain: String,
    /// Boot image identifier. Required.
    #[ortho_config(default = String::new())]
    pub image_id: String,
    /// Subnet the primary VNIC attaches to. Required.
    #[ortho_config(default = String::new())]
    pub subnet_id: String,
    /// Public key installed for the default user.
    #[ortho_config(default = "~/.ssh/id_ed25519.pub".to_owned())]
    pub ssh_public_key_file: String,
    /// Flexible shape to request.
    #[ortho_config(default = "VM.Standard.A1.Flex".to_owned())]
    pub shape: String,
    /// Display name for the instance; the VNIC is named `<display_name>-vnic`.
    #[ortho_config(default = "capacity-hunter".to_owned())]
    pub display_name: String,
    /// Boot volume size in gigabytes.
    #[ortho_config(default = 100)]
    pub boot_volume_size_gb: u32,
    /// Path to the `oci` executable.
    #[ortho_config(default = DEFAULT_OCI_BIN.to_owned())]
    pub oci_bin: String,
    /// Profile in `~/.oci/config`; the CLI default is used when unset.
    pub oci_profile: Option<String>,
    /// File overwritten with the public address on success.
    #[ortho_config(default = DEFAULT_IP_FILE.to_owned())]
    pub ip_file: String,
    /// File appended with `instance_id=` and `public_ip=` lines on success.
    #[ortho_config(default = DEFAULT_RECORD_FILE.to_owned())]
    pub record_file: String,
    /// Command printed as the next step, followed by the address.
    #[ortho_config(default = "bash scripts/push-to-server.sh".to_owned())]
    pub deploy_hint: String,
    /// Fail the run when the instance never reports `RUNNING`.
    #[ortho_config(default = false)]
    pub strict_readiness: bool,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

const REQUIRED_FIELDS: [FieldMetadata; 7] = [
    FieldMetadata::new("compartment OCID", "CAPACITY_HUNTER_COMPARTMENT_ID", "compartment_id"),
    FieldMetadata::new(
        "availability domain",
        "CAPACITY_HUNTER_AVAILABILITY_DOMAIN",
        "availability_domain",
    ),
    FieldMetadata::new("image OCID", "CAPACITY_HUNTER_IMAGE_ID", "image_id"),
    FieldMetadata::new("subnet OCID", "CAPACITY_HUNTER_SUBNET_ID", "subnet_id"),
    FieldMetadata::new(
        "SSH public key file",
        "CAPACITY_HUNTER_SSH_PUBLIC_KEY_FILE",
        "ssh_public_key_file",
    ),
    FieldMetadata::new("instance shape", "CAPACITY_HUNTER_SHAPE", "shape"),
    FieldMetadata::new("display name", "CAPACITY_HUNTER_DISPLAY_NAME", "display_name"),
];

impl ProvisionConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to {CONFIG_FILE}",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from(APP_NAME)])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    fn required_values(&self) -> [&str; 7] {
        [
            &self.compartment_id,
            &self.availability_domain,
            &self.image_id,
            &self.subnet_id,
            &self.ssh_public_key_file,
            &self.shape,
            &self.display_name,
        ]
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and configuration key that supply each missing value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::InvalidBootVolume`] when the boot volume size is
    /// zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, metadata) in self.required_values().into_iter().zip(&REQUIRED_FIELDS) {
            Self::require_field(value, metadata)?;
        }
        if self.boot_volume_size_gb == 0 {
            return Err(ConfigError::InvalidBootVolume);
        }
        Ok(())
    }

    /// Reads the configured SSH public key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::SshKey`] when the key cannot be loaded.
    pub fn ssh_public_key(&self) -> Result<String, ConfigError> {
        Ok(load_public_key(&self.ssh_public_key_file)?)
    }

    /// Builds the launch context after validation, loading the SSH key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails or the key cannot be read.
    pub fn provision_context(&self) -> Result<ProvisionContext, ConfigError> {
        self.validate()?;
        Ok(ProvisionContext {
            compartment_id: self.compartment_id.clone(),
            availability_domain: self.availability_domain.clone(),
            image_id: self.image_id.clone(),
            subnet_id: self.subnet_id.clone(),
            ssh_public_key: self.ssh_public_key()?,
            shape: self.shape.clone(),
            display_name: self.display_name.clone(),
            boot_volume_size_gb: self.boot_volume_size_gb,
        })
    }

    /// Settings for the `oci` CLI backend.
    #[must_use]
    pub fn oci_cli_config(&self) -> OciCliConfig {
        OciCliConfig {
            oci_bin: self.oci_bin.clone(),
            profile: self
                .oci_profile
                .as_deref()
                .map(str::trim)
                .filter(|profile| !profile.is_empty())
                .map(str::to_owned),
        }
    }

    /// File-backed result store using the configured paths.
    #[must_use]
    pub fn result_store(&self) -> FileResultStore {
        FileResultStore::new(&self.ip_file, &self.record_file)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Raised when the boot volume size is zero.
    #[error("boot volume size must be greater than zero (CAPACITY_HUNTER_BOOT_VOLUME_SIZE_GB)")]
    InvalidBootVolume,
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Raised when the SSH public key cannot be loaded.
    #[error(transparent)]
    SshKey(#[from] SshKeyError),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
