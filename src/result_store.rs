//! Persists the provisioning result for the downstream deployment step.
//!
//! Two files are written: one holding only the public address (overwritten
//! on every success) and an append-only `key=value` record. The pair is not
//! written transactionally.

use std::fmt::Write as _;
use std::io::Write as _;
use std::net::IpAddr;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::fs::OpenOptions;
use cap_std::{ambient_authority, fs_utf8::Dir};
use thiserror::Error;

use crate::cloud::InstanceId;
use crate::paths::expand_tilde;
use crate::profile::ResourceProfile;

/// Default location of the file holding only the public address.
pub const DEFAULT_IP_FILE: &str = "~/.oci/server_ip.txt";

/// Default location of the append-only identifier record.
pub const DEFAULT_RECORD_FILE: &str = "~/.oci/infra_ids.txt";

/// Outcome of a successful allocation, handed to downstream tooling.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisioningResult {
    /// Public address, when the network lookup found one.
    pub public_ip: Option<IpAddr>,
    /// Provider identifier of the instance.
    pub instance_id: InstanceId,
    /// Profile that won the allocation.
    pub profile_used: ResourceProfile,
}

/// Errors raised while persisting a result.
#[derive(Debug, Error)]
pub enum ResultStoreError {
    /// Raised when asked to persist a result without an address.
    #[error("instance {instance_id} has no public address to persist")]
    MissingAddress {
        /// Instance the result belongs to.
        instance_id: InstanceId,
    },
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// Abstraction over result persistence for dependency injection.
pub trait ResultWriter {
    /// Persists `result`.
    ///
    /// # Errors
    ///
    /// Returns [`ResultStoreError`] when the result has no address or a
    /// write fails.
    fn persist(&self, result: &ProvisioningResult) -> Result<(), ResultStoreError>;
}

/// Writes results to the address file and the identifier record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileResultStore {
    ip_file: Utf8PathBuf,
    record_file: Utf8PathBuf,
}

impl FileResultStore {
    /// Creates a store writing to the given paths. A leading `~/` is expanded.
    #[must_use]
    pub fn new(ip_file: &str, record_file: &str) -> Self {
        Self {
            ip_file: Utf8PathBuf::from(expand_tilde(ip_file)),
            record_file: Utf8PathBuf::from(expand_tilde(record_file)),
        }
    }

    /// Path of the address file.
    #[must_use]
    pub fn ip_file(&self) -> &Utf8Path {
        &self.ip_file
    }

    /// Path of the identifier record.
    #[must_use]
    pub fn record_file(&self) -> &Utf8Path {
        &self.record_file
    }
}

impl Default for FileResultStore {
    fn default() -> Self {
        Self::new(DEFAULT_IP_FILE, DEFAULT_RECORD_FILE)
    }
}

impl ResultWriter for FileResultStore {
    fn persist(&self, result: &ProvisioningResult) -> Result<(), ResultStoreError> {
        let ip = result
            .public_ip
            .ok_or_else(|| ResultStoreError::MissingAddress {
                instance_id: result.instance_id.clone(),
            })?;

        let (ip_dir, ip_name) = open_parent(&self.ip_file)?;
        ip_dir
            .write(ip_name, ip.to_string())
            .map_err(|err| io_error(&self.ip_file, &err))?;

        let mut record = String::new();
        // Writing into a String cannot fail.
        writeln!(record, "instance_id={}", result.instance_id).ok();
        writeln!(record, "public_ip={ip}").ok();

        let (record_dir, record_name) = open_parent(&self.record_file)?;
        let mut options = OpenOptions::new();
        options.append(true).create(true);
        let mut file = record_dir
            .open_with(record_name, &options)
            .map_err(|err| io_error(&self.record_file, &err))?;
        file.write_all(record.as_bytes())
            .map_err(|err| io_error(&self.record_file, &err))
    }
}

fn io_error(path: &Utf8Path, err: &std::io::Error) -> ResultStoreError {
    ResultStoreError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Creates the parent directory if needed and opens it with ambient
/// authority, returning the directory and the file name inside it.
fn open_parent(path: &Utf8Path) -> Result<(Dir, &str), ResultStoreError> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_str().is_empty() => dir,
        _ => Utf8Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| ResultStoreError::Io {
        path: path.to_path_buf(),
        message: String::from("path is missing a file name"),
    })?;

    Dir::create_ambient_dir_all(parent, ambient_authority())
        .map_err(|err| io_error(parent, &err))?;
    let dir =
        Dir::open_ambient_dir(parent, ambient_authority()).map_err(|err| io_error(parent, &err))?;
    Ok((dir, file_name))
}
