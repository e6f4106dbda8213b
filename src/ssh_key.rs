//! Loading of the SSH public key installed on the new instance.

use thiserror::Error;

use crate::paths::{expand_tilde, read_to_string_ambient};

/// Errors raised while loading SSH key material.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum SshKeyError {
    /// Raised when the configured path is empty or only whitespace.
    #[error("SSH public key file path must not be empty")]
    PathEmpty,
    /// Raised when the key file is empty or only whitespace.
    #[error("SSH public key file `{path}` is empty")]
    FileEmpty {
        /// Expanded path of the empty file.
        path: String,
    },
    /// Raised when reading the key file fails.
    #[error("failed to read SSH public key file `{path}`: {message}")]
    FileRead {
        /// Expanded path that failed to read.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

/// Reads public key material from `path`, expanding `~/` and trimming
/// surrounding whitespace.
///
/// # Errors
///
/// Returns [`SshKeyError`] when the path is blank, unreadable, or the file is
/// empty.
pub fn load_public_key(path: &str) -> Result<String, SshKeyError> {
    if path.trim().is_empty() {
        return Err(SshKeyError::PathEmpty);
    }

    let expanded = expand_tilde(path);
    let content = read_to_string_ambient(&expanded).map_err(|message| SshKeyError::FileRead {
        path: expanded.clone(),
        message,
    })?;

    let key = content.trim();
    if key.is_empty() {
        return Err(SshKeyError::FileEmpty { path: expanded });
    }
    Ok(key.to_owned())
}

/// Derives the private key path conventionally paired with a public key
/// (`id_ed25519.pub` → `id_ed25519`), used only for operator hints.
#[must_use]
pub fn private_key_hint(public_key_path: &str) -> &str {
    public_key_path
        .strip_suffix(".pub")
        .unwrap_or(public_key_path)
}
