//! Translation of `oci` CLI failures into [`ProviderError`].

use crate::cloud::ProviderError;
use crate::command::{CommandError, CommandOutput};

use super::types::ServiceErrorBody;

const SERVICE_ERROR_MARKER: &str = "ServiceError:";

impl From<CommandError> for ProviderError {
    fn from(value: CommandError) -> Self {
        Self::Transport(value.to_string())
    }
}

/// Converts a failed CLI invocation into a provider error.
///
/// The CLI prints `ServiceError:` followed by a JSON object when the API
/// rejected the request; anything else is a client-side or network failure.
pub(super) fn failure_from_output(operation: &str, output: &CommandOutput) -> ProviderError {
    if let Some(body) = service_error_body(&output.stderr) {
        return ProviderError::Service {
            code: body.code,
            message: body.message,
            status: body.status,
        };
    }

    let status_text = output
        .code
        .map_or_else(|| String::from("unknown"), |code| code.to_string());
    let stderr = output.stderr.trim();
    ProviderError::Transport(format!(
        "{operation} exited with status {status_text}: {stderr}"
    ))
}

fn service_error_body(stderr: &str) -> Option<ServiceErrorBody> {
    let (_, after_marker) = stderr.split_once(SERVICE_ERROR_MARKER)?;
    let start = after_marker.find('{')?;
    let end = after_marker.rfind('}')?;
    let json = after_marker.get(start..=end)?;
    serde_json::from_str(json).ok()
}
