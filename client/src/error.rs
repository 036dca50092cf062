use thiserror::Error;

/// Errors surfaced by the synchronization core.
///
/// `Clone` so that a single readiness outcome can be handed to every caller
/// waiting on the same start attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The call never reached the daemon or got no parseable response.
    #[error("{0}")]
    Transport(String),
    /// The platform refused to run the daemon binary. Terminal until the
    /// user fixes permissions and retries.
    #[error("daemon blocked: {0}")]
    DaemonBlocked(String),
    /// The readiness probe budget was exhausted.
    #[error("Daemon failed to start within timeout")]
    DaemonTimeout,
    /// User input rejected before any call was made.
    #[error("{0}")]
    Validation(String),
    /// The daemon answered with a failure payload.
    #[error("{0}")]
    ActionFailed(String),
}

impl ClientError {
    /// True for failures that the next poll tick is expected to recover from.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

/// Normalizes a raw daemon error body into a user-facing message.
///
/// Strips a leading `Error:` marker, then prefers the `.error` field of a
/// JSON object body. Anything else is returned trimmed.
pub fn normalize_error(raw: &str) -> String {
    let trimmed = raw.trim_start();
    let stripped = trimmed.strip_prefix("Error:").unwrap_or(trimmed).trim();
    if stripped.is_empty() {
        return "Request failed".to_string();
    }
    if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(stripped) {
        if let Some(serde_json::Value::String(message)) = map.get("error") {
            return message.clone();
        }
    }
    stripped.to_string()
}
