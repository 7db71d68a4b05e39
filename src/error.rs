//! Errors surfaced by the engine API.
//!
//! Transport and configuration plumbing uses `anyhow`; anything a caller of
//! [`Engine`](crate::Engine) can match on is an [`EngineError`].

use std::time::Duration;

/// Errors that can occur while driving the engine or issuing calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// `start()` was called on an engine that is already running.
    AlreadyStarted,
    /// The agent rejected the access token. Fatal.
    AuthenticationRejected,
    /// No response arrived for a call within the configured timeout.
    CallTimeout {
        /// Action of the call that timed out.
        action: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// The engine dropped the pending call before a response arrived.
    CallAbandoned {
        /// Action of the abandoned call.
        action: String,
    },
    /// The engine that decoded an event no longer exists.
    EngineGone,
    /// A frame or response could not be interpreted.
    Protocol(String),
    /// A handler or command could not be registered.
    Registration(String),
    /// An event payload did not match the expected shape.
    Decode(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyStarted => write!(f, "Engine already started"),
            Self::AuthenticationRejected => write!(f, "Agent rejected the access token"),
            Self::CallTimeout { action, timeout } => {
                write!(f, "Call '{action}' timed out after {}ms", timeout.as_millis())
            }
            Self::CallAbandoned { action } => write!(f, "Call '{action}' was abandoned"),
            Self::EngineGone => write!(f, "Engine is no longer running"),
            Self::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            Self::Registration(msg) => write!(f, "Registration error: {msg}"),
            Self::Decode(msg) => write!(f, "Decode error: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_call_timeout() {
        let err = EngineError::CallTimeout {
            action: "get_msg".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Call 'get_msg' timed out after 250ms");
    }

    #[test]
    fn test_serde_error_maps_to_decode() {
        let err: EngineError = serde_json::from_str::<i64>("\"x\"").unwrap_err().into();
        assert!(matches!(err, EngineError::Decode(_)));
    }
}
