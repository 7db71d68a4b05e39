//! Wire frames exchanged with the agent.
//!
//! # Protocol
//!
//! - Outbound calls: `{"action": ..., "params": {...} | null, "echo": "<token>"}`
//! - Call responses carry the same `echo` plus `status`, `retcode` and `data`
//! - Push events carry no `echo` and are discriminated by `post_type`
//!
//! A `retcode` of [`RETCODE_AUTH_REJECTED`] on any frame means the agent
//! refused the access token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::RETCODE_AUTH_REJECTED;
use crate::error::EngineError;

/// An outbound call frame.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OutboundFrame {
    /// Action name (e.g., "send_group_msg").
    pub action: String,
    /// Action parameters, `null` when the action takes none.
    pub params: Option<Value>,
    /// Correlation token echoed back by the agent.
    pub echo: String,
}

/// Response to a previously issued call.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct CallResponse {
    /// "ok", "async" or "failed".
    #[serde(default)]
    pub status: String,
    /// Agent return code, 0 on success.
    #[serde(default)]
    pub retcode: i64,
    /// Response payload.
    #[serde(default)]
    pub data: Value,
    /// Short diagnostic message, if the agent sent one.
    #[serde(default)]
    pub message: Option<String>,
    /// Human readable diagnostic, if the agent sent one.
    #[serde(default)]
    pub wording: Option<String>,
}

impl CallResponse {
    /// Whether the agent reported success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }

    /// Extract `data.message_id`, present on successful send actions.
    #[must_use]
    pub fn message_id(&self) -> Option<i64> {
        if !self.is_ok() {
            return None;
        }
        self.data.get("message_id").and_then(Value::as_i64)
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// The agent rejected the access token.
    AuthRejected,
    /// Response to a call, keyed by its echo.
    Response {
        /// Correlation token.
        echo: String,
        /// Decoded response.
        response: CallResponse,
    },
    /// Response frame whose body could not be decoded.
    MalformedResponse {
        /// Correlation token of the call it answers.
        echo: String,
        /// Why decoding failed.
        reason: String,
    },
    /// Unsolicited push event.
    Event(Value),
}

impl InboundFrame {
    /// Parse and classify a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Protocol`] if the text is not a JSON object.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| EngineError::Protocol(format!("invalid JSON frame: {e}")))?;
        Self::classify(value)
    }

    /// Classify an already decoded frame.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Protocol`] for non-object frames. A response
    /// with a malformed body keeps its echo so the caller can be failed.
    pub fn classify(value: Value) -> Result<Self, EngineError> {
        if !value.is_object() {
            return Err(EngineError::Protocol("frame is not a JSON object".to_string()));
        }

        if value.get("retcode").and_then(Value::as_i64) == Some(RETCODE_AUTH_REJECTED) {
            return Ok(Self::AuthRejected);
        }

        let echo = match value.get("echo") {
            None | Some(Value::Null) => return Ok(Self::Event(value)),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        match serde_json::from_value(value) {
            Ok(response) => Ok(Self::Response { echo, response }),
            Err(e) => Ok(Self::MalformedResponse {
                reason: format!("malformed response for echo {echo}: {e}"),
                echo,
            }),
        }
    }
}

/// Generate a fresh correlation token.
#[must_use]
pub fn new_echo() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
