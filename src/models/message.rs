//! Chat messages.
//!
//! Messages are the only events that can be answered directly: [`Message::reply`]
//! quotes the original message and routes the answer through the engine that
//! decoded it.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::{str_field, Lineage, User};
use crate::engine::EngineLink;
use crate::error::EngineError;

/// Kinds of message, rooted at [`MessageKind::Any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Any message (the capability root).
    Any,
    /// One-to-one message.
    Private,
    /// Message posted in a group.
    Group,
}

impl Lineage for MessageKind {
    fn lineage(self) -> &'static [Self] {
        match self {
            Self::Any => &[Self::Any],
            Self::Private => &[Self::Any, Self::Private],
            Self::Group => &[Self::Any, Self::Group],
        }
    }
}

/// A private (one-to-one) message.
#[derive(Debug, Clone, Deserialize)]
pub struct PrivateMessage {
    /// Agent account that received the message.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// Agent-assigned message id.
    pub message_id: i64,
    /// Author of the message.
    pub sender: User,
    /// Structured content (segment list or equivalent).
    #[serde(default)]
    pub message: Value,
    /// Plain-text rendering of the content.
    #[serde(default)]
    pub raw_message: String,
    #[serde(skip)]
    link: EngineLink,
}

impl PartialEq for PrivateMessage {
    fn eq(&self, other: &Self) -> bool {
        self.message_id == other.message_id
            && self.sender == other.sender
            && self.self_id == other.self_id
    }
}

impl Eq for PrivateMessage {}

impl Hash for PrivateMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.message_id.hash(state);
        self.sender.hash(state);
        self.self_id.hash(state);
    }
}

/// A message posted in a group.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupMessage {
    /// Agent account that received the message.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// Agent-assigned message id.
    pub message_id: i64,
    /// Author of the message.
    pub sender: User,
    /// Structured content (segment list or equivalent).
    #[serde(default)]
    pub message: Value,
    /// Plain-text rendering of the content.
    #[serde(default)]
    pub raw_message: String,
    /// Group the message was posted in.
    pub group_id: i64,
    #[serde(skip)]
    link: EngineLink,
}

impl PartialEq for GroupMessage {
    fn eq(&self, other: &Self) -> bool {
        self.message_id == other.message_id
            && self.sender == other.sender
            && self.self_id == other.self_id
            && self.group_id == other.group_id
    }
}

impl Eq for GroupMessage {}

impl Hash for GroupMessage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.message_id.hash(state);
        self.sender.hash(state);
        self.self_id.hash(state);
        self.group_id.hash(state);
    }
}

/// A decoded message of either kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Message {
    /// Private message.
    Private(PrivateMessage),
    /// Group message.
    Group(GroupMessage),
}

impl Message {
    /// Decode a message event (or a `get_msg` payload) by its `message_type`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Decode`] for an unknown `message_type` or a
    /// payload missing required fields.
    pub fn from_value(value: &Value, link: EngineLink) -> Result<Self, EngineError> {
        match str_field(value, "message_type") {
            Some("private") => {
                let mut msg = PrivateMessage::deserialize(value)?;
                msg.link = link;
                Ok(Self::Private(msg))
            }
            Some("group") => {
                let mut msg = GroupMessage::deserialize(value)?;
                msg.link = link;
                Ok(Self::Group(msg))
            }
            other => Err(EngineError::Decode(format!(
                "unsupported message_type: {other:?}"
            ))),
        }
    }

    /// Concrete kind of this message.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Private(_) => MessageKind::Private,
            Self::Group(_) => MessageKind::Group,
        }
    }

    /// Agent account that received the message.
    #[must_use]
    pub fn self_id(&self) -> i64 {
        match self {
            Self::Private(m) => m.self_id,
            Self::Group(m) => m.self_id,
        }
    }

    /// Agent-assigned message id.
    #[must_use]
    pub fn message_id(&self) -> i64 {
        match self {
            Self::Private(m) => m.message_id,
            Self::Group(m) => m.message_id,
        }
    }

    /// Author of the message.
    #[must_use]
    pub fn sender(&self) -> &User {
        match self {
            Self::Private(m) => &m.sender,
            Self::Group(m) => &m.sender,
        }
    }

    /// Unix timestamp (seconds).
    #[must_use]
    pub fn time(&self) -> i64 {
        match self {
            Self::Private(m) => m.time,
            Self::Group(m) => m.time,
        }
    }

    /// Timestamp as a UTC date, if it is in range.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.time(), 0)
    }

    /// Structured content.
    #[must_use]
    pub fn content(&self) -> &Value {
        match self {
            Self::Private(m) => &m.message,
            Self::Group(m) => &m.message,
        }
    }

    /// Plain-text rendering of the content.
    #[must_use]
    pub fn raw_message(&self) -> &str {
        match self {
            Self::Private(m) => &m.raw_message,
            Self::Group(m) => &m.raw_message,
        }
    }

    /// Group id for group messages.
    #[must_use]
    pub fn group_id(&self) -> Option<i64> {
        match self {
            Self::Private(_) => None,
            Self::Group(m) => Some(m.group_id),
        }
    }

    /// Reply to this message, quoting it.
    ///
    /// Private messages are answered to the sender, group messages to the
    /// group. Returns the id of the sent message when the agent accepted it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EngineGone`] if the decoding engine was
    /// dropped, or any error of the underlying call.
    pub async fn reply(&self, text: &str) -> Result<Option<i64>, EngineError> {
        let content = Value::String(format!("[CQ:reply,id={}]{}", self.message_id(), text));
        match self {
            Self::Private(m) => {
                let engine = m.link.upgrade()?;
                engine.send_private(m.sender.user_id, content).await
            }
            Self::Group(m) => {
                let engine = m.link.upgrade()?;
                engine.send_group(m.group_id, content).await
            }
        }
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Private(m) => write!(f, "[private {}] {}", m.sender, m.raw_message),
            Self::Group(m) => write!(f, "[group {}] {}: {}", m.group_id, m.sender, m.raw_message),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn private_frame(message_id: i64, user_id: i64, text: &str) -> Value {
        json!({
            "post_type": "message",
            "message_type": "private",
            "sub_type": "friend",
            "self_id": 10001,
            "time": 1_700_000_000,
            "message_id": message_id,
            "user_id": user_id,
            "sender": { "user_id": user_id, "nickname": "alice" },
            "message": [{ "type": "text", "data": { "text": text } }],
            "raw_message": text,
        })
    }

    pub(crate) fn group_frame(message_id: i64, user_id: i64, group_id: i64, text: &str) -> Value {
        json!({
            "post_type": "message",
            "message_type": "group",
            "sub_type": "normal",
            "self_id": 10001,
            "time": 1_700_000_000,
            "message_id": message_id,
            "group_id": group_id,
            "user_id": user_id,
            "sender": { "user_id": user_id, "nickname": "bob", "role": "member" },
            "message": [{ "type": "text", "data": { "text": text } }],
            "raw_message": text,
        })
    }

    pub(crate) fn decode(value: &Value) -> Message {
        Message::from_value(value, EngineLink::default()).unwrap()
    }

    #[test]
    fn test_decode_private_message() {
        let msg = decode(&private_frame(5, 42, "hello"));
        assert_eq!(msg.kind(), MessageKind::Private);
        assert_eq!(msg.message_id(), 5);
        assert_eq!(msg.sender().user_id, 42);
        assert_eq!(msg.raw_message(), "hello");
        assert_eq!(msg.group_id(), None);
        assert_eq!(msg.self_id(), 10001);
    }

    #[test]
    fn test_decode_group_message() {
        let msg = decode(&group_frame(6, 42, 100, "hi all"));
        assert_eq!(msg.kind(), MessageKind::Group);
        assert_eq!(msg.group_id(), Some(100));
        assert!(msg.content().is_array());
    }

    #[test]
    fn test_decode_unknown_message_type_fails() {
        let mut frame = private_frame(1, 2, "x");
        frame["message_type"] = json!("guild");
        let result = Message::from_value(&frame, EngineLink::default());
        assert!(matches!(result, Err(EngineError::Decode(_))));
    }

    #[test]
    fn test_private_equality_ignores_content_and_nickname() {
        let a = decode(&private_frame(5, 42, "hello"));
        let mut other = private_frame(5, 42, "edited");
        other["sender"]["nickname"] = json!("renamed");
        assert_eq!(a, decode(&other));
        assert_ne!(a, decode(&private_frame(6, 42, "hello")));
    }

    #[test]
    fn test_group_equality_includes_group_id() {
        let a = decode(&group_frame(5, 42, 100, "x"));
        assert_eq!(a, decode(&group_frame(5, 42, 100, "y")));
        assert_ne!(a, decode(&group_frame(5, 42, 200, "x")));
    }

    #[test]
    fn test_private_never_equals_group() {
        let private = decode(&private_frame(5, 42, "x"));
        let group = decode(&group_frame(5, 42, 100, "x"));
        assert_ne!(private, group);
    }

    #[test]
    fn test_timestamp() {
        let msg = decode(&private_frame(5, 42, "x"));
        assert_eq!(msg.timestamp().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_lineage() {
        assert!(MessageKind::Private.is_a(MessageKind::Any));
        assert!(MessageKind::Group.is_a(MessageKind::Group));
        assert!(!MessageKind::Group.is_a(MessageKind::Private));
        assert!(!MessageKind::Any.is_a(MessageKind::Group));
    }

    #[tokio::test]
    async fn test_reply_without_engine_is_engine_gone() {
        let msg = decode(&private_frame(5, 42, "x"));
        assert_eq!(msg.reply("hi").await, Err(EngineError::EngineGone));
    }
}
