//! Typed event values decoded from push frames.
//!
//! Each capability root (messages, notices, requests) has a closed kind
//! enumeration. Every kind knows its static lineage, the chain of kinds from
//! the root down to itself, which is what subscription fan-out walks.

pub mod message;
pub mod notice;
pub mod request;
pub mod target;
pub mod user;

use std::fmt::Debug;
use std::hash::Hash;

use serde::{Deserialize, Deserializer};

pub use message::{GroupMessage, Message, MessageKind, PrivateMessage};
pub use notice::{
    EmojiCount, EmojiLike, FriendAdd, GroupDecrease, GroupIncrease, GroupRecall, Notice,
    NoticeKind, PrivateRecall,
};
pub use request::{FriendRequest, GroupRequest, Request, RequestKind};
pub use target::Target;
pub use user::{Group, User};

/// A kind within a closed event hierarchy.
pub trait Lineage: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    /// Kinds from the capability root down to `self`, inclusive.
    fn lineage(self) -> &'static [Self];

    /// Whether `self` is `ancestor` or descends from it.
    fn is_a(self, ancestor: Self) -> bool {
        self.lineage().contains(&ancestor)
    }
}

/// Accept an integer that the agent may encode as a JSON number or string.
pub(crate) fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Int(v) => Ok(v),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Read a string field of a raw frame.
pub(crate) fn str_field<'a>(value: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(serde_json::Value::as_str)
}
