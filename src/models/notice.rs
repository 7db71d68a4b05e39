//! Notices: recalls, friend/group membership changes, emoji reactions.
//!
//! ```text
//! Notice
//!  ├── Recall
//!  │    ├── PrivateRecall   (friend_recall)
//!  │    └── GroupRecall     (group_recall)
//!  ├── FriendAdd            (friend_add)
//!  ├── GroupIncrease        (group_increase)
//!  ├── GroupDecrease        (group_decrease)
//!  └── EmojiLike            (group_msg_emoji_like)
//! ```

use serde::Deserialize;
use serde_json::Value;

use super::{lenient_i64, str_field, Lineage};
use crate::error::EngineError;

/// Kinds of notice, rooted at [`NoticeKind::Notice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoticeKind {
    /// Any notice (the capability root).
    Notice,
    /// Any recalled message.
    Recall,
    /// A friend recalled a private message.
    PrivateRecall,
    /// A message was recalled in a group.
    GroupRecall,
    /// A new friend was added.
    FriendAdd,
    /// A member joined a group.
    GroupIncrease,
    /// A member left or was removed from a group.
    GroupDecrease,
    /// Someone reacted to a group message with emoji.
    EmojiLike,
}

impl NoticeKind {
    /// All kinds that can be decoded from the wire.
    pub const CONCRETE: [Self; 6] = [
        Self::PrivateRecall,
        Self::GroupRecall,
        Self::FriendAdd,
        Self::GroupIncrease,
        Self::GroupDecrease,
        Self::EmojiLike,
    ];

    /// `notice_type` value of a concrete kind; `None` for abstract kinds.
    #[must_use]
    pub const fn discriminator(self) -> Option<&'static str> {
        match self {
            Self::Notice | Self::Recall => None,
            Self::PrivateRecall => Some("friend_recall"),
            Self::GroupRecall => Some("group_recall"),
            Self::FriendAdd => Some("friend_add"),
            Self::GroupIncrease => Some("group_increase"),
            Self::GroupDecrease => Some("group_decrease"),
            Self::EmojiLike => Some("group_msg_emoji_like"),
        }
    }

    /// Concrete kind for a `notice_type` value.
    #[must_use]
    pub fn from_discriminator(notice_type: &str) -> Option<Self> {
        Self::CONCRETE
            .into_iter()
            .find(|kind| kind.discriminator() == Some(notice_type))
    }
}

impl Lineage for NoticeKind {
    fn lineage(self) -> &'static [Self] {
        match self {
            Self::Notice => &[Self::Notice],
            Self::Recall => &[Self::Notice, Self::Recall],
            Self::PrivateRecall => &[Self::Notice, Self::Recall, Self::PrivateRecall],
            Self::GroupRecall => &[Self::Notice, Self::Recall, Self::GroupRecall],
            Self::FriendAdd => &[Self::Notice, Self::FriendAdd],
            Self::GroupIncrease => &[Self::Notice, Self::GroupIncrease],
            Self::GroupDecrease => &[Self::Notice, Self::GroupDecrease],
            Self::EmojiLike => &[Self::Notice, Self::EmojiLike],
        }
    }
}

/// A friend recalled one of their private messages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PrivateRecall {
    /// Agent account that observed the notice.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// Friend who recalled the message.
    pub user_id: i64,
    /// Id of the recalled message.
    pub message_id: i64,
}

/// A message was recalled in a group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupRecall {
    /// Agent account that observed the notice.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// Author of the recalled message.
    pub user_id: i64,
    /// Id of the recalled message.
    pub message_id: i64,
    /// Group of the recalled message.
    pub group_id: i64,
    /// Member who performed the recall.
    pub operator_id: i64,
}

/// A friend was added.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FriendAdd {
    /// Agent account that observed the notice.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// The new friend.
    pub user_id: i64,
}

/// A member joined a group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupIncrease {
    /// Agent account that observed the notice.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// `approve` (admin approved) or `invite` (admin invited).
    pub sub_type: String,
    /// Group that grew.
    pub group_id: i64,
    /// Admin who approved or invited.
    pub operator_id: i64,
    /// The new member.
    pub user_id: i64,
}

/// A member left a group.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GroupDecrease {
    /// Agent account that observed the notice.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// `leave`, `kick` or `kick_me`.
    pub sub_type: String,
    /// Group that shrank.
    pub group_id: i64,
    /// Member who kicked (equals `user_id` on leave).
    pub operator_id: i64,
    /// Member who left.
    pub user_id: i64,
}

/// One emoji and how many times it was used.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmojiCount {
    /// Emoji id.
    #[serde(deserialize_with = "lenient_i64")]
    pub emoji_id: i64,
    /// Number of reactions with this emoji.
    #[serde(deserialize_with = "lenient_i64")]
    pub count: i64,
}

/// Emoji reactions on a group message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmojiLike {
    /// Agent account that observed the notice.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// Member who reacted.
    pub user_id: i64,
    /// Group of the message.
    pub group_id: i64,
    /// Message reacted to, when the agent reports it.
    #[serde(default)]
    pub message_id: Option<i64>,
    /// Reactions, in the order the agent reported them.
    #[serde(default)]
    pub likes: Vec<EmojiCount>,
}

/// A decoded notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// See [`PrivateRecall`].
    PrivateRecall(PrivateRecall),
    /// See [`GroupRecall`].
    GroupRecall(GroupRecall),
    /// See [`FriendAdd`].
    FriendAdd(FriendAdd),
    /// See [`GroupIncrease`].
    GroupIncrease(GroupIncrease),
    /// See [`GroupDecrease`].
    GroupDecrease(GroupDecrease),
    /// See [`EmojiLike`].
    EmojiLike(EmojiLike),
}

impl Notice {
    /// Decode a notice event.
    ///
    /// Returns `Ok(None)` when the `notice_type` names no known kind.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Decode`] when the kind is known but the payload
    /// does not match it.
    pub fn from_value(value: &Value) -> Result<Option<Self>, EngineError> {
        let Some(kind) = str_field(value, "notice_type").and_then(NoticeKind::from_discriminator)
        else {
            return Ok(None);
        };

        let notice = match kind {
            NoticeKind::PrivateRecall => Self::PrivateRecall(PrivateRecall::deserialize(value)?),
            NoticeKind::GroupRecall => Self::GroupRecall(GroupRecall::deserialize(value)?),
            NoticeKind::FriendAdd => Self::FriendAdd(FriendAdd::deserialize(value)?),
            NoticeKind::GroupIncrease => Self::GroupIncrease(GroupIncrease::deserialize(value)?),
            NoticeKind::GroupDecrease => Self::GroupDecrease(GroupDecrease::deserialize(value)?),
            NoticeKind::EmojiLike => Self::EmojiLike(EmojiLike::deserialize(value)?),
            NoticeKind::Notice | NoticeKind::Recall => return Ok(None),
        };
        Ok(Some(notice))
    }

    /// Concrete kind of this notice.
    #[must_use]
    pub fn kind(&self) -> NoticeKind {
        match self {
            Self::PrivateRecall(_) => NoticeKind::PrivateRecall,
            Self::GroupRecall(_) => NoticeKind::GroupRecall,
            Self::FriendAdd(_) => NoticeKind::FriendAdd,
            Self::GroupIncrease(_) => NoticeKind::GroupIncrease,
            Self::GroupDecrease(_) => NoticeKind::GroupDecrease,
            Self::EmojiLike(_) => NoticeKind::EmojiLike,
        }
    }

    /// Agent account that observed the notice.
    #[must_use]
    pub fn self_id(&self) -> i64 {
        match self {
            Self::PrivateRecall(n) => n.self_id,
            Self::GroupRecall(n) => n.self_id,
            Self::FriendAdd(n) => n.self_id,
            Self::GroupIncrease(n) => n.self_id,
            Self::GroupDecrease(n) => n.self_id,
            Self::EmojiLike(n) => n.self_id,
        }
    }

    /// Unix timestamp (seconds).
    #[must_use]
    pub fn time(&self) -> i64 {
        match self {
            Self::PrivateRecall(n) => n.time,
            Self::GroupRecall(n) => n.time,
            Self::FriendAdd(n) => n.time,
            Self::GroupIncrease(n) => n.time,
            Self::GroupDecrease(n) => n.time,
            Self::EmojiLike(n) => n.time,
        }
    }

    /// `(user_id, message_id)` of a recall notice of either kind.
    #[must_use]
    pub fn recalled(&self) -> Option<(i64, i64)> {
        match self {
            Self::PrivateRecall(n) => Some((n.user_id, n.message_id)),
            Self::GroupRecall(n) => Some((n.user_id, n.message_id)),
            _ => None,
        }
    }
}
