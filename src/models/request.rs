//! Requests awaiting approval: friend requests and group join/invite requests.

use serde::Deserialize;
use serde_json::{json, Value};

use super::{str_field, Lineage};
use crate::constants::actions;
use crate::engine::EngineLink;
use crate::error::EngineError;
use crate::protocol::CallResponse;

/// Kinds of request, rooted at [`RequestKind::Request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Any request (the capability root).
    Request,
    /// Someone asked to become a friend.
    Friend,
    /// Someone asked to join a group, or invited the agent into one.
    Group,
}

impl RequestKind {
    /// All kinds that can be decoded from the wire.
    pub const CONCRETE: [Self; 2] = [Self::Friend, Self::Group];

    /// `request_type` value of a concrete kind; `None` for the root.
    #[must_use]
    pub const fn discriminator(self) -> Option<&'static str> {
        match self {
            Self::Request => None,
            Self::Friend => Some("friend"),
            Self::Group => Some("group"),
        }
    }

    /// Concrete kind for a `request_type` value.
    #[must_use]
    pub fn from_discriminator(request_type: &str) -> Option<Self> {
        Self::CONCRETE
            .into_iter()
            .find(|kind| kind.discriminator() == Some(request_type))
    }
}

impl Lineage for RequestKind {
    fn lineage(self) -> &'static [Self] {
        match self {
            Self::Request => &[Self::Request],
            Self::Friend => &[Self::Request, Self::Friend],
            Self::Group => &[Self::Request, Self::Group],
        }
    }
}

/// A pending friend request.
#[derive(Debug, Clone, Deserialize)]
pub struct FriendRequest {
    /// Agent account that received the request.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// Who asked.
    pub user_id: i64,
    /// Verification message.
    #[serde(default)]
    pub comment: String,
    /// Approval token to pass back when resolving.
    pub flag: String,
    #[serde(skip)]
    link: EngineLink,
}

impl FriendRequest {
    /// Approve or reject the request, optionally setting a remark for the
    /// new friend.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EngineGone`] if the decoding engine was
    /// dropped, or any error of the underlying call.
    pub async fn result(
        &self,
        approve: bool,
        remark: Option<&str>,
    ) -> Result<CallResponse, EngineError> {
        let engine = self.link.upgrade()?;
        engine
            .call_api(
                actions::SET_FRIEND_ADD_REQUEST,
                Some(json!({
                    "flag": self.flag,
                    "approve": approve,
                    "remark": remark,
                })),
            )
            .await
    }
}

/// A pending group join request or invitation.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupRequest {
    /// Agent account that received the request.
    pub self_id: i64,
    /// Unix timestamp (seconds).
    pub time: i64,
    /// `add` (someone asks to join) or `invite` (the agent is invited).
    pub sub_type: String,
    /// Group concerned.
    pub group_id: i64,
    /// Who asked or invited.
    pub user_id: i64,
    /// Verification message.
    #[serde(default)]
    pub comment: String,
    /// Approval token to pass back when resolving.
    pub flag: String,
    #[serde(skip)]
    link: EngineLink,
}

impl GroupRequest {
    /// Approve or reject the request, optionally with a rejection reason.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EngineGone`] if the decoding engine was
    /// dropped, or any error of the underlying call.
    pub async fn result(
        &self,
        approve: bool,
        reason: Option<&str>,
    ) -> Result<CallResponse, EngineError> {
        let engine = self.link.upgrade()?;
        engine
            .call_api(
                actions::SET_GROUP_ADD_REQUEST,
                Some(json!({
                    "flag": self.flag,
                    "sub_type": self.sub_type,
                    "approve": approve,
                    "reason": reason,
                })),
            )
            .await
    }
}

/// A decoded request.
#[derive(Debug, Clone)]
pub enum Request {
    /// See [`FriendRequest`].
    Friend(FriendRequest),
    /// See [`GroupRequest`].
    Group(GroupRequest),
}

impl Request {
    /// Decode a request event.
    ///
    /// Returns `Ok(None)` when the `request_type` names no known kind.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Decode`] when the kind is known but the payload
    /// does not match it.
    pub fn from_value(value: &Value, link: EngineLink) -> Result<Option<Self>, EngineError> {
        let kind = str_field(value, "request_type").and_then(RequestKind::from_discriminator);
        let request = match kind {
            Some(RequestKind::Friend) => {
                let mut request = FriendRequest::deserialize(value)?;
                request.link = link;
                Self::Friend(request)
            }
            Some(RequestKind::Group) => {
                let mut request = GroupRequest::deserialize(value)?;
                request.link = link;
                Self::Group(request)
            }
            Some(RequestKind::Request) | None => return Ok(None),
        };
        Ok(Some(request))
    }

    /// Concrete kind of this request.
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Friend(_) => RequestKind::Friend,
            Self::Group(_) => RequestKind::Group,
        }
    }

    /// Approval token.
    #[must_use]
    pub fn flag(&self) -> &str {
        match self {
            Self::Friend(r) => &r.flag,
            Self::Group(r) => &r.flag,
        }
    }

    /// Account that asked or invited.
    #[must_use]
    pub fn user_id(&self) -> i64 {
        match self {
            Self::Friend(r) => r.user_id,
            Self::Group(r) => r.user_id,
        }
    }

    /// Approve or reject the request. `note` is the friend remark or the
    /// group rejection reason.
    ///
    /// # Errors
    ///
    /// See [`FriendRequest::result`] and [`GroupRequest::result`].
    pub async fn result(&self, approve: bool, note: Option<&str>) -> Result<CallResponse, EngineError> {
        match self {
            Self::Friend(r) => r.result(approve, note).await,
            Self::Group(r) => r.result(approve, note).await,
        }
    }
}
