//! Identities: users and groups.
//!
//! Both compare and hash by numeric id only. Nicknames and group names are
//! informational and may change between two observations of the same id.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// A user account as seen by the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Display name at the time of observation.
    #[serde(default)]
    pub nickname: String,
    /// Numeric account id.
    pub user_id: i64,
}

impl User {
    /// Create a user.
    #[must_use]
    pub fn new(nickname: impl Into<String>, user_id: i64) -> Self {
        Self {
            nickname: nickname.into(),
            user_id,
        }
    }
}

impl PartialEq for User {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id
    }
}

impl Eq for User {}

impl Hash for User {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.user_id.hash(state);
    }
}

impl From<&User> for i64 {
    fn from(user: &User) -> Self {
        user.user_id
    }
}

impl From<User> for i64 {
    fn from(user: User) -> Self {
        user.user_id
    }
}

impl std::fmt::Display for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.nickname, self.user_id)
    }
}

/// A group chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Group name at the time of observation.
    #[serde(default, alias = "group_name")]
    pub name: String,
    /// Numeric group id.
    #[serde(alias = "group_id")]
    pub id: i64,
}

impl Group {
    /// Create a group.
    #[must_use]
    pub fn new(name: impl Into<String>, id: i64) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }
}

impl PartialEq for Group {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Group {}

impl Hash for Group {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl From<&Group> for i64 {
    fn from(group: &Group) -> Self {
        group.id
    }
}

impl From<Group> for i64 {
    fn from(group: Group) -> Self {
        group.id
    }
}
