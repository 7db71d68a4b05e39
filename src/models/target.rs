//! Audience specifiers for command allow-lists.
//!
//! Textual forms: `g<id>` for a group, `p<id>` for a private sender, and a
//! bare `<id>` that matches either. The bare form keeps the kind explicit in
//! the type ([`Target::Any`]) so a collision between a group id and a user
//! id is always something the caller opted into.

use std::str::FromStr;

use super::Message;
use crate::error::EngineError;

/// One entry of a command's audience allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// Messages posted in this group.
    Group(i64),
    /// Private messages from this user.
    User(i64),
    /// A group with this id, or private messages from a user with this id.
    Any(i64),
}

impl Target {
    /// Whether a message falls within this target.
    #[must_use]
    pub fn matches(self, msg: &Message) -> bool {
        match msg {
            Message::Group(m) => matches!(self, Self::Group(id) | Self::Any(id) if id == m.group_id),
            Message::Private(m) => {
                matches!(self, Self::User(id) | Self::Any(id) if id == m.sender.user_id)
            }
        }
    }

    /// Whether a message falls within an allow-list. Empty means everyone.
    #[must_use]
    pub fn allows(targets: &[Self], msg: &Message) -> bool {
        targets.is_empty() || targets.iter().any(|t| t.matches(msg))
    }
}

impl From<i64> for Target {
    fn from(id: i64) -> Self {
        Self::Any(id)
    }
}

impl FromStr for Target {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |digits: &str| {
            digits
                .parse::<i64>()
                .map_err(|e| EngineError::Registration(format!("invalid target '{s}': {e}")))
        };

        if let Some(rest) = s.strip_prefix('g') {
            parse(rest).map(Self::Group)
        } else if let Some(rest) = s.strip_prefix('p') {
            parse(rest).map(Self::User)
        } else {
            parse(s).map(Self::Any)
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Group(id) => write!(f, "g{id}"),
            Self::User(id) => write!(f, "p{id}"),
            Self::Any(id) => write!(f, "{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::tests::{decode, group_frame, private_frame};

    #[test]
    fn test_parse_forms() {
        assert_eq!("g100".parse::<Target>().unwrap(), Target::Group(100));
        assert_eq!("p42".parse::<Target>().unwrap(), Target::User(42));
        assert_eq!("7".parse::<Target>().unwrap(), Target::Any(7));
        assert!("gx".parse::<Target>().is_err());
        assert!("".parse::<Target>().is_err());
    }

    #[test]
    fn test_display_matches_parse() {
        for target in [Target::Group(1), Target::User(2), Target::Any(3)] {
            assert_eq!(target.to_string().parse::<Target>().unwrap(), target);
        }
    }

    #[test]
    fn test_group_target_scopes_group_messages() {
        let targets = [Target::Group(100)];
        assert!(Target::allows(&targets, &decode(&group_frame(1, 5, 100, "x"))));
        assert!(!Target::allows(&targets, &decode(&group_frame(1, 5, 200, "x"))));
        assert!(!Target::allows(&targets, &decode(&private_frame(1, 100, "x"))));
    }

    #[test]
    fn test_user_target_scopes_private_messages() {
        let targets = [Target::User(42)];
        assert!(Target::allows(&targets, &decode(&private_frame(1, 42, "x"))));
        assert!(!Target::allows(&targets, &decode(&group_frame(1, 42, 42, "x"))));
    }

    #[test]
    fn test_bare_target_matches_either() {
        let targets = [Target::Any(42)];
        assert!(Target::allows(&targets, &decode(&private_frame(1, 42, "x"))));
        assert!(Target::allows(&targets, &decode(&group_frame(1, 7, 42, "x"))));
    }

    #[test]
    fn test_empty_allow_list_is_unrestricted() {
        assert!(Target::allows(&[], &decode(&private_frame(1, 42, "x"))));
    }
}
