//! Protocol and runtime constants for botwire.
//!
//! This module centralizes magic numbers and wire strings so the engine,
//! the configuration defaults and the tests agree on them.
//!
//! # Categories
//!
//! - **Timing**: reconnect delay, outbound spacing, call timeout
//! - **Protocol**: distinguished return codes and action names

use std::time::Duration;

// ============================================================================
// Timing
// ============================================================================

/// Delay between a lost connection and the next connection attempt.
///
/// The supervisor retries forever with this fixed delay; there is no backoff.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default minimum spacing between two outbound frames.
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(100);

/// Default time a caller waits for a call response before giving up.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Default endpoint of the remote agent.
pub const DEFAULT_ENDPOINT: &str = "ws://127.0.0.1:3001";

/// Default command prefix character.
pub const DEFAULT_COMMAND_PREFIX: char = '#';

// ============================================================================
// Protocol
// ============================================================================

/// Return code the agent uses to reject the access token.
///
/// Receiving it on any frame is fatal for the engine.
pub const RETCODE_AUTH_REJECTED: i64 = 1403;

/// Exit code of the binary after the agent rejected the access token.
pub const EXIT_AUTH_REJECTED: i32 = 2;

/// Alias of the built-in help command.
pub const HELP_COMMAND: &str = "help";

/// Reply sent when a prefixed message names no registered command.
pub const UNKNOWN_COMMAND_REPLY: &str = "Unknown command, try help";

/// Outbound action names used by the engine itself.
pub mod actions {
    /// Send a private message.
    pub const SEND_PRIVATE_MSG: &str = "send_private_msg";
    /// Send a group message.
    pub const SEND_GROUP_MSG: &str = "send_group_msg";
    /// Fetch one message by id.
    pub const GET_MSG: &str = "get_msg";
    /// Mark a message as read.
    pub const MARK_MSG_AS_READ: &str = "mark_msg_as_read";
    /// Ask the agent which account it is logged in as.
    pub const GET_LOGIN_INFO: &str = "get_login_info";
    /// Fetch web cookies for a domain.
    pub const GET_COOKIES: &str = "get_cookies";
    /// Resolve a pending friend request.
    pub const SET_FRIEND_ADD_REQUEST: &str = "set_friend_add_request";
    /// Resolve a pending group join/invite request.
    pub const SET_GROUP_ADD_REQUEST: &str = "set_group_add_request";
}
