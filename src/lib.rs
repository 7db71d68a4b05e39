//! botwire - client engine for JSON/WebSocket bot automation agents.
//!
//! The engine keeps one WebSocket connection to a remote agent, correlates
//! outbound calls with their responses, and turns unsolicited push events
//! into typed values delivered to registered handlers and commands.
//!
//! # Architecture
//!
//! - **Engine** - owns the connection supervisor, the call correlation
//!   table, the outbound queue and every registration
//! - **Models** - typed messages, notices and requests with static kind
//!   lineages
//! - **Router** - prefix command routing with audience and admin rules
//! - **Tasks** - supervision of handler work and the error hook
//!
//! # Modules
//!
//! - [`engine`] - Engine, registration API, routing, task supervision
//! - [`models`] - Event values and kinds
//! - [`protocol`] - Wire frames
//! - [`config`] - Configuration loading
//! - [`publisher`] - Web session credentials

pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod models;
pub mod protocol;
pub mod publisher;
pub mod ws;

// Re-export commonly used types
pub use config::EngineConfig;
pub use engine::{
    Command, Engine, EngineLink, EngineRegistry, ErrorHook, Handler, HandlerFailure,
    TaskSupervisor,
};
pub use error::EngineError;
pub use models::{
    Group, Message, MessageKind, Notice, NoticeKind, Request, RequestKind, Target, User,
};
pub use protocol::CallResponse;
pub use publisher::PublisherSession;
