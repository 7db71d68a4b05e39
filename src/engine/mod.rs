//! The engine: one connection to one agent and everything hanging off it.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── Engine ─────────────────────────────┐
//! │                                                                 │
//! │  call_api ──► CorrelationTable.register ──► OutboundQueue       │
//! │                         ▲                        │              │
//! │                         │ resolve(echo)          ▼              │
//! │  ┌──────────── connection supervisor (start) ─────────────┐     │
//! │  │  receiver loop ◄── WebSocket ◄── agent                 │     │
//! │  │      │                        sender loop ──► agent    │     │
//! │  │      └─► dispatch ─► router / subscriptions            │     │
//! │  └────────────────────────│───────────────────────────────┘     │
//! │                           ▼                                     │
//! │                    TaskSupervisor ─► handlers, error hook       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Decoded events hold an [`EngineLink`], a weak reference back to the
//! engine, so `Message::reply` and `Request::result` can issue calls without
//! keeping the engine alive.

mod connection;
mod correlation;
mod dispatch;
pub mod handler;
mod outbound;
pub mod registry;
pub mod router;
mod subscriptions;
pub mod tasks;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::EngineConfig;
use crate::constants::actions;
use crate::error::EngineError;
use crate::models::{Message, MessageKind, Notice, NoticeKind, Request, RequestKind, User};
use crate::protocol::{CallResponse, OutboundFrame};

use correlation::CorrelationTable;
use outbound::OutboundQueue;
use subscriptions::Subscriptions;

pub use handler::Handler;
pub use registry::EngineRegistry;
pub use router::{Command, CommandRouter, Routing};
pub use tasks::{ErrorHook, HandlerFailure, TaskId, TaskSupervisor};

/// Shared state of one engine.
pub(crate) struct EngineInner {
    config: EngineConfig,
    correlation: CorrelationTable,
    outbound: OutboundQueue,
    messages: RwLock<Subscriptions<MessageKind, Arc<Message>>>,
    notices: RwLock<Subscriptions<NoticeKind, Arc<Notice>>>,
    requests: RwLock<Subscriptions<RequestKind, Arc<Request>>>,
    router: CommandRouter,
    tasks: Arc<TaskSupervisor>,
    registry: Arc<EngineRegistry>,
    running: AtomicBool,
    online: AtomicBool,
    agent_id: Mutex<Option<i64>>,
    me: RwLock<Option<User>>,
}

/// Client engine for one agent connection. Cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("endpoint", &self.inner.config.endpoint)
            .field("agent_id", &self.agent_id())
            .field("online", &self.is_online())
            .field("pending_calls", &self.inner.correlation.len())
            .finish_non_exhaustive()
    }
}

/// Non-owning reference from a decoded event back to its engine.
#[derive(Clone, Debug, Default)]
pub struct EngineLink(Weak<EngineInner>);

impl EngineLink {
    /// The engine, if it still exists.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::EngineGone`] once the engine was dropped.
    pub fn upgrade(&self) -> Result<Engine, EngineError> {
        self.0
            .upgrade()
            .map(Engine::from_inner)
            .ok_or(EngineError::EngineGone)
    }
}

impl Engine {
    /// Create an engine with a private registry.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, Arc::new(EngineRegistry::new()))
    }

    /// Create an engine that registers itself in a shared registry.
    #[must_use]
    pub fn with_registry(config: EngineConfig, registry: Arc<EngineRegistry>) -> Self {
        let router = CommandRouter::new(config.command_prefixes.clone(), config.admins.clone());
        Self {
            inner: Arc::new(EngineInner {
                config,
                correlation: CorrelationTable::new(),
                outbound: OutboundQueue::new(),
                messages: RwLock::new(Subscriptions::default()),
                notices: RwLock::new(Subscriptions::default()),
                requests: RwLock::new(Subscriptions::default()),
                router,
                tasks: TaskSupervisor::new(),
                registry,
                running: AtomicBool::new(false),
                online: AtomicBool::new(true),
                agent_id: Mutex::new(None),
                me: RwLock::new(None),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<EngineInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade_inner(&self) -> Weak<EngineInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn link(&self) -> EngineLink {
        EngineLink(self.downgrade_inner())
    }

    /// Whether two handles refer to the same engine.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Registry this engine registers itself in.
    #[must_use]
    pub fn registry(&self) -> &Arc<EngineRegistry> {
        &self.inner.registry
    }

    // ========== Calls ==========

    /// Issue a call and wait for its response.
    ///
    /// A response with a non-ok status is returned as data; check
    /// [`CallResponse::is_ok`].
    ///
    /// # Errors
    ///
    /// - [`EngineError::CallTimeout`] if no response arrived within the
    ///   configured call timeout; the pending slot is removed.
    /// - [`EngineError::CallAbandoned`] if the engine gave up on all pending
    ///   calls (the agent rejected the token).
    /// - [`EngineError::Protocol`] if the response for this call could not be
    ///   decoded.
    pub async fn call_api(
        &self,
        action: &str,
        params: Option<Value>,
    ) -> Result<CallResponse, EngineError> {
        let (echo, rx) = self.inner.correlation.register();
        log::debug!("[{}] -> {} (echo {})", self.tag(), action, echo);
        self.inner.outbound.push(OutboundFrame {
            action: action.to_string(),
            params,
            echo: echo.clone(),
        });

        let received = match self.inner.config.call_timeout() {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.inner.correlation.forget(&echo);
                    log::warn!("[{}] Call {} timed out (echo {})", self.tag(), action, echo);
                    return Err(EngineError::CallTimeout {
                        action: action.to_string(),
                        timeout: limit,
                    });
                }
            },
            None => rx.await,
        };

        received.map_err(|_| EngineError::CallAbandoned {
            action: action.to_string(),
        })?
    }

    /// Send a private message to a user or a raw user id. Returns the new
    /// message id when accepted.
    ///
    /// # Errors
    ///
    /// Any error of [`Engine::call_api`].
    pub async fn send_private(
        &self,
        user: impl Into<i64>,
        content: impl Into<Value>,
    ) -> Result<Option<i64>, EngineError> {
        let params = json!({ "user_id": user.into(), "message": content.into() });
        let response = self
            .call_api(actions::SEND_PRIVATE_MSG, Some(params))
            .await?;
        Ok(response.message_id())
    }

    /// Send a group message to a group or a raw group id. Returns the new
    /// message id when accepted.
    ///
    /// # Errors
    ///
    /// Any error of [`Engine::call_api`].
    pub async fn send_group(
        &self,
        group: impl Into<i64>,
        content: impl Into<Value>,
    ) -> Result<Option<i64>, EngineError> {
        let params = json!({ "group_id": group.into(), "message": content.into() });
        let response = self.call_api(actions::SEND_GROUP_MSG, Some(params)).await?;
        Ok(response.message_id())
    }

    /// Answer `msg` where it came from, without quoting it.
    pub(crate) async fn send_back(
        &self,
        msg: &Message,
        content: impl Into<Value>,
    ) -> Result<Option<i64>, EngineError> {
        match msg.group_id() {
            Some(group_id) => self.send_group(group_id, content).await,
            None => self.send_private(msg.sender().user_id, content).await,
        }
    }

    /// Fetch a message by id.
    ///
    /// # Errors
    ///
    /// [`EngineError::Protocol`] if the agent refused, [`EngineError::Decode`]
    /// if the payload is not a message, or any error of [`Engine::call_api`].
    pub async fn get_message(&self, message_id: i64) -> Result<Message, EngineError> {
        let response = self
            .call_api(actions::GET_MSG, Some(json!({ "message_id": message_id })))
            .await?;
        if !response.is_ok() {
            return Err(EngineError::Protocol(format!(
                "get_msg {} failed: status {} retcode {}",
                message_id, response.status, response.retcode
            )));
        }
        Message::from_value(&response.data, self.link())
    }

    /// Mark a message as read.
    ///
    /// # Errors
    ///
    /// Any error of [`Engine::call_api`].
    pub async fn mark_as_read(&self, message_id: i64) -> Result<CallResponse, EngineError> {
        self.call_api(
            actions::MARK_MSG_AS_READ,
            Some(json!({ "message_id": message_id })),
        )
        .await
    }

    /// Ask the agent who it is logged in as and remember the answer.
    pub(crate) async fn refresh_identity(&self) -> Result<User, EngineError> {
        let response = self.call_api(actions::GET_LOGIN_INFO, None).await?;
        if !response.is_ok() {
            return Err(EngineError::Protocol(format!(
                "get_login_info failed: status {} retcode {}",
                response.status, response.retcode
            )));
        }
        let user = User::deserialize(&response.data)?;
        log::info!("[{}] Logged in as {}", user.user_id, user);
        *self.inner.me.write().unwrap_or_else(PoisonError::into_inner) = Some(user.clone());
        Ok(user)
    }

    // ========== Registration ==========

    /// Register a command.
    ///
    /// # Errors
    ///
    /// [`EngineError::Registration`] if an alias is invalid or already taken.
    pub fn on_command(&self, command: Command) -> Result<Arc<Command>, EngineError> {
        self.inner.router.register(command)
    }

    /// Subscribe to messages of `kind` (and its descendants).
    pub fn on_msg(&self, kind: MessageKind, handler: Handler<Arc<Message>>) {
        self.inner
            .messages
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(kind, handler);
    }

    /// Subscribe to notices of `kind` (and its descendants).
    pub fn on_notice(&self, kind: NoticeKind, handler: Handler<Arc<Notice>>) {
        self.inner
            .notices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(kind, handler);
    }

    /// Subscribe to requests of `kind` (and its descendants).
    pub fn on_request(&self, kind: RequestKind, handler: Handler<Arc<Request>>) {
        self.inner
            .requests
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(kind, handler);
    }

    /// Install the hook receiving handler failures with their raw frame.
    pub fn on_error(&self, hook: ErrorHook) {
        self.inner.tasks.set_error_hook(hook);
    }

    // ========== State ==========

    /// Account the agent is logged in as, once known.
    #[must_use]
    pub fn me(&self) -> Option<User> {
        self.inner
            .me
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether `user_id` is the agent's own account.
    #[must_use]
    pub fn is_me(&self, user_id: i64) -> bool {
        self.me().is_some_and(|me| me.user_id == user_id)
    }

    /// Online flag from the latest heartbeat.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Agent id announced by the current session, if any.
    #[must_use]
    pub fn agent_id(&self) -> Option<i64> {
        *self
            .inner
            .agent_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `start()` is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Supervisor of in-flight handler work.
    #[must_use]
    pub fn tasks(&self) -> &Arc<TaskSupervisor> {
        &self.inner.tasks
    }

    /// Command router.
    #[must_use]
    pub fn router(&self) -> &CommandRouter {
        &self.inner.router
    }

    /// Number of calls waiting for a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.inner.correlation.len()
    }

    /// Log tag: the logged-in account id, or "Core" before login.
    pub(crate) fn tag(&self) -> String {
        self.me()
            .map_or_else(|| "Core".to_string(), |me| me.user_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::tests::private_frame;
    use crate::models::Group;

    fn config(call_timeout_secs: u64) -> EngineConfig {
        EngineConfig {
            call_timeout_secs,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn test_call_timeout_removes_slot() {
        let engine = Engine::new(config(1));
        let result = engine.call_api("get_status", None).await;
        assert_eq!(
            result,
            Err(EngineError::CallTimeout {
                action: "get_status".to_string(),
                timeout: std::time::Duration::from_secs(1),
            })
        );
        assert_eq!(engine.pending_calls(), 0);
    }

    #[tokio::test]
    async fn test_call_resolved_through_correlation() {
        let engine = Engine::new(config(5));
        let caller = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.send_private(42, "hi").await })
        };

        let frame = engine.inner.outbound.next().await.unwrap();
        assert_eq!(frame.action, "send_private_msg");
        assert_eq!(frame.params.as_ref().unwrap()["user_id"], 42);
        assert_eq!(frame.params.as_ref().unwrap()["message"], "hi");

        let response: CallResponse =
            serde_json::from_value(json!({ "status": "ok", "retcode": 0, "data": { "message_id": 9 } }))
                .unwrap();
        assert!(engine.inner.correlation.resolve(&frame.echo, response));
        assert_eq!(caller.await.unwrap(), Ok(Some(9)));
    }

    #[tokio::test]
    async fn test_send_group_accepts_group_value() {
        let engine = Engine::new(config(5));
        let caller = {
            let engine = engine.clone();
            tokio::spawn(async move {
                let group = Group::new("rust", 100);
                engine.send_group(&group, "hi").await
            })
        };

        let frame = engine.inner.outbound.next().await.unwrap();
        assert_eq!(frame.action, "send_group_msg");
        assert_eq!(frame.params.as_ref().unwrap()["group_id"], 100);
        assert!(engine.inner.correlation.forget(&frame.echo));
        assert_eq!(
            caller.await.unwrap(),
            Err(EngineError::CallAbandoned {
                action: "send_group_msg".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_abandoned_call() {
        let engine = Engine::new(config(0));
        let caller = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.mark_as_read(1).await })
        };
        let _ = engine.inner.outbound.next().await.unwrap();
        assert_eq!(engine.inner.correlation.abandon_all(), 1);
        assert_eq!(
            caller.await.unwrap(),
            Err(EngineError::CallAbandoned {
                action: "mark_msg_as_read".to_string(),
            })
        );
    }

    #[test]
    fn test_link_outlives_engine() {
        let engine = Engine::new(EngineConfig::default());
        let link = engine.link();
        assert!(link.upgrade().is_ok_and(|e| e.ptr_eq(&engine)));
        drop(engine);
        assert_eq!(link.upgrade().unwrap_err(), EngineError::EngineGone);
    }

    #[test]
    fn test_initial_state() {
        let engine = Engine::new(EngineConfig::default());
        assert!(engine.is_online());
        assert!(engine.me().is_none());
        assert!(!engine.is_me(42));
        assert!(!engine.is_running());
        assert_eq!(engine.tag(), "Core");
        assert_eq!(engine.router().len(), 1);
    }

    #[test]
    fn test_decoded_message_links_back() {
        let engine = Engine::new(EngineConfig::default());
        let msg = Message::from_value(&private_frame(1, 42, "x"), engine.link()).unwrap();
        assert_eq!(msg.sender().user_id, 42);
    }
}
