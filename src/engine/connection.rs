//! Connection supervisor: connect, run one session, reconnect.
//!
//! Each session runs two loops over the split WebSocket:
//!
//! - the sender loop drains the outbound queue in order, sleeping the send
//!   interval after every frame;
//! - the receiver loop resolves call responses and dispatches push events.
//!
//! Whichever loop ends first ends the session. A lost session is retried
//! after the reconnect delay, forever; only an authentication rejection
//! stops the supervisor.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::PoisonError;

use super::Engine;
use crate::error::EngineError;
use crate::protocol::InboundFrame;
use crate::ws::{self, WsMessage, WsReader, WsWriter};

/// Why a session ended.
#[derive(Debug)]
enum SessionExit {
    /// Connection lost or refused; reconnect.
    Disconnected,
    /// The agent rejected the access token.
    Rejected,
}

/// Clears the running flag when `start()` returns, is cancelled or unwinds.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Engine {
    /// Run the connection supervisor until a fatal error.
    ///
    /// # Errors
    ///
    /// - [`EngineError::AlreadyStarted`] if the engine is already running.
    /// - [`EngineError::AuthenticationRejected`] when the agent refuses the
    ///   access token; every pending call is abandoned and every tracked
    ///   handler aborted before this returns.
    pub async fn start(&self) -> Result<(), EngineError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(EngineError::AlreadyStarted);
        }
        let _running = RunningGuard(&self.inner.running);
        self.supervise().await
    }

    async fn supervise(&self) -> Result<(), EngineError> {
        let delay = self.inner.config.reconnect_delay();
        loop {
            match self.run_session().await {
                SessionExit::Rejected => {
                    let abandoned = self.inner.correlation.abandon_all();
                    let aborted = self.inner.tasks.abort_all();
                    self.evict_self();
                    log::error!(
                        "[{}] Agent rejected the access token ({} calls abandoned, {} handlers aborted)",
                        self.tag(),
                        abandoned,
                        aborted
                    );
                    return Err(EngineError::AuthenticationRejected);
                }
                SessionExit::Disconnected => {
                    self.evict_self();
                    log::info!(
                        "[Connection] Reconnecting to {} in {}s",
                        self.inner.config.endpoint,
                        delay.as_secs_f32()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn run_session(&self) -> SessionExit {
        let endpoint = ws::http_to_ws_scheme(&self.inner.config.endpoint);
        let endpoint = endpoint.as_str();
        let authorization = self
            .inner
            .config
            .access_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .map(|token| format!("Bearer {token}"));
        let headers: Vec<(&str, &str)> = authorization
            .as_deref()
            .map(|value| ("Authorization", value))
            .into_iter()
            .collect();

        let (writer, reader) = match ws::connect(endpoint, &headers).await {
            Ok(halves) => halves,
            Err(e) => {
                log::warn!("[Connection] Failed to connect to {}: {:#}", endpoint, e);
                return SessionExit::Disconnected;
            }
        };
        log::info!("[Connection] Connected to {}", endpoint);

        tokio::select! {
            exit = self.sender_loop(writer) => exit,
            exit = self.receiver_loop(reader) => exit,
        }
    }

    async fn sender_loop(&self, mut writer: WsWriter) -> SessionExit {
        let interval = self.inner.config.send_interval();
        loop {
            let Some(frame) = self.inner.outbound.next().await else {
                log::error!("[Connection] Outbound queue closed");
                return SessionExit::Disconnected;
            };
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    log::error!("[Connection] Failed to encode {}: {}", frame.action, e);
                    self.inner.correlation.forget(&frame.echo);
                    continue;
                }
            };
            if let Err(e) = writer.send_text(&text).await {
                // The frame is lost with the session; its caller times out.
                log::warn!("[Connection] Send of {} failed: {:#}", frame.action, e);
                return SessionExit::Disconnected;
            }
            log::trace!("[Connection] -> {}", text);
            tokio::time::sleep(interval).await;
        }
    }

    async fn receiver_loop(&self, mut reader: WsReader) -> SessionExit {
        loop {
            match reader.recv().await {
                Some(Ok(WsMessage::Text(text))) => {
                    if let Some(exit) = self.handle_text(&text) {
                        return exit;
                    }
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    log::debug!("[Connection] Ignoring {} byte binary frame", data.len());
                }
                Some(Ok(WsMessage::Close { code, reason })) => {
                    log::info!("[Connection] Closed by agent ({}: {})", code, reason);
                    return SessionExit::Disconnected;
                }
                Some(Err(e)) => {
                    log::warn!("[Connection] {:#}", e);
                    return SessionExit::Disconnected;
                }
                None => {
                    log::info!("[Connection] Stream ended");
                    return SessionExit::Disconnected;
                }
            }
        }
    }

    fn handle_text(&self, text: &str) -> Option<SessionExit> {
        log::trace!("[Connection] <- {}", text);
        match InboundFrame::parse(text) {
            Ok(InboundFrame::AuthRejected) => return Some(SessionExit::Rejected),
            Ok(InboundFrame::Response { echo, response }) => {
                if !self.inner.correlation.resolve(&echo, response) {
                    log::warn!("[{}] Response for unknown echo {}", self.tag(), echo);
                }
            }
            Ok(InboundFrame::MalformedResponse { echo, reason }) => {
                log::warn!("[{}] {}", self.tag(), reason);
                self.inner
                    .correlation
                    .reject(&echo, EngineError::Protocol(reason));
            }
            Ok(InboundFrame::Event(event)) => self.dispatch(event),
            Err(e) => log::warn!("[{}] Discarding frame: {}", self.tag(), e),
        }
        None
    }

    fn evict_self(&self) {
        let agent_id = self
            .inner
            .agent_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(agent_id) = agent_id {
            self.inner.registry.evict(agent_id, &self.downgrade_inner());
        }
    }
}
