//! Classification and dispatch of push events.
//!
//! Runs inline on the receiver loop, in arrival order. Everything that may
//! wait (handlers, follow-up calls) is handed to the task supervisor, so the
//! receiver is never blocked on handler execution.
//!
//! | `post_type`    | Action                                            |
//! |----------------|---------------------------------------------------|
//! | `message`      | route as command or fan out, then mark as read    |
//! | `meta_event`   | heartbeat: online flag; lifecycle: register, login |
//! | `message_sent` | ignored                                           |
//! | `notice`       | lineage fan-out by `notice_type`                  |
//! | `request`      | lineage fan-out by `request_type`                 |

use std::sync::atomic::Ordering;
use std::sync::{Arc, PoisonError};

use futures_util::FutureExt;
use serde_json::Value;

use super::router::Routing;
use super::Engine;
use crate::constants::UNKNOWN_COMMAND_REPLY;
use crate::models::{str_field, Message, Notice, Request};

impl Engine {
    /// Classify one push event and dispatch it.
    pub(crate) fn dispatch(&self, frame: Value) {
        let frame = Arc::new(frame);
        match str_field(&frame, "post_type") {
            Some("message") => self.dispatch_message(&frame),
            Some("meta_event") => self.dispatch_meta(&frame),
            Some("message_sent") => {}
            Some("notice") => self.dispatch_notice(&frame),
            Some("request") => self.dispatch_request(&frame),
            other => log::warn!("[{}] Unrecognized event post_type {:?}", self.tag(), other),
        }
    }

    fn dispatch_message(&self, frame: &Arc<Value>) {
        let msg = match Message::from_value(frame, self.link()) {
            Ok(msg) => Arc::new(msg),
            Err(e) => {
                log::warn!("[{}] Dropping message event: {}", self.tag(), e);
                return;
            }
        };
        log::info!("[{}] {}", self.tag(), msg);

        let tasks = &self.inner.tasks;
        match self.inner.router.route(&msg) {
            Routing::Commands(commands) => {
                for command in commands {
                    let work = command.handler().invoke(Arc::clone(&msg));
                    tasks.spawn(format!("command:{}", command.name()), Arc::clone(frame), work);
                }
            }
            Routing::Unknown => {
                let engine = self.clone();
                let msg = Arc::clone(&msg);
                tasks.spawn(
                    "command:unknown",
                    Arc::clone(frame),
                    async move {
                        engine.send_back(&msg, UNKNOWN_COMMAND_REPLY).await?;
                        anyhow::Ok(())
                    }
                    .boxed(),
                );
            }
            Routing::Fanout => {
                let handlers = self
                    .inner
                    .messages
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .handlers_for(msg.kind());
                for (kind, handler) in handlers {
                    let work = handler.invoke(Arc::clone(&msg));
                    tasks.spawn(format!("message:{kind:?}"), Arc::clone(frame), work);
                }
            }
        }

        let engine = self.clone();
        let message_id = msg.message_id();
        tasks.spawn(
            "mark_msg_as_read",
            Arc::clone(frame),
            async move {
                engine.mark_as_read(message_id).await?;
                anyhow::Ok(())
            }
            .boxed(),
        );
    }

    fn dispatch_meta(&self, frame: &Arc<Value>) {
        match str_field(frame, "meta_event_type") {
            Some("heartbeat") => {
                let Some(online) = frame
                    .get("status")
                    .and_then(|status| status.get("online"))
                    .and_then(Value::as_bool)
                else {
                    log::debug!("[{}] Heartbeat without online status", self.tag());
                    return;
                };
                let was_online = self.inner.online.swap(online, Ordering::SeqCst);
                if was_online != online {
                    if online {
                        log::info!("[{}] Agent is back online", self.tag());
                    } else {
                        log::warn!("[{}] Agent went offline", self.tag());
                    }
                }
            }
            Some("lifecycle") => {
                if str_field(frame, "sub_type") != Some("connect") {
                    return;
                }
                let Some(agent_id) = frame.get("self_id").and_then(Value::as_i64) else {
                    log::warn!("[{}] Lifecycle connect without self_id", self.tag());
                    return;
                };
                *self
                    .inner
                    .agent_id
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(agent_id);
                self.inner.registry.register(agent_id, self.downgrade_inner());

                let engine = self.clone();
                self.inner.tasks.spawn(
                    "get_login_info",
                    Arc::clone(frame),
                    async move {
                        engine.refresh_identity().await?;
                        anyhow::Ok(())
                    }
                    .boxed(),
                );
            }
            other => log::debug!("[{}] Ignoring meta event {:?}", self.tag(), other),
        }
    }

    fn dispatch_notice(&self, frame: &Arc<Value>) {
        let notice = match Notice::from_value(frame) {
            Ok(Some(notice)) => Arc::new(notice),
            Ok(None) => {
                log::debug!(
                    "[{}] Unsupported notice_type {:?}",
                    self.tag(),
                    str_field(frame, "notice_type")
                );
                return;
            }
            Err(e) => {
                log::warn!("[{}] Dropping notice event: {}", self.tag(), e);
                return;
            }
        };

        let handlers = self
            .inner
            .notices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers_for(notice.kind());
        for (kind, handler) in handlers {
            let work = handler.invoke(Arc::clone(&notice));
            self.inner
                .tasks
                .spawn(format!("notice:{kind:?}"), Arc::clone(frame), work);
        }
    }

    fn dispatch_request(&self, frame: &Arc<Value>) {
        let request = match Request::from_value(frame, self.link()) {
            Ok(Some(request)) => Arc::new(request),
            Ok(None) => {
                log::debug!(
                    "[{}] Unsupported request_type {:?}",
                    self.tag(),
                    str_field(frame, "request_type")
                );
                return;
            }
            Err(e) => {
                log::warn!("[{}] Dropping request event: {}", self.tag(), e);
                return;
            }
        };

        let handlers = self
            .inner
            .requests
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .handlers_for(request.kind());
        for (kind, handler) in handlers {
            let work = handler.invoke(Arc::clone(&request));
            self.inner
                .tasks
                .spawn(format!("request:{kind:?}"), Arc::clone(frame), work);
        }
    }
}
