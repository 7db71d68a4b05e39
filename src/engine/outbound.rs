//! Ordered buffer of call frames waiting for the sender loop.
//!
//! The queue outlives individual connections: frames submitted while the
//! engine is reconnecting are sent once the next session's sender loop
//! starts draining.

use tokio::sync::{mpsc, Mutex};

use crate::protocol::OutboundFrame;

/// FIFO of outbound frames, single consumer.
#[derive(Debug)]
pub struct OutboundQueue {
    tx: mpsc::UnboundedSender<OutboundFrame>,
    rx: Mutex<mpsc::UnboundedReceiver<OutboundFrame>>,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Append a frame. Never blocks.
    pub fn push(&self, frame: OutboundFrame) {
        // The receiver lives as long as the queue, so this cannot fail.
        if self.tx.send(frame).is_err() {
            log::error!("[Outbound] Queue receiver dropped");
        }
    }

    /// Wait for the next frame in submission order.
    ///
    /// Holding the consumer lock across the wait keeps a single sender loop
    /// draining at a time; a cancelled wait releases it.
    pub async fn next(&self) -> Option<OutboundFrame> {
        self.rx.lock().await.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(action: &str) -> OutboundFrame {
        OutboundFrame {
            action: action.to_string(),
            params: None,
            echo: action.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = OutboundQueue::new();
        queue.push(frame("a"));
        queue.push(frame("b"));
        queue.push(frame("c"));
        for expected in ["a", "b", "c"] {
            assert_eq!(queue.next().await.unwrap().action, expected);
        }
    }

    #[tokio::test]
    async fn test_next_waits_for_push() {
        let queue = std::sync::Arc::new(OutboundQueue::new());
        let consumer = {
            let queue = std::sync::Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await })
        };
        tokio::task::yield_now().await;
        queue.push(frame("late"));
        assert_eq!(consumer.await.unwrap().unwrap().action, "late");
    }
}
