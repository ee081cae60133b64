//! Routes debuggee responses to the requests waiting for them.
//!
//! Tracks pending requests by sequence number and hands each response to
//! its caller over a oneshot channel.

use std::collections::HashMap;

use tokio::sync::oneshot;
use v8bridge_protocol::Response;

/// Pending requests keyed by sequence number.
#[derive(Debug, Default)]
pub struct Dispatcher {
    pending: HashMap<i64, oneshot::Sender<Response>>,
    closed: bool,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending request and return a receiver for the response.
    ///
    /// Once the dispatcher is closed the receiver fails immediately.
    pub fn register(&mut self, seq: i64) -> oneshot::Receiver<Response> {
        let (tx, rx) = oneshot::channel();
        if !self.closed {
            self.pending.insert(seq, tx);
        }
        rx
    }

    /// How many requests are pending.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Hand a response to the request it answers.
    ///
    /// Returns `false` when no request with that sequence number is pending.
    pub fn dispatch(&mut self, response: Response) -> bool {
        match self.pending.remove(&response.request_seq) {
            Some(sender) => {
                // The caller may have given up waiting.
                let _ = sender.send(response);
                true
            }
            None => {
                tracing::warn!(
                    request_seq = response.request_seq,
                    command = %response.command,
                    "response for unknown request"
                );
                false
            }
        }
    }

    /// Cancel a pending request. Returns true if it was found and canceled.
    pub fn cancel(&mut self, seq: i64) -> bool {
        self.pending.remove(&seq).is_some()
    }

    /// Cancel all pending requests. Their receivers observe a closed channel.
    pub fn cancel_all(&mut self) {
        self.pending.clear();
    }

    /// Cancel everything pending and refuse later registrations.
    pub fn close(&mut self) {
        self.closed = true;
        self.cancel_all();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}
