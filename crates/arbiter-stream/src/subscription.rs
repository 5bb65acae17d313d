//! Per-subscriber delivery: token-bucket rate limiting plus a bounded
//! backlog for bursts.

use crate::filter::StreamFilter;
use crate::wire::ServerMessage;
use std::collections::VecDeque;
use tokio::sync::mpsc::UnboundedSender;

/// A subscriber's identity and delivery state.
pub struct Subscription {
    id: String,
    filter: StreamFilter,
    max_events_per_sec: u32,
    server_max_buffered: usize,
    sent_in_window: u32,
    window_start_ms: i64,
    backlog: VecDeque<ServerMessage>,
    dropped: u64,
    outbound: UnboundedSender<ServerMessage>,
}

impl Subscription {
    /// Create a subscription delivering onto `outbound`.
    pub fn new(
        id: impl Into<String>,
        filter: StreamFilter,
        max_events_per_sec: u32,
        server_max_buffered: usize,
        now: i64,
        outbound: UnboundedSender<ServerMessage>,
    ) -> Self {
        Self {
            id: id.into(),
            filter,
            max_events_per_sec: max_events_per_sec.max(1),
            server_max_buffered: server_max_buffered.max(1),
            sent_in_window: 0,
            window_start_ms: now,
            backlog: VecDeque::new(),
            dropped: 0,
            outbound,
        }
    }

    /// This subscription's id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// This subscription's filter.
    pub fn filter(&self) -> &StreamFilter {
        &self.filter
    }

    /// Total events dropped over this subscription's lifetime.
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    fn reset_window_if_elapsed(&mut self, now: i64) {
        if now - self.window_start_ms >= 1000 {
            self.window_start_ms = now;
            self.sent_in_window = 0;
            self.drain_backlog_into_window();
        }
    }

    fn drain_backlog_into_window(&mut self) {
        while self.sent_in_window < self.max_events_per_sec {
            match self.backlog.pop_front() {
                Some(msg) => {
                    self.sent_in_window += 1;
                    let _ = self.outbound.send(msg);
                }
                None => break,
            }
        }
    }

    /// Offer a message for delivery: sends immediately if the window
    /// has capacity, otherwise queues it (dropping the oldest queued
    /// message and emitting `BUFFER_OVERFLOW` if the backlog is full).
    pub fn offer(&mut self, message: ServerMessage, now: i64) {
        self.reset_window_if_elapsed(now);
        if self.sent_in_window < self.max_events_per_sec {
            self.sent_in_window += 1;
            let _ = self.outbound.send(message);
            return;
        }
        if self.backlog.len() >= self.server_max_buffered {
            self.backlog.pop_front();
            self.dropped += 1;
            let _ = self.outbound.send(ServerMessage::buffer_overflow(self.dropped));
        }
        self.backlog.push_back(message);
    }
}
