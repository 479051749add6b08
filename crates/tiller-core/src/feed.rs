// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::Stream;
use tokio::sync::Notify;

use tiller_model::StreamMessage;

/// The live input feed consumed by the runtime for the whole life of a
/// query: a single-consumer, multi-producer lazy sequence that the UI can
/// keep injecting turns into after the call has started.
///
/// Queue-first contract: a pushed message lands in the queue *before* the
/// waiter is notified, so a slow or cancelling consumer can never lose it.
/// Ordering is FIFO.  `push` is total: when the feed is stopped the
/// message is dropped silently.
#[derive(Default)]
pub struct LiveMessageFeed {
    queue: Mutex<VecDeque<StreamMessage>>,
    notify: Notify,
    stopped: AtomicBool,
}

impl LiveMessageFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a message and wake the consumer if it is waiting.
    pub fn push(&self, message: StreamMessage) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        self.queue.lock().unwrap().push_back(message);
        self.notify.notify_one();
    }

    /// Mark the feed stopped and wake the consumer so its loop exits.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Clear the stopped flag so a new consumer can resume.  The queue is
    /// intentionally left alone: messages pushed while no consumer was
    /// attached are delivered to the next one.
    pub fn reset(&self) {
        self.stopped.store(false, Ordering::SeqCst);
    }

    /// Drop everything queued and return how many messages were discarded.
    pub fn clear_queue(&self) -> usize {
        let mut queue = self.queue.lock().unwrap();
        let cleared = queue.len();
        queue.clear();
        cleared
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// The next message, or `None` once the feed is stopped and drained of
    /// any message popped before the stop was observed.
    pub async fn next(&self) -> Option<StreamMessage> {
        loop {
            if let Some(message) = self.queue.lock().unwrap().pop_front() {
                return Some(message);
            }
            if self.stopped.load(Ordering::SeqCst) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// The consumer-facing lazy sequence over this feed.
    pub fn stream(self: Arc<Self>) -> impl Stream<Item = StreamMessage> + Send {
        futures::stream::unfold(self, |feed| async move {
            feed.next().await.map(|message| (message, feed))
        })
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
