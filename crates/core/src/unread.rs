//! Unread Tracker.
//!
//! Client-local bookkeeping of unread messages per thread, driven by the live event stream.
//!
//! Rules:
//! - each `message.created` event for a thread that is not active adds exactly 1
//! - events for the active thread never add
//! - a thread's count returns to 0 when it is active and its messages have been loaded
//!
//! Counters never go negative.

use crate::bus::ChatEvent;
use crate::model::ThreadId;
use std::collections::HashMap;

#[derive(Clone, Debug, Default)]
pub struct UnreadTracker {
    counts: HashMap<ThreadId, u32>,
    active: Option<ThreadId>,
}

impl UnreadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a live event. Only `message.created` affects counters.
    pub fn on_event(&mut self, event: &ChatEvent) {
        if let ChatEvent::MessageCreated { thread_id, .. } = event {
            self.on_message(thread_id);
        }
    }

    /// Records one new message in `thread_id`.
    pub fn on_message(&mut self, thread_id: &ThreadId) {
        if self.active.as_ref() == Some(thread_id) {
            return;
        }
        let count = self.counts.entry(thread_id.clone()).or_insert(0);
        *count = count.saturating_add(1);
    }

    /// Makes `thread_id` the active thread. Its count is kept until [`UnreadTracker::loaded`].
    pub fn open(&mut self, thread_id: ThreadId) {
        self.active = Some(thread_id);
    }

    /// Clears the active thread, for example when the user leaves the conversation view.
    pub fn close(&mut self) {
        self.active = None;
    }

    /// Signals that the messages of `thread_id` have been (re)loaded.
    ///
    /// Resets the counter only if `thread_id` is the active thread.
    pub fn loaded(&mut self, thread_id: &ThreadId) {
        if self.active.as_ref() == Some(thread_id) {
            self.counts.remove(thread_id);
        }
    }

    pub fn count(&self, thread_id: &ThreadId) -> u32 {
        self.counts.get(thread_id).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.counts
            .values()
            .fold(0u32, |acc, n| acc.saturating_add(*n))
    }

    pub fn active(&self) -> Option<&ThreadId> {
        self.active.as_ref()
    }
}
