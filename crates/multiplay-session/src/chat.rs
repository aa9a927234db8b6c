//! Bounded chat history.

use std::collections::VecDeque;

use multiplay_protocol::messages::ChatLine;

pub const DEFAULT_CHAT_CAPACITY: usize = 64;

/// The most recent chat lines; the oldest is evicted when full.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    capacity: usize,
    lines: VecDeque<ChatLine>,
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_CHAT_CAPACITY)
    }
}

impl ChatHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, line: ChatLine) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ChatLine> {
        self.lines.iter()
    }

    pub fn latest(&self) -> Option<&ChatLine> {
        self.lines.back()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}
