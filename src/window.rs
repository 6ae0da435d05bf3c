//! Rolling window of recent sentences, used as anaphora context.

use std::collections::VecDeque;

/// Default number of sentences kept.
pub const DEFAULT_CAPACITY: usize = 10;

/// Bounded FIFO of the most recent sentences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentenceWindow {
    capacity: usize,
    sentences: VecDeque<String>,
}

impl SentenceWindow {
    /// A capacity of zero keeps nothing.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            sentences: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a sentence, evicting the oldest when full.
    pub fn push(&mut self, sentence: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        if self.sentences.len() == self.capacity {
            self.sentences.pop_front();
        }
        self.sentences.push_back(sentence.into());
    }

    /// Copy of the window, oldest first.
    pub fn snapshot(&self) -> Vec<String> {
        self.sentences.iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }

    pub fn clear(&mut self) {
        self.sentences.clear();
    }
}

impl Default for SentenceWindow {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
