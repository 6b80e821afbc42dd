//! Bounded log of recoverable playback errors.
//!
//! Nothing in the preview loop propagates errors. Failures are recorded
//! here instead and shown to the user as a dismissible list.

use reelcraft_core::{budget, ReelcraftError};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Seeking or reading an element's time failed.
    VideoSync,
    /// An element refused to start.
    Playback,
    /// The scene could not follow the timeline.
    Render,
    Unknown,
}

impl From<&ReelcraftError> for ErrorCategory {
    fn from(err: &ReelcraftError) -> Self {
        match err {
            ReelcraftError::Playback(_) => Self::Playback,
            ReelcraftError::Render(_) | ReelcraftError::Gpu(_) => Self::Render,
            ReelcraftError::Decoder(_) | ReelcraftError::Media(_) => Self::VideoSync,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEntry {
    pub id: u64,
    pub category: ErrorCategory,
    pub message: String,
    pub clip_id: Option<String>,
    /// Timeline position when the error happened.
    pub timeline_time: f64,
    pub recorded_at: SystemTime,
}

#[derive(Debug, Clone)]
pub struct ErrorLog {
    entries: VecDeque<ErrorEntry>,
    capacity: usize,
    next_id: u64,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(budget::MAX_ERROR_LOG_ENTRIES)),
            capacity,
            next_id: 0,
        }
    }

    /// Append an entry, dropping the oldest past capacity. Returns its id.
    pub fn record(
        &mut self,
        category: ErrorCategory,
        message: impl Into<String>,
        clip_id: Option<&str>,
        timeline_time: f64,
    ) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        if self.capacity == 0 {
            return id;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ErrorEntry {
            id,
            category,
            message: message.into(),
            clip_id: clip_id.map(str::to_owned),
            timeline_time,
            recorded_at: SystemTime::now(),
        });
        id
    }

    /// Remove one entry. Returns whether it was present.
    pub fn dismiss(&mut self, id: u64) -> bool {
        match self.entries.iter().position(|e| e.id == id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &ErrorEntry> {
        self.entries.iter()
    }

    pub fn count(&self, category: ErrorCategory) -> usize {
        self.entries.iter().filter(|e| e.category == category).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(budget::MAX_ERROR_LOG_ENTRIES)
    }
}
