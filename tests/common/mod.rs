//! Shared test infrastructure.
//!
//! - `fixtures`: builder-style item fixtures over the in-memory store
//! - `RecordingScheduler`: captures calendar wake-up requests
#![allow(dead_code)]

pub mod fixtures;

use chrono::{DateTime, Utc};
use spindle_query::calendar::{Scheduler, WakeHandle};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

/// Scheduler that records requested wake-ups instead of firing them.
#[derive(Default)]
pub struct RecordingScheduler {
    requests: Mutex<Vec<DateTime<Utc>>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> Vec<DateTime<Utc>> {
        self.requests.lock().unwrap().clone()
    }
}

impl Scheduler for RecordingScheduler {
    fn schedule_at(&self, when: DateTime<Utc>, _wake: Box<dyn FnOnce() + Send>) -> WakeHandle {
        self.requests.lock().unwrap().push(when);
        WakeHandle::new(Arc::new(AtomicBool::new(false)))
    }
}
