//! Mock payloads for testing.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::data::RequestData;

/// A payload holding an integer and counting its activation callbacks.
#[derive(Debug, Default)]
pub struct TestData {
    value: i32,
    set: AtomicUsize,
    unset: AtomicUsize,
}

impl TestData {
    /// Creates a payload holding `value`.
    #[must_use]
    pub const fn new(value: i32) -> Self {
        Self {
            value,
            set: AtomicUsize::new(0),
            unset: AtomicUsize::new(0),
        }
    }

    /// Returns the held value.
    #[must_use]
    pub const fn value(&self) -> i32 {
        self.value
    }

    /// Returns how many times `on_set` ran.
    #[must_use]
    pub fn set_count(&self) -> usize {
        self.set.load(Ordering::SeqCst)
    }

    /// Returns how many times `on_unset` ran.
    #[must_use]
    pub fn unset_count(&self) -> usize {
        self.unset.load(Ordering::SeqCst)
    }
}

impl RequestData for TestData {
    fn has_callback(&self) -> bool {
        true
    }

    fn on_set(&self) {
        self.set.fetch_add(1, Ordering::SeqCst);
    }

    fn on_unset(&self) {
        self.unset.fetch_add(1, Ordering::SeqCst);
    }
}

/// A shared, ordered log of callback events.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Creates an empty event log.
#[must_use]
pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// A payload that records `set:<label>` and `unset:<label>` into a log.
#[derive(Debug)]
pub struct RecordingData {
    label: String,
    log: EventLog,
}

impl RecordingData {
    /// Creates a recorder writing to `log`.
    #[must_use]
    pub fn new(label: impl Into<String>, log: EventLog) -> Self {
        Self {
            label: label.into(),
            log,
        }
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl RequestData for RecordingData {
    fn has_callback(&self) -> bool {
        true
    }

    fn on_set(&self) {
        self.log.lock().push(format!("set:{}", self.label));
    }

    fn on_unset(&self) {
        self.log.lock().push(format!("unset:{}", self.label));
    }
}

/// A payload without callbacks that runs a closure when destroyed.
pub struct OnDrop {
    action: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl OnDrop {
    /// Creates a payload that runs `action` on drop.
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            action: Mutex::new(Some(Box::new(action))),
        }
    }
}

impl RequestData for OnDrop {}

impl Drop for OnDrop {
    fn drop(&mut self) {
        if let Some(action) = self.action.get_mut().take() {
            action();
        }
    }
}

impl std::fmt::Debug for OnDrop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnDrop")
            .field("armed", &self.action.lock().is_some())
            .finish()
    }
}
