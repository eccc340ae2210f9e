//! Testing utilities for ctxflow users.
//!
//! This module provides payloads that observe the activation protocol:
//! - [`TestData`] counts `on_set`/`on_unset` calls
//! - [`RecordingData`] appends its callbacks to a shared log
//! - [`OnDrop`] runs a closure when the payload is destroyed

mod mocks;

pub use mocks::{event_log, EventLog, OnDrop, RecordingData, TestData};

#[cfg(test)]
mod logs;
#[cfg(test)]
pub(crate) use logs::LogCapture;
