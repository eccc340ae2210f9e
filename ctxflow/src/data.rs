//! Payloads carried by a context.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Data that can be attached to a context.
///
/// Implementors opt into activation callbacks by returning `true` from
/// [`has_callback`](RequestData::has_callback). `on_set` then fires when the
/// entry becomes part of the calling thread's active context, and `on_unset`
/// when it stops being part of it. Every `on_set` is matched by exactly one
/// later `on_unset`, unless the entry is still active when the thread ends.
///
/// Callbacks run without any ctxflow lock held, so they may freely read or
/// mutate the context that triggered them.
///
/// ```rust
/// use ctxflow::data::RequestData;
///
/// struct Deadline(std::time::Instant);
///
/// impl RequestData for Deadline {}
/// ```
pub trait RequestData: Send + Sync + 'static {
    /// Whether `on_set`/`on_unset` should be invoked for this payload.
    fn has_callback(&self) -> bool {
        false
    }

    /// Called when the payload becomes active on the calling thread.
    fn on_set(&self) {}

    /// Called when the payload stops being active on the calling thread.
    fn on_unset(&self) {}
}

/// A type-erased shared payload.
pub type SharedData = Arc<dyn RequestData>;

/// A stored payload, kept both as its capability object and as `Any` for downcasting.
///
/// Both handles point at the same allocation.
#[derive(Clone)]
pub(crate) struct Entry {
    data: SharedData,
    any: Arc<dyn Any + Send + Sync>,
}

impl Entry {
    pub(crate) fn new<T: RequestData>(value: Arc<T>) -> Self {
        Self {
            any: value.clone(),
            data: value,
        }
    }

    pub(crate) fn data(&self) -> &SharedData {
        &self.data
    }

    pub(crate) fn downcast<T: RequestData>(&self) -> Option<Arc<T>> {
        self.any.clone().downcast::<T>().ok()
    }

    /// Whether both entries hold the same payload instance.
    pub(crate) fn same_payload(&self, other: &Self) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.any).cast::<()>(),
            Arc::as_ptr(&other.any).cast::<()>(),
        )
    }

    pub(crate) fn has_callback(&self) -> bool {
        self.data.has_callback()
    }

    pub(crate) fn fire_set(&self) {
        if self.data.has_callback() {
            self.data.on_set();
        }
    }

    pub(crate) fn fire_unset(&self) {
        if self.data.has_callback() {
            self.data.on_unset();
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("has_callback", &self.has_callback())
            .finish_non_exhaustive()
    }
}
