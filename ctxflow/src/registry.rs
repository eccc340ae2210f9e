//! Process-wide directory of the lineage active on each thread.
//!
//! Every install/uninstall on a thread records the root id of that
//! thread's newly active context here. Entries are never removed, so a
//! snapshot reports the last known root of every thread that ever touched
//! the slot.

use dashmap::DashMap;
use std::fmt;
use std::sync::OnceLock;
use std::thread::ThreadId;
use tracing::debug;

/// Identifier shared by a context and every child or overlay derived from it.
///
/// [`RootId::DEFAULT`] is reserved for the implicit default context and is
/// never assigned to an explicitly created context.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(pub(crate) u64);

impl RootId {
    /// The root id of the implicit default context.
    pub const DEFAULT: Self = Self(0);

    /// Returns true for the default context's root id.
    #[must_use]
    pub const fn is_default(self) -> bool {
        self.0 == 0
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The last known root id of one thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootIdEntry {
    /// The thread the entry describes.
    pub thread_id: ThreadId,
    /// The thread's name when the entry was last updated.
    pub thread_name: Option<String>,
    /// The root id of the context active on that thread.
    pub root_id: RootId,
}

/// Thread-safe registry of root ids per thread.
#[derive(Default)]
pub struct RootRegistry {
    entries: DashMap<ThreadId, RootIdEntry>,
}

impl RootRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<RootRegistry> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Registers a thread, keeping any existing entry.
    pub fn register(&self, thread_id: ThreadId, thread_name: Option<String>, root_id: RootId) {
        self.entries.entry(thread_id).or_insert_with(|| {
            debug!(?thread_id, ?thread_name, %root_id, "registering thread");
            RootIdEntry {
                thread_id,
                thread_name,
                root_id,
            }
        });
    }

    /// Records `root_id` as the active lineage of `thread_id`.
    pub fn update(&self, thread_id: ThreadId, thread_name: Option<String>, root_id: RootId) {
        if let Some(mut entry) = self.entries.get_mut(&thread_id) {
            entry.root_id = root_id;
            entry.thread_name = thread_name;
            return;
        }
        self.register(thread_id, thread_name, root_id);
    }

    /// Records `root_id` for the calling thread.
    pub fn update_current_thread(&self, root_id: RootId) {
        let thread = std::thread::current();
        self.update(thread.id(), thread.name().map(String::from), root_id);
    }

    /// Returns the entry for `thread_id`.
    #[must_use]
    pub fn get(&self, thread_id: ThreadId) -> Option<RootIdEntry> {
        self.entries.get(&thread_id).map(|e| e.value().clone())
    }

    /// Returns the recorded name of `thread_id`.
    #[must_use]
    pub fn thread_name(&self, thread_id: ThreadId) -> Option<String> {
        self.entries
            .get(&thread_id)
            .and_then(|e| e.thread_name.clone())
    }

    /// Returns one entry per registered thread, in no particular order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<RootIdEntry> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }

    /// Returns the number of registered threads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no thread is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for RootRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootRegistry")
            .field("threads", &self.len())
            .finish()
    }
}

/// Returns the global registry's snapshot.
#[must_use]
pub fn root_ids_from_all_threads() -> Vec<RootIdEntry> {
    RootRegistry::global().snapshot()
}
