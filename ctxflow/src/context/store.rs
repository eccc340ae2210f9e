//! Thread-safe keyed entry store.
//!
//! The store only does map bookkeeping under its lock. Replaced and removed
//! entries are handed back to the caller, which fires callbacks and drops
//! them after the lock is released.

use parking_lot::RwLock;
use std::collections::HashMap;

use crate::data::Entry;
use crate::token::Token;

/// The local state of a key.
#[derive(Debug, Clone)]
pub(crate) enum Slot {
    /// The key holds a payload.
    Present(Entry),
    /// The key was cleared in an overlay and hides any inherited payload.
    Cleared,
}

impl Slot {
    pub(crate) fn into_entry(self) -> Option<Entry> {
        match self {
            Self::Present(entry) => Some(entry),
            Self::Cleared => None,
        }
    }
}

/// A keyed store of payloads.
#[derive(Debug, Default)]
pub(crate) struct EntryStore {
    entries: RwLock<HashMap<Token, Slot>>,
}

impl EntryStore {
    /// Creates an empty store.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding the given entries.
    pub(crate) fn from_entries(entries: HashMap<Token, Entry>) -> Self {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Slot::Present(v)))
                    .collect(),
            ),
        }
    }

    /// Returns the local state of `key`, if it was ever touched.
    pub(crate) fn get(&self, key: &Token) -> Option<Slot> {
        self.entries.read().get(key).cloned()
    }

    /// Returns true if `key` was touched locally, cleared or not.
    pub(crate) fn contains(&self, key: &Token) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Inserts `entry`, returning the previous local state.
    pub(crate) fn insert(&self, key: Token, entry: Entry) -> Option<Slot> {
        self.entries.write().insert(key, Slot::Present(entry))
    }

    /// Inserts `entry` only if `key` has no visible payload.
    ///
    /// `inherited` reports whether a payload is visible through a parent;
    /// it is consulted only when the key was never touched locally.
    pub(crate) fn insert_if_absent(
        &self,
        key: Token,
        entry: Entry,
        inherited: impl FnOnce(&Token) -> bool,
    ) -> bool {
        let mut entries = self.entries.write();
        match entries.get(&key) {
            Some(Slot::Present(_)) => false,
            Some(Slot::Cleared) => {
                entries.insert(key, Slot::Present(entry));
                true
            }
            None => {
                if inherited(&key) {
                    return false;
                }
                entries.insert(key, Slot::Present(entry));
                true
            }
        }
    }

    /// Removes `key`, returning the previous local state.
    pub(crate) fn remove(&self, key: &Token) -> Option<Slot> {
        self.entries.write().remove(key)
    }

    /// Marks `key` as cleared, returning the previous local state.
    pub(crate) fn hide(&self, key: Token) -> Option<Slot> {
        self.entries.write().insert(key, Slot::Cleared)
    }

    /// Returns a copy of every local slot.
    pub(crate) fn slots(&self) -> Vec<(Token, Slot)> {
        self.entries
            .read()
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// Returns the number of local payloads.
    pub(crate) fn len(&self) -> usize {
        self.entries
            .read()
            .values()
            .filter(|slot| matches!(slot, Slot::Present(_)))
            .count()
    }
}
