//! Core Context implementation.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::warn;

use super::store::{EntryStore, Slot};
use crate::config::{config, ContextConfig};
use crate::data::{Entry, RequestData, SharedData};
use crate::errors::ContextError;
use crate::registry::RootId;
use crate::token::Token;

/// Id 0 belongs to the default context.
static CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a context instance.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        Self(CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct ContextInner {
    id: ContextId,
    root_id: RootId,
    store: EntryStore,
    /// Set for overlays: reads of untouched keys fall through to it.
    parent: Option<Context>,
}

/// A bag of request-scoped data plus the lineage it belongs to.
///
/// Contexts are cheap to clone (Arc-based) and can be shared between
/// threads. Equality and hashing follow instance identity, not contents.
///
/// # Lineage
///
/// Every context carries a [`RootId`]. A fresh root takes its own id as
/// root id; children and overlays inherit the root id of their source.
///
/// ```rust
/// use ctxflow::context::Context;
///
/// let root = Context::new_root();
/// assert_eq!(root.root_id().as_u64(), root.id().as_u64());
///
/// let child = root.copy_as_child();
/// assert_eq!(child.root_id(), root.root_id());
///
/// let copy = root.copy_as_root();
/// assert_ne!(copy.root_id(), root.root_id());
/// ```
///
/// # Overlays
///
/// An overlay reads through to its source for keys it never touched and
/// keeps every write local:
///
/// ```rust
/// use ctxflow::context::Context;
/// use ctxflow::testing::TestData;
///
/// let base = Context::new_root();
/// base.set_context_data("a", TestData::new(1));
///
/// let overlay = base.overlay();
/// assert!(overlay.has_context_data("a"));
///
/// overlay.clear_context_data("a");
/// assert!(!overlay.has_context_data("a"));
/// assert!(base.has_context_data("a"));
/// ```
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Context {}

impl Hash for Context {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.inner).hash(state);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.inner.id)
            .field("root_id", &self.inner.root_id)
            .field("overlay", &self.is_overlay())
            .field("local_entries", &self.inner.store.len())
            .finish()
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "context {} (root {})", self.inner.id, self.inner.root_id)
    }
}

impl Context {
    fn build(id: ContextId, root_id: RootId, store: EntryStore, parent: Option<Self>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id,
                root_id,
                store,
                parent,
            }),
        }
    }

    /// Creates an empty context that starts a new lineage.
    #[must_use]
    pub fn new_root() -> Self {
        let id = ContextId::next();
        Self::build(id, RootId(id.0), EntryStore::new(), None)
    }

    /// Returns the process-wide default context.
    ///
    /// It is what [`Context::current`] yields on a thread with nothing
    /// installed. It has id 0 and [`RootId::DEFAULT`].
    pub fn default_context() -> &'static Self {
        static DEFAULT: OnceLock<Context> = OnceLock::new();
        DEFAULT.get_or_init(|| Self::build(ContextId(0), RootId::DEFAULT, EntryStore::new(), None))
    }

    /// Copies the visible data into a new context that starts a new lineage.
    ///
    /// Payload instances are shared with `self`.
    #[must_use]
    pub fn copy_as_root(&self) -> Self {
        let id = ContextId::next();
        Self::build(
            id,
            RootId(id.0),
            EntryStore::from_entries(self.visible_entries()),
            None,
        )
    }

    /// Copies the visible data into a new, independent context of the same lineage.
    ///
    /// Payload instances are shared with `self`.
    #[must_use]
    pub fn copy_as_child(&self) -> Self {
        Self::build(
            ContextId::next(),
            self.inner.root_id,
            EntryStore::from_entries(self.visible_entries()),
            None,
        )
    }

    /// Creates an empty overlay that reads through to `self`.
    #[must_use]
    pub fn overlay(&self) -> Self {
        Self::build(
            ContextId::next(),
            self.inner.root_id,
            EntryStore::new(),
            Some(self.clone()),
        )
    }

    /// Returns the identity of this instance.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.inner.id
    }

    /// Returns the lineage this context belongs to.
    #[must_use]
    pub fn root_id(&self) -> RootId {
        self.inner.root_id
    }

    /// Returns true for overlays.
    #[must_use]
    pub fn is_overlay(&self) -> bool {
        self.inner.parent.is_some()
    }

    /// Returns the context an overlay reads through to.
    #[must_use]
    pub fn parent(&self) -> Option<&Self> {
        self.inner.parent.as_ref()
    }

    /// Returns true for the process-wide default context.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self == Self::default_context()
    }

    /// Returns true if data is visible under `key`.
    pub fn has_context_data(&self, key: impl Into<Token>) -> bool {
        self.lookup(&key.into()).is_some()
    }

    /// Returns the payload visible under `key`.
    pub fn get_context_data(&self, key: impl Into<Token>) -> Option<SharedData> {
        self.lookup(&key.into()).map(|entry| entry.data().clone())
    }

    /// Returns the payload visible under `key` if it is a `T`.
    pub fn get_context_data_as<T: RequestData>(&self, key: impl Into<Token>) -> Option<Arc<T>> {
        self.lookup(&key.into()).and_then(|entry| entry.downcast::<T>())
    }

    /// Returns the `T` visible under `key`, failing if it is absent or of another type.
    pub fn require_context_data<T: RequestData>(
        &self,
        key: impl Into<Token>,
    ) -> Result<Arc<T>, ContextError> {
        let key = key.into();
        let entry = self
            .lookup(&key)
            .ok_or_else(|| ContextError::missing(&*key.name()))?;
        entry
            .downcast::<T>()
            .ok_or_else(|| ContextError::type_mismatch::<T>(&*key.name()))
    }

    /// Stores `data` under `key`, replacing any previous payload.
    ///
    /// If the write changes what the calling thread sees (this context is
    /// active, or an active overlay reads this key through to it), the
    /// replaced payload's `on_unset` fires before the new payload's `on_set`. The
    /// replaced payload is released only after the store lock is dropped,
    /// so its destructor may use this context again.
    pub fn set_context_data<T: RequestData>(&self, key: impl Into<Token>, data: T) {
        self.set_entry(key.into(), Entry::new(Arc::new(data)), config());
    }

    /// Stores an already shared payload under `key`.
    pub fn set_shared_context_data<T: RequestData>(&self, key: impl Into<Token>, data: Arc<T>) {
        self.set_entry(key.into(), Entry::new(data), config());
    }

    /// Stores `data` only if nothing is visible under `key`.
    ///
    /// Returns whether the data was stored. Never replaces, never fires `on_unset`.
    pub fn set_context_data_if_absent<T: RequestData>(
        &self,
        key: impl Into<Token>,
        data: T,
    ) -> bool {
        let key = key.into();
        let entry = Entry::new(Arc::new(data));
        let inserted =
            self.inner
                .store
                .insert_if_absent(key, entry.clone(), |k| self.inherited(k).is_some());
        if inserted && self.drives_active_view(&key) {
            entry.fire_set();
        }
        inserted
    }

    /// Removes the payload visible under `key`.
    ///
    /// On an overlay the parent is left untouched; the key is hidden locally
    /// instead. If the removal changes what the calling thread sees, the
    /// removed payload's `on_unset` fires.
    pub fn clear_context_data(&self, key: impl Into<Token>) {
        let key = key.into();
        let local_previous = if self.is_overlay() {
            self.inner.store.hide(key)
        } else {
            self.inner.store.remove(&key)
        };
        let removed = self.effective_previous(&key, local_previous.as_ref());
        if let Some(removed) = &removed {
            if self.drives_active_view(&key) {
                removed.fire_unset();
            }
        }
        drop(removed);
        drop(local_previous);
    }

    /// Returns every key with visible data.
    #[must_use]
    pub fn keys(&self) -> Vec<Token> {
        self.visible_entries().into_keys().collect()
    }

    /// Returns the number of keys with visible data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.visible_entries().len()
    }

    /// Returns true if no data is visible.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn set_entry(&self, key: Token, entry: Entry, config: &ContextConfig) {
        let local_previous = self.inner.store.insert(key, entry.clone());
        if matches!(local_previous, Some(Slot::Present(_))) && config.warn_on_overwrite {
            warn!(key = %key, context = %self.inner.id, "overwriting existing context data");
        }

        let replaced = self.effective_previous(&key, local_previous.as_ref());
        if self.drives_active_view(&key) {
            let unchanged = replaced.as_ref().is_some_and(|old| old.same_payload(&entry));
            if !unchanged {
                if let Some(old) = &replaced {
                    old.fire_unset();
                }
                entry.fire_set();
            }
        }
        drop(replaced);
        drop(local_previous);
    }

    /// The payload that was visible under `key` before a local write.
    fn effective_previous(&self, key: &Token, local_previous: Option<&Slot>) -> Option<Entry> {
        match local_previous {
            Some(Slot::Present(entry)) => Some(entry.clone()),
            Some(Slot::Cleared) => None,
            None => self.inherited(key),
        }
    }

    /// Whether `key` was touched locally, hiding the parent's slot.
    pub(crate) fn shadows(&self, key: &Token) -> bool {
        self.inner.store.contains(key)
    }

    fn inherited(&self, key: &Token) -> Option<Entry> {
        self.inner.parent.as_ref().and_then(|parent| parent.lookup(key))
    }

    /// Resolves `key` through the overlay chain.
    pub(crate) fn lookup(&self, key: &Token) -> Option<Entry> {
        let mut current = self;
        loop {
            match current.inner.store.get(key) {
                Some(slot) => return slot.into_entry(),
                None => match &current.inner.parent {
                    Some(parent) => current = parent,
                    None => return None,
                },
            }
        }
    }

    /// Flattens the overlay chain: local slots shadow inherited ones.
    pub(crate) fn visible_entries(&self) -> HashMap<Token, Entry> {
        let mut seen: HashMap<Token, Option<Entry>> = HashMap::new();
        let mut current = Some(self);
        while let Some(ctx) = current {
            for (key, slot) in ctx.inner.store.slots() {
                seen.entry(key).or_insert_with(|| slot.into_entry());
            }
            current = ctx.inner.parent.as_ref();
        }
        seen.into_iter()
            .filter_map(|(key, entry)| entry.map(|e| (key, e)))
            .collect()
    }

    /// Visible entries that declare activation callbacks.
    pub(crate) fn callback_entries(&self) -> HashMap<Token, Entry> {
        let mut entries = self.visible_entries();
        entries.retain(|_, entry| entry.has_callback());
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextScopeGuard;
    use crate::testing::{LogCapture, OnDrop, TestData};

    fn value(ctx: &Context, key: &str) -> Option<i32> {
        ctx.get_context_data_as::<TestData>(key).map(|d| d.value())
    }

    #[test]
    fn test_new_root_lineage() {
        let ctx = Context::new_root();
        assert_eq!(ctx.root_id().as_u64(), ctx.id().as_u64());
        assert!(!ctx.is_overlay());
        assert!(ctx.is_empty());
    }

    #[test]
    fn test_context_equality() {
        let a = Context::new_root();
        let b = a.clone();
        let c = Context::new_root();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_default_context() {
        let default = Context::default_context();
        assert!(default.is_default());
        assert!(default.root_id().is_default());
        assert_eq!(default.id().as_u64(), 0);
        assert!(!Context::new_root().is_default());
    }

    #[test]
    fn test_root_id_on_copy() {
        let base = Context::new_root();
        assert_eq!(base.root_id().as_u64(), base.id().as_u64());

        let root = base.copy_as_root();
        assert_eq!(root.root_id().as_u64(), root.id().as_u64());
        assert_ne!(root.root_id(), base.root_id());

        let child = base.copy_as_child();
        assert_eq!(child.root_id(), base.root_id());
        assert_ne!(child.id(), base.id());

        let overlay = base.overlay();
        assert_eq!(overlay.root_id(), base.root_id());
        assert_eq!(overlay.overlay().root_id(), base.root_id());
    }

    #[test]
    fn test_copies_share_visible_data() {
        let base = Context::new_root();
        base.set_context_data("a", TestData::new(1));
        let overlay = base.overlay();
        overlay.set_context_data("b", TestData::new(2));

        let child = overlay.copy_as_child();
        assert_eq!(value(&child, "a"), Some(1));
        assert_eq!(value(&child, "b"), Some(2));
        assert!(!child.is_overlay());

        // Independent after the copy.
        child.clear_context_data("a");
        assert_eq!(value(&base, "a"), Some(1));

        let root = base.copy_as_root();
        assert!(Arc::ptr_eq(
            &root.get_context_data_as::<TestData>("a").unwrap(),
            &base.get_context_data_as::<TestData>("a").unwrap()
        ));
    }

    #[test]
    fn test_set_get_clear() {
        let ctx = Context::new_root();
        assert!(!ctx.has_context_data("k"));
        assert!(ctx.get_context_data("k").is_none());

        ctx.set_context_data("k", TestData::new(5));
        assert!(ctx.has_context_data("k"));
        assert_eq!(value(&ctx, "k"), Some(5));

        ctx.set_context_data("k", TestData::new(6));
        assert_eq!(value(&ctx, "k"), Some(6));

        ctx.clear_context_data("k");
        assert!(!ctx.has_context_data("k"));
        // Clearing a missing key is silent.
        ctx.clear_context_data("k");
    }

    #[test]
    fn test_set_if_absent() {
        let ctx = Context::new_root();
        ctx.set_context_data("test", TestData::new(10));
        assert!(!ctx.set_context_data_if_absent("test", TestData::new(20)));
        assert_eq!(value(&ctx, "test"), Some(10));

        assert!(ctx.set_context_data_if_absent("test2", TestData::new(20)));
        assert_eq!(value(&ctx, "test2"), Some(20));
    }

    #[test]
    fn test_token_and_str_address_same_entry() {
        let ctx = Context::new_root();
        let token = Token::new("shared-key");
        ctx.set_context_data(&token, TestData::new(3));
        assert_eq!(value(&ctx, "shared-key"), Some(3));
    }

    #[test]
    fn test_overlay_read_through_and_isolation() {
        let base = Context::new_root();
        base.set_context_data("a", TestData::new(1));
        let overlay = base.overlay();

        assert_eq!(value(&overlay, "a"), Some(1));

        overlay.set_context_data("a", TestData::new(2));
        assert_eq!(value(&overlay, "a"), Some(2));
        assert_eq!(value(&base, "a"), Some(1));

        overlay.clear_context_data("a");
        assert!(!overlay.has_context_data("a"));
        assert!(base.has_context_data("a"));
    }

    #[test]
    fn test_overlay_sees_live_parent_for_untouched_keys() {
        let base = Context::new_root();
        let overlay = base.overlay();
        base.set_context_data("late", TestData::new(4));
        assert_eq!(value(&overlay, "late"), Some(4));

        overlay.clear_context_data("late");
        base.set_context_data("late", TestData::new(5));
        assert!(!overlay.has_context_data("late"));
    }

    #[test]
    fn test_overlay_set_if_absent_respects_parent() {
        let base = Context::new_root();
        base.set_context_data("a", TestData::new(1));
        let overlay = base.overlay();

        assert!(!overlay.set_context_data_if_absent("a", TestData::new(2)));
        overlay.clear_context_data("a");
        assert!(overlay.set_context_data_if_absent("a", TestData::new(3)));
        assert_eq!(value(&overlay, "a"), Some(3));
        assert_eq!(value(&base, "a"), Some(1));
    }

    #[test]
    fn test_keys_and_len() {
        let base = Context::new_root();
        base.set_context_data("a", TestData::new(1));
        base.set_context_data("b", TestData::new(2));
        let overlay = base.overlay();
        overlay.clear_context_data("a");
        overlay.set_context_data("c", TestData::new(3));

        let mut keys: Vec<String> = overlay.keys().iter().map(|k| k.name().to_string()).collect();
        keys.sort();
        assert_eq!(keys, vec!["b".to_string(), "c".to_string()]);
        assert_eq!(overlay.len(), 2);
        assert_eq!(base.len(), 2);
    }

    #[test]
    fn test_require_context_data() {
        let ctx = Context::new_root();
        ctx.set_context_data("n", TestData::new(8));
        assert_eq!(ctx.require_context_data::<TestData>("n").unwrap().value(), 8);

        let missing = ctx.require_context_data::<TestData>("absent").unwrap_err();
        assert!(missing.is_missing());

        let wrong = ctx.require_context_data::<OnDrop>("n").unwrap_err();
        assert!(matches!(wrong, ContextError::TypeMismatch { .. }));
    }

    #[test]
    fn test_inactive_context_fires_no_callbacks() {
        let ctx = Context::new_root();
        let first = Arc::new(TestData::new(1));
        ctx.set_shared_context_data("k", first.clone());
        ctx.set_context_data("k", TestData::new(2));
        ctx.clear_context_data("k");
        assert_eq!(first.set_count(), 0);
        assert_eq!(first.unset_count(), 0);
    }

    #[test]
    fn test_replaced_payload_destructor_can_reenter() {
        let _reset = ContextScopeGuard::with_saved(None);
        let guard = ContextScopeGuard::new();
        let ctx = guard.context();
        // Reach the context through the slot so the payload holds no handle to its owner.
        ctx.set_context_data(
            "reentrant",
            OnDrop::new(|| {
                let current = Context::current();
                current.set_context_data("reentrant", TestData::new(1));
                current.set_context_data("other", TestData::new(2));
            }),
        );
        ctx.set_context_data("reentrant", TestData::new(0));

        // The destructor ran after the replacement and won.
        assert_eq!(value(&ctx, "reentrant"), Some(1));
        assert_eq!(value(&ctx, "other"), Some(2));
    }

    #[test]
    fn test_overwrite_warning_follows_config() {
        let ctx = Context::new_root();
        let key = Token::new("overwritten-key");
        let warn_config = ContextConfig::new().with_warn_on_overwrite(true);

        let logs = LogCapture::new();
        logs.run(|| {
            ctx.set_entry(key, Entry::new(Arc::new(TestData::new(1))), &warn_config);
            ctx.set_entry(key, Entry::new(Arc::new(TestData::new(2))), &warn_config);
        });
        let contents = logs.contents();
        assert_eq!(contents.matches("overwriting existing context data").count(), 1);
        assert!(contents.contains("WARN"));
        assert!(contents.contains("overwritten-key"));

        let quiet = LogCapture::new();
        quiet.run(|| {
            ctx.set_entry(key, Entry::new(Arc::new(TestData::new(3))), &ContextConfig::new());
        });
        assert!(!quiet.contents().contains("overwriting existing context data"));
        assert_eq!(value(&ctx, "overwritten-key"), Some(3));
    }
}
