//! The per-thread current-context slot and the activation protocol.

use std::cell::RefCell;
use std::collections::HashMap;
use tracing::trace;

use super::context_impl::Context;
use crate::config::{config, ContextConfig};
use crate::data::Entry;
use crate::registry::{RootId, RootRegistry};
use crate::token::Token;

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

impl Context {
    /// Returns the calling thread's active context.
    ///
    /// Never absent: a thread with nothing installed gets the
    /// [default context](Context::default_context).
    #[must_use]
    pub fn current() -> Self {
        Self::saved().unwrap_or_else(|| Self::default_context().clone())
    }

    /// Returns the context explicitly installed on the calling thread, if any.
    ///
    /// Unlike [`Context::current`] this distinguishes "nothing installed"
    /// from "a context is active". The handle can be moved to another
    /// thread and installed there.
    #[must_use]
    pub fn saved() -> Option<Self> {
        CURRENT
            .try_with(|slot| slot.borrow().clone())
            .ok()
            .flatten()
    }

    /// Installs `next` on the calling thread and returns what was installed before.
    ///
    /// Passing `None` reverts the thread to the default context. The root
    /// registry is updated, then the entries leaving the active view get
    /// `on_unset` and the entries entering it get `on_set`, in that order.
    /// Prefer [`ContextScopeGuard`](super::ContextScopeGuard), which
    /// restores the previous context on every exit path.
    pub fn set_current(next: Option<Self>) -> Option<Self> {
        Self::set_current_with(next, config())
    }

    pub(crate) fn set_current_with(next: Option<Self>, config: &ContextConfig) -> Option<Self> {
        let swapped = CURRENT.try_with(|slot| slot.replace(next.clone()));
        // The thread is tearing down its locals; nothing to swap.
        let Ok(previous) = swapped else {
            return None;
        };

        let root_id = next.as_ref().map_or(RootId::DEFAULT, Self::root_id);
        if config.track_root_ids {
            RootRegistry::global().update_current_thread(root_id);
        }
        if config.log_transitions {
            trace!(
                from = %previous.as_ref().map_or(RootId::DEFAULT, Self::root_id),
                to = %root_id,
                "switching request context"
            );
        }

        if previous != next {
            transition(previous.as_ref(), next.as_ref());
        }
        previous
    }

    /// Installs a fresh root context on the calling thread and returns it.
    ///
    /// The previous context is not restored automatically.
    #[must_use = "use `ContextScopeGuard::new` for a scoped context"]
    pub fn create() -> Self {
        let context = Self::new_root();
        Self::set_current(Some(context.clone()));
        context
    }

    /// Returns true if this is the calling thread's active context.
    #[must_use]
    pub fn is_active(&self) -> bool {
        CURRENT
            .try_with(|slot| match slot.borrow().as_ref() {
                Some(current) => current == self,
                None => self.is_default(),
            })
            .unwrap_or_else(|_| self.is_default())
    }
}

impl Context {
    /// Returns true if a write to `key` through `self` changes what the
    /// calling thread sees.
    ///
    /// That holds when `self` is on the active context's overlay chain and
    /// no closer overlay has touched `key`.
    pub(crate) fn drives_active_view(&self, key: &Token) -> bool {
        let active = Self::current();
        let mut link = Some(&active);
        while let Some(ctx) = link {
            if ctx == self {
                return true;
            }
            if ctx.shadows(key) {
                return false;
            }
            link = ctx.parent();
        }
        false
    }
}

/// Fires the callbacks for a switch from `outgoing` to `incoming`.
///
/// A payload visible under the same key on both sides stays active. With
/// nothing installed the default context is the active view: its entries
/// suppress callbacks for shared payloads but never receive callbacks
/// themselves.
fn transition(outgoing: Option<&Context>, incoming: Option<&Context>) {
    let leaving = outgoing.map(Context::callback_entries).unwrap_or_default();
    let entering = incoming.map(Context::callback_entries).unwrap_or_default();

    let default_entries = if outgoing.is_none() || incoming.is_none() {
        Context::default_context().callback_entries()
    } else {
        HashMap::new()
    };
    let after = if incoming.is_some() { &entering } else { &default_entries };
    let before = if outgoing.is_some() { &leaving } else { &default_entries };

    for (key, entry) in &leaving {
        if !stays_active(after, key, entry) {
            entry.fire_unset();
        }
    }
    for (key, entry) in &entering {
        if !stays_active(before, key, entry) {
            entry.fire_set();
        }
    }
}

fn stays_active(other: &HashMap<Token, Entry>, key: &Token, entry: &Entry) -> bool {
    other.get(key).is_some_and(|e| e.same_payload(entry))
}
