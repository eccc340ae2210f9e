//! Scope guards that install a context for the duration of a scope.

use std::marker::PhantomData;
use std::sync::Arc;

use super::context_impl::Context;
use crate::data::RequestData;
use crate::token::Token;

/// Installs a context on construction and restores the previous one on drop.
///
/// Guards nest as a stack; each boundary fires its own activation
/// callbacks. The previous context is restored on every exit path,
/// including early returns and unwinding. Guards are tied to the thread
/// that created them.
///
/// ```rust
/// use ctxflow::context::{Context, ContextScopeGuard};
/// use ctxflow::testing::TestData;
///
/// let outer = ContextScopeGuard::new();
/// Context::current().set_context_data("request", TestData::new(1));
/// {
///     let _inner = ContextScopeGuard::new();
///     assert!(!Context::current().has_context_data("request"));
/// }
/// assert!(Context::current().has_context_data("request"));
/// assert_eq!(Context::current(), outer.context());
/// ```
#[must_use = "the previous context is restored as soon as the guard is dropped"]
pub struct ContextScopeGuard {
    prior: Option<Context>,
    context: Context,
    _not_send: PhantomData<*const ()>,
}

impl ContextScopeGuard {
    /// Installs a fresh, empty context that starts a new lineage.
    pub fn new() -> Self {
        Self::with_context(Context::new_root())
    }

    /// Installs `context`.
    pub fn with_context(context: Context) -> Self {
        Self::with_saved(Some(context))
    }

    /// Installs a handle obtained from [`Context::saved`].
    ///
    /// `None` reverts the thread to the default context for the scope.
    pub fn with_saved(saved: Option<Context>) -> Self {
        let context = saved
            .clone()
            .unwrap_or_else(|| Context::default_context().clone());
        let prior = Context::set_current(saved);
        Self {
            prior,
            context,
            _not_send: PhantomData,
        }
    }

    /// Returns the context active within this guard's scope.
    #[must_use]
    pub fn context(&self) -> Context {
        self.context.clone()
    }
}

impl Default for ContextScopeGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ContextScopeGuard {
    fn drop(&mut self) {
        Context::set_current(self.prior.take());
    }
}

impl std::fmt::Debug for ContextScopeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextScopeGuard")
            .field("context", &self.context)
            .field("prior", &self.prior)
            .finish()
    }
}

/// Installs an overlay of the current context for the duration of a scope.
///
/// Reads of keys never written inside the scope return the outer values;
/// nothing done through the overlay mutates the outer context. The overlay
/// keeps the outer context's root id.
///
/// ```rust
/// use ctxflow::context::{Context, ContextScopeGuard, ShallowCopyScopeGuard};
/// use ctxflow::testing::TestData;
///
/// let _outer = ContextScopeGuard::new();
/// Context::current().set_context_data("limit", TestData::new(10));
/// {
///     let _g = ShallowCopyScopeGuard::with_data("limit", TestData::new(99));
///     let limit = Context::current().get_context_data_as::<TestData>("limit").unwrap();
///     assert_eq!(limit.value(), 99);
/// }
/// let limit = Context::current().get_context_data_as::<TestData>("limit").unwrap();
/// assert_eq!(limit.value(), 10);
/// ```
#[must_use = "the previous context is restored as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ShallowCopyScopeGuard {
    inner: ContextScopeGuard,
}

impl ShallowCopyScopeGuard {
    /// Installs an empty overlay of the current context.
    pub fn new() -> Self {
        Self::with_seed(|_| {})
    }

    /// Installs an overlay with `data` stored under `key`.
    pub fn with_data<T: RequestData>(key: impl Into<Token>, data: T) -> Self {
        let key = key.into();
        Self::with_seed(move |overlay| overlay.set_context_data(key, data))
    }

    /// Installs an overlay with a shared payload stored under `key`.
    pub fn with_shared_data<T: RequestData>(key: impl Into<Token>, data: Arc<T>) -> Self {
        let key = key.into();
        Self::with_seed(move |overlay| overlay.set_shared_context_data(key, data))
    }

    /// Installs an overlay after letting `seed` write to it.
    ///
    /// The overlay is not active while `seed` runs; its callbacks fire once,
    /// on installation.
    pub fn with_seed(seed: impl FnOnce(&Context)) -> Self {
        let overlay = Context::current().overlay();
        seed(&overlay);
        Self {
            inner: ContextScopeGuard::with_context(overlay),
        }
    }

    /// Returns the installed overlay.
    #[must_use]
    pub fn context(&self) -> Context {
        self.inner.context()
    }
}

impl Default for ShallowCopyScopeGuard {
    fn default() -> Self {
        Self::new()
    }
}
