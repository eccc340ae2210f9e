//! Request context management.
//!
//! This module provides:
//! - [`Context`]: a shared bag of request-scoped data with a lineage id
//! - The per-thread current-context slot (`Context::current`, `Context::saved`,
//!   `Context::set_current`) and its activation protocol
//! - Scope guards that install a context for a lexical scope
//! - Helpers that carry a context into closures and futures run elsewhere

mod context_impl;
mod guards;
mod propagate;
mod slot;
mod store;

pub use context_impl::{Context, ContextId};
pub use guards::{ContextScopeGuard, ShallowCopyScopeGuard};
pub use propagate::{bind, with_context, ContextFuture, FutureContextExt};
