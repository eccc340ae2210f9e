//! # Ctxflow
//!
//! Request-scoped context propagation for thread-pool and async runtimes.
//!
//! Ctxflow carries a bag of request-scoped data (trace ids, deadlines,
//! auth tokens, counters) through chains of callbacks that may run on
//! different worker threads, without threading it through every signature.
//!
//! - **Thread-local current context**: every thread has an active context,
//!   shared handles let other threads observe and mutate it
//! - **Overlays**: shallow copies that read through to their source and
//!   keep every write local
//! - **Activation callbacks**: payloads are told when they become active
//!   on a thread and when they stop being active
//! - **Root registry**: a live, cross-thread view of which lineage is
//!   active on which thread
//!
//! ## Quick Start
//!
//! ```rust
//! use ctxflow::prelude::*;
//! use ctxflow::testing::TestData;
//!
//! let _request = ContextScopeGuard::new();
//! Context::current().set_context_data("user", TestData::new(42));
//!
//! // Hand the work to another thread; the context goes with it.
//! let task = bind(|| {
//!     Context::current()
//!         .get_context_data_as::<TestData>("user")
//!         .map(|d| d.value())
//! });
//! assert_eq!(std::thread::spawn(task).join().unwrap(), Some(42));
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod data;
pub mod errors;
pub mod registry;
pub mod testing;
pub mod token;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{config, configure, ContextConfig};
    pub use crate::context::{
        bind, with_context, Context, ContextFuture, ContextId, ContextScopeGuard,
        FutureContextExt, ShallowCopyScopeGuard,
    };
    pub use crate::data::{RequestData, SharedData};
    pub use crate::errors::ContextError;
    pub use crate::registry::{root_ids_from_all_threads, RootId, RootIdEntry, RootRegistry};
    pub use crate::token::Token;
}
