#![forbid(unsafe_code)]

//! Path-addressed bindings for pathbind.
//!
//! This crate provides:
//! - [`BindingPath`] and the path grammar (anchors, segments, index selectors)
//! - [`BoundElement`], the contract UI elements implement, with the
//!   [`CallbackElement`] and [`TwoWayElement`] strategies
//! - [`BindingInventory`], which tracks elements by path over one context
//!   object and keeps them in sync with the model
//!
//! # Logging
//!
//! Events are emitted through `tracing` under the `pathbind::inventory`
//! target. Refresh passes run inside a `binding_refresh` span.

pub mod config;
pub mod element;
pub mod inventory;
pub mod path;
pub mod path_binding;

pub use config::InventoryConfig;
pub use element::{BoundElement, CallbackElement, TwoWayElement};
pub use inventory::BindingInventory;
pub use path::{Anchor, BindingPath, IndexSelector, Segment};
pub use path_binding::PathBinding;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
