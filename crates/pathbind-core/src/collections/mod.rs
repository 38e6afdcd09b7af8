#![forbid(unsafe_code)]

//! Observable collections.
//!
//! Each collection wraps a backing container and announces every mutation
//! twice: once as a structural event for adapters that re-render rows
//! ([`ListChange`], [`MapChange`]), and once through its
//! [`ObservableSubject`](crate::ObservableSubject) so paths bound through
//! the collection refresh.
//!
//! Elements that are themselves observable are subscribed under their slot
//! label (`"@[i]"` for lists, the key for maps), so a change to a nested
//! element surfaces on the collection as `"@[i].Member"` or `"key.Member"`.

mod list;
mod map;

pub use list::{ListChange, ObservableList};
pub use map::{MapChange, ObservableMap};

use std::sync::{Arc, Mutex, Weak};

use crate::lock;
use crate::subject::Subscription;

type Watcher<E> = dyn Fn(&E) + Send + Sync;

/// Weakly held structural-event callbacks.
pub(crate) struct Watchers<E: 'static> {
    callbacks: Mutex<Vec<Weak<Watcher<E>>>>,
}

impl<E: 'static> Default for Watchers<E> {
    fn default() -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
        }
    }
}

impl<E: 'static> Watchers<E> {
    pub(crate) fn subscribe(&self, callback: impl Fn(&E) + Send + Sync + 'static) -> Subscription {
        let callback: Arc<Watcher<E>> = Arc::new(callback);
        let mut callbacks = lock(&self.callbacks);
        callbacks.retain(|weak| weak.strong_count() > 0);
        callbacks.push(Arc::downgrade(&callback));
        Subscription::new(callback)
    }

    pub(crate) fn emit(&self, event: &E) {
        let snapshot: Vec<Arc<Watcher<E>>> = {
            let mut callbacks = lock(&self.callbacks);
            callbacks.retain(|weak| weak.strong_count() > 0);
            callbacks.iter().filter_map(Weak::upgrade).collect()
        };
        for callback in snapshot {
            callback(event);
        }
    }
}
