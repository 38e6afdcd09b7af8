#![forbid(unsafe_code)]

//! Version-tracked observable value cells.
//!
//! An [`ObservableCell<T>`] is a shared, thread-safe value wrapper with its
//! own [`ObservableSubject`]. Placed in a model member it acts as a
//! [`ValueProxy`]: paths see through it to the wrapped value, writes through
//! a path land in the cell, and a change re-fires on the owning object under
//! the member's name once the owner has attached it with
//! [`ObservableSubject::attach_child`].
//!
//! # Invariants
//!
//! 1. Version increments exactly once per `set` that changes the value.
//! 2. Setting a value equal to the current one is a no-op: no version bump,
//!    no notification.
//! 3. The value lock is released before listeners run.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::BindError;
use crate::lock;
use crate::subject::{ObservableSubject, Subscription};
use crate::value::{FromValue, Value, ValueProxy};

/// Types a cell can hold.
pub trait CellValue: Clone + PartialEq + Into<Value> + FromValue + Send + 'static {}

impl<T: Clone + PartialEq + Into<Value> + FromValue + Send + 'static> CellValue for T {}

struct CellInner<T> {
    value: Mutex<T>,
    version: AtomicU64,
    subject: ObservableSubject,
}

impl<T: CellValue> CellInner<T> {
    fn replace(&self, value: T) -> bool {
        {
            let mut current = lock(&self.value);
            if *current == value {
                return false;
            }
            *current = value;
        }
        self.version.fetch_add(1, Ordering::AcqRel);
        self.subject.notify_all();
        true
    }
}

impl<T: CellValue> ValueProxy for CellInner<T> {
    fn get(&self) -> Value {
        lock(&self.value).clone().into()
    }

    fn set(&self, value: Value) -> Result<(), BindError> {
        self.replace(T::from_value(value)?);
        Ok(())
    }

    fn subject(&self) -> Option<&ObservableSubject> {
        Some(&self.subject)
    }
}

/// A shared observable value.
///
/// Cloning yields another handle to the same cell.
///
/// # Example
///
/// ```
/// use pathbind_core::{ObservableCell, Value};
///
/// let name = ObservableCell::new(String::from("Ada"));
/// let v0 = name.version();
/// assert!(!name.set("Ada".into()));
/// assert!(name.set("Grace".into()));
/// assert_eq!(name.version(), v0 + 1);
///
/// let proxy = name.to_value();
/// assert_eq!(proxy.unwrap_proxy(), Value::from("Grace"));
/// ```
pub struct ObservableCell<T> {
    inner: Arc<CellInner<T>>,
}

impl<T> Clone for ObservableCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: CellValue + Default> Default for ObservableCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: CellValue> ObservableCell<T> {
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(CellInner {
                value: Mutex::new(value),
                version: AtomicU64::new(0),
                subject: ObservableSubject::new(),
            }),
        }
    }

    /// Clone of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        lock(&self.inner.value).clone()
    }

    /// Borrow the current value for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&lock(&self.inner.value))
    }

    /// Replace the value. Returns whether it changed.
    pub fn set(&self, value: T) -> bool {
        self.inner.replace(value)
    }

    /// Modify a copy of the value and store it if it differs.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.get();
        f(&mut next);
        self.set(next)
    }

    /// Number of effective changes so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn subject(&self) -> &ObservableSubject {
        &self.inner.subject
    }

    /// Register a callback fired after every effective change.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let cell = Arc::downgrade(&self.inner);
        self.inner.subject.subscribe("", move |_| {
            if let Some(cell) = cell.upgrade() {
                let value = lock(&cell.value).clone();
                callback(&value);
            }
        })
    }

    /// This cell as a proxy value for a model member.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Proxy(self.inner.clone())
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: CellValue + fmt::Debug> fmt::Debug for ObservableCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableCell")
            .field("value", &*lock(&self.inner.value))
            .field("version", &self.version())
            .finish()
    }
}
