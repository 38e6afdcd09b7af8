#![forbid(unsafe_code)]

//! The UI element contract and two stock strategies.
//!
//! A [`BoundElement`] is anything the view tree hands to an inventory: it
//! names a path, accepts pushed values, and is told which inventory tracks
//! it. Element behaviour is composed from strategies rather than a type
//! hierarchy:
//!
//! - [`CallbackElement`]: forwards every pushed value to a closure.
//! - [`TwoWayElement`]: holds the last value and writes user edits back
//!   through the tracking inventory.
//!
//! # Invariants
//!
//! 1. `receive_update` is called on the thread that triggered the refresh.
//! 2. A `TwoWayElement` never receives the echo of its own edit while the
//!    inventory suppresses echoes.
//! 3. Elements hold their inventory weakly; the inventory owns its elements.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use pathbind_core::{BindError, Value};

use crate::inventory::BindingInventory;
use crate::lock;

/// A UI element bound to one path.
pub trait BoundElement: Send + Sync {
    /// The path this element binds to, if any.
    fn path(&self) -> Option<&str>;

    /// Accept the current value at the bound path.
    fn receive_update(&self, value: &Value);

    /// Called when an inventory starts tracking this element, including
    /// after a merge moves it to another inventory.
    fn track(&self, _inventory: &Arc<BindingInventory>) {}
}

/// Thin address of an element, stable for its lifetime.
pub(crate) fn element_addr(element: &dyn BoundElement) -> usize {
    std::ptr::from_ref(element).cast::<()>() as usize
}

// ---------------------------------------------------------------------------
// CallbackElement
// ---------------------------------------------------------------------------

type Sink = Box<dyn Fn(&Value) + Send + Sync>;

/// An element that hands every pushed value to a closure.
pub struct CallbackElement {
    path: Option<String>,
    sink: Sink,
}

impl CallbackElement {
    /// Create an element bound to `path`.
    pub fn new(path: impl Into<String>, sink: impl Fn(&Value) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            path: Some(path.into()),
            sink: Box::new(sink),
        })
    }

    /// Create an element without a path; tracking it is a no-op.
    pub fn unbound(sink: impl Fn(&Value) + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            path: None,
            sink: Box::new(sink),
        })
    }
}

impl BoundElement for CallbackElement {
    fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    fn receive_update(&self, value: &Value) {
        (self.sink)(value);
    }
}

impl std::fmt::Debug for CallbackElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackElement")
            .field("path", &self.path)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TwoWayElement
// ---------------------------------------------------------------------------

/// An editable element: shows the model value and writes edits back.
///
/// ```
/// use std::sync::Arc;
/// use pathbind_core::{ObservableMap, Value};
/// use pathbind_runtime::{BindingInventory, TwoWayElement};
///
/// let settings = ObservableMap::new();
/// let inventory = BindingInventory::new();
/// inventory.set_context_object(Value::Map(settings.clone()));
///
/// let field = TwoWayElement::new("Theme");
/// inventory.track_element(field.clone()).unwrap();
///
/// assert!(field.edit(Value::from("dark")).unwrap());
/// assert_eq!(settings.get("Theme"), Some(Value::from("dark")));
/// assert_eq!(field.updates(), 0);
/// ```
#[derive(Debug)]
pub struct TwoWayElement {
    path: String,
    value: Mutex<Value>,
    updates: AtomicUsize,
    inventory: Mutex<Weak<BindingInventory>>,
}

impl TwoWayElement {
    pub fn new(path: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            value: Mutex::new(Value::Null),
            updates: AtomicUsize::new(0),
            inventory: Mutex::new(Weak::new()),
        })
    }

    /// The value last shown or edited.
    #[must_use]
    pub fn value(&self) -> Value {
        lock(&self.value).clone()
    }

    /// Number of values pushed by the inventory.
    #[must_use]
    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::Acquire)
    }

    /// Record a user edit and write it to the model.
    ///
    /// Returns whether the model changed. An element that is not tracked
    /// keeps the edit locally and returns `false`.
    ///
    /// # Errors
    ///
    /// Whatever [`BindingInventory::send_update_from`] reports.
    pub fn edit(&self, value: Value) -> Result<bool, BindError> {
        *lock(&self.value) = value.clone();
        let inventory = lock(&self.inventory).upgrade();
        match inventory {
            Some(inventory) => inventory.send_update_from(self, &self.path, value),
            None => Ok(false),
        }
    }
}

impl BoundElement for TwoWayElement {
    fn path(&self) -> Option<&str> {
        Some(&self.path)
    }

    fn receive_update(&self, value: &Value) {
        self.updates.fetch_add(1, Ordering::AcqRel);
        *lock(&self.value) = value.clone();
    }

    fn track(&self, inventory: &Arc<BindingInventory>) {
        *lock(&self.inventory) = Arc::downgrade(inventory);
    }
}
