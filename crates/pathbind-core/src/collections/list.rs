#![forbid(unsafe_code)]

//! Observable ordered list.

use core::fmt;
use std::sync::{Arc, Mutex};

use crate::accessor::TypeShape;
use crate::collections::Watchers;
use crate::lock;
use crate::subject::{ObservableSubject, Subscription};
use crate::value::{Bindable, Value, ValueType};

/// Structural change to an [`ObservableList`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListChange {
    /// `count` elements were inserted starting at `index`.
    Inserted { index: usize, count: usize },
    /// `count` elements were removed starting at `index`.
    Removed { index: usize, count: usize },
    /// The element at `index` was replaced.
    Replaced { index: usize },
    /// Every element was removed.
    Cleared,
}

fn slot_label(index: usize) -> String {
    format!("@[{index}]")
}

struct ListInner {
    items: Mutex<Vec<Value>>,
    subject: ObservableSubject,
    watchers: Watchers<ListChange>,
}

/// An ordered, shared, observable sequence of [`Value`]s.
///
/// Every mutation fires on the list's subject: appends and replacements fire
/// the slot (`"@[i]"`), anything that shifts indices fires a whole-list
/// change. Appends, insertions, removals and clears also fire `"Count"`.
/// Observable elements are subscribed under their current slot label, so an
/// element change surfaces as `"@[i].Member"`.
///
/// Cloning yields another handle to the same list.
///
/// ```
/// use pathbind_core::{ObservableList, Value};
///
/// let list = ObservableList::new();
/// list.push(Value::from("a"));
/// list.push(Value::from("b"));
/// assert_eq!(list.len(), 2);
/// assert_eq!(list.get(1), Some(Value::from("b")));
/// assert_eq!(list.remove(0), Some(Value::from("a")));
/// ```
#[derive(Clone)]
pub struct ObservableList {
    inner: Arc<ListInner>,
}

impl Default for ObservableList {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservableList {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ListInner {
                items: Mutex::new(Vec::new()),
                subject: ObservableSubject::new(),
                watchers: Watchers::default(),
            }),
        }
    }

    /// Build a list from `values` without firing.
    #[must_use]
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Self {
        let list = Self::new();
        {
            let mut items = lock(&list.inner.items);
            items.extend(values);
            for (index, value) in items.iter().enumerate() {
                list.inner.subject.attach_child(&slot_label(index), value);
            }
        }
        list
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.items).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<Value> {
        lock(&self.inner.items).get(index).cloned()
    }

    /// Copy of the current elements.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        lock(&self.inner.items).clone()
    }

    #[must_use]
    pub fn index_of(&self, value: &Value) -> Option<usize> {
        lock(&self.inner.items).iter().position(|v| v == value)
    }

    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        self.index_of(value).is_some()
    }

    /// Append `value`.
    pub fn push(&self, value: Value) {
        let index = {
            let mut items = lock(&self.inner.items);
            let index = items.len();
            self.inner.subject.attach_child(&slot_label(index), &value);
            items.push(value);
            index
        };
        self.inner
            .watchers
            .emit(&ListChange::Inserted { index, count: 1 });
        self.inner.subject.notify(&slot_label(index));
        self.inner.subject.notify("Count");
    }

    /// Insert `value` at `index`, shifting later elements up.
    ///
    /// Returns `false` without changing anything when `index > len`.
    pub fn insert(&self, index: usize, value: Value) -> bool {
        {
            let mut items = lock(&self.inner.items);
            if index > items.len() {
                return false;
            }
            items.insert(index, value);
            self.relabel(&items, index + 1, |j| j - 1);
            self.inner.subject.attach_child(&slot_label(index), &items[index]);
        }
        self.inner
            .watchers
            .emit(&ListChange::Inserted { index, count: 1 });
        self.inner.subject.notify_all();
        self.inner.subject.notify("Count");
        true
    }

    /// Replace the element at `index`, returning the previous one.
    ///
    /// Replacing an element with itself changes nothing and fires nothing.
    pub fn set(&self, index: usize, value: Value) -> Option<Value> {
        let old = {
            let mut items = lock(&self.inner.items);
            let slot = items.get_mut(index)?;
            if *slot == value {
                return Some(value);
            }
            let label = slot_label(index);
            self.inner.subject.detach_child(&label, slot);
            self.inner.subject.attach_child(&label, &value);
            std::mem::replace(slot, value)
        };
        self.inner.watchers.emit(&ListChange::Replaced { index });
        self.inner.subject.notify(&slot_label(index));
        Some(old)
    }

    /// Remove and return the element at `index`.
    pub fn remove(&self, index: usize) -> Option<Value> {
        let removed = {
            let mut items = lock(&self.inner.items);
            if index >= items.len() {
                return None;
            }
            let removed = items.remove(index);
            self.inner.subject.detach_child(&slot_label(index), &removed);
            self.relabel(&items, index, |j| j + 1);
            removed
        };
        self.inner
            .watchers
            .emit(&ListChange::Removed { index, count: 1 });
        self.inner.subject.notify_all();
        self.inner.subject.notify("Count");
        Some(removed)
    }

    /// Remove the first element equal to `value`. Returns whether one was
    /// found.
    pub fn remove_value(&self, value: &Value) -> bool {
        match self.index_of(value) {
            Some(index) => self.remove(index).is_some(),
            None => false,
        }
    }

    /// Remove every element.
    pub fn clear(&self) {
        let count = {
            let mut items = lock(&self.inner.items);
            for (index, value) in items.iter().enumerate() {
                self.inner.subject.detach_child(&slot_label(index), value);
            }
            let count = items.len();
            items.clear();
            count
        };
        self.inner.watchers.emit(&ListChange::Cleared);
        self.inner.subject.notify_all();
        if count > 0 {
            self.inner.subject.notify("Count");
        }
    }

    /// Register a structural-change callback.
    pub fn subscribe_structure(
        &self,
        callback: impl Fn(&ListChange) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.watchers.subscribe(callback)
    }

    #[must_use]
    pub fn subject(&self) -> &ObservableSubject {
        &self.inner.subject
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // Move subscriptions of `items[from..]` from their old slot label
    // (`old_index(j)`) to `"@[j]"`. Detach everything first so an element
    // present in several slots keeps all its labels.
    fn relabel(&self, items: &[Value], from: usize, old_index: impl Fn(usize) -> usize) {
        let subject = &self.inner.subject;
        for (j, value) in items.iter().enumerate().skip(from) {
            subject.detach_child(&slot_label(old_index(j)), value);
        }
        for (j, value) in items.iter().enumerate().skip(from) {
            subject.attach_child(&slot_label(j), value);
        }
    }
}

impl Bindable for ObservableList {
    fn shape(&self) -> TypeShape {
        TypeShape::builder::<Self>()
            .getter("getCount", ValueType::Int, |list| {
                Value::Int(i64::try_from(list.len()).unwrap_or(i64::MAX))
            })
            .build()
    }

    fn subject(&self) -> Option<&ObservableSubject> {
        Some(&self.inner.subject)
    }

    fn type_name(&self) -> &'static str {
        "ObservableList"
    }
}

impl fmt::Debug for ObservableList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

impl FromIterator<Value> for ObservableList {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}
