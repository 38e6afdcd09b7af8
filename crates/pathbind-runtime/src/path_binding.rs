#![forbid(unsafe_code)]

//! The set of elements sharing one path under one inventory.

use std::sync::{Arc, Mutex};

use pathbind_core::Value;

use crate::element::{BoundElement, element_addr};
use crate::lock;
use crate::path::BindingPath;

struct PathBindingInner {
    path: BindingPath,
    elements: Mutex<Vec<Arc<dyn BoundElement>>>,
}

/// Elements bound to one exact path.
///
/// A multiset: tracking the same element twice delivers every value to it
/// twice. Cloning yields another handle to the same binding.
#[derive(Clone)]
pub struct PathBinding {
    inner: Arc<PathBindingInner>,
}

impl PathBinding {
    #[must_use]
    pub fn new(path: BindingPath) -> Self {
        Self {
            inner: Arc::new(PathBindingInner {
                path,
                elements: Mutex::new(Vec::new()),
            }),
        }
    }

    #[must_use]
    pub fn path(&self) -> &BindingPath {
        &self.inner.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.elements).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&self, element: Arc<dyn BoundElement>) {
        lock(&self.inner.elements).push(element);
    }

    /// Remove one occurrence of `element`. Returns whether it was present.
    pub fn remove(&self, element: &dyn BoundElement) -> bool {
        let addr = element_addr(element);
        let mut elements = lock(&self.inner.elements);
        match elements.iter().position(|e| element_addr(&**e) == addr) {
            Some(index) => {
                elements.remove(index);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains(&self, element: &dyn BoundElement) -> bool {
        let addr = element_addr(element);
        lock(&self.inner.elements)
            .iter()
            .any(|e| element_addr(&**e) == addr)
    }

    /// Copy of the element list.
    #[must_use]
    pub fn elements(&self) -> Vec<Arc<dyn BoundElement>> {
        lock(&self.inner.elements).clone()
    }

    /// Remove and return every element.
    pub fn take(&self) -> Vec<Arc<dyn BoundElement>> {
        std::mem::take(&mut *lock(&self.inner.elements))
    }

    pub fn clear(&self) {
        lock(&self.inner.elements).clear();
    }

    /// Push `value` to every element for which `skip` returns false.
    ///
    /// Returns the number of elements updated. Elements run on a snapshot,
    /// so they may track or untrack during the call.
    pub fn distribute(&self, value: &Value, skip: impl Fn(&dyn BoundElement) -> bool) -> usize {
        let mut delivered = 0;
        for element in self.elements() {
            if skip(&*element) {
                continue;
            }
            element.receive_update(value);
            delivered += 1;
        }
        delivered
    }
}

impl std::fmt::Debug for PathBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PathBinding")
            .field("path", &self.inner.path.as_str())
            .field("elements", &self.len())
            .finish()
    }
}
