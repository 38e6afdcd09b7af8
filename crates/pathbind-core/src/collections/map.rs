#![forbid(unsafe_code)]

//! Observable string-keyed map.
//!
//! Keys double as members: a path `Settings.Theme` through a map-valued
//! `Settings` reads key `"Theme"`. Missing keys read as `Null`; writing a
//! missing key inserts it.

use core::fmt;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::accessor::{PropertyAccessor, TypeShape};
use crate::collections::Watchers;
use crate::error::BindError;
use crate::lock;
use crate::subject::{ObservableSubject, Subscription};
use crate::value::{Bindable, Value, ValueType};

/// Structural change to an [`ObservableMap`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapChange {
    Inserted { key: String },
    Replaced { key: String },
    Removed { key: String },
    Cleared,
}

struct MapInner {
    entries: Mutex<BTreeMap<String, Value>>,
    subject: ObservableSubject,
    watchers: Watchers<MapChange>,
}

/// A shared, observable map from string keys to [`Value`]s.
///
/// Each mutation fires the affected key on the map's subject; `clear` fires a
/// whole-map change. Observable values are subscribed under their key.
///
/// Cloning yields another handle to the same map.
#[derive(Clone)]
pub struct ObservableMap {
    inner: Arc<MapInner>,
}

impl Default for ObservableMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservableMap {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MapInner {
                entries: Mutex::new(BTreeMap::new()),
                subject: ObservableSubject::new(),
                watchers: Watchers::default(),
            }),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.inner.entries).get(key).cloned()
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        lock(&self.inner.entries).contains_key(key)
    }

    /// Keys in sorted order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        lock(&self.inner.entries).keys().cloned().collect()
    }

    /// Copy of the current entries in key order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, Value)> {
        lock(&self.inner.entries)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Insert or replace `key`, returning the previous value.
    ///
    /// Storing a value equal to the current one fires nothing.
    pub fn insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        let key = key.into();
        let old = {
            let mut entries = lock(&self.inner.entries);
            if entries.get(&key) == Some(&value) {
                return Some(value);
            }
            self.inner.subject.attach_child(&key, &value);
            let old = entries.insert(key.clone(), value);
            if let Some(old) = &old {
                self.inner.subject.detach_child(&key, old);
            }
            old
        };
        let change = if old.is_some() {
            MapChange::Replaced { key: key.clone() }
        } else {
            MapChange::Inserted { key: key.clone() }
        };
        self.inner.watchers.emit(&change);
        self.inner.subject.notify(&key);
        old
    }

    /// Remove `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut entries = lock(&self.inner.entries);
            let removed = entries.remove(key)?;
            self.inner.subject.detach_child(key, &removed);
            removed
        };
        self.inner.watchers.emit(&MapChange::Removed {
            key: key.to_owned(),
        });
        self.inner.subject.notify(key);
        Some(removed)
    }

    /// Remove every entry.
    pub fn clear(&self) {
        {
            let mut entries = lock(&self.inner.entries);
            for (key, value) in entries.iter() {
                self.inner.subject.detach_child(key, value);
            }
            entries.clear();
        }
        self.inner.watchers.emit(&MapChange::Cleared);
        self.inner.subject.notify_all();
    }

    /// Register a structural-change callback.
    pub fn subscribe_structure(
        &self,
        callback: impl Fn(&MapChange) + Send + Sync + 'static,
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
}

fn host_map(host: &dyn Bindable) -> Result<&ObservableMap, BindError> {
    host.as_any()
        .downcast_ref::<ObservableMap>()
        .ok_or(BindError::HostMismatch {
            expected: "ObservableMap",
        })
}

impl Bindable for ObservableMap {
    fn shape(&self) -> TypeShape {
        TypeShape::builder::<Self>().build()
    }

    fn subject(&self) -> Option<&ObservableSubject> {
        Some(&self.inner.subject)
    }

    fn resolve_member(&self, member: &str) -> Option<PropertyAccessor> {
        let read_key: Arc<str> = Arc::from(member);
        let write_key = Arc::clone(&read_key);
        let accessor = PropertyAccessor::new(member, ValueType::Any, move |host| {
            Ok(host_map(host)?.get(&read_key).unwrap_or_default())
        })
        .with_setter(move |host, value| {
            host_map(host)?.insert(&*write_key, value);
            Ok(())
        });
        Some(accessor)
    }

    fn type_name(&self) -> &'static str {
        "ObservableMap"
    }
}

impl fmt::Debug for ObservableMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}

impl FromIterator<(String, Value)> for ObservableMap {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let map = Self::new();
        {
            let mut entries = lock(&map.inner.entries);
            for (key, value) in iter {
                map.inner.subject.attach_child(&key, &value);
                if let Some(old) = entries.insert(key.clone(), value) {
                    map.inner.subject.detach_child(&key, &old);
                }
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::PropertyAccessorStore;

    fn record(map: &ObservableMap) -> (Arc<Mutex<Vec<String>>>, Subscription) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let sub = map.subject().subscribe("", move |c| {
            sink.lock()
                .unwrap()
                .push(c.path().unwrap_or_else(|| "<all>".into()));
        });
        (seen, sub)
    }

    #[test]
    fn insert_replace_remove_fire_key() {
        let map = ObservableMap::new();
        let (seen, _sub) = record(&map);
        let structure = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&structure);
        let _s = map.subscribe_structure(move |c| sink.lock().unwrap().push(c.clone()));

        assert_eq!(map.insert("Theme", Value::from("dark")), None);
        assert_eq!(map.insert("Theme", Value::from("light")), Some(Value::from("dark")));
        assert_eq!(map.remove("Theme"), Some(Value::from("light")));
        assert_eq!(map.remove("Theme"), None);

        assert_eq!(*seen.lock().unwrap(), vec!["Theme", "Theme", "Theme"]);
        assert_eq!(
            *structure.lock().unwrap(),
            vec![
                MapChange::Inserted { key: "Theme".into() },
                MapChange::Replaced { key: "Theme".into() },
                MapChange::Removed { key: "Theme".into() },
            ]
        );
    }

    #[test]
    fn equal_insert_is_silent() {
        let map = ObservableMap::new();
        map.insert("A", Value::Int(1));
        let (seen, _sub) = record(&map);
        map.insert("A", Value::Int(1));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn clear_fires_whole_map() {
        let map: ObservableMap = [("A".to_string(), Value::Int(1))].into_iter().collect();
        let (seen, _sub) = record(&map);
        map.clear();
        assert_eq!(*seen.lock().unwrap(), vec!["<all>"]);
        assert!(map.is_empty());
    }

    #[test]
    fn nested_map_change_bubbles_under_key() {
        let inner = ObservableMap::new();
        let outer = ObservableMap::new();
        outer.insert("Inner", Value::Map(inner.clone()));
        let (seen, _sub) = record(&outer);
        inner.insert("Leaf", Value::Bool(true));
        assert_eq!(*seen.lock().unwrap(), vec!["Inner.Leaf"]);

        outer.remove("Inner");
        seen.lock().unwrap().clear();
        inner.insert("Leaf", Value::Bool(false));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn keys_resolve_as_members() {
        let map = ObservableMap::new();
        let store = PropertyAccessorStore::new();

        let missing = store.resolve(&map, "Theme").unwrap();
        assert_eq!(missing.get(&map).unwrap(), Value::Null);

        missing.set(&map, Value::from("dark")).unwrap();
        assert_eq!(map.get("Theme"), Some(Value::from("dark")));
        assert_eq!(store.cached_len(), 0);
    }

    #[test]
    fn keys_are_sorted() {
        let map = ObservableMap::new();
        map.insert("b", Value::Null);
        map.insert("a", Value::Null);
        assert_eq!(map.keys(), vec!["a", "b"]);
    }
}
