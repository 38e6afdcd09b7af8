#![forbid(unsafe_code)]

//! The binding inventory: path-addressed registry of UI elements.
//!
//! A [`BindingInventory`] owns one context object and the elements bound to
//! paths relative to it. It subscribes to the context's subject; every change
//! the context reports (already composed into a dotted path by bubbling)
//! refreshes the tracked paths it can affect, then travels down to child
//! inventories whose ancestor-relative (`.X`) or root-anchored (`\X`) paths
//! read from this context.
//!
//! # Invariants
//!
//! 1. The inventory is subscribed to exactly the current context's subject.
//! 2. A refresh reads the model through the accessor store and pushes the
//!    result; it never writes to the model.
//! 3. `send_update` writes only when the new value differs from the current
//!    one, so an equal write produces no notification.
//! 4. No inventory lock is held while model or element code runs.
//! 5. The parent chain is acyclic.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Null link | A member along the path is `Null` | Reads give `Null`; writes are dropped |
//! | Missing ancestor | `..X` above the top of the chain | Reads give `Null` |
//! | Bad index | Index on a non-list or non-numeric index | Un-indexed value is used |
//! | Refresh error | Accessor fails during a notification | Logged at `error`, other paths still refresh |

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, ThreadId};

use arc_swap::{ArcSwap, ArcSwapOption};
use pathbind_core::{
    BindError, Bindable, Change, ChangeListener, CommandArgs, PropertyAccessorStore, Value,
    ValueType,
};
use tracing::{debug, debug_span, error, trace, warn};

use crate::config::InventoryConfig;
use crate::element::{BoundElement, element_addr};
use crate::lock;
use crate::path::{Anchor, BindingPath, IndexSelector, Segment, continues};
use crate::path_binding::PathBinding;

// ---------------------------------------------------------------------------
// Context subscription
// ---------------------------------------------------------------------------

struct ContextListener {
    inventory: Weak<BindingInventory>,
}

impl ChangeListener for ContextListener {
    fn on_change(&self, change: &Change<'_>) {
        if let Some(inventory) = self.inventory.upgrade() {
            inventory.on_context_signaled(change.path().as_deref());
        }
    }
}

// ---------------------------------------------------------------------------
// Echo suppression
// ---------------------------------------------------------------------------

type EchoKey = (ThreadId, usize);

/// Marks one element as the source of an in-flight write on this thread.
struct EchoGuard<'a> {
    suppressed: &'a Mutex<Vec<EchoKey>>,
    key: EchoKey,
}

impl<'a> EchoGuard<'a> {
    fn new(suppressed: &'a Mutex<Vec<EchoKey>>, element: &dyn BoundElement) -> Self {
        let key = (thread::current().id(), element_addr(element));
        lock(suppressed).push(key);
        Self { suppressed, key }
    }
}

impl Drop for EchoGuard<'_> {
    fn drop(&mut self) {
        let mut suppressed = lock(self.suppressed);
        if let Some(index) = suppressed.iter().position(|k| *k == self.key) {
            suppressed.swap_remove(index);
        }
    }
}

// ---------------------------------------------------------------------------
// BindingInventory
// ---------------------------------------------------------------------------

/// Registry of path bindings over one context object.
///
/// Always handled through `Arc`; constructors return one.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use pathbind_core::{ObservableMap, Value};
/// use pathbind_runtime::{BindingInventory, CallbackElement};
///
/// let model = ObservableMap::new();
/// let inventory = BindingInventory::new();
/// inventory.set_context_object(Value::Map(model.clone()));
///
/// let shown = Arc::new(Mutex::new(Value::Null));
/// let sink = Arc::clone(&shown);
/// inventory
///     .track_element(CallbackElement::new("Title", move |v| *sink.lock().unwrap() = v.clone()))
///     .unwrap();
///
/// model.insert("Title", Value::from("Inbox"));
/// assert_eq!(*shown.lock().unwrap(), Value::from("Inbox"));
/// assert_eq!(inventory.dereference_value("Title").unwrap(), Value::from("Inbox"));
/// ```
pub struct BindingInventory {
    me: Weak<BindingInventory>,
    config: InventoryConfig,
    store: Arc<PropertyAccessorStore>,
    context: ArcSwap<Value>,
    parent: ArcSwapOption<BindingInventory>,
    children: Mutex<Vec<Weak<BindingInventory>>>,
    bindings: Mutex<BTreeMap<String, PathBinding>>,
    listener: Arc<dyn ChangeListener>,
    suppressed: Mutex<Vec<EchoKey>>,
}

impl BindingInventory {
    /// A root inventory with default options and its own accessor store.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Self::with_config(InventoryConfig::default())
    }

    #[must_use]
    pub fn with_config(config: InventoryConfig) -> Arc<Self> {
        Self::build(config, Arc::new(PropertyAccessorStore::new()), None)
    }

    /// A root inventory sharing an existing accessor store.
    #[must_use]
    pub fn with_store(config: InventoryConfig, store: Arc<PropertyAccessorStore>) -> Arc<Self> {
        Self::build(config, store, None)
    }

    /// A child of `parent`, inheriting its options and accessor store.
    #[must_use]
    pub fn child_of(parent: &Arc<Self>) -> Arc<Self> {
        Self::build(parent.config, Arc::clone(&parent.store), Some(Arc::clone(parent)))
    }

    fn build(
        config: InventoryConfig,
        store: Arc<PropertyAccessorStore>,
        parent: Option<Arc<Self>>,
    ) -> Arc<Self> {
        let inventory = Arc::new_cyclic(|me: &Weak<Self>| Self {
            me: me.clone(),
            config,
            store,
            context: ArcSwap::from_pointee(Value::Null),
            parent: ArcSwapOption::new(parent.clone()),
            children: Mutex::new(Vec::new()),
            bindings: Mutex::new(BTreeMap::new()),
            listener: Arc::new(ContextListener {
                inventory: me.clone(),
            }),
            suppressed: Mutex::new(Vec::new()),
        });
        if let Some(parent) = parent {
            lock(&parent.children).push(Arc::downgrade(&inventory));
        }
        inventory
    }

    #[must_use]
    pub fn config(&self) -> &InventoryConfig {
        &self.config
    }

    #[must_use]
    pub fn accessor_store(&self) -> &Arc<PropertyAccessorStore> {
        &self.store
    }

    // -- tracking -----------------------------------------------------------

    /// Bind `element` to `path`. A `None` path is ignored.
    ///
    /// # Errors
    ///
    /// [`BindError::InvalidPath`] when `path` does not parse.
    pub fn track(
        self: &Arc<Self>,
        element: Arc<dyn BoundElement>,
        path: Option<&str>,
    ) -> Result<(), BindError> {
        let Some(path) = path else {
            return Ok(());
        };
        let path = BindingPath::parse(path)?;
        self.insert(path, Arc::clone(&element));
        element.track(self);
        Ok(())
    }

    /// Bind `element` to the path it declares.
    ///
    /// # Errors
    ///
    /// [`BindError::InvalidPath`] when the declared path does not parse.
    pub fn track_element(self: &Arc<Self>, element: Arc<dyn BoundElement>) -> Result<(), BindError> {
        let path = element.path().map(str::to_owned);
        self.track(element, path.as_deref())
    }

    /// Remove one occurrence of `element` from `path`. Returns whether it was
    /// tracked there.
    pub fn untrack(&self, element: &dyn BoundElement, path: &str) -> bool {
        let Ok(path) = BindingPath::parse(path) else {
            return false;
        };
        let mut bindings = lock(&self.bindings);
        let Some(binding) = bindings.get(path.key()) else {
            return false;
        };
        let removed = binding.remove(element);
        if binding.is_empty() {
            bindings.remove(path.key());
        }
        removed
    }

    fn insert(&self, path: BindingPath, element: Arc<dyn BoundElement>) {
        let key = path.key().to_owned();
        lock(&self.bindings)
            .entry(key)
            .or_insert_with(|| PathBinding::new(path))
            .add(element);
    }

    /// Canonical keys of the tracked paths, in sorted order.
    #[must_use]
    pub fn tracked_paths(&self) -> Vec<String> {
        lock(&self.bindings).keys().cloned().collect()
    }

    /// The binding `path` shares with every path of the same key.
    #[must_use]
    pub fn binding(&self, path: &str) -> Option<PathBinding> {
        let path = BindingPath::parse(path).ok()?;
        lock(&self.bindings).get(path.key()).cloned()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.bindings).is_empty()
    }

    /// Move every binding of `other` here and clear `other`.
    ///
    /// Each moved element is told about its new inventory through
    /// [`BoundElement::track`].
    pub fn merge(self: &Arc<Self>, other: &Arc<Self>) {
        if Arc::ptr_eq(self, other) {
            return;
        }
        let taken = std::mem::take(&mut *lock(&other.bindings));
        debug!(
            target: "pathbind::inventory",
            paths = taken.len(),
            "merging inventory"
        );
        for binding in taken.into_values() {
            for element in binding.take() {
                self.insert(binding.path().clone(), Arc::clone(&element));
                element.track(self);
            }
        }
    }

    // -- context ------------------------------------------------------------

    #[must_use]
    pub fn context_object(&self) -> Value {
        Value::clone(&self.context.load())
    }

    /// Replace the context object and move the subscription to it.
    ///
    /// Elements are refreshed immediately only with
    /// [`InventoryConfig::eager_sync`].
    pub fn set_context_object(&self, value: Value) {
        let old = self.context.swap(Arc::new(value.clone()));
        if let Some(subject) = old.subject() {
            subject.unregister_listener("", &self.listener);
        }
        if let Some(subject) = value.subject() {
            subject.register_listener("", &self.listener);
        }
        if self.config.eager_sync {
            self.on_context_signaled(None);
        }
    }

    // -- refresh ------------------------------------------------------------

    /// React to a change of the context object.
    ///
    /// `path` is the changed path relative to the context; `None` means the
    /// whole object changed. Tracked paths equal to `path` or below it are
    /// re-read and pushed, then child inventories get the same signal.
    pub fn on_context_signaled(&self, path: Option<&str>) {
        let _span = debug_span!("binding_refresh", path = path.unwrap_or("*")).entered();
        let is_root = self.parent_inventory().is_none();
        self.refresh_matching(Anchor::Local, path);
        if is_root {
            self.refresh_matching(Anchor::Root, path);
        }
        self.forward_to_children(1, path, is_root);
    }

    /// Re-read and push every tracked path.
    pub fn refresh_all(&self) {
        self.on_context_signaled(None);
    }

    fn on_ancestor_signaled(&self, level: usize, path: Option<&str>, from_root: bool) {
        self.refresh_matching(Anchor::Up(level), path);
        if from_root {
            self.refresh_matching(Anchor::Root, path);
        }
        self.forward_to_children(level + 1, path, from_root);
    }

    fn forward_to_children(&self, level: usize, path: Option<&str>, from_root: bool) {
        for child in self.children() {
            child.on_ancestor_signaled(level, path, from_root);
        }
    }

    fn refresh_matching(&self, anchor: Anchor, changed: Option<&str>) {
        for binding in self.affected(anchor, changed) {
            self.refresh(&binding);
        }
    }

    fn affected(&self, anchor: Anchor, changed: Option<&str>) -> Vec<PathBinding> {
        let bindings = lock(&self.bindings);
        match changed {
            Some(changed) => {
                let prefix = format!("{}{changed}", anchor.prefix());
                bindings
                    .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
                    .take_while(|(key, _)| key.starts_with(&prefix))
                    .filter(|(key, binding)| {
                        continues(key, &prefix) && binding.path().anchor() == anchor
                    })
                    .map(|(_, binding)| binding.clone())
                    .collect()
            }
            None => bindings
                .values()
                .filter(|binding| binding.path().anchor() == anchor)
                .cloned()
                .collect(),
        }
    }

    fn refresh(&self, binding: &PathBinding) {
        let path = binding.path().as_str();
        match self.dereference_path(binding.path()) {
            Ok(value) => {
                let delivered = binding.distribute(&value, |element| self.is_suppressed(element));
                trace!(target: "pathbind::inventory", path, delivered, "refreshed");
            }
            Err(err @ BindError::InvalidPath { .. }) => {
                warn!(target: "pathbind::inventory", path, %err, "invalid path during refresh");
            }
            Err(err) => {
                error!(target: "pathbind::inventory", path, %err, "refresh failed");
            }
        }
    }

    fn is_suppressed(&self, element: &dyn BoundElement) -> bool {
        if !self.config.suppress_echo {
            return false;
        }
        let key = (thread::current().id(), element_addr(element));
        let hit = lock(&self.suppressed).contains(&key);
        if hit {
            debug!(target: "pathbind::inventory", "suppressed echo to originating element");
        }
        hit
    }

    // -- reads --------------------------------------------------------------

    /// Read the value at `path`.
    ///
    /// # Errors
    ///
    /// [`BindError::InvalidPath`] for a malformed path,
    /// [`BindError::PropertyNotFound`] for a member missing on a non-null
    /// host.
    pub fn dereference_value(&self, path: &str) -> Result<Value, BindError> {
        self.dereference_path(&BindingPath::parse(path)?)
    }

    /// Read the value at an already parsed path.
    ///
    /// # Errors
    ///
    /// As [`dereference_value`](Self::dereference_value).
    pub fn dereference_path(&self, path: &BindingPath) -> Result<Value, BindError> {
        self.walk(self.anchor_context(path.anchor()), path.segments())
    }

    /// Declared type of the member `path` ends in.
    ///
    /// `Ok(None)` when the path names a context object or runs through a null
    /// link. Indexing into a list member yields [`ValueType::Any`].
    ///
    /// # Errors
    ///
    /// [`BindError::InvalidPath`] when the path is malformed or a member along
    /// it cannot be resolved.
    pub fn dereference_property_type(&self, path: &str) -> Result<Option<ValueType>, BindError> {
        let parsed = BindingPath::parse(path)?;
        let unresolved = |err: BindError| BindError::invalid_path(path, err.to_string());

        let Some((last, init)) = parsed.segments().split_last() else {
            return Ok(None);
        };
        let host_value = self
            .walk(self.anchor_context(parsed.anchor()), init)
            .map_err(unresolved)?;
        if host_value.is_null() {
            return Ok(None);
        }
        let accessor = host(&host_value, last)
            .and_then(|host| self.store.resolve(host, last.name()))
            .map_err(unresolved)?;
        let value_type = match last.index() {
            Some(IndexSelector::At(_)) if accessor.value_type() == ValueType::List => ValueType::Any,
            _ => accessor.value_type(),
        };
        Ok(Some(value_type))
    }

    fn anchor_context(&self, anchor: Anchor) -> Value {
        let context = match anchor {
            Anchor::Local | Anchor::Up(0) => self.context_object(),
            Anchor::Up(levels) => self
                .ancestor(levels)
                .map_or(Value::Null, |inventory| inventory.context_object()),
            Anchor::Root => self
                .root_ancestor()
                .map_or_else(|| self.context_object(), |root| root.context_object()),
        };
        context.unwrap_proxy()
    }

    fn walk(&self, mut current: Value, segments: &[Segment]) -> Result<Value, BindError> {
        for segment in segments {
            if current.is_null() {
                trace!(target: "pathbind::inventory", member = segment.name(), "null link");
                return Ok(Value::Null);
            }
            current = self.read_segment(&current, segment)?;
        }
        Ok(current)
    }

    fn read_segment(&self, host_value: &Value, segment: &Segment) -> Result<Value, BindError> {
        let host = host(host_value, segment)?;
        let value = self
            .store
            .resolve(host, segment.name())?
            .get(host)?
            .unwrap_proxy();
        Ok(match segment.index() {
            Some(selector) => select_index(value, selector, segment.name()),
            None => value,
        })
    }

    // -- writes -------------------------------------------------------------

    /// Write `value` to the member at `path`.
    ///
    /// Returns whether the model changed. Anchor-only paths, null links,
    /// read-only members and equal values are no-ops.
    ///
    /// # Errors
    ///
    /// [`BindError::InvalidPath`] for a malformed path,
    /// [`BindError::PropertyNotFound`] for a missing member, and conversion
    /// errors from the setter.
    pub fn send_update(&self, path: &str, value: Value) -> Result<bool, BindError> {
        self.write(&BindingPath::parse(path)?, value)
    }

    /// As [`send_update`](Self::send_update), on behalf of `element`.
    ///
    /// With [`InventoryConfig::suppress_echo`], the change notification the
    /// write triggers is not pushed back to `element`.
    ///
    /// # Errors
    ///
    /// As [`send_update`](Self::send_update).
    pub fn send_update_from(
        &self,
        element: &dyn BoundElement,
        path: &str,
        value: Value,
    ) -> Result<bool, BindError> {
        let path = BindingPath::parse(path)?;
        let _guard = self
            .config
            .suppress_echo
            .then(|| EchoGuard::new(&self.suppressed, element));
        self.write(&path, value)
    }

    fn write(&self, path: &BindingPath, value: Value) -> Result<bool, BindError> {
        let Some((last, init)) = path.segments().split_last() else {
            debug!(target: "pathbind::inventory", path = path.as_str(), "write to anchor-only path ignored");
            return Ok(false);
        };
        let host_value = self.walk(self.anchor_context(path.anchor()), init)?;
        if host_value.is_null() {
            trace!(target: "pathbind::inventory", path = path.as_str(), "null link, write dropped");
            return Ok(false);
        }
        let host = host(&host_value, last)?;
        let accessor = self.store.resolve(host, last.name())?;
        let current = accessor.get(host)?;

        if let Some(IndexSelector::At(index)) = last.index() {
            let target = current.clone().unwrap_proxy();
            if let Some(list) = target.as_list() {
                return Ok(match list.get(*index) {
                    Some(old) if old == value => false,
                    Some(_) => {
                        list.set(*index, value);
                        true
                    }
                    None => {
                        debug!(target: "pathbind::inventory", path = path.as_str(), "index out of range, write dropped");
                        false
                    }
                });
            }
        }

        if let Value::Proxy(proxy) = &current {
            if proxy.get() == value {
                return Ok(false);
            }
            return match proxy.set(value) {
                Ok(()) => Ok(true),
                Err(BindError::ReadOnly { .. }) => {
                    debug!(target: "pathbind::inventory", path = path.as_str(), "read-only proxy, write dropped");
                    Ok(false)
                }
                Err(err) => Err(err),
            };
        }

        if accessor.is_read_only() {
            debug!(target: "pathbind::inventory", path = path.as_str(), "read-only member, write dropped");
            return Ok(false);
        }
        if current == value {
            debug!(target: "pathbind::inventory", path = path.as_str(), "value unchanged");
            return Ok(false);
        }
        accessor.set(host, value)?;
        Ok(true)
    }

    /// Execute the command at `path`.
    ///
    /// Returns whether a callback ran. When `path` holds no command, `args`
    /// is marked not handled.
    ///
    /// # Errors
    ///
    /// As [`dereference_value`](Self::dereference_value).
    pub fn fire_command(&self, path: &str, args: &mut CommandArgs) -> Result<bool, BindError> {
        match self.dereference_value(path)?.as_command() {
            Some(command) => Ok(command.execute(args)),
            None => {
                debug!(target: "pathbind::inventory", path, "no command at path");
                args.set_handled(false);
                Ok(false)
            }
        }
    }

    // -- hierarchy ----------------------------------------------------------

    #[must_use]
    pub fn parent_inventory(&self) -> Option<Arc<Self>> {
        self.parent.load_full()
    }

    /// Attach to `parent`, or detach from the current parent with `None`.
    ///
    /// # Errors
    ///
    /// [`BindError::CyclicInventory`] when `parent` is this inventory or one
    /// of its descendants.
    pub fn set_parent_inventory(&self, parent: Option<&Arc<Self>>) -> Result<(), BindError> {
        if let Some(parent) = parent {
            let mut cursor = Some(Arc::clone(parent));
            while let Some(inventory) = cursor {
                if std::ptr::eq(Arc::as_ptr(&inventory), self) {
                    return Err(BindError::CyclicInventory);
                }
                cursor = inventory.parent_inventory();
            }
        }
        if let Some(old) = self.parent.swap(parent.cloned()) {
            old.remove_child(self);
        }
        if let Some(parent) = parent {
            lock(&parent.children).push(self.me.clone());
        }
        Ok(())
    }

    /// The top of the parent chain; `self` when there is no parent.
    #[must_use]
    pub fn root_inventory(self: &Arc<Self>) -> Arc<Self> {
        self.root_ancestor().unwrap_or_else(|| Arc::clone(self))
    }

    /// The inventory `level` steps up; level 0 is `self`.
    #[must_use]
    pub fn inventory_by_level(self: &Arc<Self>, level: usize) -> Option<Arc<Self>> {
        match level {
            0 => Some(Arc::clone(self)),
            n => self.ancestor(n),
        }
    }

    /// Live child inventories.
    #[must_use]
    pub fn children(&self) -> Vec<Arc<Self>> {
        let mut children = lock(&self.children);
        children.retain(|child| child.strong_count() > 0);
        children.iter().filter_map(Weak::upgrade).collect()
    }

    fn ancestor(&self, levels: usize) -> Option<Arc<Self>> {
        let mut current = self.parent_inventory()?;
        for _ in 1..levels {
            current = current.parent_inventory()?;
        }
        Some(current)
    }

    fn root_ancestor(&self) -> Option<Arc<Self>> {
        let mut current = self.parent_inventory()?;
        while let Some(next) = current.parent_inventory() {
            current = next;
        }
        Some(current)
    }

    fn remove_child(&self, child: &Self) {
        lock(&self.children)
            .retain(|weak| weak.strong_count() > 0 && !std::ptr::eq(weak.as_ptr(), child));
    }

    /// Unsubscribe from the context, drop every binding, and leave the
    /// parent. Runs automatically on drop.
    pub fn detach(&self) {
        let old = self.context.swap(Arc::new(Value::Null));
        if let Some(subject) = old.subject() {
            subject.unregister_listener("", &self.listener);
        }
        lock(&self.bindings).clear();
        if let Some(parent) = self.parent.swap(None) {
            parent.remove_child(self);
        }
    }
}

impl Drop for BindingInventory {
    fn drop(&mut self) {
        self.detach();
    }
}

impl std::fmt::Debug for BindingInventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingInventory")
            .field("context", &self.context_object())
            .field("paths", &lock(&self.bindings).len())
            .field("has_parent", &self.parent_inventory().is_some())
            .field("config", &self.config)
            .finish()
    }
}

fn host<'a>(value: &'a Value, segment: &Segment) -> Result<&'a dyn Bindable, BindError> {
    value.as_host().ok_or_else(|| BindError::PropertyNotFound {
        type_name: value.type_name(),
        member: segment.name().to_owned(),
    })
}

fn select_index(value: Value, selector: &IndexSelector, member: &str) -> Value {
    if let IndexSelector::At(index) = selector {
        if let Some(list) = value.as_list() {
            return list.get(*index).unwrap_or_default().unwrap_proxy();
        }
    }
    debug!(target: "pathbind::inventory", member, ?selector, "index ignored, using member value");
    value
}
