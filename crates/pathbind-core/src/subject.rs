#![forbid(unsafe_code)]

//! Change notification: labelled listeners, reactions, and bubbling.
//!
//! An [`ObservableSubject`] is owned by every object that can announce
//! property changes. Listeners register under a *label*: the name the
//! source is known by to that listener. A parent object registers its own
//! subject on a child's subject under the member name holding the child, so
//! a child change `"I"` re-fires on the parent as `"Obj.I"`, and one hop
//! further as `"Obj.Obj.I"`. No component needs global path knowledge.
//!
//! # Invariants
//!
//! 1. Firing `P` fires every reaction dependent of `P` first (recursively),
//!    then notifies each listener once per label it is registered under.
//! 2. Listeners are held weakly. A dropped listener is skipped and pruned on
//!    the next registry access.
//! 3. Registry locks are held only while reading or writing the registry;
//!    callbacks run on a snapshot, so a callback may register or unregister
//!    listeners without deadlocking.
//! 4. Within one label, listeners are notified in registration order.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | No listeners | Nothing subscribed | `notify` is a no-op |
//! | Duplicate registration | Same (label, listener) twice | Stored once |
//! | Unknown unregistration | Pair never registered | No-op |
//! | Reaction cycle | A reacts to B and B reacts to A | Unbounded recursion; callers must not author cycles |

use core::fmt;
use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use ahash::AHashMap;

use crate::lock;
use crate::value::Value;

static NEXT_SUBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the subject a change originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubjectId(u64);

impl SubjectId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Join a listener label and a nested path the way an author writes paths.
///
/// An empty label contributes nothing, an absent nested path yields the bare
/// label, and an index selector attaches without a dot.
///
/// ```
/// use pathbind_core::compose_path;
///
/// assert_eq!(compose_path("Obj", Some("I")).as_deref(), Some("Obj.I"));
/// assert_eq!(compose_path("Items", Some("@[2].Name")).as_deref(), Some("Items@[2].Name"));
/// assert_eq!(compose_path("Obj", None).as_deref(), Some("Obj"));
/// assert_eq!(compose_path("", Some("I")).as_deref(), Some("I"));
/// assert_eq!(compose_path("", None), None);
/// ```
#[must_use]
pub fn compose_path(label: &str, nested: Option<&str>) -> Option<String> {
    match (label.is_empty(), nested) {
        (true, None) => None,
        (true, Some(nested)) => Some(nested.to_owned()),
        (false, None) => Some(label.to_owned()),
        (false, Some(nested)) if nested.starts_with('@') => Some(format!("{label}{nested}")),
        (false, Some(nested)) => Some(format!("{label}.{nested}")),
    }
}

// ---------------------------------------------------------------------------
// Change / ChangeListener
// ---------------------------------------------------------------------------

/// One change as seen by one listener.
#[derive(Debug, Clone, Copy)]
pub struct Change<'a> {
    label: &'a str,
    property: Option<&'a str>,
    source: SubjectId,
}

impl<'a> Change<'a> {
    /// Label the listener registered under.
    #[must_use]
    pub fn label(&self) -> &'a str {
        self.label
    }

    /// Property that fired; `None` means the whole object changed.
    #[must_use]
    pub fn property(&self) -> Option<&'a str> {
        self.property
    }

    /// Subject that fired.
    #[must_use]
    pub fn source(&self) -> SubjectId {
        self.source
    }

    /// The path of the change relative to the listener.
    #[must_use]
    pub fn path(&self) -> Option<String> {
        compose_path(self.label, self.property)
    }
}

/// Receives change notifications from an [`ObservableSubject`].
pub trait ChangeListener: Send + Sync {
    fn on_change(&self, change: &Change<'_>);
}

struct FnListener<F>(F);

impl<F: Fn(&Change<'_>) + Send + Sync> ChangeListener for FnListener<F> {
    fn on_change(&self, change: &Change<'_>) {
        (self.0)(change);
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// RAII guard that keeps a callback registered.
///
/// Registries hold callbacks weakly; dropping the guard releases the only
/// strong reference, so the callback never fires again.
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    _keepalive: Box<dyn Any + Send + Sync>,
}

impl Subscription {
    pub(crate) fn new(keepalive: impl Any + Send + Sync) -> Self {
        Self {
            _keepalive: Box::new(keepalive),
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish()
    }
}

// ---------------------------------------------------------------------------
// ObservableSubject
// ---------------------------------------------------------------------------

struct ListenerEntry {
    listener: Weak<dyn ChangeListener>,
    labels: Vec<String>,
}

impl ListenerEntry {
    fn is(&self, listener: &Arc<dyn ChangeListener>) -> bool {
        std::ptr::addr_eq(self.listener.as_ptr(), Arc::as_ptr(listener))
    }
}

struct SubjectInner {
    id: SubjectId,
    listeners: Mutex<Vec<ListenerEntry>>,
    reactions: Mutex<AHashMap<String, Vec<String>>>,
}

impl SubjectInner {
    fn notify(&self, property: &str) {
        let dependents = lock(&self.reactions)
            .get(property)
            .cloned()
            .unwrap_or_default();
        for dependent in &dependents {
            self.notify(dependent);
        }
        self.dispatch(Some(property));
    }

    fn notify_bubbled(&self, label: &str, nested: Option<&str>) {
        match compose_path(label, nested) {
            Some(path) => self.notify(&path),
            None => self.dispatch(None),
        }
    }

    fn dispatch(&self, property: Option<&str>) {
        let snapshot: Vec<(Arc<dyn ChangeListener>, Vec<String>)> = {
            let mut entries = lock(&self.listeners);
            entries.retain(|entry| entry.listener.strong_count() > 0);
            entries
                .iter()
                .filter_map(|entry| {
                    entry
                        .listener
                        .upgrade()
                        .map(|listener| (listener, entry.labels.clone()))
                })
                .collect()
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(
            target: "pathbind::subject",
            subject = self.id.0,
            property,
            listeners = snapshot.len(),
            "notify"
        );

        for (listener, labels) in &snapshot {
            for label in labels {
                listener.on_change(&Change {
                    label,
                    property,
                    source: self.id,
                });
            }
        }
    }
}

// A subject registered on a child's subject re-fires the child's changes
// under the label it was registered with.
impl ChangeListener for SubjectInner {
    fn on_change(&self, change: &Change<'_>) {
        self.notify_bubbled(change.label(), change.property());
    }
}

/// Change-notification registry owned by an observable object.
///
/// Cloning yields another handle to the same registry.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use pathbind_core::ObservableSubject;
///
/// let subject = ObservableSubject::new();
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let _sub = subject.subscribe("", move |change| {
///     sink.lock().unwrap().push(change.path());
/// });
///
/// subject.add_reaction("First", "FullName");
/// subject.notify("First");
/// assert_eq!(
///     *seen.lock().unwrap(),
///     vec![Some("FullName".to_string()), Some("First".to_string())]
/// );
/// ```
#[derive(Clone)]
pub struct ObservableSubject {
    inner: Arc<SubjectInner>,
}

impl Default for ObservableSubject {
    fn default() -> Self {
        Self::new()
    }
}

impl ObservableSubject {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SubjectInner {
                id: SubjectId(NEXT_SUBJECT_ID.fetch_add(1, Ordering::Relaxed)),
                listeners: Mutex::new(Vec::new()),
                reactions: Mutex::new(AHashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> SubjectId {
        self.inner.id
    }

    /// Whether both handles refer to the same registry.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// This subject as a listener that re-fires changes it receives.
    #[must_use]
    pub fn as_listener(&self) -> Arc<dyn ChangeListener> {
        self.inner.clone()
    }

    /// Register `listener` under `label`. Registering an existing pair is a
    /// no-op.
    pub fn register_listener(&self, label: &str, listener: &Arc<dyn ChangeListener>) {
        let mut entries = lock(&self.inner.listeners);
        entries.retain(|entry| entry.listener.strong_count() > 0);
        match entries.iter_mut().find(|entry| entry.is(listener)) {
            Some(entry) => {
                if !entry.labels.iter().any(|l| l == label) {
                    entry.labels.push(label.to_owned());
                }
            }
            None => entries.push(ListenerEntry {
                listener: Arc::downgrade(listener),
                labels: vec![label.to_owned()],
            }),
        }
    }

    /// Remove one (label, listener) pair. Returns whether it was registered.
    pub fn unregister_listener(&self, label: &str, listener: &Arc<dyn ChangeListener>) -> bool {
        let mut entries = lock(&self.inner.listeners);
        let Some(index) = entries.iter().position(|entry| entry.is(listener)) else {
            return false;
        };
        let entry = &mut entries[index];
        let before = entry.labels.len();
        entry.labels.retain(|l| l != label);
        let removed = entry.labels.len() != before;
        if entry.labels.is_empty() {
            entries.remove(index);
        }
        removed
    }

    /// Register a closure listener. Dropping the returned guard unregisters it.
    pub fn subscribe(
        &self,
        label: &str,
        callback: impl Fn(&Change<'_>) + Send + Sync + 'static,
    ) -> Subscription {
        let listener: Arc<dyn ChangeListener> = Arc::new(FnListener(callback));
        self.register_listener(label, &listener);
        Subscription::new(listener)
    }

    /// Number of live listeners, counting each listener once.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners)
            .iter()
            .filter(|entry| entry.listener.strong_count() > 0)
            .count()
    }

    /// Declare that `dependent` must re-fire whenever `trigger` fires.
    pub fn add_reaction(&self, trigger: &str, dependent: &str) {
        let mut reactions = lock(&self.inner.reactions);
        let dependents = reactions.entry(trigger.to_owned()).or_default();
        if !dependents.iter().any(|d| d == dependent) {
            dependents.push(dependent.to_owned());
        }
    }

    /// Remove a reaction. Returns whether it existed.
    pub fn remove_reaction(&self, trigger: &str, dependent: &str) -> bool {
        let mut reactions = lock(&self.inner.reactions);
        let Some(dependents) = reactions.get_mut(trigger) else {
            return false;
        };
        let before = dependents.len();
        dependents.retain(|d| d != dependent);
        let removed = dependents.len() != before;
        if dependents.is_empty() {
            reactions.remove(trigger);
        }
        removed
    }

    /// Fire `property`: reaction dependents first, then every listener.
    pub fn notify(&self, property: &str) {
        self.inner.notify(property);
    }

    /// Fire a whole-object change (no specific property).
    pub fn notify_all(&self) {
        self.inner.dispatch(None);
    }

    /// Fire the change a nested object reported under `label`.
    ///
    /// `nested` is the path relative to the nested object; `None` means the
    /// nested object was replaced or changed wholesale.
    pub fn notify_bubbled(&self, label: &str, nested: Option<&str>) {
        self.inner.notify_bubbled(label, nested);
    }

    /// Move this subject's subscription from `old_child` to `new_child`
    /// under `label`, then fire `label`.
    ///
    /// Call whenever a member holding a nested observable is reassigned so
    /// the replaced child stops reporting through this object.
    pub fn register_child_edge(&self, label: &str, old_child: &Value, new_child: &Value) {
        let me = self.as_listener();
        if let Some(old) = old_child.subject() {
            old.unregister_listener(label, &me);
        }
        if let Some(new) = new_child.subject() {
            new.register_listener(label, &me);
        }
        self.notify(label);
    }

    /// Subscribe this subject to `child` under `label` without firing.
    ///
    /// Used when populating a container or wiring a freshly built object.
    pub fn attach_child(&self, label: &str, child: &Value) {
        if let Some(subject) = child.subject() {
            subject.register_listener(label, &self.as_listener());
        }
    }

    /// Undo [`attach_child`](Self::attach_child) without firing.
    pub fn detach_child(&self, label: &str, child: &Value) {
        if let Some(subject) = child.subject() {
            subject.unregister_listener(label, &self.as_listener());
        }
    }
}

impl fmt::Debug for ObservableSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableSubject")
            .field("id", &self.inner.id.0)
            .field("listeners", &self.listener_count())
            .finish()
    }
}
