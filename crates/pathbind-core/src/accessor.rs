#![forbid(unsafe_code)]

//! Member resolution: typed get/set pairs per (host type, member name).
//!
//! Host types describe their members once through [`Bindable::shape`],
//! registering typed closures on a [`ShapeBuilder`]. The
//! [`PropertyAccessorStore`] resolves a member name against that table and
//! caches the resulting [`PropertyAccessor`] per concrete type.
//!
//! # Resolution Order
//!
//! For member `name` (first letter capitalized to `Name`):
//!
//! 1. A getter registered as `getName` or `isName`, paired with an optional
//!    setter registered as `setName`.
//! 2. A field registered as `name`.
//! 3. Otherwise [`BindError::PropertyNotFound`].
//!
//! Hosts that override [`Bindable::resolve_member`] are consulted first and
//! their answers are never cached.
//!
//! # Invariants
//!
//! 1. `resolve` calls `shape()` at most once per concrete type until the type
//!    is invalidated.
//! 2. The store never holds its locks while running host code.
//! 3. No change notification originates here.

use core::fmt;
use core::marker::PhantomData;
use std::any::{Any, TypeId};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;

use crate::error::BindError;
use crate::lock;
use crate::value::{Bindable, Value, ValueType};

type GetFn = Arc<dyn Fn(&dyn Bindable) -> Result<Value, BindError> + Send + Sync>;
type SetFn = Arc<dyn Fn(&dyn Bindable, Value) -> Result<(), BindError> + Send + Sync>;

// ---------------------------------------------------------------------------
// PropertyAccessor
// ---------------------------------------------------------------------------

/// A resolved get/set pair for one member of one host type.
#[derive(Clone)]
pub struct PropertyAccessor {
    name: Arc<str>,
    value_type: ValueType,
    get: GetFn,
    set: Option<SetFn>,
}

impl PropertyAccessor {
    /// Create a read-only accessor from an untyped getter.
    ///
    /// Intended for [`Bindable::resolve_member`] implementations.
    pub fn new(
        name: impl Into<Arc<str>>,
        value_type: ValueType,
        get: impl Fn(&dyn Bindable) -> Result<Value, BindError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            value_type,
            get: Arc::new(get),
            set: None,
        }
    }

    /// Attach an untyped setter.
    #[must_use]
    pub fn with_setter(
        mut self,
        set: impl Fn(&dyn Bindable, Value) -> Result<(), BindError> + Send + Sync + 'static,
    ) -> Self {
        self.set = Some(Arc::new(set));
        self
    }

    /// Member name as written in paths.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type of the member.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.set.is_none()
    }

    /// Read the member from `host`.
    ///
    /// # Errors
    ///
    /// [`BindError::HostMismatch`] when `host` is not the type this accessor
    /// was resolved for.
    pub fn get(&self, host: &dyn Bindable) -> Result<Value, BindError> {
        (self.get)(host)
    }

    /// Write the member on `host`.
    ///
    /// # Errors
    ///
    /// [`BindError::ReadOnly`] when the member has no setter, plus whatever
    /// the setter reports for an unconvertible value.
    pub fn set(&self, host: &dyn Bindable, value: Value) -> Result<(), BindError> {
        match &self.set {
            Some(set) => set(host, value),
            None => Err(BindError::ReadOnly {
                member: self.name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for PropertyAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccessor")
            .field("name", &self.name)
            .field("value_type", &self.value_type)
            .field("read_only", &self.is_read_only())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// TypeShape
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Getter {
    value_type: ValueType,
    get: GetFn,
}

#[derive(Clone)]
struct Field {
    value_type: ValueType,
    get: GetFn,
    set: Option<SetFn>,
}

/// The member table of one host type.
pub struct TypeShape {
    type_name: &'static str,
    getters: AHashMap<String, Getter>,
    setters: AHashMap<String, SetFn>,
    fields: AHashMap<String, Field>,
}

impl TypeShape {
    /// Start describing the members of `T`.
    #[must_use]
    pub fn builder<T: Bindable>() -> ShapeBuilder<T> {
        ShapeBuilder {
            shape: Self {
                type_name: std::any::type_name::<T>(),
                getters: AHashMap::new(),
                setters: AHashMap::new(),
                fields: AHashMap::new(),
            },
            _host: PhantomData,
        }
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Resolve `member` following the accessor-pair-then-field order.
    #[must_use]
    pub fn lookup(&self, member: &str) -> Option<PropertyAccessor> {
        let capitalized = capitalize(member);
        let getter = self
            .getters
            .get(&format!("get{capitalized}"))
            .or_else(|| self.getters.get(&format!("is{capitalized}")));
        if let Some(getter) = getter {
            return Some(PropertyAccessor {
                name: Arc::from(member),
                value_type: getter.value_type,
                get: Arc::clone(&getter.get),
                set: self.setters.get(&format!("set{capitalized}")).cloned(),
            });
        }
        self.fields.get(member).map(|field| PropertyAccessor {
            name: Arc::from(member),
            value_type: field.value_type,
            get: Arc::clone(&field.get),
            set: field.set.clone(),
        })
    }
}

impl fmt::Debug for TypeShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeShape")
            .field("type_name", &self.type_name)
            .field("getters", &self.getters.len())
            .field("setters", &self.setters.len())
            .field("fields", &self.fields.len())
            .finish()
    }
}

fn capitalize(member: &str) -> String {
    let mut chars = member.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Typed builder for a [`TypeShape`].
///
/// Closures receive the concrete host type; the builder erases them into
/// accessors that downcast the `&dyn Bindable` they are handed.
pub struct ShapeBuilder<T> {
    shape: TypeShape,
    _host: PhantomData<fn(&T)>,
}

impl<T: Bindable> ShapeBuilder<T> {
    /// Register a read method, conventionally named `getX` or `isX`.
    #[must_use]
    pub fn getter(
        mut self,
        name: &str,
        value_type: ValueType,
        get: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.shape.getters.insert(
            name.to_owned(),
            Getter {
                value_type,
                get: erase_get(get),
            },
        );
        self
    }

    /// Register a write method, conventionally named `setX`.
    #[must_use]
    pub fn setter(
        mut self,
        name: &str,
        set: impl Fn(&T, Value) -> Result<(), BindError> + Send + Sync + 'static,
    ) -> Self {
        self.shape.setters.insert(name.to_owned(), erase_set(set));
        self
    }

    /// Register a read-only field.
    #[must_use]
    pub fn field(
        mut self,
        name: &str,
        value_type: ValueType,
        get: impl Fn(&T) -> Value + Send + Sync + 'static,
    ) -> Self {
        self.shape.fields.insert(
            name.to_owned(),
            Field {
                value_type,
                get: erase_get(get),
                set: None,
            },
        );
        self
    }

    /// Register a writable field.
    #[must_use]
    pub fn field_mut(
        mut self,
        name: &str,
        value_type: ValueType,
        get: impl Fn(&T) -> Value + Send + Sync + 'static,
        set: impl Fn(&T, Value) -> Result<(), BindError> + Send + Sync + 'static,
    ) -> Self {
        self.shape.fields.insert(
            name.to_owned(),
            Field {
                value_type,
                get: erase_get(get),
                set: Some(erase_set(set)),
            },
        );
        self
    }

    #[must_use]
    pub fn build(self) -> TypeShape {
        self.shape
    }
}

fn downcast_host<T: Bindable>(host: &dyn Bindable) -> Result<&T, BindError> {
    host.as_any()
        .downcast_ref::<T>()
        .ok_or(BindError::HostMismatch {
            expected: std::any::type_name::<T>(),
        })
}

fn erase_get<T: Bindable>(get: impl Fn(&T) -> Value + Send + Sync + 'static) -> GetFn {
    Arc::new(move |host: &dyn Bindable| downcast_host::<T>(host).map(&get))
}

fn erase_set<T: Bindable>(
    set: impl Fn(&T, Value) -> Result<(), BindError> + Send + Sync + 'static,
) -> SetFn {
    Arc::new(move |host: &dyn Bindable, value: Value| set(downcast_host::<T>(host)?, value))
}

// ---------------------------------------------------------------------------
// PropertyAccessorStore
// ---------------------------------------------------------------------------

/// Per-type cache of resolved accessors.
///
/// # Example
///
/// ```
/// use std::sync::Mutex;
/// use pathbind_core::{Bindable, PropertyAccessorStore, TypeShape, Value, ValueType};
///
/// struct Label {
///     text: Mutex<String>,
/// }
///
/// impl Bindable for Label {
///     fn shape(&self) -> TypeShape {
///         TypeShape::builder::<Self>()
///             .field("text", ValueType::Str, |l| Value::from(l.text.lock().unwrap().clone()))
///             .build()
///     }
/// }
///
/// let store = PropertyAccessorStore::new();
/// let label = Label { text: Mutex::new("hi".into()) };
/// let accessor = store.resolve(&label, "text").unwrap();
/// assert_eq!(accessor.get(&label).unwrap(), Value::from("hi"));
/// assert!(accessor.is_read_only());
/// ```
#[derive(Default)]
pub struct PropertyAccessorStore {
    shapes: Mutex<AHashMap<TypeId, Arc<TypeShape>>>,
    accessors: Mutex<AHashMap<TypeId, AHashMap<String, PropertyAccessor>>>,
}

impl PropertyAccessorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `member` on the runtime type of `host`.
    ///
    /// # Errors
    ///
    /// [`BindError::PropertyNotFound`] when neither an accessor pair nor a
    /// field of that name exists.
    pub fn resolve(&self, host: &dyn Bindable, member: &str) -> Result<PropertyAccessor, BindError> {
        if let Some(accessor) = host.resolve_member(member) {
            return Ok(accessor);
        }

        let type_id = Any::type_id(host.as_any());
        if let Some(accessor) = lock(&self.accessors)
            .get(&type_id)
            .and_then(|members| members.get(member))
        {
            return Ok(accessor.clone());
        }

        #[cfg(feature = "tracing")]
        tracing::trace!(
            target: "pathbind::accessor",
            type_name = host.type_name(),
            member,
            "accessor cache miss"
        );

        let shape = self.shape_of(host, type_id);
        let accessor = shape
            .lookup(member)
            .ok_or_else(|| BindError::PropertyNotFound {
                type_name: host.type_name(),
                member: member.to_owned(),
            })?;
        lock(&self.accessors)
            .entry(type_id)
            .or_default()
            .insert(member.to_owned(), accessor.clone());
        Ok(accessor)
    }

    fn shape_of(&self, host: &dyn Bindable, type_id: TypeId) -> Arc<TypeShape> {
        if let Some(shape) = lock(&self.shapes).get(&type_id) {
            return Arc::clone(shape);
        }
        // Built outside the lock: `shape()` is host code.
        let shape = Arc::new(host.shape());
        Arc::clone(lock(&self.shapes).entry(type_id).or_insert(shape))
    }

    /// Drop the cached accessor for one member. Returns whether one existed.
    pub fn invalidate(&self, type_id: TypeId, member: &str) -> bool {
        lock(&self.accessors)
            .get_mut(&type_id)
            .is_some_and(|members| members.remove(member).is_some())
    }

    /// Drop every cached accessor and the shape of one type.
    pub fn invalidate_type(&self, type_id: TypeId) {
        lock(&self.accessors).remove(&type_id);
        lock(&self.shapes).remove(&type_id);
    }

    /// Drop everything cached for the runtime type of `host`.
    pub fn invalidate_host(&self, host: &dyn Bindable) {
        self.invalidate_type(Any::type_id(host.as_any()));
    }

    pub fn clear(&self) {
        lock(&self.accessors).clear();
        lock(&self.shapes).clear();
    }

    /// Number of cached (type, member) accessors.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        lock(&self.accessors).values().map(|members| members.len()).sum()
    }
}

impl fmt::Debug for PropertyAccessorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyAccessorStore")
            .field("shapes", &lock(&self.shapes).len())
            .field("accessors", &self.cached_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FromValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Person {
        name: Mutex<String>,
        active: Mutex<bool>,
        age: i64,
    }

    impl Person {
        fn new() -> Self {
            Self {
                name: Mutex::new("Ada".into()),
                active: Mutex::new(true),
                age: 36,
            }
        }
    }

    impl Bindable for Person {
        fn shape(&self) -> TypeShape {
            TypeShape::builder::<Self>()
                .getter("getName", ValueType::Str, |p| {
                    Value::from(p.name.lock().unwrap().clone())
                })
                .setter("setName", |p, v| {
                    *p.name.lock().unwrap() = String::from_value(v)?;
                    Ok(())
                })
                .getter("isActive", ValueType::Bool, |p| {
                    Value::Bool(*p.active.lock().unwrap())
                })
                // Shadowed by the getter pair above.
                .field("Name", ValueType::Str, |_| Value::from("field"))
                .field("age", ValueType::Int, |p| Value::Int(p.age))
                .build()
        }
    }

    static COUNTED_SHAPES: AtomicUsize = AtomicUsize::new(0);

    struct Counted(i64);

    impl Bindable for Counted {
        fn shape(&self) -> TypeShape {
            COUNTED_SHAPES.fetch_add(1, Ordering::SeqCst);
            TypeShape::builder::<Self>()
                .field("value", ValueType::Int, |c| Value::Int(c.0))
                .field("double", ValueType::Int, |c| Value::Int(c.0 * 2))
                .build()
        }
    }

    struct Other;

    impl Bindable for Other {
        fn shape(&self) -> TypeShape {
            TypeShape::builder::<Self>().build()
        }
    }

    struct Dynamic;

    impl Bindable for Dynamic {
        fn shape(&self) -> TypeShape {
            TypeShape::builder::<Self>().build()
        }

        fn resolve_member(&self, member: &str) -> Option<PropertyAccessor> {
            let echoed = Value::from(member);
            Some(PropertyAccessor::new(member, ValueType::Str, move |_| {
                Ok(echoed.clone())
            }))
        }
    }

    #[test]
    fn getter_pair_takes_precedence_over_field() {
        let store = PropertyAccessorStore::new();
        let person = Person::new();
        let accessor = store.resolve(&person, "Name").unwrap();
        assert_eq!(accessor.get(&person).unwrap(), Value::from("Ada"));
        assert!(!accessor.is_read_only());
        assert_eq!(accessor.value_type(), ValueType::Str);
    }

    #[test]
    fn lowercase_member_is_capitalized_for_methods() {
        let store = PropertyAccessorStore::new();
        let person = Person::new();
        let accessor = store.resolve(&person, "name").unwrap();
        accessor.set(&person, Value::from("Grace")).unwrap();
        assert_eq!(*person.name.lock().unwrap(), "Grace");
    }

    #[test]
    fn is_prefix_resolves_without_setter() {
        let store = PropertyAccessorStore::new();
        let person = Person::new();
        let accessor = store.resolve(&person, "Active").unwrap();
        assert_eq!(accessor.get(&person).unwrap(), Value::Bool(true));
        assert_eq!(
            accessor.set(&person, Value::Bool(false)),
            Err(BindError::ReadOnly {
                member: "Active".into()
            })
        );
    }

    #[test]
    fn field_fallback() {
        let store = PropertyAccessorStore::new();
        let person = Person::new();
        let accessor = store.resolve(&person, "age").unwrap();
        assert_eq!(accessor.get(&person).unwrap(), Value::Int(36));
        assert!(accessor.is_read_only());
    }

    #[test]
    fn missing_member_is_property_not_found() {
        let store = PropertyAccessorStore::new();
        let err = store.resolve(&Person::new(), "Height").unwrap_err();
        assert!(matches!(
            err,
            BindError::PropertyNotFound { ref member, .. } if member == "Height"
        ));
    }

    #[test]
    fn setter_reports_type_mismatch() {
        let store = PropertyAccessorStore::new();
        let person = Person::new();
        let accessor = store.resolve(&person, "Name").unwrap();
        assert!(matches!(
            accessor.set(&person, Value::Int(1)),
            Err(BindError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn accessors_are_cached_per_type() {
        let store = PropertyAccessorStore::new();
        store.resolve(&Counted(1), "value").unwrap();
        store.resolve(&Counted(2), "value").unwrap();
        let double = store.resolve(&Counted(3), "double").unwrap();
        assert_eq!(double.get(&Counted(4)).unwrap(), Value::Int(8));
        assert_eq!(COUNTED_SHAPES.load(Ordering::SeqCst), 1);
        assert_eq!(store.cached_len(), 2);
    }

    #[test]
    fn invalidate_drops_entries() {
        let store = PropertyAccessorStore::new();
        let person = Person::new();
        store.resolve(&person, "Name").unwrap();
        store.resolve(&person, "age").unwrap();
        assert!(store.invalidate(TypeId::of::<Person>(), "Name"));
        assert!(!store.invalidate(TypeId::of::<Person>(), "Name"));
        assert_eq!(store.cached_len(), 1);
        store.invalidate_host(&person);
        assert_eq!(store.cached_len(), 0);
    }

    #[test]
    fn custom_resolver_bypasses_cache() {
        let store = PropertyAccessorStore::new();
        let accessor = store.resolve(&Dynamic, "anything").unwrap();
        assert_eq!(accessor.get(&Dynamic).unwrap(), Value::from("anything"));
        assert_eq!(store.cached_len(), 0);
    }

    #[test]
    fn accessor_rejects_foreign_host() {
        let store = PropertyAccessorStore::new();
        let accessor = store.resolve(&Person::new(), "age").unwrap();
        assert!(matches!(
            accessor.get(&Other),
            Err(BindError::HostMismatch { .. })
        ));
    }

    #[test]
    fn capitalize_handles_edges() {
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("x"), "X");
        assert_eq!(capitalize("Obj"), "Obj");
    }
}
