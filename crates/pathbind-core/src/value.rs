#![forbid(unsafe_code)]

//! The dynamic value model that crosses the UI/model boundary.
//!
//! Paths address members of [`Bindable`] hosts; every member read or write
//! moves a [`Value`]. Primitive variants compare by value, reference
//! variants (`Object`, `List`, `Map`, `Command`, `Proxy`) compare by
//! identity, so "did this member change?" never walks an object graph.
//!
//! # Invariants
//!
//! 1. Cloning a `Value` never deep-copies: reference variants share the
//!    underlying object.
//! 2. `Value::Null` is the only representation of a missing link.
//! 3. [`Value::unwrap_proxy`] removes exactly one layer of indirection.

use core::fmt;
use std::any::Any;
use std::sync::Arc;

use crate::accessor::{PropertyAccessor, TypeShape};
use crate::collections::{ObservableList, ObservableMap};
use crate::command::Command;
use crate::error::BindError;
use crate::subject::ObservableSubject;

// ---------------------------------------------------------------------------
// Host capabilities
// ---------------------------------------------------------------------------

/// Upcast helper so trait objects can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A model or view-model type whose members are reachable through paths.
///
/// Implementors describe their members once via [`shape`](Self::shape); the
/// [`PropertyAccessorStore`](crate::PropertyAccessorStore) caches the result
/// per concrete type. Types that fire change notifications expose their
/// [`ObservableSubject`] so inventories and parent objects can subscribe.
///
/// # Example
///
/// ```
/// use std::sync::Mutex;
/// use pathbind_core::{Bindable, ObservableSubject, TypeShape, Value, ValueType};
///
/// struct Counter {
///     subject: ObservableSubject,
///     count: Mutex<i64>,
/// }
///
/// impl Bindable for Counter {
///     fn shape(&self) -> TypeShape {
///         TypeShape::builder::<Self>()
///             .getter("getCount", ValueType::Int, |c| Value::Int(*c.count.lock().unwrap()))
///             .build()
///     }
///
///     fn subject(&self) -> Option<&ObservableSubject> {
///         Some(&self.subject)
///     }
/// }
/// ```
pub trait Bindable: AsAny + Send + Sync {
    /// Describe the members of this type.
    ///
    /// Called at most once per concrete type by each accessor store, so the
    /// result must not depend on instance state.
    fn shape(&self) -> TypeShape;

    /// The change-notification subject of this instance, if it has one.
    ///
    /// Hosts without a subject are treated as immutable for binding purposes.
    fn subject(&self) -> Option<&ObservableSubject> {
        None
    }

    /// Resolve a member dynamically, bypassing the shape and the cache.
    ///
    /// Used by hosts whose member set changes at runtime (keyed containers,
    /// row-like data).
    fn resolve_member(&self, _member: &str) -> Option<PropertyAccessor> {
        None
    }

    /// Human-readable type name used in error messages.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// An indirection layer: a member that returns a wrapper around the value
/// the path author actually means.
///
/// Dereferencing unwraps one proxy layer; writes through a path whose
/// terminal member holds a proxy go into the proxy.
pub trait ValueProxy: Send + Sync {
    /// Current wrapped value.
    fn get(&self) -> Value;

    /// Replace the wrapped value.
    ///
    /// # Errors
    ///
    /// [`BindError::ReadOnly`] when the proxy does not accept writes, or a
    /// conversion error when `value` has the wrong type.
    fn set(&self, _value: Value) -> Result<(), BindError> {
        Err(BindError::ReadOnly {
            member: "<proxy>".into(),
        })
    }

    /// Subject that fires when the wrapped value changes.
    fn subject(&self) -> Option<&ObservableSubject> {
        None
    }
}

// ---------------------------------------------------------------------------
// ValueType
// ---------------------------------------------------------------------------

/// Declared or runtime type of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Unknown or unconstrained.
    Any,
    Null,
    Bool,
    Int,
    Float,
    Str,
    Object,
    List,
    Map,
    Command,
    Proxy,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Object => "object",
            Self::List => "list",
            Self::Map => "map",
            Self::Command => "command",
            Self::Proxy => "proxy",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically typed value read from or written to a member.
///
/// Equality is what decides whether a write changes anything. Primitives
/// compare by value, with every NaN equal to every other NaN so that
/// rewriting NaN is not a change. Objects, collections, commands and proxies
/// compare by identity.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Object(Arc<dyn Bindable>),
    List(ObservableList),
    Map(ObservableMap),
    Command(Command),
    Proxy(Arc<dyn ValueProxy>),
}

impl Value {
    /// Wrap a shared model object.
    #[must_use]
    pub fn object<T: Bindable>(object: Arc<T>) -> Self {
        Self::Object(object)
    }

    /// Wrap a proxy.
    #[must_use]
    pub fn proxy<P: ValueProxy + 'static>(proxy: Arc<P>) -> Self {
        Self::Proxy(proxy)
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Runtime type of this value.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Null => ValueType::Null,
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Str(_) => ValueType::Str,
            Self::Object(_) => ValueType::Object,
            Self::List(_) => ValueType::List,
            Self::Map(_) => ValueType::Map,
            Self::Command(_) => ValueType::Command,
            Self::Proxy(_) => ValueType::Proxy,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(&**s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&ObservableList> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&ObservableMap> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_command(&self) -> Option<&Command> {
        match self {
            Self::Command(command) => Some(command),
            _ => None,
        }
    }

    /// Borrow the wrapped object as its concrete type.
    #[must_use]
    pub fn downcast_ref<T: Bindable>(&self) -> Option<&T> {
        match self {
            Self::Object(object) => (**object).as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// This value as a member host, if it has members.
    #[must_use]
    pub fn as_host(&self) -> Option<&dyn Bindable> {
        match self {
            Self::Object(object) => Some(object.as_ref()),
            Self::List(list) => Some(list as &dyn Bindable),
            Self::Map(map) => Some(map as &dyn Bindable),
            Self::Command(command) => Some(command as &dyn Bindable),
            _ => None,
        }
    }

    /// The change-notification subject behind this value, if any.
    #[must_use]
    pub fn subject(&self) -> Option<&ObservableSubject> {
        match self {
            Self::Object(object) => object.subject(),
            Self::List(list) => Some(list.subject()),
            Self::Map(map) => Some(map.subject()),
            Self::Command(command) => Some(command.subject()),
            Self::Proxy(proxy) => proxy.subject(),
            _ => None,
        }
    }

    /// Remove one layer of proxy indirection.
    #[must_use]
    pub fn unwrap_proxy(self) -> Value {
        match self {
            Self::Proxy(proxy) => proxy.get(),
            other => other,
        }
    }

    /// Type name for diagnostics: the concrete host type for objects.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Object(object) => object.type_name(),
            Self::List(_) => "ObservableList",
            Self::Map(_) => "ObservableMap",
            Self::Command(_) => "Command",
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "i64",
            Self::Float(_) => "f64",
            Self::Str(_) => "str",
            Self::Proxy(_) => "proxy",
        }
    }
}

fn same_object<T: ?Sized, U: ?Sized>(a: &Arc<T>, b: &Arc<U>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => same_object(a, b),
            (Self::List(a), Self::List(b)) => a.ptr_eq(b),
            (Self::Map(a), Self::Map(b)) => a.ptr_eq(b),
            (Self::Command(a), Self::Command(b)) => a.ptr_eq(b),
            (Self::Proxy(a), Self::Proxy(b)) => same_object(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Self::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Self::Float(x) => f.debug_tuple("Float").field(x).finish(),
            Self::Str(s) => f.debug_tuple("Str").field(s).finish(),
            Self::Object(object) => f.debug_tuple("Object").field(&object.type_name()).finish(),
            Self::List(list) => f.debug_struct("List").field("len", &list.len()).finish(),
            Self::Map(map) => f.debug_struct("Map").field("len", &map.len()).finish(),
            Self::Command(command) => f
                .debug_struct("Command")
                .field("can_execute", &command.can_execute())
                .finish(),
            Self::Proxy(_) => f.write_str("Proxy(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(Arc::from(value))
    }
}

impl From<ObservableList> for Value {
    fn from(value: ObservableList) -> Self {
        Self::List(value)
    }
}

impl From<ObservableMap> for Value {
    fn from(value: ObservableMap) -> Self {
        Self::Map(value)
    }
}

impl From<Command> for Value {
    fn from(value: Command) -> Self {
        Self::Command(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// FromValue
// ---------------------------------------------------------------------------

/// Fallible conversion out of a [`Value`], used by setters.
pub trait FromValue: Sized {
    /// Convert `value`.
    ///
    /// # Errors
    ///
    /// [`BindError::TypeMismatch`] when the variant does not fit.
    fn from_value(value: Value) -> Result<Self, BindError>;
}

fn mismatch(expected: ValueType, value: &Value) -> BindError {
    BindError::TypeMismatch {
        expected,
        found: value.value_type(),
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, BindError> {
        Ok(value)
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, BindError> {
        value.as_bool().ok_or_else(|| mismatch(ValueType::Bool, &value))
    }
}

impl FromValue for i64 {
    fn from_value(value: Value) -> Result<Self, BindError> {
        value.as_int().ok_or_else(|| mismatch(ValueType::Int, &value))
    }
}

impl FromValue for i32 {
    fn from_value(value: Value) -> Result<Self, BindError> {
        value
            .as_int()
            .and_then(|i| i32::try_from(i).ok())
            .ok_or_else(|| mismatch(ValueType::Int, &value))
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, BindError> {
        value.as_float().ok_or_else(|| mismatch(ValueType::Float, &value))
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => Err(mismatch(ValueType::Str, &other)),
        }
    }
}

impl FromValue for ObservableList {
    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::List(list) => Ok(list),
            other => Err(mismatch(ValueType::List, &other)),
        }
    }
}

impl FromValue for ObservableMap {
    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::Map(map) => Ok(map),
            other => Err(mismatch(ValueType::Map, &other)),
        }
    }
}

impl FromValue for Command {
    fn from_value(value: Value) -> Result<Self, BindError> {
        match value {
            Value::Command(command) => Ok(command),
            other => Err(mismatch(ValueType::Command, &other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, BindError> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}
