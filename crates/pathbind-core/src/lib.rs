#![forbid(unsafe_code)]

//! Core types for pathbind.
//!
//! This crate provides:
//! - [`Value`] and the [`Bindable`] host trait, the dynamic model that paths
//!   read and write
//! - [`PropertyAccessorStore`] for cached, convention-based member resolution
//! - [`ObservableSubject`] for labelled change notification with bubbling
//! - [`ObservableList`], [`ObservableMap`], [`ObservableCell`] and [`Command`]
//!
//! The path grammar and the binding inventory live in `pathbind-runtime`.

pub mod accessor;
pub mod cell;
pub mod collections;
pub mod command;
pub mod error;
pub mod subject;
pub mod value;

pub use accessor::{PropertyAccessor, PropertyAccessorStore, ShapeBuilder, TypeShape};
pub use cell::{CellValue, ObservableCell};
pub use collections::{ListChange, MapChange, ObservableList, ObservableMap};
pub use command::{Command, CommandArgs};
pub use error::BindError;
pub use subject::{
    Change, ChangeListener, ObservableSubject, SubjectId, Subscription, compose_path,
};
pub use value::{AsAny, Bindable, FromValue, Value, ValueProxy, ValueType};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a registry mutex, recovering the data if a listener panicked while
/// it was held.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
