#![forbid(unsafe_code)]

//! Commands: gated actions a view fires through a path.
//!
//! A [`Command`] pairs an optional callback with an executability gate. The
//! gate is observable as the `CanExecute` member, so a button can bind its
//! enabled state to `Save.CanExecute` while firing `Save` on click.

use core::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::accessor::TypeShape;
use crate::lock;
use crate::subject::ObservableSubject;
use crate::value::{Bindable, FromValue, Value, ValueType};

/// Argument block passed to a command callback.
///
/// `handled` starts out `true`; a callback that declines the event clears it
/// so the caller can fall back to default handling.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandArgs {
    payload: Value,
    handled: bool,
}

impl Default for CommandArgs {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

impl CommandArgs {
    #[must_use]
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            handled: true,
        }
    }

    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.handled
    }

    pub fn set_handled(&mut self, handled: bool) {
        self.handled = handled;
    }
}

type Callback = Arc<dyn Fn(&mut CommandArgs) + Send + Sync>;

struct CommandInner {
    can_execute: AtomicBool,
    callback: Mutex<Option<Callback>>,
    subject: ObservableSubject,
}

/// A gated, observable action.
///
/// Cloning yields another handle to the same command.
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use pathbind_core::{Command, CommandArgs};
///
/// let clicks = Arc::new(AtomicUsize::new(0));
/// let c = Arc::clone(&clicks);
/// let save = Command::with_callback(move |_| {
///     c.fetch_add(1, Ordering::SeqCst);
/// });
///
/// let mut args = CommandArgs::default();
/// assert!(save.execute(&mut args));
///
/// save.set_can_execute(false);
/// let mut args = CommandArgs::default();
/// assert!(!save.execute(&mut args));
/// assert!(!args.is_handled());
/// assert_eq!(clicks.load(Ordering::SeqCst), 1);
/// ```
#[derive(Clone)]
pub struct Command {
    inner: Arc<CommandInner>,
}

impl Default for Command {
    fn default() -> Self {
        Self::new()
    }
}

impl Command {
    /// An executable command with no callback.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CommandInner {
                can_execute: AtomicBool::new(true),
                callback: Mutex::new(None),
                subject: ObservableSubject::new(),
            }),
        }
    }

    #[must_use]
    pub fn with_callback(callback: impl Fn(&mut CommandArgs) + Send + Sync + 'static) -> Self {
        let command = Self::new();
        command.set_callback(callback);
        command
    }

    pub fn set_callback(&self, callback: impl Fn(&mut CommandArgs) + Send + Sync + 'static) {
        *lock(&self.inner.callback) = Some(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        *lock(&self.inner.callback) = None;
    }

    #[must_use]
    pub fn has_callback(&self) -> bool {
        lock(&self.inner.callback).is_some()
    }

    #[must_use]
    pub fn can_execute(&self) -> bool {
        self.inner.can_execute.load(Ordering::Acquire)
    }

    /// Open or close the gate. Fires `CanExecute` only when it changes.
    pub fn set_can_execute(&self, can_execute: bool) {
        let previous = self.inner.can_execute.swap(can_execute, Ordering::AcqRel);
        if previous != can_execute {
            self.inner.subject.notify("CanExecute");
        }
    }

    /// Run the callback with `args`.
    ///
    /// Returns whether a callback ran. A closed gate refuses the call and
    /// marks `args` as not handled.
    pub fn execute(&self, args: &mut CommandArgs) -> bool {
        if !self.can_execute() {
            #[cfg(feature = "tracing")]
            tracing::debug!(target: "pathbind::command", "command gate closed");
            args.set_handled(false);
            return false;
        }
        let callback = lock(&self.inner.callback).clone();
        match callback {
            Some(callback) => {
                callback(args);
                true
            }
            None => false,
        }
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

impl Bindable for Command {
    fn shape(&self) -> TypeShape {
        TypeShape::builder::<Self>()
            .getter("isCanExecute", ValueType::Bool, |c| Value::Bool(c.can_execute()))
            .setter("setCanExecute", |c, value| {
                c.set_can_execute(bool::from_value(value)?);
                Ok(())
            })
            .build()
    }

    fn subject(&self) -> Option<&ObservableSubject> {
        Some(&self.inner.subject)
    }

    fn type_name(&self) -> &'static str {
        "Command"
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("can_execute", &self.can_execute())
            .field("has_callback", &self.has_callback())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::PropertyAccessorStore;

    #[test]
    fn execute_without_callback_reports_false() {
        let command = Command::new();
        let mut args = CommandArgs::default();
        assert!(!command.execute(&mut args));
        assert!(args.is_handled());
    }

    #[test]
    fn callback_may_decline() {
        let command = Command::with_callback(|args| args.set_handled(false));
        let mut args = CommandArgs::new(Value::Int(7));
        assert!(command.execute(&mut args));
        assert!(!args.is_handled());
        assert_eq!(args.payload(), &Value::Int(7));
    }

    #[test]
    fn gate_change_fires_once() {
        let command = Command::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = command
            .subject()
            .subscribe("", move |c| sink.lock().unwrap().push(c.path()));
        command.set_can_execute(true);
        command.set_can_execute(false);
        command.set_can_execute(false);
        assert_eq!(*seen.lock().unwrap(), vec![Some("CanExecute".to_string())]);
    }

    #[test]
    fn can_execute_is_a_writable_member() {
        let command = Command::new();
        let store = PropertyAccessorStore::new();
        let accessor = store.resolve(&command, "CanExecute").unwrap();
        assert_eq!(accessor.get(&command).unwrap(), Value::Bool(true));
        accessor.set(&command, Value::Bool(false)).unwrap();
        assert!(!command.can_execute());
        assert!(accessor.set(&command, Value::Int(1)).is_err());
    }

    #[test]
    fn clear_callback() {
        let command = Command::with_callback(|_| {});
        assert!(command.has_callback());
        command.clear_callback();
        assert!(!command.has_callback());
    }
}
