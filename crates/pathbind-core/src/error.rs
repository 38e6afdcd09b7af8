//! Error taxonomy shared by the accessor store, the path grammar, and the
//! binding inventory.
//!
//! Structural errors (a member that does not exist on a type, a malformed
//! path) are programmer errors: they are only ever triggered by static
//! binding declarations and are propagated to the caller. Data-shape
//! outcomes are not errors at all: a `Null` link in a path yields
//! [`Value::Null`](crate::Value::Null), and an unhandled command is a flag on
//! [`CommandArgs`](crate::CommandArgs).
//!
//! # Failure Modes
//!
//! | Variant | Cause | Raised by |
//! |---------|-------|-----------|
//! | `PropertyNotFound` | Member missing on the host's shape | Accessor store |
//! | `InvalidPath` | Segment does not match the grammar | Path parser |
//! | `ReadOnly` | Write through a getter-only member | `PropertyAccessor::set` |
//! | `TypeMismatch` | Value cannot convert to the setter's type | `FromValue` |
//! | `HostMismatch` | Accessor applied to a foreign host type | `PropertyAccessor` |
//! | `CyclicInventory` | Parent assignment would close a loop | Inventory |

use core::fmt;

use crate::value::ValueType;

/// Errors from binding operations.
#[derive(Debug, Clone, PartialEq)]
pub enum BindError {
    /// A path segment names a member that the host type does not expose.
    PropertyNotFound {
        type_name: &'static str,
        member: String,
    },
    /// A path does not match the grammar.
    InvalidPath { path: String, reason: String },
    /// A write was attempted through a member with no setter.
    ReadOnly { member: String },
    /// A value could not be converted to the type a setter expects.
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
    },
    /// An accessor was applied to a host of a different concrete type.
    HostMismatch { expected: &'static str },
    /// Assigning the parent inventory would make the ancestor chain cyclic.
    CyclicInventory,
}

impl BindError {
    /// Build an `InvalidPath` error for `path`.
    #[must_use]
    pub fn invalid_path(path: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.to_owned(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PropertyNotFound { type_name, member } => {
                write!(f, "property '{member}' not found on {type_name}")
            }
            Self::InvalidPath { path, reason } => write!(f, "invalid path '{path}': {reason}"),
            Self::ReadOnly { member } => write!(f, "property '{member}' is read-only"),
            Self::TypeMismatch { expected, found } => {
                write!(f, "type mismatch: expected {expected}, found {found}")
            }
            Self::HostMismatch { expected } => {
                write!(f, "accessor applied to a host that is not {expected}")
            }
            Self::CyclicInventory => write!(f, "parent inventory would form a cycle"),
        }
    }
}

impl std::error::Error for BindError {}
