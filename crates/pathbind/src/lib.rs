#![forbid(unsafe_code)]

//! pathbind public facade and prelude.
//!
//! Keeps a tree of UI elements in sync with a graph of model objects through
//! dotted member paths such as `Order.Customer.Name` or `Items@[2].Label`.
//!
//! - Model types implement [`Bindable`] and own an [`ObservableSubject`].
//! - Views hand [`BoundElement`]s to a [`BindingInventory`] whose context
//!   object is the model.
//! - Model changes bubble up through parent subjects as dotted paths; the
//!   inventory refreshes the elements bound at or below each changed path.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use pathbind::prelude::*;
//!
//! let customer = ObservableMap::new();
//! customer.insert("Name", Value::from("Ada"));
//! let order = ObservableMap::new();
//! order.insert("Customer", Value::Map(customer.clone()));
//!
//! let inventory = BindingInventory::new();
//! inventory.set_context_object(Value::Map(order));
//!
//! let shown = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&shown);
//! inventory
//!     .track_element(CallbackElement::new("Customer.Name", move |v| {
//!         sink.lock().unwrap().push(v.clone());
//!     }))
//!     .unwrap();
//!
//! customer.insert("Name", Value::from("Grace"));
//! assert_eq!(*shown.lock().unwrap(), vec![Value::from("Grace")]);
//! ```

pub use pathbind_core::{
    AsAny, BindError, Bindable, CellValue, Change, ChangeListener, Command, CommandArgs, FromValue,
    ListChange, MapChange, ObservableCell, ObservableList, ObservableMap, ObservableSubject,
    PropertyAccessor, PropertyAccessorStore, ShapeBuilder, SubjectId, Subscription, TypeShape,
    Value, ValueProxy, ValueType, compose_path,
};

#[cfg(feature = "runtime")]
pub use pathbind_runtime::{
    Anchor, BindingInventory, BindingPath, BoundElement, CallbackElement, IndexSelector,
    InventoryConfig, PathBinding, Segment, TwoWayElement,
};

/// Common imports for model and view code.
pub mod prelude {
    pub use crate::{
        BindError, Bindable, Command, CommandArgs, FromValue, ObservableCell, ObservableList,
        ObservableMap, ObservableSubject, Subscription, TypeShape, Value, ValueType,
    };

    #[cfg(feature = "runtime")]
    pub use crate::{
        BindingInventory, BoundElement, CallbackElement, InventoryConfig, TwoWayElement,
    };
}
