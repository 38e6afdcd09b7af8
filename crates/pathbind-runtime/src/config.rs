#![forbid(unsafe_code)]

//! Inventory behaviour switches.

/// Options for a [`BindingInventory`](crate::BindingInventory).
///
/// Child inventories created with
/// [`BindingInventory::child_of`](crate::BindingInventory::child_of) inherit
/// their parent's options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryConfig {
    /// Push every tracked path to its elements as soon as a context object is
    /// assigned.
    ///
    /// When `false`, elements first hear about a value when the model fires a
    /// change or [`refresh_all`](crate::BindingInventory::refresh_all) runs.
    pub eager_sync: bool,

    /// Skip the originating element when a write made through
    /// [`send_update_from`](crate::BindingInventory::send_update_from)
    /// comes back as a change notification.
    pub suppress_echo: bool,
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            eager_sync: false,
            suppress_echo: true,
        }
    }
}

impl InventoryConfig {
    #[must_use]
    pub fn with_eager_sync(mut self, eager_sync: bool) -> Self {
        self.eager_sync = eager_sync;
        self
    }

    #[must_use]
    pub fn with_suppress_echo(mut self, suppress_echo: bool) -> Self {
        self.suppress_echo = suppress_echo;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = InventoryConfig::default();
        assert!(!config.eager_sync);
        assert!(config.suppress_echo);
    }

    #[test]
    fn builders_chain() {
        let config = InventoryConfig::default()
            .with_eager_sync(true)
            .with_suppress_echo(false);
        assert_eq!(
            config,
            InventoryConfig {
                eager_sync: true,
                suppress_echo: false,
            }
        );
    }
}
