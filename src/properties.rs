//! System property lookups used to label captures.

use std::collections::HashMap;

/// Property naming the device maker.
pub const MAKER_KEY: &str = "ro.product.brand";
/// Property naming the device model.
pub const MODEL_KEY: &str = "ro.product.model";
/// Property naming the firmware build.
pub const SOFTWARE_KEY: &str = "ro.build.id";

/// Maker written when the store has none.
pub const DEFAULT_MAKER: &str = "SAMSUNG";
/// Model written when the store has none.
pub const DEFAULT_MODEL: &str = "SAMSUNG";
/// Software written when the store has none.
pub const DEFAULT_SOFTWARE: &str = "SAMSUNG";

/// Read-only key/value store of platform properties.
pub trait PropertyStore {
    /// Value of `key`, if set.
    fn get(&self, key: &str) -> Option<String>;

    /// Value of `key`, or `default` when it is unset or empty.
    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key)
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| default.to_owned())
    }
}

/// In-memory property store.
#[derive(Debug, Clone, Default)]
pub struct StaticProperties {
    values: HashMap<String, String>,
}

impl StaticProperties {
    /// An empty store; every lookup falls back to its default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`.
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_owned(), value.to_owned());
        self
    }
}

impl PropertyStore for StaticProperties {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}
