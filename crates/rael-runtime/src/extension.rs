//! Named factory registries for pluggable implementations of a type.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

/// Factory producing a fresh instance of `T`.
pub type ExtensionFactory<T> = Arc<dyn Fn() -> Box<T> + Send + Sync>;

/// Registry of named factories for implementations of `T` (usually a `dyn Trait`).
///
/// The factory runs after the registry lock is released.
pub struct ExtensionPoint<T: ?Sized> {
    factories: RwLock<BTreeMap<String, ExtensionFactory<T>>>,
}

impl<T: ?Sized> ExtensionPoint<T> {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(BTreeMap::new()),
        }
    }

    /// Register `factory` under `name`, replacing any previous factory.
    pub fn register_extension<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<T> + Send + Sync + 'static,
    {
        let replaced = self
            .factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::new(factory))
            .is_some();
        debug!(extension = name, replaced, "Extension registered");
    }

    pub fn unregister_extension(&self, name: &str) -> bool {
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .is_some()
    }

    /// Instantiate the extension registered under `name`.
    pub fn create(&self, name: &str) -> Option<Box<T>> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()?;
        Some(factory())
    }

    /// Registered names, sorted.
    pub fn list(&self) -> Vec<String> {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }
}

impl<T: ?Sized> Default for ExtensionPoint<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> std::fmt::Debug for ExtensionPoint<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionPoint")
            .field("extensions", &self.list())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Codec: Send {
        fn name(&self) -> &'static str;
    }

    struct Gzip;
    impl Codec for Gzip {
        fn name(&self) -> &'static str {
            "gzip"
        }
    }

    struct Zstd;
    impl Codec for Zstd {
        fn name(&self) -> &'static str {
            "zstd"
        }
    }

    #[test]
    fn test_create_registered_extension() {
        let point: ExtensionPoint<dyn Codec> = ExtensionPoint::new();
        point.register_extension("gzip", || Box::new(Gzip));

        let codec = point.create("gzip").unwrap();
        assert_eq!(codec.name(), "gzip");
        assert!(point.create("brotli").is_none());
    }

    #[test]
    fn test_last_registration_wins() {
        let point: ExtensionPoint<dyn Codec> = ExtensionPoint::new();
        point.register_extension("default", || Box::new(Gzip));
        point.register_extension("default", || Box::new(Zstd));

        assert_eq!(point.create("default").unwrap().name(), "zstd");
        assert_eq!(point.list(), vec!["default".to_string()]);
    }

    #[test]
    fn test_list_and_unregister() {
        let point: ExtensionPoint<dyn Codec> = ExtensionPoint::default();
        point.register_extension("zstd", || Box::new(Zstd));
        point.register_extension("gzip", || Box::new(Gzip));

        assert_eq!(point.list(), vec!["gzip".to_string(), "zstd".to_string()]);
        assert!(point.unregister_extension("gzip"));
        assert!(!point.unregister_extension("gzip"));
        assert!(!point.contains("gzip"));
        assert!(point.contains("zstd"));
    }

    #[test]
    fn test_each_create_is_a_new_instance() {
        let point: ExtensionPoint<Vec<u8>> = ExtensionPoint::new();
        point.register_extension("buf", || Box::new(Vec::with_capacity(4)));

        let mut a = point.create("buf").unwrap();
        a.push(1);
        let b = point.create("buf").unwrap();
        assert!(b.is_empty());
    }
}
