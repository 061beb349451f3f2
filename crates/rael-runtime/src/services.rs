//! Named broker for sharing objects between host and plugins.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

/// Owner tag of services registered by the host rather than a plugin instance.
pub(crate) const HOST_OWNER: u64 = 0;

#[derive(Clone)]
struct ServiceEntry {
    type_id: TypeId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
    /// Plugin instance that registered the entry, or `HOST_OWNER`
    owner: u64,
}

/// Copy of registry entries taken before plugin code runs, used to undo
/// what that code registered.
pub(crate) struct ServiceCheckpoint(HashMap<String, ServiceEntry>);

/// Registry of shared services keyed by name.
///
/// Each entry remembers the concrete type it was registered with, so a lookup
/// with the wrong type yields `None` instead of a bad cast. Services live as
/// long as their longest `Arc` holder, not as long as the registration.
#[derive(Default)]
pub struct ServiceRegistry {
    services: DashMap<String, ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `service` under `name`. Last registration wins.
    pub fn register_service<T>(&self, name: &str, service: Arc<T>)
    where
        T: Any + Send + Sync,
    {
        self.register_owned(name, service, HOST_OWNER);
    }

    pub(crate) fn register_owned<T>(&self, name: &str, service: Arc<T>, owner: u64)
    where
        T: Any + Send + Sync,
    {
        let entry = ServiceEntry {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            value: service,
            owner,
        };
        if self.services.insert(name.to_string(), entry).is_some() {
            debug!(service = name, "Service replaced");
        } else {
            debug!(service = name, "Service registered");
        }
    }

    /// Look up `name` as a `T`. Returns `None` when absent or registered with another type.
    pub fn get_service<T>(&self, name: &str) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let entry = self.services.get(name)?;
        if entry.type_id != TypeId::of::<T>() {
            debug!(
                service = name,
                stored = entry.type_name,
                requested = std::any::type_name::<T>(),
                "Service type mismatch"
            );
            return None;
        }
        entry.value.clone().downcast::<T>().ok()
    }

    pub fn unregister_service(&self, name: &str) -> bool {
        self.services.remove(name).is_some()
    }

    /// Remove `name` only while `owner` still holds the registration.
    pub(crate) fn unregister_owned(&self, name: &str, owner: u64) -> bool {
        self.services
            .remove_if(name, |_, entry| entry.owner == owner)
            .is_some()
    }

    /// Drop every entry registered by `owner`. Returns the removed names, sorted.
    pub(crate) fn remove_owned_by(&self, owner: u64) -> Vec<String> {
        let mut removed: Vec<String> = self
            .owned_names(owner)
            .into_iter()
            .filter(|name| self.unregister_owned(name, owner))
            .collect();
        removed.sort();
        removed
    }

    pub(crate) fn checkpoint(&self) -> ServiceCheckpoint {
        ServiceCheckpoint(
            self.services
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        )
    }

    /// Entries currently registered by `owner`.
    pub(crate) fn checkpoint_owned(&self, owner: u64) -> ServiceCheckpoint {
        ServiceCheckpoint(
            self.services
                .iter()
                .filter(|e| e.value().owner == owner)
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect(),
        )
    }

    /// Undo `owner`'s registrations: its entries are removed and any entry
    /// they replaced since `before` is put back. Returns how many names changed.
    pub(crate) fn roll_back(&self, owner: u64, before: &ServiceCheckpoint) -> usize {
        let names = self.owned_names(owner);
        for name in &names {
            if self.unregister_owned(name, owner) {
                if let Some(previous) = before.0.get(name) {
                    self.services.entry(name.clone()).or_insert_with(|| previous.clone());
                }
            }
        }
        if !names.is_empty() {
            debug!(owner, services = ?names, "Service registrations rolled back");
        }
        names.len()
    }

    /// Put back entries from `saved` whose names are no longer registered.
    pub(crate) fn restore_missing(&self, saved: ServiceCheckpoint) {
        for (name, entry) in saved.0 {
            self.services.entry(name).or_insert(entry);
        }
    }

    fn owned_names(&self, owner: u64) -> Vec<String> {
        self.services
            .iter()
            .filter(|e| e.value().owner == owner)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Registered names, sorted.
    pub fn list_services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.list_services())
            .finish()
    }
}
