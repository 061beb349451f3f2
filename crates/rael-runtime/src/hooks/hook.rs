use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Handler signature: return `false` to cancel the rest of the chain.
pub type HookHandler<A> = Arc<dyn Fn(&A) -> bool + Send + Sync>;

/// Priority classes for hook registrations.
///
/// Higher values run first. `Monitor` is the exception: monitor registrations
/// always run after every other class, only when nothing cancelled the chain,
/// and their return value is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HookPriority {
    Lowest,
    Low,
    #[default]
    Normal,
    High,
    Highest,
    Monitor,
}

impl HookPriority {
    pub fn value(self) -> i32 {
        match self {
            Self::Lowest => 0,
            Self::Low => 25,
            Self::Normal => 50,
            Self::High => 75,
            Self::Highest => 100,
            Self::Monitor => 1000,
        }
    }

    pub fn is_monitor(self) -> bool {
        self == Self::Monitor
    }
}

struct Registration<A: ?Sized> {
    id: String,
    handler: HookHandler<A>,
    priority: HookPriority,
    plugin_id: String,
}

impl<A: ?Sized> Clone for Registration<A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            handler: self.handler.clone(),
            priority: self.priority,
            plugin_id: self.plugin_id.clone(),
        }
    }
}

struct HookState<A: ?Sized> {
    registrations: Vec<Registration<A>>,
    next_id: u64,
}

/// Ordered, prioritized, cancellable multi-handler dispatch point.
///
/// Handlers never run under the hook's lock: `call` snapshots the
/// registration list, releases the lock, then invokes. A handler may therefore
/// add or remove registrations on the same hook; the change applies to the
/// next `call`.
pub struct Hook<A: ?Sized> {
    name: String,
    state: Mutex<HookState<A>>,
}

impl<A: ?Sized> Hook<A> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(HookState {
                registrations: Vec::new(),
                next_id: 1,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a handler. `plugin_id` is empty for host-owned handlers.
    /// Returns the registration id used by [`Hook::remove`].
    pub fn add<F>(&self, handler: F, priority: HookPriority, plugin_id: &str) -> String
    where
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // Distinct across differently named hooks
        let id = format!("{}#{}", self.name, state.next_id);
        state.next_id += 1;

        state.registrations.push(Registration {
            id: id.clone(),
            handler: Arc::new(handler),
            priority,
            plugin_id: plugin_id.to_string(),
        });
        // Stable: equal priorities keep insertion order
        state
            .registrations
            .sort_by_key(|r| (r.priority.is_monitor(), std::cmp::Reverse(r.priority.value())));

        debug!(hook = %self.name, registration = %id, plugin = plugin_id, ?priority, "Hook handler registered");
        id
    }

    /// Remove a single registration. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let before = state.registrations.len();
        state.registrations.retain(|r| r.id != id);
        before != state.registrations.len()
    }

    /// Remove every registration owned by `plugin_id`. Returns how many were removed.
    pub fn remove_by_plugin(&self, plugin_id: &str) -> usize {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let before = state.registrations.len();
        state.registrations.retain(|r| r.plugin_id != plugin_id);
        let removed = before - state.registrations.len();
        if removed > 0 {
            debug!(hook = %self.name, plugin = plugin_id, removed, "Hook handlers removed");
        }
        removed
    }

    /// Registration ids owned by `plugin_id`, in dispatch order.
    pub fn registration_ids(&self, plugin_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state
            .registrations
            .iter()
            .filter(|r| r.plugin_id == plugin_id)
            .map(|r| r.id.clone())
            .collect()
    }

    /// Dispatch `args` to every handler in priority order.
    ///
    /// Returns false as soon as a non-monitor handler returns false or panics;
    /// later handlers do not run. A panic is logged and treated as a cancel.
    pub fn call(&self, args: &A) -> bool {
        let snapshot = {
            let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.registrations.clone()
        };

        for reg in &snapshot {
            let monitor = reg.priority.is_monitor();
            match catch_unwind(AssertUnwindSafe(|| (reg.handler)(args))) {
                Ok(true) => {}
                Ok(false) if monitor => {}
                Ok(false) => {
                    debug!(hook = %self.name, registration = %reg.id, plugin = %reg.plugin_id, "Hook chain cancelled");
                    return false;
                }
                Err(_) => {
                    warn!(
                        hook = %self.name,
                        registration = %reg.id,
                        plugin = %reg.plugin_id,
                        "Hook handler panicked"
                    );
                    if !monitor {
                        return false;
                    }
                }
            }
        }

        true
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .registrations
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owning plugin ids of the current registrations, in dispatch order.
    pub fn owners(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.registrations.iter().map(|r| r.plugin_id.clone()).collect()
    }
}

impl<A: ?Sized> Default for Hook<A> {
    fn default() -> Self {
        Self::new("hook")
    }
}

impl<A: ?Sized> std::fmt::Debug for Hook<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("registrations", &self.len())
            .finish()
    }
}
