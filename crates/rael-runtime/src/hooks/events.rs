use serde::{Deserialize, Serialize};

/// Payload of the manager's load lifecycle hook.
///
/// `success` is false when a load attempt was rolled back; `plugin_id` is then
/// the library's file stem because the instance never reported an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadEvent {
    pub plugin_id: String,
    pub success: bool,
}

impl LoadEvent {
    pub fn new(plugin_id: impl Into<String>, success: bool) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            success,
        }
    }
}
