pub mod events;
pub mod hook;

pub use events::LoadEvent;
pub use hook::{Hook, HookHandler, HookPriority};
