pub mod abi;
pub mod context;
pub mod ffi_bridge;
pub mod manager;
pub mod plugin_trait;

pub use abi::{is_native_library, LibloadingLoader, ModuleLoader, NativeModule, ABI_VERSION};
pub use context::PluginContext;
pub use ffi_bridge::PluginHandle;
pub use manager::PluginManager;
pub use plugin_trait::{ConfigMap, Plugin, PluginInfo};
