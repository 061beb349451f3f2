//! RAEL Plugin SDK
//!
//! Re-exports the runtime types a plugin needs. Plugin authors implement
//! [`Plugin`] and export it with [`declare_plugin!`]. Plugins must be built
//! with the same compiler and `rael-runtime` version as the host.

pub use rael_runtime::extension::{ExtensionFactory, ExtensionPoint};
pub use rael_runtime::hooks::{Hook, HookPriority, LoadEvent};
pub use rael_runtime::plugin::abi::{drop_raw_instance, into_raw_instance, ABI_VERSION};
pub use rael_runtime::plugin::{ConfigMap, Plugin, PluginContext, PluginInfo, PluginManager};
pub use rael_runtime::services::ServiceRegistry;

#[doc(hidden)]
pub use tracing as __tracing;

/// Export a plugin type through the C ABI the host loads.
///
/// Generates `plugin_abi_version`, `create_plugin` and `destroy_plugin`.
/// The one-argument form constructs the plugin with `Default`:
/// ```ignore
/// use rael_plugin_sdk::*;
///
/// #[derive(Default)]
/// struct MyPlugin;
/// impl Plugin for MyPlugin { ... }
///
/// declare_plugin!(MyPlugin);
/// // or: declare_plugin!(MyPlugin, MyPlugin::new);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($plugin_type:ty) => {
        $crate::declare_plugin!(
            $plugin_type,
            <$plugin_type as ::std::default::Default>::default
        );
    };
    ($plugin_type:ty, $constructor:expr) => {
        #[no_mangle]
        pub extern "C" fn plugin_abi_version() -> u32 {
            $crate::ABI_VERSION
        }

        #[no_mangle]
        pub extern "C" fn create_plugin() -> *mut ::std::ffi::c_void {
            // Unwinding out of an extern "C" fn aborts; report a panic as null
            let result = ::std::panic::catch_unwind(|| {
                let constructor: fn() -> $plugin_type = $constructor;
                let plugin: ::std::boxed::Box<dyn $crate::Plugin> =
                    ::std::boxed::Box::new(constructor());
                $crate::into_raw_instance(plugin)
            });
            match result {
                Ok(raw) => raw,
                Err(_) => {
                    $crate::__tracing::error!("Plugin constructor panicked");
                    ::std::ptr::null_mut()
                }
            }
        }

        /// # Safety
        /// `raw` must come from this library's `create_plugin`.
        #[no_mangle]
        pub unsafe extern "C" fn destroy_plugin(raw: *mut ::std::ffi::c_void) {
            let _ = ::std::panic::catch_unwind(|| $crate::drop_raw_instance(raw));
        }
    };
}
