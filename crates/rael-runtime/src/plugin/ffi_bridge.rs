//! FFI bridge: turns an opened native module into a live plugin instance.
//!
//! Uses double-boxing pattern: `Box<Box<dyn Plugin>>` → thin `*mut c_void`
//! to avoid passing fat pointers over `extern "C"` boundary.

use std::ffi::c_void;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::ptr::NonNull;

use tracing::{debug, warn};

use super::abi::{DestroyFn, ModuleLoader, NativeModule, ABI_VERSION};
use super::plugin_trait::Plugin;
use crate::error::{PluginError, PluginResult};

/// A plugin instance bundled with the library that contains its code.
///
/// The instance and the library are acquired together and released together:
/// on drop the instance goes back through the module's `destroy_plugin`, then
/// the module is closed.
pub struct PluginHandle {
    instance: NonNull<Box<dyn Plugin>>,
    destroy: DestroyFn,
    module: Option<Box<dyn NativeModule>>,
    path: PathBuf,
}

// SAFETY: the pointee is a `dyn Plugin`, which is `Send + Sync`; the handle only
// hands out shared references to it.
unsafe impl Send for PluginHandle {}
unsafe impl Sync for PluginHandle {}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("path", &self.path)
            .finish()
    }
}

impl PluginHandle {
    /// Open `path`, check its ABI version, resolve the entry points and
    /// construct an instance.
    ///
    /// Calls `create_plugin()` with panic isolation. On any failure the module
    /// is dropped (closed) before returning.
    pub fn open(loader: &dyn ModuleLoader, path: &Path) -> PluginResult<Self> {
        let module = loader.open(path)?;

        let found = module.abi_version()?;
        if found != ABI_VERSION {
            return Err(PluginError::AbiMismatch {
                path: path.to_path_buf(),
                expected: ABI_VERSION,
                found,
            });
        }

        let entry = module.entry_points()?;

        // SAFETY: signature fixed by the ABI contract.
        let raw = catch_unwind(AssertUnwindSafe(|| unsafe { (entry.create)() })).map_err(|_| {
            PluginError::ConstructionFailure {
                path: path.to_path_buf(),
                reason: "panicked during create_plugin".into(),
            }
        })?;

        let instance = NonNull::new(raw as *mut Box<dyn Plugin>).ok_or_else(|| {
            PluginError::ConstructionFailure {
                path: path.to_path_buf(),
                reason: "create_plugin returned null".into(),
            }
        })?;

        debug!(path = %path.display(), "Plugin instance constructed");

        Ok(Self {
            instance,
            destroy: entry.destroy,
            module: Some(module),
            path: path.to_path_buf(),
        })
    }

    /// Borrow the loaded plugin.
    pub fn plugin(&self) -> &dyn Plugin {
        // SAFETY: `instance` stays valid until `drop`, which requires `&mut self`.
        unsafe { &**self.instance.as_ptr() }
    }

    /// Path the module was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Call `plugin.shutdown()` with panic isolation.
    /// A panic is logged and swallowed so the handle can still be released.
    pub fn shutdown(&self) {
        if catch_unwind(AssertUnwindSafe(|| self.plugin().shutdown())).is_err() {
            warn!(path = %self.path.display(), "Plugin panicked during shutdown");
        }
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        let raw = self.instance.as_ptr() as *mut c_void;
        // SAFETY: `raw` came from this module's `create_plugin` and is released
        // exactly once, while the module is still open.
        if catch_unwind(AssertUnwindSafe(|| unsafe { (self.destroy)(raw) })).is_err() {
            warn!(path = %self.path.display(), "Plugin panicked during destroy_plugin");
        }
        // Module closes only after the instance is gone
        drop(self.module.take());
    }
}
