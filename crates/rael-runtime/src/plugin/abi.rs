//! Native module ABI and the loader seam.
//!
//! A loadable module exports three C-linkage symbols:
//!
//! - `plugin_abi_version() -> u32`: checked before anything else is trusted
//! - `create_plugin() -> *mut c_void`: thin pointer to a `Box<Box<dyn Plugin>>`
//! - `destroy_plugin(*mut c_void)`: frees what `create_plugin` returned
//!
//! The double box keeps the pointer thin so it can cross `extern "C"`.
//!
//! **Constraint:** plugin and host must share the same Rust compiler and
//! `rael-runtime` version; the vtable layout of `dyn Plugin` is not stable.

use std::ffi::c_void;
use std::path::{Path, PathBuf};

use libloading::Library;

use super::plugin_trait::Plugin;
use crate::error::{PluginError, PluginResult};

/// Version of the binary contract. Bump on any change to `Plugin` or these symbols.
pub const ABI_VERSION: u32 = 1;

pub const ABI_VERSION_SYMBOL: &str = "plugin_abi_version";
pub const CREATE_SYMBOL: &str = "create_plugin";
pub const DESTROY_SYMBOL: &str = "destroy_plugin";

/// Symbol type for `plugin_abi_version() -> u32`
pub type AbiVersionFn = unsafe extern "C" fn() -> u32;
/// Symbol type for `create_plugin() -> *mut c_void`
pub type CreateFn = unsafe extern "C" fn() -> *mut c_void;
/// Symbol type for `destroy_plugin(*mut c_void)`
pub type DestroyFn = unsafe extern "C" fn(*mut c_void);

/// Resolved entry points of an opened module.
#[derive(Clone, Copy)]
pub struct EntryPoints {
    pub create: CreateFn,
    pub destroy: DestroyFn,
}

/// An opened native module. Dropping it closes the library, so every pointer
/// obtained through it must be released first.
pub trait NativeModule: Send + Sync {
    fn path(&self) -> &Path;

    /// ABI version the module was built against.
    fn abi_version(&self) -> PluginResult<u32>;

    /// Resolve `create_plugin` / `destroy_plugin`.
    fn entry_points(&self) -> PluginResult<EntryPoints>;
}

/// Platform dynamic loader. Swappable so tests can count opens and closes.
pub trait ModuleLoader: Send + Sync {
    fn open(&self, path: &Path) -> PluginResult<Box<dyn NativeModule>>;
}

/// Box a plugin into the thin pointer form returned by `create_plugin`.
pub fn into_raw_instance(plugin: Box<dyn Plugin>) -> *mut c_void {
    Box::into_raw(Box::new(plugin)) as *mut c_void
}

/// Free a pointer produced by [`into_raw_instance`]. Null is ignored.
///
/// # Safety
/// `raw` must come from `into_raw_instance` in the same module and must not be
/// used afterwards.
pub unsafe fn drop_raw_instance(raw: *mut c_void) {
    if raw.is_null() {
        return;
    }
    drop(Box::from_raw(raw as *mut Box<dyn Plugin>));
}

/// `ModuleLoader` backed by `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibloadingLoader;

impl ModuleLoader for LibloadingLoader {
    fn open(&self, path: &Path) -> PluginResult<Box<dyn NativeModule>> {
        // SAFETY: running the library's initialisers is inherent to loading native
        // plugins; only trusted directories should be configured.
        let library = unsafe { Library::new(path) }.map_err(|e| PluginError::OpenFailure {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(Box::new(LibloadingModule {
            library,
            path: path.to_path_buf(),
        }))
    }
}

struct LibloadingModule {
    library: Library,
    path: PathBuf,
}

impl LibloadingModule {
    fn symbol<T: Copy>(&self, name: &str) -> PluginResult<T> {
        let mut bytes = name.as_bytes().to_vec();
        bytes.push(0);
        // SAFETY: callers pick `T` to match the documented symbol signature. The
        // copied fn pointer stays valid while `self.library` is open, which the
        // owning `PluginHandle` guarantees.
        unsafe { self.library.get::<T>(&bytes) }
            .map(|sym| *sym)
            .map_err(|_| PluginError::SymbolMissing {
                path: self.path.clone(),
                symbol: name.to_string(),
            })
    }
}

impl NativeModule for LibloadingModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn abi_version(&self) -> PluginResult<u32> {
        let version_fn: AbiVersionFn = self.symbol(ABI_VERSION_SYMBOL)?;
        // SAFETY: signature fixed by the ABI contract.
        Ok(unsafe { version_fn() })
    }

    fn entry_points(&self) -> PluginResult<EntryPoints> {
        Ok(EntryPoints {
            create: self.symbol(CREATE_SYMBOL)?,
            destroy: self.symbol(DESTROY_SYMBOL)?,
        })
    }
}

/// Whether `path` carries a native-library extension on any supported platform.
pub fn is_native_library(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("so" | "dll" | "dylib")
    )
}
