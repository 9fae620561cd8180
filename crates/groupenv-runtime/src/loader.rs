//! Plugin libraries: opening archives and collecting the types they export.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::{Library, Symbol};

use crate::component::FactoryTable;
use crate::error::LoadError;

/// Entry point every plugin library exports.
pub const REGISTER_SYMBOL: &str = "groupenv_register_v1";
/// Optional ABI probe; when exported it must return [`PLUGIN_ABI_VERSION`].
pub const ABI_SYMBOL: &str = "groupenv_plugin_abi";
pub const PLUGIN_ABI_VERSION: u32 = 1;

/// Registration entry point. Uses the Rust ABI, so plugins must be built
/// with the same toolchain and the same `groupenv-runtime` version as the host.
pub type RegisterFn = unsafe fn(&mut FactoryTable);
type AbiFn = unsafe extern "C" fn() -> u32;

/// Opens archives for a loading context.
pub trait LibraryLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Arc<dyn LoadedLibrary>, LoadError>;
}

/// An opened archive. Kept alive for as long as any factory or component it
/// produced is reachable.
pub trait LoadedLibrary: Send + Sync {
    fn path(&self) -> &Path;

    /// Add the library's types to `table`.
    fn register(&self, table: &mut FactoryTable) -> Result<(), LoadError>;
}

/// Loads native dynamic libraries with `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl LibraryLoader for NativeLoader {
    fn load(&self, path: &Path) -> Result<Arc<dyn LoadedLibrary>, LoadError> {
        // SAFETY: running a library's initializers is the point of loading it;
        // archives come from the group's own library directory.
        let lib = unsafe { Library::new(path) }.map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let abi = unsafe { lib.get::<AbiFn>(ABI_SYMBOL.as_bytes()) }
            .ok()
            .map(|probe| unsafe { probe() });
        if let Some(actual) = abi {
            if actual != PLUGIN_ABI_VERSION {
                return Err(LoadError::AbiMismatch {
                    path: path.to_path_buf(),
                    expected: PLUGIN_ABI_VERSION,
                    actual,
                });
            }
        }

        Ok(Arc::new(NativeLibrary {
            path: path.to_path_buf(),
            lib,
        }))
    }
}

struct NativeLibrary {
    path: PathBuf,
    lib: Library,
}

impl LoadedLibrary for NativeLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn register(&self, table: &mut FactoryTable) -> Result<(), LoadError> {
        let entry: Symbol<RegisterFn> = unsafe { self.lib.get(REGISTER_SYMBOL.as_bytes()) }
            .map_err(|_| LoadError::MissingSymbol {
                path: self.path.clone(),
                symbol: REGISTER_SYMBOL.to_string(),
            })?;
        let register = *entry;
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe { register(table) }))
            .map_err(|panic| LoadError::Registration {
                path: self.path.clone(),
                message: panic_message(&panic),
            })
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "registration panicked".to_string()
    }
}

/// Export the plugin entry points from a `cdylib`.
///
/// ```ignore
/// fn register(table: &mut groupenv_runtime::FactoryTable) {
///     table.register("acme.Cache", |req| Ok(std::sync::Arc::new(Cache::new(req.params)?) as _));
/// }
/// groupenv_runtime::declare_plugin!(register);
/// ```
#[macro_export]
macro_rules! declare_plugin {
    ($register:path) => {
        #[no_mangle]
        pub extern "C" fn groupenv_plugin_abi() -> u32 {
            $crate::loader::PLUGIN_ABI_VERSION
        }

        #[no_mangle]
        pub fn groupenv_register_v1(table: &mut $crate::component::FactoryTable) {
            $register(table)
        }
    };
}
