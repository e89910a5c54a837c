//! Purpose: Load service seam: open a named library, resolve symbols, unload it.
//! Exports: `LibraryLoader`, `SystemLoader`, `SystemLibrary`.
//! Role: Black-box collaborator of the binding; tests substitute counting stubs.
//! Invariants: `resolve` never yields a null address; absence is `None`.
//! Invariants: `unload` consumes the handle whether or not the platform call succeeds.
use std::ffi::{CStr, c_void};
use std::fmt;
use std::ptr::NonNull;

use libloading::{Library, Symbol};

use crate::core::error::{Error, ErrorKind};

pub trait LibraryLoader: Send + Sync {
    type Handle: Send;

    fn load(&self, name: &str) -> Option<Self::Handle>;

    fn resolve(&self, handle: &Self::Handle, symbol: &CStr) -> Option<NonNull<c_void>>;

    fn unload(&self, handle: Self::Handle) -> Result<(), Error>;
}

/// Platform loader backed by `libloading` (`LoadLibrary`/`dlopen`).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemLoader;

pub struct SystemLibrary {
    library: Library,
    name: String,
}

impl fmt::Debug for SystemLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemLibrary")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl LibraryLoader for SystemLoader {
    type Handle = SystemLibrary;

    fn load(&self, name: &str) -> Option<SystemLibrary> {
        // SAFETY: PDH runs no initialization routines with preconditions of ours.
        match unsafe { Library::new(name) } {
            Ok(library) => Some(SystemLibrary {
                library,
                name: name.to_string(),
            }),
            Err(err) => {
                tracing::debug!(library = name, error = %err, "library load failed");
                None
            }
        }
    }

    fn resolve(&self, handle: &SystemLibrary, symbol: &CStr) -> Option<NonNull<c_void>> {
        // SAFETY: a `*mut c_void` symbol is the export's address; it is only
        // reinterpreted as a function pointer by the binding's typed proxies.
        let address: Symbol<'_, *mut c_void> =
            unsafe { handle.library.get(symbol.to_bytes_with_nul()) }.ok()?;
        NonNull::new(*address)
    }

    fn unload(&self, handle: SystemLibrary) -> Result<(), Error> {
        let SystemLibrary { library, name } = handle;
        library.close().map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message(format!("failed to unload {name}"))
                .with_source(err)
        })
    }
}
