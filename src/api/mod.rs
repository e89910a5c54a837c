//! Purpose: Define the public Rust API boundary for pdhlink.
//! Exports: The process-wide facade (`pdh`), configuration, query helpers, and core types.
//! Role: Public, additive-only surface used by the CLI and host applications.
//! Invariants: Host code reaches the shared library only through `pdh` or an `Attachment`.

pub mod config;
pub mod pdh;
pub mod query;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::binding::{Attachment, Binding, BindingSnapshot, EntrySnapshot};
pub use crate::core::entry::EntryPoint;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::loader::{LibraryLoader, SystemLibrary, SystemLoader};
pub use crate::core::status::{PdhStatus, is_failure_status, status_name};
pub use crate::core::sys;
pub use config::BindingConfig;
pub use query::{CounterHandle, CounterPathElements, CounterQuery, ObjectItems};
