//! Purpose: Shared, reference-counted binding to the Performance Data Helper library.
//! Exports: `core` (binding state, loader seam, ABI, status codes, errors) and `api` (facade, config, helpers).
//! Role: Library crate backing the `pdhlink` CLI; usable from any call site in a host process.
//! Invariants: At most one library instance is bound per `Binding`; the facade owns exactly one.
//! Invariants: A failed load is reported, never retried, until every client has detached.
pub mod api;
pub mod core;
