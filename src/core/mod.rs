// Core modules implementing the binding lifecycle, the ABI, and error modeling.
pub mod binding;
pub mod entry;
pub mod error;
pub mod loader;
pub mod status;
pub mod sys;
