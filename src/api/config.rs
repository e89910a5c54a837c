//! Purpose: Resolve which library the process-wide binding loads.
//! Exports: `BindingConfig`, `DEFAULT_LIBRARY`, `LIBRARY_ENV`.
//! Role: Configuration layer shared by the facade and the CLI.
//! Invariants: Precedence is explicit override, then config file, then env, then default.
//! Invariants: Config files are JSON; unknown fields are rejected.
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};

pub const DEFAULT_LIBRARY: &str = "pdh.dll";
pub const LIBRARY_ENV: &str = "PDHLINK_LIBRARY";

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BindingConfig {
    pub library: String,
}

impl Default for BindingConfig {
    fn default() -> Self {
        Self {
            library: DEFAULT_LIBRARY.to_string(),
        }
    }
}

impl BindingConfig {
    pub fn new(library: impl Into<String>) -> Self {
        Self {
            library: library.into(),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        match lookup(LIBRARY_ENV) {
            Some(library) if !library.trim().is_empty() => Self::new(library.trim()),
            _ => Self::default(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read config file")
                .with_path(path)
                .with_source(err)
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|err| {
            Error::new(ErrorKind::Config)
                .with_message("invalid config file")
                .with_path(path)
                .with_source(err)
        })?;
        if config.library.trim().is_empty() {
            return Err(Error::new(ErrorKind::Config)
                .with_message("`library` must not be empty")
                .with_path(path));
        }
        Ok(config)
    }

    pub fn resolve(library: Option<String>, config_file: Option<&Path>) -> Result<Self, Error> {
        if let Some(library) = library {
            if library.trim().is_empty() {
                return Err(Error::new(ErrorKind::Usage).with_message("library name is empty"));
            }
            return Ok(Self::new(library));
        }
        match config_file {
            Some(path) => Self::from_json_file(path),
            None => Ok(Self::from_env()),
        }
    }
}
