//! Purpose: Classify native PDH status codes into fatal and benign outcomes.
//! Exports: `is_failure_status`, `PdhStatus`, `status_name`.
//! Role: Pure helpers; no shared state.
//! Invariants: Only `ERROR_SUCCESS` and `PDH_MORE_DATA` are non-failures.
use std::fmt;

use serde::Serialize;

use crate::core::sys::{
    ERROR_SUCCESS, PDH_CALC_NEGATIVE_DENOMINATOR, PDH_CALC_NEGATIVE_VALUE, PDH_CSTATUS_BAD_COUNTERNAME,
    PDH_CSTATUS_INVALID_DATA, PDH_CSTATUS_NO_COUNTER, PDH_CSTATUS_NO_OBJECT,
    PDH_INSUFFICIENT_BUFFER, PDH_INVALID_ARGUMENT, PDH_INVALID_DATA, PDH_INVALID_HANDLE,
    PDH_MEMORY_ALLOCATION_FAILURE, PDH_MORE_DATA, PDH_NO_DATA, PDH_STATUS,
};

/// True for every status except success and "more data available".
///
/// The library reports "buffer too small, call again" through the same
/// channel as real errors, so callers sizing buffers must not bail on it.
pub fn is_failure_status(status: PDH_STATUS) -> bool {
    status != ERROR_SUCCESS && status != PDH_MORE_DATA
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "code", rename_all = "snake_case")]
pub enum PdhStatus {
    Success,
    MoreData,
    Failure(PDH_STATUS),
}

impl PdhStatus {
    pub fn classify(status: PDH_STATUS) -> Self {
        match status {
            ERROR_SUCCESS => PdhStatus::Success,
            PDH_MORE_DATA => PdhStatus::MoreData,
            other => PdhStatus::Failure(other),
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, PdhStatus::Failure(_))
    }

    pub fn code(self) -> PDH_STATUS {
        match self {
            PdhStatus::Success => ERROR_SUCCESS,
            PdhStatus::MoreData => PDH_MORE_DATA,
            PdhStatus::Failure(code) => code,
        }
    }
}

impl fmt::Display for PdhStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        match status_name(code) {
            Some(name) => write!(f, "{name}"),
            None => write!(f, "{:#010x}", code as u32),
        }
    }
}

pub fn status_name(status: PDH_STATUS) -> Option<&'static str> {
    let name = match status {
        ERROR_SUCCESS => "ERROR_SUCCESS",
        PDH_MORE_DATA => "PDH_MORE_DATA",
        PDH_NO_DATA => "PDH_NO_DATA",
        PDH_CALC_NEGATIVE_DENOMINATOR => "PDH_CALC_NEGATIVE_DENOMINATOR",
        PDH_CALC_NEGATIVE_VALUE => "PDH_CALC_NEGATIVE_VALUE",
        PDH_CSTATUS_NO_OBJECT => "PDH_CSTATUS_NO_OBJECT",
        PDH_CSTATUS_NO_COUNTER => "PDH_CSTATUS_NO_COUNTER",
        PDH_CSTATUS_INVALID_DATA => "PDH_CSTATUS_INVALID_DATA",
        PDH_MEMORY_ALLOCATION_FAILURE => "PDH_MEMORY_ALLOCATION_FAILURE",
        PDH_INVALID_HANDLE => "PDH_INVALID_HANDLE",
        PDH_INVALID_ARGUMENT => "PDH_INVALID_ARGUMENT",
        PDH_CSTATUS_BAD_COUNTERNAME => "PDH_CSTATUS_BAD_COUNTERNAME",
        PDH_INSUFFICIENT_BUFFER => "PDH_INSUFFICIENT_BUFFER",
        PDH_INVALID_DATA => "PDH_INVALID_DATA",
        _ => return None,
    };
    Some(name)
}
