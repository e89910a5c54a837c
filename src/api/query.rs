//! Purpose: Safe helpers for common PDH calls, built only on the binding's proxies.
//! Exports: `lookup_perf_name`, `expand_wildcard_path`, `enum_object_items`, `make_counter_path`,
//! `CounterQuery`, `CounterHandle`, `CounterPathElements`, `ObjectItems`, `split_multi_sz`.
//! Role: Caller-side conveniences; every helper borrows an `Attachment` so the library stays bound.
//! Invariants: Helpers refuse to run on an unavailable attachment.
//! Invariants: Buffer growth is capped (`MAX_BUFFER_LEN`) to avoid unbounded allocation.
//! Invariants: `CounterQuery` removes its counters and closes its query on drop.
use std::ffi::CString;
use std::os::raw::c_char;
use std::ptr;

use serde::Serialize;

use crate::core::binding::{Attachment, Binding};
use crate::core::entry::EntryPoint;
use crate::core::error::{Error, ErrorKind};
use crate::core::loader::LibraryLoader;
use crate::core::status::is_failure_status;
use crate::core::sys::{
    DWORD, ERROR_SUCCESS, PDH_COUNTER_PATH_ELEMENTS_A, PDH_CSTATUS_NEW_DATA,
    PDH_CSTATUS_VALID_DATA, PDH_FMT_COUNTERVALUE, PDH_FMT_DOUBLE, PDH_FMT_NOCAP100,
    PDH_HCOUNTER, PDH_HQUERY, PDH_INSUFFICIENT_BUFFER, PDH_MORE_DATA, PDH_STATUS,
    PERF_DETAIL_WIZARD,
};

const MAX_BUFFER_LEN: DWORD = 16 * 1024 * 1024;
const INITIAL_NAME_LEN: DWORD = 256;
const MAX_ATTEMPTS: usize = 8;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ObjectItems {
    pub counters: Vec<String>,
    pub instances: Vec<String>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CounterPathElements {
    pub machine: Option<String>,
    pub object: String,
    pub instance: Option<String>,
    pub parent_instance: Option<String>,
    pub instance_index: u32,
    pub counter: String,
}

/// Splits a double-NUL-terminated list of NUL-terminated strings.
pub fn split_multi_sz(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|byte| *byte == 0)
        .take_while(|item| !item.is_empty())
        .map(|item| String::from_utf8_lossy(item).into_owned())
        .collect()
}

fn nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|byte| *byte == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn c_string(value: &str, what: &str) -> Result<CString, Error> {
    CString::new(value).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{what} contains a NUL byte"))
            .with_source(err)
    })
}

fn native_error(entry: EntryPoint, status: PDH_STATUS) -> Error {
    Error::new(ErrorKind::Native)
        .with_message(format!("{entry} failed"))
        .with_symbol(entry.symbol_name())
        .with_status(status)
}

fn bound<'a, L: LibraryLoader>(attachment: &Attachment<'a, L>) -> Result<&'a Binding<L>, Error> {
    if !attachment.is_available() {
        return Err(Error::new(ErrorKind::Unavailable)
            .with_message(format!("{} is not usable", attachment.binding().library_name()))
            .with_hint("Check `Attachment::is_available` before issuing queries."));
    }
    Ok(attachment.binding())
}

fn next_len(entry: EntryPoint, current: DWORD, reported: DWORD) -> Result<DWORD, Error> {
    let next = reported.max(current.saturating_mul(2)).max(INITIAL_NAME_LEN);
    if next > MAX_BUFFER_LEN {
        return Err(Error::new(ErrorKind::Native)
            .with_message(format!("{entry} result exceeded max buffer size"))
            .with_symbol(entry.symbol_name()));
    }
    Ok(next)
}

fn buffer_ptr(buffer: &mut [u8]) -> *mut c_char {
    if buffer.is_empty() {
        ptr::null_mut()
    } else {
        buffer.as_mut_ptr().cast()
    }
}

/// Calls `call(buffer, &mut len)` until the library stops asking for more room.
fn with_growing_buffer(
    entry: EntryPoint,
    initial_len: DWORD,
    mut call: impl FnMut(*mut c_char, &mut DWORD) -> PDH_STATUS,
) -> Result<Vec<u8>, Error> {
    let mut len = initial_len;
    for _ in 0..MAX_ATTEMPTS {
        let mut buffer = vec![0u8; len as usize];
        let mut reported = len;
        let status = call(buffer_ptr(&mut buffer), &mut reported);
        match status {
            ERROR_SUCCESS if !buffer.is_empty() => {
                buffer.truncate((reported as usize).min(buffer.len()));
                return Ok(buffer);
            }
            ERROR_SUCCESS | PDH_MORE_DATA | PDH_INSUFFICIENT_BUFFER => {
                len = next_len(entry, len, reported)?;
            }
            other => return Err(native_error(entry, other)),
        }
    }
    Err(Error::new(ErrorKind::Native)
        .with_message(format!("{entry} kept requesting a larger buffer"))
        .with_symbol(entry.symbol_name()))
}

pub fn lookup_perf_name<L: LibraryLoader>(
    attachment: &Attachment<'_, L>,
    index: u32,
) -> Result<String, Error> {
    let binding = bound(attachment)?;
    let bytes = with_growing_buffer(
        EntryPoint::LookupPerfNameByIndex,
        INITIAL_NAME_LEN,
        |buffer, len| unsafe { binding.lookup_perf_name_by_index(ptr::null(), index, buffer, len) },
    )?;
    Ok(nul_terminated(&bytes))
}

pub fn expand_wildcard_path<L: LibraryLoader>(
    attachment: &Attachment<'_, L>,
    pattern: &str,
) -> Result<Vec<String>, Error> {
    let binding = bound(attachment)?;
    let pattern = c_string(pattern, "wildcard path")?;
    let bytes = with_growing_buffer(EntryPoint::ExpandWildCardPath, 0, |buffer, len| unsafe {
        binding.expand_wildcard_path(ptr::null(), pattern.as_ptr(), buffer, len, 0)
    })?;
    Ok(split_multi_sz(&bytes))
}

pub fn make_counter_path<L: LibraryLoader>(
    attachment: &Attachment<'_, L>,
    elements: &CounterPathElements,
) -> Result<String, Error> {
    let binding = bound(attachment)?;
    let optional = |value: &Option<String>, what: &str| -> Result<Option<CString>, Error> {
        value.as_deref().map(|value| c_string(value, what)).transpose()
    };
    let machine = optional(&elements.machine, "machine name")?;
    let object = c_string(&elements.object, "object name")?;
    let instance = optional(&elements.instance, "instance name")?;
    let parent = optional(&elements.parent_instance, "parent instance")?;
    let counter = c_string(&elements.counter, "counter name")?;
    let raw_ptr = |value: &Option<CString>| {
        value
            .as_ref()
            .map_or(ptr::null_mut(), |value| value.as_ptr().cast_mut())
    };

    // The library only reads through these pointers.
    let mut raw = PDH_COUNTER_PATH_ELEMENTS_A {
        szMachineName: raw_ptr(&machine),
        szObjectName: object.as_ptr().cast_mut(),
        szInstanceName: raw_ptr(&instance),
        szParentInstance: raw_ptr(&parent),
        dwInstanceIndex: elements.instance_index,
        szCounterName: counter.as_ptr().cast_mut(),
    };
    let bytes = with_growing_buffer(EntryPoint::MakeCounterPath, INITIAL_NAME_LEN, |buffer, len| unsafe {
        binding.make_counter_path(&mut raw, buffer, len, 0)
    })?;
    Ok(nul_terminated(&bytes))
}

pub fn enum_object_items<L: LibraryLoader>(
    attachment: &Attachment<'_, L>,
    object: &str,
) -> Result<ObjectItems, Error> {
    let entry = EntryPoint::EnumObjectItems;
    let binding = bound(attachment)?;
    let object = c_string(object, "object name")?;
    let mut counter_len: DWORD = 0;
    let mut instance_len: DWORD = 0;

    for _ in 0..MAX_ATTEMPTS {
        let mut counters = vec![0u8; counter_len as usize];
        let mut instances = vec![0u8; instance_len as usize];
        let mut reported_counters = counter_len;
        let mut reported_instances = instance_len;
        let status = unsafe {
            binding.enum_object_items(
                ptr::null(),
                ptr::null(),
                object.as_ptr(),
                buffer_ptr(&mut counters),
                &mut reported_counters,
                buffer_ptr(&mut instances),
                &mut reported_instances,
                PERF_DETAIL_WIZARD,
                0,
            )
        };
        if is_failure_status(status) && status != PDH_INSUFFICIENT_BUFFER {
            return Err(native_error(entry, status));
        }
        let filled = status == ERROR_SUCCESS
            && reported_counters <= counter_len
            && reported_instances <= instance_len;
        if filled {
            return Ok(ObjectItems {
                counters: split_multi_sz(&counters),
                instances: split_multi_sz(&instances),
            });
        }
        counter_len = reported_counters.max(counter_len);
        instance_len = reported_instances.max(instance_len);
        if counter_len > MAX_BUFFER_LEN || instance_len > MAX_BUFFER_LEN {
            return Err(Error::new(ErrorKind::Native)
                .with_message(format!("{entry} result exceeded max buffer size"))
                .with_symbol(entry.symbol_name()));
        }
    }
    Err(Error::new(ErrorKind::Native)
        .with_message(format!("{entry} kept requesting a larger buffer"))
        .with_symbol(entry.symbol_name()))
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CounterHandle(usize);

/// An open query plus the counters added to it.
pub struct CounterQuery<'a, L: LibraryLoader> {
    binding: &'a Binding<L>,
    query: PDH_HQUERY,
    counters: Vec<Option<PDH_HCOUNTER>>,
}

impl<'a, L: LibraryLoader> CounterQuery<'a, L> {
    pub fn open(attachment: &'a Attachment<'a, L>) -> Result<Self, Error> {
        let binding = bound(attachment)?;
        let mut query: PDH_HQUERY = ptr::null_mut();
        let status = unsafe { binding.open_query(ptr::null(), 0, &mut query) };
        if status != ERROR_SUCCESS {
            return Err(native_error(EntryPoint::OpenQuery, status));
        }
        Ok(Self {
            binding,
            query,
            counters: Vec::new(),
        })
    }

    pub fn add_counter(&mut self, path: &str) -> Result<CounterHandle, Error> {
        let path = c_string(path, "counter path")?;
        let mut counter: PDH_HCOUNTER = ptr::null_mut();
        let status = unsafe { self.binding.add_counter(self.query, path.as_ptr(), 0, &mut counter) };
        if status != ERROR_SUCCESS {
            return Err(native_error(EntryPoint::AddCounter, status));
        }
        self.counters.push(Some(counter));
        Ok(CounterHandle(self.counters.len() - 1))
    }

    pub fn remove_counter(&mut self, handle: CounterHandle) -> Result<(), Error> {
        let counter = self.take_counter(handle)?;
        let status = unsafe { self.binding.remove_counter(counter) };
        if status != ERROR_SUCCESS {
            return Err(native_error(EntryPoint::RemoveCounter, status));
        }
        Ok(())
    }

    pub fn collect(&self) -> Result<(), Error> {
        let status = unsafe { self.binding.collect_query_data(self.query) };
        if status != ERROR_SUCCESS {
            return Err(native_error(EntryPoint::CollectQueryData, status));
        }
        Ok(())
    }

    /// Formatted value as a double; rate counters need two collections first.
    pub fn formatted_double(&self, handle: CounterHandle) -> Result<f64, Error> {
        let counter = self.counter(handle)?;
        let mut value = PDH_FMT_COUNTERVALUE::default();
        let status = unsafe {
            self.binding.get_formatted_counter_value(
                counter,
                PDH_FMT_DOUBLE | PDH_FMT_NOCAP100,
                ptr::null_mut(),
                &mut value,
            )
        };
        if status != ERROR_SUCCESS {
            return Err(native_error(EntryPoint::GetFormattedCounterValue, status));
        }
        if value.CStatus != PDH_CSTATUS_VALID_DATA && value.CStatus != PDH_CSTATUS_NEW_DATA {
            return Err(native_error(EntryPoint::GetFormattedCounterValue, value.CStatus as PDH_STATUS)
                .with_message("counter value is not valid"));
        }
        // SAFETY: PDH_FMT_DOUBLE selects the `doubleValue` member.
        Ok(unsafe { value.u.doubleValue })
    }

    fn counter(&self, handle: CounterHandle) -> Result<PDH_HCOUNTER, Error> {
        self.counters
            .get(handle.0)
            .copied()
            .flatten()
            .ok_or_else(|| Error::new(ErrorKind::NotFound).with_message("counter was removed"))
    }

    fn take_counter(&mut self, handle: CounterHandle) -> Result<PDH_HCOUNTER, Error> {
        self.counters
            .get_mut(handle.0)
            .and_then(Option::take)
            .ok_or_else(|| Error::new(ErrorKind::NotFound).with_message("counter was removed"))
    }
}

impl<L: LibraryLoader> Drop for CounterQuery<'_, L> {
    fn drop(&mut self) {
        for counter in self.counters.drain(..).flatten() {
            let status = unsafe { self.binding.remove_counter(counter) };
            if status != ERROR_SUCCESS {
                tracing::debug!(status, "PdhRemoveCounter failed during cleanup");
            }
        }
        let status = unsafe { self.binding.close_query(self.query) };
        if status != ERROR_SUCCESS {
            tracing::debug!(status, "PdhCloseQuery failed during cleanup");
        }
    }
}
