// Counting stub loader whose symbols resolve to in-process fakes of the PDH exports.
#![allow(dead_code)]

use std::cell::Cell;
use std::ffi::{CStr, c_void};
use std::os::raw::c_char;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use pdhlink::api::sys::{
    DWORD, DWORD_PTR, ERROR_SUCCESS, PDH_COUNTER_PATH_ELEMENTS_A, PDH_CSTATUS_BAD_COUNTERNAME,
    PDH_CSTATUS_VALID_DATA, PDH_FMT_COUNTERVALUE, PDH_HCOUNTER, PDH_HQUERY, PDH_INVALID_HANDLE,
    PDH_MORE_DATA, PDH_STATUS,
};
use pdhlink::api::{Binding, Error, ErrorKind, LibraryLoader};

pub const FAKE_QUERY: usize = 0x51;
pub const FAKE_COUNTER: usize = 0xC0;
pub const FAKE_VALUE: f64 = 42.5;
pub const LONG_NAME_INDEX: DWORD = 9999;

thread_local! {
    pub static REMOVED_COUNTERS: Cell<usize> = const { Cell::new(0) };
    pub static CLOSED_QUERIES: Cell<usize> = const { Cell::new(0) };
}

pub struct CountingLoader {
    pub loads: AtomicUsize,
    pub resolves: AtomicUsize,
    pub unloads: AtomicUsize,
    pub fail_unload: AtomicBool,
    library_present: bool,
    missing: Vec<&'static str>,
    load_delay: Option<Duration>,
    // Parks the next unload: it meets the gate once on entry and once to resume.
    unload_gate: Mutex<Option<Arc<Barrier>>>,
    generation: AtomicU64,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            resolves: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
            fail_unload: AtomicBool::new(false),
            library_present: true,
            missing: Vec::new(),
            load_delay: None,
            unload_gate: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn absent() -> Self {
        Self {
            library_present: false,
            ..Self::new()
        }
    }

    pub fn missing(mut self, symbols: &[&'static str]) -> Self {
        self.missing.extend_from_slice(symbols);
        self
    }

    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn with_unload_gate(self, gate: Arc<Barrier>) -> Self {
        *self.unload_gate.lock().expect("gate lock") = Some(gate);
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn resolves(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    pub fn unloads(&self) -> usize {
        self.unloads.load(Ordering::SeqCst)
    }
}

impl LibraryLoader for CountingLoader {
    type Handle = u64;

    fn load(&self, _name: &str) -> Option<u64> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            thread::sleep(delay);
        }
        if !self.library_present {
            return None;
        }
        Some(self.generation.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn resolve(&self, _handle: &u64, symbol: &CStr) -> Option<NonNull<c_void>> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        let name = symbol.to_str().ok()?;
        if self.missing.contains(&name) {
            return None;
        }
        NonNull::new(fake_export(name)?)
    }

    fn unload(&self, _handle: u64) -> Result<(), Error> {
        let gate = self.unload_gate.lock().expect("gate lock").take();
        if let Some(gate) = gate {
            gate.wait();
            gate.wait();
        }
        if self.fail_unload.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Internal).with_message("unload refused"));
        }
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn counting_binding(loader: CountingLoader) -> Binding<CountingLoader> {
    Binding::new(loader, "pdh.dll")
}

fn fake_export(name: &str) -> Option<*mut c_void> {
    let address = match name {
        "PdhOpenQueryA" => fake_open_query as *mut c_void,
        "PdhCloseQuery" => fake_close_query as *mut c_void,
        "PdhCollectQueryData" => fake_collect_query_data as *mut c_void,
        "PdhAddCounterA" => fake_add_counter as *mut c_void,
        "PdhRemoveCounter" => fake_remove_counter as *mut c_void,
        "PdhGetFormattedCounterValue" => fake_get_formatted_counter_value as *mut c_void,
        "PdhEnumObjectItemsA" => fake_enum_object_items as *mut c_void,
        "PdhLookupPerfNameByIndexA" => fake_lookup_perf_name_by_index as *mut c_void,
        "PdhMakeCounterPathA" => fake_make_counter_path as *mut c_void,
        "PdhExpandWildCardPathA" => fake_expand_wildcard_path as *mut c_void,
        _ => return None,
    };
    Some(address)
}

pub fn long_name() -> String {
    "Very Long Counter Name ".repeat(30)
}

// Writes `bytes` into a caller buffer of `*len` bytes, or reports the size needed.
unsafe fn copy_out(bytes: &[u8], buffer: *mut c_char, len: *mut DWORD) -> PDH_STATUS {
    let needed = bytes.len() as DWORD;
    unsafe {
        if buffer.is_null() || *len < needed {
            *len = needed;
            return PDH_MORE_DATA;
        }
        ptr::copy_nonoverlapping(bytes.as_ptr(), buffer.cast::<u8>(), bytes.len());
        *len = needed;
    }
    ERROR_SUCCESS
}

unsafe fn c_str_or_empty(value: *const c_char) -> String {
    if value.is_null() {
        return String::new();
    }
    unsafe { CStr::from_ptr(value) }.to_string_lossy().into_owned()
}

unsafe extern "system" fn fake_open_query(
    _data_source: *const c_char,
    _user_data: DWORD_PTR,
    query: *mut PDH_HQUERY,
) -> PDH_STATUS {
    unsafe { *query = FAKE_QUERY as PDH_HQUERY };
    ERROR_SUCCESS
}

unsafe extern "system" fn fake_close_query(query: PDH_HQUERY) -> PDH_STATUS {
    if query as usize != FAKE_QUERY {
        return PDH_INVALID_HANDLE;
    }
    CLOSED_QUERIES.with(|count| count.set(count.get() + 1));
    ERROR_SUCCESS
}

unsafe extern "system" fn fake_collect_query_data(query: PDH_HQUERY) -> PDH_STATUS {
    if query as usize != FAKE_QUERY {
        return PDH_INVALID_HANDLE;
    }
    ERROR_SUCCESS
}

unsafe extern "system" fn fake_add_counter(
    query: PDH_HQUERY,
    path: *const c_char,
    _user_data: DWORD_PTR,
    counter: *mut PDH_HCOUNTER,
) -> PDH_STATUS {
    if query as usize != FAKE_QUERY {
        return PDH_INVALID_HANDLE;
    }
    let path = unsafe { c_str_or_empty(path) };
    if !path.starts_with('\\') {
        return PDH_CSTATUS_BAD_COUNTERNAME;
    }
    unsafe { *counter = FAKE_COUNTER as PDH_HCOUNTER };
    ERROR_SUCCESS
}

unsafe extern "system" fn fake_remove_counter(counter: PDH_HCOUNTER) -> PDH_STATUS {
    if counter as usize != FAKE_COUNTER {
        return PDH_INVALID_HANDLE;
    }
    REMOVED_COUNTERS.with(|count| count.set(count.get() + 1));
    ERROR_SUCCESS
}

unsafe extern "system" fn fake_get_formatted_counter_value(
    counter: PDH_HCOUNTER,
    _format: DWORD,
    counter_type: *mut DWORD,
    value: *mut PDH_FMT_COUNTERVALUE,
) -> PDH_STATUS {
    if counter as usize != FAKE_COUNTER {
        return PDH_INVALID_HANDLE;
    }
    unsafe {
        if !counter_type.is_null() {
            *counter_type = 0x1041_0400;
        }
        (*value).CStatus = PDH_CSTATUS_VALID_DATA;
        (*value).u.doubleValue = FAKE_VALUE;
    }
    ERROR_SUCCESS
}

unsafe extern "system" fn fake_enum_object_items(
    _data_source: *const c_char,
    _machine_name: *const c_char,
    _object_name: *const c_char,
    counter_list: *mut c_char,
    counter_list_len: *mut DWORD,
    instance_list: *mut c_char,
    instance_list_len: *mut DWORD,
    _detail_level: DWORD,
    _flags: DWORD,
) -> PDH_STATUS {
    let counters: &[u8] = b"% Processor Time\0% User Time\0\0";
    let instances: &[u8] = b"0\0_Total\0\0";
    unsafe {
        let fits = !counter_list.is_null()
            && !instance_list.is_null()
            && *counter_list_len >= counters.len() as DWORD
            && *instance_list_len >= instances.len() as DWORD;
        if !fits {
            *counter_list_len = counters.len() as DWORD;
            *instance_list_len = instances.len() as DWORD;
            return PDH_MORE_DATA;
        }
        copy_out(counters, counter_list, counter_list_len);
        copy_out(instances, instance_list, instance_list_len)
    }
}

unsafe extern "system" fn fake_lookup_perf_name_by_index(
    _machine_name: *const c_char,
    name_index: DWORD,
    name_buffer: *mut c_char,
    name_buffer_len: *mut DWORD,
) -> PDH_STATUS {
    let name = match name_index {
        238 => "Processor".to_string(),
        LONG_NAME_INDEX => long_name(),
        _ => return PDH_CSTATUS_BAD_COUNTERNAME,
    };
    let mut bytes = name.into_bytes();
    bytes.push(0);
    unsafe { copy_out(&bytes, name_buffer, name_buffer_len) }
}

unsafe extern "system" fn fake_make_counter_path(
    elements: *mut PDH_COUNTER_PATH_ELEMENTS_A,
    buffer: *mut c_char,
    buffer_len: *mut DWORD,
    _flags: DWORD,
) -> PDH_STATUS {
    let path = unsafe {
        let elements = &*elements;
        let object = c_str_or_empty(elements.szObjectName);
        let counter = c_str_or_empty(elements.szCounterName);
        match c_str_or_empty(elements.szInstanceName) {
            instance if instance.is_empty() => format!("\\{object}\\{counter}"),
            instance => format!("\\{object}({instance})\\{counter}"),
        }
    };
    let mut bytes = path.into_bytes();
    bytes.push(0);
    unsafe { copy_out(&bytes, buffer, buffer_len) }
}

unsafe extern "system" fn fake_expand_wildcard_path(
    _data_source: *const c_char,
    _wildcard_path: *const c_char,
    buffer: *mut c_char,
    buffer_len: *mut DWORD,
    _flags: DWORD,
) -> PDH_STATUS {
    let paths: &[u8] = b"\\Processor(0)\\% Processor Time\0\\Processor(1)\\% Processor Time\0\0";
    unsafe { copy_out(paths, buffer, buffer_len) }
}
