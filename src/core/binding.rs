//! Purpose: Reference-counted, lazily initialized binding to the PDH library.
//! Exports: `Binding`, `Attachment`, `BindingSnapshot`, `EntrySnapshot`.
//! Role: Binding State plus one typed proxy per entry point; `api::pdh` owns the process-wide instance.
//! Invariants: Every `attach` increments the reference count before anything else.
//! Invariants: Load and resolve run at most once per load/unload cycle, under `module`.
//! Invariants: Teardown claims a zero count (`TEARING_DOWN`) under `module` before withdrawing
//! `initialized`, so an attach that passes the fast path can never observe the withdrawal.
//! Invariants: Proxies take no lock; they assert the entry point is bound and forward verbatim.
//! Invariants: Entry slots are written before `initialized` is published and cleared after it is withdrawn.
use std::ffi::c_void;
use std::mem;
use std::os::raw::c_char;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicPtr, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::core::entry::EntryPoint;
use crate::core::error::{Error, ErrorKind};
use crate::core::loader::LibraryLoader;
use crate::core::sys::{
    DWORD, DWORD_PTR, PDH_COUNTER_PATH_ELEMENTS_A, PDH_FMT_COUNTERVALUE, PDH_HCOUNTER,
    PDH_HQUERY, PDH_STATUS, PdhAddCounterFn, PdhCloseQueryFn, PdhCollectQueryDataFn,
    PdhEnumObjectItemsFn, PdhExpandWildCardPathFn, PdhGetFormattedCounterValueFn,
    PdhLookupPerfNameByIndexFn, PdhMakeCounterPathFn, PdhOpenQueryFn, PdhRemoveCounterFn,
};

// Added to the count while the last detach tears down; attachers that see a
// negative count queue on the lock instead of trusting `initialized`.
const TEARING_DOWN: isize = isize::MIN / 2;

pub struct Binding<L: LibraryLoader> {
    loader: L,
    library_name: String,
    // Also the init lock: held only while loading or tearing down.
    module: Mutex<Option<L::Handle>>,
    entry_points: [AtomicPtr<c_void>; EntryPoint::COUNT],
    references: AtomicIsize,
    initialized: AtomicBool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct EntrySnapshot {
    pub symbol: &'static str,
    pub bound: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct BindingSnapshot {
    pub library: String,
    pub references: isize,
    pub initialized: bool,
    pub loaded: bool,
    pub available: bool,
    pub entry_points: Vec<EntrySnapshot>,
}

impl<L: LibraryLoader> Binding<L> {
    pub fn new(loader: L, library_name: impl Into<String>) -> Self {
        Self {
            loader,
            library_name: library_name.into(),
            module: Mutex::new(None),
            entry_points: std::array::from_fn(|_| AtomicPtr::new(ptr::null_mut())),
            references: AtomicIsize::new(0),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn library_name(&self) -> &str {
        &self.library_name
    }

    /// Registers a client and binds the library on first use.
    ///
    /// Returns true only when every entry point resolved. The reference is
    /// taken even on false, so every call must be paired with `detach`.
    pub fn attach(&self) -> bool {
        let previous = self.references.fetch_add(1, Ordering::SeqCst);
        if previous >= 0 && self.initialized.load(Ordering::SeqCst) {
            return self.is_available();
        }

        // First use, or a teardown is in flight: wait for it, then rebind.
        let mut module = self.lock_module();
        if !self.initialized.load(Ordering::SeqCst) {
            *module = self.initialize();
            self.initialized.store(true, Ordering::SeqCst);
        }
        drop(module);
        self.is_available()
    }

    /// Releases one client; the last release unloads the library.
    ///
    /// Returns true only when this call unloaded the library successfully.
    pub fn detach(&self) -> bool {
        let previous = self.references.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "detach without a matching attach");
        if previous != 1 {
            return false;
        }

        let mut module = self.lock_module();
        if !self.initialized.load(Ordering::SeqCst) {
            return false;
        }

        // A client that attached since our decrement keeps the binding alive.
        if self
            .references
            .compare_exchange(0, TEARING_DOWN, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(library = %self.library_name, "teardown abandoned for a new attach");
            return false;
        }
        let unloaded = self.tear_down(&mut module);
        self.references.fetch_sub(TEARING_DOWN, Ordering::SeqCst);
        unloaded
    }

    fn tear_down(&self, module: &mut Option<L::Handle>) -> bool {
        self.initialized.store(false, Ordering::SeqCst);
        let Some(handle) = module.take() else {
            // Cached load failure (or a failed earlier unload): forget it so
            // the next attach after this full cycle tries again.
            self.clear_entry_points();
            tracing::debug!(library = %self.library_name, "cleared unavailable binding");
            return false;
        };

        match self.loader.unload(handle) {
            Ok(()) => {
                self.clear_entry_points();
                tracing::info!(library = %self.library_name, "unloaded library");
                true
            }
            Err(err) => {
                self.initialized.store(true, Ordering::SeqCst);
                tracing::warn!(library = %self.library_name, error = %err, "library unload failed");
                false
            }
        }
    }

    /// Attaches and returns a guard that detaches on drop.
    pub fn attachment(&self) -> Attachment<'_, L> {
        let available = self.attach();
        Attachment {
            binding: self,
            available,
        }
    }

    fn initialize(&self) -> Option<L::Handle> {
        let Some(handle) = self.loader.load(&self.library_name) else {
            tracing::warn!(library = %self.library_name, "library unavailable");
            return None;
        };
        tracing::info!(library = %self.library_name, "loaded library");

        for entry in EntryPoint::ALL {
            let address = match self.loader.resolve(&handle, entry.symbol()) {
                Some(address) => {
                    tracing::debug!(symbol = entry.symbol_name(), "resolved entry point");
                    address.as_ptr()
                }
                None => {
                    tracing::warn!(
                        library = %self.library_name,
                        symbol = entry.symbol_name(),
                        "entry point missing"
                    );
                    ptr::null_mut()
                }
            };
            self.entry_points[entry.index()].store(address, Ordering::Release);
        }
        Some(handle)
    }

    fn clear_entry_points(&self) {
        for slot in &self.entry_points {
            slot.store(ptr::null_mut(), Ordering::Release);
        }
    }

    fn lock_module(&self) -> MutexGuard<'_, Option<L::Handle>> {
        self.module.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reference_count(&self) -> isize {
        match self.references.load(Ordering::SeqCst) {
            count if count < 0 => count - TEARING_DOWN,
            count => count,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_loaded(&self) -> bool {
        self.lock_module().is_some()
    }

    pub fn is_bound(&self, entry: EntryPoint) -> bool {
        !self.entry_points[entry.index()]
            .load(Ordering::Acquire)
            .is_null()
    }

    /// True when every entry point is bound.
    pub fn is_available(&self) -> bool {
        EntryPoint::ALL.iter().all(|entry| self.is_bound(*entry))
    }

    pub fn snapshot(&self) -> BindingSnapshot {
        BindingSnapshot {
            library: self.library_name.clone(),
            references: self.reference_count(),
            initialized: self.is_initialized(),
            loaded: self.is_loaded(),
            available: self.is_available(),
            entry_points: EntryPoint::ALL
                .iter()
                .map(|entry| EntrySnapshot {
                    symbol: entry.symbol_name(),
                    bound: self.is_bound(*entry),
                })
                .collect(),
        }
    }

    fn entry_address(&self, entry: EntryPoint) -> *mut c_void {
        let address = self.entry_points[entry.index()].load(Ordering::Acquire);
        assert!(
            self.initialized.load(Ordering::Acquire) && !address.is_null(),
            "{entry} called before a successful attach"
        );
        address
    }

    /// # Safety
    /// Pointer arguments must satisfy the contract of `PdhOpenQueryA`.
    pub unsafe fn open_query(
        &self,
        data_source: *const c_char,
        user_data: DWORD_PTR,
        query: *mut PDH_HQUERY,
    ) -> PDH_STATUS {
        let address = self.entry_address(EntryPoint::OpenQuery);
        // SAFETY: the slot holds the resolved `PdhOpenQueryA` export.
        let open: PdhOpenQueryFn = unsafe { mem::transmute(address) };
        unsafe { open(data_source, user_data, query) }
    }

    /// # Safety
    /// `query` must be a handle returned by `open_query`.
    pub unsafe fn close_query(&self, query: PDH_HQUERY) -> PDH_STATUS {
        let address = self.entry_address(EntryPoint::CloseQuery);
        let close: PdhCloseQueryFn = unsafe { mem::transmute(address) };
        unsafe { close(query) }
    }

    /// # Safety
    /// `query` must be a handle returned by `open_query`.
    pub unsafe fn collect_query_data(&self, query: PDH_HQUERY) -> PDH_STATUS {
        let address = self.entry_address(EntryPoint::CollectQueryData);
        let collect: PdhCollectQueryDataFn = unsafe { mem::transmute(address) };
        unsafe { collect(query) }
    }

    /// # Safety
    /// Pointer arguments must satisfy the contract of `PdhAddCounterA`.
    pub unsafe fn add_counter(
        &self,
        query: PDH_HQUERY,
        full_counter_path: *const c_char,
        user_data: DWORD_PTR,
        counter: *mut PDH_HCOUNTER,
    ) -> PDH_STATUS {
        let address = self.entry_address(EntryPoint::AddCounter);
        let add: PdhAddCounterFn = unsafe { mem::transmute(address) };
        unsafe { add(query, full_counter_path, user_data, counter) }
    }

    /// # Safety
    /// `counter` must be a handle returned by `add_counter`.
    pub unsafe fn remove_counter(&self, counter: PDH_HCOUNTER) -> PDH_STATUS {
        let address = self.entry_address(EntryPoint::RemoveCounter);
        let remove: PdhRemoveCounterFn = unsafe { mem::transmute(address) };
        unsafe { remove(counter) }
    }

    /// # Safety
    /// Pointer arguments must satisfy the contract of `PdhGetFormattedCounterValue`.
    pub unsafe fn get_formatted_counter_value(
        &self,
        counter: PDH_HCOUNTER,
        format: DWORD,
        counter_type: *mut DWORD,
        value: *mut PDH_FMT_COUNTERVALUE,
    ) -> PDH_STATUS {
        let address = self.entry_address(EntryPoint::GetFormattedCounterValue);
        let get: PdhGetFormattedCounterValueFn = unsafe { mem::transmute(address) };
        unsafe { get(counter, format, counter_type, value) }
    }

    /// # Safety
    /// Buffers and their length pointers must satisfy the contract of `PdhEnumObjectItemsA`.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn enum_object_items(
        &self,
        data_source: *const c_char,
        machine_name: *const c_char,
        object_name: *const c_char,
        counter_list: *mut c_char,
        counter_list_len: *mut DWORD,
        instance_list: *mut c_char,
        instance_list_len: *mut DWORD,
        detail_level: DWORD,
        flags: DWORD,
    ) -> PDH_STATUS {
        let address = self.entry_address(EntryPoint::EnumObjectItems);
        let enumerate: PdhEnumObjectItemsFn = unsafe { mem::transmute(address) };
        unsafe {
            enumerate(
                data_source,
                machine_name,
                object_name,
                counter_list,
                counter_list_len,
                instance_list,
                instance_list_len,
                detail_level,
                flags,
            )
        }
    }

    /// # Safety
    /// Buffers must satisfy the contract of `PdhLookupPerfNameByIndexA`.
    pub unsafe fn lookup_perf_name_by_index(
        &self,
        machine_name: *const c_char,
        name_index: DWORD,
        name_buffer: *mut c_char,
        name_buffer_len: *mut DWORD,
    ) -> PDH_STATUS {
        let address = self.entry_address(EntryPoint::LookupPerfNameByIndex);
        let lookup: PdhLookupPerfNameByIndexFn = unsafe { mem::transmute(address) };
        unsafe { lookup(machine_name, name_index, name_buffer, name_buffer_len) }
    }

    /// # Safety
    /// Pointer arguments must satisfy the contract of `PdhMakeCounterPathA`.
    pub unsafe fn make_counter_path(
        &self,
        elements: *mut PDH_COUNTER_PATH_ELEMENTS_A,
        full_path_buffer: *mut c_char,
        buffer_len: *mut DWORD,
        flags: DWORD,
    ) -> PDH_STATUS {
        let address = self.entry_address(EntryPoint::MakeCounterPath);
        let make: PdhMakeCounterPathFn = unsafe { mem::transmute(address) };
        unsafe { make(elements, full_path_buffer, buffer_len, flags) }
    }

    /// # Safety
    /// Pointer arguments must satisfy the contract of `PdhExpandWildCardPathA`.
    pub unsafe fn expand_wildcard_path(
        &self,
        data_source: *const c_char,
        wildcard_path: *const c_char,
        expanded_path_list: *mut c_char,
        path_list_len: *mut DWORD,
        flags: DWORD,
    ) -> PDH_STATUS {
        let address = self.entry_address(EntryPoint::ExpandWildCardPath);
        let expand: PdhExpandWildCardPathFn = unsafe { mem::transmute(address) };
        unsafe { expand(data_source, wildcard_path, expanded_path_list, path_list_len, flags) }
    }
}

/// One attach/detach pair held for the guard's lifetime.
pub struct Attachment<'a, L: LibraryLoader> {
    binding: &'a Binding<L>,
    available: bool,
}

impl<'a, L: LibraryLoader> Attachment<'a, L> {
    pub fn binding(&self) -> &'a Binding<L> {
        self.binding
    }

    /// Result of the underlying `attach`.
    pub fn is_available(&self) -> bool {
        self.available
    }

    pub fn require(self) -> Result<Self, Error> {
        if self.available {
            return Ok(self);
        }
        let missing: Vec<&str> = EntryPoint::ALL
            .iter()
            .filter(|entry| !self.binding.is_bound(**entry))
            .map(|entry| entry.symbol_name())
            .collect();
        let err = Error::new(ErrorKind::Unavailable)
            .with_message(format!("{} is not usable", self.binding.library_name()));
        Err(if missing.len() == EntryPoint::COUNT {
            err.with_hint("The library could not be loaded; it ships with Windows as pdh.dll.")
        } else {
            err.with_hint(format!("Missing entry points: {}.", missing.join(", ")))
        })
    }
}

impl<L: LibraryLoader> Drop for Attachment<'_, L> {
    fn drop(&mut self) {
        self.binding.detach();
    }
}
