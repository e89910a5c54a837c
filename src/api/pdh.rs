//! Purpose: Process-wide PDH facade shared by every call site in the host process.
//! Exports: `configure`, `binding`, `attach`, `detach`, `attachment`, one proxy per entry point.
//! Role: Owns the single `Binding<SystemLoader>`; created lazily, never destroyed.
//! Invariants: Configuration is fixed before the binding is first touched.
//! Invariants: Proxies require a prior successful `attach` (asserted, not reported).
use std::os::raw::c_char;
use std::sync::{LazyLock, OnceLock};

use crate::api::config::BindingConfig;
use crate::core::binding::{Attachment, Binding};
use crate::core::error::{Error, ErrorKind};
use crate::core::loader::SystemLoader;
use crate::core::sys::{
    DWORD, DWORD_PTR, PDH_COUNTER_PATH_ELEMENTS_A, PDH_FMT_COUNTERVALUE, PDH_HCOUNTER,
    PDH_HQUERY, PDH_STATUS,
};

pub use crate::core::status::is_failure_status;

static CONFIG: OnceLock<BindingConfig> = OnceLock::new();

static PDH: LazyLock<Binding<SystemLoader>> = LazyLock::new(|| {
    let config = CONFIG.get_or_init(BindingConfig::from_env);
    Binding::new(SystemLoader, config.library.clone())
});

/// Chooses the library for the process-wide binding.
///
/// Fails once the binding has been configured, either explicitly or by
/// first use falling back to `BindingConfig::from_env`.
pub fn configure(config: BindingConfig) -> Result<(), Error> {
    CONFIG.set(config).map_err(|_| {
        Error::new(ErrorKind::Usage)
            .with_message("pdh binding is already configured")
            .with_hint("Call `pdh::configure` before the first attach.")
    })
}

pub fn binding() -> &'static Binding<SystemLoader> {
    &PDH
}

pub fn attach() -> bool {
    PDH.attach()
}

pub fn detach() -> bool {
    PDH.detach()
}

pub fn attachment() -> Attachment<'static, SystemLoader> {
    PDH.attachment()
}

/// # Safety
/// See [`Binding::open_query`].
pub unsafe fn open_query(
    data_source: *const c_char,
    user_data: DWORD_PTR,
    query: *mut PDH_HQUERY,
) -> PDH_STATUS {
    unsafe { PDH.open_query(data_source, user_data, query) }
}

/// # Safety
/// See [`Binding::close_query`].
pub unsafe fn close_query(query: PDH_HQUERY) -> PDH_STATUS {
    unsafe { PDH.close_query(query) }
}

/// # Safety
/// See [`Binding::collect_query_data`].
pub unsafe fn collect_query_data(query: PDH_HQUERY) -> PDH_STATUS {
    unsafe { PDH.collect_query_data(query) }
}

/// # Safety
/// See [`Binding::add_counter`].
pub unsafe fn add_counter(
    query: PDH_HQUERY,
    full_counter_path: *const c_char,
    user_data: DWORD_PTR,
    counter: *mut PDH_HCOUNTER,
) -> PDH_STATUS {
    unsafe { PDH.add_counter(query, full_counter_path, user_data, counter) }
}

/// # Safety
/// See [`Binding::remove_counter`].
pub unsafe fn remove_counter(counter: PDH_HCOUNTER) -> PDH_STATUS {
    unsafe { PDH.remove_counter(counter) }
}

/// # Safety
/// See [`Binding::get_formatted_counter_value`].
pub unsafe fn get_formatted_counter_value(
    counter: PDH_HCOUNTER,
    format: DWORD,
    counter_type: *mut DWORD,
    value: *mut PDH_FMT_COUNTERVALUE,
) -> PDH_STATUS {
    unsafe { PDH.get_formatted_counter_value(counter, format, counter_type, value) }
}

/// # Safety
/// See [`Binding::enum_object_items`].
#[allow(clippy::too_many_arguments)]
pub unsafe fn enum_object_items(
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
    unsafe {
        PDH.enum_object_items(
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
/// See [`Binding::lookup_perf_name_by_index`].
pub unsafe fn lookup_perf_name_by_index(
    machine_name: *const c_char,
    name_index: DWORD,
    name_buffer: *mut c_char,
    name_buffer_len: *mut DWORD,
) -> PDH_STATUS {
    unsafe { PDH.lookup_perf_name_by_index(machine_name, name_index, name_buffer, name_buffer_len) }
}

/// # Safety
/// See [`Binding::make_counter_path`].
pub unsafe fn make_counter_path(
    elements: *mut PDH_COUNTER_PATH_ELEMENTS_A,
    full_path_buffer: *mut c_char,
    buffer_len: *mut DWORD,
    flags: DWORD,
) -> PDH_STATUS {
    unsafe { PDH.make_counter_path(elements, full_path_buffer, buffer_len, flags) }
}

/// # Safety
/// See [`Binding::expand_wildcard_path`].
pub unsafe fn expand_wildcard_path(
    data_source: *const c_char,
    wildcard_path: *const c_char,
    expanded_path_list: *mut c_char,
    path_list_len: *mut DWORD,
    flags: DWORD,
) -> PDH_STATUS {
    unsafe {
        PDH.expand_wildcard_path(data_source, wildcard_path, expanded_path_list, path_list_len, flags)
    }
}
