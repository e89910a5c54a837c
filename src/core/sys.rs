// Raw ABI of the Performance Data Helper library (ANSI entry points).
#![allow(non_camel_case_types, non_snake_case)]

use std::os::raw::{c_char, c_long, c_void};

pub type DWORD = u32;
pub type DWORD_PTR = usize;
pub type PDH_STATUS = i32;
pub type PDH_HQUERY = *mut c_void;
pub type PDH_HCOUNTER = *mut c_void;

pub const ERROR_SUCCESS: PDH_STATUS = 0;

pub const PDH_CSTATUS_VALID_DATA: DWORD = 0x0000_0000;
pub const PDH_CSTATUS_NEW_DATA: DWORD = 0x0000_0001;
pub const PDH_MORE_DATA: PDH_STATUS = 0x8000_07D2_u32 as PDH_STATUS;
pub const PDH_NO_DATA: PDH_STATUS = 0x8000_07D5_u32 as PDH_STATUS;
pub const PDH_CALC_NEGATIVE_DENOMINATOR: PDH_STATUS = 0x8000_07D6_u32 as PDH_STATUS;
pub const PDH_CALC_NEGATIVE_VALUE: PDH_STATUS = 0x8000_07D8_u32 as PDH_STATUS;
pub const PDH_CSTATUS_NO_OBJECT: PDH_STATUS = 0xC000_0BB8_u32 as PDH_STATUS;
pub const PDH_CSTATUS_NO_COUNTER: PDH_STATUS = 0xC000_0BB9_u32 as PDH_STATUS;
pub const PDH_CSTATUS_INVALID_DATA: PDH_STATUS = 0xC000_0BBA_u32 as PDH_STATUS;
pub const PDH_MEMORY_ALLOCATION_FAILURE: PDH_STATUS = 0xC000_0BBB_u32 as PDH_STATUS;
pub const PDH_INVALID_HANDLE: PDH_STATUS = 0xC000_0BBC_u32 as PDH_STATUS;
pub const PDH_INVALID_ARGUMENT: PDH_STATUS = 0xC000_0BBD_u32 as PDH_STATUS;
pub const PDH_CSTATUS_BAD_COUNTERNAME: PDH_STATUS = 0xC000_0BC0_u32 as PDH_STATUS;
pub const PDH_INSUFFICIENT_BUFFER: PDH_STATUS = 0xC000_0BC2_u32 as PDH_STATUS;
pub const PDH_INVALID_DATA: PDH_STATUS = 0xC000_0BC6_u32 as PDH_STATUS;

pub const PDH_FMT_LONG: DWORD = 0x0000_0100;
pub const PDH_FMT_DOUBLE: DWORD = 0x0000_0200;
pub const PDH_FMT_LARGE: DWORD = 0x0000_0400;
pub const PDH_FMT_NOCAP100: DWORD = 0x0000_8000;

pub const PERF_DETAIL_WIZARD: DWORD = 400;

#[repr(C)]
#[derive(Clone, Copy)]
pub union PDH_FMT_COUNTERVALUE_u {
    pub longValue: c_long,
    pub doubleValue: f64,
    pub largeValue: i64,
    pub AnsiStringValue: *const c_char,
    pub WideStringValue: *const u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct PDH_FMT_COUNTERVALUE {
    pub CStatus: DWORD,
    pub u: PDH_FMT_COUNTERVALUE_u,
}

impl Default for PDH_FMT_COUNTERVALUE {
    fn default() -> Self {
        Self {
            CStatus: 0,
            u: PDH_FMT_COUNTERVALUE_u { largeValue: 0 },
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PDH_COUNTER_PATH_ELEMENTS_A {
    pub szMachineName: *mut c_char,
    pub szObjectName: *mut c_char,
    pub szInstanceName: *mut c_char,
    pub szParentInstance: *mut c_char,
    pub dwInstanceIndex: DWORD,
    pub szCounterName: *mut c_char,
}

pub type PdhOpenQueryFn =
    unsafe extern "system" fn(*const c_char, DWORD_PTR, *mut PDH_HQUERY) -> PDH_STATUS;

pub type PdhCloseQueryFn = unsafe extern "system" fn(PDH_HQUERY) -> PDH_STATUS;

pub type PdhCollectQueryDataFn = unsafe extern "system" fn(PDH_HQUERY) -> PDH_STATUS;

pub type PdhAddCounterFn = unsafe extern "system" fn(
    PDH_HQUERY,
    *const c_char,
    DWORD_PTR,
    *mut PDH_HCOUNTER,
) -> PDH_STATUS;

pub type PdhRemoveCounterFn = unsafe extern "system" fn(PDH_HCOUNTER) -> PDH_STATUS;

pub type PdhGetFormattedCounterValueFn = unsafe extern "system" fn(
    PDH_HCOUNTER,
    DWORD,
    *mut DWORD,
    *mut PDH_FMT_COUNTERVALUE,
) -> PDH_STATUS;

pub type PdhEnumObjectItemsFn = unsafe extern "system" fn(
    *const c_char,
    *const c_char,
    *const c_char,
    *mut c_char,
    *mut DWORD,
    *mut c_char,
    *mut DWORD,
    DWORD,
    DWORD,
) -> PDH_STATUS;

pub type PdhLookupPerfNameByIndexFn =
    unsafe extern "system" fn(*const c_char, DWORD, *mut c_char, *mut DWORD) -> PDH_STATUS;

pub type PdhMakeCounterPathFn = unsafe extern "system" fn(
    *mut PDH_COUNTER_PATH_ELEMENTS_A,
    *mut c_char,
    *mut DWORD,
    DWORD,
) -> PDH_STATUS;

pub type PdhExpandWildCardPathFn = unsafe extern "system" fn(
    *const c_char,
    *const c_char,
    *mut c_char,
    *mut DWORD,
    DWORD,
) -> PDH_STATUS;
