//! Purpose: Name the closed set of library entry points the binding requires.
//! Exports: `EntryPoint`.
//! Role: Index into the binding's dispatch table and source of exported symbol names.
//! Invariants: `EntryPoint::ALL` lists every variant exactly once, in `index()` order.
//! Invariants: Symbol names use the ANSI (`A`-suffixed) export where the library has one.
use std::ffi::CStr;
use std::fmt;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum EntryPoint {
    OpenQuery,
    CloseQuery,
    CollectQueryData,
    AddCounter,
    RemoveCounter,
    GetFormattedCounterValue,
    EnumObjectItems,
    LookupPerfNameByIndex,
    MakeCounterPath,
    ExpandWildCardPath,
}

impl EntryPoint {
    pub const COUNT: usize = 10;

    pub const ALL: [EntryPoint; EntryPoint::COUNT] = [
        EntryPoint::OpenQuery,
        EntryPoint::CloseQuery,
        EntryPoint::CollectQueryData,
        EntryPoint::AddCounter,
        EntryPoint::RemoveCounter,
        EntryPoint::GetFormattedCounterValue,
        EntryPoint::EnumObjectItems,
        EntryPoint::LookupPerfNameByIndex,
        EntryPoint::MakeCounterPath,
        EntryPoint::ExpandWildCardPath,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Exported symbol name, NUL-terminated for the loader.
    pub fn symbol(self) -> &'static CStr {
        match self {
            EntryPoint::OpenQuery => c"PdhOpenQueryA",
            EntryPoint::CloseQuery => c"PdhCloseQuery",
            EntryPoint::CollectQueryData => c"PdhCollectQueryData",
            EntryPoint::AddCounter => c"PdhAddCounterA",
            EntryPoint::RemoveCounter => c"PdhRemoveCounter",
            EntryPoint::GetFormattedCounterValue => c"PdhGetFormattedCounterValue",
            EntryPoint::EnumObjectItems => c"PdhEnumObjectItemsA",
            EntryPoint::LookupPerfNameByIndex => c"PdhLookupPerfNameByIndexA",
            EntryPoint::MakeCounterPath => c"PdhMakeCounterPathA",
            EntryPoint::ExpandWildCardPath => c"PdhExpandWildCardPathA",
        }
    }

    pub fn symbol_name(self) -> &'static str {
        // Symbol literals are ASCII.
        self.symbol().to_str().unwrap_or("")
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol_name())
    }
}
