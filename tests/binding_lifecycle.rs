// Attach/detach lifecycle of a binding driven through a counting stub loader.
mod common;

use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::Ordering;

use common::{CountingLoader, FAKE_QUERY, counting_binding};
use pdhlink::api::EntryPoint;
use pdhlink::api::sys::{ERROR_SUCCESS, PDH_HQUERY, PDH_INVALID_HANDLE};

#[test]
fn repeated_attach_loads_and_resolves_once_per_cycle() {
    let binding = counting_binding(CountingLoader::new());

    for _ in 0..5 {
        assert!(binding.attach());
    }
    assert_eq!(binding.loader().loads(), 1);
    assert_eq!(binding.loader().resolves(), EntryPoint::COUNT);
    assert_eq!(binding.reference_count(), 5);

    for _ in 0..4 {
        assert!(!binding.detach());
    }
    assert!(binding.is_loaded());
    assert!(binding.detach());
    assert_eq!(binding.loader().unloads(), 1);
    assert!(!binding.is_loaded());
    assert!(!binding.is_initialized());
    assert!(EntryPoint::ALL.iter().all(|entry| !binding.is_bound(*entry)));

    // A fresh cycle loads and resolves again.
    assert!(binding.attach());
    assert_eq!(binding.loader().loads(), 2);
    assert_eq!(binding.loader().resolves(), 2 * EntryPoint::COUNT);
    assert!(binding.detach());
    assert_eq!(binding.loader().unloads(), 2);
}

#[test]
fn absent_library_is_unavailable_for_every_caller() {
    let binding = counting_binding(CountingLoader::absent());

    assert!(!binding.attach());
    assert!(!binding.attach());
    assert_eq!(binding.loader().loads(), 1);
    assert_eq!(binding.loader().resolves(), 0);
    assert!(binding.is_initialized());
    assert!(!binding.is_loaded());
    assert!(!binding.is_available());

    assert!(!binding.detach());
    assert!(!binding.detach());
    assert_eq!(binding.loader().unloads(), 0);
    assert_eq!(binding.reference_count(), 0);
}

#[test]
fn cached_load_failure_is_retried_only_after_a_full_cycle() {
    let binding = counting_binding(CountingLoader::absent());

    assert!(!binding.attach());
    assert!(!binding.attach());
    assert!(!binding.detach());
    assert!(!binding.attach());
    assert_eq!(binding.loader().loads(), 1);

    assert!(!binding.detach());
    assert!(!binding.detach());
    assert!(!binding.is_initialized());

    assert!(!binding.attach());
    assert_eq!(binding.loader().loads(), 2);
    assert!(!binding.detach());
}

#[test]
#[should_panic(expected = "PdhOpenQueryA called before a successful attach")]
fn absent_library_makes_proxies_unreachable() {
    let binding = counting_binding(CountingLoader::absent());
    assert!(!binding.attach());
    let mut query: PDH_HQUERY = ptr::null_mut();
    unsafe {
        binding.open_query(ptr::null(), 0, &mut query);
    }
}

#[test]
fn partial_resolution_reports_unavailable_but_bound_proxies_work() {
    let binding = counting_binding(
        CountingLoader::new().missing(&["PdhExpandWildCardPathA", "PdhMakeCounterPathA"]),
    );

    assert!(!binding.attach());
    assert_eq!(binding.loader().resolves(), EntryPoint::COUNT);
    assert!(binding.is_loaded());
    assert!(!binding.is_bound(EntryPoint::ExpandWildCardPath));
    assert!(!binding.is_bound(EntryPoint::MakeCounterPath));
    assert!(binding.is_bound(EntryPoint::CollectQueryData));

    let mut query: PDH_HQUERY = ptr::null_mut();
    unsafe {
        assert_eq!(binding.open_query(ptr::null(), 0, &mut query), ERROR_SUCCESS);
        assert_eq!(query as usize, FAKE_QUERY);
        assert_eq!(binding.collect_query_data(query), ERROR_SUCCESS);
        assert_eq!(binding.collect_query_data(ptr::null_mut()), PDH_INVALID_HANDLE);
        assert_eq!(binding.close_query(query), ERROR_SUCCESS);
    }

    // A partially bound library was loaded, so the last detach unloads it.
    assert!(binding.detach());
    assert_eq!(binding.loader().unloads(), 1);
}

#[test]
#[should_panic(expected = "PdhExpandWildCardPathA called before a successful attach")]
fn partial_resolution_asserts_on_missing_proxy() {
    let binding = counting_binding(CountingLoader::new().missing(&["PdhExpandWildCardPathA"]));
    assert!(!binding.attach());
    let mut len: u32 = 0;
    unsafe {
        binding.expand_wildcard_path(ptr::null(), ptr::null(), ptr::null_mut(), &mut len, 0);
    }
}

#[test]
fn proxy_after_final_detach_asserts() {
    let binding = counting_binding(CountingLoader::new());
    assert!(binding.attach());
    assert!(binding.detach());

    let result = panic::catch_unwind(AssertUnwindSafe(|| unsafe {
        binding.collect_query_data(ptr::null_mut())
    }));
    assert!(result.is_err());
}

#[test]
fn failed_unload_keeps_binding_nominally_loaded() {
    let binding = counting_binding(CountingLoader::new());
    binding.loader().fail_unload.store(true, Ordering::SeqCst);

    assert!(binding.attach());
    assert!(!binding.detach());
    assert_eq!(binding.reference_count(), 0);
    assert!(binding.is_initialized());
    assert!(binding.is_available());

    // Re-attaching reuses the retained table without loading again.
    assert!(binding.attach());
    assert_eq!(binding.loader().loads(), 1);
    assert!(!binding.detach());
}

#[test]
fn attachment_guard_pairs_attach_and_detach() {
    let binding = counting_binding(CountingLoader::new());
    {
        let outer = binding.attachment();
        assert!(outer.is_available());
        {
            let inner = binding.attachment().require().expect("available");
            assert!(inner.is_available());
            assert_eq!(binding.reference_count(), 2);
        }
        assert_eq!(binding.reference_count(), 1);
        assert!(binding.is_loaded());
    }
    assert_eq!(binding.reference_count(), 0);
    assert_eq!(binding.loader().unloads(), 1);
}

#[test]
fn require_explains_missing_entry_points() {
    let binding = counting_binding(CountingLoader::new().missing(&["PdhAddCounterA"]));
    let err = match binding.attachment().require() {
        Ok(_) => panic!("partial binding must not be usable"),
        Err(err) => err,
    };
    assert_eq!(err.kind(), pdhlink::api::ErrorKind::Unavailable);
    assert!(err.hint().expect("hint").contains("PdhAddCounterA"));
    // The failed guard released its reference.
    assert_eq!(binding.reference_count(), 0);
    assert!(!binding.is_loaded());
}

#[test]
fn snapshot_reflects_partial_binding() {
    let binding = counting_binding(CountingLoader::new().missing(&["PdhRemoveCounter"]));
    assert!(!binding.attach());
    let snapshot = binding.snapshot();
    assert_eq!(snapshot.library, "pdh.dll");
    assert!(snapshot.loaded && snapshot.initialized && !snapshot.available);
    let unbound: Vec<&str> = snapshot
        .entry_points
        .iter()
        .filter(|entry| !entry.bound)
        .map(|entry| entry.symbol)
        .collect();
    assert_eq!(unbound, vec!["PdhRemoveCounter"]);

    let value = serde_json::to_value(&snapshot).expect("json");
    assert_eq!(value["references"], 1);
    assert!(binding.detach());
}
