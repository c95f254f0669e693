//! Integration tests: discovery strategies end to end against MockDevice.
//!
//! These drive the public API only: range table in, recognized codes out,
//! with the mock recording every submission for order and count checks.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use ctlprobe_lib::classify::ErrorSignal;
use ctlprobe_lib::code::{Access, ControlCode, Method};
use ctlprobe_lib::device::DeviceError;
use ctlprobe_lib::device::mock::{MockDevice, MockReply, Responder};
use ctlprobe_lib::discovery::{
    DiscoveryError, Scanner, SearchRange, StopReason, discover_by_device_type, scan_range,
};

const DEVICE_TYPE: u16 = 0x8123;

/// Position of the one recognized (method, access) pair for `function`.
fn hit_index(function: u16) -> usize {
    function as usize % 16
}

/// Recognizes exactly one (method, access) pair per function.
fn one_pair_per_function() -> Responder {
    Arc::new(|code: ControlCode| {
        let h = hit_index(code.function());
        if code.method() == Method::ALL[h / 4] && code.access() == Access::ALL[h % 4] {
            MockReply::Signal(ErrorSignal::InvalidParameter)
        } else {
            MockReply::Signal(ErrorSignal::InvalidFunction)
        }
    })
}

fn calls_per_function(dev: &MockDevice) -> BTreeMap<u16, usize> {
    let mut counts = BTreeMap::new();
    for code in dev.calls.borrow().iter() {
        *counts.entry(code.function()).or_insert(0) += 1;
    }
    counts
}

// ── Targeted discovery ──

#[test]
fn early_exit_probes_up_to_first_hit() {
    let dev = MockDevice::from_responder(one_pair_per_function());
    let scanner = Scanner::new().with_ranges(vec![SearchRange::new(0x400, 0x41F)]);
    let result = scanner.discover(&dev, DEVICE_TYPE).unwrap();

    let counts = calls_per_function(&dev);
    assert_eq!(counts.len(), 0x20);
    for (function, probes) in counts {
        assert_eq!(probes, hit_index(function) + 1, "function 0x{function:03X}");
    }

    assert_eq!(result.found.len(), 0x20);
    let functions: BTreeSet<u16> = result.found.iter().map(|o| o.code.function()).collect();
    assert_eq!(functions.len(), 0x20);
    assert!(result.found.iter().all(|o| o.code.device_type() == DEVICE_TYPE));
}

#[test]
fn default_ranges_cover_every_function_once() {
    let dev = MockDevice::with_responder(|_| MockReply::Success(0));
    let result = discover_by_device_type(&dev, 0x22).unwrap();

    // 0x101 + 0x201 + 0x101 + 0x100 functions, first combination always wins.
    assert_eq!(result.found.len(), 0x101 + 0x201 + 0x101 + 0x100);
    assert_eq!(result.probes_issued, result.found.len());
    assert_eq!(
        result.found[0].code,
        ControlCode::new(0x22, 0, Method::Buffered, Access::Any)
    );
    assert_eq!(result.found.last().unwrap().code.function(), 0xFFF);
    assert!(dev.calls.borrow().iter().all(|c| {
        let f = c.function();
        f <= 0x100 || (0x400..=0x600).contains(&f) || (0x800..=0x900).contains(&f) || f >= 0xF00
    }));
}

#[test]
fn ambiguous_signals_are_kept() {
    let dev = MockDevice::with_responder(|code| {
        if code.function() == 2 {
            MockReply::Signal(ErrorSignal::Other(31))
        } else {
            MockReply::Signal(ErrorSignal::NotImplemented)
        }
    });
    let scanner = Scanner::new().with_ranges(vec![SearchRange::new(0, 3)]);
    let result = scanner.discover(&dev, 7).unwrap();
    assert_eq!(result.found.len(), 1);
    assert_eq!(result.found[0].code.function(), 2);
    assert_eq!(result.probes_issued, 3 * 16 + 1);
}

#[test]
fn restricted_methods_and_access() {
    let mut range = SearchRange::new(0x10, 0x11);
    range.methods = vec![Method::Neither];
    range.access = vec![Access::Write, Access::Read];
    let dev = MockDevice::new();
    Scanner::new()
        .with_ranges(vec![range])
        .discover(&dev, 7)
        .unwrap();
    let calls = dev.calls.borrow();
    assert_eq!(
        *calls,
        vec![
            ControlCode::new(7, 0x10, Method::Neither, Access::Write),
            ControlCode::new(7, 0x10, Method::Neither, Access::Read),
            ControlCode::new(7, 0x11, Method::Neither, Access::Write),
            ControlCode::new(7, 0x11, Method::Neither, Access::Read),
        ]
    );
}

// ── Range scan ──

#[test]
fn functions_past_0xfff_are_refused_by_both_strategies() {
    let scanner = Scanner::new().with_ranges(vec![SearchRange::new(0xFFF, 0x1001)]);

    let dev = MockDevice::recognizing(&[ControlCode::new(7, 0, Method::Buffered, Access::Any)]);
    let err = scanner.discover(&dev, 7).unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidRanges(_)));
    // Nothing submitted, so no aliased function-0 hit.
    assert_eq!(dev.call_count(), 0);

    let opened = AtomicUsize::new(0);
    let err = scanner
        .discover_parallel(
            || {
                opened.fetch_add(1, Ordering::Relaxed);
                Ok(MockDevice::new())
            },
            7,
        )
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::InvalidRanges(_)));
    assert!(err.partial().is_none());
    assert_eq!(opened.load(Ordering::Relaxed), 0);
}

#[test]
fn scan_range_is_deterministic() {
    let responder: Responder = Arc::new(|code: ControlCode| match code.raw() % 7 {
        0 => MockReply::Success(8),
        3 => MockReply::Signal(ErrorSignal::AccessDenied),
        5 => MockReply::Signal(ErrorSignal::Other(1117)),
        _ => MockReply::Signal(ErrorSignal::InvalidFunction),
    });
    let first = scan_range(
        &MockDevice::from_responder(responder.clone()),
        ControlCode(0x0022_0000),
        ControlCode(0x0022_0100),
    )
    .unwrap();
    let second = scan_range(
        &MockDevice::from_responder(responder),
        ControlCode(0x0022_0000),
        ControlCode(0x0022_0100),
    )
    .unwrap();
    assert_eq!(first, second);
    assert_eq!(first.probes_issued, 0x101);
    assert!(first.found.windows(2).all(|w| w[0].code < w[1].code));
}

#[test]
fn scan_range_does_not_stop_at_first_hit() {
    let dev = MockDevice::with_responder(|_| MockReply::Success(0));
    let result = scan_range(&dev, ControlCode(100), ControlCode(119)).unwrap();
    assert_eq!(result.found.len(), 20);
    assert_eq!(dev.call_count(), 20);
}

// ── Stop conditions ──

#[test]
fn fatal_error_mid_discovery_returns_partial() {
    let dev = MockDevice::with_responder(|_| MockReply::Success(0));
    dev.fail_after.set(Some(5));
    let err = Scanner::new()
        .with_ranges(vec![SearchRange::new(0, 0x20)])
        .discover(&dev, 7)
        .unwrap_err();
    let DiscoveryError::Aborted { source, partial } = err else {
        panic!("expected an aborted scan, got {err:?}");
    };
    assert!(matches!(source, DeviceError::InvalidHandle));
    assert_eq!(partial.probes_issued, 5);
    assert_eq!(partial.found.len(), 5);
}

#[test]
fn cancellation_mid_scan_marks_result_truncated() {
    let running = Arc::new(AtomicBool::new(true));
    let seen = Arc::new(AtomicUsize::new(0));
    let flag = running.clone();
    let counter = seen.clone();
    let dev = MockDevice::with_responder(move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) + 1 == 10 {
            flag.store(false, Ordering::SeqCst);
        }
        MockReply::Success(0)
    });
    let result = Scanner::new()
        .with_running_flag(&running)
        .scan_range(&dev, ControlCode(0), ControlCode(1000))
        .unwrap();
    assert_eq!(result.stopped, Some(StopReason::Cancelled));
    assert_eq!(result.probes_issued, 10);
    assert_eq!(result.found.len(), 10);
}

#[test]
fn zero_budget_marks_result_truncated() {
    let dev = MockDevice::new();
    let result = Scanner::new()
        .with_budget(Duration::ZERO)
        .discover(&dev, 7)
        .unwrap();
    assert_eq!(result.stopped, Some(StopReason::BudgetExhausted));
    assert_eq!(dev.call_count(), 0);
}

// ── Parallel discovery ──

#[test]
fn parallel_finds_same_functions_as_sequential() {
    let responder = one_pair_per_function();
    let scanner = Scanner::new()
        .with_ranges(vec![SearchRange::new(0x000, 0x03F), SearchRange::new(0x800, 0x80F)])
        .with_workers(4);

    let seq = scanner
        .discover(&MockDevice::from_responder(responder.clone()), DEVICE_TYPE)
        .unwrap();
    let par = scanner
        .discover_parallel(
            || Ok(MockDevice::from_responder(responder.clone())),
            DEVICE_TYPE,
        )
        .unwrap();

    // Only one pair per function is recognized, so the codes match exactly.
    assert_eq!(par.codes(), seq.codes());
    assert!(par.is_complete());
}

#[test]
fn parallel_keeps_at_most_one_hit_per_function() {
    // Every combination is recognized; workers race on each function.
    let responder: Responder = Arc::new(|_| MockReply::Success(0));
    let result = Scanner::new()
        .with_ranges(vec![SearchRange::new(0x100, 0x13F)])
        .with_workers(8)
        .discover_parallel(|| Ok(MockDevice::from_responder(responder.clone())), 0x22)
        .unwrap();

    let functions: Vec<u16> = result.found.iter().map(|o| o.code.function()).collect();
    let unique: BTreeSet<u16> = functions.iter().copied().collect();
    assert_eq!(functions.len(), unique.len());
    assert_eq!(unique.len(), 0x40);
    // Sorted back into candidate order.
    assert!(functions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn parallel_fatal_error_aborts_with_partial() {
    let responder: Responder = Arc::new(|_| MockReply::Signal(ErrorSignal::NotSupported));
    let err = Scanner::new()
        .with_workers(2)
        .discover_parallel(
            || {
                // Every handle dies after a few probes.
                let dev = MockDevice::from_responder(responder.clone());
                dev.fail_after.set(Some(3));
                Ok(dev)
            },
            7,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        DiscoveryError::Aborted {
            source: DeviceError::InvalidHandle,
            ..
        }
    ));
    let partial = err.partial().unwrap();
    assert!(partial.found.is_empty());
    assert!(partial.probes_issued <= 6);
}

#[test]
fn parallel_zero_budget_stops() {
    let responder: Responder = Arc::new(|_| MockReply::Success(0));
    let result = Scanner::new()
        .with_budget(Duration::ZERO)
        .discover_parallel(|| Ok(MockDevice::from_responder(responder.clone())), 7)
        .unwrap();
    assert_eq!(result.stopped, Some(StopReason::BudgetExhausted));
    assert_eq!(result.probes_issued, 0);
}
