//! Fault-injection plugin used to exercise the host's fault containment:
//! behaves exactly like `hpcsim-demo-pi`, except every 7th event
//! deliberately segfaults partway through instead of producing a result.
//! The crash is genuine (a null-pointer write), not a cooperative throw,
//! so it exercises the same containment path a real plugin bug would.

use std::os::raw::c_void;
use std::sync::atomic::{AtomicU64, Ordering};

use hpcsim_sdk::{QueueResult, RandU01, TResult};

const SAMPLES_PER_EVENT: f64 = 10_000.0;
const CRASH_EVERY: u64 = 7;

static EVENT_COUNTER: AtomicU64 = AtomicU64::new(0);

#[no_mangle]
pub unsafe extern "C" fn EventInit(_pilot_context: *mut c_void, event_context: *mut *mut c_void) -> i32 {
    *event_context = std::ptr::null_mut();
    0
}

#[no_mangle]
pub unsafe extern "C" fn EventRun(_event_context: *mut c_void) -> i32 {
    let event_number = EVENT_COUNTER.fetch_add(1, Ordering::SeqCst) + 1;
    if event_number % CRASH_EVERY == 0 {
        let bad: *mut u8 = std::ptr::null_mut();
        std::ptr::write_volatile(bad, 1);
        unreachable!("crash should have terminated this call before reaching here");
    }

    let mut inside = 0.0f64;
    let mut total = 0.0f64;
    for _ in 0..(SAMPLES_PER_EVENT as u64) {
        let x = RandU01();
        let y = RandU01();
        total += 1.0;
        if x * x + y * y < 1.0 {
            inside += 1.0;
        }
    }

    let mut result = TResult::default();
    result.result[0..8].copy_from_slice(&total.to_ne_bytes());
    result.result[8..16].copy_from_slice(&inside.to_ne_bytes());
    result.result_length = 16;
    QueueResult(&result);
    0
}

#[no_mangle]
pub unsafe extern "C" fn EventClear(_event_context: *mut c_void) {}
