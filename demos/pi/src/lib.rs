//! Estimates pi by counting how many of N random points in the unit square
//! fall inside the unit circle, one event per thread-local stream. Each
//! event queues its own `(total, inside)` pair; a separate reducer plugin
//! (or an external pass over the output file) turns those into a final
//! estimate.

use std::os::raw::c_void;

use hpcsim_sdk::{QueueResult, RandU01, TResult};

const SAMPLES_PER_EVENT: f64 = 10_000.0;

#[no_mangle]
pub unsafe extern "C" fn EventInit(_pilot_context: *mut c_void, event_context: *mut *mut c_void) -> i32 {
    *event_context = std::ptr::null_mut();
    0
}

#[no_mangle]
pub unsafe extern "C" fn EventRun(_event_context: *mut c_void) -> i32 {
    let mut inside = 0.0f64;
    let mut total = 0.0f64;
    let samples = SAMPLES_PER_EVENT as u64;
    for _ in 0..samples {
        let x = RandU01();
        let y = RandU01();
        total += 1.0;
        if x * x + y * y < 1.0 {
            inside += 1.0;
        }
    }

    let mut result = TResult::default();
    let total_bytes = total.to_ne_bytes();
    let inside_bytes = inside.to_ne_bytes();
    result.result[0..8].copy_from_slice(&total_bytes);
    result.result[8..16].copy_from_slice(&inside_bytes);
    result.result_length = 16;

    QueueResult(&result);
    0
}

#[no_mangle]
pub unsafe extern "C" fn EventClear(_event_context: *mut c_void) {}
