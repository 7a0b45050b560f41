//! Reduce-mode counterpart to `hpcsim-demo-pi`: accumulates each event's
//! `(total, inside)` pair instead of letting the host persist raw records,
//! and prints the final pi estimate when the run unloads.

use std::os::raw::{c_char, c_void};

struct SimContext {
    total: f64,
    inside: f64,
}

#[no_mangle]
pub unsafe extern "C" fn SimulationInit(
    _is_pilot: u8,
    _n_threads: u32,
    _n_events: u64,
    _first_event: u64,
    sim_context: *mut *mut c_void,
) -> i32 {
    let context = Box::new(SimContext {
        total: 0.0,
        inside: 0.0,
    });
    *sim_context = Box::into_raw(context) as *mut c_void;
    0
}

#[no_mangle]
pub unsafe extern "C" fn ReduceResult(
    sim_context: *mut c_void,
    _output_file: *const c_char,
    _id: *const c_void,
    result_length: u32,
    result: *const c_void,
) {
    if result_length as usize != 16 {
        return;
    }
    let context = &mut *(sim_context as *mut SimContext);
    let bytes = std::slice::from_raw_parts(result as *const u8, 16);
    let mut total_bytes = [0u8; 8];
    let mut inside_bytes = [0u8; 8];
    total_bytes.copy_from_slice(&bytes[0..8]);
    inside_bytes.copy_from_slice(&bytes[8..16]);
    context.total += f64::from_ne_bytes(total_bytes);
    context.inside += f64::from_ne_bytes(inside_bytes);
}

#[no_mangle]
pub unsafe extern "C" fn SimulationUnload(sim_context: *mut c_void) {
    let context = Box::from_raw(sim_context as *mut SimContext);
    println!(
        "Pi: {:.6} (with {:.0} samples)",
        4.0 * context.inside / context.total,
        context.total
    );
}
