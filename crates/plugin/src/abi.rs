//! Raw C ABI shapes shared with a loaded plugin: its nine optional entry
//! points and the result record layout it writes into via `QueueResult`.

use std::ffi::{c_char, c_void};

use hpcsim_record::MAX_PAYLOAD_LEN;

/// The wire shape a plugin writes into when it calls `QueueResult`,
/// matching the original ABI's `TResult`. Not to be confused with
/// [`hpcsim_record::ResultRecord`], which is the host-internal, owned
/// representation built from this raw struct once a call returns.
#[repr(C)]
pub struct RawResult {
    /// Overwritten by the host with the producing stream's digest; a
    /// plugin does not need to set this field itself.
    pub id: [u8; 48],
    /// Number of valid bytes in `payload`.
    pub length: u32,
    /// Plugin-defined result bytes.
    pub payload: [u8; MAX_PAYLOAD_LEN],
}

pub type SimulationInitFn =
    unsafe extern "C" fn(is_pilot: u8, n_threads: u32, n_events: u64, first_event: u64, sim_context: *mut *mut c_void) -> i32;
pub type RunInitFn = unsafe extern "C" fn(sim_context: *mut c_void, run_context: *mut *mut c_void) -> i32;
pub type PilotInitFn = unsafe extern "C" fn(run_context: *mut c_void, pilot_context: *mut *mut c_void) -> i32;
pub type EventInitFn = unsafe extern "C" fn(pilot_context: *mut c_void, event_context: *mut *mut c_void) -> i32;
pub type EventRunFn = unsafe extern "C" fn(event_context: *mut c_void) -> i32;
pub type EventClearFn = unsafe extern "C" fn(event_context: *mut c_void);
pub type PilotClearFn = unsafe extern "C" fn(pilot_context: *mut c_void);
pub type ReduceResultFn = unsafe extern "C" fn(
    sim_context: *mut c_void,
    output_file: *const c_char,
    id: *const c_void,
    result_length: u32,
    result: *const c_void,
);
pub type RunClearFn = unsafe extern "C" fn(run_context: *mut c_void);
pub type SimulationUnloadFn = unsafe extern "C" fn(sim_context: *mut c_void);
