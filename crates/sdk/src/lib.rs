//! Plugin-author-facing ABI declarations, mirroring the original project's
//! `SDK/simulation.h`. A plugin crate depends on this and nothing else from
//! the host workspace: it is compiled and linked independently, and meets
//! the host only through the C calling convention at `dlopen` time.

use std::os::raw::c_void;

pub use hpcsim_record::{ID_LEN, MAX_PAYLOAD_LEN};

/// The result buffer a plugin fills in and passes to [`QueueResult`].
/// Layout-compatible with the host's internal `RawResult`.
#[repr(C)]
pub struct TResult {
    /// Overwritten by the host after the call returns; a plugin does not
    /// need to populate this.
    pub id: [u8; ID_LEN],
    /// Number of valid bytes in `result`.
    pub result_length: u32,
    /// Plugin-defined payload.
    pub result: [u8; MAX_PAYLOAD_LEN],
}

impl Default for TResult {
    fn default() -> Self {
        Self {
            id: [0u8; ID_LEN],
            result_length: 0,
            result: [0u8; MAX_PAYLOAD_LEN],
        }
    }
}

#[allow(non_snake_case)]
extern "C" {
    /// Draws the next U(0,1) value from the calling worker's current
    /// stream. Resolved against the host executable at load time.
    pub fn RandU01() -> f64;

    /// Hands a completed result to the host. Resolved against the host
    /// executable at load time.
    pub fn QueueResult(result: *const TResult);
}

/// Optional entry points a plugin may define. A plugin crate exports the
/// ones it needs with `#[no_mangle] pub extern "C" fn`; the host resolves
/// each by name and treats a missing symbol as "not implemented",
/// except `EventRun`, which is mandatory.
pub mod entry_points {
    use super::*;

    pub type SimulationInit = unsafe extern "C" fn(u8, u32, u64, u64, *mut *mut c_void) -> i32;
    pub type RunInit = unsafe extern "C" fn(*mut c_void, *mut *mut c_void) -> i32;
    pub type PilotInit = unsafe extern "C" fn(*mut c_void, *mut *mut c_void) -> i32;
    pub type EventInit = unsafe extern "C" fn(*mut c_void, *mut *mut c_void) -> i32;
    pub type EventRun = unsafe extern "C" fn(*mut c_void) -> i32;
    pub type EventClear = unsafe extern "C" fn(*mut c_void);
    pub type PilotClear = unsafe extern "C" fn(*mut c_void);
    pub type ReduceResult =
        unsafe extern "C" fn(*mut c_void, *const std::os::raw::c_char, *const c_void, u32, *const c_void);
    pub type RunClear = unsafe extern "C" fn(*mut c_void);
    pub type SimulationUnload = unsafe extern "C" fn(*mut c_void);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tresult_default_is_zeroed_and_empty() {
        let result = TResult::default();
        assert_eq!(result.result_length, 0);
        assert_eq!(result.id, [0u8; ID_LEN]);
    }
}
