//! Host-side callbacks exposed TO the plugin: `RandU01` and `QueueResult`.
//!
//! A plugin is linked against nothing but its own headers — it calls these
//! by name, resolved at `dlopen` time against the host *executable's* own
//! dynamic symbol table, which is why the host binary must be linked with
//! `--export-dynamic`. Rust has no notion of "the current thread's active
//! stream" on its own, so this module keeps it in a thread-local, set by
//! [`CallbackBinding::bind`] right before the worker calls into the plugin
//! and cleared when the binding drops.

use std::cell::RefCell;

use hpcsim_pipe::ResultSender;
use hpcsim_record::ResultRecord;
use hpcsim_stream::Stream;

use crate::abi::RawResult;

thread_local! {
    static CURRENT_STREAM: RefCell<Option<*mut Stream>> = const { RefCell::new(None) };
    static CURRENT_SENDER: RefCell<Option<ResultSender>> = const { RefCell::new(None) };
}

/// Binds the calling thread's active stream and result sender for the
/// duration of one plugin call, clearing both when dropped. A worker holds
/// one of these across each `EventInit`/`EventRun`/`EventClear` triple.
pub struct CallbackBinding;

impl CallbackBinding {
    /// `stream` must remain valid and must not be mutated from anywhere
    /// else for as long as this binding is alive; the worker thread that
    /// creates the binding owns the stream exclusively for that duration.
    pub fn bind(stream: &mut Stream, sender: ResultSender) -> Self {
        CURRENT_STREAM.with(|cell| *cell.borrow_mut() = Some(stream as *mut Stream));
        CURRENT_SENDER.with(|cell| *cell.borrow_mut() = Some(sender));
        Self
    }
}

impl Drop for CallbackBinding {
    fn drop(&mut self) {
        CURRENT_STREAM.with(|cell| *cell.borrow_mut() = None);
        CURRENT_SENDER.with(|cell| *cell.borrow_mut() = None);
    }
}

/// Exported to the dynamic symbol table so a loaded plugin's `RandU01()`
/// call resolves here. Draws the next uniform value from the calling
/// worker's currently bound stream.
///
/// # Safety
/// Must only be called from a thread with an active [`CallbackBinding`];
/// calling it otherwise aborts the process rather than returning garbage,
/// since a silently wrong random stream would corrupt determinism in a way
/// nothing downstream could detect.
#[no_mangle]
pub unsafe extern "C" fn RandU01() -> f64 {
    let stream_ptr = CURRENT_STREAM.with(|cell| *cell.borrow());
    match stream_ptr {
        Some(ptr) => (*ptr).draw(),
        None => {
            tracing::error!("RandU01 called with no bound stream on this thread");
            std::process::abort();
        }
    }
}

/// Exported to the dynamic symbol table so a loaded plugin's
/// `QueueResult(result)` call resolves here. Stamps the record's `id` with
/// the calling worker's bound stream digest and forwards it to the bound
/// sender. A malformed or out-of-binding call is dropped rather than
/// aborting: unlike a bad random draw, a dropped result is locally visible
/// (the output simply has one fewer record) and does not propagate silent
/// corruption.
///
/// # Safety
/// `result` must point to a valid, initialized [`RawResult`] with `length`
/// no greater than its `payload` buffer.
#[no_mangle]
pub unsafe extern "C" fn QueueResult(result: *const RawResult) {
    if result.is_null() {
        tracing::warn!("QueueResult called with a null result pointer");
        return;
    }
    let raw = &*result;
    let length = raw.length as usize;
    if length > raw.payload.len() {
        tracing::warn!(length, "QueueResult called with an out-of-range length");
        return;
    }

    let digest = CURRENT_STREAM.with(|cell| cell.borrow().map(|ptr| (*ptr).digest()));
    let Some(digest) = digest else {
        tracing::warn!("QueueResult called with no bound stream on this thread");
        return;
    };

    let payload = raw.payload[..length].to_vec();
    let record = match ResultRecord::new(digest, payload) {
        Ok(record) => record,
        Err(err) => {
            tracing::warn!(error = %err, "dropping malformed result record");
            return;
        }
    };

    CURRENT_SENDER.with(|cell| {
        if let Some(sender) = cell.borrow().as_ref() {
            if sender.send(record).is_err() {
                tracing::warn!("result consumer has already closed its receiver");
            }
        } else {
            tracing::warn!("QueueResult called with no bound sender on this thread");
        }
    });
}
