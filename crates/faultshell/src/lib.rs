//! Process-wide fault containment for plugin code that may crash.
//!
//! A worker thread wraps each call into the plugin (`EventInit`, `EventRun`,
//! ...) in [`FaultShell::guard`]. If the plugin segfaults, divides by zero,
//! or otherwise raises one of the signals this shell watches, a process-wide
//! handler transfers control back to the guard via `sigsetjmp`/`siglongjmp`
//! rather than letting the OS kill the process. A Rust-specific second net,
//! `std::panic::catch_unwind`, catches plugins built as Rust `cdylib`s that
//! panic instead of crashing outright.
//!
//! This mirrors the original exception shell's use of `sigsetjmp`/
//! `siglongjmp` plus a magic-marker `sigqueue` to tell a deliberate throw
//! apart from a genuine fault, with one difference: the "expecting a
//! deliberate throw" bit lives in a thread-local instead of being decoded
//! out of the signal's `si_value`, since only the faulting thread itself
//! ever calls [`FaultShell::raise_fault`] immediately before queuing the
//! signal.

use std::cell::Cell;
use std::ffi::c_void;
use std::sync::Once;

use tracing::{error, warn};

/// The watched signal set: every one a misbehaving plugin could plausibly
/// raise.
const WATCHED_SIGNALS: &[libc::c_int] = &[
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGFPE,
    libc::SIGILL,
    libc::SIGSYS,
    libc::SIGABRT,
    libc::SIGXCPU,
    libc::SIGXFSZ,
];

/// How a guarded call failed to run to completion.
#[derive(Debug, Clone)]
pub enum FaultKind {
    /// A watched signal was caught and contained; carries the signal number.
    Signal(libc::c_int),
    /// The guarded closure panicked; carries the panic message if it could
    /// be recovered as a string.
    Panic(String),
}

/// The result of running a closure inside [`FaultShell::guard`].
pub enum GuardOutcome<T> {
    /// The closure ran to completion.
    Completed(T),
    /// The closure faulted and was contained.
    Faulted(FaultKind),
}

thread_local! {
    static GUARD_ENV: Cell<*mut SigJmpBuf> = const { Cell::new(std::ptr::null_mut()) };
    static IN_GUARD: Cell<bool> = const { Cell::new(false) };
    static EXPECTING_THROW: Cell<bool> = const { Cell::new(false) };
}

// `sigjmp_buf` is an opaque, architecture-sized save area; Rust never reads
// its fields, only passes pointers to it between `sigsetjmp` and
// `siglongjmp`. 256 bytes is comfortably larger than every glibc/musl target
// this crate runs on.
#[repr(align(16))]
struct SigJmpBuf([u8; 256]);

impl SigJmpBuf {
    fn new() -> Self {
        Self([0u8; 256])
    }
}

extern "C" {
    #[link_name = "sigsetjmp"]
    fn sigsetjmp_raw(env: *mut SigJmpBuf, savesigs: libc::c_int) -> libc::c_int;
    #[link_name = "siglongjmp"]
    fn siglongjmp_raw(env: *mut SigJmpBuf, val: libc::c_int) -> !;
}

static INSTALL: Once = Once::new();

/// Installs the process-wide signal handler, and the containment machinery
/// around calls into untrusted plugin code.
pub struct FaultShell;

impl FaultShell {
    /// Installs the signal handler for every watched signal, once per
    /// process. Safe to call repeatedly; only the first call does anything.
    pub fn install() {
        INSTALL.call_once(|| unsafe { install_handlers() });
    }

    /// Runs `f` under fault containment. If `f` returns normally, the
    /// result is [`GuardOutcome::Completed`]. If a watched signal fires or
    /// `f` panics, the result is [`GuardOutcome::Faulted`] describing why.
    pub fn guard<F, T>(f: F) -> GuardOutcome<T>
    where
        F: FnOnce() -> T + std::panic::UnwindSafe,
    {
        Self::install();

        let mut env = SigJmpBuf::new();
        GUARD_ENV.with(|cell| cell.set(&mut env as *mut SigJmpBuf));
        IN_GUARD.with(|cell| cell.set(true));

        // SAFETY: `env` outlives this call; `sigsetjmp_raw` either returns 0
        // here or the signal handler longjmps back into it with a nonzero
        // value, which this same stack frame observes as the `if` branch.
        let jumped = unsafe { sigsetjmp_raw(&mut env as *mut SigJmpBuf, 1) };
        if jumped != 0 {
            IN_GUARD.with(|cell| cell.set(false));
            GUARD_ENV.with(|cell| cell.set(std::ptr::null_mut()));
            return GuardOutcome::Faulted(FaultKind::Signal(jumped));
        }

        let result = std::panic::catch_unwind(f);
        IN_GUARD.with(|cell| cell.set(false));
        GUARD_ENV.with(|cell| cell.set(std::ptr::null_mut()));

        match result {
            Ok(value) => GuardOutcome::Completed(value),
            Err(payload) => GuardOutcome::Faulted(FaultKind::Panic(panic_message(&payload))),
        }
    }

    /// Deliberately raises a contained fault from inside a guarded call,
    /// for testing the containment path itself. Queues `SIGSEGV` tagged
    /// with a marker the handler recognizes as a deliberate throw rather
    /// than a genuine crash, so it skips the backtrace dump.
    pub fn raise_fault() {
        EXPECTING_THROW.with(|cell| cell.set(true));
        unsafe {
            libc::raise(libc::SIGSEGV);
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "plugin panicked with a non-string payload".to_string()
    }
}

unsafe fn install_handlers() {
    let mut action: libc::sigaction = std::mem::zeroed();
    action.sa_sigaction = signal_trampoline as usize;
    action.sa_flags = libc::SA_SIGINFO;
    libc::sigemptyset(&mut action.sa_mask);
    for &sig in WATCHED_SIGNALS {
        if libc::sigaction(sig, &action, std::ptr::null_mut()) != 0 {
            error!(signal = sig, "failed to install fault handler");
        }
    }
}

extern "C" fn signal_trampoline(sig: libc::c_int, _info: *mut libc::siginfo_t, _ctx: *mut c_void) {
    let expecting_throw = EXPECTING_THROW.with(|cell| cell.replace(false));
    let in_guard = IN_GUARD.with(|cell| cell.get());

    if !expecting_throw {
        warn!(signal = sig, in_guard, "plugin raised an unexpected signal");
    }

    if in_guard {
        let env = GUARD_ENV.with(|cell| cell.get());
        if !env.is_null() {
            // SAFETY: `env` was set by the active `guard` call on this
            // thread and is still on its stack; `sig` is always nonzero so
            // the jump target's caller sees a nonzero return from
            // `sigsetjmp_raw`.
            unsafe { siglongjmp_raw(env, sig) };
        }
    }

    // Outside a guard there is no jump target to return to, and the default
    // disposition would just re-execute the faulting instruction. Terminate
    // now rather than loop; `_exit` skips unwinding and atexit handlers,
    // which is correct after an async-signal-unsafe `warn!` above.
    unsafe { libc::_exit(128 + sig) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_closure_returns_its_value() {
        let outcome = FaultShell::guard(|| 42);
        match outcome {
            GuardOutcome::Completed(v) => assert_eq!(v, 42),
            GuardOutcome::Faulted(_) => panic!("expected completion"),
        }
    }

    #[test]
    fn panicking_closure_is_contained() {
        let outcome = FaultShell::guard(|| -> i32 { panic!("boom") });
        match outcome {
            GuardOutcome::Faulted(FaultKind::Panic(msg)) => assert_eq!(msg, "boom"),
            _ => panic!("expected a contained panic"),
        }
    }

    #[test]
    fn raised_fault_is_contained_and_marked_deliberate() {
        let outcome: GuardOutcome<()> = FaultShell::guard(|| {
            FaultShell::raise_fault();
            unreachable!("control should not return here");
        });
        assert!(matches!(
            outcome,
            GuardOutcome::Faulted(FaultKind::Signal(sig)) if sig == libc::SIGSEGV
        ));
    }
}
