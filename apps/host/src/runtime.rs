use std::ffi::{c_void, CString};
use std::sync::Arc;

use tracing::{error, info, warn};

use hpcsim_checkpoint::Checkpointer;
use hpcsim_faultshell::{FaultKind, FaultShell, GuardOutcome};
use hpcsim_pipe::{channel, FileWriter, PipeError, ResultSender, ResultSink};
use hpcsim_plugin::{CallbackBinding, PluginHost};
use hpcsim_pool::WorkerPool;
use hpcsim_stream::{Stream, StreamSequencer};

use crate::config::Cli;
use crate::error::HostError;

/// Wraps a raw plugin context pointer so it can cross thread boundaries.
/// Sound because every plugin entry point that reads this pointer is
/// documented (in the original ABI this ports) to tolerate being called
/// from worker threads concurrently with sibling events' calls.
struct SendPtr(*mut c_void);
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}

/// Orchestrates one end-to-end host run: load the plugin, wire the
/// checkpoint scan, the worker pool, and the result pipeline together, and
/// dispatch every event.
pub struct Runtime {
    cli: Cli,
}

impl Runtime {
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Loads the plugin named by `--simulation` from disk, then runs.
    pub fn run(self) -> Result<(), HostError> {
        let plugin = Arc::new(PluginHost::load(&self.cli.simulation)?);
        self.run_with_plugin(plugin)
    }

    /// Runs against an already-constructed plugin, skipping `dlopen`.
    /// Exercised directly by integration tests against an in-process fake
    /// plugin built with [`hpcsim_plugin::PluginHost::from_vtable`].
    pub fn run_with_plugin(self, plugin: Arc<PluginHost>) -> Result<(), HostError> {
        FaultShell::install();

        let threads = self.cli.threads.resolve();
        let reduce_mode = plugin.vtable.reduce_result.is_some();
        info!(
            threads,
            events = self.cli.events,
            first = self.cli.first,
            reduce_mode,
            "starting run"
        );

        let mut sim_context: *mut c_void = std::ptr::null_mut();
        if let Some(f) = plugin.vtable.simulation_init {
            let code = unsafe {
                f(
                    self.cli.pilot as u8,
                    threads as u32,
                    self.cli.events,
                    self.cli.first,
                    &mut sim_context,
                )
            };
            if code != 0 {
                return Err(HostError::PluginInit {
                    stage: "SimulationInit",
                    code,
                });
            }
        }

        let checkpoint = if self.cli.checkpoint && !reduce_mode {
            Checkpointer::scan(&self.cli.output)?
        } else {
            Checkpointer::default()
        };
        if !checkpoint.is_empty() {
            info!(already_done = checkpoint.len(), "resuming from checkpoint");
        }

        let (tx, rx) = channel();

        let consumer_handle = if reduce_mode {
            let plugin_for_consumer = Arc::clone(&plugin);
            let sim_ptr = SendPtr(sim_context);
            let output_path = self.cli.output.clone();
            std::thread::spawn(move || {
                let mut sink = PluginReducer {
                    plugin: plugin_for_consumer,
                    sim_context: sim_ptr,
                    output_path,
                };
                if let Err(err) = hpcsim_pipe::run_consumer(&rx, &mut sink) {
                    error!(error = %err, "reducer consumer failed");
                }
            })
        } else {
            let output_path = self.cli.output.clone();
            let checkpoint_mode = self.cli.checkpoint;
            std::thread::spawn(move || {
                let opened = if checkpoint_mode {
                    FileWriter::open_append(&output_path)
                } else {
                    FileWriter::open_truncate(&output_path)
                };
                match opened {
                    Ok(mut writer) => {
                        if let Err(err) = hpcsim_pipe::run_consumer(&rx, &mut writer) {
                            error!(error = %err, "writer consumer failed");
                        }
                    }
                    Err(err) => error!(error = %err, "failed to open output file"),
                }
            })
        };

        let mut run_context: *mut c_void = std::ptr::null_mut();
        if let Some(f) = plugin.vtable.run_init {
            let code = unsafe { f(sim_context, &mut run_context) };
            if code != 0 {
                return Err(HostError::PluginInit {
                    stage: "RunInit",
                    code,
                });
            }
        }
        let run_ptr = SendPtr(run_context);

        let sequencer = StreamSequencer::new();
        sequencer.skip(self.cli.first);
        let pool = Arc::new(WorkerPool::new(threads)?);

        // Chunk sizes: per-event mode is one pilot per event (chunk size 1,
        // thread creations == events); pilot mode divides `events` into
        // `num_pilots` roughly equal chunks, remainder going one-per-thread
        // to the lowest-indexed pilots, and never creating a pilot with
        // nothing assigned to it.
        let num_pilots = if self.cli.pilot {
            std::cmp::min(threads as u64, self.cli.events)
        } else {
            self.cli.events
        };
        let base_chunk = if num_pilots > 0 { self.cli.events / num_pilots } else { 0 };
        let remainder = if num_pilots > 0 { self.cli.events % num_pilots } else { 0 };

        let mut dispatched = 0u64;
        let mut skipped = 0u64;
        for pilot_index in 0..num_pilots {
            let chunk_len = base_chunk + if pilot_index < remainder { 1 } else { 0 };

            let mut streams = Vec::with_capacity(chunk_len as usize);
            for _ in 0..chunk_len {
                let state = sequencer.take_next();
                let stream = Stream::new(state);
                let digest = stream.digest();

                if checkpoint.already_has(&digest) {
                    skipped += 1;
                } else {
                    dispatched += 1;
                    streams.push(stream);
                }
            }

            let plugin = Arc::clone(&plugin);
            let sender = tx.clone();
            let run_ptr_for_worker = SendPtr(run_ptr.0);
            let pool_for_worker = Arc::clone(&pool);

            WorkerPool::spawn(&pool, move || {
                run_pilot(&plugin, &run_ptr_for_worker, streams, sender, &pool_for_worker);
            })?;
        }
        drop(tx);

        pool.wait_all();

        if let Some(f) = plugin.vtable.run_clear {
            unsafe { f(run_context) };
        }
        plugin.unload(sim_context);

        if consumer_handle.join().is_err() {
            warn!("result consumer thread panicked");
        }

        info!(dispatched, skipped, "run complete");
        Ok(())
    }
}

/// Bridges the result pipeline to a reduce-mode plugin's `ReduceResult`
/// entry point, matching the original's reducer path one record at a time.
struct PluginReducer {
    plugin: Arc<PluginHost>,
    sim_context: SendPtr,
    output_path: std::path::PathBuf,
}

impl ResultSink for PluginReducer {
    /// Guarded so that a crash inside the plugin's own `ReduceResult` drops
    /// only this record rather than ending the consumer loop: the reducer
    /// keeps draining the pipe and later records are still written.
    fn consume(&mut self, record: &hpcsim_record::ResultRecord) -> Result<(), PipeError> {
        let Some(f) = self.plugin.vtable.reduce_result else {
            return Ok(());
        };
        let output_cstr = CString::new(self.output_path.to_string_lossy().as_bytes())
            .unwrap_or_else(|_| CString::new("").expect("empty CString is always valid"));
        let sim_context = self.sim_context.0;
        let id_ptr = record.id().as_ptr();
        let payload_len = record.payload().len() as u32;
        let payload_ptr = record.payload().as_ptr();

        let outcome = FaultShell::guard(std::panic::AssertUnwindSafe(|| unsafe {
            f(
                sim_context,
                output_cstr.as_ptr(),
                id_ptr as *const c_void,
                payload_len,
                payload_ptr as *const c_void,
            )
        }));

        match outcome {
            GuardOutcome::Completed(()) => Ok(()),
            GuardOutcome::Faulted(FaultKind::Signal(sig)) => {
                Err(PipeError::SinkFaulted(format!("signal {sig}")))
            }
            GuardOutcome::Faulted(FaultKind::Panic(msg)) => Err(PipeError::SinkFaulted(msg)),
        }
    }
}

/// One worker's full lifecycle for one pilot's chunk of events: `PilotInit`
/// once, then `EventInit`/a fault-contained `EventRun`/`EventClear` per
/// event, then `PilotClear`. Per-event mode dispatches a chunk of exactly
/// one event per pilot, so this single body serves both dispatch modes.
///
/// The init-lock (held on entry, by `WorkerPool::spawn`) is released right
/// after the first event's `EventInit` — before that event's `EventRun` —
/// and re-acquired before every subsequent event's `EventInit`, preserving
/// "one init at a time" across the whole pool even though a pilot's events
/// all run on the same thread. If the chunk is empty (every event in it was
/// already checkpointed) the lock is released immediately after `PilotInit`
/// since no event will do it.
fn run_pilot(
    plugin: &PluginHost,
    run_ptr: &SendPtr,
    streams: Vec<Stream>,
    sender: ResultSender,
    pool: &WorkerPool,
) {
    let mut pilot_context: *mut c_void = std::ptr::null_mut();
    if let Some(f) = plugin.vtable.pilot_init {
        let code = unsafe { f(run_ptr.0, &mut pilot_context) };
        if code != 0 {
            warn!(code, "PilotInit failed, skipping pilot");
            pool.release_init_lock();
            return;
        }
    }

    if streams.is_empty() {
        pool.release_init_lock();
    }

    for (index, mut stream) in streams.into_iter().enumerate() {
        if index > 0 {
            pool.acquire_init_lock();
        }

        let mut event_context: *mut c_void = std::ptr::null_mut();
        if let Some(f) = plugin.vtable.event_init {
            let code = unsafe { f(pilot_context, &mut event_context) };
            if code != 0 {
                warn!(code, "EventInit failed, skipping event");
                pool.release_init_lock();
                continue;
            }
        }

        pool.release_init_lock();

        let binding = CallbackBinding::bind(&mut stream, sender.clone());
        let event_run = plugin.vtable.event_run;
        let outcome = FaultShell::guard(move || unsafe { event_run(event_context) });
        drop(binding);

        match outcome {
            GuardOutcome::Completed(code) if code != 0 => {
                warn!(code, "EventRun returned a nonzero status");
            }
            GuardOutcome::Completed(_) => {}
            GuardOutcome::Faulted(FaultKind::Signal(sig)) => {
                warn!(signal = sig, "event crashed and was contained; result dropped");
            }
            GuardOutcome::Faulted(FaultKind::Panic(msg)) => {
                warn!(message = %msg, "event panicked and was contained; result dropped");
            }
        }

        if let Some(f) = plugin.vtable.event_clear {
            unsafe { f(event_context) };
        }
    }

    if let Some(f) = plugin.vtable.pilot_clear {
        unsafe { f(pilot_context) };
    }
}
