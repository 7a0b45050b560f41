use std::ffi::c_void;

use libloading::Library;
use thiserror::Error;
use tracing::{debug, info};

use crate::abi::*;

/// Failure modes for loading or invoking a plugin.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The shared object could not be opened.
    #[error("failed to load plugin '{path}': {source}")]
    Load {
        /// Path the host tried to load.
        path: String,
        #[source]
        source: libloading::Error,
    },
    /// The mandatory `EventRun` entry point was not found in the library.
    #[error("plugin is missing the mandatory EventRun entry point")]
    MissingEventRun,
}

/// The nine optional entry points a plugin may export, resolved by symbol
/// name at load time. Only `event_run` is mandatory.
pub struct PluginVTable {
    pub simulation_init: Option<SimulationInitFn>,
    pub run_init: Option<RunInitFn>,
    pub pilot_init: Option<PilotInitFn>,
    pub event_init: Option<EventInitFn>,
    pub event_run: EventRunFn,
    pub event_clear: Option<EventClearFn>,
    pub pilot_clear: Option<PilotClearFn>,
    pub reduce_result: Option<ReduceResultFn>,
    pub run_clear: Option<RunClearFn>,
    pub simulation_unload: Option<SimulationUnloadFn>,
}

/// An open plugin: the loaded library plus its resolved entry points. The
/// `Library` handle must outlive every call through `vtable`, since the
/// function pointers it holds point into the mapped `.so`/`.dylib`. `None`
/// for an in-process fake built with [`PluginHost::from_vtable`], whose
/// function pointers live in the same binary and need no library to stay
/// mapped.
pub struct PluginHost {
    _library: Option<Library>,
    pub vtable: PluginVTable,
}

macro_rules! resolve_optional {
    ($lib:expr, $name:literal, $ty:ty) => {{
        let sym: Result<libloading::Symbol<$ty>, _> = unsafe { $lib.get(concat!($name, "\0").as_bytes()) };
        match sym {
            Ok(s) => {
                debug!(entry = $name, "resolved optional plugin entry point");
                Some(*s)
            }
            Err(_) => None,
        }
    }};
}

impl PluginHost {
    /// Loads a plugin shared object and resolves its entry points.
    /// [`PluginError::MissingEventRun`] is returned if the mandatory
    /// `EventRun` symbol is absent.
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, PluginError> {
        let path_ref = path.as_ref();
        let library = unsafe { Library::new(path_ref) }.map_err(|source| PluginError::Load {
            path: path_ref.display().to_string(),
            source,
        })?;

        let event_run: EventRunFn = {
            let sym: Result<libloading::Symbol<EventRunFn>, _> = unsafe { library.get(b"EventRun\0") };
            match sym {
                Ok(s) => *s,
                Err(_) => return Err(PluginError::MissingEventRun),
            }
        };

        let vtable = PluginVTable {
            simulation_init: resolve_optional!(library, "SimulationInit", SimulationInitFn),
            run_init: resolve_optional!(library, "RunInit", RunInitFn),
            pilot_init: resolve_optional!(library, "PilotInit", PilotInitFn),
            event_init: resolve_optional!(library, "EventInit", EventInitFn),
            event_run,
            event_clear: resolve_optional!(library, "EventClear", EventClearFn),
            pilot_clear: resolve_optional!(library, "PilotClear", PilotClearFn),
            reduce_result: resolve_optional!(library, "ReduceResult", ReduceResultFn),
            run_clear: resolve_optional!(library, "RunClear", RunClearFn),
            simulation_unload: resolve_optional!(library, "SimulationUnload", SimulationUnloadFn),
        };

        info!(path = %path_ref.display(), "loaded plugin");
        Ok(Self {
            _library: Some(library),
            vtable,
        })
    }

    /// Builds a plugin host directly from a vtable, with no backing shared
    /// object. Intended for integration tests that exercise the
    /// orchestrator against a fake, in-process plugin.
    pub fn from_vtable(vtable: PluginVTable) -> Self {
        Self {
            _library: None,
            vtable,
        }
    }

    /// Calls `SimulationUnload` if the plugin exports it. Best-effort
    /// cleanup, called once as the host shuts down.
    pub fn unload(&self, sim_context: *mut c_void) {
        if let Some(f) = self.vtable.simulation_unload {
            unsafe { f(sim_context) };
        }
    }
}
