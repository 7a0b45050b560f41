use thiserror::Error;

/// Top-level failure modes for a host run, mapped to process exit codes in
/// `main`.
#[derive(Debug, Error)]
pub enum HostError {
    /// The plugin could not be loaded or is missing `EventRun`.
    #[error("plugin load failed: {0}")]
    PluginLoad(#[from] hpcsim_plugin::PluginError),

    /// A plugin init entry point (`SimulationInit`, `RunInit`, ...)
    /// returned a nonzero status.
    #[error("plugin initialization failed in {stage} (returned {code})")]
    PluginInit { stage: &'static str, code: i32 },

    /// The worker pool could not be created.
    #[error("worker pool error: {0}")]
    Pool(#[from] hpcsim_pool::PoolError),

    /// Scanning an existing output file for checkpoint-resume failed.
    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] hpcsim_checkpoint::CheckpointError),

    /// Opening or writing the output file failed.
    #[error("i/o error: {0}")]
    Io(#[from] hpcsim_pipe::PipeError),
}

impl HostError {
    /// Exit code to return from `main` for this failure, matching the
    /// disposition a configuration, plugin, or I/O error gets versus an
    /// internal invariant violation (which panics instead of reaching
    /// here).
    pub fn exit_code(&self) -> i32 {
        match self {
            HostError::PluginLoad(_) | HostError::PluginInit { .. } => 2,
            HostError::Pool(_) => 3,
            HostError::Checkpoint(_) | HostError::Io(_) => 4,
        }
    }
}
