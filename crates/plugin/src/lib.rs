//! Dynamic plugin loading and the host-to-plugin callback surface.
//!
//! [`PluginHost`] resolves a plugin's nine optional C entry points via
//! `dlopen`/`dlsym` (through `libloading`); [`RandU01`] and [`QueueResult`]
//! are the two directions back into the host a plugin calls, exported with
//! `#[no_mangle]` so the host binary's own dynamic symbol table satisfies
//! the plugin's undefined references at load time.

pub mod abi;
mod callbacks;
mod host;

pub use abi::RawResult;
pub use callbacks::{CallbackBinding, QueueResult, RandU01};
pub use host::{PluginError, PluginHost, PluginVTable};
