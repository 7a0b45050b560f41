//! MRG32k3a combined multiple-recursive generator and the process-wide
//! sequencer that hands out non-overlapping substreams.
//!
//! This is a direct port of L'Ecuyer's public-domain `RngStream`: same
//! moduli, same jump-ahead matrices, same recurrence. What changes from the
//! original is ownership — there, a stream was a heap object a caller held
//! a pointer to; here, [`Stream`] is a plain value type and
//! [`StreamSequencer`] is the only thing that knows how to mint new ones.

pub mod math;
mod sequencer;
mod stream;

pub use sequencer::StreamSequencer;
pub use stream::Stream;
