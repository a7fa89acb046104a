//! Network stall notifications.

#[allow(unused_imports)] // docs
use crate::stream::ChunkedStream;

//---------------------------------------------------------------------------------------------------- HaltListener
/// Receives stall notifications from a [`ChunkedStream`].
///
/// A blocking read that has to wait for a chunk calls
/// [`HaltListener::stream_read_halted`] once before waiting, and
/// [`HaltListener::stream_read_resumed`] once when the chunk arrived.
///
/// Both are called from the reading thread, never
/// while the stream holds its internal lock.
pub trait HaltListener: Send + Sync {
	/// Reading stopped, waiting for `chunk`.
	///
	/// `time_ms` is milliseconds since the UNIX epoch.
	fn stream_read_halted(&self, chunk: u32, time_ms: u64);

	/// `chunk` arrived, reading continues.
	///
	/// `time_ms` is milliseconds since the UNIX epoch.
	fn stream_read_resumed(&self, chunk: u32, time_ms: u64);
}
