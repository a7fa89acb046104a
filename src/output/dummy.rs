//! An output that plays nothing, in real-time.
//!
//! Writes block like a real device would: once more than the
//! buffer is queued, [`DummyOutput::write`] sleeps until the
//! excess has "played".

//----------------------------------------------------------------------------------------------- use
use std::time::{Duration,Instant};
use crate::{
	error::OutputError,
	macros::trace2,
	mixer::{OutputFormat,Volume},
	output::AudioOutput,
};

//----------------------------------------------------------------------------------------------- DummyOutput
/// Discards audio at the speed it would have been played.
#[derive(Debug)]
pub struct DummyOutput {
	format: OutputFormat,
	buffer: Duration,
	/// When the current run of writes started, `None` while paused.
	started: Option<Instant>,
	/// Milliseconds written since `started`.
	written_ms: u64,
	/// Leftover bytes smaller than a millisecond.
	remainder: usize,
	volume: Volume,
}

impl DummyOutput {
	#[cold]
	#[inline(never)]
	/// A dummy output for `format` that "buffers" `buffer_ms`.
	pub fn new(format: OutputFormat, buffer_ms: u32) -> Self {
		Self {
			format,
			buffer: Duration::from_millis(u64::from(buffer_ms)),
			started: Some(Instant::now()),
			written_ms: 0,
			remainder: 0,
			volume: Volume::DEFAULT,
		}
	}

	/// The volume last set.
	pub const fn volume(&self) -> Volume {
		self.volume
	}
}

impl AudioOutput for DummyOutput {
	fn write(&mut self, data: &[u8]) -> Result<(), OutputError> {
		let started = *self.started.get_or_insert_with(Instant::now);

		let bytes = self.remainder + data.len();
		let per_ms = std::cmp::max(self.format.bytes_for_millis(1), 1);
		self.written_ms += (bytes / per_ms) as u64;
		self.remainder = bytes % per_ms;

		let played = started.elapsed();
		let queued = Duration::from_millis(self.written_ms).saturating_sub(played);
		if queued > self.buffer {
			let sleep = queued - self.buffer;
			trace2!("DummyOutput - sleeping {sleep:?}");
			std::thread::sleep(sleep);
		}
		Ok(())
	}

	fn drain(&mut self) -> Result<(), OutputError> {
		if let Some(started) = self.started {
			let queued = Duration::from_millis(self.written_ms).saturating_sub(started.elapsed());
			std::thread::sleep(queued);
		}
		Ok(())
	}

	fn format(&self) -> OutputFormat {
		self.format
	}

	fn name(&self) -> &'static str {
		"dummy"
	}

	fn play(&mut self) -> Result<(), OutputError> {
		if self.started.is_none() {
			self.started = Some(Instant::now());
		}
		Ok(())
	}

	fn pause(&mut self) -> Result<(), OutputError> {
		self.started = None;
		self.written_ms = 0;
		self.remainder = 0;
		Ok(())
	}

	fn set_volume(&mut self, volume: Volume) -> bool {
		self.volume = volume;
		true
	}
}
