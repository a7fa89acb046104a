//! The audio sink thread: mixing line -> output.

//---------------------------------------------------------------------------------------------------- Use
use std::{
	sync::{Arc,Mutex},
	thread::JoinHandle,
	time::Duration,
};
use crossbeam::channel::{Receiver,Sender,TryRecvError};
use crate::{
	config::WAIT_SLICE,
	error::OutputError,
	macros::{debug2,error2,info2,send,trace2,try_send,warn2},
	mixer::{MixingLine,OutputFormat,Volume},
	output::AudioOutput,
};

//---------------------------------------------------------------------------------------------------- Constants
/// Bytes mixed per output write.
const BLOCK_LEN: usize = 16 * 1024;

/// Idle sleep when no port is enabled.
const IDLE: Duration = Duration::from_millis(10);

//---------------------------------------------------------------------------------------------------- Types
/// Opens an output for a line format, called on the sink thread.
pub type OutputOpener = Box<dyn FnMut(OutputFormat) -> Result<Box<dyn AudioOutput>, OutputError> + Send>;

#[derive(Copy,Clone,Debug,PartialEq)]
enum Msg {
	Pause,
	Resume,
	Volume(Volume),
	Shutdown,
}

//---------------------------------------------------------------------------------------------------- AudioSink
/// Pulls mixed audio from a [`MixingLine`] and writes it to an [`AudioOutput`].
///
/// The output is opened lazily on the first audio (and
/// re-opened when the line format switches). On a write error the
/// sink drops the output, pauses itself and reports the error.
#[derive(Debug)]
pub struct AudioSink {
	sender: Sender<Msg>,
	handle: Mutex<Option<JoinHandle<()>>>,
}

struct Sink {
	line: Arc<MixingLine>,
	opener: OutputOpener,
	output: Option<Box<dyn AudioOutput>>,
	errors: Sender<OutputError>,
	volume: Volume,
	paused: bool,
}

impl AudioSink {
	#[cold]
	#[inline(never)]
	/// Spawn the `AudioSink` thread.
	///
	/// Output errors are sent to `errors`.
	///
	/// # Errors
	/// The thread could not be spawned.
	pub fn spawn(
		line: Arc<MixingLine>,
		opener: OutputOpener,
		volume: Volume,
		errors: Sender<OutputError>,
	) -> Result<Self, std::io::Error> {
		let (sender, receiver) = crossbeam::channel::unbounded();

		// Outputs are not `Send`, the `Sink` is built on its own thread.
		let handle = std::thread::Builder::new()
			.name("AudioSink".into())
			.spawn(move || {
				let sink = Sink {
					line,
					opener,
					output: None,
					errors,
					volume,
					paused: false,
				};
				Sink::main(sink, &receiver);
			})?;

		Ok(Self {
			sender,
			handle: Mutex::new(Some(handle)),
		})
	}

	/// Stop pulling audio and pause the output.
	pub fn pause(&self) {
		send!(self.sender, Msg::Pause);
	}

	/// Undo [`Self::pause`], also after an output error.
	pub fn resume(&self) {
		send!(self.sender, Msg::Resume);
	}

	/// Set the output volume.
	pub fn set_volume(&self, volume: Volume) {
		send!(self.sender, Msg::Volume(volume));
	}

	/// Stop the thread, optionally waiting for it.
	///
	/// Idempotent.
	pub fn shutdown(&self, blocking: bool) {
		send!(self.sender, Msg::Shutdown);
		let handle = self.handle.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
		if let (true, Some(handle)) = (blocking, handle) {
			drop(handle.join());
		}
	}
}

impl Drop for AudioSink {
	fn drop(&mut self) {
		send!(self.sender, Msg::Shutdown);
	}
}

//---------------------------------------------------------------------------------------------------- Sink
impl Sink {
	#[cold]
	#[inline(never)]
	fn main(mut self, receiver: &Receiver<Msg>) {
		debug2!("AudioSink - main()");
		let _priority = Self::promote(self.line.format());
		self.apply_volume();

		let mut buf = vec![0; BLOCK_LEN];
		loop {
			// Drain commands, hang on them while paused.
			loop {
				let msg = if self.paused {
					match receiver.recv_timeout(WAIT_SLICE) {
						Ok(msg) => msg,
						Err(crossbeam::channel::RecvTimeoutError::Timeout) => continue,
						Err(crossbeam::channel::RecvTimeoutError::Disconnected) => return self.exit(),
					}
				} else {
					match receiver.try_recv() {
						Ok(msg) => msg,
						Err(TryRecvError::Empty) => break,
						Err(TryRecvError::Disconnected) => return self.exit(),
					}
				};

				if !self.handle(msg) {
					return self.exit();
				}
			}

			if self.line.take_format_changed() {
				info2!("AudioSink - line format changed, re-opening output");
				self.output = None;
			}

			// Open before mixing, the volume decides the gain of the mix.
			if self.output.is_none() {
				if !self.line.has_audio() {
					std::thread::sleep(IDLE);
					continue;
				}
				if !self.open() {
					continue;
				}
			}

			let n = self.line.read(&mut buf);
			if n == 0 {
				if self.line.enabled_ports() == 0 {
					std::thread::sleep(IDLE);
				}
				continue;
			}

			self.write(&buf[..n]);
		}
	}

	/// Returns `false` on shutdown.
	fn handle(&mut self, msg: Msg) -> bool {
		trace2!("AudioSink - {msg:?}");
		match msg {
			Msg::Pause => {
				self.paused = true;
				if let Some(output) = self.output.as_mut() {
					if let Err(e) = output.pause() {
						warn2!("AudioSink - pause failed: {e}");
					}
				}
			},
			Msg::Resume => {
				self.paused = false;
				if let Some(output) = self.output.as_mut() {
					if let Err(e) = output.play() {
						warn2!("AudioSink - play failed: {e}");
					}
				}
			},
			Msg::Volume(volume) => {
				self.volume = volume;
				self.apply_volume();
			},
			Msg::Shutdown => return false,
		}
		true
	}

	/// Hardware volume if the output has it, else the line's global gain.
	fn apply_volume(&mut self) {
		let hardware = self.output.as_mut().is_some_and(|o| o.set_volume(self.volume));
		let gain = if hardware { 1.0 } else { self.volume.inner() };
		self.line.set_global_gain(gain);
	}

	fn write(&mut self, data: &[u8]) {
		let format = self.line.format();
		if self.output.as_ref().is_some_and(|o| o.format() != format) {
			self.output = None;
		}

		if self.output.is_none() && !self.open() {
			return;
		}

		if let Some(output) = self.output.as_mut() {
			if let Err(e) = output.write(data) {
				self.fail(e);
			}
		}
	}

	/// Open an output in the line format, `false` on failure.
	fn open(&mut self) -> bool {
		let format = self.line.format();
		match (self.opener)(format) {
			Ok(output) => {
				info2!("AudioSink - opened output: {}, {format}", output.name());
				self.output = Some(output);
				self.apply_volume();
				true
			},
			Err(e) => {
				self.fail(e);
				false
			},
		}
	}

	fn fail(&mut self, error: OutputError) {
		error2!("AudioSink - output error: {error}, pausing");
		self.output = None;
		self.paused = true;
		try_send!(self.errors, error);
	}

	fn exit(mut self) {
		if let Some(output) = self.output.as_mut() {
			if let Err(e) = output.drain() {
				warn2!("AudioSink - drain on exit failed: {e}");
			}
		}
		debug2!("AudioSink - exit");
	}

	fn promote(format: OutputFormat) -> Option<audio_thread_priority::RtPriorityHandle> {
		let frames = u32::try_from(BLOCK_LEN / format.frame_size()).unwrap_or(u32::MAX);
		match audio_thread_priority::promote_current_thread_to_real_time(frames, format.sample_rate) {
			Ok(handle) => Some(handle),
			Err(e) => {
				debug2!("AudioSink - no real-time priority: {e}");
				None
			},
		}
	}
}
