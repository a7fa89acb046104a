//! The two-port mixing line.

//---------------------------------------------------------------------------------------------------- Use
use std::{
	io,
	sync::{
		atomic::{AtomicBool,Ordering},
		Arc,Mutex,MutexGuard,
	},
	time::{Duration,Instant},
};
use strum::{AsRefStr,Display,IntoStaticStr};
use crate::{
	atomic::AtomicF32,
	config::WAIT_SLICE,
	macros::{debug2,info2,trace2},
	mixer::{format::convert,GainCircularBuffer,OutputFormat},
};

#[allow(unused_imports)] // docs
use crate::mixer::AudioSink;

//---------------------------------------------------------------------------------------------------- Port
/// One of the two inputs of a [`MixingLine`].
#[derive(Copy,Clone,Debug,PartialEq,Eq,PartialOrd,Ord,Hash)]
#[derive(AsRefStr,Display,IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Port {
	/// The first port, its samples are the base of a merge.
	First,
	/// The second port, merged into the first.
	Second,
}

impl Port {
	const fn index(self) -> usize {
		match self {
			Self::First => 0,
			Self::Second => 1,
		}
	}

	const fn from_index(index: usize) -> Self {
		if index == 0 { Self::First } else { Self::Second }
	}
}

#[derive(Debug)]
struct PortState {
	buffer: GainCircularBuffer,
	gain: AtomicF32,
	enabled: AtomicBool,
}

impl PortState {
	fn is_enabled(&self) -> bool {
		self.enabled.load(Ordering::Acquire)
	}
}

//---------------------------------------------------------------------------------------------------- MixingLine
#[derive(Debug)]
struct LineState {
	format: OutputFormat,
	ports: [Option<Arc<PortState>>; 2],
}

/// Mixes two gained [`GainCircularBuffer`]s into one PCM stream.
///
/// Writers get a port with [`MixingLine::some_output`],
/// the [`AudioSink`] pulls the mix with [`MixingLine::read`].
///
/// The line has one [`OutputFormat`] at a time. Writes in another
/// format with the same sample rate are converted, a write with another
/// sample rate switches the line (see [`MixingOutput::write`]).
#[derive(Debug)]
pub struct MixingLine {
	state: Mutex<LineState>,
	global: AtomicF32,
	format_changed: AtomicBool,
	buffer_ms: u32,
}

impl MixingLine {
	#[cold]
	#[inline(never)]
	/// Create a line in `format` where each port buffers `buffer_ms` of audio.
	pub fn new(format: OutputFormat, buffer_ms: u32) -> Arc<Self> {
		Arc::new(Self {
			state: Mutex::new(LineState { format, ports: [None, None] }),
			global: AtomicF32::ONE,
			format_changed: AtomicBool::new(false),
			buffer_ms,
		})
	}

	fn lock(&self) -> MutexGuard<'_, LineState> {
		self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	fn capacity(&self, format: OutputFormat) -> usize {
		let frame = format.frame_size();
		std::cmp::max(format.bytes_for_millis(self.buffer_ms), frame * 64)
	}

	/// Take a free port, `None` if both are in use.
	///
	/// The port starts enabled with a gain of `1.0`.
	pub fn some_output(self: &Arc<Self>) -> Option<MixingOutput> {
		let mut state = self.lock();
		let index = state.ports.iter().position(Option::is_none)?;
		let port = Port::from_index(index);

		let shared = Arc::new(PortState {
			buffer: GainCircularBuffer::new(self.capacity(state.format)),
			gain: AtomicF32::ONE,
			enabled: AtomicBool::new(true),
		});
		state.ports[index] = Some(Arc::clone(&shared));

		debug2!("MixingLine - acquired port: {port}");
		Some(MixingOutput {
			line: Arc::clone(self),
			port,
			shared,
		})
	}

	/// The current line format.
	pub fn format(&self) -> OutputFormat {
		self.lock().format
	}

	/// Ports currently taken.
	pub fn used_ports(&self) -> usize {
		self.lock().ports.iter().filter(|p| p.is_some()).count()
	}

	/// Ports taken and enabled.
	pub fn enabled_ports(&self) -> usize {
		self.lock().ports.iter().flatten().filter(|p| p.is_enabled()).count()
	}

	/// Does an enabled port have at least one frame buffered?
	pub fn has_audio(&self) -> bool {
		let state = self.lock();
		let frame = state.format.frame_size();
		state.ports
			.iter()
			.flatten()
			.any(|p| p.is_enabled() && p.buffer.available() >= frame)
	}

	/// Gain applied on top of both ports.
	pub fn set_global_gain(&self, gain: f32) {
		self.global.set(gain);
	}

	/// See [`Self::set_global_gain`].
	pub fn global_gain(&self) -> f32 {
		self.global.get()
	}

	/// Did the format switch since the last call?
	pub fn take_format_changed(&self) -> bool {
		self.format_changed.swap(false, Ordering::AcqRel)
	}

	/// Discard everything buffered in both ports.
	pub fn flush(&self) {
		for port in self.lock().ports.iter().flatten() {
			port.buffer.clear();
		}
	}

	/// Release both ports, waking their writers.
	pub fn close(&self) {
		let mut state = self.lock();
		for port in state.ports.iter_mut().filter_map(Option::take) {
			port.buffer.close();
		}
	}

	/// Switch to `format`, releasing every port other than `keep`.
	///
	/// Writers of a released port get [`io::ErrorKind::BrokenPipe`],
	/// so two ports in different formats can not switch back and forth.
	fn switch_format(&self, keep: Port, format: OutputFormat) {
		let mut state = self.lock();
		if state.format == format {
			return;
		}

		info2!("MixingLine - format switch: {} -> {format}", state.format);
		for (i, slot) in state.ports.iter_mut().enumerate() {
			if i == keep.index() {
				continue;
			}
			if let Some(port) = slot.take() {
				port.buffer.clear();
				port.buffer.close();
				debug2!("MixingLine - released port: {}", Port::from_index(i));
			}
		}
		state.format = format;
		self.format_changed.store(true, Ordering::Release);
	}

	/// Mix up to `dst.len()` bytes of whole frames into `dst`.
	///
	/// - both ports enabled: as many frames as *both* have buffered, merged
	/// - one port enabled: that port, waiting up to [`WAIT_SLICE`] for data
	/// - no port enabled: `0`, immediately
	///
	/// Returns the bytes written into `dst`.
	pub fn read(&self, dst: &mut [u8]) -> usize {
		let (frame, ports) = {
			let state = self.lock();
			let ports: Vec<Arc<PortState>> = state.ports
				.iter()
				.flatten()
				.filter(|p| p.is_enabled())
				.map(Arc::clone)
				.collect();
			(state.format.frame_size(), ports)
		};
		let len = dst.len() / frame * frame;
		let global = self.global.get();

		match ports.as_slice() {
			[] => 0,
			[port] => {
				port.buffer.wait_data(frame, WAIT_SLICE);
				let n = std::cmp::min(port.buffer.available(), len) / frame * frame;
				let n = port.buffer.try_read(&mut dst[..n]);
				crate::mixer::apply_gain(&mut dst[..n], global * port.gain.get());
				n
			},
			[first, second, ..] => {
				let a = first.buffer.available();
				let b = second.buffer.available();
				let n = std::cmp::min(std::cmp::min(a, b), len) / frame * frame;

				if n == 0 {
					let emptier = if a <= b { first } else { second };
					emptier.buffer.wait_data(frame, WAIT_SLICE);
					return 0;
				}

				let got = first.buffer.try_read(&mut dst[..n]);
				dst[got..n].fill(0);
				second.buffer.read_merge_gain(&mut dst[..n], first.gain.get(), second.gain.get(), global);
				trace2!("MixingLine - merged {n} bytes");
				n
			},
		}
	}
}

//---------------------------------------------------------------------------------------------------- MixingOutput
/// The writing side of one [`Port`].
///
/// Clones share the port. The port stays taken until
/// [`Self::release`] (or [`MixingLine::close`]).
#[derive(Clone,Debug)]
pub struct MixingOutput {
	line: Arc<MixingLine>,
	port: Port,
	shared: Arc<PortState>,
}

impl MixingOutput {
	/// Which port this is.
	pub const fn port(&self) -> Port {
		self.port
	}

	/// Write `data` in `format`, blocking while the port is full.
	///
	/// - `format` equals the line format: written as-is
	/// - same sample rate: converted to the line format
	/// - another sample rate: the line switches to 16-bit `format`,
	///   the other port is released and the sink reopens its output
	///
	/// # Errors
	/// - [`io::ErrorKind::BrokenPipe`] once the port was released
	/// - [`io::ErrorKind::InvalidInput`] if `format` is invalid
	pub fn write(&self, data: &[u8], format: OutputFormat) -> io::Result<()> {
		if self.is_released() {
			return Err(io::Error::from(io::ErrorKind::BrokenPipe));
		}

		let mut line_format = self.line.format();
		if format == line_format {
			return self.shared.buffer.write(data);
		}

		if !format.is_valid() {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("invalid format: {format}")));
		}

		if !format.converts_to(&line_format) {
			line_format = OutputFormat::pcm16(format.sample_rate, format.channels);
			self.line.switch_format(self.port, line_format);
		}

		if format == line_format {
			return self.shared.buffer.write(data);
		}

		let mut converted = Vec::with_capacity(data.len());
		convert(data, format, line_format, &mut converted);
		self.shared.buffer.write(&converted)
	}

	/// Set this port's gain.
	pub fn set_gain(&self, gain: f32) {
		self.shared.gain.set(gain);
	}

	/// This port's gain.
	pub fn gain(&self) -> f32 {
		self.shared.gain.get()
	}

	/// Enable or disable this port.
	///
	/// A disabled port is not mixed, its buffered data waits.
	pub fn toggle(&self, enabled: bool) {
		trace2!("MixingOutput - {} enabled: {enabled}", self.port);
		self.shared.enabled.store(enabled, Ordering::Release);
	}

	/// Is this port enabled?
	pub fn is_enabled(&self) -> bool {
		self.shared.is_enabled()
	}

	/// Discard what this port has buffered.
	pub fn flush(&self) {
		self.shared.buffer.clear();
	}

	/// Bytes buffered and not yet mixed.
	pub fn available(&self) -> usize {
		self.shared.buffer.available()
	}

	/// How long the buffered audio plays.
	pub fn buffered_ms(&self) -> u32 {
		self.line.format().millis_for_bytes(self.available())
	}

	/// Wait up to `timeout` for everything buffered to be mixed.
	///
	/// Returns `true` if the port is empty (or released).
	pub fn wait_drained(&self, timeout: Duration) -> bool {
		let deadline = Instant::now() + timeout;
		loop {
			if self.available() == 0 || self.is_released() {
				return true;
			}
			if Instant::now() >= deadline {
				return false;
			}
			std::thread::sleep(Duration::from_millis(5));
		}
	}

	/// Free the port for another writer.
	///
	/// Idempotent, pending and future writes fail.
	pub fn release(&self) {
		{
			let mut state = self.line.lock();
			let slot = &mut state.ports[self.port.index()];
			if slot.as_ref().is_some_and(|s| Arc::ptr_eq(s, &self.shared)) {
				*slot = None;
				debug2!("MixingOutput - released port: {}", self.port);
			}
		}
		self.shared.buffer.close();
	}

	/// Was [`Self::release`] called?
	pub fn is_released(&self) -> bool {
		self.shared.buffer.is_closed()
	}
}
