//! One playable in the queue, decoding on its own thread.
//!
//! An entry loads as soon as it is spawned, but only decodes while
//! it holds a [`MixingOutput`]. Everything it wants the session to
//! know is sent as an [`EntryMsg`].

//---------------------------------------------------------------------------------------------------- Use
use std::{
	collections::BTreeSet,
	sync::{
		atomic::{AtomicBool,AtomicU64,Ordering},
		Arc,Condvar,Mutex,MutexGuard,PoisonError,
	},
};
use crossbeam::channel::Sender;
use crate::{
	atomic::AtomicMillis,
	codec::Decoder,
	config::{PRELOAD_BEFORE_FADE_MS,WAIT_SLICE},
	error::{LoadError,OutputError,SessionError,TandemError},
	feeder::{PlayableId,PlaybackMetrics},
	macros::{debug2,send,trace2},
	mixer::MixingOutput,
	player::{
		crossfade::{CrossfadePolicy,FadeInterval},
		event::InstantKind,
		loader::ContentLoader,
		queue::Queued,
		Reason,
	},
	stream::{HaltListener,StreamHandle},
};

//---------------------------------------------------------------------------------------------------- Messages
/// An entry event, tagged with the entry's id.
#[derive(Debug)]
pub(crate) struct EntryMsg {
	pub(crate) id: u64,
	pub(crate) event: EntryEvent,
}

#[derive(Debug)]
pub(crate) enum EntryEvent {
	/// The content is ready.
	Loaded {
		metrics: Option<PlaybackMetrics>,
		duration_ms: u32,
	},
	/// The content could not be loaded, the entry thread exited.
	LoadFailed(LoadError),
	/// A registered instant was reached (never [`InstantKind::EndNow`]).
	Instant(InstantKind),
	/// Reading waits for `chunk`.
	Halted(u32),
	/// `chunk` arrived after a stall of `stalled_ms`.
	Resumed(u32, u64),
	/// Everything was decoded, the output is draining.
	Ended,
	/// The entry released its output and exited.
	Finished,
	/// Decoding or writing failed, the entry thread exited.
	PlaybackError(TandemError),
}

/// What a transition does with the entry that was current.
#[derive(Copy,Clone,Debug,PartialEq,Eq)]
pub(crate) enum FadeOut {
	/// It fades out and ends itself.
	Fading,
	/// It plays what is left, the next entry waits for it.
	Drain,
	/// It has to stop now.
	Stop,
}

//---------------------------------------------------------------------------------------------------- EntryConfig
/// What every entry of a session shares.
#[derive(Clone)]
pub(crate) struct EntryConfig {
	pub(crate) loader: Arc<dyn ContentLoader>,
	pub(crate) crossfade: Option<Arc<dyn CrossfadePolicy>>,
	/// Register [`InstantKind::PreloadNext`]?
	pub(crate) preload: bool,
	pub(crate) events: Sender<EntryMsg>,
}

//---------------------------------------------------------------------------------------------------- Shared
#[derive(Debug,Default)]
struct EntryState {
	output: Option<MixingOutput>,
	pending_seek: Option<u32>,
	instants: BTreeSet<(u32, InstantKind)>,
	/// Set by [`QueueEntry::start`], applied once loaded.
	start: Option<(Reason, u32)>,
	fade_in: Option<FadeInterval>,
	fade_out: Option<FadeInterval>,
	duration_ms: Option<u32>,
}

struct EntryShared {
	id: u64,
	playable: PlayableId,
	retried: bool,
	crossfade: Option<Arc<dyn CrossfadePolicy>>,
	preload: bool,
	state: Mutex<EntryState>,
	/// Signaled when an output was set or the entry closed.
	cond: Condvar,
	time: AtomicMillis,
	closed: AtomicBool,
	stream: Mutex<Option<StreamHandle>>,
	events: Sender<EntryMsg>,
	/// UNIX millis of the last halt.
	halted_at: AtomicU64,
}

impl EntryShared {
	fn lock(&self) -> MutexGuard<'_, EntryState> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::Acquire)
	}

	fn send(&self, event: EntryEvent) {
		send!(self.events, EntryMsg { id: self.id, event });
	}

	fn close(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}

		let output = self.lock().output.take();
		if let Some(output) = output {
			output.release();
		}
		if let Some(stream) = self.stream.lock().unwrap_or_else(PoisonError::into_inner).take() {
			stream.close();
		}
		self.cond.notify_all();
		debug2!("QueueEntry - {} closed ({})", self.id, self.playable);
	}

	/// Rebuild the instants from the duration and the fade-out.
	fn schedule(&self, state: &mut EntryState) {
		let Some(duration) = state.duration_ms else {
			return;
		};

		state.instants.clear();
		let natural = self.crossfade.as_ref().and_then(|c| c.natural_fade_start(duration));
		if self.preload {
			let at = natural.unwrap_or(duration).saturating_sub(PRELOAD_BEFORE_FADE_MS);
			state.instants.insert((at, InstantKind::PreloadNext));
		}
		if let Some(at) = natural {
			state.instants.insert((at, InstantKind::StartNext));
		}
		if let Some(fade) = state.fade_out {
			state.instants.insert((fade.end_ms(), InstantKind::EndNow));
		}
	}

	/// Fade in and seek as asked by [`QueueEntry::start`].
	fn apply_start(&self, state: &mut EntryState) {
		// Kept until loaded.
		let Some(duration) = state.duration_ms else {
			return;
		};
		let Some((reason, pos)) = state.start.take() else {
			return;
		};

		state.fade_in = self.crossfade.as_ref().and_then(|c| c.fade_in(reason, duration));
		let target = state.fade_in.map_or(pos, |f| std::cmp::max(f.start_ms, pos));
		if target > 0 {
			state.pending_seek = Some(target);
		}
		trace2!("QueueEntry - {} starting at {target}ms, fade in: {:?}", self.id, state.fade_in);
	}

	/// Fire every instant due at `time`.
	fn reach(&self, time: u32) {
		let mut due = Vec::new();
		{
			let mut state = self.lock();
			while let Some(&(at, kind)) = state.instants.first() {
				if at > time {
					break;
				}
				state.instants.pop_first();
				due.push(kind);
			}
		}

		for kind in due {
			trace2!("QueueEntry - {} reached {kind} at {time}ms", self.id);
			match kind {
				InstantKind::EndNow => {
					self.close();
					self.send(EntryEvent::Finished);
				},
				kind => self.send(EntryEvent::Instant(kind)),
			}
		}
	}

	fn gain(&self, time: u32) -> f32 {
		let state = self.lock();
		let fade_in = state.fade_in.map_or(1.0, |f| f.gain(time));
		let fade_out = state.fade_out.map_or(1.0, |f| f.gain(time));
		fade_in * fade_out
	}

	/// Wait for an output, `None` once closed.
	fn next_output(&self) -> Option<(MixingOutput, Option<u32>)> {
		let mut state = self.lock();
		loop {
			if self.is_closed() {
				return None;
			}
			if let Some(output) = state.output.clone() {
				return Some((output, state.pending_seek.take()));
			}
			state = self.cond
				.wait_timeout(state, WAIT_SLICE)
				.unwrap_or_else(PoisonError::into_inner)
				.0;
		}
	}

	//---------------------------------------------------------------------------------------------------- Thread
	#[cold]
	#[inline(never)]
	fn run(self: Arc<Self>, loader: &dyn ContentLoader, is_preload: bool) {
		debug2!("QueueEntry - {} loading {} (preload: {is_preload})", self.id, self.playable);

		let halt: Arc<dyn HaltListener> = Arc::clone(&self) as _;
		let mut content = match loader.load(&self.playable, is_preload, Some(halt)) {
			Ok(content) => content,
			Err(error) => {
				if !self.is_closed() {
					self.send(EntryEvent::LoadFailed(error));
				}
				return;
			},
		};

		if let Some(stream) = &content.stream {
			*self.stream.lock().unwrap_or_else(PoisonError::into_inner) = Some(stream.clone());
			// `close()` may have run before the handle was stored.
			if self.is_closed() {
				stream.close();
				return;
			}
		}

		{
			let mut state = self.lock();
			state.duration_ms = Some(content.duration_ms);
			self.schedule(&mut state);
			self.apply_start(&mut state);
		}
		self.send(EntryEvent::Loaded {
			metrics: content.metrics,
			duration_ms: content.duration_ms,
		});

		if let Err(error) = self.play(content.decoder.as_mut()) {
			if !self.is_closed() {
				self.send(EntryEvent::PlaybackError(error));
			}
		}
	}

	fn play(&self, decoder: &mut dyn Decoder) -> Result<(), TandemError> {
		let mut block = Vec::new();

		let output = loop {
			let Some((output, seek)) = self.next_output() else {
				return Ok(());
			};

			if let Some(ms) = seek {
				let landed = decoder.seek(ms)?;
				debug2!("QueueEntry - {} seeked to {landed}ms", self.id);
				self.time.set(Some(landed));
				self.schedule(&mut self.lock());
				self.reach(landed);
				continue;
			}

			if !decoder.read_block(&mut block)? {
				break output;
			}

			let time = decoder.time_ms().unwrap_or(0);
			self.time.set(Some(time));
			self.reach(time);
			if self.is_closed() {
				return Ok(());
			}

			output.set_gain(self.gain(time));
			if let Err(e) = output.write(&block, decoder.format()) {
				if self.is_closed() {
					return Ok(());
				}
				// The line switched to another entry's format.
				if output.is_released() {
					debug2!("QueueEntry - {} lost its port to a format switch", self.id);
					self.lock().output = None;
					self.send(EntryEvent::Finished);
					return Ok(());
				}
				return Err(OutputError::from(e).into());
			}
		};

		debug2!("QueueEntry - {} decoded everything", self.id);
		self.send(EntryEvent::Ended);
		while !self.is_closed() && !output.wait_drained(WAIT_SLICE) {}

		if !self.is_closed() {
			output.release();
			self.lock().output = None;
			self.send(EntryEvent::Finished);
		}
		Ok(())
	}
}

impl HaltListener for EntryShared {
	fn stream_read_halted(&self, chunk: u32, time_ms: u64) {
		self.halted_at.store(time_ms, Ordering::Release);
		self.send(EntryEvent::Halted(chunk));
	}

	fn stream_read_resumed(&self, chunk: u32, time_ms: u64) {
		let since = self.halted_at.swap(0, Ordering::AcqRel);
		let stalled = if since == 0 { 0 } else { time_ms.saturating_sub(since) };
		self.send(EntryEvent::Resumed(chunk, stalled));
	}
}

//---------------------------------------------------------------------------------------------------- QueueEntry
/// A playable in the [`crate::player::queue::PlaybackQueue`].
///
/// Dropping the entry does not stop its thread, [`Queued::close`] does.
pub(crate) struct QueueEntry {
	shared: Arc<EntryShared>,
}

impl std::fmt::Debug for QueueEntry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("QueueEntry")
			.field("id", &self.shared.id)
			.field("playable", &self.shared.playable)
			.field("retried", &self.shared.retried)
			.finish_non_exhaustive()
	}
}

impl QueueEntry {
	#[cold]
	#[inline(never)]
	/// Spawn the thread loading (and later playing) `playable`.
	pub(crate) fn spawn(
		id: u64,
		playable: PlayableId,
		retried: bool,
		is_preload: bool,
		config: &EntryConfig,
	) -> Result<Self, SessionError> {
		let shared = Arc::new(EntryShared {
			id,
			playable,
			retried,
			crossfade: config.crossfade.clone(),
			preload: config.preload,
			state: Mutex::new(EntryState::default()),
			cond: Condvar::new(),
			time: AtomicMillis::none(),
			closed: AtomicBool::new(false),
			stream: Mutex::new(None),
			events: config.events.clone(),
			halted_at: AtomicU64::new(0),
		});

		let thread = Arc::clone(&shared);
		let loader = Arc::clone(&config.loader);
		std::thread::Builder::new()
			.name("QueueEntry".into())
			.spawn(move || thread.run(loader.as_ref(), is_preload))?;

		Ok(Self { shared })
	}

	/// Was this entry spawned as a retry?
	pub(crate) fn retried(&self) -> bool {
		self.shared.retried
	}

	/// The time of the last decoded block.
	pub(crate) fn time_ms(&self) -> Option<u32> {
		self.shared.time.get()
	}

	/// Duration of the content, `None` until loaded.
	pub(crate) fn duration_ms(&self) -> Option<u32> {
		self.shared.lock().duration_ms
	}

	/// Start decoding into `output`.
	pub(crate) fn set_output(&self, output: MixingOutput) {
		if self.shared.is_closed() {
			output.release();
			return;
		}
		self.shared.lock().output = Some(output);
		self.shared.cond.notify_all();
	}

	/// Enable (or disable) the output, if any.
	pub(crate) fn toggle_output(&self, enabled: bool) {
		if let Some(output) = &self.shared.lock().output {
			output.toggle(enabled);
		}
	}

	/// This entry becomes current for `reason`, starting at `pos_ms`.
	///
	/// The fade-in is picked once the duration is known.
	pub(crate) fn start(&self, reason: Reason, pos_ms: u32) {
		let mut state = self.shared.lock();
		state.start = Some((reason, pos_ms));
		self.shared.apply_start(&mut state);
		drop(state);
		self.shared.cond.notify_all();
	}

	/// Seek to `ms`.
	pub(crate) fn seek(&self, ms: u32) {
		self.shared.lock().pending_seek = Some(ms);
		self.shared.cond.notify_all();
	}

	/// This entry stops being current for `reason`.
	pub(crate) fn fade_out(&self, reason: Reason) -> FadeOut {
		let now = self.time_ms().unwrap_or(0);
		let fade = {
			let mut state = self.shared.lock();
			let Some(duration) = state.duration_ms else {
				return FadeOut::Stop;
			};
			let fade = self.shared.crossfade.as_ref().and_then(|c| c.fade_out(reason, now, duration));
			if let Some(fade) = fade {
				state.fade_out = Some(fade);
				state.instants.insert((fade.end_ms(), InstantKind::EndNow));
			}
			fade
		};

		match fade {
			Some(fade) => {
				debug2!("QueueEntry - {} fading out: {fade:?}", self.shared.id);
				// An end already behind us fires now.
				self.shared.reach(now);
				FadeOut::Fading
			},
			None if reason == Reason::TrackDone => FadeOut::Drain,
			None => FadeOut::Stop,
		}
	}

	/// A handle to read this entry's position from another thread.
	pub(crate) fn handle(&self) -> EntryHandle {
		EntryHandle(Arc::clone(&self.shared))
	}
}

impl Queued for QueueEntry {
	fn close(&self) {
		self.shared.close();
	}

	fn has_output(&self) -> bool {
		self.shared.lock().output.is_some()
	}

	fn playback_id(&self) -> u64 {
		self.shared.id
	}

	fn playable(&self) -> &PlayableId {
		&self.shared.playable
	}
}

//---------------------------------------------------------------------------------------------------- EntryHandle
/// Reads the audible position of an entry.
#[derive(Clone)]
pub(crate) struct EntryHandle(Arc<EntryShared>);

impl std::fmt::Debug for EntryHandle {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("EntryHandle").field(&self.0.id).finish()
	}
}

impl EntryHandle {
	/// Decoded time minus what is still buffered in the mixer.
	pub(crate) fn position_ms(&self) -> Option<u32> {
		let time = self.0.time.get()?;
		let buffered = self.0.lock().output.as_ref().map_or(0, MixingOutput::buffered_ms);
		Some(time.saturating_sub(buffered))
	}
}
