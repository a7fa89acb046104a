//! The session actor: owns the queue and decides every transition.

//---------------------------------------------------------------------------------------------------- Use
use std::sync::{Arc,Mutex,PoisonError};
use crossbeam::channel::{Receiver,Select,Sender,TryRecvError};
use crate::{
	error::{LoadError,OutputError,SessionError,TandemError},
	feeder::PlayableId,
	macros::{debug2,error2,info2,select_recv,send,trace2,warn2},
	mixer::{AudioSink,MixingLine,Volume},
	player::{
		context::PlaybackContext,
		entry::{EntryConfig,EntryEvent,EntryHandle,EntryMsg,FadeOut,QueueEntry},
		event::{InstantKind,PlayerEvent},
		queue::{NodeId,PlaybackQueue,Queued},
		Reason,
	},
};

//---------------------------------------------------------------------------------------------------- Command
/// Requests from the [`crate::player::Player`].
#[derive(Debug)]
pub(crate) enum Command {
	Play {
		playable: PlayableId,
		pos_ms: u32,
		reason: Reason,
	},
	Next,
	Previous,
	Seek(u32),
	Pause,
	Resume,
	Volume(Volume),
	Shutdown,
}

//---------------------------------------------------------------------------------------------------- Session
/// The entry shared with the `Player` for position queries.
pub(crate) type Current = Arc<Mutex<Option<EntryHandle>>>;

pub(crate) struct Session {
	pub(crate) queue: PlaybackQueue<QueueEntry>,
	pub(crate) context: Box<dyn PlaybackContext>,
	pub(crate) line: Arc<MixingLine>,
	pub(crate) sink: AudioSink,
	pub(crate) entries: EntryConfig,
	pub(crate) events: Sender<PlayerEvent>,
	pub(crate) current: Current,
	pub(crate) shutdown_blocking: bool,
	/// Kept so the channel never disconnects while the sink restarts.
	pub(crate) _sink_errors: Sender<OutputError>,
	pub(crate) next_id: u64,
	/// [`PlayerEvent::PlaybackEnded`] was sent and nothing played since.
	pub(crate) ended: bool,
}

impl Session {
	#[cold]
	#[inline(never)]
	/// Spawn the `Session` thread.
	pub(crate) fn spawn(
		self,
		commands: Receiver<Command>,
		entries: Receiver<EntryMsg>,
		sink_errors: Receiver<OutputError>,
	) -> Result<std::thread::JoinHandle<()>, SessionError> {
		Ok(std::thread::Builder::new()
			.name("Session".into())
			.spawn(move || self.main(&commands, &entries, &sink_errors))?)
	}

	#[cold]
	#[inline(never)]
	fn main(
		mut self,
		commands: &Receiver<Command>,
		entries: &Receiver<EntryMsg>,
		sink_errors: &Receiver<OutputError>,
	) {
		let mut select = Select::new();

		assert_eq!(0, select.recv(commands));
		assert_eq!(1, select.recv(entries));
		assert_eq!(2, select.recv(sink_errors));

		debug2!("Session - main()");

		loop {
			let result = match select.ready() {
				0 => match commands.try_recv() {
					Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => break,
					Ok(command) => self.command(command),
					Err(TryRecvError::Empty) => continue,
				},
				1 => {
					let msg = select_recv!(entries);
					self.entry(msg)
				},
				2 => {
					let error = select_recv!(sink_errors);
					self.sink_error(error);
					Ok(())
				},
				_ => unreachable!(),
			};

			if let Err(error) = result {
				error2!("Session - {error}");
				self.exit(Some(error));
				return;
			}
			self.publish();
		}

		self.exit(None);
	}

	fn exit(&mut self, error: Option<SessionError>) {
		info2!("Session - exiting, error: {error:?}");
		self.queue.clear();
		self.publish();
		self.line.close();
		self.sink.shutdown(self.shutdown_blocking);
		send!(self.events, PlayerEvent::SessionClosed { error });
	}

	/// Share the head's position with the `Player`.
	fn publish(&self) {
		let handle = self.queue.head().map(|(_, e)| e.handle());
		*self.current.lock().unwrap_or_else(PoisonError::into_inner) = handle;
	}

	fn spawn_entry(&mut self, playable: PlayableId, retried: bool, is_preload: bool) -> Result<QueueEntry, SessionError> {
		let id = self.next_id;
		self.next_id += 1;
		QueueEntry::spawn(id, playable, retried, is_preload, &self.entries)
	}

	//---------------------------------------------------------------------------------------------------- Commands
	fn command(&mut self, command: Command) -> Result<(), SessionError> {
		trace2!("Session - command: {command:?}");
		match command {
			Command::Play { playable, pos_ms, reason } => {
				self.context.set_current(&playable);
				self.play(playable, pos_ms, reason)
			},
			Command::Next => self.advance(Reason::ForwardBtn),
			Command::Previous => self.previous(),
			Command::Seek(ms) => {
				self.seek_current(ms);
				Ok(())
			},
			Command::Pause => {
				self.sink.pause();
				Ok(())
			},
			Command::Resume => {
				self.sink.resume();
				Ok(())
			},
			Command::Volume(volume) => {
				self.sink.set_volume(volume);
				Ok(())
			},
			// Handled in `main()`.
			Command::Shutdown => Ok(()),
		}
	}

	/// Make `playable` the head, starting at `pos_ms`.
	///
	/// A preloaded next entry for `playable` is reused.
	fn play(&mut self, playable: PlayableId, pos_ms: u32, reason: Reason) -> Result<(), SessionError> {
		self.ended = false;
		self.sink.resume();

		let reuse = self.queue.next().is_some_and(|(_, e)| e.playable() == &playable);
		if !reuse {
			if let Some((next, _)) = self.queue.next() {
				self.queue.remove(next);
			}
			let entry = self.spawn_entry(playable.clone(), false, false)?;
			self.queue.add(entry);
		}
		self.queue.advance();

		// The old head, if it still plays.
		let mut wait_for_prev = false;
		if let Some((prev, fade)) = self.queue.prev().map(|(id, e)| (id, e.fade_out(reason))) {
			debug2!("Session - previous head: {fade:?}");
			match fade {
				FadeOut::Fading => {},
				FadeOut::Drain => wait_for_prev = true,
				FadeOut::Stop => drop(self.queue.remove(prev)),
			}
		}

		let Some((_, head)) = self.queue.head() else {
			return Ok(());
		};
		head.start(reason, pos_ms);
		if !head.has_output() {
			let Some(output) = self.line.some_output() else {
				return Err(SessionError::MixerPortExhausted);
			};
			output.toggle(!wait_for_prev);
			head.set_output(output);
		}

		info2!("Session - playing {playable} ({reason})");
		send!(self.events, PlayerEvent::TrackChanged { playable, reason });
		Ok(())
	}

	/// Play whatever the context has next.
	fn advance(&mut self, reason: Reason) -> Result<(), SessionError> {
		match self.context.next_playable() {
			Some(playable) => self.play(playable, 0, reason),
			None => {
				self.end(reason.is_manual());
				Ok(())
			},
		}
	}

	fn previous(&mut self) -> Result<(), SessionError> {
		match self.context.previous_playable() {
			Some(playable) => self.play(playable, 0, Reason::BackBtn),
			None => {
				self.seek_current(0);
				Ok(())
			},
		}
	}

	/// The context ran out, `stop` cuts what is still playing.
	fn end(&mut self, stop: bool) {
		if !self.ended {
			info2!("Session - nothing left to play");
			self.ended = true;
			send!(self.events, PlayerEvent::PlaybackEnded);
		}
		if stop {
			self.queue.clear();
		}
	}

	fn seek_current(&mut self, ms: u32) {
		let prev = self.queue.prev().filter(|(_, e)| e.has_output()).map(|(id, _)| id);
		let next = self.queue.next().filter(|(_, e)| e.has_output()).map(|(id, _)| id);
		for id in prev.into_iter().chain(next) {
			self.queue.remove(id);
		}

		if let Some((_, head)) = self.queue.head() {
			debug2!("Session - seeking {} to {ms}ms", head.playable());
			head.seek(ms);
			head.toggle_output(true);
		}
		self.line.flush();
	}

	fn preload(&mut self) -> Result<(), SessionError> {
		if self.queue.next().is_some() {
			return Ok(());
		}
		let Some(playable) = self.context.peek_next() else {
			return Ok(());
		};

		debug2!("Session - preloading {playable}");
		let entry = self.spawn_entry(playable, false, true)?;
		self.queue.add(entry);
		Ok(())
	}

	//---------------------------------------------------------------------------------------------------- Entry events
	fn entry(&mut self, msg: EntryMsg) -> Result<(), SessionError> {
		let Some(node) = self.queue.find(msg.id) else {
			trace2!("Session - stale event of {}: {:?}", msg.id, msg.event);
			return Ok(());
		};
		let Some(playable) = self.queue.get(node).map(|e| e.playable().clone()) else {
			return Ok(());
		};
		let is_head = self.queue.head().is_some_and(|(id, _)| id == node);

		match msg.event {
			EntryEvent::Loaded { metrics, duration_ms } => {
				send!(self.events, PlayerEvent::TrackLoaded { playable, duration_ms, metrics });
			},
			EntryEvent::LoadFailed(error) => self.load_failed(node, is_head, error)?,
			EntryEvent::Instant(InstantKind::PreloadNext) if is_head => self.preload()?,
			EntryEvent::Instant(InstantKind::StartNext) if is_head => self.advance(Reason::TrackDone)?,
			EntryEvent::Instant(_) => {},
			EntryEvent::Halted(chunk) => {
				if is_head {
					send!(self.events, PlayerEvent::PlaybackHalted { playable, chunk });
				}
			},
			EntryEvent::Resumed(chunk, stalled_ms) => {
				if is_head {
					send!(self.events, PlayerEvent::PlaybackResumed { playable, chunk, stalled_ms });
				}
			},
			EntryEvent::Ended => {
				if is_head {
					self.advance(Reason::TrackDone)?;
				}
			},
			EntryEvent::Finished => {
				let was_prev = self.queue.prev().is_some_and(|(id, _)| id == node);
				self.queue.remove(node);
				if was_prev {
					if let Some((_, head)) = self.queue.head() {
						head.toggle_output(true);
					}
				}
			},
			EntryEvent::PlaybackError(error) => {
				warn2!("Session - {playable} failed: {error}");
				send!(self.events, PlayerEvent::PlaybackFailed { playable: Some(playable), error });
				self.queue.remove(node);
				if is_head {
					self.advance(Reason::TrackError)?;
				}
			},
		}

		Ok(())
	}

	/// Retry once, in place, unless restricted.
	fn load_failed(&mut self, node: NodeId, is_head: bool, error: LoadError) -> Result<(), SessionError> {
		let Some(entry) = self.queue.get(node) else {
			return Ok(());
		};
		let playable = entry.playable().clone();

		if !error.is_restricted() && !entry.retried() {
			warn2!("Session - {playable} failed to load, retrying: {error}");
			let pos_ms = entry.time_ms().unwrap_or(0);
			let retry = self.spawn_entry(playable, true, !is_head)?;
			if is_head {
				retry.start(Reason::TrackError, pos_ms);
			}
			if self.queue.swap(node, retry) && is_head {
				if let Some(entry) = self.queue.get(node) {
					let Some(output) = self.line.some_output() else {
						return Err(SessionError::MixerPortExhausted);
					};
					entry.set_output(output);
				}
			}
			return Ok(());
		}

		warn2!("Session - {playable} failed to load: {error}");
		send!(self.events, PlayerEvent::LoadingFailed { playable, error });
		self.queue.remove(node);
		if is_head {
			self.advance(Reason::TrackError)?;
		}
		Ok(())
	}

	fn sink_error(&mut self, error: OutputError) {
		error2!("Session - output failed: {error}");
		let head = self.queue.head().map(|(id, e)| (id, e.playable().clone()));
		send!(self.events, PlayerEvent::PlaybackFailed {
			playable: head.as_ref().map(|(_, p)| p.clone()),
			error: TandemError::Output(error),
		});
		if let Some((id, _)) = head {
			self.queue.remove(id);
		}
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		player::{LinearCrossfade,ListContext},
		mixer::OutputFormat,
		tests::{FakeLoader,Recorded,RecordingOutput},
	};
	use pretty_assertions::assert_eq;
	use std::time::{Duration,Instant};

	/// A session on its own thread, the test keeps the line.
	fn session(
		loader: &Arc<FakeLoader>,
		playables: &[&str],
		crossfade_ms: u32,
	) -> (Sender<Command>, Receiver<PlayerEvent>, Arc<MixingLine>, Recorded) {
		let recorded = Recorded::default();
		recorded.pace(true);
		let line = MixingLine::new(OutputFormat::DEFAULT, 100);

		let (sink_errors, sink_errors_rx) = crossbeam::channel::unbounded();
		let opener = RecordingOutput::opener(&recorded, false);
		let sink = AudioSink::spawn(Arc::clone(&line), opener, Volume::MAX, sink_errors.clone()).unwrap();

		let (entry_events, entry_events_rx) = crossbeam::channel::unbounded();
		let (events, events_rx) = crossbeam::channel::unbounded();
		let (commands, commands_rx) = crossbeam::channel::unbounded();
		let context = ListContext::new(playables.iter().map(|p| PlayableId::track(p)).collect());

		Session {
			queue: PlaybackQueue::default(),
			context: Box::new(context),
			line: Arc::clone(&line),
			sink,
			entries: EntryConfig {
				loader: Arc::clone(loader) as _,
				crossfade: Some(Arc::new(LinearCrossfade { duration_ms: crossfade_ms }) as _),
				preload: true,
				events: entry_events,
			},
			events,
			current: Arc::new(Mutex::new(None)),
			shutdown_blocking: true,
			_sink_errors: sink_errors,
			next_id: 0,
			ended: false,
		}
		.spawn(commands_rx, entry_events_rx, sink_errors_rx)
		.unwrap();

		(commands, events_rx, line, recorded)
	}

	#[test]
	// During a natural crossfade both entries are mixed at once,
	// before and after it only one port plays.
	fn crossfade_mixes_both_ports() {
		let loader = FakeLoader::new(&[("a", 5000), ("b", 5000)]);
		let (commands, events, line, _recorded) = session(&loader, &["a", "b"], 2000);
		commands.send(Command::Next).unwrap();

		let mut most_enabled = 0;
		let mut changes = Vec::new();
		let deadline = Instant::now() + Duration::from_secs(20);
		loop {
			assert!(Instant::now() < deadline, "timed out");
			most_enabled = std::cmp::max(most_enabled, line.enabled_ports());
			assert!(line.used_ports() <= 2);

			match events.try_recv() {
				Ok(PlayerEvent::TrackChanged { playable, reason }) => changes.push((playable.id().to_string(), reason)),
				Ok(PlayerEvent::PlaybackEnded) => break,
				_ => std::thread::sleep(Duration::from_millis(1)),
			}
		}

		assert_eq!(changes, [
			("a".to_string(), Reason::ForwardBtn),
			("b".to_string(), Reason::TrackDone),
		]);
		assert_eq!(most_enabled, 2);
		commands.send(Command::Shutdown).unwrap();
	}
}
