//! The public handle to a playback session.

//---------------------------------------------------------------------------------------------------- Use
use std::{
	sync::{Arc,Mutex,PoisonError},
	thread::JoinHandle,
};
use crossbeam::channel::{Receiver,Sender};
use crate::{
	config::PlayerConfig,
	error::{SessionError,TandemError},
	feeder::{ContentFeeder,PlayableId,Services,VorbisOnlyQuality},
	macros::{debug2,send},
	mixer::{AudioSink,MixingLine,OutputFormat,OutputOpener,Volume},
	player::{
		context::PlaybackContext,
		crossfade::{CrossfadePolicy,LinearCrossfade},
		entry::EntryConfig,
		event::PlayerEvent,
		loader::{ContentLoader,FeederLoader},
		queue::PlaybackQueue,
		session::{Command,Current,Session},
		Reason,
	},
	transport::{ChannelMultiplexer,FetchPool},
};

//---------------------------------------------------------------------------------------------------- Player
/// Plays the playables of a [`PlaybackContext`].
///
/// Every method only sends a request to the session thread and returns
/// at once, what happens is reported on [`Player::events`].
///
/// Dropping the `Player` stops everything, blocking until the
/// threads exit if [`PlayerConfig::shutdown_blocking`] is set.
#[derive(Debug)]
pub struct Player {
	commands: Sender<Command>,
	events: Receiver<PlayerEvent>,
	current: Current,
	session: Option<JoinHandle<()>>,
	pool: Option<FetchPool>,
	feeder: Option<Arc<ContentFeeder>>,
	shutdown_blocking: bool,
}

impl Player {
	#[cold]
	#[inline(never)]
	/// Start a session streaming through `services`.
	///
	/// Files are picked with [`VorbisOnlyQuality`] at [`PlayerConfig::quality`].
	/// Nothing plays until [`Player::play`] or [`Player::next`] is called.
	///
	/// # Errors
	/// A thread could not be spawned.
	pub fn new(
		config: PlayerConfig,
		services: Services,
		context: Box<dyn PlaybackContext>,
	) -> Result<Self, TandemError> {
		let pool = FetchPool::new(config.fetch_workers).map_err(SessionError::from)?;
		let feeder = Arc::new(ContentFeeder::new(services, pool.clone(), &config));
		let loader = Arc::new(FeederLoader::new(
			Arc::clone(&feeder),
			Box::new(VorbisOnlyQuality(config.quality)),
			config.normalisation,
			config.normalisation_pregain,
		));

		let opener = Self::opener(&config);
		match Self::spawn(&config, loader, context, opener) {
			Ok(mut player) => {
				player.pool = Some(pool);
				player.feeder = Some(feeder);
				Ok(player)
			},
			Err(e) => {
				pool.shutdown(false);
				Err(e)
			},
		}
	}

	#[cold]
	#[inline(never)]
	/// Start a session loading playables with `loader`.
	///
	/// # Errors
	/// A thread could not be spawned.
	pub fn with_loader(
		config: PlayerConfig,
		loader: Arc<dyn ContentLoader>,
		context: Box<dyn PlaybackContext>,
	) -> Result<Self, TandemError> {
		let opener = Self::opener(&config);
		Self::spawn(&config, loader, context, opener)
	}

	/// Opens [`PlayerConfig::output`].
	fn opener(config: &PlayerConfig) -> OutputOpener {
		let kind = config.output.clone();
		let buffer_ms = u32::from(config.buffer_milliseconds);
		Box::new(move |format| crate::output::open(&kind, format, buffer_ms))
	}

	#[cold]
	#[inline(never)]
	pub(crate) fn spawn(
		config: &PlayerConfig,
		loader: Arc<dyn ContentLoader>,
		context: Box<dyn PlaybackContext>,
		opener: OutputOpener,
	) -> Result<Self, TandemError> {
		let line = MixingLine::new(OutputFormat::DEFAULT, u32::from(config.buffer_milliseconds));

		let (sink_errors, sink_errors_rx) = crossbeam::channel::unbounded();
		let sink = AudioSink::spawn(Arc::clone(&line), opener, config.volume, sink_errors.clone())
			.map_err(SessionError::from)?;

		let crossfade_ms = config.crossfade_millis();
		let crossfade = (crossfade_ms > 0)
			.then(|| Arc::new(LinearCrossfade { duration_ms: crossfade_ms }) as Arc<dyn CrossfadePolicy>);

		let (entry_events, entry_events_rx) = crossbeam::channel::unbounded();
		let (events_tx, events) = crossbeam::channel::unbounded();
		let (commands, commands_rx) = crossbeam::channel::unbounded();
		let current = Arc::new(Mutex::new(None));

		debug2!("Player - spawning session, crossfade: {crossfade_ms}ms, preload: {}", config.preload);
		let session = Session {
			queue: PlaybackQueue::default(),
			context,
			line,
			sink,
			entries: EntryConfig {
				loader,
				crossfade,
				preload: config.preload || crossfade_ms > 0,
				events: entry_events,
			},
			events: events_tx,
			current: Arc::clone(&current),
			shutdown_blocking: config.shutdown_blocking,
			_sink_errors: sink_errors,
			next_id: 0,
			ended: false,
		}
		.spawn(commands_rx, entry_events_rx, sink_errors_rx)?;

		Ok(Self {
			commands,
			events,
			current,
			session: Some(session),
			pool: None,
			feeder: None,
			shutdown_blocking: config.shutdown_blocking,
		})
	}

	fn send(&self, command: Command) -> Result<(), SessionError> {
		self.commands.send(command).map_err(|_| SessionError::Closed)
	}

	//---------------------------------------------------------------------------------------------------- Playback
	/// Play `playable` from `pos_ms`.
	///
	/// The playable becomes current in the context as well.
	///
	/// # Errors
	/// The session is closed.
	pub fn play(&self, playable: PlayableId, pos_ms: u32, reason: Reason) -> Result<(), SessionError> {
		self.send(Command::Play { playable, pos_ms, reason })
	}

	/// Skip to the next playable of the context.
	///
	/// # Errors
	/// The session is closed.
	pub fn next(&self) -> Result<(), SessionError> {
		self.send(Command::Next)
	}

	/// Go back to the previous playable of the context,
	/// or to the start of the current one if there is none.
	///
	/// # Errors
	/// The session is closed.
	pub fn previous(&self) -> Result<(), SessionError> {
		self.send(Command::Previous)
	}

	/// Seek the current playable to `ms`.
	///
	/// # Errors
	/// The session is closed.
	pub fn seek(&self, ms: u32) -> Result<(), SessionError> {
		self.send(Command::Seek(ms))
	}

	/// Pause the output.
	///
	/// # Errors
	/// The session is closed.
	pub fn pause(&self) -> Result<(), SessionError> {
		self.send(Command::Pause)
	}

	/// Resume the output, also after an output error.
	///
	/// # Errors
	/// The session is closed.
	pub fn resume(&self) -> Result<(), SessionError> {
		self.send(Command::Resume)
	}

	/// Set the output volume.
	///
	/// # Errors
	/// The session is closed.
	pub fn set_volume(&self, volume: Volume) -> Result<(), SessionError> {
		self.send(Command::Volume(volume))
	}

	//---------------------------------------------------------------------------------------------------- Queries
	#[must_use]
	/// The audible position of the current playable.
	///
	/// `None` if nothing is current or nothing was decoded yet.
	pub fn current_time_ms(&self) -> Option<u32> {
		self.current
			.lock()
			.unwrap_or_else(PoisonError::into_inner)
			.as_ref()
			.and_then(|c| c.position_ms())
	}

	/// The [`PlayerEvent`]s of this session.
	pub const fn events(&self) -> &Receiver<PlayerEvent> {
		&self.events
	}

	/// The storage channel multiplexer, if the [`Services`] had a connection.
	///
	/// The connection reader has to feed inbound packets to
	/// [`ChannelMultiplexer::dispatch`].
	pub fn multiplexer(&self) -> Option<&Arc<ChannelMultiplexer>> {
		self.feeder.as_ref()?.multiplexer()
	}
}

impl Drop for Player {
	#[cold]
	#[inline(never)]
	fn drop(&mut self) {
		debug2!("Player - drop(), blocking: {}", self.shutdown_blocking);
		send!(self.commands, Command::Shutdown);

		if let (true, Some(session)) = (self.shutdown_blocking, self.session.take()) {
			drop(session.join());
		}
		if let Some(pool) = &self.pool {
			pool.shutdown(self.shutdown_blocking);
		}
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		error::{LoadError,OutputError},
		player::ListContext,
		tests::{FakeLoader,Recorded,RecordingOutput,TONE_FORMAT,TONE_SAMPLE},
	};
	use pretty_assertions::assert_eq;
	use std::time::{Duration,Instant};

	const TIMEOUT: Duration = Duration::from_secs(10);

	fn config() -> PlayerConfig {
		PlayerConfig {
			buffer_milliseconds: 100,
			..PlayerConfig::DEFAULT
		}
	}

	fn player(
		config: &PlayerConfig,
		loader: &Arc<FakeLoader>,
		playables: &[&str],
	) -> (Player, Recorded) {
		let recorded = Recorded::default();
		let context = ListContext::new(playables.iter().map(|p| PlayableId::track(p)).collect());
		let player = Player::spawn(
			config,
			Arc::clone(loader) as _,
			Box::new(context),
			RecordingOutput::opener(&recorded, false),
		)
		.unwrap();
		(player, recorded)
	}

	/// Every event until `stop` matches (inclusive).
	fn events_until(player: &Player, stop: impl Fn(&PlayerEvent) -> bool) -> Vec<PlayerEvent> {
		let mut events = Vec::new();
		loop {
			let event = player.events().recv_timeout(TIMEOUT).unwrap();
			let done = stop(&event);
			events.push(event);
			if done {
				return events;
			}
		}
	}

	fn changes(events: &[PlayerEvent]) -> Vec<(String, Reason)> {
		events
			.iter()
			.filter_map(|e| match e {
				PlayerEvent::TrackChanged { playable, reason } => Some((playable.id().to_string(), *reason)),
				_ => None,
			})
			.collect()
	}

	fn wait_samples(recorded: &Recorded, n: usize) -> Vec<i16> {
		let deadline = Instant::now() + TIMEOUT;
		while recorded.samples().len() < n && Instant::now() < deadline {
			std::thread::sleep(Duration::from_millis(10));
		}
		recorded.samples()
	}

	#[test]
	fn plays_context_in_order() {
		let loader = FakeLoader::new(&[("a", 300), ("b", 300)]);
		let (player, recorded) = player(&config(), &loader, &["a", "b"]);
		player.next().unwrap();

		let events = events_until(&player, |e| matches!(e, PlayerEvent::PlaybackEnded));
		assert_eq!(changes(&events), [
			("a".to_string(), Reason::ForwardBtn),
			("b".to_string(), Reason::TrackDone),
		]);
		// `b` was preloaded, then reused.
		assert_eq!(loader.loads(), [
			(PlayableId::track("a"), false),
			(PlayableId::track("b"), true),
		]);

		// Without a crossfade nothing overlaps.
		let samples = wait_samples(&recorded, 600);
		assert_eq!(samples.len(), 600);
		assert!(samples.iter().all(|s| *s == TONE_SAMPLE));
		assert_eq!(recorded.opened().last(), Some(&TONE_FORMAT));
	}

	#[test]
	fn crossfade_starts_next_early() {
		let loader = FakeLoader::new(&[("a", 1000), ("b", 1000)]);
		let config = PlayerConfig {
			crossfade: Duration::from_millis(200),
			..config()
		};
		let (player, recorded) = player(&config, &loader, &["a", "b"]);
		player.next().unwrap();

		let events = events_until(&player, |e| matches!(e, PlayerEvent::PlaybackEnded));
		assert_eq!(changes(&events), [
			("a".to_string(), Reason::ForwardBtn),
			("b".to_string(), Reason::TrackDone),
		]);

		// Whatever overlapped was mixed into one stream.
		let deadline = Instant::now() + TIMEOUT;
		while player.current_time_ms().is_some() && Instant::now() < deadline {
			std::thread::sleep(Duration::from_millis(10));
		}
		let samples = recorded.samples();
		assert!(samples.len() <= 2000, "{}", samples.len());
		assert!(samples.len() >= 1000, "{}", samples.len());
	}

	#[test]
	fn restricted_is_skipped_at_once() {
		let loader = FakeLoader::new(&[("ok", 200)]);
		loader.fail("r", 5, || LoadError::Restricted);
		let (player, _recorded) = player(&config(), &loader, &["r", "ok"]);
		player.next().unwrap();

		let events = events_until(&player, |e| matches!(e, PlayerEvent::PlaybackEnded));
		let failed: Vec<&PlayerEvent> = events
			.iter()
			.filter(|e| matches!(e, PlayerEvent::LoadingFailed { error: LoadError::Restricted, .. }))
			.collect();
		assert_eq!(failed.len(), 1);
		assert_eq!(changes(&events), [
			("r".to_string(), Reason::ForwardBtn),
			("ok".to_string(), Reason::TrackError),
		]);
		assert_eq!(loader.loads().iter().filter(|(p, _)| p.id() == "r").count(), 1);
	}

	#[test]
	fn load_retried_once() {
		let loader = FakeLoader::new(&[("flaky", 200)]);
		loader.fail("flaky", 1, || LoadError::Metadata("timeout".into()));
		let (player, _recorded) = player(&config(), &loader, &["flaky"]);
		player.next().unwrap();

		let events = events_until(&player, |e| matches!(e, PlayerEvent::PlaybackEnded));
		assert!(events.iter().any(|e| matches!(e, PlayerEvent::TrackLoaded { duration_ms: 200, .. })));
		assert!(!events.iter().any(|e| matches!(e, PlayerEvent::LoadingFailed { .. })));
		assert_eq!(loader.loads().len(), 2);
	}

	#[test]
	// A preloaded next entry that fails is replaced once, still as a preload,
	// and played when its turn comes.
	fn preloaded_next_retried_once() {
		let loader = FakeLoader::new(&[("a", 1000), ("b", 200)]);
		loader.fail("b", 1, || LoadError::Metadata("timeout".into()));
		let (player, recorded) = player(&config(), &loader, &["a", "b"]);
		recorded.pace(true);
		player.next().unwrap();

		let events = events_until(&player, |e| matches!(e, PlayerEvent::PlaybackEnded));
		assert!(!events.iter().any(|e| matches!(e, PlayerEvent::LoadingFailed { .. })));
		assert!(events.iter().any(|e| matches!(
			e,
			PlayerEvent::TrackLoaded { playable, duration_ms: 200, .. } if playable.id() == "b"
		)));
		assert_eq!(changes(&events), [
			("a".to_string(), Reason::ForwardBtn),
			("b".to_string(), Reason::TrackDone),
		]);
		assert_eq!(loader.loads(), [
			(PlayableId::track("a"), false),
			(PlayableId::track("b"), true),
			(PlayableId::track("b"), true),
		]);
	}

	#[test]
	fn second_failure_skips() {
		let loader = FakeLoader::new(&[("ok", 200)]);
		loader.fail("bad", 2, || LoadError::NoFiles);
		let (player, _recorded) = player(&config(), &loader, &["bad", "ok"]);
		player.next().unwrap();

		let events = events_until(&player, |e| matches!(e, PlayerEvent::PlaybackEnded));
		assert!(events.iter().any(|e| matches!(
			e,
			PlayerEvent::LoadingFailed { error: LoadError::NoFiles, playable } if playable.id() == "bad"
		)));
		assert!(events.iter().any(|e| matches!(
			e,
			PlayerEvent::TrackLoaded { playable, .. } if playable.id() == "ok"
		)));
	}

	#[test]
	fn play_picks_and_skip_past_the_end_stops() {
		let loader = FakeLoader::new(&[("a", 60_000), ("b", 60_000)]);
		let (player, recorded) = player(&config(), &loader, &["a", "b"]);
		recorded.pace(true);
		player.play(PlayableId::track("b"), 0, Reason::ClickRow).unwrap();
		events_until(&player, |e| matches!(e, PlayerEvent::TrackLoaded { .. }));

		let deadline = Instant::now() + TIMEOUT;
		while player.current_time_ms().is_none() && Instant::now() < deadline {
			std::thread::sleep(Duration::from_millis(10));
		}
		assert!(player.current_time_ms().is_some());

		// `b` is the last one.
		player.next().unwrap();
		events_until(&player, |e| matches!(e, PlayerEvent::PlaybackEnded));
		let deadline = Instant::now() + TIMEOUT;
		while player.current_time_ms().is_some() && Instant::now() < deadline {
			std::thread::sleep(Duration::from_millis(10));
		}
		assert_eq!(player.current_time_ms(), None);
	}

	#[test]
	fn previous_and_seek() {
		let loader = FakeLoader::new(&[("a", 60_000), ("b", 60_000)]);
		let (player, recorded) = player(&config(), &loader, &["a", "b"]);
		recorded.pace(true);
		player.next().unwrap();
		player.next().unwrap();
		player.previous().unwrap();

		let events = events_until(&player, |e| matches!(
			e,
			PlayerEvent::TrackChanged { reason: Reason::BackBtn, .. }
		));
		assert_eq!(changes(&events), [
			("a".to_string(), Reason::ForwardBtn),
			("b".to_string(), Reason::ForwardBtn),
			("a".to_string(), Reason::BackBtn),
		]);

		player.seek(30_000).unwrap();
		let deadline = Instant::now() + TIMEOUT;
		while player.current_time_ms().map_or(true, |t| t < 30_000) && Instant::now() < deadline {
			std::thread::sleep(Duration::from_millis(10));
		}
		assert!(player.current_time_ms().is_some_and(|t| t >= 30_000));
	}

	#[test]
	fn output_error_reported() {
		let loader = FakeLoader::new(&[("a", 60_000)]);
		let (player, recorded) = player(&config(), &loader, &["a"]);
		recorded.fail_writes(true);
		player.next().unwrap();

		let events = events_until(&player, |e| matches!(e, PlayerEvent::PlaybackFailed { .. }));
		assert!(matches!(
			events.last(),
			Some(PlayerEvent::PlaybackFailed {
				playable: Some(_),
				error: TandemError::Output(OutputError::Write),
			})
		));
	}

	#[test]
	fn drop_closes_session() {
		let loader = FakeLoader::new(&[("a", 60_000)]);
		let (player, recorded) = player(&config(), &loader, &["a"]);
		recorded.pace(true);
		player.next().unwrap();
		player.set_volume(Volume::new(0.5)).unwrap();
		player.pause().unwrap();
		player.resume().unwrap();

		let events = player.events().clone();
		drop(player);
		let closed = events
			.iter()
			.find(|e| matches!(e, PlayerEvent::SessionClosed { .. }));
		assert!(matches!(closed, Some(PlayerEvent::SessionClosed { error: None })));
	}
}
