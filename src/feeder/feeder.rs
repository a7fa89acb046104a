//! Playable id -> decrypted, positioned content stream.

//---------------------------------------------------------------------------------------------------- Use
use std::{
	sync::Arc,
	time::{Duration,Instant},
};
use crate::{
	codec::CodecKind,
	config::{PlayerConfig,VORBIS_HEADER_LEN},
	crypto::ChunkDecryptor,
	error::{ChunkError,LoadError},
	feeder::{
		FileId,KeyProvider,MetadataProvider,NormalizationData,PlayableId,
		QualityPolicy,StorageResolver,StorageResult,TrackMetadata,
	},
	macros::{debug2,info2,warn2},
	stream::{ChunkedStream,HaltListener},
	transport::{CdnChunkFetcher,CdnUrl,ChannelMultiplexer,ChunkCache,FetchPool,PacketSender,Transport},
};

//---------------------------------------------------------------------------------------------------- Services
/// The external collaborators of a [`ContentFeeder`].
#[derive(Clone)]
pub struct Services {
	/// Track and episode metadata.
	pub metadata: Arc<dyn MetadataProvider>,
	/// Audio keys.
	pub keys: Arc<dyn KeyProvider>,
	/// Storage resolution, also renews CDN urls.
	pub storage: Arc<dyn StorageResolver>,
	/// The authenticated connection, `None` means CDN only.
	pub packets: Option<Arc<dyn PacketSender>>,
	/// Chunk cache consulted before any fetch.
	pub cache: Option<Arc<dyn ChunkCache>>,
}

impl std::fmt::Debug for Services {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Services")
			.field("packets", &self.packets.is_some())
			.field("cache", &self.cache.is_some())
			.finish_non_exhaustive()
	}
}

//---------------------------------------------------------------------------------------------------- LoadedStream
/// How a load went, reported with [`crate::player::PlayerEvent::TrackLoaded`].
#[derive(Copy,Clone,Debug,PartialEq,Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlaybackMetrics {
	/// The file played, `None` for external episodes.
	pub file_id: Option<FileId>,
	/// `"storage"`, `"cdn"` or `"source"`.
	pub transport: &'static str,
	/// Was the key fetched for a preload?
	pub preloaded_key: bool,
	/// How long the key request took.
	pub key_time_ms: u64,
}

/// A loaded playable, its stream positioned at the codec payload.
#[derive(Debug)]
pub struct LoadedStream {
	/// The playable's metadata.
	pub metadata: TrackMetadata,
	/// The content.
	pub stream: ChunkedStream,
	/// Codec of the content.
	pub codec: CodecKind,
	/// Normalization data, Vorbis files only.
	pub normalization: Option<NormalizationData>,
	/// Load metrics.
	pub metrics: PlaybackMetrics,
}

//---------------------------------------------------------------------------------------------------- ContentFeeder
/// Turns playable ids into decrypted content streams.
///
/// Owns the [`ChannelMultiplexer`] of the connection (if any),
/// all transports fetch on the same [`FetchPool`].
#[derive(Debug)]
pub struct ContentFeeder {
	services: Services,
	mux: Option<Arc<ChannelMultiplexer>>,
	pool: FetchPool,
	country: String,
	aggressive_retry: bool,
	header_timeout: Duration,
}

impl ContentFeeder {
	#[cold]
	#[inline(never)]
	/// Create a feeder fetching on `pool`.
	pub fn new(services: Services, pool: FetchPool, config: &PlayerConfig) -> Self {
		let mux = services
			.packets
			.as_ref()
			.map(|packets| ChannelMultiplexer::new(Arc::clone(packets), pool.clone()));

		Self {
			services,
			mux,
			pool,
			country: config.country.clone(),
			aggressive_retry: config.aggressive_chunk_retry,
			header_timeout: config.storage_header_timeout,
		}
	}

	/// The storage channel multiplexer.
	///
	/// The connection reader feeds inbound packets
	/// to [`ChannelMultiplexer::dispatch`].
	pub const fn multiplexer(&self) -> Option<&Arc<ChannelMultiplexer>> {
		self.mux.as_ref()
	}

	/// Load `playable`.
	///
	/// Blocks until the content size is known (and, for Vorbis,
	/// until the normalization data was read).
	///
	/// # Errors
	/// - [`LoadError::Restricted`] before anything is fetched
	/// - [`LoadError::NoFiles`] / [`LoadError::FormatUnsupported`]
	/// - any collaborator or stream failure
	pub fn load(
		&self,
		playable: &PlayableId,
		quality: &dyn QualityPolicy,
		is_preload: bool,
		halt: Option<Arc<dyn HaltListener>>,
	) -> Result<LoadedStream, LoadError> {
		let metadata = self.services.metadata.metadata(playable)?;
		debug2!("ContentFeeder - {playable}: {} ({}ms)", metadata.name, metadata.duration_ms);

		if metadata.is_restricted(&self.country) {
			info2!("ContentFeeder - {playable} is restricted in {:?}", self.country);
			return Err(LoadError::Restricted);
		}

		if let (PlayableId::Episode(_), Some(url)) = (playable, metadata.external_url.clone()) {
			return self.load_external(metadata, &url, halt);
		}

		let files = metadata.playable_files();
		if files.is_empty() {
			return Err(LoadError::NoFiles);
		}
		let Some(file) = quality.select(files) else {
			warn2!("ContentFeeder - {playable}: no supported format in {} files", files.len());
			return Err(LoadError::FormatUnsupported);
		};
		let Some(codec) = file.format.codec() else {
			return Err(LoadError::FormatUnsupported);
		};
		debug2!("ContentFeeder - {playable}: picked {} ({})", file.file_id, file.format.as_ref());

		let now = Instant::now();
		let key = self.services.keys.audio_key(playable, &file.file_id)?;
		let key_time_ms = u64::try_from(now.elapsed().as_millis()).unwrap_or(u64::MAX);
		let decryptor = ChunkDecryptor::Aes(key);

		let mut stream = self.open_resolved(file.file_id, decryptor, halt)?;
		let normalization = Self::position(&mut stream, codec)?;

		let metrics = PlaybackMetrics {
			file_id: Some(file.file_id),
			transport: stream.transport_name(),
			preloaded_key: is_preload,
			key_time_ms,
		};
		info2!("ContentFeeder - loaded {playable}, {metrics:?}");

		Ok(LoadedStream {
			metadata,
			stream,
			codec,
			normalization,
			metrics,
		})
	}

	/// Plain MP3 from the episode's own url, no key, no normalization.
	fn load_external(
		&self,
		metadata: TrackMetadata,
		url: &str,
		halt: Option<Arc<dyn HaltListener>>,
	) -> Result<LoadedStream, LoadError> {
		debug2!("ContentFeeder - external episode: {url}");
		let file = FileId::default();
		let transport = self.cdn(file, url, false)?;
		let stream = ChunkedStream::open(file, transport, ChunkDecryptor::None, None, halt, self.aggressive_retry);
		stream.wait_for_size(self.header_timeout)?;

		Ok(LoadedStream {
			metadata,
			stream,
			codec: CodecKind::Mp3,
			normalization: None,
			metrics: PlaybackMetrics {
				file_id: None,
				transport: "cdn",
				preloaded_key: false,
				key_time_ms: 0,
			},
		})
	}

	/// Resolve where `file` lives and open it there, falling back to
	/// the CDN when storage redirects.
	fn open_resolved(
		&self,
		file: FileId,
		decryptor: ChunkDecryptor,
		halt: Option<Arc<dyn HaltListener>>,
	) -> Result<ChunkedStream, LoadError> {
		let response = self.services.storage.resolve(&file)?;
		debug2!("ContentFeeder - {file} resolved to {}", response.result);

		let transport = match response.result {
			StorageResult::Restricted => return Err(LoadError::Restricted),
			StorageResult::Cdn => {
				let Some(url) = response.cdn_urls.first() else {
					return Err(LoadError::CdnResolution("no cdn url".into()));
				};
				self.cdn(file, url, true)?
			},
			StorageResult::Storage => match (&self.mux, response.cdn_urls.first()) {
				(Some(mux), _) => Transport::Storage { mux: Arc::clone(mux), file },
				(None, Some(url)) => {
					warn2!("ContentFeeder - {file} is in storage but there is no connection, trying cdn");
					self.cdn(file, url, true)?
				},
				(None, None) => return Err(LoadError::CdnResolution("storage without a connection".into())),
			},
		};

		let stream = self.open(file, transport, decryptor, halt.clone());
		match stream.wait_for_size(self.header_timeout) {
			Ok(_) => Ok(stream),
			Err(ChunkError::StorageUnavailable { cdn_url }) => {
				info2!("ContentFeeder - {file} not in storage, falling back to cdn");
				stream.close();
				let transport = self.cdn(file, &cdn_url, true)?;
				let stream = self.open(file, transport, decryptor, halt);
				stream.wait_for_size(self.header_timeout)?;
				Ok(stream)
			},
			Err(e) => Err(e.into()),
		}
	}

	fn open(
		&self,
		file: FileId,
		transport: Transport,
		decryptor: ChunkDecryptor,
		halt: Option<Arc<dyn HaltListener>>,
	) -> ChunkedStream {
		ChunkedStream::open(file, transport, decryptor, self.services.cache.clone(), halt, self.aggressive_retry)
	}

	fn cdn(&self, file: FileId, url: &str, renewable: bool) -> Result<Transport, LoadError> {
		let resolver = renewable.then(|| Arc::clone(&self.services.storage));
		let url = CdnUrl::new(file, url, resolver)?;
		Ok(Transport::Cdn(CdnChunkFetcher::new(url, self.pool.clone())?))
	}

	/// Read what precedes the codec payload, leaving the stream at it.
	fn position(stream: &mut ChunkedStream, codec: CodecKind) -> Result<Option<NormalizationData>, LoadError> {
		match codec {
			CodecKind::Vorbis => {
				let normalization = NormalizationData::read(stream)?;
				stream.skip(VORBIS_HEADER_LEN)?;
				Ok(Some(normalization))
			},
			CodecKind::Mp3 => Ok(None),
		}
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		config::CHUNK_SIZE,
		crypto::AudioKey,
		error::TransportError,
		feeder::{AudioFile,AudioFormat,AudioQuality,Restriction,StorageResolveResponse,VorbisOnlyQuality},
		stream::HEADER_CDN_URL,
		tests::{encrypt,http_server,random_bytes,KEY},
		transport::PacketType,
	};
	use pretty_assertions::assert_eq;
	use std::{
		io::Read,
		sync::{atomic::{AtomicUsize,Ordering},OnceLock,Weak},
	};

	/// Every collaborator at once, counting calls.
	struct Backend {
		metadata: TrackMetadata,
		storage: StorageResolveResponse,
		metadata_calls: AtomicUsize,
		key_calls: AtomicUsize,
		resolve_calls: AtomicUsize,
	}

	impl Backend {
		fn new(metadata: TrackMetadata, result: StorageResult, cdn_urls: Vec<String>) -> Arc<Self> {
			Arc::new(Self {
				metadata,
				storage: StorageResolveResponse { result, cdn_urls },
				metadata_calls: AtomicUsize::new(0),
				key_calls: AtomicUsize::new(0),
				resolve_calls: AtomicUsize::new(0),
			})
		}

		fn services(self: &Arc<Self>, packets: Option<Arc<dyn PacketSender>>) -> Services {
			Services {
				metadata: Arc::clone(self) as _,
				keys: Arc::clone(self) as _,
				storage: Arc::clone(self) as _,
				packets,
				cache: None,
			}
		}
	}

	impl MetadataProvider for Backend {
		fn metadata(&self, _: &PlayableId) -> Result<TrackMetadata, LoadError> {
			self.metadata_calls.fetch_add(1, Ordering::SeqCst);
			Ok(self.metadata.clone())
		}
	}

	impl KeyProvider for Backend {
		fn audio_key(&self, _: &PlayableId, _: &FileId) -> Result<AudioKey, LoadError> {
			self.key_calls.fetch_add(1, Ordering::SeqCst);
			Ok(KEY)
		}
	}

	impl StorageResolver for Backend {
		fn resolve(&self, _: &FileId) -> Result<StorageResolveResponse, LoadError> {
			self.resolve_calls.fetch_add(1, Ordering::SeqCst);
			Ok(self.storage.clone())
		}
	}

	/// Answers every storage request with a CDN redirect.
	struct Redirect {
		mux: OnceLock<Weak<ChannelMultiplexer>>,
		url: String,
	}

	impl PacketSender for Redirect {
		fn send(&self, packet: PacketType, payload: &[u8]) -> Result<(), TransportError> {
			assert_eq!(packet, PacketType::StreamChunk);
			let Some(mux) = self.mux.get().and_then(Weak::upgrade) else {
				return Ok(());
			};

			let len = u16::try_from(1 + self.url.len()).unwrap();
			let mut res = payload[..2].to_vec();
			res.extend_from_slice(&len.to_be_bytes());
			res.push(HEADER_CDN_URL);
			res.extend_from_slice(self.url.as_bytes());
			res.extend_from_slice(&[0, 0]);
			mux.dispatch(PacketType::StreamChunkRes, &res)
		}
	}

	const NORMALIZATION: NormalizationData = NormalizationData {
		track_gain_db: -3.5,
		track_peak:    0.9,
		album_gain_db: -2.0,
		album_peak:    0.95,
	};

	/// A Vorbis-like file: header, normalization at 144, payload at 0xa7.
	fn vorbis_file(payload: &[u8]) -> Vec<u8> {
		let mut file = vec![0; VORBIS_HEADER_LEN as usize];
		let n = NORMALIZATION;
		for (i, f) in [n.track_gain_db, n.track_peak, n.album_gain_db, n.album_peak].into_iter().enumerate() {
			file[144 + i * 4..148 + i * 4].copy_from_slice(&f.to_le_bytes());
		}
		file.extend_from_slice(payload);
		file
	}

	fn track(format: AudioFormat) -> TrackMetadata {
		TrackMetadata {
			name: "song".into(),
			duration_ms: 1000,
			files: vec![AudioFile { file_id: FileId::TEST, format }],
			..Default::default()
		}
	}

	fn feeder(services: Services, pool: &FetchPool, country: &str) -> ContentFeeder {
		let config = PlayerConfig {
			country: country.into(),
			storage_header_timeout: Duration::from_secs(10),
			..PlayerConfig::DEFAULT
		};
		ContentFeeder::new(services, pool.clone(), &config)
	}

	fn quality() -> VorbisOnlyQuality {
		VorbisOnlyQuality(AudioQuality::Normal)
	}

	#[test]
	fn restricted_fetches_nothing() {
		let mut meta = track(AudioFormat::OggVorbis96);
		meta.restrictions = vec![Restriction { countries_allowed: None, countries_forbidden: Some("SE".into()) }];
		let backend = Backend::new(meta, StorageResult::Cdn, vec![]);
		let pool = FetchPool::new(1).unwrap();

		let feeder = feeder(backend.services(None), &pool, "SE");
		let result = feeder.load(&PlayableId::track("a"), &quality(), false, None);
		assert!(matches!(result, Err(LoadError::Restricted)));
		assert_eq!(backend.key_calls.load(Ordering::SeqCst), 0);
		assert_eq!(backend.resolve_calls.load(Ordering::SeqCst), 0);
		pool.shutdown(false);
	}

	#[test]
	fn storage_restricted() {
		let backend = Backend::new(track(AudioFormat::OggVorbis96), StorageResult::Restricted, vec![]);
		let pool = FetchPool::new(1).unwrap();

		let feeder = feeder(backend.services(None), &pool, "");
		let result = feeder.load(&PlayableId::track("a"), &quality(), false, None);
		assert!(matches!(result, Err(LoadError::Restricted)));
		pool.shutdown(false);
	}

	#[test]
	fn cdn_positions_at_payload() {
		let payload = random_bytes(CHUNK_SIZE + 500);
		let file = vorbis_file(&payload);
		let url = http_server(encrypt(&file, ChunkDecryptor::Aes(KEY)), 206);
		let backend = Backend::new(track(AudioFormat::OggVorbis96), StorageResult::Cdn, vec![url]);
		let pool = FetchPool::new(2).unwrap();

		let feeder = feeder(backend.services(None), &pool, "SE");
		let mut loaded = feeder.load(&PlayableId::track("a"), &quality(), true, None).unwrap();

		assert_eq!(loaded.codec, CodecKind::Vorbis);
		assert_eq!(loaded.normalization, Some(NORMALIZATION));
		assert_eq!(loaded.stream.position(), VORBIS_HEADER_LEN);
		assert_eq!(loaded.stream.size(), Some(file.len() as u64));
		assert_eq!(loaded.metrics.file_id, Some(FileId::TEST));
		assert_eq!(loaded.metrics.transport, "cdn");
		assert!(loaded.metrics.preloaded_key);
		assert_eq!(backend.key_calls.load(Ordering::SeqCst), 1);

		let mut out = vec![];
		loaded.stream.read_to_end(&mut out).unwrap();
		assert!(out == payload);
		pool.shutdown(false);
	}

	#[test]
	fn storage_redirects_to_cdn() {
		let file = vorbis_file(&random_bytes(1000));
		let url = http_server(encrypt(&file, ChunkDecryptor::Aes(KEY)), 206);
		let redirect = Arc::new(Redirect { mux: OnceLock::new(), url });
		let backend = Backend::new(track(AudioFormat::OggVorbis160), StorageResult::Storage, vec![]);
		let pool = FetchPool::new(2).unwrap();

		let feeder = feeder(backend.services(Some(Arc::clone(&redirect) as _)), &pool, "");
		let mux = feeder.multiplexer().unwrap();
		redirect.mux.set(Arc::downgrade(mux)).unwrap();

		let loaded = feeder.load(&PlayableId::track("a"), &quality(), false, None).unwrap();
		assert_eq!(loaded.metrics.transport, "cdn");
		assert_eq!(loaded.normalization, Some(NORMALIZATION));
		assert_eq!(loaded.stream.size(), Some(file.len() as u64));
		pool.shutdown(false);
	}

	#[test]
	fn file_selection() {
		let pool = FetchPool::new(1).unwrap();

		let backend = Backend::new(TrackMetadata::default(), StorageResult::Cdn, vec![]);
		let result = feeder(backend.services(None), &pool, "").load(&PlayableId::track("a"), &quality(), false, None);
		assert!(matches!(result, Err(LoadError::NoFiles)));

		let backend = Backend::new(track(AudioFormat::Aac48), StorageResult::Cdn, vec![]);
		let result = feeder(backend.services(None), &pool, "").load(&PlayableId::track("a"), &quality(), false, None);
		assert!(matches!(result, Err(LoadError::FormatUnsupported)));
		assert_eq!(backend.key_calls.load(Ordering::SeqCst), 0);

		pool.shutdown(false);
	}

	#[test]
	fn external_episode() {
		let mp3 = random_bytes(3000);
		let url = http_server(mp3.clone(), 206);
		let meta = TrackMetadata { external_url: Some(url), ..Default::default() };
		let backend = Backend::new(meta, StorageResult::Cdn, vec![]);
		let pool = FetchPool::new(1).unwrap();

		let feeder = feeder(backend.services(None), &pool, "");
		let mut loaded = feeder.load(&PlayableId::episode("e"), &quality(), false, None).unwrap();
		assert_eq!(loaded.codec, CodecKind::Mp3);
		assert_eq!(loaded.normalization, None);
		assert_eq!(loaded.metrics.file_id, None);
		assert_eq!(backend.key_calls.load(Ordering::SeqCst), 0);
		assert_eq!(backend.resolve_calls.load(Ordering::SeqCst), 0);

		let mut out = vec![];
		loaded.stream.read_to_end(&mut out).unwrap();
		assert!(out == mp3);
		pool.shutdown(false);
	}
}
