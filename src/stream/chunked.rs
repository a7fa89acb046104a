//! `ChunkedStream`, a blocking reader over a sparse chunk array.
//!
//! Chunks are fetched by a [`Transport`] on other threads and delivered
//! through a [`ChunkSink`]. The reader only ever blocks on the one
//! chunk covering its position, everything else is fire-and-forget.

//---------------------------------------------------------------------------------------------------- Use
use std::{
	io::{self,Read,Seek,SeekFrom},
	sync::{Arc,Weak,Condvar,Mutex,MutexGuard},
	time::{Duration,Instant},
};
use crate::{
	config::{CHUNK_SIZE,PRELOAD_AHEAD,PRELOAD_CHUNK_RETRIES,MAX_CHUNK_TRIES,WAIT_SLICE},
	crypto::ChunkDecryptor,
	error::ChunkError,
	feeder::FileId,
	free::{now_millis,chunk_backoff},
	macros::{debug2,trace2,warn2},
	stream::{ChunkSink,HaltListener,HEADER_SIZE},
	transport::{ChunkCache,Transport},
};

//---------------------------------------------------------------------------------------------------- Chunk math
#[inline]
#[allow(clippy::cast_possible_truncation)]
/// The chunk covering byte `pos`.
pub(super) const fn chunk_index(pos: u64) -> u32 {
	// Contents are far below 2^32 chunks (512 TiB).
	(pos / CHUNK_SIZE as u64) as u32
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
/// How many chunks a content of `size` bytes has.
pub(super) const fn chunk_count(size: u64) -> u32 {
	((size + CHUNK_SIZE as u64 - 1) / CHUNK_SIZE as u64) as u32
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
/// The exact length chunk `index` must have.
///
/// `0` for chunks past the end.
pub(super) const fn expected_len(size: u64, index: u32) -> usize {
	let start = index as u64 * CHUNK_SIZE as u64;
	if start >= size {
		return 0;
	}
	let len = size - start;
	if len > CHUNK_SIZE as u64 {
		CHUNK_SIZE
	} else {
		len as usize
	}
}

//---------------------------------------------------------------------------------------------------- State
#[derive(Debug,Default)]
pub(super) struct Slot {
	/// `Some` == available, always `expected_len()` long.
	pub(super) data: Option<Box<[u8]>>,
	pub(super) requested: bool,
	/// Failures so far, only ever increases.
	pub(super) retries: u32,
	/// The last failure, not yet seen by the reader.
	pub(super) error: Option<ChunkError>,
}

#[derive(Debug,Default)]
pub(super) struct State {
	/// `None` until the first header/response arrives.
	pub(super) size: Option<u64>,
	pub(super) chunks: Vec<Slot>,
	/// A failure of the whole content, e.g. a CDN redirect.
	pub(super) fatal: Option<ChunkError>,
	/// The chunk the reader is currently blocked on.
	pub(super) waiting: Option<u32>,
	pub(super) closed: bool,
}

impl State {
	pub(super) fn slot(&mut self, index: u32) -> &mut Slot {
		let i = index as usize;
		if i >= self.chunks.len() {
			self.chunks.resize_with(i + 1, Slot::default);
		}
		&mut self.chunks[i]
	}

	pub(super) fn is_available(&self, index: u32) -> bool {
		self.chunks
			.get(index as usize)
			.is_some_and(|s| s.data.is_some())
	}

	fn is_past_end(&self, index: u32) -> bool {
		self.size.is_some_and(|s| index >= chunk_count(s))
	}

	/// Mark `index` and up to [`PRELOAD_AHEAD`] following chunks
	/// as requested, returning the ones that need a request.
	fn plan_requests(&mut self, index: u32) -> Vec<u32> {
		let mut out = vec![];

		if !self.is_past_end(index) {
			let slot = self.slot(index);
			if slot.data.is_none() && !slot.requested {
				slot.requested = true;
				slot.error = None;
				out.push(index);
			}
		}

		// Nothing to preload until we know where the content ends.
		let Some(size) = self.size else {
			return out;
		};
		let last = chunk_count(size);
		let end = std::cmp::min(index.saturating_add(PRELOAD_AHEAD), last.saturating_sub(1));
		for i in index.saturating_add(1)..=end {
			let slot = self.slot(i);
			if slot.data.is_none() && !slot.requested && slot.retries < PRELOAD_CHUNK_RETRIES {
				slot.requested = true;
				slot.error = None;
				out.push(i);
			}
		}

		out
	}
}

//---------------------------------------------------------------------------------------------------- Shared
/// The state shared between the reader and every [`ChunkSink`].
pub(super) struct Shared {
	pub(super) file: FileId,
	state: Mutex<State>,
	/// One condvar for everything, waiters re-check their predicate.
	cond: Condvar,
	transport: Transport,
	decryptor: ChunkDecryptor,
	cache: Option<Arc<dyn ChunkCache>>,
	halt: Option<Arc<dyn HaltListener>>,
	aggressive: bool,
}

impl Shared {
	pub(super) fn lock(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	fn wait<'a>(&self, state: MutexGuard<'a, State>, timeout: Duration) -> MutexGuard<'a, State> {
		self.cond
			.wait_timeout(state, timeout)
			.unwrap_or_else(std::sync::PoisonError::into_inner)
			.0
	}

	/// Sleep `duration` unless closed in the meantime.
	fn backoff<'a>(&self, mut state: MutexGuard<'a, State>, duration: Duration) -> MutexGuard<'a, State> {
		let deadline = Instant::now() + duration;
		loop {
			let now = Instant::now();
			if state.closed || now >= deadline {
				return state;
			}
			state = self.wait(state, std::cmp::min(deadline - now, WAIT_SLICE));
		}
	}

	/// Issue requests, from the cache when it has the chunk.
	///
	/// Must not be called with the lock held.
	fn request(self: &Arc<Self>, indices: &[u32]) {
		for &index in indices {
			if let Some(cache) = &self.cache {
				if cache.has_chunk(&self.file, index) {
					match cache.read_chunk(&self.file, index) {
						Ok(data) => {
							trace2!("ChunkedStream - {} chunk {index} from cache", self.file);
							self.deliver(index, data, false);
							continue;
						},
						Err(e) => warn2!("ChunkedStream - {} cache read of chunk {index} failed: {e}", self.file),
					}
				}
			}

			trace2!("ChunkedStream - {} requesting chunk {index}", self.file);
			self.transport.request_chunk(index, ChunkSink::new(self));
		}
	}

	/// A chunk arrived, validate, cache, decrypt and store it.
	pub(super) fn deliver(&self, index: u32, mut data: Vec<u8>, from_network: bool) {
		let expected = {
			let state = self.lock();
			if state.closed || state.is_available(index) {
				return;
			}
			match state.size {
				Some(size) => expected_len(size, index),
				None => {
					drop(state);
					self.fail(index, ChunkError::UnknownSize);
					return;
				},
			}
		};

		if data.len() != expected {
			self.fail(index, ChunkError::Length { index, expected, got: data.len() });
			return;
		}

		// Cached bytes are stored as received.
		if from_network {
			if let Some(cache) = &self.cache {
				if let Err(e) = cache.write_chunk(&self.file, index, &data) {
					warn2!("ChunkedStream - {} cache write of chunk {index} failed: {e}", self.file);
				}
			}
		}

		self.decryptor.decrypt_chunk(index, &mut data);

		let mut state = self.lock();
		if state.closed {
			return;
		}
		let slot = state.slot(index);
		slot.data = Some(data.into_boxed_slice());
		slot.requested = true;
		slot.error = None;
		let notify = state.waiting == Some(index);
		drop(state);

		trace2!("ChunkedStream - {} chunk {index} available", self.file);
		if notify {
			self.cond.notify_all();
		}
	}

	/// Chunk `index` failed.
	pub(super) fn fail(&self, index: u32, error: ChunkError) {
		let mut state = self.lock();
		if state.closed || state.is_available(index) {
			return;
		}

		debug2!("ChunkedStream - {} chunk {index} failed: {error}", self.file);
		let slot = state.slot(index);
		slot.retries = slot.retries.saturating_add(1);
		slot.requested = false;
		slot.error = Some(error);

		let notify = state.waiting == Some(index);
		drop(state);
		if notify {
			self.cond.notify_all();
		}
	}

	pub(super) fn set_size(&self, size: u64, from_network: bool) {
		let mut state = self.lock();
		if state.closed {
			return;
		}
		match state.size {
			Some(s) if s == size => return,
			Some(s) => {
				warn2!("ChunkedStream - {} size changed from {s} to {size}, ignoring", self.file);
				return;
			},
			None => state.size = Some(size),
		}
		drop(state);

		debug2!("ChunkedStream - {} size: {size}", self.file);
		if from_network {
			if let Some(cache) = &self.cache {
				if let Err(e) = cache.set_header(&self.file, HEADER_SIZE, &size.to_be_bytes()) {
					warn2!("ChunkedStream - {} cache size write failed: {e}", self.file);
				}
			}
		}
		self.cond.notify_all();
	}

	pub(super) fn set_fatal(&self, error: ChunkError) {
		let mut state = self.lock();
		if state.closed || state.fatal.is_some() {
			return;
		}
		debug2!("ChunkedStream - {} fatal: {error}", self.file);
		state.fatal = Some(error);
		drop(state);
		self.cond.notify_all();
	}

	pub(super) fn is_closed(&self) -> bool {
		self.lock().closed
	}

	fn close(&self) {
		let mut state = self.lock();
		if state.closed {
			return;
		}
		state.closed = true;
		state.chunks = Vec::new();
		drop(state);

		trace2!("ChunkedStream - {} closed", self.file);
		self.cond.notify_all();
	}
}

//---------------------------------------------------------------------------------------------------- ChunkedStream
/// A blocking, seekable byte stream over chunked content.
///
/// The content's size is only known once its first response
/// arrives. Reads block until the chunk covering the current
/// position is available, while up to 3 following chunks are
/// requested in the background.
///
/// Dropping the stream closes it.
pub struct ChunkedStream {
	shared: Arc<Shared>,
	pos: u64,
	mark: u64,
}

impl std::fmt::Debug for ChunkedStream {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChunkedStream")
			.field("file", &self.shared.file)
			.field("pos", &self.pos)
			.field("size", &self.size())
			.finish_non_exhaustive()
	}
}

impl ChunkedStream {
	#[cold]
	#[inline(never)]
	/// Open a stream and request its first chunk.
	///
	/// - `cache` is consulted before every request, and
	///   receives every chunk and size fetched from the network
	/// - `halt` receives stall notifications of blocking reads
	/// - `aggressive_retry` retries failing chunks up to 128 times instead of once
	pub fn open(
		file: FileId,
		transport: Transport,
		decryptor: ChunkDecryptor,
		cache: Option<Arc<dyn ChunkCache>>,
		halt: Option<Arc<dyn HaltListener>>,
		aggressive_retry: bool,
	) -> Self {
		debug2!("ChunkedStream - opening {file}, transport: {}, encrypted: {}", transport.name(), decryptor.is_encrypted());

		let mut state = State::default();
		if let Some(cache) = &cache {
			if let Some(size) = cache
				.header(&file, HEADER_SIZE)
				.and_then(|h| <[u8; 8]>::try_from(h.as_slice()).ok())
			{
				state.size = Some(u64::from_be_bytes(size));
			}
		}

		let shared = Arc::new(Shared {
			file,
			state: Mutex::new(state),
			cond: Condvar::new(),
			transport,
			decryptor,
			cache,
			halt,
			aggressive: aggressive_retry,
		});

		let this = Self { shared, pos: 0, mark: 0 };
		if let Err(e) = this.check_availability(0, false) {
			warn2!("ChunkedStream - {} first request failed: {e}", this.shared.file);
		}
		this
	}

	//---------------------------------------------------------------------------------------------------- Availability
	fn should_retry(&self, retries: u32) -> bool {
		retries <= 1 || (self.shared.aggressive && retries < MAX_CHUNK_TRIES)
	}

	/// Request `index` and the chunks after it, and if `wait`,
	/// block until `index` is available.
	fn check_availability(&self, index: u32, wait: bool) -> Result<(), ChunkError> {
		let shared = &self.shared;
		let mut halted = false;
		let mut state = shared.lock();

		loop {
			if state.closed {
				state.waiting = None;
				return Err(ChunkError::Closed);
			}
			if let Some(e) = &state.fatal {
				let e = e.clone();
				state.waiting = None;
				return Err(e);
			}
			if state.is_past_end(index) {
				break;
			}

			// The chunk we need failed since we last looked.
			if wait && !state.is_available(index) {
				let slot = state.slot(index);
				if let Some(error) = slot.error.take() {
					let retries = slot.retries;
					if !error.is_retryable() || !self.should_retry(retries) {
						warn2!("ChunkedStream - {} chunk {index} failed after {retries} tries: {error}", shared.file);
						state.waiting = None;
						return Err(error);
					}

					let backoff = chunk_backoff(retries);
					debug2!("ChunkedStream - {} retrying chunk {index} (tries: {retries}) in {backoff:?}", shared.file);
					state = shared.backoff(state, backoff);
					continue;
				}
			}

			let requests = state.plan_requests(index);
			if !requests.is_empty() {
				drop(state);
				shared.request(&requests);
				state = shared.lock();
			}

			if !wait || state.is_available(index) {
				break;
			}

			if !halted {
				halted = true;
				if let Some(listener) = &shared.halt {
					drop(state);
					debug2!("ChunkedStream - {} halted on chunk {index}", shared.file);
					listener.stream_read_halted(index, now_millis());
					state = shared.lock();
					continue;
				}
			}

			state.waiting = Some(index);
			state = shared.wait(state, WAIT_SLICE);
		}

		state.waiting = None;
		drop(state);

		if halted {
			if let Some(listener) = &shared.halt {
				debug2!("ChunkedStream - {} resumed on chunk {index}", shared.file);
				listener.stream_read_resumed(index, now_millis());
			}
		}

		Ok(())
	}

	/// The content size, waiting for the first chunk if unknown.
	fn size_blocking(&self) -> Result<u64, ChunkError> {
		if let Some(size) = self.size() {
			return Ok(size);
		}
		self.check_availability(0, true)?;
		self.size().ok_or(ChunkError::UnknownSize)
	}

	//---------------------------------------------------------------------------------------------------- Reading
	/// Read into `buf` from the current position.
	///
	/// Blocks until the chunk covering the position is available.
	/// Reads at most until the end of that chunk, `0` means the end of the content.
	///
	/// # Errors
	/// The chunk failed past its retries, or the stream was closed.
	pub fn read_chunked(&mut self, buf: &mut [u8]) -> Result<usize, ChunkError> {
		if buf.is_empty() {
			return Ok(0);
		}

		let size = self.size_blocking()?;
		if self.pos >= size {
			return Ok(0);
		}

		let index = chunk_index(self.pos);
		self.check_availability(index, true)?;

		let state = self.shared.lock();
		if state.closed {
			return Err(ChunkError::Closed);
		}
		let Some(chunk) = state.chunks.get(index as usize).and_then(|s| s.data.as_deref()) else {
			return Err(ChunkError::Closed);
		};

		#[allow(clippy::cast_possible_truncation)]
		let offset = (self.pos % CHUNK_SIZE as u64) as usize;
		let n = std::cmp::min(buf.len(), chunk.len() - offset);
		buf[..n].copy_from_slice(&chunk[offset..offset + n]);
		drop(state);

		self.pos += n as u64;
		Ok(n)
	}

	/// Read a single byte, `None` at the end of the content.
	///
	/// # Errors
	/// Same as [`Self::read_chunked`].
	pub fn read_byte(&mut self) -> Result<Option<u8>, ChunkError> {
		let mut b = [0];
		match self.read_chunked(&mut b)? {
			0 => Ok(None),
			_ => Ok(Some(b[0])),
		}
	}

	//---------------------------------------------------------------------------------------------------- Positioning
	/// Move to `pos` and request its chunk without waiting for it.
	///
	/// # Errors
	/// The stream was closed, or the content failed as a whole.
	pub fn seek_to(&mut self, pos: u64) -> Result<(), ChunkError> {
		self.pos = pos;
		self.check_availability(chunk_index(pos), false)
	}

	/// Skip `n` bytes (clamped to the end of the content), returning the bytes skipped.
	///
	/// # Errors
	/// Same as [`Self::seek_to`].
	pub fn skip(&mut self, n: u64) -> Result<u64, ChunkError> {
		let mut target = self.pos.saturating_add(n);
		if let Some(size) = self.size() {
			target = std::cmp::min(target, std::cmp::max(size, self.pos));
		}
		let skipped = target - self.pos;
		self.seek_to(target)?;
		Ok(skipped)
	}

	/// Remember the current position for [`Self::reset`].
	pub fn mark(&mut self) {
		self.mark = self.pos;
	}

	/// Go back to the position of the last [`Self::mark`] (or `0`).
	///
	/// # Errors
	/// Same as [`Self::seek_to`].
	pub fn reset(&mut self) -> Result<(), ChunkError> {
		self.seek_to(self.mark)
	}

	//---------------------------------------------------------------------------------------------------- Info
	/// The current read position.
	pub const fn position(&self) -> u64 {
		self.pos
	}

	/// The content size, if known yet.
	pub fn size(&self) -> Option<u64> {
		self.shared.lock().size
	}

	/// Bytes left until the end, `0` while the size is unknown.
	pub fn available(&self) -> u64 {
		self.size().map_or(0, |s| s.saturating_sub(self.pos))
	}

	/// The content this stream reads.
	pub fn file_id(&self) -> &FileId {
		&self.shared.file
	}

	/// Name of the transport fetching the chunks.
	pub fn transport_name(&self) -> &'static str {
		self.shared.transport.name()
	}

	/// Block until the content size is known.
	///
	/// # Errors
	/// [`ChunkError::Timeout`] after `timeout`, or the
	/// error the content failed with in the meantime.
	pub fn wait_for_size(&self, timeout: Duration) -> Result<u64, ChunkError> {
		let deadline = Instant::now() + timeout;
		let mut state = self.shared.lock();
		loop {
			if state.closed {
				return Err(ChunkError::Closed);
			}
			if let Some(e) = &state.fatal {
				return Err(e.clone());
			}
			if let Some(size) = state.size {
				return Ok(size);
			}
			// The first chunk failed before telling us the size.
			if let Some(e) = state.chunks.first().and_then(|s| s.error.as_ref()) {
				if !e.is_retryable() {
					return Err(e.clone());
				}
			}

			let now = Instant::now();
			if now >= deadline {
				return Err(ChunkError::Timeout);
			}
			state = self.shared.wait(state, std::cmp::min(deadline - now, WAIT_SLICE));
		}
	}

	//---------------------------------------------------------------------------------------------------- Closing
	/// A handle that can close this stream from another thread.
	pub fn handle(&self) -> StreamHandle {
		StreamHandle(Arc::downgrade(&self.shared))
	}

	/// Close the stream, every blocked read returns [`ChunkError::Closed`].
	///
	/// Idempotent.
	pub fn close(&self) {
		self.shared.close();
	}

	/// Has the stream been closed?
	pub fn is_closed(&self) -> bool {
		self.shared.is_closed()
	}

	#[cfg(test)]
	pub(crate) fn requested(&self) -> Vec<u32> {
		let state = self.shared.lock();
		(0..state.chunks.len())
			.filter(|&i| state.chunks[i].requested || state.chunks[i].data.is_some())
			.filter_map(|i| u32::try_from(i).ok())
			.collect()
	}

	#[cfg(test)]
	pub(crate) fn retries(&self, index: u32) -> u32 {
		self.shared.lock().slot(index).retries
	}
}

impl Drop for ChunkedStream {
	fn drop(&mut self) {
		self.shared.close();
	}
}

//---------------------------------------------------------------------------------------------------- std::io
impl Read for ChunkedStream {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		Ok(self.read_chunked(buf)?)
	}
}

impl Seek for ChunkedStream {
	fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
		let target = match pos {
			SeekFrom::Start(p) => Some(p),
			SeekFrom::Current(d) => self.pos.checked_add_signed(d),
			SeekFrom::End(d) => self.size_blocking()?.checked_add_signed(d),
		};
		let Some(target) = target else {
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before the start of the stream"));
		};
		self.seek_to(target)?;
		Ok(target)
	}

	fn stream_position(&mut self) -> io::Result<u64> {
		Ok(self.pos)
	}
}

impl symphonia::core::io::MediaSource for ChunkedStream {
	fn is_seekable(&self) -> bool {
		true
	}

	fn byte_len(&self) -> Option<u64> {
		self.size()
	}
}

//---------------------------------------------------------------------------------------------------- StreamHandle
/// Closes a [`ChunkedStream`] owned by someone else.
///
/// Does nothing once the stream was dropped.
#[derive(Clone,Debug)]
pub struct StreamHandle(Weak<Shared>);

impl StreamHandle {
	/// [`ChunkedStream::close`].
	pub fn close(&self) {
		if let Some(shared) = self.0.upgrade() {
			shared.close();
		}
	}
}

impl std::fmt::Debug for Shared {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Shared")
			.field("file", &self.file)
			.finish_non_exhaustive()
	}
}
