//! Storage channels over one shared connection.
//!
//! Every chunk request opens a short-lived logical channel with
//! its own 16-bit id. The connection's reader thread hands every
//! inbound packet to [`ChannelMultiplexer::dispatch`], which routes
//! response fragments by channel id to the channel's consumer job.

//---------------------------------------------------------------------------------------------------- Use
use std::{
	collections::HashMap,
	sync::{
		Arc,Mutex,MutexGuard,
		atomic::{AtomicBool,AtomicU16,Ordering},
	},
	time::{Duration,Instant},
};
use crossbeam::channel::{Receiver,Sender,RecvTimeoutError};
use crate::{
	config::{CHUNK_SIZE,CHANNEL_TIMEOUT,WAIT_SLICE},
	error::{ChunkError,TransportError},
	feeder::FileId,
	macros::{debug2,trace2,warn2,send},
	stream::ChunkSink,
	transport::{FetchPool,PacketType},
};

//---------------------------------------------------------------------------------------------------- PacketSender
/// The outbound half of the authenticated connection.
pub trait PacketSender: Send + Sync {
	/// Send one packet of `packet` type.
	///
	/// # Errors
	/// The connection is gone or refused the packet.
	fn send(&self, packet: PacketType, payload: &[u8]) -> Result<(), TransportError>;
}

//---------------------------------------------------------------------------------------------------- Fragment
#[derive(Debug)]
enum Fragment {
	Data(Vec<u8>),
	Error(u16),
	Abort,
}

//---------------------------------------------------------------------------------------------------- Request
/// Build the `StreamChunk` payload for chunk `index` of `file`.
///
/// Offsets are in 4-byte words.
fn request_payload(id: u16, file: &FileId, index: u32) -> Vec<u8> {
	const WORDS: u32 = (CHUNK_SIZE / 4) as u32;
	let start = index.wrapping_mul(WORDS);
	let end = start.wrapping_add(WORDS);

	let mut out = Vec::with_capacity(2 + 4 * 4 + 20 + 4 * 2);
	out.extend_from_slice(&id.to_be_bytes());
	out.extend_from_slice(&0_u32.to_be_bytes());
	out.extend_from_slice(&0_u32.to_be_bytes());
	out.extend_from_slice(&0x4e20_u32.to_be_bytes());
	out.extend_from_slice(&0x0003_0d40_u32.to_be_bytes());
	out.extend_from_slice(file.as_bytes());
	out.extend_from_slice(&start.to_be_bytes());
	out.extend_from_slice(&end.to_be_bytes());
	out
}

fn read_u16(payload: &[u8], at: usize) -> Result<u16, TransportError> {
	match payload.get(at..at + 2) {
		Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
		None => Err(TransportError::Truncated { needed: at + 2, got: payload.len() }),
	}
}

//---------------------------------------------------------------------------------------------------- ChannelMultiplexer
/// Fetches chunks through storage channels.
///
/// Channel ids are allocated from a wrapping 16-bit counter.
/// Each open channel has a consumer job on the [`FetchPool`]
/// that parses the response and reports to the stream's [`ChunkSink`].
pub struct ChannelMultiplexer {
	sender: Arc<dyn PacketSender>,
	pool: FetchPool,
	next_id: AtomicU16,
	channels: Mutex<HashMap<u16, Sender<Fragment>>>,
	closed: AtomicBool,
	timeout: Duration,
}

impl std::fmt::Debug for ChannelMultiplexer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChannelMultiplexer")
			.field("open", &self.lock().len())
			.field("closed", &self.closed.load(Ordering::Acquire))
			.finish_non_exhaustive()
	}
}

impl ChannelMultiplexer {
	#[cold]
	#[inline(never)]
	/// Create a multiplexer sending through `sender`.
	pub fn new(sender: Arc<dyn PacketSender>, pool: FetchPool) -> Arc<Self> {
		Self::with_timeout(sender, pool, CHANNEL_TIMEOUT)
	}

	#[cold]
	#[inline(never)]
	/// Same as [`Self::new`], but channels with no fragment
	/// for `timeout` fail with [`ChunkError::Timeout`].
	pub fn with_timeout(sender: Arc<dyn PacketSender>, pool: FetchPool, timeout: Duration) -> Arc<Self> {
		Arc::new(Self {
			sender,
			pool,
			next_id: AtomicU16::new(0),
			channels: Mutex::new(HashMap::new()),
			closed: AtomicBool::new(false),
			timeout,
		})
	}

	fn lock(&self) -> MutexGuard<'_, HashMap<u16, Sender<Fragment>>> {
		self.channels.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// Amount of currently open channels.
	pub fn open_channels(&self) -> usize {
		self.lock().len()
	}

	/// Request chunk `index` of `file`, delivering into `sink`.
	///
	/// Never blocks on the response, failures are reported to `sink`.
	pub fn request_chunk(self: &Arc<Self>, file: &FileId, index: u32, sink: ChunkSink) {
		if self.closed.load(Ordering::Acquire) {
			sink.notify_chunk_error(index, ChunkError::Fetch("channel multiplexer is closed".into()));
			return;
		}

		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let (tx, rx) = crossbeam::channel::unbounded();
		if self.lock().insert(id, tx).is_some() {
			warn2!("ChannelMultiplexer - channel id {id} reused while still open");
		}

		trace2!("ChannelMultiplexer - channel {id}: {file} chunk {index}");
		if let Err(e) = self.sender.send(PacketType::StreamChunk, &request_payload(id, file, index)) {
			self.lock().remove(&id);
			sink.notify_chunk_error(index, ChunkError::Fetch(e.to_string().into()));
			return;
		}

		let this = Arc::clone(self);
		self.pool.execute(move || this.consume(id, index, &rx, &sink));
	}

	/// Handle one inbound packet of the connection.
	///
	/// Fragments for unknown channels are logged and dropped,
	/// this happens after a channel completes or fails.
	///
	/// # Errors
	/// The payload is too short for its packet type.
	pub fn dispatch(&self, packet: PacketType, payload: &[u8]) -> Result<(), TransportError> {
		let (id, fragment) = match packet {
			PacketType::StreamChunkRes => {
				let id = read_u16(payload, 0)?;
				(id, Fragment::Data(payload[2..].to_vec()))
			},
			PacketType::ChannelError => {
				let id = read_u16(payload, 0)?;
				let code = read_u16(payload, 2)?;
				(id, Fragment::Error(code))
			},
			PacketType::ChannelAbort => (read_u16(payload, 0)?, Fragment::Abort),
			PacketType::StreamChunk => {
				warn2!("ChannelMultiplexer - ignoring inbound {packet}");
				return Ok(());
			},
		};

		let channels = self.lock();
		let Some(tx) = channels.get(&id) else {
			warn2!("ChannelMultiplexer - {packet} for unknown channel {id}, dropping");
			return Ok(());
		};
		send!(tx, fragment);
		Ok(())
	}

	/// Close the multiplexer.
	///
	/// Every open channel fails, new requests fail immediately.
	/// Idempotent.
	pub fn close(&self) {
		if self.closed.swap(true, Ordering::AcqRel) {
			return;
		}
		debug2!("ChannelMultiplexer - closing");
		// Dropping the senders disconnects every consumer.
		self.lock().clear();
	}

	//---------------------------------------------------------------------------------------------------- Consumer
	/// Parse one channel's response.
	fn consume(&self, id: u16, index: u32, rx: &Receiver<Fragment>, sink: &ChunkSink) {
		let result = self.read_response(id, index, rx, sink);
		self.lock().remove(&id);

		match result {
			Ok(Some(data)) => {
				trace2!("ChannelMultiplexer - channel {id} done, {} bytes", data.len());
				sink.notify_chunk_available(index, data);
			},
			Ok(None) => trace2!("ChannelMultiplexer - channel {id} abandoned, stream closed"),
			Err(e) => {
				debug2!("ChannelMultiplexer - channel {id} failed: {e}");
				sink.notify_chunk_error(index, e);
			},
		}
	}

	/// `None` if the stream was closed in the meantime.
	fn read_response(
		&self,
		id: u16,
		index: u32,
		rx: &Receiver<Fragment>,
		sink: &ChunkSink,
	) -> Result<Option<Vec<u8>>, ChunkError> {
		let mut header = true;
		let mut data = Vec::with_capacity(CHUNK_SIZE);

		let mut deadline = Instant::now() + self.timeout;

		loop {
			if sink.is_closed() {
				return Ok(None);
			}

			let now = Instant::now();
			if now >= deadline {
				return Err(ChunkError::Timeout);
			}
			let fragment = match rx.recv_timeout(std::cmp::min(deadline - now, WAIT_SLICE)) {
				Ok(f) => f,
				Err(RecvTimeoutError::Timeout) => continue,
				Err(RecvTimeoutError::Disconnected) => {
					return Err(ChunkError::Fetch("channel multiplexer is closed".into()));
				},
			};
			deadline = Instant::now() + self.timeout;

			let payload = match fragment {
				Fragment::Data(p) => p,
				Fragment::Error(code) => return Err(ChunkError::Channel { code }),
				Fragment::Abort => return Err(ChunkError::Fetch("channel aborted".into())),
			};

			if header {
				Self::parse_headers(id, index, &payload, sink);
				header = false;
			} else if payload.is_empty() {
				return Ok(Some(data));
			} else {
				data.extend_from_slice(&payload);
			}
		}
	}

	/// `u16 len, u8 id, data[len - 1]` until a zero length or the end.
	#[allow(unused_variables)]
	fn parse_headers(id: u16, index: u32, mut payload: &[u8], sink: &ChunkSink) {
		while payload.len() >= 2 {
			let len = usize::from(u16::from_be_bytes([payload[0], payload[1]]));
			payload = &payload[2..];
			if len == 0 {
				break;
			}
			let Some(header) = payload.get(..len) else {
				warn2!("ChannelMultiplexer - channel {id} truncated header, {len} > {}", payload.len());
				break;
			};
			trace2!("ChannelMultiplexer - channel {id} chunk {index} header 0x{:02x}", header[0]);
			sink.notify_header(header[0], &header[1..]);
			payload = &payload[len..];
		}
	}
}

impl Drop for ChannelMultiplexer {
	fn drop(&mut self) {
		self.close();
	}
}
