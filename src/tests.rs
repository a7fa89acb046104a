//! These are helper functions & fakes used for testing throughout the codebase.

//---------------------------------------------------------------------------------------------------- Use
use std::{
	collections::HashMap,
	io::{BufRead,BufReader,Write},
	net::TcpListener,
	sync::{Arc,Condvar,Mutex},
	time::Duration,
};
use rand::RngCore;
use crate::{
	codec::Decoder,
	config::CHUNK_SIZE,
	crypto::{AudioKey,ChunkDecryptor},
	error::{ChunkError,DecodeError,LoadError,OutputError},
	feeder::PlayableId,
	free::now_millis,
	mixer::{OutputFormat,OutputOpener,Volume},
	output::AudioOutput,
	player::{ContentLoader,LoadedContent},
	stream::{ChunkSink,HaltListener},
	transport::ChunkSource,
};

//---------------------------------------------------------------------------------------------------- Content
/// The key every encrypted test content uses.
pub(crate) const KEY: AudioKey = AudioKey([
	0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef,
	0xfe, 0xdc, 0xba, 0x98, 0x76, 0x54, 0x32, 0x10,
]);

/// `len` random bytes.
pub(crate) fn random_bytes(len: usize) -> Vec<u8> {
	let mut bytes = vec![0; len];
	rand::thread_rng().fill_bytes(&mut bytes);
	bytes
}

/// `content` encrypted chunk by chunk, as a transport would deliver it.
pub(crate) fn encrypt(content: &[u8], decryptor: ChunkDecryptor) -> Vec<u8> {
	let mut encrypted = content.to_vec();
	for (i, chunk) in encrypted.chunks_mut(CHUNK_SIZE).enumerate() {
		decryptor.decrypt_chunk(u32::try_from(i).unwrap(), chunk);
	}
	encrypted
}

/// A 16-bit PCM WAV file.
pub(crate) fn wav(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
	let data_len = u32::try_from(samples.len() * 2).unwrap();
	let block_align = channels * 2;
	let byte_rate = sample_rate * u32::from(block_align);

	let mut v = Vec::with_capacity(44 + samples.len() * 2);
	v.extend_from_slice(b"RIFF");
	v.extend_from_slice(&(36 + data_len).to_le_bytes());
	v.extend_from_slice(b"WAVE");
	v.extend_from_slice(b"fmt ");
	v.extend_from_slice(&16_u32.to_le_bytes());
	v.extend_from_slice(&1_u16.to_le_bytes());
	v.extend_from_slice(&channels.to_le_bytes());
	v.extend_from_slice(&sample_rate.to_le_bytes());
	v.extend_from_slice(&byte_rate.to_le_bytes());
	v.extend_from_slice(&block_align.to_le_bytes());
	v.extend_from_slice(&16_u16.to_le_bytes());
	v.extend_from_slice(b"data");
	v.extend_from_slice(&data_len.to_le_bytes());
	for s in samples {
		v.extend_from_slice(&s.to_le_bytes());
	}
	v
}

//---------------------------------------------------------------------------------------------------- HTTP
/// A one-request-per-connection HTTP server answering ranges of `content`,
/// or with `status` for every request if it is not 206.
///
/// Returns the url of the content.
pub(crate) fn http_server(content: Vec<u8>, status: u16) -> String {
	let listener = TcpListener::bind("127.0.0.1:0").unwrap();
	let addr = listener.local_addr().unwrap();
	let content = Arc::new(content);

	std::thread::spawn(move || {
		for stream in listener.incoming() {
			let Ok(mut stream) = stream else { return };
			let content = Arc::clone(&content);
			std::thread::spawn(move || {
				let mut reader = BufReader::new(stream.try_clone().unwrap());
				let mut range = None;
				loop {
					let mut line = String::new();
					if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
						break;
					}
					let lower = line.to_ascii_lowercase();
					if let Some(r) = lower.strip_prefix("range: bytes=") {
						let (a, b) = r.trim().split_once('-').unwrap();
						range = Some((a.parse::<usize>().unwrap(), b.parse::<usize>().unwrap()));
					}
				}

				if status != 206 {
					let head = format!("HTTP/1.1 {status} Nope\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
					stream.write_all(head.as_bytes()).unwrap();
					return;
				}

				let (a, b) = range.unwrap();
				let b = std::cmp::min(b, content.len() - 1);
				let body = &content[a..=b];
				let head = format!(
					"HTTP/1.1 206 Partial Content\r\ncontent-range: bytes {a}-{b}/{}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
					content.len(),
					body.len(),
				);
				stream.write_all(head.as_bytes()).unwrap();
				stream.write_all(body).unwrap();
			});
		}
	});

	format!("http://{addr}/audio/file")
}

//---------------------------------------------------------------------------------------------------- FakeSource
#[derive(Default)]
struct SourceState {
	sink: Option<ChunkSink>,
	requests: Vec<u32>,
}

/// A [`ChunkSource`] the test drives.
///
/// A serving source answers every request at once, from inside
/// `request_chunk`. A manual source only records, the test sends.
pub(crate) struct FakeSource {
	/// Already encrypted, `None` for manual sources.
	served: Option<Vec<u8>>,
	size: u64,
	state: Mutex<SourceState>,
	cond: Condvar,
}

impl FakeSource {
	/// Serve `content`, encrypted with `decryptor`.
	pub(crate) fn serving(content: &[u8], decryptor: ChunkDecryptor) -> Arc<Self> {
		Arc::new(Self {
			served: Some(encrypt(content, decryptor)),
			size: content.len() as u64,
			state: Mutex::new(SourceState::default()),
			cond: Condvar::new(),
		})
	}

	/// Record requests for content of `size` bytes.
	pub(crate) fn manual(size: u64) -> Arc<Self> {
		Arc::new(Self {
			served: None,
			size,
			state: Mutex::new(SourceState::default()),
			cond: Condvar::new(),
		})
	}

	/// The sink of the last request.
	pub(crate) fn sink(&self) -> ChunkSink {
		self.state.lock().unwrap().sink.clone().expect("no request yet")
	}

	/// Every requested index, in request order.
	pub(crate) fn requests(&self) -> Vec<u32> {
		self.state.lock().unwrap().requests.clone()
	}

	/// Wait until chunk `index` was requested `count` times.
	pub(crate) fn wait_for_requests(&self, index: u32, count: usize) {
		let mut state = self.state.lock().unwrap();
		while state.requests.iter().filter(|&&i| i == index).count() < count {
			state = self.cond.wait_timeout(state, Duration::from_secs(10)).unwrap().0;
		}
	}

	pub(crate) fn send_size(&self) {
		self.sink().notify_size(self.size);
	}

	/// Send chunk `index` of `content`.
	pub(crate) fn send_chunk(&self, index: u32, content: &[u8]) {
		self.sink().notify_chunk_available(index, chunk_of(content, index).to_vec());
	}

	pub(crate) fn send_error(&self, index: u32, error: ChunkError) {
		self.sink().notify_chunk_error(index, error);
	}
}

fn chunk_of(content: &[u8], index: u32) -> &[u8] {
	let start = std::cmp::min(index as usize * CHUNK_SIZE, content.len());
	let end = std::cmp::min(start + CHUNK_SIZE, content.len());
	&content[start..end]
}

impl ChunkSource for FakeSource {
	fn request_chunk(&self, index: u32, sink: ChunkSink) {
		{
			let mut state = self.state.lock().unwrap();
			state.requests.push(index);
			state.sink = Some(sink.clone());
		}
		self.cond.notify_all();

		if let Some(served) = &self.served {
			sink.notify_size(self.size);
			sink.notify_chunk_available(index, chunk_of(served, index).to_vec());
		}
	}
}

//---------------------------------------------------------------------------------------------------- RecordingHalt
#[derive(Copy,Clone,Debug,PartialEq,Eq)]
pub(crate) enum HaltEvent {
	Halted(u32, u64),
	Resumed(u32, u64),
}

/// Records stall notifications.
#[derive(Default)]
pub(crate) struct RecordingHalt {
	events: Mutex<Vec<HaltEvent>>,
	cond: Condvar,
}

impl RecordingHalt {
	pub(crate) fn events(&self) -> Vec<HaltEvent> {
		self.events.lock().unwrap().clone()
	}

	/// Wait for `n` halts.
	pub(crate) fn wait_for_halts(&self, n: usize) {
		let mut events = self.events.lock().unwrap();
		while events.iter().filter(|e| matches!(e, HaltEvent::Halted(..))).count() < n {
			events = self.cond.wait_timeout(events, Duration::from_secs(10)).unwrap().0;
		}
	}

	fn push(&self, event: HaltEvent) {
		self.events.lock().unwrap().push(event);
		self.cond.notify_all();
	}
}

impl HaltListener for RecordingHalt {
	fn stream_read_halted(&self, chunk: u32, time_ms: u64) {
		self.push(HaltEvent::Halted(chunk, time_ms));
	}

	fn stream_read_resumed(&self, chunk: u32, time_ms: u64) {
		self.push(HaltEvent::Resumed(chunk, time_ms));
	}
}

//---------------------------------------------------------------------------------------------------- RecordingOutput
#[derive(Default)]
struct RecordedState {
	opened: Vec<OutputFormat>,
	samples: Vec<i16>,
	volume: Option<Volume>,
	fail_writes: bool,
	pace: bool,
}

/// What every [`RecordingOutput`] of one opener wrote.
#[derive(Clone,Default)]
pub(crate) struct Recorded(Arc<Mutex<RecordedState>>);

impl Recorded {
	/// Formats outputs were opened with, in order.
	pub(crate) fn opened(&self) -> Vec<OutputFormat> {
		self.0.lock().unwrap().opened.clone()
	}

	pub(crate) fn samples(&self) -> Vec<i16> {
		self.0.lock().unwrap().samples.clone()
	}

	/// The last hardware volume set.
	pub(crate) fn volume(&self) -> Option<Volume> {
		self.0.lock().unwrap().volume
	}

	/// Fail every write with [`OutputError::Write`].
	pub(crate) fn fail_writes(&self, fail: bool) {
		self.0.lock().unwrap().fail_writes = fail;
	}

	/// Take a tenth of the real time of the audio per write.
	pub(crate) fn pace(&self, pace: bool) {
		self.0.lock().unwrap().pace = pace;
	}
}

/// An [`AudioOutput`] recording 16-bit samples.
pub(crate) struct RecordingOutput {
	recorded: Recorded,
	format: OutputFormat,
	hardware: bool,
}

impl RecordingOutput {
	/// An opener recording into `recorded`, with hardware volume if `hardware`.
	pub(crate) fn opener(recorded: &Recorded, hardware: bool) -> OutputOpener {
		let recorded = recorded.clone();
		Box::new(move |format| {
			recorded.0.lock().unwrap().opened.push(format);
			Ok(Box::new(Self { recorded: recorded.clone(), format, hardware }) as Box<dyn AudioOutput>)
		})
	}
}

impl AudioOutput for RecordingOutput {
	fn write(&mut self, data: &[u8]) -> Result<(), OutputError> {
		let pace = {
			let mut state = self.recorded.0.lock().unwrap();
			if state.fail_writes {
				return Err(OutputError::Write);
			}
			state.samples.extend(data.chunks_exact(2).map(|s| i16::from_le_bytes([s[0], s[1]])));
			state.pace
		};
		if pace {
			let millis = self.format.millis_for_bytes(data.len()) / 10;
			std::thread::sleep(Duration::from_millis(u64::from(millis)));
		}
		Ok(())
	}

	fn format(&self) -> OutputFormat {
		self.format
	}

	fn name(&self) -> &'static str {
		"recording"
	}

	fn set_volume(&mut self, volume: Volume) -> bool {
		if self.hardware {
			self.recorded.0.lock().unwrap().volume = Some(volume);
		}
		self.hardware
	}
}

//---------------------------------------------------------------------------------------------------- Tone
/// The format of [`ToneDecoder`]: 1 sample per millisecond.
pub(crate) const TONE_FORMAT: OutputFormat = OutputFormat::pcm16(1000, 1);

/// The one sample value of [`ToneDecoder`].
pub(crate) const TONE_SAMPLE: i16 = 1000;

const TONE_BLOCK_MS: u32 = 100;

/// A constant tone in blocks of 100ms.
pub(crate) struct ToneDecoder {
	duration_ms: u32,
	position_ms: u32,
	time_ms: Option<u32>,
}

impl ToneDecoder {
	pub(crate) const fn new(duration_ms: u32) -> Self {
		Self { duration_ms, position_ms: 0, time_ms: None }
	}
}

impl Decoder for ToneDecoder {
	fn format(&self) -> OutputFormat {
		TONE_FORMAT
	}

	fn read_block(&mut self, out: &mut Vec<u8>) -> Result<bool, DecodeError> {
		if self.position_ms >= self.duration_ms {
			return Ok(false);
		}
		let len = std::cmp::min(TONE_BLOCK_MS, self.duration_ms - self.position_ms);
		out.clear();
		for _ in 0..len {
			out.extend_from_slice(&TONE_SAMPLE.to_le_bytes());
		}
		self.time_ms = Some(self.position_ms);
		self.position_ms += len;
		Ok(true)
	}

	fn seek(&mut self, ms: u32) -> Result<u32, DecodeError> {
		if ms > self.duration_ms {
			return Err(DecodeError::Seek("past the end"));
		}
		self.position_ms = ms / TONE_BLOCK_MS * TONE_BLOCK_MS;
		Ok(self.position_ms)
	}

	fn time_ms(&self) -> Option<u32> {
		self.time_ms
	}

	fn duration_ms(&self) -> Option<u32> {
		Some(self.duration_ms)
	}
}

//---------------------------------------------------------------------------------------------------- FakeLoader
/// Loads [`ToneDecoder`]s of known durations.
///
/// Unknown playables fail with [`LoadError::NoFiles`].
pub(crate) struct FakeLoader {
	durations: HashMap<String, u32>,
	failures: Mutex<HashMap<String, (u32, fn() -> LoadError)>>,
	loads: Mutex<Vec<(PlayableId, bool)>>,
	delay: Mutex<Duration>,
}

impl FakeLoader {
	pub(crate) fn new(durations: &[(&str, u32)]) -> Arc<Self> {
		Arc::new(Self {
			durations: durations.iter().map(|(id, d)| ((*id).to_string(), *d)).collect(),
			failures: Mutex::new(HashMap::new()),
			loads: Mutex::new(Vec::new()),
			delay: Mutex::new(Duration::ZERO),
		})
	}

	/// Take `delay` for every load from now on.
	pub(crate) fn slow(&self, delay: Duration) {
		*self.delay.lock().unwrap() = delay;
	}

	/// Fail the next `times` loads of `id` with `error()`.
	pub(crate) fn fail(&self, id: &str, times: u32, error: fn() -> LoadError) {
		self.failures.lock().unwrap().insert(id.to_string(), (times, error));
	}

	/// Every load so far: `(playable, is_preload)`.
	pub(crate) fn loads(&self) -> Vec<(PlayableId, bool)> {
		self.loads.lock().unwrap().clone()
	}
}

impl ContentLoader for FakeLoader {
	fn load(
		&self,
		playable: &PlayableId,
		is_preload: bool,
		_halt: Option<Arc<dyn HaltListener>>,
	) -> Result<LoadedContent, LoadError> {
		self.loads.lock().unwrap().push((playable.clone(), is_preload));
		std::thread::sleep(*self.delay.lock().unwrap());

		if let Some((times, error)) = self.failures.lock().unwrap().get_mut(playable.id()) {
			if *times > 0 {
				*times -= 1;
				return Err(error());
			}
		}

		let Some(&duration_ms) = self.durations.get(playable.id()) else {
			return Err(LoadError::NoFiles);
		};
		Ok(LoadedContent {
			decoder: Box::new(ToneDecoder::new(duration_ms)),
			duration_ms,
			stream: None,
			metrics: None,
		})
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn tone() {
		let mut tone = ToneDecoder::new(250);
		let mut block = vec![];
		assert!(tone.read_block(&mut block).unwrap());
		assert_eq!(block.len(), 200);
		assert_eq!(tone.seek(220).unwrap(), 200);
		assert!(tone.read_block(&mut block).unwrap());
		assert_eq!(block.len(), 100);
		assert_eq!(tone.time_ms(), Some(200));
		assert!(!tone.read_block(&mut block).unwrap());
	}

	#[test]
	fn now() {
		assert!(now_millis() > 0);
	}
}
