//! [`Decoder`] on top of `symphonia`.

//---------------------------------------------------------------------------------------------------- Use
use symphonia::core::{
	audio::{SampleBuffer,SignalSpec},
	codecs::{DecoderOptions,CODEC_TYPE_NULL},
	errors::Error as SymphoniaError,
	formats::{FormatOptions,FormatReader,SeekMode,SeekTo},
	io::{MediaSource,MediaSourceStream,MediaSourceStreamOptions},
	meta::{Limit,MetadataOptions},
	probe::Hint,
	units::{Time,TimeBase},
};
use crate::{
	codec::{CodecKind,Decoder},
	error::DecodeError,
	macros::{debug2,trace2,warn2},
	mixer::{apply_gain,OutputFormat},
};

//---------------------------------------------------------------------------------------------------- Constants
const FORMAT_OPTIONS: FormatOptions = FormatOptions {
	enable_gapless: true,
	prebuild_seek_index: false,
	seek_index_fill_rate: 20,
};

const METADATA_OPTIONS: MetadataOptions = MetadataOptions {
	limit_metadata_bytes: Limit::Default,
	limit_visual_bytes: Limit::Maximum(0),
};

const DECODER_OPTIONS: DecoderOptions = DecoderOptions {
	verify: false,
};

// Reads of the inner stream are whole chunks anyway.
const MEDIA_SOURCE_STREAM_OPTIONS: MediaSourceStreamOptions = MediaSourceStreamOptions {
	buffer_len: 64 * 1024,
};

/// Malformed packets in a row before giving up.
const MAX_DECODE_ERRORS: usize = 16;

//---------------------------------------------------------------------------------------------------- Free
#[allow(clippy::cast_possible_truncation,clippy::cast_sign_loss)]
fn time_to_ms(time: Time) -> u32 {
	let ms = time.seconds.saturating_mul(1000).saturating_add((time.frac * 1000.0) as u64);
	u32::try_from(ms).unwrap_or(u32::MAX)
}

fn ms_to_time(ms: u32) -> Time {
	Time {
		seconds: u64::from(ms / 1000),
		frac: f64::from(ms % 1000) / 1000.0,
	}
}

fn spec_format(spec: &SignalSpec) -> OutputFormat {
	let channels = u16::try_from(spec.channels.count()).unwrap_or(u16::MAX);
	OutputFormat::pcm16(spec.rate, channels)
}

//---------------------------------------------------------------------------------------------------- SymphoniaDecoder
/// Decodes anything `symphonia` can probe into 16-bit PCM,
/// scaled by a fixed gain (the normalization factor).
pub struct SymphoniaDecoder {
	reader: Box<dyn FormatReader>,
	decoder: Box<dyn symphonia::core::codecs::Decoder>,
	track_id: u32,
	timebase: Option<TimeBase>,
	format: OutputFormat,
	gain: f32,
	time_ms: Option<u32>,
	duration_ms: Option<u32>,
	/// Re-used between blocks, with its frame capacity.
	samples: Option<(SampleBuffer<i16>, usize)>,
}

impl std::fmt::Debug for SymphoniaDecoder {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SymphoniaDecoder")
			.field("track_id", &self.track_id)
			.field("format", &self.format)
			.field("gain", &self.gain)
			.field("time_ms", &self.time_ms)
			.field("duration_ms", &self.duration_ms)
			.finish_non_exhaustive()
	}
}

impl SymphoniaDecoder {
	#[cold]
	#[inline(never)]
	/// Probe `source` and prepare to decode its first audio track.
	///
	/// `codec` is only a probing hint.
	///
	/// # Errors
	/// The container or codec is unknown, or the track has no sample rate.
	pub fn new(source: Box<dyn MediaSource>, codec: Option<CodecKind>, gain: f32) -> Result<Self, DecodeError> {
		let mut hint = Hint::new();
		if let Some(codec) = codec {
			hint.with_extension(codec.extension());
		}

		let mss = MediaSourceStream::new(source, MEDIA_SOURCE_STREAM_OPTIONS);
		let probed = symphonia::default::get_probe().format(&hint, mss, &FORMAT_OPTIONS, &METADATA_OPTIONS)?;
		let reader = probed.format;

		let codecs = symphonia::default::get_codecs();
		let Some(track) = reader
			.tracks()
			.iter()
			.find(|t| t.codec_params.codec != CODEC_TYPE_NULL && codecs.get_codec(t.codec_params.codec).is_some())
		else {
			return Err(DecodeError::NoTrack);
		};

		let decoder = codecs.make(&track.codec_params, &DECODER_OPTIONS)?;
		let Some(sample_rate) = track.codec_params.sample_rate else {
			return Err(DecodeError::NoSampleRate);
		};
		let channels = track.codec_params.channels.map_or(2, |c| c.count());
		let format = OutputFormat::pcm16(sample_rate, u16::try_from(channels).unwrap_or(2));

		let timebase = track.codec_params.time_base;
		let duration_ms = match (timebase, track.codec_params.n_frames) {
			(Some(tb), Some(frames)) => Some(time_to_ms(tb.calc_time(frames))),
			_ => None,
		};

		debug2!("SymphoniaDecoder - format: {format}, duration: {duration_ms:?}ms, gain: {gain}");
		Ok(Self {
			track_id: track.id,
			reader,
			decoder,
			timebase,
			format,
			gain,
			time_ms: None,
			duration_ms,
			samples: None,
		})
	}
}

impl Decoder for SymphoniaDecoder {
	fn format(&self) -> OutputFormat {
		self.format
	}

	fn read_block(&mut self, out: &mut Vec<u8>) -> Result<bool, DecodeError> {
		let mut errors = 0;
		loop {
			let packet = match self.reader.next_packet() {
				Ok(p) => p,
				// The only way a reader reports the end of the media.
				Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
					debug2!("SymphoniaDecoder - end of stream");
					return Ok(false);
				},
				Err(SymphoniaError::ResetRequired) => {
					self.decoder.reset();
					continue;
				},
				Err(e) => return Err(e.into()),
			};

			if packet.track_id() != self.track_id {
				continue;
			}

			let decoded = match self.decoder.decode(&packet) {
				Ok(d) => d,
				Err(SymphoniaError::DecodeError(e)) if errors < MAX_DECODE_ERRORS => {
					warn2!("SymphoniaDecoder - skipping malformed packet: {e}");
					errors += 1;
					continue;
				},
				Err(e) => return Err(e.into()),
			};

			let spec = *decoded.spec();
			let frames = decoded.capacity();
			let samples = match &mut self.samples {
				Some((buf, cap)) if *cap >= frames => buf,
				slot => {
					trace2!("SymphoniaDecoder - sample buffer for {frames} frames");
					&mut slot.insert((SampleBuffer::new(frames as u64, spec), frames)).0
				},
			};
			samples.copy_interleaved_ref(decoded);

			out.clear();
			out.extend(samples.samples().iter().flat_map(|s| s.to_le_bytes()));
			apply_gain(out, self.gain);

			self.format = spec_format(&spec);
			if let Some(tb) = self.timebase {
				self.time_ms = Some(time_to_ms(tb.calc_time(packet.ts)));
			}
			return Ok(true);
		}
	}

	fn seek(&mut self, ms: u32) -> Result<u32, DecodeError> {
		let seeked = self.reader.seek(
			SeekMode::Accurate,
			SeekTo::Time { time: ms_to_time(ms), track_id: Some(self.track_id) },
		)?;
		self.decoder.reset();

		let landed = self.timebase.map_or(ms, |tb| time_to_ms(tb.calc_time(seeked.actual_ts)));
		debug2!("SymphoniaDecoder - seek to {ms}ms, landed at {landed}ms");
		self.time_ms = Some(landed);
		Ok(landed)
	}

	fn time_ms(&self) -> Option<u32> {
		self.time_ms
	}

	fn duration_ms(&self) -> Option<u32> {
		self.duration_ms
	}
}
