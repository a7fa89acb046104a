//! PCM formats and the stateless converter between them.

//---------------------------------------------------------------------------------------------------- OutputFormat
/// Interleaved, signed, little-endian PCM.
#[derive(Copy,Clone,Debug,PartialEq,Eq,Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OutputFormat {
	/// Frames per second.
	pub sample_rate: u32,
	/// Samples per frame.
	pub channels: u16,
	/// Bits per sample, one of `8`, `16`, `24` or `32`.
	pub sample_bits: u16,
}

impl Default for OutputFormat {
	fn default() -> Self {
		Self::DEFAULT
	}
}

impl std::fmt::Display for OutputFormat {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}Hz/{}ch/{}bit", self.sample_rate, self.channels, self.sample_bits)
	}
}

impl OutputFormat {
	/// 44.1 kHz, stereo, 16-bit.
	pub const DEFAULT: Self = Self {
		sample_rate: 44_100,
		channels:    2,
		sample_bits: 16,
	};

	#[must_use]
	/// 16-bit PCM at `sample_rate` with `channels`.
	pub const fn pcm16(sample_rate: u32, channels: u16) -> Self {
		Self { sample_rate, channels, sample_bits: 16 }
	}

	#[must_use]
	/// Bytes per sample.
	pub const fn sample_size(&self) -> usize {
		self.sample_bits as usize / 8
	}

	#[must_use]
	/// Bytes per frame, never `0`.
	pub const fn frame_size(&self) -> usize {
		let size = self.sample_size() * self.channels as usize;
		if size == 0 { 1 } else { size }
	}

	#[must_use]
	/// Can samples of this format be read at all?
	pub const fn is_valid(&self) -> bool {
		self.sample_rate > 0
			&& self.channels > 0
			&& matches!(self.sample_bits, 8 | 16 | 24 | 32)
	}

	#[must_use]
	/// Whole frames worth `millis` of audio, in bytes.
	pub const fn bytes_for_millis(&self, millis: u32) -> usize {
		let frames = self.sample_rate as u64 * millis as u64 / 1000;
		frames as usize * self.frame_size()
	}

	#[must_use]
	/// How long `bytes` of audio play, in milliseconds.
	pub const fn millis_for_bytes(&self, bytes: usize) -> u32 {
		if self.sample_rate == 0 {
			return 0;
		}
		let frames = (bytes / self.frame_size()) as u64;
		let millis = frames * 1000 / self.sample_rate as u64;
		if millis > u32::MAX as u64 { u32::MAX } else { millis as u32 }
	}

	#[must_use]
	/// Can [`convert`] turn this format into `to`?
	///
	/// Only the sample size and channel count may differ,
	/// and `to` must be 16-bit.
	pub const fn converts_to(&self, to: &Self) -> bool {
		self.is_valid()
			&& to.is_valid()
			&& self.sample_rate == to.sample_rate
			&& to.sample_bits == 16
	}
}

//---------------------------------------------------------------------------------------------------- Conversion
#[inline]
#[allow(clippy::cast_possible_truncation)]
/// One sample of `bits` as `i16`.
fn to_i16(sample: &[u8], bits: u16) -> i16 {
	match bits {
		8  => i16::from(sample[0] as i8) << 8,
		16 => i16::from_le_bytes([sample[0], sample[1]]),
		// Keep the 2 most significant bytes.
		24 => i16::from_le_bytes([sample[1], sample[2]]),
		_  => i16::from_le_bytes([sample[2], sample[3]]),
	}
}

/// Convert `data` of format `from` into 16-bit `to`, appending to `out`.
///
/// Down-mixing to mono averages every channel, any other
/// channel count change maps output channel `c` to input `c % from.channels`.
/// A trailing partial frame is dropped.
///
/// The caller checks [`OutputFormat::converts_to`] first.
pub(crate) fn convert(data: &[u8], from: OutputFormat, to: OutputFormat, out: &mut Vec<u8>) {
	let in_channels = usize::from(from.channels);
	let out_channels = usize::from(to.channels);
	let size = from.sample_size();
	let frames = data.chunks_exact(from.frame_size());

	out.reserve(frames.len() * to.frame_size());
	let mut samples = Vec::with_capacity(in_channels);

	for frame in frames {
		samples.clear();
		samples.extend(frame.chunks_exact(size).map(|s| to_i16(s, from.sample_bits)));

		if out_channels == 1 && in_channels > 1 {
			let sum: i32 = samples.iter().map(|&s| i32::from(s)).sum();
			#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
			let avg = (sum / in_channels as i32) as i16;
			out.extend_from_slice(&avg.to_le_bytes());
			continue;
		}

		for c in 0..out_channels {
			out.extend_from_slice(&samples[c % in_channels].to_le_bytes());
		}
	}
}
