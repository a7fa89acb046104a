//! Loudness normalization data stored inside audio files.

//---------------------------------------------------------------------------------------------------- Use
use crate::{
	config::{NORMALIZATION_OFFSET,NORMALIZATION_LEN},
	error::ChunkError,
	macros::debug2,
	stream::ChunkedStream,
};

//---------------------------------------------------------------------------------------------------- NormalizationData
/// Gain and peak of a track and its album.
#[derive(Copy,Clone,Debug,PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NormalizationData {
	/// Track gain in dB.
	pub track_gain_db: f32,
	/// Track peak, `1.0` is full scale.
	pub track_peak: f32,
	/// Album gain in dB.
	pub album_gain_db: f32,
	/// Album peak, `1.0` is full scale.
	pub album_peak: f32,
}

impl Default for NormalizationData {
	fn default() -> Self {
		Self::DEFAULT
	}
}

impl NormalizationData {
	/// No gain, full scale peaks.
	pub const DEFAULT: Self = Self {
		track_gain_db: 0.0,
		track_peak:    1.0,
		album_gain_db: 0.0,
		album_peak:    1.0,
	};

	#[must_use]
	/// Parse the 4 little-endian `f32`s.
	pub fn parse(bytes: &[u8; NORMALIZATION_LEN]) -> Self {
		let f = |i: usize| f32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
		Self {
			track_gain_db: f(0),
			track_peak:    f(4),
			album_gain_db: f(8),
			album_peak:    f(12),
		}
	}

	/// Read the data block of an audio file.
	///
	/// The stream's position is restored afterwards with `mark()`/`reset()`.
	///
	/// # Errors
	/// The block could not be read, or the content is too short to have one.
	pub fn read(stream: &mut ChunkedStream) -> Result<Self, ChunkError> {
		stream.mark();
		stream.seek_to(NORMALIZATION_OFFSET)?;

		let mut bytes = [0; NORMALIZATION_LEN];
		let mut read = 0;
		while read < NORMALIZATION_LEN {
			match stream.read_chunked(&mut bytes[read..])? {
				0 => {
					stream.reset()?;
					return Err(ChunkError::Length {
						index: 0,
						expected: NORMALIZATION_LEN,
						got: read,
					});
				},
				n => read += n,
			}
		}
		stream.reset()?;

		let this = Self::parse(&bytes);
		debug2!("NormalizationData - {} {this:?}", stream.file_id());
		Ok(this)
	}

	#[must_use]
	/// The linear factor to scale samples with.
	///
	/// `10^((track_gain + pregain) / 20)`, lowered so
	/// that `factor * track_peak` never exceeds `1.0`.
	pub fn factor(&self, pregain_db: f32) -> f32 {
		let mut factor = 10_f32.powf((self.track_gain_db + pregain_db) / 20.0);
		if self.track_peak > 0.0 && factor * self.track_peak > 1.0 {
			factor = 1.0 / self.track_peak;
		}
		if !factor.is_finite() {
			return 1.0;
		}
		factor
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		crypto::ChunkDecryptor,
		feeder::FileId,
		tests::FakeSource,
		transport::Transport,
	};
	use pretty_assertions::assert_eq;
	use std::sync::Arc;

	fn block(values: [f32; 4]) -> Vec<u8> {
		values.iter().flat_map(|v| v.to_le_bytes()).collect()
	}

	#[test]
	fn read_restores_position() {
		let mut content = vec![7_u8; 1000];
		let block = block([-3.5, 0.9, -1.0, 0.95]);
		content[144..160].copy_from_slice(&block);

		let source = FakeSource::serving(&content, ChunkDecryptor::None);
		let mut stream = ChunkedStream::open(
			FileId::TEST,
			Transport::Source(Arc::clone(&source) as _),
			ChunkDecryptor::None,
			None,
			None,
			false,
		);
		stream.seek_to(10).unwrap();

		let data = NormalizationData::read(&mut stream).unwrap();
		assert_eq!(data, NormalizationData {
			track_gain_db: -3.5,
			track_peak:    0.9,
			album_gain_db: -1.0,
			album_peak:    0.95,
		});
		assert_eq!(stream.position(), 10);
	}

	#[test]
	fn too_short() {
		let source = FakeSource::serving(&[0; 150], ChunkDecryptor::None);
		let mut stream = ChunkedStream::open(
			FileId::TEST,
			Transport::Source(Arc::clone(&source) as _),
			ChunkDecryptor::None,
			None,
			None,
			false,
		);
		assert!(NormalizationData::read(&mut stream).is_err());
		assert_eq!(stream.position(), 0);
	}

	#[test]
	fn factor() {
		let unity = NormalizationData::DEFAULT;
		assert_eq!(unity.factor(0.0), 1.0);

		// -6 dB is roughly half.
		let quiet = NormalizationData { track_gain_db: -6.0, ..unity };
		assert!((quiet.factor(0.0) - 0.501).abs() < 0.001);

		// +6 dB would clip a 0.8 peak.
		let loud = NormalizationData { track_gain_db: 3.0, track_peak: 0.8, ..unity };
		let f = loud.factor(3.0);
		assert!((f - 1.25).abs() < 0.0001);
		assert!(f * loud.track_peak <= 1.0 + f32::EPSILON);
	}
}
