//! Picking one audio file out of many.

//---------------------------------------------------------------------------------------------------- Use
use crate::{
	codec::CodecKind,
	feeder::AudioFile,
	macros::warn2,
};

//---------------------------------------------------------------------------------------------------- AudioQuality
/// The preferred bitrate.
#[derive(Copy,Clone,Debug,Default,PartialEq,Eq,PartialOrd,Ord,Hash)]
#[derive(strum::AsRefStr,strum::Display,strum::EnumCount,strum::EnumIter,strum::FromRepr,strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum AudioQuality {
	/// 96 kbps.
	#[default]
	Normal,
	/// 160 kbps.
	High,
	/// 320 kbps.
	VeryHigh,
}

impl AudioQuality {
	#[must_use]
	/// The bitrate in kbps this quality asks for.
	pub const fn bitrate(self) -> u32 {
		match self {
			Self::Normal => 96,
			Self::High => 160,
			Self::VeryHigh => 320,
		}
	}

	/// The file of `codec` matching this quality,
	/// else the first file of `codec`.
	fn pick(self, files: &[AudioFile], codec: CodecKind) -> Option<AudioFile> {
		let mut of_codec = files.iter().filter(|f| f.format.codec() == Some(codec));
		let first = of_codec.clone().next().copied();
		match of_codec.find(|f| f.format.bitrate() == self.bitrate()) {
			Some(f) => Some(*f),
			None => {
				if let Some(f) = first {
					warn2!("AudioQuality - no {codec} file at {self}, using {}", f.format);
				}
				first
			},
		}
	}
}

//---------------------------------------------------------------------------------------------------- QualityPolicy
/// Chooses which of a playable's files gets streamed.
pub trait QualityPolicy: Send + Sync {
	/// Pick a file out of `files`, `None` if none is acceptable.
	fn select(&self, files: &[AudioFile]) -> Option<AudioFile>;
}

/// Only Ogg Vorbis files.
#[derive(Copy,Clone,Debug,Default,PartialEq,Eq)]
pub struct VorbisOnlyQuality(pub AudioQuality);

impl QualityPolicy for VorbisOnlyQuality {
	fn select(&self, files: &[AudioFile]) -> Option<AudioFile> {
		self.0.pick(files, CodecKind::Vorbis)
	}
}

/// Only MP3 files.
#[derive(Copy,Clone,Debug,Default,PartialEq,Eq)]
pub struct Mp3Quality(pub AudioQuality);

impl QualityPolicy for Mp3Quality {
	fn select(&self, files: &[AudioFile]) -> Option<AudioFile> {
		self.0.pick(files, CodecKind::Mp3)
	}
}

/// Ogg Vorbis if there is one, else MP3.
#[derive(Copy,Clone,Debug,Default,PartialEq,Eq)]
pub struct AnyQuality(pub AudioQuality);

impl QualityPolicy for AnyQuality {
	fn select(&self, files: &[AudioFile]) -> Option<AudioFile> {
		self.0
			.pick(files, CodecKind::Vorbis)
			.or_else(|| self.0.pick(files, CodecKind::Mp3))
	}
}
