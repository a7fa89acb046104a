//! The content model: playables, audio files and their restrictions.

//---------------------------------------------------------------------------------------------------- Use
use std::sync::Arc;
use crate::{codec::CodecKind,error::LoadError};

#[allow(unused_imports)] // docs
use crate::feeder::ContentFeeder;

//---------------------------------------------------------------------------------------------------- FileId
/// The 20-byte id of one stored audio file.
#[derive(Copy,Clone,Default,PartialEq,Eq,PartialOrd,Ord,Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileId([u8; 20]);

impl FileId {
	#[cfg(test)]
	/// A file id for tests.
	pub(crate) const TEST: Self = Self([
		0xde, 0xad, 0xbe, 0xef, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05,
		0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
	]);

	#[must_use]
	/// Wrap raw id bytes.
	pub const fn new(bytes: [u8; 20]) -> Self {
		Self(bytes)
	}

	#[must_use]
	/// The raw id bytes.
	pub const fn as_bytes(&self) -> &[u8; 20] {
		&self.0
	}

	#[must_use]
	/// Parse 40 hex characters (either case).
	pub fn from_hex(hex: &str) -> Option<Self> {
		let hex = hex.as_bytes();
		if hex.len() != 40 {
			return None;
		}
		let nibble = |c: u8| char::from(c).to_digit(16);

		let mut bytes = [0; 20];
		for (byte, pair) in bytes.iter_mut().zip(hex.chunks_exact(2)) {
			let hi = nibble(pair[0])?;
			let lo = nibble(pair[1])?;
			#[allow(clippy::cast_possible_truncation)]
			{ *byte = (hi << 4 | lo) as u8; }
		}
		Some(Self(bytes))
	}
}

impl std::fmt::Display for FileId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		for b in self.0 {
			write!(f, "{b:02x}")?;
		}
		Ok(())
	}
}

impl std::fmt::Debug for FileId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "FileId({self})")
	}
}

//---------------------------------------------------------------------------------------------------- PlayableId
/// Something that can be queued and played.
#[derive(Clone,Debug,PartialEq,Eq,Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlayableId {
	/// A music track.
	Track(Arc<str>),
	/// A podcast episode.
	Episode(Arc<str>),
}

impl PlayableId {
	/// A track with id `id`.
	pub fn track(id: &str) -> Self {
		Self::Track(Arc::from(id))
	}

	/// An episode with id `id`.
	pub fn episode(id: &str) -> Self {
		Self::Episode(Arc::from(id))
	}

	#[must_use]
	/// The id without its kind.
	pub fn id(&self) -> &str {
		match self {
			Self::Track(id) | Self::Episode(id) => id,
		}
	}
}

impl std::fmt::Display for PlayableId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Track(id)   => write!(f, "track:{id}"),
			Self::Episode(id) => write!(f, "episode:{id}"),
		}
	}
}

//---------------------------------------------------------------------------------------------------- AudioFormat
#[allow(non_camel_case_types)]
#[derive(Copy,Clone,Debug,PartialEq,Eq,PartialOrd,Ord,Hash)]
#[derive(strum::AsRefStr,strum::Display,strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// The encoding and bitrate of a stored audio file.
pub enum AudioFormat {
	/// Ogg Vorbis, 96 kbps.
	OggVorbis96,
	/// Ogg Vorbis, 160 kbps.
	OggVorbis160,
	/// Ogg Vorbis, 320 kbps.
	OggVorbis320,
	/// MP3, 96 kbps.
	Mp3_96,
	/// MP3, 160 kbps.
	Mp3_160,
	/// MP3, 256 kbps.
	Mp3_256,
	/// MP3, 320 kbps.
	Mp3_320,
	/// AAC, 24 kbps.
	Aac24,
	/// AAC, 48 kbps.
	Aac48,
}

impl AudioFormat {
	#[must_use]
	/// The codec to decode this format with, `None` if unsupported.
	pub const fn codec(self) -> Option<CodecKind> {
		match self {
			Self::OggVorbis96 | Self::OggVorbis160 | Self::OggVorbis320 => Some(CodecKind::Vorbis),
			Self::Mp3_96 | Self::Mp3_160 | Self::Mp3_256 | Self::Mp3_320 => Some(CodecKind::Mp3),
			Self::Aac24 | Self::Aac48 => None,
		}
	}

	#[must_use]
	/// The bitrate in kbps.
	pub const fn bitrate(self) -> u32 {
		match self {
			Self::Aac24 => 24,
			Self::Aac48 => 48,
			Self::OggVorbis96 | Self::Mp3_96 => 96,
			Self::OggVorbis160 | Self::Mp3_160 => 160,
			Self::Mp3_256 => 256,
			Self::OggVorbis320 | Self::Mp3_320 => 320,
		}
	}
}

//---------------------------------------------------------------------------------------------------- AudioFile
/// One stored encoding of a playable.
#[derive(Copy,Clone,Debug,PartialEq,Eq,Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AudioFile {
	/// Where the bytes are.
	pub file_id: FileId,
	/// How the bytes are encoded.
	pub format: AudioFormat,
}

//---------------------------------------------------------------------------------------------------- Restriction
/// A country restriction.
///
/// Both lists are concatenated 2-letter country codes, e.g. `"SEDEFR"`.
#[derive(Clone,Debug,Default,PartialEq,Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Restriction {
	/// If `Some`, only these countries may play the content.
	pub countries_allowed: Option<String>,
	/// If `Some`, these countries may not play the content.
	pub countries_forbidden: Option<String>,
}

/// Does the concatenated code list `list` contain `country`?
fn list_contains(list: &str, country: &str) -> bool {
	list.as_bytes()
		.chunks_exact(2)
		.any(|code| code.eq_ignore_ascii_case(country.as_bytes()))
}

impl Restriction {
	#[must_use]
	/// Is the content restricted in `country`?
	///
	/// An empty `country` passes allow lists and never matches forbid lists.
	pub fn is_restricted(&self, country: &str) -> bool {
		if country.is_empty() {
			return false;
		}
		if let Some(allowed) = &self.countries_allowed {
			if !list_contains(allowed, country) {
				return true;
			}
		}
		if let Some(forbidden) = &self.countries_forbidden {
			if list_contains(forbidden, country) {
				return true;
			}
		}
		false
	}
}

//---------------------------------------------------------------------------------------------------- TrackMetadata
/// What a [`MetadataProvider`] knows about a playable.
#[derive(Clone,Debug,Default,PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrackMetadata {
	/// Display name.
	pub name: String,
	/// Duration in milliseconds.
	pub duration_ms: u32,
	/// Every stored encoding.
	pub files: Vec<AudioFile>,
	/// Alternatives used when `files` is empty.
	pub alternatives: Vec<TrackMetadata>,
	/// Country restrictions, any one restricting is enough.
	pub restrictions: Vec<Restriction>,
	/// An unencrypted external location (some episodes).
	pub external_url: Option<String>,
}

impl TrackMetadata {
	#[must_use]
	/// Is this restricted in `country`?
	pub fn is_restricted(&self, country: &str) -> bool {
		self.restrictions.iter().any(|r| r.is_restricted(country))
	}

	#[must_use]
	/// `files`, or those of the first alternative that has any.
	pub fn playable_files(&self) -> &[AudioFile] {
		if !self.files.is_empty() {
			return &self.files;
		}
		self.alternatives
			.iter()
			.find(|a| !a.files.is_empty())
			.map_or(&[], |a| a.files.as_slice())
	}
}

//---------------------------------------------------------------------------------------------------- MetadataProvider
/// The metadata service.
pub trait MetadataProvider: Send + Sync {
	/// Metadata of `playable`.
	///
	/// # Errors
	/// Normally [`LoadError::Metadata`].
	fn metadata(&self, playable: &PlayableId) -> Result<TrackMetadata, LoadError>;
}
