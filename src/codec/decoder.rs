//! The decoder seam.

//---------------------------------------------------------------------------------------------------- Use
use crate::{error::DecodeError,mixer::OutputFormat};

//---------------------------------------------------------------------------------------------------- CodecKind
/// The codecs stored content comes in.
#[derive(Copy,Clone,Debug,PartialEq,Eq,Hash)]
#[derive(strum::AsRefStr,strum::Display,strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CodecKind {
	/// Ogg Vorbis.
	Vorbis,
	/// MPEG layer 3.
	Mp3,
}

impl CodecKind {
	#[must_use]
	/// The usual file extension, a probing hint.
	pub const fn extension(self) -> &'static str {
		match self {
			Self::Vorbis => "ogg",
			Self::Mp3 => "mp3",
		}
	}
}

//---------------------------------------------------------------------------------------------------- Decoder
/// Turns one content into blocks of interleaved 16-bit PCM.
///
/// Driven by a single queue entry thread.
pub trait Decoder: Send {
	/// The format of the blocks currently produced.
	fn format(&self) -> OutputFormat;

	/// Decode the next block into `out` (replacing its contents).
	///
	/// Returns `false` at the end of the content.
	///
	/// # Errors
	/// The content could not be read or decoded.
	fn read_block(&mut self, out: &mut Vec<u8>) -> Result<bool, DecodeError>;

	/// Seek to `ms`, returning where the decoder actually landed.
	///
	/// # Errors
	/// The content is not seekable there.
	fn seek(&mut self, ms: u32) -> Result<u32, DecodeError>;

	/// The time of the last block decoded, `None` before the first.
	fn time_ms(&self) -> Option<u32>;

	/// The total duration, if the container knows it.
	fn duration_ms(&self) -> Option<u32>;
}
