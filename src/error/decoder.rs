//---------------------------------------------------------------------------------------------------- use
use symphonia::core::errors::{Error as SymphoniaError,SeekErrorKind};

#[allow(unused_imports)] // docs
use crate::codec::Decoder;

//---------------------------------------------------------------------------------------------------- DecodeError
/// A [`Decoder`] could not be created, read or seeked.
#[derive(thiserror::Error, Debug)]
pub enum DecodeError {
	#[error("malformed audio data: {0}")]
	/// The content does not decode.
	Malformed(&'static str),

	#[error("unsupported codec/container: {0}")]
	/// The container or codec is unknown.
	Unsupported(&'static str),

	#[error("decoder limit reached: {0}")]
	/// The content exceeds a decoder limit.
	Limit(&'static str),

	#[error("seek failed: {0}")]
	/// The seek target cannot be reached.
	Seek(&'static str),

	#[error("no decodable track in the container")]
	/// No track has a known codec.
	NoTrack,

	#[error("the track has no sample rate")]
	/// The codec parameters carry no sample rate.
	NoSampleRate,

	#[error("the decoder needs a reset")]
	/// The track list changed mid-stream.
	Reset,

	#[error("stream error: {0}")]
	/// Reading the underlying stream failed, stalls
	/// and chunk failures of the content included.
	Stream(#[from] std::io::Error),
}

impl From<SymphoniaError> for DecodeError {
	fn from(error: SymphoniaError) -> Self {
		match error {
			SymphoniaError::DecodeError(s) => Self::Malformed(s),
			SymphoniaError::Unsupported(s) => Self::Unsupported(s),
			SymphoniaError::LimitError(s) => Self::Limit(s),
			SymphoniaError::IoError(e) => Self::Stream(e),
			SymphoniaError::SeekError(kind) => Self::Seek(match kind {
				SeekErrorKind::Unseekable => "unseekable",
				SeekErrorKind::ForwardOnly => "forward only",
				SeekErrorKind::OutOfRange => "out of range",
				SeekErrorKind::InvalidTrack => "invalid track",
			}),
			SymphoniaError::ResetRequired => Self::Reset,
		}
	}
}
