//---------------------------------------------------------------------------------------------------- use
use crate::error::{
	ChunkError,
	TransportError,
	LoadError,
	DecodeError,
	OutputError,
	SessionError,
};

//---------------------------------------------------------------------------------------------------- TandemError
#[derive(thiserror::Error, Debug)]
/// All `tandem` errors.
///
/// Every concern has its own error type, this gathers them
/// for callers that do not care which layer something failed in.
pub enum TandemError {
	#[error("chunk error: {0}")]
	/// A chunk could not be fetched, decrypted or validated
	Chunk(#[from] ChunkError),

	#[error("transport error: {0}")]
	/// A storage channel frame could not be sent or parsed
	Transport(#[from] TransportError),

	#[error("load error: {0}")]
	/// A playable could not be loaded
	Load(#[from] LoadError),

	#[error("audio decode error: {0}")]
	/// Error occurred during audio decoding
	Decode(#[from] DecodeError),

	#[error("audio output error: {0}")]
	/// Error occurred during audio output
	Output(#[from] OutputError),

	#[error("session error: {0}")]
	/// The playback session failed
	Session(#[from] SessionError),
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn from() {
		let e: TandemError = ChunkError::Http { status: 404 }.into();
		assert!(matches!(e, TandemError::Chunk(ChunkError::Http { status: 404 })));
		assert_eq!(e.to_string(), "chunk error: unexpected http status: 404");

		let e: TandemError = SessionError::MixerPortExhausted.into();
		assert!(matches!(e, TandemError::Session(SessionError::MixerPortExhausted)));
	}
}
