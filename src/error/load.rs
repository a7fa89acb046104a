//---------------------------------------------------------------------------------------------------- use
use std::borrow::Cow;
use crate::error::{ChunkError,DecodeError};

#[allow(unused_imports)] // docs
use crate::feeder::ContentFeeder;

//---------------------------------------------------------------------------------------------------- LoadError
#[derive(thiserror::Error, Debug)]
/// Errors when loading a playable with the [`ContentFeeder`].
///
/// The session retries these once per track unless
/// [`LoadError::is_restricted`] is `true`.
pub enum LoadError {
	#[error("content is restricted in this country")]
	/// The content may not be played here, never retried
	Restricted,

	#[error("no audio file matches any supported format")]
	/// The quality policy found no playable file
	FormatUnsupported,

	#[error("the playable has no audio files")]
	/// Neither the playable nor any alternative has files
	NoFiles,

	#[error("failed to resolve a cdn url: {0}")]
	/// The storage resolution service failed, or gave no url
	CdnResolution(Cow<'static, str>),

	#[error("failed to get metadata: {0}")]
	/// The metadata service failed
	Metadata(Cow<'static, str>),

	#[error("failed to get audio key: {0}")]
	/// The audio key service failed
	Key(Cow<'static, str>),

	#[error("chunk error: {0}")]
	/// The content stream failed
	Chunk(#[from] ChunkError),

	#[error("decode error: {0}")]
	/// The decoder could not be created
	Decode(#[from] DecodeError),

	#[error("load io error: {0}")]
	/// Reading the stream failed
	Io(#[from] std::io::Error),

	#[error("the load was cancelled")]
	/// The entry loading was closed before finishing
	Closed,
}

impl LoadError {
	/// Is this a content restriction?
	///
	/// Restrictions are never retried, the track is skipped.
	pub const fn is_restricted(&self) -> bool {
		matches!(self, Self::Restricted)
	}
}
