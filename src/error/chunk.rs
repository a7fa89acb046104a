//---------------------------------------------------------------------------------------------------- use
use std::borrow::Cow;

#[allow(unused_imports)] // docs
use crate::stream::ChunkedStream;

//---------------------------------------------------------------------------------------------------- ChunkError
#[derive(thiserror::Error, Clone, Debug, PartialEq, Eq)]
/// Errors for a single chunk of a [`ChunkedStream`].
///
/// These are reported by the transports into the stream.
/// Most of them are transient, the stream retries them
/// according to its retry policy and only the final one
/// is surfaced to the reader.
///
/// This is `Clone` since the same failure is both stored for
/// the blocked reader and logged/forwarded elsewhere.
pub enum ChunkError {
	#[error("failed to fetch chunk: {0}")]
	/// Generic transient fetch failure
	Fetch(Cow<'static, str>),

	#[error("storage channel error code: {code}")]
	/// The storage channel was aborted by the remote with this code
	Channel {
		/// The remote's error code
		code: u16,
	},

	#[error("unexpected http status: {status}")]
	/// A CDN response was not `206 Partial Content`
	Http {
		/// The HTTP status code received
		status: u16,
	},

	#[error("chunk {index} has length {got}, expected {expected}")]
	/// A chunk arrived with the wrong length
	Length {
		/// The chunk index
		index: u32,
		/// The expected length
		expected: usize,
		/// The actual length
		got: usize,
	},

	#[error("failed to decrypt chunk")]
	/// Decrypting the chunk failed
	Decrypt,

	#[error("content is not available from storage, cdn url: {cdn_url}")]
	/// The storage service redirected the content to the CDN.
	///
	/// This is not retried, the loader falls back to the CDN instead.
	StorageUnavailable {
		/// The url to fetch the content from instead
		cdn_url: String,
	},

	#[error("the content size is unknown")]
	/// The content size was not known in time
	UnknownSize,

	#[error("timed out waiting for chunk")]
	/// A transport stopped responding
	Timeout,

	#[error("the stream was closed")]
	/// The stream was closed while waiting
	Closed,

	#[error("chunk cache error: {0}")]
	/// The chunk cache failed
	Cache(Cow<'static, str>),
}

impl ChunkError {
	/// Is this failure worth retrying?
	///
	/// [`ChunkError::StorageUnavailable`] and [`ChunkError::Closed`] are not.
	pub const fn is_retryable(&self) -> bool {
		!matches!(self, Self::StorageUnavailable { .. } | Self::Closed)
	}
}

impl From<ChunkError> for std::io::Error {
	fn from(error: ChunkError) -> Self {
		use std::io::ErrorKind as K;
		let kind = match error {
			ChunkError::Timeout => K::TimedOut,
			ChunkError::Closed  => K::BrokenPipe,
			ChunkError::UnknownSize => K::UnexpectedEof,
			_ => K::Other,
		};
		Self::new(kind, error)
	}
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn retryable() {
		assert!(ChunkError::Timeout.is_retryable());
		assert!(ChunkError::Http { status: 500 }.is_retryable());
		assert!(!ChunkError::Closed.is_retryable());
		assert!(!ChunkError::StorageUnavailable { cdn_url: String::new() }.is_retryable());
	}

	#[test]
	fn into_io() {
		let e: std::io::Error = ChunkError::Timeout.into();
		assert_eq!(e.kind(), std::io::ErrorKind::TimedOut);

		// The original error survives the conversion.
		let e: std::io::Error = ChunkError::Channel { code: 2 }.into();
		let inner = e.into_inner().unwrap().downcast::<ChunkError>().unwrap();
		assert_eq!(*inner, ChunkError::Channel { code: 2 });
	}
}
