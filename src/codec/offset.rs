//! A stream that starts somewhere past the start of the content.

//---------------------------------------------------------------------------------------------------- Use
use std::io::{self,Read,Seek,SeekFrom};
use crate::stream::ChunkedStream;

//---------------------------------------------------------------------------------------------------- OffsetStream
/// A [`ChunkedStream`] seen from its current position on.
///
/// Position `0` of this stream is position `offset` of the inner one,
/// which hides e.g. the header in front of stored Ogg files.
#[derive(Debug)]
pub struct OffsetStream {
	inner: ChunkedStream,
	offset: u64,
}

impl OffsetStream {
	#[must_use]
	/// Start at the current position of `inner`.
	pub fn new(inner: ChunkedStream) -> Self {
		let offset = inner.position();
		Self { inner, offset }
	}

	#[must_use]
	/// Where this stream starts in the inner one.
	pub const fn offset(&self) -> u64 {
		self.offset
	}

	#[must_use]
	/// The inner stream.
	pub const fn inner(&self) -> &ChunkedStream {
		&self.inner
	}
}

impl Read for OffsetStream {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		self.inner.read(buf)
	}
}

impl Seek for OffsetStream {
	fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
		let pos = match pos {
			SeekFrom::Start(p) => SeekFrom::Start(p.saturating_add(self.offset)),
			other => other,
		};
		let inner = self.inner.seek(pos)?;
		if inner < self.offset {
			self.inner.seek_to(self.offset)?;
			return Err(io::Error::new(io::ErrorKind::InvalidInput, "seek before the start of the stream"));
		}
		Ok(inner - self.offset)
	}

	fn stream_position(&mut self) -> io::Result<u64> {
		Ok(self.inner.position().saturating_sub(self.offset))
	}
}

impl symphonia::core::io::MediaSource for OffsetStream {
	fn is_seekable(&self) -> bool {
		true
	}

	fn byte_len(&self) -> Option<u64> {
		self.inner.size().map(|s| s.saturating_sub(self.offset))
	}
}
