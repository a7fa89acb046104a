//! The transport side of a [`ChunkedStream`].

//---------------------------------------------------------------------------------------------------- Use
use std::sync::{Arc,Weak};
use crate::{
	error::ChunkError,
	macros::{trace2,warn2},
	stream::chunked::Shared,
};

#[allow(unused_imports)] // docs
use crate::stream::ChunkedStream;

//---------------------------------------------------------------------------------------------------- Headers
/// Header carrying the content size.
///
/// From the storage service this is a `u32` big-endian count of 4-byte words.
/// In a [`crate::transport::ChunkCache`] it is stored as a `u64` big-endian byte count.
pub const HEADER_SIZE: u8 = 0x03;

/// Header carrying a CDN url, the content is not available from storage.
pub const HEADER_CDN_URL: u8 = 0x04;

//---------------------------------------------------------------------------------------------------- ChunkSink
/// Where a transport delivers the chunks of one [`ChunkedStream`].
///
/// Cheap to clone, safe to use from any thread, and every
/// method is a no-op once the stream was closed or dropped.
///
/// The content size must be reported (with [`Self::notify_size`] or
/// a [`HEADER_SIZE`] header) before or with the first chunk.
#[derive(Clone,Debug)]
pub struct ChunkSink {
	shared: Weak<Shared>,
}

impl ChunkSink {
	pub(super) fn new(shared: &Arc<Shared>) -> Self {
		Self { shared: Arc::downgrade(shared) }
	}

	/// Chunk `index` arrived as `data`, still encrypted.
	///
	/// A chunk with a length other than its expected
	/// length is reported as a failure instead.
	pub fn notify_chunk_available(&self, index: u32, data: Vec<u8>) {
		if let Some(shared) = self.shared.upgrade() {
			shared.deliver(index, data, true);
		}
	}

	/// Fetching chunk `index` failed.
	pub fn notify_chunk_error(&self, index: u32, error: ChunkError) {
		if let Some(shared) = self.shared.upgrade() {
			shared.fail(index, error);
		}
	}

	/// The content is `size` bytes long.
	///
	/// The first report wins, later different sizes are ignored.
	pub fn notify_size(&self, size: u64) {
		if let Some(shared) = self.shared.upgrade() {
			shared.set_size(size, true);
		}
	}

	/// A storage response header arrived.
	///
	/// - [`HEADER_SIZE`] sets the content size
	/// - [`HEADER_CDN_URL`] fails the whole content with [`ChunkError::StorageUnavailable`]
	/// - anything else is ignored
	pub fn notify_header(&self, id: u8, data: &[u8]) {
		let Some(shared) = self.shared.upgrade() else {
			return;
		};

		match id {
			HEADER_SIZE => match <[u8; 4]>::try_from(data) {
				Ok(words) => shared.set_size(u64::from(u32::from_be_bytes(words)) * 4, true),
				Err(_) => warn2!("ChunkSink - {} size header has {} bytes", shared.file, data.len()),
			},
			HEADER_CDN_URL => {
				let cdn_url = String::from_utf8_lossy(data).into_owned();
				shared.set_fatal(ChunkError::StorageUnavailable { cdn_url });
			},
			_ => trace2!("ChunkSink - {} ignoring header 0x{id:02x} ({} bytes)", shared.file, data.len()),
		}
	}

	/// Was the stream closed (or dropped)?
	///
	/// Transports check this to abandon work nobody waits for.
	pub fn is_closed(&self) -> bool {
		self.shared.upgrade().map_or(true, |s| s.is_closed())
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use crate::tests::FakeSource;
	use crate::crypto::ChunkDecryptor;
	use crate::feeder::FileId;
	use crate::transport::Transport;
	use std::time::Duration;

	#[test]
	fn size_header_in_words() {
		let source = FakeSource::manual(0);
		let stream = ChunkedStream::open(
			FileId::TEST,
			Transport::Source(Arc::clone(&source) as _),
			ChunkDecryptor::None,
			None,
			None,
			false,
		);
		let sink = source.sink();

		// Malformed, ignored.
		sink.notify_header(HEADER_SIZE, &[1, 2]);
		assert_eq!(stream.size(), None);

		sink.notify_header(0x7f, b"something");
		sink.notify_header(HEADER_SIZE, &1000_u32.to_be_bytes());
		assert_eq!(stream.wait_for_size(Duration::from_secs(1)).unwrap(), 4000);

		// First one wins.
		sink.notify_size(10);
		assert_eq!(stream.size(), Some(4000));
	}

	#[test]
	fn closed_after_drop() {
		let source = FakeSource::manual(0);
		let stream = ChunkedStream::open(
			FileId::TEST,
			Transport::Source(Arc::clone(&source) as _),
			ChunkDecryptor::None,
			None,
			None,
			false,
		);
		let sink = source.sink();
		assert!(!sink.is_closed());
		drop(stream);
		assert!(sink.is_closed());
		sink.notify_size(1);
		sink.notify_chunk_error(0, ChunkError::Timeout);
	}
}
