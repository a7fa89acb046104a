//! The transport a stream fetches its chunks with.

//---------------------------------------------------------------------------------------------------- Use
use std::sync::Arc;
use crate::{
	feeder::FileId,
	stream::ChunkSink,
	transport::{ChannelMultiplexer,CdnChunkFetcher},
};

//---------------------------------------------------------------------------------------------------- ChunkSource
/// A custom chunk source.
///
/// Implementors must not block in [`ChunkSource::request_chunk`] for
/// long, and must report the content size before or with chunk `0`.
pub trait ChunkSource: Send + Sync {
	/// Fetch chunk `index`, reporting the result into `sink`.
	fn request_chunk(&self, index: u32, sink: ChunkSink);
}

//---------------------------------------------------------------------------------------------------- Transport
/// Where the chunks of one content come from.
#[derive(Clone)]
pub enum Transport {
	/// Storage channels over the authenticated connection.
	Storage {
		/// The connection's multiplexer.
		mux: Arc<ChannelMultiplexer>,
		/// The content to request.
		file: FileId,
	},
	/// HTTP range requests against a CDN.
	Cdn(Arc<CdnChunkFetcher>),
	/// Anything else.
	Source(Arc<dyn ChunkSource>),
}

impl std::fmt::Debug for Transport {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

impl Transport {
	/// Request chunk `index`.
	pub(crate) fn request_chunk(&self, index: u32, sink: ChunkSink) {
		match self {
			Self::Storage { mux, file } => mux.request_chunk(file, index, sink),
			Self::Cdn(cdn) => cdn.request_chunk(index, sink),
			Self::Source(source) => source.request_chunk(index, sink),
		}
	}

	/// A short name for logs.
	pub const fn name(&self) -> &'static str {
		match self {
			Self::Storage { .. } => "storage",
			Self::Cdn(_) => "cdn",
			Self::Source(_) => "source",
		}
	}
}
