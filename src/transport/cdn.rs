//! HTTP range fetching from a CDN.

//---------------------------------------------------------------------------------------------------- Use
use std::{sync::Arc,time::Duration};
use reqwest::{blocking::Client,header,StatusCode};
use crate::{
	config::CHUNK_SIZE,
	error::{ChunkError,LoadError},
	macros::{debug2,trace2},
	stream::ChunkSink,
	transport::{CdnUrl,FetchPool},
};

//---------------------------------------------------------------------------------------------------- Constants
/// Per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

//---------------------------------------------------------------------------------------------------- Free
/// The total size out of a `Content-Range: bytes <a>-<b>/<total>` header.
fn content_range_total(value: &str) -> Option<u64> {
	let (_, total) = value.trim().strip_prefix("bytes")?.rsplit_once('/')?;
	total.trim().parse().ok()
}

/// The inclusive byte range of chunk `index`.
const fn chunk_range(index: u32) -> (u64, u64) {
	let start = index as u64 * CHUNK_SIZE as u64;
	(start, start + CHUNK_SIZE as u64 - 1)
}

//---------------------------------------------------------------------------------------------------- CdnChunkFetcher
/// Fetches chunks of one content with HTTP range requests.
///
/// Every request runs on the [`FetchPool`], the
/// size comes from the `Content-Range` header.
#[derive(Debug)]
pub struct CdnChunkFetcher {
	url: CdnUrl,
	client: Client,
	pool: FetchPool,
}

impl CdnChunkFetcher {
	#[cold]
	#[inline(never)]
	/// Fetch from `url` on `pool`.
	///
	/// # Errors
	/// The HTTP client could not be built.
	pub fn new(url: CdnUrl, pool: FetchPool) -> Result<Arc<Self>, LoadError> {
		let client = Client::builder()
			.timeout(REQUEST_TIMEOUT)
			.build()
			.map_err(|e| LoadError::CdnResolution(e.to_string().into()))?;
		Ok(Arc::new(Self { url, client, pool }))
	}

	/// The url this fetcher requests from.
	pub const fn url(&self) -> &CdnUrl {
		&self.url
	}

	/// Queue a fetch of chunk `index` into `sink`.
	pub fn request_chunk(self: &Arc<Self>, index: u32, sink: ChunkSink) {
		let this = Arc::clone(self);
		self.pool.execute(move || {
			if sink.is_closed() {
				trace2!("CdnChunkFetcher - chunk {index} abandoned, stream closed");
				return;
			}
			match this.fetch(index) {
				Ok((total, data)) => {
					sink.notify_size(total);
					sink.notify_chunk_available(index, data);
				},
				Err(e) => sink.notify_chunk_error(index, e),
			}
		});
	}

	/// Blocking fetch of chunk `index`, returns `(total_size, bytes)`.
	fn fetch(&self, index: u32) -> Result<(u64, Vec<u8>), ChunkError> {
		let url = self.url.url()?;
		let (start, end) = chunk_range(index);
		trace2!("CdnChunkFetcher - GET bytes={start}-{end}");

		let response = self.client
			.get(url)
			.header(header::RANGE, format!("bytes={start}-{end}"))
			.send()
			.map_err(|e| ChunkError::Fetch(e.to_string().into()))?;

		let status = response.status();
		if status != StatusCode::PARTIAL_CONTENT {
			debug2!("CdnChunkFetcher - chunk {index}: unexpected status {status}");
			return Err(ChunkError::Http { status: status.as_u16() });
		}

		let total = response
			.headers()
			.get(header::CONTENT_RANGE)
			.and_then(|v| v.to_str().ok())
			.and_then(content_range_total)
			.ok_or(ChunkError::UnknownSize)?;

		let data = response
			.bytes()
			.map_err(|e| ChunkError::Fetch(e.to_string().into()))?;

		Ok((total, data.to_vec()))
	}
}
