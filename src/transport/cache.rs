//! Chunk cache interface and an in-memory implementation.

//---------------------------------------------------------------------------------------------------- Use
use std::{
	collections::HashMap,
	sync::{Mutex,MutexGuard},
};
use crate::{
	error::ChunkError,
	feeder::FileId,
};

#[allow(unused_imports)] // docs
use crate::stream::{ChunkedStream,HEADER_SIZE};

//---------------------------------------------------------------------------------------------------- ChunkCache
/// A cache of raw (still encrypted) chunks and response headers.
///
/// [`ChunkedStream`] reads from it before every request, and writes
/// every chunk and size it received from the network, at most once
/// per chunk. Reads may happen concurrently from multiple threads.
///
/// The size is stored under [`HEADER_SIZE`] as a `u64` big-endian byte count.
pub trait ChunkCache: Send + Sync {
	/// Is chunk `index` of `file` cached?
	fn has_chunk(&self, file: &FileId, index: u32) -> bool;

	/// Read chunk `index` of `file`.
	///
	/// # Errors
	/// The chunk is not cached or could not be read.
	fn read_chunk(&self, file: &FileId, index: u32) -> Result<Vec<u8>, ChunkError>;

	/// Store chunk `index` of `file`.
	///
	/// # Errors
	/// The chunk could not be written.
	fn write_chunk(&self, file: &FileId, index: u32, data: &[u8]) -> Result<(), ChunkError>;

	/// Header `id` of `file`, if cached.
	fn header(&self, file: &FileId, id: u8) -> Option<Vec<u8>>;

	/// Store header `id` of `file`.
	///
	/// # Errors
	/// The header could not be written.
	fn set_header(&self, file: &FileId, id: u8, data: &[u8]) -> Result<(), ChunkError>;
}

//---------------------------------------------------------------------------------------------------- MemoryCache
#[derive(Debug,Default)]
struct Entries {
	chunks: HashMap<(FileId, u32), Vec<u8>>,
	headers: HashMap<(FileId, u8), Vec<u8>>,
}

/// A [`ChunkCache`] living in memory, forgotten on drop.
#[derive(Debug,Default)]
pub struct MemoryCache(Mutex<Entries>);

impl MemoryCache {
	/// An empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	fn lock(&self) -> MutexGuard<'_, Entries> {
		self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// Amount of chunks stored, of all files.
	pub fn chunks(&self) -> usize {
		self.lock().chunks.len()
	}
}

impl ChunkCache for MemoryCache {
	fn has_chunk(&self, file: &FileId, index: u32) -> bool {
		self.lock().chunks.contains_key(&(*file, index))
	}

	fn read_chunk(&self, file: &FileId, index: u32) -> Result<Vec<u8>, ChunkError> {
		self.lock()
			.chunks
			.get(&(*file, index))
			.cloned()
			.ok_or_else(|| ChunkError::Cache(format!("chunk {index} of {file} not cached").into()))
	}

	fn write_chunk(&self, file: &FileId, index: u32, data: &[u8]) -> Result<(), ChunkError> {
		self.lock()
			.chunks
			.entry((*file, index))
			.or_insert_with(|| data.to_vec());
		Ok(())
	}

	fn header(&self, file: &FileId, id: u8) -> Option<Vec<u8>> {
		self.lock().headers.get(&(*file, id)).cloned()
	}

	fn set_header(&self, file: &FileId, id: u8, data: &[u8]) -> Result<(), ChunkError> {
		self.lock().headers.insert((*file, id), data.to_vec());
		Ok(())
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn memory() {
		let c = MemoryCache::new();
		let f = FileId::TEST;

		assert!(!c.has_chunk(&f, 0));
		assert!(matches!(c.read_chunk(&f, 0), Err(ChunkError::Cache(_))));

		c.write_chunk(&f, 0, &[1, 2, 3]).unwrap();
		// Written at most once.
		c.write_chunk(&f, 0, &[4, 5, 6]).unwrap();
		assert!(c.has_chunk(&f, 0));
		assert_eq!(c.read_chunk(&f, 0).unwrap(), [1, 2, 3]);
		assert_eq!(c.chunks(), 1);

		assert_eq!(c.header(&f, 3), None);
		c.set_header(&f, 3, &[9]).unwrap();
		assert_eq!(c.header(&f, 3), Some(vec![9]));
	}
}
