//! Constants shared across the whole data path.

//---------------------------------------------------------------------------------------------------- Use
use std::time::Duration;

//---------------------------------------------------------------------------------------------------- Chunks
/// Size of one addressable chunk of content, 128 KiB.
///
/// Every transport, the cache and the decryptor address content in
/// chunks of this size. Only the last chunk of a content may be shorter.
pub const CHUNK_SIZE: usize = 128 * 1024;

/// How many chunks past the accessed one get requested in advance.
pub(crate) const PRELOAD_AHEAD: u32 = 3;

/// A chunk that failed this many times is no longer preloaded,
/// only requested when a reader actually needs it.
pub(crate) const PRELOAD_CHUNK_RETRIES: u32 = 2;

/// Upper bound of failures per chunk with aggressive retry on.
pub(crate) const MAX_CHUNK_TRIES: u32 = 128;

//---------------------------------------------------------------------------------------------------- Waiting
/// The upper bound of every single condvar wait in the crate.
///
/// Waits loop and re-check their predicate (and `closed`)
/// after at most this long.
pub(crate) const WAIT_SLICE: Duration = Duration::from_millis(100);

/// A storage channel with no fragment for this long is aborted.
pub(crate) const CHANNEL_TIMEOUT: Duration = Duration::from_secs(30);

/// How long before its expiry a CDN url gets renewed.
pub(crate) const CDN_URL_RENEW_MARGIN: Duration = Duration::from_secs(5 * 60);

//---------------------------------------------------------------------------------------------------- Content layout
/// Byte offset of the normalization block in a stored audio file.
pub(crate) const NORMALIZATION_OFFSET: u64 = 144;

/// Length of the normalization block (4 little-endian `f32`s).
pub(crate) const NORMALIZATION_LEN: usize = 4 * 4;

/// Ogg Vorbis files are prefixed with a header of this many bytes.
pub(crate) const VORBIS_HEADER_LEN: u64 = 0xa7;

//---------------------------------------------------------------------------------------------------- Player
/// The next track gets preloaded this long before the current one starts fading out.
pub(crate) const PRELOAD_BEFORE_FADE_MS: u32 = 20_000;

/// Default amount of fetch worker threads.
pub(crate) const DEFAULT_FETCH_WORKERS: usize = 8;

/// Default length of the audio held in each mixer port.
pub(crate) const DEFAULT_BUFFER_MILLISECONDS: u16 = 500;
