//! Initialization configuration & crate-wide constants.

mod player_config;
pub use player_config::PlayerConfig;

mod constants;
pub use constants::CHUNK_SIZE;
pub(crate) use constants::{
	PRELOAD_AHEAD,
	PRELOAD_CHUNK_RETRIES,
	MAX_CHUNK_TRIES,
	WAIT_SLICE,
	CHANNEL_TIMEOUT,
	CDN_URL_RENEW_MARGIN,
	NORMALIZATION_OFFSET,
	NORMALIZATION_LEN,
	VORBIS_HEADER_LEN,
	PRELOAD_BEFORE_FADE_MS,
};
