//! The configuration for [`Player`].

//---------------------------------------------------------------------------------------------------- use
use std::time::Duration;
use crate::{
	output::OutputKind,
	feeder::AudioQuality,
	mixer::Volume,
	config::constants::{DEFAULT_FETCH_WORKERS,DEFAULT_BUFFER_MILLISECONDS},
};

#[allow(unused_imports)] // docs
use crate::player::Player;

//---------------------------------------------------------------------------------------------------- PlayerConfig
/// Initialization config for the [`Player`].
///
/// This configuration is passed once to [`Player::new`]
/// and used for the rest of the `Player`'s lifetime.
#[derive(Clone,Debug,PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PlayerConfig {
	//------------------------------------------ Output
	/// Where the mixed audio goes.
	pub output: OutputKind,

	/// How many milliseconds of audio each mixer port buffers.
	///
	/// This is also the latency between a decoder writing
	/// audio and that audio reaching the output.
	pub buffer_milliseconds: u16,

	/// The initial volume.
	pub volume: Volume,

	//------------------------------------------ Content
	/// The preferred audio quality.
	pub quality: AudioQuality,

	/// The 2-letter country code used for content restriction checks.
	///
	/// An empty string passes every "allowed" list check
	/// and never matches a "forbidden" list.
	pub country: String,

	/// Should loudness normalization be applied?
	pub normalisation: bool,

	/// Pre-gain in dB applied on top of the track gain.
	pub normalisation_pregain: f32,

	//------------------------------------------ Transitions
	/// Crossfade length between tracks.
	///
	/// [`Duration::ZERO`] disables crossfading.
	pub crossfade: Duration,

	/// Should the next track be preloaded before the current one ends?
	///
	/// Preloading always happens when `crossfade` is set.
	pub preload: bool,

	//------------------------------------------ Fetching
	/// Retry a failing chunk up to 128 times instead of once.
	pub aggressive_chunk_retry: bool,

	/// Amount of threads fetching chunks and running storage channels.
	pub fetch_workers: usize,

	/// How long to wait for the first header of a storage channel
	/// before giving up on the content.
	pub storage_header_timeout: Duration,

	//------------------------------------------ Shutdown
	/// Should [`Player`]'s [`Drop`] block until the
	/// session thread and audio sink have exited?
	pub shutdown_blocking: bool,
}

//---------------------------------------------------------------------------------------------------- PlayerConfig Impl
impl PlayerConfig {
	/// A reasonable default [`PlayerConfig`].
	///
	/// ```rust
	/// # use tandem::config::*;
	/// # use tandem::output::OutputKind;
	/// # use tandem::feeder::AudioQuality;
	/// # use tandem::mixer::Volume;
	/// # use std::time::Duration;
	/// assert_eq!(PlayerConfig::DEFAULT, PlayerConfig {
	///     output:                 OutputKind::Device,
	///     buffer_milliseconds:    500,
	///     volume:                 Volume::DEFAULT,
	///     quality:                AudioQuality::Normal,
	///     country:                String::new(),
	///     normalisation:          true,
	///     normalisation_pregain:  3.0,
	///     crossfade:              Duration::ZERO,
	///     preload:                true,
	///     aggressive_chunk_retry: false,
	///     fetch_workers:          8,
	///     storage_header_timeout: Duration::from_secs(10),
	///     shutdown_blocking:      true,
	/// });
	/// ```
	pub const DEFAULT: Self = Self {
		output:                 OutputKind::Device,
		buffer_milliseconds:    DEFAULT_BUFFER_MILLISECONDS,
		volume:                 Volume::DEFAULT,
		quality:                AudioQuality::Normal,
		country:                String::new(),
		normalisation:          true,
		normalisation_pregain:  3.0,
		crossfade:              Duration::ZERO,
		preload:                true,
		aggressive_chunk_retry: false,
		fetch_workers:          DEFAULT_FETCH_WORKERS,
		storage_header_timeout: Duration::from_secs(10),
		shutdown_blocking:      true,
	};

	#[must_use]
	/// Crossfade length in milliseconds, saturating at [`u32::MAX`].
	pub fn crossfade_millis(&self) -> u32 {
		u32::try_from(self.crossfade.as_millis()).unwrap_or(u32::MAX)
	}
}

impl Default for PlayerConfig {
	fn default() -> Self {
		Self::DEFAULT
	}
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default() {
		let c = PlayerConfig::default();
		assert_eq!(c, PlayerConfig::DEFAULT);
		assert_eq!(c.crossfade_millis(), 0);
		assert!(c.fetch_workers > 0);
	}

	#[test]
	fn crossfade_millis() {
		let c = PlayerConfig {
			crossfade: Duration::from_secs(3),
			..PlayerConfig::DEFAULT
		};
		assert_eq!(c.crossfade_millis(), 3000);
	}
}
