//! Playable id -> ready-to-run decoder.

//---------------------------------------------------------------------------------------------------- Use
use std::sync::Arc;
use crate::{
	codec::{Decoder,OffsetStream,SymphoniaDecoder},
	error::LoadError,
	feeder::{ContentFeeder,PlayableId,PlaybackMetrics,QualityPolicy},
	macros::debug2,
	stream::{HaltListener,StreamHandle},
};

//---------------------------------------------------------------------------------------------------- LoadedContent
/// A decoder positioned at the start of a playable.
pub struct LoadedContent {
	/// The decoder.
	pub decoder: Box<dyn Decoder>,
	/// Duration of the playable, `0` if unknown.
	pub duration_ms: u32,
	/// Closes the underlying stream, unblocking a decoder stuck on the network.
	pub stream: Option<StreamHandle>,
	/// How the load went.
	pub metrics: Option<PlaybackMetrics>,
}

impl std::fmt::Debug for LoadedContent {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LoadedContent")
			.field("duration_ms", &self.duration_ms)
			.field("metrics", &self.metrics)
			.finish_non_exhaustive()
	}
}

//---------------------------------------------------------------------------------------------------- ContentLoader
/// Loads playables for queue entries.
///
/// Called from the entry's own thread, so it may block.
pub trait ContentLoader: Send + Sync {
	/// Load `playable`.
	///
	/// `halt` should receive the stall notifications of the content stream.
	///
	/// # Errors
	/// Anything that stops `playable` from being played.
	fn load(
		&self,
		playable: &PlayableId,
		is_preload: bool,
		halt: Option<Arc<dyn HaltListener>>,
	) -> Result<LoadedContent, LoadError>;
}

//---------------------------------------------------------------------------------------------------- FeederLoader
/// [`ContentFeeder`] streams decoded with [`SymphoniaDecoder`].
pub struct FeederLoader {
	feeder: Arc<ContentFeeder>,
	quality: Box<dyn QualityPolicy>,
	normalisation: bool,
	pregain_db: f32,
}

impl FeederLoader {
	#[cold]
	#[inline(never)]
	/// Load through `feeder`, picking files with `quality`.
	///
	/// With `normalisation` the decoded samples are scaled by the
	/// normalization factor of the file (with `pregain_db` on top).
	pub fn new(
		feeder: Arc<ContentFeeder>,
		quality: Box<dyn QualityPolicy>,
		normalisation: bool,
		pregain_db: f32,
	) -> Self {
		Self { feeder, quality, normalisation, pregain_db }
	}
}

impl std::fmt::Debug for FeederLoader {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("FeederLoader")
			.field("normalisation", &self.normalisation)
			.field("pregain_db", &self.pregain_db)
			.finish_non_exhaustive()
	}
}

impl ContentLoader for FeederLoader {
	fn load(
		&self,
		playable: &PlayableId,
		is_preload: bool,
		halt: Option<Arc<dyn HaltListener>>,
	) -> Result<LoadedContent, LoadError> {
		let loaded = self.feeder.load(playable, self.quality.as_ref(), is_preload, halt)?;

		let gain = match (self.normalisation, loaded.normalization) {
			(true, Some(n)) => n.factor(self.pregain_db),
			_ => 1.0,
		};
		debug2!("FeederLoader - {playable}: gain {gain}");

		let stream = loaded.stream.handle();
		let decoder = SymphoniaDecoder::new(
			Box::new(OffsetStream::new(loaded.stream)),
			Some(loaded.codec),
			gain,
		)?;

		let duration_ms = if loaded.metadata.duration_ms > 0 {
			loaded.metadata.duration_ms
		} else {
			decoder.duration_ms().unwrap_or(0)
		};

		Ok(LoadedContent {
			decoder: Box::new(decoder),
			duration_ms,
			stream: Some(stream),
			metrics: Some(loaded.metrics),
		})
	}
}
