//! Playable ids, their metadata, and the feeder turning them into streams.

mod metadata;
pub use metadata::{
	FileId,
	PlayableId,
	AudioFormat,
	AudioFile,
	Restriction,
	TrackMetadata,
	MetadataProvider,
};

mod quality;
pub use quality::{AudioQuality,QualityPolicy,VorbisOnlyQuality,Mp3Quality,AnyQuality};

mod normalization;
pub use normalization::NormalizationData;

mod storage;
pub use storage::{StorageResult,StorageResolveResponse,StorageResolver,KeyProvider};

mod feeder;
pub use feeder::{ContentFeeder,Services,LoadedStream,PlaybackMetrics};
