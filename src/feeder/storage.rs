//! Collaborator services consulted per load.

//---------------------------------------------------------------------------------------------------- Use
use crate::{
	crypto::AudioKey,
	error::LoadError,
	feeder::{FileId,PlayableId},
};

//---------------------------------------------------------------------------------------------------- StorageResolver
/// Where a file is served from.
#[derive(Copy,Clone,Debug,PartialEq,Eq,Hash)]
#[derive(strum::AsRefStr,strum::Display,strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StorageResult {
	/// Storage channels over the authenticated connection.
	Storage,
	/// A CDN, see [`StorageResolveResponse::cdn_urls`].
	Cdn,
	/// Not available in this region.
	Restricted,
}

/// The answer of a [`StorageResolver`].
#[derive(Clone,Debug,PartialEq,Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StorageResolveResponse {
	/// Where to fetch from.
	pub result: StorageResult,
	/// Candidate urls for [`StorageResult::Cdn`], best first.
	pub cdn_urls: Vec<String>,
}

/// The storage resolution service.
///
/// Also used to renew expiring CDN urls.
pub trait StorageResolver: Send + Sync {
	/// Resolve where `file` is served from.
	///
	/// # Errors
	/// Normally [`LoadError::CdnResolution`].
	fn resolve(&self, file: &FileId) -> Result<StorageResolveResponse, LoadError>;
}

//---------------------------------------------------------------------------------------------------- KeyProvider
/// The audio key service.
pub trait KeyProvider: Send + Sync {
	/// The decryption key of `file` of `playable`.
	///
	/// # Errors
	/// Normally [`LoadError::Key`].
	fn audio_key(&self, playable: &PlayableId, file: &FileId) -> Result<AudioKey, LoadError>;
}
