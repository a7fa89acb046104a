//---------------------------------------------------------------------------------------------------- SessionError
#[allow(unused_imports)] // docs
use crate::player::Player;

#[derive(thiserror::Error, Debug)]
/// Errors of the playback session.
///
/// Any of these ends the session, the [`Player`] has to be recreated.
pub enum SessionError {
	#[error("no free mixer port")]
	/// Both mixer ports were taken when a new entry needed one.
	///
	/// At most two entries overlap, so this is a bug.
	MixerPortExhausted,

	#[error("the session is closed")]
	/// The session was already closed
	Closed,

	#[error("failed to spawn thread: {0}")]
	/// An OS thread could not be spawned
	ThreadSpawn(#[from] std::io::Error),
}
