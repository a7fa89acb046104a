//! Public player events & transition reasons.

//---------------------------------------------------------------------------------------------------- Use
use strum::{AsRefStr,Display,EnumCount,EnumIter,IntoStaticStr};
use crate::{
	error::{LoadError,SessionError,TandemError},
	feeder::{PlayableId,PlaybackMetrics},
};

#[allow(unused_imports)] // docs
use crate::player::Player;

//---------------------------------------------------------------------------------------------------- Reason
/// Why playback moved to another playable.
///
/// The reason picks the fade-out of the previous playable.
#[derive(Copy,Clone,Debug,PartialEq,Eq,PartialOrd,Ord,Hash)]
#[derive(AsRefStr,Display,EnumCount,EnumIter,IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Reason {
	/// The previous playable finished (or started its natural fade-out).
	TrackDone,
	/// The previous playable failed.
	TrackError,
	/// The user skipped forward.
	ForwardBtn,
	/// The user skipped back.
	BackBtn,
	/// Playback was ended on purpose.
	EndPlay,
	/// The user picked a playable.
	ClickRow,
	/// Another device picked a playable.
	Remote,
}

impl Reason {
	#[must_use]
	/// Did a person cause this transition?
	///
	/// ```rust
	/// # use tandem::player::Reason;
	/// assert!(Reason::ForwardBtn.is_manual());
	/// assert!(!Reason::TrackDone.is_manual());
	/// assert!(!Reason::TrackError.is_manual());
	/// ```
	pub const fn is_manual(self) -> bool {
		matches!(self, Self::ForwardBtn | Self::BackBtn | Self::ClickRow | Self::Remote)
	}
}

//---------------------------------------------------------------------------------------------------- PlayerEvent
/// Events of a [`Player`], see [`Player::events`].
#[derive(Debug)]
pub enum PlayerEvent {
	/// `playable` became the current one.
	TrackChanged {
		/// The new current playable.
		playable: PlayableId,
		/// Why.
		reason: Reason,
	},

	/// `playable` loaded and is ready to play.
	TrackLoaded {
		/// The playable.
		playable: PlayableId,
		/// Its duration.
		duration_ms: u32,
		/// How the load went, `None` for custom loaders.
		metrics: Option<PlaybackMetrics>,
	},

	/// `playable` failed to load and was skipped.
	///
	/// Sent after the retry failed as well, or at once for restrictions.
	LoadingFailed {
		/// The playable.
		playable: PlayableId,
		/// The last error.
		error: LoadError,
	},

	/// The current playable failed while playing and was skipped.
	PlaybackFailed {
		/// The playable, `None` if nothing was current.
		playable: Option<PlayableId>,
		/// A decode or output error.
		error: TandemError,
	},

	/// The current playable is waiting on the network.
	PlaybackHalted {
		/// The playable.
		playable: PlayableId,
		/// The chunk it waits for.
		chunk: u32,
	},

	/// The network caught up.
	PlaybackResumed {
		/// The playable.
		playable: PlayableId,
		/// The chunk that arrived.
		chunk: u32,
		/// How long playback stalled.
		stalled_ms: u64,
	},

	/// The context has nothing left to play.
	PlaybackEnded,

	/// The session stopped, the [`Player`] is unusable.
	SessionClosed {
		/// `None` on a normal shutdown.
		error: Option<SessionError>,
	},
}

//---------------------------------------------------------------------------------------------------- InstantKind
/// What happens when an entry reaches a registered time.
#[derive(Copy,Clone,Debug,PartialEq,Eq,PartialOrd,Ord,Hash)]
#[derive(AsRefStr,Display,IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum InstantKind {
	/// Start loading the next playable.
	PreloadNext,
	/// Start the next playable, the natural fade-out begins.
	StartNext,
	/// Stop this entry, its fade-out is over.
	EndNow,
}
