//! Playback: queue entries, the queue, and the session driving transitions.
//!
//! [`Player`] is the handle, everything else runs on the session thread
//! and one thread per queue entry.

mod event;
pub use event::{PlayerEvent,Reason};

mod crossfade;
pub use crossfade::{CrossfadePolicy,FadeInterval,FadeKind,LinearCrossfade};

mod context;
pub use context::{ListContext,PlaybackContext};

mod loader;
pub use loader::{ContentLoader,FeederLoader,LoadedContent};

mod queue;
mod entry;
mod session;

mod player;
pub use player::Player;
