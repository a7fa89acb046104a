//! What plays next.

//---------------------------------------------------------------------------------------------------- Use
use crate::feeder::PlayableId;

//---------------------------------------------------------------------------------------------------- PlaybackContext
/// The source of playables: a playlist, an album, a radio.
pub trait PlaybackContext: Send {
	/// Move forward, returning the new current playable.
	fn next_playable(&mut self) -> Option<PlayableId>;

	/// What [`Self::next_playable`] would return, without moving.
	fn peek_next(&self) -> Option<PlayableId>;

	/// Move back, returning the new current playable.
	fn previous_playable(&mut self) -> Option<PlayableId>;

	/// `playable` was picked directly.
	fn set_current(&mut self, _playable: &PlayableId) {}
}

//---------------------------------------------------------------------------------------------------- ListContext
/// A fixed list, played once in order.
#[derive(Clone,Debug,Default,PartialEq,Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ListContext {
	playables: Vec<PlayableId>,
	/// `None` before the first playable.
	index: Option<usize>,
}

impl ListContext {
	/// Play `playables` in order.
	pub const fn new(playables: Vec<PlayableId>) -> Self {
		Self { playables, index: None }
	}

	/// Index of the current playable.
	pub const fn index(&self) -> Option<usize> {
		self.index
	}

	fn next_index(&self) -> usize {
		self.index.map_or(0, |i| i + 1)
	}
}

impl PlaybackContext for ListContext {
	fn next_playable(&mut self) -> Option<PlayableId> {
		let next = self.next_index();
		let playable = self.playables.get(next)?.clone();
		self.index = Some(next);
		Some(playable)
	}

	fn peek_next(&self) -> Option<PlayableId> {
		self.playables.get(self.next_index()).cloned()
	}

	fn previous_playable(&mut self) -> Option<PlayableId> {
		let previous = self.index?.checked_sub(1)?;
		self.index = Some(previous);
		self.playables.get(previous).cloned()
	}

	fn set_current(&mut self, playable: &PlayableId) {
		if let Some(i) = self.playables.iter().position(|p| p == playable) {
			self.index = Some(i);
		}
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	#[test]
	fn walk() {
		let (a, b) = (PlayableId::track("a"), PlayableId::track("b"));
		let mut ctx = ListContext::new(vec![a.clone(), b.clone()]);

		assert_eq!(ctx.previous_playable(), None);
		assert_eq!(ctx.peek_next(), Some(a.clone()));
		assert_eq!(ctx.next_playable(), Some(a.clone()));
		assert_eq!(ctx.peek_next(), Some(b.clone()));
		assert_eq!(ctx.next_playable(), Some(b.clone()));
		assert_eq!(ctx.next_playable(), None);
		assert_eq!(ctx.index(), Some(1));
		assert_eq!(ctx.previous_playable(), Some(a.clone()));
		assert_eq!(ctx.previous_playable(), None);

		ctx.set_current(&b);
		assert_eq!(ctx.peek_next(), None);
		ctx.set_current(&PlayableId::track("unknown"));
		assert_eq!(ctx.index(), Some(1));
	}
}
