//! The arena-backed playback queue.
//!
//! At most three entries are linked at a time:
//! `prev` (fading out) <- `head` (current) -> `next` (preloaded).
//! Nodes live in a `Vec` and link by index, freed slots are reused.

//---------------------------------------------------------------------------------------------------- Use
use crate::{
	feeder::PlayableId,
	macros::trace2,
};

//---------------------------------------------------------------------------------------------------- Queued
/// What the queue needs from an entry.
pub(crate) trait Queued {
	/// Stop the entry, releasing everything it holds. Idempotent.
	fn close(&self);
	/// Does the entry hold a mixer port?
	fn has_output(&self) -> bool;
	/// Unique id of this entry.
	fn playback_id(&self) -> u64;
	/// What the entry plays.
	fn playable(&self) -> &PlayableId;
}

//---------------------------------------------------------------------------------------------------- PlaybackQueue
/// Index of a node.
pub(crate) type NodeId = usize;

#[derive(Debug)]
struct Node<E> {
	entry: E,
	prev: Option<NodeId>,
	next: Option<NodeId>,
}

#[derive(Debug)]
pub(crate) struct PlaybackQueue<E: Queued> {
	nodes: Vec<Option<Node<E>>>,
	free: Vec<NodeId>,
	head: Option<NodeId>,
}

impl<E: Queued> Default for PlaybackQueue<E> {
	fn default() -> Self {
		Self {
			nodes: Vec::new(),
			free: Vec::new(),
			head: None,
		}
	}
}

impl<E: Queued> PlaybackQueue<E> {
	fn node(&self, id: NodeId) -> Option<&Node<E>> {
		self.nodes.get(id).and_then(Option::as_ref)
	}

	fn node_mut(&mut self, id: NodeId) -> Option<&mut Node<E>> {
		self.nodes.get_mut(id).and_then(Option::as_mut)
	}

	fn alloc(&mut self, node: Node<E>) -> NodeId {
		if let Some(id) = self.free.pop() {
			self.nodes[id] = Some(node);
			id
		} else {
			self.nodes.push(Some(node));
			self.nodes.len() - 1
		}
	}

	/// The last node reachable from `head`.
	fn tail(&self) -> Option<NodeId> {
		let mut id = self.head?;
		while let Some(next) = self.node(id).and_then(|n| n.next) {
			id = next;
		}
		Some(id)
	}

	/// Append `entry` after the tail, it becomes the head of an empty queue.
	pub(crate) fn add(&mut self, entry: E) -> NodeId {
		let tail = self.tail();
		let id = self.alloc(Node { entry, prev: tail, next: None });
		match tail {
			Some(tail) => {
				if let Some(node) = self.node_mut(tail) {
					node.next = Some(id);
				}
			},
			None => self.head = Some(id),
		}
		trace2!("PlaybackQueue - add: {id}");
		id
	}

	/// Move the head to `head.next`.
	///
	/// The old head stays linked as `prev` only if it still holds an
	/// output, otherwise it is closed and removed. An older `prev` is
	/// always closed and removed.
	///
	/// Returns `false` (and changes nothing) if there is no `next`.
	pub(crate) fn advance(&mut self) -> bool {
		let Some(old) = self.head else {
			return false;
		};
		let Some(new) = self.node(old).and_then(|n| n.next) else {
			return false;
		};

		if let Some(older) = self.node(old).and_then(|n| n.prev) {
			self.remove(older);
		}

		self.head = Some(new);
		let keep = self.node(old).is_some_and(|n| n.entry.has_output());
		if !keep {
			self.remove(old);
		}
		trace2!("PlaybackQueue - advance: {old} -> {new}, kept: {keep}");
		true
	}

	/// Replace the entry of node `old` with `new` in place.
	///
	/// The replaced entry is always closed. Returns `false` if `old`
	/// does not exist, `new` is then closed as well.
	pub(crate) fn swap(&mut self, old: NodeId, new: E) -> bool {
		match self.node_mut(old) {
			Some(node) => {
				let replaced = std::mem::replace(&mut node.entry, new);
				replaced.close();
				true
			},
			None => {
				new.close();
				false
			},
		}
	}

	/// Close and unlink node `id`.
	///
	/// A node following the head keeps no link back to a removed head.
	pub(crate) fn remove(&mut self, id: NodeId) -> Option<E> {
		let node = self.nodes.get_mut(id)?.take()?;
		node.entry.close();
		self.free.push(id);

		if let Some(prev) = node.prev {
			if let Some(p) = self.node_mut(prev) {
				p.next = node.next;
			}
		}
		if let Some(next) = node.next {
			if let Some(n) = self.node_mut(next) {
				n.prev = node.prev;
			}
		}
		if self.head == Some(id) {
			self.head = node.next;
			if let Some(head) = self.head {
				if let Some(n) = self.node_mut(head) {
					n.prev = None;
				}
			}
		}

		trace2!("PlaybackQueue - remove: {id}");
		Some(node.entry)
	}

	/// Close and remove everything.
	pub(crate) fn clear(&mut self) {
		for node in self.nodes.iter_mut().filter_map(Option::take) {
			node.entry.close();
		}
		self.nodes.clear();
		self.free.clear();
		self.head = None;
	}

	/// The current entry.
	pub(crate) fn head(&self) -> Option<(NodeId, &E)> {
		let id = self.head?;
		self.node(id).map(|n| (id, &n.entry))
	}

	/// The entry after the head.
	pub(crate) fn next(&self) -> Option<(NodeId, &E)> {
		let id = self.node(self.head?)?.next?;
		self.node(id).map(|n| (id, &n.entry))
	}

	/// The entry before the head.
	pub(crate) fn prev(&self) -> Option<(NodeId, &E)> {
		let id = self.node(self.head?)?.prev?;
		self.node(id).map(|n| (id, &n.entry))
	}

	/// Entry of node `id`.
	pub(crate) fn get(&self, id: NodeId) -> Option<&E> {
		self.node(id).map(|n| &n.entry)
	}

	/// The node holding the entry with `playback_id`.
	pub(crate) fn find(&self, playback_id: u64) -> Option<NodeId> {
		self.nodes
			.iter()
			.position(|n| n.as_ref().is_some_and(|n| n.entry.playback_id() == playback_id))
	}

	/// Linked entries from `prev` to the tail.
	pub(crate) fn len(&self) -> usize {
		self.nodes.iter().flatten().count()
	}
}
