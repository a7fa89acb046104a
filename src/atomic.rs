// Atomic helpers shared between the real-time
// threads and the threads that steer them.
//
// [AtomicF32] internally uses an [AtomicU32] holding the
// bit pattern of the float, converted with [to_bits()]
// and [from_bits()].
//
// [AtomicMillis] is an [Option<u32>] of milliseconds packed
// into an [AtomicU64], [u64::MAX] being [None].

//---------------------------------------------------------------------------------------------------- Use
use std::sync::atomic::{AtomicU32,AtomicU64,Ordering};

//---------------------------------------------------------------------------------------------------- AtomicF32
pub(crate) struct AtomicF32(AtomicU32);

impl AtomicF32 {
	/// Bit pattern for `1.0`.
	const BITS_1: u32 = 1065353216;

	/// `1.0`, the "unity gain" default.
	#[allow(clippy::declare_interior_mutable_const)]
	pub(crate) const ONE: Self = Self(AtomicU32::new(Self::BITS_1));

	#[inline]
	pub(crate) fn new(f: f32) -> Self {
		Self(AtomicU32::new(f.to_bits()))
	}

	#[inline]
	pub(crate) fn set(&self, f: f32) {
		self.0.store(f.to_bits(), Ordering::Release);
	}

	#[inline]
	pub(crate) fn get(&self) -> f32 {
		f32::from_bits(self.0.load(Ordering::Acquire))
	}
}

impl std::fmt::Debug for AtomicF32 {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_tuple("AtomicF32")
			.field(&self.get())
			.finish()
	}
}

//---------------------------------------------------------------------------------------------------- AtomicMillis
#[derive(Debug)]
pub(crate) struct AtomicMillis(AtomicU64);

impl AtomicMillis {
	const NONE: u64 = u64::MAX;

	pub(crate) const fn none() -> Self {
		Self(AtomicU64::new(Self::NONE))
	}

	#[inline]
	pub(crate) fn set(&self, millis: Option<u32>) {
		let bits = millis.map_or(Self::NONE, u64::from);
		self.0.store(bits, Ordering::Release);
	}

	#[inline]
	pub(crate) fn get(&self) -> Option<u32> {
		match self.0.load(Ordering::Acquire) {
			Self::NONE => None,
			// The stored value always came from a `u32`.
			#[allow(clippy::cast_possible_truncation)]
			bits => Some(bits as u32),
		}
	}
}
