//! Fade intervals and the policy choosing them.

//---------------------------------------------------------------------------------------------------- Use
use crate::player::Reason;

//---------------------------------------------------------------------------------------------------- FadeInterval
/// Direction of a [`FadeInterval`].
#[derive(Copy,Clone,Debug,PartialEq,Eq,Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FadeKind {
	/// `0.0 -> 1.0`
	In,
	/// `1.0 -> 0.0`
	Out,
}

/// A linear gain ramp over a span of a playable's timeline.
#[derive(Copy,Clone,Debug,PartialEq,Eq,Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FadeInterval {
	/// Playable time the ramp starts at.
	pub start_ms: u32,
	/// Length of the ramp.
	pub duration_ms: u32,
	/// Direction.
	pub kind: FadeKind,
}

impl FadeInterval {
	#[must_use]
	/// Playable time the ramp ends at.
	pub const fn end_ms(&self) -> u32 {
		self.start_ms.saturating_add(self.duration_ms)
	}

	#[must_use]
	/// Gain at playable time `time_ms`.
	///
	/// Before the ramp a fade-in is silent and a fade-out is at
	/// full gain, after the ramp it is the other way around.
	///
	/// ```rust
	/// # use tandem::player::*;
	/// let fade = FadeInterval { start_ms: 1000, duration_ms: 1000, kind: FadeKind::Out };
	/// assert_eq!(fade.gain(0), 1.0);
	/// assert_eq!(fade.gain(1500), 0.5);
	/// assert_eq!(fade.gain(3000), 0.0);
	/// ```
	pub fn gain(&self, time_ms: u32) -> f32 {
		let progress = if time_ms <= self.start_ms {
			0.0
		} else if time_ms >= self.end_ms() {
			1.0
		} else {
			#[allow(clippy::cast_precision_loss)]
			let p = (time_ms - self.start_ms) as f32 / self.duration_ms as f32;
			p
		};

		match self.kind {
			FadeKind::In => progress,
			FadeKind::Out => 1.0 - progress,
		}
	}
}

//---------------------------------------------------------------------------------------------------- CrossfadePolicy
/// Chooses fades for transitions.
pub trait CrossfadePolicy: Send + Sync {
	/// The fade-in of a playable of `duration_ms` becoming current for `reason`.
	///
	/// `None` starts at full gain.
	fn fade_in(&self, reason: Reason, duration_ms: u32) -> Option<FadeInterval>;

	/// The fade-out of the previous playable of `duration_ms`,
	/// being at `now_ms` when the transition happens for `reason`.
	///
	/// For [`Reason::TrackDone`] this is the natural fade-out
	/// at the end of the playable, whatever `now_ms` is.
	/// `None` stops it at once (or lets it end on its own for `TrackDone`).
	fn fade_out(&self, reason: Reason, now_ms: u32, duration_ms: u32) -> Option<FadeInterval>;

	/// Where the natural fade-out of a playable of `duration_ms` starts.
	fn natural_fade_start(&self, duration_ms: u32) -> Option<u32> {
		self.fade_out(Reason::TrackDone, 0, duration_ms).map(|f| f.start_ms)
	}
}

//---------------------------------------------------------------------------------------------------- LinearCrossfade
/// Linear fades of a fixed length.
///
/// - natural transitions overlap the last `duration_ms` of the previous playable
/// - manual skips fade out from "now", fading the new playable in
/// - errors and [`Reason::EndPlay`] cut hard
///
/// A fade is never longer than half the playable.
/// A `duration_ms` of `0` disables every fade.
#[derive(Copy,Clone,Debug,PartialEq,Eq,Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LinearCrossfade {
	/// Length of a full fade.
	pub duration_ms: u32,
}

impl LinearCrossfade {
	const fn length(&self, duration_ms: u32) -> u32 {
		let half = duration_ms / 2;
		if self.duration_ms < half { self.duration_ms } else { half }
	}
}

impl CrossfadePolicy for LinearCrossfade {
	fn fade_in(&self, reason: Reason, duration_ms: u32) -> Option<FadeInterval> {
		let length = self.length(duration_ms);
		if length == 0 || !(reason == Reason::TrackDone || reason.is_manual()) {
			return None;
		}
		Some(FadeInterval { start_ms: 0, duration_ms: length, kind: FadeKind::In })
	}

	fn fade_out(&self, reason: Reason, now_ms: u32, duration_ms: u32) -> Option<FadeInterval> {
		let length = self.length(duration_ms);
		if length == 0 {
			return None;
		}

		if reason == Reason::TrackDone {
			return Some(FadeInterval { start_ms: duration_ms - length, duration_ms: length, kind: FadeKind::Out });
		}

		if reason.is_manual() {
			let left = duration_ms.saturating_sub(now_ms);
			return (left > 0).then_some(FadeInterval {
				start_ms: now_ms,
				duration_ms: std::cmp::min(length, left),
				kind: FadeKind::Out,
			});
		}

		None
	}
}
