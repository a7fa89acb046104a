//! Output volume.

//---------------------------------------------------------------------------------------------------- use
#[allow(unused_imports)] // docs
use crate::player::Player;

//---------------------------------------------------------------------------------------------------- Volume
/// Linear output volume within `0.0..=1.0`.
///
/// Applied by the output itself when it has a hardware mixer,
/// else as the mixing line's global gain.
///
/// This is what [`Player::set_volume`] takes.
///
/// ```rust
/// # use tandem::mixer::*;
/// assert_eq!(Volume::new(0.25).inner(), 0.25);
/// assert_eq!(Volume::new(1.5), Volume::MAX);
/// assert_eq!(Volume::new(-0.5), Volume::MIN);
/// assert_eq!(Volume::new(f32::NAN), Volume::MIN);
/// assert_eq!(Volume::new(f32::INFINITY), Volume::MAX);
/// ```
#[derive(Copy,Clone,Debug,PartialEq,PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "f32", into = "f32"))]
pub struct Volume(f32);

impl Volume {
	/// Silence.
	pub const MIN: Self = Self(0.0);
	/// Samples as mixed.
	pub const MAX: Self = Self(1.0);
	/// [`Self::MAX`].
	pub const DEFAULT: Self = Self::MAX;

	#[must_use]
	/// Clamp `volume` into range, `NaN` is silence.
	pub fn new(volume: f32) -> Self {
		if volume.is_nan() {
			return Self::MIN;
		}
		Self(volume.clamp(0.0, 1.0))
	}

	#[inline]
	#[must_use]
	/// The linear factor.
	pub const fn inner(&self) -> f32 {
		self.0
	}

	#[must_use]
	/// The volume on the `0..=65536` scale of hardware mixers.
	///
	/// ```rust
	/// # use tandem::mixer::*;
	/// assert_eq!(Volume::MIN.to_hardware(), 0);
	/// assert_eq!(Volume::new(0.5).to_hardware(), 32768);
	/// assert_eq!(Volume::MAX.to_hardware(), 65536);
	/// ```
	pub fn to_hardware(&self) -> u32 {
		#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
		let v = (self.0 * 65536.0).round() as u32;
		v
	}
}

impl Default for Volume {
	fn default() -> Self {
		Self::DEFAULT
	}
}

impl From<f32> for Volume {
	fn from(volume: f32) -> Self {
		Self::new(volume)
	}
}

impl From<Volume> for f32 {
	fn from(volume: Volume) -> Self {
		volume.0
	}
}

impl std::fmt::Display for Volume {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{:.0}%", self.0 * 100.0)
	}
}
