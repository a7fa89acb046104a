//----------------------------------------------------------------------------------------------- use
use std::borrow::Cow;
use crate::mixer::OutputFormat;

//----------------------------------------------------------------------------------------------- OutputError
/// An [`crate::output::AudioOutput`] could not be opened or written to.
///
/// The sink reports these to the session and
/// reopens the output on the next block.
#[derive(thiserror::Error, Debug)]
pub enum OutputError {
	#[error("audio stream was closed")]
	/// The backend's stream went away (device unplugged, server killed).
	Closed,

	#[error("no audio device available")]
	/// There is no (default) output device.
	DeviceUnavailable,

	#[error("output format {format} is unusable: {reason}")]
	/// The output cannot be opened with this format.
	UnsupportedFormat {
		/// The format asked for.
		format: OutputFormat,
		/// What is wrong with it.
		reason: &'static str,
	},

	#[error("failed to write to the audio stream")]
	/// A block could not be written.
	Write,

	#[error("output io error: {0}")]
	/// Writing to a pipe or `stdout` failed.
	Io(#[from] std::io::Error),

	#[error("audio backend error: {0}")]
	/// Backend specific failure, the `str` has the details.
	Backend(Cow<'static, str>),
}

impl OutputError {
	/// Wrap whatever the backend reported.
	#[cfg_attr(not(feature = "cpal"), allow(dead_code))]
	pub(crate) fn backend(error: impl std::fmt::Display) -> Self {
		Self::Backend(Cow::Owned(error.to_string()))
	}
}

//----------------------------------------------------------------------------------------------- cpal
#[cfg(feature = "cpal")]
impl From<cpal::SupportedStreamConfigsError> for OutputError {
	fn from(error: cpal::SupportedStreamConfigsError) -> Self {
		match error {
			cpal::SupportedStreamConfigsError::DeviceNotAvailable => Self::DeviceUnavailable,
			e => Self::backend(e),
		}
	}
}

#[cfg(feature = "cpal")]
impl From<cpal::BuildStreamError> for OutputError {
	fn from(error: cpal::BuildStreamError) -> Self {
		match error {
			cpal::BuildStreamError::DeviceNotAvailable => Self::DeviceUnavailable,
			e => Self::backend(e),
		}
	}
}

#[cfg(feature = "cpal")]
impl From<cpal::StreamError> for OutputError {
	fn from(error: cpal::StreamError) -> Self {
		match error {
			cpal::StreamError::DeviceNotAvailable => Self::Closed,
			e => Self::backend(e),
		}
	}
}

#[cfg(feature = "cpal")]
impl From<cpal::PlayStreamError> for OutputError {
	fn from(error: cpal::PlayStreamError) -> Self {
		Self::backend(error)
	}
}

#[cfg(feature = "cpal")]
impl From<cpal::PauseStreamError> for OutputError {
	fn from(error: cpal::PauseStreamError) -> Self {
		Self::backend(error)
	}
}
