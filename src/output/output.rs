//! Audio hardware/server/pipe output.
//!
//! The trait [`AudioOutput`] is the abstract simplification
//! of "take ready-to-go 16-bit PCM and make it audible".

//----------------------------------------------------------------------------------------------- use
use std::path::PathBuf;
use strum::{AsRefStr,IntoStaticStr};
use crate::{
	error::OutputError,
	macros::debug2,
	mixer::{OutputFormat,Volume},
};

#[allow(unused_imports)] // docs
use crate::mixer::AudioSink;

//----------------------------------------------------------------------------------------------- OutputKind
/// Where the mixed audio goes.
#[derive(Clone,Debug,Default,PartialEq,Eq,Hash)]
#[derive(AsRefStr,IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OutputKind {
	#[default]
	/// The default audio device (`cpal`).
	Device,
	/// Raw PCM appended to a file or named pipe.
	Pipe(PathBuf),
	/// Raw PCM written to `stdout`.
	Stdout,
	/// Nowhere, paced in real-time.
	Dummy,
}

//----------------------------------------------------------------------------------------------- AudioOutput Trait
/// An opened output.
///
/// Implementors are created (and used) on the
/// [`AudioSink`] thread only, they need not be [`Send`].
pub trait AudioOutput {
	/// Fully write interleaved 16-bit little-endian PCM
	/// in [`Self::format`], blocking while the backend is full.
	///
	/// # Errors
	/// The backend failed, the [`AudioSink`] pauses itself.
	fn write(&mut self, data: &[u8]) -> Result<(), OutputError>;

	/// Block until everything written so far was played (or flushed).
	///
	/// # Errors
	/// The backend failed.
	fn drain(&mut self) -> Result<(), OutputError> {
		Ok(())
	}

	/// The format this output was opened with.
	fn format(&self) -> OutputFormat;

	/// Backend name, for logs.
	fn name(&self) -> &'static str;

	/// Resume a paused output.
	///
	/// # Errors
	/// The backend failed.
	fn play(&mut self) -> Result<(), OutputError> {
		Ok(())
	}

	/// Pause, keeping what is buffered.
	///
	/// # Errors
	/// The backend failed.
	fn pause(&mut self) -> Result<(), OutputError> {
		Ok(())
	}

	/// Set the volume in hardware.
	///
	/// Returns `false` if the backend has no volume control,
	/// the caller then scales the samples itself.
	fn set_volume(&mut self, _volume: Volume) -> bool {
		false
	}
}

//----------------------------------------------------------------------------------------------- Open
#[cold]
#[inline(never)]
/// Open an output of `kind` for `format`.
///
/// With the `dummy` feature enabled every kind opens [`OutputKind::Dummy`].
///
/// # Errors
/// The device/pipe could not be opened, or `format` is unusable.
pub fn open(kind: &OutputKind, format: OutputFormat, buffer_ms: u32) -> Result<Box<dyn AudioOutput>, OutputError> {
	let reason = match format {
		OutputFormat { sample_rate: 0, .. } => Some("zero sample rate"),
		OutputFormat { channels: 0, .. } => Some("zero channels"),
		OutputFormat { sample_bits: 16, .. } => None,
		_ => Some("only 16-bit samples are written"),
	};
	if let Some(reason) = reason {
		return Err(OutputError::UnsupportedFormat { format, reason });
	}

	let kind = if cfg!(feature = "dummy") { &OutputKind::Dummy } else { kind };
	debug2!("AudioOutput - opening {} with {format}, buffer: {buffer_ms}ms", kind.as_ref());

	match kind {
		OutputKind::Device => open_device(format, buffer_ms),
		OutputKind::Pipe(path) => Ok(Box::new(crate::output::WriterOutput::pipe(path, format)?)),
		OutputKind::Stdout => Ok(Box::new(crate::output::WriterOutput::stdout(format))),
		OutputKind::Dummy => Ok(Box::new(crate::output::DummyOutput::new(format, buffer_ms))),
	}
}

cfg_if::cfg_if! {
	if #[cfg(feature = "cpal")] {
		fn open_device(format: OutputFormat, buffer_ms: u32) -> Result<Box<dyn AudioOutput>, OutputError> {
			Ok(Box::new(crate::output::Cpal::open(format, buffer_ms)?))
		}
	} else {
		fn open_device(_: OutputFormat, _: u32) -> Result<Box<dyn AudioOutput>, OutputError> {
			Err(OutputError::DeviceUnavailable)
		}
	}
}
