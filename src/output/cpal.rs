//! Audio hardware output through `cpal`.
//!
//! Samples go through a bounded channel
//! that the `cpal` data callback drains.

//----------------------------------------------------------------------------------------------- use
use std::time::{Duration,Instant};
use crossbeam::channel::{Receiver,Sender};
use cpal::{
	traits::{DeviceTrait,HostTrait,StreamTrait},
	FromSample,Sample,SampleFormat,SizedSample,
};
use crate::{
	error::OutputError,
	macros::{debug2,error2,trace2},
	mixer::OutputFormat,
	output::AudioOutput,
};

//----------------------------------------------------------------------------------------------- Constants
/// Device sample formats we can convert 16-bit samples to, best first.
const SAMPLE_FORMATS: [SampleFormat; 3] = [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16];

//----------------------------------------------------------------------------------------------- Cpal
/// The default audio device.
pub struct Cpal {
	/// We send samples to this channel which
	/// the audio stream will receive and play.
	sender: Sender<i16>,
	/// The data callback's errors.
	error: Receiver<cpal::StreamError>,
	/// The actual audio stream.
	stream: cpal::Stream,
	format: OutputFormat,
	/// What the device is fed.
	sample_format: SampleFormat,
	/// Longest [`AudioOutput::drain`] wait.
	drain_timeout: Duration,
}

impl std::fmt::Debug for Cpal {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Cpal")
			.field("format", &self.format)
			.field("sample_format", &self.sample_format)
			.field("queued", &self.sender.len())
			.finish_non_exhaustive()
	}
}

impl Cpal {
	#[cold]
	#[inline(never)]
	/// Open the default output device for `format`.
	///
	/// The device config is picked among the ones it supports at this
	/// rate and channel count, preferring 16-bit samples over `f32` over `u16`.
	///
	/// `buffer_ms` of samples can queue before [`AudioOutput::write`] blocks.
	///
	/// # Errors
	/// No device, or it has no matching config.
	pub fn open(format: OutputFormat, buffer_ms: u32) -> Result<Self, OutputError> {
		debug2!("Cpal - open(), format: {format}, buffer_milliseconds: {buffer_ms}");

		let host = cpal::default_host();
		let Some(device) = host.default_output_device() else {
			return Err(OutputError::DeviceUnavailable);
		};

		let Some(range) = pick_config(device.supported_output_configs()?, format) else {
			return Err(OutputError::UnsupportedFormat { format, reason: "device has no config at this rate and channel count" });
		};
		let sample_format = range.sample_format();
		debug2!("Cpal - device config: {range:?}");

		let config = cpal::StreamConfig {
			channels: format.channels,
			sample_rate: cpal::SampleRate(format.sample_rate),
			buffer_size: cpal::BufferSize::Default,
		};

		let samples_per_ms = (format.sample_rate as usize * usize::from(format.channels)) / 1000;
		let channel_len = std::cmp::max(samples_per_ms * buffer_ms as usize, 1024);
		debug2!("Cpal - channel_len: {channel_len}, sample_format: {sample_format:?}");

		let (sender, receiver) = crossbeam::channel::bounded::<i16>(channel_len);
		let (error_send, error_recv) = crossbeam::channel::bounded(16);

		let stream = match sample_format {
			SampleFormat::I16 => Self::build::<i16>(&device, &config, receiver, error_send)?,
			SampleFormat::F32 => Self::build::<f32>(&device, &config, receiver, error_send)?,
			SampleFormat::U16 => Self::build::<u16>(&device, &config, receiver, error_send)?,
			_ => return Err(OutputError::UnsupportedFormat { format, reason: "device sample format" }),
		};
		stream.play()?;

		Ok(Self {
			sender,
			error: error_recv,
			stream,
			format,
			sample_format,
			drain_timeout: Duration::from_millis(u64::from(buffer_ms)) + Duration::from_secs(1),
		})
	}

	/// Build a stream playing `receiver`'s samples as `T`.
	fn build<T>(
		device: &cpal::Device,
		config: &cpal::StreamConfig,
		receiver: Receiver<i16>,
		errors: Sender<cpal::StreamError>,
	) -> Result<cpal::Stream, OutputError>
	where
		T: SizedSample + FromSample<i16>,
	{
		// The callback `cpal` calls when polling for audio data.
		let data_callback = move |output: &mut [T], _: &cpal::OutputCallbackInfo| {
			let mut written = 0;
			for o in output.iter_mut() {
				let Ok(sample) = receiver.try_recv() else {
					break;
				};
				*o = T::from_sample(sample);
				written += 1;
			}
			// Underrun, mute the rest.
			output[written..].fill(T::EQUILIBRIUM);
		};
		// The callback `cpal` calls when errors occur.
		let error_callback = move |error: cpal::StreamError| {
			drop(errors.try_send(error));
		};

		Ok(device.build_output_stream(config, data_callback, error_callback, None)?)
	}
}

/// The device config playing `format`, best sample format first.
fn pick_config(
	configs: impl Iterator<Item = cpal::SupportedStreamConfigRange>,
	format: OutputFormat,
) -> Option<cpal::SupportedStreamConfigRange> {
	let rate = cpal::SampleRate(format.sample_rate);
	configs
		.filter(|c| c.channels() == format.channels)
		.filter(|c| c.min_sample_rate() <= rate && rate <= c.max_sample_rate())
		.filter_map(|c| {
			let rank = SAMPLE_FORMATS.iter().position(|f| *f == c.sample_format())?;
			Some((rank, c))
		})
		.min_by_key(|(rank, _)| *rank)
		.map(|(_, c)| c)
}

//----------------------------------------------------------------------------------------------- `AudioOutput` Impl
impl AudioOutput for Cpal {
	fn write(&mut self, data: &[u8]) -> Result<(), OutputError> {
		if let Ok(error) = self.error.try_recv() {
			error2!("Cpal - error: {error}");
			return Err(error.into());
		}

		// This hangs until every sample was sent,
		// the stream will have a backlog of previous samples.
		trace2!("Cpal - sending {} samples", data.len() / 2);
		for s in data.chunks_exact(2) {
			if self.sender.send(i16::from_le_bytes([s[0], s[1]])).is_err() {
				return Err(OutputError::Closed);
			}
		}

		Ok(())
	}

	fn drain(&mut self) -> Result<(), OutputError> {
		let deadline = Instant::now() + self.drain_timeout;
		while !self.sender.is_empty() && Instant::now() < deadline {
			if let Ok(error) = self.error.try_recv() {
				return Err(error.into());
			}
			std::thread::sleep(Duration::from_millis(5));
		}
		Ok(())
	}

	fn format(&self) -> OutputFormat {
		self.format
	}

	fn name(&self) -> &'static str {
		"cpal"
	}

	fn play(&mut self) -> Result<(), OutputError> {
		debug2!("Cpal - play()");
		Ok(self.stream.play()?)
	}

	fn pause(&mut self) -> Result<(), OutputError> {
		debug2!("Cpal - pause()");
		Ok(self.stream.pause()?)
	}
}

//----------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;

	fn range(channels: u16, min: u32, max: u32, sample_format: SampleFormat) -> cpal::SupportedStreamConfigRange {
		cpal::SupportedStreamConfigRange::new(
			channels,
			cpal::SampleRate(min),
			cpal::SampleRate(max),
			cpal::SupportedBufferSize::Unknown,
			sample_format,
		)
	}

	#[test]
	// A device whose default is not `f32` still opens.
	fn picks_matching_config() {
		let configs = [
			range(2, 44100, 48000, SampleFormat::F32),
			range(2, 8000, 96000, SampleFormat::I16),
			range(1, 8000, 96000, SampleFormat::I16),
			range(2, 8000, 96000, SampleFormat::I32),
		];
		let stereo = OutputFormat::pcm16(44100, 2);
		let picked = pick_config(configs.clone().into_iter(), stereo).unwrap();
		assert_eq!(picked.sample_format(), SampleFormat::I16);
		assert_eq!(picked.channels(), 2);

		// Only `f32` covers this rate.
		let f32_only = [range(2, 44100, 48000, SampleFormat::F32), range(2, 8000, 22050, SampleFormat::I16)];
		let picked = pick_config(f32_only.into_iter(), OutputFormat::pcm16(48000, 2)).unwrap();
		assert_eq!(picked.sample_format(), SampleFormat::F32);

		// Unknown sample formats, wrong channels or rate: nothing.
		assert!(pick_config([range(2, 8000, 96000, SampleFormat::I32)].into_iter(), stereo).is_none());
		assert!(pick_config(configs.into_iter(), OutputFormat::pcm16(192_000, 2)).is_none());
		assert!(pick_config(std::iter::empty(), stereo).is_none());
	}
}
