//! Raw PCM into any [`Write`]r: a file, a named pipe, `stdout`.

//----------------------------------------------------------------------------------------------- use
use std::{
	fs::OpenOptions,
	io::Write,
	path::Path,
};
use crate::{
	error::OutputError,
	macros::{debug2,error2},
	mixer::OutputFormat,
	output::AudioOutput,
};

//----------------------------------------------------------------------------------------------- WriterOutput
/// Writes the PCM bytes as-is, no header.
pub struct WriterOutput {
	writer: Box<dyn Write>,
	format: OutputFormat,
	name: &'static str,
}

impl std::fmt::Debug for WriterOutput {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WriterOutput")
			.field("format", &self.format)
			.field("name", &self.name)
			.finish_non_exhaustive()
	}
}

impl WriterOutput {
	#[cold]
	#[inline(never)]
	/// Append to the file (or named pipe) at `path`, creating it if needed.
	///
	/// # Errors
	/// `path` could not be opened for writing.
	pub fn pipe(path: &Path, format: OutputFormat) -> Result<Self, OutputError> {
		debug2!("WriterOutput - opening pipe: {}", path.display());
		let file = OpenOptions::new().append(true).create(true).open(path)?;
		Ok(Self::new(Box::new(file), format, "pipe"))
	}

	#[cold]
	#[inline(never)]
	/// Write to `stdout`.
	pub fn stdout(format: OutputFormat) -> Self {
		Self::new(Box::new(std::io::stdout()), format, "stdout")
	}

	/// Write into any `writer`.
	pub fn new(writer: Box<dyn Write>, format: OutputFormat, name: &'static str) -> Self {
		Self { writer, format, name }
	}
}

impl AudioOutput for WriterOutput {
	fn write(&mut self, data: &[u8]) -> Result<(), OutputError> {
		self.writer.write_all(data).map_err(|e| {
			error2!("WriterOutput - {} write failed: {e}", self.name);
			e.into()
		})
	}

	fn drain(&mut self) -> Result<(), OutputError> {
		Ok(self.writer.flush()?)
	}

	fn format(&self) -> OutputFormat {
		self.format
	}

	fn name(&self) -> &'static str {
		self.name
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use crate::output::{open,OutputKind};
	use pretty_assertions::assert_eq;

	#[test]
	fn pipe_appends() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("pcm");
		std::fs::write(&path, [9, 9]).unwrap();

		let mut out = open(&OutputKind::Pipe(path.clone()), OutputFormat::DEFAULT, 100).unwrap();
		assert_eq!(out.name(), "pipe");
		out.write(&[1, 2, 3, 4]).unwrap();
		out.write(&[5, 6, 7, 8]).unwrap();
		out.drain().unwrap();
		drop(out);

		assert_eq!(std::fs::read(&path).unwrap(), [9, 9, 1, 2, 3, 4, 5, 6, 7, 8]);
	}

	#[test]
	fn pipe_missing_directory() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("nope").join("pcm");
		let err = WriterOutput::pipe(&path, OutputFormat::DEFAULT).unwrap_err();
		assert!(matches!(err, OutputError::Io(_)));
	}

	#[test]
	fn broken_writer() {
		struct Broken;
		impl Write for Broken {
			fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
				Err(std::io::ErrorKind::BrokenPipe.into())
			}
			fn flush(&mut self) -> std::io::Result<()> {
				Ok(())
			}
		}

		let mut out = WriterOutput::new(Box::new(Broken), OutputFormat::DEFAULT, "broken");
		assert!(matches!(out.write(&[0; 4]), Err(OutputError::Io(_))));
	}
}
