//! Audio output backends.

mod output;
pub use output::{AudioOutput,OutputKind,open};

mod writer;
pub use writer::WriterOutput;

mod dummy;
pub use dummy::DummyOutput;

#[cfg(feature = "cpal")]
mod cpal;
#[cfg(feature = "cpal")]
pub use self::cpal::Cpal;
