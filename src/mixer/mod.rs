//! Mixing: gained ring buffers, the two-port line and the sink thread.

mod volume;
pub use volume::Volume;

mod circular;
pub use circular::GainCircularBuffer;
pub(crate) use circular::apply_gain;

mod format;
pub use format::OutputFormat;

mod line;
pub use line::{MixingLine,MixingOutput,Port};

mod sink;
pub use sink::{AudioSink,OutputOpener};
