//! Decoding streams into PCM.
//!
//! The player only sees the [`Decoder`] trait, [`SymphoniaDecoder`]
//! is the shipped implementation for Ogg Vorbis and MP3.

mod decoder;
pub use decoder::{Decoder,CodecKind};

mod offset;
pub use offset::OffsetStream;

mod symphonia_decoder;
pub use symphonia_decoder::SymphoniaDecoder;
