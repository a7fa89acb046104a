//! Chunked streaming playback engine.
//!
//! This is the API reference for `tandem`, meant to
//! document inputs/outputs and other note-worthy things.
//!
//! The data path, leaves first:
//!
//! - [`mixer::GainCircularBuffer`] - blocking byte ring buffer with gain-scaled reads
//! - [`crypto::ChunkDecryptor`] - per-chunk AES-128-CTR decryption
//! - [`stream::ChunkedStream`] - blocking, seekable stream over chunks that arrive out of order
//! - [`transport`] - the storage channel multiplexer and the CDN range fetcher
//! - [`feeder::ContentFeeder`] - playable id -> decrypted stream + normalization data
//! - [`mixer::MixingLine`] & [`mixer::AudioSink`] - two gained ports mixed into one output
//! - [`player`] - queue entries, the playback queue and the session driving transitions

//---------------------------------------------------------------------------------------------------- Lints
#![allow(
	clippy::len_zero,
	clippy::type_complexity,
	clippy::module_inception,
)]

#![deny(
	nonstandard_style,
)]

#![warn(
	missing_docs,
	deprecated,
)]

#![forbid(
	unused_unsafe,
	future_incompatible,
	break_with_label_and_loop,
	coherence_leak_check,
	duplicate_macro_attributes,
	for_loops_over_fallibles,
	overlapping_range_endpoints,
	semicolon_in_expressions_from_macros,
	redundant_semicolons,
	unconditional_recursion,
	unreachable_patterns,
	unused_allocation,
	unused_comparisons,
	while_true,
	keyword_idents,
	non_ascii_idents,
	noop_method_call,
)]

//---------------------------------------------------------------------------------------------------- Public API
pub mod config;
pub mod error;
pub mod crypto;
pub mod stream;
pub mod transport;
pub mod feeder;
pub mod codec;
pub mod mixer;
pub mod output;
pub mod player;

pub use config::{PlayerConfig,CHUNK_SIZE};
pub use error::TandemError;
pub use player::Player;

//---------------------------------------------------------------------------------------------------- Private Usage
mod atomic;
mod free;
mod macros;

#[cfg(test)]
mod tests;
