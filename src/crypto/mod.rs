//! Per-chunk content decryption.

mod decrypt;
pub use decrypt::{ChunkDecryptor,AudioKey};
