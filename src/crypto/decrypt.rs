//! AES-128-CTR chunk decryption.
//!
//! Every chunk starts its own keystream at a counter derived
//! from its index, so chunks decrypt independently of each
//! other and can arrive in any order.

//---------------------------------------------------------------------------------------------------- Use
use aes::cipher::{KeyIvInit,StreamCipher};
use crate::config::CHUNK_SIZE;

//---------------------------------------------------------------------------------------------------- Constants
/// The initial counter block of every content.
const AUDIO_AES_IV: u128 = 0x72e0_67fb_ddcb_cf77_ebe8_bc64_3f63_0d93;

/// How many 16-byte counter blocks one chunk spans.
const BLOCKS_PER_CHUNK: u128 = (CHUNK_SIZE / 16) as u128;

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

//---------------------------------------------------------------------------------------------------- AudioKey
/// The 128-bit symmetric key of one content.
#[derive(Copy,Clone,PartialEq,Eq)]
pub struct AudioKey(pub [u8; 16]);

impl std::fmt::Debug for AudioKey {
	// Keys never end up in logs.
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("AudioKey(..)")
	}
}

//---------------------------------------------------------------------------------------------------- ChunkDecryptor
/// Decrypts chunks of one content.
#[derive(Copy,Clone,Debug,PartialEq,Eq)]
pub enum ChunkDecryptor {
	/// AES-128 in counter mode.
	Aes(AudioKey),
	/// The content is plaintext, chunks pass through untouched.
	None,
}

impl ChunkDecryptor {
	/// The counter block chunk `index` starts at.
	const fn counter(index: u32) -> u128 {
		AUDIO_AES_IV.wrapping_add(index as u128 * BLOCKS_PER_CHUNK)
	}

	/// Decrypt chunk `index` in place.
	///
	/// The cipher is symmetric, calling this on plaintext encrypts it.
	pub fn decrypt_chunk(&self, index: u32, chunk: &mut [u8]) {
		match self {
			Self::None => (),
			Self::Aes(key) => {
				let iv = Self::counter(index).to_be_bytes();
				let mut cipher = Aes128Ctr::new(&key.0.into(), &iv.into());
				cipher.apply_keystream(chunk);
			},
		}
	}

	/// Does this decryptor actually do anything?
	pub const fn is_encrypted(&self) -> bool {
		matches!(self, Self::Aes(_))
	}
}
