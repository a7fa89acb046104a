//! Gain-aware circular buffer.
//!
//! A fixed capacity byte ring shared between one writer
//! (a decoder thread) and one reader (the audio sink thread).
//!
//! Every wait is bounded by [`WAIT_SLICE`] and re-checks
//! `closed`, so [`GainCircularBuffer::close`] always
//! unblocks both sides.

//---------------------------------------------------------------------------------------------------- Use
use std::{
	io,
	sync::{Condvar,Mutex,MutexGuard},
	time::{Duration,Instant},
};
use crate::config::WAIT_SLICE;

//---------------------------------------------------------------------------------------------------- Ring
#[derive(Debug)]
struct Ring {
	buf: Box<[u8]>,
	/// Index of the oldest byte.
	head: usize,
	/// Bytes currently stored.
	len: usize,
	closed: bool,
}

impl Ring {
	fn free(&self) -> usize {
		self.buf.len() - self.len
	}

	fn push(&mut self, data: &[u8]) -> usize {
		let cap = self.buf.len();
		let n = std::cmp::min(self.free(), data.len());
		let tail = (self.head + self.len) % cap;

		let first = std::cmp::min(n, cap - tail);
		self.buf[tail..tail + first].copy_from_slice(&data[..first]);
		self.buf[..n - first].copy_from_slice(&data[first..n]);

		self.len += n;
		n
	}

	fn pop(&mut self, dst: &mut [u8]) -> usize {
		let cap = self.buf.len();
		let n = std::cmp::min(self.len, dst.len());

		let first = std::cmp::min(n, cap - self.head);
		dst[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
		dst[first..n].copy_from_slice(&self.buf[..n - first]);

		self.head = (self.head + n) % cap;
		self.len -= n;
		n
	}
}

//---------------------------------------------------------------------------------------------------- Samples
#[inline]
fn sample(bytes: &[u8]) -> f32 {
	f32::from(i16::from_le_bytes([bytes[0], bytes[1]]))
}

#[inline]
#[allow(clippy::cast_possible_truncation)]
fn clamp(s: f32) -> [u8; 2] {
	// Clamped to the `i16` range first, the cast cannot wrap.
	(s.clamp(-32768.0, 32767.0) as i16).to_le_bytes()
}

/// Scale every 16-bit little-endian sample in `buf` by `gain`.
pub(crate) fn apply_gain(buf: &mut [u8], gain: f32) {
	if gain == 1.0 {
		return;
	}
	for s in buf.chunks_exact_mut(2) {
		let v = clamp(sample(s) * gain);
		s.copy_from_slice(&v);
	}
}

//---------------------------------------------------------------------------------------------------- GainCircularBuffer
/// A blocking byte ring buffer with gain-scaled reads.
///
/// The capacity should be a multiple of the frame size
/// of the audio written into it.
#[derive(Debug)]
pub struct GainCircularBuffer {
	ring: Mutex<Ring>,
	/// Signaled when data was written.
	data: Condvar,
	/// Signaled when space was freed.
	space: Condvar,
}

impl GainCircularBuffer {
	#[cold]
	#[inline(never)]
	/// Create a buffer holding up to `capacity` bytes.
	///
	/// A `capacity` of `0` is bumped to `2` (one sample).
	pub fn new(capacity: usize) -> Self {
		let capacity = std::cmp::max(capacity, 2);
		Self {
			ring: Mutex::new(Ring {
				buf: vec![0; capacity].into_boxed_slice(),
				head: 0,
				len: 0,
				closed: false,
			}),
			data: Condvar::new(),
			space: Condvar::new(),
		}
	}

	fn lock(&self) -> MutexGuard<'_, Ring> {
		// A panicking writer leaves the ring consistent
		// (bytes are only counted after being copied).
		self.ring.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// Total capacity in bytes.
	pub fn capacity(&self) -> usize {
		self.lock().buf.len()
	}

	/// Bytes available to read.
	pub fn available(&self) -> usize {
		self.lock().len
	}

	/// Bytes that can be written without blocking.
	pub fn free(&self) -> usize {
		self.lock().free()
	}

	/// Has [`Self::close`] been called?
	pub fn is_closed(&self) -> bool {
		self.lock().closed
	}

	/// Write all of `data`, blocking while the buffer is full.
	///
	/// `data` larger than the capacity is written in pieces as the
	/// reader frees space.
	///
	/// # Errors
	/// [`io::ErrorKind::BrokenPipe`] if the buffer is (or gets) closed,
	/// some of `data` may have been written.
	pub fn write(&self, mut data: &[u8]) -> io::Result<()> {
		let mut ring = self.lock();
		loop {
			if ring.closed {
				return Err(io::Error::from(io::ErrorKind::BrokenPipe));
			}
			if data.is_empty() {
				return Ok(());
			}

			let n = ring.push(data);
			if n > 0 {
				data = &data[n..];
				self.data.notify_all();
				continue;
			}

			ring = self.space
				.wait_timeout(ring, WAIT_SLICE)
				.unwrap_or_else(std::sync::PoisonError::into_inner)
				.0;
		}
	}

	/// Wait until at least `min` bytes are available,
	/// the buffer is closed, or `timeout` passed.
	///
	/// Returns the bytes available.
	pub fn wait_data(&self, min: usize, timeout: Duration) -> usize {
		let deadline = Instant::now() + timeout;
		let mut ring = self.lock();
		loop {
			if ring.len >= min || ring.closed {
				return ring.len;
			}
			let now = Instant::now();
			if now >= deadline {
				return ring.len;
			}
			let wait = std::cmp::min(deadline - now, WAIT_SLICE);
			ring = self.data
				.wait_timeout(ring, wait)
				.unwrap_or_else(std::sync::PoisonError::into_inner)
				.0;
		}
	}

	/// Read up to `dst.len()` bytes.
	///
	/// Blocks until at least one byte is available.
	/// Returns `0` only once the buffer is closed (or `dst` is empty).
	pub fn read(&self, dst: &mut [u8]) -> usize {
		if dst.is_empty() {
			return 0;
		}

		let mut ring = self.lock();
		loop {
			if ring.closed {
				return 0;
			}
			if ring.len > 0 {
				let n = ring.pop(dst);
				self.space.notify_all();
				return n;
			}
			ring = self.data
				.wait_timeout(ring, WAIT_SLICE)
				.unwrap_or_else(std::sync::PoisonError::into_inner)
				.0;
		}
	}

	/// Read up to `dst.len()` bytes without blocking.
	pub fn try_read(&self, dst: &mut [u8]) -> usize {
		let mut ring = self.lock();
		if ring.closed {
			return 0;
		}
		let n = ring.pop(dst);
		if n > 0 {
			self.space.notify_all();
		}
		n
	}

	/// [`Self::read`], then scale the 16-bit little-endian
	/// samples read by `gain`, clamping to the `i16` range.
	pub fn read_gain(&self, dst: &mut [u8], gain: f32) -> usize {
		let n = self.read(dst);
		apply_gain(&mut dst[..n], gain);
		n
	}

	/// Read exactly `dst.len()` bytes and merge them into `dst`:
	///
	/// `dst = clamp(global * (dst_gain * dst + gain * read))`
	///
	/// `dst` already holds the other port's samples.
	///
	/// Returns the bytes merged, this is less than `dst.len()` only
	/// if the buffer got closed, or held less than requested.
	/// The remaining bytes of `dst` are left untouched.
	pub fn read_merge_gain(&self, dst: &mut [u8], dst_gain: f32, gain: f32, global: f32) -> usize {
		let mut ring = self.lock();
		if ring.closed {
			return 0;
		}

		let n = std::cmp::min(ring.len, dst.len()) & !1;
		let mut tmp = [0_u8; 2];
		for s in dst[..n].chunks_exact_mut(2) {
			ring.pop(&mut tmp);
			let mixed = global * (dst_gain * sample(s) + gain * sample(&tmp));
			s.copy_from_slice(&clamp(mixed));
		}

		if n > 0 {
			self.space.notify_all();
		}
		n
	}

	/// Discard everything buffered.
	pub fn clear(&self) {
		let mut ring = self.lock();
		ring.head = 0;
		ring.len = 0;
		self.space.notify_all();
	}

	/// Close the buffer, waking every waiter.
	///
	/// Idempotent.
	pub fn close(&self) {
		let mut ring = self.lock();
		ring.closed = true;
		self.data.notify_all();
		self.space.notify_all();
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use pretty_assertions::assert_eq;
	use std::sync::Arc;

	fn samples(s: &[i16]) -> Vec<u8> {
		s.iter().flat_map(|s| s.to_le_bytes()).collect()
	}

	fn to_i16(b: &[u8]) -> Vec<i16> {
		b.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect()
	}

	#[test]
	fn write_read_wraps() {
		let b = GainCircularBuffer::new(8);
		let mut dst = [0; 8];

		b.write(&[1, 2, 3, 4, 5, 6]).unwrap();
		assert_eq!(b.read(&mut dst[..4]), 4);
		assert_eq!(&dst[..4], &[1, 2, 3, 4]);

		// Wraps around the end.
		b.write(&[7, 8, 9, 10, 11, 12]).unwrap();
		assert_eq!(b.available(), 8);
		assert_eq!(b.free(), 0);
		assert_eq!(b.read(&mut dst), 8);
		assert_eq!(dst, [5, 6, 7, 8, 9, 10, 11, 12]);
	}

	#[test]
	fn write_larger_than_capacity() {
		let b = Arc::new(GainCircularBuffer::new(16));
		let data: Vec<u8> = (0..=255).collect();

		let writer = {
			let b = Arc::clone(&b);
			let data = data.clone();
			std::thread::spawn(move || b.write(&data))
		};

		let mut out = vec![];
		let mut buf = [0; 5];
		while out.len() < data.len() {
			let n = b.read(&mut buf);
			out.extend_from_slice(&buf[..n]);
		}

		writer.join().unwrap().unwrap();
		assert_eq!(out, data);
	}

	#[test]
	fn gain_clamps() {
		let b = GainCircularBuffer::new(64);
		b.write(&samples(&[i16::MAX, i16::MIN, 1000, -1000, 0])).unwrap();

		let mut dst = [0; 10];
		assert_eq!(b.read_gain(&mut dst, 2.0), 10);
		assert_eq!(to_i16(&dst), [i16::MAX, i16::MIN, 2000, -2000, 0]);

		b.write(&samples(&[1000, -1000])).unwrap();
		let mut dst = [0; 4];
		b.read_gain(&mut dst, 0.5);
		assert_eq!(to_i16(&dst), [500, -500]);
	}

	#[test]
	// Every sample and every gain in `0..=1` mixes without wrapping.
	fn merge_bounds() {
		let values = [i16::MIN, -20000, -1, 0, 1, 20000, i16::MAX];
		let gains  = [0.0, 0.25, 0.5, 1.0];

		for a in values {
			for b in values {
				for g1 in gains {
					for g2 in gains {
						let ring = GainCircularBuffer::new(4);
						ring.write(&samples(&[b])).unwrap();
						let mut dst = samples(&[a]);
						assert_eq!(ring.read_merge_gain(&mut dst, g1, g2, 1.0), 2);

						let expected = (g1 * f32::from(a) + g2 * f32::from(b)).clamp(-32768.0, 32767.0);
						#[allow(clippy::cast_possible_truncation)]
						let expected = expected as i16;
						assert_eq!(to_i16(&dst), [expected]);
					}
				}
			}
		}
	}

	#[test]
	fn merge_global() {
		let ring = GainCircularBuffer::new(8);
		ring.write(&samples(&[100, 200])).unwrap();
		let mut dst = samples(&[100, 200, 300]);
		// Only what is buffered gets merged.
		assert_eq!(ring.read_merge_gain(&mut dst, 1.0, 1.0, 0.5), 4);
		assert_eq!(to_i16(&dst), [100, 200, 300]);
	}

	#[test]
	fn close_unblocks() {
		let b = Arc::new(GainCircularBuffer::new(4));
		b.write(&[0; 4]).unwrap();

		let writer = {
			let b = Arc::clone(&b);
			std::thread::spawn(move || b.write(&[1; 4]))
		};
		let reader = {
			let b = Arc::new(GainCircularBuffer::new(4));
			let r = Arc::clone(&b);
			(b, std::thread::spawn(move || r.read(&mut [0; 4])))
		};

		std::thread::sleep(Duration::from_millis(50));
		b.close();
		reader.0.close();
		// Idempotent.
		b.close();

		assert_eq!(writer.join().unwrap().unwrap_err().kind(), io::ErrorKind::BrokenPipe);
		assert_eq!(reader.1.join().unwrap(), 0);
		assert!(b.is_closed());
		assert_eq!(b.read(&mut [0; 4]), 0);
	}

	#[test]
	fn wait_data_times_out() {
		let b = GainCircularBuffer::new(8);
		let now = Instant::now();
		assert_eq!(b.wait_data(2, Duration::from_millis(20)), 0);
		assert!(now.elapsed() >= Duration::from_millis(20));

		b.write(&[0; 4]).unwrap();
		assert_eq!(b.wait_data(2, Duration::from_secs(10)), 4);
	}

	#[test]
	fn clear() {
		let b = GainCircularBuffer::new(8);
		b.write(&[1; 6]).unwrap();
		b.clear();
		assert_eq!(b.available(), 0);
		assert_eq!(b.free(), 8);
	}

	#[test]
	fn try_read_never_blocks() {
		let b = GainCircularBuffer::new(8);
		let mut dst = [0; 4];
		assert_eq!(b.try_read(&mut dst), 0);
		b.write(&[9; 2]).unwrap();
		assert_eq!(b.try_read(&mut dst), 2);
		assert_eq!(dst, [9, 9, 0, 0]);
		b.write(&[9; 2]).unwrap();
		b.close();
		assert_eq!(b.try_read(&mut dst), 0);
	}
}
