//! Global free-functions for internal tandem usage.

//---------------------------------------------------------------------------------------------------- Use
use std::time::{Duration,SystemTime,UNIX_EPOCH};

//---------------------------------------------------------------------------------------------------- Time
/// Milliseconds since the UNIX epoch.
///
/// A clock before 1970 is treated as `0`.
#[inline]
pub(crate) fn now_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

//---------------------------------------------------------------------------------------------------- Backoff
/// How long to back off before retrying a chunk
/// that has failed `retries` times: `log10(retries)` seconds.
///
/// `0` and `1` failures mean no backoff at all.
pub(crate) fn chunk_backoff(retries: u32) -> Duration {
	if retries <= 1 {
		return Duration::ZERO;
	}
	Duration::from_secs_f64(f64::from(retries).log10())
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn backoff() {
		assert_eq!(chunk_backoff(0), Duration::ZERO);
		assert_eq!(chunk_backoff(1), Duration::ZERO);
		assert_eq!(chunk_backoff(10), Duration::from_secs(1));
		assert_eq!(chunk_backoff(100), Duration::from_secs(2));

		// Monotonic.
		let mut last = Duration::ZERO;
		for i in 0..=128 {
			let b = chunk_backoff(i);
			assert!(b >= last);
			last = b;
		}
	}

	#[test]
	fn now() {
		let a = now_millis();
		let b = now_millis();
		assert!(b >= a);
		assert!(a > 1_600_000_000_000);
	}
}
