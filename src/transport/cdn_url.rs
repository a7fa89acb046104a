//! Expiring CDN urls.

//---------------------------------------------------------------------------------------------------- Use
use std::sync::{Arc,Mutex,MutexGuard};
use url::Url;
use crate::{
	config::CDN_URL_RENEW_MARGIN,
	error::{ChunkError,LoadError},
	feeder::{FileId,StorageResolver},
	free::now_millis,
	macros::{debug2,warn2},
};

//---------------------------------------------------------------------------------------------------- Expiration
/// When `url` stops working, in milliseconds since the UNIX epoch.
///
/// Looked up in this order:
/// 1. `exp=<secs>` inside the `__token__` parameter (`~` separated)
/// 2. the `Expires=<secs>` parameter
/// 3. a `<secs>_` prefix of the first query parameter's name
///
/// `None` means the url never expires (or we could not tell).
pub(crate) fn expiration(url: &Url) -> Option<u64> {
	let secs = |s: &str| s.parse::<u64>().ok().map(|s| s.saturating_mul(1000));

	if let Some((_, token)) = url.query_pairs().find(|(k, _)| k == "__token__") {
		let exp = token
			.split('~')
			.filter_map(|kv| kv.split_once('='))
			.find(|(k, _)| *k == "exp")
			.and_then(|(_, v)| secs(v));
		if exp.is_none() {
			warn2!("CdnUrl - invalid __token__ in {url}");
		}
		return exp;
	}

	if let Some((_, expires)) = url.query_pairs().find(|(k, _)| k == "Expires") {
		return secs(&expires);
	}

	let (first, _) = url.query_pairs().next()?;
	let (prefix, _) = first.split_once('_')?;
	secs(prefix)
}

//---------------------------------------------------------------------------------------------------- CdnUrl
#[derive(Debug)]
struct Inner {
	url: Url,
	expiration: Option<u64>,
}

/// A CDN url of one content that renews itself before it expires.
///
/// A url requested when `now + 5min >= expiration`
/// is first re-resolved through the [`StorageResolver`].
pub struct CdnUrl {
	file: FileId,
	resolver: Option<Arc<dyn StorageResolver>>,
	inner: Mutex<Inner>,
}

impl std::fmt::Debug for CdnUrl {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CdnUrl")
			.field("file", &self.file)
			.field("expiration", &self.expiration())
			.finish_non_exhaustive()
	}
}

impl CdnUrl {
	/// Wrap `url` of `file`.
	///
	/// Without a `resolver` the url is never renewed.
	///
	/// # Errors
	/// `url` is not a valid url.
	pub fn new(file: FileId, url: &str, resolver: Option<Arc<dyn StorageResolver>>) -> Result<Self, LoadError> {
		let url = Url::parse(url).map_err(|e| LoadError::CdnResolution(e.to_string().into()))?;
		let expiration = expiration(&url);
		debug2!("CdnUrl - {file} expires at: {expiration:?}");
		Ok(Self {
			file,
			resolver,
			inner: Mutex::new(Inner { url, expiration }),
		})
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
	}

	/// When the current url expires (ms since the UNIX epoch).
	pub fn expiration(&self) -> Option<u64> {
		self.lock().expiration
	}

	/// The url to use right now, renewed first if it expires soon.
	///
	/// # Errors
	/// Renewal was needed and failed.
	pub fn url(&self) -> Result<Url, ChunkError> {
		self.url_at(now_millis())
	}

	/// [`Self::url`] at the time `now` (ms since the UNIX epoch).
	pub(crate) fn url_at(&self, now: u64) -> Result<Url, ChunkError> {
		let mut inner = self.lock();

		let margin = u64::try_from(CDN_URL_RENEW_MARGIN.as_millis()).unwrap_or(u64::MAX);
		let expired = inner.expiration.is_some_and(|e| now.saturating_add(margin) >= e);
		if !expired {
			return Ok(inner.url.clone());
		}

		let Some(resolver) = &self.resolver else {
			warn2!("CdnUrl - {} expired, no resolver to renew it", self.file);
			return Ok(inner.url.clone());
		};

		debug2!("CdnUrl - {} renewing", self.file);
		let response = resolver
			.resolve(&self.file)
			.map_err(|e| ChunkError::Fetch(format!("cdn url renewal failed: {e}").into()))?;
		let Some(url) = response.cdn_urls.first() else {
			return Err(ChunkError::Fetch("cdn url renewal returned no urls".into()));
		};
		let url = Url::parse(url).map_err(|e| ChunkError::Fetch(format!("renewed cdn url is invalid: {e}").into()))?;

		inner.expiration = expiration(&url);
		inner.url = url;
		Ok(inner.url.clone())
	}
}

//---------------------------------------------------------------------------------------------------- TESTS
#[cfg(test)]
mod tests {
	use super::*;
	use crate::feeder::{StorageResolveResponse,StorageResult};
	use pretty_assertions::assert_eq;
	use std::sync::atomic::{AtomicUsize,Ordering};

	fn exp(url: &str) -> Option<u64> {
		expiration(&Url::parse(url).unwrap())
	}

	#[test]
	fn parse_expiration() {
		assert_eq!(exp("https://a.b/c?__token__=st=1~exp=1700000000~acl=*~hmac=ff"), Some(1_700_000_000_000));
		assert_eq!(exp("https://a.b/c?__token__=st=1~acl=*"), None);
		assert_eq!(exp("https://a.b/c?Expires=1700000000&Signature=x"), Some(1_700_000_000_000));
		assert_eq!(exp("https://a.b/c?1700000000_abcdef=1"), Some(1_700_000_000_000));
		assert_eq!(exp("https://a.b/c?nope=1"), None);
		assert_eq!(exp("https://a.b/c"), None);
	}

	struct Renewer(AtomicUsize);
	impl StorageResolver for Renewer {
		fn resolve(&self, _: &FileId) -> Result<StorageResolveResponse, LoadError> {
			self.0.fetch_add(1, Ordering::SeqCst);
			Ok(StorageResolveResponse {
				result: StorageResult::Cdn,
				cdn_urls: vec!["https://a.b/renewed?Expires=2000000".into()],
			})
		}
	}

	#[test]
	fn renews_within_margin() {
		let renewer = Arc::new(Renewer(AtomicUsize::new(0)));
		let url = CdnUrl::new(FileId::TEST, "https://a.b/old?Expires=1000", Some(Arc::clone(&renewer) as _)).unwrap();
		assert_eq!(url.expiration(), Some(1_000_000));

		// Far from expiring.
		let now = 1_000_000 - 5 * 60 * 1000 - 1;
		assert_eq!(url.url_at(now).unwrap().path(), "/old");
		assert_eq!(renewer.0.load(Ordering::SeqCst), 0);

		// Within 5 minutes.
		assert_eq!(url.url_at(now + 1).unwrap().path(), "/renewed");
		assert_eq!(renewer.0.load(Ordering::SeqCst), 1);
		assert_eq!(url.expiration(), Some(2_000_000_000));

		// The renewed one is good for a while.
		assert_eq!(url.url_at(now + 1).unwrap().path(), "/renewed");
		assert_eq!(renewer.0.load(Ordering::SeqCst), 1);
	}

	#[test]
	fn never_expires() {
		let url = CdnUrl::new(FileId::TEST, "https://a.b/c", None).unwrap();
		assert_eq!(url.expiration(), None);
		assert_eq!(url.url_at(u64::MAX).unwrap().path(), "/c");
		assert!(CdnUrl::new(FileId::TEST, "not a url", None).is_err());
	}
}
