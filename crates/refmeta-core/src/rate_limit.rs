//! Request spacing for external registries.
//!
//! Each outgoing request waits for a governor permit via `until_ready()`. On
//! a 429 the limiter is rebuilt at a slower rate; after a minute without
//! another 429 the base rate is restored.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::sources::SourceError;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Largest slowdown applied after repeated 429s.
const MAX_SLOWDOWN: u32 = 8;

/// Seconds without a 429 after which the base rate is restored.
const RECOVERY_SECS: u64 = 60;

pub struct RequestLimiter {
    limiter: RwLock<Arc<DirectLimiter>>,
    base_period: Duration,
    slowdown: AtomicU32,
    last_429: Mutex<Option<Instant>>,
}

impl RequestLimiter {
    /// One request per `period`. A zero period is clamped to one millisecond.
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        Self {
            limiter: RwLock::new(Arc::new(build_limiter(period))),
            base_period: period,
            slowdown: AtomicU32::new(1),
            last_429: Mutex::new(None),
        }
    }

    pub fn per_second(n: u32) -> Self {
        Self::new(Duration::from_millis(1000 / u64::from(n.max(1))))
    }

    /// CrossRef polite-pool etiquette: faster when a contact address is sent.
    pub fn for_crossref(has_mailto: bool) -> Self {
        Self::per_second(if has_mailto { 3 } else { 1 })
    }

    /// Wait until the next request may be sent.
    pub async fn acquire(&self) {
        self.maybe_recover();
        let limiter = match self.limiter.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        };
        limiter.until_ready().await;
    }

    /// Record a 429 and halve the request rate.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }
        let factor = self
            .slowdown
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(MAX_SLOWDOWN))
            })
            .map(|prev| (prev * 2).min(MAX_SLOWDOWN))
            .unwrap_or(MAX_SLOWDOWN);
        self.replace(self.base_period * factor);
    }

    pub fn slowdown(&self) -> u32 {
        self.slowdown.load(Ordering::SeqCst)
    }

    fn maybe_recover(&self) {
        let recovered = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed().as_secs() >= RECOVERY_SECS))
            .unwrap_or(false);
        if recovered && self.slowdown.swap(1, Ordering::SeqCst) > 1 {
            self.replace(self.base_period);
        }
    }

    fn replace(&self, period: Duration) {
        if let Ok(mut guard) = self.limiter.write() {
            *guard = Arc::new(build_limiter(period));
        }
    }
}

impl std::fmt::Debug for RequestLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestLimiter")
            .field("base_period", &self.base_period)
            .field("slowdown", &self.slowdown())
            .finish()
    }
}

fn build_limiter(period: Duration) -> DirectLimiter {
    let quota = Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN));
    RateLimiter::direct(quota)
}

/// `Err(SourceError::RateLimited)` for a 429, honoring `Retry-After`.
pub fn check_rate_limit_response(resp: &reqwest::Response) -> Result<(), SourceError> {
    if resp.status().as_u16() == 429 {
        let retry_after = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        Err(SourceError::RateLimited { retry_after })
    } else {
        Ok(())
    }
}

/// Parse a Retry-After value: integer seconds, or an HTTP date mapped to a
/// conservative fixed wait.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after(" 10 "), Some(Duration::from_secs(10)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::from_secs(5))
        );
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[test]
    fn test_slowdown_doubles_and_caps() {
        let limiter = RequestLimiter::per_second(10);
        assert_eq!(limiter.slowdown(), 1);
        limiter.on_rate_limited();
        assert_eq!(limiter.slowdown(), 2);
        for _ in 0..5 {
            limiter.on_rate_limited();
        }
        assert_eq!(limiter.slowdown(), MAX_SLOWDOWN);
    }

    #[tokio::test]
    async fn test_acquire_first_permit_is_immediate() {
        let limiter = RequestLimiter::per_second(1);
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(500));
    }
}
