//! IP-bucket token-bucket rate limiting for the signed-URL subsystem.
//!
//! Ported from the admin-API-key rate limiter: a token bucket per key,
//! refilled continuously between evaluations, re-keyed here on client IP
//! address instead of API key id.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use pgfront_config::ApiKeyRateLimit;

/// A single IP's token bucket.
struct TokenBucket {
    config: ApiKeyRateLimit,
    tokens: u128,
    last_refill: Instant,
}

impl TokenBucket {
    const TOKEN_SCALE: u128 = 1_000_000;

    fn new(config: ApiKeyRateLimit, now: Instant) -> Self {
        let tokens = Self::capacity_for(&config);
        Self {
            config,
            tokens,
            last_refill: now,
        }
    }

    fn capacity_for(config: &ApiKeyRateLimit) -> u128 {
        u128::from(config.burst) * Self::TOKEN_SCALE
    }

    fn capacity(&self) -> u128 {
        Self::capacity_for(&self.config)
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed == Duration::ZERO {
            return;
        }
        let period_micros = self.config.replenish_period.as_micros();
        let capacity = self.capacity();
        if period_micros == 0 || capacity == 0 {
            self.tokens = capacity;
            self.last_refill = now;
            return;
        }
        if let Some(amount) = capacity.saturating_mul(elapsed.as_micros()).checked_div(period_micros)
            && amount > 0
        {
            self.tokens = (self.tokens + amount).min(capacity);
            self.last_refill = now;
        }
    }

    fn try_acquire(&mut self, config: &ApiKeyRateLimit, now: Instant) -> Result<(), Duration> {
        if self.config != *config {
            self.config = config.clone();
            self.tokens = self.capacity();
            self.last_refill = now;
        }
        self.refill(now);

        if self.tokens >= Self::TOKEN_SCALE {
            self.tokens -= Self::TOKEN_SCALE;
            Ok(())
        } else {
            Err(self.retry_delay())
        }
    }

    fn retry_delay(&self) -> Duration {
        let capacity = self.capacity();
        if capacity == 0 {
            return Duration::MAX;
        }
        let period_micros = self.config.replenish_period.as_micros();
        if period_micros == 0 {
            return Duration::ZERO;
        }
        let deficit = Self::TOKEN_SCALE.saturating_sub(self.tokens);
        let needed = deficit.saturating_mul(period_micros);
        let retry_micros = needed.div_ceil(capacity).min(u128::from(u64::MAX));
        Duration::from_micros(u64::try_from(retry_micros).unwrap_or(u64::MAX))
    }
}

/// Rate limiter keyed by client IP address, guarded by a single mutex per
/// spec.md's concurrency note on rate-limit buckets.
pub struct IpRateLimiter {
    buckets: Mutex<HashMap<IpAddr, TokenBucket>>,
}

impl IpRateLimiter {
    /// Construct an empty limiter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempt to consume one token for `ip` under `config`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex has been poisoned.
    pub fn check(&self, ip: IpAddr, config: &ApiKeyRateLimit) -> Result<(), Duration> {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        buckets
            .entry(ip)
            .or_insert_with(|| TokenBucket::new(config.clone(), now))
            .try_acquire(config, now)
    }
}

impl Default for IpRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(burst: u32, per_secs: u64) -> ApiKeyRateLimit {
        ApiKeyRateLimit {
            burst,
            replenish_period: Duration::from_secs(per_secs),
        }
    }

    #[test]
    fn allows_up_to_burst_then_throttles() {
        let limiter = IpRateLimiter::new();
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        let config = limit(2, 60);
        assert!(limiter.check(ip, &config).is_ok());
        assert!(limiter.check(ip, &config).is_ok());
        assert!(limiter.check(ip, &config).is_err());
    }

    #[test]
    fn distinct_ips_have_independent_buckets() {
        let limiter = IpRateLimiter::new();
        let config = limit(1, 60);
        let a: IpAddr = "10.0.0.1".parse().unwrap();
        let b: IpAddr = "10.0.0.2".parse().unwrap();
        assert!(limiter.check(a, &config).is_ok());
        assert!(limiter.check(a, &config).is_err());
        assert!(limiter.check(b, &config).is_ok());
    }
}
