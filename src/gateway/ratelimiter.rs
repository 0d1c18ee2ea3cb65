//! Ratelimiter on the shard's ability to send payloads over the gateway.
//!
//! The gateway allows 120 outbound payloads per 60 seconds per connection. A margin is reserved
//! for heartbeats, which bypass the queue and must never be starved by application traffic.

use leaky_bucket_lite::LeakyBucket;
use tokio::time::Duration;
use tracing::warn;

/// Interval of how often the ratelimit bucket resets, in milliseconds.
const RESET_DURATION_MILLISECONDS: u64 = 60_000;

/// Number of payloads allowed in a given reset period.
///
/// API documentation with details:
/// <https://discord.com/developers/docs/topics/gateway#rate-limiting>
const PAYLOADS_PER_RESET: u8 = 120;

/// Ratelimiter for sending payloads over the gateway to Discord.
#[derive(Debug)]
pub struct PayloadRatelimiter {
    bucket: LeakyBucket,
}

impl PayloadRatelimiter {
    /// Create a new ratelimiter, reserving room for heartbeats at the given interval.
    #[must_use]
    pub(crate) fn new(heartbeat_interval: Duration) -> Self {
        let allotted = u32::from(available_per_interval(heartbeat_interval.as_millis() as u64));

        let bucket = LeakyBucket::builder()
            .max(allotted)
            .tokens(allotted)
            .refill_interval(Duration::from_millis(RESET_DURATION_MILLISECONDS))
            .refill_amount(allotted)
            .build();

        Self {
            bucket,
        }
    }

    /// Current number of payloads that are still available within the interval.
    pub fn available(&self) -> u32 {
        self.bucket.tokens()
    }

    /// Maximum number of payloads that may be made per interval.
    pub fn max(&self) -> u32 {
        self.bucket.max()
    }

    /// Acquire a token from the bucket, waiting until one is available.
    pub(crate) async fn acquire_one(&self) {
        self.bucket.acquire_one().await;
    }
}

/// Calculate the number of payloads to allot in a reset period while taking the heartbeat
/// interval into account.
///
/// Twice as much as needed is reserved for heartbeats, to account for Discord sending us a
/// heartbeat and expecting one in response on top of the regular schedule.
fn available_per_interval(heartbeat_interval: u64) -> u8 {
    /// Allotment to fall back on when the heartbeat interval looks nonsensical.
    const ALLOT_ON_FAIL: u8 = PAYLOADS_PER_RESET - 10;

    if heartbeat_interval == 0 {
        return ALLOT_ON_FAIL;
    }

    let mut heartbeats = RESET_DURATION_MILLISECONDS / heartbeat_interval;
    if RESET_DURATION_MILLISECONDS % heartbeat_interval > 0 {
        heartbeats = heartbeats.saturating_add(1);
    }

    let Ok(heartbeats) = u8::try_from(heartbeats) else {
        warn!("heartbeats > u8 max; defaulting to allotting {ALLOT_ON_FAIL}");

        return ALLOT_ON_FAIL;
    };

    PAYLOADS_PER_RESET.saturating_sub(heartbeats * 2)
}

#[cfg(test)]
mod tests {
    use tokio::time::Duration;

    use super::{available_per_interval, PayloadRatelimiter};

    #[test]
    fn allotment_reserves_heartbeats() {
        // 120 per minute, minus 2 × the 2 heartbeats in a 42.5s interval minute.
        assert_eq!(available_per_interval(42_500), 116);
        assert_eq!(available_per_interval(60_000), 118);
        // Nonsense interval falls back instead of flooding.
        assert_eq!(available_per_interval(0), 110);
        assert_eq!(available_per_interval(1), 110);
    }

    #[tokio::test]
    async fn bucket_starts_full() {
        let limiter = PayloadRatelimiter::new(Duration::from_millis(42_500));

        assert_eq!(limiter.available(), 116);
        assert_eq!(limiter.max(), 116);

        limiter.acquire_one().await;
        assert_eq!(limiter.available(), 115);
    }
}
