use tokio::time::{Duration, Instant};

/// A single client's token bucket.
///
/// The bucket starts full with `capacity` tokens and refills continuously at
/// `rate` tokens per second, never exceeding `capacity`. Every allowed request
/// consumes exactly one token.
///
/// The bucket itself is not synchronized; its owner serializes access.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
    rate: f64,
    capacity: f64,
}

impl TokenBucket {
    /// Create a full bucket.
    ///
    /// * `capacity` - maximum burst size, at least 1
    /// * `rate`     - refill rate in tokens per second, positive and finite
    pub fn new(capacity: u32, rate: f64, now: Instant) -> Self {
        debug_assert!(capacity >= 1, "token bucket capacity must be at least 1");
        debug_assert!(rate.is_finite() && rate > 0.0, "refill rate must be positive");

        Self {
            tokens: f64::from(capacity),
            last_refill: now,
            rate,
            capacity: f64::from(capacity),
        }
    }

    /// Try to consume one token at the current time.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Try to consume one token as of `now`.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        self.try_acquire_at(now).is_ok()
    }

    /// Try to consume one token as of `now`.
    ///
    /// On denial, returns how long the caller must wait until a whole token
    /// has accumulated.
    pub fn try_acquire_at(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            // Tiny rates can put the next token past what a Duration holds.
            let wait = (1.0 - self.tokens) / self.rate;
            Err(Duration::try_from_secs_f64(wait).unwrap_or(Duration::MAX))
        }
    }

    fn refill(&mut self, now: Instant) {
        // Callers may race on the clock: a `now` older than the last refill
        // adds nothing and must not move the refill point backwards.
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.rate).min(self.capacity);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Tokens currently held, not counting refill since the last check.
    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}
