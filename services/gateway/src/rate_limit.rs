use std::time::Instant;

use dashmap::DashMap;
use types::ids::UserId;

use crate::config::RateLimitConfig;
use crate::error::AppError;

/// Endpoints sharing a bucket per user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    PlaceOrder,
    CancelOrder,
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::PlaceOrder => "order_placement",
            Action::CancelOrder => "order_cancel",
        }
    }
}

#[derive(Clone)]
struct Bucket {
    capacity: u32,
    tokens: f64,
    refill_rate: f64,
    last_update: Instant,
}

impl Bucket {
    fn new(capacity: u32, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity as f64,
            refill_rate,
            last_update: now,
        }
    }

    fn allow_request(&mut self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_update).as_secs_f64();

        self.tokens = f64::min(self.capacity as f64, self.tokens + elapsed * self.refill_rate);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: DashMap<(UserId, Action), Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: DashMap::new(),
        }
    }

    pub fn check(&self, user: UserId, action: Action) -> Result<(), AppError> {
        self.check_at(user, action, Instant::now())
    }

    fn check_at(&self, user: UserId, action: Action, now: Instant) -> Result<(), AppError> {
        let mut bucket = self
            .buckets
            .entry((user, action))
            .or_insert_with(|| Bucket::new(self.config.capacity, self.config.refill_per_sec, now));

        if bucket.allow_request(now) {
            Ok(())
        } else {
            Err(AppError::RateLimitExceeded(format!(
                "Rate limit for {user}:{}",
                action.as_str()
            )))
        }
    }
}
