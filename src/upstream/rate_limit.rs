//! Per-host token-bucket rate limiting shared by every upstream request.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::debug;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket per upstream host. `rate_per_sec` tokens accrue each second
/// up to `capacity`; `acquire` suspends until one is available.
pub struct HostRateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    capacity: f64,
    rate_per_sec: f64,
}

impl HostRateLimiter {
    pub fn new(capacity: u32, rate_per_sec: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            capacity: f64::from(capacity.max(1)),
            rate_per_sec: f64::from(rate_per_sec.max(1)),
        }
    }

    pub async fn acquire(&self, host: &str) {
        loop {
            let wait = {
                let mut buckets = self.buckets.lock().await;
                let bucket = buckets.entry(host.to_string()).or_insert(Bucket {
                    tokens: self.capacity,
                    last_refill: Instant::now(),
                });

                let elapsed = bucket.last_refill.elapsed().as_secs_f64();
                bucket.tokens = (bucket.tokens + elapsed * self.rate_per_sec).min(self.capacity);
                bucket.last_refill = Instant::now();

                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    None
                } else {
                    Some(Duration::from_secs_f64(
                        (1.0 - bucket.tokens) / self.rate_per_sec,
                    ))
                }
            };

            match wait {
                None => return,
                Some(d) => {
                    debug!(host, wait_ms = d.as_millis() as u64, "rate limit wait");
                    sleep(d).await;
                }
            }
        }
    }
}
