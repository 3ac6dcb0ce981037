use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Duration, Instant};
use parking_lot::Mutex;

/// Spaces out upstream quote requests and caps how many run at once.
///
/// Yahoo throttles bursts from a single client, so batch lookups (market
/// indices, live opportunities) go through one shared limiter.
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    last_request: Arc<Mutex<Option<Instant>>>,
    min_delay: Duration,
}

impl RateLimiter {
    /// `min_delay` is the minimum gap between the start of two requests.
    pub fn new(max_concurrent: usize, min_delay: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            last_request: Arc::new(Mutex::new(None)),
            min_delay,
        }
    }

    /// Waits for a free slot and for the spacing window, then reserves the
    /// next start time. The slot is released when the guard drops.
    pub async fn acquire(&self) -> RateLimitGuard {
        // Only fails once the semaphore is closed, which never happens here
        let permit = self.semaphore.clone().acquire_owned().await.ok();

        // Reserve a start slot under the lock, sleep outside it
        let wait_time = {
            let mut last = self.last_request.lock();
            let now = Instant::now();
            let start = match *last {
                Some(prev) if prev + self.min_delay > now => prev + self.min_delay,
                _ => now,
            };
            *last = Some(start);
            start.saturating_duration_since(now)
        };

        if !wait_time.is_zero() {
            sleep(wait_time).await;
        }

        RateLimitGuard { _permit: permit }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

pub struct RateLimitGuard {
    _permit: Option<OwnedSemaphorePermit>,
}
