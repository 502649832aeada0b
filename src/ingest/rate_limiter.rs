use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Process-wide sliding-window rate limiter
///
/// Every provider call in the process goes through one instance. At most
/// `max_requests` permits are issued in any rolling `window`; extra callers
/// queue in arrival order instead of bursting.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    /// Issue times of permits still inside the window
    issued: Mutex<VecDeque<Instant>>,
}

/// Proof that a request slot was granted
#[derive(Debug, Clone, Copy)]
pub struct RatePermit {
    pub issued_at: Instant,
    /// Time spent queued for the slot
    pub waited: Duration,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            issued: Mutex::new(VecDeque::with_capacity(max_requests)),
        }
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a slot is free and take it
    pub async fn acquire(&self) -> RatePermit {
        let requested = Instant::now();

        // The queue lock is held while sleeping; tokio's mutex is fair, so
        // waiters are served in arrival order.
        let mut issued = self.issued.lock().await;

        loop {
            let now = Instant::now();
            while let Some(&front) = issued.front() {
                if now.duration_since(front) >= self.window {
                    issued.pop_front();
                } else {
                    break;
                }
            }

            if issued.len() < self.max_requests {
                issued.push_back(now);
                return RatePermit {
                    issued_at: now,
                    waited: now.duration_since(requested),
                };
            }

            if let Some(&oldest) = issued.front() {
                tracing::debug!(
                    "Rate limit reached ({} per {:?}), waiting {:?}",
                    self.max_requests,
                    self.window,
                    (oldest + self.window).saturating_duration_since(now)
                );
                sleep_until(oldest + self.window).await;
            }
        }
    }

    /// Like `acquire`, but gives up after `timeout`
    pub async fn try_acquire(&self, timeout: Duration) -> Option<RatePermit> {
        tokio::time::timeout(timeout, self.acquire()).await.ok()
    }

    /// Permits issued within the current window
    pub async fn in_flight(&self) -> usize {
        let now = Instant::now();
        let issued = self.issued.lock().await;
        issued
            .iter()
            .filter(|t| now.duration_since(**t) < self.window)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_under_limit_is_immediate() {
        let limiter = RateLimiter::new(3, Duration::from_secs(1));

        for _ in 0..3 {
            let permit = limiter.acquire().await;
            assert_eq!(permit.waited, Duration::ZERO);
        }
        assert_eq!(limiter.in_flight().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_bound_under_high_concurrency() {
        let limiter = Arc::new(RateLimiter::new(3, Duration::from_secs(1)));
        let mut handles = Vec::new();

        // Concurrency well above the limit
        for _ in 0..10 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await.issued_at }));
        }

        let mut issued = Vec::new();
        for handle in handles {
            issued.push(handle.await.unwrap());
        }
        issued.sort();

        // Any 4 consecutive permits must span at least one full window
        for pair in issued.windows(4) {
            assert!(pair[3].duration_since(pair[0]) >= Duration::from_secs(1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_try_acquire_times_out_when_saturated() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.acquire().await;

        assert!(limiter.try_acquire(Duration::from_secs(5)).await.is_none());

        // Slot frees once the window passes
        let permit = limiter.try_acquire(Duration::from_secs(120)).await;
        assert!(permit.is_some());
    }
}
