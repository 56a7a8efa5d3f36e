use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Sliding-window limiter protecting the PMS's 200-calls-per-minute ceiling.
/// One instance is shared (via `Arc`) across every caller that can issue a
/// PMS request, so the window is global to the process rather than
/// per-clinic.
pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    call_times: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls,
            window,
            call_times: Mutex::new(VecDeque::new()),
        }
    }

    /// Blocks until a call slot is free, then reserves it. The wait happens
    /// with the internal lock held, mirroring the window being a single
    /// shared resource: no other caller can slip in ahead while we sleep.
    pub async fn acquire(&self) -> Instant {
        let mut call_times = self.call_times.lock().await;

        loop {
            let now = Instant::now();
            Self::prune(&mut call_times, now, self.window);

            if call_times.len() < self.max_calls as usize {
                call_times.push_back(now);
                return now;
            }

            let oldest = call_times[0];
            let wait = self.window.saturating_sub(now.duration_since(oldest));
            debug!(wait_ms = wait.as_millis() as u64, "rate limit hit, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    fn prune(call_times: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(&front) = call_times.front() {
            if now.duration_since(front) >= window {
                call_times.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allows_calls_under_the_limit_without_waiting() {
        let limiter = RateLimiter::new(3, Duration::from_secs(60));
        for _ in 0..3 {
            limiter.acquire().await;
        }
        let call_times = limiter.call_times.lock().await;
        assert_eq!(call_times.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn blocks_once_the_window_is_full() {
        let limiter = RateLimiter::new(2, Duration::from_millis(100));
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        assert!(Instant::now().duration_since(start) >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn prunes_expired_entries_before_counting() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        limiter.acquire().await;
        tokio::time::advance(Duration::from_millis(60)).await;

        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now().duration_since(start), Duration::ZERO);
    }
}
