use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::warn;

struct Waiter {
    n: u32,
    tx: oneshot::Sender<()>,
}

struct Inner {
    rate: f64,
    burst: f64,
    tokens: f64,
    last_refill: Instant,
    queue: VecDeque<Waiter>,
    wake_scheduled: bool,
}

impl Inner {
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens = f64::min(self.tokens + elapsed * self.rate, self.burst);
    }

    /// Admit queued waiters in FIFO order while tokens remain. Tokens consumed
    /// by a waiter that cancelled in the meantime are returned to the bucket.
    fn drain(&mut self) {
        while let Some(front) = self.queue.front() {
            let needed = f64::from(front.n);
            if self.tokens < needed {
                break;
            }
            let waiter = self.queue.pop_front().expect("front checked above");
            self.tokens -= needed;
            if waiter.tx.send(()).is_err() {
                self.tokens += needed;
            }
        }
    }

    fn next_ready_in(&self) -> Option<Duration> {
        self.queue.front().map(|front| {
            let deficit = (f64::from(front.n) - self.tokens).max(0.0);
            Duration::from_secs_f64(deficit / self.rate)
        })
    }
}

/// Token-bucket rate limiter with FIFO admission among waiters.
///
/// `acquire` never fails: callers either proceed immediately or suspend until
/// tokens accrue, honouring their [`CancellationToken`].
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter").finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Construct a new [`RateLimiter`] refilling `rate` tokens per second with
    /// a bucket capacity of `burst`.
    pub fn new(rate: f64, burst: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                rate,
                burst: f64::from(burst),
                tokens: f64::from(burst),
                last_refill: Instant::now(),
                queue: VecDeque::new(),
                wake_scheduled: false,
            })),
        }
    }

    /// Construct a limiter from a venue-documented requests-per-minute budget.
    pub fn per_minute(requests: u32, burst: u32) -> Self {
        Self::new(f64::from(requests) / 60.0, burst)
    }

    /// Acquire `n` tokens, suspending FIFO behind earlier waiters until the
    /// bucket can admit the request. Returns without consuming tokens if the
    /// provided token is cancelled first.
    pub async fn acquire(&self, n: u32, cancel: &CancellationToken) {
        let rx = {
            let mut inner = self.inner.lock().await;
            let n = if f64::from(n) > inner.burst {
                warn!(n, burst = inner.burst, "acquire exceeds burst - clamping");
                inner.burst as u32
            } else {
                n
            };

            inner.refill();
            if inner.queue.is_empty() && inner.tokens >= f64::from(n) {
                inner.tokens -= f64::from(n);
                None
            } else {
                let (tx, rx) = oneshot::channel();
                inner.queue.push_back(Waiter { n, tx });
                self.schedule_wake(&mut inner);
                Some(rx)
            }
        };

        if let Some(rx) = rx {
            tokio::select! {
                _ = rx => {}
                _ = cancel.cancelled() => {}
            }
        }
    }

    /// Acquire a single token.
    pub async fn acquire_one(&self, cancel: &CancellationToken) {
        self.acquire(1, cancel).await
    }

    fn schedule_wake(&self, inner: &mut Inner) {
        if inner.wake_scheduled {
            return;
        }
        inner.wake_scheduled = true;

        let delay = inner.next_ready_in().unwrap_or(Duration::ZERO);
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut inner = this.inner.lock().await;
            inner.wake_scheduled = false;
            inner.refill();
            inner.drain();
            if !inner.queue.is_empty() {
                this.schedule_wake(&mut inner);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_immediate_admission_within_burst() {
        let limiter = RateLimiter::new(10.0, 2);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        limiter.acquire_one(&cancel).await;
        limiter.acquire_one(&cancel).await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_saturated_bucket_suspends() {
        let limiter = RateLimiter::new(20.0, 1);
        let cancel = CancellationToken::new();
        limiter.acquire_one(&cancel).await;
        let start = Instant::now();
        limiter.acquire_one(&cancel).await;
        // 20 tokens/sec => ~50ms for the next token
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_fifo_order_among_waiters() {
        let limiter = RateLimiter::new(50.0, 1);
        let cancel = CancellationToken::new();
        limiter.acquire_one(&cancel).await;

        let first = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                limiter.acquire_one(&cancel).await;
                Instant::now()
            })
        };
        sleep(Duration::from_millis(5)).await;
        let second = {
            let limiter = limiter.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                limiter.acquire_one(&cancel).await;
                Instant::now()
            })
        };

        let first = first.await.unwrap();
        let second = second.await.unwrap();
        assert!(first <= second);
    }

    #[tokio::test]
    async fn test_cancellation_returns_tokens() {
        let limiter = RateLimiter::new(10.0, 1);
        let cancel = CancellationToken::new();
        limiter.acquire_one(&cancel).await;

        let cancelled = CancellationToken::new();
        cancelled.cancel();
        let start = Instant::now();
        limiter.acquire_one(&cancelled).await;
        // Cancelled acquire returns promptly without waiting for a token.
        assert!(start.elapsed() < Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_admission_rate_bounds() {
        // Property: under saturation a bucket of rate R admits ~R*T (+burst).
        let limiter = RateLimiter::new(100.0, 5);
        let cancel = CancellationToken::new();
        let start = Instant::now();
        let mut admitted = 0u32;
        while start.elapsed() < Duration::from_millis(200) {
            limiter.acquire_one(&cancel).await;
            admitted += 1;
        }
        // R*T = 20 over 200ms; allow the burst of 5 on top and slack below.
        assert!((15..=30).contains(&admitted), "admitted={admitted}");
    }
}
