//! Bounded polling with exponential backoff
//!
//! The provider produces a signed document asynchronously, so the download URL
//! may not exist immediately after a successful sign call. `poll_until` keeps
//! asking until the operation reports `Ready`, fails, or the attempt budget
//! runs out.
//!
//! Delay before attempt `n + 1` is `initial_delay * multiplier^(n - 1)`, capped
//! at `max_delay`, plus up to `jitter` of that delay at random.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tracing::debug;

/// Attempt budget and backoff shape.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Fraction of the computed delay added at random, `0.0..=1.0`
    pub jitter: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(8),
            jitter: 0.2,
        }
    }
}

impl PollPolicy {
    /// Constant delay, no jitter.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            multiplier: 1.0,
            max_delay: delay,
            jitter: 0.0,
        }
    }

    /// Backoff before the attempt following `attempt` (1-based), without jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.max(1.0).powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn jittered(&self, base: Duration) -> Duration {
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || base.is_zero() {
            return base;
        }
        let extra = base.as_secs_f64() * rand::rng().random_range(0.0..jitter);
        base + Duration::from_secs_f64(extra)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Outcome of a single poll attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Ready(T),
    Pending,
}

/// Why polling stopped without a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError<E> {
    /// The operation failed definitively; no further attempts were made.
    Failed(E),
    /// Every attempt reported `Pending`.
    Exhausted { attempts: u32 },
}

/// Run `operation` until it is ready, fails, or the policy's attempts are spent.
///
/// `operation` receives the 1-based attempt number.
pub async fn poll_until<T, E, F, Fut>(
    policy: &PollPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, PollError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Attempt<T>, E>>,
{
    let max_attempts = policy.attempts();

    for attempt in 1..=max_attempts {
        match operation(attempt).await {
            Ok(Attempt::Ready(value)) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "ready after polling");
                }
                return Ok(value);
            }
            Ok(Attempt::Pending) if attempt < max_attempts => {
                let delay = policy.jittered(policy.delay_for(attempt));
                debug!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "not ready, polling again after backoff"
                );
                tokio::time::sleep(delay).await;
            }
            Ok(Attempt::Pending) => {}
            Err(err) => return Err(PollError::Failed(err)),
        }
    }

    debug!(operation = operation_name, max_attempts, "poll attempts exhausted");
    Err(PollError::Exhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn default_policy_doubles_and_caps() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10), Duration::from_secs(8));
    }

    #[test]
    fn fixed_policy_never_grows() {
        let policy = PollPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(7), Duration::from_millis(250));
        assert_eq!(policy.jittered(Duration::from_millis(250)), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_within_fraction() {
        let policy = PollPolicy {
            jitter: 0.5,
            ..PollPolicy::default()
        };
        for _ in 0..50 {
            let d = policy.jittered(Duration::from_secs(2));
            assert!(d >= Duration::from_secs(2) && d <= Duration::from_secs(3), "got {d:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_attempt_does_not_sleep() {
        let start = tokio::time::Instant::now();
        let result: Result<&str, PollError<()>> =
            poll_until(&PollPolicy::default(), "test", |_| async { Ok(Attempt::Ready("url")) }).await;
        assert_eq!(result, Ok("url"));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn pending_then_ready() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<u32, PollError<()>> = poll_until(
            &PollPolicy::fixed(5, Duration::from_millis(100)),
            "test",
            move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Ok(Attempt::Pending)
                    } else {
                        Ok(Attempt::Ready(attempt))
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempt_count() {
        let start = tokio::time::Instant::now();
        let result: Result<(), PollError<()>> = poll_until(
            &PollPolicy::fixed(4, Duration::from_millis(100)),
            "test",
            |_| async { Ok(Attempt::Pending) },
        )
        .await;
        assert_eq!(result, Err(PollError::Exhausted { attempts: 4 }));
        // Three sleeps between four attempts, none after the last
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn failure_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<(), PollError<&str>> =
            poll_until(&PollPolicy::default(), "test", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("boom") }
            })
            .await;
        assert_eq!(result, Err(PollError::Failed("boom")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_tries_once() {
        let result: Result<(), PollError<()>> = poll_until(
            &PollPolicy::fixed(0, Duration::from_millis(10)),
            "test",
            |_| async { Ok(Attempt::Pending) },
        )
        .await;
        assert_eq!(result, Err(PollError::Exhausted { attempts: 1 }));
    }
}
