//! Bounded retry of transient provider failures.
//!
//! Delays grow exponentially from `initial_delay` up to `max_delay`. The
//! policy gives up after `max_retries` retries, so an operation is attempted
//! at most `max_retries + 1` times. Hard failures are never retried.

use crate::ProviderError;
use backoff::backoff::Backoff;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Retry settings for one dispatch step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub initial_delay: Duration,
	pub max_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 2,
			initial_delay: Duration::from_millis(500),
			max_delay: Duration::from_secs(10),
		}
	}
}

/// The last error of an operation that ran out of attempts or failed hard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
	pub cause: ProviderError,
	pub attempts: u32,
}

impl RetryPolicy {
	/// A policy that never retries.
	pub fn none() -> Self {
		Self {
			max_retries: 0,
			initial_delay: Duration::ZERO,
			max_delay: Duration::ZERO,
		}
	}

	fn backoff(&self) -> BoundedBackoff {
		BoundedBackoff {
			policy: *self,
			retries: 0,
		}
	}

	/// Runs `operation` until it succeeds, fails hard, or exhausts retries.
	pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, RetryFailure>
	where
		F: FnMut() -> Fut,
		Fut: Future<Output = Result<T, ProviderError>>,
	{
		let attempts = AtomicU32::new(0);

		let result = backoff::future::retry_notify(
			self.backoff(),
			|| {
				attempts.fetch_add(1, Ordering::Relaxed);
				let attempt = operation();
				async move {
					attempt.await.map_err(|e| {
						if e.is_transient() {
							backoff::Error::transient(e)
						} else {
							backoff::Error::permanent(e)
						}
					})
				}
			},
			|err: ProviderError, delay: Duration| {
				tracing::warn!(error = %err, delay_ms = delay.as_millis() as u64, "Retrying after transient failure");
			},
		)
		.await;

		result.map_err(|cause| RetryFailure {
			cause,
			attempts: attempts.load(Ordering::Relaxed),
		})
	}
}

/// Exponential backoff that stops after a fixed number of retries.
struct BoundedBackoff {
	policy: RetryPolicy,
	retries: u32,
}

impl Backoff for BoundedBackoff {
	fn reset(&mut self) {
		self.retries = 0;
	}

	fn next_backoff(&mut self) -> Option<Duration> {
		if self.retries >= self.policy.max_retries {
			return None;
		}

		let factor = 2u32.saturating_pow(self.retries);
		let delay = self
			.policy
			.initial_delay
			.saturating_mul(factor)
			.min(self.policy.max_delay);
		self.retries += 1;

		tracing::debug!(retry = self.retries, delay_ms = delay.as_millis() as u64, "Backing off");
		Some(delay)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::AtomicUsize;

	fn instant(max_retries: u32) -> RetryPolicy {
		RetryPolicy {
			max_retries,
			initial_delay: Duration::ZERO,
			max_delay: Duration::ZERO,
		}
	}

	#[test]
	fn test_delays_grow_and_cap() {
		let policy = RetryPolicy {
			max_retries: 4,
			initial_delay: Duration::from_millis(100),
			max_delay: Duration::from_millis(300),
		};
		let mut backoff = policy.backoff();

		let delays: Vec<_> = std::iter::from_fn(|| backoff.next_backoff()).collect();
		assert_eq!(
			delays,
			vec![
				Duration::from_millis(100),
				Duration::from_millis(200),
				Duration::from_millis(300),
				Duration::from_millis(300),
			]
		);

		backoff.reset();
		assert_eq!(backoff.next_backoff(), Some(Duration::from_millis(100)));
	}

	#[tokio::test]
	async fn test_transient_failures_exhaust_after_max_retries() {
		let calls = AtomicUsize::new(0);
		let result: Result<(), _> = instant(2)
			.run(|| {
				calls.fetch_add(1, Ordering::SeqCst);
				async { Err(ProviderError::Transient("connection reset".into())) }
			})
			.await;

		let failure = result.unwrap_err();
		assert_eq!(failure.attempts, 3);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
		assert!(failure.cause.is_transient());
	}

	#[tokio::test]
	async fn test_hard_failure_is_not_retried() {
		let calls = AtomicUsize::new(0);
		let result: Result<(), _> = instant(5)
			.run(|| {
				calls.fetch_add(1, Ordering::SeqCst);
				async { Err(ProviderError::Rejected("insufficient funds".into())) }
			})
			.await;

		assert_eq!(result.unwrap_err().attempts, 1);
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn test_recovers_before_retries_run_out() {
		let calls = AtomicUsize::new(0);
		let result = instant(2)
			.run(|| {
				let call = calls.fetch_add(1, Ordering::SeqCst);
				async move {
					if call == 0 {
						Err(ProviderError::Timeout("no receipt".into()))
					} else {
						Ok(call)
					}
				}
			})
			.await;

		assert_eq!(result, Ok(1));
	}
}
