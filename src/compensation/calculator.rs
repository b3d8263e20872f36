// Copyright 2025 Eventum Contributors.

//! Backoff calculation for compensation retries

use crate::compensation::retry::{RetrySpec, RetryState};
use chrono::{DateTime, Utc};

/// Computes the next [`RetryState`] from the policy and the attempt count
///
/// The exact curve is a deployment policy, not an engine contract; any
/// implementation must be monotonically non-decreasing in `retries`.
pub trait NextRetryAtCalculator: Send + Sync {
    /// Compute the retry bookkeeping for attempt number `retries` issued `now`
    fn next_retry_state(&self, spec: &RetrySpec, retries: u32, now: DateTime<Utc>) -> RetryState;
}

/// Doubling backoff: `min_backoff * 2^retries`
///
/// The exponent is capped so the multiplication cannot overflow; at that
/// point the backoff is effectively "not in this process's lifetime".
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNextRetryAtCalculator;

impl NextRetryAtCalculator for DefaultNextRetryAtCalculator {
    fn next_retry_state(&self, spec: &RetrySpec, retries: u32, now: DateTime<Utc>) -> RetryState {
        let factor = 1u32.checked_shl(retries.min(20)).unwrap_or(u32::MAX);
        let backoff = spec.min_backoff.saturating_mul(factor);
        let backoff = chrono::Duration::from_std(backoff)
            .unwrap_or_else(|_| chrono::Duration::days(36500));
        let execution_timeout = chrono::Duration::from_std(spec.execution_timeout)
            .unwrap_or_else(|_| chrono::Duration::days(36500));
        RetryState {
            retries,
            retry_at: now,
            timeout_at: now + execution_timeout,
            next_retry_at: now + backoff,
        }
    }
}
