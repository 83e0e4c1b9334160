//! Pure retry math: backoff delays and the failure transition function.
//!
//! Both functions are deliberately free of store access so they can be
//! unit-tested in isolation; the store applies their results inside its
//! atomic updates.

use std::time::Duration;

/// Base delay before the first retry.
pub const BASE_DELAY_SECS: u64 = 300;

/// Ceiling on the retry delay.
pub const MAX_DELAY_SECS: u64 = 3600;

/// Exponential backoff: `min(300 * 2^(attempts_used - 1), 3600)` seconds.
///
/// `attempts_used` is the number of attempts already consumed (>= 1 when a
/// failure is being recorded). A defensive 0 maps to the base delay.
pub fn backoff(attempts_used: u32) -> Duration {
    let exponent = attempts_used.saturating_sub(1).min(32);
    let secs = BASE_DELAY_SECS
        .saturating_mul(1u64 << exponent)
        .min(MAX_DELAY_SECS);
    Duration::from_secs(secs)
}

/// Where a failed attempt sends the job next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextState {
    /// Requeue with `scheduled_for = now + delay`.
    Requeue(Duration),
    /// Out of attempts or non-retryable: terminal failure.
    DeadLetter,
}

/// Decide the post-failure transition.
///
/// Retryable failures requeue while attempts remain; fatal failures and
/// exhausted budgets dead-letter.
pub fn next_state(attempts_used: u32, max_attempts: u32, retryable: bool) -> NextState {
    if retryable && attempts_used < max_attempts {
        NextState::Requeue(backoff(attempts_used))
    } else {
        NextState::DeadLetter
    }
}
