//! Retry delay after a recoverable lookup failure.
//!
//! `delay = base(code) × 2^min(retry_count, 4) + jitter`, where jitter is
//! uniform in `[0, 4]` minutes. The random source is a parameter so tests
//! can pin it.

use rand::Rng;

use crate::models::ErrorCode;

/// Exponent cap: the multiplier flattens at 16×.
pub const MAX_BACKOFF_EXPONENT: u32 = 4;

/// Upper bound of the uniform jitter, in minutes.
pub const MAX_JITTER_MINUTES: f64 = 4.0;

const MINUTE_MS: f64 = 60_000.0;

/// Base delay in minutes for each error kind.
pub fn base_minutes(code: ErrorCode) -> i64 {
    match code {
        ErrorCode::Offline => 10,
        ErrorCode::RateLimit => 60,
        ErrorCode::ApiError => 15,
        ErrorCode::NoMatch => 1440,
        ErrorCode::None => 5,
    }
}

/// Milliseconds to wait before the next attempt.
pub fn compute_backoff_millis<R: Rng + ?Sized>(code: ErrorCode, retry_count: u32, rng: &mut R) -> i64 {
    let multiplier = 1_i64 << retry_count.min(MAX_BACKOFF_EXPONENT);
    let jitter = rng.gen_range(0.0..=MAX_JITTER_MINUTES);
    let minutes = (base_minutes(code) * multiplier) as f64 + jitter;
    (minutes * MINUTE_MS).round() as i64
}
