// Copyright (C) 2025 Bilinear Labs - All Rights Reserved

//! Module with the retry backoff policies of the backfill collector.
//!
//! # Description
//!
//! Two policies over the same exponential curve: a short one keyed on the
//! provider's rate-limit signal and a longer one for everything else. Delays
//! are jittered so that several collectors backing off from the same provider
//! incident do not retry in lockstep.

use crate::constants::{BACKOFF_CAP_MS, FETCH_RECOVERY_BACKOFF_MS, RATE_LIMIT_BACKOFF_MS};
use rand::Rng;
use std::time::Duration;

/// Exponential backoff with a cap and multiplicative jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    base_ms: u64,
    cap_ms: u64,
}

impl RetryPolicy {
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self { base_ms, cap_ms }
    }

    /// Policy for HTTP 429 style responses.
    pub fn rate_limit() -> Self {
        Self::new(RATE_LIMIT_BACKOFF_MS, BACKOFF_CAP_MS)
    }

    /// Policy for transport failures and handler errors.
    pub fn recovery() -> Self {
        Self::new(FETCH_RECOVERY_BACKOFF_MS, BACKOFF_CAP_MS)
    }

    /// Raw capped exponential delay for the given zero-based attempt.
    pub fn raw_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.base_ms.saturating_mul(factor).min(self.cap_ms);
        Duration::from_millis(delay)
    }

    /// [raw_delay] scaled by a random factor in `[0.5, 1.0)`.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let raw = self.raw_delay(attempt);
        let factor = rand::rng().random_range(0.5..1.0);
        raw.mul_f64(factor)
    }
}
