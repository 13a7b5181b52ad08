//! # Backoff Calculator
//!
//! Capped exponential backoff for phase-level retries:
//! `delay(k) = min(cap, base * 2^k)`. No jitter: each batch owns a single
//! timer, so there is no herd to spread out.

use std::time::Duration;

use crate::config::RetryConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffCalculator {
    base_ms: u64,
    cap_ms: u64,
}

impl BackoffCalculator {
    pub fn new(base_ms: u64, cap_ms: u64) -> Self {
        Self { base_ms, cap_ms }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.backoff_base_ms, config.backoff_cap_ms)
    }

    /// Delay in milliseconds before retry attempt `attempt`
    pub fn delay_ms(&self, attempt: u32) -> u64 {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        self.base_ms.saturating_mul(factor).min(self.cap_ms)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.delay_ms(attempt))
    }
}
