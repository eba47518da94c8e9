// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Retry with exponential backoff and jitter for store operations.

use crate::error::{ControllerError, Result};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts.max(1),
            ..Default::default()
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, runs
/// out of attempts, or `token` is cancelled.
pub async fn retry_with_backoff<F, Fut, T>(
    config: &RetryConfig,
    token: &CancellationToken,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !e.is_retryable() {
            return Err(e);
        }
        if attempt >= config.max_attempts {
            error!(
                operation = %operation_name,
                attempt = attempt,
                error = %e,
                "Operation failed after max retries"
            );
            return Err(e);
        }

        // 0.5x to 1.5x of the delay
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

        warn!(
            operation = %operation_name,
            attempt = attempt,
            error = %e,
            delay_ms = jittered_delay.as_millis() as u64,
            "Operation failed, retrying"
        );

        tokio::select! {
            _ = token.cancelled() => return Err(ControllerError::Cancelled),
            _ = tokio::time::sleep(jittered_delay) => {}
        }

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}
