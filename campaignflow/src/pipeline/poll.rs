//! Bounded poll-until-ready loop.

use crate::cancellation::CancellationToken;
use crate::config::PollConfig;
use crate::errors::ProviderError;
use std::future::Future;

/// How a poll loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// A check returned a value.
    Ready {
        /// The value produced.
        value: T,
        /// Checks performed, including the successful one.
        attempts: u32,
    },
    /// Every attempt ran without producing a value.
    Exhausted {
        /// Checks performed.
        attempts: u32,
    },
    /// The run was cancelled while waiting.
    Cancelled {
        /// Checks performed before cancellation.
        attempts: u32,
    },
}

impl<T> PollOutcome<T> {
    /// Returns the number of checks performed.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts, .. }
            | Self::Exhausted { attempts }
            | Self::Cancelled { attempts } => *attempts,
        }
    }

    /// Returns the value, if the loop produced one.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Ready { value, .. } => Some(value),
            Self::Exhausted { .. } | Self::Cancelled { .. } => None,
        }
    }
}

/// Calls `check` up to `config.max_attempts` times, waiting
/// `config.interval()` before each call.
///
/// A check returning `Ok(None)` or an error counts as "not ready yet". The
/// wait races the cancellation token, so a cancelled run stops without
/// issuing another check.
pub async fn poll_until<T, F, Fut>(
    config: &PollConfig,
    cancel: &CancellationToken,
    mut check: F,
) -> PollOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, ProviderError>>,
{
    let interval = config.interval();
    let mut attempts = 0;

    while attempts < config.max_attempts {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return PollOutcome::Cancelled { attempts },
            () = tokio::time::sleep(interval) => {}
        }

        attempts += 1;
        match check(attempts).await {
            Ok(Some(value)) => return PollOutcome::Ready { value, attempts },
            Ok(None) => {
                tracing::debug!(attempt = attempts, "Poll check not ready");
            }
            Err(e) => {
                tracing::debug!(attempt = attempts, error = %e, "Poll check failed");
            }
        }
    }

    PollOutcome::Exhausted { attempts }
}
