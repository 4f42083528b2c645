//! Bounded polling for read-after-write checks.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::error::{HarnessError, ZitadelError};

/// Default number of polling attempts.
pub const DEFAULT_ATTEMPTS: u32 = 5;

/// Default delay between attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// How long to wait for a remote check to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Attempts before giving up; at least one is always made.
    pub attempts: u32,
    /// Fixed delay between attempts.
    pub interval: Duration,
}

/// Why one check attempt did not pass.
#[derive(Debug)]
pub enum CheckFailure {
    /// The service answered but not with the expected value; worth retrying.
    Mismatch {
        /// Field compared.
        field: String,
        /// Expected value, rendered.
        expected: String,
        /// Observed value, rendered.
        actual: String,
    },
    /// The check could not be carried out at all.
    Error(ZitadelError),
}

impl PollPolicy {
    /// Creates a policy.
    #[must_use]
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// A single attempt with no waiting.
    #[must_use]
    pub const fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Runs `check` until it passes or the attempts run out.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::StepFailed`] if a check errors outright, or
    /// [`HarnessError::Timeout`] with the last mismatch once every attempt
    /// has failed.
    pub async fn run<T, F, Fut>(&self, step: &str, mut check: F) -> Result<(T, u32), HarnessError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CheckFailure>>,
    {
        let attempts = self.attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            match check().await {
                Ok(value) => return Ok((value, attempt)),
                Err(CheckFailure::Error(e)) => {
                    return Err(HarnessError::StepFailed {
                        step: step.to_string(),
                        source: Box::new(e),
                    });
                }
                Err(failure) => {
                    last = failure.to_string();
                    debug!("{step}: attempt {attempt}/{attempts} did not pass: {last}");
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(HarnessError::Timeout {
            step: step.to_string(),
            attempts,
            last,
        })
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ATTEMPTS, DEFAULT_INTERVAL)
    }
}

impl From<ZitadelError> for CheckFailure {
    fn from(e: ZitadelError) -> Self {
        Self::Error(e)
    }
}

impl std::fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mismatch {
                field,
                expected,
                actual,
            } => write!(f, "field '{field}' expected {expected}, got {actual}"),
            Self::Error(e) => write!(f, "{e}"),
        }
    }
}
