//! Convergence checker
//!
//! Device state layers propagate independently and eventually. Every check
//! against them is a bounded poll: read, compare, sleep the full interval,
//! retry, give up after a fixed number of attempts.

use std::fmt::Display;
use std::time::Duration;

use sonic_buffer_common::{BufferModelError, BufferModelResult};
use tracing::{debug, warn};

/// Attempts and interval of a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub attempts: u32,
    pub interval: Duration,
}

impl PollBudget {
    /// Single field checks
    pub const FIELD: PollBudget = PollBudget::new(10, Duration::from_secs(2));

    /// Pool size, which cascades through more layers
    pub const POOL: PollBudget = PollBudget::new(20, Duration::from_secs(2));

    /// Confirming that a rejected change left a value alone
    pub const HOLD: PollBudget = PollBudget::new(3, Duration::from_secs(2));

    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Longest wall-clock time the poll can block
    pub fn timeout(&self) -> Duration {
        self.interval * self.attempts.saturating_sub(1)
    }
}

/// Result of one probe of a layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    Matched(T),
    /// Not there yet; carries what was observed
    Mismatch(String),
}

/// Poll until `probe` reports a match or the budget runs out
///
/// Returns `false` on exhaustion.
pub async fn await_match<F>(budget: PollBudget, mut probe: F) -> bool
where
    F: FnMut() -> bool,
{
    for attempt in 1..=budget.attempts {
        if probe() {
            return true;
        }
        if attempt < budget.attempts {
            tokio::time::sleep(budget.interval).await;
        }
    }
    false
}

/// Bounded polling with diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergenceChecker {
    pub field: PollBudget,
    pub pool: PollBudget,
    pub hold: PollBudget,
}

impl Default for ConvergenceChecker {
    fn default() -> Self {
        Self {
            field: PollBudget::FIELD,
            pool: PollBudget::POOL,
            hold: PollBudget::HOLD,
        }
    }
}

impl ConvergenceChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use one budget for every kind of check
    pub fn uniform(budget: PollBudget) -> Self {
        Self {
            field: budget,
            pool: budget,
            hold: budget,
        }
    }

    /// Poll until `probe` matches and return what it matched
    ///
    /// Read errors and model inconsistencies raised by the probe end the
    /// poll immediately. Exhaustion yields `ConvergenceTimeout` carrying the
    /// last observation.
    pub async fn await_observation<T, F>(
        &self,
        what: &str,
        expected: &str,
        budget: PollBudget,
        mut probe: F,
    ) -> BufferModelResult<T>
    where
        F: FnMut() -> BufferModelResult<Observation<T>>,
    {
        let mut last = String::new();
        for attempt in 1..=budget.attempts {
            match probe()? {
                Observation::Matched(value) => {
                    debug!(what, attempt, "Converged");
                    return Ok(value);
                }
                Observation::Mismatch(observed) => {
                    debug!(what, attempt, expected, observed = %observed, "Not converged yet");
                    last = observed;
                }
            }
            if attempt < budget.attempts {
                tokio::time::sleep(budget.interval).await;
            }
        }

        warn!(what, expected, observed = %last, attempts = budget.attempts, "Convergence timed out");
        Err(BufferModelError::ConvergenceTimeout {
            what: what.to_string(),
            expected: expected.to_string(),
            observed: last,
            attempts: budget.attempts,
        })
    }

    /// Poll until the observed value equals `expected`
    pub async fn await_value<T, F>(
        &self,
        what: &str,
        expected: &T,
        budget: PollBudget,
        mut observe: F,
    ) -> BufferModelResult<()>
    where
        T: PartialEq + Display,
        F: FnMut() -> BufferModelResult<Option<T>>,
    {
        let expected_str = expected.to_string();
        self.await_observation(what, &expected_str, budget, || {
            Ok(match observe()? {
                Some(value) if value == *expected => Observation::Matched(()),
                Some(value) => Observation::Mismatch(value.to_string()),
                None => Observation::Mismatch("<absent>".to_string()),
            })
        })
        .await
    }

    /// Check that the observed value stays equal to `expected` for the whole budget
    pub async fn hold_value<T, F>(
        &self,
        what: &str,
        expected: &T,
        mut observe: F,
    ) -> BufferModelResult<()>
    where
        T: PartialEq + Display,
        F: FnMut() -> BufferModelResult<Option<T>>,
    {
        let budget = self.hold;
        for attempt in 1..=budget.attempts {
            let observed = observe()?;
            if observed.as_ref() != Some(expected) {
                let observed = observed
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "<absent>".to_string());
                warn!(what, expected = %expected, observed = %observed, "Value changed");
                return Err(BufferModelError::model_inconsistency(what, expected, observed));
            }
            if attempt < budget.attempts {
                tokio::time::sleep(budget.interval).await;
            }
        }
        Ok(())
    }
}
