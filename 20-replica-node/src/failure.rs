//! Time-windowed failure injection.
//!
//! Every write attempt that reaches a healthy node is offered to the
//! [`FailureSimulator`]. It only rolls the dice while the time elapsed since
//! the node's first write falls inside the node's [`EligibilityWindow`].

use std::fmt;
use std::time::Duration;

use anyhow::{Result, ensure};
use rand::{Rng, SeedableRng, rngs::StdRng};

/// Upper bound of an eligibility window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowEnd {
    Exclusive(Duration),
    Inclusive(Duration),
    /// Eligible from the start onward, forever.
    Unbounded,
}

/// Interval, relative to the clock origin, during which a node may fail.
///
/// The start is always inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EligibilityWindow {
    start: Duration,
    end: WindowEnd,
}

impl EligibilityWindow {
    pub fn new(start: Duration, end: WindowEnd) -> Result<Self> {
        match end {
            WindowEnd::Exclusive(bound) => {
                ensure!(bound > start, "window end must come after its start")
            }
            WindowEnd::Inclusive(bound) => {
                ensure!(bound >= start, "window end must not precede its start")
            }
            WindowEnd::Unbounded => {}
        }
        Ok(Self { start, end })
    }

    /// `[start, end)`
    pub fn half_open(start: Duration, end: Duration) -> Result<Self> {
        Self::new(start, WindowEnd::Exclusive(end))
    }

    /// `[start, end]`
    pub fn closed(start: Duration, end: Duration) -> Result<Self> {
        Self::new(start, WindowEnd::Inclusive(end))
    }

    /// `[start, ∞)`
    pub fn starting_at(start: Duration) -> Self {
        Self {
            start,
            end: WindowEnd::Unbounded,
        }
    }

    pub fn contains(&self, elapsed: Duration) -> bool {
        if elapsed < self.start {
            return false;
        }
        match self.end {
            WindowEnd::Exclusive(bound) => elapsed < bound,
            WindowEnd::Inclusive(bound) => elapsed <= bound,
            WindowEnd::Unbounded => true,
        }
    }
}

impl fmt::Display for EligibilityWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let start = self.start.as_secs_f64();
        match self.end {
            WindowEnd::Exclusive(end) => write!(f, "[{start}s, {}s)", end.as_secs_f64()),
            WindowEnd::Inclusive(end) => write!(f, "[{start}s, {}s]", end.as_secs_f64()),
            WindowEnd::Unbounded => write!(f, "[{start}s, ∞)"),
        }
    }
}

/// Failure probability paired with the window it applies in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailurePolicy {
    probability: f64,
    window: EligibilityWindow,
}

impl FailurePolicy {
    pub fn new(probability: f64, window: EligibilityWindow) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&probability),
            "failure probability must be within [0, 1], got {probability}"
        );
        Ok(Self {
            probability,
            window,
        })
    }

    /// A policy that never fails.
    pub fn never() -> Self {
        Self {
            probability: 0.0,
            window: EligibilityWindow::starting_at(Duration::ZERO),
        }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }

    pub fn window(&self) -> EligibilityWindow {
        self.window
    }
}

/// Decides, per write attempt, whether the node enters a simulated outage.
///
/// Each simulator owns its random source, so two nodes never share failure
/// state. Seed it explicitly for reproducible runs.
#[derive(Debug)]
pub struct FailureSimulator {
    policy: FailurePolicy,
    rng: StdRng,
}

impl FailureSimulator {
    pub fn new(policy: FailurePolicy, rng: StdRng) -> Self {
        Self { policy, rng }
    }

    pub fn seeded(policy: FailurePolicy, seed: u64) -> Self {
        Self::new(policy, StdRng::seed_from_u64(seed))
    }

    pub fn from_entropy(policy: FailurePolicy) -> Self {
        Self::new(policy, StdRng::from_entropy())
    }

    pub fn policy(&self) -> &FailurePolicy {
        &self.policy
    }

    /// Returns `true` if the write attempt at `elapsed` should trigger an outage.
    ///
    /// Randomness is only consumed inside the window with a non-zero probability.
    pub fn should_fail(&mut self, elapsed: Duration) -> bool {
        if self.policy.probability <= 0.0 || !self.policy.window.contains(elapsed) {
            return false;
        }
        self.rng.gen_range(0.0..1.0) < self.policy.probability
    }
}
