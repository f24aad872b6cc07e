//! Liveness bookkeeping for a session.
//!
//! A session trusts its connection while it has been active within the idle
//! budget. Past the budget the connection is `Stale` and must be probed before use;
//! a failed probe means `Dead`, and the session reconnects.
//!
//! ```text
//! Disconnected --connect--> Fresh --budget elapses--> Stale --probe--> Live  -> Fresh
//!                                                              \-> Dead  -> reconnect
//! ```

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Threshold assumed when the driver cannot report one.
pub const DEFAULT_FALLBACK_SERVER_TIMEOUT: Duration = Duration::from_secs(300);

/// Share of the server threshold used as the local budget by default.
pub const DEFAULT_IDLE_FRACTION: f64 = 0.5;

/// How the local idle budget is derived from the server's idle-disconnect threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleBudget {
    /// A share of the server threshold, in `(0, 1]`.
    Fraction(f64),
    /// The server threshold as reported.
    ServerValue,
    /// Ignore the server and use this budget.
    Fixed(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdlePolicy {
    pub budget: IdleBudget,
    /// Server threshold to assume when the driver reports none.
    pub fallback: Duration,
}

impl Default for IdlePolicy {
    fn default() -> Self {
        Self {
            budget: IdleBudget::Fraction(DEFAULT_IDLE_FRACTION),
            fallback: DEFAULT_FALLBACK_SERVER_TIMEOUT,
        }
    }
}

impl IdlePolicy {
    #[must_use]
    pub fn fraction(fraction: f64) -> Self {
        Self {
            budget: IdleBudget::Fraction(fraction),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn server_value() -> Self {
        Self {
            budget: IdleBudget::ServerValue,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn fixed(budget: Duration) -> Self {
        Self {
            budget: IdleBudget::Fixed(budget),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Duration) -> Self {
        self.fallback = fallback;
        self
    }

    /// Local budget for a reported server threshold (`None` when not reported).
    #[must_use]
    pub fn budget_for(&self, server_timeout: Option<Duration>) -> Duration {
        let server = server_timeout.unwrap_or(self.fallback);
        match self.budget {
            IdleBudget::Fraction(f) if f.is_finite() && f > 0.0 => server.mul_f64(f.min(1.0)),
            IdleBudget::Fraction(_) => Duration::ZERO,
            IdleBudget::ServerValue => server,
            IdleBudget::Fixed(budget) => budget,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        match self.budget {
            IdleBudget::Fraction(f) => f.is_finite() && f > 0.0 && f <= 1.0,
            IdleBudget::ServerValue | IdleBudget::Fixed(_) => true,
        }
    }
}

/// Where the session stands before a query-class call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LivenessState {
    /// No handle is held.
    Disconnected,
    /// Used within the idle budget; no probe needed.
    Fresh,
    /// Idle past the budget; probe before use.
    Stale,
}

/// Result of probing a `Stale` connection.
#[derive(Debug)]
pub(crate) enum ProbeOutcome {
    Live,
    Dead(crate::error::DriverError),
}

/// Last confirmed activity and the budget it is trusted for.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Liveness {
    last_activity: Option<Instant>,
    idle_budget: Duration,
}

impl Liveness {
    pub(crate) fn disconnected() -> Self {
        Self {
            last_activity: None,
            idle_budget: Duration::ZERO,
        }
    }

    pub(crate) fn connected(now: Instant, idle_budget: Duration) -> Self {
        Self {
            last_activity: Some(now),
            idle_budget,
        }
    }

    pub(crate) fn state_at(&self, now: Instant) -> LivenessState {
        match self.last_activity {
            None => LivenessState::Disconnected,
            Some(last) if now.saturating_duration_since(last) < self.idle_budget => {
                LivenessState::Fresh
            }
            Some(_) => LivenessState::Stale,
        }
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        if self.last_activity.is_some() {
            self.last_activity = Some(now);
        }
    }

    pub(crate) fn idle_budget(&self) -> Duration {
        self.idle_budget
    }

    pub(crate) fn last_activity(&self) -> Option<Instant> {
        self.last_activity
    }
}
