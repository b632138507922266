//! Execution budget bounding the toolchain commands of one build attempt.
//!
//! A budget is a cancellation token plus an optional deadline. Every
//! subcommand of a build runs under the same budget, so the total wall-clock
//! cost of the build is bounded no matter how many steps the toolchain has.

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a budget stopped a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    DeadlineExceeded,
    Cancelled,
}

impl fmt::Display for Interruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interruption::DeadlineExceeded => f.write_str("build deadline exceeded"),
            Interruption::Cancelled => f.write_str("build cancelled"),
        }
    }
}

/// Shared cancellation scope for one build attempt. Clones share state.
#[derive(Debug, Clone)]
pub struct ExecutionBudget {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl ExecutionBudget {
    /// A budget that only ends through explicit cancellation.
    pub fn unbounded() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A budget ending `timeout` from now. A timeout too large to represent
    /// as an instant leaves the budget without a deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => Self::with_deadline(deadline),
            None => Self::unbounded(),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Use an externally owned token, e.g. one cancelled on shutdown.
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Derive a budget with the same deadline, cancelled whenever this one is.
    /// Cancelling the child leaves the parent running.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Time left before the deadline, `None` if there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Non-blocking check. Cancellation is reported ahead of the deadline.
    pub fn interruption(&self) -> Option<Interruption> {
        if self.token.is_cancelled() {
            return Some(Interruption::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(Interruption::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.interruption().is_some()
    }

    /// Resolves once the budget is exhausted.
    pub async fn expired(&self) -> Interruption {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Interruption::Cancelled,
                    _ = tokio::time::sleep_until(deadline) => Interruption::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                Interruption::Cancelled
            }
        }
    }
}

impl Default for ExecutionBudget {
    fn default() -> Self {
        Self::unbounded()
    }
}
