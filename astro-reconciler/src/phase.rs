//! Per-invocation lifecycle phases
//!
//! `Pending -> InFlight -> {Converging -> Done} | Failed`

use std::fmt;
use tracing::{debug, warn};

use crate::error::{ReconcileError, Verb};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Pending,
    InFlight,
    Converging,
    Done,
    Failed,
}

impl Phase {
    pub fn can_advance_to(self, next: Phase) -> bool {
        matches!(
            (self, next),
            (Phase::Pending, Phase::InFlight)
                | (Phase::Pending, Phase::Failed)
                | (Phase::InFlight, Phase::Converging)
                | (Phase::InFlight, Phase::Done)
                | (Phase::InFlight, Phase::Failed)
                | (Phase::Converging, Phase::Done)
                | (Phase::Converging, Phase::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Pending => "pending",
            Phase::InFlight => "in-flight",
            Phase::Converging => "converging",
            Phase::Done => "done",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Phase tracker for one lifecycle call
#[derive(Debug)]
pub(crate) struct Lifecycle {
    verb: Verb,
    phase: Phase,
}

impl Lifecycle {
    pub(crate) fn start(verb: Verb) -> Self {
        Self {
            verb,
            phase: Phase::Pending,
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "{} cannot go from {} to {}",
            self.verb,
            self.phase,
            next
        );
        debug!(verb = %self.verb, from = %self.phase, to = %next, "phase change");
        self.phase = next;
    }

    /// Move to `Failed` and hand the error back
    pub(crate) fn fail(&mut self, err: ReconcileError) -> ReconcileError {
        warn!(verb = %self.verb, kind = %err.kind, identity = ?err.identity, "{}", err.message);
        self.advance(Phase::Failed);
        err
    }
}
