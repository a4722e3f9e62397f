//! Convergence poller
//!
//! Waits for an asynchronously provisioned deployment to reach a terminal
//! status. The first check happens immediately; later checks are spaced by
//! the policy's backoff. The wait always ends: on a ready status, on a
//! failed status, on a poll error, at the deadline, after `max_attempts`
//! checks, or when the caller cancels.

use astro_client::{ClientError, ClientResult};
use shared::{DeploymentStatus, RemoteDeployment};
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Spacing between status checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    Fixed,
    /// Doubles after every check, capped at `max_interval`
    Exponential,
}

impl FromStr for Backoff {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown backoff strategy '{other}'")),
        }
    }
}

/// Bounds for one convergence wait
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    pub backoff: Backoff,
    /// Wall-clock bound measured from the first check
    pub timeout: Duration,
    pub max_attempts: Option<u32>,
}

impl PollPolicy {
    /// Fixed spacing with the given deadline
    pub fn fixed(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff: Backoff::Fixed,
            timeout,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Wait after the `checks`-th check (1-based)
    pub fn delay(&self, checks: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(checks.saturating_sub(1));
                self.interval
                    .checked_mul(factor)
                    .unwrap_or(self.max_interval)
                    .min(self.max_interval)
            }
        }
    }
}

impl Default for PollPolicy {
    /// 1s doubling to 30s, 45 minute deadline
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            backoff: Backoff::Exponential,
            timeout: Duration::from_secs(45 * 60),
            max_attempts: None,
        }
    }
}

/// How a status affects the wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready,
    Failed,
}

/// Default status classification
///
/// DEGRADED and unrecognised statuses keep the wait going; the deadline
/// bounds them.
pub fn classify_status(status: &DeploymentStatus) -> Readiness {
    match status {
        DeploymentStatus::Healthy => Readiness::Ready,
        DeploymentStatus::Unhealthy
        | DeploymentStatus::Error
        | DeploymentStatus::Failed
        | DeploymentStatus::Deleted => Readiness::Failed,
        DeploymentStatus::Creating
        | DeploymentStatus::Deploying
        | DeploymentStatus::Provisioning
        | DeploymentStatus::Degraded
        | DeploymentStatus::Unknown(_) => Readiness::Pending,
    }
}

/// Why a convergence wait ended without a ready deployment
#[derive(Debug, Error)]
pub enum PollFailure {
    #[error("not ready after {attempts} checks in {elapsed:?}")]
    Timeout {
        attempts: u32,
        elapsed: Duration,
        last: Option<RemoteDeployment>,
    },

    #[error("wait cancelled after {attempts} checks")]
    Cancelled {
        attempts: u32,
        last: Option<RemoteDeployment>,
    },

    #[error("control plane reported status {} after {attempts} checks", .last.status)]
    TerminalFailure {
        attempts: u32,
        last: RemoteDeployment,
    },

    #[error("status check {attempts} failed: {source}")]
    Remote {
        attempts: u32,
        source: ClientError,
        last: Option<RemoteDeployment>,
    },
}

impl PollFailure {
    /// Number of status checks made
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Timeout { attempts, .. }
            | Self::Cancelled { attempts, .. }
            | Self::TerminalFailure { attempts, .. }
            | Self::Remote { attempts, .. } => *attempts,
        }
    }

    /// Last remote record seen before the wait ended
    pub fn last_observed(&self) -> Option<&RemoteDeployment> {
        match self {
            Self::Timeout { last, .. } | Self::Cancelled { last, .. } | Self::Remote { last, .. } => {
                last.as_ref()
            }
            Self::TerminalFailure { last, .. } => Some(last),
        }
    }

    pub(crate) fn into_client_error(self) -> Option<ClientError> {
        match self {
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Poll until `classify` reports the deployment ready
///
/// `poll` fetches the current record for `identity`. Poll errors are never
/// retried; they end the wait as [`PollFailure::Remote`].
#[instrument(skip(policy, cancel, poll, classify))]
pub async fn await_ready<F, Fut, K>(
    identity: &str,
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut poll: F,
    classify: K,
) -> Result<RemoteDeployment, PollFailure>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ClientResult<RemoteDeployment>>,
    K: Fn(&DeploymentStatus) -> Readiness,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut attempts: u32 = 0;
    let mut last: Option<RemoteDeployment> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(PollFailure::Cancelled { attempts, last });
        }
        if attempts > 0 && Instant::now() >= deadline {
            warn!(attempts, "convergence deadline reached");
            return Err(PollFailure::Timeout {
                attempts,
                elapsed: started.elapsed(),
                last,
            });
        }

        attempts += 1;
        let fetched = tokio::select! {
            _ = cancel.cancelled() => return Err(PollFailure::Cancelled { attempts, last }),
            result = tokio::time::timeout_at(deadline, poll(identity.to_string())) => result,
        };

        let remote = match fetched {
            Ok(Ok(remote)) => remote,
            Ok(Err(source)) => {
                warn!(attempts, error = %source, "status check failed");
                return Err(PollFailure::Remote {
                    attempts,
                    source,
                    last,
                });
            }
            Err(_) => {
                warn!(attempts, "status check outlived the deadline");
                return Err(PollFailure::Timeout {
                    attempts,
                    elapsed: started.elapsed(),
                    last,
                });
            }
        };

        match classify(&remote.status) {
            Readiness::Ready => {
                info!(attempts, status = %remote.status, "deployment ready");
                return Ok(remote);
            }
            Readiness::Failed => {
                warn!(attempts, status = %remote.status, "deployment entered a failed status");
                return Err(PollFailure::TerminalFailure {
                    attempts,
                    last: remote,
                });
            }
            Readiness::Pending => {
                debug!(attempts, status = %remote.status, "deployment not ready yet");
                last = Some(remote);
            }
        }

        if policy.max_attempts.is_some_and(|max| attempts >= max) {
            warn!(attempts, "convergence attempt budget exhausted");
            return Err(PollFailure::Timeout {
                attempts,
                elapsed: started.elapsed(),
                last,
            });
        }

        let wake = (Instant::now() + policy.delay(attempts)).min(deadline);
        tokio::select! {
            _ = cancel.cancelled() => return Err(PollFailure::Cancelled { attempts, last }),
            _ = tokio::time::sleep_until(wake) => {}
        }
    }
}
