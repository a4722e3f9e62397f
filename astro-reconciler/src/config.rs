//! Reconciler configuration
//!
//! # Environment variables
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | ASTRO_ORGANIZATION_ID | (none) | organization used when a declaration has none |
//! | ASTRO_POLL_INTERVAL_MS | 1000 | first wait between status checks |
//! | ASTRO_POLL_MAX_INTERVAL_MS | 30000 | cap for exponential backoff |
//! | ASTRO_POLL_BACKOFF | exponential | `fixed` or `exponential` |
//! | ASTRO_POLL_TIMEOUT_SECS | 2700 | convergence deadline |
//! | ASTRO_POLL_MAX_ATTEMPTS | (none) | status check budget |
//! | ASTRO_WAIT_ON_UPDATE | false | also wait for convergence after update |
//! | ASTRO_VALIDATE_DECLARATIONS | true | run worker queue checks before create/update |

use std::time::Duration;
use thiserror::Error;

use crate::error::Verb;
use crate::poller::{Backoff, PollPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Which verbs wait for the deployment to become healthy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePolicy {
    pub on_create: bool,
    pub on_update: bool,
}

impl ConvergencePolicy {
    /// Whether `verb` waits for the deployment to become healthy
    pub fn waits_after(&self, verb: Verb) -> bool {
        match verb {
            Verb::Create => self.on_create,
            Verb::Update => self.on_update,
            Verb::Read | Verb::Delete | Verb::Import => false,
        }
    }
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            on_create: true,
            on_update: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub default_organization_id: Option<String>,
    pub poll: PollPolicy,
    pub convergence: ConvergencePolicy,
    pub validate_declarations: bool,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            default_organization_id: None,
            poll: PollPolicy::default(),
            convergence: ConvergencePolicy::default(),
            validate_declarations: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl ReconcilerConfig {
    /// Load configuration from environment variables
    ///
    /// Unparseable numbers and flags fall back to their defaults; an unknown
    /// backoff strategy is an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let backoff = match std::env::var("ASTRO_POLL_BACKOFF") {
            Ok(raw) if !raw.trim().is_empty() => {
                raw.parse::<Backoff>()
                    .map_err(|reason| ConfigError::Invalid {
                        name: "ASTRO_POLL_BACKOFF",
                        reason,
                    })?
            }
            _ => defaults.poll.backoff,
        };

        let interval = env_parse("ASTRO_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll.interval);
        let max_interval = env_parse("ASTRO_POLL_MAX_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll.max_interval)
            .max(interval);

        Ok(Self {
            default_organization_id: std::env::var("ASTRO_ORGANIZATION_ID")
                .ok()
                .filter(|s| !s.is_empty()),
            poll: PollPolicy {
                interval,
                max_interval,
                backoff,
                timeout: env_parse("ASTRO_POLL_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.poll.timeout),
                max_attempts: env_parse("ASTRO_POLL_MAX_ATTEMPTS"),
            },
            convergence: ConvergencePolicy {
                on_create: true,
                on_update: env_parse("ASTRO_WAIT_ON_UPDATE")
                    .unwrap_or(defaults.convergence.on_update),
            },
            validate_declarations: env_parse("ASTRO_VALIDATE_DECLARATIONS")
                .unwrap_or(defaults.validate_declarations),
        })
    }

    pub fn with_default_organization(mut self, organization_id: impl Into<String>) -> Self {
        self.default_organization_id = Some(organization_id.into());
        self
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_convergence(mut self, convergence: ConvergencePolicy) -> Self {
        self.convergence = convergence;
        self
    }

    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validate_declarations = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ReconcilerConfig::default();
        assert!(config.convergence.on_create);
        assert!(!config.convergence.on_update);
        assert!(config.validate_declarations);
        assert_eq!(config.poll.interval, Duration::from_secs(1));
        assert_eq!(config.poll.backoff, Backoff::Exponential);
        assert!(config.default_organization_id.is_none());
    }

    #[test]
    fn test_builders() {
        let config = ReconcilerConfig::default()
            .with_default_organization("org-1")
            .with_validation(false)
            .with_convergence(ConvergencePolicy {
                on_create: true,
                on_update: true,
            });
        assert_eq!(config.default_organization_id.as_deref(), Some("org-1"));
        assert!(!config.validate_declarations);
        assert!(config.convergence.on_update);
    }

    #[test]
    fn test_waits_after_follows_policy() {
        let policy = ConvergencePolicy::default();
        assert!(policy.waits_after(Verb::Create));
        assert!(!policy.waits_after(Verb::Update));
        assert!(!policy.waits_after(Verb::Read));

        let symmetric = ConvergencePolicy {
            on_create: true,
            on_update: true,
        };
        assert!(symmetric.waits_after(Verb::Update));
        assert!(!symmetric.waits_after(Verb::Delete));
    }
}
