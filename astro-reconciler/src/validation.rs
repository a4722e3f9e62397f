//! Declaration checks run before create and update
//!
//! The control plane enforces none of these on our behalf; problems found
//! here are reported as `InvalidDeclaration` without any remote call.

use shared::DeclaredDeployment;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    MultipleDefaultQueues(Vec<String>),
    NegativeWorkerCount { queue: String },
    WorkerBoundsInverted { queue: String, min: i64, max: i64 },
    DuplicateQueueName(String),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleDefaultQueues(names) => {
                write!(f, "more than one default worker queue: {}", names.join(", "))
            }
            Self::NegativeWorkerCount { queue } => {
                write!(f, "worker queue '{queue}' has a negative worker count")
            }
            Self::WorkerBoundsInverted { queue, min, max } => write!(
                f,
                "worker queue '{queue}' has min_worker_count {min} above max_worker_count {max}"
            ),
            Self::DuplicateQueueName(name) => write!(f, "worker queue '{name}' declared twice"),
        }
    }
}

/// Check worker queue invariants, collecting every violation
pub fn validate(declared: &DeclaredDeployment) -> Result<(), Vec<Violation>> {
    let mut violations = Vec::new();

    let defaults: Vec<String> = declared
        .worker_queues
        .iter()
        .filter(|q| q.is_default)
        .map(|q| q.name.clone())
        .collect();
    if defaults.len() > 1 {
        violations.push(Violation::MultipleDefaultQueues(defaults));
    }

    let mut seen = HashSet::new();
    for queue in &declared.worker_queues {
        if !seen.insert(queue.name.as_str()) {
            violations.push(Violation::DuplicateQueueName(queue.name.clone()));
        }
        if queue.min_worker_count < 0 || queue.max_worker_count < 0 {
            violations.push(Violation::NegativeWorkerCount {
                queue: queue.name.clone(),
            });
        } else if queue.min_worker_count > queue.max_worker_count {
            violations.push(Violation::WorkerBoundsInverted {
                queue: queue.name.clone(),
                min: queue.min_worker_count,
                max: queue.max_worker_count,
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

/// One-line summary for error messages
pub fn describe(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
