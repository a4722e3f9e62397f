//! Worker Queue Model

use serde::{Deserialize, Serialize};

/// Worker queue declared inside a deployment
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorkerQueueSpec {
    /// Assigned by the control plane once the queue exists remotely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Machine class, e.g. "A5"
    pub astro_machine: String,
    pub is_default: bool,
    pub min_worker_count: i64,
    pub max_worker_count: i64,
    pub worker_concurrency: i64,
}

impl WorkerQueueSpec {
    pub fn new(name: impl Into<String>, astro_machine: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            astro_machine: astro_machine.into(),
            ..Default::default()
        }
    }

    pub fn with_default(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn with_workers(mut self, min: i64, max: i64) -> Self {
        self.min_worker_count = min;
        self.max_worker_count = max;
        self
    }

    pub fn with_concurrency(mut self, concurrency: i64) -> Self {
        self.worker_concurrency = concurrency;
        self
    }
}

/// Worker queue payload (create/update requests and remote responses)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerQueuePayload {
    /// Only sent on update, so the control plane can match existing queues
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub astro_machine: String,
    pub is_default: bool,
    pub min_worker_count: i64,
    pub max_worker_count: i64,
    pub worker_concurrency: i64,
}
