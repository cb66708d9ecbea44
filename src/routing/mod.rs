//! Capability Routing
//!
//! Maps a task type to the ordered list of endpoints that may serve it.
//! Routes are computed per request from static configuration and never
//! cached, so routing stays deterministic and side-effect free.

mod router;

pub use router::{CapabilityRouter, RouterPolicy};

use serde::{Deserialize, Serialize};

use crate::constants::routing as routing_constants;
use crate::types::EndpointId;

/// Capability wildcard matching every task
pub const ANY_TASK: &str = "*";

/// Ordered endpoints considered for one task.
///
/// Contains only configured endpoints, each at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub task: String,
    pub endpoints: Vec<EndpointId>,
}

impl Route {
    pub fn first(&self) -> Option<&EndpointId> {
        self.endpoints.first()
    }

    pub fn starts_with(&self, id: &EndpointId) -> bool {
        self.first() == Some(id)
    }

    pub fn contains(&self, id: &EndpointId) -> bool {
        self.endpoints.contains(id)
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.endpoints.iter().map(|id| id.as_str()).collect();
        write!(f, "{} -> [{}]", self.task, ids.join(", "))
    }
}

/// Routing metadata for one configured endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub endpoint: EndpointId,
    /// Tasks this endpoint serves; `*` matches any task
    pub tasks: Vec<String>,
    /// Lower tiers are tried first
    pub priority: u8,
    /// Relative cost score, lower is cheaper
    pub cost: f64,
}

impl CapabilityEntry {
    pub fn new(endpoint: impl Into<EndpointId>) -> Self {
        Self {
            endpoint: endpoint.into(),
            tasks: Vec::new(),
            priority: routing_constants::DEFAULT_PRIORITY,
            cost: 0.0,
        }
    }

    pub fn with_tasks<I, S>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tasks = tasks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = cost;
        self
    }

    pub fn serves(&self, task: &str) -> bool {
        self.tasks
            .iter()
            .any(|t| t == ANY_TASK || t.eq_ignore_ascii_case(task))
    }
}
