//! Capability Router
//!
//! ## Strategy
//!
//! 1. Fast-path task with a primary endpoint: primary first, then the fallback
//! 2. Any other task: the fallback endpoint
//! 3. Neither available: configuration error (never swallowed)
//! 4. Append remaining capable endpoints by (priority, cost), without duplicates

use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::{CapabilityEntry, Route};
use crate::adapter::RequestContext;
use crate::constants::routing as routing_constants;
use crate::types::{EndpointId, Result, RouteError};

/// Primary/fallback designation and the fast-path task set
#[derive(Debug, Clone, PartialEq)]
pub struct RouterPolicy {
    pub primary: Option<EndpointId>,
    pub fallback: Option<EndpointId>,
    pub fast_path_tasks: BTreeSet<String>,
}

impl Default for RouterPolicy {
    fn default() -> Self {
        Self {
            primary: Some(EndpointId::from(routing_constants::PRIMARY_ID)),
            fallback: Some(EndpointId::from(routing_constants::SECONDARY_ID)),
            fast_path_tasks: routing_constants::DEFAULT_FAST_PATH_TASKS
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

/// Task-to-endpoint routing over a fixed set of configured endpoints
#[derive(Debug, Clone)]
pub struct CapabilityRouter {
    policy: RouterPolicy,
    entries: Vec<CapabilityEntry>,
}

impl CapabilityRouter {
    /// Build a router. `entries` defines the configured endpoint set; a
    /// primary or fallback naming anything else is dropped with a warning.
    pub fn new(mut policy: RouterPolicy, entries: Vec<CapabilityEntry>) -> Self {
        let is_configured =
            |id: &EndpointId| entries.iter().any(|entry| &entry.endpoint == id);

        for (role, slot) in [
            ("primary", &mut policy.primary),
            ("fallback", &mut policy.fallback),
        ] {
            if let Some(id) = slot.as_ref()
                && !is_configured(id)
            {
                warn!(role, endpoint = %id, "Routing references an unconfigured endpoint; ignoring");
                *slot = None;
            }
        }

        policy.fast_path_tasks = policy
            .fast_path_tasks
            .into_iter()
            .map(|t| t.to_ascii_lowercase())
            .collect();

        Self { policy, entries }
    }

    pub fn policy(&self) -> &RouterPolicy {
        &self.policy
    }

    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }

    pub fn primary(&self) -> Option<&EndpointId> {
        self.policy.primary.as_ref()
    }

    pub fn fallback(&self) -> Option<&EndpointId> {
        self.policy.fallback.as_ref()
    }

    pub fn is_fast_path(&self, task: &str) -> bool {
        self.policy
            .fast_path_tasks
            .contains(&task.to_ascii_lowercase())
    }

    /// Endpoints declaring `task_type`, by ascending priority tier then
    /// ascending cost
    pub fn top_candidates_for(&self, task_type: &str) -> Vec<EndpointId> {
        let mut capable: Vec<&CapabilityEntry> =
            self.entries.iter().filter(|e| e.serves(task_type)).collect();

        capable.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.cost.total_cmp(&b.cost))
        });

        capable.into_iter().map(|e| e.endpoint.clone()).collect()
    }

    /// Resolve the route for `task`
    pub fn choose_model(&self, task: &str, _context: &RequestContext) -> Result<Route> {
        let mut endpoints: Vec<EndpointId> = Vec::new();

        match (self.is_fast_path(task), self.primary(), self.fallback()) {
            (true, Some(primary), fallback) => {
                endpoints.push(primary.clone());
                if let Some(fallback) = fallback.filter(|f| *f != primary) {
                    endpoints.push(fallback.clone());
                }
            }
            (_, _, Some(fallback)) => endpoints.push(fallback.clone()),
            _ => return Err(RouteError::Config("no endpoints configured".to_string())),
        }

        for candidate in self.top_candidates_for(task) {
            if !endpoints.contains(&candidate) {
                endpoints.push(candidate);
            }
        }

        let route = Route {
            task: task.to_string(),
            endpoints,
        };
        debug!(route = %route, "Resolved route");
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(primary: Option<&str>, fallback: Option<&str>) -> RouterPolicy {
        RouterPolicy {
            primary: primary.map(EndpointId::from),
            fallback: fallback.map(EndpointId::from),
            ..RouterPolicy::default()
        }
    }

    fn two_endpoint_router() -> CapabilityRouter {
        CapabilityRouter::new(
            policy(Some("primary"), Some("secondary")),
            vec![
                CapabilityEntry::new("primary"),
                CapabilityEntry::new("secondary"),
            ],
        )
    }

    fn ids(route: &Route) -> Vec<&str> {
        route.endpoints.iter().map(|id| id.as_str()).collect()
    }

    #[test]
    fn test_fast_path_prefers_primary() {
        let router = two_endpoint_router();
        for task in ["chat", "summarize", "CLASSIFY"] {
            let route = router.choose_model(task, &RequestContext::new()).unwrap();
            assert_eq!(ids(&route), vec!["primary", "secondary"]);
        }
    }

    #[test]
    fn test_other_tasks_use_fallback() {
        let router = two_endpoint_router();
        let route = router
            .choose_model("codegen", &RequestContext::new())
            .unwrap();
        assert_eq!(ids(&route), vec!["secondary"]);
    }

    #[test]
    fn test_no_fallback_is_config_error() {
        let router = CapabilityRouter::new(
            policy(Some("primary"), None),
            vec![CapabilityEntry::new("primary")],
        );
        let err = router
            .choose_model("codegen", &RequestContext::new())
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("no endpoints configured"));

        // Fast-path still works with only a primary
        let route = router.choose_model("chat", &RequestContext::new()).unwrap();
        assert_eq!(ids(&route), vec!["primary"]);
    }

    #[test]
    fn test_fast_path_without_primary_uses_fallback() {
        let router = CapabilityRouter::new(
            policy(None, Some("secondary")),
            vec![CapabilityEntry::new("secondary")],
        );
        let route = router.choose_model("chat", &RequestContext::new()).unwrap();
        assert_eq!(ids(&route), vec!["secondary"]);
    }

    #[test]
    fn test_unconfigured_references_are_dropped() {
        let router = CapabilityRouter::new(
            policy(Some("ghost"), Some("secondary")),
            vec![CapabilityEntry::new("secondary")],
        );
        assert!(router.primary().is_none());
        let route = router.choose_model("chat", &RequestContext::new()).unwrap();
        assert_eq!(ids(&route), vec!["secondary"]);
    }

    #[test]
    fn test_top_candidates_order() {
        let router = CapabilityRouter::new(
            RouterPolicy::default(),
            vec![
                CapabilityEntry::new("expensive")
                    .with_tasks(["codegen"])
                    .with_priority(1)
                    .with_cost(9.0),
                CapabilityEntry::new("cheap")
                    .with_tasks(["codegen"])
                    .with_priority(1)
                    .with_cost(0.5),
                CapabilityEntry::new("backup").with_tasks(["*"]).with_priority(5),
                CapabilityEntry::new("unrelated").with_tasks(["chat"]),
            ],
        );
        let candidates = router.top_candidates_for("codegen");
        let names: Vec<&str> = candidates.iter().map(|id| id.as_str()).collect();
        assert_eq!(names, vec!["cheap", "expensive", "backup"]);
    }

    #[test]
    fn test_capable_endpoints_appended_without_duplicates() {
        let router = CapabilityRouter::new(
            policy(Some("primary"), Some("secondary")),
            vec![
                CapabilityEntry::new("primary").with_tasks(["chat"]).with_priority(0),
                CapabilityEntry::new("secondary").with_tasks(["*"]),
                CapabilityEntry::new("tertiary").with_tasks(["chat"]).with_priority(2),
            ],
        );
        let route = router.choose_model("chat", &RequestContext::new()).unwrap();
        assert_eq!(ids(&route), vec!["primary", "secondary", "tertiary"]);
    }

    #[test]
    fn test_same_primary_and_fallback_not_duplicated() {
        let router = CapabilityRouter::new(
            policy(Some("primary"), Some("primary")),
            vec![
                CapabilityEntry::new("primary").with_tasks(["*"]),
                CapabilityEntry::new("secondary").with_tasks(["chat"]),
            ],
        );

        let route = router.choose_model("chat", &RequestContext::new()).unwrap();
        assert_eq!(ids(&route), vec!["primary", "secondary"]);

        let route = router.choose_model("codegen", &RequestContext::new()).unwrap();
        assert_eq!(ids(&route), vec!["primary"]);
    }

    #[test]
    fn test_no_endpoints_at_all() {
        let router = CapabilityRouter::new(RouterPolicy::default(), Vec::new());
        assert!(router.choose_model("chat", &RequestContext::new()).is_err());
    }
}
