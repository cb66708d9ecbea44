//! Dual-model escalator
//!
//! Primary is always awaited to completion before the secondary is
//! considered; the two are never called concurrently for one request.

use async_trait::async_trait;
use futures::future::join;
use tracing::{debug, info, warn};

use super::{Decision, EscalationPolicy, EscalationReport, EscalationStage, PrimaryOutcome, decide};
use crate::adapter::{GenerateOptions, ModelAdapter, ModelResponse, RequestContext, SharedAdapter};
use crate::types::{Result, RouteError};

/// Primary/secondary adapter pair driven by an [`EscalationPolicy`]
pub struct QualityEscalator {
    primary: SharedAdapter,
    secondary: SharedAdapter,
    policy: EscalationPolicy,
    name: String,
}

impl std::fmt::Debug for QualityEscalator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityEscalator")
            .field("primary", &self.primary.name())
            .field("secondary", &self.secondary.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl QualityEscalator {
    pub fn new(primary: SharedAdapter, secondary: SharedAdapter, policy: EscalationPolicy) -> Self {
        let name = format!("{}+{}", primary.name(), secondary.name());
        Self {
            primary,
            secondary,
            policy,
            name,
        }
    }

    pub fn policy(&self) -> &EscalationPolicy {
        &self.policy
    }

    pub fn primary(&self) -> &SharedAdapter {
        &self.primary
    }

    pub fn secondary(&self) -> &SharedAdapter {
        &self.secondary
    }

    /// Run the state machine once, returning the result and the path taken
    pub async fn generate_with_report(
        &self,
        prompt: &str,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> (Result<ModelResponse>, EscalationReport) {
        let mut report = EscalationReport::default();

        report.enter(EscalationStage::TryPrimary);
        let primary_result = self.primary.generate(prompt, context, options).await;

        let outcome = match &primary_result {
            Ok(response) => {
                report.enter(EscalationStage::Evaluate);
                report.primary_score = response.score().map(|s| s.value());
                PrimaryOutcome::Scored(response.score())
            }
            Err(e) if e.is_fatal() => PrimaryOutcome::Misconfigured,
            Err(_) => PrimaryOutcome::Failed,
        };

        let decision = decide(&self.policy, outcome);
        report.decision = Some(decision);

        let result = match (primary_result, decision) {
            (Ok(response), Decision::Escalate { degraded }) => {
                let reason = format!(
                    "quality score {} below threshold {}",
                    response.score().map(|s| s.value()).unwrap_or_default(),
                    self.policy.auto_polish_threshold
                );
                info!(
                    primary = %self.primary.name(),
                    secondary = %self.secondary.name(),
                    score = ?report.primary_score,
                    threshold = self.policy.auto_polish_threshold,
                    "Escalating to secondary"
                );
                self.escalate(prompt, context, options, degraded, reason, &mut report)
                    .await
            }
            (Ok(response), _) => {
                report.enter(EscalationStage::Accept);
                report.reason = Some(match response.score() {
                    Some(score) => format!(
                        "score {} meets threshold {}",
                        score, self.policy.auto_polish_threshold
                    ),
                    None => "no quality score reported".to_string(),
                });
                debug!(primary = %self.primary.name(), score = ?report.primary_score, "Accepted primary response");
                report.served_by = Some(response.provider().to_string());
                Ok(response)
            }
            (Err(e), Decision::Escalate { degraded }) => {
                info!(
                    primary = %self.primary.name(),
                    secondary = %self.secondary.name(),
                    error = %e,
                    "Primary failed, falling back to secondary"
                );
                self.escalate(prompt, context, options, degraded, e.to_string(), &mut report)
                    .await
            }
            (Err(e), _) => {
                report.reason = Some(e.to_string());
                warn!(primary = %self.primary.name(), error = %e, "Primary failed, not escalating");
                Err(e)
            }
        };

        report.enter(EscalationStage::Done);
        (result, report)
    }

    async fn escalate(
        &self,
        prompt: &str,
        context: &RequestContext,
        options: &GenerateOptions,
        degraded: bool,
        primary_failure: String,
        report: &mut EscalationReport,
    ) -> Result<ModelResponse> {
        report.enter(EscalationStage::EscalateSecondary);
        report.reason = Some(primary_failure.clone());

        match self.secondary.generate(prompt, context, options).await {
            Ok(response) => {
                report.served_by = Some(response.provider().to_string());
                if degraded {
                    Ok(response.into_degraded())
                } else {
                    Ok(response)
                }
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(secondary = %self.secondary.name(), error = %e, "Secondary failed, escalation exhausted");
                Err(RouteError::exhausted(primary_failure, &e))
            }
        }
    }
}

#[async_trait]
impl ModelAdapter for QualityEscalator {
    async fn initialize(&self) -> bool {
        let (primary_ok, secondary_ok) =
            join(self.primary.initialize(), self.secondary.initialize()).await;
        if !primary_ok || !secondary_ok {
            warn!(primary_ok, secondary_ok, soft_fallback = self.policy.soft_fallback, "Escalator initialized partially");
        }
        if self.policy.soft_fallback {
            primary_ok || secondary_ok
        } else {
            primary_ok && secondary_ok
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        context: &RequestContext,
        options: &GenerateOptions,
    ) -> Result<ModelResponse> {
        self.generate_with_report(prompt, context, options).await.0
    }

    async fn health_check(&self) -> bool {
        let (primary_ok, secondary_ok) =
            join(self.primary.health_check(), self.secondary.health_check()).await;
        if self.policy.soft_fallback {
            primary_ok || secondary_ok
        } else {
            primary_ok && secondary_ok
        }
    }

    /// Always cleans up both adapters; failures are logged, not returned
    async fn cleanup(&self) -> Result<()> {
        let (primary, secondary) = join(self.primary.cleanup(), self.secondary.cleanup()).await;
        for (name, result) in [
            (self.primary.name(), primary),
            (self.secondary.name(), secondary),
        ] {
            if let Err(e) = result {
                warn!(endpoint = %name, error = %e, "Adapter cleanup failed");
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        self.primary.model()
    }
}
