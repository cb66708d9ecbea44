//! Quality Escalation
//!
//! Per-request state machine over a primary/secondary adapter pair:
//!
//! ```text
//! TRY_PRIMARY -> EVALUATE -> ACCEPT -------------> DONE
//!                        \-> ESCALATE_SECONDARY -> DONE
//! TRY_PRIMARY (failed, soft) -> ESCALATE_SECONDARY -> DONE
//! TRY_PRIMARY (failed, strict) -> DONE
//! ```
//!
//! The decision itself is the pure function [`decide`]; the escalator only
//! performs the calls it prescribes.

mod escalator;

pub use escalator::QualityEscalator;

use serde::Serialize;

use crate::adapter::QualityScore;
use crate::constants::escalation as esc_constants;
use crate::types::{Result, RouteError};

// =============================================================================
// Policy
// =============================================================================

/// Escalation settings, fixed for an escalator's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EscalationPolicy {
    /// Primary scores strictly below this are escalated
    pub auto_polish_threshold: f64,
    /// Tolerate a failing primary by switching to the secondary
    pub soft_fallback: bool,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            auto_polish_threshold: esc_constants::DEFAULT_AUTO_POLISH_THRESHOLD,
            soft_fallback: true,
        }
    }
}

impl EscalationPolicy {
    pub fn new(auto_polish_threshold: f64, soft_fallback: bool) -> Result<Self> {
        if !auto_polish_threshold.is_finite()
            || !(esc_constants::MIN_SCORE..=esc_constants::MAX_SCORE)
                .contains(&auto_polish_threshold)
        {
            return Err(RouteError::Config(format!(
                "auto_polish_threshold must be within [{}, {}], got {}",
                esc_constants::MIN_SCORE,
                esc_constants::MAX_SCORE,
                auto_polish_threshold
            )));
        }
        Ok(Self {
            auto_polish_threshold,
            soft_fallback,
        })
    }
}

// =============================================================================
// Decision
// =============================================================================

/// What the primary call produced, reduced to what the decision needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PrimaryOutcome {
    /// Succeeded, with or without a quality score
    Scored(Option<QualityScore>),
    /// Failed at transport or provider level
    Failed,
    /// Failed because of a deployment mistake
    Misconfigured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// Return the primary response unchanged
    Accept,
    /// Call the secondary; `degraded` marks a fallback after primary failure
    Escalate { degraded: bool },
    /// Return the primary failure unchanged
    Propagate,
}

/// Decide the next step after the primary call.
///
/// A missing score is accepted. The threshold comparison is strict: a score
/// equal to the threshold is accepted.
pub fn decide(policy: &EscalationPolicy, primary: PrimaryOutcome) -> Decision {
    match primary {
        PrimaryOutcome::Misconfigured => Decision::Propagate,
        PrimaryOutcome::Failed if policy.soft_fallback => Decision::Escalate { degraded: true },
        PrimaryOutcome::Failed => Decision::Propagate,
        PrimaryOutcome::Scored(Some(score)) if score.value() < policy.auto_polish_threshold => {
            Decision::Escalate { degraded: false }
        }
        PrimaryOutcome::Scored(_) => Decision::Accept,
    }
}

// =============================================================================
// Report
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscalationStage {
    TryPrimary,
    Evaluate,
    Accept,
    EscalateSecondary,
    Done,
}

impl std::fmt::Display for EscalationStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TryPrimary => write!(f, "TRY_PRIMARY"),
            Self::Evaluate => write!(f, "EVALUATE"),
            Self::Accept => write!(f, "ACCEPT"),
            Self::EscalateSecondary => write!(f, "ESCALATE_SECONDARY"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

/// Path taken through the state machine for one request
#[derive(Debug, Clone, Default, Serialize)]
pub struct EscalationReport {
    pub stages: Vec<EscalationStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub served_by: Option<String>,
}

impl EscalationReport {
    fn enter(&mut self, stage: EscalationStage) {
        self.stages.push(stage);
    }

    pub fn escalated(&self) -> bool {
        self.stages.contains(&EscalationStage::EscalateSecondary)
    }

    /// `TRY_PRIMARY -> EVALUATE -> ... -> DONE`
    pub fn path(&self) -> String {
        self.stages
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(v: f64) -> PrimaryOutcome {
        PrimaryOutcome::Scored(Some(QualityScore::new(v).unwrap()))
    }

    #[test]
    fn test_decide_accepts_high_score() {
        let policy = EscalationPolicy::default();
        assert_eq!(decide(&policy, score(77.0)), Decision::Accept);
    }

    #[test]
    fn test_decide_escalates_low_score() {
        let policy = EscalationPolicy::default();
        assert_eq!(
            decide(&policy, score(50.0)),
            Decision::Escalate { degraded: false }
        );
    }

    #[test]
    fn test_decide_threshold_boundary_is_strict() {
        let policy = EscalationPolicy::new(70.0, true).unwrap();
        assert_eq!(decide(&policy, score(70.0)), Decision::Accept);
        assert_eq!(
            decide(&policy, score(69.999)),
            Decision::Escalate { degraded: false }
        );
    }

    #[test]
    fn test_decide_missing_score_accepts() {
        let policy = EscalationPolicy::new(100.0, true).unwrap();
        assert_eq!(decide(&policy, PrimaryOutcome::Scored(None)), Decision::Accept);
    }

    #[test]
    fn test_decide_failure_modes() {
        let soft = EscalationPolicy::new(70.0, true).unwrap();
        let strict = EscalationPolicy::new(70.0, false).unwrap();
        assert_eq!(
            decide(&soft, PrimaryOutcome::Failed),
            Decision::Escalate { degraded: true }
        );
        assert_eq!(decide(&strict, PrimaryOutcome::Failed), Decision::Propagate);
        assert_eq!(decide(&soft, PrimaryOutcome::Misconfigured), Decision::Propagate);
    }

    #[test]
    fn test_policy_rejects_out_of_range_threshold() {
        assert!(EscalationPolicy::new(-1.0, true).is_err());
        assert!(EscalationPolicy::new(100.5, true).is_err());
        assert!(EscalationPolicy::new(f64::NAN, true).is_err());
        assert!(EscalationPolicy::new(0.0, false).is_ok());
    }

    #[test]
    fn test_report_path() {
        let mut report = EscalationReport::default();
        report.enter(EscalationStage::TryPrimary);
        report.enter(EscalationStage::Evaluate);
        report.enter(EscalationStage::Accept);
        report.enter(EscalationStage::Done);
        assert_eq!(report.path(), "TRY_PRIMARY -> EVALUATE -> ACCEPT -> DONE");
        assert!(!report.escalated());
    }
}
