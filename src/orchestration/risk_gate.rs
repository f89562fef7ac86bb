//! # Risk Gate
//!
//! Pure decision function consulted by the dispatcher right before a ready
//! task is handed to a worker. A deferral is indefinite: the gate never
//! escalates or re-runs on its own.

use crate::config::RiskGateConfig;
use crate::constants::reasons;
use crate::models::{RiskLevel, Task};
use serde::{Deserialize, Serialize};

/// Outcome of gating a ready task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    ApproveLive,
    ApproveDryRun,
    Defer { reason: String },
}

impl GateDecision {
    pub fn is_approved(&self) -> bool {
        !matches!(self, Self::Defer { .. })
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Self::ApproveDryRun)
    }
}

#[derive(Debug, Clone)]
pub struct RiskGate {
    config: RiskGateConfig,
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new(RiskGateConfig::default())
    }
}

impl RiskGate {
    pub fn new(config: RiskGateConfig) -> Self {
        Self { config }
    }

    /// Gate on risk and confidence alone.
    ///
    /// LOW always runs live. MEDIUM needs the medium threshold. HIGH needs
    /// the approval threshold and then runs live or dry depending on
    /// `dry_run`.
    pub fn evaluate(&self, risk: RiskLevel, confidence: f64, dry_run: bool) -> GateDecision {
        match risk {
            RiskLevel::Low => GateDecision::ApproveLive,
            RiskLevel::Medium => {
                if confidence >= self.config.medium_risk_threshold {
                    GateDecision::ApproveLive
                } else {
                    self.defer(risk, confidence, self.config.medium_risk_threshold)
                }
            }
            RiskLevel::High => {
                if confidence < self.config.approval_threshold {
                    self.defer(risk, confidence, self.config.approval_threshold)
                } else if dry_run {
                    GateDecision::ApproveDryRun
                } else {
                    GateDecision::ApproveLive
                }
            }
        }
    }

    /// Gate a task, honoring its dry-run override.
    ///
    /// The override replaces the global high-risk flag; an explicit
    /// `Some(true)` also forces dry-run on approved LOW and MEDIUM tasks.
    pub fn evaluate_task(&self, task: &Task) -> GateDecision {
        let dry_run = task
            .dry_run_override
            .unwrap_or(self.config.dry_run_high_risk);
        let decision = self.evaluate(task.risk_level, task.confidence_score, dry_run);

        match decision {
            GateDecision::ApproveLive if task.dry_run_override == Some(true) => {
                GateDecision::ApproveDryRun
            }
            other => other,
        }
    }

    fn defer(&self, risk: RiskLevel, confidence: f64, threshold: f64) -> GateDecision {
        GateDecision::Defer {
            reason: format!(
                "{}: {risk} risk requires confidence >= {threshold}, got {confidence}",
                reasons::CONFIDENCE_BELOW_THRESHOLD
            ),
        }
    }
}
