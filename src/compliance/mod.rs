//! Compliance Assessment Module
//!
//! Folds per-control evaluation outcomes into a [`ComplianceAssessment`],
//! keeping the pass/fail counters consistent under re-recording. Control
//! evaluation itself happens behind the [`ComplianceSource`] capability
//! trait so real checkers and fakes are swappable at construction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::errors::{VigilError, VigilResult};
use crate::models::{
    Asset, ComplianceAssessment, ComplianceFramework, ComplianceLevel, Control, ControlCategory,
    ControlResult,
};

/// Outcome of evaluating one control against one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlOutcome {
    Passed,
    Failed,
    NotApplicable,
}

/// Capability interface for evaluating compliance controls.
///
/// Implementations decide how a control is actually checked (config
/// queries, API calls, static tables); the engine only consumes outcomes.
pub trait ComplianceSource: Send + Sync {
    fn evaluate(&self, asset: &Asset, control: &Control) -> ControlOutcome;
}

/// Table-driven [`ComplianceSource`] for tests and demo runs.
///
/// Outcomes resolve per asset+control first, then per control, then the
/// default (pass).
#[derive(Debug, Default)]
pub struct StaticComplianceSource {
    control_outcomes: HashMap<String, ControlOutcome>,
    asset_outcomes: HashMap<(String, String), ControlOutcome>,
}

impl StaticComplianceSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, control_id: impl Into<String>, outcome: ControlOutcome) -> Self {
        self.control_outcomes.insert(control_id.into(), outcome);
        self
    }

    pub fn with_asset_outcome(
        mut self,
        asset_id: impl Into<String>,
        control_id: impl Into<String>,
        outcome: ControlOutcome,
    ) -> Self {
        self.asset_outcomes
            .insert((asset_id.into(), control_id.into()), outcome);
        self
    }
}

impl ComplianceSource for StaticComplianceSource {
    fn evaluate(&self, asset: &Asset, control: &Control) -> ControlOutcome {
        if let Some(outcome) = self
            .asset_outcomes
            .get(&(asset.id.clone(), control.id.clone()))
        {
            return *outcome;
        }
        self.control_outcomes
            .get(&control.id)
            .copied()
            .unwrap_or(ControlOutcome::Passed)
    }
}

/// Control sets keyed by framework. Static reference data used to validate
/// recorded results and to drive per-asset assessment.
#[derive(Debug, Default)]
pub struct ControlRegistry {
    controls: HashMap<ComplianceFramework, Vec<Control>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with small starter control sets, enough for the
    /// demo CLI and tests. Real deployments register their own sets.
    pub fn with_starter_sets() -> Self {
        let mut registry = Self::new();
        registry.register_set(
            ComplianceFramework::Soc2,
            vec![
                Control::new("CC1.1", ComplianceFramework::Soc2, ControlCategory::Configuration, "Control environment"),
                Control::new("CC6.1", ComplianceFramework::Soc2, ControlCategory::Authorization, "Logical access controls"),
                Control::new("CC6.2", ComplianceFramework::Soc2, ControlCategory::Authentication, "User registration and authorization"),
                Control::new("CC7.1", ComplianceFramework::Soc2, ControlCategory::Logging, "Security event detection"),
                Control::new("CC7.2", ComplianceFramework::Soc2, ControlCategory::Logging, "Security incident monitoring"),
            ],
        );
        registry.register_set(
            ComplianceFramework::Iso27001,
            vec![
                Control::new("A.5.1", ComplianceFramework::Iso27001, ControlCategory::Configuration, "Information security policies"),
                Control::new("A.8.1", ComplianceFramework::Iso27001, ControlCategory::DataProtection, "Asset responsibility"),
                Control::new("A.9.1", ComplianceFramework::Iso27001, ControlCategory::Authorization, "Access control requirements"),
                Control::new("A.12.4", ComplianceFramework::Iso27001, ControlCategory::Logging, "Logging and monitoring"),
            ],
        );
        registry
    }

    pub fn register(&mut self, control: Control) {
        self.controls.entry(control.framework).or_default().push(control);
    }

    pub fn register_set(&mut self, framework: ComplianceFramework, controls: Vec<Control>) {
        self.controls.entry(framework).or_default().extend(controls);
    }

    pub fn controls(&self, framework: ComplianceFramework) -> &[Control] {
        self.controls.get(&framework).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, framework: ComplianceFramework, control_id: &str) -> bool {
        self.controls(framework).iter().any(|c| c.id == control_id)
    }
}

/// Record a pass/fail verdict for one control on an assessment.
///
/// The first record of a control id increments `total` and the matching
/// counter; re-recording the same id replaces the prior verdict and adjusts
/// counters, never double-counting. Unknown control ids are rejected before
/// any counter is touched.
pub fn record_control_result(
    assessment: &mut ComplianceAssessment,
    registry: &ControlRegistry,
    control_id: &str,
    passed: bool,
    evidence: HashMap<String, serde_json::Value>,
    notes: Option<String>,
) -> VigilResult<()> {
    record_outcome(
        assessment,
        registry,
        control_id,
        if passed { ControlOutcome::Passed } else { ControlOutcome::Failed },
        evidence,
        notes,
    )
}

/// Record a control as not applicable; excluded from the score denominator.
pub fn record_not_applicable(
    assessment: &mut ComplianceAssessment,
    registry: &ControlRegistry,
    control_id: &str,
    notes: Option<String>,
) -> VigilResult<()> {
    record_outcome(
        assessment,
        registry,
        control_id,
        ControlOutcome::NotApplicable,
        HashMap::new(),
        notes,
    )
}

fn record_outcome(
    assessment: &mut ComplianceAssessment,
    registry: &ControlRegistry,
    control_id: &str,
    outcome: ControlOutcome,
    evidence: HashMap<String, serde_json::Value>,
    notes: Option<String>,
) -> VigilResult<()> {
    if !registry.contains(assessment.framework, control_id) {
        return Err(VigilError::UnknownControl {
            framework: assessment.framework.to_string(),
            control_id: control_id.to_string(),
        });
    }

    let passed = match outcome {
        ControlOutcome::Passed => Some(true),
        ControlOutcome::Failed => Some(false),
        ControlOutcome::NotApplicable => None,
    };

    if let Some(previous) = assessment.control_results.get(control_id) {
        match previous.passed {
            Some(true) => assessment.passed_controls -= 1,
            Some(false) => assessment.failed_controls -= 1,
            None => assessment.not_applicable_controls -= 1,
        }
    } else {
        assessment.total_controls += 1;
    }

    match passed {
        Some(true) => assessment.passed_controls += 1,
        Some(false) => assessment.failed_controls += 1,
        None => assessment.not_applicable_controls += 1,
    }

    assessment.control_results.insert(
        control_id.to_string(),
        ControlResult {
            passed,
            evidence,
            notes,
            recorded_at: chrono::Utc::now(),
        },
    );

    Ok(())
}

/// Assess one asset against a framework's full control set.
///
/// This is the per-tick entry point: every control in the registry's set is
/// evaluated through the source and folded into a fresh assessment.
pub fn assess_asset(
    asset: &Asset,
    framework: ComplianceFramework,
    level: ComplianceLevel,
    source: &dyn ComplianceSource,
    registry: &ControlRegistry,
) -> VigilResult<ComplianceAssessment> {
    let mut assessment = ComplianceAssessment::new(asset.id.clone(), framework, level);

    for control in registry.controls(framework) {
        let outcome = source.evaluate(asset, control);
        log::debug!(
            "Control {} for asset {}: {:?}",
            control.id,
            asset.id,
            outcome
        );
        record_outcome(&mut assessment, registry, &control.id, outcome, HashMap::new(), None)?;
    }

    Ok(assessment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_asset() -> Asset {
        Asset::new(Some("asset-1".to_string()), "web-01", "server", "aws_collector").unwrap()
    }

    fn soc2_assessment() -> ComplianceAssessment {
        ComplianceAssessment::new("asset-1", ComplianceFramework::Soc2, ComplianceLevel::Standard)
    }

    #[test]
    fn test_unknown_control_rejected_without_corruption() {
        let registry = ControlRegistry::with_starter_sets();
        let mut assessment = soc2_assessment();

        let err = record_control_result(
            &mut assessment,
            &registry,
            "XX9.9",
            true,
            HashMap::new(),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, VigilError::UnknownControl { .. }));
        assert_eq!(assessment.total_controls, 0);
        assert_eq!(assessment.passed_controls, 0);
        assert!(assessment.control_results.is_empty());
    }

    #[test]
    fn test_re_recording_replaces_without_double_count() {
        let registry = ControlRegistry::with_starter_sets();
        let mut assessment = soc2_assessment();

        record_control_result(&mut assessment, &registry, "CC6.1", true, HashMap::new(), None).unwrap();
        assert_eq!(assessment.total_controls, 1);
        assert_eq!(assessment.passed_controls, 1);

        record_control_result(&mut assessment, &registry, "CC6.1", false, HashMap::new(), None).unwrap();
        assert_eq!(assessment.total_controls, 1);
        assert_eq!(assessment.passed_controls, 0);
        assert_eq!(assessment.failed_controls, 1);

        record_control_result(&mut assessment, &registry, "CC6.1", true, HashMap::new(), None).unwrap();
        assert_eq!(assessment.total_controls, 1);
        assert_eq!(assessment.passed_controls, 1);
        assert_eq!(assessment.failed_controls, 0);
    }

    #[test]
    fn test_not_applicable_excluded_from_denominator() {
        let registry = ControlRegistry::with_starter_sets();
        let mut assessment = soc2_assessment();

        record_control_result(&mut assessment, &registry, "CC1.1", true, HashMap::new(), None).unwrap();
        record_control_result(&mut assessment, &registry, "CC6.1", false, HashMap::new(), None).unwrap();
        record_not_applicable(&mut assessment, &registry, "CC6.2", Some("no user store".into())).unwrap();

        assert_eq!(assessment.total_controls, 3);
        assert_eq!(assessment.not_applicable_controls, 1);
        // 1 passed of 2 applicable
        assert_eq!(assessment.compliance_score(), 50.0);
    }

    #[test]
    fn test_reclassifying_to_not_applicable_adjusts_counters() {
        let registry = ControlRegistry::with_starter_sets();
        let mut assessment = soc2_assessment();

        record_control_result(&mut assessment, &registry, "CC6.1", false, HashMap::new(), None).unwrap();
        record_not_applicable(&mut assessment, &registry, "CC6.1", None).unwrap();

        assert_eq!(assessment.total_controls, 1);
        assert_eq!(assessment.failed_controls, 0);
        assert_eq!(assessment.not_applicable_controls, 1);
        assert_eq!(assessment.compliance_score(), 100.0);
    }

    #[test]
    fn test_assess_asset_with_default_source_passes_everything() {
        let registry = ControlRegistry::with_starter_sets();
        let source = StaticComplianceSource::new();
        let asset = test_asset();

        let assessment = assess_asset(
            &asset,
            ComplianceFramework::Soc2,
            ComplianceLevel::Standard,
            &source,
            &registry,
        )
        .unwrap();

        assert_eq!(assessment.total_controls, 5);
        assert_eq!(assessment.passed_controls, 5);
        assert_eq!(assessment.compliance_score(), 100.0);
        assert!(assessment.is_compliant());
    }

    #[test]
    fn test_assess_asset_with_failures_and_na() {
        let registry = ControlRegistry::with_starter_sets();
        let source = StaticComplianceSource::new()
            .with_outcome("CC6.1", ControlOutcome::Failed)
            .with_outcome("CC7.2", ControlOutcome::NotApplicable);
        let asset = test_asset();

        let assessment = assess_asset(
            &asset,
            ComplianceFramework::Soc2,
            ComplianceLevel::Standard,
            &source,
            &registry,
        )
        .unwrap();

        assert_eq!(assessment.total_controls, 5);
        assert_eq!(assessment.passed_controls, 3);
        assert_eq!(assessment.failed_controls, 1);
        assert_eq!(assessment.not_applicable_controls, 1);
        // 3 of 4 applicable
        assert_eq!(assessment.compliance_score(), 75.0);
        assert!(!assessment.is_compliant());
    }

    #[test]
    fn test_asset_specific_outcome_overrides_control_outcome() {
        let source = StaticComplianceSource::new()
            .with_outcome("CC6.1", ControlOutcome::Passed)
            .with_asset_outcome("asset-1", "CC6.1", ControlOutcome::Failed);
        let control = Control::new(
            "CC6.1",
            ComplianceFramework::Soc2,
            ControlCategory::Authorization,
            "Logical access controls",
        );

        assert_eq!(source.evaluate(&test_asset(), &control), ControlOutcome::Failed);
    }
}
