//! Risk Scoring Module
//!
//! Pure, rule-table-driven computation of an asset's risk score from its
//! open findings, posture attributes, and failed-control count. All tables
//! and weights live in an injected [`RiskScoringConfig`] so callers can
//! score against arbitrary rule sets.

use serde::{Deserialize, Serialize};

use crate::errors::{VigilError, VigilResult};
use crate::models::{Asset, AssetPosture, DataSensitivity, Environment, Finding, PortClass, RiskBreakdown};

/// Factor weights for the composite risk score. Must sum to 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskWeights {
    pub vulnerability: f64,
    pub exposure: f64,
    pub criticality: f64,
    pub age: f64,
    pub compliance: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            vulnerability: 0.30,
            exposure: 0.25,
            criticality: 0.20,
            age: 0.15,
            compliance: 0.10,
        }
    }
}

impl RiskWeights {
    pub fn sum(&self) -> f64 {
        self.vulnerability + self.exposure + self.criticality + self.age + self.compliance
    }
}

/// Rule tables and weights for risk scoring.
///
/// The point values are engine defaults, not a settled contract; deployments
/// tune them per environment and inject the result here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScoringConfig {
    pub weights: RiskWeights,

    /// Cap applied to every sub-score before weighting, so no single factor
    /// can be amplified past its own ceiling.
    pub sub_score_cap: f64,

    // Exposure table
    pub internet_facing_points: f64,
    pub remote_admin_port_points: f64,
    pub database_port_points: f64,
    pub file_sharing_port_points: f64,
    pub web_port_points: f64,

    // Criticality table
    pub production_points: f64,
    pub staging_points: f64,
    pub development_points: f64,
    pub regulated_data_points: f64,
    pub confidential_data_points: f64,
    pub internal_data_points: f64,

    /// Patch-age penalty tiers as (minimum days, points), highest first.
    pub patch_age_tiers: Vec<(u32, f64)>,
    /// Install-age penalty tiers as (minimum days, points), highest first.
    pub install_age_tiers: Vec<(u32, f64)>,

    /// Penalty per failed compliance control.
    pub per_failed_control_penalty: f64,
}

impl Default for RiskScoringConfig {
    fn default() -> Self {
        Self {
            weights: RiskWeights::default(),
            sub_score_cap: 100.0,
            internet_facing_points: 30.0,
            remote_admin_port_points: 25.0,
            database_port_points: 20.0,
            file_sharing_port_points: 15.0,
            web_port_points: 10.0,
            production_points: 20.0,
            staging_points: 10.0,
            development_points: 5.0,
            regulated_data_points: 30.0,
            confidential_data_points: 20.0,
            internal_data_points: 10.0,
            patch_age_tiers: vec![(180, 60.0), (90, 40.0), (30, 20.0)],
            install_age_tiers: vec![(730, 20.0), (365, 10.0)],
            per_failed_control_penalty: 5.0,
        }
    }
}

impl RiskScoringConfig {
    /// Reject weight sets that do not form a convex combination.
    pub fn validate(&self) -> VigilResult<()> {
        let sum = self.weights.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(VigilError::InvalidWeights { sum });
        }
        Ok(())
    }

    fn port_points(&self, class: PortClass) -> f64 {
        match class {
            PortClass::RemoteAdmin => self.remote_admin_port_points,
            PortClass::Database => self.database_port_points,
            PortClass::FileSharing => self.file_sharing_port_points,
            PortClass::Web => self.web_port_points,
        }
    }

    fn environment_points(&self, environment: Environment) -> f64 {
        match environment {
            Environment::Production => self.production_points,
            Environment::Staging => self.staging_points,
            Environment::Development => self.development_points,
        }
    }

    fn sensitivity_points(&self, sensitivity: DataSensitivity) -> f64 {
        match sensitivity {
            DataSensitivity::Regulated => self.regulated_data_points,
            DataSensitivity::Confidential => self.confidential_data_points,
            DataSensitivity::Internal => self.internal_data_points,
            DataSensitivity::Public => 0.0,
        }
    }
}

/// Result of one scoring pass over an asset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskScore {
    pub score: u8,
    pub breakdown: RiskBreakdown,
}

/// Compute an asset's risk score from its current facts.
///
/// Pure and idempotent; the caller persists the result and the timestamp.
/// Missing posture attributes contribute zero risk rather than erroring.
pub fn compute_risk_score(
    asset: &Asset,
    findings: &[Finding],
    failed_controls: u32,
    config: &RiskScoringConfig,
) -> RiskScore {
    let breakdown = RiskBreakdown {
        vulnerability: vulnerability_sub_score(findings, config),
        exposure: exposure_sub_score(&asset.posture, config),
        criticality: criticality_sub_score(&asset.posture, config),
        age: age_sub_score(&asset.posture, config),
        compliance: compliance_sub_score(failed_controls, config),
    };

    let composite = breakdown.vulnerability * config.weights.vulnerability
        + breakdown.exposure * config.weights.exposure
        + breakdown.criticality * config.weights.criticality
        + breakdown.age * config.weights.age
        + breakdown.compliance * config.weights.compliance;

    RiskScore {
        score: composite.clamp(0.0, 100.0).round() as u8,
        breakdown,
    }
}

/// Sum of severity contributions over open findings, capped.
///
/// Each additional finding of the same severity is summed, not multiplied.
fn vulnerability_sub_score(findings: &[Finding], config: &RiskScoringConfig) -> f64 {
    let score: f64 = findings
        .iter()
        .filter(|f| f.is_open())
        .map(|f| f.severity.risk_contribution() as f64)
        .sum();
    score.min(config.sub_score_cap)
}

fn exposure_sub_score(posture: &AssetPosture, config: &RiskScoringConfig) -> f64 {
    let mut score = 0.0;
    if posture.internet_facing == Some(true) {
        score += config.internet_facing_points;
    }
    for class in &posture.open_port_classes {
        score += config.port_points(*class);
    }
    score.min(config.sub_score_cap)
}

fn criticality_sub_score(posture: &AssetPosture, config: &RiskScoringConfig) -> f64 {
    let mut score = 0.0;
    if let Some(environment) = posture.environment {
        score += config.environment_points(environment);
    }
    for sensitivity in &posture.data_sensitivity {
        score += config.sensitivity_points(*sensitivity);
    }
    score.min(config.sub_score_cap)
}

fn age_sub_score(posture: &AssetPosture, config: &RiskScoringConfig) -> f64 {
    let mut score = 0.0;
    if let Some(days) = posture.days_since_patch {
        score += tier_points(days, &config.patch_age_tiers);
    }
    if let Some(days) = posture.days_since_install {
        score += tier_points(days, &config.install_age_tiers);
    }
    score.min(config.sub_score_cap)
}

fn compliance_sub_score(failed_controls: u32, config: &RiskScoringConfig) -> f64 {
    (failed_controls as f64 * config.per_failed_control_penalty).min(config.sub_score_cap)
}

fn tier_points(days: u32, tiers: &[(u32, f64)]) -> f64 {
    tiers
        .iter()
        .find(|(min_days, _)| days >= *min_days)
        .map(|(_, points)| *points)
        .unwrap_or(0.0)
}

/// Count scored assets per risk band: (low, medium, high, critical).
///
/// Unscored assets are not counted.
pub fn risk_band_breakdown(assets: &[Asset]) -> (usize, usize, usize, usize) {
    let mut low = 0;
    let mut medium = 0;
    let mut high = 0;
    let mut critical = 0;

    for asset in assets {
        match asset.risk_score {
            Some(0..=25) => low += 1,
            Some(26..=50) => medium += 1,
            Some(51..=75) => high += 1,
            Some(_) => critical += 1,
            None => {}
        }
    }

    (low, medium, high, critical)
}
