use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{VigilError, VigilResult};

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate an opaque identifier with the given prefix.
///
/// Collectors normally supply ids; this covers records created inside the
/// engine (alerts, assessments, demo fixtures).
pub fn next_id(prefix: &str) -> String {
    let seq = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), seq)
}

/// Severity levels for findings and alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Fixed risk contribution of one open finding at this severity.
    pub fn risk_contribution(&self) -> u8 {
        match self {
            Severity::Critical => 100,
            Severity::High => 80,
            Severity::Medium => 60,
            Severity::Low => 30,
            Severity::Info => 10,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "CRITICAL"),
            Severity::High => write!(f, "HIGH"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::Low => write!(f, "LOW"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// Lifecycle status of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    Open,
    InProgress,
    Resolved,
    Accepted,
    FalsePositive,
}

impl FindingStatus {
    /// Terminal statuses can be entered exactly once and never left.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FindingStatus::Resolved | FindingStatus::Accepted | FindingStatus::FalsePositive
        )
    }
}

impl std::fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingStatus::Open => write!(f, "OPEN"),
            FindingStatus::InProgress => write!(f, "IN_PROGRESS"),
            FindingStatus::Resolved => write!(f, "RESOLVED"),
            FindingStatus::Accepted => write!(f, "ACCEPTED"),
            FindingStatus::FalsePositive => write!(f, "FALSE_POSITIVE"),
        }
    }
}

/// A discrete detected issue tied to an asset and a compliance control.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub asset_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub framework: ComplianceFramework,
    pub control_id: String,
    pub status: FindingStatus,
    pub discovered_at: DateTime<Utc>,

    #[serde(default)]
    pub evidence: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub remediation: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub resolved_by: Option<String>,
    #[serde(default)]
    pub resolution_notes: Option<String>,
}

impl Finding {
    pub fn new(
        asset_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        framework: ComplianceFramework,
        control_id: impl Into<String>,
    ) -> Self {
        Self {
            id: next_id("finding"),
            asset_id: asset_id.into(),
            title: title.into(),
            description: description.into(),
            severity,
            framework,
            control_id: control_id.into(),
            status: FindingStatus::Open,
            discovered_at: Utc::now(),
            evidence: HashMap::new(),
            remediation: None,
            resolved_at: None,
            resolved_by: None,
            resolution_notes: None,
        }
    }

    /// A finding contributes to risk until it reaches a terminal status.
    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Mark the finding as resolved. Errors if it is already terminal.
    pub fn resolve(&mut self, resolved_by: impl Into<String>, notes: impl Into<String>) -> VigilResult<()> {
        self.transition(FindingStatus::Resolved, resolved_by.into(), notes.into())
    }

    /// Accept the risk associated with this finding.
    pub fn accept_risk(&mut self, accepted_by: impl Into<String>, justification: impl Into<String>) -> VigilResult<()> {
        let notes = format!("Risk accepted: {}", justification.into());
        self.transition(FindingStatus::Accepted, accepted_by.into(), notes)
    }

    /// Mark the finding as a false positive.
    pub fn mark_false_positive(&mut self, marked_by: impl Into<String>, reason: impl Into<String>) -> VigilResult<()> {
        let notes = format!("False positive: {}", reason.into());
        self.transition(FindingStatus::FalsePositive, marked_by.into(), notes)
    }

    fn transition(&mut self, to: FindingStatus, by: String, notes: String) -> VigilResult<()> {
        if self.status.is_terminal() {
            return Err(VigilError::FindingAlreadyTerminal {
                finding_id: self.id.clone(),
                status: self.status.to_string(),
            });
        }
        self.status = to;
        self.resolved_at = Some(Utc::now());
        self.resolved_by = Some(by);
        self.resolution_notes = Some(notes);
        Ok(())
    }
}

/// Exposure classes for listening ports observed on an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortClass {
    RemoteAdmin,
    Database,
    FileSharing,
    Web,
}

/// Deployment environment tier of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Environment {
    Production,
    Staging,
    Development,
}

/// Sensitivity classification of the data an asset handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataSensitivity {
    Regulated,
    Confidential,
    Internal,
    Public,
}

/// Posture attributes contributing to an asset's risk score.
///
/// Every field is optional; a missing attribute contributes zero risk
/// rather than raising an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetPosture {
    #[serde(default)]
    pub internet_facing: Option<bool>,
    #[serde(default)]
    pub open_port_classes: Vec<PortClass>,
    #[serde(default)]
    pub environment: Option<Environment>,
    #[serde(default)]
    pub data_sensitivity: Vec<DataSensitivity>,
    #[serde(default)]
    pub days_since_patch: Option<u32>,
    #[serde(default)]
    pub days_since_install: Option<u32>,
}

/// Last computed contributing sub-scores for an asset, pre-weighting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskBreakdown {
    pub vulnerability: f64,
    pub exposure: f64,
    pub criticality: f64,
    pub age: f64,
    pub compliance: f64,
}

/// A tracked resource whose risk/compliance posture is scored.
///
/// Created by collectors; the scoring engine owns the risk fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub name: String,
    pub asset_type: String,
    pub source: String,

    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default)]
    pub posture: AssetPosture,

    // Derived risk fields, written only by the scoring pass
    #[serde(default)]
    pub risk_score: Option<u8>,
    #[serde(default)]
    pub risk_breakdown: Option<RiskBreakdown>,
    #[serde(default)]
    pub last_scored_at: Option<DateTime<Utc>>,
}

impl Asset {
    pub fn new(
        id: Option<String>,
        name: impl Into<String>,
        asset_type: impl Into<String>,
        source: impl Into<String>,
    ) -> VigilResult<Self> {
        let name = name.into();
        let asset_type = asset_type.into();
        let source = source.into();
        if name.is_empty() {
            return Err(VigilError::validation("Asset name cannot be empty"));
        }
        if asset_type.is_empty() {
            return Err(VigilError::validation("Asset type cannot be empty"));
        }
        if source.is_empty() {
            return Err(VigilError::validation("Asset source cannot be empty"));
        }
        Ok(Self {
            id: id.unwrap_or_else(|| next_id("asset")),
            name,
            asset_type,
            source,
            metadata: HashMap::new(),
            tags: HashMap::new(),
            posture: AssetPosture::default(),
            risk_score: None,
            risk_breakdown: None,
            last_scored_at: None,
        })
    }
}

/// Supported compliance frameworks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceFramework {
    #[serde(rename = "OWASP_ASVS")]
    OwaspAsvs,
    #[serde(rename = "SOC2")]
    Soc2,
    #[serde(rename = "ISO27001")]
    Iso27001,
    #[serde(rename = "PCI_DSS")]
    PciDss,
    #[serde(rename = "HIPAA")]
    Hipaa,
    #[serde(rename = "NIST")]
    Nist,
    #[serde(rename = "CIS")]
    Cis,
    #[serde(rename = "CUSTOM")]
    Custom,
}

impl std::fmt::Display for ComplianceFramework {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ComplianceFramework::OwaspAsvs => "OWASP_ASVS",
            ComplianceFramework::Soc2 => "SOC2",
            ComplianceFramework::Iso27001 => "ISO27001",
            ComplianceFramework::PciDss => "PCI_DSS",
            ComplianceFramework::Hipaa => "HIPAA",
            ComplianceFramework::Nist => "NIST",
            ComplianceFramework::Cis => "CIS",
            ComplianceFramework::Custom => "CUSTOM",
        };
        write!(f, "{}", name)
    }
}

/// Target compliance maturity level for an assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceLevel {
    None,
    Basic,
    Standard,
    Advanced,
    AsvsL1,
    AsvsL2,
    AsvsL3,
}

impl ComplianceLevel {
    /// Minimum compliance score (percent) required to be compliant at
    /// this level. Levels without a specific requirement use 85.
    pub fn threshold(&self) -> f64 {
        match self {
            ComplianceLevel::Basic => 70.0,
            ComplianceLevel::Standard => 85.0,
            ComplianceLevel::Advanced => 95.0,
            ComplianceLevel::AsvsL1 => 80.0,
            ComplianceLevel::AsvsL2 => 90.0,
            ComplianceLevel::AsvsL3 => 95.0,
            ComplianceLevel::None => 85.0,
        }
    }
}

/// Categories of security controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCategory {
    Authentication,
    Authorization,
    SessionManagement,
    InputValidation,
    Cryptography,
    ErrorHandling,
    Logging,
    DataProtection,
    Communication,
    Configuration,
    MaliciousCode,
    BusinessLogic,
    FilesResources,
    ApiWebService,
}

/// A single requirement within a compliance framework.
///
/// Static reference data, not mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Control {
    pub id: String,
    pub framework: ComplianceFramework,
    pub category: ControlCategory,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub automated: bool,
}

fn default_true() -> bool {
    true
}

impl Control {
    pub fn new(
        id: impl Into<String>,
        framework: ComplianceFramework,
        category: ControlCategory,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            framework,
            category,
            title: title.into(),
            description: String::new(),
            required: true,
            automated: false,
        }
    }
}

/// Recorded verdict for one control within an assessment.
///
/// `passed` of `None` marks the control as not applicable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlResult {
    pub passed: Option<bool>,
    #[serde(default)]
    pub evidence: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub notes: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Aggregated pass/fail outcome of all controls for one asset/framework pair.
///
/// The counters are maintained by the compliance aggregator; the score and
/// verdict are derived on read, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceAssessment {
    pub id: String,
    pub asset_id: String,
    pub framework: ComplianceFramework,
    pub level: ComplianceLevel,
    pub assessed_at: DateTime<Utc>,
    #[serde(default)]
    pub assessed_by: Option<String>,

    pub total_controls: u32,
    pub passed_controls: u32,
    pub failed_controls: u32,
    pub not_applicable_controls: u32,

    #[serde(default)]
    pub control_results: HashMap<String, ControlResult>,
}

impl ComplianceAssessment {
    pub fn new(asset_id: impl Into<String>, framework: ComplianceFramework, level: ComplianceLevel) -> Self {
        Self {
            id: next_id("assessment"),
            asset_id: asset_id.into(),
            framework,
            level,
            assessed_at: Utc::now(),
            assessed_by: None,
            total_controls: 0,
            passed_controls: 0,
            failed_controls: 0,
            not_applicable_controls: 0,
            control_results: HashMap::new(),
        }
    }

    /// Compliance score as a percentage of applicable controls passed.
    ///
    /// An assessment with no controls scores 0; one where every control is
    /// not applicable is vacuously compliant at 100.
    pub fn compliance_score(&self) -> f64 {
        if self.total_controls == 0 {
            return 0.0;
        }
        let applicable = self.total_controls - self.not_applicable_controls;
        if applicable == 0 {
            return 100.0;
        }
        (self.passed_controls as f64 / applicable as f64) * 100.0
    }

    /// Whether the assessment meets the minimum threshold for its level.
    pub fn is_compliant(&self) -> bool {
        self.compliance_score() >= self.level.threshold()
    }
}

/// A single telemetry data point. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
    pub category: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub properties: HashMap<String, String>,
    #[serde(default)]
    pub dimensions: HashMap<String, String>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: f64, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            category: category.into(),
            timestamp: Utc::now(),
            properties: HashMap::new(),
            dimensions: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_dimension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dimensions.insert(key.into(), value.into());
        self
    }
}

/// Comparison operator for alert rules.
///
/// GT/LT are strict; EQ/NEQ are exact equality on the metric value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertComparison {
    Gt,
    Lt,
    Eq,
    Neq,
}

impl AlertComparison {
    pub fn breached(&self, value: f64, threshold: f64) -> bool {
        match self {
            AlertComparison::Gt => value > threshold,
            AlertComparison::Lt => value < threshold,
            AlertComparison::Eq => value == threshold,
            AlertComparison::Neq => value != threshold,
        }
    }
}

/// A named threshold rule over one metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    /// Unique rule key
    pub name: String,
    /// Name of the watched metric
    pub metric: String,
    pub threshold: f64,
    pub comparison: AlertComparison,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_alert_category")]
    pub category: String,
}

fn default_alert_category() -> String {
    "Posture".to_string()
}

impl AlertRule {
    pub fn new(
        name: impl Into<String>,
        metric: impl Into<String>,
        comparison: AlertComparison,
        threshold: f64,
        severity: Severity,
    ) -> Self {
        Self {
            name: name.into(),
            metric: metric.into(),
            threshold,
            comparison,
            severity,
            enabled: true,
            category: default_alert_category(),
        }
    }
}

/// Lifecycle status of an alert. Closure is an external concern, so the
/// engine only ever emits `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,
}

/// An alert raised by a rule crossing its threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub category: String,
    pub created_at: DateTime<Utc>,
    pub status: AlertStatus,
}

impl Alert {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: Severity,
        category: impl Into<String>,
    ) -> Self {
        Self {
            id: next_id("alert"),
            title: title.into(),
            description: description.into(),
            severity,
            category: category.into(),
            created_at: Utc::now(),
            status: AlertStatus::Active,
        }
    }
}
