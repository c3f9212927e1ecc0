//! Fact store boundary.
//!
//! Collectors and the graph-backed inventory live outside this crate; the
//! monitoring loop only needs a narrow port to pull current facts and write
//! derived values back. [`InMemoryStore`] is the reference implementation
//! used by tests and the demo CLI, optionally seeded from a JSON snapshot.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{VigilError, VigilResult};
use crate::models::{Asset, ComplianceAssessment, Finding};
use crate::scoring::RiskScore;

/// Port to the asset inventory: read current facts, write derived fields.
pub trait FactStore: Send + Sync {
    fn assets(&self) -> VigilResult<Vec<Asset>>;

    /// Findings currently attached to one asset, open or not.
    fn findings_for(&self, asset_id: &str) -> VigilResult<Vec<Finding>>;

    /// Write a computed risk score (and breakdown/timestamp) back onto the
    /// asset record. The scoring engine is the only writer of these fields.
    fn persist_score(&self, asset_id: &str, score: &RiskScore, scored_at: DateTime<Utc>) -> VigilResult<()>;

    /// Write the latest assessment for the asset/framework pair.
    fn persist_assessment(&self, assessment: &ComplianceAssessment) -> VigilResult<()>;
}

/// JSON snapshot of collected facts, as produced by external collectors.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FactsSnapshot {
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub findings: Vec<Finding>,
}

/// RwLock-backed in-memory [`FactStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    assets: RwLock<HashMap<String, Asset>>,
    findings: RwLock<Vec<Finding>>,
    assessments: RwLock<HashMap<String, ComplianceAssessment>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a collector snapshot file.
    pub fn from_snapshot_file(path: &Path) -> VigilResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| VigilError::io(e, Some(path.to_path_buf())))?;
        let snapshot: FactsSnapshot = serde_json::from_str(&raw)?;
        log::info!(
            "Loaded facts snapshot: {} asset(s), {} finding(s)",
            snapshot.assets.len(),
            snapshot.findings.len()
        );

        let store = Self::new();
        for asset in snapshot.assets {
            store.insert_asset(asset);
        }
        for finding in snapshot.findings {
            store.insert_finding(finding);
        }
        Ok(store)
    }

    pub fn insert_asset(&self, asset: Asset) {
        self.assets.write().expect("store lock poisoned").insert(asset.id.clone(), asset);
    }

    pub fn insert_finding(&self, finding: Finding) {
        self.findings.write().expect("store lock poisoned").push(finding);
    }

    pub fn asset(&self, asset_id: &str) -> Option<Asset> {
        self.assets.read().expect("store lock poisoned").get(asset_id).cloned()
    }

    /// Latest assessment persisted for an asset, if any.
    pub fn assessment_for(&self, asset_id: &str) -> Option<ComplianceAssessment> {
        self.assessments.read().expect("store lock poisoned").get(asset_id).cloned()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.read().expect("store lock poisoned").len()
    }
}

impl FactStore for InMemoryStore {
    fn assets(&self) -> VigilResult<Vec<Asset>> {
        let mut assets: Vec<Asset> = self.assets.read().expect("store lock poisoned").values().cloned().collect();
        // Stable tick order regardless of map iteration order.
        assets.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(assets)
    }

    fn findings_for(&self, asset_id: &str) -> VigilResult<Vec<Finding>> {
        Ok(self
            .findings
            .read()
            .expect("store lock poisoned")
            .iter()
            .filter(|f| f.asset_id == asset_id)
            .cloned()
            .collect())
    }

    fn persist_score(&self, asset_id: &str, score: &RiskScore, scored_at: DateTime<Utc>) -> VigilResult<()> {
        let mut assets = self.assets.write().expect("store lock poisoned");
        let asset = assets
            .get_mut(asset_id)
            .ok_or_else(|| VigilError::validation(format!("Unknown asset '{}'", asset_id)))?;
        asset.risk_score = Some(score.score);
        asset.risk_breakdown = Some(score.breakdown.clone());
        asset.last_scored_at = Some(scored_at);
        Ok(())
    }

    fn persist_assessment(&self, assessment: &ComplianceAssessment) -> VigilResult<()> {
        self.assessments
            .write()
            .expect("store lock poisoned")
            .insert(assessment.asset_id.clone(), assessment.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComplianceFramework, RiskBreakdown, Severity};
    use std::io::Write;

    fn seeded_store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert_asset(Asset::new(Some("a1".into()), "web-01", "server", "aws").unwrap());
        store.insert_asset(Asset::new(Some("a2".into()), "db-01", "database", "aws").unwrap());
        store.insert_finding(Finding::new(
            "a1",
            "TLS disabled",
            "plaintext",
            Severity::High,
            ComplianceFramework::Soc2,
            "CC6.1",
        ));
        store
    }

    #[test]
    fn test_assets_are_returned_in_stable_order() {
        let store = seeded_store();
        let assets = store.assets().unwrap();
        let ids: Vec<&str> = assets.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
    }

    #[test]
    fn test_findings_filtered_by_asset() {
        let store = seeded_store();
        assert_eq!(store.findings_for("a1").unwrap().len(), 1);
        assert!(store.findings_for("a2").unwrap().is_empty());
    }

    #[test]
    fn test_persist_score_updates_derived_fields() {
        let store = seeded_store();
        let score = RiskScore {
            score: 43,
            breakdown: RiskBreakdown {
                vulnerability: 100.0,
                exposure: 30.0,
                criticality: 20.0,
                age: 0.0,
                compliance: 10.0,
            },
        };
        let now = Utc::now();

        store.persist_score("a1", &score, now).unwrap();
        let asset = store.asset("a1").unwrap();
        assert_eq!(asset.risk_score, Some(43));
        assert_eq!(asset.last_scored_at, Some(now));

        let err = store.persist_score("missing", &score, now).unwrap_err();
        assert!(matches!(err, VigilError::Validation(_)));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let snapshot = r#"{
            "assets": [
                {"id": "a1", "name": "web-01", "asset_type": "server", "source": "aws",
                 "posture": {"internet_facing": true, "environment": "PRODUCTION"}}
            ],
            "findings": [
                {"id": "f1", "asset_id": "a1", "title": "t", "description": "d",
                 "severity": "CRITICAL", "framework": "SOC2", "control_id": "CC6.1",
                 "status": "OPEN", "discovered_at": "2026-08-01T00:00:00Z"}
            ]
        }"#;
        file.write_all(snapshot.as_bytes()).unwrap();

        let store = InMemoryStore::from_snapshot_file(file.path()).unwrap();
        assert_eq!(store.asset_count(), 1);
        let asset = store.asset("a1").unwrap();
        assert_eq!(asset.posture.internet_facing, Some(true));
        assert_eq!(store.findings_for("a1").unwrap().len(), 1);
    }

    #[test]
    fn test_snapshot_missing_file_is_io_error() {
        let err = InMemoryStore::from_snapshot_file(Path::new("/nonexistent/facts.json")).unwrap_err();
        assert!(matches!(err, VigilError::Io { .. }));
    }
}
