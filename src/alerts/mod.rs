//! Alert Engine Module
//!
//! Evaluates registered threshold rules against the latest metric values.
//! Each rule carries Armed/Fired hysteresis state so a sustained breach
//! fires exactly one alert: the rule must clear its threshold before it can
//! fire again.

use std::collections::HashMap;

use crate::errors::{VigilError, VigilResult};
use crate::metrics::MetricsBuffer;
use crate::models::{Alert, AlertRule, Metric};

/// Hysteresis state of one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    Armed,
    Fired,
}

/// Destination for emitted alerts (notification adapters live behind this).
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: &Alert);
}

/// Sink that logs alerts at warn level.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: &Alert) {
        log::warn!(
            "ALERT [{}] {}: {}",
            alert.severity,
            alert.title,
            alert.description
        );
    }
}

struct RuleEntry {
    rule: AlertRule,
    state: RuleState,
}

/// Threshold alert evaluator with per-rule hysteresis.
pub struct AlertEngine {
    entries: Vec<RuleEntry>,
    sink: Box<dyn AlertSink>,
}

impl AlertEngine {
    pub fn new(sink: Box<dyn AlertSink>) -> Self {
        Self {
            entries: Vec::new(),
            sink,
        }
    }

    /// Register a rule, replacing (and re-arming) any rule with the same name.
    pub fn register_rule(&mut self, rule: AlertRule) -> VigilResult<()> {
        if rule.name.is_empty() {
            return Err(VigilError::invalid_rule("<unnamed>", "rule name cannot be empty"));
        }
        if rule.metric.is_empty() {
            return Err(VigilError::invalid_rule(&rule.name, "watched metric cannot be empty"));
        }
        if !rule.threshold.is_finite() {
            return Err(VigilError::invalid_rule(&rule.name, "threshold must be finite"));
        }

        let entry = RuleEntry {
            rule,
            state: RuleState::Armed,
        };
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.rule.name == entry.rule.name)
        {
            *existing = entry;
        } else {
            self.entries.push(entry);
        }
        Ok(())
    }

    /// Current hysteresis state of a rule, if registered.
    pub fn rule_state(&self, name: &str) -> Option<RuleState> {
        self.entries
            .iter()
            .find(|e| e.rule.name == name)
            .map(|e| e.state)
    }

    pub fn rule_count(&self) -> usize {
        self.entries.len()
    }

    /// Evaluate every rule against the latest metric values. Called exactly
    /// once per monitoring tick.
    ///
    /// An alert is emitted only on the Armed -> Fired transition; disabled
    /// rules track state but never emit. Each emitted alert also records a
    /// volume metric (category "Alerts") through the buffer.
    pub fn evaluate_all(&mut self, latest: &HashMap<String, f64>, buffer: &MetricsBuffer) -> Vec<Alert> {
        let mut fired = Vec::new();

        for entry in &mut self.entries {
            let Some(value) = latest.get(&entry.rule.metric).copied() else {
                // No value recorded yet for the watched metric; nothing to judge.
                continue;
            };

            let breached = entry.rule.comparison.breached(value, entry.rule.threshold);
            match (entry.state, breached) {
                (RuleState::Armed, true) => {
                    entry.state = RuleState::Fired;
                    if entry.rule.enabled {
                        let alert = build_alert(&entry.rule, value);
                        self.sink.notify(&alert);
                        buffer.record(
                            Metric::new(entry.rule.name.clone(), 1.0, "Alerts")
                                .with_property("metric", entry.rule.metric.clone())
                                .with_property("severity", entry.rule.severity.to_string()),
                        );
                        fired.push(alert);
                    } else {
                        log::debug!(
                            "Disabled rule '{}' breached ({} vs {}); state tracked, no alert",
                            entry.rule.name,
                            value,
                            entry.rule.threshold
                        );
                    }
                }
                (RuleState::Fired, false) => {
                    entry.state = RuleState::Armed;
                    log::info!(
                        "Rule '{}' cleared: {} back within threshold {}",
                        entry.rule.name,
                        value,
                        entry.rule.threshold
                    );
                }
                // Still breached while Fired, or still clear while Armed.
                _ => {}
            }
        }

        fired
    }
}

fn build_alert(rule: &AlertRule, value: f64) -> Alert {
    let comparison = match rule.comparison {
        crate::models::AlertComparison::Gt => ">",
        crate::models::AlertComparison::Lt => "<",
        crate::models::AlertComparison::Eq => "==",
        crate::models::AlertComparison::Neq => "!=",
    };
    Alert::new(
        format!("Threshold breached: {}", rule.name),
        format!(
            "Metric '{}' value {} {} threshold {}",
            rule.metric, value, comparison, rule.threshold
        ),
        rule.severity,
        rule.category.clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{BufferConfig, TelemetrySink};
    use crate::models::{AlertComparison, Severity};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct VecAlertSink {
        alerts: Mutex<Vec<Alert>>,
    }

    struct SharedAlertSink(Arc<VecAlertSink>);

    impl AlertSink for SharedAlertSink {
        fn notify(&self, alert: &Alert) {
            self.0.alerts.lock().unwrap().push(alert.clone());
        }
    }

    #[derive(Default)]
    struct VecSink {
        batches: Mutex<Vec<Vec<Metric>>>,
    }

    struct SharedSink(Arc<VecSink>);

    impl TelemetrySink for SharedSink {
        fn emit(&self, batch: &[Metric]) -> VigilResult<()> {
            self.0.batches.lock().unwrap().push(batch.to_vec());
            Ok(())
        }
    }

    fn engine_and_sinks() -> (AlertEngine, Arc<VecAlertSink>, Arc<VecSink>, MetricsBuffer) {
        let alert_sink = Arc::new(VecAlertSink::default());
        let telemetry = Arc::new(VecSink::default());
        let engine = AlertEngine::new(Box::new(SharedAlertSink(alert_sink.clone())));
        let buffer = MetricsBuffer::new(
            Box::new(SharedSink(telemetry.clone())),
            BufferConfig::default(),
        );
        (engine, alert_sink, telemetry, buffer)
    }

    fn latest(metric: &str, value: f64) -> HashMap<String, f64> {
        HashMap::from([(metric.to_string(), value)])
    }

    #[test]
    fn test_hysteresis_fires_exactly_twice() {
        let (mut engine, alerts, _telemetry, buffer) = engine_and_sinks();
        engine
            .register_rule(AlertRule::new(
                "high-risk",
                "posture.average_risk_score",
                AlertComparison::Gt,
                80.0,
                Severity::High,
            ))
            .unwrap();

        let mut fired_total = 0;
        for value in [70.0, 85.0, 90.0, 75.0, 95.0] {
            let fired = engine.evaluate_all(&latest("posture.average_risk_score", value), &buffer);
            fired_total += fired.len();
        }

        // 70 -> 85 fires, 90 sustains without firing, 75 re-arms, 95 fires.
        assert_eq!(fired_total, 2);
        assert_eq!(alerts.alerts.lock().unwrap().len(), 2);
        assert_eq!(engine.rule_state("high-risk"), Some(RuleState::Fired));
    }

    #[test]
    fn test_alert_emission_records_volume_metric() {
        let (mut engine, _alerts, telemetry, buffer) = engine_and_sinks();
        engine
            .register_rule(AlertRule::new(
                "noncompliant",
                "posture.noncompliant_assets",
                AlertComparison::Gt,
                0.0,
                Severity::Medium,
            ))
            .unwrap();

        engine.evaluate_all(&latest("posture.noncompliant_assets", 3.0), &buffer);
        buffer.flush();

        let batches = telemetry.batches.lock().unwrap();
        let metrics: Vec<&Metric> = batches.iter().flatten().collect();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].category, "Alerts");
        assert_eq!(metrics[0].value, 1.0);
        assert_eq!(metrics[0].name, "noncompliant");
    }

    #[test]
    fn test_disabled_rule_tracks_state_without_emitting() {
        let (mut engine, alerts, telemetry, buffer) = engine_and_sinks();
        let mut rule = AlertRule::new("muted", "m", AlertComparison::Gt, 10.0, Severity::Low);
        rule.enabled = false;
        engine.register_rule(rule).unwrap();

        engine.evaluate_all(&latest("m", 50.0), &buffer);
        assert_eq!(engine.rule_state("muted"), Some(RuleState::Fired));
        assert!(alerts.alerts.lock().unwrap().is_empty());

        buffer.flush();
        assert!(telemetry.batches.lock().unwrap().is_empty());

        // Clearing re-arms even while disabled.
        engine.evaluate_all(&latest("m", 5.0), &buffer);
        assert_eq!(engine.rule_state("muted"), Some(RuleState::Armed));
    }

    #[test]
    fn test_rule_with_no_metric_value_is_skipped() {
        let (mut engine, alerts, _telemetry, buffer) = engine_and_sinks();
        engine
            .register_rule(AlertRule::new("r", "absent", AlertComparison::Gt, 1.0, Severity::Low))
            .unwrap();

        engine.evaluate_all(&HashMap::new(), &buffer);
        assert_eq!(engine.rule_state("r"), Some(RuleState::Armed));
        assert!(alerts.alerts.lock().unwrap().is_empty());
    }

    #[test]
    fn test_lt_rule_fires_below_threshold() {
        let (mut engine, alerts, _telemetry, buffer) = engine_and_sinks();
        engine
            .register_rule(AlertRule::new(
                "low-compliance",
                "posture.compliance_score",
                AlertComparison::Lt,
                85.0,
                Severity::High,
            ))
            .unwrap();

        engine.evaluate_all(&latest("posture.compliance_score", 85.0), &buffer);
        assert!(alerts.alerts.lock().unwrap().is_empty());

        engine.evaluate_all(&latest("posture.compliance_score", 84.9), &buffer);
        assert_eq!(alerts.alerts.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_malformed_rules_rejected() {
        let (mut engine, _alerts, _telemetry, _buffer) = engine_and_sinks();

        let err = engine
            .register_rule(AlertRule::new("", "m", AlertComparison::Gt, 1.0, Severity::Low))
            .unwrap_err();
        assert!(matches!(err, VigilError::InvalidRule { .. }));

        let err = engine
            .register_rule(AlertRule::new("r", "", AlertComparison::Gt, 1.0, Severity::Low))
            .unwrap_err();
        assert!(matches!(err, VigilError::InvalidRule { .. }));

        let err = engine
            .register_rule(AlertRule::new("r", "m", AlertComparison::Gt, f64::NAN, Severity::Low))
            .unwrap_err();
        assert!(matches!(err, VigilError::InvalidRule { .. }));

        assert_eq!(engine.rule_count(), 0);
    }

    #[test]
    fn test_re_registering_replaces_and_rearms() {
        let (mut engine, _alerts, _telemetry, buffer) = engine_and_sinks();
        engine
            .register_rule(AlertRule::new("r", "m", AlertComparison::Gt, 10.0, Severity::Low))
            .unwrap();
        engine.evaluate_all(&latest("m", 50.0), &buffer);
        assert_eq!(engine.rule_state("r"), Some(RuleState::Fired));

        engine
            .register_rule(AlertRule::new("r", "m", AlertComparison::Gt, 60.0, Severity::Low))
            .unwrap();
        assert_eq!(engine.rule_count(), 1);
        assert_eq!(engine.rule_state("r"), Some(RuleState::Armed));
    }
}
