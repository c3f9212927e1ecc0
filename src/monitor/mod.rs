//! Monitoring Loop (Scheduler)
//!
//! The single background task that, on a fixed interval, pulls current
//! facts, recomputes risk scores and compliance assessments, emits metrics
//! through the buffer, and evaluates alert rules. One tick failing never
//! stops the loop; stopping the loop flushes the buffer first.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::alerts::{AlertEngine, AlertSink};
use crate::compliance::{assess_asset, ComplianceSource, ControlRegistry};
use crate::errors::{VigilError, VigilResult};
use crate::metrics::{BufferConfig, MetricsBuffer, TelemetrySink};
use crate::models::{AlertRule, ComplianceFramework, ComplianceLevel, Metric};
use crate::scoring::{compute_risk_score, RiskScoringConfig};
use crate::store::FactStore;

/// Configuration for the monitoring loop.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Tick interval.
    pub interval: Duration,
    /// Framework/level every asset is assessed against.
    pub framework: ComplianceFramework,
    pub level: ComplianceLevel,
    pub scoring: RiskScoringConfig,
    pub buffer: BufferConfig,
    /// Stop on its own after this many ticks (None = run until stopped).
    pub max_ticks: Option<u64>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            framework: ComplianceFramework::Soc2,
            level: ComplianceLevel::Standard,
            scoring: RiskScoringConfig::default(),
            buffer: BufferConfig::default(),
            max_ticks: None,
        }
    }
}

/// Outcome of one tick, for logging and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickSummary {
    pub assets_scored: usize,
    pub assets_failed: usize,
    pub alerts_fired: usize,
}

/// The scoring/assessment/alerting engine driven by the monitor.
///
/// Owns the metrics buffer, the alert engine state, and the latest-value
/// map; the two engines receive them by reference each tick, so no shared
/// mutable state exists outside this struct.
pub struct PostureEngine {
    config: MonitorConfig,
    store: Arc<dyn FactStore>,
    source: Arc<dyn ComplianceSource>,
    registry: ControlRegistry,
    buffer: MetricsBuffer,
    alert_engine: AlertEngine,
    latest: HashMap<String, f64>,
    ticks: u64,
}

impl PostureEngine {
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn FactStore>,
        source: Arc<dyn ComplianceSource>,
        registry: ControlRegistry,
        telemetry_sink: Box<dyn TelemetrySink>,
        alert_sink: Box<dyn AlertSink>,
    ) -> VigilResult<Self> {
        config.scoring.validate()?;
        let buffer = MetricsBuffer::new(telemetry_sink, config.buffer.clone());
        Ok(Self {
            config,
            store,
            source,
            registry,
            buffer,
            alert_engine: AlertEngine::new(alert_sink),
            latest: HashMap::new(),
            ticks: 0,
        })
    }

    pub fn register_alert_rule(&mut self, rule: AlertRule) -> VigilResult<()> {
        self.alert_engine.register_rule(rule)
    }

    pub fn buffer(&self) -> &MetricsBuffer {
        &self.buffer
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn latest_value(&self, metric: &str) -> Option<f64> {
        self.latest.get(metric).copied()
    }

    /// Flush any buffered metrics (called on shutdown).
    pub fn flush(&self) {
        self.buffer.flush();
    }

    /// Run one full monitoring tick.
    ///
    /// A failure for one asset is logged with the asset id and swallowed;
    /// the remaining assets still process.
    pub fn tick(&mut self) -> TickSummary {
        self.ticks += 1;
        let mut summary = TickSummary::default();

        let assets = match self.store.assets() {
            Ok(assets) => assets,
            Err(e) => {
                log::error!("Tick {}: failed to pull assets: {}", self.ticks, e);
                return summary;
            }
        };
        log::debug!("Tick {}: processing {} asset(s)", self.ticks, assets.len());

        // Gather findings per asset up front; a failed lookup skips only
        // that asset.
        let mut inputs = Vec::with_capacity(assets.len());
        for asset in assets {
            match self.store.findings_for(&asset.id) {
                Ok(findings) => inputs.push((asset, findings)),
                Err(e) => {
                    log::error!("Tick {}: asset {}: failed to pull findings: {}", self.ticks, asset.id, e);
                    summary.assets_failed += 1;
                }
            }
        }

        // The pure part runs in parallel; persistence and emission stay
        // serial so this loop remains the only writer of derived fields.
        let config = &self.config;
        let source = self.source.as_ref();
        let registry = &self.registry;
        let derived: Vec<_> = inputs
            .par_iter()
            .map(|(asset, findings)| {
                let assessment =
                    assess_asset(asset, config.framework, config.level, source, registry)?;
                let score =
                    compute_risk_score(asset, findings, assessment.failed_controls, &config.scoring);
                Ok::<_, VigilError>((assessment, score))
            })
            .collect();

        let scored_at = chrono::Utc::now();
        let mut risk_total = 0.0;
        let mut open_findings = 0usize;
        let mut noncompliant = 0usize;

        for ((asset, findings), result) in inputs.iter().zip(derived) {
            let (assessment, score) = match result {
                Ok(derived) => derived,
                Err(e) => {
                    log::error!("Tick {}: asset {}: scoring failed: {}", self.ticks, asset.id, e);
                    summary.assets_failed += 1;
                    continue;
                }
            };

            if let Err(e) = self
                .store
                .persist_score(&asset.id, &score, scored_at)
                .and_then(|_| self.store.persist_assessment(&assessment))
            {
                log::error!("Tick {}: asset {}: persist failed: {}", self.ticks, asset.id, e);
                summary.assets_failed += 1;
                continue;
            }

            let compliance_score = assessment.compliance_score();
            self.record_metric(
                Metric::new("asset.risk_score", score.score as f64, "Risk")
                    .with_dimension("asset_id", asset.id.clone()),
            );
            self.record_metric(
                Metric::new("asset.compliance_score", compliance_score, "Compliance")
                    .with_dimension("asset_id", asset.id.clone())
                    .with_dimension("framework", assessment.framework.to_string()),
            );

            risk_total += score.score as f64;
            open_findings += findings.iter().filter(|f| f.is_open()).count();
            if !assessment.is_compliant() {
                noncompliant += 1;
            }
            summary.assets_scored += 1;
        }

        let average_risk = if summary.assets_scored > 0 {
            risk_total / summary.assets_scored as f64
        } else {
            0.0
        };
        self.record_metric(Metric::new("posture.assets_scored", summary.assets_scored as f64, "Posture"));
        self.record_metric(Metric::new("posture.average_risk_score", average_risk, "Posture"));
        self.record_metric(Metric::new("posture.open_findings", open_findings as f64, "Posture"));
        self.record_metric(Metric::new("posture.noncompliant_assets", noncompliant as f64, "Posture"));

        let fired = self.alert_engine.evaluate_all(&self.latest, &self.buffer);
        summary.alerts_fired = fired.len();

        log::info!(
            "Tick {}: scored {} asset(s) ({} failed), avg risk {:.1}, {} alert(s) fired",
            self.ticks,
            summary.assets_scored,
            summary.assets_failed,
            average_risk,
            summary.alerts_fired
        );
        summary
    }

    /// Record through the buffer and remember the value for rule evaluation.
    fn record_metric(&mut self, metric: Metric) {
        self.latest.insert(metric.name.clone(), metric.value);
        self.buffer.record(metric);
    }
}

/// Cooperative scheduler around a [`PostureEngine`].
///
/// Stopped -> Running -> Stopped. A stop request lets the in-flight tick
/// complete, flushes the buffer, and then halts.
pub struct Monitor {
    engine: Option<PostureEngine>,
    handle: Option<JoinHandle<PostureEngine>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl Monitor {
    pub fn new(engine: PostureEngine) -> Self {
        Self {
            engine: Some(engine),
            handle: None,
            shutdown: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the background loop. Errors if already running.
    pub fn start(&mut self) -> VigilResult<()> {
        let mut engine = self
            .engine
            .take()
            .ok_or_else(|| VigilError::validation("Monitor is already running"))?;
        let (tx, mut rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.config.interval);
            log::info!(
                "Monitoring loop started (interval {:?}, framework {})",
                engine.config.interval,
                engine.config.framework
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        engine.tick();
                        if let Some(max) = engine.config.max_ticks {
                            if engine.ticks >= max {
                                log::info!("Reached {} tick(s); monitoring loop finishing", max);
                                break;
                            }
                        }
                    }
                    _ = rx.changed() => {
                        log::info!("Stop requested; completing shutdown");
                        break;
                    }
                }
            }

            engine.flush();
            log::info!("Monitoring loop stopped after {} tick(s)", engine.ticks);
            engine
        });

        self.shutdown = Some(tx);
        self.handle = Some(handle);
        Ok(())
    }

    /// Request a cooperative stop and wait for the loop to halt.
    pub async fn stop(&mut self) -> VigilResult<()> {
        if let Some(tx) = self.shutdown.take() {
            // The receiver may already be gone if max_ticks ended the loop.
            let _ = tx.send(true);
        }
        self.join().await
    }

    /// Wait for the loop to finish on its own (max_ticks runs).
    pub async fn wait(&mut self) -> VigilResult<()> {
        // Keep the shutdown sender alive while waiting; dropping it would
        // wake the select branch and end the loop early.
        let result = self.join().await;
        self.shutdown.take();
        result
    }

    async fn join(&mut self) -> VigilResult<()> {
        if let Some(handle) = self.handle.take() {
            let engine = handle.await?;
            self.engine = Some(engine);
        }
        Ok(())
    }

    /// Access the engine while the loop is stopped.
    pub fn engine(&self) -> Option<&PostureEngine> {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> Option<&mut PostureEngine> {
        self.engine.as_mut()
    }
}
