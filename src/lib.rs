//! Vigil Posture Engine
//!
//! Turns collected facts about assets, findings, and compliance controls
//! into a normalized risk/compliance posture, on a schedule: weighted risk
//! scoring, compliance assessment aggregation, buffered telemetry, and
//! de-duplicated threshold alerts.

pub mod alerts;
pub mod cli;
pub mod compliance;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod monitor;
pub mod scoring;
pub mod store;

pub use errors::{VigilError, VigilResult};
pub use monitor::{Monitor, MonitorConfig, PostureEngine};
pub use scoring::{compute_risk_score, RiskScoringConfig};
