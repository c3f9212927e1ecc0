use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::models::{ComplianceFramework, ComplianceLevel};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "vigil",
    about = "Vigil - Risk and compliance posture monitoring engine",
    version
)]
pub struct Args {
    /// Facts snapshot (JSON) produced by collectors
    #[arg(short, long)]
    pub facts: PathBuf,

    /// Seconds between monitoring ticks
    #[arg(short, long, default_value = "60")]
    pub interval_secs: u64,

    /// Number of ticks to run (0 = run until interrupted)
    #[arg(short, long, default_value = "1")]
    pub ticks: u64,

    /// Metrics batch size that triggers a synchronous flush
    #[arg(long, default_value = "100")]
    pub buffer_capacity: usize,

    /// Delivery attempts per metrics batch before it is dropped
    #[arg(long, default_value = "3")]
    pub max_retries: u32,

    /// Write telemetry as JSON lines to this file instead of the log
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Compliance framework to assess every asset against
    #[arg(long, default_value = "soc2")]
    pub framework: FrameworkArg,

    /// Target compliance level
    #[arg(long, default_value = "standard")]
    pub level: LevelArg,

    /// Average risk score above which the built-in alert rule fires
    #[arg(long, default_value = "70")]
    pub risk_alert_threshold: f64,

    /// Enable verbose logging of all operations
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum FrameworkArg {
    OwaspAsvs,
    Soc2,
    Iso27001,
    PciDss,
    Hipaa,
    Nist,
    Cis,
}

impl From<FrameworkArg> for ComplianceFramework {
    fn from(arg: FrameworkArg) -> Self {
        match arg {
            FrameworkArg::OwaspAsvs => ComplianceFramework::OwaspAsvs,
            FrameworkArg::Soc2 => ComplianceFramework::Soc2,
            FrameworkArg::Iso27001 => ComplianceFramework::Iso27001,
            FrameworkArg::PciDss => ComplianceFramework::PciDss,
            FrameworkArg::Hipaa => ComplianceFramework::Hipaa,
            FrameworkArg::Nist => ComplianceFramework::Nist,
            FrameworkArg::Cis => ComplianceFramework::Cis,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum LevelArg {
    Basic,
    Standard,
    Advanced,
    AsvsL1,
    AsvsL2,
    AsvsL3,
}

impl From<LevelArg> for ComplianceLevel {
    fn from(arg: LevelArg) -> Self {
        match arg {
            LevelArg::Basic => ComplianceLevel::Basic,
            LevelArg::Standard => ComplianceLevel::Standard,
            LevelArg::Advanced => ComplianceLevel::Advanced,
            LevelArg::AsvsL1 => ComplianceLevel::AsvsL1,
            LevelArg::AsvsL2 => ComplianceLevel::AsvsL2,
            LevelArg::AsvsL3 => ComplianceLevel::AsvsL3,
        }
    }
}
