use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use console::style;
use env_logger::Env;

use vigil::alerts::LogAlertSink;
use vigil::cli::Args;
use vigil::compliance::{ControlRegistry, StaticComplianceSource};
use vigil::metrics::{BufferConfig, JsonLinesSink, LogSink, TelemetrySink};
use vigil::models::{AlertComparison, AlertRule, Severity};
use vigil::monitor::{Monitor, MonitorConfig, PostureEngine};
use vigil::scoring::risk_band_breakdown;
use vigil::store::{FactStore, InMemoryStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet flags
    let log_level = if args.quiet {
        "error"
    } else if args.verbose {
        "debug"
    } else {
        "info"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_millis()
        .init();

    log::info!("Vigil starting with args: {:?}", args);

    let store = Arc::new(InMemoryStore::from_snapshot_file(&args.facts)?);

    let telemetry: Box<dyn TelemetrySink> = match &args.output {
        Some(path) => Box::new(JsonLinesSink::new(path)),
        None => Box::new(LogSink),
    };

    let config = MonitorConfig {
        interval: Duration::from_secs(args.interval_secs.max(1)),
        framework: args.framework.into(),
        level: args.level.into(),
        buffer: BufferConfig {
            capacity: args.buffer_capacity,
            max_retries: args.max_retries,
        },
        max_ticks: if args.ticks == 0 { None } else { Some(args.ticks) },
        ..MonitorConfig::default()
    };

    let mut engine = PostureEngine::new(
        config,
        store.clone(),
        Arc::new(StaticComplianceSource::new()),
        ControlRegistry::with_starter_sets(),
        telemetry,
        Box::new(LogAlertSink),
    )?;

    engine.register_alert_rule(AlertRule::new(
        "average-risk",
        "posture.average_risk_score",
        AlertComparison::Gt,
        args.risk_alert_threshold,
        Severity::High,
    ))?;
    engine.register_alert_rule(AlertRule::new(
        "noncompliant-assets",
        "posture.noncompliant_assets",
        AlertComparison::Gt,
        0.0,
        Severity::Medium,
    ))?;

    let mut monitor = Monitor::new(engine);
    monitor.start()?;

    if args.ticks == 0 {
        log::info!("Running until interrupted (ctrl-c to stop)");
        tokio::signal::ctrl_c().await?;
        monitor.stop().await?;
    } else {
        monitor.wait().await?;
    }

    print_posture_summary(store.as_ref(), &monitor);
    Ok(())
}

/// Print an end-of-run posture summary from the store's derived fields.
fn print_posture_summary(store: &InMemoryStore, monitor: &Monitor) {
    let assets = match store.assets() {
        Ok(assets) => assets,
        Err(e) => {
            log::error!("Failed to read assets for summary: {}", e);
            return;
        }
    };

    println!();
    println!("{}", style("POSTURE SUMMARY").bold());
    println!("{}", style("═════════════════════════════════════").dim());

    let (low, medium, high, critical) = risk_band_breakdown(&assets);
    println!("📊 Assets tracked: {}", assets.len());
    println!("🔴 Critical (76-100): {}", critical);
    println!("🟠 High (51-75): {}", high);
    println!("🟡 Medium (26-50): {}", medium);
    println!("🟢 Low (0-25): {}", low);

    let mut scored: Vec<_> = assets
        .iter()
        .filter(|a| a.risk_score.is_some())
        .collect();
    scored.sort_by(|a, b| b.risk_score.cmp(&a.risk_score));

    if !scored.is_empty() {
        println!();
        println!("{}", style("TOP RISK ASSETS").bold());
        println!("{}", style("═════════════════════════════════════").dim());
        for (i, asset) in scored.iter().take(5).enumerate() {
            let score = asset.risk_score.unwrap_or(0);
            let compliance = store
                .assessment_for(&asset.id)
                .map(|a| format!("{:.0}% compliant", a.compliance_score()))
                .unwrap_or_else(|| "not assessed".to_string());
            println!("{}. {} (risk {}, {})", i + 1, asset.name, score, compliance);
        }
    }

    if let Some(engine) = monitor.engine() {
        println!();
        println!(
            "📦 Telemetry: {} metric(s) delivered, {} dropped",
            engine.buffer().flushed_count(),
            engine.buffer().dropped_count()
        );
        println!("⏱  Ticks completed: {}", engine.ticks());
    }
    println!();
}
