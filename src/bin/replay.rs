use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use signal_consensus_bot::alerts::JsonlStore;
use signal_consensus_bot::config::Config;
use signal_consensus_bot::replay::{ReplayReport, ReplayRunner};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    // Parse CLI args or use defaults
    let args: Vec<String> = std::env::args().collect();

    let frames_path = args
        .get(1)
        .cloned()
        .unwrap_or_else(|| "data/replay_frames.json".to_string());

    let report_path = args.get(2).cloned();

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║          SIGNAL CONSENSUS BOT — REPLAY                   ║");
    println!("╠══════════════════════════════════════════════════════════╣");
    println!("║  Frames:     {}", frames_path);
    println!("║  Cooldown:   {}s", cfg.gate.min_notify_interval_secs);
    println!("║  Min groups: {}", cfg.consensus.min_groups_required);
    println!("║  Levels:     {}", cfg.plan.level_precedence);
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();

    let frames = ReplayRunner::load_frames(&frames_path)?;
    if frames.is_empty() {
        println!("ERROR: No frames in {}. Nothing to replay.", frames_path);
        return Ok(());
    }
    println!("Loaded {} frame(s)", frames.len());
    println!();

    // Replay history is kept apart from the live plan history.
    let store = Arc::new(JsonlStore::new(Path::new(&cfg.log_dir).join("replay")));
    let mut runner = ReplayRunner::new(&cfg, store.clone());
    let report = runner.run(&frames).await;

    report.print_summary();
    println!("\nPlan history: {}", store.path().display());

    if let Some(path) = report_path {
        save_report_to_file(&report, &path)?;
        println!("Report saved to: {}", path);
    }

    Ok(())
}

fn save_report_to_file(report: &ReplayReport, path: &str) -> Result<()> {
    use std::io::Write;

    let mut f = std::fs::File::create(path)?;

    writeln!(f, "Signal Consensus Bot Replay Report")?;
    writeln!(f, "==================================")?;
    if let (Some(start), Some(end)) = (report.start, report.end) {
        writeln!(
            f,
            "Period: {} to {}",
            start.format("%Y-%m-%d %H:%M"),
            end.format("%Y-%m-%d %H:%M")
        )?;
    }
    writeln!(f, "Frames: {}", report.frames)?;
    writeln!(f)?;
    writeln!(f, "Pipeline:")?;
    writeln!(f, "  Evaluations:  {}", report.evaluations)?;
    writeln!(f, "  Insufficient: {}", report.insufficient)?;
    writeln!(f, "  Failed:       {}", report.failed)?;
    let mut rejected: Vec<_> = report.rejected.iter().collect();
    rejected.sort();
    for (reason, count) in rejected {
        writeln!(f, "  Rejected {}: {}", reason, count)?;
    }
    writeln!(f)?;
    writeln!(f, "Notifications:")?;
    writeln!(f, "  Sent:       {}", report.sent)?;
    writeln!(f, "  Suppressed: {}", report.suppressed)?;
    writeln!(f)?;
    writeln!(f, "By Instrument:")?;
    let mut instruments: Vec<_> = report.per_instrument.iter().collect();
    instruments.sort_by_key(|(k, _)| k.to_string());
    for (symbol, stats) in instruments {
        writeln!(
            f,
            "  {}: {} evals | {} plans | {} sent | {} suppressed",
            symbol, stats.evaluations, stats.plans, stats.sent, stats.suppressed
        )?;
    }

    Ok(())
}
