use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::core::reasoning;
use crate::core::trade_plan::TradePlan;
use crate::scanner::{CycleReport, InstrumentOutcome};

#[derive(Debug, Clone, Default)]
pub struct InstrumentStats {
    pub evaluations: usize,
    pub plans: usize,
    pub sent: usize,
    pub suppressed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ReplayReport {
    // Period
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub frames: usize,

    // Pipeline
    pub evaluations: usize,
    pub insufficient: usize,
    pub rejected: HashMap<String, usize>,
    pub failed: usize,

    // Gate
    pub sent: usize,
    pub sink_failures: usize,
    pub suppressed: usize,
    pub suppressed_by: HashMap<String, usize>,

    pub per_instrument: HashMap<String, InstrumentStats>,

    /// Every plan handed to the sink, in replay order.
    pub alerts: Vec<TradePlan>,
}

impl ReplayReport {
    pub fn record_cycle(&mut self, cycle: &CycleReport) {
        self.frames += 1;
        if self.start.is_none() {
            self.start = Some(cycle.at);
        }
        self.end = Some(cycle.at);

        for (symbol, outcome) in &cycle.outcomes {
            self.evaluations += 1;
            let stats = self.per_instrument.entry(symbol.clone()).or_default();
            stats.evaluations += 1;

            match outcome {
                InstrumentOutcome::Insufficient => self.insufficient += 1,
                InstrumentOutcome::Rejected(reason) => {
                    *self.rejected.entry(reason.label().to_string()).or_insert(0) += 1;
                }
                InstrumentOutcome::Failed(_) => self.failed += 1,
                InstrumentOutcome::Sent(_) | InstrumentOutcome::SinkFailed(_) => {
                    stats.plans += 1;
                    stats.sent += 1;
                    self.sent += 1;
                    if matches!(outcome, InstrumentOutcome::SinkFailed(_)) {
                        self.sink_failures += 1;
                    }
                }
                InstrumentOutcome::Suppressed(decision) => {
                    stats.plans += 1;
                    stats.suppressed += 1;
                    self.suppressed += 1;
                    *self.suppressed_by.entry(decision.to_string()).or_insert(0) += 1;
                }
            }
        }
    }

    pub fn plans(&self) -> usize {
        self.sent + self.suppressed
    }

    pub fn print_summary(&self) {
        println!("\n{}", "=".repeat(70));
        println!("  REPLAY REPORT");
        println!("{}", "=".repeat(70));
        if let (Some(start), Some(end)) = (self.start, self.end) {
            println!(
                "  Period:      {} to {}",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M")
            );
        }
        println!("  Frames:      {}", self.frames);
        println!();
        println!("  PIPELINE");
        println!("  ───────────────────────────────────");
        println!("  Evaluations:  {}", self.evaluations);
        println!("  Insufficient: {}", self.insufficient);
        println!("  Failed:       {}", self.failed);
        println!("  Plans:        {}", self.plans());
        let mut rejected: Vec<_> = self.rejected.iter().collect();
        rejected.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (reason, count) in rejected {
            println!("    rejected {:<16} {}", reason, count);
        }
        println!();
        println!("  NOTIFICATIONS");
        println!("  ───────────────────────────────────");
        println!("  Sent:        {}", self.sent);
        println!("  Sink errors: {}", self.sink_failures);
        println!("  Suppressed:  {}", self.suppressed);
        println!(
            "  Send rate:   {:.1}%",
            if self.plans() > 0 {
                self.sent as f64 / self.plans() as f64 * 100.0
            } else {
                0.0
            }
        );
        let mut suppressed: Vec<_> = self.suppressed_by.iter().collect();
        suppressed.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        for (reason, count) in suppressed {
            println!("    {}: {}", reason, count);
        }

        if !self.per_instrument.is_empty() {
            println!();
            println!("  BY INSTRUMENT");
            println!("  ───────────────────────────────────");
            let mut instruments: Vec<_> = self.per_instrument.iter().collect();
            instruments.sort_by_key(|(k, _)| k.to_string());
            for (symbol, stats) in instruments {
                println!(
                    "  {:>10}: {} evals | {} plans | {} sent | {} suppressed",
                    symbol, stats.evaluations, stats.plans, stats.sent, stats.suppressed
                );
            }
        }

        if !self.alerts.is_empty() {
            println!();
            println!("  ALERTS");
            println!("  ───────────────────────────────────");
            for plan in &self.alerts {
                let at = DateTime::<Utc>::from_timestamp(plan.created_at, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("  {} {}", at, reasoning::summarize_plan(plan));
            }
        }

        println!("{}", "=".repeat(70));
    }
}
