use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::alerts::{AlertSink, PlanStore};
use crate::config::Config;
use crate::core::consensus::ConsensusEngine;
use crate::core::notification_gate::{GateDecision, NotificationGate};
use crate::core::reasoning;
use crate::core::trade_plan::{PlanRejection, TradePlan, TradePlanBuilder};
use crate::sources::SignalSource;

#[derive(Debug, Clone, PartialEq)]
pub enum InstrumentOutcome {
    /// Too few valid groups for a consensus.
    Insufficient,
    Rejected(PlanRejection),
    Sent(GateDecision),
    /// Gate said send but the sink reported failure. Gate state still records a send.
    SinkFailed(GateDecision),
    Suppressed(GateDecision),
    /// Source error or a panicked evaluation task.
    Failed(String),
}

impl InstrumentOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InstrumentOutcome::Insufficient => "insufficient",
            InstrumentOutcome::Rejected(_) => "rejected",
            InstrumentOutcome::Sent(_) => "sent",
            InstrumentOutcome::SinkFailed(_) => "sink_failed",
            InstrumentOutcome::Suppressed(_) => "suppressed",
            InstrumentOutcome::Failed(_) => "failed",
        }
    }

    /// The gate handed the plan to the sink, whether or not delivery worked.
    pub fn was_sent(&self) -> bool {
        matches!(self, InstrumentOutcome::Sent(_) | InstrumentOutcome::SinkFailed(_))
    }
}

#[derive(Debug, Clone)]
pub struct CycleReport {
    pub at: DateTime<Utc>,
    /// In the order instruments were requested.
    pub outcomes: Vec<(String, InstrumentOutcome)>,
}

impl CycleReport {
    pub fn outcome(&self, symbol: &str) -> Option<&InstrumentOutcome> {
        self.outcomes.iter().find(|(s, _)| s == symbol).map(|(_, o)| o)
    }

    pub fn counts(&self) -> HashMap<&'static str, usize> {
        let mut counts = HashMap::new();
        for (_, outcome) in &self.outcomes {
            *counts.entry(outcome.label()).or_insert(0) += 1;
        }
        counts
    }

    pub fn sent(&self) -> usize {
        self.outcomes.iter().filter(|(_, o)| o.was_sent()).count()
    }

    pub fn log(&self) {
        let suppressed = self
            .outcomes
            .iter()
            .filter(|(_, o)| matches!(o, InstrumentOutcome::Suppressed(_)))
            .count();
        let failed = self
            .outcomes
            .iter()
            .filter(|(_, o)| matches!(o, InstrumentOutcome::Failed(_)))
            .count();
        info!(
            "Cycle {}: {} instrument(s) | sent {} | suppressed {} | failed {}",
            self.at.format("%H:%M:%S"),
            self.outcomes.len(),
            self.sent(),
            suppressed,
            failed
        );
    }
}

struct Pipeline {
    engine: ConsensusEngine,
    builder: TradePlanBuilder,
    gate: Arc<Mutex<NotificationGate>>,
    source: Arc<dyn SignalSource>,
    sink: Arc<dyn AlertSink>,
    store: Arc<dyn PlanStore>,
}

impl Pipeline {
    async fn evaluate(&self, symbol: &str, now: DateTime<Utc>) -> InstrumentOutcome {
        let snapshot = match self.source.fetch(symbol).await {
            Ok(s) => s,
            Err(e) => {
                warn!("{}: signal fetch failed: {:#}", symbol, e);
                return InstrumentOutcome::Failed(format!("{:#}", e));
            }
        };

        let meta = match self
            .engine
            .interpret(symbol, &snapshot.signals, snapshot.current_price)
        {
            Ok(m) => m,
            Err(e) => {
                debug!("{}", e);
                return InstrumentOutcome::Insufficient;
            }
        };
        debug!("{}", reasoning::explain_meta(&meta));

        let price = snapshot.current_price.or(meta.entry).unwrap_or(0.0);
        let plan = match self.builder.evaluate(
            symbol,
            price,
            &meta,
            snapshot.levels.as_ref(),
            &snapshot.risk,
            now,
        ) {
            Ok(p) => p,
            Err(reason) => {
                debug!("{}: no plan: {}", symbol, reason);
                return InstrumentOutcome::Rejected(reason);
            }
        };

        // Lock released across the sink call; one in-flight evaluation per symbol.
        let decision = self.gate.lock().await.decide(symbol, &plan, now);

        if decision.should_send() {
            info!("{}: {} ({})", symbol, reasoning::summarize_plan(&plan), decision);
            let delivered = self.sink.send(&plan).await;
            self.gate.lock().await.remember(symbol, &plan, true, now);
            self.persist(symbol, plan, true, now).await;
            if delivered {
                InstrumentOutcome::Sent(decision)
            } else {
                InstrumentOutcome::SinkFailed(decision)
            }
        } else {
            debug!("{}: suppressed: {}", symbol, decision);
            self.gate.lock().await.remember(symbol, &plan, false, now);
            self.persist(symbol, plan, false, now).await;
            InstrumentOutcome::Suppressed(decision)
        }
    }

    /// Store writes may block, so they run on the blocking pool. Awaited to
    /// keep history in evaluation order.
    async fn persist(&self, symbol: &str, plan: TradePlan, sent: bool, now: DateTime<Utc>) {
        let store = self.store.clone();
        let sym = symbol.to_string();
        let res = tokio::task::spawn_blocking(move || store.persist(&sym, &plan, sent, now)).await;
        if let Err(e) = res {
            warn!("{}: plan store task failed: {}", symbol, e);
        }
    }
}

/// Drives the consensus, plan and gate stages over a set of instruments once per cycle.
pub struct Scanner {
    instruments: Vec<String>,
    scan_interval: Duration,
    pipeline: Arc<Pipeline>,
}

impl Scanner {
    pub fn new(
        cfg: &Config,
        source: Arc<dyn SignalSource>,
        sink: Arc<dyn AlertSink>,
        store: Arc<dyn PlanStore>,
    ) -> Self {
        let engine = ConsensusEngine::new(cfg);
        let builder = TradePlanBuilder::new(cfg).with_level_strategy(engine.level_strategy());

        let mut instruments: Vec<String> = Vec::new();
        for symbol in &cfg.instruments {
            if !instruments.contains(symbol) {
                instruments.push(symbol.clone());
            }
        }

        Self {
            instruments,
            scan_interval: Duration::from_secs(cfg.scan_interval.max(1)),
            pipeline: Arc::new(Pipeline {
                engine,
                builder,
                gate: Arc::new(Mutex::new(NotificationGate::new(cfg))),
                source,
                sink,
                store,
            }),
        }
    }

    pub fn instruments(&self) -> &[String] {
        &self.instruments
    }

    pub fn gate(&self) -> Arc<Mutex<NotificationGate>> {
        self.pipeline.gate.clone()
    }

    /// One pass over the configured instruments, all sharing `now`.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        self.run_symbols(&self.instruments, now).await
    }

    /// Evaluates `symbols` concurrently, one task per distinct symbol. Repeats
    /// are dropped so the gate never sees two evaluations of one instrument in
    /// flight. A failing or panicking instrument yields `Failed` without
    /// affecting the others.
    pub async fn run_symbols(&self, symbols: &[String], now: DateTime<Utc>) -> CycleReport {
        let mut distinct: Vec<&String> = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            if !distinct.contains(&symbol) {
                distinct.push(symbol);
            }
        }

        let mut handles = Vec::with_capacity(distinct.len());
        for symbol in distinct {
            let pipeline = self.pipeline.clone();
            let sym = symbol.clone();
            let handle = tokio::spawn(async move { pipeline.evaluate(&sym, now).await });
            handles.push((symbol.clone(), handle));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (symbol, handle) in handles {
            let outcome = match handle.await {
                Ok(o) => o,
                Err(e) => {
                    error!("{}: evaluation task failed: {}", symbol, e);
                    InstrumentOutcome::Failed(e.to_string())
                }
            };
            outcomes.push((symbol, outcome));
        }

        CycleReport { at: now, outcomes }
    }

    /// Runs cycles on the scan interval until `shutdown` turns true or its sender
    /// is dropped. An in-flight cycle is always finished. Returns the cycle count.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut ticker = tokio::time::interval(self.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0usize;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            let report = self.run_cycle(Utc::now()).await;
            report.log();
            cycles += 1;
        }

        info!("Scanner stopped after {} cycle(s)", cycles);
        cycles
    }
}
