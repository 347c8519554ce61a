//! Human-readable text for meta-signals and plans. Nothing here feeds back into decisions.

use crate::core::consensus::MetaSignal;
use crate::core::trade_plan::{GroupBreakdown, TradePlan};

pub fn group_breakdown(meta: &MetaSignal) -> Vec<GroupBreakdown> {
    meta.votes
        .iter()
        .map(|v| GroupBreakdown {
            group: v.group.clone(),
            direction: v.direction,
            strength: v.strength,
            confidence: v.confidence,
        })
        .collect()
}

/// One line: consensus, then each group's direction and strength.
pub fn reason_summary(meta: &MetaSignal) -> String {
    let groups: Vec<String> = meta
        .votes
        .iter()
        .map(|v| format!("{}:{}({:.0})", v.group, v.direction, v.strength))
        .collect();
    format!(
        "{} consensus {:.1}% from {} groups, confidence {:.1} | {}",
        meta.direction,
        meta.consensus_strength,
        meta.group_count,
        meta.confidence,
        groups.join(" ")
    )
}

/// Multi-line explanation of how the consensus was reached.
pub fn explain_meta(meta: &MetaSignal) -> String {
    if !meta.analysis_complete {
        return format!(
            "{}: analysis incomplete ({})",
            meta.symbol,
            meta.error.as_deref().unwrap_or("unknown reason")
        );
    }

    let mut lines = vec![format!(
        "{}: {} -> {} (strength {:.1}%, confidence {:.1})",
        meta.symbol, meta.direction, meta.recommended_action, meta.consensus_strength, meta.confidence
    )];

    let join = |groups: &[crate::models::AnalysisGroup]| {
        groups.iter().map(|g| g.to_string()).collect::<Vec<_>>().join(", ")
    };
    if !meta.supporting_groups.is_empty() {
        lines.push(format!("  Supporting: {}", join(&meta.supporting_groups)));
    }
    if !meta.opposing_groups.is_empty() {
        lines.push(format!("  Opposing: {}", join(&meta.opposing_groups)));
    }
    if !meta.neutral_groups.is_empty() {
        lines.push(format!("  Neutral: {}", join(&meta.neutral_groups)));
    }
    for d in &meta.divergences {
        lines.push(format!(
            "  Divergence: {} {} ({}, conf {:.0})",
            d.group, d.kind, d.direction, d.confidence
        ));
    }
    if let (Some(entry), Some(sl)) = (meta.entry, meta.stop_loss) {
        let targets: Vec<String> = meta.targets.iter().map(|t| format!("{:.4}", t)).collect();
        lines.push(format!(
            "  Levels: entry {:.4} stop {:.4} targets [{}] rr {:.2}",
            entry,
            sl,
            targets.join(", "),
            meta.risk_reward.unwrap_or(0.0)
        ));
    }
    lines.join("\n")
}

pub fn summarize_plan(plan: &TradePlan) -> String {
    format!(
        "{} {} @ {:.4} SL {:.4} TP1 {:.4} RR {:.2} conf {:.1} risk {}",
        plan.symbol,
        plan.side,
        plan.entry,
        plan.stop_loss,
        plan.tp1,
        plan.rr_ratio,
        plan.confidence,
        plan.risk_level
    )
}

/// Alert body handed to the sink.
pub fn format_alert(plan: &TradePlan) -> String {
    let mut lines = vec![
        format!("{} {} SETUP", plan.symbol, plan.side),
        format!("Entry: {:.4}", plan.entry),
        format!("Stop: {:.4}", plan.stop_loss),
        format!("TP1: {:.4}", plan.tp1),
    ];
    if let Some(tp2) = plan.tp2 {
        lines.push(format!("TP2: {:.4}", tp2));
    }
    if let Some(tp3) = plan.tp3 {
        lines.push(format!("TP3: {:.4}", tp3));
    }
    lines.push(format!("R:R {:.2}", plan.rr_ratio));
    lines.push(format!(
        "Confidence {:.1} | Confluence {:.0}% | Risk {} ({:.2})",
        plan.confidence, plan.confluence_score, plan.risk_level, plan.risk_score
    ));
    if !plan.timeframes.is_empty() {
        let tfs: Vec<&str> = plan.timeframes.iter().map(|t| t.as_str()).collect();
        lines.push(format!("Timeframes: {}", tfs.join(", ")));
    }
    lines.push(plan.reason_summary.clone());
    lines.join("\n")
}
