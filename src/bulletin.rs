//! Markdown bulletins for the prediction card, results and scratchings.

use anyhow::Result;
use std::fmt::Write;
use tracing::info;

use crate::meeting::{PredictionCard, ResultsCard, ScratchUpdate, WeekendSelection};
use crate::types::HealthReport;

/// Delivery channel for formatted bulletins
pub trait Notifier: Send + Sync {
    fn send(&self, message: &str) -> Result<()>;
}

/// Writes bulletins to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send(&self, message: &str) -> Result<()> {
        info!(target: "racing_ai::bulletin", "\n{}", message);
        Ok(())
    }
}

fn pct(p: f64) -> String {
    format!("{:.1}%", p * 100.0)
}

/// Daily card: per track, one block per race, then weekend picks and health
pub fn format_prediction_card(card: &PredictionCard) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "🏇 *AI HORSE RACING PREDICTIONS - {}* 🏁\n", card.date);

    let mut current_track: Option<&str> = None;
    for line in &card.lines {
        if current_track != Some(line.track.as_str()) {
            let _ = writeln!(out, "🏟️ *{}*", line.track.to_uppercase());
            current_track = Some(line.track.as_str());
        }

        let pick = &line.top_pick;
        let _ = writeln!(
            out,
            "⏱️ {} | {}m | {} | {}",
            line.time,
            line.distance,
            line.going.name(),
            line.weather.name()
        );
        let _ = writeln!(out, "⭐ *Top Pick*: {} ({})", pick.horse, pct(pick.ai_win_prob));
        let _ = writeln!(out, "  Jockey: {} | Trainer: {}", pick.jockey, pick.trainer);
        let _ = writeln!(
            out,
            "  Weight: {}kg | Age: {}",
            pick.features.weight, pick.features.horse_age
        );
        if line.scratched > 0 {
            let _ = writeln!(out, "  🚫 {} scratchings", line.scratched);
        }
        out.push('\n');
    }

    let selections = card.weekend_selections();
    if !selections.is_empty() {
        out.push_str(&format_weekend_selections(&selections));
    }

    out.push('\n');
    out.push_str(&format_health_report(&card.health));
    out
}

pub fn format_weekend_selections(selections: &[WeekendSelection]) -> String {
    let mut out = String::from("🎯 *WEEKEND SELECTIONS* (AI Top Picks)\n");
    for (i, s) in selections.iter().enumerate() {
        let _ = writeln!(
            out,
            "{}. {} {} - {} ({})",
            i + 1,
            s.track,
            s.time,
            s.horse,
            pct(s.confidence)
        );
    }
    out
}

pub fn format_health_report(health: &HealthReport) -> String {
    let mut out = String::from("📊 *AI HEALTH REPORT*\n");
    let _ = writeln!(out, "  - Model Accuracy: {}", pct(health.recent_accuracy));
    let _ = writeln!(out, "  - Recent Success: {}", pct(health.top_pick_hit_rate));
    let _ = writeln!(out, "  - Self-Heals: {}", health.self_heals);
    let _ = writeln!(out, "  - Error Records: {}", health.error_records);
    let _ = writeln!(out, "  - Scratching Alerts: {}", health.scratch_alerts);
    let _ = writeln!(out, "  - Training Samples: {}", health.training_samples);
    out
}

pub fn format_scratch_update(update: &ScratchUpdate) -> String {
    let mut out = format!("⚠️ *SCRATCH UPDATE* - {} {}\n", update.track, update.time);
    for (horse, reason) in &update.scratched {
        let _ = writeln!(out, "🚫 {} - {}", horse, reason.name());
    }
    out
}

pub fn format_results(card: &ResultsCard) -> String {
    let mut out = String::from("🏁 *RACE RESULTS UPDATE* 🏁\n\n");
    for result in &card.results {
        let _ = writeln!(out, "🏟️ {} | ⏱️ {}", result.track, result.time);
        let _ = writeln!(
            out,
            "🥇 Winner: {} ({})",
            result.winner.horse, result.winner.jockey
        );
        let _ = writeln!(
            out,
            "📈 AI Prediction: {} ({})",
            result.predicted.horse,
            pct(result.predicted.ai_win_prob)
        );
        let _ = writeln!(out, "💡 Result: {}", if result.hit { "✅" } else { "❌" });
        if result.scratch_updates > 0 {
            let _ = writeln!(out, "  🚫 {} late scratchings", result.scratch_updates);
        }
        out.push('\n');
    }
    out.push_str("🧠 *AI Learning System Updated*");
    out
}
