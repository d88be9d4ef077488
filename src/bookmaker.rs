//! Bookmaker adjustments and per-race probability normalization.
//!
//! Two deterministic "bookmaker" columns are derived from the model's raw
//! score and a few of the runner's own features. Each of the three columns
//! is then rescaled to sum to 1 over the runners still in the race.

use crate::types::{EntryFeatures, PredictionRow, PredictionTable, Race};

/// Hollywoodbets bias: favours strong trainers, marks down injury risk
pub fn hollywoodbets_factor(f: &EntryFeatures) -> f64 {
    (0.9 + 0.2 * f.trainer_win_rate) * (1.1 - 0.3 * f.injury_risk)
}

/// Betway bias: favours recent form, marks down older horses
pub fn betway_factor(f: &EntryFeatures) -> f64 {
    (0.85 + 0.15 * (f.recent_form * 3.0).tanh()) * (1.05 - 0.2 * f.horse_age / 10.0)
}

/// Rescale to sum to 1; falls back to uniform when the mass is not positive
pub fn normalize(values: &mut [f64]) {
    if values.is_empty() {
        return;
    }
    let total: f64 = values.iter().sum();
    if total > 0.0 && total.is_finite() {
        values.iter_mut().for_each(|v| *v /= total);
    } else {
        let uniform = 1.0 / values.len() as f64;
        values.iter_mut().for_each(|v| *v = uniform);
    }
}

/// Build the ranked table for a race from raw scores of its active entries.
///
/// `raw_scores[i]` belongs to the i-th non-scratched entry, in entry order.
/// Returns an empty table when every entry is scratched.
pub fn build_prediction_table(race: &Race, raw_scores: &[f64]) -> PredictionTable {
    let active: Vec<_> = race.active_entries().collect();
    let n = active.len().min(raw_scores.len());

    let mut ai: Vec<f64> = raw_scores[..n].to_vec();
    let mut hollywood: Vec<f64> = active[..n]
        .iter()
        .zip(&ai)
        .map(|(e, p)| p * hollywoodbets_factor(&e.features))
        .collect();
    let mut betway: Vec<f64> = active[..n]
        .iter()
        .zip(&ai)
        .map(|(e, p)| p * betway_factor(&e.features))
        .collect();

    normalize(&mut ai);
    normalize(&mut hollywood);
    normalize(&mut betway);

    let mut rows: Vec<PredictionRow> = active[..n]
        .iter()
        .enumerate()
        .map(|(i, e)| PredictionRow {
            horse_id: e.horse_id.clone(),
            horse: e.horse.clone(),
            jockey: e.jockey.clone(),
            trainer: e.trainer.clone(),
            features: e.features,
            ai_win_prob: ai[i],
            hollywoodbets: hollywood[i],
            betway: betway[i],
        })
        .collect();

    rows.sort_by(|a, b| b.ai_win_prob.total_cmp(&a.ai_win_prob));

    PredictionTable {
        race_id: race.race_id.clone(),
        rows,
    }
}
