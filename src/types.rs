//! Race, entry, prediction and response types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ground condition of a race
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Going {
    Good,
    #[serde(rename = "Good to Soft")]
    GoodToSoft,
    Soft,
    Heavy,
    Firm,
}

impl Going {
    /// Conditions a race can be run on
    pub const ALL: [Going; 5] = [
        Going::Good,
        Going::GoodToSoft,
        Going::Soft,
        Going::Heavy,
        Going::Firm,
    ];

    /// Conditions a horse can prefer
    pub const PREFERRED: [Going; 3] = [Going::Good, Going::Soft, Going::Firm];

    pub fn name(&self) -> &'static str {
        match self {
            Going::Good => "Good",
            Going::GoodToSoft => "Good to Soft",
            Going::Soft => "Soft",
            Going::Heavy => "Heavy",
            Going::Firm => "Firm",
        }
    }
}

/// Weather on race day
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weather {
    Sunny,
    Cloudy,
    #[serde(rename = "Light Rain")]
    LightRain,
    #[serde(rename = "Heavy Rain")]
    HeavyRain,
}

impl Weather {
    pub const ALL: [Weather; 4] = [
        Weather::Sunny,
        Weather::Cloudy,
        Weather::LightRain,
        Weather::HeavyRain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Weather::Sunny => "Sunny",
            Weather::Cloudy => "Cloudy",
            Weather::LightRain => "Light Rain",
            Weather::HeavyRain => "Heavy Rain",
        }
    }
}

/// Why a runner was withdrawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScratchReason {
    #[serde(rename = "Late veterinary concern")]
    LateVeterinaryConcern,
    #[serde(rename = "Travel issues")]
    TravelIssues,
    #[serde(rename = "Owner decision")]
    OwnerDecision,
    #[serde(rename = "Ground conditions")]
    GroundConditions,
    #[serde(rename = "Jockey illness")]
    JockeyIllness,
}

impl ScratchReason {
    pub const ALL: [ScratchReason; 5] = [
        ScratchReason::LateVeterinaryConcern,
        ScratchReason::TravelIssues,
        ScratchReason::OwnerDecision,
        ScratchReason::GroundConditions,
        ScratchReason::JockeyIllness,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ScratchReason::LateVeterinaryConcern => "Late veterinary concern",
            ScratchReason::TravelIssues => "Travel issues",
            ScratchReason::OwnerDecision => "Owner decision",
            ScratchReason::GroundConditions => "Ground conditions",
            ScratchReason::JockeyIllness => "Jockey illness",
        }
    }
}

/// Numeric features of one runner (15 features matching model input)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct EntryFeatures {
    // Horse
    pub horse_age: f64,
    // Connections
    pub jockey_win_rate: f64,
    pub trainer_win_rate: f64,
    pub weight: f64, // kg carried
    // Suitability
    pub distance_suitability: f64,
    pub track_record: f64,
    pub going_preference: f64,
    pub days_since_last_run: f64,
    pub recent_form: f64,
    pub injury_risk: f64,
    pub news_sentiment: f64,
    pub course_specialty: f64,
    pub class_drop: f64,
    // Derived indices
    pub speed_rating: f64,
    pub stamina_index: f64,
}

impl EntryFeatures {
    /// Convert features to array in model input order
    pub fn to_array(&self) -> [f64; 15] {
        [
            self.horse_age,
            self.jockey_win_rate,
            self.trainer_win_rate,
            self.weight,
            self.distance_suitability,
            self.track_record,
            self.going_preference,
            self.days_since_last_run,
            self.recent_form,
            self.injury_risk,
            self.news_sentiment,
            self.course_specialty,
            self.class_drop,
            self.speed_rating,
            self.stamina_index,
        ]
    }
}

/// One model input row: numeric features plus the race's categorical context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub features: EntryFeatures,
    pub going: Going,
    pub weather: Weather,
}

/// One runner in one race
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub horse_id: String,
    pub horse: String,
    pub jockey: String,
    pub trainer: String,
    pub features: EntryFeatures,
    /// Never reset once set within a race
    pub is_scratched: bool,
    pub scratch_reason: Option<ScratchReason>,
}

/// A race card slot with its field
#[derive(Debug, Clone, Serialize)]
pub struct Race {
    pub race_id: String,
    pub track: String,
    pub date: NaiveDate,
    pub time: String,
    pub distance: u32,
    pub going: Going,
    pub weather: Weather,
    pub entries: Vec<Entry>,
    pub last_scratch_check: DateTime<Utc>,
    pub scratch_updates: u32,
    /// Table computed for the current active field, dropped on any new scratch
    pub predictions: Option<PredictionTable>,
    /// Winner index into `predictions.rows`
    pub result: Option<usize>,
}

impl Race {
    /// Entries still running
    pub fn active_entries(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter().filter(|e| !e.is_scratched)
    }

    pub fn scratched_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_scratched).count()
    }

    /// Model input row for one of this race's entries
    pub fn feature_row(&self, entry: &Entry) -> FeatureRow {
        FeatureRow {
            features: entry.features,
            going: self.going,
            weather: self.weather,
        }
    }
}

/// One ranked runner with model and bookmaker probabilities
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRow {
    pub horse_id: String,
    pub horse: String,
    pub jockey: String,
    pub trainer: String,
    pub features: EntryFeatures,
    pub ai_win_prob: f64,
    pub hollywoodbets: f64,
    pub betway: f64,
}

/// Ranked prediction table for one race (sorted by `ai_win_prob` descending)
#[derive(Debug, Clone, Serialize, Default)]
pub struct PredictionTable {
    pub race_id: String,
    pub rows: Vec<PredictionRow>,
}

impl PredictionTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Highest ranked runner
    pub fn top_pick(&self) -> Option<&PredictionRow> {
        self.rows.first()
    }

    /// Sums of (ai_win_prob, hollywoodbets, betway)
    pub fn column_sums(&self) -> (f64, f64, f64) {
        self.rows.iter().fold((0.0, 0.0, 0.0), |acc, r| {
            (acc.0 + r.ai_win_prob, acc.1 + r.hollywoodbets, acc.2 + r.betway)
        })
    }
}

/// Realized (features, outcome) pair kept in the training history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    pub row: FeatureRow,
    /// 1 for the race winner, 0 otherwise
    pub outcome: u8,
}

/// Summary of one retrain's misclassified test samples
#[derive(Debug, Clone, Serialize)]
pub struct ErrorAnalysis {
    pub timestamp: DateTime<Utc>,
    pub error_count: usize,
    pub feature_means: HashMap<String, f64>,
}

/// Scratch log record
#[derive(Debug, Clone, Serialize)]
pub struct ScratchRecord {
    pub race_id: String,
    pub horse: String,
    pub reason: ScratchReason,
    pub timestamp: DateTime<Utc>,
}

/// Settled race
#[derive(Debug, Clone, Serialize)]
pub struct RaceResult {
    pub race_id: String,
    pub track: String,
    pub time: String,
    pub winner: PredictionRow,
    pub predicted: PredictionRow,
    pub hit: bool,
    pub scratch_updates: u32,
}

/// Model and simulator diagnostics
#[derive(Debug, Clone, Serialize, Default)]
pub struct HealthReport {
    /// Mean of the last 5 accuracies, 0 before any retrain
    pub recent_accuracy: f64,
    pub accuracy_history: Vec<f64>,
    pub error_records: usize,
    pub scratch_alerts: usize,
    pub training_samples: usize,
    pub train_calls: usize,
    pub retrains: usize,
    pub self_heals: usize,
    pub races_settled: usize,
    /// Share of settled races won by the top pick
    pub top_pick_hit_rate: f64,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Bulletin response: structured payload plus the formatted message
#[derive(Debug, Serialize)]
pub struct BulletinResponse<T> {
    pub data: T,
    pub message: String,
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FEATURE_NAMES;

    fn entry(id: &str, scratched: bool) -> Entry {
        Entry {
            horse_id: id.to_string(),
            horse: format!("Horse_{}", id),
            jockey: "Jockey_1".to_string(),
            trainer: "Trainer_1".to_string(),
            features: EntryFeatures::default(),
            is_scratched: scratched,
            scratch_reason: if scratched {
                Some(ScratchReason::OwnerDecision)
            } else {
                None
            },
        }
    }

    #[test]
    fn test_to_array_order() {
        let features = EntryFeatures {
            horse_age: 5.0,
            distance_suitability: 0.9,
            stamina_index: 1.2,
            ..Default::default()
        };
        let arr = features.to_array();
        assert_eq!(arr.len(), FEATURE_NAMES.len());
        assert_eq!(arr[0], 5.0);
        assert_eq!(arr[4], 0.9);
        assert_eq!(arr[14], 1.2);
    }

    #[test]
    fn test_race_active_entries() {
        let race = Race {
            race_id: "York_20260101_1315".to_string(),
            track: "York".to_string(),
            date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            time: "13:15".to_string(),
            distance: 1600,
            going: Going::Good,
            weather: Weather::Sunny,
            entries: vec![entry("1", false), entry("2", true), entry("3", false)],
            last_scratch_check: Utc::now(),
            scratch_updates: 1,
            predictions: None,
            result: None,
        };

        let active: Vec<_> = race.active_entries().map(|e| e.horse_id.as_str()).collect();
        assert_eq!(active, vec!["1", "3"]);
        assert_eq!(race.scratched_count(), 1);

        let row = race.feature_row(&race.entries[0]);
        assert_eq!(row.going, Going::Good);
        assert_eq!(row.weather, Weather::Sunny);
    }

    #[test]
    fn test_category_names_match_serde() {
        for going in Going::ALL {
            let json = serde_json::to_string(&going).unwrap();
            assert_eq!(json, format!("\"{}\"", going.name()));
        }
        for reason in ScratchReason::ALL {
            let json = serde_json::to_string(&reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.name()));
        }
        assert_eq!(serde_json::to_string(&Weather::LightRain).unwrap(), "\"Light Rain\"");
    }
}
