//! Configuration for the racing engine.

use anyhow::anyhow;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Simulation configuration (pools, fields, scratches)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_tracks")]
    pub tracks: Vec<String>,
    #[serde(default = "default_horse_pool_size")]
    pub horse_pool_size: usize,
    #[serde(default = "default_jockey_pool_size")]
    pub jockey_pool_size: usize,
    #[serde(default = "default_trainer_pool_size")]
    pub trainer_pool_size: usize,
    /// Base per-check withdrawal probability for one runner
    #[serde(default = "default_scratch_probability")]
    pub scratch_probability: f64,
    #[serde(default = "default_min_field")]
    pub min_field: usize,
    #[serde(default = "default_max_field")]
    pub max_field: usize,
    /// Fixed seed for pools and races; entropy when absent
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_tracks() -> Vec<String> {
    ["Ascot", "Goodwood", "York", "Newmarket", "Doncaster"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_horse_pool_size() -> usize {
    200
}

fn default_jockey_pool_size() -> usize {
    50
}

fn default_trainer_pool_size() -> usize {
    30
}

fn default_scratch_probability() -> f64 {
    0.05
}

fn default_min_field() -> usize {
    8
}

fn default_max_field() -> usize {
    16
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tracks: default_tracks(),
            horse_pool_size: default_horse_pool_size(),
            jockey_pool_size: default_jockey_pool_size(),
            trainer_pool_size: default_trainer_pool_size(),
            scratch_probability: default_scratch_probability(),
            min_field: default_min_field(),
            max_field: default_max_field(),
            seed: None,
        }
    }
}

/// Classifier hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// Seed of the train/test split
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

fn default_n_estimators() -> usize {
    300
}

fn default_learning_rate() -> f64 {
    0.05
}

fn default_max_depth() -> usize {
    7
}

fn default_min_samples_leaf() -> usize {
    1
}

fn default_random_state() -> u64 {
    42
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            n_estimators: default_n_estimators(),
            learning_rate: default_learning_rate(),
            max_depth: default_max_depth(),
            min_samples_leaf: default_min_samples_leaf(),
            random_state: default_random_state(),
        }
    }
}

/// Bulletin schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// IANA zone the schedule, the card date and "today" are read in
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Time of the daily prediction card in `timezone` ("HH:MM")
    #[serde(default = "default_predictions_at")]
    pub predictions_at: String,
    /// Time of the nightly results run in `timezone` ("HH:MM")
    #[serde(default = "default_results_at")]
    pub results_at: String,
    #[serde(default = "default_scratch_interval_secs")]
    pub scratch_interval_secs: u64,
    #[serde(default = "default_first_race_hour")]
    pub first_race_hour: u32,
    #[serde(default = "default_last_race_hour")]
    pub last_race_hour: u32,
    #[serde(default = "default_race_minutes")]
    pub race_minutes: Vec<u32>,
}

fn default_timezone() -> String {
    "Europe/London".to_string()
}

fn default_predictions_at() -> String {
    "09:00".to_string()
}

fn default_results_at() -> String {
    "20:00".to_string()
}

fn default_scratch_interval_secs() -> u64 {
    1800
}

fn default_first_race_hour() -> u32 {
    13
}

fn default_last_race_hour() -> u32 {
    17
}

fn default_race_minutes() -> Vec<u32> {
    vec![15, 30, 45]
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            predictions_at: default_predictions_at(),
            results_at: default_results_at(),
            scratch_interval_secs: default_scratch_interval_secs(),
            first_race_hour: default_first_race_hour(),
            last_race_hour: default_last_race_hour(),
            race_minutes: default_race_minutes(),
        }
    }
}

impl ScheduleConfig {
    pub fn tz(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow!("Invalid timezone {}: {}", self.timezone, e))
    }

    /// Race slots of one meeting day, "HH:MM" in running order
    pub fn race_times(&self) -> Vec<String> {
        (self.first_race_hour..=self.last_race_hour)
            .flat_map(|h| self.race_minutes.iter().map(move |m| format!("{:02}:{:02}", h, m)))
            .collect()
    }
}

/// Wall-clock time in `tz` at the instant `now`
pub fn local_time(tz: Tz, now: DateTime<Utc>) -> NaiveDateTime {
    now.with_timezone(&tz).naive_local()
}

/// Current date in `tz`
pub fn today_in(tz: Tz) -> NaiveDate {
    local_time(tz, Utc::now()).date()
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    /// Load configuration from environment and config file
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // Add config file if exists
            .add_source(config::File::with_name("config").required(false))
            // Override with environment variables (RACING_SERVER__PORT, RACING_SIMULATION__SEED, etc.)
            .add_source(
                config::Environment::with_prefix("RACING")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

/// Feature names in model input order
pub const FEATURE_NAMES: [&str; 15] = [
    "horse_age",
    "jockey_win_rate",
    "trainer_win_rate",
    "weight",
    "distance_suitability",
    "track_record",
    "going_preference",
    "days_since_last_run",
    "recent_form",
    "injury_risk",
    "news_sentiment",
    "course_specialty",
    "class_drop",
    "speed_rating",
    "stamina_index",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_race_times() {
        let schedule = ScheduleConfig::default();
        let times = schedule.race_times();
        assert_eq!(times.len(), 15);
        assert_eq!(times[0], "13:15");
        assert_eq!(times[14], "17:45");
    }

    #[test]
    fn test_default_timezone() {
        let schedule = ScheduleConfig::default();
        assert_eq!(schedule.tz().unwrap(), chrono_tz::Europe::London);
    }

    #[test]
    fn test_invalid_timezone() {
        let schedule = ScheduleConfig {
            timezone: "Mars/Olympus_Mons".to_string(),
            ..Default::default()
        };
        let err = schedule.tz().unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus_Mons"));
    }

    #[test]
    fn test_local_time_follows_zone() {
        let instant = NaiveDate::from_ymd_opt(2026, 6, 19)
            .unwrap()
            .and_hms_opt(23, 30, 0)
            .unwrap()
            .and_utc();

        // BST is UTC+1: late evening in UTC is already tomorrow in London
        let london = local_time(chrono_tz::Europe::London, instant);
        assert_eq!(london.date(), NaiveDate::from_ymd_opt(2026, 6, 20).unwrap());
        assert_eq!(london.format("%H:%M").to_string(), "00:30");

        let utc = local_time(chrono_tz::UTC, instant);
        assert_eq!(utc.date(), NaiveDate::from_ymd_opt(2026, 6, 19).unwrap());
    }

    #[test]
    fn test_default_simulation() {
        let sim = SimulationConfig::default();
        assert_eq!(sim.tracks.len(), 5);
        assert_eq!(sim.horse_pool_size, 200);
        assert!((sim.scratch_probability - 0.05).abs() < 1e-12);
        assert!(sim.seed.is_none());
    }

    #[test]
    fn test_config_json_partial() {
        let json = r#"{"simulation": {"seed": 7, "min_field": 10}, "model": {"max_depth": 3}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.simulation.seed, Some(7));
        assert_eq!(config.simulation.min_field, 10);
        assert_eq!(config.simulation.max_field, 16);
        assert_eq!(config.model.max_depth, 3);
        assert_eq!(config.model.n_estimators, 300);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.schedule.timezone, "Europe/London");
    }

    #[test]
    fn test_config_json_timezone_override() {
        let json = r#"{"schedule": {"timezone": "Africa/Johannesburg"}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.schedule.tz().unwrap(), chrono_tz::Africa::Johannesburg);
        assert_eq!(config.schedule.predictions_at, "09:00");
    }
}
