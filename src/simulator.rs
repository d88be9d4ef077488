//! Racing simulator: owns the pools, the model and the scratch log, and
//! settles races through the predict → draw → learn feedback loop.
//!
//! Winners are drawn from the model's own normalized probabilities and then
//! fed back as training labels, so the model partly learns from itself.

use anyhow::Result;
use chrono::NaiveDate;
use chrono_tz::Tz;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::bookmaker::build_prediction_table;
use crate::config::{today_in, AppConfig, SimulationConfig};
use crate::model::SelfHealingModel;
use crate::pools::EntityPools;
use crate::race_card;
use crate::types::{
    FeatureRow, HealthReport, PredictionTable, Race, RaceResult, ScratchRecord, TrainingSample,
};

/// Accuracy entries averaged for the health report
const RECENT_ACCURACY_WINDOW: usize = 5;

pub struct RacingSimulator {
    config: SimulationConfig,
    pools: EntityPools,
    model: SelfHealingModel,
    scratch_log: Vec<ScratchRecord>,
    rng: StdRng,
    timezone: Tz,
    races_settled: usize,
    top_pick_hits: usize,
}

impl RacingSimulator {
    /// Build pools from the configured seed (entropy when unset)
    pub fn new(config: &AppConfig) -> Result<Self> {
        let timezone = config.schedule.tz()?;
        let mut rng = match config.simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let pools = EntityPools::generate(&config.simulation, &mut rng);
        info!(
            "Simulator ready: {} horses, {} jockeys, {} trainers",
            pools.horses.len(),
            pools.jockeys.len(),
            pools.trainers.len()
        );

        Ok(Self {
            config: config.simulation.clone(),
            pools,
            model: SelfHealingModel::new(config.model.clone()),
            scratch_log: Vec::new(),
            rng,
            timezone,
            races_settled: 0,
            top_pick_hits: 0,
        })
    }

    /// Current date in the schedule's timezone
    pub fn today(&self) -> NaiveDate {
        today_in(self.timezone)
    }

    /// Generate a race dated today
    pub fn generate_race(&mut self, track: &str, time: &str) -> Result<Race> {
        let today = self.today();
        self.generate_race_on(track, today, time)
    }

    pub fn generate_race_on(&mut self, track: &str, date: NaiveDate, time: &str) -> Result<Race> {
        race_card::generate_race(&mut self.rng, &self.pools, &self.config, track, date, time)
    }

    /// Draw late scratchings; true iff something new was scratched
    pub fn check_for_scratches(&mut self, race: &mut Race) -> bool {
        race_card::check_for_scratches(
            &mut self.rng,
            race,
            self.config.scratch_probability,
            &mut self.scratch_log,
        )
    }

    /// Ranked table over the race's active entries
    pub fn generate_predictions(&self, race: &Race) -> PredictionTable {
        let rows: Vec<FeatureRow> = race.active_entries().map(|e| race.feature_row(e)).collect();
        if rows.is_empty() {
            return PredictionTable {
                race_id: race.race_id.clone(),
                rows: Vec::new(),
            };
        }

        let scores = self.model.predict(&rows);
        build_prediction_table(race, &scores)
    }

    /// Weighted draw of the winner's row index in the attached table
    pub fn simulate_results(&mut self, race: &Race) -> Option<usize> {
        let table = race.predictions.as_ref()?;
        if table.is_empty() {
            return None;
        }

        let weights: Vec<f64> = table.rows.iter().map(|r| r.ai_win_prob).collect();
        match WeightedIndex::new(&weights) {
            Ok(dist) => Some(dist.sample(&mut self.rng)),
            Err(e) => {
                debug!("Falling back to a uniform winner draw: {}", e);
                Some(self.rng.gen_range(0..table.len()))
            }
        }
    }

    /// Feed the race's realized outcome back into the model.
    ///
    /// Every entry (scratched ones included) becomes a sample; the winner
    /// row of the attached table is the only positive.
    pub fn update_model(&mut self, race: &Race) {
        let winner_id = race
            .predictions
            .as_ref()
            .zip(race.result)
            .and_then(|(table, idx)| table.rows.get(idx))
            .map(|row| row.horse_id.as_str());

        let samples: Vec<TrainingSample> = race
            .entries
            .iter()
            .map(|e| TrainingSample {
                row: race.feature_row(e),
                outcome: u8::from(Some(e.horse_id.as_str()) == winner_id),
            })
            .collect();

        self.model.add_results(samples);

        if self.model.needs_self_heal() {
            self.model.self_heal();
        }
    }

    /// Settle a race: scratches, fresh table, winner draw, model update.
    ///
    /// Returns `None` when nobody is left to run.
    pub fn resolve_race(&mut self, race: &mut Race) -> Option<RaceResult> {
        self.check_for_scratches(race);

        let table = self.generate_predictions(race);
        if table.is_empty() {
            info!("No runners left in {}, race void", race.race_id);
            race.predictions = None;
            race.result = None;
            return None;
        }
        race.predictions = Some(table);

        let winner_idx = self.simulate_results(race)?;
        race.result = Some(winner_idx);

        let table = race.predictions.as_ref()?;
        let winner = table.rows.get(winner_idx)?.clone();
        let predicted = table.top_pick()?.clone();
        let hit = winner.horse_id == predicted.horse_id;

        self.races_settled += 1;
        if hit {
            self.top_pick_hits += 1;
        }
        info!(
            "Settled {}: winner {} | predicted {} | {}",
            race.race_id,
            winner.horse,
            predicted.horse,
            if hit { "hit" } else { "miss" }
        );

        self.update_model(race);

        Some(RaceResult {
            race_id: race.race_id.clone(),
            track: race.track.clone(),
            time: race.time.clone(),
            winner,
            predicted,
            hit,
            scratch_updates: race.scratch_updates,
        })
    }

    pub fn health_report(&self) -> HealthReport {
        HealthReport {
            recent_accuracy: self.model.recent_accuracy(RECENT_ACCURACY_WINDOW),
            accuracy_history: self.model.accuracy_history().to_vec(),
            error_records: self.model.error_analysis().len(),
            scratch_alerts: self.scratch_log.len(),
            training_samples: self.model.history().len(),
            train_calls: self.model.train_calls(),
            retrains: self.model.retrains(),
            self_heals: self.model.self_heals(),
            races_settled: self.races_settled,
            top_pick_hit_rate: if self.races_settled == 0 {
                0.0
            } else {
                self.top_pick_hits as f64 / self.races_settled as f64
            },
        }
    }

    #[cfg(test)]
    pub fn model(&self) -> &SelfHealingModel {
        &self.model
    }

    #[cfg(test)]
    pub fn scratch_log(&self) -> &[ScratchRecord] {
        &self.scratch_log
    }

    pub fn tracks(&self) -> &[String] {
        &self.config.tracks
    }

    #[cfg(test)]
    pub fn simulation_config_mut(&mut self) -> &mut SimulationConfig {
        &mut self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;

    fn test_config(scratch_probability: f64) -> AppConfig {
        let mut config = AppConfig::default();
        config.simulation.seed = Some(7);
        config.simulation.min_field = 10;
        config.simulation.max_field = 10;
        config.simulation.scratch_probability = scratch_probability;
        config.model = ModelConfig {
            n_estimators: 10,
            learning_rate: 0.1,
            max_depth: 3,
            ..Default::default()
        };
        config
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, 19).unwrap()
    }

    #[test]
    fn test_ten_runner_race_end_to_end() {
        let mut sim = RacingSimulator::new(&test_config(0.0)).unwrap();
        let mut race = sim.generate_race_on("Ascot", date(), "13:15").unwrap();
        assert_eq!(race.entries.len(), 10);

        assert!(!sim.check_for_scratches(&mut race));
        let table = sim.generate_predictions(&race);
        assert_eq!(table.len(), 10);

        let (ai, hb, bw) = table.column_sums();
        assert!((ai - 1.0).abs() < 1e-6);
        assert!((hb - 1.0).abs() < 1e-6);
        assert!((bw - 1.0).abs() < 1e-6);
        // Untrained model scores everyone the same
        assert!(table.rows.iter().all(|r| (r.ai_win_prob - 0.1).abs() < 1e-9));

        race.predictions = Some(table);
        let winner = sim.simulate_results(&race).unwrap();
        assert!(winner < 10);
        race.result = Some(winner);

        sim.update_model(&race);
        let history = sim.model().history();
        assert_eq!(history.len(), 10);
        assert_eq!(history.iter().filter(|s| s.outcome == 1).count(), 1);
    }

    #[test]
    fn test_simulate_results_without_table() {
        let mut sim = RacingSimulator::new(&test_config(0.0)).unwrap();
        let mut race = sim.generate_race_on("York", date(), "14:00").unwrap();
        assert_eq!(sim.simulate_results(&race), None);

        race.predictions = Some(PredictionTable::default());
        assert_eq!(sim.simulate_results(&race), None);
    }

    #[test]
    fn test_winner_index_always_in_range() {
        let mut sim = RacingSimulator::new(&test_config(0.2)).unwrap();
        for i in 0..30 {
            let mut race = sim.generate_race_on("Goodwood", date(), "15:30").unwrap();
            sim.check_for_scratches(&mut race);
            let table = sim.generate_predictions(&race);
            let n = table.len();
            assert_eq!(n, race.active_entries().count());
            race.predictions = Some(table);

            match sim.simulate_results(&race) {
                Some(idx) => assert!(idx < n, "race {}", i),
                None => assert_eq!(n, 0),
            }
        }
    }

    #[test]
    fn test_update_model_without_result_is_all_losers() {
        let mut sim = RacingSimulator::new(&test_config(0.0)).unwrap();
        let race = sim.generate_race_on("York", date(), "16:15").unwrap();
        sim.update_model(&race);
        assert_eq!(sim.model().history().len(), 10);
        assert!(sim.model().history().iter().all(|s| s.outcome == 0));
    }

    #[test]
    fn test_update_model_includes_scratched_entries() {
        let mut sim = RacingSimulator::new(&test_config(0.0)).unwrap();
        let mut race = sim.generate_race_on("York", date(), "16:30").unwrap();
        race.entries[0].is_scratched = true;
        race.entries[1].is_scratched = true;

        let table = sim.generate_predictions(&race);
        assert_eq!(table.len(), 8);
        race.predictions = Some(table);
        race.result = Some(0);

        sim.update_model(&race);
        let history = sim.model().history();
        assert_eq!(history.len(), 10);
        assert_eq!(history.iter().filter(|s| s.outcome == 1).count(), 1);
        assert_eq!(history[0].outcome, 0);
        assert_eq!(history[1].outcome, 0);
    }

    #[test]
    fn test_resolve_race_pipeline() {
        let mut sim = RacingSimulator::new(&test_config(0.0)).unwrap();
        let mut race = sim.generate_race_on("Newmarket", date(), "17:45").unwrap();

        let result = sim.resolve_race(&mut race).unwrap();
        assert_eq!(result.race_id, race.race_id);
        let table = race.predictions.as_ref().unwrap();
        assert_eq!(table.rows[race.result.unwrap()].horse_id, result.winner.horse_id);
        assert_eq!(table.rows[0].horse_id, result.predicted.horse_id);
        assert_eq!(result.hit, result.winner.horse_id == result.predicted.horse_id);

        let report = sim.health_report();
        assert_eq!(report.races_settled, 1);
        assert_eq!(report.training_samples, 10);
    }

    #[test]
    fn test_resolve_race_all_scratched_is_void() {
        let mut sim = RacingSimulator::new(&test_config(1.0)).unwrap();
        let mut race = sim.generate_race_on("Doncaster", date(), "13:30").unwrap();

        assert!(sim.resolve_race(&mut race).is_none());
        assert!(race.predictions.is_none());
        assert!(race.result.is_none());
        assert_eq!(sim.scratch_log().len(), 10);
        assert_eq!(sim.health_report().races_settled, 0);
        assert!(sim.model().history().is_empty());
    }

    #[test]
    fn test_model_retrains_after_six_races() {
        let mut sim = RacingSimulator::new(&test_config(0.0)).unwrap();
        for i in 0..6 {
            let mut race = sim.generate_race_on("Ascot", date(), "13:15").unwrap();
            assert!(sim.resolve_race(&mut race).is_some(), "race {}", i);
        }

        let report = sim.health_report();
        assert_eq!(report.training_samples, 60);
        // Train calls at 20, 40 and 60 samples; only 60 reaches the minimum
        assert_eq!(report.train_calls, 3);
        assert_eq!(report.retrains, 1);
        assert_eq!(report.accuracy_history.len(), 1);
        assert!((0.0..=1.0).contains(&report.top_pick_hit_rate));
    }

    #[test]
    fn test_seeded_simulators_agree() {
        let mut a = RacingSimulator::new(&test_config(0.1)).unwrap();
        let mut b = RacingSimulator::new(&test_config(0.1)).unwrap();
        for _ in 0..3 {
            let mut ra = a.generate_race_on("York", date(), "14:45").unwrap();
            let mut rb = b.generate_race_on("York", date(), "14:45").unwrap();
            let res_a = a.resolve_race(&mut ra).map(|r| r.winner.horse_id);
            let res_b = b.resolve_race(&mut rb).map(|r| r.winner.horse_id);
            assert_eq!(res_a, res_b);
        }
    }

    #[test]
    fn test_generate_race_dated_in_schedule_zone() {
        let mut config = test_config(0.0);
        config.schedule.timezone = "Pacific/Pago_Pago".to_string();
        let mut sim = RacingSimulator::new(&config).unwrap();

        let before = today_in(chrono_tz::Pacific::Pago_Pago);
        let race = sim.generate_race("Ascot", "15:30").unwrap();
        let after = today_in(chrono_tz::Pacific::Pago_Pago);
        assert!(race.date == before || race.date == after);
        assert_eq!(race.race_id, race_card::race_id("Ascot", race.date, "15:30"));
    }

    #[test]
    fn test_unknown_timezone_is_an_error() {
        let mut config = test_config(0.0);
        config.schedule.timezone = "Local/Time".to_string();
        assert!(RacingSimulator::new(&config).is_err());
    }
}
